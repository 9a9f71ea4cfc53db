//! Domain error types.
//!
//! Every variant is fatal to the current selection cycle: the pipeline never
//! returns a partial universe.

/// Top-level error type for uniselect.
#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("no candidate symbols resolved for market {market}")]
    NoCandidates { market: String },

    #[error(
        "all candidates filtered out on {market}: {total} candidates, \
         {with_metrics} with complete metrics, 0 passed the hard filter"
    )]
    AllFilteredOut {
        market: String,
        total: usize,
        with_metrics: usize,
    },

    #[error("explicit symbol source requested without a symbol list")]
    MisconfiguredSource,

    #[error("market data error: {reason}")]
    Data { reason: String },

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SelectorError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SelectorError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&SelectorError> for std::process::ExitCode {
    fn from(err: &SelectorError) -> Self {
        let code: u8 = match err {
            SelectorError::Io(_) => 1,
            SelectorError::ConfigParse { .. }
            | SelectorError::ConfigMissing { .. }
            | SelectorError::ConfigInvalid { .. }
            | SelectorError::MisconfiguredSource => 2,
            SelectorError::Database { .. }
            | SelectorError::DatabaseQuery { .. }
            | SelectorError::Data { .. } => 3,
            SelectorError::NoCandidates { .. } | SelectorError::AllFilteredOut { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
