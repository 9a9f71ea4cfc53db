//! Symbol directory port.

pub trait SymbolDirectory {
    /// Candidate symbols listed on `market`, in directory order, without
    /// duplicates. Unknown markets and unreachable stores yield an empty list.
    fn load_symbols(&self, market: &str) -> Vec<String>;
}
