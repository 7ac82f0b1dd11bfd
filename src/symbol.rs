//! Dense symbol indexing, per REDESIGN FLAGS: per-symbol engine state lives in
//! arrays indexed by a `usize` resolved once at startup, not in string-keyed maps.
//! The string map survives only to demultiplex inbound stream names.

use std::collections::HashMap;

/// Immutable for the life of a session: built once from configuration, never
/// mutated afterward.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    /// Builds a table from configured symbols, case-normalizing to uppercase
    /// and deduplicating while preserving first-seen order.
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = Vec::new();
        let mut index = HashMap::new();
        for sym in symbols {
            let upper = sym.as_ref().to_ascii_uppercase();
            if !index.contains_key(&upper) {
                index.insert(upper.clone(), names.len());
                names.push(upper);
            }
        }
        Self { names, index }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Looks up the dense index for a symbol, accepting either case.
    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol.to_ascii_uppercase().as_str()).copied()
    }

    pub fn name(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Lowercase stream-name form used to build the combined-stream WS path,
    /// e.g. `btcusdt@trade`.
    pub fn stream_name(&self, idx: usize, suffix: &str) -> String {
        format!("{}@{}", self.names[idx].to_ascii_lowercase(), suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_and_dedups() {
        let table = SymbolTable::new(["btcusdt", "ETHUSDT", "btcusdt"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.index_of("BTCUSDT"), Some(0));
        assert_eq!(table.index_of("ethusdt"), Some(1));
        assert_eq!(table.index_of("solusdt"), None);
    }

    #[test]
    fn stream_name_is_lowercase() {
        let table = SymbolTable::new(["BTCUSDT"]);
        assert_eq!(table.stream_name(0, "depth"), "btcusdt@depth");
    }
}
