use lasso::{Spur, ThreadedRodeo};

/// A unique identifier for a functor symbol.
/// This is an interned string ID for fast equality comparison.
pub type FuncId = Spur;

/// Thread-safe symbol store for interning functor names.
///
/// Guarantees:
/// - Same string always produces same FuncId
/// - Different strings always produce different FuncIds
/// - FuncId can be resolved back to the original string
pub struct SymbolStore {
    rodeo: ThreadedRodeo,
}

impl SymbolStore {
    /// Create a new empty symbol store.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Intern a functor name, returning its unique FuncId.
    /// If the name was already interned, returns the existing FuncId.
    pub fn intern(&self, name: &str) -> FuncId {
        self.rodeo.get_or_intern(name)
    }

    /// Resolve a FuncId back to its string representation.
    /// Returns None if the FuncId was not created by this store.
    pub fn resolve(&self, id: FuncId) -> Option<&str> {
        self.rodeo.try_resolve(&id)
    }

    /// Get the FuncId for a name if it exists, without interning.
    pub fn get(&self, name: &str) -> Option<FuncId> {
        self.rodeo.get(name)
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The functors the runtime treats specially, pre-interned so dispatch
/// is an id comparison rather than a string comparison.
///
/// `assign` is the `:=` built-in and `isplus` the three-place addition
/// built-in. The parser also desugars the infix `X is Y + Z` form into
/// `isplus`; `is` itself is never a runtime functor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Builtins {
    pub assign: FuncId,
    pub isplus: FuncId,
}

impl Builtins {
    /// Intern the built-in functor names into `symbols`.
    pub fn intern(symbols: &SymbolStore) -> Self {
        Self {
            assign: symbols.intern(":="),
            isplus: symbols.intern("isplus"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== INTERNING ==========

    #[test]
    fn intern_same_string_returns_same_id() {
        let store = SymbolStore::new();
        let id1 = store.intern("sum");
        let id2 = store.intern("sum");
        assert_eq!(id1, id2, "interning the same name twice must be stable");
    }

    #[test]
    fn intern_different_strings_returns_different_ids() {
        let store = SymbolStore::new();
        let id1 = store.intern("sum");
        let id2 = store.intern("sum1");
        assert_ne!(id1, id2);
    }

    #[test]
    fn resolve_returns_original_string() {
        let store = SymbolStore::new();
        let id = store.intern("member");
        assert_eq!(store.resolve(id), Some("member"));
    }

    #[test]
    fn get_without_interning() {
        let store = SymbolStore::new();
        let id = store.intern("member");
        assert_eq!(store.get("member"), Some(id));
        assert_eq!(store.get("absent"), None);
    }

    #[test]
    fn operator_names_are_ordinary_symbols() {
        let store = SymbolStore::new();
        let assign = store.intern(":=");
        assert_eq!(store.resolve(assign), Some(":="));
    }

    // ========== BUILTINS ==========

    #[test]
    fn builtins_are_distinct() {
        let store = SymbolStore::new();
        let b = Builtins::intern(&store);
        assert_ne!(b.assign, b.isplus);
    }

    #[test]
    fn builtins_interning_is_idempotent() {
        let store = SymbolStore::new();
        let b1 = Builtins::intern(&store);
        let b2 = Builtins::intern(&store);
        assert_eq!(b1, b2);
    }

    // ========== THREAD SAFETY ==========

    #[test]
    fn concurrent_intern_same_symbol() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(SymbolStore::new());
        let mut handles = vec![];
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || store.intern("shared")));
        }
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for id in &ids {
            assert_eq!(*id, ids[0], "all threads must agree on the FuncId");
        }
    }
}
