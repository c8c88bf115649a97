use hashbrown::HashMap;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of a logical variable.
///
/// Variables are compared by identity only; freshness is produced by the
/// interpreter's monotonically increasing counter (see `rename::VarSource`),
/// so two variables with the same id are the same variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u64);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_G{}", self.0)
    }
}

/// Unique identifier for a term in the term store.
/// TermIds are stable, and equality of TermIds is structural equality
/// of the terms they denote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Get the raw u32 value (for debugging/display).
    pub fn raw(self) -> u32 {
        self.0
    }
}

/// A term of the language: the closed sum over which unification works.
///
/// `Cell` tails are expected to be another `Cell` or `Nil`; the parser
/// only builds well-formed spines, and unification against a non-list
/// tail simply fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Term {
    /// A logical variable.
    Var(VarId),
    /// An integer constant.
    Int(i64),
    /// The empty list `[]`.
    Nil,
    /// The wildcard `_`: matches anything, captures nothing.
    Wildcard,
    /// Boolean constants `true` / `false`.
    Bool(bool),
    /// A list cell `[head | tail]`.
    Cell(TermId, TermId),
}

/// Number of shards for hashcons maps (power of 2 for fast modulo).
const NUM_SHARDS: usize = 16;

/// Thread-safe term store with hashconsing.
///
/// Guarantees:
/// - Structurally equal terms get the same TermId
/// - TermId can be resolved back to the term
/// - All terms (including variables) are hashconsed
pub struct TermStore {
    /// Central storage of all terms, indexed by TermId.
    nodes: RwLock<Vec<Term>>,
    /// Sharded hashcons maps for reducing contention.
    shards: [RwLock<HashMap<Term, TermId>>; NUM_SHARDS],
    /// Counter for generating unique TermIds.
    next_id: AtomicU32,
}

impl TermStore {
    /// Create a new empty term store.
    pub fn new() -> Self {
        let shards = std::array::from_fn(|_| RwLock::new(HashMap::new()));
        Self {
            nodes: RwLock::new(Vec::new()),
            shards,
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern a term, returning its TermId.
    /// If the term already exists, returns the existing TermId.
    fn intern(&self, term: Term) -> TermId {
        let shard = &self.shards[Self::shard_index(&term)];

        // Fast path: check if term exists (read lock)
        {
            let map = shard.read();
            if let Some(&id) = map.get(&term) {
                return id;
            }
        }

        // Slow path: need to insert (write lock)
        let mut map = shard.write();

        // Double-check after acquiring write lock
        if let Some(&id) = map.get(&term) {
            return id;
        }

        let id = TermId(self.next_id.fetch_add(1, Ordering::Relaxed));
        {
            let mut nodes = self.nodes.write();
            let idx = id.0 as usize;
            if nodes.len() <= idx {
                nodes.resize(idx + 1, Term::Nil); // placeholder
            }
            nodes[idx] = term;
        }
        map.insert(term, id);
        id
    }

    /// Create a variable term.
    /// Hashconsed: the same VarId always returns the same TermId.
    pub fn var(&self, v: VarId) -> TermId {
        self.intern(Term::Var(v))
    }

    /// Create an integer term.
    pub fn int(&self, n: i64) -> TermId {
        self.intern(Term::Int(n))
    }

    /// The empty-list singleton.
    pub fn nil(&self) -> TermId {
        self.intern(Term::Nil)
    }

    /// The wildcard singleton.
    pub fn wildcard(&self) -> TermId {
        self.intern(Term::Wildcard)
    }

    /// A boolean constant.
    pub fn boolean(&self, b: bool) -> TermId {
        self.intern(Term::Bool(b))
    }

    /// Create a list cell `[head | tail]`.
    pub fn cell(&self, head: TermId, tail: TermId) -> TermId {
        self.intern(Term::Cell(head, tail))
    }

    /// Build a proper list spine from `items` ending in `tail`.
    pub fn list(&self, items: &[TermId], tail: TermId) -> TermId {
        let mut out = tail;
        for &item in items.iter().rev() {
            out = self.cell(item, out);
        }
        out
    }

    /// Resolve a TermId to its term.
    /// Returns None if the TermId is invalid.
    pub fn resolve(&self, id: TermId) -> Option<Term> {
        let nodes = self.nodes.read();
        nodes.get(id.0 as usize).copied()
    }

    /// If `id` denotes a variable, return its identity.
    pub fn as_var(&self, id: TermId) -> Option<VarId> {
        match self.resolve(id)? {
            Term::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Get the shard index for a term (for hashconsing distribution).
    fn shard_index(term: &Term) -> usize {
        let mut hasher = FxHasher::default();
        term.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }
}

impl Default for TermStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a term with list sugar: `[1, 2, 3]`, `[1 | _G5]`, `[]`.
pub fn format_term(term: TermId, terms: &TermStore) -> String {
    fn render(term: TermId, terms: &TermStore, out: &mut String) {
        match terms.resolve(term) {
            Some(Term::Var(v)) => out.push_str(&v.to_string()),
            Some(Term::Int(n)) => out.push_str(&n.to_string()),
            Some(Term::Nil) => out.push_str("[]"),
            Some(Term::Wildcard) => out.push('_'),
            Some(Term::Bool(true)) => out.push_str("true"),
            Some(Term::Bool(false)) => out.push_str("false"),
            Some(Term::Cell(head, tail)) => {
                out.push('[');
                render(head, terms, out);
                let mut rest = tail;
                loop {
                    match terms.resolve(rest) {
                        Some(Term::Nil) => break,
                        Some(Term::Cell(h, t)) => {
                            out.push_str(", ");
                            render(h, terms, out);
                            rest = t;
                        }
                        _ => {
                            out.push_str(" | ");
                            render(rest, terms, out);
                            break;
                        }
                    }
                }
                out.push(']');
            }
            None => out.push_str(&format!("<bad:{}>", term.raw())),
        }
    }

    let mut out = String::new();
    render(term, terms, &mut out);
    out
}
