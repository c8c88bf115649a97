use crate::term::{Term, TermId, TermStore, VarId};
use hashbrown::HashMap;
use smallvec::SmallVec;

/// A single-assignment binding store: a partial mapping Variable -> Term.
///
/// The store is monotone: a key, once bound, is never rebound. The same
/// type serves as the global store, as worker snapshots, and as the
/// per-reduction update delta that gets merged on commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    map: HashMap<VarId, TermId>,
}

impl Bindings {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Bind a variable. The caller guarantees the variable is unbound and
    /// that `term` is not the variable itself (the store must stay free of
    /// 1-cycles).
    pub fn bind(&mut self, var: VarId, term: TermId) {
        debug_assert!(
            !self.map.contains_key(&var),
            "single assignment violated for {var}"
        );
        self.map.insert(var, term);
    }

    /// Get the binding for a variable, if any.
    pub fn get(&self, var: VarId) -> Option<TermId> {
        self.map.get(&var).copied()
    }

    /// Check whether a variable is bound.
    pub fn contains(&self, var: VarId) -> bool {
        self.map.contains_key(&var)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Iterator over (variable, term) pairs. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, TermId)> + '_ {
        self.map.iter().map(|(v, t)| (*v, *t))
    }

    /// True if committing `delta` onto this store would rebind a variable.
    ///
    /// This is the parallel driver's safety net: a delta computed against
    /// a stale snapshot whose keys have since been bound must be rejected
    /// whole and its process re-run.
    pub fn conflicts_with(&self, delta: &Bindings) -> bool {
        delta.iter().any(|(v, _)| self.contains(v))
    }

    /// Resolve a variable chain to its representative: a non-variable
    /// term, or a variable currently unbound here.
    ///
    /// The store's construction keeps variable chains acyclic (bindings
    /// always point at fully-walked terms and self-assignment is elided),
    /// so the chase terminates.
    pub fn walk(&self, term: TermId, terms: &TermStore) -> TermId {
        let mut current = term;
        loop {
            match terms.resolve(current) {
                Some(Term::Var(v)) => match self.get(v) {
                    Some(next) => current = next,
                    None => return current,
                },
                _ => return current,
            }
        }
    }
}

/// Walk through an update delta, then through the base store.
///
/// This is the normalization every reduction-side read uses: `updates`
/// holds the bindings accumulated so far in the current reduction, `base`
/// the (snapshot of the) global store.
pub fn walk2(base: &Bindings, updates: &Bindings, term: TermId, terms: &TermStore) -> TermId {
    base.walk(updates.walk(term, terms), terms)
}

/// Substitute a term's variables through the store, recursively, producing
/// a ground-as-possible copy. Used for result display; the reduction path
/// never needs deep substitution.
///
/// Uses explicit stacks to avoid recursion, and a visited guard on
/// variable chains so display stays total even on a malformed store.
pub fn resolve_term(term: TermId, store: &Bindings, terms: &TermStore) -> TermId {
    let mut work_stack: Vec<(TermId, bool)> = vec![(term, false)];
    let mut result_stack: Vec<TermId> = Vec::new();

    while let Some((tid, children_done)) = work_stack.pop() {
        if children_done {
            // Both fields were processed; rebuild the cell.
            let tail = result_stack.pop().expect("tail result");
            let head = result_stack.pop().expect("head result");
            result_stack.push(terms.cell(head, tail));
            continue;
        }
        let walked = chase(tid, store, terms);
        match terms.resolve(walked) {
            Some(Term::Cell(head, tail)) => {
                work_stack.push((walked, true));
                work_stack.push((tail, false));
                work_stack.push((head, false));
            }
            _ => result_stack.push(walked),
        }
    }

    debug_assert_eq!(result_stack.len(), 1);
    result_stack.pop().unwrap()
}

/// Follow a chain of variable bindings until a non-variable, an unbound
/// variable, or a revisited variable (cycle guard).
fn chase(start: TermId, store: &Bindings, terms: &TermStore) -> TermId {
    let mut current = start;
    let mut visited: SmallVec<[VarId; 8]> = SmallVec::new();
    loop {
        match terms.resolve(current) {
            Some(Term::Var(v)) => {
                if visited.contains(&v) {
                    return current;
                }
                visited.push(v);
                match store.get(v) {
                    Some(next) => current = next,
                    None => return current,
                }
            }
            _ => return current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::format_term;

    fn terms() -> TermStore {
        TermStore::new()
    }

    // ========== BIND / GET ==========

    #[test]
    fn new_store_is_empty() {
        let store = Bindings::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert_eq!(store.get(VarId(0)), None);
    }

    #[test]
    fn bind_then_get() {
        let terms = terms();
        let mut store = Bindings::new();
        let five = terms.int(5);
        store.bind(VarId(0), five);
        assert_eq!(store.get(VarId(0)), Some(five));
        assert!(store.contains(VarId(0)));
        assert!(!store.contains(VarId(1)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    #[should_panic(expected = "single assignment")]
    #[cfg(debug_assertions)]
    fn rebinding_panics_in_debug() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.int(1));
        store.bind(VarId(0), terms.int(2));
    }

    // ========== WALK ==========

    #[test]
    fn walk_non_variable_is_identity() {
        let terms = terms();
        let store = Bindings::new();
        let n = terms.int(3);
        assert_eq!(store.walk(n, &terms), n);
    }

    #[test]
    fn walk_unbound_variable_is_identity() {
        let terms = terms();
        let store = Bindings::new();
        let v = terms.var(VarId(0));
        assert_eq!(store.walk(v, &terms), v);
    }

    #[test]
    fn walk_follows_chain() {
        let terms = terms();
        let mut store = Bindings::new();
        // 0 -> 1 -> 2 -> 42
        store.bind(VarId(0), terms.var(VarId(1)));
        store.bind(VarId(1), terms.var(VarId(2)));
        store.bind(VarId(2), terms.int(42));
        assert_eq!(store.walk(terms.var(VarId(0)), &terms), terms.int(42));
    }

    #[test]
    fn walk_stops_at_unbound_end_of_chain() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.var(VarId(1)));
        assert_eq!(
            store.walk(terms.var(VarId(0)), &terms),
            terms.var(VarId(1))
        );
    }

    #[test]
    fn walk_is_idempotent() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.var(VarId(1)));
        store.bind(VarId(1), terms.int(7));
        let once = store.walk(terms.var(VarId(0)), &terms);
        assert_eq!(store.walk(once, &terms), once);
    }

    #[test]
    fn walk2_reads_updates_then_base() {
        let terms = terms();
        let mut base = Bindings::new();
        let mut updates = Bindings::new();
        // updates: 0 -> 1; base: 1 -> 9
        updates.bind(VarId(0), terms.var(VarId(1)));
        base.bind(VarId(1), terms.int(9));
        assert_eq!(
            walk2(&base, &updates, terms.var(VarId(0)), &terms),
            terms.int(9)
        );
    }

    // ========== CONFLICTS ==========

    #[test]
    fn disjoint_delta_does_not_conflict() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.int(1));
        let mut delta = Bindings::new();
        delta.bind(VarId(1), terms.int(2));
        assert!(!store.conflicts_with(&delta));
    }

    #[test]
    fn overlapping_delta_conflicts() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.int(1));
        let mut delta = Bindings::new();
        delta.bind(VarId(0), terms.int(1));
        delta.bind(VarId(1), terms.int(2));
        assert!(
            store.conflicts_with(&delta),
            "any shared key must reject the whole delta"
        );
    }

    #[test]
    fn empty_delta_never_conflicts() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.int(1));
        assert!(!store.conflicts_with(&Bindings::new()));
    }

    // ========== SNAPSHOTS ==========

    #[test]
    fn snapshot_is_independent() {
        let terms = terms();
        let mut store = Bindings::new();
        store.bind(VarId(0), terms.int(1));
        let snapshot = store.clone();
        store.bind(VarId(1), terms.int(2));
        assert!(snapshot.contains(VarId(0)));
        assert!(!snapshot.contains(VarId(1)), "snapshot must not see later binds");
    }

    // ========== DEEP RESOLUTION ==========

    #[test]
    fn resolve_term_substitutes_inside_lists() {
        let terms = terms();
        let mut store = Bindings::new();
        // [ _G0, [ _G1 ] ] with 0 -> 5, 1 -> true
        store.bind(VarId(0), terms.int(5));
        store.bind(VarId(1), terms.boolean(true));
        let inner = terms.list(&[terms.var(VarId(1))], terms.nil());
        let spine = terms.list(&[terms.var(VarId(0)), inner], terms.nil());

        let resolved = resolve_term(spine, &store, &terms);
        assert_eq!(format_term(resolved, &terms), "[5, [true]]");
    }

    #[test]
    fn resolve_term_keeps_unbound_vars() {
        let terms = terms();
        let store = Bindings::new();
        let spine = terms.list(&[terms.var(VarId(3))], terms.nil());
        let resolved = resolve_term(spine, &store, &terms);
        assert_eq!(format_term(resolved, &terms), "[_G3]");
    }

    #[test]
    fn resolve_term_follows_var_to_spine() {
        let terms = terms();
        let mut store = Bindings::new();
        let spine = terms.list(&[terms.int(2), terms.int(3)], terms.nil());
        store.bind(VarId(0), spine);
        let resolved = resolve_term(terms.var(VarId(0)), &store, &terms);
        assert_eq!(format_term(resolved, &terms), "[2, 3]");
    }

    #[test]
    fn resolve_term_open_tail_through_binding() {
        let terms = terms();
        let mut store = Bindings::new();
        // [1 | _G0] with 0 -> [2, 3]
        let open = terms.list(&[terms.int(1)], terms.var(VarId(0)));
        let rest = terms.list(&[terms.int(2), terms.int(3)], terms.nil());
        store.bind(VarId(0), rest);
        let resolved = resolve_term(open, &store, &terms);
        assert_eq!(format_term(resolved, &terms), "[1, 2, 3]");
    }
}
