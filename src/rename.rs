use crate::program::{Guard, Process, Rule};
use crate::term::{Term, TermId, TermStore, VarId};
use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// The interpreter-wide source of fresh variables.
///
/// A single monotonically increasing counter; this is the only shared
/// mutable scalar the core needs, so an atomic fetch-add suffices.
#[derive(Debug, Default)]
pub struct VarSource {
    next: AtomicU64,
}

impl VarSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a globally fresh variable.
    pub fn fresh(&self) -> VarId {
        VarId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of variables issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Produce an α-renamed copy of a rule with globally fresh variables.
///
/// Every variable occurring in the head, guards, and body is mapped
/// through one local table, so repeated occurrences stay shared inside
/// the activation while distinct activations never collide. Wildcards
/// and scalars pass through untouched; list cells are rebuilt. The
/// operation never consults the binding store.
pub fn fresh_copy(rule: &Rule, vars: &VarSource, terms: &TermStore) -> Rule {
    let mut map: HashMap<VarId, VarId> = HashMap::new();
    let head = fresh_process(&rule.head, &mut map, vars, terms);
    let guards = rule
        .guards
        .iter()
        .map(|g| Guard {
            op: g.op,
            lhs: fresh_term(g.lhs, &mut map, vars, terms),
            rhs: fresh_term(g.rhs, &mut map, vars, terms),
        })
        .collect();
    let body = rule
        .body
        .iter()
        .map(|p| fresh_process(p, &mut map, vars, terms))
        .collect();
    Rule { head, guards, body }
}

fn fresh_process(
    p: &Process,
    map: &mut HashMap<VarId, VarId>,
    vars: &VarSource,
    terms: &TermStore,
) -> Process {
    Process {
        functor: p.functor,
        args: p
            .args
            .iter()
            .map(|&a| fresh_term(a, map, vars, terms))
            .collect(),
    }
}

fn fresh_term(
    t: TermId,
    map: &mut HashMap<VarId, VarId>,
    vars: &VarSource,
    terms: &TermStore,
) -> TermId {
    match terms.resolve(t) {
        Some(Term::Var(v)) => {
            let renamed = *map.entry(v).or_insert_with(|| vars.fresh());
            terms.var(renamed)
        }
        Some(Term::Cell(head, tail)) => {
            let head = fresh_term(head, map, vars, terms);
            let tail = fresh_term(tail, map, vars, terms);
            terms.cell(head, tail)
        }
        _ => t,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::GuardOp;
    use crate::symbol::SymbolStore;

    fn setup() -> (SymbolStore, TermStore, VarSource) {
        (SymbolStore::new(), TermStore::new(), VarSource::new())
    }

    // ========== VAR SOURCE ==========

    #[test]
    fn fresh_vars_are_monotone() {
        let vars = VarSource::new();
        let a = vars.fresh();
        let b = vars.fresh();
        assert_eq!(a, VarId(0));
        assert_eq!(b, VarId(1));
        assert_eq!(vars.issued(), 2);
    }

    #[test]
    fn fresh_vars_unique_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;
        use std::thread;

        let vars = Arc::new(VarSource::new());
        let mut handles = vec![];
        for _ in 0..4 {
            let vars = Arc::clone(&vars);
            handles.push(thread::spawn(move || {
                (0..100).map(|_| vars.fresh()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate fresh variable {v}");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    // ========== FRESH COPY ==========

    fn sum1_rule(symbols: &SymbolStore, terms: &TermStore) -> Rule {
        // sum1([X|Xs], A, S) :- isplus(A1, A, X), sum1(Xs, A1, S).
        let sum1 = symbols.intern("sum1");
        let isplus = symbols.intern("isplus");
        let (x, xs, a, s, a1) = (
            terms.var(VarId(0)),
            terms.var(VarId(1)),
            terms.var(VarId(2)),
            terms.var(VarId(3)),
            terms.var(VarId(4)),
        );
        Rule {
            head: Process::new(sum1, [terms.cell(x, xs), a, s]),
            guards: Vec::new(),
            body: vec![
                Process::new(isplus, [a1, a, x]),
                Process::new(sum1, [xs, a1, s]),
            ],
        }
    }

    #[test]
    fn copy_preserves_shape() {
        let (symbols, terms, vars) = setup();
        let rule = sum1_rule(&symbols, &terms);
        let copy = fresh_copy(&rule, &vars, &terms);

        assert_eq!(copy.head.functor, rule.head.functor);
        assert_eq!(copy.head.arity(), rule.head.arity());
        assert_eq!(copy.body.len(), rule.body.len());
        assert_eq!(copy.body[0].functor, rule.body[0].functor);
        assert!(matches!(
            terms.resolve(copy.head.args[0]),
            Some(Term::Cell(_, _))
        ));
    }

    #[test]
    fn copy_renames_all_variables() {
        let (symbols, terms, vars) = setup();
        let rule = sum1_rule(&symbols, &terms);
        let copy = fresh_copy(&rule, &vars, &terms);

        let Some(Term::Cell(x, xs)) = terms.resolve(copy.head.args[0]) else {
            panic!("expected cell head");
        };
        for (old, new) in [
            (rule.head.args[1], copy.head.args[1]),
            (rule.head.args[2], copy.head.args[2]),
        ] {
            assert_ne!(old, new, "template variables must be renamed");
        }
        assert_ne!(terms.as_var(x), None);
        assert_ne!(terms.as_var(xs), None);
    }

    #[test]
    fn copy_renaming_is_consistent_within_activation() {
        let (symbols, terms, vars) = setup();
        let rule = sum1_rule(&symbols, &terms);
        let copy = fresh_copy(&rule, &vars, &terms);

        // X occurs in the head cell and in the isplus body process.
        let Some(Term::Cell(x, xs)) = terms.resolve(copy.head.args[0]) else {
            panic!("expected cell head");
        };
        assert_eq!(copy.body[0].args[2], x, "shared X stays shared");
        assert_eq!(copy.body[1].args[0], xs, "shared Xs stays shared");
        // A, S shared between head and recursive call.
        assert_eq!(copy.body[0].args[1], copy.head.args[1]);
        assert_eq!(copy.body[1].args[2], copy.head.args[2]);
    }

    #[test]
    fn distinct_activations_get_distinct_variables() {
        let (symbols, terms, vars) = setup();
        let rule = sum1_rule(&symbols, &terms);
        let c1 = fresh_copy(&rule, &vars, &terms);
        let c2 = fresh_copy(&rule, &vars, &terms);
        assert_ne!(c1.head.args[1], c2.head.args[1]);
        assert_ne!(c1.head.args[2], c2.head.args[2]);
    }

    #[test]
    fn copy_preserves_scalars_and_wildcards() {
        let (symbols, terms, vars) = setup();
        let member = symbols.intern("member");
        let assign = symbols.intern(":=");
        // member(_, [], R) :- R := false.
        let r = terms.var(VarId(0));
        let rule = Rule {
            head: Process::new(member, [terms.wildcard(), terms.nil(), r]),
            guards: Vec::new(),
            body: vec![Process::new(assign, [r, terms.boolean(false)])],
        };
        let copy = fresh_copy(&rule, &vars, &terms);

        assert_eq!(copy.head.args[0], terms.wildcard(), "wildcard is not renamed");
        assert_eq!(copy.head.args[1], terms.nil());
        assert_eq!(copy.body[0].args[1], terms.boolean(false));
        assert_ne!(copy.head.args[2], r);
        assert_eq!(copy.body[0].args[0], copy.head.args[2]);
    }

    #[test]
    fn copy_renames_guard_operands() {
        let (symbols, terms, vars) = setup();
        let member = symbols.intern("member");
        let (x, x1) = (terms.var(VarId(0)), terms.var(VarId(1)));
        let rule = Rule {
            head: Process::new(member, [x, x1]),
            guards: vec![Guard {
                op: GuardOp::NotEqual,
                lhs: x,
                rhs: x1,
            }],
            body: Vec::new(),
        };
        let copy = fresh_copy(&rule, &vars, &terms);
        assert_eq!(copy.guards[0].lhs, copy.head.args[0]);
        assert_eq!(copy.guards[0].rhs, copy.head.args[1]);
        assert_ne!(copy.guards[0].lhs, x);
    }
}
