use crate::store::{walk2, Bindings};
use crate::term::{Term, TermId, TermStore, VarId};
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// A small set of variables a reduction is waiting on.
/// Suspension sets are almost always tiny; kept deduplicated on insert.
pub type VarSet = SmallVec<[VarId; 4]>;

/// Insert a variable into a suspension set, keeping it duplicate-free.
pub fn note_var(set: &mut VarSet, var: VarId) {
    if !set.contains(&var) {
        set.push(var);
    }
}

/// Merge `src` into `dst`, keeping `dst` duplicate-free.
pub fn merge_vars(dst: &mut VarSet, src: &[VarId]) {
    for &v in src {
        note_var(dst, v);
    }
}

/// Outcome of a dataflow unification.
///
/// `Suspended` is not an error: it means the query side did not carry
/// enough information yet, and lists the unbound variables whose binding
/// would let the match make progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unify {
    Matched,
    Failed,
    Suspended(VarSet),
}

/// Unify a query-side term `u` against a pattern-side term `v`.
///
/// Reads through `base` (immutable during the call) and accumulates new
/// bindings into `updates`, so the caller can commit or discard the delta
/// atomically. The two sides are asymmetric, which is what makes this
/// committed-choice dataflow rather than full unification:
///
/// - pattern-side variables bind freely to whatever the query side holds;
/// - an unbound query-side variable suspends the match on that variable.
///
/// The wildcard matches anything and captures nothing. List cells recurse;
/// a hard failure anywhere dominates, otherwise the suspension sets of the
/// children union.
pub fn unify(
    base: &Bindings,
    updates: &mut Bindings,
    u: TermId,
    v: TermId,
    terms: &TermStore,
) -> Unify {
    let mut worklist: SmallVec<[(TermId, TermId); 32]> = SmallVec::new();
    worklist.push((u, v));
    let mut suspended = VarSet::new();

    while let Some((u, v)) = worklist.pop() {
        // Wildcard is checked before normalization: it is a sentinel, not
        // a binding site.
        if matches!(terms.resolve(u), Some(Term::Wildcard))
            || matches!(terms.resolve(v), Some(Term::Wildcard))
        {
            continue;
        }

        let u = walk2(base, updates, u, terms);
        let v = walk2(base, updates, v, terms);
        if u == v {
            continue;
        }

        match (terms.resolve(u), terms.resolve(v)) {
            // Pattern variables match anything.
            (Some(_), Some(Term::Var(pattern))) => {
                updates.bind(pattern, u);
            }
            // Dataflow synchronization: the query side must be
            // instantiated before matching can proceed.
            (Some(Term::Var(query)), Some(_)) => {
                note_var(&mut suspended, query);
            }
            (Some(Term::Cell(h1, t1)), Some(Term::Cell(h2, t2))) => {
                worklist.push((t1, t2));
                worklist.push((h1, h2));
            }
            (Some(_), Some(_)) => {
                #[cfg(feature = "tracing")]
                trace!("unify_mismatch");
                return Unify::Failed;
            }
            _ => {
                #[cfg(feature = "tracing")]
                trace!("unify_invalid_term");
                return Unify::Failed;
            }
        }
    }

    if suspended.is_empty() {
        Unify::Matched
    } else {
        Unify::Suspended(suspended)
    }
}
