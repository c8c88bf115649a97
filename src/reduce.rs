use crate::program::{Guard, GuardOp, Process, Program, Rule};
use crate::rename::{fresh_copy, VarSource};
use crate::rng::Rng;
use crate::store::{walk2, Bindings};
use crate::term::{Term, TermStore};
use crate::unify::{merge_vars, note_var, unify, Unify, VarSet};
use smallvec::SmallVec;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Outcome of reducing one process, shared by rule reduction and the
/// built-in executor so drivers dispatch uniformly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reduction {
    /// A rule committed: merge `updates` into the store, spawn `body`.
    Commit { updates: Bindings, body: Vec<Process> },
    /// No rule can ever apply; the process is dropped.
    Failed,
    /// Not enough information: park the process until one of these
    /// variables is bound.
    Suspended(VarSet),
}

/// Outcome of matching a process against one rule head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Ok(Bindings),
    Failed,
    Suspended(VarSet),
}

/// Match a process against a rule head, positionally, accumulating all
/// bindings into one shared delta.
///
/// The caller guarantees equal functor and arity. Suspensions accumulate
/// across arguments; a hard failure in any argument aborts immediately
/// (a definite mismatch dominates a maybe).
pub fn cmatch(base: &Bindings, p: &Process, head: &Process, terms: &TermStore) -> Match {
    debug_assert_eq!(p.functor, head.functor);
    debug_assert_eq!(p.arity(), head.arity());

    let mut updates = Bindings::new();
    let mut suspended = VarSet::new();
    for (&arg, &pat) in p.args.iter().zip(head.args.iter()) {
        match unify(base, &mut updates, arg, pat, terms) {
            Unify::Matched => {}
            Unify::Failed => return Match::Failed,
            Unify::Suspended(vars) => merge_vars(&mut suspended, &vars),
        }
    }
    if suspended.is_empty() {
        Match::Ok(updates)
    } else {
        Match::Suspended(suspended)
    }
}

/// Result of evaluating one guard under `(base, updates)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardCheck {
    Holds,
    Fails,
    Suspended(VarSet),
}

/// Evaluate a guard. Guards read, they never extend the delta: both
/// operands are walked and must come out fully instantiated, otherwise
/// the check suspends on the residual variables.
pub fn check_guard(
    base: &Bindings,
    updates: &Bindings,
    guard: &Guard,
    terms: &TermStore,
) -> GuardCheck {
    let lhs = walk2(base, updates, guard.lhs, terms);
    let rhs = walk2(base, updates, guard.rhs, terms);

    let mut waiting = VarSet::new();
    if let Some(Term::Var(v)) = terms.resolve(lhs) {
        note_var(&mut waiting, v);
    }
    if let Some(Term::Var(v)) = terms.resolve(rhs) {
        note_var(&mut waiting, v);
    }
    if !waiting.is_empty() {
        return GuardCheck::Suspended(waiting);
    }

    let holds = match guard.op {
        GuardOp::Equal => lhs == rhs,
        GuardOp::NotEqual => lhs != rhs,
    };
    if holds {
        GuardCheck::Holds
    } else {
        GuardCheck::Fails
    }
}

/// Reduce a process against its candidate rules, committed-choice style.
///
/// Rules are tried in randomized order; the first whose head matches and
/// whose guards all hold wins, irrevocably. Suspensions accumulate across
/// candidates: the process unblocks when any of the collected variables
/// is bound. A rule with a hard guard failure contributes nothing, not
/// even suspensions its other guards may have raised.
pub fn reduce(
    base: &Bindings,
    p: &Process,
    program: &Program,
    candidates: &[usize],
    vars: &VarSource,
    rng: &mut Rng,
    terms: &TermStore,
) -> Reduction {
    let mut order: SmallVec<[usize; 8]> = SmallVec::from_slice(candidates);
    rng.shuffle(&mut order);

    let mut suspended = VarSet::new();
    for &idx in &order {
        let rule = fresh_copy(program.rule(idx), vars, terms);
        match cmatch(base, p, &rule.head, terms) {
            Match::Failed => continue,
            Match::Suspended(vars) => {
                merge_vars(&mut suspended, &vars);
                continue;
            }
            Match::Ok(updates) => match eval_guards(base, &updates, &rule, terms) {
                GuardCheck::Holds => {
                    #[cfg(feature = "tracing")]
                    trace!(rule = idx, "reduce_commit");
                    return Reduction::Commit {
                        updates,
                        body: rule.body,
                    };
                }
                GuardCheck::Fails => continue,
                GuardCheck::Suspended(vars) => merge_vars(&mut suspended, &vars),
            },
        }
    }

    if suspended.is_empty() {
        Reduction::Failed
    } else {
        Reduction::Suspended(suspended)
    }
}

/// Evaluate all guards of a freshly renamed rule. `Holds` iff every guard
/// holds; a hard failure anywhere voids the rule's whole contribution;
/// otherwise the union of the guards' suspension sets.
fn eval_guards(base: &Bindings, updates: &Bindings, rule: &Rule, terms: &TermStore) -> GuardCheck {
    let mut waiting = VarSet::new();
    for guard in &rule.guards {
        match check_guard(base, updates, guard, terms) {
            GuardCheck::Holds => {}
            GuardCheck::Fails => return GuardCheck::Fails,
            GuardCheck::Suspended(vars) => merge_vars(&mut waiting, &vars),
        }
    }
    if waiting.is_empty() {
        GuardCheck::Holds
    } else {
        GuardCheck::Suspended(waiting)
    }
}
