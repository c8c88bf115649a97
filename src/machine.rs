use crate::builtins::{BuiltinTable, ProgramError};
use crate::pool::{Pool, SuspensionTable};
use crate::program::{Process, Program};
use crate::reduce::{reduce, Reduction};
use crate::rename::VarSource;
use crate::rng::Rng;
use crate::store::{resolve_term, Bindings};
use crate::term::{TermId, TermStore, VarId};
use std::sync::Arc;

#[cfg(feature = "tracing")]
use crate::trace::debug;

/// Final state of a run.
///
/// `deadlocked` is true iff the pool drained while processes were still
/// parked on unbound variables; the store is returned either way, and
/// the parked processes are exposed for inspection.
#[derive(Debug)]
pub struct RunOutcome {
    pub bindings: Bindings,
    pub deadlocked: bool,
    pub suspended: Vec<Process>,
}

impl RunOutcome {
    /// Deep-resolve a variable through the final store, for result
    /// inspection and display.
    pub fn resolve(&self, var: VarId, terms: &TermStore) -> TermId {
        resolve_term(terms.var(var), &self.bindings, terms)
    }
}

/// Merge a committed delta into the store and re-enqueue every process
/// that was waiting on one of the newly bound variables.
///
/// Returns the number of woken processes. The store is single-assignment,
/// so the merge inserts keys that must not already exist; the parallel
/// driver guarantees this with its conflict check, the single-threaded
/// driver by construction.
pub(crate) fn commit_and_wake(
    store: &mut Bindings,
    updates: Bindings,
    suspensions: &mut SuspensionTable,
    pool: &mut Pool,
) -> usize {
    let mut woken = 0;
    for (v, t) in updates.iter() {
        store.bind(v, t);
        for p in suspensions.wake(v) {
            pool.put(p);
            woken += 1;
        }
    }
    woken
}

/// Route one reduction outcome: commit-and-spawn, park, or drop.
pub(crate) fn apply_outcome(
    process: Process,
    outcome: Reduction,
    store: &mut Bindings,
    suspensions: &mut SuspensionTable,
    pool: &mut Pool,
) -> usize {
    match outcome {
        Reduction::Commit { updates, body } => {
            let woken = commit_and_wake(store, updates, suspensions, pool);
            for p in body {
                pool.put(p);
            }
            woken
        }
        Reduction::Failed => 0,
        Reduction::Suspended(vars) => {
            suspensions.block(process, &vars);
            0
        }
    }
}

/// The single-threaded driver: one cooperative loop owning the store,
/// the pool, and the suspension table. Each step runs a reduction to
/// completion; there are no observable suspension points.
pub struct Machine {
    terms: Arc<TermStore>,
    program: Arc<Program>,
    builtins: Arc<BuiltinTable>,
    vars: Arc<VarSource>,
    store: Bindings,
    pool: Pool,
    suspensions: SuspensionTable,
    rng: Rng,
}

impl Machine {
    pub fn new(
        terms: Arc<TermStore>,
        program: Arc<Program>,
        builtins: Arc<BuiltinTable>,
        vars: Arc<VarSource>,
        seed: u64,
    ) -> Self {
        Self {
            terms,
            program,
            builtins,
            vars,
            store: Bindings::new(),
            pool: Pool::new(),
            suspensions: SuspensionTable::new(),
            rng: Rng::new(seed),
        }
    }

    /// Run the initial processes to quiescence.
    pub fn run(mut self, initial: Vec<Process>) -> Result<RunOutcome, ProgramError> {
        for p in initial {
            self.pool.put(p);
        }

        while let Some(p) = self.pool.take(&mut self.rng) {
            let outcome = self.dispatch(&p)?;
            apply_outcome(
                p,
                outcome,
                &mut self.store,
                &mut self.suspensions,
                &mut self.pool,
            );
        }

        let deadlocked = !self.suspensions.is_empty();
        #[cfg(feature = "tracing")]
        debug!(
            bindings = self.store.len(),
            suspended = self.suspensions.len(),
            deadlocked,
            "run_finished"
        );
        Ok(RunOutcome {
            bindings: self.store,
            deadlocked,
            suspended: self.suspensions.into_processes(),
        })
    }

    fn dispatch(&mut self, p: &Process) -> Result<Reduction, ProgramError> {
        if let Some(f) = self.builtins.lookup(p.functor) {
            return f(&self.store, p, &self.terms);
        }
        let candidates = self.program.candidates(p.functor, p.arity());
        Ok(reduce(
            &self.store,
            p,
            &self.program,
            candidates,
            &self.vars,
            &mut self.rng,
            &self.terms,
        ))
    }
}
