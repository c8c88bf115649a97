use crate::builtins::{BuiltinTable, ProgramError};
use crate::machine::{apply_outcome, commit_and_wake, RunOutcome};
use crate::pool::{Pool, SuspensionTable};
use crate::program::{Process, Program};
use crate::reduce::{reduce, Reduction};
use crate::rename::VarSource;
use crate::rng::Rng;
use crate::store::Bindings;
use crate::term::TermStore;
use crate::unify::VarSet;
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

#[cfg(feature = "tracing")]
use crate::trace::trace;

/// Configuration for the parallel driver.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// PRNG seed for pool/rule selection. Runs default to entropy;
    /// tests fix it.
    pub seed: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            seed: Rng::entropy_seed(),
        }
    }
}

/// Get number of CPUs (fallback to 1).
fn num_cpus() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Run counters. Workers bump `reductions`; the coordinator owns the
/// rest. Relaxed ordering is fine, these are diagnostics.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    pub dispatched: AtomicU64,
    pub builtin_steps: AtomicU64,
    pub reductions: AtomicU64,
    pub commits: AtomicU64,
    pub conflicts: AtomicU64,
    pub failures: AtomicU64,
    pub suspensions: AtomicU64,
    pub wakeups: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStatsSnapshot {
    pub dispatched: u64,
    pub builtin_steps: u64,
    pub reductions: u64,
    pub commits: u64,
    pub conflicts: u64,
    pub failures: u64,
    pub suspensions: u64,
    pub wakeups: u64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SchedulerStatsSnapshot {
        SchedulerStatsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            builtin_steps: self.builtin_steps.load(Ordering::Relaxed),
            reductions: self.reductions.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            suspensions: self.suspensions.load(Ordering::Relaxed),
            wakeups: self.wakeups.load(Ordering::Relaxed),
        }
    }
}

/// One unit of work shipped to a worker: the process plus an immutable
/// snapshot of the store at dispatch time.
struct WorkItem {
    snapshot: Bindings,
    process: Process,
}

/// A worker's verdict, sent back as a plain value; the coordinator is
/// the only party that touches the live store.
enum WorkReply {
    Commit {
        process: Process,
        updates: Bindings,
        body: Vec<Process>,
    },
    Failed,
    Suspended {
        process: Process,
        vars: VarSet,
    },
}

/// The parallel driver: a coordinator that exclusively owns the store,
/// the pool, and the suspension table, plus N workers that reduce
/// against snapshots and share no mutable state.
///
/// Single assignment makes the conflict check on commit the only safety
/// net needed: a delta computed against a stale snapshot either still
/// inserts only new keys (apply it) or would overwrite (reject it whole
/// and re-run the process, which is progress because the store is
/// monotone).
pub struct Scheduler {
    terms: Arc<TermStore>,
    program: Arc<Program>,
    builtins: Arc<BuiltinTable>,
    vars: Arc<VarSource>,
    config: SchedulerConfig,
    stats: Arc<SchedulerStats>,
}

impl Scheduler {
    pub fn new(
        terms: Arc<TermStore>,
        program: Arc<Program>,
        builtins: Arc<BuiltinTable>,
        vars: Arc<VarSource>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            terms,
            program,
            builtins,
            vars,
            config,
            stats: Arc::new(SchedulerStats::new()),
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        Arc::clone(&self.stats)
    }

    /// Run the initial processes to quiescence across the worker pool.
    pub fn run(&self, initial: Vec<Process>) -> Result<RunOutcome, ProgramError> {
        let workers = self.config.workers.max(1);
        // Work is bounded at the worker count so the coordinator blocks
        // once everyone is busy; replies are unbounded so workers never
        // block on send (that pairing cannot deadlock).
        let (work_tx, work_rx) = crossbeam_channel::bounded::<WorkItem>(workers);
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<WorkReply>();

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let work_rx = work_rx.clone();
            let reply_tx = reply_tx.clone();
            let program = Arc::clone(&self.program);
            let vars = Arc::clone(&self.vars);
            let terms = Arc::clone(&self.terms);
            let stats = Arc::clone(&self.stats);
            let rng = Rng::stream(self.config.seed, i as u64);
            handles.push(thread::spawn(move || {
                worker_loop(work_rx, reply_tx, program, vars, terms, stats, rng)
            }));
        }
        drop(work_rx);
        drop(reply_tx);

        let result = self.coordinate(&work_tx, &reply_rx, initial);

        // Closing the work channel ends the worker loops.
        drop(work_tx);
        for handle in handles {
            let _ = handle.join();
        }
        result
    }

    /// The coordinator loop. Owns the store/pool/suspensions for the
    /// whole run; `in_flight` counts dispatched work not yet applied,
    /// and is decremented only after a reply is fully applied, so
    /// "pool empty and nothing in flight" is a safe termination point.
    fn coordinate(
        &self,
        work_tx: &Sender<WorkItem>,
        reply_rx: &Receiver<WorkReply>,
        initial: Vec<Process>,
    ) -> Result<RunOutcome, ProgramError> {
        let mut store = Bindings::new();
        let mut pool = Pool::new();
        let mut suspensions = SuspensionTable::new();
        let mut rng = Rng::new(self.config.seed);
        let mut in_flight = 0usize;

        for p in initial {
            pool.put(p);
        }

        loop {
            // Apply whatever has finished before dispatching more, so
            // wakeups and spawns land in the pool as early as possible.
            while let Ok(reply) = reply_rx.try_recv() {
                self.apply_reply(reply, &mut store, &mut suspensions, &mut pool);
                in_flight -= 1;
            }

            match pool.take(&mut rng) {
                Some(p) => {
                    if let Some(f) = self.builtins.lookup(p.functor) {
                        // Built-ins are cheap and touch the store: run
                        // them inline against the live bindings.
                        SchedulerStats::bump(&self.stats.builtin_steps);
                        let outcome = f(&store, &p, &self.terms)?;
                        self.count_outcome(&outcome);
                        let woken =
                            apply_outcome(p, outcome, &mut store, &mut suspensions, &mut pool);
                        for _ in 0..woken {
                            SchedulerStats::bump(&self.stats.wakeups);
                        }
                        continue;
                    }
                    SchedulerStats::bump(&self.stats.dispatched);
                    let item = WorkItem {
                        snapshot: store.clone(),
                        process: p,
                    };
                    if work_tx.send(item).is_err() {
                        break; // workers gone; only reachable on teardown
                    }
                    in_flight += 1;
                }
                None => {
                    if in_flight == 0 {
                        break;
                    }
                    match reply_rx.recv() {
                        Ok(reply) => {
                            self.apply_reply(reply, &mut store, &mut suspensions, &mut pool);
                            in_flight -= 1;
                        }
                        Err(_) => break,
                    }
                }
            }
        }

        let deadlocked = !suspensions.is_empty();
        Ok(RunOutcome {
            bindings: store,
            deadlocked,
            suspended: suspensions.into_processes(),
        })
    }

    fn apply_reply(
        &self,
        reply: WorkReply,
        store: &mut Bindings,
        suspensions: &mut SuspensionTable,
        pool: &mut Pool,
    ) {
        match reply {
            WorkReply::Commit {
                process,
                updates,
                body,
            } => {
                if store.conflicts_with(&updates) {
                    // Computed against a snapshot that has since been
                    // extended; re-running against the newer store is
                    // always progress or a definite suspension.
                    SchedulerStats::bump(&self.stats.conflicts);
                    #[cfg(feature = "tracing")]
                    trace!("stale_commit_rejected");
                    pool.put(process);
                    return;
                }
                SchedulerStats::bump(&self.stats.commits);
                let woken = commit_and_wake(store, updates, suspensions, pool);
                for _ in 0..woken {
                    SchedulerStats::bump(&self.stats.wakeups);
                }
                for p in body {
                    pool.put(p);
                }
            }
            WorkReply::Failed => SchedulerStats::bump(&self.stats.failures),
            WorkReply::Suspended { process, vars } => {
                // The suspension was computed against a snapshot. If one
                // of the variables has been bound since, its wakeup has
                // already run; parking now would sleep forever.
                if vars.iter().any(|v| store.contains(*v)) {
                    SchedulerStats::bump(&self.stats.conflicts);
                    pool.put(process);
                    return;
                }
                SchedulerStats::bump(&self.stats.suspensions);
                suspensions.block(process, &vars);
            }
        }
    }

    fn count_outcome(&self, outcome: &Reduction) {
        match outcome {
            Reduction::Commit { .. } => SchedulerStats::bump(&self.stats.commits),
            Reduction::Failed => SchedulerStats::bump(&self.stats.failures),
            Reduction::Suspended(_) => SchedulerStats::bump(&self.stats.suspensions),
        }
    }
}

fn worker_loop(
    work_rx: Receiver<WorkItem>,
    reply_tx: Sender<WorkReply>,
    program: Arc<Program>,
    vars: Arc<VarSource>,
    terms: Arc<TermStore>,
    stats: Arc<SchedulerStats>,
    mut rng: Rng,
) {
    for item in work_rx.iter() {
        SchedulerStats::bump(&stats.reductions);
        let candidates = program.candidates(item.process.functor, item.process.arity());
        let outcome = reduce(
            &item.snapshot,
            &item.process,
            &program,
            candidates,
            &vars,
            &mut rng,
            &terms,
        );
        let reply = match outcome {
            Reduction::Commit { updates, body } => WorkReply::Commit {
                process: item.process,
                updates,
                body,
            },
            Reduction::Failed => WorkReply::Failed,
            Reduction::Suspended(vars) => WorkReply::Suspended {
                process: item.process,
                vars,
            },
        };
        if reply_tx.send(reply).is_err() {
            break;
        }
    }
}
