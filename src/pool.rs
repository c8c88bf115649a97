use crate::program::Process;
use crate::rng::Rng;
use crate::term::VarId;
use hashbrown::HashMap;

/// The multiset of runnable processes.
///
/// Selection order is explicitly nondeterministic: `take` removes a
/// PRNG-chosen element, so programs cannot rely on FIFO or LIFO
/// behavior. This is a semantic requirement of the language, not a
/// scheduling optimization.
#[derive(Debug, Default)]
pub struct Pool {
    runnable: Vec<Process>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, p: Process) {
        self.runnable.push(p);
    }

    /// Remove and return a randomly chosen process, if any.
    pub fn take(&mut self, rng: &mut Rng) -> Option<Process> {
        if self.runnable.is_empty() {
            return None;
        }
        let idx = rng.below(self.runnable.len());
        Some(self.runnable.swap_remove(idx))
    }

    pub fn len(&self) -> usize {
        self.runnable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty()
    }
}

/// Ticket identifying one parked process.
type Ticket = u64;

/// The index from variables to processes blocked awaiting their binding.
///
/// A process blocked on several variables is registered once under a
/// ticket and the ticket is filed under every variable it waits on. The
/// first wake consumes the ticket; entries under sibling variables go
/// stale and are skipped when their key wakes, so a process is
/// re-enqueued exactly once no matter how many of its variables get
/// bound.
#[derive(Debug, Default)]
pub struct SuspensionTable {
    waiting: HashMap<VarId, Vec<Ticket>>,
    parked: HashMap<Ticket, Process>,
    next_ticket: Ticket,
}

impl SuspensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `p` until one of `vars` is bound.
    pub fn block(&mut self, p: Process, vars: &[VarId]) {
        debug_assert!(!vars.is_empty(), "blocking requires at least one variable");
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.parked.insert(ticket, p);
        for &v in vars {
            self.waiting.entry(v).or_default().push(ticket);
        }
    }

    /// Release every process still waiting on `v`.
    pub fn wake(&mut self, v: VarId) -> Vec<Process> {
        let Some(tickets) = self.waiting.remove(&v) else {
            return Vec::new();
        };
        tickets
            .into_iter()
            .filter_map(|t| self.parked.remove(&t))
            .collect()
    }

    /// Number of parked processes.
    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    /// Drain the parked processes, e.g. for deadlock reporting.
    pub fn into_processes(self) -> Vec<Process> {
        self.parked.into_values().collect()
    }
}
