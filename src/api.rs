//! Public interface: load a program, parse queries, run them under
//! either driver, and read results back by query-variable name.

use std::sync::Arc;

use crate::builtins::{BuiltinFn, BuiltinTable, ProgramError};
use crate::machine::{Machine, RunOutcome};
use crate::parser::{self, ParseError};
use crate::program::{Process, Program};
use crate::rename::VarSource;
use crate::rng::Rng;
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::symbol::SymbolStore;
use crate::term::{format_term, TermStore, VarId};

/// Which driver executes the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleThreaded,
    Parallel { workers: usize },
}

/// A parsed query: its processes plus the name -> variable map for
/// reading results back out of the final store.
#[derive(Debug, Clone)]
pub struct Query {
    pub processes: Vec<Process>,
    vars: Vec<(String, VarId)>,
}

impl Query {
    /// Look up a query variable by its source name.
    pub fn var(&self, name: &str) -> Option<VarId> {
        self.vars
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// All query variables in allocation order.
    pub fn vars(&self) -> &[(String, VarId)] {
        &self.vars
    }
}

/// An interpreter instance: the shared stores, the fixed program, and
/// the built-in registry. Queries can be run repeatedly; every run gets
/// its own store.
impl std::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreter").finish_non_exhaustive()
    }
}

pub struct Interpreter {
    symbols: Arc<SymbolStore>,
    terms: Arc<TermStore>,
    program: Arc<Program>,
    builtins: BuiltinTable,
    vars: Arc<VarSource>,
    seed: Option<u64>,
}

impl Interpreter {
    /// Load a program from FGHC source text.
    pub fn from_source(src: &str) -> Result<Self, ParseError> {
        let symbols = Arc::new(SymbolStore::new());
        let terms = Arc::new(TermStore::new());
        let rules = parser::parse_rules(src, &symbols, &terms)?;
        let builtins = BuiltinTable::core(&symbols);
        Ok(Self {
            program: Arc::new(Program::new(rules)),
            builtins,
            vars: Arc::new(VarSource::new()),
            seed: None,
            symbols,
            terms,
        })
    }

    /// Fix the scheduling seed, making pool and rule selection
    /// reproducible across runs. Without this, every run draws a fresh
    /// seed from the clock.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Register an additional built-in under `name`, with the same
    /// outcome contract as the core built-ins.
    pub fn register_builtin(&mut self, name: &str, f: BuiltinFn) {
        let functor = self.symbols.intern(name);
        self.builtins.register(functor, f);
    }

    /// Parse a comma-separated query against this interpreter's stores.
    pub fn parse_query(&self, src: &str) -> Result<Query, ParseError> {
        let (processes, vars) =
            parser::parse_processes(src, &self.symbols, &self.terms, &self.vars)?;
        Ok(Query { processes, vars })
    }

    /// Run a multiset of initial processes to quiescence.
    pub fn run(&self, initial: Vec<Process>, mode: Mode) -> Result<RunOutcome, ProgramError> {
        let seed = self.seed.unwrap_or_else(Rng::entropy_seed);
        let builtins = Arc::new(self.builtins.clone());
        match mode {
            Mode::SingleThreaded => Machine::new(
                Arc::clone(&self.terms),
                Arc::clone(&self.program),
                builtins,
                Arc::clone(&self.vars),
                seed,
            )
            .run(initial),
            Mode::Parallel { workers } => Scheduler::new(
                Arc::clone(&self.terms),
                Arc::clone(&self.program),
                builtins,
                Arc::clone(&self.vars),
                SchedulerConfig { workers, seed },
            )
            .run(initial),
        }
    }

    /// Render a query variable's final value.
    pub fn display(&self, outcome: &RunOutcome, var: VarId) -> String {
        format_term(outcome.resolve(var, &self.terms), &self.terms)
    }

    pub fn terms(&self) -> &TermStore {
        &self.terms
    }

    pub fn symbols(&self) -> &SymbolStore {
        &self.symbols
    }
}
