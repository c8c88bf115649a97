use crate::program::Process;
use crate::reduce::Reduction;
use crate::store::Bindings;
use crate::symbol::{Builtins, FuncId, SymbolStore};
use crate::term::{format_term, Term, TermStore};
use crate::unify::{note_var, VarSet};
use hashbrown::HashMap;
use std::fmt;

/// An ill-formed program was detected at run time. Unlike `Failed`, these
/// are unrecoverable: the run aborts with diagnostic context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// A built-in required an unbound variable in some position but the
    /// argument walked to something else.
    ExpectedVariable { builtin: String, found: String },
    /// A built-in was applied at the wrong arity.
    BadArity {
        builtin: String,
        expected: usize,
        found: usize,
    },
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramError::ExpectedVariable { builtin, found } => {
                write!(f, "{builtin}: expected an unbound variable but got {found}")
            }
            ProgramError::BadArity {
                builtin,
                expected,
                found,
            } => write!(f, "{builtin}: expected {expected} arguments but got {found}"),
        }
    }
}

impl std::error::Error for ProgramError {}

/// A built-in process executor. Same outcome contract as rule reduction,
/// so the drivers dispatch uniformly; built-ins run inline on the
/// coordinator against the live store and therefore never see snapshots.
pub type BuiltinFn = fn(&Bindings, &Process, &TermStore) -> Result<Reduction, ProgramError>;

/// The registry of built-in functors. Fixed after construction in the
/// drivers, but `register` is the extension hook for embedders.
#[derive(Clone)]
pub struct BuiltinTable {
    table: HashMap<FuncId, BuiltinFn>,
}

impl BuiltinTable {
    /// The core registry: `:=` and `isplus`.
    pub fn core(symbols: &SymbolStore) -> Self {
        let ids = Builtins::intern(symbols);
        let mut table: HashMap<FuncId, BuiltinFn> = HashMap::new();
        table.insert(ids.assign, assign);
        table.insert(ids.isplus, isplus);
        Self { table }
    }

    /// Register an additional built-in under `functor`.
    pub fn register(&mut self, functor: FuncId, f: BuiltinFn) {
        self.table.insert(functor, f);
    }

    /// Look up the executor for a functor, if it is predefined.
    pub fn lookup(&self, functor: FuncId) -> Option<BuiltinFn> {
        self.table.get(&functor).copied()
    }

    /// Whether a functor is predefined.
    pub fn is_builtin(&self, functor: FuncId) -> bool {
        self.table.contains_key(&functor)
    }
}

fn expect_arity(builtin: &str, p: &Process, expected: usize) -> Result<(), ProgramError> {
    if p.arity() != expected {
        return Err(ProgramError::BadArity {
            builtin: builtin.to_string(),
            expected,
            found: p.arity(),
        });
    }
    Ok(())
}

/// `X := Y`: bind X (which must walk to an unbound variable) to the
/// walked value of Y. Never suspends.
fn assign(base: &Bindings, p: &Process, terms: &TermStore) -> Result<Reduction, ProgramError> {
    expect_arity(":=", p, 2)?;
    let x = base.walk(p.args[0], terms);
    let Some(Term::Var(var)) = terms.resolve(x) else {
        return Err(ProgramError::ExpectedVariable {
            builtin: ":=".to_string(),
            found: format_term(x, terms),
        });
    };
    let y = base.walk(p.args[1], terms);
    let mut updates = Bindings::new();
    // X := X after walking both sides: nothing to record. Binding here
    // would put a 1-cycle in the store.
    if y != x {
        updates.bind(var, y);
    }
    Ok(Reduction::Commit {
        updates,
        body: Vec::new(),
    })
}

/// `isplus(X, Y, Z)`: X is Y + Z. X must walk to an unbound variable;
/// Y and Z must walk to integers, suspending on whichever is still a
/// variable and failing hard on any other term.
fn isplus(base: &Bindings, p: &Process, terms: &TermStore) -> Result<Reduction, ProgramError> {
    expect_arity("isplus", p, 3)?;
    let x = base.walk(p.args[0], terms);
    let Some(Term::Var(var)) = terms.resolve(x) else {
        return Err(ProgramError::ExpectedVariable {
            builtin: "isplus".to_string(),
            found: format_term(x, terms),
        });
    };
    let y = base.walk(p.args[1], terms);
    let z = base.walk(p.args[2], terms);

    let mut waiting = VarSet::new();
    if let Some(Term::Var(v)) = terms.resolve(y) {
        note_var(&mut waiting, v);
    }
    if let Some(Term::Var(v)) = terms.resolve(z) {
        note_var(&mut waiting, v);
    }
    if !waiting.is_empty() {
        return Ok(Reduction::Suspended(waiting));
    }

    let (Some(Term::Int(a)), Some(Term::Int(b))) = (terms.resolve(y), terms.resolve(z)) else {
        return Ok(Reduction::Failed);
    };
    let mut updates = Bindings::new();
    updates.bind(var, terms.int(a.wrapping_add(b)));
    Ok(Reduction::Commit {
        updates,
        body: Vec::new(),
    })
}
