use crate::symbol::{FuncId, SymbolStore};
use crate::term::{format_term, TermId, TermStore};
use hashbrown::HashMap;
use smallvec::SmallVec;

/// An applied functor with argument terms; the unit of scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub functor: FuncId,
    pub args: SmallVec<[TermId; 4]>,
}

impl Process {
    pub fn new(functor: FuncId, args: impl IntoIterator<Item = TermId>) -> Self {
        Self {
            functor,
            args: args.into_iter().collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

/// Render a process as `functor(arg, ...)`, with the infix sugar for `:=`.
pub fn format_process(p: &Process, terms: &TermStore, symbols: &SymbolStore) -> String {
    let name = symbols.resolve(p.functor).unwrap_or("?");
    if name == ":=" && p.arity() == 2 {
        return format!(
            "{} := {}",
            format_term(p.args[0], terms),
            format_term(p.args[1], terms)
        );
    }
    let args: Vec<String> = p.args.iter().map(|&a| format_term(a, terms)).collect();
    format!("{}({})", name, args.join(", "))
}

/// Guard operators: structural equality and disequality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOp {
    Equal,
    NotEqual,
}

/// A side-effect-free check gating a rule commit. Both operands must be
/// fully instantiated at evaluation time; otherwise the rule suspends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guard {
    pub op: GuardOp,
    pub lhs: TermId,
    pub rhs: TermId,
}

/// A rewrite rule `head :- guards | body.`
///
/// Variables in a stored rule are template-local; `rename::fresh_copy`
/// replaces every one of them before the rule takes part in a reduction,
/// so template ids never reach the binding store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub head: Process,
    pub guards: Vec<Guard>,
    pub body: Vec<Process>,
}

/// The fixed rule set, indexed by head functor and arity.
///
/// The rule set never changes after load; reductions only read it.
pub struct Program {
    rules: Vec<Rule>,
    index: HashMap<(FuncId, usize), Vec<usize>>,
}

impl Program {
    pub fn new(rules: Vec<Rule>) -> Self {
        let mut index: HashMap<(FuncId, usize), Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            index
                .entry((rule.head.functor, rule.head.arity()))
                .or_default()
                .push(i);
        }
        Self { rules, index }
    }

    /// Indices of the rules whose head matches `functor`/`arity`.
    /// Candidate order here carries no meaning; the reducer shuffles it.
    pub fn candidates(&self, functor: FuncId, arity: usize) -> &[usize] {
        self.index
            .get(&(functor, arity))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn rule(&self, idx: usize) -> &Rule {
        &self.rules[idx]
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
