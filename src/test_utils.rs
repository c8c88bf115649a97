use crate::parser;
use crate::program::{Process, Program};
use crate::rename::VarSource;
use crate::symbol::SymbolStore;
use crate::term::{TermStore, VarId};

pub(crate) const SUM_SRC: &str = "
    sum(L,S) :- sum1(L,0,S).
    sum1([X|Xs],A,S) :- isplus(A1,A,X), sum1(Xs,A1,S).
    sum1([],A,S) :- S := A.
";

pub(crate) const MEMBER_SRC: &str = "
    member(X,[X1|Rest],R) :- X =\\= X1 | member(X,Rest,R).
    member(X,[X1|_],R) :- X == X1 | R := true.
    member(_, [], R) :- R := false.
";

pub(crate) fn parse_program(src: &str, symbols: &SymbolStore, terms: &TermStore) -> Program {
    Program::new(parser::parse_rules(src, symbols, terms).expect("test program parses"))
}

pub(crate) fn parse_query(
    src: &str,
    symbols: &SymbolStore,
    terms: &TermStore,
    vars: &VarSource,
) -> (Vec<Process>, Vec<(String, VarId)>) {
    parser::parse_processes(src, symbols, terms, vars).expect("test query parses")
}
