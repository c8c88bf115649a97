//! Parser for the FGHC surface syntax.
//!
//! Syntax:
//! - `head(args) :- guards | body.` - rule; the bar separates guards
//!   from body and is omitted when there are no guards
//! - `expr == expr`, `expr =\= expr` - guards
//! - `[a, b, c]`, `[H|T]`, `[]` - lists
//! - `X := expr` - assignment built-in, infix
//! - `X is Y + Z` - sugar for `isplus(X, Y, Z)`
//! - `_` - wildcard; `true` / `false` - boolean constants
//! - `% ...` - line comment
//!
//! Variables start with an uppercase letter (or `_` plus a name), atoms
//! with a lowercase letter. Variables in a rule are template-local and
//! numbered by first occurrence; query variables are allocated from the
//! interpreter's global fresh source.

use crate::program::{Guard, GuardOp, Process, Rule};
use crate::rename::VarSource;
use crate::symbol::SymbolStore;
use crate::term::{TermId, TermStore, VarId};
use hashbrown::HashMap;

/// Parse error with the byte position it was raised at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "parse error at byte {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Bar,
    Comma,
    Period,
    Plus,
    Turnstile,
    Assign,
    Is,
    Eq,
    Neq,
    Int(i64),
    Var(String),
    Atom(String),
    Wildcard,
    True,
    False,
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::OpenParen => "'('".into(),
        Tok::CloseParen => "')'".into(),
        Tok::OpenBracket => "'['".into(),
        Tok::CloseBracket => "']'".into(),
        Tok::Bar => "'|'".into(),
        Tok::Comma => "','".into(),
        Tok::Period => "'.'".into(),
        Tok::Plus => "'+'".into(),
        Tok::Turnstile => "':-'".into(),
        Tok::Assign => "':='".into(),
        Tok::Is => "'is'".into(),
        Tok::Eq => "'=='".into(),
        Tok::Neq => "'=\\='".into(),
        Tok::Int(n) => format!("integer {n}"),
        Tok::Var(name) => format!("variable {name}"),
        Tok::Atom(name) => format!("atom {name}"),
        Tok::Wildcard => "'_'".into(),
        Tok::True => "'true'".into(),
        Tok::False => "'false'".into(),
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    tok: Tok,
    at: usize,
}

fn tokenize(src: &str) -> Result<Vec<Spanned>, ParseError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;

    let punct = |c: char| -> Option<Tok> {
        match c {
            '(' => Some(Tok::OpenParen),
            ')' => Some(Tok::CloseParen),
            '[' => Some(Tok::OpenBracket),
            ']' => Some(Tok::CloseBracket),
            '|' => Some(Tok::Bar),
            ',' => Some(Tok::Comma),
            '.' => Some(Tok::Period),
            '+' => Some(Tok::Plus),
            _ => None,
        }
    };

    while i < chars.len() {
        let (at, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '%' {
            while i < chars.len() && chars[i].1 != '\n' {
                i += 1;
            }
            continue;
        }
        if let Some(tok) = punct(c) {
            out.push(Spanned { tok, at });
            i += 1;
            continue;
        }
        if c == ':' {
            match chars.get(i + 1).map(|&(_, c)| c) {
                Some('-') => out.push(Spanned {
                    tok: Tok::Turnstile,
                    at,
                }),
                Some('=') => out.push(Spanned {
                    tok: Tok::Assign,
                    at,
                }),
                _ => {
                    return Err(ParseError {
                        message: "expected ':-' or ':='".to_string(),
                        position: at,
                    })
                }
            }
            i += 2;
            continue;
        }
        if c == '=' {
            if chars.get(i + 1).map(|&(_, c)| c) == Some('=') {
                out.push(Spanned { tok: Tok::Eq, at });
                i += 2;
                continue;
            }
            if chars.get(i + 1).map(|&(_, c)| c) == Some('\\')
                && chars.get(i + 2).map(|&(_, c)| c) == Some('=')
            {
                out.push(Spanned { tok: Tok::Neq, at });
                i += 3;
                continue;
            }
            return Err(ParseError {
                message: "expected '==' or '=\\='".to_string(),
                position: at,
            });
        }
        if c.is_ascii_digit() {
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            let end = chars.get(i).map(|&(p, _)| p).unwrap_or(src.len());
            let text = &src[at..end];
            let n: i64 = text.parse().map_err(|_| ParseError {
                message: format!("integer literal {text} out of range"),
                position: at,
            })?;
            out.push(Spanned {
                tok: Tok::Int(n),
                at,
            });
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let end = chars.get(i).map(|&(p, _)| p).unwrap_or(src.len());
            let text = &src[at..end];
            let tok = match text {
                "_" => Tok::Wildcard,
                "is" => Tok::Is,
                "true" => Tok::True,
                "false" => Tok::False,
                _ if text.starts_with(|c: char| c.is_uppercase() || c == '_') => {
                    Tok::Var(text.to_string())
                }
                _ => Tok::Atom(text.to_string()),
            };
            out.push(Spanned { tok, at });
            continue;
        }
        return Err(ParseError {
            message: format!("unexpected character '{c}'"),
            position: at,
        });
    }
    Ok(out)
}

/// Where a parse draws its variables from: rules number their variables
/// locally from zero (templates are renamed per activation anyway),
/// queries allocate real variables from the interpreter's fresh source.
enum VarAlloc<'a> {
    Template { next: u64 },
    Global(&'a VarSource),
}

impl VarAlloc<'_> {
    fn fresh(&mut self) -> VarId {
        match self {
            VarAlloc::Template { next } => {
                let v = VarId(*next);
                *next += 1;
                v
            }
            VarAlloc::Global(source) => source.fresh(),
        }
    }
}

struct Parser<'a> {
    toks: Vec<Spanned>,
    pos: usize,
    end: usize,
    symbols: &'a SymbolStore,
    terms: &'a TermStore,
    scope: HashMap<String, VarId>,
    alloc: VarAlloc<'a>,
}

impl<'a> Parser<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.toks.len()
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|s| &s.tok)
    }

    fn peek_at(&self, n: usize) -> Option<&Tok> {
        self.toks.get(self.pos + n).map(|s| &s.tok)
    }

    fn here(&self) -> usize {
        self.toks
            .get(self.pos)
            .map(|s| s.at)
            .unwrap_or(self.end)
    }

    fn fail(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.here(),
        }
    }

    fn advance(&mut self) -> Option<Tok> {
        let tok = self.toks.get(self.pos).map(|s| s.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: &Tok) -> Result<(), ParseError> {
        match self.peek() {
            Some(tok) if tok == want => {
                self.pos += 1;
                Ok(())
            }
            Some(tok) => Err(self.fail(format!(
                "expected {} but found {}",
                describe(want),
                describe(tok)
            ))),
            None => Err(self.fail(format!("expected {} but found end of input", describe(want)))),
        }
    }

    fn eat(&mut self, want: &Tok) -> bool {
        if self.peek() == Some(want) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // ----- grammar -----

    fn rule(&mut self) -> Result<Rule, ParseError> {
        // Each rule is its own variable scope, numbered from zero.
        self.scope.clear();
        if let VarAlloc::Template { next } = &mut self.alloc {
            *next = 0;
        }
        let head = self.process()?;
        self.expect(&Tok::Turnstile)?;
        let guards = self.guards()?;
        let mut body = vec![self.process()?];
        loop {
            if self.eat(&Tok::Period) {
                return Ok(Rule { head, guards, body });
            }
            self.expect(&Tok::Comma)?;
            body.push(self.process()?);
        }
    }

    /// Speculatively parse `expr ==/=\= expr` guards; if the section is
    /// non-empty it must be closed by the commit bar.
    fn guards(&mut self) -> Result<Vec<Guard>, ParseError> {
        let mut guards = Vec::new();
        loop {
            let save = self.pos;
            let lhs = match self.expression() {
                Ok(e) => e,
                Err(_) => {
                    self.pos = save;
                    break;
                }
            };
            let op = match self.peek() {
                Some(Tok::Eq) => GuardOp::Equal,
                Some(Tok::Neq) => GuardOp::NotEqual,
                _ => {
                    self.pos = save;
                    break;
                }
            };
            self.pos += 1;
            let rhs = self.expression()?;
            guards.push(Guard { op, lhs, rhs });
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        if !guards.is_empty() {
            self.expect(&Tok::Bar)?;
        }
        Ok(guards)
    }

    fn process(&mut self) -> Result<Process, ParseError> {
        if matches!(self.peek(), Some(Tok::Atom(_)))
            && matches!(self.peek_at(1), Some(Tok::OpenParen))
        {
            let Some(Tok::Atom(name)) = self.advance() else {
                unreachable!("peeked an atom");
            };
            let functor = self.symbols.intern(&name);
            self.expect(&Tok::OpenParen)?;
            let mut args = vec![self.expression()?];
            loop {
                if self.eat(&Tok::CloseParen) {
                    return Ok(Process::new(functor, args));
                }
                self.expect(&Tok::Comma)?;
                args.push(self.expression()?);
            }
        }
        self.infix_process()
    }

    /// `X := E` and `X is Y + Z` (the latter desugars to isplus).
    fn infix_process(&mut self) -> Result<Process, ParseError> {
        let lhs = self.expression()?;
        match self.peek() {
            Some(Tok::Assign) => {
                self.pos += 1;
                let rhs = self.expression()?;
                Ok(Process::new(self.symbols.intern(":="), [lhs, rhs]))
            }
            Some(Tok::Is) => {
                self.pos += 1;
                let y = self.expression()?;
                self.expect(&Tok::Plus)?;
                let z = self.expression()?;
                Ok(Process::new(self.symbols.intern("isplus"), [lhs, y, z]))
            }
            _ => Err(self.fail("expected ':=' or 'is' after expression")),
        }
    }

    fn expression(&mut self) -> Result<TermId, ParseError> {
        match self.peek().cloned() {
            Some(Tok::Int(n)) => {
                self.pos += 1;
                Ok(self.terms.int(n))
            }
            Some(Tok::Wildcard) => {
                self.pos += 1;
                Ok(self.terms.wildcard())
            }
            Some(Tok::True) => {
                self.pos += 1;
                Ok(self.terms.boolean(true))
            }
            Some(Tok::False) => {
                self.pos += 1;
                Ok(self.terms.boolean(false))
            }
            Some(Tok::Var(name)) => {
                self.pos += 1;
                let id = match self.scope.get(&name) {
                    Some(&v) => v,
                    None => {
                        let v = self.alloc.fresh();
                        self.scope.insert(name, v);
                        v
                    }
                };
                Ok(self.terms.var(id))
            }
            Some(Tok::OpenBracket) => self.list(),
            Some(tok) => Err(self.fail(format!("expected an expression, found {}", describe(&tok)))),
            None => Err(self.fail("expected an expression, found end of input")),
        }
    }

    fn list(&mut self) -> Result<TermId, ParseError> {
        self.expect(&Tok::OpenBracket)?;
        if self.eat(&Tok::CloseBracket) {
            return Ok(self.terms.nil());
        }
        let mut items = vec![self.expression()?];
        while self.eat(&Tok::Comma) {
            items.push(self.expression()?);
        }
        let tail = if self.eat(&Tok::Bar) {
            self.expression()?
        } else {
            self.terms.nil()
        };
        self.expect(&Tok::CloseBracket)?;
        Ok(self.terms.list(&items, tail))
    }
}

/// Parse a rule file into the program's rule list.
pub fn parse_rules(
    src: &str,
    symbols: &SymbolStore,
    terms: &TermStore,
) -> Result<Vec<Rule>, ParseError> {
    let toks = tokenize(src)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        end: src.len(),
        symbols,
        terms,
        scope: HashMap::new(),
        alloc: VarAlloc::Template { next: 0 },
    };
    let mut rules = Vec::new();
    while !parser.at_end() {
        rules.push(parser.rule()?);
    }
    Ok(rules)
}

/// Parse a comma-separated query into processes, drawing its variables
/// from the global fresh source. Returns the processes plus the
/// name-to-variable map (ordered by allocation) so callers can walk the
/// results.
pub fn parse_processes(
    src: &str,
    symbols: &SymbolStore,
    terms: &TermStore,
    vars: &VarSource,
) -> Result<(Vec<Process>, Vec<(String, VarId)>), ParseError> {
    let toks = tokenize(src)?;
    let mut parser = Parser {
        toks,
        pos: 0,
        end: src.len(),
        symbols,
        terms,
        scope: HashMap::new(),
        alloc: VarAlloc::Global(vars),
    };
    let mut processes = Vec::new();
    while !parser.at_end() {
        processes.push(parser.process()?);
        if parser.at_end() {
            break;
        }
        parser.expect(&Tok::Comma)?;
    }
    let mut names: Vec<(String, VarId)> = parser
        .scope
        .into_iter()
        .collect();
    names.sort_by_key(|(_, v)| *v);
    Ok((processes, names))
}
