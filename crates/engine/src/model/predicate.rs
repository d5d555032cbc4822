//! Conditional-field predicates (spec §4.2): side-effect-free boolean
//! expressions over sibling/ancestor integer values, constant names, `&`,
//! `==`, `!=`, and parentheses, evaluated with 64-bit unsigned arithmetic.
//!
//! A small hand-written recursive-descent parser, not a regex tokenizer —
//! the grammar is mutually recursive (parenthesized sub-expressions) and
//! regexes aren't a good fit for that.

use std::collections::HashMap;
use std::fmt;

use super::path::{ArgPath, PathSeg};

/// An integer-valued sub-expression: a sibling/ancestor value lookup, a
/// named constant, a literal, or a bitwise-and of two sub-expressions.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    Value(ArgPath),
    Const(String),
    Literal(u64),
    BitAnd(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
}

/// A parsed predicate: either a comparison between two expressions, or a
/// bare expression whose truthiness (nonzero) is the predicate's value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Predicate {
    Cmp(Expr, CmpOp, Expr),
    Truthy(Expr),
}

#[derive(Debug, Clone)]
pub struct PredicateError(pub String);

impl fmt::Display for PredicateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "predicate parse error: {}", self.0)
    }
}

impl Predicate {
    pub fn parse(src: &str) -> Result<Predicate, PredicateError> {
        let tokens = tokenize(src)?;
        let mut p = Parser { tokens: &tokens, pos: 0 };
        let pred = p.parse_predicate()?;
        if p.pos != p.tokens.len() {
            return Err(PredicateError(format!("trailing tokens in {src:?}")));
        }
        Ok(pred)
    }

    /// Evaluate against a sibling-value table (path -> current u64 value)
    /// and a named-constant table, per spec §4.2.
    pub fn eval(&self, values: &HashMap<ArgPath, u64>, consts: &HashMap<String, u64>) -> bool {
        match self {
            Predicate::Cmp(a, op, b) => {
                let av = a.eval(values, consts);
                let bv = b.eval(values, consts);
                match op {
                    CmpOp::Eq => av == bv,
                    CmpOp::Ne => av != bv,
                }
            }
            Predicate::Truthy(e) => e.eval(values, consts) != 0,
        }
    }
}

impl Expr {
    fn eval(&self, values: &HashMap<ArgPath, u64>, consts: &HashMap<String, u64>) -> u64 {
        match self {
            Expr::Value(path) => values.get(path).copied().unwrap_or(0),
            Expr::Const(name) => consts.get(name).copied().unwrap_or(0),
            Expr::Literal(v) => *v,
            Expr::BitAnd(a, b) => a.eval(values, consts) & b.eval(values, consts),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    Amp,
    EqEq,
    NotEq,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, PredicateError> {
    let bytes = src.as_bytes();
    let mut i = 0;
    let mut out = Vec::new();
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                out.push(Token::LParen);
                i += 1;
            }
            ')' => {
                out.push(Token::RParen);
                i += 1;
            }
            '&' => {
                out.push(Token::Amp);
                i += 1;
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                out.push(Token::EqEq);
                i += 2;
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                out.push(Token::NotEq);
                i += 2;
            }
            _ if c.is_ascii_digit() => {
                let start = i;
                while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                    i += 1;
                }
                let n: u64 = src[start..i]
                    .parse()
                    .map_err(|_| PredicateError(format!("bad integer literal in {src:?}")))?;
                out.push(Token::Number(n));
            }
            _ if c.is_ascii_alphabetic() || c == '_' || c == '-' || c == '>' => {
                let start = i;
                while i < bytes.len() && {
                    let c = bytes[i] as char;
                    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '>'
                } {
                    i += 1;
                }
                out.push(Token::Ident(src[start..i].to_string()));
            }
            _ => return Err(PredicateError(format!("unexpected character {c:?} in {src:?}"))),
        }
    }
    Ok(out)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_predicate(&mut self) -> Result<Predicate, PredicateError> {
        let lhs = self.parse_bitand()?;
        match self.peek() {
            Some(Token::EqEq) => {
                self.bump();
                let rhs = self.parse_bitand()?;
                Ok(Predicate::Cmp(lhs, CmpOp::Eq, rhs))
            }
            Some(Token::NotEq) => {
                self.bump();
                let rhs = self.parse_bitand()?;
                Ok(Predicate::Cmp(lhs, CmpOp::Ne, rhs))
            }
            _ => Ok(Predicate::Truthy(lhs)),
        }
    }

    fn parse_bitand(&mut self) -> Result<Expr, PredicateError> {
        let mut lhs = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::Amp)) {
            self.bump();
            let rhs = self.parse_atom()?;
            lhs = Expr::BitAnd(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_atom(&mut self) -> Result<Expr, PredicateError> {
        match self.bump() {
            Some(Token::LParen) => {
                let inner = self.parse_bitand()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    other => Err(PredicateError(format!("expected ')', found {other:?}"))),
                }
            }
            Some(Token::Number(n)) => Ok(Expr::Literal(*n)),
            Some(Token::Ident(name)) => {
                if name.starts_with('-') {
                    Ok(Expr::Value(path_from_str(name)))
                } else {
                    Ok(Expr::Const(name.clone()))
                }
            }
            other => Err(PredicateError(format!("expected operand, found {other:?}"))),
        }
    }
}

/// Parse the engine's own `-f0-f2-3>`-style path syntax (emitted by
/// `ArgPath`'s `Display`, never free text from a user).
fn path_from_str(s: &str) -> ArgPath {
    let mut path = ArgPath::default();
    for part in s.split('-').filter(|p| !p.is_empty()) {
        let part = part.trim_end_matches('>');
        if let Some(rest) = part.strip_prefix('f') {
            if let Ok(idx) = rest.parse::<usize>() {
                path = path.child(PathSeg::Field(idx));
                continue;
            }
        }
        if let Ok(idx) = part.parse::<usize>() {
            path = path.child(PathSeg::Elem(idx));
        }
    }
    if s.ends_with('>') {
        path = path.child(PathSeg::Deref);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_equality() {
        let p = Predicate::parse("flags == 1").unwrap();
        assert_eq!(p, Predicate::Cmp(Expr::Const("flags".into()), CmpOp::Eq, Expr::Literal(1)));
    }

    #[test]
    fn parses_bitand_as_truthy() {
        let p = Predicate::parse("flags & 2").unwrap();
        assert_eq!(
            p,
            Predicate::Truthy(Expr::BitAnd(Box::new(Expr::Const("flags".into())), Box::new(Expr::Literal(2))))
        );
    }

    #[test]
    fn parses_bitand_compared() {
        let p = Predicate::parse("(flags & 2) == 2").unwrap();
        assert_eq!(
            p,
            Predicate::Cmp(
                Expr::BitAnd(Box::new(Expr::Const("flags".into())), Box::new(Expr::Literal(2))),
                CmpOp::Eq,
                Expr::Literal(2)
            )
        );
    }

    #[test]
    fn evaluates_equality_true_and_false() {
        let p = Predicate::parse("kind == 1").unwrap();
        let mut consts = HashMap::new();
        consts.insert("kind".to_string(), 1u64);
        assert!(p.eval(&HashMap::new(), &consts));
        consts.insert("kind".to_string(), 2u64);
        assert!(!p.eval(&HashMap::new(), &consts));
    }

    #[test]
    fn evaluates_masked_comparison() {
        let p = Predicate::parse("(mode & 4) != 0").unwrap();
        let mut consts = HashMap::new();
        consts.insert("mode".to_string(), 4u64);
        assert!(p.eval(&HashMap::new(), &consts));
        consts.insert("mode".to_string(), 3u64);
        assert!(!p.eval(&HashMap::new(), &consts));
    }

    #[test]
    fn resolves_sibling_value_path() {
        let path = ArgPath::root(0);
        let p = Predicate::parse(&format!("{path} == 1")).unwrap();
        let mut values = HashMap::new();
        values.insert(path, 1u64);
        assert!(p.eval(&values, &HashMap::new()));
    }
}
