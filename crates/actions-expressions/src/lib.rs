//! Parsing and analysis for GitHub Actions expressions.
//!
//! This crate parses the language that appears between `${{` and `}}`
//! fences in GitHub Actions workflows, and provides matching APIs
//! (see [`context::ContextPattern`]) for policy checks over the
//! contexts an expression references.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use pest::{Parser as _, iterators::Pair};

use crate::context::Context;
use crate::parser::{ExprParser, Rule};

pub mod context;
pub mod extract;
mod identifier;
mod literal;
mod op;

pub use identifier::{Function, Identifier};
pub use literal::Literal;
pub use op::{BinOp, UnOp};

// Isolates the generated ExprParser and Rule types so that
// `missing_docs` can be enforced at the top level.
// See: https://github.com/pest-parser/pest/issues/326
mod parser {
    use pest_derive::Parser;

    /// A parser for GitHub Actions' expression language.
    #[derive(Parser)]
    #[grammar = "expr.pest"]
    pub struct ExprParser;
}

/// The error returned when an expression fails to parse.
///
/// The inner message is pest's rendering of the failure; callers that
/// want to treat malformed expressions as literal text should do so
/// before attempting a parse.
#[derive(Debug, thiserror::Error)]
#[error("malformed expression: {0}")]
pub struct ParseError(String);

/// Represents a GitHub Actions expression.
#[derive(Debug, PartialEq)]
pub enum Expr<'src> {
    /// A literal value.
    Literal(Literal<'src>),
    /// The `*` literal within an index or context.
    Star,
    /// A context identifier component, e.g. `github` in `github.actor`.
    Identifier(Identifier<'src>),
    /// A context index component, e.g. `[0]` in `foo[0]`.
    Index(Box<Expr<'src>>),
    /// A full context reference.
    Context(Context<'src>),
    /// A function call.
    Call {
        /// The function name, e.g. `fromJSON` in `fromJSON(x)`.
        func: Function<'src>,
        /// The function's arguments.
        args: Vec<Expr<'src>>,
    },
    /// A binary operation.
    BinOp {
        /// The LHS of the operation.
        lhs: Box<Expr<'src>>,
        /// The operator.
        op: BinOp,
        /// The RHS of the operation.
        rhs: Box<Expr<'src>>,
    },
    /// A unary operation. Negation (`!`) is currently the only one.
    UnOp {
        /// The operator.
        op: UnOp,
        /// The operand.
        expr: Box<Expr<'src>>,
    },
}

impl<'src> Expr<'src> {
    /// Convenience constructor for an [`Expr::Identifier`].
    fn ident(i: &'src str) -> Self {
        Self::Identifier(Identifier(i))
    }

    /// Convenience constructor for a string [`Expr::Literal`].
    fn string(s: impl Into<String>) -> Self {
        Self::Literal(Literal::String(s.into().into()))
    }

    /// Parses the given source into an expression.
    pub fn parse(src: &'src str) -> Result<Expr<'src>, ParseError> {
        // The top-level `expression` is a single `or_expr`.
        let or_expr = ExprParser::parse(Rule::expression, src)
            .map_err(|e| ParseError(e.to_string()))?
            .next()
            .ok_or_else(|| ParseError("empty parse".into()))?
            .into_inner()
            .next()
            .ok_or_else(|| ParseError("empty expression".into()))?;

        Ok(*fold_pair(or_expr))
    }

    /// Returns every context referenced anywhere in this expression,
    /// including inside call arguments and index subexpressions.
    pub fn contexts(&self) -> Vec<&Context<'src>> {
        let mut contexts = vec![];
        self.walk_contexts(&mut contexts);
        contexts
    }

    fn walk_contexts<'a>(&'a self, acc: &mut Vec<&'a Context<'src>>) {
        match self {
            Expr::Context(ctx) => {
                acc.push(ctx);
                for part in &ctx.parts {
                    part.walk_contexts(acc);
                }
            }
            Expr::Call { func: _, args } => {
                for arg in args {
                    arg.walk_contexts(acc);
                }
            }
            Expr::Index(inner) => inner.walk_contexts(acc),
            Expr::BinOp { lhs, op: _, rhs } => {
                lhs.walk_contexts(acc);
                rhs.walk_contexts(acc);
            }
            Expr::UnOp { op: _, expr } => expr.walk_contexts(acc),
            _ => (),
        }
    }

    /// Returns every property name appearing in any context chain in this
    /// expression: dotted identifier parts as well as string-literal
    /// bracket accesses (`foo['bar']` yields `bar`).
    ///
    /// This is the raw material for prototype-pollution checks, so it
    /// deliberately includes the head of each chain.
    pub fn property_names(&self) -> Vec<&str> {
        let mut names = vec![];

        for ctx in self.contexts() {
            for part in &ctx.parts {
                match part {
                    Expr::Identifier(ident) => names.push(ident.as_str()),
                    Expr::Index(idx) => {
                        if let Expr::Literal(Literal::String(key)) = idx.as_ref() {
                            names.push(key.as_ref());
                        }
                    }
                    _ => (),
                }
            }
        }

        names
    }
}

fn fold_pair<'src>(pair: Pair<'src, Rule>) -> Box<Expr<'src>> {
    // The grammar isn't left-recursive, so chained binary operators
    // parse as one many-headed rule (e.g. `a || b || c` is a single
    // `or_expr` with three children). Single-child rules punch through
    // to their inner pair; many-headed rules left-fold into a BinOp
    // chain so that the AST has the usual associativity.
    match pair.as_rule() {
        Rule::or_expr => fold_chain(pair, BinOp::Or),
        Rule::and_expr => fold_chain(pair, BinOp::And),
        Rule::eq_expr => fold_op_chain(pair, |op| match op {
            "==" => BinOp::Eq,
            _ => BinOp::Neq,
        }),
        Rule::comp_expr => fold_op_chain(pair, |op| match op {
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "<" => BinOp::Lt,
            _ => BinOp::Le,
        }),
        Rule::unary_expr => {
            let mut pairs = pair.into_inner();
            let first = pairs.next().expect("unary_expr has no children");

            match first.as_rule() {
                Rule::unary_op => Box::new(Expr::UnOp {
                    op: UnOp::Not,
                    expr: fold_pair(pairs.next().expect("unary_op has no operand")),
                }),
                _ => fold_pair(first),
            }
        }
        Rule::primary_expr | Rule::literal => {
            fold_pair(pair.into_inner().next().expect("empty wrapper rule"))
        }
        Rule::number => Box::new(Expr::Literal(Literal::Number(
            pair.as_str().parse().expect("number rule is unparseable"),
        ))),
        Rule::string => {
            // string -> string_inner
            let inner = pair
                .into_inner()
                .next()
                .expect("string rule has no inner")
                .as_str();

            Box::new(match inner.contains("''") {
                true => Expr::string(inner.replace("''", "'")),
                false => Expr::Literal(Literal::String(inner.into())),
            })
        }
        Rule::boolean => Box::new(Expr::Literal(Literal::Boolean(
            pair.as_str().parse().expect("boolean rule is unparseable"),
        ))),
        Rule::null => Box::new(Expr::Literal(Literal::Null)),
        Rule::star => Box::new(Expr::Star),
        Rule::identifier => Box::new(Expr::ident(pair.as_str())),
        Rule::index => fold_index(pair),
        Rule::function_call => {
            let mut pairs = pair.into_inner();
            let func = pairs.next().expect("function_call has no name");
            let args = pairs.map(|arg| *fold_pair(arg)).collect();

            Box::new(Expr::Call {
                func: Function(func.as_str()),
                args,
            })
        }
        Rule::context => {
            let raw = pair.as_str();
            let mut parts: Vec<Expr<'src>> =
                pair.into_inner().map(|part| *fold_pair(part)).collect();

            // The `context` rule wholly encloses `function_call`, so a
            // bare call parses as a one-part context. Unwrap it.
            if parts.len() == 1 && matches!(parts[0], Expr::Call { .. }) {
                Box::new(parts.remove(0))
            } else {
                Box::new(Expr::Context(Context::new(raw, parts)))
            }
        }
        r => unreachable!("unexpected rule: {r:?}"),
    }
}

/// Folds a rule of the form `sub ~ (sub)*` where the operator is implied
/// by the rule itself (`||`, `&&`).
fn fold_chain<'src>(pair: Pair<'src, Rule>, op: BinOp) -> Box<Expr<'src>> {
    let mut pairs = pair.into_inner();
    let lhs = fold_pair(pairs.next().expect("empty operator chain"));

    pairs.fold(lhs, |lhs, rhs| {
        Box::new(Expr::BinOp {
            lhs,
            op,
            rhs: fold_pair(rhs),
        })
    })
}

/// Folds a rule of the form `sub ~ (op ~ sub)*` where the operator is
/// captured as its own pair (`==`/`!=`, comparisons).
fn fold_op_chain<'src>(pair: Pair<'src, Rule>, op: impl Fn(&str) -> BinOp) -> Box<Expr<'src>> {
    let mut pairs = pair.into_inner();
    let mut expr = fold_pair(pairs.next().expect("empty operator chain"));

    while let (Some(op_pair), Some(rhs)) = (pairs.next(), pairs.next()) {
        expr = Box::new(Expr::BinOp {
            lhs: expr,
            op: op(op_pair.as_str()),
            rhs: fold_pair(rhs),
        });
    }

    expr
}

fn fold_index<'src>(pair: Pair<'src, Rule>) -> Box<Expr<'src>> {
    let inner = pair.into_inner().next().expect("index has no inner");
    Box::new(Expr::Index(fold_pair(inner)))
}
