//! Unary and binary operators.

/// Binary operations allowed in an expression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BinOp {
    /// `expr && expr`
    And,
    /// `expr || expr`
    Or,
    /// `expr == expr`
    Eq,
    /// `expr != expr`
    Neq,
    /// `expr > expr`
    Gt,
    /// `expr >= expr`
    Ge,
    /// `expr < expr`
    Lt,
    /// `expr <= expr`
    Le,
}

/// Unary operations allowed in an expression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum UnOp {
    /// `!expr`
    Not,
}
