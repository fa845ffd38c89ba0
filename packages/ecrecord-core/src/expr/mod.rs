//! Expression language over instances: lexer, parser, tree and evaluator.
//!
//! ```text
//! IIf(this.Count > 0, this.Name & "!", "empty")
//! this.Children.Any(c => c.Label Like "a*")
//! this.Total += 10
//! ```
//!
//! Parsing never fails with an error value; a malformed expression yields a
//! tree whose root is [`Node::Error`]. Evaluation returns
//! [`ExpressionError`](crate::error::ExpressionError) for every non-success
//! status.

mod context;
mod evaluator;
mod lexer;
mod node;
pub mod operations;
mod parser;
mod symbols;
mod token;

pub use context::{
    ExpressionContext, InstanceListExpressionContext, LambdaScope, PropertyReference, SymbolExpressionContext,
};
pub use evaluator::{
    evaluate, evaluate_assignment_expression, evaluate_expression, evaluate_value, EvaluationResult, LambdaValue,
    ValueList,
};
pub use lexer::{Lexer, LexerCheckpoint};
pub use node::{BinaryOp, ErrorNode, Node, PrimaryList, PrimaryStep, UnaryOp};
pub use parser::{parse_assignment_expression_and_create_tree, parse_value_expression_and_create_tree, ExpressionParser};
pub use symbols::{
    ContextSymbol, InstanceMethod, MethodReference, MethodSymbol, StaticMethod, Symbol, SymbolProvider,
    SymbolProviderRegistry, SystemSymbolProvider, ValueSymbol,
};
pub use token::{Token, TokenKind};

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
