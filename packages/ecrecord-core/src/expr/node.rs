use std::fmt;

use crate::types::EcValue;

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

/// Infix operators, from arithmetic through the short-circuit junctions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
    IntegerDivide,
    Mod,
    Exponent,
    Concatenate,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Like,
    Is,
    And,
    Or,
    Xor,
    AndAlso,
    OrElse,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntegerDivide => "\\",
            BinaryOp::Mod => "Mod",
            BinaryOp::Exponent => "^",
            BinaryOp::Concatenate => "&",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::UnsignedShiftRight => ">>>",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Like => "Like",
            BinaryOp::Is => "Is",
            BinaryOp::And => "And",
            BinaryOp::Or => "Or",
            BinaryOp::Xor => "Xor",
            BinaryOp::AndAlso => "AndAlso",
            BinaryOp::OrElse => "OrElse",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::Less
                | BinaryOp::LessEqual
                | BinaryOp::Greater
                | BinaryOp::GreaterEqual
                | BinaryOp::Like
                | BinaryOp::Is
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One segment of an access path.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryStep {
    /// Leading identifier
    Ident(String),
    /// `.Name`
    Member(String),
    /// `[expr]`
    Index(Box<Node>),
    /// `Name(args)`, leading or after a dot
    Call { method: String, arguments: Vec<Node> },
}

/// Access path such as `this.Children[i + 1].Label` kept as a flat list of
/// steps, evaluated left to right.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryList {
    pub steps: Vec<PrimaryStep>,
}

impl PrimaryList {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Name of an identifier, member or call step.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        match self.steps.get(index)? {
            PrimaryStep::Ident(name) | PrimaryStep::Member(name) => Some(name),
            PrimaryStep::Call { method, .. } => Some(method),
            PrimaryStep::Index(_) => None,
        }
    }

    /// Text of the path up to, not including, step `end`.
    pub fn prefix_text(&self, end: usize) -> String {
        StepsText(&self.steps[..end.min(self.steps.len())]).to_string()
    }
}

struct StepsText<'a>(&'a [PrimaryStep]);

impl fmt::Display for StepsText<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.0.iter().enumerate() {
            write_step(f, i, step)?;
        }
        Ok(())
    }
}

fn write_step(out: &mut impl fmt::Write, index: usize, step: &PrimaryStep) -> fmt::Result {
    match step {
        PrimaryStep::Ident(name) => out.write_str(name),
        PrimaryStep::Member(name) => write!(out, ".{name}"),
        PrimaryStep::Index(node) => write!(out, "[{node}]"),
        PrimaryStep::Call { method, arguments } => {
            if index > 0 {
                out.write_char('.')?;
            }
            write!(out, "{method}(")?;
            write_list(out, arguments)?;
            out.write_char(')')
        }
    }
}

fn write_list(out: &mut impl fmt::Write, nodes: &[Node]) -> fmt::Result {
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        write!(out, "{node}")?;
    }
    Ok(())
}

impl fmt::Display for PrimaryList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&StepsText(&self.steps), f)
    }
}

/// Parse failure kept in the tree.
///
/// `detail1` usually holds the text parsed so far, `detail2` the offending
/// token or the unconsumed input.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorNode {
    pub message: String,
    pub detail1: Option<String>,
    pub detail2: Option<String>,
}

impl ErrorNode {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail1: None,
            detail2: None,
        }
    }

    pub fn with_details(message: impl Into<String>, detail1: impl Into<String>, detail2: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail1: Some(detail1.into()),
            detail2: Some(detail2.into()),
        }
    }
}

impl fmt::Display for ErrorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ERROR: {}", self.message)?;
        if let Some(detail) = &self.detail1 {
            write!(f, " [{detail}]")?;
        }
        if let Some(detail) = &self.detail2 {
            write!(f, " [{detail}]")?;
        }
        Ok(())
    }
}

/// Expression tree node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Integer, long, double, string, boolean, datetime or null constant
    Literal(EcValue),
    /// `{x, y}` or `{x, y, z}`
    Point(Vec<Node>),
    PrimaryList(PrimaryList),
    /// Parenthesized sub-expression
    Parens(Box<Node>),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    IIf {
        condition: Box<Node>,
        when_true: Box<Node>,
        when_false: Box<Node>,
    },
    /// `left = right`, or `left op= right` when `op` is set
    Assignment {
        op: Option<BinaryOp>,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// `operand:unit::factor::offset`
    UnitSpec {
        operand: Box<Node>,
        unit: String,
        factor: Option<f64>,
        offset: Option<f64>,
    },
    /// `parameter => body`, only valid as a call argument
    Lambda {
        parameter: String,
        body: Box<Node>,
    },
    Error(ErrorNode),
}

impl Node {
    pub fn is_error(&self) -> bool {
        matches!(self, Node::Error(_))
    }

    pub fn error(&self) -> Option<&ErrorNode> {
        match self {
            Node::Error(e) => Some(e),
            _ => None,
        }
    }

    pub(crate) fn binary(op: BinaryOp, left: Node, right: Node) -> Node {
        Node::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &EcValue) -> fmt::Result {
    match value {
        EcValue::Null => f.write_str("Null"),
        EcValue::Long(v) => write!(f, "{v}L"),
        EcValue::Double(v) => write!(f, "{v:?}"),
        EcValue::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
        other => write!(f, "{other}"),
    }
}

fn write_factor(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        write!(f, "{}", v as i64)
    } else {
        write!(f, "{v:?}")
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Literal(value) => write_literal(f, value),
            Node::Point(components) => {
                f.write_str("{")?;
                for (i, c) in components.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str("}")
            }
            Node::PrimaryList(list) => write!(f, "{list}"),
            Node::Parens(inner) => write!(f, "({inner})"),
            Node::Unary { op, operand } => match op {
                UnaryOp::Plus => write!(f, "+{operand}"),
                UnaryOp::Minus => write!(f, "-{operand}"),
                UnaryOp::Not => write!(f, "Not {operand}"),
            },
            Node::Binary { op, left, right } => write!(f, "{left} {op} {right}"),
            Node::IIf {
                condition,
                when_true,
                when_false,
            } => write!(f, "IIf({condition}, {when_true}, {when_false})"),
            Node::Assignment { op, left, right } => match op {
                Some(op) => write!(f, "{left} {op}= {right}"),
                None => write!(f, "{left} = {right}"),
            },
            Node::UnitSpec {
                operand,
                unit,
                factor,
                offset,
            } => {
                write!(f, "{operand}:{unit}")?;
                if let Some(factor) = factor {
                    f.write_str("::")?;
                    write_factor(f, *factor)?;
                }
                if let Some(offset) = offset {
                    f.write_str("::")?;
                    write_factor(f, *offset)?;
                }
                Ok(())
            }
            Node::Lambda { parameter, body } => write!(f, "{parameter} => {body}"),
            Node::Error(e) => write!(f, "{e}"),
        }
    }
}
