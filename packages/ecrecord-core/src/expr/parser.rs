use super::lexer::{integer_literal_value, Lexer};
use super::node::{BinaryOp, ErrorNode, Node, PrimaryList, PrimaryStep, UnaryOp};
use super::token::TokenKind;
use crate::config::EngineConfig;
use crate::types::EcValue;

type ParseResult = Result<Node, ErrorNode>;

/// Recursive descent parser producing a [`Node`] tree.
///
/// Grammar violations do not abort with an error value: the parse functions
/// return an [`ErrorNode`] describing the problem, and [`Node::Error`] is
/// handed back to the caller as the tree.
pub struct ExpressionParser<'a> {
    lexer: Lexer<'a>,
    depth: usize,
    max_depth: usize,
    /// Depth of the comparison level where `=` ends an assignment target
    assignment_depth: Option<usize>,
    failed: bool,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(text: &'a str) -> Self {
        Self::with_config(text, &EngineConfig::default())
    }

    pub fn with_config(text: &'a str, config: &EngineConfig) -> Self {
        Self {
            lexer: Lexer::new(text),
            depth: 0,
            max_depth: config.max_expression_depth,
            assignment_depth: None,
            failed: false,
        }
    }

    /// Parses a value expression. `=` is a comparison here.
    pub fn parse_value(&mut self) -> Node {
        let result = self.parse_expression();
        self.finish(result)
    }

    /// Parses `target = value` or `target op= value`, falling back to a
    /// plain value expression when no assignment operator follows.
    pub fn parse_assignment(&mut self) -> Node {
        let result = self.parse_assignment_inner();
        self.finish(result)
    }

    /// True when the input was consumed completely without a parse error.
    pub fn check_complete(&self) -> bool {
        !self.failed && self.lexer.kind() == TokenKind::None
    }

    /// Unconsumed input, starting at the current token.
    pub fn remaining(&self) -> &'a str {
        self.lexer.remaining()
    }

    fn finish(&mut self, result: ParseResult) -> Node {
        match result {
            Ok(node) => node,
            Err(error) => {
                self.failed = true;
                tracing::trace!("Parse of '{}' failed: {}", self.lexer.input(), error);
                Node::Error(error)
            }
        }
    }

    fn unexpected(&self, message: &str, parsed: &str) -> ErrorNode {
        ErrorNode::with_details(message, parsed, self.lexer.token().to_string())
    }

    fn expect(&mut self, kind: TokenKind, message: &str, parsed: &str) -> Result<(), ErrorNode> {
        if self.lexer.kind() != kind {
            return Err(self.unexpected(message, parsed));
        }
        self.lexer.advance();
        Ok(())
    }

    fn too_deep(&self) -> ErrorNode {
        ErrorNode::with_details(
            "Expression nested too deeply",
            self.max_depth.to_string(),
            self.lexer.remaining(),
        )
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult) -> ParseResult {
        if self.depth >= self.max_depth {
            return Err(self.too_deep());
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Left-folds `operand (operator operand)*`. Every fold deepens the tree
    /// by one level and counts against the nesting limit.
    fn parse_binary_chain(
        &mut self,
        operand: fn(&mut Self) -> ParseResult,
        operator: fn(&Self) -> Option<BinaryOp>,
    ) -> ParseResult {
        let base = self.depth;
        let result = self.fold_chain(operand, operator);
        self.depth = base;
        result
    }

    fn fold_chain(
        &mut self,
        operand: fn(&mut Self) -> ParseResult,
        operator: fn(&Self) -> Option<BinaryOp>,
    ) -> ParseResult {
        let mut left = operand(self)?;
        while let Some(op) = operator(self) {
            if self.depth >= self.max_depth {
                return Err(self.too_deep());
            }
            self.depth += 1;
            self.lexer.advance();
            let right = operand(self)?;
            left = Node::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_assignment_inner(&mut self) -> ParseResult {
        // a top-level `=` after the target is the assignment operator
        self.assignment_depth = Some(self.depth + 1);
        let left = self.parse_expression();
        self.assignment_depth = None;
        let left = left?;

        let token = self.lexer.token();
        let op = match token.kind {
            TokenKind::Equal => None,
            kind if token.compound_assignment => Some(compound_operator(kind).ok_or_else(|| {
                self.unexpected("Invalid assignment operator", &left.to_string())
            })?),
            _ => return Ok(left),
        };
        if !matches!(left, Node::PrimaryList(_)) {
            return Err(self.unexpected("Left side of assignment must be a property access", &left.to_string()));
        }
        self.lexer.advance();
        let right = self.parse_expression()?;
        Ok(Node::Assignment {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_expression(&mut self) -> ParseResult {
        self.nested(|p| p.parse_logical_or())
    }

    /// Compound assignment operators end a value expression.
    fn at_compound_assignment(&self) -> bool {
        self.lexer.token().compound_assignment
    }

    /// The operator at the current token unless it starts a compound assignment.
    fn value_operator(&self, op: BinaryOp) -> Option<BinaryOp> {
        (!self.at_compound_assignment()).then_some(op)
    }

    fn parse_logical_or(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_logical_and, |p| match p.lexer.kind() {
            TokenKind::Or => Some(BinaryOp::Or),
            TokenKind::OrElse => Some(BinaryOp::OrElse),
            TokenKind::Xor => Some(BinaryOp::Xor),
            _ => None,
        })
    }

    fn parse_logical_and(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_not, |p| match p.lexer.kind() {
            TokenKind::And => Some(BinaryOp::And),
            TokenKind::AndAlso => Some(BinaryOp::AndAlso),
            _ => None,
        })
    }

    fn parse_not(&mut self) -> ParseResult {
        if self.lexer.kind() != TokenKind::Not {
            return self.parse_comparison();
        }
        self.lexer.advance();
        let operand = self.nested(|p| p.parse_not())?;
        Ok(Node::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        })
    }

    fn parse_comparison(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_shift, |p| match p.lexer.kind() {
            TokenKind::Equal if p.assignment_depth == Some(p.depth) => None,
            TokenKind::Equal => Some(BinaryOp::Equal),
            TokenKind::NotEqual => Some(BinaryOp::NotEqual),
            TokenKind::Less => Some(BinaryOp::Less),
            TokenKind::LessEqual => Some(BinaryOp::LessEqual),
            TokenKind::Greater => Some(BinaryOp::Greater),
            TokenKind::GreaterEqual => Some(BinaryOp::GreaterEqual),
            TokenKind::Like => Some(BinaryOp::Like),
            TokenKind::Is => Some(BinaryOp::Is),
            _ => None,
        })
    }

    fn parse_shift(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_concatenation, |p| match p.lexer.kind() {
            TokenKind::ShiftLeft => p.value_operator(BinaryOp::ShiftLeft),
            TokenKind::ShiftRight => p.value_operator(BinaryOp::ShiftRight),
            TokenKind::UnsignedShiftRight => p.value_operator(BinaryOp::UnsignedShiftRight),
            _ => None,
        })
    }

    fn parse_concatenation(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_additive, |p| match p.lexer.kind() {
            TokenKind::Concatenate => p.value_operator(BinaryOp::Concatenate),
            _ => None,
        })
    }

    fn parse_additive(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_mod, |p| match p.lexer.kind() {
            TokenKind::Plus => p.value_operator(BinaryOp::Plus),
            TokenKind::Minus => p.value_operator(BinaryOp::Minus),
            _ => None,
        })
    }

    fn parse_mod(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_integer_division, |p| match p.lexer.kind() {
            TokenKind::Mod => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn parse_integer_division(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_multiplicative, |p| match p.lexer.kind() {
            TokenKind::IntegerDivide => p.value_operator(BinaryOp::IntegerDivide),
            _ => None,
        })
    }

    fn parse_multiplicative(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_unit_spec, |p| match p.lexer.kind() {
            TokenKind::Star => p.value_operator(BinaryOp::Multiply),
            TokenKind::Slash => p.value_operator(BinaryOp::Divide),
            _ => None,
        })
    }

    fn parse_unit_spec(&mut self) -> ParseResult {
        let operand = self.parse_unary()?;
        if self.lexer.kind() != TokenKind::Colon {
            return Ok(operand);
        }
        let parsed = operand.to_string();
        self.lexer.advance();
        if self.lexer.kind() != TokenKind::Ident {
            return Err(self.unexpected("Expected a unit name after ':'", &parsed));
        }
        let unit = self.lexer.token().text.clone();
        self.lexer.advance();

        let mut qualifiers = [None, None];
        for slot in &mut qualifiers {
            if self.lexer.kind() != TokenKind::DoubleColon {
                break;
            }
            self.lexer.advance();
            *slot = Some(self.parse_unit_number(&parsed)?);
        }
        let [factor, offset] = qualifiers;
        Ok(Node::UnitSpec {
            operand: Box::new(operand),
            unit,
            factor,
            offset,
        })
    }

    fn parse_unit_number(&mut self, parsed: &str) -> Result<f64, ErrorNode> {
        let negative = self.lexer.kind() == TokenKind::Minus;
        if negative {
            self.lexer.advance();
        }
        let token = self.lexer.token();
        let value = match token.kind {
            TokenKind::IntegerConstant | TokenKind::LongConstant => {
                integer_literal_value(&token.text).map(|v| v as f64)
            }
            TokenKind::DoubleConstant => token.text.parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| self.unexpected("Invalid unit conversion factor", parsed))?;
        self.lexer.advance();
        Ok(if negative { -value } else { value })
    }

    fn parse_unary(&mut self) -> ParseResult {
        let op = match self.lexer.kind() {
            TokenKind::Minus => UnaryOp::Minus,
            TokenKind::Plus => UnaryOp::Plus,
            _ => return self.parse_exponent(),
        };
        self.lexer.advance();
        let operand = self.nested(|p| p.parse_unary())?;
        Ok(Node::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_exponent(&mut self) -> ParseResult {
        self.parse_binary_chain(Self::parse_exponent_operand, |p| match p.lexer.kind() {
            TokenKind::Exponentiation => p.value_operator(BinaryOp::Exponent),
            _ => None,
        })
    }

    /// A signed exponent such as `2 ^ -1` binds its sign to the right operand.
    fn parse_exponent_operand(&mut self) -> ParseResult {
        match self.lexer.kind() {
            TokenKind::Minus | TokenKind::Plus => self.nested(|p| p.parse_unary()),
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> ParseResult {
        let token = self.lexer.token().clone();
        let literal = match token.kind {
            TokenKind::IntegerConstant => integer_literal_value(&token.text).map(|v| EcValue::Integer(v as u32 as i32)),
            TokenKind::LongConstant => integer_literal_value(&token.text).map(EcValue::Long),
            TokenKind::DoubleConstant => token.text.parse::<f64>().ok().map(EcValue::Double),
            TokenKind::StringConstant => Some(EcValue::String(token.text.clone())),
            TokenKind::DateTimeConstant => token.text[1..].parse::<i64>().ok().map(EcValue::DateTime),
            TokenKind::True => Some(EcValue::Boolean(true)),
            TokenKind::False => Some(EcValue::Boolean(false)),
            TokenKind::Null => Some(EcValue::Null),
            TokenKind::LParen => return self.parse_parens(),
            TokenKind::LCurly => return self.parse_point(),
            TokenKind::IIf => return self.parse_iif(),
            TokenKind::Ident => return self.parse_primary_list(),
            TokenKind::None => return Err(ErrorNode::with_details("Expected an operand", self.lexer.input(), "")),
            kind if kind.is_error() => return Err(self.unexpected(lexer_error_message(kind), self.parsed_text())),
            _ => return Err(self.unexpected("Unexpected token", self.parsed_text())),
        };
        let value = literal.ok_or_else(|| self.unexpected("Invalid literal", self.parsed_text()))?;
        self.lexer.advance();
        Ok(Node::Literal(value))
    }

    fn parsed_text(&self) -> &'a str {
        let input = self.lexer.input();
        input.get(..self.lexer.token().position).unwrap_or(input).trim_end()
    }

    fn parse_parens(&mut self) -> ParseResult {
        self.lexer.advance();
        let inner = self.parse_expression()?;
        self.expect(TokenKind::RParen, "Expected ')'", &format!("({inner}"))?;
        Ok(Node::Parens(Box::new(inner)))
    }

    fn parse_point(&mut self) -> ParseResult {
        self.lexer.advance();
        let mut components = vec![self.parse_expression()?];
        while self.lexer.kind() == TokenKind::Comma {
            self.lexer.advance();
            components.push(self.parse_expression()?);
        }
        let point = Node::Point(components);
        let text = point.to_string();
        self.expect(TokenKind::RCurly, "Expected '}'", &text)?;
        match &point {
            Node::Point(c) if c.len() == 2 || c.len() == 3 => Ok(point),
            _ => Err(ErrorNode::with_details("A point needs 2 or 3 components", text, "")),
        }
    }

    fn parse_iif(&mut self) -> ParseResult {
        self.lexer.advance();
        self.expect(TokenKind::LParen, "Expected '(' after IIf", "IIf")?;
        let mut arguments = self.parse_arguments()?;
        if arguments.len() != 3 {
            return Err(ErrorNode::with_details(
                "IIf requires 3 arguments",
                "IIf",
                arguments.len().to_string(),
            ));
        }
        let when_false = arguments.pop();
        let when_true = arguments.pop();
        let condition = arguments.pop();
        match (condition, when_true, when_false) {
            (Some(condition), Some(when_true), Some(when_false)) => Ok(Node::IIf {
                condition: Box::new(condition),
                when_true: Box::new(when_true),
                when_false: Box::new(when_false),
            }),
            _ => Err(ErrorNode::new("IIf requires 3 arguments")),
        }
    }

    /// Arguments after an opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> Result<Vec<Node>, ErrorNode> {
        let mut arguments = Vec::new();
        if self.lexer.kind() == TokenKind::RParen {
            self.lexer.advance();
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_argument()?);
            match self.lexer.kind() {
                TokenKind::Comma => self.lexer.advance(),
                TokenKind::RParen => {
                    self.lexer.advance();
                    return Ok(arguments);
                }
                _ => return Err(self.unexpected("Expected ',' or ')'", self.parsed_text())),
            }
        }
    }

    /// An argument is either `name => body` or a value expression.
    fn parse_argument(&mut self) -> ParseResult {
        if self.lexer.kind() == TokenKind::Ident {
            let checkpoint = self.lexer.checkpoint();
            let parameter = self.lexer.token().text.clone();
            self.lexer.advance();
            if self.lexer.kind() == TokenKind::Lambda {
                self.lexer.advance();
                let body = self.parse_expression()?;
                return Ok(Node::Lambda {
                    parameter,
                    body: Box::new(body),
                });
            }
            self.lexer.restore(checkpoint);
        }
        self.parse_expression()
    }

    fn parse_primary_list(&mut self) -> ParseResult {
        let mut steps = Vec::new();
        let name = self.lexer.token().text.clone();
        self.lexer.advance();
        steps.push(self.name_or_call(name)?);

        loop {
            match self.lexer.kind() {
                TokenKind::Dot => {
                    self.lexer.advance();
                    if self.lexer.kind() != TokenKind::Ident {
                        let parsed = PrimaryList { steps }.to_string();
                        return Err(self.unexpected("Expected a member name after '.'", &parsed));
                    }
                    let name = self.lexer.token().text.clone();
                    self.lexer.advance();
                    match self.name_or_call(name)? {
                        PrimaryStep::Ident(name) => steps.push(PrimaryStep::Member(name)),
                        call => steps.push(call),
                    }
                }
                TokenKind::LBracket => {
                    self.lexer.advance();
                    let index = self.parse_expression()?;
                    let parsed = format!("{}[{index}", PrimaryList { steps: steps.clone() });
                    self.expect(TokenKind::RBracket, "Expected ']'", &parsed)?;
                    steps.push(PrimaryStep::Index(Box::new(index)));
                }
                _ => return Ok(Node::PrimaryList(PrimaryList { steps })),
            }
        }
    }

    fn name_or_call(&mut self, name: String) -> Result<PrimaryStep, ErrorNode> {
        if self.lexer.kind() != TokenKind::LParen {
            return Ok(PrimaryStep::Ident(name));
        }
        self.lexer.advance();
        let arguments = self.parse_arguments()?;
        Ok(PrimaryStep::Call { method: name, arguments })
    }
}

fn compound_operator(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::Plus => BinaryOp::Plus,
        TokenKind::Minus => BinaryOp::Minus,
        TokenKind::Star => BinaryOp::Multiply,
        TokenKind::Slash => BinaryOp::Divide,
        TokenKind::IntegerDivide => BinaryOp::IntegerDivide,
        TokenKind::Exponentiation => BinaryOp::Exponent,
        TokenKind::Concatenate => BinaryOp::Concatenate,
        TokenKind::ShiftLeft => BinaryOp::ShiftLeft,
        TokenKind::ShiftRight => BinaryOp::ShiftRight,
        TokenKind::UnsignedShiftRight => BinaryOp::UnsignedShiftRight,
        _ => return None,
    };
    Some(op)
}

fn lexer_error_message(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::BadNumber => "Invalid number",
        TokenKind::BadHexNumber => "Invalid hexadecimal number",
        TokenKind::BadFloatingPoint => "Invalid floating point number",
        TokenKind::BadDateTime => "Invalid datetime literal",
        TokenKind::UnterminatedString => "Unterminated string",
        _ => "Unrecognized character",
    }
}

/// Parses a value expression; input left over after a complete expression
/// yields an error node.
pub fn parse_value_expression_and_create_tree(text: &str) -> Node {
    let mut parser = ExpressionParser::new(text);
    let node = parser.parse_value();
    complete_or_error(&parser, node)
}

/// Parses an assignment (or plain value) expression; input left over after a
/// complete expression yields an error node.
pub fn parse_assignment_expression_and_create_tree(text: &str) -> Node {
    let mut parser = ExpressionParser::new(text);
    let node = parser.parse_assignment();
    complete_or_error(&parser, node)
}

fn complete_or_error(parser: &ExpressionParser<'_>, node: Node) -> Node {
    if node.is_error() || parser.check_complete() {
        return node;
    }
    Node::Error(ErrorNode::with_details(
        "Unexpected input after expression",
        node.to_string(),
        parser.remaining(),
    ))
}
