use std::fmt;

/// Kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// End of input
    None,
    /// Character that starts no token
    Unrecognized,

    Ident,
    IntegerConstant,
    LongConstant,
    DoubleConstant,
    StringConstant,
    DateTimeConstant,

    BadNumber,
    BadHexNumber,
    BadFloatingPoint,
    BadDateTime,
    UnterminatedString,

    True,
    False,
    And,
    AndAlso,
    Or,
    OrElse,
    Mod,
    Xor,
    Not,
    Like,
    Is,
    IIf,
    Null,

    Plus,
    Minus,
    Star,
    Slash,
    IntegerDivide,
    Exponentiation,
    Concatenate,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LCurly,
    RCurly,
    Colon,
    DoubleColon,
    Dot,
    Lambda,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl TokenKind {
    /// Keyword for an identifier, matched case-insensitively.
    pub fn keyword(ident: &str) -> Option<TokenKind> {
        let kind = match ident.to_ascii_lowercase().as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "and" => TokenKind::And,
            "andalso" => TokenKind::AndAlso,
            "or" => TokenKind::Or,
            "orelse" => TokenKind::OrElse,
            "mod" => TokenKind::Mod,
            "xor" => TokenKind::Xor,
            "not" => TokenKind::Not,
            "like" => TokenKind::Like,
            "is" => TokenKind::Is,
            "iif" => TokenKind::IIf,
            "null" => TokenKind::Null,
            _ => return None,
        };
        Some(kind)
    }

    /// Lexer error tokens.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::BadNumber
                | TokenKind::BadHexNumber
                | TokenKind::BadFloatingPoint
                | TokenKind::BadDateTime
                | TokenKind::UnterminatedString
                | TokenKind::Unrecognized
        )
    }

    /// Operators that may be followed by `=` to form a compound assignment.
    pub fn allows_compound_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Slash
                | TokenKind::IntegerDivide
                | TokenKind::Exponentiation
                | TokenKind::Concatenate
                | TokenKind::ShiftLeft
                | TokenKind::ShiftRight
                | TokenKind::UnsignedShiftRight
        )
    }
}

/// One token: its kind, its text and where it starts in the input.
///
/// For string constants `text` holds the unescaped contents. When
/// `compound_assignment` is set the operator was written as `op=`.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: usize,
    pub compound_assignment: bool,
}

impl Token {
    pub(crate) fn end(position: usize) -> Self {
        Self {
            kind: TokenKind::None,
            text: String::new(),
            position,
            compound_assignment: false,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::None => f.write_str("end of input"),
            TokenKind::StringConstant => write!(f, "\"{}\"", self.text.replace('"', "\"\"")),
            _ if self.compound_assignment => write!(f, "{}=", self.text),
            _ => f.write_str(&self.text),
        }
    }
}
