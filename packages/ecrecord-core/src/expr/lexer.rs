use super::token::{Token, TokenKind};

/// Pull lexer over an expression string.
///
/// The lexer always holds one current token; [`Lexer::advance`] replaces it
/// with the next one. Malformed literals and stray characters become error
/// tokens so that the parser decides how to report them.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    current: Token,
}

/// Saved lexer position for lookahead.
#[derive(Debug, Clone)]
pub struct LexerCheckpoint {
    pos: usize,
    current: Token,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut lexer = Self {
            input,
            pos: 0,
            current: Token::end(0),
        };
        lexer.advance();
        lexer
    }

    pub fn token(&self) -> &Token {
        &self.current
    }

    pub fn kind(&self) -> TokenKind {
        self.current.kind
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    /// Input from the start of the current token on.
    pub fn remaining(&self) -> &'a str {
        self.input.get(self.current.position..).unwrap_or("")
    }

    pub fn checkpoint(&self) -> LexerCheckpoint {
        LexerCheckpoint {
            pos: self.pos,
            current: self.current.clone(),
        }
    }

    pub fn restore(&mut self, checkpoint: LexerCheckpoint) {
        self.pos = checkpoint.pos;
        self.current = checkpoint.current;
    }

    pub fn advance(&mut self) {
        self.skip_whitespace();
        let start = self.pos;
        let Some(c) = self.peek() else {
            self.current = Token::end(start);
            return;
        };

        let kind = if c.is_ascii_digit() {
            self.lex_number()
        } else if c.is_alphabetic() || c == '_' {
            self.lex_identifier()
        } else if c == '"' {
            return self.lex_string(start);
        } else if c == '@' {
            self.lex_date_time()
        } else {
            self.lex_operator(c)
        };

        let end = self.pos;
        let compound_assignment = kind.allows_compound_assignment() && self.eat('=');
        self.current = Token {
            kind,
            text: self.input[start..end].to_string(),
            position: start,
            compound_assignment,
        };
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_while(&mut self, predicate: impl Fn(char) -> bool) -> usize {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        self.pos - start
    }

    fn skip_whitespace(&mut self) {
        self.eat_while(char::is_whitespace);
    }

    fn is_ident_char(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    fn lex_identifier(&mut self) -> TokenKind {
        let start = self.pos;
        self.eat_while(Self::is_ident_char);
        TokenKind::keyword(&self.input[start..self.pos]).unwrap_or(TokenKind::Ident)
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_second(), Some('x' | 'X')) {
            self.pos += 2;
            let digits = self.eat_while(|c| c.is_ascii_hexdigit());
            let wide = self.eat('L') || self.eat('l');
            if self.eat_while(Self::is_ident_char) > 0 || digits == 0 {
                return TokenKind::BadHexNumber;
            }
            let text = &self.input[start..self.pos];
            return match integer_literal_value(text) {
                Some(_) if wide => TokenKind::LongConstant,
                Some(v) if v <= i64::from(u32::MAX) => TokenKind::IntegerConstant,
                Some(_) => TokenKind::LongConstant,
                None => TokenKind::BadHexNumber,
            };
        }

        self.eat_while(|c| c.is_ascii_digit());
        let mut is_double = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
            self.eat_while(|c| c.is_ascii_digit());
            is_double = true;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            self.pos += 1;
            if !self.eat('+') {
                self.eat('-');
            }
            if self.eat_while(|c| c.is_ascii_digit()) == 0 {
                self.eat_while(Self::is_ident_char);
                return TokenKind::BadFloatingPoint;
            }
            is_double = true;
        }
        let wide = self.eat('L') || self.eat('l');
        if self.eat_while(Self::is_ident_char) > 0 || (wide && is_double) {
            return TokenKind::BadNumber;
        }

        let text = &self.input[start..self.pos];
        if is_double {
            return match text.parse::<f64>() {
                Ok(v) if v.is_finite() => TokenKind::DoubleConstant,
                _ => TokenKind::BadFloatingPoint,
            };
        }
        match integer_literal_value(text) {
            Some(_) if wide => TokenKind::LongConstant,
            Some(v) if i32::try_from(v).is_ok() => TokenKind::IntegerConstant,
            Some(_) => TokenKind::LongConstant,
            None => TokenKind::BadNumber,
        }
    }

    fn lex_date_time(&mut self) -> TokenKind {
        self.pos += 1;
        self.eat('-');
        let digits = self.eat_while(|c| c.is_ascii_digit());
        if self.eat_while(Self::is_ident_char) > 0 || digits == 0 {
            return TokenKind::BadDateTime;
        }
        TokenKind::DateTimeConstant
    }

    fn lex_string(&mut self, start: usize) {
        self.pos += 1;
        let mut text = String::new();
        let kind = loop {
            match self.bump() {
                None => break TokenKind::UnterminatedString,
                Some('"') if self.eat('"') => text.push('"'),
                Some('"') => break TokenKind::StringConstant,
                Some(c) => text.push(c),
            }
        };
        self.current = Token {
            kind,
            text,
            position: start,
            compound_assignment: false,
        };
    }

    fn lex_operator(&mut self, c: char) -> TokenKind {
        self.pos += c.len_utf8();
        match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '\\' => TokenKind::IntegerDivide,
            '^' => TokenKind::Exponentiation,
            '&' => TokenKind::Concatenate,
            ',' => TokenKind::Comma,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LCurly,
            '}' => TokenKind::RCurly,
            '.' => TokenKind::Dot,
            ':' if self.eat(':') => TokenKind::DoubleColon,
            ':' => TokenKind::Colon,
            '=' if self.eat('>') => TokenKind::Lambda,
            '=' => TokenKind::Equal,
            '<' if self.eat('=') => TokenKind::LessEqual,
            '<' if self.eat('>') => TokenKind::NotEqual,
            '<' if self.eat('<') => TokenKind::ShiftLeft,
            '<' => TokenKind::Less,
            '>' if self.eat('=') => TokenKind::GreaterEqual,
            '>' if self.eat('>') => {
                if self.eat('>') {
                    TokenKind::UnsignedShiftRight
                } else {
                    TokenKind::ShiftRight
                }
            }
            '>' => TokenKind::Greater,
            _ => TokenKind::Unrecognized,
        }
    }
}

/// Value of an integer literal, decimal or `0x` hex, with an optional `L`
/// suffix. Hex literals up to 32 bits wrap into the signed range.
pub(crate) fn integer_literal_value(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['L', 'l']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        let value = u64::from_str_radix(hex, 16).ok()?;
        return i64::try_from(value).ok();
    }
    digits.parse::<i64>().ok()
}
