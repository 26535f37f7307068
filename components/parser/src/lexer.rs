//! Lua lexer - tokenizes source code into tokens
//!
//! Positions are 1-based. Every token carries the span it was read from so
//! the parser can attach source references to the code it emits.

use core_types::SyntaxError;

use crate::error::{premature_end, syntax_error};

/// Reserved words
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// and
    And,
    /// break
    Break,
    /// do
    Do,
    /// else
    Else,
    /// elseif
    ElseIf,
    /// end
    End,
    /// false
    False,
    /// for
    For,
    /// function
    Function,
    /// goto
    Goto,
    /// if
    If,
    /// in
    In,
    /// local
    Local,
    /// nil
    Nil,
    /// not
    Not,
    /// or
    Or,
    /// repeat
    Repeat,
    /// return
    Return,
    /// then
    Then,
    /// true
    True,
    /// until
    Until,
    /// while
    While,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Keyword> {
        Some(match word {
            "and" => Keyword::And,
            "break" => Keyword::Break,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "elseif" => Keyword::ElseIf,
            "end" => Keyword::End,
            "false" => Keyword::False,
            "for" => Keyword::For,
            "function" => Keyword::Function,
            "goto" => Keyword::Goto,
            "if" => Keyword::If,
            "in" => Keyword::In,
            "local" => Keyword::Local,
            "nil" => Keyword::Nil,
            "not" => Keyword::Not,
            "or" => Keyword::Or,
            "repeat" => Keyword::Repeat,
            "return" => Keyword::Return,
            "then" => Keyword::Then,
            "true" => Keyword::True,
            "until" => Keyword::Until,
            "while" => Keyword::While,
            _ => return None,
        })
    }

    /// Source text of the keyword
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::And => "and",
            Keyword::Break => "break",
            Keyword::Do => "do",
            Keyword::Else => "else",
            Keyword::ElseIf => "elseif",
            Keyword::End => "end",
            Keyword::False => "false",
            Keyword::For => "for",
            Keyword::Function => "function",
            Keyword::Goto => "goto",
            Keyword::If => "if",
            Keyword::In => "in",
            Keyword::Local => "local",
            Keyword::Nil => "nil",
            Keyword::Not => "not",
            Keyword::Or => "or",
            Keyword::Repeat => "repeat",
            Keyword::Return => "return",
            Keyword::Then => "then",
            Keyword::True => "true",
            Keyword::Until => "until",
            Keyword::While => "while",
        }
    }
}

/// Operators and delimiters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punctuator {
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// ^
    Caret,
    /// #
    Hash,
    /// ==
    EqEq,
    /// ~=
    NotEq,
    /// <=
    LtEq,
    /// >=
    GtEq,
    /// <
    Lt,
    /// >
    Gt,
    /// =
    Assign,
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ;
    Semicolon,
    /// :
    Colon,
    /// ::
    DoubleColon,
    /// ,
    Comma,
    /// .
    Dot,
    /// ..
    Concat,
    /// ...
    Ellipsis,
}

impl Punctuator {
    /// Source text of the punctuator
    pub fn as_str(self) -> &'static str {
        match self {
            Punctuator::Plus => "+",
            Punctuator::Minus => "-",
            Punctuator::Star => "*",
            Punctuator::Slash => "/",
            Punctuator::Percent => "%",
            Punctuator::Caret => "^",
            Punctuator::Hash => "#",
            Punctuator::EqEq => "==",
            Punctuator::NotEq => "~=",
            Punctuator::LtEq => "<=",
            Punctuator::GtEq => ">=",
            Punctuator::Lt => "<",
            Punctuator::Gt => ">",
            Punctuator::Assign => "=",
            Punctuator::LParen => "(",
            Punctuator::RParen => ")",
            Punctuator::LBrace => "{",
            Punctuator::RBrace => "}",
            Punctuator::LBracket => "[",
            Punctuator::RBracket => "]",
            Punctuator::Semicolon => ";",
            Punctuator::Colon => ":",
            Punctuator::DoubleColon => "::",
            Punctuator::Comma => ",",
            Punctuator::Dot => ".",
            Punctuator::Concat => "..",
            Punctuator::Ellipsis => "...",
        }
    }
}

/// Token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier
    Identifier(String),
    /// Number literal
    Number(f64),
    /// String literal, escapes already processed
    String(String),
    /// Keyword
    Keyword(Keyword),
    /// Punctuator/operator
    Punctuator(Punctuator),
    /// End of input
    EOF,
}

impl Token {
    /// Text used in "near '...'" diagnostics
    pub fn describe(&self) -> String {
        match self {
            Token::Identifier(name) => name.clone(),
            Token::Number(n) => core_types::format_number(*n),
            Token::String(s) => s.clone(),
            Token::Keyword(k) => k.as_str().to_string(),
            Token::Punctuator(p) => p.as_str().to_string(),
            Token::EOF => "<eof>".to_string(),
        }
    }
}

/// A token with the span it was read from
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    /// The token
    pub token: Token,
    /// Line of the first character
    pub line: usize,
    /// Column of the first character
    pub column: usize,
    /// Line of the last character
    pub end_line: usize,
    /// Column of the last character
    pub end_column: usize,
}

/// Lexer for Lua source code
pub struct Lexer<'a> {
    chunk_name: &'a str,
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    lookahead: Option<Lexeme>,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer; `chunk_name` is used in error messages
    pub fn new(source: &str, chunk_name: &'a str) -> Self {
        let mut lexer = Self {
            chunk_name,
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            lookahead: None,
        };
        lexer.skip_shebang();
        lexer
    }

    /// Name of the chunk being lexed
    pub fn chunk_name(&self) -> &str {
        self.chunk_name
    }

    /// Get the next token from the source
    pub fn next_token(&mut self) -> Result<Lexeme, SyntaxError> {
        if let Some(lexeme) = self.lookahead.take() {
            return Ok(lexeme);
        }
        self.scan_token()
    }

    /// Peek at the next token without consuming it
    pub fn peek_token(&mut self) -> Result<&Lexeme, SyntaxError> {
        let lexeme = match self.lookahead.take() {
            Some(lexeme) => lexeme,
            None => self.scan_token()?,
        };
        let slot = self.lookahead.insert(lexeme);
        Ok(&*slot)
    }

    fn skip_shebang(&mut self) {
        if self.peek() == '#' {
            while !self.is_at_end() && self.peek() != '\n' {
                self.advance();
            }
        }
    }

    fn scan_token(&mut self) -> Result<Lexeme, SyntaxError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let column = self.column;
        let token = if self.is_at_end() {
            Token::EOF
        } else {
            let c = self.peek();
            if c.is_ascii_alphabetic() || c == '_' {
                self.scan_word()
            } else if c.is_ascii_digit() || (c == '.' && self.peek_next().is_some_and(|n| n.is_ascii_digit())) {
                self.scan_number()?
            } else if c == '"' || c == '\'' {
                self.scan_short_string()?
            } else if c == '[' && self.long_bracket_level().is_some() {
                let level = self.long_bracket_level().unwrap_or(0);
                Token::String(self.scan_long_bracket(level, "string")?)
            } else {
                Token::Punctuator(self.scan_punctuator()?)
            }
        };

        let (end_line, end_column) = if token == Token::EOF {
            (line, column)
        } else {
            (self.line, self.column.saturating_sub(1).max(1))
        };
        Ok(Lexeme {
            token,
            line,
            column,
            end_line,
            end_column,
        })
    }

    fn scan_word(&mut self) -> Token {
        let start = self.position;
        while !self.is_at_end() && (self.peek().is_ascii_alphanumeric() || self.peek() == '_') {
            self.advance();
        }
        let word: String = self.chars[start..self.position].iter().collect();
        match Keyword::from_word(&word) {
            Some(k) => Token::Keyword(k),
            None => Token::Identifier(word),
        }
    }

    fn scan_number(&mut self) -> Result<Token, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let start = self.position;
        let hex = self.peek() == '0' && matches!(self.peek_next(), Some('x') | Some('X'));
        let (exp_lower, exp_upper) = if hex { ('p', 'P') } else { ('e', 'E') };

        while !self.is_at_end() {
            let c = self.peek();
            if c == exp_lower || c == exp_upper {
                self.advance();
                if matches!(self.peek(), '+' | '-') {
                    self.advance();
                }
            } else if c.is_ascii_alphanumeric() || c == '.' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.position].iter().collect();
        let value = if hex {
            parse_hex_number(&text[2..])
        } else {
            text.parse::<f64>().ok()
        };
        match value {
            Some(v) => Ok(Token::Number(v)),
            None => Err(syntax_error(
                self.chunk_name,
                line,
                column,
                format!("malformed number near '{}'", text),
            )),
        }
    }

    fn scan_short_string(&mut self) -> Result<Token, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let quote = self.advance();
        let mut bytes: Vec<u8> = Vec::new();

        loop {
            if self.is_at_end() {
                return Err(premature_end(
                    self.chunk_name,
                    line,
                    column,
                    "unfinished string near <eof>",
                ));
            }
            let c = self.peek();
            if c == quote {
                self.advance();
                break;
            }
            match c {
                '\n' | '\r' => {
                    return Err(syntax_error(
                        self.chunk_name,
                        line,
                        column,
                        format!(
                            "unfinished string near '{}{}'",
                            quote,
                            String::from_utf8_lossy(&bytes)
                        ),
                    ));
                }
                '\\' => {
                    self.advance();
                    self.scan_escape(&mut bytes, line, column)?;
                }
                _ => {
                    self.advance();
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }

        Ok(Token::String(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn scan_escape(&mut self, bytes: &mut Vec<u8>, line: usize, column: usize) -> Result<(), SyntaxError> {
        if self.is_at_end() {
            return Err(premature_end(
                self.chunk_name,
                line,
                column,
                "unfinished string near <eof>",
            ));
        }
        let c = self.peek();
        match c {
            'n' => bytes.push(b'\n'),
            't' => bytes.push(b'\t'),
            'r' => bytes.push(b'\r'),
            'a' => bytes.push(0x07),
            'b' => bytes.push(0x08),
            'f' => bytes.push(0x0C),
            'v' => bytes.push(0x0B),
            '\\' => bytes.push(b'\\'),
            '"' => bytes.push(b'"'),
            '\'' => bytes.push(b'\''),
            '\n' | '\r' => {
                self.consume_newline();
                bytes.push(b'\n');
                return Ok(());
            }
            'x' => {
                self.advance();
                let mut value = 0u32;
                for _ in 0..2 {
                    match self.peek().to_digit(16) {
                        Some(d) if !self.is_at_end() => {
                            value = value * 16 + d;
                            self.advance();
                        }
                        _ => return Err(self.escape_error("hexadecimal digit expected")),
                    }
                }
                bytes.push(value as u8);
                return Ok(());
            }
            'z' => {
                self.advance();
                while !self.is_at_end() && self.peek().is_whitespace() {
                    if matches!(self.peek(), '\n' | '\r') {
                        self.consume_newline();
                    } else {
                        self.advance();
                    }
                }
                return Ok(());
            }
            d if d.is_ascii_digit() => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 3 && !self.is_at_end() && self.peek().is_ascii_digit() {
                    value = value * 10 + self.peek().to_digit(10).unwrap_or(0);
                    self.advance();
                    digits += 1;
                }
                if value > 255 {
                    return Err(self.escape_error("decimal escape too large"));
                }
                bytes.push(value as u8);
                return Ok(());
            }
            _ => return Err(self.escape_error("invalid escape sequence")),
        }
        self.advance();
        Ok(())
    }

    fn escape_error(&self, message: &str) -> SyntaxError {
        syntax_error(self.chunk_name, self.line, self.column, message)
    }

    /// Level of the long bracket starting at the current position, if any
    fn long_bracket_level(&self) -> Option<usize> {
        let mut idx = self.position + 1;
        let mut level = 0;
        while self.chars.get(idx) == Some(&'=') {
            level += 1;
            idx += 1;
        }
        (self.chars.get(idx) == Some(&'[')).then_some(level)
    }

    fn scan_long_bracket(&mut self, level: usize, what: &str) -> Result<String, SyntaxError> {
        let (line, column) = (self.line, self.column);
        // opening bracket
        for _ in 0..level + 2 {
            self.advance();
        }
        if matches!(self.peek(), '\n' | '\r') && !self.is_at_end() {
            self.consume_newline();
        }

        let mut text = String::new();
        loop {
            if self.is_at_end() {
                return Err(premature_end(
                    self.chunk_name,
                    line,
                    column,
                    format!("unfinished long {} near <eof>", what),
                ));
            }
            let c = self.peek();
            if c == ']' && self.closes_long_bracket(level) {
                for _ in 0..level + 2 {
                    self.advance();
                }
                return Ok(text);
            }
            if matches!(c, '\n' | '\r') {
                self.consume_newline();
                text.push('\n');
            } else {
                text.push(self.advance());
            }
        }
    }

    fn closes_long_bracket(&self, level: usize) -> bool {
        let mut idx = self.position + 1;
        for _ in 0..level {
            if self.chars.get(idx) != Some(&'=') {
                return false;
            }
            idx += 1;
        }
        self.chars.get(idx) == Some(&']')
    }

    fn scan_punctuator(&mut self) -> Result<Punctuator, SyntaxError> {
        let (line, column) = (self.line, self.column);
        let c = self.advance();
        let p = match c {
            '+' => Punctuator::Plus,
            '-' => Punctuator::Minus,
            '*' => Punctuator::Star,
            '/' => Punctuator::Slash,
            '%' => Punctuator::Percent,
            '^' => Punctuator::Caret,
            '#' => Punctuator::Hash,
            '(' => Punctuator::LParen,
            ')' => Punctuator::RParen,
            '{' => Punctuator::LBrace,
            '}' => Punctuator::RBrace,
            '[' => Punctuator::LBracket,
            ']' => Punctuator::RBracket,
            ';' => Punctuator::Semicolon,
            ',' => Punctuator::Comma,
            '=' if self.match_char('=') => Punctuator::EqEq,
            '=' => Punctuator::Assign,
            '<' if self.match_char('=') => Punctuator::LtEq,
            '<' => Punctuator::Lt,
            '>' if self.match_char('=') => Punctuator::GtEq,
            '>' => Punctuator::Gt,
            ':' if self.match_char(':') => Punctuator::DoubleColon,
            ':' => Punctuator::Colon,
            '~' if self.match_char('=') => Punctuator::NotEq,
            '.' if self.match_char('.') => {
                if self.match_char('.') {
                    Punctuator::Ellipsis
                } else {
                    Punctuator::Concat
                }
            }
            '.' => Punctuator::Dot,
            other => {
                return Err(syntax_error(
                    self.chunk_name,
                    line,
                    column,
                    format!("unexpected symbol near '{}'", other),
                ))
            }
        };
        Ok(p)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        while !self.is_at_end() {
            match self.peek() {
                '\n' | '\r' => self.consume_newline(),
                c if c.is_whitespace() => {
                    self.advance();
                }
                '-' if self.peek_next() == Some('-') => {
                    self.advance();
                    self.advance();
                    if self.peek() == '[' && !self.is_at_end() {
                        if let Some(level) = self.long_bracket_level() {
                            self.scan_long_bracket(level, "comment")?;
                            continue;
                        }
                    }
                    while !self.is_at_end() && !matches!(self.peek(), '\n' | '\r') {
                        self.advance();
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    /// Consume one line terminator (`\n`, `\r`, `\r\n` or `\n\r`)
    fn consume_newline(&mut self) {
        let first = self.chars[self.position];
        self.position += 1;
        if let Some(&second) = self.chars.get(self.position) {
            if matches!(second, '\n' | '\r') && second != first {
                self.position += 1;
            }
        }
        self.line += 1;
        self.column = 1;
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.position]
        }
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.position + 1).copied()
    }

    fn advance(&mut self) -> char {
        let ch = self.chars[self.position];
        self.position += 1;
        self.column += 1;
        ch
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.position] != expected {
            false
        } else {
            self.position += 1;
            self.column += 1;
            true
        }
    }
}

/// Parse the part of a hex numeral after `0x`: hex digits with an optional
/// fraction and an optional binary exponent
fn parse_hex_number(text: &str) -> Option<f64> {
    let (mantissa, exponent) = match text.find(['p', 'P']) {
        Some(idx) => (&text[..idx], Some(&text[idx + 1..])),
        None => (text, None),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(idx) => (&mantissa[..idx], &mantissa[idx + 1..]),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let mut value = 0f64;
    for c in int_part.chars() {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }
    let mut scale = 1.0 / 16.0;
    for c in frac_part.chars() {
        value += f64::from(c.to_digit(16)?) * scale;
        scale /= 16.0;
    }
    if let Some(exp) = exponent {
        let exp: i32 = exp.parse().ok()?;
        value *= 2f64.powi(exp);
    }
    Some(value)
}
