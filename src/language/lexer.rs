use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, one_of},
    combinator::{opt, recognize},
    multi::many0,
    sequence::{pair, tuple},
    IResult,
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

fn number_literal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

struct Lexer<'a> {
    src: &'a str,
    offset: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            offset: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while let Some(ch) = self.current() {
            match ch {
                '/' if self.peek() == Some('/') => self.eat_line_comment(),
                '/' if self.peek() == Some('*') => self.eat_block_comment(),
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(),
                '"' => self.lex_string(),
                _ => self.lex_symbol(),
            }
        }
        self.push_token(TokenKind::Eof, self.offset, self.offset);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.offset..]
    }

    fn current(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current() {
            self.offset += ch.len_utf8();
        }
        self.current()
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_line_comment(&mut self) {
        self.bump();
        self.bump();
        while let Some(ch) = self.current() {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn eat_block_comment(&mut self) {
        let start = self.offset;
        self.bump();
        self.bump();
        while let Some(ch) = self.current() {
            if ch == '*' && self.peek() == Some('/') {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
        self.error(start, self.offset, "Unterminated block comment");
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        let slice = match identifier(self.rest()) {
            Ok((_, matched)) => matched,
            Err(_) => {
                self.bump();
                self.error(start, self.offset, "Invalid identifier");
                return;
            }
        };
        self.offset += slice.len();
        let kind = match slice {
            "var" => TokenKind::Var,
            "const" => TokenKind::Const,
            "fn" => TokenKind::Fn,
            "type" => TokenKind::Type,
            "enum" => TokenKind::Enum,
            "import" => TokenKind::Import,
            "as" => TokenKind::As,
            "return" => TokenKind::Return,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "while" => TokenKind::While,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "try" => TokenKind::Try,
            "catch" => TokenKind::Catch,
            "is" => TokenKind::Is,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(slice.to_string()),
        };
        self.push_token(kind, start, self.offset);
    }

    fn lex_number(&mut self) {
        let start = self.offset;
        let text = match number_literal(self.rest()) {
            Ok((_, matched)) => matched,
            Err(_) => {
                self.bump();
                self.error(start, self.offset, "Invalid number literal");
                return;
            }
        };
        self.offset += text.len();
        match text.parse::<f64>() {
            Ok(value) => self.push_token(TokenKind::Number(value), start, self.offset),
            Err(_) => self.error(start, self.offset, "Invalid number literal"),
        }
    }

    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        let mut value = String::new();
        while let Some(ch) = self.current() {
            match ch {
                '"' => {
                    self.bump();
                    let end = self.offset;
                    self.push_token(TokenKind::String(value), start, end);
                    return;
                }
                '\\' => {
                    self.bump();
                    if let Some(escaped) = self.current() {
                        value.push(match escaped {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '0' => '\0',
                            '\\' => '\\',
                            '"' => '"',
                            other => other,
                        });
                        self.bump();
                    } else {
                        break;
                    }
                }
                _ => {
                    value.push(ch);
                    self.bump();
                }
            }
        }
        self.error(start, self.offset, "Unterminated string literal");
    }

    fn lex_symbol(&mut self) {
        let start = self.offset;
        let ch = self.current();
        match ch {
            Some('(') => self.single(TokenKind::LParen),
            Some(')') => self.single(TokenKind::RParen),
            Some('{') => self.single(TokenKind::LBrace),
            Some('}') => self.single(TokenKind::RBrace),
            Some('[') => self.single(TokenKind::LBracket),
            Some(']') => self.single(TokenKind::RBracket),
            Some(',') => self.single(TokenKind::Comma),
            Some(';') => self.single(TokenKind::Semi),
            Some('%') => self.single(TokenKind::Percent),
            Some('^') => self.single(TokenKind::Caret),
            Some('.') => self.pair('.', TokenKind::DotDot, TokenKind::Dot),
            Some(':') => self.pair(':', TokenKind::ColonColon, TokenKind::Colon),
            Some('&') => self.pair('&', TokenKind::AmpersandAmpersand, TokenKind::Ampersand),
            Some('|') => self.pair('|', TokenKind::PipePipe, TokenKind::Pipe),
            Some('!') => self.pair('=', TokenKind::BangEq, TokenKind::Bang),
            Some('<') => self.pair('=', TokenKind::LtEq, TokenKind::Lt),
            Some('>') => self.pair('=', TokenKind::GtEq, TokenKind::Gt),
            Some('+') => self.pair('=', TokenKind::PlusEq, TokenKind::Plus),
            Some('*') => self.pair('=', TokenKind::StarEq, TokenKind::Star),
            Some('/') => self.pair('=', TokenKind::SlashEq, TokenKind::Slash),
            Some('=') => {
                self.bump();
                if self.current() == Some('>') {
                    self.bump();
                    self.push_token(TokenKind::FatArrow, start, self.offset);
                } else if self.current() == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::EqEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Eq, start, self.offset);
                }
            }
            Some('-') => {
                self.bump();
                if self.current() == Some('>') {
                    self.bump();
                    self.push_token(TokenKind::Arrow, start, self.offset);
                } else if self.current() == Some('=') {
                    self.bump();
                    self.push_token(TokenKind::MinusEq, start, self.offset);
                } else {
                    self.push_token(TokenKind::Minus, start, self.offset);
                }
            }
            Some(ch) => {
                self.bump();
                self.error(start, self.offset, format!("Unexpected character '{}'", ch));
            }
            None => {}
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }

    /// Emits `double` when the next char is `second`, otherwise `single`.
    fn pair(&mut self, second: char, double: TokenKind, single: TokenKind) {
        let start = self.offset;
        self.bump();
        if self.current() == Some(second) {
            self.bump();
            self.push_token(double, start, self.offset);
        } else {
            self.push_token(single, start, self.offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_declaration_with_lambda() {
        assert_eq!(
            kinds("const add = (a: Number) => a + 1;"),
            vec![
                TokenKind::Const,
                TokenKind::Identifier("add".into()),
                TokenKind::Eq,
                TokenKind::LParen,
                TokenKind::Identifier("a".into()),
                TokenKind::Colon,
                TokenKind::Identifier("Number".into()),
                TokenKind::RParen,
                TokenKind::FatArrow,
                TokenKind::Identifier("a".into()),
                TokenKind::Plus,
                TokenKind::Number(1.0),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn range_does_not_swallow_number_fraction() {
        assert_eq!(
            kinds("0..10"),
            vec![
                TokenKind::Number(0.0),
                TokenKind::DotDot,
                TokenKind::Number(10.0),
                TokenKind::Eof
            ]
        );
        assert_eq!(kinds("2.5e2"), vec![TokenKind::Number(250.0), TokenKind::Eof]);
    }

    #[test]
    fn hook_operator_and_comments() {
        assert_eq!(
            kinds("x::onChange(f) // trailing\n/* block */"),
            vec![
                TokenKind::Identifier("x".into()),
                TokenKind::ColonColon,
                TokenKind::Identifier("onChange".into()),
                TokenKind::LParen,
                TokenKind::Identifier("f".into()),
                TokenKind::RParen,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes_are_decoded() {
        assert_eq!(
            kinds(r#""a\n\"b\"""#),
            vec![TokenKind::String("a\n\"b\"".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn reports_unterminated_string() {
        let errors = lex("\"open").expect_err("should fail");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("Unterminated"));
    }
}
