//! Lexical scanner for Java source.
//!
//! Produces a flat token stream with comments, string literals, text blocks
//! and character literals collapsed, so that keywords hidden inside them never
//! look like declarations. Malformed input (an unterminated comment or string)
//! is consumed to the end instead of being rejected; the compiler reports it.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Ident(&'a str),
    Symbol(char),
    Literal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spanned<'a> {
    pub token: Token<'a>,
    /// Byte offset one past the end of the token
    pub end: usize,
}

pub fn tokenize(src: &str) -> Vec<Spanned<'_>> {
    Scanner { src, pos: 0 }.collect()
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            let rest = self.rest();
            if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if let Some(body) = rest.strip_prefix("/*") {
                self.pos += body.find("*/").map_or(rest.len(), |i| i + 4);
            } else if self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            } else {
                break;
            }
        }
    }

    /// Skips a string or char literal whose opening quote was already consumed
    fn skip_quoted(&mut self, quote: char) {
        while let Some(c) = self.bump() {
            match c {
                '\\' => {
                    self.bump();
                }
                '\n' => break,
                c if c == quote => break,
                _ => {}
            }
        }
    }

    /// Skips a text block whose opening `"""` was already consumed
    fn skip_text_block(&mut self) {
        while !self.rest().is_empty() {
            if self.rest().starts_with("\"\"\"") {
                self.pos += 3;
                return;
            }
            if self.bump() == Some('\\') {
                self.bump();
            }
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Spanned<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.skip_trivia();
        let start = self.pos;
        let c = self.bump()?;

        let token = match c {
            '"' if self.rest().starts_with("\"\"") => {
                self.pos += 2;
                self.skip_text_block();
                Token::Literal
            }
            '"' | '\'' => {
                self.skip_quoted(c);
                Token::Literal
            }
            c if c.is_ascii_digit() => {
                self.eat_while(|c| c.is_alphanumeric() || c == '_' || c == '.');
                Token::Literal
            }
            c if is_ident_start(c) => {
                self.eat_while(is_ident_part);
                Token::Ident(&self.src[start..self.pos])
            }
            c => Token::Symbol(c),
        };

        Some(Spanned {
            token,
            end: self.pos,
        })
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_part(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}
