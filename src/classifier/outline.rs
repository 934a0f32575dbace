//! Structural outline of a Java compilation unit: the package declaration,
//! the import header, and every top-level type with its visibility and
//! whether it declares an entry point.

use super::scanner::{Spanned, Token, tokenize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Interface,
    Enum,
    Record,
    Annotation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub public: bool,
    pub has_entry_point: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Outline {
    pub package: Option<String>,
    /// Byte offset just past the last leading `package`/`import` declaration
    pub header_end: usize,
    pub types: Vec<TypeDecl>,
    /// A package declaration that was not the first statement, or a second one
    pub misplaced_package: bool,
}

impl Outline {
    pub fn public_types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.iter().filter(|t| t.public)
    }
}

pub fn outline(src: &str) -> Outline {
    let tokens = tokenize(src);
    Walker {
        tokens: &tokens,
        pos: 0,
    }
    .walk()
}

struct Walker<'t, 'a> {
    tokens: &'t [Spanned<'a>],
    pos: usize,
}

impl<'a> Walker<'_, 'a> {
    fn token(&self, idx: usize) -> Option<Token<'a>> {
        self.tokens.get(idx).map(|s| s.token)
    }

    fn prev_is_dot(&self, idx: usize) -> bool {
        idx > 0 && self.token(idx - 1) == Some(Token::Symbol('.'))
    }

    /// Index of the first `target` symbol at or after `from`
    fn find_symbol(&self, from: usize, target: char) -> Option<usize> {
        (from..self.tokens.len()).find(|&i| self.token(i) == Some(Token::Symbol(target)))
    }

    /// Index of the parenthesis closing the one at `open`
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for i in open..self.tokens.len() {
            match self.token(i) {
                Some(Token::Symbol('(')) => depth += 1,
                Some(Token::Symbol(')')) => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn walk(mut self) -> Outline {
        let mut outline = Outline::default();
        let mut modifiers: Vec<&str> = Vec::new();
        let mut in_header = true;
        let mut seen_import = false;
        let mut depth = 0usize;

        while let Some(token) = self.token(self.pos) {
            if depth > 0 {
                match token {
                    Token::Symbol('{') => depth += 1,
                    Token::Symbol('}') => {
                        depth -= 1;
                        if depth == 0 {
                            modifiers.clear();
                        }
                    }
                    _ => {}
                }
                self.pos += 1;
                continue;
            }

            match token {
                Token::Ident("package") if !self.prev_is_dot(self.pos) => {
                    let end = self.find_symbol(self.pos, ';');
                    let first = in_header && !seen_import && outline.package.is_none();
                    if first && modifiers.is_empty() {
                        outline.package = Some(self.qualified_name(self.pos + 1, end));
                        if let Some(end) = end {
                            outline.header_end = self.tokens[end].end;
                        }
                    } else {
                        outline.misplaced_package = true;
                    }
                    self.pos = end.map_or(self.tokens.len(), |e| e + 1);
                    continue;
                }
                Token::Ident("import") if modifiers.is_empty() && !self.prev_is_dot(self.pos) => {
                    let end = self.find_symbol(self.pos, ';');
                    if in_header {
                        seen_import = true;
                        if let Some(end) = end {
                            outline.header_end = self.tokens[end].end;
                        }
                    }
                    self.pos = end.map_or(self.tokens.len(), |e| e + 1);
                    continue;
                }
                Token::Symbol('@') if self.token(self.pos + 1) == Some(Token::Ident("interface")) => {
                    in_header = false;
                    self.pos += 1;
                    if self.declare(TypeKind::Annotation, &modifiers, &mut outline) {
                        modifiers.clear();
                        continue;
                    }
                }
                Token::Ident(keyword @ ("class" | "interface" | "enum" | "record"))
                    if !self.prev_is_dot(self.pos) =>
                {
                    in_header = false;
                    let kind = match keyword {
                        "class" => TypeKind::Class,
                        "interface" => TypeKind::Interface,
                        "enum" => TypeKind::Enum,
                        _ => TypeKind::Record,
                    };
                    let is_record_decl = kind != TypeKind::Record
                        || matches!(
                            self.token(self.pos + 2),
                            Some(Token::Symbol('(') | Token::Symbol('<'))
                        );
                    if is_record_decl && self.declare(kind, &modifiers, &mut outline) {
                        modifiers.clear();
                        continue;
                    }
                    modifiers.push(keyword);
                }
                Token::Symbol(';') => {
                    in_header = false;
                    modifiers.clear();
                }
                Token::Symbol('{') => {
                    in_header = false;
                    depth += 1;
                }
                Token::Ident(word) => {
                    in_header = false;
                    modifiers.push(word);
                }
                _ => in_header = false,
            }
            self.pos += 1;
        }

        outline
    }

    fn qualified_name(&self, from: usize, end: Option<usize>) -> String {
        let end = end.unwrap_or(self.tokens.len());
        (from..end)
            .filter_map(|i| match self.token(i) {
                Some(Token::Ident(part)) => Some(part),
                Some(Token::Symbol('.')) => Some("."),
                _ => None,
            })
            .collect()
    }

    /// Records a type declaration whose keyword sits at `self.pos`, and moves
    /// past its body. Returns false when the keyword is not followed by a name.
    fn declare(&mut self, kind: TypeKind, modifiers: &[&str], outline: &mut Outline) -> bool {
        let Some(Token::Ident(name)) = self.token(self.pos + 1) else {
            return false;
        };

        let (has_entry_point, next) = match self.find_symbol(self.pos + 2, '{') {
            Some(open) => self.scan_body(open, kind),
            None => (false, self.tokens.len()),
        };

        outline.types.push(TypeDecl {
            name: name.to_string(),
            kind,
            public: modifiers.contains(&"public"),
            has_entry_point,
        });
        self.pos = next;
        true
    }

    /// Scans a type body opened at `open`, returning whether a direct member
    /// is an entry point and the index just past the closing brace.
    fn scan_body(&self, open: usize, kind: TypeKind) -> (bool, usize) {
        let mut depth = 1usize;
        let mut member: Vec<&str> = Vec::new();
        let mut has_entry_point = false;
        let mut i = open + 1;

        while depth > 0 {
            let Some(token) = self.token(i) else {
                break;
            };
            match token {
                Token::Symbol('{') => {
                    depth += 1;
                    member.clear();
                }
                Token::Symbol('}') => {
                    depth -= 1;
                    member.clear();
                }
                Token::Symbol(';') if depth == 1 => member.clear(),
                Token::Ident("main")
                    if depth == 1
                        && self.token(i - 1) == Some(Token::Ident("void"))
                        && self.token(i + 1) == Some(Token::Symbol('(')) =>
                {
                    let public = kind == TypeKind::Interface || member.contains(&"public");
                    if public && member.contains(&"static") && self.main_parameters(i + 1) {
                        has_entry_point = true;
                    }
                    member.push("main");
                }
                Token::Ident(word) if depth == 1 => member.push(word),
                _ => {}
            }
            i += 1;
        }

        (has_entry_point, i)
    }

    fn main_parameters(&self, open: usize) -> bool {
        let Some(close) = self.matching_paren(open) else {
            return false;
        };

        let mut params = Vec::with_capacity(close - open);
        let mut i = open + 1;
        while i < close {
            match self.token(i) {
                Some(Token::Symbol('@')) => i += 1,
                Some(Token::Ident("final")) => {}
                Some(token) => params.push(token),
                None => break,
            }
            i += 1;
        }

        is_string_array_parameter(&params)
    }
}

fn is_string_array_parameter(params: &[Token<'_>]) -> bool {
    let rest = match params {
        [Token::Ident("String"), rest @ ..] => rest,
        [
            Token::Ident("java"),
            Token::Symbol('.'),
            Token::Ident("lang"),
            Token::Symbol('.'),
            Token::Ident("String"),
            rest @ ..,
        ] => rest,
        _ => return false,
    };

    matches!(
        rest,
        [Token::Symbol('['), Token::Symbol(']'), Token::Ident(_)]
            | [
                Token::Symbol('.'),
                Token::Symbol('.'),
                Token::Symbol('.'),
                Token::Ident(_)
            ]
            | [Token::Ident(_), Token::Symbol('['), Token::Symbol(']')]
    )
}
