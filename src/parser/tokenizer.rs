use crate::ast::{Expr, ExprMarker};
use crate::error::{ErrorKind, ParseError};
use crate::expr;

/// Position in source code (byte offset plus 0-indexed line/column).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Byte offset in source
    pub byte: usize,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed, in characters)
    pub col: usize,
}

impl Position {
    pub fn new() -> Self {
        Self { byte: 0, line: 0, col: 0 }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new()
    }
}

/// Span in source code (a range from start position to end position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn point(pos: Position) -> Self {
        Self { start: pos, end: pos }
    }
}

/// Quote character used for a string-valued attribute. Preserved so the
/// compiler can re-emit the attribute exactly as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Double,
    Single,
}

impl QuoteKind {
    pub fn char(self) -> char {
        match self {
            QuoteKind::Double => '"',
            QuoteKind::Single => '\'',
        }
    }
}

/// Attribute on a tag, component or slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Bare attribute: `disabled` (boolean true)
    Flag,
    /// String literal: attr="value" or attr='value'
    String { value: String, quote: QuoteKind },
    /// Unparsed expression body: attr={source}. The attribute preprocessor
    /// converts this to `Expr` before the stack machine sees it.
    Body { source: String, span: Span },
    /// Parsed expression (post-preprocessing)
    Expr { expr: Expr, span: Span },
}

impl Attribute {
    /// Span of the attribute's value, falling back to the whole attribute.
    pub fn value_span(&self) -> Span {
        match &self.value {
            AttrValue::Body { span, .. } | AttrValue::Expr { span, .. } => *span,
            _ => self.span,
        }
    }
}

/// The name the tokenizer gives to the spread attribute (`{expr}` inside a
/// tag). Its value must evaluate to a key/value mapping.
pub const ROOT_ATTR: &str = "root";

/// Tokens produced by the tokenizer. Tag names are raw: classifying a tag as
/// element, component or slot is the tag policy's job, not the lexer's.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw template text
    Text { text: String, span: Span },
    /// Interpolated expression: `{expr}` in body position
    Expr { marker: ExprMarker, expr: Expr, span: Span },
    /// Opening tag: `<name attrs>` or `<name attrs/>`
    TagOpen {
        raw_name: String,
        name_span: Span,
        attrs: Vec<Attribute>,
        self_closing: bool,
        span: Span,
    },
    /// Closing tag: `</name>`
    TagClose { raw_name: String, span: Span },
}

impl Token {
    pub fn span(&self) -> Span {
        match self {
            Token::Text { span, .. }
            | Token::Expr { span, .. }
            | Token::TagOpen { span, .. }
            | Token::TagClose { span, .. } => *span,
        }
    }
}

/// Tokenize a whole template source.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Tokenizer::new(source).run()
}

pub struct Tokenizer<'a> {
    source: &'a str,
    position: Position,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, position: Position::new() }
    }

    pub fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();

        while !self.at_eof() {
            match self.peek() {
                Some('<') if self.rest().starts_with("<!--") => {
                    self.scan_text(&mut tokens)?;
                }
                Some('<') if self.rest().starts_with("</") => {
                    tokens.push(self.scan_close_tag()?);
                }
                Some('<') if self.tag_starts_here() => {
                    tokens.push(self.scan_open_tag()?);
                }
                Some('{') => {
                    tokens.push(self.scan_interpolation()?);
                }
                _ => {
                    self.scan_text(&mut tokens)?;
                }
            }
        }

        Ok(tokens)
    }

    /// A `<` begins a tag only when followed by a plausible tag-name start:
    /// a letter, `.` (local component), or `:` (slot). Anything else —
    /// `1 < 2`, a stray `<` — is plain text.
    fn tag_starts_here(&self) -> bool {
        let mut chars = self.rest().chars();
        debug_assert_eq!(chars.next(), Some('<'));
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '.' || c == ':' || c == '_')
    }

    fn scan_text(&mut self, tokens: &mut Vec<Token>) -> Result<(), ParseError> {
        let start = self.position;
        let mut text = String::new();

        while let Some(c) = self.peek() {
            if c == '{' {
                break;
            }
            if c == '<' {
                if self.rest().starts_with("<!--") {
                    // HTML comments pass through as text
                    self.consume_comment(&mut text)?;
                    continue;
                }
                if self.rest().starts_with("</") || self.tag_starts_here() {
                    break;
                }
            }
            text.push(c);
            self.advance();
        }

        if !text.is_empty() {
            tokens.push(Token::Text {
                text,
                span: Span { start, end: self.position },
            });
        }
        Ok(())
    }

    fn consume_comment(&mut self, text: &mut String) -> Result<(), ParseError> {
        let comment_start = self.position;
        while !self.at_eof() {
            if self.rest().starts_with("-->") {
                text.push_str("-->");
                self.advance_n(3);
                return Ok(());
            }
            if let Some(c) = self.peek() {
                text.push(c);
            }
            self.advance();
        }
        Err(ParseError::new(
            ErrorKind::UnexpectedToken,
            "This comment is never closed.",
            Span { start: comment_start, end: self.position },
        )
        .with_help("Close with -->"))
    }

    /// Scan `{expr}` in body position. The expression source is handed to the
    /// expression parser right away; body interpolations are output-marked.
    fn scan_interpolation(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        self.advance(); // {
        let (source, body_span) = self.scan_braced(start)?;
        let expr = expr::parse(&source, body_span)?;
        Ok(Token::Expr {
            marker: ExprMarker::Output,
            expr,
            span: Span { start, end: self.position },
        })
    }

    /// Consume a brace-delimited body (opening `{` already consumed),
    /// tracking nested braces and string literals. Returns the inner source
    /// and its span; leaves the cursor past the closing `}`.
    fn scan_braced(&mut self, open_start: Position) -> Result<(String, Span), ParseError> {
        let body_start = self.position;
        let mut depth = 1usize;
        let mut body = String::new();

        while let Some(c) = self.peek() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body_end = self.position;
                        self.advance();
                        return Ok((body, Span { start: body_start, end: body_end }));
                    }
                }
                '"' | '\'' => {
                    body.push(c);
                    self.advance();
                    self.consume_string_into(&mut body, c, open_start)?;
                    continue;
                }
                _ => {}
            }
            body.push(c);
            self.advance();
        }

        Err(ParseError::new(
            ErrorKind::UnterminatedExpression,
            "This expression is never closed.",
            Span { start: open_start, end: self.position },
        )
        .with_help("Close with }"))
    }

    fn consume_string_into(
        &mut self,
        out: &mut String,
        quote: char,
        ctx_start: Position,
    ) -> Result<(), ParseError> {
        while let Some(c) = self.peek() {
            out.push(c);
            self.advance();
            if c == '\\' {
                if let Some(escaped) = self.peek() {
                    out.push(escaped);
                    self.advance();
                }
                continue;
            }
            if c == quote {
                return Ok(());
            }
        }
        Err(ParseError::new(
            ErrorKind::UnexpectedToken,
            "This string is never closed.",
            Span { start: ctx_start, end: self.position },
        ))
    }

    fn scan_close_tag(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        self.advance_n(2); // </
        let name = self.scan_tag_name();
        if name.is_empty() {
            return Err(ParseError::new(
                ErrorKind::UnexpectedToken,
                "Expected a tag name after '</'.",
                Span { start, end: self.position },
            ));
        }
        self.skip_whitespace();
        if self.peek() != Some('>') {
            return Err(ParseError::new(
                ErrorKind::UnterminatedTag,
                format!("This closing tag for <{}> is never finished.", name),
                Span { start, end: self.position },
            )
            .with_help("Close with >"));
        }
        self.advance();
        Ok(Token::TagClose {
            raw_name: name,
            span: Span { start, end: self.position },
        })
    }

    fn scan_open_tag(&mut self) -> Result<Token, ParseError> {
        let start = self.position;
        self.advance(); // <
        let name_start = self.position;
        let name = self.scan_tag_name();
        let name_span = Span { start: name_start, end: self.position };

        let mut attrs = Vec::new();
        let mut self_closing = false;

        loop {
            self.skip_whitespace();
            match self.peek() {
                None => {
                    return Err(ParseError::new(
                        ErrorKind::UnterminatedTag,
                        format!("<{}> is never finished.", name),
                        Span { start, end: self.position },
                    )
                    .with_related(Span { start, end: name_span.end })
                    .with_help("Close the tag with > or />"));
                }
                Some('>') => {
                    self.advance();
                    break;
                }
                Some('/') => {
                    self.advance();
                    if self.peek() != Some('>') {
                        return Err(ParseError::new(
                            ErrorKind::UnexpectedToken,
                            "Expected '>' after '/'.",
                            Span::point(self.position),
                        ));
                    }
                    self.advance();
                    self_closing = true;
                    break;
                }
                Some('{') => {
                    // Spread attribute: `{expr}` merges a whole mapping
                    let attr_start = self.position;
                    self.advance();
                    let (source, body_span) = self.scan_braced(attr_start)?;
                    attrs.push(Attribute {
                        name: ROOT_ATTR.to_string(),
                        value: AttrValue::Body { source, span: body_span },
                        span: Span { start: attr_start, end: self.position },
                    });
                }
                Some(_) => {
                    attrs.push(self.scan_attribute(&name, start)?);
                }
            }
        }

        Ok(Token::TagOpen {
            raw_name: name,
            name_span,
            attrs,
            self_closing,
            span: Span { start, end: self.position },
        })
    }

    fn scan_attribute(&mut self, tag: &str, tag_start: Position) -> Result<Attribute, ParseError> {
        let attr_start = self.position;
        let name = self.scan_attr_name();
        if name.is_empty() {
            return Err(ParseError::new(
                ErrorKind::UnexpectedToken,
                format!("Unexpected character inside <{}>.", tag),
                Span::point(self.position),
            )
            .with_related(Span::point(tag_start)));
        }

        self.skip_whitespace();
        if self.peek() != Some('=') {
            return Ok(Attribute {
                name,
                value: AttrValue::Flag,
                span: Span { start: attr_start, end: self.position },
            });
        }
        self.advance(); // =
        self.skip_whitespace();

        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.advance();
                let mut raw = String::new();
                self.consume_string_into(&mut raw, q, attr_start)?;
                raw.pop(); // drop closing quote
                let quote = if q == '"' { QuoteKind::Double } else { QuoteKind::Single };
                AttrValue::String { value: raw, quote }
            }
            Some('{') => {
                let open = self.position;
                self.advance();
                let (source, body_span) = self.scan_braced(open)?;
                AttrValue::Body { source, span: body_span }
            }
            _ => {
                return Err(ParseError::new(
                    ErrorKind::UnexpectedToken,
                    format!("Expected a value for attribute \"{}\".", name),
                    Span { start: attr_start, end: self.position },
                )
                .with_help("Attribute values are \"strings\" or {expressions}"));
            }
        };

        Ok(Attribute {
            name,
            value,
            span: Span { start: attr_start, end: self.position },
        })
    }

    fn scan_tag_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':') {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn scan_attr_name(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '@' | '.') {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        name
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    fn rest(&self) -> &str {
        &self.source[self.position.byte..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_eof(&self) -> bool {
        self.position.byte >= self.source.len()
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek() {
            self.position.byte += c.len_utf8();
            if c == '\n' {
                self.position.line += 1;
                self.position.col = 0;
            } else {
                self.position.col += 1;
            }
        }
    }

    fn advance_n(&mut self, n: usize) {
        for _ in 0..n {
            self.advance();
        }
    }
}
