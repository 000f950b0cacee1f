//! Expression grammar used inside `{...}` interpolations and attribute
//! values. A small hand-rolled recursive-descent parser; precedence climbs
//! from `||` at the bottom to postfix call/field/index at the top.

use crate::ast::{BinaryOp, Expr, Position, Span, UnaryOp};
use crate::error::{ErrorKind, ParseError};

/// Parse an expression source fragment. `base` is the span the fragment
/// occupies in the template file; error spans are re-anchored onto it so
/// diagnostics point into the template, not the fragment.
pub fn parse(source: &str, base: Span) -> Result<Expr, ParseError> {
    let tokens = Lexer::new(source, base).run()?;
    let mut parser = Parser { tokens, pos: 0, source, base };
    let expr = parser.expression()?;
    // A top-level `pattern <- source` generator is only meaningful as a
    // `:for` value; the caller decides whether to accept it.
    let expr = if parser.peek_kind() == Some(&TokKind::Arrow) {
        parser.bump();
        if !expr.is_binding_pattern() {
            return Err(parser.error_at_span(
                base,
                "left side of '<-' must be a variable or list of variables",
            ));
        }
        let source_expr = parser.expression()?;
        Expr::Generator { pattern: Box::new(expr), source: Box::new(source_expr) }
    } else {
        expr
    };
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => {
            let span = parser.anchor(tok.start, tok.end);
            Err(parser.error_at_span(span, &format!("unexpected '{}' after expression", tok.text)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokKind {
    Ident,
    Int,
    Float,
    Str,
    Sym,
    Assign,
    Capture, // &name/arity
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Bang,
    Star,
    Slash,
    Plus,
    Minus,
    Concat,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Arrow, // <-
}

#[derive(Debug, Clone)]
struct Tok {
    kind: TokKind,
    text: String,
    start: usize,
    end: usize,
}

struct Lexer<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    pos: usize,
    base: Span,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, base: Span) -> Self {
        Self { source, chars: source.char_indices().collect(), pos: 0, base }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map_or(self.source.len(), |&(i, _)| i)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn error(&self, start: usize, message: &str) -> ParseError {
        let span = anchor(self.source, self.base, start, self.offset().max(start + 1));
        ParseError::new(ErrorKind::UnexpectedToken, message, span)
    }

    fn run(mut self) -> Result<Vec<Tok>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(c) = self.peek() {
            let start = self.offset();
            if c.is_whitespace() {
                self.bump();
                continue;
            }
            let kind = match c {
                '(' => self.punct(TokKind::LParen),
                ')' => self.punct(TokKind::RParen),
                '[' => self.punct(TokKind::LBracket),
                ']' => self.punct(TokKind::RBracket),
                '{' => self.punct(TokKind::LBrace),
                '}' => self.punct(TokKind::RBrace),
                ',' => self.punct(TokKind::Comma),
                '.' => self.punct(TokKind::Dot),
                '*' => self.punct(TokKind::Star),
                '/' => self.punct(TokKind::Slash),
                '-' => self.punct(TokKind::Minus),
                '!' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokKind::NotEq
                    } else {
                        TokKind::Bang
                    }
                }
                '+' => {
                    self.bump();
                    if self.peek() == Some('+') {
                        self.bump();
                        TokKind::Concat
                    } else {
                        TokKind::Plus
                    }
                }
                '=' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokKind::EqEq
                    } else {
                        return Err(self.error(start, "expected '==' for equality"));
                    }
                }
                '<' => {
                    self.bump();
                    match self.peek() {
                        Some('-') => {
                            self.bump();
                            TokKind::Arrow
                        }
                        Some('=') => {
                            self.bump();
                            TokKind::LtEq
                        }
                        _ => TokKind::Lt,
                    }
                }
                '>' => {
                    self.bump();
                    if self.peek() == Some('=') {
                        self.bump();
                        TokKind::GtEq
                    } else {
                        TokKind::Gt
                    }
                }
                '|' => {
                    self.bump();
                    if self.peek() == Some('|') {
                        self.bump();
                        TokKind::OrOr
                    } else {
                        return Err(self.error(start, "expected '||'"));
                    }
                }
                '&' => {
                    self.bump();
                    if self.peek() == Some('&') {
                        self.bump();
                        TokKind::AndAnd
                    } else {
                        self.capture(start)?;
                        tokens.push(self.finish_tok(TokKind::Capture, start));
                        continue;
                    }
                }
                '"' | '\'' => {
                    self.string(c, start)?;
                    tokens.push(self.finish_tok(TokKind::Str, start));
                    continue;
                }
                ':' => {
                    self.bump();
                    if self.peek().is_some_and(is_ident_start) {
                        self.ident();
                        tokens.push(self.finish_tok(TokKind::Sym, start));
                        continue;
                    }
                    TokKind::Colon
                }
                '@' => {
                    self.bump();
                    if !self.peek().is_some_and(is_ident_start) {
                        return Err(self.error(start, "expected a name after '@'"));
                    }
                    self.ident();
                    tokens.push(self.finish_tok(TokKind::Assign, start));
                    continue;
                }
                c if c.is_ascii_digit() => {
                    let kind = self.number();
                    tokens.push(self.finish_tok(kind, start));
                    continue;
                }
                c if is_ident_start(c) => {
                    self.ident();
                    tokens.push(self.finish_tok(TokKind::Ident, start));
                    continue;
                }
                other => {
                    return Err(self.error(start, &format!("unexpected character '{}'", other)));
                }
            };
            tokens.push(self.finish_tok(kind, start));
        }
        Ok(tokens)
    }

    fn punct(&mut self, kind: TokKind) -> TokKind {
        self.bump();
        kind
    }

    fn finish_tok(&self, kind: TokKind, start: usize) -> Tok {
        let end = self.offset();
        Tok { kind, text: self.source[start..end].to_string(), start, end }
    }

    fn ident(&mut self) {
        while self.peek().is_some_and(is_ident_continue) {
            self.bump();
        }
    }

    fn number(&mut self) -> TokKind {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump();
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
                self.bump();
            }
            TokKind::Float
        } else {
            TokKind::Int
        }
    }

    fn string(&mut self, quote: char, start: usize) -> Result<(), ParseError> {
        self.bump();
        loop {
            match self.bump() {
                None => return Err(self.error(start, "unterminated string literal")),
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some(_) => {}
            }
        }
    }

    fn capture(&mut self, start: usize) -> Result<(), ParseError> {
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error(start, "expected a function name after '&'"));
        }
        self.ident();
        if self.peek() != Some('/') {
            return Err(self.error(start, "expected '/arity' in function capture"));
        }
        self.bump();
        if !self.peek().is_some_and(|c| c.is_ascii_digit()) {
            return Err(self.error(start, "expected an arity after '/' in function capture"));
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Map a local byte range inside the fragment onto the fragment's span in
/// the template file.
fn anchor(source: &str, base: Span, start: usize, end: usize) -> Span {
    Span { start: anchor_pos(source, base.start, start), end: anchor_pos(source, base.start, end) }
}

fn anchor_pos(source: &str, base: Position, offset: usize) -> Position {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let lines = before.matches('\n').count();
    let col_chars = before.rsplit('\n').next().unwrap_or("").chars().count();
    if lines == 0 {
        Position { byte: base.byte + offset, line: base.line, col: base.col + col_chars }
    } else {
        Position { byte: base.byte + offset, line: base.line + lines, col: col_chars }
    }
}

struct Parser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    source: &'a str,
    base: Span,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokKind> {
        self.peek().map(|t| &t.kind)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokKind) -> bool {
        if self.peek_kind() == Some(&kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokKind, what: &str) -> Result<Tok, ParseError> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                let tok = tok.clone();
                self.pos += 1;
                Ok(tok)
            }
            _ => Err(self.unexpected(what)),
        }
    }

    fn anchor(&self, start: usize, end: usize) -> Span {
        anchor(self.source, self.base, start, end)
    }

    fn error_at_span(&self, span: Span, message: &str) -> ParseError {
        ParseError::new(ErrorKind::UnexpectedToken, message, span)
    }

    fn unexpected(&self, what: &str) -> ParseError {
        match self.peek() {
            Some(tok) => {
                let span = self.anchor(tok.start, tok.end);
                self.error_at_span(span, &format!("expected {}, found '{}'", what, tok.text))
            }
            None => {
                let span = Span::point(self.base.end);
                self.error_at_span(span, &format!("expected {}, found end of expression", what))
            }
        }
    }

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat(TokKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.eat(TokKind::AndAnd) {
            let rhs = self.equality()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokKind::EqEq) => BinaryOp::Eq,
                Some(TokKind::NotEq) => BinaryOp::NotEq,
                _ => break,
            };
            self.bump();
            let rhs = self.comparison()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.concat()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokKind::Lt) => BinaryOp::Lt,
                Some(TokKind::LtEq) => BinaryOp::LtEq,
                Some(TokKind::Gt) => BinaryOp::Gt,
                Some(TokKind::GtEq) => BinaryOp::GtEq,
                _ => break,
            };
            self.bump();
            let rhs = self.concat()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        while self.eat(TokKind::Concat) {
            let rhs = self.additive()?;
            lhs = binary(BinaryOp::Concat, lhs, rhs);
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokKind::Plus) => BinaryOp::Add,
                Some(TokKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokKind::Star) => BinaryOp::Mul,
                Some(TokKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(TokKind::Bang) {
            let operand = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Not, operand: Box::new(operand) });
        }
        if self.eat(TokKind::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary { op: UnaryOp::Neg, operand: Box::new(operand) });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek_kind() {
                Some(TokKind::Dot) => {
                    self.bump();
                    let field = self.expect(TokKind::Ident, "a field name")?;
                    expr = Expr::Field { base: Box::new(expr), field: field.text };
                }
                Some(TokKind::LBracket) => {
                    self.bump();
                    let index = self.expression()?;
                    self.expect(TokKind::RBracket, "']'")?;
                    expr = Expr::Index { base: Box::new(expr), index: Box::new(index) };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let tok = match self.bump() {
            Some(tok) => tok,
            None => return Err(self.unexpected("an expression")),
        };
        match tok.kind {
            TokKind::Int => {
                let digits: String = tok.text.chars().filter(|&c| c != '_').collect();
                match digits.parse::<i64>() {
                    Ok(n) => Ok(Expr::Int(n)),
                    Err(_) => Err(self.error_at_span(
                        self.anchor(tok.start, tok.end),
                        "integer literal out of range",
                    )),
                }
            }
            TokKind::Float => {
                let digits: String = tok.text.chars().filter(|&c| c != '_').collect();
                match digits.parse::<f64>() {
                    Ok(n) => Ok(Expr::Float(n)),
                    Err(_) => Err(self.error_at_span(
                        self.anchor(tok.start, tok.end),
                        "invalid float literal",
                    )),
                }
            }
            TokKind::Str => Ok(Expr::Str(unquote(&tok.text))),
            TokKind::Sym => Ok(Expr::Sym(tok.text[1..].to_string())),
            TokKind::Assign => Ok(Expr::Assign(tok.text[1..].to_string())),
            TokKind::Capture => {
                let body = &tok.text[1..];
                let (name, arity) = match body.split_once('/') {
                    Some((name, arity)) => (name, arity),
                    None => ("", ""),
                };
                let arity = arity.parse::<usize>().map_err(|_| {
                    self.error_at_span(self.anchor(tok.start, tok.end), "invalid capture arity")
                })?;
                Ok(Expr::Capture { name: name.to_string(), arity })
            }
            TokKind::Ident => match tok.text.as_str() {
                "nil" => Ok(Expr::Nil),
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                _ => {
                    if self.eat(TokKind::LParen) {
                        let args = self.comma_separated(TokKind::RParen, "')'")?;
                        Ok(Expr::Call { name: tok.text, args })
                    } else {
                        Ok(Expr::Var(tok.text))
                    }
                }
            },
            TokKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokKind::RParen, "')'")?;
                Ok(inner)
            }
            TokKind::LBracket => {
                let items = self.comma_separated(TokKind::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            TokKind::LBrace => self.map_literal(),
            _ => {
                let span = self.anchor(tok.start, tok.end);
                Err(self.error_at_span(span, &format!("expected an expression, found '{}'", tok.text)))
            }
        }
    }

    fn comma_separated(&mut self, close: TokKind, close_what: &str) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        if self.eat(close.clone()) {
            return Ok(items);
        }
        loop {
            items.push(self.expression()?);
            if self.eat(TokKind::Comma) {
                // Trailing comma before the closer is accepted.
                if self.eat(close.clone()) {
                    return Ok(items);
                }
                continue;
            }
            self.expect(close, close_what)?;
            return Ok(items);
        }
    }

    fn map_literal(&mut self) -> Result<Expr, ParseError> {
        let mut pairs = Vec::new();
        if self.eat(TokKind::RBrace) {
            return Ok(Expr::Map(pairs));
        }
        loop {
            let key = match self.bump() {
                Some(tok) => match tok.kind {
                    TokKind::Ident => Expr::Sym(tok.text),
                    TokKind::Str => Expr::Str(unquote(&tok.text)),
                    TokKind::Int => {
                        let digits: String = tok.text.chars().filter(|&c| c != '_').collect();
                        match digits.parse::<i64>() {
                            Ok(n) => Expr::Int(n),
                            Err(_) => {
                                return Err(self.error_at_span(
                                    self.anchor(tok.start, tok.end),
                                    "integer literal out of range",
                                ));
                            }
                        }
                    }
                    _ => {
                        let span = self.anchor(tok.start, tok.end);
                        return Err(self.error_at_span(
                            span,
                            &format!("expected a map key, found '{}'", tok.text),
                        ));
                    }
                },
                None => return Err(self.unexpected("a map key")),
            };
            self.expect(TokKind::Colon, "':' after map key")?;
            let value = self.expression()?;
            pairs.push((key, value));
            if self.eat(TokKind::Comma) {
                if self.eat(TokKind::RBrace) {
                    return Ok(Expr::Map(pairs));
                }
                continue;
            }
            self.expect(TokKind::RBrace, "'}'")?;
            return Ok(Expr::Map(pairs));
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

fn unquote(text: &str) -> String {
    let inner = &text[1..text.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(source: &str) -> Expr {
        parse(source, Span::default()).unwrap()
    }

    #[test]
    fn literals() {
        assert_eq!(parse_str("nil"), Expr::Nil);
        assert_eq!(parse_str("true"), Expr::Bool(true));
        assert_eq!(parse_str("42"), Expr::Int(42));
        assert_eq!(parse_str("1_000"), Expr::Int(1000));
        assert_eq!(parse_str("3.5"), Expr::Float(3.5));
        assert_eq!(parse_str("\"hi\\n\""), Expr::Str("hi\n".into()));
        assert_eq!(parse_str(":ok"), Expr::Sym("ok".into()));
    }

    #[test]
    fn assigns_vars_and_captures() {
        assert_eq!(parse_str("@user"), Expr::Assign("user".into()));
        assert_eq!(parse_str("item"), Expr::Var("item".into()));
        assert_eq!(
            parse_str("&format_name/2"),
            Expr::Capture { name: "format_name".into(), arity: 2 }
        );
    }

    #[test]
    fn precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let expr = parse_str("1 + 2 * 3");
        match expr {
            Expr::Binary { op: BinaryOp::Add, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
        let expr = parse_str("@a == 1 && !@b");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn postfix_chain() {
        let expr = parse_str("@user.address[0].city");
        assert!(matches!(expr, Expr::Field { field, .. } if field == "city"));
    }

    #[test]
    fn collections() {
        assert_eq!(
            parse_str("[1, 2, 3]"),
            Expr::List(vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)])
        );
        assert_eq!(
            parse_str("{class: \"btn\", \"id\": 3}"),
            Expr::Map(vec![
                (Expr::Sym("class".into()), Expr::Str("btn".into())),
                (Expr::Str("id".into()), Expr::Int(3)),
            ])
        );
    }

    #[test]
    fn generator_form() {
        let expr = parse_str("item <- @items");
        match expr {
            Expr::Generator { pattern, source } => {
                assert_eq!(*pattern, Expr::Var("item".into()));
                assert_eq!(*source, Expr::Assign("items".into()));
            }
            other => panic!("unexpected parse: {:?}", other),
        }
        // Destructuring pattern on the left.
        assert!(parse_str("[k, v] <- @pairs").is_generator());
    }

    #[test]
    fn generator_requires_binding_pattern() {
        assert!(parse("1 <- @items", Span::default()).is_err());
    }

    #[test]
    fn trailing_garbage_is_an_error() {
        let err = parse("@a @b", Span::default()).unwrap_err();
        assert!(err.to_string().contains("unexpected"));
    }

    #[test]
    fn error_spans_are_anchored() {
        let base = Span {
            start: Position { byte: 100, line: 4, col: 10 },
            end: Position { byte: 106, line: 4, col: 16 },
        };
        let err = parse("@a ???", base).unwrap_err();
        assert_eq!(err.line(), 5);
        assert_eq!(err.column(), 14);
    }
}
