//! The compile engine: a stack machine over the token stream. Opening tags
//! push frames, closing tags pop them, and the accumulator collects the
//! alternating static/dynamic output program. Component and slot bodies are
//! compiled into their own sub-trees via accumulator checkpoints.

pub mod acc;
pub mod attrs;
pub mod registry;
pub mod slots;

use std::collections::BTreeMap;

use crate::ast::{
    ComponentCallExpr, ComponentRef, CompiledTree, Expr, ExprMarker, Segment, SlotEntryExpr, Span,
    TagMeta,
};
use crate::error::{ErrorKind, ParseError};
use crate::parser::{AttrValue, Attribute, Token, ROOT_ATTR};
use crate::policy::{BodyContext, TagKind, TagPolicy};

use acc::{Acc, AccState};
use attrs::{prepare, PreparedTag};
use registry::{literal_kind, AttrInfo, CallSink, ComponentCall, LiteralKind, SlotCallInfo};
use slots::SlotEntry;

struct Frame {
    kind: TagKind,
    name: String,
    attrs: Vec<Attribute>,
    meta: TagMeta,
    span: Span,
    /// Saved outer accumulator body, for frames that compile a sub-tree.
    checkpoint: Option<AccState>,
}

impl Frame {
    /// The tag name as written, sigil included.
    fn display_name(&self) -> String {
        match self.kind {
            TagKind::Element | TagKind::RemoteComponent => self.name.clone(),
            TagKind::LocalComponent => format!(".{}", self.name),
            TagKind::Slot => format!(":{}", self.name),
        }
    }
}

pub struct Compiler<'a> {
    policy: &'a dyn TagPolicy,
    sink: Option<&'a dyn CallSink>,
    file: String,
    acc: Acc,
    frames: Vec<Frame>,
    /// One group per open component frame, collecting its slot entries.
    slot_groups: Vec<Vec<SlotEntry>>,
    /// Whitespace directly after a closed slot belongs to the markup between
    /// slot entries, not the component body.
    after_slot_close: bool,
    annotate_close: Option<String>,
}

impl<'a> Compiler<'a> {
    pub fn new(policy: &'a dyn TagPolicy, sink: Option<&'a dyn CallSink>, file: &str) -> Self {
        let mut compiler = Self {
            policy,
            sink,
            file: file.to_string(),
            acc: Acc::new(),
            frames: Vec::new(),
            slot_groups: Vec::new(),
            after_slot_close: false,
            annotate_close: None,
        };
        if let Some((open, close)) = policy.annotate_body(&BodyContext { file }) {
            compiler.acc.push_text(&open);
            compiler.annotate_close = Some(close);
        }
        compiler
    }

    pub fn step(&mut self, token: Token) -> Result<(), ParseError> {
        match token {
            Token::Text { text, .. } => {
                if self.after_slot_close {
                    if text.trim().is_empty() {
                        return Ok(());
                    }
                    self.after_slot_close = false;
                    self.acc.push_text(text.trim_start());
                } else {
                    self.acc.push_text(&text);
                }
                Ok(())
            }
            Token::Expr { marker, expr, span } => {
                self.after_slot_close = false;
                if expr.is_generator() {
                    return Err(ParseError::new(
                        ErrorKind::UnexpectedToken,
                        "a generator is only valid as a :for value",
                        span,
                    ));
                }
                self.acc.push_expr(marker, expr);
                Ok(())
            }
            Token::TagOpen { raw_name, name_span, attrs, self_closing, span } => {
                self.after_slot_close = false;
                let tag = prepare(self.policy, &raw_name, name_span, attrs, self_closing, span)?;
                match tag.kind {
                    TagKind::Element => self.open_element(tag),
                    TagKind::LocalComponent | TagKind::RemoteComponent => self.open_component(tag),
                    TagKind::Slot => self.open_slot(tag),
                }
            }
            Token::TagClose { raw_name, span } => self.close(&raw_name, span),
        }
    }

    pub fn finish(mut self) -> Result<CompiledTree, ParseError> {
        if let Some(frame) = self.frames.first() {
            return Err(ParseError::new(
                ErrorKind::UnclosedTag,
                format!("<{}> was never closed", frame.display_name()),
                frame.span,
            )
            .with_help(format!(
                "add </{}> before the end of the template",
                frame.display_name()
            )));
        }
        if let Some(close) = self.annotate_close.take() {
            self.acc.push_text(&close);
        }
        Ok(self.acc.dump())
    }

    fn open_element(&mut self, tag: PreparedTag) -> Result<(), ParseError> {
        let checkpoint = if tag.meta.has_control() { Some(self.acc.checkpoint()) } else { None };

        let void = self.policy.is_void(&tag.name);
        self.acc.push_text(&format!("<{}", tag.name));
        self.emit_attributes(&tag.attrs);
        if void {
            self.acc.push_text(if tag.self_closing { "/>" } else { ">" });
        } else if tag.self_closing {
            self.acc.push_text(&format!("></{}>", tag.name));
        } else {
            self.acc.push_text(">");
        }

        if void || tag.self_closing {
            if let Some(saved) = checkpoint {
                let inner = self.acc.restore(saved);
                let expr = wrap_control(&tag.meta, Expr::Nested(Box::new(inner)));
                self.acc.push_expr(ExprMarker::Output, expr);
            }
            return Ok(());
        }
        self.frames.push(Frame {
            kind: TagKind::Element,
            name: tag.name,
            attrs: Vec::new(),
            meta: tag.meta,
            span: tag.span,
            checkpoint,
        });
        Ok(())
    }

    /// Emit element attributes into the static/dynamic stream.
    fn emit_attributes(&mut self, attrs: &[Attribute]) {
        for attr in attrs {
            match &attr.value {
                AttrValue::Flag => {
                    self.acc.push_text(&format!(" {}", attr.name));
                }
                AttrValue::String { value, quote } => {
                    let q = quote.char();
                    self.acc.push_text(&format!(" {}={}{}{}", attr.name, q, value, q));
                }
                AttrValue::Expr { expr, .. } if attr.name == ROOT_ATTR => {
                    self.acc.push_text(" ");
                    self.acc
                        .push_expr(ExprMarker::Output, Expr::AttrSpread(Box::new(expr.clone())));
                }
                AttrValue::Expr { expr, .. } => {
                    self.acc.push_text(&format!(" {}=\"", attr.name));
                    self.acc.push_expr(ExprMarker::Output, expr.clone());
                    self.acc.push_text("\"");
                }
                // The preprocessor parsed every body
                AttrValue::Body { .. } => {}
            }
        }
    }

    fn open_component(&mut self, tag: PreparedTag) -> Result<(), ParseError> {
        if tag.self_closing {
            let call = self.build_component_call(&tag.name, &tag.attrs, &tag.meta, tag.span, Vec::new(), None);
            self.push_component_call(call, &tag.meta, tag.span);
            return Ok(());
        }
        let checkpoint = Some(self.acc.checkpoint());
        self.slot_groups.push(Vec::new());
        self.frames.push(Frame {
            kind: tag.kind,
            name: tag.name,
            attrs: tag.attrs,
            meta: tag.meta,
            span: tag.span,
            checkpoint,
        });
        Ok(())
    }

    fn open_slot(&mut self, tag: PreparedTag) -> Result<(), ParseError> {
        if !self.frames.last().is_some_and(|f| f.kind.is_component()) {
            return Err(ParseError::new(
                ErrorKind::InvalidSlotPlacement,
                format!("<:{}> must be a direct child of a component", tag.name),
                tag.span,
            ));
        }
        if tag.self_closing {
            let entry = self.build_slot_entry(&tag.name, &tag.attrs, &tag.meta, tag.span, None);
            self.push_slot_entry(entry);
            return Ok(());
        }
        let checkpoint = Some(self.acc.checkpoint());
        self.frames.push(Frame {
            kind: TagKind::Slot,
            name: tag.name,
            attrs: tag.attrs,
            meta: tag.meta,
            span: tag.span,
            checkpoint,
        });
        Ok(())
    }

    fn close(&mut self, raw_name: &str, span: Span) -> Result<(), ParseError> {
        let (kind, name) = self
            .policy
            .classify(raw_name)
            .map_err(|message| ParseError::new(ErrorKind::InvalidComponentName, message, span))?;

        let frame = match self.frames.pop() {
            Some(frame) => frame,
            None => {
                let mut err = ParseError::new(
                    ErrorKind::MissingOpeningTag,
                    format!("</{}> has no matching opening tag", raw_name),
                    span,
                );
                if kind == TagKind::Element && self.policy.is_void(&name) {
                    err = err.with_help(format!(
                        "<{}> is a void element and never has a closing tag",
                        name
                    ));
                }
                return Err(err);
            }
        };

        if frame.kind != kind || frame.name != name {
            if kind == TagKind::Slot && !matches!(frame.kind, TagKind::Slot) {
                return Err(ParseError::new(
                    ErrorKind::InvalidSlotPlacement,
                    format!(
                        "</{}> closes a slot, but the innermost open tag is <{}>",
                        raw_name,
                        frame.display_name()
                    ),
                    span,
                )
                .with_related(frame.span));
            }
            let mut err = ParseError::new(
                ErrorKind::UnmatchedClosingTag,
                format!(
                    "</{}> does not match the open <{}>",
                    raw_name,
                    frame.display_name()
                ),
                span,
            )
            .with_related(frame.span);
            if kind == TagKind::Element && self.policy.is_void(&name) {
                err = err.with_help(format!(
                    "<{}> is a void element and never has a closing tag",
                    name
                ));
            }
            return Err(err);
        }

        match frame.kind {
            TagKind::Element => self.close_element(frame),
            TagKind::LocalComponent | TagKind::RemoteComponent => self.close_component(frame),
            TagKind::Slot => self.close_slot(frame),
        }
        Ok(())
    }

    fn close_element(&mut self, frame: Frame) {
        self.acc.push_text(&format!("</{}>", frame.name));
        if let Some(saved) = frame.checkpoint {
            let inner = self.acc.restore(saved);
            let expr = wrap_control(&frame.meta, Expr::Nested(Box::new(inner)));
            self.acc.push_expr(ExprMarker::Output, expr);
        }
    }

    fn close_component(&mut self, frame: Frame) {
        let entries = self.slot_groups.pop().unwrap_or_default();
        let body = match frame.checkpoint {
            Some(saved) => {
                let tree = self.acc.restore(saved);
                if tree_has_content(&tree) { Some(tree) } else { None }
            }
            None => None,
        };
        let call =
            self.build_component_call(&frame.name, &frame.attrs, &frame.meta, frame.span, entries, body);
        self.push_component_call(call, &frame.meta, frame.span);
        self.after_slot_close = false;
    }

    fn close_slot(&mut self, frame: Frame) {
        let body = match frame.checkpoint {
            Some(saved) => {
                let tree = self.acc.restore(saved);
                if tree.is_empty() { None } else { Some(tree) }
            }
            None => None,
        };
        let entry = self.build_slot_entry(&frame.name, &frame.attrs, &frame.meta, frame.span, body);
        self.push_slot_entry(entry);
    }

    fn push_slot_entry(&mut self, entry: SlotEntry) {
        if let Some(group) = self.slot_groups.last_mut() {
            group.push(entry);
        }
        self.after_slot_close = true;
    }

    fn build_slot_entry(
        &self,
        name: &str,
        attrs: &[Attribute],
        meta: &TagMeta,
        span: Span,
        body: Option<CompiledTree>,
    ) -> SlotEntry {
        let info = SlotCallInfo { line: span.start.line + 1, attrs: attr_info(attrs) };
        let (pairs, root) = attr_exprs(attrs);
        let mut pairs = pairs;
        if let Some(root) = root {
            pairs.push((ROOT_ATTR.to_string(), root));
        }
        let expr = Expr::SlotEntry(Box::new(SlotEntryExpr {
            name: name.to_string(),
            attrs: pairs,
            let_pattern: meta.let_pattern.as_ref().map(|(pattern, _)| pattern.clone()),
            body: body.map(|tree| Expr::Nested(Box::new(tree))),
        }));
        let special = meta.has_control();
        let expr = if special { wrap_control(meta, expr) } else { expr };
        SlotEntry { name: name.to_string(), expr, special, info }
    }

    fn build_component_call(
        &self,
        name: &str,
        attrs: &[Attribute],
        meta: &TagMeta,
        span: Span,
        mut entries: Vec<SlotEntry>,
        body: Option<CompiledTree>,
    ) -> ComponentCallExpr {
        let target = match &meta.component {
            Some(target) => target.clone(),
            None => ComponentRef::Local(name.to_string()),
        };

        if let Some(tree) = body {
            let info = SlotCallInfo { line: span.start.line + 1, attrs: BTreeMap::new() };
            let expr = Expr::SlotEntry(Box::new(SlotEntryExpr {
                name: "inner_block".to_string(),
                attrs: Vec::new(),
                let_pattern: meta.let_pattern.as_ref().map(|(pattern, _)| pattern.clone()),
                body: Some(Expr::Nested(Box::new(tree))),
            }));
            entries.push(SlotEntry { name: "inner_block".to_string(), expr, special: false, info });
        }

        if let Some(sink) = self.sink {
            let mut slot_info: BTreeMap<String, Vec<SlotCallInfo>> = BTreeMap::new();
            for entry in &entries {
                slot_info.entry(entry.name.clone()).or_default().push(entry.info.clone());
            }
            let (_, root) = attr_exprs(attrs);
            let call = ComponentCall {
                target: target.clone(),
                file: self.file.clone(),
                line: span.start.line + 1,
                root: root.is_some(),
                attrs: attr_info(attrs),
                slots: slot_info,
            };
            // Best-effort side channel: a closed sink is not a compile error.
            let _ = sink.record(call);
        }

        let (pairs, root) = attr_exprs(attrs);
        ComponentCallExpr { target, attrs: pairs, root, slots: slots::merge(entries) }
    }

    fn push_component_call(&mut self, call: ComponentCallExpr, meta: &TagMeta, span: Span) {
        if let Some(text) = self.policy.annotate_caller(&self.file, span.start.line + 1) {
            self.acc.push_text(&text);
        }
        let expr = wrap_control(meta, Expr::ComponentCall(Box::new(call)));
        self.acc.push_expr(ExprMarker::Output, expr);
    }
}

/// Wrap an expression in the tag's `:if`/`:for` control flow. Plain `:if`
/// yields a zero-or-one item list; `:for` yields one value per iteration,
/// with `:if` as the comprehension filter when both are present.
fn wrap_control(meta: &TagMeta, expr: Expr) -> Expr {
    match (&meta.for_expr, &meta.if_expr) {
        (Some(generator), filter) => match generator.generator_parts() {
            Some((pattern, source)) => Expr::Comprehension {
                pattern: Box::new(pattern.clone()),
                source: Box::new(source.clone()),
                filter: filter.clone().map(Box::new),
                body: Box::new(expr),
            },
            // :for is validated as a generator by the preprocessor
            None => expr,
        },
        (None, Some(cond)) => Expr::If {
            cond: Box::new(cond.clone()),
            then: Box::new(Expr::List(vec![expr])),
            otherwise: Box::new(Expr::List(Vec::new())),
        },
        (None, None) => expr,
    }
}

/// Split prepared attributes into named expression pairs plus the opaque
/// spread, if any. Flags become `true`, string literals become strings.
fn attr_exprs(attrs: &[Attribute]) -> (Vec<(String, Expr)>, Option<Expr>) {
    let mut pairs = Vec::new();
    let mut root = None;
    for attr in attrs {
        let expr = match &attr.value {
            AttrValue::Flag => Expr::Bool(true),
            AttrValue::String { value, .. } => Expr::Str(value.clone()),
            AttrValue::Expr { expr, .. } => expr.clone(),
            AttrValue::Body { .. } => continue,
        };
        if attr.name == ROOT_ATTR {
            root = Some(expr);
        } else {
            pairs.push((attr.name.clone(), expr));
        }
    }
    (pairs, root)
}

fn attr_info(attrs: &[Attribute]) -> BTreeMap<String, AttrInfo> {
    attrs
        .iter()
        .filter(|attr| attr.name != ROOT_ATTR)
        .map(|attr| {
            let kind = match &attr.value {
                AttrValue::Flag => LiteralKind::Boolean,
                AttrValue::String { .. } => LiteralKind::String,
                AttrValue::Expr { expr, .. } => literal_kind(expr),
                AttrValue::Body { .. } => LiteralKind::Unknown,
            };
            let info = AttrInfo {
                line: attr.span.start.line + 1,
                column: attr.span.start.col + 1,
                kind,
            };
            (attr.name.clone(), info)
        })
        .collect()
}

/// A component body counts as content only if it has dynamics or non-blank
/// static text; indentation between slot entries is not a body.
fn tree_has_content(tree: &CompiledTree) -> bool {
    if !tree.dynamics.is_empty() {
        return true;
    }
    tree.statics.iter().any(|segment| match segment {
        Segment::Lit(text) => !text.trim().is_empty(),
        Segment::Slot(_) => true,
    })
}
