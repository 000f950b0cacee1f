use crate::ast::{Expr, Span};
use crate::html;

/// What a raw tag name turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Element,
    LocalComponent,
    RemoteComponent,
    Slot,
}

impl TagKind {
    pub fn is_component(self) -> bool {
        matches!(self, TagKind::LocalComponent | TagKind::RemoteComponent)
    }

    pub fn describe(self) -> &'static str {
        match self {
            TagKind::Element => "element",
            TagKind::LocalComponent | TagKind::RemoteComponent => "component",
            TagKind::Slot => "slot",
        }
    }
}

/// Result of handing a spread attribute to the policy: either resolved into
/// named pairs, or a single opaque expression merged at render time.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrMerge {
    Pairs(Vec<(String, Expr)>),
    Opaque(Expr),
}

/// Context handed to `annotate_body`.
#[derive(Debug, Clone, Copy)]
pub struct BodyContext<'a> {
    pub file: &'a str,
}

/// Pluggable tag knowledge. The compiler calls these four capabilities but
/// implements none of them: tag classification, void-element knowledge,
/// spread-attribute merging, and debug annotation strings.
pub trait TagPolicy {
    /// Classify a raw tag name into a kind and canonical name, or an error
    /// message the compiler surfaces verbatim.
    fn classify(&self, raw: &str) -> Result<(TagKind, String), String>;

    /// Can this element have children / a closing tag?
    fn is_void(&self, name: &str) -> bool;

    /// Resolve a spread attribute's expression, either into concrete pairs
    /// (compile-time unpack) or an opaque runtime merge.
    fn handle_attributes(&self, expr: Expr, span: Span) -> AttrMerge;

    /// Optional text wrapped around the compiled template body.
    fn annotate_body(&self, _ctx: &BodyContext) -> Option<(String, String)> {
        None
    }

    /// Optional text emitted in front of a component invocation.
    fn annotate_caller(&self, _file: &str, _line: usize) -> Option<String> {
        None
    }
}

/// Default policy: HTML elements plus `.name` local components,
/// `Some.Module.func` remote components and `:name` slots.
#[derive(Debug, Clone, Default)]
pub struct HtmlPolicy {
    /// Emit `<!-- ... -->` debug annotations around template bodies and
    /// before component calls.
    pub annotate: bool,
}

impl HtmlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotated() -> Self {
        Self { annotate: true }
    }
}

impl TagPolicy for HtmlPolicy {
    fn classify(&self, raw: &str) -> Result<(TagKind, String), String> {
        if let Some(name) = raw.strip_prefix('.') {
            if name.is_empty() {
                return Err("expected a component name after '.'".to_string());
            }
            return Ok((TagKind::LocalComponent, name.to_string()));
        }
        if let Some(name) = raw.strip_prefix(':') {
            if name.is_empty() {
                return Err("expected a slot name after ':'".to_string());
            }
            return Ok((TagKind::Slot, name.to_string()));
        }
        if raw.starts_with(|c: char| c.is_ascii_uppercase()) {
            // Dotted remote component: every segment but the last is the
            // module path; the last must be a lowercase function name.
            let last = raw.rsplit('.').next().unwrap_or(raw);
            if !raw.contains('.') || !last.starts_with(|c: char| c.is_ascii_lowercase()) {
                return Err(format!(
                    "<{}> does not resolve to a component function; expected a dotted \
                     name ending in a lowercase segment, like <Some.Module.{}>",
                    raw,
                    last.to_ascii_lowercase()
                ));
            }
            return Ok((TagKind::RemoteComponent, raw.to_string()));
        }
        Ok((TagKind::Element, raw.to_string()))
    }

    fn is_void(&self, name: &str) -> bool {
        html::is_void_element(name)
    }

    fn handle_attributes(&self, expr: Expr, _span: Span) -> AttrMerge {
        // Literal maps with literal keys unpack at compile time; anything
        // else merges at render time.
        if let Some(pairs) = expr.as_literal_map() {
            let pairs = pairs
                .iter()
                .filter_map(|(k, v)| k.literal_key().map(|name| (name, v.clone())))
                .collect();
            AttrMerge::Pairs(pairs)
        } else {
            AttrMerge::Opaque(expr)
        }
    }

    fn annotate_body(&self, ctx: &BodyContext) -> Option<(String, String)> {
        if self.annotate {
            Some((
                format!("<!-- template: {} -->", ctx.file),
                "<!-- /template -->".to_string(),
            ))
        } else {
            None
        }
    }

    fn annotate_caller(&self, file: &str, line: usize) -> Option<String> {
        if self.annotate {
            Some(format!("<!-- call: {}:{} -->", file, line))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_elements_components_and_slots() {
        let policy = HtmlPolicy::new();
        assert_eq!(policy.classify("div").unwrap(), (TagKind::Element, "div".into()));
        assert_eq!(
            policy.classify(".card").unwrap(),
            (TagKind::LocalComponent, "card".into())
        );
        assert_eq!(
            policy.classify("Ui.Button.render").unwrap(),
            (TagKind::RemoteComponent, "Ui.Button.render".into())
        );
        assert_eq!(policy.classify(":header").unwrap(), (TagKind::Slot, "header".into()));
    }

    #[test]
    fn rejects_remote_names_without_function_segment() {
        let policy = HtmlPolicy::new();
        assert!(policy.classify("Ui.Button").is_err());
        assert!(policy.classify("Button").is_err());
    }

    #[test]
    fn void_elements() {
        let policy = HtmlPolicy::new();
        assert!(policy.is_void("br"));
        assert!(policy.is_void("IMG"));
        assert!(!policy.is_void("div"));
    }
}
