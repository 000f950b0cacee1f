//! Attribute preprocessor. Runs over every opened tag before the stack
//! machine sees it: classifies the tag through the policy, validates and
//! extracts the control attributes (`:if`, `:for`, `:let`), parses remaining
//! expression bodies, and resolves spread attributes.

use crate::ast::{ComponentRef, Span, TagMeta};
use crate::error::{ErrorKind, ParseError};
use crate::expr;
use crate::parser::{AttrValue, Attribute, ROOT_ATTR};
use crate::policy::{AttrMerge, TagKind, TagPolicy};

/// Tooling attributes accepted and dropped without effect.
const IGNORED_ATTRS: &[&str] = &["no-format", "no-curly-interpolation"];

/// An opening tag after preprocessing: classified, control attributes moved
/// into `meta`, every remaining value parsed.
#[derive(Debug)]
pub struct PreparedTag {
    pub kind: TagKind,
    pub name: String,
    pub attrs: Vec<Attribute>,
    pub meta: TagMeta,
    pub self_closing: bool,
    pub span: Span,
    pub name_span: Span,
}

pub fn prepare(
    policy: &dyn TagPolicy,
    raw_name: &str,
    name_span: Span,
    attrs: Vec<Attribute>,
    self_closing: bool,
    span: Span,
) -> Result<PreparedTag, ParseError> {
    let (kind, name) = policy
        .classify(raw_name)
        .map_err(|message| ParseError::new(ErrorKind::InvalidComponentName, message, name_span))?;

    let mut meta = TagMeta::default();
    if let TagKind::LocalComponent = kind {
        meta.component = Some(ComponentRef::Local(name.clone()));
    } else if let TagKind::RemoteComponent = kind {
        // classify guarantees at least one dot for remote names
        let (module, func) = name.rsplit_once('.').unwrap_or(("", name.as_str()));
        meta.component =
            Some(ComponentRef::Remote { module: module.to_string(), func: func.to_string() });
    }

    let mut out = Vec::with_capacity(attrs.len());
    let mut seen: Vec<(String, Span)> = Vec::new();
    for attr in attrs {
        if IGNORED_ATTRS.contains(&attr.name.as_str()) {
            continue;
        }
        if attr.name != ROOT_ATTR {
            if let Some((_, first)) = seen.iter().find(|(name, _)| *name == attr.name) {
                return Err(ParseError::new(
                    ErrorKind::DuplicateAttribute,
                    format!(
                        "{} was already given on this tag at line {}",
                        attr.name,
                        first.start.line + 1
                    ),
                    attr.span,
                )
                .with_related(*first)
                .with_related_label("first use"));
            }
            seen.push((attr.name.clone(), attr.span));
        }
        if attr.name.starts_with(':') {
            take_control(kind, &mut meta, attr, self_closing)?;
            continue;
        }
        let attr = parse_value(&attr)?;
        if attr.name == ROOT_ATTR {
            let span = attr.value_span();
            let expr = match attr.value {
                AttrValue::Expr { expr, .. } => expr,
                _ => {
                    return Err(ParseError::new(
                        ErrorKind::InvalidAttributeValue,
                        "spread attributes take an expression in braces",
                        span,
                    ));
                }
            };
            match policy.handle_attributes(expr, span) {
                AttrMerge::Pairs(pairs) => {
                    for (name, expr) in pairs {
                        out.push(Attribute {
                            name,
                            value: AttrValue::Expr { expr, span },
                            span: attr.span,
                        });
                    }
                }
                AttrMerge::Opaque(expr) => {
                    out.push(Attribute {
                        name: ROOT_ATTR.to_string(),
                        value: AttrValue::Expr { expr, span },
                        span: attr.span,
                    });
                }
            }
            continue;
        }
        out.push(attr);
    }

    Ok(PreparedTag { kind, name, attrs: out, meta, self_closing, span, name_span })
}

/// Validate and extract one `:`-prefixed control attribute.
fn take_control(
    kind: TagKind,
    meta: &mut TagMeta,
    attr: Attribute,
    self_closing: bool,
) -> Result<(), ParseError> {
    let control = attr.name[1..].to_string();
    let allowed = match control.as_str() {
        "if" | "for" => true,
        "let" => matches!(kind, TagKind::LocalComponent | TagKind::RemoteComponent | TagKind::Slot),
        _ => false,
    };
    if !allowed {
        let message = if control == "let" {
            format!(":let is only supported on components and slots, not on a {}", kind.describe())
        } else {
            format!("unsupported attribute :{}", control)
        };
        return Err(ParseError::new(ErrorKind::UnsupportedAttribute, message, attr.span));
    }

    let value_span = attr.value_span();
    let expr = match attr.value {
        AttrValue::Body { ref source, span } => expr::parse(source, span)?,
        AttrValue::Expr { expr, .. } => expr,
        AttrValue::Flag | AttrValue::String { .. } => {
            return Err(ParseError::new(
                ErrorKind::InvalidAttributeValue,
                format!(":{} takes an expression in braces, like :{}={{...}}", control, control),
                attr.span,
            ));
        }
    };

    match control.as_str() {
        "if" => {
            if expr.is_generator() {
                return Err(ParseError::new(
                    ErrorKind::InvalidAttributeValue,
                    ":if takes a condition, but this is a generator",
                    value_span,
                ));
            }
            meta.if_expr = Some(expr);
        }
        "for" => {
            if !expr.is_generator() {
                return Err(ParseError::new(
                    ErrorKind::InvalidAttributeValue,
                    ":for expects a generator, like :for={item <- @items}",
                    value_span,
                ));
            }
            meta.for_expr = Some(expr);
        }
        "let" => {
            if !expr.is_binding_pattern() {
                return Err(ParseError::new(
                    ErrorKind::InvalidAttributeValue,
                    ":let expects a variable or list of variables to bind",
                    value_span,
                ));
            }
            if self_closing {
                return Err(ParseError::new(
                    ErrorKind::InvalidAttributeValue,
                    ":let binds the tag's body, but this tag is self-closing and has none",
                    attr.span,
                ));
            }
            meta.let_pattern = Some((expr, attr.span));
        }
        _ => unreachable!(),
    }
    Ok(())
}

/// Parse a `{...}` attribute body into its expression form; other value
/// shapes pass through untouched.
fn parse_value(attr: &Attribute) -> Result<Attribute, ParseError> {
    match &attr.value {
        AttrValue::Body { source, span } => {
            let expr = expr::parse(source, *span)?;
            if expr.is_generator() {
                return Err(ParseError::new(
                    ErrorKind::InvalidAttributeValue,
                    "a generator is only valid as a :for value",
                    *span,
                ));
            }
            Ok(Attribute {
                name: attr.name.clone(),
                value: AttrValue::Expr { expr, span: *span },
                span: attr.span,
            })
        }
        _ => Ok(attr.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::tokenize;
    use crate::parser::Token;
    use crate::policy::HtmlPolicy;

    fn prepare_first(source: &str) -> Result<PreparedTag, ParseError> {
        let tokens = tokenize(source).unwrap();
        match tokens.into_iter().next() {
            Some(Token::TagOpen { raw_name, name_span, attrs, self_closing, span }) => {
                prepare(&HtmlPolicy::new(), &raw_name, name_span, attrs, self_closing, span)
            }
            other => panic!("expected an opening tag, got {:?}", other),
        }
    }

    #[test]
    fn extracts_control_attributes() {
        let tag = prepare_first("<div :if={@show} class=\"x\">").unwrap();
        assert_eq!(tag.kind, TagKind::Element);
        assert!(tag.meta.if_expr.is_some());
        assert_eq!(tag.attrs.len(), 1);
        assert_eq!(tag.attrs[0].name, "class");
    }

    #[test]
    fn for_requires_generator() {
        let err = prepare_first("<li :for={@items}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAttributeValue);
        assert!(err.message.contains("generator"));
    }

    #[test]
    fn let_is_rejected_on_elements() {
        let err = prepare_first("<div :let={x}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedAttribute);
    }

    #[test]
    fn let_is_rejected_on_self_closing_tags() {
        let err = prepare_first("<.card :let={x} />").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAttributeValue);
        assert!(err.message.contains("self-closing"));
    }

    #[test]
    fn duplicate_control_attribute() {
        let err = prepare_first("<div :if={@a} :if={@b}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateAttribute);
        assert!(err.related_span.is_some());
    }

    #[test]
    fn duplicate_plain_attribute() {
        let err = prepare_first("<div class=\"a\" class=\"b\">").unwrap_err();
        assert_eq!(err.kind, ErrorKind::DuplicateAttribute);
        assert!(err.message.contains("class"));
        assert!(err.related_span.is_some());
    }

    #[test]
    fn repeated_spreads_are_allowed() {
        let tag = prepare_first("<div {@a} {@b}>").unwrap();
        assert_eq!(tag.attrs.len(), 2);
    }

    #[test]
    fn generator_in_plain_attribute() {
        let err = prepare_first("<div class={x <- @xs}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAttributeValue);
        assert!(err.message.contains(":for"));
    }

    #[test]
    fn generator_as_if_condition() {
        let err = prepare_first("<div :if={x <- @xs}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAttributeValue);
        assert!(err.message.contains("condition"));
    }

    #[test]
    fn unknown_colon_attribute() {
        let err = prepare_first("<div :unless={@a}>").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedAttribute);
    }

    #[test]
    fn control_without_braces() {
        let err = prepare_first("<div :if=\"yes\">").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAttributeValue);
    }

    #[test]
    fn literal_map_spread_unpacks() {
        let tag = prepare_first("<div {{class: \"btn\", id: \"a\"}}>").unwrap();
        let names: Vec<_> = tag.attrs.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["class", "id"]);
    }

    #[test]
    fn dynamic_spread_stays_opaque() {
        let tag = prepare_first("<div {@rest}>").unwrap();
        assert_eq!(tag.attrs.len(), 1);
        assert_eq!(tag.attrs[0].name, ROOT_ATTR);
    }

    #[test]
    fn ignored_tooling_attributes_vanish() {
        let tag = prepare_first("<pre no-format>").unwrap();
        assert!(tag.attrs.is_empty());
    }

    #[test]
    fn remote_component_target() {
        let tag = prepare_first("<Ui.Button.render label=\"Go\" />").unwrap();
        assert_eq!(tag.kind, TagKind::RemoteComponent);
        assert_eq!(
            tag.meta.component,
            Some(ComponentRef::Remote { module: "Ui.Button".into(), func: "render".into() })
        );
    }
}
