//! Compiler for `weft` templates: HTML with embedded expressions, components
//! and named slots. A template compiles to an alternating static/dynamic
//! program; at render time only the dynamic parts are re-evaluated, which is
//! what makes diff-based live updates cheap.
//!
//! ```
//! use weft::{compile, Options};
//!
//! let tree = compile("<p>{@greeting}</p>", &Options::default()).unwrap();
//! assert_eq!(tree.binding_names(), vec!["d0"]);
//! ```

pub mod ast;
pub mod engine;
pub mod error;
pub mod expr;
pub mod html;
pub mod parser;
pub mod policy;
pub mod render;

pub use ast::CompiledTree;
pub use engine::registry::{CallRegistry, CallSink, ComponentCall, SinkClosed};
pub use engine::Compiler;
pub use error::{ErrorKind, ParseError};
pub use parser::{tokenize, Token};
pub use policy::{HtmlPolicy, TagPolicy};
pub use render::{Rendered, Renderer, Value};

/// Compile options.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// File name used in diagnostics and call records
    pub file: String,
    /// Emit debug annotation comments around bodies and component calls
    pub annotate: bool,
}

/// Compile a template with the default HTML policy and no call sink.
pub fn compile(source: &str, options: &Options) -> Result<CompiledTree, ParseError> {
    let policy = HtmlPolicy { annotate: options.annotate };
    compile_with(source, options, &policy, None)
}

/// Compile a template with an explicit policy and optional call sink.
pub fn compile_with(
    source: &str,
    options: &Options,
    policy: &dyn TagPolicy,
    sink: Option<&dyn CallSink>,
) -> Result<CompiledTree, ParseError> {
    let tokens = tokenize(source)?;
    compile_tokens(tokens, options, policy, sink)
}

/// Compile a pre-tokenized stream. This is the entry point for callers that
/// synthesize tokens themselves (e.g. quiet expressions, which have no
/// template syntax).
pub fn compile_tokens(
    tokens: Vec<Token>,
    options: &Options,
    policy: &dyn TagPolicy,
    sink: Option<&dyn CallSink>,
) -> Result<CompiledTree, ParseError> {
    let mut compiler = Compiler::new(policy, sink, &options.file);
    for token in tokens {
        compiler.step(token)?;
    }
    compiler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::{Segment, Step};

    fn compile_ok(source: &str) -> CompiledTree {
        compile(source, &Options::default()).unwrap()
    }

    #[test]
    fn plain_text_is_one_static() {
        let tree = compile_ok("hello world");
        assert_eq!(tree.statics, vec![Segment::Lit("hello world".into())]);
        assert!(tree.dynamics.is_empty());
    }

    #[test]
    fn statics_and_bindings_alternate() {
        let tree = compile_ok("<p>{@a} and {@b}</p>");
        assert_eq!(tree.binding_names(), vec!["d0", "d1"]);
        assert_eq!(
            tree.statics,
            vec![
                Segment::Lit("<p>".into()),
                Segment::Slot("d0".into()),
                Segment::Lit(" and ".into()),
                Segment::Slot("d1".into()),
                Segment::Lit("</p>".into()),
            ]
        );
    }

    #[test]
    fn control_flow_compiles_to_one_binding() {
        let tree = compile_ok("<div :if={@show}>{@name}</div>");
        // The whole element becomes a single conditional binding.
        assert_eq!(tree.binding_names(), vec!["d1"]);
        match &tree.dynamics[0] {
            Step::Bind { expr, escape, .. } => {
                assert!(matches!(expr, ast::Expr::If { .. }));
                assert!(!escape);
            }
            other => panic!("unexpected step: {:?}", other),
        }
    }

    #[test]
    fn void_elements_never_open_a_frame() {
        let tree = compile_ok("<p>a<br>b<img src=\"x.png\"></p>");
        assert_eq!(
            tree.statics,
            vec![Segment::Lit("<p>a<br>b<img src=\"x.png\"></p>".into())]
        );
    }

    #[test]
    fn self_closed_non_void_expands() {
        let tree = compile_ok("<div/>");
        assert_eq!(tree.statics, vec![Segment::Lit("<div></div>".into())]);
    }

    #[test]
    fn unclosed_tag_names_the_outermost() {
        let err = compile("<section><div>", &Options::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnclosedTag);
        assert!(err.message.contains("<section>"));
    }

    #[test]
    fn mismatched_close_points_at_the_open() {
        let err = compile("<ul><li></ul>", &Options::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnmatchedClosingTag);
        assert!(err.related_span.is_some());
    }

    #[test]
    fn stray_close() {
        let err = compile("</div>", &Options::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingOpeningTag);
    }

    #[test]
    fn component_calls_are_recorded() {
        let registry = CallRegistry::new();
        let policy = HtmlPolicy::new();
        let source = "<.card title=\"Hi\"><:footer>f</:footer>body</.card>";
        let options = Options { file: "page.weft".into(), ..Options::default() };
        compile_with(source, &options, &policy, Some(&registry)).unwrap();
        let calls = registry.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].file, "page.weft");
        assert!(calls[0].attrs.contains_key("title"));
        assert!(calls[0].slots.contains_key("footer"));
        assert!(calls[0].slots.contains_key("inner_block"));
    }

    #[test]
    fn quiet_tokens_compile_without_placeholders() {
        use ast::{Expr, ExprMarker};
        use parser::Span;

        let tokens = vec![Token::Expr {
            marker: ExprMarker::Quiet,
            expr: Expr::Assign("side_effect".into()),
            span: Span::default(),
        }];
        let tree =
            compile_tokens(tokens, &Options::default(), &HtmlPolicy::new(), None).unwrap();
        assert!(tree.statics.is_empty());
        assert_eq!(tree.dynamics.len(), 1);
    }

    #[test]
    fn annotation_comments_wrap_the_body() {
        let options = Options { file: "page.weft".into(), annotate: true };
        let tree = compile("<p>x</p>", &options).unwrap();
        assert_eq!(
            tree.statics,
            vec![Segment::Lit(
                "<!-- template: page.weft --><p>x</p><!-- /template -->".into()
            )]
        );
    }
}
