//! End-to-end compile and render tests: compile a template source, render it
//! with fixed assigns, and check the output program's shape and HTML.

use std::collections::BTreeMap;

use weft::ast::{ComponentRef, Expr, Step};
use weft::render::{ComponentResolver, Env, RenderError, Renderer, Value};
use weft::{compile, CompiledTree, Options};

fn compile_ok(source: &str) -> CompiledTree {
    match compile(source, &Options::default()) {
        Ok(tree) => tree,
        Err(err) => panic!("compile failed: {}\n{}", err, err.render(source, "test")),
    }
}

fn env(pairs: &[(&str, Value)]) -> Env {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn render_html(source: &str, assigns: &Env) -> String {
    let tree = compile_ok(source);
    Renderer::new(assigns).render(&tree).unwrap().to_html()
}

/// Collect binding names from a tree and every nested sub-tree.
fn all_binding_names(tree: &CompiledTree, out: &mut Vec<String>) {
    for step in &tree.dynamics {
        let expr = match step {
            Step::Bind { name, expr, .. } => {
                out.push(name.clone());
                expr
            }
            Step::Discard { expr } => expr,
        };
        nested_binding_names(expr, out);
    }
}

fn nested_binding_names(expr: &Expr, out: &mut Vec<String>) {
    match expr {
        Expr::Nested(tree) => all_binding_names(tree, out),
        Expr::If { then, otherwise, .. } => {
            nested_binding_names(then, out);
            nested_binding_names(otherwise, out);
        }
        Expr::Comprehension { body, .. } => nested_binding_names(body, out),
        Expr::Flatten(inner) => nested_binding_names(inner, out),
        Expr::List(items) => {
            for item in items {
                nested_binding_names(item, out);
            }
        }
        Expr::ComponentCall(call) => {
            for (_, expr) in &call.slots {
                nested_binding_names(expr, out);
            }
        }
        Expr::SlotEntry(entry) => {
            if let Some(body) = &entry.body {
                nested_binding_names(body, out);
            }
        }
        _ => {}
    }
}

#[test]
fn statics_always_bracket_dynamics() {
    let sources = [
        "plain text only",
        "{@a}",
        "{@a}{@b}",
        "<p>{@a}</p>tail",
        "<div :if={@x}>{@a}</div>",
    ];
    let assigns = env(&[
        ("a", Value::Str("1".into())),
        ("b", Value::Str("2".into())),
        ("x", Value::Bool(true)),
    ]);
    for source in sources {
        let tree = compile_ok(source);
        let rendered = Renderer::new(&assigns).render(&tree).unwrap();
        assert_eq!(
            rendered.statics.len(),
            rendered.dynamics.len() + 1,
            "statics/dynamics out of balance for {:?}",
            source
        );
    }
}

#[test]
fn static_splitting_is_stable() {
    let tree = compile_ok("foo{@x}bar");
    let assigns = env(&[("x", Value::Str("first".into()))]);
    let first = Renderer::new(&assigns).render(&tree).unwrap();
    assert_eq!(first.statics, vec!["foo", "bar"]);
    assert_eq!(first.dynamics, vec!["first"]);

    // A second render with different assigns changes only the dynamics.
    let assigns = env(&[("x", Value::Str("second".into()))]);
    let second = Renderer::new(&assigns).render(&tree).unwrap();
    assert_eq!(second.statics, first.statics);
    assert_eq!(second.dynamics, vec!["second"]);
}

#[test]
fn interpolated_values_are_escaped() {
    let assigns = env(&[("html", Value::Str("<script>alert('x')</script>".into()))]);
    let html = render_html("<p>{@html}</p>", &assigns);
    assert_eq!(
        html,
        "<p>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;</p>"
    );
}

#[test]
fn raw_bypasses_escaping() {
    let assigns = env(&[("html", Value::Str("<b>bold</b>".into()))]);
    let html = render_html("<p>{raw(@html)}</p>", &assigns);
    assert_eq!(html, "<p><b>bold</b></p>");
}

#[test]
fn binding_names_are_unique_across_subtrees() {
    let source = "<p>{@a}</p><div :if={@x}>{@b}<span :if={@x}>{@c}</span></div>{@d}";
    let tree = compile_ok(source);
    let mut names = Vec::new();
    all_binding_names(&tree, &mut names);
    let mut deduped = names.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), names.len(), "duplicate binding names: {:?}", names);
    assert_eq!(names.len(), 4 + 2, "four interpolations plus two control wrappers");
}

#[test]
fn conditional_element_renders_or_vanishes() {
    let source = "<div :if={@show}>{@name}</div>";
    let shown = env(&[("show", Value::Bool(true)), ("name", Value::Str("Ann".into()))]);
    assert_eq!(render_html(source, &shown), "<div>Ann</div>");

    let hidden = env(&[("show", Value::Bool(false)), ("name", Value::Str("Ann".into()))]);
    assert_eq!(render_html(source, &hidden), "");
}

#[test]
fn hidden_branches_do_not_evaluate() {
    // @name is missing, but the branch guarding it is off.
    let assigns = env(&[("show", Value::Bool(false))]);
    assert_eq!(render_html("<div :if={@show}>{@name}</div>", &assigns), "");
}

#[test]
fn for_loops_repeat_their_element() {
    let assigns = env(&[(
        "items",
        Value::List(vec![
            Value::Str("a".into()),
            Value::Str("b".into()),
            Value::Str("c".into()),
        ]),
    )]);
    let html = render_html("<ul><li :for={item <- @items}>{item}</li></ul>", &assigns);
    assert_eq!(html, "<ul><li>a</li><li>b</li><li>c</li></ul>");
}

#[test]
fn for_with_if_filters_iterations() {
    let assigns = env(&[(
        "nums",
        Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
    )]);
    let html = render_html("<ul><li :for={n <- @nums} :if={n > 2}>{n}</li></ul>", &assigns);
    assert_eq!(html, "<ul><li>3</li><li>4</li></ul>");
}

#[test]
fn destructuring_for_patterns() {
    let assigns = env(&[(
        "pairs",
        Value::List(vec![
            Value::List(vec![Value::Str("a".into()), Value::Int(1)]),
            Value::List(vec![Value::Str("b".into()), Value::Int(2)]),
        ]),
    )]);
    let html = render_html(
        "<dl><dt :for={[k, v] <- @pairs}>{k}={v}</dt></dl>",
        &assigns,
    );
    assert_eq!(html, "<dl><dt>a=1</dt><dt>b=2</dt></dl>");
}

#[test]
fn dynamic_attributes_are_escaped() {
    let assigns = env(&[("url", Value::Str("/a?b=1&c=\"2\"".into()))]);
    let html = render_html("<a href={@url}>go</a>", &assigns);
    assert_eq!(html, "<a href=\"/a?b=1&amp;c=&quot;2&quot;\">go</a>");
}

#[test]
fn spread_attributes_merge_at_render_time() {
    let mut extra = BTreeMap::new();
    extra.insert("rel".to_string(), Value::Str("nofollow".into()));
    extra.insert("hidden".to_string(), Value::Bool(false));
    let assigns = env(&[("extra", Value::Map(extra))]);
    let html = render_html("<a href=\"/x\" {@extra} download>go</a>", &assigns);
    assert_eq!(html, "<a href=\"/x\" rel=\"nofollow\" download>go</a>");
}

#[test]
fn literal_map_spreads_unpack_at_compile_time() {
    let tree = compile_ok("<div {{class: \"btn\", id: \"save\"}}>x</div>");
    // Two compile-time attributes, two bindings for their values.
    let rendered = Renderer::new(&Env::new()).render(&tree).unwrap();
    assert_eq!(rendered.to_html(), "<div class=\"btn\" id=\"save\">x</div>");
}

// --- components and slots ---

struct DemoComponents;

impl DemoComponents {
    fn text(attrs: &BTreeMap<String, Value>, name: &str) -> String {
        attrs
            .get(name)
            .map(|v| weft::render::output_string(v, true).unwrap_or_default())
            .unwrap_or_default()
    }
}

impl ComponentResolver for DemoComponents {
    fn render_component(
        &self,
        target: &ComponentRef,
        attrs: &BTreeMap<String, Value>,
        renderer: &Renderer,
    ) -> Result<Value, RenderError> {
        match target {
            ComponentRef::Local(name) if name == "card" => {
                let title = Self::text(attrs, "title");
                let body = match attrs.get("inner_block") {
                    Some(slot) => renderer.render_slot(slot, None)?,
                    None => String::new(),
                };
                let footer = match attrs.get("footer") {
                    Some(slot) => format!("<footer>{}</footer>", renderer.render_slot(slot, None)?),
                    None => String::new(),
                };
                Ok(Value::Safe(format!(
                    "<div class=\"card\"><h2>{}</h2>{}{}</div>",
                    title, body, footer
                )))
            }
            ComponentRef::Local(name) if name == "list" => {
                let items = match attrs.get("items") {
                    Some(Value::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                let entry = attrs.get("item").cloned().unwrap_or(Value::List(Vec::new()));
                let mut out = String::from("<ul>");
                for item in items {
                    out.push_str("<li>");
                    out.push_str(&renderer.render_slot(&entry, Some(&item))?);
                    out.push_str("</li>");
                }
                out.push_str("</ul>");
                Ok(Value::Safe(out))
            }
            ComponentRef::Remote { module, func } if module == "Ui.Badge" && func == "show" => {
                Ok(Value::Safe(format!("<span class=\"badge\">{}</span>", Self::text(attrs, "label"))))
            }
            other => Err(RenderError {
                message: format!("unknown component <{}>", other),
            }),
        }
    }
}

fn render_with_components(source: &str, assigns: &Env) -> String {
    let tree = compile_ok(source);
    Renderer::with_resolver(assigns, &DemoComponents)
        .render(&tree)
        .unwrap()
        .to_html()
}

#[test]
fn component_body_becomes_the_default_slot() {
    let assigns = env(&[("who", Value::Str("Ann".into()))]);
    let html = render_with_components("<.card title=\"Hi\">Hello {@who}</.card>", &assigns);
    assert_eq!(html, "<div class=\"card\"><h2>Hi</h2>Hello Ann</div>");
}

#[test]
fn self_closed_component_has_no_default_slot() {
    let html = render_with_components("<.card title=\"Empty\" />", &Env::new());
    assert_eq!(html, "<div class=\"card\"><h2>Empty</h2></div>");
}

#[test]
fn named_slots_reach_the_component() {
    let source = "<.card title=\"T\">body<:footer>fine print</:footer></.card>";
    let html = render_with_components(source, &Env::new());
    assert_eq!(
        html,
        "<div class=\"card\"><h2>T</h2>body<footer>fine print</footer></div>"
    );
}

#[test]
fn let_binds_the_slot_argument() {
    let source = "<.list items={@items}><:item :let={x}><b>{x}</b></:item></.list>";
    let assigns = env(&[(
        "items",
        Value::List(vec![Value::Int(1), Value::Int(2)]),
    )]);
    let html = render_with_components(source, &assigns);
    assert_eq!(html, "<ul><li><b>1</b></li><li><b>2</b></li></ul>");
}

#[test]
fn repeated_slots_render_in_source_order() {
    let source = "<.list items={@items}>\
                  <:item :let={x}>[{x}]</:item>\
                  <:item :let={x}>({x})</:item>\
                  </.list>";
    let assigns = env(&[("items", Value::List(vec![Value::Int(7)]))]);
    let html = render_with_components(source, &assigns);
    assert_eq!(html, "<ul><li>[7](7)</li></ul>");
}

#[test]
fn conditional_slot_entries_can_vanish() {
    let source = "<.list items={@items}>\
                  <:item :let={x}>always {x}</:item>\
                  <:item :if={@extra} :let={x}>extra {x}</:item>\
                  </.list>";
    let assigns = env(&[
        ("items", Value::List(vec![Value::Int(1)])),
        ("extra", Value::Bool(false)),
    ]);
    assert_eq!(render_with_components(source, &assigns), "<ul><li>always 1</li></ul>");

    let assigns = env(&[
        ("items", Value::List(vec![Value::Int(1)])),
        ("extra", Value::Bool(true)),
    ]);
    assert_eq!(
        render_with_components(source, &assigns),
        "<ul><li>always 1extra 1</li></ul>"
    );
}

#[test]
fn repeated_slot_via_for() {
    let source = "<.list items={@items}>\
                  <:item :for={tag <- @tags} :let={x}>{tag}:{x}</:item>\
                  </.list>";
    let assigns = env(&[
        ("items", Value::List(vec![Value::Int(5)])),
        (
            "tags",
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
        ),
    ]);
    assert_eq!(
        render_with_components(source, &assigns),
        "<ul><li>a:5b:5</li></ul>"
    );
}

#[test]
fn for_slot_and_plain_slot_merge_in_order() {
    // Two generated entries followed by one plain entry: three values,
    // evaluated in source order.
    let source = "<.list items={@items}>\
                  <:item :for={tag <- @tags} :let={x}>{tag}{x}</:item>\
                  <:item :let={x}>last{x}</:item>\
                  </.list>";
    let assigns = env(&[
        ("items", Value::List(vec![Value::Int(9)])),
        (
            "tags",
            Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]),
        ),
    ]);
    assert_eq!(
        render_with_components(source, &assigns),
        "<ul><li>a9b9last9</li></ul>"
    );
}

#[test]
fn sibling_slots_get_distinct_bindings() {
    let source = "<.card title=\"T\">\
                  <:footer>{@a}</:footer>\
                  <:footer>{@b}</:footer>\
                  </.card>";
    let tree = compile_ok(source);
    let mut names = Vec::new();
    all_binding_names(&tree, &mut names);
    let mut deduped = names.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), names.len(), "duplicate binding names: {:?}", names);
}

#[test]
fn conditional_component_call() {
    let source = "<.card :if={@show} title=\"C\">x</.card>";
    let shown = env(&[("show", Value::Bool(true))]);
    assert_eq!(
        render_with_components(source, &shown),
        "<div class=\"card\"><h2>C</h2>x</div>"
    );
    let hidden = env(&[("show", Value::Bool(false))]);
    assert_eq!(render_with_components(source, &hidden), "");
}

#[test]
fn remote_components_resolve_by_dotted_path() {
    let html = render_with_components("<Ui.Badge.show label=\"new\" />", &Env::new());
    assert_eq!(html, "<span class=\"badge\">new</span>");
}

#[test]
fn components_nest() {
    let source = "<.card title=\"Outer\"><.card title=\"Inner\">deep</.card></.card>";
    let html = render_with_components(source, &Env::new());
    assert_eq!(
        html,
        "<div class=\"card\"><h2>Outer</h2><div class=\"card\"><h2>Inner</h2>deep</div></div>"
    );
}
