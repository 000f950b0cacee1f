//! Render-time evaluation of compiled trees. The compiled output program is
//! deliberately small: evaluate each dynamic step in order, then interleave
//! the results with the static skeleton. Live-update clients diff only the
//! `dynamics` vector between renders; `to_html` is the full-page fallback.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::ast::{
    BinaryOp, ComponentRef, CompiledTree, Expr, Segment, SlotEntryExpr, Step, UnaryOp,
};
use crate::html;

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Pre-escaped markup, spliced into output verbatim
    Safe(String),
    Sym(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Capture { name: String, arity: usize },
    /// A rendered sub-tree
    Tree(Rendered),
    /// A slot entry waiting to be rendered by its component
    Slot(Box<SlotValue>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

/// A slot entry as a runtime value. The body stays unrendered until the
/// component invokes it, so `:let` arguments can be bound per call.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotValue {
    pub name: String,
    pub attrs: BTreeMap<String, Value>,
    pub let_pattern: Option<Expr>,
    pub body: Option<CompiledTree>,
    /// Local variables in scope where the slot was written
    pub captured: Env,
}

pub type Env = BTreeMap<String, Value>;

/// A fully evaluated tree: the static skeleton plus one rendered string per
/// binding, in binding order. `statics.len() == dynamics.len() + 1` always.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rendered {
    pub statics: Vec<String>,
    pub dynamics: Vec<String>,
}

impl Rendered {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for (i, fixed) in self.statics.iter().enumerate() {
            out.push_str(fixed);
            if let Some(dynamic) = self.dynamics.get(i) {
                out.push_str(dynamic);
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct RenderError {
    pub message: String,
}

impl RenderError {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RenderError {}

/// Supplies component implementations at render time. Slot values arrive in
/// the attribute map under their slot names.
pub trait ComponentResolver {
    fn render_component(
        &self,
        target: &ComponentRef,
        attrs: &BTreeMap<String, Value>,
        renderer: &Renderer,
    ) -> Result<Value, RenderError>;
}

pub struct Renderer<'a> {
    pub assigns: &'a Env,
    pub resolver: Option<&'a dyn ComponentResolver>,
}

impl<'a> Renderer<'a> {
    pub fn new(assigns: &'a Env) -> Self {
        Self { assigns, resolver: None }
    }

    pub fn with_resolver(assigns: &'a Env, resolver: &'a dyn ComponentResolver) -> Self {
        Self { assigns, resolver: Some(resolver) }
    }

    pub fn render(&self, tree: &CompiledTree) -> Result<Rendered, RenderError> {
        self.render_with(tree, &Env::new())
    }

    /// Render a tree with extra local variables in scope.
    pub fn render_with(&self, tree: &CompiledTree, locals: &Env) -> Result<Rendered, RenderError> {
        let mut bindings: BTreeMap<&str, String> = BTreeMap::new();
        for step in &tree.dynamics {
            match step {
                Step::Bind { name, expr, escape } => {
                    let value = self.eval(expr, locals)?;
                    bindings.insert(name, output_string(&value, *escape)?);
                }
                Step::Discard { expr } => {
                    self.eval(expr, locals)?;
                }
            }
        }

        let mut statics = vec![String::new()];
        let mut dynamics = Vec::new();
        for segment in &tree.statics {
            match segment {
                Segment::Lit(text) => {
                    if let Some(last) = statics.last_mut() {
                        last.push_str(text);
                    }
                }
                Segment::Slot(name) => {
                    let rendered = bindings.remove(name.as_str()).ok_or_else(|| {
                        RenderError::new(format!("binding '{}' was never evaluated", name))
                    })?;
                    dynamics.push(rendered);
                    statics.push(String::new());
                }
            }
        }
        Ok(Rendered { statics, dynamics })
    }

    pub fn eval(&self, expr: &Expr, locals: &Env) -> Result<Value, RenderError> {
        match expr {
            Expr::Nil => Ok(Value::Nil),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(n) => Ok(Value::Float(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Sym(s) => Ok(Value::Sym(s.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, locals))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Map(pairs) => {
                let mut map = BTreeMap::new();
                for (key, value) in pairs {
                    let key = self.map_key(key, locals)?;
                    map.insert(key, self.eval(value, locals)?);
                }
                Ok(Value::Map(map))
            }
            Expr::Assign(name) => self
                .assigns
                .get(name)
                .cloned()
                .ok_or_else(|| RenderError::new(format!("missing assign @{}", name))),
            Expr::Var(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| RenderError::new(format!("unknown variable '{}'", name))),
            Expr::Capture { name, arity } => {
                Ok(Value::Capture { name: name.clone(), arity: *arity })
            }
            Expr::Call { name, args } => self.call(name, args, locals),
            Expr::Field { base, field } => {
                let base = self.eval(base, locals)?;
                match base {
                    Value::Map(map) => Ok(map.get(field).cloned().unwrap_or(Value::Nil)),
                    Value::Nil => Ok(Value::Nil),
                    other => Err(RenderError::new(format!(
                        "cannot access field '{}' on {}",
                        field,
                        type_name(&other)
                    ))),
                }
            }
            Expr::Index { base, index } => {
                let base = self.eval(base, locals)?;
                let index = self.eval(index, locals)?;
                match (base, index) {
                    (Value::List(items), Value::Int(i)) => {
                        let idx = usize::try_from(i).ok();
                        Ok(idx.and_then(|i| items.get(i).cloned()).unwrap_or(Value::Nil))
                    }
                    (Value::Map(map), key) => {
                        let key = key_string(&key)?;
                        Ok(map.get(&key).cloned().unwrap_or(Value::Nil))
                    }
                    (base, _) => Err(RenderError::new(format!(
                        "cannot index into {}",
                        type_name(&base)
                    ))),
                }
            }
            Expr::Unary { op, operand } => {
                let value = self.eval(operand, locals)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(n) => Ok(Value::Int(-n)),
                        Value::Float(n) => Ok(Value::Float(-n)),
                        other => Err(RenderError::new(format!(
                            "cannot negate {}",
                            type_name(&other)
                        ))),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, locals),
            Expr::Generator { .. } => {
                Err(RenderError::new("generator is only valid as a :for value"))
            }
            Expr::Nested(tree) => Ok(Value::Tree(self.render_with(tree, locals)?)),
            Expr::If { cond, then, otherwise } => {
                if self.eval(cond, locals)?.truthy() {
                    self.eval(then, locals)
                } else {
                    self.eval(otherwise, locals)
                }
            }
            Expr::Comprehension { pattern, source, filter, body } => {
                let source = self.eval(source, locals)?;
                let items = match source {
                    Value::List(items) => items,
                    other => {
                        return Err(RenderError::new(format!(
                            ":for source must be a list, got {}",
                            type_name(&other)
                        )));
                    }
                };
                let mut out = Vec::new();
                for item in items {
                    let mut scope = locals.clone();
                    bind_pattern(pattern, item, &mut scope)?;
                    if let Some(filter) = filter {
                        if !self.eval(filter, &scope)?.truthy() {
                            continue;
                        }
                    }
                    out.push(self.eval(body, &scope)?);
                }
                Ok(Value::List(out))
            }
            Expr::Flatten(inner) => {
                let value = self.eval(inner, locals)?;
                match value {
                    Value::List(items) => {
                        let mut out = Vec::new();
                        for item in items {
                            match item {
                                Value::List(inner) => out.extend(inner),
                                other => out.push(other),
                            }
                        }
                        Ok(Value::List(out))
                    }
                    other => Ok(other),
                }
            }
            Expr::AttrSpread(inner) => {
                let value = self.eval(inner, locals)?;
                match value {
                    Value::Map(map) => Ok(Value::Safe(attr_text(&map))),
                    Value::Nil => Ok(Value::Safe(String::new())),
                    other => Err(RenderError::new(format!(
                        "spread attributes must be a map, got {}",
                        type_name(&other)
                    ))),
                }
            }
            Expr::ComponentCall(call) => self.component_call(call, locals),
            Expr::SlotEntry(entry) => Ok(Value::Slot(Box::new(self.slot_value(entry, locals)?))),
        }
    }

    /// Render one slot group value: the merged expression evaluates to a
    /// list of slot values, possibly nested by control-flow wrappers. `arg`
    /// binds each entry's `:let` pattern.
    pub fn render_slot(&self, slot: &Value, arg: Option<&Value>) -> Result<String, RenderError> {
        let mut out = String::new();
        self.render_slot_into(slot, arg, &mut out)?;
        Ok(out)
    }

    fn render_slot_into(
        &self,
        slot: &Value,
        arg: Option<&Value>,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match slot {
            Value::List(items) => {
                for item in items {
                    self.render_slot_into(item, arg, out)?;
                }
                Ok(())
            }
            Value::Slot(entry) => {
                let body = match &entry.body {
                    Some(body) => body,
                    None => return Ok(()),
                };
                let mut scope = entry.captured.clone();
                if let Some(pattern) = &entry.let_pattern {
                    let value = arg.cloned().unwrap_or(Value::Nil);
                    bind_pattern(pattern, value, &mut scope)?;
                }
                let rendered = self.render_with(body, &scope)?;
                out.push_str(&rendered.to_html());
                Ok(())
            }
            Value::Nil => Ok(()),
            other => Err(RenderError::new(format!(
                "expected a slot value, got {}",
                type_name(other)
            ))),
        }
    }

    fn component_call(
        &self,
        call: &crate::ast::ComponentCallExpr,
        locals: &Env,
    ) -> Result<Value, RenderError> {
        let resolver = self.resolver.ok_or_else(|| {
            RenderError::new(format!(
                "no component resolver available for <{}>",
                call.target
            ))
        })?;

        // Spread attributes first, named attributes override.
        let mut attrs = BTreeMap::new();
        if let Some(root) = &call.root {
            match self.eval(root, locals)? {
                Value::Map(map) => attrs.extend(map),
                Value::Nil => {}
                other => {
                    return Err(RenderError::new(format!(
                        "spread attributes must be a map, got {}",
                        type_name(&other)
                    )));
                }
            }
        }
        for (name, expr) in &call.attrs {
            attrs.insert(name.clone(), self.eval(expr, locals)?);
        }
        for (name, expr) in &call.slots {
            attrs.insert(name.clone(), self.eval(expr, locals)?);
        }
        resolver.render_component(&call.target, &attrs, self)
    }

    fn slot_value(&self, entry: &SlotEntryExpr, locals: &Env) -> Result<SlotValue, RenderError> {
        let mut attrs = BTreeMap::new();
        for (name, expr) in &entry.attrs {
            attrs.insert(name.clone(), self.eval(expr, locals)?);
        }
        let body = match &entry.body {
            Some(Expr::Nested(tree)) => Some((**tree).clone()),
            // Control wrapping happens outside the entry, so the body is
            // always a nested tree when present.
            Some(_) => return Err(RenderError::new("malformed slot body")),
            None => None,
        };
        Ok(SlotValue {
            name: entry.name.clone(),
            attrs,
            let_pattern: entry.let_pattern.clone(),
            body,
            captured: locals.clone(),
        })
    }

    fn call(&self, name: &str, args: &[Expr], locals: &Env) -> Result<Value, RenderError> {
        match name {
            "raw" => {
                let arg = self.one_arg(name, args, locals)?;
                Ok(Value::Safe(output_string(&arg, false)?))
            }
            "len" => {
                let arg = self.one_arg(name, args, locals)?;
                match arg {
                    Value::List(items) => Ok(Value::Int(items.len() as i64)),
                    Value::Map(map) => Ok(Value::Int(map.len() as i64)),
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    other => Err(RenderError::new(format!(
                        "len() takes a list, map or string, got {}",
                        type_name(&other)
                    ))),
                }
            }
            _ => Err(RenderError::new(format!("unknown function {}()", name))),
        }
    }

    fn one_arg(&self, name: &str, args: &[Expr], locals: &Env) -> Result<Value, RenderError> {
        match args {
            [arg] => self.eval(arg, locals),
            _ => Err(RenderError::new(format!(
                "{}() takes exactly one argument, got {}",
                name,
                args.len()
            ))),
        }
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        locals: &Env,
    ) -> Result<Value, RenderError> {
        // Short-circuit forms return an operand, not a boolean.
        if op == BinaryOp::And {
            let lhs = self.eval(lhs, locals)?;
            return if lhs.truthy() { self.eval(rhs, locals) } else { Ok(lhs) };
        }
        if op == BinaryOp::Or {
            let lhs = self.eval(lhs, locals)?;
            return if lhs.truthy() { Ok(lhs) } else { self.eval(rhs, locals) };
        }

        let lhs = self.eval(lhs, locals)?;
        let rhs = self.eval(rhs, locals)?;
        match op {
            BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
            BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
            BinaryOp::Concat => match (lhs, rhs) {
                (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (a, b) => Err(RenderError::new(format!(
                    "cannot concatenate {} and {}",
                    type_name(&a),
                    type_name(&b)
                ))),
            },
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                arith(op, &lhs, &rhs)
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                compare(op, &lhs, &rhs)
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn map_key(&self, key: &Expr, locals: &Env) -> Result<String, RenderError> {
        let value = self.eval(key, locals)?;
        key_string(&value)
    }
}

fn key_string(value: &Value) -> Result<String, RenderError> {
    match value {
        Value::Sym(s) | Value::Str(s) => Ok(s.clone()),
        Value::Int(n) => Ok(n.to_string()),
        other => Err(RenderError::new(format!(
            "map keys must be symbols, strings or integers, got {}",
            type_name(other)
        ))),
    }
}

fn arith(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, RenderError> {
    let int = |a: i64, b: i64| match op {
        BinaryOp::Add => Value::Int(a + b),
        BinaryOp::Sub => Value::Int(a - b),
        BinaryOp::Mul => Value::Int(a * b),
        _ => Value::Float(a as f64 / b as f64),
    };
    let float = |a: f64, b: f64| match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        _ => Value::Float(a / b),
    };
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => {
            if op == BinaryOp::Div && *b == 0 {
                return Err(RenderError::new("division by zero"));
            }
            Ok(int(*a, *b))
        }
        (Value::Int(a), Value::Float(b)) => Ok(float(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Ok(float(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(float(*a, *b)),
        (a, b) => Err(RenderError::new(format!(
            "arithmetic on {} and {}",
            type_name(a),
            type_name(b)
        ))),
    }
}

fn compare(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<Value, RenderError> {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(RenderError::new(format!(
                "cannot compare {} and {}",
                type_name(a),
                type_name(b)
            )));
        }
    };
    let ordering = match ordering {
        Some(ordering) => ordering,
        None => return Ok(Value::Bool(false)),
    };
    let result = match op {
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        _ => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

/// Bind a `:let`/generator pattern over a value.
fn bind_pattern(pattern: &Expr, value: Value, scope: &mut Env) -> Result<(), RenderError> {
    match pattern {
        Expr::Var(name) => {
            if name != "_" {
                scope.insert(name.clone(), value);
            }
            Ok(())
        }
        Expr::List(patterns) => match value {
            Value::List(values) if values.len() == patterns.len() => {
                for (pattern, value) in patterns.iter().zip(values) {
                    bind_pattern(pattern, value, scope)?;
                }
                Ok(())
            }
            Value::List(values) => Err(RenderError::new(format!(
                "pattern expects {} elements, got {}",
                patterns.len(),
                values.len()
            ))),
            other => Err(RenderError::new(format!(
                "cannot destructure {} as a list",
                type_name(&other)
            ))),
        },
        _ => Err(RenderError::new("invalid binding pattern")),
    }
}

/// Turn a value into output text. Escaping applies to plain values only;
/// rendered trees and `Safe` strings pass through, lists concatenate.
pub fn output_string(value: &Value, escape: bool) -> Result<String, RenderError> {
    match value {
        Value::Nil => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(n.to_string()),
        Value::Str(s) => Ok(if escape { html::escape(s) } else { s.clone() }),
        Value::Safe(s) => Ok(s.clone()),
        Value::Sym(s) => Ok(if escape { html::escape(s) } else { s.clone() }),
        Value::Tree(rendered) => Ok(rendered.to_html()),
        Value::List(items) => {
            let mut out = String::new();
            for item in items {
                out.push_str(&output_string(item, escape)?);
            }
            Ok(out)
        }
        other => Err(RenderError::new(format!(
            "cannot render {} as output",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "a boolean",
        Value::Int(_) => "an integer",
        Value::Float(_) => "a float",
        Value::Str(_) => "a string",
        Value::Safe(_) => "markup",
        Value::Sym(_) => "a symbol",
        Value::List(_) => "a list",
        Value::Map(_) => "a map",
        Value::Capture { .. } => "a function capture",
        Value::Tree(_) => "a rendered tree",
        Value::Slot(_) => "a slot",
    }
}

/// Render a map as HTML attribute text. `nil`/`false` skip the attribute,
/// `true` emits a bare flag, everything else an escaped value.
fn attr_text(map: &BTreeMap<String, Value>) -> String {
    let mut parts = Vec::new();
    for (name, value) in map {
        match value {
            Value::Nil | Value::Bool(false) => {}
            Value::Bool(true) => parts.push(name.clone()),
            other => {
                let text = match output_string(other, false) {
                    Ok(text) => text,
                    Err(_) => continue,
                };
                parts.push(format!("{}=\"{}\"", name, html::escape(&text)));
            }
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, Value)]) -> Env {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn eval(expr: &Expr, assigns: &Env) -> Value {
        Renderer::new(assigns).eval(expr, &Env::new()).unwrap()
    }

    #[test]
    fn interleaves_statics_and_dynamics() {
        let rendered = Rendered {
            statics: vec!["<p>".into(), "</p>".into()],
            dynamics: vec!["hi".into()],
        };
        assert_eq!(rendered.to_html(), "<p>hi</p>");
    }

    #[test]
    fn short_circuit_returns_operands() {
        let assigns = env(&[("a", Value::Nil), ("b", Value::Int(2))]);
        let expr = Expr::Binary {
            op: BinaryOp::Or,
            lhs: Box::new(Expr::Assign("a".into())),
            rhs: Box::new(Expr::Assign("b".into())),
        };
        assert_eq!(eval(&expr, &assigns), Value::Int(2));
    }

    #[test]
    fn field_access_on_missing_key_is_nil() {
        let assigns = env(&[("user", Value::Map(BTreeMap::new()))]);
        let expr = Expr::Field { base: Box::new(Expr::Assign("user".into())), field: "name".into() };
        assert_eq!(eval(&expr, &assigns), Value::Nil);
    }

    #[test]
    fn missing_assign_is_an_error() {
        let assigns = Env::new();
        let renderer = Renderer::new(&assigns);
        let err = renderer.eval(&Expr::Assign("nope".into()), &Env::new()).unwrap_err();
        assert!(err.message.contains("@nope"));
    }

    #[test]
    fn comprehension_binds_and_filters() {
        let assigns = env(&[(
            "items",
            Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        )]);
        let expr = Expr::Comprehension {
            pattern: Box::new(Expr::Var("n".into())),
            source: Box::new(Expr::Assign("items".into())),
            filter: Some(Box::new(Expr::Binary {
                op: BinaryOp::Gt,
                lhs: Box::new(Expr::Var("n".into())),
                rhs: Box::new(Expr::Int(1)),
            })),
            body: Box::new(Expr::Var("n".into())),
        };
        assert_eq!(eval(&expr, &assigns), Value::List(vec![Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn escaped_output() {
        assert_eq!(
            output_string(&Value::Str("<b>".into()), true).unwrap(),
            "&lt;b&gt;"
        );
        assert_eq!(output_string(&Value::Safe("<b>".into()), true).unwrap(), "<b>");
    }

    #[test]
    fn attr_spread_text() {
        let mut map = BTreeMap::new();
        map.insert("class".to_string(), Value::Str("btn".into()));
        map.insert("disabled".to_string(), Value::Bool(true));
        map.insert("hidden".to_string(), Value::Nil);
        assert_eq!(attr_text(&map), "class=\"btn\" disabled");
    }

    #[test]
    fn destructuring_patterns() {
        let mut scope = Env::new();
        let pattern = Expr::List(vec![Expr::Var("k".into()), Expr::Var("_".into())]);
        bind_pattern(
            &pattern,
            Value::List(vec![Value::Str("a".into()), Value::Int(1)]),
            &mut scope,
        )
        .unwrap();
        assert_eq!(scope.get("k"), Some(&Value::Str("a".into())));
        assert!(!scope.contains_key("_"));
    }
}
