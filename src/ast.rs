use serde::Serialize;

// Re-export Position and Span from the tokenizer so the rest of the codebase
// uses a single span type.
pub use crate::parser::tokenizer::{Position, Span};

/// Marker on an expression token: does its value become output, or is the
/// expression evaluated for effect only?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExprMarker {
    /// Value is escaped and spliced into the rendered output
    Output,
    /// Evaluated, result discarded (no static placeholder)
    Quiet,
}

/// Reference to a component implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ComponentRef {
    /// `<.name>` — a component local to the enclosing module
    Local(String),
    /// `<Some.Module.func>` — a component addressed by dotted path
    Remote { module: String, func: String },
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComponentRef::Local(name) => write!(f, ".{}", name),
            ComponentRef::Remote { module, func } => write!(f, "{}.{}", module, func),
        }
    }
}

/// Host-language expression. The engine treats values of this type as opaque
/// handles: it builds them, splices them and forwards them to the compiled
/// tree, but only inspects them through the capability queries below and in
/// `expr` (generator shape, binding-pattern shape, literal map).
///
/// The variants after `Generator` are synthesized by the compiler itself and
/// never come out of the expression parser.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Symbol literal: `:name`
    Sym(String),
    List(Vec<Expr>),
    /// Map literal: `{key: value, "key": value}`. Keys are expressions, but
    /// only literal keys (symbol/string/integer) are ever produced by the
    /// parser's key grammar.
    Map(Vec<(Expr, Expr)>),
    /// Assign access: `@name`
    Assign(String),
    Var(String),
    /// Function capture: `&name/2`
    Capture { name: String, arity: usize },
    Call { name: String, args: Vec<Expr> },
    Field { base: Box<Expr>, field: String },
    Index { base: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    /// Generator form `pattern <- enumerable`; only legal as a `:for` value.
    Generator { pattern: Box<Expr>, source: Box<Expr> },

    // --- synthesized by the compiler ---
    /// A nested compiled sub-tree (always known-safe)
    Nested(Box<CompiledTree>),
    /// `:if` wrapping: evaluates to a list of zero or one sub-trees
    If { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
    /// `:for` wrapping: one body value per iteration, optionally filtered
    Comprehension {
        pattern: Box<Expr>,
        source: Box<Expr>,
        filter: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    /// One-level list flatten, used when merging mixed slot groups
    Flatten(Box<Expr>),
    /// Renders a mapping as HTML attribute text (spread attributes kept
    /// opaque until render time)
    AttrSpread(Box<Expr>),
    ComponentCall(Box<ComponentCallExpr>),
    SlotEntry(Box<SlotEntryExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Mul,
    Div,
    Add,
    Sub,
    Concat,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Compiler-synthesized component invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentCallExpr {
    pub target: ComponentRef,
    /// Named attributes in source order
    pub attrs: Vec<(String, Expr)>,
    /// Opaque spread mapping, merged into the attribute set at render time
    pub root: Option<Expr>,
    /// Merged slot lists by name, insertion order of first occurrence
    pub slots: Vec<(String, Expr)>,
}

/// One slot entry, before grouping. Evaluates to a slot value at render time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotEntryExpr {
    pub name: String,
    pub attrs: Vec<(String, Expr)>,
    /// `:let` binding pattern for the slot body, if any
    pub let_pattern: Option<Expr>,
    /// Compiled slot body; `None` for a self-closed slot
    pub body: Option<Expr>,
}

impl Expr {
    /// Is this the generator form `pattern <- enumerable`?
    pub fn is_generator(&self) -> bool {
        matches!(self, Expr::Generator { .. })
    }

    pub fn generator_parts(&self) -> Option<(&Expr, &Expr)> {
        match self {
            Expr::Generator { pattern, source } => Some((pattern, source)),
            _ => None,
        }
    }

    /// Can this expression serve as a binding pattern (`:let`, generator
    /// left-hand side)? Plain variables, `_`, and lists of patterns qualify.
    pub fn is_binding_pattern(&self) -> bool {
        match self {
            Expr::Var(_) => true,
            Expr::List(items) => items.iter().all(Expr::is_binding_pattern),
            _ => false,
        }
    }

    /// A literal map usable for compile-time unpacking: every key must be a
    /// literal (symbol, string or integer).
    pub fn as_literal_map(&self) -> Option<&[(Expr, Expr)]> {
        match self {
            Expr::Map(pairs)
                if pairs
                    .iter()
                    .all(|(k, _)| matches!(k, Expr::Sym(_) | Expr::Str(_) | Expr::Int(_))) =>
            {
                Some(pairs)
            }
            _ => None,
        }
    }

    /// Literal key text, for unpacked map attributes.
    pub fn literal_key(&self) -> Option<String> {
        match self {
            Expr::Sym(s) | Expr::Str(s) => Some(s.clone()),
            Expr::Int(i) => Some(i.to_string()),
            _ => None,
        }
    }

    /// Values that never pass through the HTML escape: nested compiled trees,
    /// component results, control-flow wrappers over those, and explicit
    /// `raw(...)` calls.
    pub fn known_safe(&self) -> bool {
        match self {
            Expr::Nested(_)
            | Expr::ComponentCall(_)
            | Expr::SlotEntry(_)
            | Expr::AttrSpread(_)
            | Expr::Flatten(_)
            | Expr::If { .. }
            | Expr::Comprehension { .. } => true,
            Expr::Call { name, .. } => name == "raw",
            _ => false,
        }
    }
}

/// One segment of a compiled tree's static skeleton.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Segment {
    /// Literal output text, known at compile time
    Lit(String),
    /// Placeholder for the dynamic binding with the given name
    Slot(String),
}

/// One step of a compiled tree's dynamic program, evaluated in source order
/// before the static skeleton is assembled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Step {
    /// Bind the (escaped, unless known-safe) expression value to `name`
    Bind { name: String, expr: Expr, escape: bool },
    /// Evaluate for effect only; nothing is emitted
    Discard { expr: Expr },
}

/// The compiled artifact: an alternating static/dynamic program. At render
/// time all dynamic steps run first, in order, then the static segments are
/// concatenated with each `Slot` replaced by its binding's value. Sub-trees
/// nest recursively through `Expr::Nested`.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct CompiledTree {
    pub statics: Vec<Segment>,
    pub dynamics: Vec<Step>,
}

impl CompiledTree {
    pub fn is_empty(&self) -> bool {
        self.statics.is_empty() && self.dynamics.is_empty()
    }

    /// Names of the bindings introduced by this tree (not sub-trees).
    pub fn binding_names(&self) -> Vec<&str> {
        self.dynamics
            .iter()
            .filter_map(|step| match step {
                Step::Bind { name, .. } => Some(name.as_str()),
                Step::Discard { .. } => None,
            })
            .collect()
    }
}

/// Per-tag metadata resolved by the attribute preprocessor: control-flow
/// attributes moved out of the attribute list, and the component target for
/// component tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMeta {
    pub if_expr: Option<Expr>,
    pub for_expr: Option<Expr>,
    pub let_pattern: Option<(Expr, Span)>,
    pub component: Option<ComponentRef>,
}

impl TagMeta {
    pub fn has_control(&self) -> bool {
        self.if_expr.is_some() || self.for_expr.is_some()
    }
}
