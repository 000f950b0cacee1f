//! Static/dynamic accumulator. Compiled output alternates literal text with
//! named dynamic bindings; the accumulator owns the binding counter, which
//! is compile-scoped and never rewinds, so binding names stay unique across
//! every sub-tree of one compilation.

use crate::ast::{CompiledTree, Expr, ExprMarker, Segment, Step};

#[derive(Debug, Default)]
pub struct Acc {
    segments: Vec<Segment>,
    steps: Vec<Step>,
    counter: u32,
}

/// A saved accumulator body. Checkpoints capture segments and steps only;
/// the counter stays with the compilation.
#[derive(Debug, Default)]
pub struct AccState {
    segments: Vec<Segment>,
    steps: Vec<Step>,
}

impl Acc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append literal text, merging into a trailing literal segment.
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Segment::Lit(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(Segment::Lit(text.to_string()));
        }
    }

    /// Append a dynamic expression. `Output` expressions get a fresh binding
    /// name and a placeholder segment; `Quiet` ones are evaluated for effect
    /// only and leave no trace in the statics.
    pub fn push_expr(&mut self, marker: ExprMarker, expr: Expr) {
        match marker {
            ExprMarker::Output => {
                let name = format!("d{}", self.counter);
                self.counter += 1;
                let escape = !expr.known_safe();
                self.steps.push(Step::Bind { name: name.clone(), expr, escape });
                self.segments.push(Segment::Slot(name));
            }
            ExprMarker::Quiet => {
                self.steps.push(Step::Discard { expr });
            }
        }
    }

    /// Start a fresh body, returning the current one for later restore.
    pub fn checkpoint(&mut self) -> AccState {
        AccState {
            segments: std::mem::take(&mut self.segments),
            steps: std::mem::take(&mut self.steps),
        }
    }

    /// Swap the current body out for a previously saved one, returning the
    /// body accumulated since the matching checkpoint.
    pub fn restore(&mut self, saved: AccState) -> CompiledTree {
        let segments = std::mem::replace(&mut self.segments, saved.segments);
        let steps = std::mem::replace(&mut self.steps, saved.steps);
        CompiledTree { statics: segments, dynamics: steps }
    }

    /// Drain the accumulator into a finished tree.
    pub fn dump(self) -> CompiledTree {
        CompiledTree { statics: self.segments, dynamics: self.steps }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_text_merges() {
        let mut acc = Acc::new();
        acc.push_text("foo");
        acc.push_text("bar");
        acc.push_text("");
        let tree = acc.dump();
        assert_eq!(tree.statics, vec![Segment::Lit("foobar".into())]);
        assert!(tree.dynamics.is_empty());
    }

    #[test]
    fn output_exprs_get_sequential_names() {
        let mut acc = Acc::new();
        acc.push_expr(ExprMarker::Output, Expr::Assign("a".into()));
        acc.push_text("mid");
        acc.push_expr(ExprMarker::Output, Expr::Assign("b".into()));
        let tree = acc.dump();
        assert_eq!(tree.binding_names(), vec!["d0", "d1"]);
        assert_eq!(
            tree.statics,
            vec![
                Segment::Slot("d0".into()),
                Segment::Lit("mid".into()),
                Segment::Slot("d1".into()),
            ]
        );
    }

    #[test]
    fn quiet_exprs_leave_no_segment() {
        let mut acc = Acc::new();
        acc.push_expr(ExprMarker::Quiet, Expr::Assign("a".into()));
        let tree = acc.dump();
        assert!(tree.statics.is_empty());
        assert_eq!(tree.dynamics.len(), 1);
        assert!(matches!(tree.dynamics[0], Step::Discard { .. }));
    }

    #[test]
    fn counter_survives_checkpoints() {
        let mut acc = Acc::new();
        acc.push_expr(ExprMarker::Output, Expr::Assign("a".into()));
        let saved = acc.checkpoint();
        acc.push_expr(ExprMarker::Output, Expr::Assign("b".into()));
        let inner = acc.restore(saved);
        acc.push_expr(ExprMarker::Output, Expr::Assign("c".into()));
        let outer = acc.dump();
        assert_eq!(inner.binding_names(), vec!["d1"]);
        assert_eq!(outer.binding_names(), vec!["d0", "d2"]);
    }

    #[test]
    fn known_safe_exprs_skip_escaping() {
        let mut acc = Acc::new();
        acc.push_expr(ExprMarker::Output, Expr::Assign("a".into()));
        acc.push_expr(
            ExprMarker::Output,
            Expr::Call { name: "raw".into(), args: vec![Expr::Assign("a".into())] },
        );
        let tree = acc.dump();
        match (&tree.dynamics[0], &tree.dynamics[1]) {
            (Step::Bind { escape: e0, .. }, Step::Bind { escape: e1, .. }) => {
                assert!(*e0);
                assert!(!*e1);
            }
            other => panic!("unexpected steps: {:?}", other),
        }
    }
}
