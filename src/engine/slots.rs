//! Slot grouping. Slot entries collected while compiling a component body
//! are merged per name; the merge shape depends on whether any entry is
//! "special" (wrapped in `:if`/`:for` control flow, so it contributes zero
//! or more values instead of exactly one).

use crate::ast::Expr;
use crate::engine::registry::SlotCallInfo;

/// One slot contribution, in source order.
#[derive(Debug)]
pub struct SlotEntry {
    pub name: String,
    pub expr: Expr,
    /// Entry is control-flow wrapped and evaluates to a list of values.
    pub special: bool,
    pub info: SlotCallInfo,
}

/// Merge entries into one expression per slot name, keeping the insertion
/// order of first occurrence. Per name:
/// - no special entries: a plain list of the entries;
/// - a single special entry: that entry's expression unchanged;
/// - otherwise: a one-level flatten over the mixed list.
pub fn merge(entries: Vec<SlotEntry>) -> Vec<(String, Expr)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<SlotEntry>> = Vec::new();
    for entry in entries {
        match order.iter().position(|name| *name == entry.name) {
            Some(idx) => groups[idx].push(entry),
            None => {
                order.push(entry.name.clone());
                groups.push(vec![entry]);
            }
        }
    }

    order
        .into_iter()
        .zip(groups)
        .map(|(name, group)| {
            let any_special = group.iter().any(|e| e.special);
            let exprs: Vec<Expr> = group.into_iter().map(|e| e.expr).collect();
            let merged = if !any_special {
                Expr::List(exprs)
            } else if exprs.len() == 1 {
                // Safe to pass through: the wrapper already yields a list.
                exprs.into_iter().next().unwrap_or(Expr::Nil)
            } else {
                Expr::Flatten(Box::new(Expr::List(exprs)))
            };
            (name, merged)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, expr: Expr, special: bool) -> SlotEntry {
        SlotEntry { name: name.into(), expr, special, info: SlotCallInfo::default() }
    }

    #[test]
    fn plain_entries_become_a_list() {
        let merged = merge(vec![
            entry("item", Expr::Int(1), false),
            entry("item", Expr::Int(2), false),
            entry("item", Expr::Int(3), false),
        ]);
        assert_eq!(
            merged,
            vec![(
                "item".to_string(),
                Expr::List(vec![Expr::Int(1), Expr::Int(2), Expr::Int(3)])
            )]
        );
    }

    #[test]
    fn single_special_entry_passes_through() {
        let wrapped = Expr::If {
            cond: Expr::Bool(true).into(),
            then: Expr::List(vec![Expr::Int(1)]).into(),
            otherwise: Expr::List(vec![]).into(),
        };
        let merged = merge(vec![entry("item", wrapped.clone(), true)]);
        assert_eq!(merged, vec![("item".to_string(), wrapped)]);
    }

    #[test]
    fn mixed_entries_flatten() {
        let wrapped = Expr::If {
            cond: Expr::Bool(true).into(),
            then: Expr::List(vec![Expr::Int(1)]).into(),
            otherwise: Expr::List(vec![]).into(),
        };
        let merged = merge(vec![
            entry("item", wrapped.clone(), true),
            entry("item", Expr::Int(2), false),
        ]);
        assert_eq!(
            merged,
            vec![(
                "item".to_string(),
                Expr::Flatten(Box::new(Expr::List(vec![wrapped, Expr::Int(2)])))
            )]
        );
    }

    #[test]
    fn names_keep_first_occurrence_order() {
        let merged = merge(vec![
            entry("header", Expr::Int(1), false),
            entry("footer", Expr::Int(2), false),
            entry("header", Expr::Int(3), false),
        ]);
        let names: Vec<_> = merged.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["header", "footer"]);
    }
}
