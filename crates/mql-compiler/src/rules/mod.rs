//! Relational-to-pipeline rules
//!
//! One module per plan node kind. Every rule takes its input as an already
//! converted [`Fragment`] and returns a new one, so bindings flow by value
//! from the leaves to the root.

use std::cell::Cell;
use std::collections::HashSet;

use mql_plan::{RelKind, RelNode};
use mql_schema::Schema;
use serde_json::Value;
use tracing::debug;

use crate::bindings::Bindings;
use crate::error::Result;
use crate::operators::OperatorTable;
use crate::translator::ExprTranslator;

pub mod aggregate;
pub mod filter;
pub mod join;
pub mod project;
pub mod scan;
pub mod setop;
pub mod sort;

/// Shared state of one compilation
pub struct RuleContext<'a> {
    pub schema: &'a Schema,
    pub operators: &'a OperatorTable,
    counter: Cell<usize>,
}

impl<'a> RuleContext<'a> {
    pub fn new(schema: &'a Schema, operators: &'a OperatorTable) -> Self {
        Self {
            schema,
            operators,
            counter: Cell::new(0),
        }
    }

    /// Suffix for synthetic field names, unique within the compilation
    pub fn next_id(&self) -> usize {
        let id = self.counter.get();
        self.counter.set(id + 1);
        id
    }

    pub fn translator<'b>(&'b self, fields: &'b [String]) -> ExprTranslator<'b> {
        ExprTranslator::new(self.operators, fields)
    }
}

/// Stages emitted so far and where they leave each column
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub stages: Vec<Value>,
    pub bindings: Bindings,
}

impl Fragment {
    pub fn new(stages: Vec<Value>, bindings: Bindings) -> Self {
        Self { stages, bindings }
    }
}

/// Converts `node` and everything below it
pub fn convert(ctx: &RuleContext<'_>, node: &RelNode) -> Result<Fragment> {
    debug!(rel = node.kind_name(), "Applying rule");
    match &node.kind {
        RelKind::Scan { table } => scan::convert(ctx, table),
        RelKind::Filter { input, condition } => {
            let input = convert(ctx, input)?;
            filter::apply(ctx, input, condition)
        }
        RelKind::Project { input, exprs } => {
            let input = convert(ctx, input)?;
            project::apply(ctx, input, exprs, node)
        }
        RelKind::Sort {
            input,
            keys,
            offset,
            fetch,
        } => {
            let input = convert(ctx, input)?;
            sort::apply(input, keys, *offset, *fetch)
        }
        RelKind::Aggregate {
            input,
            group,
            calls,
        } => {
            let input = convert(ctx, input)?;
            aggregate::apply(input, group, calls, node)
        }
        RelKind::Join { .. } => join::convert(ctx, node),
        RelKind::SetOp { op, all, inputs } => setop::convert(ctx, *op, *all, inputs),
    }
}

/// Field name for an output column: every character outside
/// `[A-Za-z0-9_]` becomes `_`, and a leading digit gets a `_` prefix.
pub fn normalize_name(name: &str) -> String {
    let mut normalized: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if normalized.is_empty() || normalized.starts_with(|c: char| c.is_ascii_digit()) {
        normalized.insert(0, '_');
    }
    normalized
}

/// Normalized, pairwise distinct field names. Names in `reserved` are
/// treated as taken.
pub fn unique_names<'n>(names: impl IntoIterator<Item = &'n str>, reserved: &[&str]) -> Vec<String> {
    let mut taken: HashSet<String> = reserved.iter().map(|s| s.to_string()).collect();
    names
        .into_iter()
        .map(|name| {
            let base = normalize_name(name);
            let mut candidate = base.clone();
            let mut n = 0;
            while taken.contains(&candidate) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            taken.insert(candidate.clone());
            candidate
        })
        .collect()
}
