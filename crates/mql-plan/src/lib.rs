//! Logical query plans
//!
//! Canonical JSON representation of the relational plan an optimizer hands
//! to the pipeline compiler. Every node carries its output row type, and all
//! types serialize deterministically so plans can be fingerprinted.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod builder;
mod expr;
mod types;

pub use builder::{infer_type, PlanBuilder, PlanError, SchemaProvider};
pub use expr::*;
pub use types::*;

/// Top-level query plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    /// Original SQL text, used in diagnostics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    pub root: RelNode,
}

impl QueryPlan {
    pub fn new(root: RelNode) -> Self {
        Self { sql: None, root }
    }

    pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    /// Calculate fingerprint (SHA-256) for deterministic caching
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).expect("plan should always serialize");
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Relational operator node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelNode {
    pub row_type: RowType,

    #[serde(flatten)]
    pub kind: RelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rel", rename_all = "snake_case")]
pub enum RelKind {
    Scan {
        table: String,
    },
    Filter {
        input: Box<RelNode>,
        condition: Expr,
    },
    /// Output names come from the node's row type
    Project {
        input: Box<RelNode>,
        exprs: Vec<Expr>,
    },
    Sort {
        input: Box<RelNode>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keys: Vec<SortKey>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fetch: Option<u64>,
    },
    Aggregate {
        input: Box<RelNode>,
        #[serde(default)]
        group: Vec<usize>,
        #[serde(default)]
        calls: Vec<AggCall>,
    },
    /// Condition references the concatenated left + right row
    Join {
        left: Box<RelNode>,
        right: Box<RelNode>,
        join_type: JoinType,
        condition: Expr,
    },
    SetOp {
        op: SetOpKind,
        #[serde(default)]
        all: bool,
        inputs: Vec<RelNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: usize,
    #[serde(default)]
    pub desc: bool,
}

impl SortKey {
    pub fn asc(field: usize) -> Self {
        Self { field, desc: false }
    }

    pub fn desc(field: usize) -> Self {
        Self { field, desc: true }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunction {
    Count,
    Sum,
    /// SUM that yields 0 instead of NULL over empty input
    Sum0,
    Avg,
    Min,
    Max,
    AnyValue,
    Function(String),
}

impl AggFunction {
    pub fn name(&self) -> &str {
        match self {
            AggFunction::Count => "COUNT",
            AggFunction::Sum => "SUM",
            AggFunction::Sum0 => "$SUM0",
            AggFunction::Avg => "AVG",
            AggFunction::Min => "MIN",
            AggFunction::Max => "MAX",
            AggFunction::AnyValue => "ANY_VALUE",
            AggFunction::Function(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggCall {
    pub func: AggFunction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<usize>,
    #[serde(default)]
    pub distinct: bool,
}

impl AggCall {
    pub fn new(func: AggFunction, args: Vec<usize>) -> Self {
        Self {
            func,
            args,
            distinct: false,
        }
    }

    pub fn distinct(func: AggFunction, args: Vec<usize>) -> Self {
        Self {
            func,
            args,
            distinct: true,
        }
    }
}

impl std::fmt::Display for AggCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}(", self.func.name())?;
        if self.distinct {
            write!(f, "DISTINCT ")?;
        }
        let args: Vec<String> = self.args.iter().map(|a| format!("${}", a)).collect();
        write!(f, "{})", args.join(", "))
    }
}

impl RelNode {
    pub fn new(kind: RelKind, row_type: RowType) -> Self {
        Self { row_type, kind }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            RelKind::Scan { .. } => "Scan",
            RelKind::Filter { .. } => "Filter",
            RelKind::Project { .. } => "Project",
            RelKind::Sort { .. } => "Sort",
            RelKind::Aggregate { .. } => "Aggregate",
            RelKind::Join { .. } => "Join",
            RelKind::SetOp { .. } => "SetOp",
        }
    }

    pub fn inputs(&self) -> Vec<&RelNode> {
        match &self.kind {
            RelKind::Scan { .. } => vec![],
            RelKind::Filter { input, .. }
            | RelKind::Project { input, .. }
            | RelKind::Sort { input, .. }
            | RelKind::Aggregate { input, .. } => vec![input.as_ref()],
            RelKind::Join { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            RelKind::SetOp { inputs, .. } => inputs.iter().collect(),
        }
    }

    /// Expressions owned directly by this node
    pub fn expressions(&self) -> Vec<&Expr> {
        match &self.kind {
            RelKind::Filter { condition, .. } | RelKind::Join { condition, .. } => vec![condition],
            RelKind::Project { exprs, .. } => exprs.iter().collect(),
            _ => vec![],
        }
    }

    /// Table scanned by the leftmost leaf
    pub fn leftmost_table(&self) -> Option<&str> {
        match &self.kind {
            RelKind::Scan { table } => Some(table),
            _ => self.inputs().first().and_then(|n| n.leftmost_table()),
        }
    }

    /// Row count the plan itself asks for, looking through projections
    pub fn requested_limit(&self) -> Option<u64> {
        match &self.kind {
            RelKind::Sort { fetch, .. } => *fetch,
            RelKind::Project { input, .. } => input.requested_limit(),
            _ => None,
        }
    }

    /// Number of nodes in the tree
    pub fn node_count(&self) -> usize {
        1 + self.inputs().iter().map(|n| n.node_count()).sum::<usize>()
    }
}
