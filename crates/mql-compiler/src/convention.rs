//! Push-down analysis
//!
//! Decides per plan node whether it can run inside the aggregation pipeline
//! (`Mongo`) or would have to run in the client (`Enumerable`), and prices
//! plans so that fully pushed-down alternatives always win.

use std::fmt;

use mql_plan::{AggFunction, Expr, JoinType, QueryPlan, RelKind, RelNode};
use serde::Serialize;

use crate::error::{JoinRejection, Result, TranslateError};
use crate::operators::OperatorTable;
use crate::rules::setop;

const SCAN_ROWS: f64 = 100.0;

/// Cost added for every node whose rows leave the database
const TRANSFER_PENALTY: f64 = 1_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Convention {
    Mongo,
    Enumerable,
}

impl fmt::Display for Convention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Convention::Mongo => f.write_str("MONGO"),
            Convention::Enumerable => f.write_str("ENUMERABLE"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Cost {
    pub rows: f64,
    pub cpu: f64,
}

/// Share of the enumerable cost a node pays when pushed down
fn mongo_factor(node: &RelNode) -> f64 {
    match node.kind {
        RelKind::Scan { .. } => 1.0,
        RelKind::Filter { .. } | RelKind::Project { .. } => 0.1,
        RelKind::Sort { .. } | RelKind::Aggregate { .. } => 0.5,
        RelKind::Join { .. } => 0.75,
        RelKind::SetOp { .. } => 1.0,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeAnalysis {
    pub kind: &'static str,
    pub depth: usize,
    pub convention: Convention,
    /// Why this node itself cannot be pushed down
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "as_message")]
    pub rejection: Option<TranslateError>,
    /// Cumulative cost of the subtree rooted here
    pub cost: Cost,
}

fn as_message<S: serde::Serializer>(e: &Option<TranslateError>, s: S) -> std::result::Result<S::Ok, S::Error> {
    match e {
        Some(e) => s.serialize_str(&e.to_string()),
        None => s.serialize_none(),
    }
}

/// Per-node analysis in post-order, the root last
#[derive(Debug, Clone, Serialize)]
pub struct PlanAnalysis {
    pub nodes: Vec<NodeAnalysis>,
}

impl PlanAnalysis {
    pub fn root(&self) -> Option<&NodeAnalysis> {
        self.nodes.last()
    }

    pub fn cost(&self) -> Cost {
        self.root().map(|n| n.cost).unwrap_or_default()
    }

    pub fn is_pushed_down(&self) -> bool {
        self.nodes.iter().all(|n| n.convention == Convention::Mongo)
    }

    /// First node that cannot be pushed down on its own account
    pub fn first_rejection(&self) -> Option<&TranslateError> {
        self.nodes.iter().find_map(|n| n.rejection.as_ref())
    }
}

pub fn analyze(operators: &OperatorTable, root: &RelNode) -> PlanAnalysis {
    let mut nodes = Vec::with_capacity(root.node_count());
    visit(operators, root, 0, &mut nodes);
    PlanAnalysis { nodes }
}

/// Returns whether `node` was pushed down and its cost
fn visit(operators: &OperatorTable, node: &RelNode, depth: usize, out: &mut Vec<NodeAnalysis>) -> (bool, Cost) {
    let mut inputs_pushed = true;
    let mut input_cpu = 0.0;
    let mut input_rows = Vec::new();
    for input in node.inputs() {
        let (pushed, cost) = visit(operators, input, depth + 1, out);
        inputs_pushed &= pushed;
        input_rows.push(cost.rows);
        input_cpu += cost.cpu;
    }

    let rejection = own_rejection(operators, node);
    let convention = if rejection.is_none() && inputs_pushed {
        Convention::Mongo
    } else {
        Convention::Enumerable
    };

    let rows = output_rows(node, &input_rows);
    let work = input_rows.iter().sum::<f64>().max(rows);
    let own_cpu = match convention {
        Convention::Mongo => work * mongo_factor(node),
        Convention::Enumerable => work + TRANSFER_PENALTY,
    };
    let cost = Cost {
        rows,
        cpu: input_cpu + own_cpu,
    };

    out.push(NodeAnalysis {
        kind: node.kind_name(),
        depth,
        convention,
        rejection,
        cost,
    });
    (convention == Convention::Mongo, cost)
}

fn output_rows(node: &RelNode, inputs: &[f64]) -> f64 {
    let first = inputs.first().copied().unwrap_or(SCAN_ROWS);
    match &node.kind {
        RelKind::Scan { .. } => SCAN_ROWS,
        RelKind::Filter { .. } => first * 0.5,
        RelKind::Project { .. } => first,
        RelKind::Sort { fetch, .. } => match fetch {
            Some(n) => first.min(*n as f64),
            None => first,
        },
        RelKind::Aggregate { group, .. } if group.is_empty() => 1.0,
        RelKind::Aggregate { .. } => first * 0.1,
        RelKind::Join { .. } => inputs.iter().copied().fold(0.0, f64::max),
        RelKind::SetOp { .. } => inputs.iter().sum(),
    }
}

/// Whether the node's own operator and expressions have a pipeline form
fn own_rejection(operators: &OperatorTable, node: &RelNode) -> Option<TranslateError> {
    for expr in node.expressions() {
        if let Some(e) = unsupported_expr(operators, expr) {
            return Some(e);
        }
    }

    match &node.kind {
        RelKind::Aggregate { calls, .. } => calls.iter().find_map(|call| match &call.func {
            AggFunction::Function(name) => Some(TranslateError::unsupported(name.as_str(), call)),
            _ => None,
        }),
        RelKind::Join { join_type, .. } if matches!(join_type, JoinType::Right | JoinType::Full) => {
            Some(JoinRejection::UnsupportedJoinType(*join_type).into())
        }
        RelKind::SetOp { op, all, .. } => setop::rejection(*op, *all),
        _ => None,
    }
}

fn unsupported_expr(operators: &OperatorTable, expr: &Expr) -> Option<TranslateError> {
    match expr {
        Expr::Call { op, operands } => {
            if !operators.contains(op.name()) {
                return Some(TranslateError::unsupported(op.name(), expr));
            }
            operands.iter().find_map(|e| unsupported_expr(operators, e))
        }
        _ => None,
    }
}

/// Fails with the first reason the plan cannot run entirely as a pipeline
pub fn require_pushdown(operators: &OperatorTable, root: &RelNode) -> Result<()> {
    let analysis = analyze(operators, root);
    if analysis.is_pushed_down() {
        return Ok(());
    }
    Err(analysis.first_rejection().cloned().unwrap_or_else(|| {
        TranslateError::UnsupportedQueryShape("plan is not fully pushed down".to_string())
    }))
}

/// Index of the plan to compile: fully pushed-down plans first, then the
/// lowest cost
pub fn cheapest(operators: &OperatorTable, plans: &[QueryPlan]) -> Option<usize> {
    plans
        .iter()
        .map(|p| analyze(operators, &p.root))
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (!a.is_pushed_down())
                .cmp(&!b.is_pushed_down())
                .then(a.cost().cpu.total_cmp(&b.cost().cpu))
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use mql_plan::{Field, Operator, RowType, SetOpKind, SqlType};

    use super::*;

    fn scan() -> RelNode {
        RelNode::new(
            RelKind::Scan {
                table: "t".to_string(),
            },
            RowType::new(vec![Field::new("a", SqlType::Integer, true)]),
        )
    }

    fn filter(condition: Expr) -> RelNode {
        let input = scan();
        let row_type = input.row_type.clone();
        RelNode::new(
            RelKind::Filter {
                input: Box::new(input),
                condition,
            },
            row_type,
        )
    }

    #[test]
    fn test_supported_plan_is_mongo() {
        let operators = OperatorTable::standard();
        let analysis = analyze(&operators, &filter(Expr::gt(Expr::input(0), Expr::int(1))));

        assert!(analysis.is_pushed_down());
        assert_eq!(analysis.nodes.len(), 2);
        assert_eq!(analysis.root().unwrap().kind, "Filter");
        assert!(require_pushdown(&operators, &filter(Expr::boolean(true))).is_ok());
    }

    #[test]
    fn test_unknown_function_forces_enumerable() {
        let operators = OperatorTable::standard();
        let node = filter(Expr::call(
            Operator::Function("SOUNDEX".into()),
            vec![Expr::input(0)],
        ));
        let analysis = analyze(&operators, &node);

        assert!(!analysis.is_pushed_down());
        assert_eq!(analysis.nodes[0].convention, Convention::Mongo);
        assert_eq!(analysis.nodes[1].convention, Convention::Enumerable);

        let err = require_pushdown(&operators, &node).unwrap_err();
        assert!(matches!(err, TranslateError::UnsupportedExpression { .. }));
    }

    #[test]
    fn test_mongo_is_cheaper() {
        let operators = OperatorTable::standard();
        let pushed = QueryPlan::new(filter(Expr::gt(Expr::input(0), Expr::int(1))));
        let client = QueryPlan::new(filter(Expr::call(
            Operator::Function("SOUNDEX".into()),
            vec![Expr::input(0)],
        )));

        let a = analyze(&operators, &pushed.root).cost();
        let b = analyze(&operators, &client.root).cost();
        assert!(a.cpu < b.cpu);

        assert_eq!(cheapest(&operators, &[client.clone(), pushed.clone()]), Some(1));
        assert_eq!(cheapest(&operators, &[]), None);
    }

    #[test]
    fn test_set_operations() {
        let operators = OperatorTable::standard();
        let union = |op, all| {
            RelNode::new(
                RelKind::SetOp {
                    op,
                    all,
                    inputs: vec![scan(), scan()],
                },
                scan().row_type,
            )
        };

        assert!(analyze(&operators, &union(SetOpKind::Union, true)).is_pushed_down());
        assert!(matches!(
            require_pushdown(&operators, &union(SetOpKind::Intersect, false)),
            Err(TranslateError::UnsupportedQueryShape(_))
        ));
    }
}
