//! Plan construction with row-type derivation

use thiserror::Error;

use crate::expr::{Expr, Operator};
use crate::types::{Field, RowType, SqlType};
use crate::{AggCall, AggFunction, JoinType, QueryPlan, RelKind, RelNode, SetOpKind, SortKey};

/// Trait for resolving table row types at plan-construction time
pub trait SchemaProvider {
    /// Get the relational row type of a table by name
    fn get_table_schema(&self, table_name: &str) -> Result<RowType, String>;
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Input reference ${index} out of range for row of {arity} columns")]
    InputOutOfRange { index: usize, arity: usize },

    #[error("{op} expects {expected} operands, got {actual}")]
    OperandCount {
        op: String,
        expected: String,
        actual: usize,
    },

    #[error("Project has {exprs} expressions but {names} names")]
    NameCount { exprs: usize, names: usize },

    #[error("Set operation inputs disagree on arity: {0} vs {1}")]
    SetOpArity(usize, usize),

    #[error("Set operation needs at least two inputs")]
    SetOpInputs,
}

/// Builds `RelNode`s bottom-up, deriving each node's row type the way the
/// optimizer would before handing the plan over.
pub struct PlanBuilder<'a> {
    provider: &'a dyn SchemaProvider,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(provider: &'a dyn SchemaProvider) -> Self {
        Self { provider }
    }

    pub fn scan(&self, table: &str) -> Result<RelNode, PlanError> {
        let row_type = self
            .provider
            .get_table_schema(table)
            .map_err(PlanError::Schema)?;
        Ok(RelNode::new(
            RelKind::Scan {
                table: table.to_string(),
            },
            row_type,
        ))
    }

    pub fn filter(&self, input: RelNode, condition: Expr) -> Result<RelNode, PlanError> {
        infer_type(&condition, &input.row_type)?;
        let row_type = input.row_type.clone();
        Ok(RelNode::new(
            RelKind::Filter {
                input: Box::new(input),
                condition,
            },
            row_type,
        ))
    }

    /// Project with explicit output names
    pub fn project(
        &self,
        input: RelNode,
        exprs: Vec<Expr>,
        names: &[&str],
    ) -> Result<RelNode, PlanError> {
        if exprs.len() != names.len() {
            return Err(PlanError::NameCount {
                exprs: exprs.len(),
                names: names.len(),
            });
        }

        let mut fields = Vec::with_capacity(exprs.len());
        for (expr, name) in exprs.iter().zip(names) {
            let (sql_type, nullable) = infer_type(expr, &input.row_type)?;
            fields.push(Field::new(*name, sql_type, nullable));
        }

        Ok(RelNode::new(
            RelKind::Project {
                input: Box::new(input),
                exprs,
            },
            RowType::new(fields),
        ))
    }

    /// Keep a subset of input columns under their own names
    pub fn project_fields(&self, input: RelNode, indices: &[usize]) -> Result<RelNode, PlanError> {
        let mut names = Vec::with_capacity(indices.len());
        for &index in indices {
            let field = input
                .row_type
                .field(index)
                .ok_or(PlanError::InputOutOfRange {
                    index,
                    arity: input.row_type.len(),
                })?;
            names.push(field.name.clone());
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let exprs = indices.iter().map(|&i| Expr::input(i)).collect();
        self.project(input, exprs, &names)
    }

    pub fn sort(
        &self,
        input: RelNode,
        keys: Vec<SortKey>,
        offset: Option<u64>,
        fetch: Option<u64>,
    ) -> Result<RelNode, PlanError> {
        for key in &keys {
            check_ref(key.field, &input.row_type)?;
        }
        let row_type = input.row_type.clone();
        Ok(RelNode::new(
            RelKind::Sort {
                input: Box::new(input),
                keys,
                offset,
                fetch,
            },
            row_type,
        ))
    }

    pub fn limit(&self, input: RelNode, fetch: u64) -> Result<RelNode, PlanError> {
        self.sort(input, vec![], None, Some(fetch))
    }

    /// Group columns keep their input names; calls are named `$f<ordinal>`
    pub fn aggregate(
        &self,
        input: RelNode,
        group: Vec<usize>,
        calls: Vec<AggCall>,
    ) -> Result<RelNode, PlanError> {
        let mut fields = Vec::with_capacity(group.len() + calls.len());

        for &index in &group {
            let field = check_ref(index, &input.row_type)?;
            fields.push(field.clone());
        }

        for call in &calls {
            for &arg in &call.args {
                check_ref(arg, &input.row_type)?;
            }
            let (sql_type, nullable) = agg_type(call, &input.row_type, group.is_empty());
            fields.push(Field::new(
                format!("$f{}", fields.len()),
                sql_type,
                nullable,
            ));
        }

        Ok(RelNode::new(
            RelKind::Aggregate {
                input: Box::new(input),
                group,
                calls,
            },
            RowType::new(fields),
        ))
    }

    pub fn join(
        &self,
        left: RelNode,
        right: RelNode,
        join_type: JoinType,
        condition: Expr,
    ) -> Result<RelNode, PlanError> {
        let mut fields: Vec<Field> = Vec::with_capacity(left.row_type.len() + right.row_type.len());

        for field in &left.row_type.fields {
            let mut field = field.clone();
            field.nullable |= matches!(join_type, JoinType::Right | JoinType::Full);
            fields.push(field);
        }
        for field in &right.row_type.fields {
            let mut field = field.clone();
            field.nullable |= matches!(join_type, JoinType::Left | JoinType::Full);
            field.name = uniquify(&field.name, &fields);
            fields.push(field);
        }

        let row_type = RowType::new(fields);
        infer_type(&condition, &row_type)?;

        Ok(RelNode::new(
            RelKind::Join {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                condition,
            },
            row_type,
        ))
    }

    pub fn set_op(&self, op: SetOpKind, all: bool, inputs: Vec<RelNode>) -> Result<RelNode, PlanError> {
        let first = inputs.first().ok_or(PlanError::SetOpInputs)?;
        if inputs.len() < 2 {
            return Err(PlanError::SetOpInputs);
        }
        for other in &inputs[1..] {
            if other.row_type.len() != first.row_type.len() {
                return Err(PlanError::SetOpArity(first.row_type.len(), other.row_type.len()));
            }
        }

        let mut fields = first.row_type.fields.clone();
        for (i, field) in fields.iter_mut().enumerate() {
            for other in &inputs[1..] {
                let theirs = &other.row_type.fields[i];
                field.sql_type = field.sql_type.wider(theirs.sql_type);
                field.nullable |= theirs.nullable;
            }
        }

        Ok(RelNode::new(
            RelKind::SetOp { op, all, inputs },
            RowType::new(fields),
        ))
    }

    pub fn union_all(&self, inputs: Vec<RelNode>) -> Result<RelNode, PlanError> {
        self.set_op(SetOpKind::Union, true, inputs)
    }

    pub fn build(&self, root: RelNode) -> QueryPlan {
        QueryPlan::new(root)
    }
}

/// `name`, or `name0`, `name1`, ... when it is already taken
fn uniquify(name: &str, taken: &[Field]) -> String {
    let exists = |candidate: &str| taken.iter().any(|f| f.name == candidate);
    if !exists(name) {
        return name.to_string();
    }
    (0..)
        .map(|i| format!("{}{}", name, i))
        .find(|candidate| !exists(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn check_ref(index: usize, row_type: &RowType) -> Result<&Field, PlanError> {
    row_type.field(index).ok_or(PlanError::InputOutOfRange {
        index,
        arity: row_type.len(),
    })
}

fn agg_type(call: &AggCall, input: &RowType, scalar: bool) -> (SqlType, bool) {
    let arg_type = call
        .args
        .first()
        .and_then(|&i| input.field(i))
        .map(|f| f.sql_type)
        .unwrap_or(SqlType::Any);

    match call.func {
        AggFunction::Count => (SqlType::BigInt, false),
        AggFunction::Sum | AggFunction::Sum0 => {
            let sql_type = match arg_type {
                SqlType::Integer | SqlType::BigInt => SqlType::BigInt,
                other => other,
            };
            (sql_type, !matches!(call.func, AggFunction::Sum0))
        }
        AggFunction::Avg => (SqlType::Double, true),
        AggFunction::Min | AggFunction::Max | AggFunction::AnyValue => {
            let arg_nullable = call
                .args
                .first()
                .and_then(|&i| input.field(i))
                .map_or(true, |f| f.nullable);
            (arg_type, scalar || arg_nullable)
        }
        AggFunction::Function(_) => (SqlType::Any, true),
    }
}

fn expect_operands(op: &Operator, operands: &[Expr], min: usize, max: usize) -> Result<(), PlanError> {
    if operands.len() < min || operands.len() > max {
        let expected = if min == max {
            min.to_string()
        } else if max == usize::MAX {
            format!("at least {}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(PlanError::OperandCount {
            op: op.name().to_string(),
            expected,
            actual: operands.len(),
        });
    }
    Ok(())
}

/// Result type and nullability of `expr` evaluated against `input`
pub fn infer_type(expr: &Expr, input: &RowType) -> Result<(SqlType, bool), PlanError> {
    match expr {
        Expr::InputRef { index } => {
            let field = check_ref(*index, input)?;
            Ok((field.sql_type, field.nullable))
        }
        Expr::Literal { value } => Ok((value.sql_type(), value.is_null())),
        Expr::Call { op, operands } => {
            let mut types = Vec::with_capacity(operands.len());
            for operand in operands {
                types.push(infer_type(operand, input)?);
            }
            let any_nullable = types.iter().any(|(_, n)| *n);

            let result = match op {
                Operator::Plus | Operator::Minus | Operator::Times | Operator::Mod => {
                    expect_operands(op, operands, 2, 2)?;
                    (types[0].0.wider(types[1].0), any_nullable)
                }
                Operator::Divide => {
                    expect_operands(op, operands, 2, 2)?;
                    // division by zero yields null
                    (types[0].0.wider(types[1].0), true)
                }
                Operator::DivideInteger => {
                    expect_operands(op, operands, 2, 2)?;
                    (SqlType::BigInt, true)
                }
                Operator::UnaryMinus | Operator::Abs | Operator::Floor | Operator::Ceil => {
                    expect_operands(op, operands, 1, 1)?;
                    types[0]
                }
                Operator::Round => {
                    expect_operands(op, operands, 1, 2)?;
                    types[0]
                }
                Operator::Equals
                | Operator::NotEquals
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual => {
                    expect_operands(op, operands, 2, 2)?;
                    (SqlType::Boolean, any_nullable)
                }
                Operator::IsNull | Operator::IsNotNull => {
                    expect_operands(op, operands, 1, 1)?;
                    (SqlType::Boolean, false)
                }
                Operator::In | Operator::NotIn => {
                    expect_operands(op, operands, 2, usize::MAX)?;
                    (SqlType::Boolean, any_nullable)
                }
                Operator::And | Operator::Or => {
                    expect_operands(op, operands, 1, usize::MAX)?;
                    (SqlType::Boolean, any_nullable)
                }
                Operator::Not => {
                    expect_operands(op, operands, 1, 1)?;
                    (SqlType::Boolean, any_nullable)
                }
                Operator::Case => {
                    expect_operands(op, operands, 2, usize::MAX)?;
                    let mut values: Vec<(SqlType, bool)> = operands
                        .iter()
                        .zip(&types)
                        .enumerate()
                        .filter(|(i, _)| i % 2 == 1 || *i == operands.len() - 1)
                        .map(|(_, (_, t))| *t)
                        .collect();
                    if operands.len() % 2 == 0 {
                        values.push((SqlType::Null, true));
                    }
                    let sql_type = values
                        .iter()
                        .map(|(t, _)| *t)
                        .find(|t| *t != SqlType::Null)
                        .unwrap_or(SqlType::Null);
                    (sql_type, values.iter().any(|(_, n)| *n))
                }
                Operator::Coalesce => {
                    expect_operands(op, operands, 1, usize::MAX)?;
                    let sql_type = types
                        .iter()
                        .map(|(t, _)| *t)
                        .find(|t| *t != SqlType::Null)
                        .unwrap_or(SqlType::Null);
                    (sql_type, types.iter().all(|(_, n)| *n))
                }
                Operator::Substring => {
                    expect_operands(op, operands, 2, 3)?;
                    (SqlType::Varchar, any_nullable)
                }
                Operator::Upper
                | Operator::Lower
                | Operator::Trim
                | Operator::LTrim
                | Operator::RTrim => {
                    expect_operands(op, operands, 1, 1)?;
                    (SqlType::Varchar, any_nullable)
                }
                Operator::Concat => {
                    expect_operands(op, operands, 2, usize::MAX)?;
                    (SqlType::Varchar, any_nullable)
                }
                Operator::CharLength => {
                    expect_operands(op, operands, 1, 1)?;
                    (SqlType::Integer, any_nullable)
                }
                Operator::Like => {
                    expect_operands(op, operands, 2, 2)?;
                    (SqlType::Boolean, any_nullable)
                }
                Operator::Cast { to } => {
                    expect_operands(op, operands, 1, 1)?;
                    (*to, types[0].1)
                }
                Operator::Reinterpret => {
                    expect_operands(op, operands, 1, 1)?;
                    types[0]
                }
                Operator::Extract => {
                    expect_operands(op, operands, 2, 2)?;
                    (SqlType::BigInt, types[1].1)
                }
                Operator::DayName | Operator::MonthName => {
                    expect_operands(op, operands, 1, 1)?;
                    (SqlType::Varchar, true)
                }
                Operator::TimestampDiff => {
                    expect_operands(op, operands, 3, 3)?;
                    (SqlType::Integer, types[1].1 || types[2].1)
                }
                Operator::Item => {
                    expect_operands(op, operands, 2, 2)?;
                    (SqlType::Any, true)
                }
                Operator::Function(_) => (SqlType::Any, true),
            };
            Ok(result)
        }
    }
}
