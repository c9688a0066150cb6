//! Joins
//!
//! Two tables of one collection are joined inside the same documents: the
//! child side only adds the unwinds its parent has not done yet. Tables of
//! different collections are joined with a correlated `$lookup`.

use mql_plan::{Expr, JoinType, Operator, RelKind, RelNode};
use mql_schema::{array_index_field, PathMode, Schema, TableId, TableKind};
use serde_json::{json, Map};
use tracing::debug;

use super::{convert as convert_node, filter, project, scan, Fragment, RuleContext};
use crate::bindings::{column_origin, source_collection, Bindings, ColumnOrigin};
use crate::error::{JoinRejection, Result, TranslateError};
use crate::translator::field_path_ref;

/// Borrowed parts of a join node
#[derive(Debug, Clone, Copy)]
pub struct JoinNode<'a> {
    pub left: &'a RelNode,
    pub right: &'a RelNode,
    pub join_type: JoinType,
    pub condition: &'a Expr,
}

impl<'a> JoinNode<'a> {
    pub fn of(node: &'a RelNode) -> Option<Self> {
        match &node.kind {
            RelKind::Join {
                left,
                right,
                join_type,
                condition,
            } => Some(Self {
                left,
                right,
                join_type: *join_type,
                condition,
            }),
            _ => None,
        }
    }

    fn expect(node: &'a RelNode) -> Result<Self> {
        Self::of(node).ok_or_else(|| {
            TranslateError::SchemaInconsistency(format!("expected a join, found {}", node.kind_name()))
        })
    }
}

/// Parent and child table of a same-collection join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPairing {
    pub parent: TableId,
    pub child: TableId,
    pub child_on_right: bool,
}

/// Splits a join condition into its left and right key expressions. The
/// right expression is rebased onto the right input's own columns.
pub fn validate_condition(
    join_type: JoinType,
    condition: &Expr,
    left_arity: usize,
) -> std::result::Result<(Expr, Expr), JoinRejection> {
    if matches!(join_type, JoinType::Right | JoinType::Full) {
        return Err(JoinRejection::UnsupportedJoinType(join_type));
    }

    let conjuncts = condition.conjuncts();
    let equality = match conjuncts.as_slice() {
        [single] => *single,
        _ => return Err(JoinRejection::MultipleConditions),
    };
    let (a, b) = match equality {
        Expr::Call {
            op: Operator::Equals,
            operands,
        } => match operands.as_slice() {
            [a, b] => (a, b),
            _ => return Err(JoinRejection::NonEquiCondition),
        },
        _ => return Err(JoinRejection::NonEquiCondition),
    };

    let shift = -(left_arity as isize);
    match (side(a, left_arity), side(b, left_arity)) {
        (Some(Side::Left), Some(Side::Right)) => Ok((a.clone(), b.shift_refs(shift))),
        (Some(Side::Right), Some(Side::Left)) => Ok((b.clone(), a.shift_refs(shift))),
        _ => Err(JoinRejection::NonEquiCondition),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

/// Input an expression reads from, `None` when it reads both or neither
fn side(expr: &Expr, left_arity: usize) -> Option<Side> {
    let refs = expr.input_refs();
    if refs.is_empty() {
        None
    } else if refs.iter().all(|&i| i < left_arity) {
        Some(Side::Left)
    } else if refs.iter().all(|&i| i >= left_arity) {
        Some(Side::Right)
    } else {
        None
    }
}

pub fn is_same_collection(schema: &Schema, join: &JoinNode<'_>) -> Result<bool> {
    Ok(source_collection(schema, join.left)? == source_collection(schema, join.right)?)
}

/// Checks that a same-collection join equates a parent primary-key column
/// with the child foreign-key column of the same ordinal.
pub fn pair_keys(schema: &Schema, join: &JoinNode<'_>) -> Result<KeyPairing> {
    let (left_key, right_key) = validate_condition(join.join_type, join.condition, join.left.row_type.len())?;
    let (left_index, right_index) = match (left_key.as_input_ref(), right_key.as_input_ref()) {
        (Some(l), Some(r)) => (l, r),
        _ => return Err(JoinRejection::NotForeignKey.into()),
    };
    let origin = |node: &RelNode, index: usize| -> Result<ColumnOrigin> {
        column_origin(schema, node, index)?.ok_or_else(|| JoinRejection::NotForeignKey.into())
    };
    let left = origin(join.left, left_index)?;
    let right = origin(join.right, right_index)?;

    let (parent, child, child_on_right) = if schema.is_ancestor(left.table, right.table) {
        (left, right, true)
    } else if schema.is_ancestor(right.table, left.table) {
        (right, left, false)
    } else {
        return Err(JoinRejection::NotForeignKey.into());
    };

    let parent_table = schema.get(parent.table);
    let child_table = schema.get(child.table);
    let parent_keys = parent_table.primary_key().len();
    let child_keys = child_table.foreign_key().len();
    if parent_keys != child_keys {
        return Err(JoinRejection::JoinKeyArity {
            parent: parent_keys,
            child: child_keys,
        }
        .into());
    }
    // A single equality cannot cover a composite key
    if parent_keys > 1 {
        return Err(JoinRejection::NotForeignKey.into());
    }

    let parent_column = parent_table.column(&parent.column)?;
    let child_column = child_table.column(&child.column)?;
    if !parent_column.is_primary_key() || parent_column.primary_key != child_column.foreign_key {
        return Err(JoinRejection::NotForeignKey.into());
    }

    Ok(KeyPairing {
        parent: parent.table,
        child: child.table,
        child_on_right,
    })
}

/// Rejects every unsupported join below and including `node` before any
/// stage is emitted
pub fn validate_joins(schema: &Schema, node: &RelNode) -> Result<()> {
    for input in node.inputs() {
        validate_joins(schema, input)?;
    }
    if let Some(join) = JoinNode::of(node) {
        validate_condition(join.join_type, join.condition, join.left.row_type.len())?;
        if is_same_collection(schema, &join)? {
            pair_keys(schema, &join)?;
            check_side(schema, join.left, false)?;
            check_side(schema, join.right, join.join_type == JoinType::Left)?;
        }
    }
    Ok(())
}

/// Node kinds a same-collection join side may consist of
fn check_side(schema: &Schema, node: &RelNode, optional: bool) -> Result<()> {
    match &node.kind {
        RelKind::Scan { .. } => Ok(()),
        RelKind::Filter { .. } if optional => Err(JoinRejection::OptionalSideFilter.into()),
        RelKind::Filter { input, .. } => check_side(schema, input, optional),
        RelKind::Project { input, exprs } => {
            if exprs.iter().any(|e| e.as_input_ref().is_none()) {
                return Err(computed_projection());
            }
            check_side(schema, input, optional)
        }
        RelKind::Join { .. } => {
            let join = JoinNode::expect(node)?;
            if !is_same_collection(schema, &join)? {
                return Err(nested_lookup(schema, &join)?);
            }
            check_side(schema, join.left, optional)?;
            check_side(schema, join.right, optional || join.join_type == JoinType::Left)
        }
        _ => Err(TranslateError::UnsupportedQueryShape(format!(
            "{} cannot be part of a same-collection join",
            node.kind_name()
        ))),
    }
}

fn computed_projection() -> TranslateError {
    TranslateError::UnsupportedQueryShape(
        "only column-pruning projections can be part of a same-collection join".to_string(),
    )
}

fn nested_lookup(schema: &Schema, join: &JoinNode<'_>) -> Result<TranslateError> {
    Ok(TranslateError::UnsupportedQueryShape(format!(
        "lookup join of '{}' with '{}' cannot be nested in a same-collection join",
        source_collection(schema, join.left)?,
        source_collection(schema, join.right)?
    )))
}

pub fn convert(ctx: &RuleContext<'_>, node: &RelNode) -> Result<Fragment> {
    let join = JoinNode::expect(node)?;
    let (left_key, right_key) = validate_condition(join.join_type, join.condition, join.left.row_type.len())?;

    if is_same_collection(ctx.schema, &join)? {
        debug!(join_type = %join.join_type, "Same-collection join");
        join_onto(ctx, node, None, false)
    } else {
        debug!(join_type = %join.join_type, "Lookup join");
        lookup(ctx, &join, &left_key, &right_key)
    }
}

/// Converts one side of a same-collection join on top of `base`
fn convert_onto(ctx: &RuleContext<'_>, node: &RelNode, base: Option<Fragment>, preserve: bool) -> Result<Fragment> {
    match &node.kind {
        RelKind::Scan { table } => {
            let base = match base {
                Some(base) => base,
                None => scan::root(ctx, table)?,
            };
            scan::enter(ctx, table, base, preserve)
        }
        RelKind::Filter { .. } if preserve => Err(JoinRejection::OptionalSideFilter.into()),
        RelKind::Filter { input, condition } => {
            let input = convert_onto(ctx, input, base, preserve)?;
            filter::apply(ctx, input, condition)
        }
        RelKind::Project { input, exprs } => {
            let input = convert_onto(ctx, input, base, preserve)?;
            project::rebind(input, exprs).unwrap_or_else(|| Err(computed_projection()))
        }
        RelKind::Join { .. } => join_onto(ctx, node, base, preserve),
        _ => Err(TranslateError::UnsupportedQueryShape(format!(
            "{} cannot be part of a same-collection join",
            node.kind_name()
        ))),
    }
}

fn join_onto(ctx: &RuleContext<'_>, node: &RelNode, base: Option<Fragment>, preserve: bool) -> Result<Fragment> {
    let join = JoinNode::expect(node)?;
    if !is_same_collection(ctx.schema, &join)? {
        return Err(nested_lookup(ctx.schema, &join)?);
    }
    let pairing = pair_keys(ctx.schema, &join)?;

    let left = convert_onto(ctx, join.left, base, preserve)?;
    let left_fields = left.bindings.fields.clone();
    let optional = preserve || join.join_type == JoinType::Left;
    let Fragment { mut stages, bindings } = convert_onto(ctx, join.right, Some(left), optional)?;

    let mut right_fields = bindings.fields.clone();
    if join.join_type == JoinType::Left && pairing.child_on_right {
        let (tags, stage) = correlation_tags(ctx, pairing.child)?;
        for (i, field) in right_fields.iter_mut().enumerate() {
            if let Some(origin) = column_origin(ctx.schema, join.right, i)? {
                if let Some((_, tag)) = tags.iter().find(|(column, _)| origin.table == pairing.child && *column == origin.column) {
                    *field = tag.clone();
                }
            }
        }
        stages.push(stage);
    }

    let mut fields = left_fields;
    fields.extend(right_fields);
    Ok(Fragment::new(stages, Bindings { fields, ..bindings }))
}

/// `$addFields` copying each child foreign-key column into a tag that is
/// null when the row has no child. Returns the tag per column name.
fn correlation_tags(ctx: &RuleContext<'_>, child: TableId) -> Result<(Vec<(String, String)>, serde_json::Value)> {
    let table = ctx.schema.get(child);
    let probe = match &table.kind {
        TableKind::Array { level, .. } => array_index_field(*level),
        TableKind::Document { path } => path.clone(),
        TableKind::Base => {
            return Err(TranslateError::SchemaInconsistency(format!(
                "base table '{}' cannot be the child of a join",
                table.name
            )))
        }
    };

    let n = ctx.next_id();
    let mut entries = Map::new();
    let mut tags = Vec::new();
    for (k, column) in table.foreign_key().into_iter().enumerate() {
        let tag = format!("__corr_{}_{}", n, k);
        entries.insert(
            tag.clone(),
            json!({ "$cond": [
                { "$gt": [field_path_ref(&probe), null] },
                field_path_ref(column.path(PathMode::Resolved)),
                null
            ] }),
        );
        tags.push((column.name.clone(), tag));
    }
    Ok((tags, json!({ "$addFields": entries })))
}

fn lookup(ctx: &RuleContext<'_>, join: &JoinNode<'_>, left_key: &Expr, right_key: &Expr) -> Result<Fragment> {
    let left = convert_node(ctx, join.left)?;
    let right = convert_node(ctx, join.right)?;

    let n = ctx.next_id();
    let variable = format!("key_{}", n);
    let variable_ref = format!("$${}", variable);
    let as_field = format!("__lookup_{}", n);

    let left_value = ctx.translator(&left.bindings.fields).translate(left_key)?;
    let right_value = ctx.translator(&right.bindings.fields).translate(right_key)?;

    let mut pipeline = right.stages;
    pipeline.push(json!({ "$match": { "$expr": { "$and": [
        { "$eq": [right_value, variable_ref.clone()] },
        { "$gt": [variable_ref, null] }
    ] } } }));

    let Fragment { mut stages, bindings } = left;
    stages.push(json!({ "$lookup": {
        "from": right.bindings.collection,
        "let": { variable: left_value },
        "pipeline": pipeline,
        "as": as_field.clone()
    } }));
    stages.push(json!({ "$unwind": {
        "path": format!("${}", as_field),
        "preserveNullAndEmptyArrays": join.join_type == JoinType::Left
    } }));

    let mut fields = bindings.fields.clone();
    fields.extend(right.bindings.fields.iter().map(|f| format!("{}.{}", as_field, f)));
    Ok(Fragment::new(stages, Bindings { fields, ..bindings }))
}
