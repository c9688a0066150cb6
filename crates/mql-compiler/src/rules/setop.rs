use mql_plan::{RelNode, SetOpKind};
use serde_json::{json, Map};

use super::{convert as convert_node, unique_names, Fragment, RuleContext};
use crate::bindings::Bindings;
use crate::error::{Result, TranslateError};
use crate::translator::field_path_ref;

/// UNION ALL appends the other inputs with `$unionWith`, renaming their
/// columns onto the first input's fields. Everything else needs more than
/// one pipeline.
pub fn convert(ctx: &RuleContext<'_>, op: SetOpKind, all: bool, inputs: &[RelNode]) -> Result<Fragment> {
    if let Some(rejection) = rejection(op, all) {
        return Err(rejection);
    }

    let (first, others) = inputs.split_first().ok_or_else(|| {
        TranslateError::UnsupportedQueryShape("UNION ALL without inputs".to_string())
    })?;
    let first = distinct_fields(convert_node(ctx, first)?, first);
    let Fragment { mut stages, bindings } = first;

    for other in others {
        let fragment = convert_node(ctx, other)?;
        if fragment.bindings.len() != bindings.len() {
            return Err(TranslateError::SchemaInconsistency(format!(
                "UNION ALL input has {} columns, expected {}",
                fragment.bindings.len(),
                bindings.len()
            )));
        }

        let mut rename = Map::new();
        if !bindings.fields.iter().any(|f| f == "_id") {
            rename.insert("_id".to_string(), json!(0));
        }
        for (target, source) in bindings.fields.iter().zip(&fragment.bindings.fields) {
            rename.insert(target.clone(), field_path_ref(source));
        }

        let mut pipeline = fragment.stages;
        pipeline.push(json!({ "$project": rename }));
        stages.push(json!({ "$unionWith": {
            "coll": fragment.bindings.collection,
            "pipeline": pipeline
        } }));
    }

    Ok(Fragment::new(stages, bindings))
}

/// Why a set operation has no single-pipeline form
pub fn rejection(op: SetOpKind, all: bool) -> Option<TranslateError> {
    let name = match (op, all) {
        (SetOpKind::Union, true) => return None,
        (SetOpKind::Union, false) => "UNION",
        (SetOpKind::Intersect, _) => "INTERSECT",
        (SetOpKind::Except, _) => "EXCEPT",
    };
    Some(TranslateError::UnsupportedQueryShape(format!(
        "{} needs more than one pipeline",
        name
    )))
}

/// Copies columns that share a field with an earlier column into their
/// own field, so every column can be renamed onto independently.
fn distinct_fields(fragment: Fragment, node: &RelNode) -> Fragment {
    let Fragment { mut stages, bindings } = fragment;

    let reserved: Vec<&str> = bindings.fields.iter().map(String::as_str).collect();
    let spare = unique_names(node.row_type.names(), &reserved);

    let mut copies = Map::new();
    let mut fields: Vec<String> = Vec::with_capacity(bindings.len());
    for (i, field) in bindings.fields.iter().enumerate() {
        if fields.contains(field) {
            let target = spare.get(i).cloned().unwrap_or_else(|| format!("__union_{}", i));
            copies.insert(target.clone(), field_path_ref(field));
            fields.push(target);
        } else {
            fields.push(field.clone());
        }
    }

    if !copies.is_empty() {
        stages.push(json!({ "$addFields": copies }));
    }
    Fragment::new(stages, Bindings { fields, ..bindings })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_fields_are_copied() {
        let node = RelNode::new(
            mql_plan::RelKind::SetOp {
                op: SetOpKind::Union,
                all: true,
                inputs: vec![],
            },
            mql_plan::RowType::new(vec![
                mql_plan::Field::new("_id", mql_plan::SqlType::ObjectId, false),
                mql_plan::Field::new("_id0", mql_plan::SqlType::ObjectId, false),
            ]),
        );
        let fragment = Fragment::new(
            vec![],
            Bindings::new("t", vec!["_id".to_string(), "_id".to_string()]),
        );

        let out = distinct_fields(fragment, &node);
        assert_eq!(out.stages, vec![json!({"$addFields": {"_id0": "$_id"}})]);
        assert_eq!(out.bindings.fields, vec!["_id", "_id0"]);
    }
}
