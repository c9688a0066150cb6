use mql_schema::{array_index_field, PathMode, SchemaTable, TableKind};
use serde_json::{json, Value};

use super::{Fragment, RuleContext};
use crate::bindings::Bindings;
use crate::error::{Result, TranslateError};

/// Rows of `table` from a fresh pipeline over its collection
pub fn convert(ctx: &RuleContext<'_>, table: &str) -> Result<Fragment> {
    enter(ctx, table, root(ctx, table)?, false)
}

/// Empty pipeline over the collection `table` belongs to
pub fn root(ctx: &RuleContext<'_>, table: &str) -> Result<Fragment> {
    let collection = ctx.schema.table(table)?.collection.clone();
    Ok(Fragment::new(Vec::new(), Bindings::new(collection, Vec::new())))
}

/// Continues `base` down to the rows of `table`, emitting only the chain
/// tables `base` has not entered yet. With `preserve` set, parent rows
/// without child elements survive: no existence `$match` is emitted.
pub fn enter(ctx: &RuleContext<'_>, table: &str, base: Fragment, preserve: bool) -> Result<Fragment> {
    let table = ctx.schema.table(table)?;
    let Fragment {
        mut stages,
        mut bindings,
    } = base;

    if bindings.collection != table.collection {
        return Err(TranslateError::SchemaInconsistency(format!(
            "table '{}' belongs to collection '{}', not '{}'",
            table.name, table.collection, bindings.collection
        )));
    }

    for id in ctx.schema.access_chain(table.id) {
        if bindings.has_entered(id) {
            continue;
        }
        let step = ctx.schema.get(id);
        if !preserve {
            stages.extend(existence_match(step));
        }
        stages.extend(unwind(step));
        bindings.entered.push(id);
    }

    bindings.fields = table
        .columns()
        .map(|c| c.path(PathMode::Resolved).to_string())
        .collect();
    Ok(Fragment::new(stages, bindings))
}

fn existence_match(table: &SchemaTable) -> Option<Value> {
    let path = table.path()?;
    Some(json!({ "$match": { path: { "$exists": true, "$nin": [null, []] } } }))
}

fn unwind(table: &SchemaTable) -> Option<Value> {
    match &table.kind {
        TableKind::Array { path, level } => Some(json!({ "$unwind": {
            "path": format!("${}", path),
            "includeArrayIndex": array_index_field(*level),
            "preserveNullAndEmptyArrays": true
        } })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use mql_schema::{BsonType, Schema, SchemaBuilder};

    use super::*;
    use crate::operators::OperatorTable;

    fn orders() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder.collection("orders", |c| {
            c.field("total", BsonType::Int32)
                .document("address", |d| {
                    d.field("city", BsonType::String);
                })
                .array("items", |i| {
                    i.field("sku", BsonType::String)
                        .scalar_array("tags", BsonType::String);
                });
        });
        builder.build().unwrap()
    }

    #[test]
    fn test_base_table_has_no_stages() {
        let schema = orders();
        let operators = OperatorTable::empty();
        let ctx = RuleContext::new(&schema, &operators);

        let fragment = convert(&ctx, "orders").unwrap();
        assert!(fragment.stages.is_empty());
        assert_eq!(fragment.bindings.fields, vec!["_id", "total"]);
        assert_eq!(fragment.bindings.collection, "orders");
    }

    #[test]
    fn test_document_table_matches_only() {
        let schema = orders();
        let operators = OperatorTable::empty();
        let ctx = RuleContext::new(&schema, &operators);

        let fragment = convert(&ctx, "orders_address").unwrap();
        assert_eq!(
            fragment.stages,
            vec![json!({"$match": {"address": {"$exists": true, "$nin": [null, []]}}})]
        );
        assert_eq!(fragment.bindings.fields, vec!["_id", "address.city"]);
    }

    #[test]
    fn test_nested_arrays_unwind_outermost_first() {
        let schema = orders();
        let operators = OperatorTable::empty();
        let ctx = RuleContext::new(&schema, &operators);

        let fragment = convert(&ctx, "orders_items_tags").unwrap();
        let ops: Vec<&str> = fragment
            .stages
            .iter()
            .map(|s| s.as_object().unwrap().keys().next().unwrap().as_str())
            .collect();
        assert_eq!(ops, vec!["$match", "$unwind", "$match", "$unwind"]);
        assert_eq!(fragment.stages[3]["$unwind"]["includeArrayIndex"], "array_index_lvl_1");
        assert_eq!(
            fragment.bindings.fields,
            vec!["_id", "array_index_lvl_0", "array_index_lvl_1", "items.tags"]
        );
    }

    #[test]
    fn test_preserved_entry_skips_existing_and_match() {
        let schema = orders();
        let operators = OperatorTable::empty();
        let ctx = RuleContext::new(&schema, &operators);

        let items = convert(&ctx, "orders_items").unwrap();
        let tags = enter(&ctx, "orders_items_tags", items, true).unwrap();
        assert_eq!(tags.stages.len(), 3);
        assert_eq!(
            tags.stages[2],
            json!({"$unwind": {
                "path": "$items.tags",
                "includeArrayIndex": "array_index_lvl_1",
                "preserveNullAndEmptyArrays": true
            }})
        );
        assert_eq!(tags.bindings.entered.len(), 2);
    }
}
