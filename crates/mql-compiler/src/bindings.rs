//! Column-to-document-path bindings of a pipeline fragment

use mql_plan::{RelKind, RelNode};
use mql_schema::{Schema, TableId};

use crate::error::{Result, TranslateError};

/// Where each output column of a fragment lives in the pipeline documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bindings {
    /// Collection the fragment's pipeline runs against
    pub collection: String,
    /// Document path per output column
    pub fields: Vec<String>,
    /// Virtual tables whose stages already ran, outermost first
    pub entered: Vec<TableId>,
}

impl Bindings {
    pub fn new(collection: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            collection: collection.into(),
            fields,
            entered: Vec::new(),
        }
    }

    pub fn field(&self, index: usize) -> Result<&str> {
        self.fields.get(index).map(String::as_str).ok_or_else(|| {
            TranslateError::SchemaInconsistency(format!(
                "column ${} out of range for {} bound fields",
                index,
                self.fields.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_entered(&self, table: TableId) -> bool {
        self.entered.contains(&table)
    }
}

/// Table column an output column of `node` reads unchanged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOrigin {
    pub table: TableId,
    pub column: String,
}

/// Follows output column `index` of `node` down to the scanned column it
/// passes through. `None` when the column is computed along the way.
pub fn column_origin(schema: &Schema, node: &RelNode, index: usize) -> Result<Option<ColumnOrigin>> {
    match &node.kind {
        RelKind::Scan { table } => {
            let table = schema.table(table)?;
            Ok(table.column_at(index).map(|c| ColumnOrigin {
                table: table.id,
                column: c.name.clone(),
            }))
        }
        RelKind::Filter { input, .. } | RelKind::Sort { input, .. } => column_origin(schema, input, index),
        RelKind::Project { input, exprs } => match exprs.get(index).and_then(|e| e.as_input_ref()) {
            Some(source) => column_origin(schema, input, source),
            None => Ok(None),
        },
        RelKind::Join { left, right, .. } => {
            let left_arity = left.row_type.len();
            if index < left_arity {
                column_origin(schema, left, index)
            } else {
                column_origin(schema, right, index - left_arity)
            }
        }
        RelKind::Aggregate { .. } | RelKind::SetOp { .. } => Ok(None),
    }
}

/// Collection the leftmost scan of `node` reads
pub fn source_collection<'s>(schema: &'s Schema, node: &RelNode) -> Result<&'s str> {
    let table = node.leftmost_table().ok_or_else(|| {
        TranslateError::SchemaInconsistency(format!("{} has no table scan", node.kind_name()))
    })?;
    Ok(schema.table(table)?.collection.as_str())
}
