//! Base and virtual tables

use indexmap::IndexMap;
use mql_plan::{Field, RowType};
use serde::{Deserialize, Serialize};

use crate::column::SchemaColumn;
use crate::error::{Result, SchemaError};

/// Stable index of a table inside its `Schema`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub usize);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableKind {
    Base,
    /// Nested document at an absolute path
    Document { path: String },
    /// Array at an absolute path, `level` arrays deep
    Array { path: String, level: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaTable {
    pub id: TableId,
    pub name: String,
    pub collection: String,
    pub kind: TableKind,
    pub parent: Option<TableId>,
    pub columns: IndexMap<String, SchemaColumn>,
}

impl SchemaTable {
    pub fn is_virtual(&self) -> bool {
        !matches!(self.kind, TableKind::Base)
    }

    /// Absolute document path of a virtual table
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            TableKind::Base => None,
            TableKind::Document { path } | TableKind::Array { path, .. } => Some(path),
        }
    }

    pub fn column(&self, name: &str) -> Result<&SchemaColumn> {
        self.columns
            .get(name)
            .ok_or_else(|| SchemaError::UnknownColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn column_at(&self, index: usize) -> Option<&SchemaColumn> {
        self.columns.get_index(index).map(|(_, c)| c)
    }

    pub fn columns(&self) -> impl Iterator<Item = &SchemaColumn> {
        self.columns.values()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Primary-key columns in key-ordinal order
    pub fn primary_key(&self) -> Vec<&SchemaColumn> {
        let mut keys: Vec<&SchemaColumn> = self.columns().filter(|c| c.is_primary_key()).collect();
        keys.sort_by_key(|c| c.primary_key);
        keys
    }

    /// Foreign-key columns in key-ordinal order
    pub fn foreign_key(&self) -> Vec<&SchemaColumn> {
        let mut keys: Vec<&SchemaColumn> = self.columns().filter(|c| c.is_foreign_key()).collect();
        keys.sort_by_key(|c| c.foreign_key);
        keys
    }

    /// Put key columns first by ordinal, keeping discovery order for the rest
    pub(crate) fn order_columns(&mut self) {
        self.columns.sort_by(|_, a, _, b| {
            let rank = |c: &SchemaColumn| {
                if c.is_primary_key() {
                    (0, c.primary_key)
                } else {
                    (1, 0)
                }
            };
            rank(a).cmp(&rank(b))
        });
    }

    pub fn row_type(&self) -> RowType {
        RowType::new(
            self.columns()
                .map(|c| Field::new(c.name.clone(), c.bson_type.sql_type(), c.nullable))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson_type::BsonType;

    #[test]
    fn test_order_columns_is_stable() {
        let mut table = SchemaTable {
            id: TableId(0),
            name: "t_items".to_string(),
            collection: "t".to_string(),
            kind: TableKind::Array {
                path: "items".to_string(),
                level: 0,
            },
            parent: Some(TableId(1)),
            columns: IndexMap::new(),
        };

        let mut id = SchemaColumn::data("_id", "", "_id", BsonType::ObjectId);
        id.primary_key = 1;
        id.foreign_key = 1;

        for col in [
            SchemaColumn::data("sku", "sku", "items.sku", BsonType::String),
            SchemaColumn::array_index(0, 2),
            SchemaColumn::data("qty", "qty", "items.qty", BsonType::Int32),
            id,
        ] {
            table.columns.insert(col.name.clone(), col);
        }
        table.order_columns();

        let names: Vec<&str> = table.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "array_index_lvl_0", "sku", "qty"]);
        assert_eq!(table.foreign_key().len(), 1);
        assert!(table.column("missing").is_err());
    }
}
