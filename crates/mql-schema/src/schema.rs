//! Immutable arena of tables shared by every compilation

use std::collections::HashMap;

use mql_plan::{RowType, SchemaProvider};

use crate::error::{Result, SchemaError};
use crate::table::{SchemaTable, TableId, TableKind};

#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: Vec<SchemaTable>,
    by_name: HashMap<String, TableId>,
}

impl Schema {
    /// Assemble a schema from tables whose `id`s are their positions,
    /// checking the key invariants of every table.
    pub fn from_tables(tables: Vec<SchemaTable>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(tables.len());
        for (i, table) in tables.iter().enumerate() {
            if table.id != TableId(i) {
                return Err(SchemaError::Invariant(format!(
                    "table '{}' has id {} at position {}",
                    table.name, table.id.0, i
                )));
            }
            if by_name.insert(table.name.clone(), table.id).is_some() {
                return Err(SchemaError::Invariant(format!(
                    "duplicate table name '{}'",
                    table.name
                )));
            }
        }

        let schema = Self { tables, by_name };
        for table in &schema.tables {
            schema.validate_table(table)?;
        }
        tracing::debug!(tables = schema.tables.len(), "Schema assembled");
        Ok(schema)
    }

    fn validate_table(&self, table: &SchemaTable) -> Result<()> {
        let pk = table.primary_key();
        if pk.is_empty() {
            return Err(SchemaError::Invariant(format!(
                "table '{}' has no primary key",
                table.name
            )));
        }
        check_contiguous(&table.name, "primary", pk.iter().map(|c| c.primary_key))?;

        let fk = table.foreign_key();
        check_contiguous(&table.name, "foreign", fk.iter().map(|c| c.foreign_key))?;

        match (table.is_virtual(), table.parent) {
            (false, None) => {
                if !fk.is_empty() {
                    return Err(SchemaError::Invariant(format!(
                        "base table '{}' declares a foreign key",
                        table.name
                    )));
                }
            }
            (true, Some(parent_id)) => {
                let parent = self.tables.get(parent_id.0).ok_or_else(|| {
                    SchemaError::Invariant(format!(
                        "table '{}' references missing parent {}",
                        table.name, parent_id.0
                    ))
                })?;
                let parent_pk = parent.primary_key();
                if parent_pk.len() != fk.len() {
                    return Err(SchemaError::Invariant(format!(
                        "table '{}' has {} foreign-key columns but parent '{}' has {} primary-key columns",
                        table.name,
                        fk.len(),
                        parent.name,
                        parent_pk.len()
                    )));
                }
                for (child, parent_col) in fk.iter().zip(&parent_pk) {
                    if child.bson_type != parent_col.bson_type {
                        return Err(SchemaError::Invariant(format!(
                            "foreign key '{}.{}' is {} but '{}.{}' is {}",
                            table.name,
                            child.name,
                            child.bson_type,
                            parent.name,
                            parent_col.name,
                            parent_col.bson_type
                        )));
                    }
                }
            }
            (true, None) => {
                return Err(SchemaError::Invariant(format!(
                    "virtual table '{}' has no parent",
                    table.name
                )))
            }
            (false, Some(_)) => {
                return Err(SchemaError::Invariant(format!(
                    "base table '{}' has a parent",
                    table.name
                )))
            }
        }
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<&SchemaTable> {
        self.by_name
            .get(name)
            .map(|id| &self.tables[id.0])
            .ok_or_else(|| SchemaError::UnknownTable(name.to_string()))
    }

    /// Table by id. Ids are only handed out by this schema.
    pub fn get(&self, id: TableId) -> &SchemaTable {
        &self.tables[id.0]
    }

    pub fn tables(&self) -> impl Iterator<Item = &SchemaTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn parent(&self, table: &SchemaTable) -> Option<&SchemaTable> {
        table.parent.map(|id| self.get(id))
    }

    /// Virtual tables entered on the way from the collection root down to
    /// `id`, outermost first. Empty for a base table.
    pub fn access_chain(&self, id: TableId) -> Vec<TableId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(tid) = current {
            let table = self.get(tid);
            if !table.is_virtual() {
                break;
            }
            chain.push(tid);
            current = table.parent;
        }
        chain.reverse();
        chain
    }

    /// Array paths that must be unwound to reach rows of `name`, outermost first
    pub fn unwind_chain(&self, name: &str) -> Result<Vec<String>> {
        let table = self.table(name)?;
        Ok(self
            .access_chain(table.id)
            .into_iter()
            .filter_map(|id| match &self.get(id).kind {
                TableKind::Array { path, .. } => Some(path.clone()),
                _ => None,
            })
            .collect())
    }

    /// True when `ancestor` is a strict ancestor of `descendant`
    pub fn is_ancestor(&self, ancestor: TableId, descendant: TableId) -> bool {
        let mut current = self.get(descendant).parent;
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get(id).parent;
        }
        false
    }
}

fn check_contiguous(table: &str, which: &str, ordinals: impl Iterator<Item = usize>) -> Result<()> {
    for (expected, ordinal) in (1..).zip(ordinals) {
        if ordinal != expected {
            return Err(SchemaError::Invariant(format!(
                "table '{}' {} key ordinals are not contiguous: found {} where {} was expected",
                table, which, ordinal, expected
            )));
        }
    }
    Ok(())
}

impl SchemaProvider for Schema {
    fn get_table_schema(&self, table_name: &str) -> std::result::Result<RowType, String> {
        self.table(table_name)
            .map(|t| t.row_type())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bson_type::BsonType;
    use crate::column::SchemaColumn;
    use indexmap::IndexMap;

    fn table(id: usize, name: &str, kind: TableKind, parent: Option<usize>, cols: Vec<SchemaColumn>) -> SchemaTable {
        SchemaTable {
            id: TableId(id),
            name: name.to_string(),
            collection: "t".to_string(),
            kind,
            parent: parent.map(TableId),
            columns: cols.into_iter().map(|c| (c.name.clone(), c)).collect::<IndexMap<_, _>>(),
        }
    }

    fn pk(name: &str, bson_type: BsonType, ordinal: usize) -> SchemaColumn {
        let mut col = SchemaColumn::data(name, name, name, bson_type);
        col.primary_key = ordinal;
        col.nullable = false;
        col
    }

    #[test]
    fn test_missing_primary_key() {
        let tables = vec![table(
            0,
            "t",
            TableKind::Base,
            None,
            vec![SchemaColumn::data("a", "a", "a", BsonType::Int32)],
        )];

        let err = Schema::from_tables(tables).unwrap_err();
        assert_eq!(err.to_string(), "Schema invariant violated: table 't' has no primary key");
    }

    #[test]
    fn test_foreign_key_type_mismatch() {
        let base = table(0, "t", TableKind::Base, None, vec![pk("_id", BsonType::ObjectId, 1)]);
        let mut fk = pk("_id", BsonType::String, 1);
        fk.foreign_key = 1;
        let child = table(
            1,
            "t_a",
            TableKind::Document { path: "a".to_string() },
            Some(0),
            vec![fk],
        );

        let err = Schema::from_tables(vec![base, child]).unwrap_err();
        assert!(err.to_string().contains("foreign key 't_a._id' is string"));
    }

    #[test]
    fn test_unknown_table() {
        let schema = Schema::from_tables(vec![table(
            0,
            "t",
            TableKind::Base,
            None,
            vec![pk("_id", BsonType::ObjectId, 1)],
        )])
        .unwrap();

        assert!(matches!(schema.table("nope"), Err(SchemaError::UnknownTable(_))));
        assert!(schema.get_table_schema("nope").is_err());
        assert_eq!(schema.get_table_schema("t").unwrap().len(), 1);
    }
}
