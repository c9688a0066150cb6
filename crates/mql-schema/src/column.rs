//! Relational columns projected from document fields

use serde::{Deserialize, Serialize};

use crate::bson_type::BsonType;

/// Which path `SchemaColumn::path` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PathMode {
    /// Absolute path inside the pipeline document after all unwinds
    #[default]
    Resolved,
    /// Field path relative to the table's own document
    Original,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    /// Empty for pure key columns
    pub field_path: String,
    pub resolved_path: String,
    pub bson_type: BsonType,
    /// 1-based primary-key ordinal, 0 when not part of the key
    pub primary_key: usize,
    /// 1-based foreign-key ordinal, 0 when not part of the key
    pub foreign_key: usize,
    pub generated: bool,
    /// Array nesting level of generated index columns
    pub array_level: Option<usize>,
    pub nullable: bool,
}

impl SchemaColumn {
    pub fn data(name: &str, field_path: impl Into<String>, resolved_path: impl Into<String>, bson_type: BsonType) -> Self {
        Self {
            name: display_name(name),
            field_path: field_path.into(),
            resolved_path: resolved_path.into(),
            bson_type,
            primary_key: 0,
            foreign_key: 0,
            generated: false,
            array_level: None,
            nullable: true,
        }
    }

    /// Synthetic `array_index_lvl_<level>` key column
    pub fn array_index(level: usize, primary_key: usize) -> Self {
        let name = array_index_field(level);
        Self {
            name: name.clone(),
            field_path: String::new(),
            resolved_path: name,
            bson_type: BsonType::Int64,
            primary_key,
            foreign_key: 0,
            generated: true,
            array_level: Some(level),
            nullable: false,
        }
    }

    /// Copy of a parent key column carried by a child table
    pub fn inherited_key(parent: &SchemaColumn, ordinal: usize) -> Self {
        Self {
            name: parent.name.clone(),
            field_path: String::new(),
            resolved_path: parent.path(PathMode::Resolved).to_string(),
            bson_type: parent.bson_type,
            primary_key: ordinal,
            foreign_key: ordinal,
            generated: parent.generated,
            array_level: parent.array_level,
            nullable: false,
        }
    }

    pub fn path(&self, mode: PathMode) -> &str {
        match mode {
            PathMode::Resolved if !self.resolved_path.is_empty() => &self.resolved_path,
            _ => &self.field_path,
        }
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key > 0
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key > 0
    }
}

/// Field the pipeline's `$unwind` writes the array index of `level` into
pub fn array_index_field(level: usize) -> String {
    format!("array_index_lvl_{}", level)
}

/// Relational display name of a document field
pub fn display_name(field: &str) -> String {
    let name = match field.strip_prefix('$') {
        Some(rest) => format!("_{}", rest),
        None => field.to_string(),
    };

    if name.contains('.') || name.contains(':') {
        format!("\"{}\"", name)
    } else {
        name
    }
}
