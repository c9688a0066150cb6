//! Result of a successful compilation

use mql_plan::RowType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One output column as reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// JDBC `java.sql.Types` code
    pub sql_type: i32,
    pub type_name: String,
    /// 1-based
    pub ordinal: usize,
    pub nullable: bool,
}

impl ColumnMetadata {
    pub fn from_row_type(row_type: &RowType) -> Vec<ColumnMetadata> {
        row_type
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| ColumnMetadata {
                name: field.name.clone(),
                sql_type: field.sql_type.jdbc_code(),
                type_name: field.sql_type.type_name().to_string(),
                ordinal: i + 1,
                nullable: field.nullable,
            })
            .collect()
    }
}

/// Everything needed to run a compiled query and shape its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqlQueryContext {
    collection: String,
    columns: Vec<ColumnMetadata>,
    stages: Vec<Value>,
    field_paths: Vec<String>,
}

impl MqlQueryContext {
    pub fn new(collection: String, columns: Vec<ColumnMetadata>, stages: Vec<Value>, field_paths: Vec<String>) -> Self {
        Self {
            collection,
            columns,
            stages,
            field_paths,
        }
    }

    /// Collection the pipeline runs against
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn stages(&self) -> &[Value] {
        &self.stages
    }

    /// Document path of each output column, in column order
    pub fn field_paths(&self) -> &[String] {
        &self.field_paths
    }

    /// The pipeline as a JSON array
    pub fn pipeline(&self) -> Value {
        Value::Array(self.stages.clone())
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "collection": self.collection,
            "columns": self.columns,
            "pipeline": self.stages,
            "field_paths": self.field_paths,
        })
    }

    /// SHA-256 of the serialized stage list
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Value::Array(self.stages.clone()).to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
