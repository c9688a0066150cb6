use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Table '{0}' not found in schema")]
    UnknownTable(String),

    #[error("Column '{column}' not found in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Schema invariant violated: {0}")]
    Invariant(String),

    #[error("Invalid schema description: {0}")]
    Description(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
