use mql_plan::JoinType;
use mql_schema::SchemaError;
use thiserror::Error;

/// Why a join cannot be expressed as pipeline stages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinRejection {
    #[error("unsupported join type {0}")]
    UnsupportedJoinType(JoinType),

    #[error("only equi-joins on foreign keys supported")]
    NotForeignKey,

    #[error("only a single equality condition supported")]
    MultipleConditions,

    #[error("only equi-joins on foreign keys supported")]
    NonEquiCondition,

    #[error("filters on the optional side of a LEFT join are not supported")]
    OptionalSideFilter,

    #[error("parent has {parent} primary-key columns but child has {child} foreign-key columns")]
    JoinKeyArity { parent: usize, child: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TranslateError {
    #[error("Inconsistent schema: {0}")]
    SchemaInconsistency(String),

    #[error("Unsupported expression {operator}: {expr}")]
    UnsupportedExpression { operator: String, expr: String },

    #[error("Unsupported join: {0}")]
    UnsupportedJoin(JoinRejection),

    #[error("Cannot execute in pure pipeline form: {0}")]
    UnsupportedQueryShape(String),

    #[error("Unsupported conversion: {0}")]
    TypeConversionUnsupported(String),
}

impl TranslateError {
    pub fn unsupported(operator: impl Into<String>, expr: impl ToString) -> Self {
        TranslateError::UnsupportedExpression {
            operator: operator.into(),
            expr: expr.to_string(),
        }
    }
}

impl From<SchemaError> for TranslateError {
    fn from(e: SchemaError) -> Self {
        TranslateError::SchemaInconsistency(e.to_string())
    }
}

impl From<JoinRejection> for TranslateError {
    fn from(r: JoinRejection) -> Self {
        TranslateError::UnsupportedJoin(r)
    }
}

/// Failure of a whole compilation
#[derive(Debug, Error)]
#[error("{kind}{}", in_query(.sql))]
pub struct CompileError {
    pub kind: TranslateError,
    pub sql: Option<String>,
}

impl CompileError {
    pub fn new(kind: TranslateError, sql: Option<String>) -> Self {
        Self { kind, sql }
    }
}

fn in_query(sql: &Option<String>) -> String {
    match sql {
        Some(sql) => format!(" in query: {}", sql),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
