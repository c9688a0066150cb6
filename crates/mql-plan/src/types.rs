//! Type system for logical plans

use serde::{Deserialize, Serialize};

/// SQL-level type of a column or expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlType {
    // Special
    Null,
    Any,

    // Primitives
    Boolean,
    Integer,
    BigInt,
    Double,
    Decimal,

    // Text / binary
    Varchar,
    Binary,

    // Temporal
    Date,
    Time,
    Timestamp,
    IntervalDayTime,
    IntervalYearMonth,

    // Document database specific
    ObjectId,
}

impl SqlType {
    /// JDBC `java.sql.Types` code reported in column metadata
    pub fn jdbc_code(self) -> i32 {
        match self {
            SqlType::Null => 0,
            SqlType::Boolean => 16,
            SqlType::Integer => 4,
            SqlType::BigInt => -5,
            SqlType::Double => 8,
            SqlType::Decimal => 3,
            SqlType::Varchar => 12,
            SqlType::Binary => -3,
            SqlType::Date => 91,
            SqlType::Time => 92,
            SqlType::Timestamp => 93,
            SqlType::IntervalDayTime | SqlType::IntervalYearMonth | SqlType::ObjectId => 1111,
            SqlType::Any => 2000,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            SqlType::Null => "NULL",
            SqlType::Any => "ANY",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Varchar => "VARCHAR",
            SqlType::Binary => "VARBINARY",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::IntervalDayTime => "INTERVAL DAY TO SECOND",
            SqlType::IntervalYearMonth => "INTERVAL YEAR TO MONTH",
            SqlType::ObjectId => "OBJECTID",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            SqlType::Integer | SqlType::BigInt | SqlType::Double | SqlType::Decimal
        )
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, SqlType::Date | SqlType::Time | SqlType::Timestamp)
    }

    /// Result type of a binary arithmetic expression over `self` and `other`.
    pub fn wider(self, other: SqlType) -> SqlType {
        fn rank(t: SqlType) -> Option<u8> {
            match t {
                SqlType::Integer => Some(1),
                SqlType::BigInt => Some(2),
                SqlType::Decimal => Some(3),
                SqlType::Double => Some(4),
                _ => None,
            }
        }

        match (self, other) {
            (SqlType::Null, t) | (t, SqlType::Null) => t,
            (a, b) if a == b => a,
            (a, b) => match (rank(a), rank(b)) {
                (Some(ra), Some(rb)) => {
                    if ra >= rb {
                        a
                    } else {
                        b
                    }
                }
                _ => SqlType::Any,
            },
        }
    }
}

impl std::fmt::Display for SqlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl Field {
    pub fn new(name: impl Into<String>, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
        }
    }
}

/// Ordered output columns of a plan node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowType {
    pub fields: Vec<Field>,
}

impl RowType {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}
