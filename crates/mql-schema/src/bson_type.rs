//! Document value types and their promotion lattice

use mql_plan::SqlType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BsonType {
    Null,
    #[serde(alias = "bool")]
    Boolean,
    #[serde(alias = "int")]
    Int32,
    #[serde(alias = "long")]
    Int64,
    Double,
    #[serde(alias = "decimal")]
    Decimal128,
    String,
    Binary,
    Date,
    #[serde(alias = "objectId")]
    ObjectId,
    MinKey,
    MaxKey,
    Document,
    Array,
}

impl BsonType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            BsonType::Int32 | BsonType::Int64 | BsonType::Double | BsonType::Decimal128
        )
    }

    /// Least type able to hold values of both `self` and `other`.
    ///
    /// Commutative and monotonic: promoting never narrows, and anything
    /// that cannot be reconciled ends up as a string.
    pub fn promote(self, other: BsonType) -> BsonType {
        use BsonType::*;

        match (self, other) {
            (a, b) if a == b => a,
            (Null, t) | (t, Null) => t,
            (Int32, Int64) | (Int64, Int32) => Int64,
            (Int32 | Int64, Double) | (Double, Int32 | Int64) => Double,
            (Decimal128, t) | (t, Decimal128) if t.is_numeric() => Decimal128,
            _ => String,
        }
    }

    pub fn sql_type(self) -> SqlType {
        match self {
            BsonType::Null => SqlType::Null,
            BsonType::Boolean => SqlType::Boolean,
            BsonType::Int32 => SqlType::Integer,
            BsonType::Int64 => SqlType::BigInt,
            BsonType::Double => SqlType::Double,
            BsonType::Decimal128 => SqlType::Decimal,
            BsonType::String => SqlType::Varchar,
            BsonType::Binary => SqlType::Binary,
            BsonType::Date => SqlType::Timestamp,
            BsonType::ObjectId => SqlType::ObjectId,
            BsonType::MinKey | BsonType::MaxKey | BsonType::Document | BsonType::Array => {
                SqlType::Any
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BsonType::Null => "null",
            BsonType::Boolean => "bool",
            BsonType::Int32 => "int",
            BsonType::Int64 => "long",
            BsonType::Double => "double",
            BsonType::Decimal128 => "decimal",
            BsonType::String => "string",
            BsonType::Binary => "binData",
            BsonType::Date => "date",
            BsonType::ObjectId => "objectId",
            BsonType::MinKey => "minKey",
            BsonType::MaxKey => "maxKey",
            BsonType::Document => "object",
            BsonType::Array => "array",
        }
    }
}

impl std::fmt::Display for BsonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BsonType::*;

    const ALL: [BsonType; 14] = [
        Null, Boolean, Int32, Int64, Double, Decimal128, String, Binary, Date, ObjectId, MinKey,
        MaxKey, Document, Array,
    ];

    #[test]
    fn test_numeric_promotion() {
        assert_eq!(Int32.promote(Int64), Int64);
        assert_eq!(Int64.promote(Double), Double);
        assert_eq!(Int32.promote(Double), Double);
        assert_eq!(Double.promote(Decimal128), Decimal128);
        assert_eq!(Int32.promote(Decimal128), Decimal128);
    }

    #[test]
    fn test_null_and_incompatible() {
        assert_eq!(Null.promote(Date), Date);
        assert_eq!(Date.promote(Date), Date);
        assert_eq!(Document.promote(Int32), String);
        assert_eq!(Array.promote(Document), String);
        assert_eq!(Boolean.promote(Int32), String);
        assert_eq!(ObjectId.promote(String), String);
    }

    #[test]
    fn test_promotion_commutative() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.promote(b), b.promote(a), "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_promotion_monotonic() {
        // promoting the result again with either input changes nothing
        for a in ALL {
            for b in ALL {
                let p = a.promote(b);
                assert_eq!(p.promote(a), p, "{} vs {}", a, b);
                assert_eq!(p.promote(b), p, "{} vs {}", a, b);
            }
        }
    }

    #[test]
    fn test_aliases() {
        let parsed: Vec<BsonType> = serde_yaml::from_str("[int, long, objectId, decimal128, bool]").unwrap();
        assert_eq!(parsed, vec![Int32, Int64, ObjectId, Decimal128, Boolean]);
    }
}
