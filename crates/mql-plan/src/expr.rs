//! Scalar and boolean expressions carried by plan nodes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::SqlType;

/// Expression tree. Column references are positional (`$0`, `$1`, ...)
/// against the input row type of the node that owns the expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    InputRef { index: usize },
    Literal { value: Literal },
    Call { op: Operator, operands: Vec<Expr> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    /// Exact decimal kept in its textual form
    Decimal(String),
    String(String),
    /// ISO date, e.g. `2024-03-01`
    Date(String),
    /// ISO timestamp, e.g. `2024-03-01 10:15:00` or RFC 3339
    Timestamp(String),
    Interval { unit: TimeUnit, value: i64 },
    /// Time unit flag used by EXTRACT and TIMESTAMPDIFF
    Symbol(TimeUnit),
}

impl Literal {
    pub fn sql_type(&self) -> SqlType {
        match self {
            Literal::Null => SqlType::Null,
            Literal::Boolean(_) => SqlType::Boolean,
            Literal::Integer(_) => SqlType::Integer,
            Literal::BigInt(_) => SqlType::BigInt,
            Literal::Double(_) => SqlType::Double,
            Literal::Decimal(_) => SqlType::Decimal,
            Literal::String(_) => SqlType::Varchar,
            Literal::Date(_) => SqlType::Date,
            Literal::Timestamp(_) => SqlType::Timestamp,
            Literal::Interval { unit, .. } if unit.is_year_month() => SqlType::IntervalYearMonth,
            Literal::Interval { .. } => SqlType::IntervalDayTime,
            Literal::Symbol(_) => SqlType::Any,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Literal::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Year,
    Quarter,
    Month,
    Week,
    Day,
    DayOfYear,
    DayOfWeek,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
    IsoYear,
    IsoDayOfWeek,
    IsoWeek,
}

impl TimeUnit {
    pub fn is_year_month(self) -> bool {
        matches!(self, TimeUnit::Year | TimeUnit::Quarter | TimeUnit::Month)
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeUnit::Year => "YEAR",
            TimeUnit::Quarter => "QUARTER",
            TimeUnit::Month => "MONTH",
            TimeUnit::Week => "WEEK",
            TimeUnit::Day => "DAY",
            TimeUnit::DayOfYear => "DOY",
            TimeUnit::DayOfWeek => "DOW",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Minute => "MINUTE",
            TimeUnit::Second => "SECOND",
            TimeUnit::Millisecond => "MILLISECOND",
            TimeUnit::Microsecond => "MICROSECOND",
            TimeUnit::Nanosecond => "NANOSECOND",
            TimeUnit::IsoYear => "ISOYEAR",
            TimeUnit::IsoDayOfWeek => "ISODOW",
            TimeUnit::IsoWeek => "ISOWEEK",
        }
    }
}

/// Operators the optimizer may leave in a plan. Anything it produces that
/// has no dedicated variant arrives as `Function(name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // Arithmetic
    Plus,
    Minus,
    Times,
    Divide,
    DivideInteger,
    Mod,
    UnaryMinus,

    // Comparison
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsNull,
    IsNotNull,
    In,
    NotIn,

    // Logical
    And,
    Or,
    Not,

    // Conditional
    Case,
    Coalesce,

    // String
    Substring,
    Upper,
    Lower,
    CharLength,
    Concat,
    Trim,
    LTrim,
    RTrim,
    Like,

    // Math
    Abs,
    Floor,
    Ceil,
    Round,

    // Types
    Cast { to: SqlType },
    Reinterpret,

    // Date/time
    Extract,
    DayName,
    MonthName,
    TimestampDiff,

    // Collections
    Item,

    Function(String),
}

impl Operator {
    /// Name used as operator-table key and in diagnostics
    pub fn name(&self) -> &str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Times => "*",
            Operator::Divide => "/",
            Operator::DivideInteger => "/INT",
            Operator::Mod => "MOD",
            Operator::UnaryMinus => "NEGATE",
            Operator::Equals => "=",
            Operator::NotEquals => "<>",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Not => "NOT",
            Operator::Case => "CASE",
            Operator::Coalesce => "COALESCE",
            Operator::Substring => "SUBSTRING",
            Operator::Upper => "UPPER",
            Operator::Lower => "LOWER",
            Operator::CharLength => "CHAR_LENGTH",
            Operator::Concat => "||",
            Operator::Trim => "TRIM",
            Operator::LTrim => "LTRIM",
            Operator::RTrim => "RTRIM",
            Operator::Like => "LIKE",
            Operator::Abs => "ABS",
            Operator::Floor => "FLOOR",
            Operator::Ceil => "CEIL",
            Operator::Round => "ROUND",
            Operator::Cast { .. } => "CAST",
            Operator::Reinterpret => "REINTERPRET",
            Operator::Extract => "EXTRACT",
            Operator::DayName => "DAYNAME",
            Operator::MonthName => "MONTHNAME",
            Operator::TimestampDiff => "TIMESTAMPDIFF",
            Operator::Item => "ITEM",
            Operator::Function(name) => name,
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Equals
                | Operator::NotEquals
                | Operator::GreaterThan
                | Operator::GreaterThanOrEqual
                | Operator::LessThan
                | Operator::LessThanOrEqual
        )
    }
}

impl Expr {
    pub fn input(index: usize) -> Self {
        Expr::InputRef { index }
    }

    pub fn literal(value: Literal) -> Self {
        Expr::Literal { value }
    }

    pub fn null() -> Self {
        Expr::literal(Literal::Null)
    }

    pub fn boolean(b: bool) -> Self {
        Expr::literal(Literal::Boolean(b))
    }

    pub fn int(i: i32) -> Self {
        Expr::literal(Literal::Integer(i))
    }

    pub fn long(i: i64) -> Self {
        Expr::literal(Literal::BigInt(i))
    }

    pub fn double(f: f64) -> Self {
        Expr::literal(Literal::Double(f))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::literal(Literal::String(s.into()))
    }

    pub fn symbol(unit: TimeUnit) -> Self {
        Expr::literal(Literal::Symbol(unit))
    }

    pub fn call(op: Operator, operands: Vec<Expr>) -> Self {
        Expr::Call { op, operands }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Expr::call(Operator::Equals, vec![left, right])
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Expr::call(Operator::GreaterThan, vec![left, right])
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Expr::call(Operator::LessThan, vec![left, right])
    }

    pub fn and(operands: Vec<Expr>) -> Self {
        Expr::call(Operator::And, operands)
    }

    pub fn is_null_literal(&self) -> bool {
        matches!(self, Expr::Literal { value: Literal::Null })
    }

    pub fn as_input_ref(&self) -> Option<usize> {
        match self {
            Expr::InputRef { index } => Some(*index),
            _ => None,
        }
    }

    /// Split a conjunction into its top-level terms
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::Call {
                op: Operator::And,
                operands,
            } => operands.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }

    /// Collect every input reference used by the expression
    pub fn input_refs(&self) -> Vec<usize> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs(&self, refs: &mut Vec<usize>) {
        match self {
            Expr::InputRef { index } => refs.push(*index),
            Expr::Literal { .. } => {}
            Expr::Call { operands, .. } => {
                for operand in operands {
                    operand.collect_refs(refs);
                }
            }
        }
    }

    /// Shift every input reference by `delta`; references below zero are a caller bug.
    pub fn shift_refs(&self, delta: isize) -> Expr {
        match self {
            Expr::InputRef { index } => Expr::InputRef {
                index: (*index as isize + delta) as usize,
            },
            Expr::Literal { .. } => self.clone(),
            Expr::Call { op, operands } => Expr::Call {
                op: op.clone(),
                operands: operands.iter().map(|e| e.shift_refs(delta)).collect(),
            },
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Boolean(b) => write!(f, "{}", b),
            Literal::Integer(i) => write!(f, "{}", i),
            Literal::BigInt(i) => write!(f, "{}", i),
            Literal::Double(d) => write!(f, "{:?}", d),
            Literal::Decimal(d) => write!(f, "{}", d),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Literal::Date(d) => write!(f, "DATE '{}'", d),
            Literal::Timestamp(t) => write!(f, "TIMESTAMP '{}'", t),
            Literal::Interval { unit, value } => write!(f, "INTERVAL '{}' {}", value, unit.name()),
            Literal::Symbol(unit) => write!(f, "FLAG({})", unit.name()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::InputRef { index } => write!(f, "${}", index),
            Expr::Literal { value } => write!(f, "{}", value),
            Expr::Call { op, operands } => {
                write!(f, "{}(", op.name())?;
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", operand)?;
                }
                write!(f, ")")?;
                if let Operator::Cast { to } = op {
                    write!(f, ":{}", to)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_plan_text() {
        let expr = Expr::and(vec![
            Expr::gt(Expr::input(0), Expr::int(10)),
            Expr::eq(Expr::input(2), Expr::string("it's")),
        ]);
        assert_eq!(expr.to_string(), "AND(>($0, 10), =($2, 'it''s'))");

        let cast = Expr::call(Operator::Cast { to: SqlType::BigInt }, vec![Expr::input(1)]);
        assert_eq!(cast.to_string(), "CAST($1):BIGINT");
    }

    #[test]
    fn test_conjuncts_flatten_nested_and() {
        let expr = Expr::and(vec![
            Expr::and(vec![Expr::input(0), Expr::input(1)]),
            Expr::input(2),
        ]);
        assert_eq!(expr.conjuncts().len(), 3);
        assert_eq!(Expr::input(4).conjuncts().len(), 1);
    }

    #[test]
    fn test_shift_refs() {
        let expr = Expr::eq(Expr::input(3), Expr::input(5));
        assert_eq!(expr.shift_refs(-3).input_refs(), vec![0, 2]);
    }

    #[test]
    fn test_operator_json_shape() {
        let json = serde_json::to_value(Operator::Cast { to: SqlType::Varchar }).unwrap();
        assert_eq!(json, serde_json::json!({"cast": {"to": "varchar"}}));

        let json = serde_json::to_value(Operator::GreaterThan).unwrap();
        assert_eq!(json, serde_json::json!("greater_than"));
    }
}
