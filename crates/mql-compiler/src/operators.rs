//! Operator table
//!
//! Maps each plan operator name to the rule that renders it as an
//! aggregation expression. The standard table is built once and shared;
//! callers may assemble their own and inject it into the compiler.

use std::collections::HashMap;
use std::sync::Arc;

use mql_plan::{Expr, Literal, Operator, SqlType};
use once_cell::sync::Lazy;
use serde_json::{json, Map, Value};

use crate::datetime;
use crate::error::{Result, TranslateError};
use crate::translator::ExprTranslator;

pub type CustomFn = fn(&ExprTranslator<'_>, &Expr, &[Expr]) -> Result<Value>;

#[derive(Clone, Copy)]
pub enum Handler {
    /// `{op: [operands...]}`
    Direct(&'static str),
    /// Binary comparison with a greater-than-null guard per operand
    NullGuarded(&'static str),
    Custom(CustomFn),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Direct(op) => write!(f, "Direct({})", op),
            Handler::NullGuarded(op) => write!(f, "NullGuarded({})", op),
            Handler::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl Handler {
    pub fn apply(&self, t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
        match self {
            Handler::Direct(op) => Ok(json!({ *op: t.translate_all(operands)? })),
            Handler::NullGuarded(op) => {
                expect_arity(expr, operands, 2)?;
                Ok(null_guarded(
                    op,
                    t.translate(&operands[0])?,
                    t.translate(&operands[1])?,
                ))
            }
            Handler::Custom(f) => f(t, expr, operands),
        }
    }
}

static STANDARD: Lazy<Arc<OperatorTable>> = Lazy::new(|| Arc::new(OperatorTable::standard()));

#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    handlers: HashMap<&'static str, Handler>,
}

impl OperatorTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The process-wide standard table
    pub fn shared() -> Arc<OperatorTable> {
        Arc::clone(&STANDARD)
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) -> &mut Self {
        self.handlers.insert(name, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();

        // Arithmetic
        table
            .register("+", Handler::Direct("$add"))
            .register("-", Handler::Direct("$subtract"))
            .register("*", Handler::Direct("$multiply"))
            .register("MOD", Handler::Direct("$mod"))
            .register("/", Handler::Custom(divide))
            .register("/INT", Handler::Custom(divide_integer))
            .register("NEGATE", Handler::Custom(negate));

        // Comparison
        table
            .register("=", Handler::Direct("$eq"))
            .register("<>", Handler::NullGuarded("$ne"))
            .register(">", Handler::NullGuarded("$gt"))
            .register(">=", Handler::NullGuarded("$gte"))
            .register("<", Handler::NullGuarded("$lt"))
            .register("<=", Handler::NullGuarded("$lte"))
            .register("IS NULL", Handler::Custom(is_null))
            .register("IS NOT NULL", Handler::Custom(is_not_null))
            .register("IN", Handler::Custom(in_list))
            .register("NOT IN", Handler::Custom(not_in_list));

        // Logical
        table
            .register("AND", Handler::Direct("$and"))
            .register("OR", Handler::Direct("$or"))
            .register("NOT", Handler::Direct("$not"));

        // Conditional
        table
            .register("CASE", Handler::Custom(case))
            .register("COALESCE", Handler::Custom(coalesce));

        // String
        table
            .register("SUBSTRING", Handler::Custom(substring))
            .register("UPPER", Handler::Direct("$toUpper"))
            .register("LOWER", Handler::Direct("$toLower"))
            .register("CHAR_LENGTH", Handler::Direct("$strLenCP"))
            .register("||", Handler::Direct("$concat"))
            .register("TRIM", Handler::Custom(trim))
            .register("LTRIM", Handler::Custom(trim))
            .register("RTRIM", Handler::Custom(trim))
            .register("LIKE", Handler::Custom(like));

        // Math
        table
            .register("ABS", Handler::Direct("$abs"))
            .register("FLOOR", Handler::Direct("$floor"))
            .register("CEIL", Handler::Direct("$ceil"))
            .register("ROUND", Handler::Direct("$round"));

        // Types
        table
            .register("CAST", Handler::Custom(cast))
            .register("REINTERPRET", Handler::Custom(reinterpret));

        // Date/time
        table
            .register("EXTRACT", Handler::Custom(datetime::extract))
            .register("DAYNAME", Handler::Custom(datetime::day_name))
            .register("MONTHNAME", Handler::Custom(datetime::month_name))
            .register("TIMESTAMPDIFF", Handler::Custom(datetime::timestamp_diff));

        // Collections
        table.register("ITEM", Handler::Custom(item));

        table
    }
}

pub(crate) fn expect_arity(expr: &Expr, operands: &[Expr], n: usize) -> Result<()> {
    if operands.len() != n {
        return Err(unsupported(expr));
    }
    Ok(())
}

pub(crate) fn unsupported(expr: &Expr) -> TranslateError {
    match expr {
        Expr::Call { op, .. } => TranslateError::unsupported(op.name(), expr),
        other => TranslateError::unsupported(other.to_string(), other),
    }
}

/// `{"$and": [{op: [a, b]}, {"$gt": [a, null]}, {"$gt": [b, null]}]}`,
/// leaving out the guard of a literal null operand.
pub fn null_guarded(op: &str, a: Value, b: Value) -> Value {
    let mut terms = vec![json!({ op: [a.clone(), b.clone()] })];
    for operand in [a, b] {
        if !operand.is_null() {
            terms.push(json!({ "$gt": [operand, null] }));
        }
    }
    json!({ "$and": terms })
}

/// Division that yields null instead of failing on a zero divisor
pub fn guarded_divide(dividend: Value, divisor: Value) -> Value {
    json!({ "$cond": [
        { "$eq": [divisor.clone(), 0] },
        null,
        { "$divide": [dividend, divisor] }
    ] })
}

fn divide(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 2)?;
    Ok(guarded_divide(t.translate(&operands[0])?, t.translate(&operands[1])?))
}

fn divide_integer(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 2)?;
    let dividend = t.translate(&operands[0])?;
    let divisor = t.translate(&operands[1])?;
    Ok(json!({ "$cond": [
        { "$eq": [divisor.clone(), 0] },
        null,
        { "$trunc": { "$divide": [dividend, divisor] } }
    ] }))
}

fn negate(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    Ok(json!({ "$multiply": [t.translate(&operands[0])?, -1] }))
}

fn is_null(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    Ok(json!({ "$lte": [t.translate(&operands[0])?, null] }))
}

fn is_not_null(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    Ok(json!({ "$gt": [t.translate(&operands[0])?, null] }))
}

fn in_list(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    let (value, list) = operands.split_first().ok_or_else(|| unsupported(expr))?;
    if list.is_empty() {
        return Err(unsupported(expr));
    }
    let value = t.translate(value)?;
    let terms = list
        .iter()
        .map(|item| -> Result<Value> { Ok(json!({ "$eq": [value.clone(), t.translate(item)?] })) })
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({ "$or": terms }))
}

fn not_in_list(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    let (value, list) = operands.split_first().ok_or_else(|| unsupported(expr))?;
    if list.is_empty() {
        return Err(unsupported(expr));
    }
    let value = t.translate(value)?;
    let terms = list
        .iter()
        .map(|item| -> Result<Value> { Ok(null_guarded("$ne", value.clone(), t.translate(item)?)) })
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({ "$and": terms }))
}

/// `CASE WHEN c1 THEN v1 WHEN c2 THEN v2 ELSE e END` arrives as
/// `[c1, v1, c2, v2, e]`; the ELSE operand is absent for even lengths.
fn case(t: &ExprTranslator<'_>, _expr: &Expr, operands: &[Expr]) -> Result<Value> {
    let values = t.translate_all(operands)?;
    Ok(fold_case(&values))
}

fn fold_case(values: &[Value]) -> Value {
    match values {
        [] => Value::Null,
        [otherwise] => otherwise.clone(),
        [when, then, rest @ ..] => json!({ "$cond": [when, then, fold_case(rest)] }),
    }
}

fn coalesce(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    let values = t.translate_all(operands)?;
    let (last, init) = values.split_last().ok_or_else(|| unsupported(expr))?;
    Ok(init
        .iter()
        .rev()
        .fold(last.clone(), |acc, v| json!({ "$ifNull": [v, acc] })))
}

fn substring(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    if !(2..=3).contains(&operands.len()) {
        return Err(unsupported(expr));
    }
    let string = t.translate(&operands[0])?;
    let start = json!({ "$subtract": [t.translate(&operands[1])?, 1] });
    let length = match operands.get(2) {
        Some(len) => t.translate(len)?,
        None => json!({ "$strLenCP": string.clone() }),
    };
    Ok(json!({ "$substrCP": [string, start, length] }))
}

fn trim(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    let op = match expr {
        Expr::Call { op: Operator::LTrim, .. } => "$ltrim",
        Expr::Call { op: Operator::RTrim, .. } => "$rtrim",
        _ => "$trim",
    };
    Ok(json!({ op: { "input": t.translate(&operands[0])? } }))
}

fn like(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    if !(2..=3).contains(&operands.len()) {
        return Err(unsupported(expr));
    }
    let pattern = string_literal(&operands[1]).ok_or_else(|| unsupported(expr))?;
    let escape = match operands.get(2) {
        Some(e) => {
            let text = string_literal(e).ok_or_else(|| unsupported(expr))?;
            let mut chars = text.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Some(c),
                _ => return Err(unsupported(expr)),
            }
        }
        None => None,
    };

    Ok(json!({ "$regexMatch": {
        "input": t.translate(&operands[0])?,
        "regex": like_to_regex(pattern, escape),
        "options": "s"
    } }))
}

fn string_literal(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Literal {
            value: Literal::String(s),
        } => Some(s),
        _ => None,
    }
}

/// Anchored regular expression matching the same strings as a LIKE pattern
pub fn like_to_regex(pattern: &str, escape: Option<char>) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            c if Some(c) == escape => {
                if let Some(next) = chars.next() {
                    push_escaped(&mut regex, next);
                }
            }
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            c => push_escaped(&mut regex, c),
        }
    }
    regex.push('$');
    regex
}

fn push_escaped(regex: &mut String, c: char) {
    if "\\^$.|?*+()[]{}".contains(c) {
        regex.push('\\');
    }
    regex.push(c);
}

/// Native `$convert` target of a SQL type
fn convert_target(to: SqlType) -> Option<&'static str> {
    match to {
        SqlType::Integer => Some("int"),
        SqlType::BigInt => Some("long"),
        SqlType::Double => Some("double"),
        SqlType::Decimal => Some("decimal"),
        SqlType::Varchar => Some("string"),
        SqlType::Boolean => Some("bool"),
        SqlType::Date | SqlType::Timestamp => Some("date"),
        SqlType::ObjectId => Some("objectId"),
        _ => None,
    }
}

fn cast(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    let to = match expr {
        Expr::Call {
            op: Operator::Cast { to },
            ..
        } => *to,
        _ => return Err(unsupported(expr)),
    };
    let input = t.translate(&operands[0])?;

    if matches!(to, SqlType::Any | SqlType::Null) {
        return Ok(input);
    }
    let target = convert_target(to).ok_or_else(|| {
        TranslateError::TypeConversionUnsupported(format!("CAST to {} in {}", to, expr))
    })?;

    let mut convert = Map::new();
    convert.insert("input".to_string(), input);
    convert.insert("to".to_string(), json!(target));
    convert.insert("onNull".to_string(), Value::Null);
    Ok(json!({ "$convert": convert }))
}

fn reinterpret(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    t.translate(&operands[0])
}

/// `ITEM($n, k)`: element `k` (1-based) of the array bound to column `n`
fn item(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 2)?;
    let column = operands[0].as_input_ref().ok_or_else(|| unsupported(expr))?;
    let index = match &operands[1] {
        Expr::Literal {
            value: Literal::Integer(i),
        } => i64::from(*i),
        Expr::Literal {
            value: Literal::BigInt(i),
        } => *i,
        _ => return Err(unsupported(expr)),
    };
    Ok(json!({ "$arrayElemAt": [t.field_ref(column)?, index - 1] }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translate(expr: &Expr) -> Result<Value> {
        let fields: Vec<String> = ["a", "b", "s", "d", "arr"].iter().map(|s| s.to_string()).collect();
        ExprTranslator::new(&OperatorTable::standard(), &fields).translate(expr)
    }

    #[test]
    fn test_comparison_guards() {
        let v = translate(&Expr::gt(Expr::input(0), Expr::int(0))).unwrap();
        assert_eq!(
            v,
            json!({"$and": [
                {"$gt": ["$a", {"$literal": 0}]},
                {"$gt": ["$a", null]},
                {"$gt": [{"$literal": 0}, null]}
            ]})
        );

        let v = translate(&Expr::call(
            Operator::NotEquals,
            vec![Expr::input(0), Expr::null()],
        ))
        .unwrap();
        assert_eq!(v, json!({"$and": [{"$ne": ["$a", null]}, {"$gt": ["$a", null]}]}));

        let v = translate(&Expr::eq(Expr::input(0), Expr::input(1))).unwrap();
        assert_eq!(v, json!({"$eq": ["$a", "$b"]}));
    }

    #[test]
    fn test_null_tests() {
        let v = translate(&Expr::call(Operator::IsNull, vec![Expr::input(0)])).unwrap();
        assert_eq!(v, json!({"$lte": ["$a", null]}));
        let v = translate(&Expr::call(Operator::IsNotNull, vec![Expr::input(0)])).unwrap();
        assert_eq!(v, json!({"$gt": ["$a", null]}));
    }

    #[test]
    fn test_in_and_not_in() {
        let v = translate(&Expr::call(
            Operator::In,
            vec![Expr::input(0), Expr::int(1), Expr::int(2)],
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"$or": [
                {"$eq": ["$a", {"$literal": 1}]},
                {"$eq": ["$a", {"$literal": 2}]}
            ]})
        );

        let v = translate(&Expr::call(Operator::NotIn, vec![Expr::input(0), Expr::int(1)])).unwrap();
        assert_eq!(
            v,
            json!({"$and": [
                {"$and": [
                    {"$ne": ["$a", {"$literal": 1}]},
                    {"$gt": ["$a", null]},
                    {"$gt": [{"$literal": 1}, null]}
                ]}
            ]})
        );
    }

    #[test]
    fn test_case_without_else() {
        let v = translate(&Expr::call(
            Operator::Case,
            vec![Expr::input(3), Expr::string("yes")],
        ))
        .unwrap();
        assert_eq!(v, json!({"$cond": ["$d", {"$literal": "yes"}, null]}));
    }

    #[test]
    fn test_division_guards() {
        let v = translate(&Expr::call(Operator::Divide, vec![Expr::input(0), Expr::input(1)])).unwrap();
        assert_eq!(
            v,
            json!({"$cond": [{"$eq": ["$b", 0]}, null, {"$divide": ["$a", "$b"]}]})
        );

        let v = translate(&Expr::call(
            Operator::DivideInteger,
            vec![Expr::input(0), Expr::input(1)],
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"$cond": [{"$eq": ["$b", 0]}, null, {"$trunc": {"$divide": ["$a", "$b"]}}]})
        );
    }

    #[test]
    fn test_substring_is_zero_based() {
        let v = translate(&Expr::call(
            Operator::Substring,
            vec![Expr::input(2), Expr::int(2), Expr::int(3)],
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"$substrCP": ["$s", {"$subtract": [{"$literal": 2}, 1]}, {"$literal": 3}]})
        );

        let v = translate(&Expr::call(Operator::Substring, vec![Expr::input(2), Expr::int(2)])).unwrap();
        assert_eq!(v["$substrCP"][2], json!({"$strLenCP": "$s"}));
    }

    #[test]
    fn test_coalesce_folds_right() {
        let v = translate(&Expr::call(
            Operator::Coalesce,
            vec![Expr::input(0), Expr::input(1), Expr::int(0)],
        ))
        .unwrap();
        assert_eq!(v, json!({"$ifNull": ["$a", {"$ifNull": ["$b", {"$literal": 0}]}]}));
    }

    #[test]
    fn test_like() {
        assert_eq!(like_to_regex("a%b_c.", None), "^a.*b.c\\.$");
        assert_eq!(like_to_regex("100!%", Some('!')), "^100%$");

        let v = translate(&Expr::call(
            Operator::Like,
            vec![Expr::input(2), Expr::string("ab%")],
        ))
        .unwrap();
        assert_eq!(
            v,
            json!({"$regexMatch": {"input": "$s", "regex": "^ab.*$", "options": "s"}})
        );

        let dynamic = Expr::call(Operator::Like, vec![Expr::input(2), Expr::input(1)]);
        assert!(matches!(
            translate(&dynamic),
            Err(TranslateError::UnsupportedExpression { .. })
        ));
    }

    #[test]
    fn test_cast() {
        let v = translate(&Expr::call(Operator::Cast { to: SqlType::BigInt }, vec![Expr::input(0)])).unwrap();
        assert_eq!(
            v,
            json!({"$convert": {"input": "$a", "to": "long", "onNull": null}})
        );

        let v = translate(&Expr::call(Operator::Reinterpret, vec![Expr::input(0)])).unwrap();
        assert_eq!(v, json!("$a"));

        let err = translate(&Expr::call(
            Operator::Cast { to: SqlType::IntervalYearMonth },
            vec![Expr::input(0)],
        ))
        .unwrap_err();
        assert!(matches!(err, TranslateError::TypeConversionUnsupported(_)));
    }

    #[test]
    fn test_item() {
        let v = translate(&Expr::call(Operator::Item, vec![Expr::input(4), Expr::int(1)])).unwrap();
        assert_eq!(v, json!({"$arrayElemAt": ["$arr", 0]}));

        let nested = Expr::call(
            Operator::Item,
            vec![
                Expr::call(Operator::Item, vec![Expr::input(4), Expr::int(1)]),
                Expr::int(2),
            ],
        );
        assert!(translate(&nested).is_err());
        let dynamic = Expr::call(Operator::Item, vec![Expr::input(4), Expr::input(0)]);
        assert!(translate(&dynamic).is_err());
    }

    #[test]
    fn test_shared_table_is_standard() {
        let shared = OperatorTable::shared();
        assert_eq!(shared.len(), OperatorTable::standard().len());
        assert!(shared.contains("TIMESTAMPDIFF"));
        assert!(!shared.contains("SOUNDEX"));
    }
}
