//! Date and time functions

use mql_plan::{Expr, Literal, TimeUnit};
use serde_json::{json, Value};

use crate::error::{Result, TranslateError};
use crate::operators::{expect_arity, unsupported};
use crate::translator::ExprTranslator;

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn unit_of(expr: &Expr, operand: &Expr) -> Result<TimeUnit> {
    match operand {
        Expr::Literal {
            value: Literal::Symbol(unit),
        } => Ok(*unit),
        _ => Err(unsupported(expr)),
    }
}

fn unsupported_unit(function: &str, unit: TimeUnit, expr: &Expr) -> TranslateError {
    TranslateError::unsupported(format!("{} {}", function, unit.name()), expr)
}

/// `EXTRACT(unit, value)`
pub fn extract(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 2)?;
    let unit = unit_of(expr, &operands[0])?;
    let value = t.translate(&operands[1])?;

    let op = match unit {
        TimeUnit::Year => "$year",
        TimeUnit::Month => "$month",
        TimeUnit::Week => "$week",
        TimeUnit::Day => "$dayOfMonth",
        TimeUnit::DayOfYear => "$dayOfYear",
        TimeUnit::DayOfWeek => "$dayOfWeek",
        TimeUnit::Hour => "$hour",
        TimeUnit::Minute => "$minute",
        TimeUnit::Second => "$second",
        TimeUnit::Millisecond => "$millisecond",
        TimeUnit::IsoYear => "$isoWeekYear",
        TimeUnit::IsoDayOfWeek => "$isoDayOfWeek",
        TimeUnit::IsoWeek => "$isoWeek",
        TimeUnit::Quarter => return Ok(quarter(value)),
        TimeUnit::Microsecond | TimeUnit::Nanosecond => {
            return Err(unsupported_unit("EXTRACT", unit, expr))
        }
    };
    Ok(json!({ op: value }))
}

fn quarter(value: Value) -> Value {
    let month = json!({ "$month": value });
    [(3, 1), (6, 2), (9, 3)]
        .iter()
        .rev()
        .fold(json!(4), |otherwise, (last_month, q)| {
            json!({ "$cond": [{ "$lte": [month.clone(), last_month] }, q, otherwise] })
        })
}

/// Nested `$cond` mapping `1..=names.len()` to the names, null otherwise
fn name_lookup(number: Value, names: &[&str]) -> Value {
    names
        .iter()
        .enumerate()
        .rev()
        .fold(Value::Null, |otherwise, (i, name)| {
            json!({ "$cond": [{ "$eq": [number.clone(), i + 1] }, name, otherwise] })
        })
}

pub fn day_name(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    let day = json!({ "$dayOfWeek": t.translate(&operands[0])? });
    Ok(name_lookup(day, &DAY_NAMES))
}

pub fn month_name(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 1)?;
    let month = json!({ "$month": t.translate(&operands[0])? });
    Ok(name_lookup(month, &MONTH_NAMES))
}

/// `TIMESTAMPDIFF(unit, start, end)`. Calendar units use `$dateDiff`;
/// fixed-length units divide the millisecond difference.
pub fn timestamp_diff(t: &ExprTranslator<'_>, expr: &Expr, operands: &[Expr]) -> Result<Value> {
    expect_arity(expr, operands, 3)?;
    let unit = unit_of(expr, &operands[0])?;
    let start = t.translate(&operands[1])?;
    let end = t.translate(&operands[2])?;

    let calendar = match unit {
        TimeUnit::Year => Some("year"),
        TimeUnit::Quarter => Some("quarter"),
        TimeUnit::Month => Some("month"),
        _ => None,
    };
    if let Some(name) = calendar {
        return Ok(json!({ "$dateDiff": {
            "startDate": start,
            "endDate": end,
            "unit": name
        } }));
    }

    let millis = json!({ "$subtract": [end, start] });
    let divisor: i64 = match unit {
        TimeUnit::Millisecond => return Ok(millis),
        TimeUnit::Microsecond => return Ok(json!({ "$multiply": [millis, 1000] })),
        TimeUnit::Nanosecond => return Ok(json!({ "$multiply": [millis, 1_000_000] })),
        TimeUnit::Second => 1_000,
        TimeUnit::Minute => 60_000,
        TimeUnit::Hour => 3_600_000,
        TimeUnit::Day => 86_400_000,
        TimeUnit::Week => 604_800_000,
        other => return Err(unsupported_unit("TIMESTAMPDIFF", other, expr)),
    };
    Ok(json!({ "$trunc": { "$divide": [millis, divisor] } }))
}

#[cfg(test)]
mod tests {
    use mql_plan::Operator;

    use super::*;
    use crate::operators::OperatorTable;

    fn translate(expr: &Expr) -> Result<Value> {
        let fields = vec!["created".to_string(), "shipped".to_string()];
        ExprTranslator::new(&OperatorTable::standard(), &fields).translate(expr)
    }

    fn extract_of(unit: TimeUnit) -> Expr {
        Expr::call(Operator::Extract, vec![Expr::symbol(unit), Expr::input(0)])
    }

    #[test]
    fn test_extract_units() {
        assert_eq!(translate(&extract_of(TimeUnit::Year)).unwrap(), json!({"$year": "$created"}));
        assert_eq!(
            translate(&extract_of(TimeUnit::Day)).unwrap(),
            json!({"$dayOfMonth": "$created"})
        );
        assert_eq!(
            translate(&extract_of(TimeUnit::IsoYear)).unwrap(),
            json!({"$isoWeekYear": "$created"})
        );
        assert!(translate(&extract_of(TimeUnit::Nanosecond)).is_err());
    }

    #[test]
    fn test_extract_quarter() {
        let month = json!({"$month": "$created"});
        assert_eq!(
            translate(&extract_of(TimeUnit::Quarter)).unwrap(),
            json!({"$cond": [{"$lte": [month, 3]}, 1,
                {"$cond": [{"$lte": [month, 6]}, 2,
                    {"$cond": [{"$lte": [month, 9]}, 3, 4]}]}]})
        );
    }

    #[test]
    fn test_day_name() {
        let v = translate(&Expr::call(Operator::DayName, vec![Expr::input(0)])).unwrap();
        let day = json!({"$dayOfWeek": "$created"});
        assert_eq!(v["$cond"][0], json!({"$eq": [day, 1]}));
        assert_eq!(v["$cond"][1], json!("Sunday"));
        assert_eq!(v["$cond"][2]["$cond"][1], json!("Monday"));
    }

    #[test]
    fn test_month_name_ends_in_null() {
        let mut v = translate(&Expr::call(Operator::MonthName, vec![Expr::input(0)])).unwrap();
        for _ in 0..11 {
            v = v["$cond"][2].clone();
        }
        assert_eq!(v["$cond"][1], json!("December"));
        assert_eq!(v["$cond"][2], Value::Null);
    }

    #[test]
    fn test_timestamp_diff() {
        let diff = |unit| {
            translate(&Expr::call(
                Operator::TimestampDiff,
                vec![Expr::symbol(unit), Expr::input(0), Expr::input(1)],
            ))
        };
        let millis = json!({"$subtract": ["$shipped", "$created"]});

        assert_eq!(
            diff(TimeUnit::Month).unwrap(),
            json!({"$dateDiff": {"startDate": "$created", "endDate": "$shipped", "unit": "month"}})
        );
        assert_eq!(diff(TimeUnit::Millisecond).unwrap(), millis);
        assert_eq!(
            diff(TimeUnit::Hour).unwrap(),
            json!({"$trunc": {"$divide": [millis, 3_600_000]}})
        );
        assert_eq!(
            diff(TimeUnit::Microsecond).unwrap(),
            json!({"$multiply": [millis, 1000]})
        );
        assert!(diff(TimeUnit::IsoWeek).is_err());
    }

    #[test]
    fn test_unit_must_be_a_flag() {
        let expr = Expr::call(Operator::Extract, vec![Expr::string("YEAR"), Expr::input(0)]);
        assert!(matches!(
            translate(&expr),
            Err(TranslateError::UnsupportedExpression { .. })
        ));
    }
}
