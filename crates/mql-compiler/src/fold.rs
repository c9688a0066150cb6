//! Constant folding of filter conditions

use std::cmp::Ordering;

use mql_plan::{Expr, Literal, Operator};

/// Evaluates a condition made only of literals. Returns `None` as soon as
/// any part depends on the row or cannot be compared.
pub fn fold_constant(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Literal {
            value: Literal::Boolean(b),
        } => Some(*b),
        Expr::Call { op, operands } => match op {
            Operator::Not => match operands.as_slice() {
                [operand] => fold_constant(operand).map(|b| !b),
                _ => None,
            },
            Operator::And => operands
                .iter()
                .map(fold_constant)
                .collect::<Option<Vec<_>>>()
                .map(|values| values.into_iter().all(|b| b)),
            Operator::Or => operands
                .iter()
                .map(fold_constant)
                .collect::<Option<Vec<_>>>()
                .map(|values| values.into_iter().any(|b| b)),
            op if op.is_comparison() => match operands.as_slice() {
                [Expr::Literal { value: a }, Expr::Literal { value: b }] => {
                    let ordering = compare(a, b)?;
                    Some(match op {
                        Operator::Equals => ordering == Ordering::Equal,
                        Operator::NotEquals => ordering != Ordering::Equal,
                        Operator::GreaterThan => ordering == Ordering::Greater,
                        Operator::GreaterThanOrEqual => ordering != Ordering::Less,
                        Operator::LessThan => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    })
                }
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn compare(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::String(x), Literal::String(y)) => Some(x.cmp(y)),
        (Literal::Boolean(x), Literal::Boolean(y)) => Some(x.cmp(y)),
        _ => numeric(a)?.compare(numeric(b)?),
    }
}

/// Every integer up to this magnitude is exact as `f64`
const MAX_EXACT_INTEGER: u64 = 1 << 53;

/// Significant decimal digits that always round-trip through `f64`
const MAX_EXACT_DIGITS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Exact(i64),
    Approx(f64),
}

impl Number {
    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Exact(x), Number::Exact(y)) => Some(x.cmp(&y)),
            (Number::Exact(x), Number::Approx(y)) => exact_f64(x)?.partial_cmp(&y),
            (Number::Approx(x), Number::Exact(y)) => x.partial_cmp(&exact_f64(y)?),
            (Number::Approx(x), Number::Approx(y)) => x.partial_cmp(&y),
        }
    }
}

fn exact_f64(i: i64) -> Option<f64> {
    (i.unsigned_abs() <= MAX_EXACT_INTEGER).then_some(i as f64)
}

fn numeric(literal: &Literal) -> Option<Number> {
    match literal {
        Literal::Integer(i) => Some(Number::Exact(i64::from(*i))),
        Literal::BigInt(i) => Some(Number::Exact(*i)),
        Literal::Double(d) => Some(Number::Approx(*d)),
        Literal::Decimal(d) => decimal(d),
        _ => None,
    }
}

/// A decimal literal, `None` when `f64` would round it
fn decimal(text: &str) -> Option<Number> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Number::Exact(i));
    }
    let mantissa = text.split(['e', 'E']).next().unwrap_or(text);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let significant = digits.trim_start_matches('0').trim_end_matches('0');
    if significant.len() > MAX_EXACT_DIGITS {
        return None;
    }
    text.parse().ok().map(Number::Approx)
}
