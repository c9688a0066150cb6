//! Scalar and boolean expression translation

use mql_plan::Expr;
use serde_json::{json, Value};

use crate::error::{Result, TranslateError};
use crate::literal::translate_literal;
use crate::operators::OperatorTable;

/// Translates expressions evaluated against one row shape. `fields` holds
/// the document path bound to each input column.
pub struct ExprTranslator<'a> {
    operators: &'a OperatorTable,
    fields: &'a [String],
}

impl<'a> ExprTranslator<'a> {
    pub fn new(operators: &'a OperatorTable, fields: &'a [String]) -> Self {
        Self { operators, fields }
    }

    pub fn translate(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::InputRef { index } => self.field_ref(*index),
            Expr::Literal { value } => translate_literal(value),
            Expr::Call { op, operands } => {
                let handler = self
                    .operators
                    .get(op.name())
                    .ok_or_else(|| TranslateError::unsupported(op.name(), expr))?;
                handler.apply(self, expr, operands)
            }
        }
    }

    pub fn translate_all(&self, exprs: &[Expr]) -> Result<Vec<Value>> {
        exprs.iter().map(|e| self.translate(e)).collect()
    }

    pub fn field_ref(&self, index: usize) -> Result<Value> {
        let path = self.fields.get(index).ok_or_else(|| {
            TranslateError::SchemaInconsistency(format!(
                "input reference ${} out of range for {} bound fields",
                index,
                self.fields.len()
            ))
        })?;
        Ok(field_path_ref(path))
    }
}

/// `"$a.b"` when every segment is a plain identifier, otherwise a chain
/// of `$getField` lookups starting at the current document.
pub fn field_path_ref(path: &str) -> Value {
    if is_plain_path(path) {
        return Value::String(format!("${}", path));
    }

    path.split('.').fold(Value::String("$$CURRENT".to_string()), |input, segment| {
        json!({ "$getField": { "field": { "$literal": segment }, "input": input } })
    })
}

/// True when `"$" + path` addresses the field
pub fn is_plain_path(path: &str) -> bool {
    path.split('.').all(is_identifier)
}

fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
