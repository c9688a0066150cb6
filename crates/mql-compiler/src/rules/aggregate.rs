use mql_plan::{AggCall, AggFunction, RelNode};
use serde_json::{json, Map, Value};

use super::{unique_names, Fragment};
use crate::bindings::Bindings;
use crate::error::{Result, TranslateError};
use crate::translator::field_path_ref;

/// Accumulator of one call plus the expression that finishes it after the
/// `$group`, if any
struct Accumulator {
    group: Value,
    finish: Option<Value>,
}

/// `$group` keyed by the grouped columns, followed by an `$addFields`
/// lifting the keys out of `_id` and finishing distinct accumulators.
pub fn apply(input: Fragment, group: &[usize], calls: &[AggCall], node: &RelNode) -> Result<Fragment> {
    let names = unique_names(node.row_type.names(), &["_id"]);
    if names.len() != group.len() + calls.len() {
        return Err(TranslateError::SchemaInconsistency(format!(
            "aggregate has {} output columns for {} keys and {} calls",
            names.len(),
            group.len(),
            calls.len()
        )));
    }
    let (key_names, call_names) = names.split_at(group.len());

    let mut id = Map::new();
    for (&column, name) in group.iter().zip(key_names) {
        id.insert(name.clone(), field_path_ref(input.bindings.field(column)?));
    }

    let mut group_doc = Map::new();
    group_doc.insert("_id".to_string(), Value::Object(id));
    let mut post = Map::new();
    for name in key_names {
        post.insert(name.clone(), json!(format!("$_id.{}", name)));
    }
    for (call, name) in calls.iter().zip(call_names) {
        let acc = accumulator(call, name, &input.bindings)?;
        group_doc.insert(name.clone(), acc.group);
        if let Some(finish) = acc.finish {
            post.insert(name.clone(), finish);
        }
    }

    let Fragment { mut stages, bindings } = input;
    stages.push(json!({ "$group": group_doc }));
    if !post.is_empty() {
        stages.push(json!({ "$addFields": post }));
    }
    Ok(Fragment::new(
        stages,
        Bindings {
            fields: names,
            ..bindings
        },
    ))
}

fn accumulator(call: &AggCall, name: &str, bindings: &Bindings) -> Result<Accumulator> {
    let args = call
        .args
        .iter()
        .map(|&i| bindings.field(i).map(field_path_ref))
        .collect::<Result<Vec<_>>>()?;
    let unsupported = || TranslateError::unsupported(call.func.name(), call);

    if call.distinct {
        let [arg] = args.as_slice() else {
            return Err(unsupported());
        };
        let set = format!("${}", name);
        let finish = match call.func {
            AggFunction::Count => json!({ "$size": { "$filter": {
                "input": set,
                "as": "v",
                "cond": { "$gt": ["$$v", null] }
            } } }),
            AggFunction::Sum | AggFunction::Sum0 => json!({ "$sum": set }),
            AggFunction::Avg => json!({ "$avg": set }),
            // duplicates cannot change these
            AggFunction::Min => return simple("$min", arg),
            AggFunction::Max => return simple("$max", arg),
            AggFunction::AnyValue => return simple("$first", arg),
            AggFunction::Function(_) => return Err(unsupported()),
        };
        return Ok(Accumulator {
            group: json!({ "$addToSet": arg }),
            finish: Some(finish),
        });
    }

    match (&call.func, args.as_slice()) {
        (AggFunction::Count, []) => Ok(Accumulator {
            group: json!({ "$sum": 1 }),
            finish: None,
        }),
        (AggFunction::Count, [arg]) => Ok(Accumulator {
            group: json!({ "$sum": { "$cond": [{ "$gt": [arg, null] }, 1, 0] } }),
            finish: None,
        }),
        (AggFunction::Count, args) => {
            let guards: Vec<Value> = args.iter().map(|a| json!({ "$gt": [a, null] })).collect();
            Ok(Accumulator {
                group: json!({ "$sum": { "$cond": [{ "$and": guards }, 1, 0] } }),
                finish: None,
            })
        }
        (AggFunction::Sum | AggFunction::Sum0, [arg]) => simple("$sum", arg),
        (AggFunction::Avg, [arg]) => simple("$avg", arg),
        (AggFunction::Min, [arg]) => simple("$min", arg),
        (AggFunction::Max, [arg]) => simple("$max", arg),
        (AggFunction::AnyValue, [arg]) => simple("$first", arg),
        _ => Err(unsupported()),
    }
}

fn simple(op: &str, arg: &Value) -> Result<Accumulator> {
    Ok(Accumulator {
        group: json!({ op: arg }),
        finish: None,
    })
}
