use mql_plan::SortKey;
use serde_json::{json, Map};

use super::Fragment;
use crate::error::{Result, TranslateError};
use crate::translator::is_plain_path;

/// `$sort`, then `$skip` for the offset and `$limit` for the fetch
pub fn apply(input: Fragment, keys: &[SortKey], offset: Option<u64>, fetch: Option<u64>) -> Result<Fragment> {
    let Fragment { mut stages, bindings } = input;

    let mut sort = Map::new();
    for key in keys {
        let path = bindings.field(key.field)?;
        if !is_plain_path(path) {
            return Err(TranslateError::UnsupportedQueryShape(format!(
                "sort key ${} is bound to '{}', which is not a sortable field path",
                key.field, path
            )));
        }
        // a repeated key cannot change the order
        if !sort.contains_key(path) {
            sort.insert(path.to_string(), json!(if key.desc { -1 } else { 1 }));
        }
    }
    if !sort.is_empty() {
        stages.push(json!({ "$sort": sort }));
    }

    if let Some(offset) = offset.filter(|n| *n > 0) {
        stages.push(json!({ "$skip": offset }));
    }
    match fetch {
        Some(0) => stages.push(json!({ "$match": { "$expr": false } })),
        Some(n) => stages.push(json!({ "$limit": n })),
        None => {}
    }

    Ok(Fragment::new(stages, bindings))
}
