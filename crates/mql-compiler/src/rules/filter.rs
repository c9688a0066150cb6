use mql_plan::Expr;
use serde_json::json;
use tracing::debug;

use super::{Fragment, RuleContext};
use crate::error::Result;
use crate::fold::fold_constant;

/// Keeps the rows of `input` satisfying `condition`.
///
/// The condition is computed once into a flag field, matched on and
/// projected away again. A condition that folds to true emits nothing.
pub fn apply(ctx: &RuleContext<'_>, input: Fragment, condition: &Expr) -> Result<Fragment> {
    if fold_constant(condition) == Some(true) {
        debug!(%condition, "Dropped constant-true filter");
        return Ok(input);
    }

    let predicate = ctx.translator(&input.bindings.fields).translate(condition)?;
    let flag = format!("__filter_{}", ctx.next_id());

    let Fragment {
        mut stages,
        bindings,
    } = input;
    stages.push(json!({ "$addFields": { flag.clone(): predicate } }));
    stages.push(json!({ "$match": { flag.clone(): true } }));
    stages.push(json!({ "$project": { flag: 0 } }));
    Ok(Fragment::new(stages, bindings))
}
