use mql_plan::{Expr, RelNode};
use serde_json::{json, Map};

use super::{unique_names, Fragment, RuleContext};
use crate::bindings::Bindings;
use crate::error::Result;
use crate::translator::field_path_ref;

/// Computes the output columns of `node` into top-level fields named
/// after its row type. Outputs that already sit under their own name need
/// no entry; when none need one no stage is emitted.
pub fn apply(ctx: &RuleContext<'_>, input: Fragment, exprs: &[Expr], node: &RelNode) -> Result<Fragment> {
    let names = unique_names(node.row_type.names(), &[]);
    let translator = ctx.translator(&input.bindings.fields);

    let mut entries = Map::new();
    for (expr, name) in exprs.iter().zip(&names) {
        match expr.as_input_ref() {
            Some(index) => {
                let source = input.bindings.field(index)?;
                if source != name {
                    entries.insert(name.clone(), field_path_ref(source));
                }
            }
            None => {
                entries.insert(name.clone(), translator.translate(expr)?);
            }
        }
    }

    let Fragment { mut stages, bindings } = input;
    if !entries.is_empty() {
        stages.push(json!({ "$addFields": entries }));
    }
    Ok(Fragment::new(
        stages,
        Bindings {
            fields: names,
            ..bindings
        },
    ))
}

/// Rebinds `input` to the columns a projection of plain references picks
pub fn rebind(input: Fragment, exprs: &[Expr]) -> Option<Result<Fragment>> {
    let indexes: Option<Vec<usize>> = exprs.iter().map(Expr::as_input_ref).collect();
    let indexes = indexes?;

    let fields = indexes
        .into_iter()
        .map(|i| input.bindings.field(i).map(str::to_string))
        .collect::<Result<Vec<_>>>();
    Some(fields.map(|fields| {
        Fragment::new(
            input.stages,
            Bindings {
                fields,
                ..input.bindings
            },
        )
    }))
}
