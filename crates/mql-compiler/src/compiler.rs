//! Compilation driver

use std::fmt;
use std::sync::Arc;

use mql_plan::QueryPlan;
use mql_schema::Schema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, info_span};
use uuid::Uuid;

use crate::bindings::source_collection;
use crate::context::{ColumnMetadata, MqlQueryContext};
use crate::convention::require_pushdown;
use crate::error::{CompileError, Result};
use crate::operators::OperatorTable;
use crate::rules::{self, join, RuleContext};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    /// Cap on returned rows, 0 for none
    #[serde(default)]
    pub max_rows: u64,
}

impl CompileOptions {
    pub fn with_max_rows(max_rows: u64) -> Self {
        Self { max_rows }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationState {
    Validating,
    TranslatingOperators,
    Assembled,
    Rejected,
}

impl fmt::Display for CompilationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompilationState::Validating => "validating",
            CompilationState::TranslatingOperators => "translating_operators",
            CompilationState::Assembled => "assembled",
            CompilationState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Compiles plans against one schema. Cheap to clone and safe to share
/// between threads.
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    schema: Arc<Schema>,
    operators: Arc<OperatorTable>,
}

impl QueryCompiler {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            operators: OperatorTable::shared(),
        }
    }

    pub fn with_operators(schema: Arc<Schema>, operators: Arc<OperatorTable>) -> Self {
        Self { schema, operators }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn compile(&self, plan: &QueryPlan, options: &CompileOptions) -> std::result::Result<MqlQueryContext, CompileError> {
        let id = Uuid::new_v4();
        let span = info_span!("compile", %id);
        let _guard = span.enter();

        let mut state = CompilationState::Validating;
        debug!(%state, nodes = plan.root.node_count(), "Compilation started");

        match self.run(plan, options, &mut state) {
            Ok(context) => {
                transition(&mut state, CompilationState::Assembled);
                info!(
                    collection = context.collection(),
                    stages = context.stages().len(),
                    "Compiled plan"
                );
                Ok(context)
            }
            Err(kind) => {
                let failed_in = state;
                transition(&mut state, CompilationState::Rejected);
                info!(%failed_in, error = %kind, "Rejected plan");
                Err(CompileError::new(kind, plan.sql.clone()))
            }
        }
    }

    fn run(&self, plan: &QueryPlan, options: &CompileOptions, state: &mut CompilationState) -> Result<MqlQueryContext> {
        let root = &plan.root;
        join::validate_joins(&self.schema, root)?;
        require_pushdown(&self.operators, root)?;

        transition(state, CompilationState::TranslatingOperators);
        let ctx = RuleContext::new(&self.schema, &self.operators);
        let fragment = rules::convert(&ctx, root)?;
        let collection = source_collection(&self.schema, root)?.to_string();

        let mut stages = fragment.stages;
        if options.max_rows > 0 && root.requested_limit().map_or(true, |n| n > options.max_rows) {
            stages.push(json!({ "$limit": options.max_rows }));
        }

        Ok(MqlQueryContext::new(
            collection,
            ColumnMetadata::from_row_type(&root.row_type),
            stages,
            fragment.bindings.fields,
        ))
    }
}

fn transition(state: &mut CompilationState, next: CompilationState) {
    debug!(from = %state, to = %next, "Compilation state");
    *state = next;
}
