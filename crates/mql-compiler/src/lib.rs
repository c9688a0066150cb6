//! SQL plan to aggregation pipeline compiler
//!
//! Walks a [`mql_plan::QueryPlan`] bottom-up against a flattened
//! [`mql_schema::Schema`] and emits the pipeline stages that compute the
//! plan's rows inside the document database.
//!
//! ```no_run
//! use std::sync::Arc;
//! use mql_compiler::{CompileOptions, QueryCompiler};
//! use mql_plan::QueryPlan;
//! use mql_schema::SchemaDescription;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = SchemaDescription::from_path("schema.yaml")?.build()?;
//! let plan = QueryPlan::from_json(&std::fs::read_to_string("plan.json")?)?;
//!
//! let compiler = QueryCompiler::new(Arc::new(schema));
//! let context = compiler.compile(&plan, &CompileOptions::with_max_rows(1000))?;
//! println!("{}", serde_json::to_string_pretty(&context.pipeline())?);
//! # Ok(())
//! # }
//! ```

pub mod bindings;
pub mod compiler;
pub mod context;
pub mod convention;
pub mod datetime;
pub mod error;
pub mod fold;
pub mod literal;
pub mod operators;
pub mod rules;
pub mod translator;

pub use bindings::Bindings;
pub use compiler::{CompilationState, CompileOptions, QueryCompiler};
pub use context::{ColumnMetadata, MqlQueryContext};
pub use convention::{analyze, cheapest, require_pushdown, Convention, Cost, NodeAnalysis, PlanAnalysis};
pub use error::{CompileError, JoinRejection, TranslateError};
pub use operators::{Handler, OperatorTable};
pub use translator::ExprTranslator;
