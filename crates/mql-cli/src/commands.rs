//! Subcommand implementations, kept free of I/O beyond file loading so
//! they can be tested directly

use std::path::Path;

use anyhow::Context;
use mql_compiler::{analyze, CompileOptions, OperatorTable, QueryCompiler};
use mql_plan::QueryPlan;
use mql_schema::{PathMode, Schema, SchemaColumn, SchemaDescription, SchemaTable, TableKind};
use serde_json::json;
use tracing::info;

pub fn load_schema(path: &Path) -> anyhow::Result<Schema> {
    let description = SchemaDescription::from_path(path)
        .with_context(|| format!("Failed to load schema description '{}'", path.display()))?;
    let schema = description
        .build()
        .with_context(|| format!("Invalid schema description '{}'", path.display()))?;
    info!(path = %path.display(), tables = schema.len(), "Loaded schema");
    Ok(schema)
}

pub fn load_plan(path: &Path) -> anyhow::Result<QueryPlan> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read plan '{}'", path.display()))?;
    let plan = QueryPlan::from_json(&text).with_context(|| format!("Invalid plan '{}'", path.display()))?;
    info!(path = %path.display(), fingerprint = %plan.fingerprint(), "Loaded plan");
    Ok(plan)
}

/// The compiled query context as JSON text
pub fn compile(compiler: &QueryCompiler, plan: &QueryPlan, options: &CompileOptions, pretty: bool) -> anyhow::Result<String> {
    let context = compiler.compile(plan, options)?;
    let mut output = context.to_json();
    output["fingerprint"] = json!(context.fingerprint());

    let text = if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    Ok(text)
}

/// Push-down analysis of every plan node as JSON text
pub fn explain(operators: &OperatorTable, plan: &QueryPlan) -> anyhow::Result<String> {
    let analysis = analyze(operators, &plan.root);
    let output = json!({
        "pushed_down": analysis.is_pushed_down(),
        "cost": analysis.cost(),
        "rejection": analysis.first_rejection().map(|e| e.to_string()),
        "nodes": analysis.nodes,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Markdown listing of every table and column
pub fn tables_markdown(schema: &Schema) -> String {
    let mut md = String::new();

    md.push_str("# Schema\n\n");
    md.push_str(&format!("**Tables:** {}\n\n", schema.len()));

    for table in schema.tables() {
        md.push_str(&format!("## Table: `{}`\n\n", table.name));
        md.push_str(&format!("**Collection:** `{}`\n\n", table.collection));
        md.push_str(&format!("**Kind:** {}\n\n", kind_label(table)));

        md.push_str("| Column | Type | Nullable | Key | Field |\n");
        md.push_str("|--------|------|----------|-----|-------|\n");
        for column in table.columns() {
            let nullable = if column.nullable { "✓" } else { "" };
            md.push_str(&format!(
                "| `{}` | {} | {} | {} | {} |\n",
                column.name,
                column.bson_type,
                nullable,
                key_label(column),
                field_label(column)
            ));
        }
        md.push('\n');
    }

    md
}

fn kind_label(table: &SchemaTable) -> String {
    match &table.kind {
        TableKind::Base => "base".to_string(),
        TableKind::Document { path } => format!("document at `{}`", path),
        TableKind::Array { path, level } => format!("array at `{}` (level {})", path, level),
    }
}

fn key_label(column: &SchemaColumn) -> String {
    match (column.primary_key, column.foreign_key) {
        (0, 0) => String::new(),
        (pk, 0) => format!("PK {}", pk),
        (0, fk) => format!("FK {}", fk),
        (pk, fk) => format!("PK {} / FK {}", pk, fk),
    }
}

fn field_label(column: &SchemaColumn) -> String {
    match column.path(PathMode::Original) {
        "" => "".to_string(),
        path => format!("`{}`", path),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mql_plan::{Expr, PlanBuilder};

    use super::*;

    const SCHEMA: &str = r#"
collections:
  - name: orders
    fields:
      total: int
      items:
        array:
          sku: string
"#;

    fn schema() -> Schema {
        SchemaDescription::from_yaml(SCHEMA).unwrap().build().unwrap()
    }

    fn temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mqlc_{}_{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_tables_markdown() {
        let md = tables_markdown(&schema());

        assert!(md.starts_with("# Schema\n\n**Tables:** 2\n\n"));
        assert!(md.contains("## Table: `orders_items`\n\n**Collection:** `orders`\n\n**Kind:** array at `items` (level 0)"));
        assert!(md.contains("| `_id` | objectId |  | PK 1 | `_id` |"));
        assert!(md.contains("| `array_index_lvl_0` | long |  | PK 2 |  |"));
        assert!(md.contains("| `_id` | objectId |  | PK 1 / FK 1 |  |"));
        assert!(md.contains("| `sku` | string | ✓ |  | `sku` |"));
    }

    #[test]
    fn test_compile_output() {
        let schema = schema();
        let b = PlanBuilder::new(&schema);
        let plan = b.build(b.filter(b.scan("orders").unwrap(), Expr::gt(Expr::input(1), Expr::int(5))).unwrap());
        let compiler = QueryCompiler::new(Arc::new(schema));

        let text = compile(&compiler, &plan, &CompileOptions::with_max_rows(10), false).unwrap();
        let output: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(output["collection"], "orders");
        assert_eq!(output["pipeline"].as_array().unwrap().len(), 4);
        assert_eq!(output["pipeline"][3], json!({"$limit": 10}));
        assert_eq!(output["columns"][1]["name"], "total");
        assert_eq!(output["fingerprint"].as_str().unwrap().len(), 64);
        assert!(!text.contains('\n'));
    }

    #[test]
    fn test_explain_reports_rejection() {
        let schema = schema();
        let b = PlanBuilder::new(&schema);
        let unknown = Expr::call(mql_plan::Operator::Function("SOUNDEX".into()), vec![Expr::input(1)]);
        let plan = b.build(b.filter(b.scan("orders").unwrap(), unknown).unwrap());

        let output: serde_json::Value =
            serde_json::from_str(&explain(&OperatorTable::standard(), &plan).unwrap()).unwrap();
        assert_eq!(output["pushed_down"], false);
        assert_eq!(output["rejection"], "Unsupported expression SOUNDEX: SOUNDEX($1)");
        assert_eq!(output["nodes"][0]["convention"], "mongo");
        assert_eq!(output["nodes"][1]["convention"], "enumerable");
    }

    #[test]
    fn test_load_files() {
        let schema_path = temp_file("schema.yaml", SCHEMA);
        let schema = load_schema(&schema_path).unwrap();
        assert!(schema.table("orders_items").is_ok());

        let b = PlanBuilder::new(&schema);
        let plan = b.build(b.scan("orders").unwrap());
        let plan_path = temp_file("plan.json", &serde_json::to_string(&plan).unwrap());
        assert_eq!(load_plan(&plan_path).unwrap(), plan);

        let broken = temp_file("broken.json", "{");
        let err = load_plan(&broken).unwrap_err();
        assert!(err.to_string().starts_with("Invalid plan"));

        for path in [schema_path, plan_path, broken] {
            std::fs::remove_file(path).ok();
        }
    }
}
