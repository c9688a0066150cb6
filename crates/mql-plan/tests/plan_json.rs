//! Plans exchanged as JSON documents
//!
//! Run with: cargo test --package mql-plan --test plan_json

use mql_plan::{
    AggCall, AggFunction, Expr, Field, JoinType, Literal, Operator, PlanBuilder, QueryPlan,
    RelKind, RowType, SchemaProvider, SortKey, SqlType, TimeUnit,
};

struct Catalog;

impl SchemaProvider for Catalog {
    fn get_table_schema(&self, table_name: &str) -> Result<RowType, String> {
        match table_name {
            "t" => Ok(RowType::new(vec![
                Field::new("_id", SqlType::ObjectId, false),
                Field::new("f", SqlType::Integer, true),
            ])),
            other => Err(format!("Table '{}' not found", other)),
        }
    }
}

const FILTER_PLAN: &str = r#"{
    "sql": "SELECT * FROM t WHERE f > 0",
    "root": {
        "rel": "filter",
        "row_type": [
            {"name": "_id", "sql_type": "object_id", "nullable": false},
            {"name": "f", "sql_type": "integer"}
        ],
        "input": {
            "rel": "scan",
            "table": "t",
            "row_type": [
                {"name": "_id", "sql_type": "object_id", "nullable": false},
                {"name": "f", "sql_type": "integer"}
            ]
        },
        "condition": {
            "type": "call",
            "op": "greater_than",
            "operands": [
                {"type": "input_ref", "index": 1},
                {"type": "literal", "value": {"kind": "integer", "value": 0}}
            ]
        }
    }
}"#;

#[test]
fn test_parse_filter_plan() {
    let plan = QueryPlan::from_json(FILTER_PLAN).expect("plan should parse");

    assert_eq!(plan.sql.as_deref(), Some("SELECT * FROM t WHERE f > 0"));
    match &plan.root.kind {
        RelKind::Filter { input, condition } => {
            assert_eq!(input.kind_name(), "Scan");
            assert_eq!(condition.to_string(), ">($1, 0)");
        }
        other => panic!("expected filter, got {:?}", other),
    }
    // nullable defaults to true when omitted
    assert!(plan.root.row_type.fields[1].nullable);
}

#[test]
fn test_builder_matches_json() {
    let catalog = Catalog;
    let builder = PlanBuilder::new(&catalog);

    let scan = builder.scan("t").unwrap();
    let filter = builder
        .filter(scan, Expr::gt(Expr::input(1), Expr::int(0)))
        .unwrap();
    let built = builder.build(filter).with_sql("SELECT * FROM t WHERE f > 0");

    let parsed = QueryPlan::from_json(FILTER_PLAN).unwrap();
    assert_eq!(built, parsed);
    assert_eq!(built.fingerprint(), parsed.fingerprint());
}

#[test]
fn test_fingerprint_changes_with_plan() {
    let catalog = Catalog;
    let builder = PlanBuilder::new(&catalog);

    let a = builder
        .filter(builder.scan("t").unwrap(), Expr::gt(Expr::input(1), Expr::int(0)))
        .unwrap();
    let b = builder
        .filter(builder.scan("t").unwrap(), Expr::gt(Expr::input(1), Expr::int(1)))
        .unwrap();

    let fp_a = builder.build(a).fingerprint();
    let fp_b = builder.build(b).fingerprint();
    println!("fingerprints: {} / {}", fp_a, fp_b);
    assert_ne!(fp_a, fp_b);
    assert_eq!(fp_a.len(), 64);
}

#[test]
fn test_round_trip_every_node_kind() {
    let catalog = Catalog;
    let builder = PlanBuilder::new(&catalog);

    let join = builder
        .join(
            builder.scan("t").unwrap(),
            builder.scan("t").unwrap(),
            JoinType::Inner,
            Expr::eq(Expr::input(0), Expr::input(2)),
        )
        .unwrap();
    let project = builder
        .project(
            join,
            vec![
                Expr::input(1),
                Expr::call(
                    Operator::Cast { to: SqlType::Varchar },
                    vec![Expr::input(3)],
                ),
                Expr::call(
                    Operator::Extract,
                    vec![
                        Expr::literal(Literal::Symbol(TimeUnit::Year)),
                        Expr::literal(Literal::Date("2024-03-01".into())),
                    ],
                ),
            ],
            &["f", "f_text", "y"],
        )
        .unwrap();
    let agg = builder
        .aggregate(
            project,
            vec![1],
            vec![AggCall::distinct(AggFunction::Count, vec![0])],
        )
        .unwrap();
    let sorted = builder.sort(agg, vec![SortKey::desc(1)], Some(5), Some(10)).unwrap();
    let union = builder.union_all(vec![sorted.clone(), sorted]).unwrap();

    let plan = builder.build(union);
    let json = serde_json::to_string_pretty(&plan).unwrap();
    let parsed = QueryPlan::from_json(&json).unwrap();

    assert_eq!(plan, parsed);
    assert_eq!(parsed.root.node_count(), 13);
}
