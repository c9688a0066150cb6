//! Shared fixture: an `orders` collection with an embedded address and an
//! items array, plus a separate `customers` collection.
//!
//! Flattened tables and their columns:
//!
//! | table               | columns                                              |
//! |---------------------|------------------------------------------------------|
//! | orders              | _id, customer_id, total, status                      |
//! | orders_address      | _id, city                                            |
//! | orders_items        | _id, array_index_lvl_0, sku, qty                     |
//! | orders_items_tags   | _id, array_index_lvl_0, array_index_lvl_1, value     |
//! | customers           | _id, name, tier                                      |

#![allow(dead_code)]

use std::sync::Arc;

use mql_compiler::{CompileOptions, MqlQueryContext, QueryCompiler};
use mql_compiler::CompileError;
use mql_plan::QueryPlan;
use mql_schema::{BsonType, Schema, SchemaBuilder};

pub fn shop() -> Schema {
    let mut builder = SchemaBuilder::new();
    builder
        .collection("orders", |c| {
            c.field("customer_id", BsonType::String)
                .field("total", BsonType::Int32)
                .field("status", BsonType::String)
                .document("address", |d| {
                    d.field("city", BsonType::String);
                })
                .array("items", |i| {
                    i.field("sku", BsonType::String)
                        .field("qty", BsonType::Int32)
                        .scalar_array("tags", BsonType::String);
                });
        })
        .collection("customers", |c| {
            c.field("name", BsonType::String).field("tier", BsonType::String);
        });
    builder.build().expect("fixture schema should build")
}

pub fn compiler() -> QueryCompiler {
    QueryCompiler::new(Arc::new(shop()))
}

pub fn compile(plan: &QueryPlan) -> Result<MqlQueryContext, CompileError> {
    compiler().compile(plan, &CompileOptions::default())
}
