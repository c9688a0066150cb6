//! Relational view of document collections
//!
//! Each collection flattens into one base table plus one virtual table per
//! nested document or array. The resulting `Schema` is immutable and meant
//! to be shared (`Arc<Schema>`) by every compilation that runs against it.

mod bson_type;
mod builder;
mod column;
mod description;
mod error;
mod schema;
mod table;

pub use bson_type::BsonType;
pub use builder::{CollectionBuilder, SchemaBuilder, Shape};
pub use column::{array_index_field, display_name, PathMode, SchemaColumn};
pub use description::{ArrayDescription, CollectionDescription, SchemaDescription, ShapeDescription};
pub use error::{Result, SchemaError};
pub use schema::Schema;
pub use table::{SchemaTable, TableId, TableKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_schema_is_shareable() {
        assert_send_sync::<Schema>();
    }
}
