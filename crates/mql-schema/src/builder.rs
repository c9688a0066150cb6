//! Flattening of collection shapes into base and virtual tables
//!
//! A collection is described by the shape of its documents. Scalars become
//! columns of the table that owns them; every nested document or array
//! becomes a virtual table named `<parent>_<field>`. Virtual tables carry a
//! copy of their parent's primary key as foreign key, and array tables add
//! a generated `array_index_lvl_<n>` key column holding the element index.

use indexmap::IndexMap;
use tracing::debug;

use crate::bson_type::BsonType;
use crate::column::SchemaColumn;
use crate::error::Result;
use crate::schema::Schema;
use crate::table::{SchemaTable, TableId, TableKind};

/// Observed shape of a document field
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Scalar(BsonType),
    Document(IndexMap<String, Shape>),
    Array(Box<Shape>),
}

impl Shape {
    /// Combine two observations of the same field
    pub fn merge(self, other: Shape) -> Shape {
        match (self, other) {
            (Shape::Scalar(a), Shape::Scalar(b)) => Shape::Scalar(a.promote(b)),
            (Shape::Scalar(BsonType::Null), shape) | (shape, Shape::Scalar(BsonType::Null)) => shape,
            (Shape::Document(mut a), Shape::Document(b)) => {
                for (name, shape) in b {
                    merge_field(&mut a, name, shape);
                }
                Shape::Document(a)
            }
            (Shape::Array(a), Shape::Array(b)) => match (*a, *b) {
                (Shape::Scalar(x), Shape::Scalar(y)) => {
                    Shape::Array(Box::new(Shape::Scalar(x.promote(y))))
                }
                (x @ Shape::Document(_), y @ Shape::Document(_))
                | (x @ Shape::Array(_), y @ Shape::Array(_)) => Shape::Array(Box::new(x.merge(y))),
                (Shape::Scalar(BsonType::Null), shape) | (shape, Shape::Scalar(BsonType::Null)) => {
                    Shape::Array(Box::new(shape))
                }
                _ => Shape::Array(Box::new(Shape::Scalar(BsonType::String))),
            },
            _ => Shape::Scalar(BsonType::String),
        }
    }
}

fn merge_field(fields: &mut IndexMap<String, Shape>, name: String, shape: Shape) {
    match fields.get_mut(&name) {
        Some(existing) => {
            let seen = std::mem::replace(existing, Shape::Scalar(BsonType::Null));
            *existing = seen.merge(shape);
        }
        None => {
            fields.insert(name, shape);
        }
    }
}

/// Accumulates field observations for one document level
#[derive(Debug, Clone, Default)]
pub struct CollectionBuilder {
    fields: IndexMap<String, Shape>,
}

impl CollectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, name: &str, shape: Shape) -> &mut Self {
        merge_field(&mut self.fields, name.to_string(), shape);
        self
    }

    pub fn field(&mut self, name: &str, bson_type: BsonType) -> &mut Self {
        self.observe(name, Shape::Scalar(bson_type))
    }

    pub fn document(&mut self, name: &str, build: impl FnOnce(&mut CollectionBuilder)) -> &mut Self {
        let mut nested = CollectionBuilder::new();
        build(&mut nested);
        self.observe(name, Shape::Document(nested.fields))
    }

    /// Array of documents
    pub fn array(&mut self, name: &str, build: impl FnOnce(&mut CollectionBuilder)) -> &mut Self {
        let mut nested = CollectionBuilder::new();
        build(&mut nested);
        self.observe(name, Shape::Array(Box::new(Shape::Document(nested.fields))))
    }

    pub fn scalar_array(&mut self, name: &str, bson_type: BsonType) -> &mut Self {
        self.observe(name, Shape::Array(Box::new(Shape::Scalar(bson_type))))
    }

    pub fn into_shape(self) -> IndexMap<String, Shape> {
        self.fields
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    collections: IndexMap<String, IndexMap<String, Shape>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&mut self, name: &str, build: impl FnOnce(&mut CollectionBuilder)) -> &mut Self {
        let mut collection = CollectionBuilder::new();
        build(&mut collection);
        self.collection_shape(name, collection.fields)
    }

    /// Add an already observed shape; repeated collections merge
    pub fn collection_shape(&mut self, name: &str, fields: IndexMap<String, Shape>) -> &mut Self {
        let entry = self.collections.entry(name.to_string()).or_default();
        for (field, shape) in fields {
            merge_field(entry, field, shape);
        }
        self
    }

    pub fn build(&self) -> Result<Schema> {
        let mut flattener = Flattener::default();
        for (name, fields) in &self.collections {
            flattener.collection(name, fields);
        }
        debug!(
            collections = self.collections.len(),
            tables = flattener.tables.len(),
            "Flattened collection shapes"
        );
        Schema::from_tables(flattener.tables)
    }
}

#[derive(Default)]
struct Flattener {
    tables: Vec<SchemaTable>,
}

impl Flattener {
    fn unique_table_name(&self, wanted: &str) -> String {
        let taken = |name: &str| self.tables.iter().any(|t| t.name == name);
        if !taken(wanted) {
            return wanted.to_string();
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", wanted, n);
            if !taken(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    fn push(&mut self, mut table: SchemaTable) -> TableId {
        let id = TableId(self.tables.len());
        table.id = id;
        table.order_columns();
        self.tables.push(table);
        id
    }

    fn collection(&mut self, name: &str, fields: &IndexMap<String, Shape>) {
        let id_type = match fields.get("_id") {
            Some(Shape::Scalar(BsonType::Null)) | None => BsonType::ObjectId,
            Some(Shape::Scalar(t)) => *t,
            Some(_) => BsonType::String,
        };
        let mut id = SchemaColumn::data("_id", "_id", "_id", id_type);
        id.primary_key = 1;
        id.nullable = false;

        let mut table = SchemaTable {
            id: TableId(0),
            name: self.unique_table_name(name),
            collection: name.to_string(),
            kind: TableKind::Base,
            parent: None,
            columns: IndexMap::new(),
        };
        table.columns.insert(id.name.clone(), id);

        let nested = add_scalars(&mut table, fields, "", true);
        let table_name = table.name.clone();
        let parent = self.push(table);
        self.nested(parent, &table_name, name, "", 0, nested);
    }

    fn nested(
        &mut self,
        parent: TableId,
        parent_name: &str,
        collection: &str,
        prefix: &str,
        level: usize,
        fields: Vec<(String, Shape)>,
    ) {
        for (field, shape) in fields {
            let path = join_path(prefix, &field);
            let name = format!("{}_{}", parent_name, field);
            self.virtual_table(parent, &name, collection, path, level, shape);
        }
    }

    /// `level` counts the arrays already unwound above this table
    fn virtual_table(
        &mut self,
        parent: TableId,
        name: &str,
        collection: &str,
        path: String,
        level: usize,
        shape: Shape,
    ) {
        let parent_keys: Vec<SchemaColumn> = self.tables[parent.0]
            .primary_key()
            .into_iter()
            .cloned()
            .collect();

        let kind = match &shape {
            Shape::Array(_) => TableKind::Array {
                path: path.clone(),
                level,
            },
            _ => TableKind::Document { path: path.clone() },
        };

        let mut table = SchemaTable {
            id: TableId(0),
            name: self.unique_table_name(name),
            collection: collection.to_string(),
            kind,
            parent: Some(parent),
            columns: IndexMap::new(),
        };
        for (i, key) in parent_keys.iter().enumerate() {
            let col = SchemaColumn::inherited_key(key, i + 1);
            table.columns.insert(col.name.clone(), col);
        }

        let (nested, child_level) = match shape {
            Shape::Document(fields) => (add_scalars(&mut table, &fields, &path, false), level),
            Shape::Array(element) => {
                let index = SchemaColumn::array_index(level, parent_keys.len() + 1);
                table.columns.insert(index.name.clone(), index);
                match *element {
                    Shape::Scalar(bson_type) => {
                        insert_unique(&mut table, SchemaColumn::data("value", "", path.clone(), bson_type));
                        (vec![], level + 1)
                    }
                    Shape::Document(fields) => {
                        (add_scalars(&mut table, &fields, &path, false), level + 1)
                    }
                    // array of arrays: the element itself is unwound again
                    inner @ Shape::Array(_) => (vec![(String::new(), inner)], level + 1),
                }
            }
            Shape::Scalar(_) => (vec![], level),
        };

        let table_name = table.name.clone();
        let id = self.push(table);
        for (field, shape) in nested {
            if field.is_empty() {
                let name = format!("{}_value", table_name);
                self.virtual_table(id, &name, collection, path.clone(), child_level, shape);
            } else {
                self.nested(id, &table_name, collection, &path, child_level, vec![(field, shape)]);
            }
        }
    }
}

/// Add scalar fields as columns and return the fields that become tables
fn add_scalars(
    table: &mut SchemaTable,
    fields: &IndexMap<String, Shape>,
    prefix: &str,
    skip_id: bool,
) -> Vec<(String, Shape)> {
    let mut nested = Vec::new();
    for (field, shape) in fields {
        if skip_id && field == "_id" {
            continue;
        }
        match shape {
            Shape::Scalar(bson_type) => {
                let col = SchemaColumn::data(field, field.clone(), join_path(prefix, field), *bson_type);
                insert_unique(table, col);
            }
            other => nested.push((field.clone(), other.clone())),
        }
    }
    nested
}

fn insert_unique(table: &mut SchemaTable, mut col: SchemaColumn) {
    if table.columns.contains_key(&col.name) {
        let base = col.name.clone();
        let mut n = 0;
        while table.columns.contains_key(&col.name) {
            col.name = format!("{}_{}", base, n);
            n += 1;
        }
    }
    table.columns.insert(col.name.clone(), col);
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::PathMode;

    fn orders() -> Schema {
        let mut builder = SchemaBuilder::new();
        builder.collection("orders", |c| {
            c.field("total", BsonType::Int32)
                .field("status", BsonType::String)
                .document("address", |d| {
                    d.field("city", BsonType::String);
                })
                .array("items", |i| {
                    i.field("sku", BsonType::String)
                        .field("qty", BsonType::Int32)
                        .scalar_array("tags", BsonType::String);
                })
                .field("total", BsonType::Double);
        });
        builder.build().unwrap()
    }

    #[test]
    fn test_table_names_and_kinds() {
        let schema = orders();
        let names: Vec<&str> = schema.tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "orders_address", "orders_items", "orders_items_tags"]);

        let tags = schema.table("orders_items_tags").unwrap();
        assert_eq!(
            tags.kind,
            TableKind::Array {
                path: "items.tags".to_string(),
                level: 1
            }
        );
        assert_eq!(schema.unwind_chain("orders_items_tags").unwrap(), vec!["items", "items.tags"]);
    }

    #[test]
    fn test_base_columns_promoted_in_place() {
        let schema = orders();
        let base = schema.table("orders").unwrap();
        let names: Vec<&str> = base.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "total", "status"]);
        assert_eq!(base.column("total").unwrap().bson_type, BsonType::Double);
    }

    #[test]
    fn test_array_table_keys() {
        let schema = orders();
        let items = schema.table("orders_items").unwrap();

        let names: Vec<&str> = items.columns().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["_id", "array_index_lvl_0", "sku", "qty"]);

        let id = items.column("_id").unwrap();
        assert_eq!((id.primary_key, id.foreign_key), (1, 1));
        let index = items.column("array_index_lvl_0").unwrap();
        assert!(index.generated);
        assert_eq!(index.primary_key, 2);
        assert_eq!(items.column("sku").unwrap().path(PathMode::Resolved), "items.sku");
        assert_eq!(items.column("sku").unwrap().path(PathMode::Original), "sku");

        let tags = schema.table("orders_items_tags").unwrap();
        let fk: Vec<&str> = tags.foreign_key().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(fk, vec!["_id", "array_index_lvl_0"]);
        assert_eq!(tags.column("value").unwrap().resolved_path, "items.tags");
        assert_eq!(tags.column("array_index_lvl_1").unwrap().primary_key, 3);
    }

    #[test]
    fn test_ancestry() {
        let schema = orders();
        let base = schema.table("orders").unwrap().id;
        let items = schema.table("orders_items").unwrap().id;
        let tags = schema.table("orders_items_tags").unwrap().id;
        let address = schema.table("orders_address").unwrap().id;

        assert!(schema.is_ancestor(base, tags));
        assert!(schema.is_ancestor(items, tags));
        assert!(!schema.is_ancestor(tags, items));
        assert!(!schema.is_ancestor(address, items));
        assert_eq!(schema.access_chain(tags), vec![items, tags]);
        assert!(schema.access_chain(base).is_empty());
    }

    #[test]
    fn test_conflicting_shapes_become_string() {
        let mut builder = SchemaBuilder::new();
        builder.collection("t", |c| {
            c.field("a", BsonType::Int32)
                .document("a", |d| {
                    d.field("x", BsonType::Int32);
                })
                .scalar_array("vals", BsonType::Int32)
                .array("vals", |d| {
                    d.field("y", BsonType::Int32);
                });
        });
        let schema = builder.build().unwrap();

        let base = schema.table("t").unwrap();
        assert_eq!(base.column("a").unwrap().bson_type, BsonType::String);
        let vals = schema.table("t_vals").unwrap();
        assert_eq!(vals.column("value").unwrap().bson_type, BsonType::String);
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_table_name_collision() {
        let mut builder = SchemaBuilder::new();
        builder
            .collection("t_a", |c| {
                c.field("x", BsonType::Int32);
            })
            .collection("t", |c| {
                c.document("a", |d| {
                    d.field("y", BsonType::Int32);
                });
            });
        let schema = builder.build().unwrap();

        assert!(schema.table("t_a_1").is_ok());
        assert_eq!(schema.table("t_a_1").unwrap().collection, "t");
    }
}
