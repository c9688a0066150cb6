//! YAML/JSON schema descriptions
//!
//! ```yaml
//! collections:
//!   - name: orders
//!     fields:
//!       total: double
//!       address:
//!         city: string
//!       items:
//!         array:
//!           sku: string
//!           qty: int
//!       tags:
//!         array: string
//! ```
//!
//! A map of fields describes a nested document. A map whose only key is
//! `array` describes an array of the given element shape.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::bson_type::BsonType;
use crate::builder::{SchemaBuilder, Shape};
use crate::error::{Result, SchemaError};
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    #[serde(default)]
    pub collections: Vec<CollectionDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescription {
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, ShapeDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShapeDescription {
    Scalar(BsonType),
    Array(ArrayDescription),
    Document(IndexMap<String, ShapeDescription>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrayDescription {
    pub array: Box<ShapeDescription>,
}

impl ShapeDescription {
    pub fn to_shape(&self) -> Shape {
        match self {
            ShapeDescription::Scalar(t) => Shape::Scalar(*t),
            ShapeDescription::Array(a) => Shape::Array(Box::new(a.array.to_shape())),
            ShapeDescription::Document(fields) => Shape::Document(
                fields
                    .iter()
                    .map(|(name, shape)| (name.clone(), shape.to_shape()))
                    .collect(),
            ),
        }
    }
}

impl SchemaDescription {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| SchemaError::Description(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| SchemaError::Description(e.to_string()))
    }

    /// Load from a file, choosing the format by extension (YAML unless `.json`)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    pub fn build(&self) -> Result<Schema> {
        let mut builder = SchemaBuilder::new();
        for collection in &self.collections {
            let fields = collection
                .fields
                .iter()
                .map(|(name, shape)| (name.clone(), shape.to_shape()))
                .collect();
            builder.collection_shape(&collection.name, fields);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDERS: &str = r#"
collections:
  - name: orders
    fields:
      total: double
      address:
        city: string
      items:
        array:
          sku: string
          qty: int
      tags:
        array: string
"#;

    #[test]
    fn test_parse_yaml() {
        let desc = SchemaDescription::from_yaml(ORDERS).unwrap();
        let fields = &desc.collections[0].fields;

        assert_eq!(fields["total"], ShapeDescription::Scalar(BsonType::Double));
        assert!(matches!(fields["address"], ShapeDescription::Document(_)));
        assert!(matches!(fields["items"], ShapeDescription::Array(_)));
        assert!(matches!(fields["tags"], ShapeDescription::Array(_)));
    }

    #[test]
    fn test_build_from_yaml() {
        let schema = SchemaDescription::from_yaml(ORDERS).unwrap().build().unwrap();
        let names: Vec<&str> = schema.tables().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "orders_address", "orders_items", "orders_tags"]);
    }

    #[test]
    fn test_json_equivalent() {
        let json = r#"{"collections": [{"name": "t", "fields": {"a": "int", "b": {"array": {"c": "string"}}}}]}"#;
        let schema = SchemaDescription::from_json(json).unwrap().build().unwrap();
        assert_eq!(schema.table("t_b").unwrap().column("c").unwrap().resolved_path, "b.c");
    }

    #[test]
    fn test_unknown_type_is_description_error() {
        let err = SchemaDescription::from_yaml("collections:\n  - name: t\n    fields:\n      a: 42\n").unwrap_err();
        assert!(matches!(err, SchemaError::Description(_)));
    }
}
