//! Normalized schema nodes and their JSON-Schema wire form.
//!
//! [`SchemaNode`] is a plain value: cloning it is a deep copy, so a node handed out
//! of the registry cache can be extended (e.g. with dynamically assigned map keys)
//! without affecting any other holder of the same cached schema.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of every named reference in the emitted documents.
pub const REFERENCE_PREFIX: &str = "#/components/schemas/";

/// Primitive value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    String,
    Integer,
    Number,
    Boolean,
}

impl PrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrimitiveKind::String => "string",
            PrimitiveKind::Integer => "integer",
            PrimitiveKind::Number => "number",
            PrimitiveKind::Boolean => "boolean",
        }
    }
}

/// Value schema of an open map.
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    /// Any value is allowed (`additionalProperties: true`)
    Any,
    /// Every value follows this schema
    Schema(Box<SchemaNode>),
}

/// Shape of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Primitive {
        kind: PrimitiveKind,
        format: Option<String>,
        example: Option<Value>,
        minimum: Option<i64>,
        enum_values: Option<Vec<String>>,
    },
    Object {
        properties: IndexMap<String, SchemaNode>,
        required: Vec<String>,
        additional_properties: Option<AdditionalProperties>,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Reference {
        target: String,
    },
}

/// A node of a synthesized schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub nullable: bool,
}

impl SchemaNode {
    fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            nullable: false,
        }
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::new(SchemaKind::Primitive {
            kind,
            format: None,
            example: None,
            minimum: None,
            enum_values: None,
        })
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn integer() -> Self {
        Self::primitive(PrimitiveKind::Integer)
    }

    pub fn number() -> Self {
        Self::primitive(PrimitiveKind::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveKind::Boolean)
    }

    /// A string carrying a well-known format such as `date-time` or `uuid`.
    pub fn formatted_string(format: &str) -> Self {
        Self::string().with_format(format)
    }

    pub fn date_time() -> Self {
        Self::formatted_string("date-time")
    }

    /// An integer constrained to be `>= 0` (lengths and counts).
    pub fn non_negative_integer() -> Self {
        let mut node = Self::integer();
        if let SchemaKind::Primitive { minimum, .. } = &mut node.kind {
            *minimum = Some(0);
        }
        node
    }

    pub fn string_enum(values: Vec<String>) -> Self {
        let mut node = Self::string();
        if let SchemaKind::Primitive { enum_values, .. } = &mut node.kind {
            *enum_values = Some(values);
        }
        node
    }

    /// An object with no declared properties that accepts any keys.
    pub fn open_object() -> Self {
        Self::new(SchemaKind::Object {
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: Some(AdditionalProperties::Any),
        })
    }

    /// A map with string keys whose values all follow `values`.
    pub fn map_of(values: SchemaNode) -> Self {
        Self::new(SchemaKind::Object {
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: Some(AdditionalProperties::Schema(Box::new(values))),
        })
    }

    /// An object with no properties and no additional-properties policy.
    pub fn untyped_object() -> Self {
        Self::new(SchemaKind::Object {
            properties: IndexMap::new(),
            required: Vec::new(),
            additional_properties: None,
        })
    }

    pub fn object(properties: IndexMap<String, SchemaNode>, required: Vec<String>) -> Self {
        Self::new(SchemaKind::Object {
            properties,
            required,
            additional_properties: None,
        })
    }

    pub fn array(items: SchemaNode) -> Self {
        Self::new(SchemaKind::Array {
            items: Box::new(items),
        })
    }

    pub fn reference(target: &str) -> Self {
        Self::new(SchemaKind::Reference {
            target: target.to_string(),
        })
    }

    pub fn with_format(mut self, value: &str) -> Self {
        if let SchemaKind::Primitive { format, .. } = &mut self.kind {
            *format = Some(value.to_string());
        }
        self
    }

    pub fn with_example(mut self, value: Value) -> Self {
        if let SchemaKind::Primitive { example, .. } = &mut self.kind {
            *example = Some(value);
        }
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, SchemaKind::Reference { .. })
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaKind::Object { .. })
    }

    /// An object that says nothing about its keys.
    pub fn is_untyped_object(&self) -> bool {
        matches!(
            &self.kind,
            SchemaKind::Object {
                properties,
                additional_properties: None,
                ..
            } if properties.is_empty()
        )
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match &self.kind {
            SchemaKind::Primitive { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn format(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Primitive { format, .. } => format.as_deref(),
            _ => None,
        }
    }

    pub fn properties(&self) -> Option<&IndexMap<String, SchemaNode>> {
        match &self.kind {
            SchemaKind::Object { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&SchemaNode> {
        self.properties().and_then(|props| props.get(name))
    }

    pub fn required(&self) -> &[String] {
        match &self.kind {
            SchemaKind::Object { required, .. } => required,
            _ => &[],
        }
    }

    pub fn additional_properties(&self) -> Option<&AdditionalProperties> {
        match &self.kind {
            SchemaKind::Object {
                additional_properties,
                ..
            } => additional_properties.as_ref(),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&SchemaNode> {
        match &self.kind {
            SchemaKind::Array { items } => Some(items),
            _ => None,
        }
    }

    /// Number of declared properties; zero for non-objects.
    pub fn property_count(&self) -> usize {
        self.properties().map_or(0, |p| p.len())
    }

    /// Adds `name` unless the object already declares it. Returns whether the
    /// property was added. Non-object nodes are left untouched.
    pub fn insert_property_if_absent(&mut self, name: &str, schema: SchemaNode) -> bool {
        match &mut self.kind {
            SchemaKind::Object { properties, .. } if !properties.contains_key(name) => {
                properties.insert(name.to_string(), schema);
                true
            }
            _ => false,
        }
    }

    /// Converts to the serializable JSON-Schema shape.
    pub fn to_json_schema(&self) -> JsonSchema {
        let mut schema = JsonSchema::default();
        match &self.kind {
            SchemaKind::Primitive {
                kind,
                format,
                example,
                minimum,
                enum_values,
            } => {
                schema.schema_type = Some(kind.as_str().to_string());
                schema.format = format.clone();
                schema.example = example.clone();
                schema.minimum = *minimum;
                schema.enum_values = enum_values.clone();
            }
            SchemaKind::Object {
                properties,
                required,
                additional_properties,
            } => {
                schema.schema_type = Some("object".to_string());
                if !properties.is_empty() {
                    schema.properties = Some(
                        properties
                            .iter()
                            .map(|(name, node)| (name.clone(), node.to_json_schema()))
                            .collect(),
                    );
                }
                if !required.is_empty() {
                    schema.required = Some(required.clone());
                }
                schema.additional_properties = additional_properties.as_ref().map(|ap| match ap {
                    AdditionalProperties::Any => AdditionalPropertiesValue::Allowed(true),
                    AdditionalProperties::Schema(node) => {
                        AdditionalPropertiesValue::Schema(Box::new(node.to_json_schema()))
                    }
                });
            }
            SchemaKind::Array { items } => {
                schema.schema_type = Some("array".to_string());
                schema.items = Some(Box::new(items.to_json_schema()));
            }
            SchemaKind::Reference { target } => {
                schema.reference = Some(format!("{}{}", REFERENCE_PREFIX, target));
            }
        }
        if self.nullable {
            schema.nullable = Some(true);
        }
        schema
    }
}

impl Serialize for SchemaNode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json_schema().serialize(serializer)
    }
}

/// OpenAPI-compatible JSON Schema object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// Reference to another schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g., "int64", "date-time")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, JsonSchema>>,
    /// Required field names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(rename = "additionalProperties", skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<AdditionalPropertiesValue>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,
    /// Enum values for enum types
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
}

/// `additionalProperties` is either a boolean or a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdditionalPropertiesValue {
    Allowed(bool),
    Schema(Box<JsonSchema>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_reference_serialization() {
        let value = serde_json::to_value(SchemaNode::reference("User")).unwrap();
        assert_eq!(value, json!({"$ref": "#/components/schemas/User"}));
    }

    #[test]
    fn test_object_serialization_keeps_property_order() {
        let mut properties = IndexMap::new();
        properties.insert(
            "id".to_string(),
            SchemaNode::string().with_example(json!("x")),
        );
        properties.insert("count".to_string(), SchemaNode::integer());
        let node = SchemaNode::object(properties, vec!["id".to_string(), "count".to_string()]);

        let text = serde_json::to_string(&node).unwrap();
        assert_eq!(
            text,
            r#"{"type":"object","properties":{"id":{"type":"string","example":"x"},"count":{"type":"integer"}},"required":["id","count"]}"#
        );
    }

    #[test]
    fn test_open_and_typed_maps() {
        let open = serde_json::to_value(SchemaNode::open_object()).unwrap();
        assert_eq!(open, json!({"type": "object", "additionalProperties": true}));

        let typed = serde_json::to_value(SchemaNode::map_of(SchemaNode::integer())).unwrap();
        assert_eq!(
            typed,
            json!({"type": "object", "additionalProperties": {"type": "integer"}})
        );
    }

    #[test]
    fn test_nullable_and_minimum() {
        let value = serde_json::to_value(SchemaNode::date_time().nullable()).unwrap();
        assert_eq!(
            value,
            json!({"type": "string", "format": "date-time", "nullable": true})
        );

        let count = serde_json::to_value(SchemaNode::non_negative_integer()).unwrap();
        assert_eq!(count, json!({"type": "integer", "minimum": 0}));
    }

    #[test]
    fn test_clone_is_independent() {
        let cached = SchemaNode::object(IndexMap::new(), Vec::new());
        let mut copy = cached.clone();

        assert!(copy.insert_property_if_absent("extra", SchemaNode::string()));
        assert_eq!(cached.property_count(), 0);
        assert_eq!(copy.property_count(), 1);
    }

    #[test]
    fn test_insert_never_overwrites() {
        let mut properties = IndexMap::new();
        properties.insert("id".to_string(), SchemaNode::string());
        let mut node = SchemaNode::object(properties, Vec::new());

        assert!(!node.insert_property_if_absent("id", SchemaNode::integer()));
        assert_eq!(
            node.property("id").and_then(|p| p.primitive_kind()),
            Some(PrimitiveKind::String)
        );
    }
}
