use crate::schema::{AdditionalProperties, SchemaKind, SchemaNode};
use crate::type_registry::{TypeDescriptor, TypeRegistry};
use crate::type_string::{last_segment, split_generics};
use indexmap::IndexMap;
use log::debug;
use std::collections::HashSet;

/// Converts type descriptors and struct descriptors into [`SchemaNode`]s.
///
/// Never fails: a type it cannot resolve becomes a reference to its bare name.
pub struct SchemaSynthesizer<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> SchemaSynthesizer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    /// Schema of a type descriptor such as `Vec<models::User>`.
    ///
    /// Registered structs become references unless `inline` is set, in which case
    /// a copy of the struct's full schema is returned. `inline` carries through
    /// collection and `Option` wrappers but never into struct fields.
    pub fn type_to_schema(&self, desc: &str, inline: bool) -> SchemaNode {
        let mut visited = HashSet::new();
        let (canonical, was_alias) = self.registry.resolve_alias(desc, &mut visited);
        if was_alias {
            debug!("Resolved alias {} to {}", desc, canonical);
        }

        let (base, args) = split_generics(&canonical);
        let ident = last_segment(base);

        match (ident, args.as_slice()) {
            ("Vec" | "VecDeque" | "LinkedList" | "HashSet" | "BTreeSet" | "IndexSet", [item]) => {
                SchemaNode::array(self.type_to_schema(item, inline))
            }
            ("HashMap" | "BTreeMap" | "IndexMap", [_key, value]) => {
                if is_any_like(value) {
                    SchemaNode::open_object()
                } else {
                    SchemaNode::map_of(self.type_to_schema(value, false))
                }
            }
            ("Option", [inner]) => {
                let schema = self.type_to_schema(inner, inline);
                if schema.is_reference() {
                    schema
                } else {
                    schema.nullable()
                }
            }
            (
                "Box" | "Arc" | "Rc" | "Cow" | "RefCell" | "Cell" | "Mutex" | "RwLock" | "Json",
                [inner],
            ) => self.type_to_schema(inner, inline),
            _ => self.named_to_schema(&canonical, ident, inline),
        }
    }

    fn named_to_schema(&self, canonical: &str, ident: &str, inline: bool) -> SchemaNode {
        if let Some(schema) = primitive_to_schema(ident) {
            return schema;
        }
        if is_any_like(canonical) {
            return SchemaNode::open_object();
        }
        if canonical == "()" {
            return SchemaNode::untyped_object();
        }

        if let Some(descriptor) = self.registry.get_struct(ident) {
            if !inline {
                return SchemaNode::reference(&descriptor.name);
            }
            return match &descriptor.schema {
                Some(cached) => cached.clone(),
                None => self.struct_to_schema(descriptor),
            };
        }
        if let Some(descriptor) = self.registry.get_enum(ident) {
            if inline {
                if let Some(cached) = &descriptor.schema {
                    return cached.clone();
                }
            }
            return SchemaNode::reference(&descriptor.name);
        }

        debug!("Unknown type {}, referencing by bare name", canonical);
        SchemaNode::reference(ident)
    }

    /// Full object schema of a struct: promoted fields of every flattened type
    /// (to any depth) overlaid with the struct's own fields, which win on collision.
    pub fn struct_to_schema(&self, descriptor: &TypeDescriptor) -> SchemaNode {
        debug!("Synthesizing schema for struct {}", descriptor.name);

        let mut properties = IndexMap::new();
        let mut required = Vec::new();
        let mut additional = None;
        let mut visited = HashSet::from([descriptor.name.clone()]);

        for embedded in &descriptor.embedded {
            self.flatten_into(embedded, &mut properties, &mut required, &mut additional, &mut visited);
        }

        for field in descriptor.fields.values() {
            let mut schema = self.type_to_schema(&field.declared_type, false);
            if field.is_pointer && !schema.is_reference() {
                schema.nullable = true;
            }

            let name = field.serialized_name.clone();
            required.retain(|r| r != &name);
            if !field.is_pointer && !field.omit_when_empty && !field.has_default {
                required.push(name.clone());
            }
            properties.insert(name, schema);
        }

        SchemaNode {
            kind: SchemaKind::Object {
                properties,
                required,
                additional_properties: additional,
            },
            nullable: false,
        }
    }

    /// Promotes the fields of a flattened type. Earlier declarations win, and an
    /// embedded type's own fields win over those it embeds in turn.
    fn flatten_into(
        &self,
        embedded: &str,
        properties: &mut IndexMap<String, SchemaNode>,
        required: &mut Vec<String>,
        additional: &mut Option<AdditionalProperties>,
        visited: &mut HashSet<String>,
    ) {
        let (base, args) = split_generics(embedded);
        let optional = last_segment(base) == "Option";
        let target = match (last_segment(base), args.as_slice()) {
            ("Option" | "Box", [inner]) => *inner,
            _ => embedded,
        };

        let Some(descriptor) = self.registry.get_struct(target) else {
            // a flattened map collects unknown keys
            if let Some(ap) = self.type_to_schema(target, false).additional_properties() {
                additional.get_or_insert_with(|| ap.clone());
            } else {
                debug!("Cannot flatten unknown type {}", target);
            }
            return;
        };
        if !visited.insert(descriptor.name.clone()) {
            debug!("Skipping already flattened type {}", descriptor.name);
            return;
        }

        for field in descriptor.fields.values() {
            if properties.contains_key(&field.serialized_name) {
                continue;
            }
            let mut schema = self.type_to_schema(&field.declared_type, false);
            if field.is_pointer && !schema.is_reference() {
                schema.nullable = true;
            }
            if !optional && !field.is_pointer && !field.omit_when_empty && !field.has_default {
                required.push(field.serialized_name.clone());
            }
            properties.insert(field.serialized_name.clone(), schema);
        }

        for nested in &descriptor.embedded {
            self.flatten_into(nested, properties, required, additional, visited);
        }
    }
}

/// `serde_json::Value` and friends: anything goes.
pub fn is_any_like(desc: &str) -> bool {
    let (base, args) = split_generics(desc);
    let ident = last_segment(base);
    matches!(ident, "Value" | "Any" | "JsonValue")
        || (ident == "Map" && args.len() == 2)
        || base.starts_with("dyn ")
        || base.starts_with("impl ")
}

/// Fixed schemas of scalar types, keyed by bare type name.
pub fn primitive_to_schema(type_name: &str) -> Option<SchemaNode> {
    let schema = match type_name {
        "i8" | "i16" | "i32" | "u8" | "u16" | "u32" => SchemaNode::integer().with_format("int32"),
        "i64" | "i128" | "isize" | "u64" | "u128" | "usize" => {
            SchemaNode::integer().with_format("int64")
        }
        "f32" => SchemaNode::number().with_format("float"),
        "f64" | "Decimal" => SchemaNode::number().with_format("double"),
        "bool" => SchemaNode::boolean(),
        "String" | "str" | "char" | "Cow" => SchemaNode::string(),
        "DateTime" | "NaiveDateTime" | "SystemTime" | "OffsetDateTime" | "PrimitiveDateTime"
        | "Timestamp" => SchemaNode::date_time(),
        "NaiveDate" | "Date" => SchemaNode::formatted_string("date"),
        "Uuid" => SchemaNode::formatted_string("uuid"),
        "Url" => SchemaNode::formatted_string("uri"),
        _ => return None,
    };
    Some(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PrimitiveKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::path::Path;

    fn registry_from(code: &str) -> TypeRegistry {
        let file = syn::parse_file(code).expect("Failed to parse test code");
        let mut registry = TypeRegistry::new();
        registry.register_file(&file, Path::new("models.rs"));
        registry.synthesize_all();
        registry
    }

    #[test]
    fn test_primitive_types() {
        let registry = TypeRegistry::new();
        let synth = SchemaSynthesizer::new(&registry);

        let schema = synth.type_to_schema("i64", false);
        assert_eq!(schema.primitive_kind(), Some(PrimitiveKind::Integer));
        assert_eq!(schema.format(), Some("int64"));
        assert_eq!(synth.type_to_schema("u16", false).format(), Some("int32"));
        assert_eq!(synth.type_to_schema("f32", false).format(), Some("float"));
        assert_eq!(
            synth.type_to_schema("bool", false).primitive_kind(),
            Some(PrimitiveKind::Boolean)
        );
        assert_eq!(
            synth.type_to_schema("chrono::DateTime<chrono::Utc>", false).format(),
            Some("date-time")
        );
        assert_eq!(synth.type_to_schema("Cow<str>", false), SchemaNode::string());
    }

    #[test]
    fn test_struct_reference_and_inline() {
        let registry = registry_from(
            r#"
            pub struct User {
                pub id: u64,
                pub name: String,
            }
        "#,
        );
        let synth = SchemaSynthesizer::new(&registry);

        assert_eq!(synth.type_to_schema("User", false), SchemaNode::reference("User"));
        assert_eq!(synth.type_to_schema("models::User", false), SchemaNode::reference("User"));

        let inline = synth.type_to_schema("User", true);
        let cached = registry.get_struct("User").unwrap().schema.clone().unwrap();
        assert_eq!(inline, cached);
        assert_eq!(inline.required(), ["id".to_string(), "name".to_string()]);

        // synthesizing again from the same state is structurally stable
        let again = synth.struct_to_schema(registry.get_struct("User").unwrap());
        assert_eq!(again, cached);
    }

    #[test]
    fn test_collections_and_maps() {
        let registry = registry_from("pub struct Tag { pub label: String }");
        let synth = SchemaSynthesizer::new(&registry);

        let value = serde_json::to_value(synth.type_to_schema("Vec<Tag>", false)).unwrap();
        assert_eq!(
            value,
            json!({"type": "array", "items": {"$ref": "#/components/schemas/Tag"}})
        );

        let value =
            serde_json::to_value(synth.type_to_schema("HashMap<String, serde_json::Value>", false))
                .unwrap();
        assert_eq!(value, json!({"type": "object", "additionalProperties": true}));

        let value = serde_json::to_value(synth.type_to_schema("BTreeMap<String, i32>", false)).unwrap();
        assert_eq!(
            value,
            json!({"type": "object", "additionalProperties": {"type": "integer", "format": "int32"}})
        );

        let inline_items = synth.type_to_schema("Vec<Tag>", true);
        assert!(inline_items.items().unwrap().is_object());
    }

    #[test]
    fn test_option_is_nullable_unless_reference() {
        let registry = registry_from(
            r#"
            pub struct Account {
                pub nickname: Option<String>,
                pub owner: Option<Box<Owner>>,
            }
            pub struct Owner { pub id: u64 }
        "#,
        );

        let schema = registry.get_struct("Account").unwrap().schema.clone().unwrap();
        let nickname = schema.property("nickname").unwrap();
        assert!(nickname.nullable);
        assert_eq!(nickname.primitive_kind(), Some(PrimitiveKind::String));

        let owner = schema.property("owner").unwrap();
        assert!(owner.is_reference());
        assert!(!owner.nullable);
        assert!(schema.required().is_empty());
    }

    #[test]
    fn test_flatten_collision_keeps_own_field() {
        let registry = registry_from(
            r#"
            pub struct Outer {
                #[serde(flatten)]
                pub embedded: Embedded,
                pub name: String,
            }
            pub struct Embedded {
                pub name: i64,
                pub created_at: chrono::DateTime<chrono::Utc>,
                #[serde(flatten)]
                pub deeper: Deeper,
            }
            pub struct Deeper { pub revision: u32, pub created_at: bool }
        "#,
        );

        let schema = registry.get_struct("Outer").unwrap().schema.clone().unwrap();
        assert_eq!(
            schema.property("name").and_then(|p| p.primitive_kind()),
            Some(PrimitiveKind::String)
        );
        assert_eq!(schema.property("created_at").and_then(|p| p.format()), Some("date-time"));
        assert!(schema.property("revision").is_some());
        assert_eq!(schema.property_count(), 3);
        assert_eq!(schema.required().iter().filter(|r| *r == "name").count(), 1);
    }

    #[test]
    fn test_flatten_cycle_terminates() {
        let registry = registry_from(
            r#"
            pub struct A { #[serde(flatten)] pub b: B, pub a: u8 }
            pub struct B { #[serde(flatten)] pub a: Box<A>, pub b: u8 }
        "#,
        );

        let schema = registry.get_struct("A").unwrap().schema.clone().unwrap();
        assert_eq!(schema.property_count(), 2);
    }

    #[test]
    fn test_flattened_map_allows_extra_keys() {
        let registry = registry_from(
            r#"
            pub struct Settings {
                pub theme: String,
                #[serde(flatten)]
                pub extra: HashMap<String, Value>,
            }
        "#,
        );

        let schema = registry.get_struct("Settings").unwrap().schema.clone().unwrap();
        assert_eq!(schema.additional_properties(), Some(&AdditionalProperties::Any));
    }

    #[test]
    fn test_alias_resolves_before_synthesis() {
        let registry = registry_from(
            r#"
            type UserId = u64;
            type Users = Vec<User>;
            pub struct User { pub id: UserId }
        "#,
        );
        let synth = SchemaSynthesizer::new(&registry);

        assert_eq!(synth.type_to_schema("UserId", false).format(), Some("int64"));
        let users = synth.type_to_schema("Users", false);
        assert_eq!(users.items(), Some(&SchemaNode::reference("User")));
    }

    #[test]
    fn test_enum_field_is_reference() {
        let registry = registry_from(
            r#"
            pub enum Role { Admin, Member }
            pub struct Member { pub role: Role }
        "#,
        );
        let synth = SchemaSynthesizer::new(&registry);

        let member = registry.get_struct("Member").unwrap().schema.clone().unwrap();
        assert_eq!(member.property("role"), Some(&SchemaNode::reference("Role")));
        assert_eq!(
            synth.type_to_schema("Role", true),
            SchemaNode::string_enum(vec!["Admin".to_string(), "Member".to_string()])
        );
    }

    #[test]
    fn test_unknown_type_degrades_to_reference() {
        let registry = TypeRegistry::new();
        let synth = SchemaSynthesizer::new(&registry);

        assert_eq!(
            synth.type_to_schema("external::Thing", false),
            SchemaNode::reference("Thing")
        );
        assert_eq!(synth.type_to_schema("Value", false), SchemaNode::open_object());
    }
}
