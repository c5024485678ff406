//! Naming conventions used when structure alone does not determine a shape.

use crate::conventions::{Conventions, DataOperation};
use crate::schema::SchemaNode;
use crate::type_string::{singularize, to_pascal_case};

/// Schema implied by a field or variable name: `id`, `created_at`, `total_count`, `is_active`.
pub fn field_name_schema(name: &str) -> Option<SchemaNode> {
    let name = name.to_ascii_lowercase();
    if name == "id" || name.ends_with("_id") || name == "uuid" {
        return Some(SchemaNode::string());
    }
    if name.ends_with("_at")
        || name.starts_with("created")
        || name.starts_with("updated")
        || name.contains("timestamp")
    {
        return Some(SchemaNode::date_time());
    }
    if matches!(name.as_str(), "count" | "total" | "size" | "len" | "length")
        || name.ends_with("_count")
        || name.starts_with("total_")
        || name.ends_with("_total")
    {
        return Some(SchemaNode::integer());
    }
    if name.starts_with("is_") || name.starts_with("has_") || name.starts_with("can_") {
        return Some(SchemaNode::boolean());
    }
    None
}

/// Schema of a conventional accessor or builtin method call, independent of its receiver.
pub fn accessor_method_schema(method: &str) -> Option<SchemaNode> {
    let schema = match method {
        "to_string" | "to_uppercase" | "to_lowercase" | "trim" | "get_string" | "get_str"
        | "display" | "to_hex" | "join" => SchemaNode::string(),
        "len" | "count" | "capacity" => SchemaNode::non_negative_integer(),
        "is_empty" | "is_some" | "is_none" | "is_ok" | "is_err" | "contains" | "contains_key"
        | "starts_with" | "ends_with" | "any" | "all" | "get_bool" | "eq" | "ne" => {
            SchemaNode::boolean()
        }
        "get_int" | "get_i64" | "get_i32" | "get_u64" | "get_u32" | "get_usize" => {
            SchemaNode::integer()
        }
        "timestamp" | "timestamp_millis" | "timestamp_micros" | "as_secs" | "as_millis" => {
            SchemaNode::integer().with_format("int64")
        }
        "get_float" | "get_f64" | "get_f32" | "as_secs_f64" => SchemaNode::number(),
        "get_time" | "get_datetime" | "to_rfc3339" | "to_rfc2822" | "to_rfc3339_opts" => {
            SchemaNode::date_time()
        }
        _ => return None,
    };
    Some(schema)
}

/// Path of a call that returns the current time: `Utc::now()`, `chrono::Local::now()`.
pub fn is_time_constructor(segments: &[String]) -> bool {
    matches!(
        segments,
        [.., owner, method]
            if matches!(owner.as_str(), "Utc" | "Local" | "SystemTime" | "OffsetDateTime" | "NaiveDateTime")
                && matches!(method.as_str(), "now" | "now_utc" | "now_local")
    )
}

/// Whether a lookup yields one record or a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Single,
    Collection,
}

const LOOKUP_VERBS: &[&str] = &[
    "get", "find", "fetch", "list", "load", "read", "search", "query", "all", "one", "many",
    "optional", "create", "insert", "save", "add", "update", "upsert", "register",
];
const LOOKUP_STOPS: &[&str] = &["by", "with", "for", "from", "in", "where", "and", "or"];

/// Splits a data-access method name into its cardinality and the noun it names,
/// e.g. `find_user_by_email` -> (single, `user`), `list_orders` -> (collection, `order`).
///
/// Returns `None` when the method is not a recognized lookup.
pub fn lookup_method(method: &str, conventions: &Conventions) -> Option<(Cardinality, Option<String>)> {
    let operation = conventions.data_operation(method)?;
    if operation == DataOperation::Delete || method == "count" || method.starts_with("count_") {
        return None;
    }

    let noun: Vec<&str> = method
        .split('_')
        .skip_while(|w| LOOKUP_VERBS.contains(w))
        .take_while(|w| !LOOKUP_STOPS.contains(w))
        .collect();
    let noun = noun.join("_");

    let by_operation = match operation {
        DataOperation::Query => Cardinality::Collection,
        _ => Cardinality::Single,
    };
    if noun.is_empty() {
        return Some((by_operation, None));
    }

    let last_word = noun.rsplit('_').next().unwrap_or(&noun);
    match singularize(last_word) {
        Some(single) => {
            let stem = &noun[..noun.len() - last_word.len()];
            Some((Cardinality::Collection, Some(format!("{}{}", stem, single))))
        }
        None => Some((Cardinality::Single, Some(noun))),
    }
}

/// Record noun implied by a store-like receiver: `users` -> `user`, `order_repo` -> `order`.
pub fn receiver_noun(receiver: &str, conventions: &Conventions) -> Option<String> {
    if conventions.store_receivers.iter().any(|r| r == receiver) {
        return None;
    }
    if let Some(stem) = conventions
        .store_suffixes
        .iter()
        .find_map(|s| receiver.strip_suffix(s.as_str()))
    {
        return (!stem.is_empty()).then(|| stem.to_string());
    }
    singularize(receiver)
}

/// Candidate type names for a snake-case noun: `line_item` -> `LineItem`.
pub fn noun_type_name(noun: &str) -> String {
    to_pascal_case(noun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PrimitiveKind;

    #[test]
    fn test_field_name_schema() {
        assert_eq!(field_name_schema("user_id"), Some(SchemaNode::string()));
        assert_eq!(field_name_schema("created_at"), Some(SchemaNode::date_time()));
        assert_eq!(field_name_schema("total_count"), Some(SchemaNode::integer()));
        assert_eq!(field_name_schema("is_active"), Some(SchemaNode::boolean()));
        assert_eq!(field_name_schema("name"), None);
    }

    #[test]
    fn test_accessor_methods() {
        assert_eq!(
            accessor_method_schema("len"),
            Some(SchemaNode::non_negative_integer())
        );
        assert_eq!(accessor_method_schema("to_rfc3339"), Some(SchemaNode::date_time()));
        assert_eq!(
            accessor_method_schema("is_empty").and_then(|s| s.primitive_kind()),
            Some(PrimitiveKind::Boolean)
        );
        assert_eq!(accessor_method_schema("frobnicate"), None);
    }

    #[test]
    fn test_time_constructor() {
        let path = |p: &str| p.split("::").map(str::to_string).collect::<Vec<_>>();
        assert!(is_time_constructor(&path("Utc::now")));
        assert!(is_time_constructor(&path("chrono::Local::now")));
        assert!(!is_time_constructor(&path("Instant::elapsed")));
    }

    #[test]
    fn test_lookup_method() {
        let conventions = Conventions::default();

        assert_eq!(
            lookup_method("find_user_by_email", &conventions),
            Some((Cardinality::Single, Some("user".to_string())))
        );
        assert_eq!(
            lookup_method("list_orders", &conventions),
            Some((Cardinality::Collection, Some("order".to_string())))
        );
        assert_eq!(
            lookup_method("get_line_items", &conventions),
            Some((Cardinality::Collection, Some("line_item".to_string())))
        );
        assert_eq!(
            lookup_method("find_all", &conventions),
            Some((Cardinality::Collection, None))
        );
        assert_eq!(
            lookup_method("find_by_id", &conventions),
            Some((Cardinality::Single, None))
        );
        assert_eq!(lookup_method("delete_user", &conventions), None);
        assert_eq!(lookup_method("count_users", &conventions), None);
        assert_eq!(lookup_method("frobnicate", &conventions), None);
    }

    #[test]
    fn test_receiver_noun() {
        let conventions = Conventions::default();

        assert_eq!(receiver_noun("users", &conventions).as_deref(), Some("user"));
        assert_eq!(receiver_noun("order_repo", &conventions).as_deref(), Some("order"));
        assert_eq!(receiver_noun("db", &conventions), None);
    }
}
