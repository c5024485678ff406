//! Naming conventions the analyzer keys on.
//!
//! Every framework-convention call the handler analyzer recognizes (body binding,
//! JSON emission, auth checks, data access, query reads) is matched by name against
//! the tables in [`Conventions`]. The defaults cover common axum / actix-web
//! codebases; a project can override any table from a YAML file:
//!
//! ```yaml
//! marker: "@openapi"
//! auth_elevated_calls: [require_admin, require_staff]
//! ```

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Category of authentication a handler requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthCategory {
    /// Any authenticated user
    User,
    /// An administrator or otherwise privileged role
    Elevated,
    /// Access to one specific record (ownership checks)
    Record,
}

/// Normalized data-access tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOperation {
    Read,
    Query,
    Create,
    Update,
    Delete,
}

/// Tables of conventional names. Missing keys in a config file keep their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Conventions {
    /// Opt-in marker comment text
    pub marker: String,
    /// How many leading bytes of a file are searched for the marker
    pub marker_scan_bytes: usize,
    /// Parameter types that make a function a handler
    pub context_types: Vec<String>,
    /// Return types that make a function a handler
    pub response_types: Vec<String>,
    /// Methods that decode the request body
    pub body_binding_methods: Vec<String>,
    /// Free functions that decode a body (`serde_json::from_slice`)
    pub body_binding_functions: Vec<String>,
    /// Methods emitting a JSON response
    pub json_emission_methods: Vec<String>,
    /// Zero-argument accessors returning the parsed query string
    pub query_accessors: Vec<String>,
    /// Methods reading one named query parameter directly
    pub query_lookups: Vec<String>,
    pub auth_user_calls: Vec<String>,
    pub auth_elevated_calls: Vec<String>,
    pub auth_record_calls: Vec<String>,
    /// Extractor types implying an authenticated user
    pub auth_user_extractors: Vec<String>,
    /// Extractor types implying an elevated role
    pub auth_elevated_extractors: Vec<String>,
    /// Receiver names treated as data stores
    pub store_receivers: Vec<String>,
    /// Receiver name suffixes treated as data stores
    pub store_suffixes: Vec<String>,
    pub read_prefixes: Vec<String>,
    pub query_prefixes: Vec<String>,
    pub create_prefixes: Vec<String>,
    pub update_prefixes: Vec<String>,
    pub delete_prefixes: Vec<String>,
    /// Function prefixes naming a constructor (`new_user` builds `User`)
    pub constructor_prefixes: Vec<String>,
    /// Type-name suffixes that are self-describing (`LoginResponse`)
    pub self_describing_suffixes: Vec<String>,
    /// Conventional handler suffixes stripped when matching routes
    pub handler_suffixes: Vec<String>,
    /// Conventional handler prefixes stripped when matching routes
    pub handler_prefixes: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Conventions {
    fn default() -> Self {
        Self {
            marker: "@openapi".to_string(),
            marker_scan_bytes: 512,
            context_types: strings(&[
                "Context",
                "Ctx",
                "RequestContext",
                "HttpRequest",
                "Request",
                "Json",
                "Query",
                "Path",
                "Form",
                "State",
                "Data",
                "Extension",
            ]),
            response_types: strings(&[
                "Response",
                "HttpResponse",
                "IntoResponse",
                "Responder",
                "Json",
            ]),
            body_binding_methods: strings(&[
                "bind_json",
                "bind",
                "should_bind_json",
                "json_body",
                "parse_body",
                "json",
            ]),
            body_binding_functions: strings(&["from_slice", "from_str", "from_value", "from_reader"]),
            json_emission_methods: strings(&["json"]),
            query_accessors: strings(&["query_params", "queries", "query_map", "query_pairs", "query"]),
            query_lookups: strings(&["query", "default_query", "query_param"]),
            auth_user_calls: strings(&[
                "require_auth",
                "require_user",
                "authenticate",
                "current_user",
                "auth_user",
            ]),
            auth_elevated_calls: strings(&[
                "require_admin",
                "require_role",
                "ensure_admin",
                "require_superuser",
            ]),
            auth_record_calls: strings(&[
                "require_owner",
                "authorize_resource",
                "check_ownership",
                "require_access",
            ]),
            auth_user_extractors: strings(&["AuthUser", "CurrentUser", "Claims"]),
            auth_elevated_extractors: strings(&["AdminUser"]),
            store_receivers: strings(&[
                "db",
                "repo",
                "repository",
                "store",
                "pool",
                "conn",
                "dao",
                "service",
                "svc",
            ]),
            store_suffixes: strings(&["_repo", "_repository", "_store", "_db", "_service", "_dao"]),
            read_prefixes: strings(&[
                "find_by",
                "get_by",
                "find_one",
                "fetch_one",
                "fetch_optional",
                "get",
                "load",
                "read",
            ]),
            query_prefixes: strings(&[
                "find_all",
                "find_many",
                "fetch_all",
                "list",
                "search",
                "query",
                "filter",
                "count",
                "all",
                "find",
            ]),
            create_prefixes: strings(&["create", "insert", "save", "add", "register"]),
            update_prefixes: strings(&["update", "upsert", "modify", "patch", "set"]),
            delete_prefixes: strings(&["delete", "remove", "destroy", "purge"]),
            constructor_prefixes: strings(&["new_", "make_", "build_"]),
            self_describing_suffixes: strings(&["Request", "Response", "Data", "Payload"]),
            handler_suffixes: strings(&["_handler"]),
            handler_prefixes: strings(&["handle_"]),
        }
    }
}

fn contains(list: &[String], name: &str) -> bool {
    list.iter().any(|s| s == name)
}

impl Conventions {
    /// Loads conventions from a YAML file; absent keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        debug!("Loading conventions from {}", path.display());
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn is_context_type(&self, name: &str) -> bool {
        contains(&self.context_types, name)
    }

    pub fn is_response_type(&self, name: &str) -> bool {
        contains(&self.response_types, name)
    }

    pub fn is_body_binding_method(&self, name: &str) -> bool {
        contains(&self.body_binding_methods, name)
    }

    pub fn is_body_binding_function(&self, name: &str) -> bool {
        contains(&self.body_binding_functions, name)
    }

    pub fn is_json_emission_method(&self, name: &str) -> bool {
        contains(&self.json_emission_methods, name)
    }

    pub fn is_query_accessor(&self, name: &str) -> bool {
        contains(&self.query_accessors, name)
    }

    pub fn is_query_lookup(&self, name: &str) -> bool {
        contains(&self.query_lookups, name)
    }

    /// Auth category implied by a call to `name`, if any.
    pub fn auth_call(&self, name: &str) -> Option<AuthCategory> {
        if contains(&self.auth_elevated_calls, name) {
            Some(AuthCategory::Elevated)
        } else if contains(&self.auth_record_calls, name) {
            Some(AuthCategory::Record)
        } else if contains(&self.auth_user_calls, name) {
            Some(AuthCategory::User)
        } else {
            None
        }
    }

    /// Auth category implied by an extractor parameter type, if any.
    pub fn auth_extractor(&self, type_name: &str) -> Option<AuthCategory> {
        if contains(&self.auth_elevated_extractors, type_name) {
            Some(AuthCategory::Elevated)
        } else if contains(&self.auth_user_extractors, type_name) {
            Some(AuthCategory::User)
        } else {
            None
        }
    }

    pub fn is_store_receiver(&self, name: &str) -> bool {
        contains(&self.store_receivers, name)
            || self.store_suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }

    /// Classifies a data-access method name. The longest matching prefix wins,
    /// so `find_all_users` is a query even though `find` alone also matches.
    pub fn data_operation(&self, method: &str) -> Option<DataOperation> {
        let tables = [
            (DataOperation::Read, &self.read_prefixes),
            (DataOperation::Query, &self.query_prefixes),
            (DataOperation::Create, &self.create_prefixes),
            (DataOperation::Update, &self.update_prefixes),
            (DataOperation::Delete, &self.delete_prefixes),
        ];

        tables
            .iter()
            .flat_map(|(op, prefixes)| prefixes.iter().map(move |p| (*op, p)))
            .filter(|(_, prefix)| {
                method == prefix.as_str()
                    || (method.starts_with(prefix.as_str())
                        && method[prefix.len()..].starts_with('_'))
            })
            .max_by_key(|(_, prefix)| prefix.len())
            .map(|(op, _)| op)
    }

    /// Strips a constructor prefix: `new_user_response` -> `user_response`.
    pub fn strip_constructor_prefix<'n>(&self, name: &'n str) -> Option<&'n str> {
        self.constructor_prefixes
            .iter()
            .find_map(|p| name.strip_prefix(p.as_str()))
            .filter(|rest| !rest.is_empty())
    }

    pub fn is_self_describing(&self, type_name: &str) -> bool {
        self.self_describing_suffixes
            .iter()
            .any(|s| type_name.len() > s.len() && type_name.ends_with(s.as_str()))
    }

    /// Removes one conventional handler suffix or prefix, if present.
    pub fn strip_handler_affixes<'n>(&self, name: &'n str) -> Option<&'n str> {
        self.handler_suffixes
            .iter()
            .find_map(|s| name.strip_suffix(s.as_str()))
            .or_else(|| {
                self.handler_prefixes
                    .iter()
                    .find_map(|p| name.strip_prefix(p.as_str()))
            })
            .filter(|rest| !rest.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_operation_longest_prefix_wins() {
        let conventions = Conventions::default();

        assert_eq!(conventions.data_operation("find_by_id"), Some(DataOperation::Read));
        assert_eq!(conventions.data_operation("find_all_users"), Some(DataOperation::Query));
        assert_eq!(conventions.data_operation("find"), Some(DataOperation::Query));
        assert_eq!(conventions.data_operation("insert"), Some(DataOperation::Create));
        assert_eq!(conventions.data_operation("update_email"), Some(DataOperation::Update));
        assert_eq!(conventions.data_operation("delete"), Some(DataOperation::Delete));
        assert_eq!(conventions.data_operation("getaway"), None);
        assert_eq!(conventions.data_operation("transform"), None);
    }

    #[test]
    fn test_auth_call_categories() {
        let conventions = Conventions::default();

        assert_eq!(conventions.auth_call("require_user"), Some(AuthCategory::User));
        assert_eq!(conventions.auth_call("require_admin"), Some(AuthCategory::Elevated));
        assert_eq!(conventions.auth_call("require_owner"), Some(AuthCategory::Record));
        assert_eq!(conventions.auth_call("log_request"), None);
    }

    #[test]
    fn test_store_receivers() {
        let conventions = Conventions::default();

        assert!(conventions.is_store_receiver("db"));
        assert!(conventions.is_store_receiver("user_repo"));
        assert!(!conventions.is_store_receiver("payload"));
    }

    #[test]
    fn test_strip_affixes() {
        let conventions = Conventions::default();

        assert_eq!(conventions.strip_constructor_prefix("new_user"), Some("user"));
        assert_eq!(conventions.strip_constructor_prefix("new_"), None);
        assert_eq!(conventions.strip_handler_affixes("create_user_handler"), Some("create_user"));
        assert_eq!(conventions.strip_handler_affixes("handle_login"), Some("login"));
        assert_eq!(conventions.strip_handler_affixes("login"), None);
    }

    #[test]
    fn test_yaml_overrides_keep_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("conventions.yaml");
        fs::write(&path, "marker: \"@docs\"\nauth_elevated_calls: [require_staff]\n").unwrap();

        let conventions = Conventions::from_yaml_file(&path).unwrap();

        assert_eq!(conventions.marker, "@docs");
        assert_eq!(conventions.auth_call("require_staff"), Some(AuthCategory::Elevated));
        assert_eq!(conventions.auth_call("require_admin"), None);
        assert_eq!(conventions.marker_scan_bytes, 512);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("conventions.yaml");
        fs::write(&path, "marker: [unclosed").unwrap();

        let err = Conventions::from_yaml_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
