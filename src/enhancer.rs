//! Copies handler analysis onto externally supplied endpoint descriptors.
//!
//! Matching is strict: the route's handler identifier must equal a discovered
//! handler name verbatim, after stripping its namespace, or after also stripping a
//! conventional affix (`_handler`, `handle_`). No fuzzy matching is attempted, so
//! an endpoint never picks up another handler's schema.

use crate::conventions::{AuthCategory, Conventions};
use crate::handler::{DeclaredParameter, HandlerDescriptor, ParameterLocation};
use crate::routes::HttpMethod;
use crate::schema::SchemaNode;
use log::{debug, warn};
use serde::Serialize;

/// Authentication requirement of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthInfo {
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<AuthCategory>,
}

/// One route as seen by the documentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Route path with `{name}` placeholders
    pub path: String,
    /// `::`-separated handler path as registered with the router
    pub handler_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub parameters: Vec<DeclaredParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_status: Option<u16>,
    pub error_statuses: Vec<u16>,
}

impl EndpointDescriptor {
    pub fn new(method: HttpMethod, path: &str, handler_identifier: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
            handler_identifier: handler_identifier.to_string(),
            auth: None,
            description: None,
            tags: Vec::new(),
            parameters: Vec::new(),
            request_schema: None,
            response_schema: None,
            response_status: None,
            error_statuses: Vec::new(),
        }
    }
}

/// Result of one enhancement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnhanceOutcome {
    /// A handler matched and supplied at least one body schema
    Matched { handler: String },
    /// A handler matched but neither a request nor a response shape is known
    MatchedWithoutSchema { handler: String },
    /// No handler variant matched; the descriptor was left untouched
    Unmatched,
}

impl EnhanceOutcome {
    pub fn is_match(&self) -> bool {
        !matches!(self, EnhanceOutcome::Unmatched)
    }

    pub fn handler(&self) -> Option<&str> {
        match self {
            EnhanceOutcome::Matched { handler } | EnhanceOutcome::MatchedWithoutSchema { handler } => {
                Some(handler)
            }
            EnhanceOutcome::Unmatched => None,
        }
    }
}

/// Names tried for a handler identifier, in order: as given, without its
/// namespace, and without namespace and conventional affix.
pub fn candidate_names(identifier: &str, conventions: &Conventions) -> Vec<String> {
    let mut names = vec![identifier.to_string()];

    let bare = identifier
        .rsplit("::")
        .next()
        .and_then(|s| s.rsplit('.').next())
        .unwrap_or(identifier);
    if !names.iter().any(|n| n == bare) {
        names.push(bare.to_string());
    }
    if let Some(stripped) = conventions.strip_handler_affixes(bare) {
        if !names.iter().any(|n| n == stripped) {
            names.push(stripped.to_string());
        }
    }
    names
}

/// Matches `endpoint` against handlers through `lookup` and copies the analysis
/// of the first match onto it.
pub fn enhance<'h>(
    endpoint: &mut EndpointDescriptor,
    conventions: &Conventions,
    lookup: impl Fn(&str) -> Option<&'h HandlerDescriptor>,
) -> EnhanceOutcome {
    let candidates = candidate_names(&endpoint.handler_identifier, conventions);
    let Some(handler) = candidates.iter().find_map(|name| lookup(name)) else {
        warn!(
            "No handler matches {} {} ({})",
            endpoint.method.as_str(),
            endpoint.path,
            endpoint.handler_identifier
        );
        return EnhanceOutcome::Unmatched;
    };

    debug!(
        "Endpoint {} {} matched handler {}",
        endpoint.method.as_str(),
        endpoint.path,
        handler.qualified_name()
    );
    apply(endpoint, handler);

    let handler_name = handler.qualified_name();
    let known_response = handler
        .response_schema
        .as_ref()
        .is_some_and(|schema| !schema.is_untyped_object());
    if handler.request_schema.is_none() && !known_response {
        EnhanceOutcome::MatchedWithoutSchema {
            handler: handler_name,
        }
    } else {
        EnhanceOutcome::Matched {
            handler: handler_name,
        }
    }
}

fn apply(endpoint: &mut EndpointDescriptor, handler: &HandlerDescriptor) {
    endpoint.auth = Some(AuthInfo {
        required: handler.auth_required,
        category: handler.auth_category,
    });
    if handler.description.is_some() {
        endpoint.description = handler.description.clone();
    }
    if !handler.tags.is_empty() {
        endpoint.tags = handler.tags.clone();
    }
    if handler.request_schema.is_some() {
        endpoint.request_schema = handler.request_schema.clone();
    }
    if handler.response_schema.is_some() {
        endpoint.response_schema = handler.response_schema.clone();
        endpoint.response_status = Some(handler.success_status);
    }
    endpoint.error_statuses = handler.error_statuses.clone();

    for parameter in &handler.declared_parameters {
        let existing = endpoint
            .parameters
            .iter_mut()
            .find(|p| p.name == parameter.name && p.location == parameter.location);
        match existing {
            Some(slot) => *slot = parameter.clone(),
            // path parameters come from the route template only
            None if parameter.location == ParameterLocation::Path => {}
            None => endpoint.parameters.push(parameter.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn handler(name: &str) -> HandlerDescriptor {
        HandlerDescriptor {
            name: name.to_string(),
            owner: None,
            file: PathBuf::from("src/users.rs"),
            description: Some("Creates a user.".to_string()),
            tags: vec!["users".to_string()],
            variables: IndexMap::new(),
            variable_origins: BTreeMap::new(),
            map_mutations: IndexMap::new(),
            appended_elements: BTreeMap::new(),
            request_type: Some("CreateUser".to_string()),
            request_schema: Some(SchemaNode::reference("CreateUser")),
            response_type: Some("User".to_string()),
            response_schema: Some(SchemaNode::reference("User")),
            success_status: 201,
            error_statuses: vec![409],
            auth_required: true,
            auth_category: Some(AuthCategory::Elevated),
            data_operations: Vec::new(),
            declared_parameters: vec![
                DeclaredParameter {
                    name: "id".to_string(),
                    location: ParameterLocation::Path,
                    required: true,
                    schema: SchemaNode::integer(),
                },
                DeclaredParameter {
                    name: "dry_run".to_string(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: SchemaNode::string(),
                },
            ],
        }
    }

    #[test]
    fn test_candidate_names() {
        let conventions = Conventions::default();
        assert_eq!(
            candidate_names("handlers::users::create_user_handler", &conventions),
            vec![
                "handlers::users::create_user_handler",
                "create_user_handler",
                "create_user"
            ]
        );
        assert_eq!(
            candidate_names("users.handle_list", &conventions),
            vec!["users.handle_list", "handle_list", "list"]
        );
        assert_eq!(candidate_names("ping", &conventions), vec!["ping"]);
    }

    #[test]
    fn test_match_after_namespace_and_suffix_stripping() {
        let conventions = Conventions::default();
        let create = handler("create_user");
        let mut endpoint = EndpointDescriptor::new(
            HttpMethod::Post,
            "/users/{id}",
            "handlers::users::create_user_handler",
        );
        endpoint.parameters.push(DeclaredParameter {
            name: "id".to_string(),
            location: ParameterLocation::Path,
            required: true,
            schema: SchemaNode::string(),
        });

        let outcome = enhance(&mut endpoint, &conventions, |name| {
            (name == "create_user").then_some(&create)
        });

        assert_eq!(
            outcome,
            EnhanceOutcome::Matched {
                handler: "create_user".to_string()
            }
        );
        assert_eq!(endpoint.request_schema, Some(SchemaNode::reference("CreateUser")));
        assert_eq!(endpoint.response_status, Some(201));
        assert_eq!(endpoint.tags, vec!["users"]);
        assert_eq!(endpoint.auth.and_then(|a| a.category), Some(AuthCategory::Elevated));
        assert_eq!(endpoint.parameters.len(), 2);
        assert_eq!(endpoint.parameters[0].schema, SchemaNode::integer());
    }

    #[test]
    fn test_unmatched_leaves_descriptor_untouched() {
        let conventions = Conventions::default();
        let create = handler("create_user");
        let mut endpoint = EndpointDescriptor::new(HttpMethod::Get, "/health", "health_check");
        endpoint.description = Some("Liveness probe".to_string());
        let before = endpoint.clone();

        let outcome = enhance(&mut endpoint, &conventions, |name| {
            (name == "create_user").then_some(&create)
        });

        assert_eq!(outcome, EnhanceOutcome::Unmatched);
        assert_eq!(endpoint, before);
    }

    #[test]
    fn test_matched_without_schema() {
        let conventions = Conventions::default();
        let mut ping = handler("ping");
        ping.request_schema = None;
        ping.response_schema = None;
        let mut endpoint = EndpointDescriptor::new(HttpMethod::Get, "/ping", "ping");

        let outcome = enhance(&mut endpoint, &conventions, |name| {
            (name == "ping").then_some(&ping)
        });

        assert_eq!(outcome.handler(), Some("ping"));
        assert!(matches!(outcome, EnhanceOutcome::MatchedWithoutSchema { .. }));
        assert!(endpoint.response_status.is_none());
    }

    #[test]
    fn test_untyped_response_is_matched_without_schema() {
        let conventions = Conventions::default();
        let mut ping = handler("ping");
        ping.request_schema = None;
        ping.response_schema = Some(SchemaNode::untyped_object());
        ping.success_status = 200;
        let mut endpoint = EndpointDescriptor::new(HttpMethod::Get, "/ping", "ping");

        let outcome = enhance(&mut endpoint, &conventions, |name| {
            (name == "ping").then_some(&ping)
        });

        assert!(matches!(outcome, EnhanceOutcome::MatchedWithoutSchema { .. }));
        assert_eq!(endpoint.response_schema, Some(SchemaNode::untyped_object()));
        assert_eq!(endpoint.response_status, Some(200));
    }
}
