use openapi_from_source::{
    conventions::{AuthCategory, Conventions, DataOperation},
    discovery::{DocumentationSource, SourceRegistry},
    enhancer::{EndpointDescriptor, EnhanceOutcome},
    handler::ParameterLocation,
    openapi_builder::OpenApiBuilder,
    parser::AstParser,
    routes::{actix::ActixExtractor, axum::AxumExtractor, HttpMethod, RouteExtractor},
    schema::{PrimitiveKind, SchemaNode},
    schema_synth::SchemaSynthesizer,
    type_registry::TypeRegistry,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::Path;
use tempfile::TempDir;

const AXUM_HANDLERS: &str = include_str!("fixtures/axum_project.rs");
const MODELS: &str = include_str!("fixtures/models.rs");
const ACTIX_SERVICE: &str = include_str!("fixtures/actix_project.rs");

const AXUM_MAIN: &str = r#"
use axum::{routing::get, Router};

mod handlers;
mod models;

#[tokio::main]
async fn main() {
    let app = Router::new()
        .nest("/api", api())
        .route("/health", get(health));
    serve(app).await;
}

fn api() -> Router {
    Router::new()
        .route("/users", get(handlers::users::list_users).post(handlers::users::create_user_handler))
        .route("/users/:id", get(handlers::users::get_user_handler).delete(handlers::users::delete_user_handler))
        .route("/users/stats", get(handlers::users::user_stats))
        .route("/users/:id/audit", get(handlers::users::audit))
}

async fn health() -> &'static str {
    "ok"
}
"#;

/// Helper function to create a temporary test project
fn create_test_project(files: Vec<(&str, &str)>) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        let file_path = temp_dir.path().join(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(&file_path, content).expect("Failed to write test file");
    }

    temp_dir
}

fn axum_project(extra: Vec<(&'static str, &'static str)>) -> TempDir {
    let mut files = vec![
        (
            "Cargo.toml",
            "[package]\nname = \"shop\"\nversion = \"0.1.0\"\nedition = \"2021\"\n",
        ),
        ("src/main.rs", AXUM_MAIN),
        ("src/models.rs", MODELS),
        ("src/handlers/mod.rs", "pub mod users;\n"),
        ("src/handlers/users.rs", AXUM_HANDLERS),
    ];
    files.extend(extra);
    create_test_project(files)
}

fn extract(extractor: &dyn RouteExtractor, file: &Path) -> Vec<EndpointDescriptor> {
    let parsed = AstParser::parse_file(file).expect("Failed to parse router");
    extractor.extract_routes(&[parsed])
}

fn find<'a>(endpoints: &'a [EndpointDescriptor], method: HttpMethod, path: &str) -> &'a EndpointDescriptor {
    endpoints
        .iter()
        .find(|e| e.method == method && e.path == path)
        .unwrap_or_else(|| panic!("No endpoint {:?} {}", method, path))
}

#[test]
fn test_axum_service_end_to_end() {
    let temp_dir = axum_project(vec![]);
    let registry = SourceRegistry::new(Conventions::default());

    let report = registry.discover(temp_dir.path()).expect("Discovery failed");
    assert_eq!(report.marked_files, 1);
    assert_eq!(report.imported_files, 1);
    assert_eq!(report.handlers, 6);
    assert_eq!(report.parse_errors, 0);

    let mut endpoints = extract(&AxumExtractor, &temp_dir.path().join("src/main.rs"));
    assert_eq!(endpoints.len(), 7);
    let health_before = find(&endpoints, HttpMethod::Get, "/health").clone();

    let outcomes: Vec<EnhanceOutcome> = endpoints
        .iter_mut()
        .map(|endpoint| registry.enhance_endpoint(endpoint))
        .collect();
    let unmatched = outcomes.iter().filter(|o| !o.is_match()).count();
    assert_eq!(unmatched, 1);

    // Query<ListQuery> expands into parameters
    let list = find(&endpoints, HttpMethod::Get, "/api/users");
    assert_eq!(list.tags, vec!["users"]);
    assert_eq!(list.description.as_deref(), Some("Lists users, newest first."));
    assert_eq!(
        list.response_schema,
        Some(SchemaNode::array(SchemaNode::reference("User")))
    );
    let parameters: Vec<_> = list
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.location, p.required))
        .collect();
    assert_eq!(
        parameters,
        vec![
            ("page", ParameterLocation::Query, false),
            ("per_page", ParameterLocation::Query, false),
            ("search", ParameterLocation::Query, true),
        ]
    );

    let create = find(&endpoints, HttpMethod::Post, "/api/users");
    assert_eq!(create.tags, vec!["accounts", "admin"]);
    assert_eq!(
        create.request_schema,
        Some(SchemaNode::reference("CreateUserRequest"))
    );
    assert_eq!(create.response_schema, Some(SchemaNode::reference("User")));
    assert_eq!(create.response_status, Some(201));
    assert_eq!(create.error_statuses, vec![422]);
    let auth = create.auth.expect("auth info copied");
    assert!(auth.required);
    assert_eq!(auth.category, Some(AuthCategory::Elevated));

    // matched only after stripping the namespace and the `_handler` suffix
    let get = find(&endpoints, HttpMethod::Get, "/api/users/{id}");
    assert_eq!(get.response_schema, Some(SchemaNode::reference("User")));
    assert_eq!(get.parameters.len(), 1);
    assert_eq!(get.parameters[0].name, "id");
    assert_eq!(
        get.parameters[0].schema,
        SchemaNode::integer().with_format("int64")
    );

    let stats = find(&endpoints, HttpMethod::Get, "/api/users/stats");
    let schema = stats.response_schema.as_ref().expect("literal response");
    assert_eq!(schema.property_count(), 4);
    assert_eq!(
        schema.property("total").and_then(|s| s.primitive_kind()),
        Some(PrimitiveKind::Integer)
    );
    assert_eq!(
        schema.property("active_ratio").and_then(|s| s.primitive_kind()),
        Some(PrimitiveKind::Number)
    );
    assert_eq!(
        schema.property("healthy").and_then(|s| s.primitive_kind()),
        Some(PrimitiveKind::Boolean)
    );
    assert_eq!(
        schema.property("computed_at").and_then(|s| s.format()),
        Some("date-time")
    );
    assert!(schema.additional_properties().is_none());

    let delete_index = endpoints
        .iter()
        .position(|e| e.method == HttpMethod::Delete)
        .unwrap();
    assert_eq!(
        outcomes[delete_index],
        EnhanceOutcome::MatchedWithoutSchema {
            handler: "delete_user_handler".to_string()
        }
    );
    assert_eq!(
        endpoints[delete_index].auth.and_then(|a| a.category),
        Some(AuthCategory::Record)
    );

    let audit = find(&endpoints, HttpMethod::Get, "/api/users/{id}/audit");
    assert_eq!(audit.response_schema, Some(SchemaNode::reference("AuditedUser")));

    // no handler named `health`: the descriptor is left as it was
    assert_eq!(find(&endpoints, HttpMethod::Get, "/health"), &health_before);

    let handler = registry.handler_by_name("user_stats").unwrap();
    assert_eq!(handler.map_mutations["stats"].len(), 2);
    assert!(registry.is_enhanced("get_user"));
    assert!(registry.unmatched_handlers().is_empty());

    // document assembly
    let mut builder = OpenApiBuilder::new();
    for endpoint in &endpoints {
        builder.add_endpoint(endpoint);
    }
    builder.add_components(&registry);
    let document = builder.build();
    let components = document.components.expect("components");
    for name in ["User", "Role", "CreateUserRequest", "AuditedUser"] {
        assert!(components.schemas.contains_key(name), "missing {}", name);
    }
    assert_eq!(document.paths.len(), 5);
}

#[test]
fn test_syntax_error_does_not_block_other_files() {
    let temp_dir = axum_project(vec![(
        "src/handlers/broken.rs",
        "// @openapi\npub async fn broken(ctx: &mut Context {\n    ctx.json(200, json!({}))\n}\n",
    )]);
    let registry = SourceRegistry::new(Conventions::default());

    let report = registry.discover(temp_dir.path()).expect("Discovery failed");

    assert_eq!(report.marked_files, 2);
    assert_eq!(report.handlers, 6);
    let errors = registry.parse_errors();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].file.ends_with("src/handlers/broken.rs"));
    assert!(!errors[0].message.is_empty());
    assert!(registry.handler_by_name("broken").is_none());
}

fn models_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    let file = syn::parse_file(MODELS).expect("Failed to parse models");
    registry.register_file(&file, Path::new("src/models.rs"));
    registry.synthesize_all();
    registry
}

#[test]
fn test_struct_reference_and_inline_schemas() {
    let registry = models_registry();
    let synthesizer = SchemaSynthesizer::new(&registry);
    let user = registry.get_struct("User").unwrap();

    assert_eq!(
        synthesizer.type_to_schema("User", false),
        SchemaNode::reference("User")
    );
    assert_eq!(
        Some(synthesizer.type_to_schema("User", true)),
        user.schema.clone()
    );
    // synthesizing again from the same state yields the same node
    assert_eq!(Some(synthesizer.struct_to_schema(user)), user.schema.clone());
}

#[test]
fn test_alias_chain_and_cycle() {
    let registry = models_registry();

    let mut visited = HashSet::new();
    assert_eq!(
        registry.resolve_alias("UserId", &mut visited),
        ("u64".to_string(), true)
    );

    let mut visited = HashSet::new();
    let (canonical, was_alias) = registry.resolve_alias("Ping", &mut visited);
    assert!(was_alias);
    assert!(canonical == "Ping" || canonical == "Pong");
}

#[test]
fn test_user_schema_fields() {
    let registry = models_registry();
    let schema = registry.get_struct("User").unwrap().schema.clone().unwrap();

    assert_eq!(
        schema.property("id"),
        Some(&SchemaNode::integer().with_format("int64"))
    );
    assert_eq!(schema.property("nickname"), Some(&SchemaNode::string().nullable()));
    // pointer to a struct stays a plain reference
    assert_eq!(schema.property("manager"), Some(&SchemaNode::reference("User")));
    assert_eq!(schema.property("role"), Some(&SchemaNode::reference("Role")));
    assert!(schema.property("passwordHash").is_none());
    assert_eq!(schema.required(), ["id", "displayName", "role"]);

    let role = registry.get_enum("Role").unwrap();
    assert_eq!(role.variants, vec!["admin", "member", "read_only"]);
}

#[test]
fn test_embedded_field_collision() {
    let registry = models_registry();
    let schema = registry.get_struct("AuditedUser").unwrap().schema.clone().unwrap();

    assert_eq!(schema.property("name"), Some(&SchemaNode::string()));
    assert_eq!(
        schema.property("revision"),
        Some(&SchemaNode::integer().with_format("int32"))
    );
    assert_eq!(schema.property_count(), 2);
}

#[test]
fn test_actix_service_end_to_end() {
    let temp_dir = create_test_project(vec![("src/main.rs", ACTIX_SERVICE)]);
    let registry = SourceRegistry::new(Conventions::default());

    let report = registry.discover(temp_dir.path()).expect("Discovery failed");
    assert_eq!(report.handlers, 2);
    assert_eq!(registry.struct_by_name("Order").unwrap().fields.len(), 3);

    let mut endpoints = extract(&ActixExtractor, &temp_dir.path().join("src/main.rs"));
    assert_eq!(endpoints.len(), 3);
    let outcomes: Vec<EnhanceOutcome> = endpoints
        .iter_mut()
        .map(|endpoint| registry.enhance_endpoint(endpoint))
        .collect();

    assert_eq!(
        outcomes[0],
        EnhanceOutcome::Matched {
            handler: "create_order".to_string()
        }
    );
    let create = &endpoints[0];
    assert_eq!(create.tags, vec!["orders"]);
    assert_eq!(create.request_schema, Some(SchemaNode::reference("NewOrder")));
    assert_eq!(create.response_schema, Some(SchemaNode::reference("Order")));
    assert_eq!(create.response_status, Some(201));
    assert_eq!(create.error_statuses, vec![400]);
    assert_eq!(create.auth.and_then(|a| a.category), Some(AuthCategory::User));

    assert!(matches!(outcomes[1], EnhanceOutcome::MatchedWithoutSchema { .. }));
    assert_eq!(
        endpoints[1].auth.and_then(|a| a.category),
        Some(AuthCategory::Elevated)
    );
    let cancel = registry.handler_by_name("cancel_order").unwrap();
    assert_eq!(cancel.data_operations, vec![DataOperation::Delete]);

    assert_eq!(outcomes[2], EnhanceOutcome::Unmatched);
}
