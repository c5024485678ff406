use crate::discovery::DocumentationSource;
use crate::enhancer::EndpointDescriptor;
use crate::handler::status::reason_phrase;
use crate::handler::ParameterLocation;
use crate::routes::HttpMethod;
use crate::schema::SchemaNode;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

const JSON_MEDIA_TYPE: &str = "application/json";
const BEARER_SCHEME: &str = "bearerAuth";

/// OpenAPI document builder
///
/// Collects enhanced endpoints and the schemas of every discovered type. Paths
/// and components are kept sorted so the output is stable across runs.
pub struct OpenApiBuilder {
    /// OpenAPI info section
    info: Info,
    /// Paths collection (URL path -> PathItem)
    paths: BTreeMap<String, PathItem>,
    /// Named schemas for `components/schemas`
    schemas: BTreeMap<String, SchemaNode>,
    /// Whether any operation requires authentication
    secured: bool,
}

/// OpenAPI Info object
#[derive(Debug, Clone, Serialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, Serialize)]
pub struct PathItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    fn slot(&mut self, method: HttpMethod) -> &mut Option<Operation> {
        match method {
            HttpMethod::Get => &mut self.get,
            HttpMethod::Post => &mut self.post,
            HttpMethod::Put => &mut self.put,
            HttpMethod::Delete => &mut self.delete,
            HttpMethod::Patch => &mut self.patch,
            HttpMethod::Options => &mut self.options,
            HttpMethod::Head => &mut self.head,
        }
    }
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "operationId")]
    pub operation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Status code -> response
    pub responses: BTreeMap<String, Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Vec<BTreeMap<String, Vec<String>>>>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    /// Parameter location (path, query, header)
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaNode,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    pub required: bool,
    /// Content types and their schemas
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, Serialize)]
pub struct MediaType {
    pub schema: SchemaNode,
}

/// OpenAPI Response object
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

/// OpenAPI SecurityScheme object
#[derive(Debug, Clone, Serialize)]
pub struct SecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    pub scheme: String,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Serialize)]
pub struct Components {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub schemas: BTreeMap<String, SchemaNode>,
    #[serde(rename = "securitySchemes", skip_serializing_if = "BTreeMap::is_empty")]
    pub security_schemes: BTreeMap<String, SecurityScheme>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, Serialize)]
pub struct OpenApiDocument {
    pub openapi: String,
    pub info: Info,
    pub paths: BTreeMap<String, PathItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

fn json_content(schema: SchemaNode) -> BTreeMap<String, MediaType> {
    let mut content = BTreeMap::new();
    content.insert(JSON_MEDIA_TYPE.to_string(), MediaType { schema });
    content
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with default info
    pub fn new() -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            info: Info {
                title: "Generated API".to_string(),
                version: "1.0.0".to_string(),
                description: Some("API documentation generated from Rust code".to_string()),
            },
            paths: BTreeMap::new(),
            schemas: BTreeMap::new(),
            secured: false,
        }
    }

    /// Set custom info for the API
    pub fn with_info(mut self, title: String, version: String, description: Option<String>) -> Self {
        self.info = Info {
            title,
            version,
            description,
        };
        self
    }

    /// Adds one endpoint as an operation. A second endpoint with the same method
    /// and path replaces the first.
    pub fn add_endpoint(&mut self, endpoint: &EndpointDescriptor) {
        debug!("Adding operation: {} {}", endpoint.method.as_str(), endpoint.path);

        let parameters = endpoint
            .parameters
            .iter()
            .map(|p| Parameter {
                name: p.name.clone(),
                location: p.location,
                required: p.required,
                schema: p.schema.clone(),
            })
            .collect();

        let request_body = endpoint.request_schema.clone().map(|schema| RequestBody {
            required: true,
            content: json_content(schema),
        });

        let mut responses = BTreeMap::new();
        let status = endpoint.response_status.unwrap_or(200);
        responses.insert(
            status.to_string(),
            Response {
                description: reason_phrase(status).unwrap_or_else(|| "Successful response".to_string()),
                content: endpoint.response_schema.clone().map(json_content),
            },
        );
        for code in &endpoint.error_statuses {
            responses.insert(
                code.to_string(),
                Response {
                    description: reason_phrase(*code).unwrap_or_else(|| "Error response".to_string()),
                    content: None,
                },
            );
        }

        let requires_auth = endpoint.auth.is_some_and(|auth| auth.required);
        self.secured |= requires_auth;
        let security = requires_auth.then(|| {
            let mut requirement = BTreeMap::new();
            requirement.insert(BEARER_SCHEME.to_string(), Vec::new());
            vec![requirement]
        });

        let summary = endpoint
            .description
            .as_deref()
            .and_then(|d| d.lines().next())
            .map(str::to_string);
        let operation_id = endpoint
            .handler_identifier
            .rsplit("::")
            .next()
            .unwrap_or(&endpoint.handler_identifier)
            .to_string();

        let operation = Operation {
            summary,
            description: endpoint.description.clone(),
            operation_id,
            tags: endpoint.tags.clone(),
            parameters,
            request_body,
            responses,
            security,
        };

        let path_item = self.paths.entry(endpoint.path.clone()).or_default();
        *path_item.slot(endpoint.method) = Some(operation);
    }

    /// Adds the schema of every struct and enum known to `source` to the
    /// components section.
    pub fn add_components(&mut self, source: &dyn DocumentationSource) {
        for descriptor in source.all_structs() {
            if let Some(schema) = descriptor.schema {
                self.schemas.insert(descriptor.name, schema);
            }
        }
        for descriptor in source.all_enums() {
            if let Some(schema) = descriptor.schema {
                self.schemas.insert(descriptor.name, schema);
            }
        }
        debug!("Collected {} component schemas", self.schemas.len());
    }

    /// Build the final OpenAPI document
    pub fn build(self) -> OpenApiDocument {
        debug!("Building final OpenAPI document");

        let mut security_schemes = BTreeMap::new();
        if self.secured {
            security_schemes.insert(
                BEARER_SCHEME.to_string(),
                SecurityScheme {
                    scheme_type: "http".to_string(),
                    scheme: "bearer".to_string(),
                },
            );
        }
        let components = (!self.schemas.is_empty() || !security_schemes.is_empty()).then(|| Components {
            schemas: self.schemas,
            security_schemes,
        });

        OpenApiDocument {
            openapi: "3.0.3".to_string(),
            info: self.info,
            paths: self.paths,
            components,
        }
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}
