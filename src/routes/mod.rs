//! Route tables for the CLI.
//!
//! The analysis engine only needs `{method, path, handler}` triples. They are
//! either read statically from router code ([`axum::AxumExtractor`],
//! [`actix::ActixExtractor`]) or listed in a YAML routes file:
//!
//! ```yaml
//! - method: POST
//!   path: /users
//!   handler: handlers::users::create_user_handler
//! ```

pub mod actix;
pub mod axum;

use crate::cli::Framework;
use crate::enhancer::EndpointDescriptor;
use crate::error::{Error, Result};
use crate::handler::{DeclaredParameter, ParameterLocation};
use crate::manifest::import_paths;
use crate::parser::ParsedFile;
use crate::schema::SchemaNode;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Extracts endpoint descriptors from parsed router code.
pub trait RouteExtractor {
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<EndpointDescriptor>;
}

/// Extractor reading the routing code of `framework`.
pub fn extractor_for(framework: Framework) -> Box<dyn RouteExtractor> {
    match framework {
        Framework::Axum => Box::new(axum::AxumExtractor),
        Framework::ActixWeb => Box::new(actix::ActixExtractor),
    }
}

/// Web frameworks imported anywhere in `parsed_files`, in order of first use.
pub fn detect_frameworks(parsed_files: &[ParsedFile]) -> Vec<Framework> {
    let mut detected = Vec::new();
    for parsed_file in parsed_files {
        for path in import_paths(&parsed_file.syntax_tree) {
            let framework = match path.first().map(String::as_str) {
                Some("axum") => Framework::Axum,
                Some("actix_web") => Framework::ActixWeb,
                _ => continue,
            };
            if !detected.contains(&framework) {
                debug!("Detected {:?} in {}", framework, parsed_file.path.display());
                detected.push(framework);
            }
        }
    }
    detected
}

/// HTTP methods supported by route extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Options,
    Head,
}

impl HttpMethod {
    /// Parses a method name in any case: `get`, `POST`.
    pub fn parse(method: &str) -> Option<Self> {
        match method.to_lowercase().as_str() {
            "get" => Some(HttpMethod::Get),
            "post" => Some(HttpMethod::Post),
            "put" => Some(HttpMethod::Put),
            "delete" => Some(HttpMethod::Delete),
            "patch" => Some(HttpMethod::Patch),
            "head" => Some(HttpMethod::Head),
            "options" => Some(HttpMethod::Options),
            _ => None,
        }
    }

    /// Lowercase name, as used for OpenAPI path item keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "get",
            HttpMethod::Post => "post",
            HttpMethod::Put => "put",
            HttpMethod::Delete => "delete",
            HttpMethod::Patch => "patch",
            HttpMethod::Options => "options",
            HttpMethod::Head => "head",
        }
    }
}

/// Entry of a YAML routes file.
#[derive(Debug, Clone, Deserialize)]
struct RouteEntry {
    method: HttpMethod,
    path: String,
    handler: String,
}

/// Reads endpoint descriptors from a YAML routes file.
pub fn load_routes_file(path: &Path) -> Result<Vec<EndpointDescriptor>> {
    let content = fs::read_to_string(path)?;
    let entries: Vec<RouteEntry> = serde_yaml::from_str(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    debug!("Loaded {} routes from {}", entries.len(), path.display());

    Ok(entries
        .into_iter()
        .map(|entry| endpoint(entry.method, &entry.path, &entry.handler))
        .collect())
}

/// Builds a descriptor for a route, normalizing its path template and declaring
/// its path parameters.
pub fn endpoint(method: HttpMethod, path: &str, handler: &str) -> EndpointDescriptor {
    let path = normalize_path(path);
    let mut descriptor = EndpointDescriptor::new(method, &path, handler);
    descriptor.parameters = path_parameters(&path);
    descriptor
}

/// Joins a router prefix and a route path with exactly one slash between them.
pub fn combine_paths(prefix: &str, path: &str) -> String {
    if prefix.is_empty() {
        return path.to_string();
    }

    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, path)
    }
}

/// `/users/:id/*rest` -> `/users/{id}/{rest}`.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| match segment.strip_prefix(':').or_else(|| segment.strip_prefix('*')) {
            Some(name) if !name.is_empty() => format!("{{{}}}", name),
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Path parameters of a normalized path template, typed as strings until a
/// handler's `Path<T>` extractor says otherwise.
pub fn path_parameters(path: &str) -> Vec<DeclaredParameter> {
    path.split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .map(|name| {
            // actix allows `{id:\d+}`
            let name = name.split(':').next().unwrap_or(name);
            DeclaredParameter {
                name: name.to_string(),
                location: ParameterLocation::Path,
                required: true,
                schema: SchemaNode::string(),
            }
        })
        .collect()
}

/// `handlers::users::create` from a handler expression such as
/// `handlers::users::create` or `web::get().to(create)`.
pub(crate) fn handler_identifier(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Path(path) => Some(
            path.path
                .segments
                .iter()
                .map(|s| s.ident.to_string())
                .collect::<Vec<_>>()
                .join("::"),
        ),
        syn::Expr::Reference(r) => handler_identifier(&r.expr),
        syn::Expr::Paren(p) => handler_identifier(&p.expr),
        _ => None,
    }
}

pub(crate) fn string_literal(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(s),
            ..
        }) => Some(s.value()),
        _ => None,
    }
}
