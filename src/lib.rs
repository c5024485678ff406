//! OpenAPI From Source - request and response schemas from handler code.
//!
//! This library statically analyzes the source of a Rust web service and derives,
//! for every request handler, what it reads and what it writes: the request body
//! type, the shape of the JSON it emits (down to keys added after construction),
//! status codes, query and path parameters, authentication requirements and
//! data-access operations. Record types are registered once and turned into
//! JSON-Schema-compatible [`schema::SchemaNode`]s.
//!
//! Only files carrying the opt-in marker comment (`// @openapi` by default) are
//! analyzed for handlers. Same-project modules they import contribute their type
//! declarations.
//!
//! # Architecture
//!
//! 1. [`scanner`] - Finds Rust files and the ones carrying the marker
//! 2. [`parser`] - Parses files with `syn`, recording failures instead of aborting
//! 3. [`type_registry`] - Registers structs, enums and aliases (pass 1) and caches their schemas (pass 2)
//! 4. [`schema_synth`] - Converts type descriptors to schema nodes
//! 5. [`inference`] - Infers the type and shape of expressions
//! 6. [`handler`] - Walks handler bodies into [`handler::HandlerDescriptor`]s
//! 7. [`discovery`] - Orchestrates the above behind [`discovery::SourceRegistry`]
//! 8. [`enhancer`] - Copies handler analysis onto route descriptors
//! 9. [`routes`], [`openapi_builder`], [`serializer`] - Route tables and the CLI's document output
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_from_source::conventions::Conventions;
//! use openapi_from_source::discovery::{DocumentationSource, SourceRegistry};
//! use openapi_from_source::enhancer::EndpointDescriptor;
//! use openapi_from_source::routes::HttpMethod;
//! use std::path::Path;
//!
//! let registry = SourceRegistry::new(Conventions::default());
//! registry.discover(Path::new("./my-service")).unwrap();
//!
//! let mut endpoint = EndpointDescriptor::new(
//!     HttpMethod::Post,
//!     "/users",
//!     "handlers::users::create_user_handler",
//! );
//! let outcome = registry.enhance_endpoint(&mut endpoint);
//! println!("{:?}: {:?}", outcome, endpoint.response_schema);
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod cli;
pub mod conventions;
pub mod discovery;
pub mod enhancer;
pub mod error;
pub mod function_table;
pub mod handler;
pub mod inference;
pub mod manifest;
pub mod openapi_builder;
pub mod parser;
pub mod routes;
pub mod scanner;
pub mod schema;
pub mod schema_synth;
pub mod serializer;
pub mod type_registry;
pub mod type_string;
