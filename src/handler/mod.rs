//! Handler analysis.
//!
//! A handler is a function whose signature mentions a request context, an
//! extractor, or a response type. Each one is analyzed with a single forward walk
//! of its body ([`walker::FunctionWalker`]); the findings are then resolved into a
//! [`HandlerDescriptor`] that owns no syntax nodes and can be shared across threads.

pub mod status;
pub mod walker;

use crate::conventions::{AuthCategory, Conventions, DataOperation};
use crate::function_table::FunctionReturnTable;
use crate::inference::strategy::{
    default_strategies, resolve_shape, ShapeCandidates, ShapeStrategy, FALLBACK_STRATEGY,
};
use crate::inference::{unwrap_fallible, InferenceEngine};
use crate::parser::{doc_lines, ParsedFile};
use crate::schema::SchemaNode;
use crate::type_registry::TypeRegistry;
use crate::type_string::{base_name, last_segment, render_type, render_type_with_self, split_generics};
use indexmap::IndexMap;
use log::{debug, info};
use quote::ToTokens;
use serde::Serialize;
use status::is_success;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use syn::visit::Visit;
use walker::FunctionWalker;

/// Where a declared parameter is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
}

/// A parameter read by the handler, from its extractors or its body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeclaredParameter {
    pub name: String,
    pub location: ParameterLocation,
    pub required: bool,
    pub schema: SchemaNode,
}

/// A key assigned to a map-like variable after it was built, rendered as source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedMutation {
    pub key: String,
    pub value: String,
}

/// Everything learned about one handler.
///
/// Built once per handler; read-only afterwards. Expressions are kept as rendered
/// source text so the descriptor is `Send + Sync`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerDescriptor {
    /// Function identifier
    pub name: String,
    /// Type of the enclosing `impl` block, for methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    pub file: PathBuf,
    /// Text of the `///` doc comment, without `@tag` lines
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Variable name -> tracked type descriptor
    pub variables: IndexMap<String, String>,
    /// Variable name -> right-hand side of its latest binding
    pub variable_origins: BTreeMap<String, String>,
    /// Variable name -> keys assigned after construction, in order
    pub map_mutations: IndexMap<String, Vec<RenderedMutation>>,
    /// Variable name -> last element pushed onto it
    pub appended_elements: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_schema: Option<SchemaNode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<SchemaNode>,
    /// Status of the emission the response schema came from
    pub success_status: u16,
    /// Non-2xx statuses emitted anywhere in the body
    pub error_statuses: Vec<u16>,
    pub auth_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_category: Option<AuthCategory>,
    pub data_operations: Vec<DataOperation>,
    pub declared_parameters: Vec<DeclaredParameter>,
}

impl HandlerDescriptor {
    /// `Owner::name` for methods, `name` for free functions.
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.name),
            None => self.name.clone(),
        }
    }
}

/// Collects the identifiers of every path inside a type.
#[derive(Default)]
struct TypeIdents(Vec<String>);

impl<'ast> Visit<'ast> for TypeIdents {
    fn visit_path_segment(&mut self, segment: &'ast syn::PathSegment) {
        self.0.push(segment.ident.to_string());
        syn::visit::visit_path_segment(self, segment);
    }
}

fn type_idents(ty: &syn::Type) -> Vec<String> {
    let mut idents = TypeIdents::default();
    idents.visit_type(ty);
    idents.0
}

/// Whether a signature marks a request handler.
pub fn is_handler(sig: &syn::Signature, conventions: &Conventions) -> bool {
    let takes_context = sig.inputs.iter().any(|input| match input {
        syn::FnArg::Typed(pat_type) => type_idents(&pat_type.ty).iter().any(|ident| {
            conventions.is_context_type(ident) || conventions.auth_extractor(ident).is_some()
        }),
        syn::FnArg::Receiver(_) => false,
    });
    let returns_response = match &sig.output {
        syn::ReturnType::Type(_, ty) => type_idents(ty)
            .iter()
            .any(|ident| conventions.is_response_type(ident)),
        syn::ReturnType::Default => false,
    };
    takes_context || returns_response
}

/// Analyzes every handler in a parsed file.
pub fn analyze_file(
    parsed: &ParsedFile,
    registry: &TypeRegistry,
    conventions: &Conventions,
) -> Vec<HandlerDescriptor> {
    let functions = FunctionReturnTable::build(&parsed.syntax_tree, registry, conventions);
    let engine = InferenceEngine::new(registry, &functions, conventions);
    let analyzer = HandlerAnalyzer::new(&engine, &parsed.path);

    let mut handlers = Vec::new();
    analyzer.analyze_items(&parsed.syntax_tree.items, &mut handlers);

    info!(
        "Analyzed {} handlers in {}",
        handlers.len(),
        parsed.path.display()
    );
    handlers
}

/// Turns handler functions of one file into descriptors.
pub struct HandlerAnalyzer<'e> {
    engine: &'e InferenceEngine<'e>,
    strategies: Vec<Box<dyn ShapeStrategy>>,
    file: &'e Path,
}

impl<'e> HandlerAnalyzer<'e> {
    pub fn new(engine: &'e InferenceEngine<'e>, file: &'e Path) -> Self {
        Self {
            engine,
            strategies: default_strategies(),
            file,
        }
    }

    fn analyze_items(&self, items: &[syn::Item], out: &mut Vec<HandlerDescriptor>) {
        let conventions = self.engine.conventions();
        for item in items {
            match item {
                syn::Item::Fn(item_fn) if is_handler(&item_fn.sig, conventions) => {
                    out.push(self.analyze(&item_fn.sig, &item_fn.attrs, &item_fn.block, None));
                }
                syn::Item::Impl(item_impl) if item_impl.trait_.is_none() => {
                    let owner = base_name(&render_type(&item_impl.self_ty)).to_string();
                    for impl_item in &item_impl.items {
                        if let syn::ImplItem::Fn(method) = impl_item {
                            if is_handler(&method.sig, conventions) {
                                out.push(self.analyze(
                                    &method.sig,
                                    &method.attrs,
                                    &method.block,
                                    Some(owner.clone()),
                                ));
                            }
                        }
                    }
                }
                syn::Item::Mod(item_mod) => {
                    if let Some((_, nested)) = &item_mod.content {
                        self.analyze_items(nested, out);
                    }
                }
                _ => {}
            }
        }
    }

    /// Analyzes one handler function.
    pub fn analyze<'ast>(
        &self,
        sig: &'ast syn::Signature,
        attrs: &[syn::Attribute],
        block: &'ast syn::Block,
        owner: Option<String>,
    ) -> HandlerDescriptor {
        let name = sig.ident.to_string();
        debug!("Analyzing handler {}", name);

        let mut walker = FunctionWalker::new(self.engine, owner.clone());
        let signature = self.inspect_parameters(sig, &mut walker, owner.as_deref());
        walker.walk(block);

        let scope = &walker.scope;
        let findings = &walker.findings;
        let registry = self.engine.registry();
        let synthesizer = self.engine.synthesizer();

        let declared = signature_response(sig, owner.as_deref()).map(|type_name| {
            let canonical = registry.canonical_name(&type_name);
            let schema = synthesizer.type_to_schema(&canonical, false);
            (Some(canonical), schema)
        });

        // first successful (or status-less) emission wins the response
        let mut response: Option<(Option<String>, SchemaNode, u16)> = None;
        let mut error_statuses = Vec::new();
        for emission in &findings.emissions {
            match emission.status {
                Some(code) if !is_success(code) => {
                    if !error_statuses.contains(&code) {
                        error_statuses.push(code);
                    }
                }
                status if response.is_none() => {
                    let candidates = ShapeCandidates::new(emission.payload, scope);
                    let shape = resolve_shape(&self.strategies, self.engine, &candidates, scope);
                    debug!(
                        "Response of {} resolved by {} strategy",
                        name, shape.strategy
                    );
                    let status = status.unwrap_or(200);
                    // a declared `Json<T>` beats the untyped fallback
                    response = match (&declared, shape.strategy) {
                        (Some((type_name, schema)), FALLBACK_STRATEGY) => {
                            Some((type_name.clone(), schema.clone(), status))
                        }
                        _ => Some((shape.type_name, shape.schema, status)),
                    };
                }
                _ => {}
            }
        }

        let (response_type, response_schema, success_status) = match response {
            Some((type_name, schema, status)) => (type_name, Some(schema), status),
            None => match declared {
                Some((type_name, schema)) => (type_name, Some(schema), 200),
                None => (None, Some(SchemaNode::untyped_object()), 200),
            },
        };
        let response_type = response_type.map(|t| registry.canonical_name(&unwrap_fallible(&t)));

        let request_type = findings
            .request_type
            .clone()
            .or(signature.request_type)
            .map(|t| registry.canonical_name(&t));
        let request_schema = request_type
            .as_ref()
            .map(|t| synthesizer.type_to_schema(t, false));

        let mut declared_parameters = signature.parameters;
        for parameter in &findings.query_parameters {
            let known = declared_parameters
                .iter()
                .any(|p| p.location == ParameterLocation::Query && &p.name == parameter);
            if !known {
                declared_parameters.push(DeclaredParameter {
                    name: parameter.clone(),
                    location: ParameterLocation::Query,
                    required: false,
                    schema: SchemaNode::string(),
                });
            }
        }

        let auth = match (findings.auth, signature.auth) {
            (Some(AuthCategory::Elevated), _) | (_, Some(AuthCategory::Elevated)) => {
                Some(AuthCategory::Elevated)
            }
            (body, extractor) => body.or(extractor),
        };

        let docs = doc_lines(attrs);
        let mut tags: Vec<String> = docs
            .iter()
            .filter_map(|line| line.strip_prefix("@tag"))
            .flat_map(|rest| rest.split(','))
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if tags.is_empty() {
            tags.extend(default_tag(self.file));
        }
        let description: Vec<&str> = docs
            .iter()
            .filter(|line| !line.starts_with("@tag"))
            .map(String::as_str)
            .collect();

        let map_mutations = scope
            .mutations
            .iter()
            .map(|(variable, mutations)| {
                let rendered = mutations
                    .iter()
                    .map(|m| RenderedMutation {
                        key: m.key.clone(),
                        value: render_expr(m.value),
                    })
                    .collect();
                (variable.clone(), rendered)
            })
            .collect();

        HandlerDescriptor {
            name,
            owner,
            file: self.file.to_path_buf(),
            description: (!description.is_empty()).then(|| description.join("\n")),
            tags,
            variables: scope.variables.clone(),
            variable_origins: scope
                .origins
                .iter()
                .map(|(k, v)| (k.clone(), render_expr(v)))
                .collect(),
            map_mutations,
            appended_elements: scope
                .appended
                .iter()
                .map(|(k, v)| (k.clone(), render_expr(v)))
                .collect(),
            request_type,
            request_schema,
            response_type,
            response_schema,
            success_status,
            error_statuses,
            auth_required: auth.is_some(),
            auth_category: auth,
            data_operations: findings.data_operations.clone(),
            declared_parameters,
        }
    }

    /// Seeds parameter bindings and reads extractor types.
    fn inspect_parameters(
        &self,
        sig: &syn::Signature,
        walker: &mut FunctionWalker<'_, '_>,
        owner: Option<&str>,
    ) -> SignatureFindings {
        let conventions = self.engine.conventions();
        let synthesizer = self.engine.synthesizer();
        let registry = self.engine.registry();
        let mut findings = SignatureFindings::default();

        for input in &sig.inputs {
            let syn::FnArg::Typed(pat_type) = input else {
                continue;
            };
            let rendered = render_type_with_self(&pat_type.ty, owner);
            let (base, _) = split_generics(&rendered);
            let extractor = last_segment(base);
            let inner = extractor_argument(&pat_type.ty);
            let inner_name = inner.map(|ty| render_type_with_self(ty, owner));

            if let Some(category) = conventions.auth_extractor(extractor) {
                findings.auth = Some(category);
            }

            match (extractor, &inner_name) {
                ("Json" | "Form", Some(body)) => {
                    debug!("Request body extractor {}<{}>", extractor, body);
                    findings.request_type = Some(body.clone());
                }
                ("Query", Some(query)) => {
                    match registry.get_struct(query) {
                        Some(descriptor) => {
                            for field in descriptor.fields.values() {
                                findings.parameters.push(DeclaredParameter {
                                    name: field.serialized_name.clone(),
                                    location: ParameterLocation::Query,
                                    required: !(field.is_pointer
                                        || field.omit_when_empty
                                        || field.has_default),
                                    schema: synthesizer.type_to_schema(&field.declared_type, false),
                                });
                            }
                        }
                        None => {
                            // `Query(params): Query<HashMap<String, String>>`
                            if let Some(name) = inner_binding(&pat_type.pat) {
                                walker.mark_query_variable(&name);
                            }
                        }
                    }
                }
                ("Path", Some(path)) => {
                    self.path_parameters(&pat_type.pat, inner, path, &mut findings);
                }
                _ => {}
            }

            let bound = if is_extractor(extractor) { inner_name } else { Some(rendered.clone()) };
            match pat_type.pat.as_ref() {
                syn::Pat::Ident(pat_ident) => {
                    walker.declare(&pat_ident.ident.to_string(), Some(rendered.clone()));
                }
                pat => {
                    if let Some(name) = inner_binding(pat) {
                        walker.declare(&name, bound);
                    }
                }
            }
        }

        findings
    }

    fn path_parameters(
        &self,
        pat: &syn::Pat,
        inner: Option<&syn::Type>,
        inner_name: &str,
        findings: &mut SignatureFindings,
    ) {
        let synthesizer = self.engine.synthesizer();

        if let Some(descriptor) = self.engine.registry().get_struct(inner_name) {
            for field in descriptor.fields.values() {
                findings.parameters.push(DeclaredParameter {
                    name: field.serialized_name.clone(),
                    location: ParameterLocation::Path,
                    required: true,
                    schema: synthesizer.type_to_schema(&field.declared_type, false),
                });
            }
            return;
        }

        let syn::Pat::TupleStruct(tuple) = pat else {
            return;
        };
        let Some(binding) = tuple.elems.first() else {
            return;
        };

        let mut push = |name: String, ty: Option<&syn::Type>| {
            let schema = ty
                .map(|ty| synthesizer.type_to_schema(&render_type(ty), false))
                .unwrap_or_else(SchemaNode::string);
            findings.parameters.push(DeclaredParameter {
                name,
                location: ParameterLocation::Path,
                required: true,
                schema,
            });
        };

        match (binding, inner) {
            // `Path((user_id, post_id)): Path<(u64, u64)>`
            (syn::Pat::Tuple(names), Some(syn::Type::Tuple(types))) => {
                for (name, ty) in names.elems.iter().zip(types.elems.iter()) {
                    if let syn::Pat::Ident(ident) = name {
                        push(ident.ident.to_string(), Some(ty));
                    }
                }
            }
            (syn::Pat::Ident(ident), ty) => push(ident.ident.to_string(), ty),
            _ => {}
        }
    }
}

/// Parameters and auth read from the signature alone.
#[derive(Default)]
struct SignatureFindings {
    request_type: Option<String>,
    parameters: Vec<DeclaredParameter>,
    auth: Option<AuthCategory>,
}

fn is_extractor(name: &str) -> bool {
    matches!(
        name,
        "Json" | "Form" | "Query" | "Path" | "State" | "Data" | "Extension"
    )
}

/// First generic argument of an extractor type: `Json<T>` -> `T`.
fn extractor_argument(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

/// Variable bound by a destructuring extractor pattern: `Json(body)` -> `body`.
fn inner_binding(pat: &syn::Pat) -> Option<String> {
    match pat {
        syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
        syn::Pat::TupleStruct(tuple) if tuple.elems.len() == 1 => match tuple.elems.first()? {
            syn::Pat::Ident(ident) => Some(ident.ident.to_string()),
            _ => None,
        },
        _ => None,
    }
}

/// `Json<T>` inside a handler's declared return type, unwrapping `Result`.
fn signature_response(sig: &syn::Signature, owner: Option<&str>) -> Option<String> {
    let syn::ReturnType::Type(_, ty) = &sig.output else {
        return None;
    };
    let rendered = unwrap_fallible(&render_type_with_self(ty, owner));
    let (base, args) = split_generics(&rendered);
    match (last_segment(base), args.first()) {
        ("Json", Some(inner)) => Some(inner.to_string()),
        _ => None,
    }
}

/// Tag derived from the source location: the file stem, or the directory name
/// for `mod.rs` / `lib.rs` / `main.rs`.
fn default_tag(file: &Path) -> Option<String> {
    let stem = file.file_stem()?.to_str()?;
    if matches!(stem, "mod" | "lib" | "main") {
        let parent = file.parent()?.file_name()?.to_str()?;
        return Some(parent.to_string());
    }
    Some(stem.to_string())
}

fn render_expr(expr: &syn::Expr) -> String {
    expr.to_token_stream().to_string()
}
