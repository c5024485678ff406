use super::{combine_paths, endpoint, handler_identifier, string_literal, HttpMethod, RouteExtractor};
use crate::enhancer::EndpointDescriptor;
use crate::parser::ParsedFile;
use log::debug;
use std::collections::HashMap;
use syn::visit::{self, Visit};
use syn::{Expr, ExprMethodCall};

const MAX_NESTING: usize = 16;

/// Axum route extractor
///
/// Reads `Router::new().route("/users", get(list).post(create))` chains. Routers
/// built by a local function and mounted with `.nest("/api", api_router())` get
/// the mount prefix.
pub struct AxumExtractor;

impl RouteExtractor for AxumExtractor {
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<EndpointDescriptor> {
        // First pass: where each router-building function is mounted
        let mut nests = NestCollector::default();
        for parsed_file in parsed_files {
            nests.visit_file(&parsed_file.syntax_tree);
        }

        let mut visitor = AxumVisitor {
            nests: &nests,
            prefix: String::new(),
            routes: Vec::new(),
        };
        for parsed_file in parsed_files {
            visitor.visit_file(&parsed_file.syntax_tree);
        }

        debug!("Extracted {} axum routes", visitor.routes.len());
        visitor.routes
    }
}

/// Records `.nest(prefix, some_fn())` mounts: child function -> (parent function, prefix).
#[derive(Default)]
struct NestCollector {
    current_fn: Option<String>,
    mounts: HashMap<String, (Option<String>, String)>,
}

impl NestCollector {
    /// Full prefix a router-building function is mounted under.
    fn prefix_of(&self, function: &str) -> String {
        let mut parts = Vec::new();
        let mut current = Some(function.to_string());
        while let Some(name) = current {
            if parts.len() >= MAX_NESTING {
                break;
            }
            match self.mounts.get(&name) {
                Some((parent, prefix)) => {
                    parts.push(prefix.clone());
                    current = parent.clone();
                }
                None => current = None,
            }
        }
        parts
            .iter()
            .rev()
            .fold(String::new(), |acc, part| combine_paths(&acc, part))
    }
}

impl<'ast> Visit<'ast> for NestCollector {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let outer = self.current_fn.replace(node.sig.ident.to_string());
        visit::visit_item_fn(self, node);
        self.current_fn = outer;
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        if node.method == "nest" && node.args.len() == 2 {
            if let (Some(prefix), Expr::Call(call)) = (string_literal(&node.args[0]), &node.args[1]) {
                if let Some(child) = handler_identifier(&call.func) {
                    let child = child.rsplit("::").next().unwrap_or(&child).to_string();
                    debug!("Router {} mounted at {}", child, prefix);
                    self.mounts.insert(child, (self.current_fn.clone(), prefix));
                }
            }
        }
        visit::visit_expr_method_call(self, node);
    }
}

/// Visitor for traversing the AST and finding Axum routes
struct AxumVisitor<'n> {
    nests: &'n NestCollector,
    prefix: String,
    routes: Vec<EndpointDescriptor>,
}

impl AxumVisitor<'_> {
    /// Parse a `.route(path, method_router)` call
    fn parse_route_method(&mut self, expr: &ExprMethodCall) {
        if expr.args.len() < 2 {
            return;
        }
        let Some(path) = string_literal(&expr.args[0]) else {
            return;
        };
        let full_path = combine_paths(&self.prefix, &path);

        let mut methods = Vec::new();
        method_router(&expr.args[1], &mut methods);
        for (method, handler) in methods {
            debug!("Route {} {} -> {}", method.as_str(), full_path, handler);
            self.routes.push(endpoint(method, &full_path, &handler));
        }
    }
}

/// `get(list).post(create)` -> [(GET, list), (POST, create)], in source order.
fn method_router(expr: &Expr, out: &mut Vec<(HttpMethod, String)>) {
    match expr {
        Expr::MethodCall(call) => {
            method_router(&call.receiver, out);
            if let (Some(method), Some(handler)) = (
                HttpMethod::parse(&call.method.to_string()),
                call.args.first().and_then(handler_identifier),
            ) {
                out.push((method, handler));
            }
        }
        Expr::Call(call) => {
            let Expr::Path(func) = call.func.as_ref() else {
                return;
            };
            let method = func
                .path
                .segments
                .last()
                .and_then(|s| HttpMethod::parse(&s.ident.to_string()));
            if let (Some(method), Some(handler)) =
                (method, call.args.first().and_then(handler_identifier))
            {
                out.push((method, handler));
            }
        }
        _ => {}
    }
}

impl<'ast> Visit<'ast> for AxumVisitor<'_> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let prefix = self.nests.prefix_of(&node.sig.ident.to_string());
        let outer = std::mem::replace(&mut self.prefix, prefix);
        visit::visit_item_fn(self, node);
        self.prefix = outer;
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        match node.method.to_string().as_str() {
            "route" => {
                self.parse_route_method(node);
                self.visit_expr(&node.receiver);
            }
            // `.nest("/api", Router::new().route(..))`
            "nest" if node.args.len() == 2 && !matches!(node.args[1], Expr::Call(_)) => {
                self.visit_expr(&node.receiver);
                if let Some(path) = string_literal(&node.args[0]) {
                    let nested = combine_paths(&self.prefix, &path);
                    let outer = std::mem::replace(&mut self.prefix, nested);
                    self.visit_expr(&node.args[1]);
                    self.prefix = outer;
                }
            }
            _ => visit::visit_expr_method_call(self, node),
        }
    }
}
