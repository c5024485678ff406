use super::{combine_paths, endpoint, handler_identifier, string_literal, HttpMethod, RouteExtractor};
use crate::enhancer::EndpointDescriptor;
use crate::parser::ParsedFile;
use log::debug;
use syn::punctuated::Punctuated;
use syn::visit::{self, Visit};
use syn::{Attribute, Expr, ExprMethodCall, Token};

/// Actix-Web route extractor
///
/// Reads route macros (`#[get("/users/{id}")]`) and builder routes
/// (`.route("/users", web::post().to(create_user))`), including those inside a
/// `web::scope("/api")`.
pub struct ActixExtractor;

impl RouteExtractor for ActixExtractor {
    fn extract_routes(&self, parsed_files: &[ParsedFile]) -> Vec<EndpointDescriptor> {
        let mut visitor = ActixVisitor::default();
        for parsed_file in parsed_files {
            visitor.visit_file(&parsed_file.syntax_tree);
        }

        debug!("Extracted {} actix routes", visitor.routes.len());
        visitor.routes
    }
}

/// Visitor for traversing the AST and finding Actix-Web routes
#[derive(Default)]
struct ActixVisitor {
    routes: Vec<EndpointDescriptor>,
    current_scope: String,
}

impl ActixVisitor {
    /// Find and parse route macros (#[get], #[post], etc.)
    fn find_route_macros(&mut self, attrs: &[Attribute], handler: &str) {
        for attr in attrs {
            if let Some((method, path)) = parse_route_macro(attr) {
                debug!("Route macro {} {} -> {}", method.as_str(), path, handler);
                self.routes.push(endpoint(method, &path, handler));
            }
        }
    }

    /// `.route("/path", web::get().to(handler))`
    fn parse_builder_route(&mut self, node: &ExprMethodCall) {
        if node.args.len() != 2 {
            return;
        }
        let Some(path) = string_literal(&node.args[0]) else {
            return;
        };
        if let Some((method, handler)) = route_target(&node.args[1]) {
            let full_path = combine_paths(&self.current_scope, &path);
            self.routes.push(endpoint(method, &full_path, &handler));
        }
    }
}

/// Parse a route macro attribute to extract HTTP method and path
fn parse_route_macro(attr: &Attribute) -> Option<(HttpMethod, String)> {
    let attr_name = attr.path().segments.last()?.ident.to_string();
    let method = HttpMethod::parse(&attr_name)?;

    // `#[get("/path", wrap = "Logger::default()")]`
    let args = attr
        .parse_args_with(Punctuated::<Expr, Token![,]>::parse_terminated)
        .ok()?;
    let path = args.first().and_then(string_literal)?;
    Some((method, path))
}

/// `web::get().to(handler)` -> (GET, handler).
fn route_target(expr: &Expr) -> Option<(HttpMethod, String)> {
    let Expr::MethodCall(to) = expr else {
        return None;
    };
    if to.method != "to" {
        return route_target(&to.receiver);
    }
    let handler = to.args.first().and_then(handler_identifier)?;

    let mut receiver = to.receiver.as_ref();
    loop {
        match receiver {
            // `web::get().guard(..)`
            Expr::MethodCall(inner) => receiver = &inner.receiver,
            Expr::Call(call) => {
                let Expr::Path(func) = call.func.as_ref() else {
                    return None;
                };
                let name = func.path.segments.last()?.ident.to_string();
                return HttpMethod::parse(&name).map(|method| (method, handler));
            }
            _ => return None,
        }
    }
}

/// `web::scope("/api")` at the root of a builder chain.
fn scope_prefix(expr: &Expr) -> Option<String> {
    match expr {
        Expr::MethodCall(call) => scope_prefix(&call.receiver),
        Expr::Call(call) => {
            let Expr::Path(func) = call.func.as_ref() else {
                return None;
            };
            if func.path.segments.last()?.ident != "scope" {
                return None;
            }
            call.args.first().and_then(string_literal)
        }
        _ => None,
    }
}

impl<'ast> Visit<'ast> for ActixVisitor {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.find_route_macros(&node.attrs, &node.sig.ident.to_string());
        visit::visit_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.find_route_macros(&node.attrs, &node.sig.ident.to_string());
        visit::visit_impl_item_fn(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        // arguments of a scoped builder see the scope prefix
        let scoped = scope_prefix(&node.receiver);
        if node.method == "route" {
            let outer = self.current_scope.clone();
            if let Some(scope) = &scoped {
                self.current_scope = combine_paths(&outer, scope);
            }
            self.parse_builder_route(node);
            self.current_scope = outer;
            self.visit_expr(&node.receiver);
            return;
        }

        match scoped {
            Some(scope) => {
                self.visit_expr(&node.receiver);
                let outer = self.current_scope.clone();
                self.current_scope = combine_paths(&outer, &scope);
                for arg in &node.args {
                    self.visit_expr(arg);
                }
                self.current_scope = outer;
            }
            None => visit::visit_expr_method_call(self, node),
        }
    }
}
