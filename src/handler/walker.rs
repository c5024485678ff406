//! Single forward walk over a function body.
//!
//! Bindings are recorded in source order, so each right-hand side is inferred
//! against the bindings declared before it. Everything that needs the complete
//! picture (payload shapes, request schema) is resolved after the walk.

use super::status::{builder_status, status_code_of};
use crate::conventions::{AuthCategory, Conventions, DataOperation};
use crate::inference::literal::{literal_of, string_key};
use crate::inference::{
    ident_of, path_segments, receiver_name, turbofish, unwrap_fallible, FunctionScope,
    InferenceEngine,
};
use crate::type_string::{last_segment, render_type_with_self, split_generics};
use log::debug;
use std::collections::HashSet;
use syn::visit::{self, Visit};

/// A JSON response written by the body.
#[derive(Debug, Clone)]
pub struct Emission<'ast> {
    /// `None` when the status is implicit (200) or not statically known
    pub status: Option<u16>,
    pub payload: &'ast syn::Expr,
}

/// Framework-convention calls found during the walk.
#[derive(Debug, Default)]
pub struct Findings<'ast> {
    pub request_type: Option<String>,
    pub emissions: Vec<Emission<'ast>>,
    pub auth: Option<AuthCategory>,
    /// Deduplicated, in order of first occurrence
    pub data_operations: Vec<DataOperation>,
    /// Deduplicated query-string parameter names, in order of first read
    pub query_parameters: Vec<String>,
    /// Variables holding a query-string accessor
    pub query_variables: HashSet<String>,
    /// Object-shaped literal constructions, in source order
    pub object_literals: Vec<&'ast syn::Expr>,
}

impl Findings<'_> {
    fn set_auth(&mut self, category: AuthCategory) {
        // an elevated requirement is never downgraded
        if self.auth.is_none() || category == AuthCategory::Elevated {
            self.auth = Some(category);
        }
    }

    fn add_operation(&mut self, operation: DataOperation) {
        if !self.data_operations.contains(&operation) {
            self.data_operations.push(operation);
        }
    }

    fn add_query_parameter(&mut self, name: String) {
        if !self.query_parameters.contains(&name) {
            self.query_parameters.push(name);
        }
    }
}

pub struct FunctionWalker<'ast, 'e> {
    engine: &'e InferenceEngine<'e>,
    conventions: &'e Conventions,
    pub scope: FunctionScope<'ast>,
    pub findings: Findings<'ast>,
}

impl<'ast, 'e> FunctionWalker<'ast, 'e> {
    pub fn new(engine: &'e InferenceEngine<'e>, owner: Option<String>) -> Self {
        Self {
            engine,
            conventions: engine.conventions(),
            scope: FunctionScope::new(owner),
            findings: Findings::default(),
        }
    }

    /// Seeds a binding for a parameter before the body is walked.
    pub fn declare(&mut self, name: &str, type_name: Option<String>) {
        self.scope.bind(name, type_name, None);
    }

    pub fn mark_query_variable(&mut self, name: &str) {
        self.findings.query_variables.insert(name.to_string());
    }

    pub fn set_auth(&mut self, category: AuthCategory) {
        self.findings.set_auth(category);
    }

    pub fn walk(&mut self, block: &'ast syn::Block) {
        self.visit_block(block);
        debug!(
            "Walked body: {} bindings, {} emissions, {} mutated variables",
            self.scope.variables.len(),
            self.findings.emissions.len(),
            self.scope.mutations.len()
        );
    }

    fn bind_pattern(&mut self, pat: &'ast syn::Pat, init: &'ast syn::Expr, declared: Option<String>) {
        match pat {
            syn::Pat::Type(pat_type) => {
                let declared = render_type_with_self(&pat_type.ty, self.scope.owner.as_deref());
                self.bind_pattern(&pat_type.pat, init, Some(declared));
            }
            syn::Pat::Ident(pat_ident) => {
                let name = pat_ident.ident.to_string();
                let type_name =
                    declared.or_else(|| self.engine.infer_type_name(init, &self.scope));

                if self.is_body_binding(init) {
                    if let Some(bound) = &type_name {
                        self.findings.request_type = Some(unwrap_fallible(bound));
                    }
                }
                if self.is_query_accessor(init) {
                    self.findings.query_variables.insert(name.clone());
                } else {
                    self.findings.query_variables.remove(&name);
                }

                debug!("Bound {} as {:?}", name, type_name);
                self.scope.bind(&name, type_name, Some(init));
            }
            syn::Pat::TupleStruct(tuple) if tuple.elems.len() == 1 => {
                // `Some(user)`, `Ok(user)`, `Json(body)`
                let outer = declared.or_else(|| self.engine.infer_type_name(init, &self.scope));
                let inner = outer.map(|t| unwrap_wrapper(&t));
                if let Some(syn::Pat::Ident(pat_ident)) = tuple.elems.first() {
                    self.scope.bind(&pat_ident.ident.to_string(), inner, Some(init));
                }
            }
            syn::Pat::Reference(reference) => self.bind_pattern(&reference.pat, init, declared),
            syn::Pat::Paren(paren) => self.bind_pattern(&paren.pat, init, declared),
            _ => {}
        }
    }

    /// `ctx.bind_json()`, `req.json::<T>().await?`, `serde_json::from_slice(&body)?`
    fn is_body_binding(&self, expr: &syn::Expr) -> bool {
        match strip_fallible(expr) {
            syn::Expr::MethodCall(call) => {
                self.conventions.is_body_binding_method(&call.method.to_string())
                    && call.args.is_empty()
            }
            syn::Expr::Call(call) => match call.func.as_ref() {
                syn::Expr::Path(func) => func
                    .path
                    .segments
                    .last()
                    .is_some_and(|s| self.conventions.is_body_binding_function(&s.ident.to_string())),
                _ => false,
            },
            _ => false,
        }
    }

    fn is_query_accessor(&self, expr: &syn::Expr) -> bool {
        match strip_fallible(expr) {
            syn::Expr::MethodCall(call) => {
                call.args.is_empty() && self.conventions.is_query_accessor(&call.method.to_string())
            }
            _ => false,
        }
    }

    fn is_store(&self, expr: &syn::Expr) -> bool {
        receiver_name(expr).is_some_and(|name| self.conventions.is_store_receiver(&name))
    }

    fn inspect_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        let method = call.method.to_string();
        let receiver = ident_of(&call.receiver);
        let args: Vec<&'ast syn::Expr> = call.args.iter().collect();

        if self.conventions.is_body_binding_method(&method) && is_binding_shape(&args) {
            if let Some(turbofish) = &call.turbofish {
                if let Some(syn::GenericArgument::Type(ty)) = turbofish.args.first() {
                    self.findings.request_type =
                        Some(render_type_with_self(ty, self.scope.owner.as_deref()));
                }
            } else if let [syn::Expr::Reference(target)] = args.as_slice() {
                if let Some(name) = ident_of(&target.expr) {
                    debug!("Request body bound into {}", name);
                    self.findings.request_type = self.scope.variables.get(&name).cloned();
                }
            }
            return;
        }

        if self.conventions.is_json_emission_method(&method) {
            match args.as_slice() {
                [status, payload] => self.findings.emissions.push(Emission {
                    status: status_code_of(status),
                    payload: *payload,
                }),
                [payload] => self.findings.emissions.push(Emission {
                    status: builder_status(&call.receiver),
                    payload: *payload,
                }),
                _ => {}
            }
        }

        if let Some(name) = &receiver {
            match (method.as_str(), args.as_slice()) {
                ("insert", [key, value]) if self.scope.is_tracked(name) => {
                    if let Some(key) = string_key(key) {
                        debug!("Mutation {}[{}]", name, key);
                        self.scope.record_mutation(name, key, *value);
                    }
                }
                ("push", [element]) if self.scope.is_tracked(name) => {
                    self.scope.record_append(name, *element);
                }
                _ => {}
            }
        }

        if let Some(category) = self.conventions.auth_call(&method) {
            self.findings.set_auth(category);
        }

        if self.is_store(&call.receiver) || args.iter().any(|a| self.is_store(a)) {
            if let Some(operation) = self.conventions.data_operation(&method) {
                self.findings.add_operation(operation);
            }
        }

        if let [key] = args.as_slice() {
            let query_read = self.conventions.is_query_lookup(&method)
                || receiver
                    .as_ref()
                    .is_some_and(|r| self.findings.query_variables.contains(r));
            if query_read {
                if let Some(parameter) = string_key(key) {
                    self.findings.add_query_parameter(parameter);
                }
            }
        }
    }

    fn inspect_call(&mut self, call: &'ast syn::ExprCall) {
        let syn::Expr::Path(func) = call.func.as_ref() else {
            return;
        };
        let segments = path_segments(&func.path);
        let Some(last) = segments.last() else {
            return;
        };

        if last == "Json" && call.args.len() == 1 {
            self.findings.emissions.push(Emission {
                status: None,
                payload: &call.args[0],
            });
        }

        if let Some(category) = self.conventions.auth_call(last) {
            self.findings.set_auth(category);
        }

        if self.conventions.is_body_binding_function(last) {
            if let Some(ty) = func.path.segments.last().and_then(turbofish) {
                self.findings.request_type = Some(ty);
            }
        }

        let store_path = segments[..segments.len() - 1]
            .iter()
            .any(|s| self.conventions.is_store_receiver(s));
        if store_path || call.args.iter().any(|a| self.is_store(a)) {
            if let Some(operation) = self.conventions.data_operation(last) {
                self.findings.add_operation(operation);
            }
        }
    }
}

impl<'ast> Visit<'ast> for FunctionWalker<'ast, '_> {
    // nested items are analyzed on their own
    fn visit_item(&mut self, _item: &'ast syn::Item) {}

    fn visit_expr(&mut self, expr: &'ast syn::Expr) {
        if literal_of(expr).is_some_and(|l| l.is_object()) {
            self.findings.object_literals.push(expr);
        }
        visit::visit_expr(self, expr);
    }

    fn visit_local(&mut self, local: &'ast syn::Local) {
        match &local.init {
            Some(init) => {
                self.visit_expr(&init.expr);
                if let Some((_, diverge)) = &init.diverge {
                    self.visit_expr(diverge);
                }
                self.bind_pattern(&local.pat, &init.expr, None);
            }
            None => {
                if let syn::Pat::Type(pat_type) = &local.pat {
                    if let syn::Pat::Ident(pat_ident) = pat_type.pat.as_ref() {
                        let declared =
                            render_type_with_self(&pat_type.ty, self.scope.owner.as_deref());
                        self.scope
                            .bind(&pat_ident.ident.to_string(), Some(declared), None);
                    }
                }
            }
        }
    }

    fn visit_expr_let(&mut self, expr_let: &'ast syn::ExprLet) {
        self.visit_expr(&expr_let.expr);
        self.bind_pattern(&expr_let.pat, &expr_let.expr, None);
    }

    fn visit_expr_assign(&mut self, assign: &'ast syn::ExprAssign) {
        self.visit_expr(&assign.right);

        match assign.left.as_ref() {
            syn::Expr::Index(index) => {
                if let (Some(name), Some(key)) = (ident_of(&index.expr), string_key(&index.index)) {
                    if self.scope.is_tracked(&name) {
                        debug!("Mutation {}[{}]", name, key);
                        self.scope.record_mutation(&name, key, &assign.right);
                    }
                }
                self.visit_expr(&index.expr);
            }
            left => match ident_of(left) {
                Some(name) => {
                    let type_name = self.engine.infer_type_name(&assign.right, &self.scope);
                    self.scope.reassign(&name, type_name, &assign.right);
                }
                None => self.visit_expr(left),
            },
        }
    }

    fn visit_expr_method_call(&mut self, call: &'ast syn::ExprMethodCall) {
        self.inspect_method_call(call);
        visit::visit_expr_method_call(self, call);
    }

    fn visit_expr_call(&mut self, call: &'ast syn::ExprCall) {
        self.inspect_call(call);
        visit::visit_expr_call(self, call);
    }

    fn visit_expr_tuple(&mut self, tuple: &'ast syn::ExprTuple) {
        // `(StatusCode::CREATED, Json(payload))`
        let elems: Vec<&'ast syn::Expr> = tuple.elems.iter().collect();
        if let [status, .., last] = elems.as_slice() {
            if let (Some(code), Some(payload)) = (status_code_of(status), json_wrapped(*last)) {
                self.findings.emissions.push(Emission {
                    status: Some(code),
                    payload,
                });
                for elem in &elems[..elems.len() - 1] {
                    self.visit_expr(elem);
                }
                self.visit_expr(payload);
                return;
            }
        }
        visit::visit_expr_tuple(self, tuple);
    }

    fn visit_expr_index(&mut self, index: &'ast syn::ExprIndex) {
        if let (Some(name), Some(key)) = (ident_of(&index.expr), string_key(&index.index)) {
            if self.findings.query_variables.contains(&name) {
                self.findings.add_query_parameter(key);
            }
        }
        visit::visit_expr_index(self, index);
    }
}

/// Argument list of a body-binding call: none, or a single `&mut target`.
fn is_binding_shape(args: &[&syn::Expr]) -> bool {
    match args {
        [] => true,
        [syn::Expr::Reference(r)] => r.mutability.is_some(),
        _ => false,
    }
}

/// Payload of `Json(payload)`.
fn json_wrapped(expr: &syn::Expr) -> Option<&syn::Expr> {
    let syn::Expr::Call(call) = expr else {
        return None;
    };
    let syn::Expr::Path(func) = call.func.as_ref() else {
        return None;
    };
    let is_json = func.path.segments.last().is_some_and(|s| s.ident == "Json");
    (is_json && call.args.len() == 1).then(|| &call.args[0])
}

/// Strips `?`, `.await` and unwrapping calls.
fn strip_fallible(expr: &syn::Expr) -> &syn::Expr {
    match expr {
        syn::Expr::Try(t) => strip_fallible(&t.expr),
        syn::Expr::Await(a) => strip_fallible(&a.base),
        syn::Expr::Paren(p) => strip_fallible(&p.expr),
        syn::Expr::MethodCall(m)
            if matches!(
                m.method.to_string().as_str(),
                "unwrap" | "expect" | "unwrap_or_default" | "map_err" | "context"
            ) =>
        {
            strip_fallible(&m.receiver)
        }
        other => other,
    }
}

/// `Option<T>` / `Result<T, E>` / `Json<T>` -> `T`.
fn unwrap_wrapper(desc: &str) -> String {
    let (base, args) = split_generics(desc);
    match (last_segment(base), args.first()) {
        ("Option" | "Result" | "Json", Some(inner)) => inner.to_string(),
        _ => desc.to_string(),
    }
}
