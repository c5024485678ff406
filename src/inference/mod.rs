//! Flow-sensitive, purely syntactic inference of expression types and shapes.
//!
//! Bindings, mutations and appends are recorded in one source-order walk of the
//! body; a variable is traced through its latest binding.
//!
//! Two entry points share one set of inputs (type registry, helper return table,
//! naming conventions and the bindings of the enclosing function):
//!
//! - [`InferenceEngine::infer_type_name`] answers "what named type is this?" and is
//!   used while bindings are recorded.
//! - [`InferenceEngine::infer_schema`] answers "what does this value look like?" and
//!   descends into literals, traced variable origins and helper return shapes.
//!
//! Neither ever fails. Unresolvable expressions come back as `None` from the `try_`
//! variants and as a plain string node from [`InferenceEngine::infer_schema`].

pub mod heuristics;
pub mod literal;
mod shape;
pub mod strategy;

use crate::conventions::Conventions;
use crate::function_table::FunctionReturnTable;
use crate::schema_synth::SchemaSynthesizer;
use crate::type_registry::TypeRegistry;
use crate::type_string::{last_segment, render_path, render_type_with_self, split_generics, to_pascal_case};
use heuristics::{lookup_method, noun_type_name, receiver_noun, Cardinality};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Recursion bound for origin tracing; self-referential bindings such as
/// `let x = x.clone();` stop here.
const MAX_DEPTH: usize = 16;

/// Bindings of one function body, recorded in source order.
#[derive(Debug, Default)]
pub struct FunctionScope<'ast> {
    /// Type the enclosing `impl` block is for, used to resolve `Self` and `self.helper()`
    pub owner: Option<String>,
    /// Variable name -> inferred or declared type descriptor
    pub variables: IndexMap<String, String>,
    /// Variable name -> right-hand side of its latest binding
    pub origins: HashMap<String, &'ast syn::Expr>,
    /// Variable name -> keys assigned after construction, in order
    pub mutations: IndexMap<String, Vec<MapMutation<'ast>>>,
    /// Variable name -> last element pushed onto it
    pub appended: HashMap<String, &'ast syn::Expr>,
}

/// A `v["key"] = expr` or `v.insert("key", expr)` on a tracked variable.
#[derive(Debug, Clone)]
pub struct MapMutation<'ast> {
    pub key: String,
    pub value: &'ast syn::Expr,
}

impl<'ast> FunctionScope<'ast> {
    pub fn new(owner: Option<String>) -> Self {
        Self {
            owner,
            ..Self::default()
        }
    }

    /// Records a (re)binding. A fresh binding forgets mutations of a shadowed one.
    pub fn bind(&mut self, name: &str, type_name: Option<String>, origin: Option<&'ast syn::Expr>) {
        match type_name {
            Some(t) => {
                self.variables.insert(name.to_string(), t);
            }
            None => {
                self.variables.shift_remove(name);
            }
        }
        match origin {
            Some(expr) => {
                self.origins.insert(name.to_string(), expr);
            }
            None => {
                self.origins.remove(name);
            }
        }
        self.mutations.shift_remove(name);
        self.appended.remove(name);
    }

    /// Points an existing variable at a new value without dropping its mutation history.
    pub fn reassign(&mut self, name: &str, type_name: Option<String>, origin: &'ast syn::Expr) {
        if let Some(t) = type_name {
            self.variables.insert(name.to_string(), t);
        }
        self.origins.insert(name.to_string(), origin);
    }

    pub fn record_mutation(&mut self, name: &str, key: String, value: &'ast syn::Expr) {
        self.mutations
            .entry(name.to_string())
            .or_default()
            .push(MapMutation { key, value });
    }

    pub fn record_append(&mut self, name: &str, element: &'ast syn::Expr) {
        self.appended.insert(name.to_string(), element);
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        self.variables.contains_key(name) || self.origins.contains_key(name)
    }

    /// Name of the variable whose latest binding is exactly `expr`.
    pub fn variable_with_origin(&self, expr: &syn::Expr) -> Option<&str> {
        self.origins
            .iter()
            .find(|(_, origin)| std::ptr::eq(**origin, expr))
            .map(|(name, _)| name.as_str())
    }
}

/// Inference over one registry, helper table and convention set.
pub struct InferenceEngine<'a> {
    registry: &'a TypeRegistry,
    functions: &'a FunctionReturnTable,
    conventions: &'a Conventions,
}

impl<'a> InferenceEngine<'a> {
    pub fn new(
        registry: &'a TypeRegistry,
        functions: &'a FunctionReturnTable,
        conventions: &'a Conventions,
    ) -> Self {
        Self {
            registry,
            functions,
            conventions,
        }
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn conventions(&self) -> &'a Conventions {
        self.conventions
    }

    pub fn synthesizer(&self) -> SchemaSynthesizer<'a> {
        SchemaSynthesizer::new(self.registry)
    }

    /// Best-guess type descriptor of `expr`, for registry lookup.
    pub fn infer_type_name(&self, expr: &syn::Expr, scope: &FunctionScope) -> Option<String> {
        self.type_name_at(expr, scope, 0)
    }

    fn type_name_at(&self, expr: &syn::Expr, scope: &FunctionScope, depth: usize) -> Option<String> {
        if depth > MAX_DEPTH {
            return None;
        }
        let next = depth + 1;

        match expr {
            syn::Expr::Struct(s) => Some(render_path(&s.path, scope.owner.as_deref())),
            syn::Expr::Reference(r) => self.type_name_at(&r.expr, scope, next),
            syn::Expr::Paren(p) => self.type_name_at(&p.expr, scope, next),
            syn::Expr::Group(g) => self.type_name_at(&g.expr, scope, next),
            syn::Expr::Await(a) => self.type_name_at(&a.base, scope, next),
            syn::Expr::Try(t) => self
                .type_name_at(&t.expr, scope, next)
                .map(|name| unwrap_fallible(&name)),
            syn::Expr::Path(p) => self.path_type_name(&p.path, scope),
            syn::Expr::Call(call) => self.call_type_name(call, scope, next),
            syn::Expr::MethodCall(call) => self.method_type_name(call, scope, next),
            syn::Expr::Index(index) => Some(
                self.type_name_at(&index.expr, scope, next)
                    .and_then(|container| element_type(&container))
                    .unwrap_or_else(|| "Value".to_string()),
            ),
            syn::Expr::Field(field) => {
                let syn::Member::Named(member) = &field.member else {
                    return None;
                };
                let owner = self.type_name_at(&field.base, scope, next)?;
                let descriptor = self.registry.get_struct(&owner)?;
                descriptor
                    .fields
                    .get(&member.to_string())
                    .map(|f| f.declared_type.clone())
            }
            syn::Expr::Lit(lit) => lit_type_name(&lit.lit).map(str::to_string),
            syn::Expr::Macro(m) => {
                let name = m.mac.path.segments.last()?.ident.to_string();
                match name.as_str() {
                    "json" => Some("Value".to_string()),
                    "format" | "concat" | "stringify" => Some("String".to_string()),
                    "vec" => Some("Vec<Value>".to_string()),
                    _ => None,
                }
            }
            syn::Expr::Cast(cast) => Some(render_type_with_self(&cast.ty, scope.owner.as_deref())),
            syn::Expr::Array(array) => {
                let first = array
                    .elems
                    .first()
                    .and_then(|e| self.type_name_at(e, scope, next))
                    .unwrap_or_else(|| "Value".to_string());
                Some(format!("Vec<{}>", first))
            }
            syn::Expr::Unary(unary) => match unary.op {
                syn::UnOp::Not(_) => Some("bool".to_string()),
                _ => self.type_name_at(&unary.expr, scope, next),
            },
            syn::Expr::Binary(binary) => {
                if is_boolean_operator(&binary.op) {
                    Some("bool".to_string())
                } else {
                    self.type_name_at(&binary.left, scope, next)
                }
            }
            _ => None,
        }
    }

    fn path_type_name(&self, path: &syn::Path, scope: &FunctionScope) -> Option<String> {
        if let Some(ident) = path.get_ident() {
            let name = ident.to_string();
            if let Some(bound) = scope.variables.get(&name) {
                return Some(bound.clone());
            }
            if self.registry.is_struct(&name) {
                return Some(name);
            }
            let pascal = to_pascal_case(&name);
            if self.registry.is_struct(&pascal) || self.conventions.is_self_describing(&pascal) {
                return Some(pascal);
            }
            return None;
        }

        // `Status::Active` is a value of enum `Status`
        let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
        let owner = segments.get(segments.len().checked_sub(2)?)?;
        self.registry.get_enum(owner).map(|e| e.name.clone())
    }

    fn call_type_name(
        &self,
        call: &syn::ExprCall,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<String> {
        let syn::Expr::Path(func) = call.func.as_ref() else {
            return None;
        };
        let segments: Vec<String> = func.path.segments.iter().map(|s| s.ident.to_string()).collect();
        let last = segments.last()?.as_str();
        let first_arg = call.args.first();

        match last {
            "Some" => {
                let inner = self.type_name_at(first_arg?, scope, depth)?;
                return Some(format!("Option<{}>", inner));
            }
            "Ok" | "Json" => return self.type_name_at(first_arg?, scope, depth),
            _ => {}
        }
        if heuristics::is_time_constructor(&segments) {
            return Some("DateTime<Utc>".to_string());
        }
        if self.conventions.is_body_binding_function(last) {
            return turbofish(func.path.segments.last()?);
        }

        if let [.., owner_segment, _] = func.path.segments.iter().collect::<Vec<_>>().as_slice() {
            let owner_path: Vec<String> = segments[..segments.len() - 1]
                .iter()
                .map(|s| match (s.as_str(), scope.owner.as_deref()) {
                    ("Self", Some(real)) => real.to_string(),
                    _ => s.clone(),
                })
                .collect();
            let owner = owner_path.last()?.clone();

            if let Some(entry) = self.functions.get(&format!("{}::{}", owner, last)) {
                return Some(entry.return_type.clone());
            }
            if matches!(owner.as_str(), "Box" | "Arc" | "Rc" | "Cow") && last == "new" {
                return self.type_name_at(first_arg?, scope, depth);
            }
            if let Some(marker) = collection_marker(&owner) {
                return Some(match turbofish(owner_segment) {
                    Some(_) => render_segment(owner_segment, scope.owner.as_deref()),
                    None => marker.to_string(),
                });
            }
            if owner.starts_with(char::is_uppercase) {
                // `User::new(..)`, `models::User::default()`, `Uuid::new_v4()`
                return Some(owner_path.join("::"));
            }
        }

        if let Some(entry) = self.functions.get(last) {
            return Some(entry.return_type.clone());
        }
        if let Some(stripped) = self.conventions.strip_constructor_prefix(last) {
            return Some(to_pascal_case(stripped));
        }
        None
    }

    fn method_type_name(
        &self,
        call: &syn::ExprMethodCall,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<String> {
        let method = call.method.to_string();

        if let Some(turbofish) = &call.turbofish {
            if let Some(syn::GenericArgument::Type(ty)) = turbofish.args.first() {
                return Some(render_type_with_self(ty, scope.owner.as_deref()));
            }
        }

        match method.as_str() {
            "clone" | "to_owned" | "as_ref" | "as_mut" | "borrow" | "into_inner" | "iter"
            | "into_iter" | "cloned" | "copied" | "lock" | "read" | "write" => {
                return self.type_name_at(&call.receiver, scope, depth);
            }
            "unwrap" | "expect" | "unwrap_or_default" | "unwrap_or" | "unwrap_or_else" => {
                return self
                    .type_name_at(&call.receiver, scope, depth)
                    .map(|name| unwrap_fallible(&name));
            }
            "to_string" | "to_uppercase" | "to_lowercase" | "trim" | "to_rfc3339" | "format"
            | "join" => return Some("String".to_string()),
            "len" | "count" => return Some("usize".to_string()),
            "is_empty" | "is_some" | "is_none" | "contains" | "contains_key" | "starts_with"
            | "ends_with" => return Some("bool".to_string()),
            _ => {}
        }

        let receiver = receiver_name(&call.receiver);
        if receiver.as_deref() == Some("self") {
            if let Some(owner) = &scope.owner {
                if let Some(entry) = self.functions.get(&format!("{}::{}", owner, method)) {
                    return Some(entry.return_type.clone());
                }
            }
        }

        self.lookup_type_name(&method, receiver.as_deref())
    }

    /// Type of a data-access call such as `repo.find_user(id)` or `state.orders.list()`.
    fn lookup_type_name(&self, method: &str, receiver: Option<&str>) -> Option<String> {
        let (cardinality, noun) = lookup_method(method, self.conventions)?;
        let store_like = receiver.is_some_and(|r| self.conventions.is_store_receiver(r));

        let record = noun
            .or_else(|| receiver.and_then(|r| receiver_noun(r, self.conventions)))
            .map(|n| noun_type_name(&n))
            .filter(|name| self.registry.is_struct(name));
        if record.is_none() && !store_like {
            return None;
        }

        let record = record.unwrap_or_else(|| "Value".to_string());
        Some(match cardinality {
            Cardinality::Single => record,
            Cardinality::Collection => format!("Vec<{}>", record),
        })
    }
}

/// `Result<T, E>` / `Option<T>` -> `T`; anything else unchanged.
pub fn unwrap_fallible(desc: &str) -> String {
    let (base, args) = split_generics(desc);
    match (last_segment(base), args.first()) {
        ("Result" | "Option", Some(inner)) => inner.to_string(),
        _ => desc.to_string(),
    }
}

/// Element type of a collection descriptor, value type of a map descriptor.
fn element_type(container: &str) -> Option<String> {
    let (base, args) = split_generics(container);
    match (last_segment(base), args.as_slice()) {
        ("Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "IndexSet", [item]) => Some(item.to_string()),
        ("HashMap" | "BTreeMap" | "IndexMap", [_, value]) => Some(value.to_string()),
        _ => None,
    }
}

fn lit_type_name(lit: &syn::Lit) -> Option<&'static str> {
    match lit {
        syn::Lit::Str(_) => Some("String"),
        syn::Lit::Int(_) => Some("i64"),
        syn::Lit::Float(_) => Some("f64"),
        syn::Lit::Bool(_) => Some("bool"),
        syn::Lit::Char(_) => Some("char"),
        _ => None,
    }
}

/// Generic descriptor of a collection built without a type argument.
fn collection_marker(owner: &str) -> Option<&'static str> {
    match owner {
        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "IndexSet" | "LinkedList" => Some("Vec<Value>"),
        "HashMap" | "BTreeMap" | "IndexMap" | "Map" => Some("HashMap<String, Value>"),
        _ => None,
    }
}

fn is_boolean_operator(op: &syn::BinOp) -> bool {
    matches!(
        op,
        syn::BinOp::Eq(_)
            | syn::BinOp::Ne(_)
            | syn::BinOp::Lt(_)
            | syn::BinOp::Le(_)
            | syn::BinOp::Gt(_)
            | syn::BinOp::Ge(_)
            | syn::BinOp::And(_)
            | syn::BinOp::Or(_)
    )
}

/// First type argument of a path segment: `from_slice::<T>` -> `T`.
pub fn turbofish(segment: &syn::PathSegment) -> Option<String> {
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            syn::GenericArgument::Type(ty) => Some(render_type_with_self(ty, None)),
            _ => None,
        }),
        _ => None,
    }
}

fn render_segment(segment: &syn::PathSegment, self_type: Option<&str>) -> String {
    render_path(&syn::Path::from(segment.clone()), self_type)
}

/// Identifiers of a path: `crate::models::User` -> [`crate`, `models`, `User`].
pub fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

/// Name of a plain variable reference.
pub fn ident_of(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Path(p) if p.qself.is_none() => p.path.get_ident().map(|i| i.to_string()),
        syn::Expr::Paren(p) => ident_of(&p.expr),
        syn::Expr::Group(g) => ident_of(&g.expr),
        _ => None,
    }
}

/// The name a receiver is known by: `repo` in `repo.find()`, `users` in
/// `state.users.lock().await.get(..)`.
pub fn receiver_name(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        syn::Expr::Field(f) => match &f.member {
            syn::Member::Named(ident) => Some(ident.to_string()),
            syn::Member::Unnamed(_) => receiver_name(&f.base),
        },
        syn::Expr::Await(a) => receiver_name(&a.base),
        syn::Expr::Try(t) => receiver_name(&t.expr),
        syn::Expr::Paren(p) => receiver_name(&p.expr),
        syn::Expr::Reference(r) => receiver_name(&r.expr),
        syn::Expr::MethodCall(m) if m.args.is_empty() => receiver_name(&m.receiver),
        _ => None,
    }
}

/// Strips one level of `&` / `&mut`.
pub fn unwrap_reference(expr: &syn::Expr) -> &syn::Expr {
    match expr {
        syn::Expr::Reference(r) => &r.expr,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn expr(src: &str) -> syn::Expr {
        syn::parse_str(src).expect("Failed to parse test expression")
    }

    fn registry_from(code: &str) -> TypeRegistry {
        let file = syn::parse_file(code).expect("Failed to parse test code");
        let mut registry = TypeRegistry::new();
        registry.register_file(&file, Path::new("models.rs"));
        registry.synthesize_all();
        registry
    }

    #[test]
    fn test_type_name_rules() {
        let registry = registry_from(
            r#"
            pub struct User { pub id: u64, pub profile: Profile }
            pub struct Profile { pub bio: String }
            pub enum Role { Admin }
        "#,
        );
        let functions = FunctionReturnTable::default();
        let conventions = Conventions::default();
        let engine = InferenceEngine::new(&registry, &functions, &conventions);
        let mut scope = FunctionScope::default();
        scope.bind("current", Some("User".to_string()), None);

        let name = |src: &str| engine.infer_type_name(&expr(src), &scope);

        assert_eq!(name("User { id: 1 }").as_deref(), Some("User"));
        assert_eq!(name("&models::User { id: 1 }").as_deref(), Some("models::User"));
        assert_eq!(name("current").as_deref(), Some("User"));
        assert_eq!(name("current.profile").as_deref(), Some("Profile"));
        assert_eq!(name("login_request").as_deref(), Some("LoginRequest"));
        assert_eq!(name("unknown_thing"), None);
        assert_eq!(name("new_user_response(x)").as_deref(), Some("UserResponse"));
        assert_eq!(name("User::new(1)").as_deref(), Some("User"));
        assert_eq!(name("Vec::<User>::new()").as_deref(), Some("Vec<User>"));
        assert_eq!(name("HashMap::new()").as_deref(), Some("HashMap<String, Value>"));
        assert_eq!(name("Some(current.clone())").as_deref(), Some("Option<User>"));
        assert_eq!(name("Role::Admin").as_deref(), Some("Role"));
        assert_eq!(name("users[0]").as_deref(), Some("Value"));
        assert_eq!(name("serde_json::from_slice::<User>(&body)?").as_deref(), Some("User"));
        assert_eq!(name("items.len()").as_deref(), Some("usize"));
    }

    #[test]
    fn test_lookup_heuristics() {
        let registry = registry_from("pub struct User { pub id: u64 }");
        let functions = FunctionReturnTable::default();
        let conventions = Conventions::default();
        let engine = InferenceEngine::new(&registry, &functions, &conventions);
        let scope = FunctionScope::default();

        let name = |src: &str| engine.infer_type_name(&expr(src), &scope);

        assert_eq!(name("repo.find_user_by_email(&email).await?").as_deref(), Some("User"));
        assert_eq!(name("state.users.find_by_id(id)").as_deref(), Some("User"));
        assert_eq!(name("db.list_users()").as_deref(), Some("Vec<User>"));
        assert_eq!(name("db.find_all()").as_deref(), Some("Vec<Value>"));
        assert_eq!(name("user.get_name()"), None);
    }

    #[test]
    fn test_scope_shadowing_forgets_mutations() {
        let value = expr("1");
        let mut scope = FunctionScope::default();
        scope.bind("result", None, Some(&value));
        scope.record_mutation("result", "a".to_string(), &value);
        assert_eq!(scope.mutations["result"].len(), 1);

        scope.reassign("result", None, &value);
        assert_eq!(scope.mutations["result"].len(), 1);

        scope.bind("result", None, Some(&value));
        assert!(!scope.mutations.contains_key("result"));
        assert_eq!(scope.variable_with_origin(&value), Some("result"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(unwrap_fallible("Result<User, AppError>"), "User");
        assert_eq!(unwrap_fallible("Option<Vec<User>>"), "Vec<User>");
        assert_eq!(unwrap_fallible("User"), "User");
        assert_eq!(
            receiver_name(&expr("state.users.lock().await")).as_deref(),
            Some("users")
        );
        assert_eq!(ident_of(&expr("payload")).as_deref(), Some("payload"));
        assert_eq!(ident_of(&expr("a.b")), None);
    }
}
