use super::heuristics::{accessor_method_schema, field_name_schema, is_time_constructor};
use super::literal::{literal_of, string_key, LiteralShape};
use super::{
    ident_of, path_segments, receiver_name, turbofish, unwrap_reference, FunctionScope,
    InferenceEngine, MAX_DEPTH,
};
use crate::schema::{PrimitiveKind, SchemaKind, SchemaNode};
use crate::schema_synth::{is_any_like, primitive_to_schema};
use crate::type_string::{last_segment, render_type_with_self, split_generics};
use indexmap::IndexMap;
use log::debug;
use serde_json::Value;

impl<'a> InferenceEngine<'a> {
    /// Full shape of `expr`. Unmatched expression forms yield a plain string node.
    pub fn infer_schema(&self, expr: &syn::Expr, scope: &FunctionScope) -> SchemaNode {
        self.try_infer_schema(expr, scope)
            .unwrap_or_else(SchemaNode::string)
    }

    /// Like [`InferenceEngine::infer_schema`], but `None` when no rule matched.
    pub fn try_infer_schema(&self, expr: &syn::Expr, scope: &FunctionScope) -> Option<SchemaNode> {
        self.schema_at(expr, scope, 0)
    }

    /// Shape of a literal construction, with every key of an object literal required.
    pub fn literal_schema(&self, literal: &LiteralShape, scope: &FunctionScope) -> SchemaNode {
        self.literal_schema_at(literal, scope, 0)
    }

    /// Schema of a type descriptor, or `None` for names the registry knows nothing
    /// about and that no rule recognizes.
    pub fn known_type_schema(&self, desc: &str) -> Option<SchemaNode> {
        let canonical = self.registry.canonical_name(desc);
        let (base, args) = split_generics(&canonical);
        let ident = last_segment(base);

        let known = !args.is_empty()
            || primitive_to_schema(ident).is_some()
            || is_any_like(&canonical)
            || self.registry.get_struct(ident).is_some()
            || self.registry.get_enum(ident).is_some()
            || self.conventions.is_self_describing(ident);
        known.then(|| self.synthesizer().type_to_schema(&canonical, false))
    }

    /// Adds the keys assigned to `variable` after construction. Existing keys are
    /// never overwritten and added keys are not required.
    pub fn merge_mutations(&self, variable: &str, schema: &mut SchemaNode, scope: &FunctionScope) {
        self.merge_mutations_at(variable, schema, scope, 0);
    }

    fn merge_mutations_at(
        &self,
        variable: &str,
        schema: &mut SchemaNode,
        scope: &FunctionScope,
        depth: usize,
    ) {
        if !schema.is_object() {
            return;
        }
        let Some(mutations) = scope.mutations.get(variable) else {
            return;
        };
        for mutation in mutations {
            let value = self
                .schema_at(mutation.value, scope, depth + 1)
                .unwrap_or_else(SchemaNode::string);
            if !schema.insert_property_if_absent(&mutation.key, value) {
                debug!("Keeping literal key {} of {}", mutation.key, variable);
            }
        }
    }

    /// Replaces the generic item schema of an array with the shape of the last
    /// element pushed onto `variable`.
    pub fn merge_appended(&self, variable: &str, schema: &mut SchemaNode, scope: &FunctionScope) {
        self.merge_appended_at(variable, schema, scope, 0);
    }

    fn merge_appended_at(&self, variable: &str, schema: &mut SchemaNode, scope: &FunctionScope, depth: usize) {
        let Some(element) = scope.appended.get(variable) else {
            return;
        };
        let SchemaKind::Array { items } = &mut schema.kind else {
            return;
        };
        if !is_generic(items) {
            return;
        }
        if let Some(shape) = self.schema_at(element, scope, depth + 1) {
            **items = shape;
        }
    }

    pub(super) fn schema_at(&self, expr: &syn::Expr, scope: &FunctionScope, depth: usize) -> Option<SchemaNode> {
        if depth > MAX_DEPTH {
            return None;
        }
        let next = depth + 1;

        if let Some(literal) = literal_of(expr) {
            return Some(self.literal_schema_at(&literal, scope, next));
        }

        match expr {
            syn::Expr::Lit(lit) => lit_schema(&lit.lit),
            syn::Expr::Reference(r) => self.schema_at(&r.expr, scope, next),
            syn::Expr::Paren(p) => self.schema_at(&p.expr, scope, next),
            syn::Expr::Group(g) => self.schema_at(&g.expr, scope, next),
            syn::Expr::Await(a) => self.schema_at(&a.base, scope, next),
            syn::Expr::Try(t) => self.schema_at(&t.expr, scope, next),
            syn::Expr::Unary(unary) => match unary.op {
                syn::UnOp::Not(_) => Some(SchemaNode::boolean()),
                _ => self.schema_at(&unary.expr, scope, next),
            },
            syn::Expr::Path(p) => match p.path.get_ident() {
                Some(ident) => self.variable_schema(&ident.to_string(), &p.path, scope, next),
                None => self
                    .type_name_at(expr, scope, next)
                    .and_then(|name| self.known_type_schema(&name)),
            },
            syn::Expr::Struct(_) => self
                .type_name_at(expr, scope, next)
                .map(|name| self.synthesizer().type_to_schema(&name, false)),
            syn::Expr::Call(call) => self.call_schema(call, expr, scope, next),
            syn::Expr::MethodCall(call) => self.method_schema(call, expr, scope, next),
            syn::Expr::Index(index) => self.index_schema(index, scope, next),
            syn::Expr::Field(field) => self.field_schema(field, expr, scope, next),
            syn::Expr::Macro(m) => {
                let name = m.mac.path.segments.last()?.ident.to_string();
                matches!(name.as_str(), "format" | "concat" | "stringify")
                    .then(SchemaNode::string)
            }
            syn::Expr::Cast(cast) => {
                let desc = render_type_with_self(&cast.ty, scope.owner.as_deref());
                self.known_type_schema(&desc)
            }
            syn::Expr::Binary(binary) => {
                if super::is_boolean_operator(&binary.op) {
                    return Some(SchemaNode::boolean());
                }
                let left = self.schema_at(&binary.left, scope, next);
                match (&binary.op, left) {
                    (syn::BinOp::Add(_), Some(l)) if l.primitive_kind() == Some(PrimitiveKind::String) => {
                        Some(SchemaNode::string())
                    }
                    (_, Some(l)) if l.primitive_kind().is_some() => Some(SchemaNode::primitive(
                        l.primitive_kind().unwrap_or(PrimitiveKind::Number),
                    )),
                    _ => Some(SchemaNode::number()),
                }
            }
            _ => None,
        }
    }

    fn literal_schema_at(&self, literal: &LiteralShape, scope: &FunctionScope, depth: usize) -> SchemaNode {
        match literal {
            LiteralShape::Object(entries) => {
                let mut properties = IndexMap::new();
                let mut required = Vec::new();
                for (key, value) in entries {
                    if !properties.contains_key(key) {
                        required.push(key.clone());
                    }
                    properties.insert(key.clone(), self.literal_schema_at(value, scope, depth + 1));
                }
                SchemaNode::object(properties, required)
            }
            LiteralShape::Array(items) => SchemaNode::array(
                items
                    .first()
                    .map(|item| self.literal_schema_at(item, scope, depth + 1))
                    .unwrap_or_else(SchemaNode::untyped_object),
            ),
            LiteralShape::Null => SchemaNode::untyped_object().nullable(),
            LiteralShape::Value(expr) => self
                .schema_at(expr, scope, depth + 1)
                .unwrap_or_else(SchemaNode::string),
        }
    }

    /// Traced origin first, tracked type second; then mutations and appends are merged.
    /// A tracked type replaces a traced shape that carries no structure, as in
    /// `let rows: Vec<Item> = Vec::with_capacity(n);`.
    fn variable_schema(
        &self,
        name: &str,
        path: &syn::Path,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<SchemaNode> {
        let traced = scope
            .origins
            .get(name)
            .and_then(|origin| self.schema_at(unwrap_reference(origin), scope, depth));
        let tracked = || {
            self.path_type_name(path, scope)
                .and_then(|t| self.known_type_schema(&t))
        };

        let mut schema = match traced {
            Some(shape) if lacks_structure(&shape) => match tracked() {
                Some(declared) if !lacks_structure(&declared) => declared,
                _ => shape,
            },
            Some(shape) => shape,
            None => tracked()?,
        };

        self.merge_mutations_at(name, &mut schema, scope, depth);
        self.merge_appended_at(name, &mut schema, scope, depth);
        Some(schema)
    }

    fn call_schema(
        &self,
        call: &syn::ExprCall,
        expr: &syn::Expr,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<SchemaNode> {
        let syn::Expr::Path(func) = call.func.as_ref() else {
            return None;
        };
        let segments = path_segments(&func.path);
        let last = segments.last()?.as_str();

        if is_time_constructor(&segments) {
            return Some(SchemaNode::date_time());
        }
        match last {
            "Some" | "Ok" | "Json" => return self.schema_at(call.args.first()?, scope, depth),
            "new" if segments.len() >= 2
                && matches!(segments[segments.len() - 2].as_str(), "Box" | "Arc" | "Rc") =>
            {
                return self.schema_at(call.args.first()?, scope, depth);
            }
            _ => {}
        }

        // local helpers: a recorded deep shape beats the declared return type
        let helper = match segments.as_slice() {
            [name] => self.functions.get(name),
            [.., owner, name] => {
                let owner = match (owner.as_str(), scope.owner.as_deref()) {
                    ("Self", Some(real)) => real,
                    (other, _) => other,
                };
                self.functions.get(&format!("{}::{}", owner, name))
            }
            _ => None,
        };
        if let Some(entry) = helper {
            if let Some(deep) = &entry.deep_schema {
                return Some(deep.clone());
            }
            return self.known_type_schema(&entry.return_type);
        }

        if let [.., owner, _] = segments.as_slice() {
            if owner == "String" {
                return Some(SchemaNode::string());
            }
            if let Some(segment) = func.path.segments.iter().rev().nth(1) {
                if turbofish(segment).is_none() {
                    match owner.as_str() {
                        "Vec" | "VecDeque" | "HashSet" | "BTreeSet" | "IndexSet" => {
                            return Some(SchemaNode::array(SchemaNode::untyped_object()));
                        }
                        "HashMap" | "BTreeMap" | "IndexMap" | "Map" => {
                            return Some(SchemaNode::open_object());
                        }
                        _ => {}
                    }
                }
            }
        }

        self.type_name_at(expr, scope, depth)
            .and_then(|name| self.known_type_schema(&name))
    }

    fn method_schema(
        &self,
        call: &syn::ExprMethodCall,
        expr: &syn::Expr,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<SchemaNode> {
        let method = call.method.to_string();

        if let Some(schema) = accessor_method_schema(&method) {
            return Some(schema);
        }

        match method.as_str() {
            // `Utc::now().format("%+")`
            "format" => {
                let receiver = self.schema_at(&call.receiver, scope, depth);
                if receiver.as_ref().and_then(|r| r.format()) == Some("date-time") {
                    return Some(SchemaNode::date_time());
                }
                return Some(SchemaNode::string());
            }
            "clone" | "to_owned" | "as_ref" | "borrow" | "into_inner" | "unwrap" | "expect"
            | "unwrap_or_default" | "unwrap_or" | "unwrap_or_else" | "cloned" => {
                return self.schema_at(&call.receiver, scope, depth);
            }
            "get" if call.args.len() == 1 => {
                // `stats.get("total")` on a map traced to a helper's literal
                if let Some(key) = call.args.first().and_then(string_key) {
                    let receiver = self.schema_at(&call.receiver, scope, depth)?;
                    if let Some(property) = receiver.property(&key) {
                        return Some(property.clone());
                    }
                }
            }
            _ => {}
        }

        self.type_name_at(expr, scope, depth)
            .and_then(|name| self.known_type_schema(&name))
    }

    fn index_schema(&self, index: &syn::ExprIndex, scope: &FunctionScope, depth: usize) -> Option<SchemaNode> {
        let receiver = self.schema_at(&index.expr, scope, depth)?;
        if let Some(key) = string_key(&index.index) {
            return receiver.property(&key).cloned();
        }
        receiver.items().cloned()
    }

    fn field_schema(
        &self,
        field: &syn::ExprField,
        expr: &syn::Expr,
        scope: &FunctionScope,
        depth: usize,
    ) -> Option<SchemaNode> {
        let syn::Member::Named(member) = &field.member else {
            return None;
        };
        let name = member.to_string();

        if let Some(owner) = self.type_name_at(&field.base, scope, depth) {
            if let Some(descriptor) = self.registry.get_struct(&owner) {
                if let Some(declared) = descriptor.fields.get(&name) {
                    let mut schema = self
                        .synthesizer()
                        .type_to_schema(&declared.declared_type, false);
                    if declared.is_pointer && !schema.is_reference() {
                        schema.nullable = true;
                    }
                    return Some(schema);
                }
            }
        }

        if let Some(name) = self.type_name_at(expr, scope, depth) {
            if let Some(schema) = self.known_type_schema(&name) {
                return Some(schema);
            }
        }

        let receiver = ident_of(&field.base).or_else(|| receiver_name(&field.base));
        debug!(
            "Falling back to naming heuristics for {}.{}",
            receiver.unwrap_or_default(),
            name
        );
        field_name_schema(&name)
    }
}

fn lit_schema(lit: &syn::Lit) -> Option<SchemaNode> {
    let schema = match lit {
        syn::Lit::Str(s) => SchemaNode::string().with_example(Value::String(s.value())),
        syn::Lit::Char(c) => SchemaNode::string().with_example(Value::String(c.value().to_string())),
        syn::Lit::Int(i) => {
            let node = SchemaNode::integer();
            match i.base10_parse::<i64>() {
                Ok(n) => node.with_example(Value::from(n)),
                Err(_) => node,
            }
        }
        syn::Lit::Float(f) => {
            let node = SchemaNode::number();
            match f.base10_parse::<f64>() {
                Ok(n) => node.with_example(Value::from(n)),
                Err(_) => node,
            }
        }
        syn::Lit::Bool(b) => SchemaNode::boolean().with_example(Value::Bool(b.value)),
        _ => return None,
    };
    Some(schema)
}

/// An object without declared properties: nothing worth keeping over a richer shape.
fn is_generic(node: &SchemaNode) -> bool {
    node.is_object() && node.property_count() == 0
}

/// An object without properties, or an array of them.
fn lacks_structure(node: &SchemaNode) -> bool {
    is_generic(node) || node.items().is_some_and(is_generic)
}
