//! Ordered shape strategies for emitted payloads.
//!
//! A payload is resolved by trying each strategy in turn; the first one that
//! produces a shape wins. The candidates every strategy sees are the payload
//! itself (one `&` stripped) and, when the payload is a traced variable, the
//! expression that variable was bound to.

use super::heuristics::noun_type_name;
use super::literal::literal_of;
use super::{ident_of, unwrap_reference, FunctionScope, InferenceEngine};
use crate::schema::SchemaNode;
use crate::type_string::{singularize, to_pascal_case};
use log::debug;

/// Expressions a strategy may inspect for one payload.
pub struct ShapeCandidates<'e> {
    pub payload: &'e syn::Expr,
    /// Variable the payload names, if any
    pub variable: Option<String>,
    /// Latest binding of that variable
    pub origin: Option<&'e syn::Expr>,
}

impl<'e> ShapeCandidates<'e> {
    pub fn new(payload: &'e syn::Expr, scope: &FunctionScope<'e>) -> Self {
        let payload = unwrap_reference(payload);
        let variable = ident_of(payload);
        let origin = variable
            .as_deref()
            .and_then(|v| scope.origins.get(v))
            .map(|origin| unwrap_reference(*origin));
        Self {
            payload,
            variable,
            origin,
        }
    }

    fn exprs(&self) -> impl Iterator<Item = &'e syn::Expr> {
        std::iter::once(self.payload).chain(self.origin)
    }
}

/// Result of a successful strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub type_name: Option<String>,
    pub schema: SchemaNode,
    pub strategy: &'static str,
}

/// One way of deriving a payload shape.
pub trait ShapeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn resolve(
        &self,
        engine: &InferenceEngine,
        candidates: &ShapeCandidates,
        scope: &FunctionScope,
    ) -> Option<(Option<String>, SchemaNode)>;
}

/// `json!({..})`, `vec![..]`, `HashMap::from(..)` as the payload or its origin.
pub struct LiteralStrategy;

impl ShapeStrategy for LiteralStrategy {
    fn name(&self) -> &'static str {
        "literal"
    }

    fn resolve(
        &self,
        engine: &InferenceEngine,
        candidates: &ShapeCandidates,
        scope: &FunctionScope,
    ) -> Option<(Option<String>, SchemaNode)> {
        let literal = candidates.exprs().find_map(literal_of)?;
        let mut schema = engine.literal_schema(&literal, scope);
        if let Some(variable) = &candidates.variable {
            engine.merge_mutations(variable, &mut schema, scope);
            engine.merge_appended(variable, &mut schema, scope);
        }
        Some((None, schema))
    }
}

/// Full expression-shape inference, following traced origins through the body.
pub struct TracedOriginStrategy;

impl ShapeStrategy for TracedOriginStrategy {
    fn name(&self) -> &'static str {
        "traced-origin"
    }

    fn resolve(
        &self,
        engine: &InferenceEngine,
        candidates: &ShapeCandidates,
        scope: &FunctionScope,
    ) -> Option<(Option<String>, SchemaNode)> {
        let schema = candidates
            .exprs()
            .find_map(|expr| engine.try_infer_schema(expr, scope))?;
        let type_name = engine.infer_type_name(candidates.payload, scope);
        Some((type_name, schema))
    }
}

/// Type-name inference plus registry lookup.
pub struct DeclaredTypeStrategy;

impl ShapeStrategy for DeclaredTypeStrategy {
    fn name(&self) -> &'static str {
        "declared-type"
    }

    fn resolve(
        &self,
        engine: &InferenceEngine,
        candidates: &ShapeCandidates,
        scope: &FunctionScope,
    ) -> Option<(Option<String>, SchemaNode)> {
        candidates.exprs().find_map(|expr| {
            let name = engine.infer_type_name(expr, scope)?;
            let canonical = engine.registry().canonical_name(&name);
            let schema = engine.known_type_schema(&canonical)?;
            Some((Some(canonical), schema))
        })
    }
}

/// Variable names as type names: `user` -> `User`, `orders` -> `[Order]`.
pub struct NamingHeuristicStrategy;

impl ShapeStrategy for NamingHeuristicStrategy {
    fn name(&self) -> &'static str {
        "naming-heuristic"
    }

    fn resolve(
        &self,
        engine: &InferenceEngine,
        candidates: &ShapeCandidates,
        _scope: &FunctionScope,
    ) -> Option<(Option<String>, SchemaNode)> {
        let variable = candidates.variable.as_deref()?;
        let registry = engine.registry();

        let single = to_pascal_case(variable);
        if registry.is_struct(&single) {
            return Some((Some(single.clone()), SchemaNode::reference(&single)));
        }

        let plural = noun_type_name(&singularize(variable)?);
        registry.is_struct(&plural).then(|| {
            (
                Some(format!("Vec<{}>", plural)),
                SchemaNode::array(SchemaNode::reference(&plural)),
            )
        })
    }
}

/// The strategies in the order they are tried.
pub fn default_strategies() -> Vec<Box<dyn ShapeStrategy>> {
    vec![
        Box::new(LiteralStrategy),
        Box::new(TracedOriginStrategy),
        Box::new(DeclaredTypeStrategy),
        Box::new(NamingHeuristicStrategy),
    ]
}

/// Name reported when no strategy matched.
pub const FALLBACK_STRATEGY: &str = "fallback";

/// Resolves a payload through `strategies`; falls back to an untyped object so a
/// payload always has some shape.
pub fn resolve_shape(
    strategies: &[Box<dyn ShapeStrategy>],
    engine: &InferenceEngine,
    candidates: &ShapeCandidates,
    scope: &FunctionScope,
) -> Shape {
    for strategy in strategies {
        if let Some((type_name, schema)) = strategy.resolve(engine, candidates, scope) {
            debug!("Payload shape resolved by {} strategy", strategy.name());
            return Shape {
                type_name,
                schema,
                strategy: strategy.name(),
            };
        }
    }

    debug!("No strategy matched payload, using untyped object");
    Shape {
        type_name: None,
        schema: SchemaNode::untyped_object(),
        strategy: FALLBACK_STRATEGY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions::Conventions;
    use crate::function_table::FunctionReturnTable;
    use crate::type_registry::TypeRegistry;
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

    struct Fixture {
        registry: TypeRegistry,
        functions: FunctionReturnTable,
        conventions: Conventions,
    }

    impl Fixture {
        fn new(code: &str) -> Self {
            Self {
                registry: registry_from(code),
                functions: FunctionReturnTable::default(),
                conventions: Conventions::default(),
            }
        }

        fn engine(&self) -> InferenceEngine<'_> {
            InferenceEngine::new(&self.registry, &self.functions, &self.conventions)
        }
    }

    #[test]
    fn test_literal_strategy_uses_origin() {
        let fixture = Fixture::new("");
        let engine = fixture.engine();
        let origin = expr(r#"json!({"ok": true})"#);
        let payload = expr("&body");
        let mut scope = FunctionScope::default();
        scope.bind("body", None, Some(&origin));

        let candidates = ShapeCandidates::new(&payload, &scope);
        let (type_name, schema) = LiteralStrategy.resolve(&engine, &candidates, &scope).unwrap();
        assert!(type_name.is_none());
        assert!(schema.property("ok").is_some());
    }

    #[test]
    fn test_literal_strategy_skips_non_literals() {
        let fixture = Fixture::new("");
        let engine = fixture.engine();
        let payload = expr("user");
        let scope = FunctionScope::default();

        let candidates = ShapeCandidates::new(&payload, &scope);
        assert!(LiteralStrategy.resolve(&engine, &candidates, &scope).is_none());
    }

    #[test]
    fn test_declared_type_strategy() {
        let fixture = Fixture::new("pub struct UserResponse { pub id: u64 }");
        let engine = fixture.engine();
        let payload = expr("new_user_response(user)");
        let scope = FunctionScope::default();

        let candidates = ShapeCandidates::new(&payload, &scope);
        let (type_name, schema) = DeclaredTypeStrategy
            .resolve(&engine, &candidates, &scope)
            .unwrap();
        assert_eq!(type_name.as_deref(), Some("UserResponse"));
        assert_eq!(schema, SchemaNode::reference("UserResponse"));
    }

    #[test]
    fn test_naming_heuristic_strategy() {
        let fixture = Fixture::new("pub struct Order { pub id: u64 }");
        let engine = fixture.engine();
        let scope = FunctionScope::default();

        let payload = expr("orders");
        let candidates = ShapeCandidates::new(&payload, &scope);
        let (_, schema) = NamingHeuristicStrategy
            .resolve(&engine, &candidates, &scope)
            .unwrap();
        assert_eq!(schema, SchemaNode::array(SchemaNode::reference("Order")));

        let payload = expr("order");
        let candidates = ShapeCandidates::new(&payload, &scope);
        let (_, schema) = NamingHeuristicStrategy
            .resolve(&engine, &candidates, &scope)
            .unwrap();
        assert_eq!(schema, SchemaNode::reference("Order"));
    }

    #[test]
    fn test_resolve_falls_back_to_untyped_object() {
        let fixture = Fixture::new("");
        let engine = fixture.engine();
        let payload = expr("mystery()");
        let scope = FunctionScope::default();

        let candidates = ShapeCandidates::new(&payload, &scope);
        let shape = resolve_shape(&default_strategies(), &engine, &candidates, &scope);
        assert_eq!(shape.strategy, "fallback");
        assert_eq!(shape.schema, SchemaNode::untyped_object());
    }

    #[test]
    fn test_first_success_wins() {
        let fixture = Fixture::new("pub struct Stats { pub total: u64 }");
        let engine = fixture.engine();
        let origin = expr(r#"json!({"total": 1})"#);
        let payload = expr("stats");
        let mut scope = FunctionScope::default();
        scope.bind("stats", Some("Stats".to_string()), Some(&origin));

        let candidates = ShapeCandidates::new(&payload, &scope);
        let shape = resolve_shape(&default_strategies(), &engine, &candidates, &scope);
        assert_eq!(shape.strategy, "literal");
        assert!(shape.schema.is_object());
    }
}
