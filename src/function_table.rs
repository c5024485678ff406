//! Return types of the functions declared in one file.
//!
//! Handlers frequently delegate payload construction to a local helper
//! (`fn build_summary(..) -> Value { json!({..}) }`). The table records what every
//! function returns so calls to it resolve like any other typed expression. For
//! map-shaped returns the helper's own body is walked once and the richest literal
//! it builds becomes a pre-computed deep schema.

use crate::conventions::Conventions;
use crate::handler::walker::FunctionWalker;
use crate::inference::literal::literal_of;
use crate::inference::InferenceEngine;
use crate::schema::SchemaNode;
use crate::schema_synth::is_any_like;
use crate::type_registry::TypeRegistry;
use crate::type_string::{base_name, last_segment, render_type, render_type_with_self, split_generics};
use log::debug;
use std::collections::HashMap;

/// What one function returns.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionReturn {
    /// Return type descriptor with an outer `Result` removed; `()` when the
    /// function returns nothing
    pub return_type: String,
    /// Shape of the richest literal the body builds, for map-shaped returns
    pub deep_schema: Option<SchemaNode>,
}

/// Helper name (`build_summary`) or `Owner::method` -> return information.
#[derive(Debug, Clone, Default)]
pub struct FunctionReturnTable {
    entries: HashMap<String, FunctionReturn>,
}

/// A function body together with the impl it belongs to.
struct FunctionItem<'ast> {
    key: String,
    owner: Option<String>,
    sig: &'ast syn::Signature,
    block: &'ast syn::Block,
}

impl FunctionReturnTable {
    /// Builds the table for every function and inherent method in `file`.
    pub fn build(file: &syn::File, registry: &TypeRegistry, conventions: &Conventions) -> Self {
        let mut items = Vec::new();
        collect_functions(&file.items, &mut items);

        let mut table = Self::default();
        for item in &items {
            let return_type = match &item.sig.output {
                syn::ReturnType::Default => "()".to_string(),
                syn::ReturnType::Type(_, ty) => {
                    unwrap_result(&render_type_with_self(ty, item.owner.as_deref()))
                }
            };
            table.entries.insert(
                item.key.clone(),
                FunctionReturn {
                    return_type,
                    deep_schema: None,
                },
            );
        }

        // Deep schemas are computed against the signature-only table so a helper
        // may call another helper.
        let deep_schemas: Vec<(String, SchemaNode)> = {
            let engine = InferenceEngine::new(registry, &table, conventions);
            items
                .iter()
                .filter(|item| {
                    table
                        .entries
                        .get(&item.key)
                        .is_some_and(|entry| is_map_shaped(&entry.return_type))
                })
                .filter_map(|item| {
                    deep_schema_of(&engine, item).map(|schema| (item.key.clone(), schema))
                })
                .collect()
        };

        for (key, schema) in deep_schemas {
            debug!("Helper {} returns a literal shape", key);
            if let Some(entry) = table.entries.get_mut(&key) {
                entry.deep_schema = Some(schema);
            }
        }

        debug!("Recorded {} function return types", table.entries.len());
        table
    }

    pub fn get(&self, name: &str) -> Option<&FunctionReturn> {
        self.entries.get(name)
    }
}

fn collect_functions<'ast>(items: &'ast [syn::Item], out: &mut Vec<FunctionItem<'ast>>) {
    for item in items {
        match item {
            syn::Item::Fn(item_fn) => out.push(FunctionItem {
                key: item_fn.sig.ident.to_string(),
                owner: None,
                sig: &item_fn.sig,
                block: &item_fn.block,
            }),
            syn::Item::Impl(item_impl) => {
                let owner = base_name(&render_type(&item_impl.self_ty)).to_string();
                for impl_item in &item_impl.items {
                    if let syn::ImplItem::Fn(method) = impl_item {
                        out.push(FunctionItem {
                            key: format!("{}::{}", owner, method.sig.ident),
                            owner: Some(owner.clone()),
                            sig: &method.sig,
                            block: &method.block,
                        });
                    }
                }
            }
            syn::Item::Mod(item_mod) => {
                if let Some((_, nested)) = &item_mod.content {
                    collect_functions(nested, out);
                }
            }
            _ => {}
        }
    }
}

/// Walks a helper body and shapes its richest object literal, including keys
/// assigned to the variable that holds it.
fn deep_schema_of(engine: &InferenceEngine, item: &FunctionItem) -> Option<SchemaNode> {
    let mut walker = FunctionWalker::new(engine, item.owner.clone());
    walker.walk(item.block);

    let mut richest: Option<(&syn::Expr, usize)> = None;
    for expr in &walker.findings.object_literals {
        let keys = literal_of(expr).map(|l| l.key_count()).unwrap_or(0);
        if richest.map_or(true, |(_, best)| keys > best) {
            richest = Some((*expr, keys));
        }
    }
    let (expr, _) = richest?;

    let literal = literal_of(expr)?;
    let mut schema = engine.literal_schema(&literal, &walker.scope);
    if let Some(variable) = walker.scope.variable_with_origin(expr) {
        engine.merge_mutations(variable, &mut schema, &walker.scope);
    }
    Some(schema)
}

fn unwrap_result(desc: &str) -> String {
    let (base, args) = split_generics(desc);
    match (last_segment(base), args.first()) {
        ("Result", Some(inner)) => inner.to_string(),
        _ => desc.to_string(),
    }
}

fn is_map_shaped(desc: &str) -> bool {
    let (base, _) = split_generics(desc);
    matches!(last_segment(base), "HashMap" | "BTreeMap" | "IndexMap") || is_any_like(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PrimitiveKind;

    fn table_from(code: &str) -> FunctionReturnTable {
        let file = syn::parse_file(code).expect("Failed to parse test code");
        let registry = TypeRegistry::new();
        FunctionReturnTable::build(&file, &registry, &Conventions::default())
    }

    #[test]
    fn test_signature_return_types() {
        let table = table_from(
            r#"
            fn find_user(id: u64) -> Result<User, AppError> { todo!() }
            fn log_it() {}
            impl UserService {
                pub fn current(&self) -> Self { todo!() }
            }
            mod nested {
                fn page() -> Option<Page> { None }
            }
        "#,
        );

        assert_eq!(table.get("find_user").unwrap().return_type, "User");
        assert_eq!(table.get("log_it").unwrap().return_type, "()");
        assert_eq!(table.get("UserService::current").unwrap().return_type, "UserService");
        assert_eq!(table.get("page").unwrap().return_type, "Option<Page>");
        assert!(table.get("current").is_none());
    }

    #[test]
    fn test_deep_schema_from_richest_literal() {
        let table = table_from(
            r#"
            fn build_stats(count: usize) -> Value {
                if count == 0 {
                    return json!({"empty": true});
                }
                let mut stats = json!({"total": count, "label": "all"});
                stats["generated_at"] = json!(Utc::now());
                stats
            }
        "#,
        );

        let entry = table.get("build_stats").unwrap();
        assert_eq!(entry.return_type, "Value");
        let schema = entry.deep_schema.as_ref().unwrap();
        assert!(schema.property("total").is_some());
        assert!(schema.property("empty").is_none());
        assert_eq!(
            schema.property("generated_at").and_then(|s| s.format()),
            Some("date-time")
        );
        assert!(!schema.required().contains(&"generated_at".to_string()));
    }

    #[test]
    fn test_map_helpers_in_impls() {
        let table = table_from(
            r#"
            impl Report {
                fn summary(&self) -> HashMap<String, Value> {
                    HashMap::from([("name".to_string(), json!("x"))])
                }
                fn title(&self) -> String { String::new() }
            }
        "#,
        );

        let summary = table.get("Report::summary").unwrap();
        let name = summary.deep_schema.as_ref().and_then(|s| s.property("name"));
        assert_eq!(name.and_then(|s| s.primitive_kind()), Some(PrimitiveKind::String));
        assert!(table.get("Report::title").unwrap().deep_schema.is_none());
    }
}
