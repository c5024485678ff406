//! Literal constructions whose shape is visible in the source: `json!` bodies,
//! `vec![..]`, array expressions and `HashMap::from([(k, v), ..])`.

use log::debug;
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;

/// Structure of a literal construction. Leaf values are kept as expressions and
/// shaped later, in the scope of the enclosing function.
#[derive(Debug, Clone)]
pub enum LiteralShape {
    /// Keys in source order
    Object(Vec<(String, LiteralShape)>),
    Array(Vec<LiteralShape>),
    Null,
    Value(syn::Expr),
}

impl LiteralShape {
    /// Number of top-level keys; used to pick the richest construction in a body.
    pub fn key_count(&self) -> usize {
        match self {
            LiteralShape::Object(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, LiteralShape::Object(_))
    }
}

/// `json!` token grammar: `{ "k": v, .. }`, `[ v, .. ]`, `null` or any expression.
impl Parse for LiteralShape {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        if input.peek(syn::token::Brace) {
            let content;
            syn::braced!(content in input);
            let mut entries = Vec::new();
            while !content.is_empty() {
                let key = if content.peek(syn::LitStr) {
                    Some(content.parse::<syn::LitStr>()?.value())
                } else {
                    // computed key, shape unknown
                    let _: syn::Expr = content.parse()?;
                    None
                };
                content.parse::<syn::Token![:]>()?;
                let value: LiteralShape = content.parse()?;
                if let Some(key) = key {
                    entries.push((key, value));
                }
                if content.is_empty() {
                    break;
                }
                content.parse::<syn::Token![,]>()?;
            }
            return Ok(LiteralShape::Object(entries));
        }

        if input.peek(syn::token::Bracket) {
            let content;
            syn::bracketed!(content in input);
            let items = Punctuated::<LiteralShape, syn::Token![,]>::parse_terminated(&content)?;
            return Ok(LiteralShape::Array(items.into_iter().collect()));
        }

        if input.peek(syn::Ident) {
            let fork = input.fork();
            let ident: syn::Ident = fork.parse()?;
            if ident == "null" && (fork.is_empty() || fork.peek(syn::Token![,])) {
                input.parse::<syn::Ident>()?;
                return Ok(LiteralShape::Null);
            }
        }

        Ok(LiteralShape::Value(input.parse()?))
    }
}

/// Returns the literal structure of `expr` when it is a literal construction.
pub fn literal_of(expr: &syn::Expr) -> Option<LiteralShape> {
    match expr {
        syn::Expr::Macro(expr_macro) => macro_literal(&expr_macro.mac),
        syn::Expr::Array(array) => Some(LiteralShape::Array(
            array
                .elems
                .iter()
                .map(|e| literal_of(e).unwrap_or_else(|| LiteralShape::Value(e.clone())))
                .collect(),
        )),
        syn::Expr::Call(call) => map_from_literal(call),
        syn::Expr::Paren(paren) => literal_of(&paren.expr),
        syn::Expr::Group(group) => literal_of(&group.expr),
        _ => None,
    }
}

fn macro_literal(mac: &syn::Macro) -> Option<LiteralShape> {
    let name = mac.path.segments.last()?.ident.to_string();
    match name.as_str() {
        "json" => match mac.parse_body::<LiteralShape>() {
            Ok(shape) => Some(shape),
            Err(e) => {
                debug!("Unreadable json! body: {}", e);
                None
            }
        },
        "vec" => {
            if let Ok(items) = mac.parse_body_with(Punctuated::<syn::Expr, syn::Token![,]>::parse_terminated) {
                return Some(LiteralShape::Array(
                    items
                        .iter()
                        .map(|e| literal_of(e).unwrap_or_else(|| LiteralShape::Value(e.clone())))
                        .collect(),
                ));
            }
            // vec![elem; n]
            mac.parse_body_with(|input: ParseStream| {
                let elem: syn::Expr = input.parse()?;
                input.parse::<syn::Token![;]>()?;
                let _: syn::Expr = input.parse()?;
                Ok(elem)
            })
            .ok()
            .map(|elem| LiteralShape::Array(vec![LiteralShape::Value(elem)]))
        }
        _ => None,
    }
}

/// `HashMap::from([("id", v), ..])` and the `BTreeMap` / `IndexMap` equivalents.
fn map_from_literal(call: &syn::ExprCall) -> Option<LiteralShape> {
    let syn::Expr::Path(func) = call.func.as_ref() else {
        return None;
    };
    let segments: Vec<_> = func.path.segments.iter().map(|s| s.ident.to_string()).collect();
    let [.., owner, method] = segments.as_slice() else {
        return None;
    };
    if method != "from" || !matches!(owner.as_str(), "HashMap" | "BTreeMap" | "IndexMap") {
        return None;
    }

    let elems = match call.args.first()? {
        syn::Expr::Array(array) => array.elems.iter().collect::<Vec<_>>(),
        syn::Expr::Reference(r) => match r.expr.as_ref() {
            syn::Expr::Array(array) => array.elems.iter().collect(),
            _ => return None,
        },
        _ => return None,
    };

    let mut entries = Vec::new();
    for elem in elems {
        let syn::Expr::Tuple(tuple) = elem else {
            return None;
        };
        let (Some(key), Some(value)) = (tuple.elems.first(), tuple.elems.iter().nth(1)) else {
            return None;
        };
        let Some(key) = string_key(key) else {
            continue;
        };
        let shape = literal_of(value).unwrap_or_else(|| LiteralShape::Value(value.clone()));
        entries.push((key, shape));
    }
    Some(LiteralShape::Object(entries))
}

/// Reads a constant string key: `"k"`, `"k".to_string()`, `"k".into()`, `String::from("k")`.
pub fn string_key(expr: &syn::Expr) -> Option<String> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Str(s),
            ..
        }) => Some(s.value()),
        syn::Expr::MethodCall(call)
            if matches!(
                call.method.to_string().as_str(),
                "to_string" | "to_owned" | "into"
            ) =>
        {
            string_key(&call.receiver)
        }
        syn::Expr::Call(call) => {
            let syn::Expr::Path(func) = call.func.as_ref() else {
                return None;
            };
            let is_from = func
                .path
                .segments
                .last()
                .is_some_and(|s| s.ident == "from");
            if is_from && call.args.len() == 1 {
                string_key(&call.args[0])
            } else {
                None
            }
        }
        syn::Expr::Reference(r) => string_key(&r.expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> syn::Expr {
        syn::parse_str(src).expect("Failed to parse test expression")
    }

    fn keys(shape: &LiteralShape) -> Vec<String> {
        match shape {
            LiteralShape::Object(entries) => entries.iter().map(|(k, _)| k.clone()).collect(),
            _ => Vec::new(),
        }
    }

    #[test]
    fn test_json_object() {
        let shape = literal_of(&expr(
            r#"json!({"id": "x", "count": 3, "nested": {"ok": true}, "items": [1, 2], "gone": null})"#,
        ))
        .unwrap();

        assert_eq!(keys(&shape), vec!["id", "count", "nested", "items", "gone"]);
        let LiteralShape::Object(entries) = &shape else { unreachable!() };
        assert!(matches!(entries[2].1, LiteralShape::Object(_)));
        assert!(matches!(entries[3].1, LiteralShape::Array(_)));
        assert!(matches!(entries[4].1, LiteralShape::Null));
    }

    #[test]
    fn test_json_values_may_be_expressions() {
        let shape = literal_of(&expr(
            r#"serde_json::json!({"user": user.clone(), "total": users.len(), "at": Utc::now(),})"#,
        ))
        .unwrap();
        assert_eq!(keys(&shape), vec!["user", "total", "at"]);
    }

    #[test]
    fn test_vec_and_array() {
        let LiteralShape::Array(items) = literal_of(&expr("vec![a, b, c]")).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);

        let LiteralShape::Array(items) = literal_of(&expr("vec![0u8; 16]")).unwrap() else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 1);

        assert!(matches!(literal_of(&expr("[1, 2]")), Some(LiteralShape::Array(_))));
    }

    #[test]
    fn test_hashmap_from() {
        let shape = literal_of(&expr(
            r#"HashMap::from([("status", "ok".to_string()), (String::from("code"), 200)])"#,
        ))
        .unwrap();
        assert_eq!(keys(&shape), vec!["status", "code"]);
    }

    #[test]
    fn test_non_literals() {
        assert!(literal_of(&expr("build_stats()")).is_none());
        assert!(literal_of(&expr("println!(\"x\")")).is_none());
        assert!(literal_of(&expr("HashMap::new()")).is_none());
    }

    #[test]
    fn test_string_key() {
        assert_eq!(string_key(&expr(r#""k""#)).as_deref(), Some("k"));
        assert_eq!(string_key(&expr(r#""k".to_string()"#)).as_deref(), Some("k"));
        assert_eq!(string_key(&expr(r#"String::from("k")"#)).as_deref(), Some("k"));
        assert_eq!(string_key(&expr("key")), None);
    }
}
