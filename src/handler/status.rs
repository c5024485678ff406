//! HTTP status codes written as `StatusCode::CREATED`, `201`, or `HttpResponse::Created()`.

use crate::type_registry::apply_rename_rule;

const STATUS_NAMES: &[(&str, u16)] = &[
    ("OK", 200),
    ("CREATED", 201),
    ("ACCEPTED", 202),
    ("NO_CONTENT", 204),
    ("MOVED_PERMANENTLY", 301),
    ("FOUND", 302),
    ("SEE_OTHER", 303),
    ("NOT_MODIFIED", 304),
    ("TEMPORARY_REDIRECT", 307),
    ("BAD_REQUEST", 400),
    ("UNAUTHORIZED", 401),
    ("PAYMENT_REQUIRED", 402),
    ("FORBIDDEN", 403),
    ("NOT_FOUND", 404),
    ("METHOD_NOT_ALLOWED", 405),
    ("CONFLICT", 409),
    ("GONE", 410),
    ("PAYLOAD_TOO_LARGE", 413),
    ("UNSUPPORTED_MEDIA_TYPE", 415),
    ("UNPROCESSABLE_ENTITY", 422),
    ("TOO_MANY_REQUESTS", 429),
    ("INTERNAL_SERVER_ERROR", 500),
    ("NOT_IMPLEMENTED", 501),
    ("BAD_GATEWAY", 502),
    ("SERVICE_UNAVAILABLE", 503),
    ("GATEWAY_TIMEOUT", 504),
];

fn named_status(name: &str) -> Option<u16> {
    STATUS_NAMES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, code)| *code)
}

pub fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

/// Decodes a status expression: `StatusCode::CREATED`, `http::StatusCode::OK`,
/// `201`, `StatusCode::from_u16(201).unwrap()`.
pub fn status_code_of(expr: &syn::Expr) -> Option<u16> {
    match expr {
        syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(i),
            ..
        }) => i.base10_parse().ok(),
        syn::Expr::Path(p) => named_status(&p.path.segments.last()?.ident.to_string()),
        syn::Expr::Call(call) => {
            let syn::Expr::Path(func) = call.func.as_ref() else {
                return None;
            };
            let last = func.path.segments.last()?.ident.to_string();
            if last == "from_u16" {
                call.args.first().and_then(status_code_of)
            } else {
                None
            }
        }
        syn::Expr::MethodCall(m) if matches!(m.method.to_string().as_str(), "unwrap" | "expect") => {
            status_code_of(&m.receiver)
        }
        syn::Expr::Reference(r) => status_code_of(&r.expr),
        syn::Expr::Paren(p) => status_code_of(&p.expr),
        _ => None,
    }
}

/// Status of an actix-style response builder chain ending in `.json(..)`:
/// `HttpResponse::Created()`, `HttpResponse::build(StatusCode::ACCEPTED)`,
/// `HttpResponse::Ok().status(StatusCode::CREATED)`.
pub fn builder_status(expr: &syn::Expr) -> Option<u16> {
    match expr {
        syn::Expr::Call(call) => {
            let syn::Expr::Path(func) = call.func.as_ref() else {
                return None;
            };
            let last = func.path.segments.last()?.ident.to_string();
            if last == "build" {
                return call.args.first().and_then(status_code_of);
            }
            if call.args.is_empty() {
                return named_status(&apply_rename_rule("SCREAMING_SNAKE_CASE", &last));
            }
            None
        }
        syn::Expr::MethodCall(m) => {
            if m.method == "status" {
                if let Some(code) = m.args.first().and_then(status_code_of) {
                    return Some(code);
                }
            }
            builder_status(&m.receiver)
        }
        syn::Expr::Paren(p) => builder_status(&p.expr),
        _ => None,
    }
}

/// `404` -> `Not found`.
pub fn reason_phrase(code: u16) -> Option<String> {
    let (name, _) = STATUS_NAMES.iter().find(|(_, c)| *c == code)?;
    let words = name.to_lowercase().replace('_', " ");
    let mut chars = words.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
}
