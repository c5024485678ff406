//! Canonical string descriptors for Rust types.
//!
//! Field types, alias targets and inferred binding types are all carried as plain
//! strings (`Vec<User>`, `Option<models::Profile>`, `HashMap<String, Value>`), which
//! keeps registry entries `Send + Sync` and cheap to clone. References, slices and
//! arrays are normalized on the way in so the schema synthesizer only has to know
//! about named wrappers.

/// Renders a `syn::Type` into its canonical descriptor.
pub fn render_type(ty: &syn::Type) -> String {
    render_type_with_self(ty, None)
}

/// Like [`render_type`], replacing `Self` with the enclosing impl's type.
pub fn render_type_with_self(ty: &syn::Type, self_type: Option<&str>) -> String {
    match ty {
        syn::Type::Path(type_path) => render_path(&type_path.path, self_type),
        syn::Type::Reference(reference) => render_type_with_self(&reference.elem, self_type),
        syn::Type::Ptr(ptr) => render_type_with_self(&ptr.elem, self_type),
        syn::Type::Paren(paren) => render_type_with_self(&paren.elem, self_type),
        syn::Type::Group(group) => render_type_with_self(&group.elem, self_type),
        syn::Type::Slice(slice) => {
            format!("Vec<{}>", render_type_with_self(&slice.elem, self_type))
        }
        syn::Type::Array(array) => {
            format!("Vec<{}>", render_type_with_self(&array.elem, self_type))
        }
        syn::Type::Tuple(tuple) if tuple.elems.is_empty() => "()".to_string(),
        syn::Type::ImplTrait(impl_trait) => {
            format!("impl {}", first_trait_name(impl_trait.bounds.iter()))
        }
        syn::Type::TraitObject(object) => {
            format!("dyn {}", first_trait_name(object.bounds.iter()))
        }
        syn::Type::Never(_) => "!".to_string(),
        _ => "Value".to_string(),
    }
}

fn first_trait_name<'a>(mut bounds: impl Iterator<Item = &'a syn::TypeParamBound>) -> String {
    bounds
        .find_map(|b| match b {
            syn::TypeParamBound::Trait(t) => t.path.segments.last().map(|s| s.ident.to_string()),
            _ => None,
        })
        .unwrap_or_else(|| "Any".to_string())
}

/// Renders a path such as `std::collections::HashMap<String, Vec<User>>`.
pub fn render_path(path: &syn::Path, self_type: Option<&str>) -> String {
    let segments: Vec<String> = path
        .segments
        .iter()
        .map(|segment| {
            let ident = segment.ident.to_string();
            let ident = match (ident.as_str(), self_type) {
                ("Self", Some(owner)) => owner.to_string(),
                _ => ident,
            };
            match &segment.arguments {
                syn::PathArguments::AngleBracketed(args) => {
                    let rendered: Vec<String> = args
                        .args
                        .iter()
                        .filter_map(|arg| match arg {
                            syn::GenericArgument::Type(ty) => {
                                Some(render_type_with_self(ty, self_type))
                            }
                            _ => None,
                        })
                        .collect();
                    if rendered.is_empty() {
                        ident
                    } else {
                        format!("{}<{}>", ident, rendered.join(", "))
                    }
                }
                _ => ident,
            }
        })
        .collect();
    segments.join("::")
}

/// Splits `HashMap<String, Vec<User>>` into (`HashMap`, [`String`, `Vec<User>`]).
///
/// A descriptor without generic arguments yields an empty argument list.
pub fn split_generics(desc: &str) -> (&str, Vec<&str>) {
    let desc = desc.trim();
    let Some(open) = desc.find('<') else {
        return (desc, Vec::new());
    };
    if !desc.ends_with('>') {
        return (desc, Vec::new());
    }

    let inner = &desc[open + 1..desc.len() - 1];
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in inner.char_indices() {
        match c {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last);
    }

    (&desc[..open], args)
}

/// Last `::` segment of a path: `models::User` -> `User`.
pub fn last_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Base name of a descriptor with namespace and generics removed:
/// `chrono::DateTime<Utc>` -> `DateTime`.
pub fn base_name(desc: &str) -> &str {
    last_segment(split_generics(desc).0)
}

pub fn is_namespaced(desc: &str) -> bool {
    split_generics(desc).0.contains("::")
}

/// `snake_case` -> `PascalCase`, used by naming heuristics.
pub fn to_pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Singular form of a plural English word, good enough for `users` / `categories` / `boxes`.
pub fn singularize(word: &str) -> Option<String> {
    if let Some(stem) = word.strip_suffix("ies") {
        return Some(format!("{}y", stem));
    }
    if let Some(stem) = word.strip_suffix("xes").or_else(|| word.strip_suffix("ses")) {
        return Some(format!("{}{}", stem, &word[stem.len()..stem.len() + 1]));
    }
    if word.ends_with("ss") || word.ends_with("us") {
        return None;
    }
    word.strip_suffix('s')
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}
