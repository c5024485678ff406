use crate::parser::doc_lines;
use crate::schema::SchemaNode;
use crate::schema_synth::SchemaSynthesizer;
use crate::type_string::{last_segment, render_type, split_generics};
use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use syn::meta::ParseNestedMeta;

/// Registry of named record types, enums and type aliases.
///
/// Registration (pass 1) only records declarations; schemas are synthesized in a
/// separate pass ([`TypeRegistry::synthesize_all`]) once the whole type universe of
/// the loaded file set is known, so forward references and cycles are harmless.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    structs: IndexMap<String, TypeDescriptor>,
    enums: IndexMap<String, EnumDescriptor>,
    /// alias name -> target type descriptor
    aliases: IndexMap<String, String>,
}

/// A named record type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub name: String,
    /// Own fields in declaration order, keyed by field name
    pub fields: IndexMap<String, FieldDescriptor>,
    /// Declared types of `#[serde(flatten)]` fields, promoted into this struct
    pub embedded: Vec<String>,
    pub description: Option<String>,
    pub source: Option<PathBuf>,
    /// Cached result of pass 2
    pub schema: Option<SchemaNode>,
}

/// A single struct field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    /// Canonical type descriptor, e.g. `Option<Vec<Tag>>`
    pub declared_type: String,
    /// Name on the wire (serde rename / rename_all applied)
    pub serialized_name: String,
    /// `#[serde(skip_serializing_if = ...)]`
    pub omit_when_empty: bool,
    /// `#[serde(default)]`
    pub has_default: bool,
    /// The declared type is `Option<..>`
    pub is_pointer: bool,
}

/// A named enum. Only unit-variant enums get a closed string schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub name: String,
    /// Serialized variant names
    pub variants: Vec<String>,
    pub unit_only: bool,
    pub schema: Option<SchemaNode>,
}

/// Counts of what a registration call added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterStats {
    pub structs: usize,
    pub enums: usize,
    pub aliases: usize,
}

impl RegisterStats {
    pub fn total(&self) -> usize {
        self.structs + self.enums + self.aliases
    }

    fn add(&mut self, other: RegisterStats) {
        self.structs += other.structs;
        self.enums += other.enums;
        self.aliases += other.aliases;
    }
}

#[derive(Debug, Default)]
struct SerdeAttributes {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
    flatten: bool,
    skip_serializing_if: bool,
    default: bool,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every struct, enum and alias declared in `file`, including those in
    /// inline `mod` blocks. Returns what was newly added.
    pub fn register_file(&mut self, file: &syn::File, source: &Path) -> RegisterStats {
        let stats = self.register_items(&file.items, source);
        debug!(
            "Registered {} structs, {} enums, {} aliases from {}",
            stats.structs,
            stats.enums,
            stats.aliases,
            source.display()
        );
        stats
    }

    fn register_items(&mut self, items: &[syn::Item], source: &Path) -> RegisterStats {
        let mut stats = RegisterStats::default();
        for item in items {
            match item {
                syn::Item::Struct(item_struct) => {
                    if self.register_struct(Self::describe_struct(item_struct, source)) {
                        stats.structs += 1;
                    }
                }
                syn::Item::Enum(item_enum) => {
                    if self.register_enum(Self::describe_enum(item_enum)) {
                        stats.enums += 1;
                    }
                }
                syn::Item::Type(item_type) => {
                    if self.register_alias(&item_type.ident.to_string(), &render_type(&item_type.ty)) {
                        stats.aliases += 1;
                    }
                }
                syn::Item::Mod(item_mod) => {
                    if let Some((_, items)) = &item_mod.content {
                        stats.add(self.register_items(items, source));
                    }
                }
                _ => {}
            }
        }
        stats
    }

    /// Records a struct. An existing entry with the same name is kept; returns
    /// whether the descriptor was added.
    pub fn register_struct(&mut self, descriptor: TypeDescriptor) -> bool {
        if self.structs.contains_key(&descriptor.name) {
            debug!("Struct {} already registered, keeping first", descriptor.name);
            return false;
        }
        debug!("Registered struct {}", descriptor.name);
        self.structs.insert(descriptor.name.clone(), descriptor);
        true
    }

    pub fn register_enum(&mut self, descriptor: EnumDescriptor) -> bool {
        if self.enums.contains_key(&descriptor.name) {
            return false;
        }
        self.enums.insert(descriptor.name.clone(), descriptor);
        true
    }

    pub fn register_alias(&mut self, alias: &str, target: &str) -> bool {
        if self.aliases.contains_key(alias) {
            return false;
        }
        debug!("Registered alias {} = {}", alias, target);
        self.aliases.insert(alias.to_string(), target.to_string());
        true
    }

    /// Builds the descriptor of a struct declaration. Tuple and unit structs have no fields.
    pub fn describe_struct(item_struct: &syn::ItemStruct, source: &Path) -> TypeDescriptor {
        let container = parse_serde_attributes(&item_struct.attrs);
        let mut fields = IndexMap::new();
        let mut embedded = Vec::new();

        if let syn::Fields::Named(named) = &item_struct.fields {
            for field in &named.named {
                let Some(ident) = &field.ident else { continue };
                let attrs = parse_serde_attributes(&field.attrs);
                if attrs.skip {
                    continue;
                }

                let name = ident.to_string();
                let declared_type = render_type(&field.ty);
                if attrs.flatten {
                    embedded.push(declared_type);
                    continue;
                }

                let serialized_name = attrs.rename.clone().unwrap_or_else(|| {
                    container
                        .rename_all
                        .as_deref()
                        .map(|rule| apply_rename_rule(rule, &name))
                        .unwrap_or_else(|| name.clone())
                });
                let is_pointer = split_generics(&declared_type).0.ends_with("Option");

                fields.insert(
                    name.clone(),
                    FieldDescriptor {
                        name,
                        declared_type,
                        serialized_name,
                        omit_when_empty: attrs.skip_serializing_if,
                        has_default: attrs.default,
                        is_pointer,
                    },
                );
            }
        }

        TypeDescriptor {
            name: item_struct.ident.to_string(),
            fields,
            embedded,
            description: description_of(&item_struct.attrs),
            source: Some(source.to_path_buf()),
            schema: None,
        }
    }

    pub fn describe_enum(item_enum: &syn::ItemEnum) -> EnumDescriptor {
        let container = parse_serde_attributes(&item_enum.attrs);
        let unit_only = item_enum
            .variants
            .iter()
            .all(|v| matches!(v.fields, syn::Fields::Unit));
        let variants = item_enum
            .variants
            .iter()
            .filter_map(|variant| {
                let attrs = parse_serde_attributes(&variant.attrs);
                if attrs.skip {
                    return None;
                }
                let name = variant.ident.to_string();
                Some(attrs.rename.unwrap_or_else(|| {
                    container
                        .rename_all
                        .as_deref()
                        .map(|rule| apply_rename_rule(rule, &name))
                        .unwrap_or(name)
                }))
            })
            .collect();

        EnumDescriptor {
            name: item_enum.ident.to_string(),
            variants,
            unit_only,
            schema: None,
        }
    }

    /// Follows alias chains to a canonical type descriptor.
    ///
    /// Returns `(canonical, was_alias)`. A namespaced name with no explicit alias is
    /// reduced to its bare name. `visited` bounds the walk, so a cyclic chain ends at
    /// the first repeated name instead of recursing forever.
    pub fn resolve_alias(&self, name: &str, visited: &mut HashSet<String>) -> (String, bool) {
        let name = name.trim();
        if !visited.insert(name.to_string()) {
            warn!("Alias cycle detected at {}", name);
            return (name.to_string(), true);
        }

        if let Some(target) = self.aliases.get(name) {
            let (resolved, _) = self.resolve_alias(target, visited);
            return (resolved, true);
        }

        let (base, args) = split_generics(name);
        if args.is_empty() && base.contains("::") {
            let bare = last_segment(base);
            // `type User = models::User;` re-exports under the same bare name
            if self.aliases.contains_key(bare) && !visited.contains(bare) {
                let (resolved, _) = self.resolve_alias(bare, visited);
                return (resolved, true);
            }
            if !self.structs.contains_key(bare) && !self.enums.contains_key(bare) {
                debug!("{} is not a registered type, using bare name {}", name, bare);
            }
            return (bare.to_string(), false);
        }

        (name.to_string(), false)
    }

    /// Canonical name of `name` with a fresh visited set.
    pub fn canonical_name(&self, name: &str) -> String {
        self.resolve_alias(name, &mut HashSet::new()).0
    }

    /// Looks up a struct by any name that canonicalizes to it.
    pub fn get_struct(&self, name: &str) -> Option<&TypeDescriptor> {
        let canonical = self.canonical_name(name);
        let (base, args) = split_generics(&canonical);
        if !args.is_empty() {
            return None;
        }
        self.structs.get(last_segment(base))
    }

    pub fn get_enum(&self, name: &str) -> Option<&EnumDescriptor> {
        let canonical = self.canonical_name(name);
        let (base, args) = split_generics(&canonical);
        if !args.is_empty() {
            return None;
        }
        self.enums.get(last_segment(base))
    }

    pub fn is_struct(&self, name: &str) -> bool {
        self.get_struct(name).is_some()
    }

    pub fn structs(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.structs.values()
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumDescriptor> {
        self.enums.values()
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }

    pub fn alias_target(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Pass 2: synthesizes the schema of every struct and enum that has none yet.
    ///
    /// Must run after every declaration of the loaded file set is registered.
    pub fn synthesize_all(&mut self) {
        let pending: Vec<String> = self
            .structs
            .values()
            .filter(|d| d.schema.is_none())
            .map(|d| d.name.clone())
            .collect();

        let schemas: Vec<(String, SchemaNode)> = {
            let synthesizer = SchemaSynthesizer::new(self);
            pending
                .into_iter()
                .filter_map(|name| {
                    let descriptor = self.structs.get(&name)?;
                    Some((name, synthesizer.struct_to_schema(descriptor)))
                })
                .collect()
        };
        debug!("Synthesized {} struct schemas", schemas.len());
        for (name, schema) in schemas {
            if let Some(descriptor) = self.structs.get_mut(&name) {
                descriptor.schema = Some(schema);
            }
        }

        for descriptor in self.enums.values_mut().filter(|d| d.schema.is_none()) {
            descriptor.schema = Some(if descriptor.unit_only {
                SchemaNode::string_enum(descriptor.variants.clone())
            } else {
                SchemaNode::open_object()
            });
        }
    }

    /// Drops every cached schema and synthesizes again. Used when newly registered
    /// declarations may change the promoted fields of existing structs.
    pub fn resynthesize(&mut self) {
        for descriptor in self.structs.values_mut() {
            descriptor.schema = None;
        }
        for descriptor in self.enums.values_mut() {
            descriptor.schema = None;
        }
        self.synthesize_all();
    }

    /// Wipes the registry entirely.
    pub fn clear(&mut self) {
        self.structs.clear();
        self.enums.clear();
        self.aliases.clear();
    }
}

fn description_of(attrs: &[syn::Attribute]) -> Option<String> {
    let lines = doc_lines(attrs);
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn parse_serde_attributes(attrs: &[syn::Attribute]) -> SerdeAttributes {
    let mut serde_attrs = SerdeAttributes::default();

    for attr in attrs {
        if !attr.path().is_ident("serde") {
            continue;
        }

        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                serde_attrs.rename = parse_serialize_name(&meta)?;
            } else if meta.path.is_ident("rename_all") {
                serde_attrs.rename_all = parse_serialize_name(&meta)?;
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_serializing") {
                serde_attrs.skip = true;
            } else if meta.path.is_ident("flatten") {
                serde_attrs.flatten = true;
            } else if meta.path.is_ident("skip_serializing_if") {
                serde_attrs.skip_serializing_if = true;
                skip_meta_value(&meta)?;
            } else if meta.path.is_ident("default") {
                serde_attrs.default = true;
                skip_meta_value(&meta)?;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        });

        if let Err(e) = result {
            debug!("Ignoring unreadable serde attribute: {}", e);
        }
    }

    serde_attrs
}

/// Reads `rename = "x"` or the `serialize` half of `rename(serialize = "x", deserialize = "y")`.
fn parse_serialize_name(meta: &ParseNestedMeta) -> syn::Result<Option<String>> {
    if meta.input.peek(syn::Token![=]) {
        let value: syn::LitStr = meta.value()?.parse()?;
        return Ok(Some(value.value()));
    }

    let mut name = None;
    meta.parse_nested_meta(|inner| {
        let value: syn::LitStr = inner.value()?.parse()?;
        if inner.path.is_ident("serialize") {
            name = Some(value.value());
        }
        Ok(())
    })?;
    Ok(name)
}

fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(syn::Token![=]) {
        let _: syn::Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: proc_macro2::TokenStream = content.parse()?;
    }
    Ok(())
}

/// Applies a serde `rename_all` rule to a `snake_case` field or `PascalCase` variant name.
pub fn apply_rename_rule(rule: &str, name: &str) -> String {
    let words = split_words(name);
    let capitalize = |w: &str| {
        let mut chars = w.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
            None => String::new(),
        }
    };

    match rule {
        "lowercase" => words.concat(),
        "UPPERCASE" => words.concat().to_uppercase(),
        "PascalCase" => words.iter().map(|w| capitalize(w)).collect(),
        "camelCase" => words
            .iter()
            .enumerate()
            .map(|(i, w)| if i == 0 { w.clone() } else { capitalize(w) })
            .collect(),
        "snake_case" => words.join("_"),
        "SCREAMING_SNAKE_CASE" => words.join("_").to_uppercase(),
        "kebab-case" => words.join("-"),
        "SCREAMING-KEBAB-CASE" => words.join("-").to_uppercase(),
        _ => name.to_string(),
    }
}

/// Lowercase words of a `snake_case` or `PascalCase` identifier.
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in name.chars() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else if c.is_uppercase() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.extend(c.to_lowercase());
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
