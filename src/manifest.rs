//! Project-root `Cargo.toml` lookup and same-project import resolution.
//!
//! Marked files may use record types declared in files that carry no marker.
//! `use crate::models::User` (or `use super::..`, `use self::..`, or a
//! `use other_workspace_crate::..`) is resolved to the module it names so its type
//! declarations can be registered too. Imports of crates outside the project are
//! ignored.

use crate::error::{Error, Result};
use crate::scanner::rust_files_in;
use log::{debug, warn};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
struct CargoManifest {
    package: Option<PackageSection>,
    workspace: Option<WorkspaceSection>,
    lib: Option<LibSection>,
    #[serde(default)]
    dependencies: HashMap<String, Dependency>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceSection {
    #[serde(default)]
    members: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LibSection {
    name: Option<String>,
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Dependency {
    /// `serde = "1.0"`
    Version(String),
    /// `models = { path = "../models" }`
    Detailed {
        #[serde(default)]
        path: Option<String>,
    },
}

/// Crates of one project and the source directories they live in.
#[derive(Debug, Clone)]
pub struct ProjectManifest {
    root: PathBuf,
    /// Crate name (underscored, as written in `use`) -> source root directory
    crates: HashMap<String, PathBuf>,
}

/// Files one import resolves to, keyed by the module directory (or file) so each
/// target is loaded once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportTarget {
    pub key: PathBuf,
    pub files: Vec<PathBuf>,
}

impl ProjectManifest {
    /// Finds the project root above `start`: the outermost `Cargo.toml` declaring a
    /// `[workspace]`, else the nearest `Cargo.toml`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut nearest = None;
        let mut workspace = None;
        for dir in start.ancestors() {
            let manifest = dir.join("Cargo.toml");
            if !manifest.is_file() {
                continue;
            }
            if nearest.is_none() {
                nearest = Some(dir.to_path_buf());
            }
            let declares_workspace = fs::read_to_string(&manifest)
                .map(|content| content.lines().any(|l| l.trim() == "[workspace]"))
                .unwrap_or(false);
            if declares_workspace {
                workspace = Some(dir.to_path_buf());
            }
        }
        workspace.or(nearest)
    }

    /// Loads the manifest at the project root above `start` together with its
    /// workspace members and path dependencies.
    pub fn load(start: &Path) -> Result<Self> {
        let root = Self::find_root(start).ok_or_else(|| Error::Manifest {
            file: start.join("Cargo.toml"),
            message: "no Cargo.toml found in any parent directory".to_string(),
        })?;

        let mut project = Self {
            root: root.clone(),
            crates: HashMap::new(),
        };
        let mut visited = HashSet::new();
        project.load_crate(&root, &mut visited)?;

        debug!(
            "Project root {} with crates {:?}",
            project.root.display(),
            project.crates.keys().collect::<Vec<_>>()
        );
        Ok(project)
    }

    fn load_crate(&mut self, dir: &Path, visited: &mut HashSet<PathBuf>) -> Result<()> {
        if !visited.insert(dir.to_path_buf()) {
            return Ok(());
        }
        let path = dir.join("Cargo.toml");
        let content = fs::read_to_string(&path)?;
        let manifest: CargoManifest = toml::from_str(&content).map_err(|e| Error::Manifest {
            file: path.clone(),
            message: e.to_string(),
        })?;

        if let Some(package) = &manifest.package {
            let lib = manifest.lib.as_ref();
            let name = lib
                .and_then(|l| l.name.clone())
                .unwrap_or_else(|| package.name.clone());
            let source_root = lib
                .and_then(|l| l.path.as_ref())
                .and_then(|p| dir.join(p).parent().map(Path::to_path_buf))
                .unwrap_or_else(|| dir.join("src"));
            self.crates.insert(name.replace('-', "_"), source_root);
        }

        let members = manifest.workspace.map(|w| w.members).unwrap_or_default();
        for member in members {
            for member_dir in expand_member(dir, &member) {
                if member_dir.join("Cargo.toml").is_file() {
                    self.load_crate(&member_dir, visited)?;
                }
            }
        }

        for (name, dependency) in &manifest.dependencies {
            match dependency {
                Dependency::Detailed { path: Some(rel) } => {
                    let dep_dir = normalize(&dir.join(rel));
                    if dep_dir.join("Cargo.toml").is_file() {
                        debug!("Path dependency {} at {}", name, dep_dir.display());
                        self.load_crate(&dep_dir, visited)?;
                    }
                }
                Dependency::Version(version) => {
                    debug!("Skipping registry dependency {} {}", name, version)
                }
                Dependency::Detailed { path: None } => {}
            }
        }

        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Source root of a project crate, by the name it is imported under.
    pub fn crate_source_dir(&self, name: &str) -> Option<&Path> {
        self.crates.get(name).map(PathBuf::as_path)
    }

    /// Resolves one `use` path written in `from_file`.
    ///
    /// Returns `None` for external crates and for paths that name no module file.
    pub fn resolve_import(&self, from_file: &Path, segments: &[String]) -> Option<ImportTarget> {
        let (first, rest) = segments.split_first()?;
        let mut dir = match first.as_str() {
            "crate" => crate_source_root(from_file)?,
            "self" => self_dir(from_file)?,
            "super" => super_dir(from_file)?,
            name => self.crate_source_dir(name)?.to_path_buf(),
        };

        // `super::super::..`
        let mut rest = rest;
        while let Some((segment, tail)) = rest.split_first() {
            if segment != "super" {
                break;
            }
            dir = dir.parent()?.to_path_buf();
            rest = tail;
        }

        let mut module_file = None;
        for segment in rest {
            let file = dir.join(format!("{}.rs", segment));
            let mod_file = dir.join(segment).join("mod.rs");
            if file.is_file() {
                module_file = Some(file);
            } else if mod_file.is_file() {
                module_file = Some(mod_file);
            } else {
                break;
            }
            dir = dir.join(segment);
        }

        let (key, files) = match module_file {
            Some(file) if dir.is_dir() => {
                let mut files = rust_files_in(&dir);
                if !files.contains(&file) {
                    files.insert(0, file);
                }
                (dir, files)
            }
            Some(file) => (file.clone(), vec![file]),
            // `use crate::User;` names an item of the crate root itself
            None if rest.len() <= 1 => {
                let root_file = ["lib.rs", "main.rs", "mod.rs"]
                    .iter()
                    .map(|name| dir.join(name))
                    .find(|p| p.is_file())?;
                (root_file.clone(), vec![root_file])
            }
            None => {
                warn!("Could not resolve import {}", segments.join("::"));
                return None;
            }
        };

        Some(ImportTarget { key, files })
    }
}

fn expand_member(root: &Path, member: &str) -> Vec<PathBuf> {
    match member.strip_suffix("/*") {
        Some(parent) => fs::read_dir(root.join(parent))
            .map(|entries| {
                let mut dirs: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect();
                dirs.sort();
                dirs
            })
            .unwrap_or_default(),
        None => vec![root.join(member)],
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn is_module_root(file: &Path) -> bool {
    matches!(
        file.file_name().and_then(|n| n.to_str()),
        Some("mod.rs" | "lib.rs" | "main.rs")
    )
}

/// Directory holding the submodules of the module defined by `file`.
fn self_dir(file: &Path) -> Option<PathBuf> {
    let parent = file.parent()?;
    if is_module_root(file) {
        Some(parent.to_path_buf())
    } else {
        Some(parent.join(file.file_stem()?))
    }
}

/// Directory holding the siblings of the module defined by `file`.
fn super_dir(file: &Path) -> Option<PathBuf> {
    let parent = file.parent()?;
    if is_module_root(file) {
        parent.parent().map(Path::to_path_buf)
    } else {
        Some(parent.to_path_buf())
    }
}

/// `src/` of the crate `file` belongs to: the nearest ancestor next to a `Cargo.toml`.
fn crate_source_root(file: &Path) -> Option<PathBuf> {
    file.ancestors()
        .skip(1)
        .find(|dir| dir.parent().is_some_and(|p| p.join("Cargo.toml").is_file()))
        .map(Path::to_path_buf)
}

/// Every path imported by `use` items in `file`, including inline modules.
/// Group imports are expanded; a glob keeps the path up to the `*`.
pub fn import_paths(file: &syn::File) -> Vec<Vec<String>> {
    let mut paths = Vec::new();
    collect_imports(&file.items, &mut paths);
    paths
}

fn collect_imports(items: &[syn::Item], out: &mut Vec<Vec<String>>) {
    for item in items {
        match item {
            syn::Item::Use(item_use) => flatten_use_tree(&item_use.tree, Vec::new(), out),
            syn::Item::Mod(item_mod) => {
                if let Some((_, nested)) = &item_mod.content {
                    collect_imports(nested, out);
                }
            }
            _ => {}
        }
    }
}

fn flatten_use_tree(tree: &syn::UseTree, prefix: Vec<String>, out: &mut Vec<Vec<String>>) {
    match tree {
        syn::UseTree::Path(path) => {
            let mut next = prefix;
            next.push(path.ident.to_string());
            flatten_use_tree(&path.tree, next, out);
        }
        syn::UseTree::Name(name) => {
            let mut full = prefix;
            full.push(name.ident.to_string());
            out.push(full);
        }
        syn::UseTree::Rename(rename) => {
            let mut full = prefix;
            full.push(rename.ident.to_string());
            out.push(full);
        }
        syn::UseTree::Glob(_) => out.push(prefix),
        syn::UseTree::Group(group) => {
            for item in &group.items {
                flatten_use_tree(item, prefix.clone(), out);
            }
        }
    }
}
