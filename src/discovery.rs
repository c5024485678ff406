//! Discovery and the shared registry.
//!
//! [`SourceRegistry`] owns every piece of analysis state behind one
//! reader/writer lock. Discovery, package loading and cache clearing take the
//! write lock; lookups and endpoint enhancement take the read lock and hand out
//! copies, so a reader never observes a half-built registry.

use crate::conventions::Conventions;
use crate::enhancer::{self, EndpointDescriptor, EnhanceOutcome};
use crate::error::{ParseErrorRecord, Result};
use crate::handler::{self, HandlerDescriptor};
use crate::manifest::{import_paths, ProjectManifest};
use crate::parser::{AstParser, ParsedFile};
use crate::scanner::{rust_files_in, FileScanner};
use crate::type_registry::{EnumDescriptor, TypeDescriptor, TypeRegistry};
use indexmap::IndexMap;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

/// Read-only view of a discovered code base, as used by documentation builders.
pub trait DocumentationSource: Send + Sync {
    /// Copies the analysis of the matching handler onto `endpoint`. A miss leaves
    /// the endpoint untouched.
    fn enhance_endpoint(&self, endpoint: &mut EndpointDescriptor) -> EnhanceOutcome;

    fn all_structs(&self) -> Vec<TypeDescriptor>;

    fn all_enums(&self) -> Vec<EnumDescriptor>;

    fn all_handlers(&self) -> Vec<HandlerDescriptor>;

    fn struct_by_name(&self, name: &str) -> Option<TypeDescriptor>;

    /// Looks a handler up by qualified name (`Owner::name`), then by bare name.
    fn handler_by_name(&self, name: &str) -> Option<HandlerDescriptor>;

    fn parse_errors(&self) -> Vec<ParseErrorRecord>;
}

/// Counts describing one discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub marked_files: usize,
    pub parsed_files: usize,
    /// Unmarked files parsed for their type declarations only
    pub imported_files: usize,
    pub structs: usize,
    pub handlers: usize,
    pub parse_errors: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    types: TypeRegistry,
    /// qualified name -> handler, in discovery order
    handlers: IndexMap<String, HandlerDescriptor>,
    /// bare name -> qualified name of the first handler with that name
    bare_names: HashMap<String, String>,
    parse_errors: Vec<ParseErrorRecord>,
    /// Files and import directories already loaded
    visited: HashSet<PathBuf>,
}

impl RegistryState {
    fn clear(&mut self) {
        self.types.clear();
        self.handlers.clear();
        self.bare_names.clear();
        self.parse_errors.clear();
        self.visited.clear();
    }

    fn handler(&self, name: &str) -> Option<&HandlerDescriptor> {
        self.handlers.get(name).or_else(|| {
            self.bare_names
                .get(name)
                .and_then(|qualified| self.handlers.get(qualified))
        })
    }

    fn insert_handler(&mut self, handler: HandlerDescriptor) {
        let qualified = handler.qualified_name();
        if let Some(existing) = self.handlers.get(&qualified) {
            warn!(
                "Handler {} in {} shadowed by the one in {}",
                qualified,
                handler.file.display(),
                existing.file.display()
            );
            return;
        }
        self.bare_names
            .entry(handler.name.clone())
            .or_insert_with(|| qualified.clone());
        self.handlers.insert(qualified, handler);
    }

    /// Marks `path` visited; false if it already was.
    fn visit(&mut self, path: &Path) -> bool {
        self.visited.insert(canonical(path))
    }

    /// Parses `files` and registers their type declarations, returning the parsed
    /// files and the number of structs added.
    fn register_types(&mut self, files: &[PathBuf]) -> (Vec<ParsedFile>, usize) {
        let (parsed, errors) = AstParser::parse_files(files);
        self.parse_errors.extend(errors);

        let mut structs = 0;
        for file in &parsed {
            structs += self.types.register_file(&file.syntax_tree, &file.path).structs;
        }
        (parsed, structs)
    }
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The registry of one analyzed code base.
pub struct SourceRegistry {
    conventions: Conventions,
    state: RwLock<RegistryState>,
    /// Qualified names of handlers matched by at least one endpoint
    enhanced: Mutex<HashSet<String>>,
}

impl SourceRegistry {
    pub fn new(conventions: Conventions) -> Self {
        Self {
            conventions,
            state: RwLock::new(RegistryState::default()),
            enhanced: Mutex::new(HashSet::new()),
        }
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// Rebuilds the registry from the marked files under `root`.
    ///
    /// Files that fail to parse are recorded and skipped. Same-project modules
    /// imported by marked files contribute their type declarations only.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` is not a readable directory.
    pub fn discover(&self, root: &Path) -> Result<DiscoveryReport> {
        let scanner = FileScanner::new(
            root.to_path_buf(),
            &self.conventions.marker,
            self.conventions.marker_scan_bytes,
        );
        let scan = scanner.scan()?;
        info!(
            "Found {} marked files out of {} Rust files",
            scan.marked_files.len(),
            scan.rust_files.len()
        );

        // manifests are read before the write lock is taken
        let manifest = match ProjectManifest::load(root) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("Imports will not be followed: {}", e);
                None
            }
        };

        let mut state = self.state.write();
        state.clear();
        self.enhanced.lock().clear();

        // Pass 1: declarations of the marked files
        let (parsed, _) = state.register_types(&scan.marked_files);
        for file in &parsed {
            state.visit(&file.path);
        }

        let imported_files = match &manifest {
            Some(manifest) => Self::load_imports(&mut state, &parsed, manifest),
            None => 0,
        };
        state.types.synthesize_all();

        // Pass 2: handlers, once the whole type universe is known
        let handlers: Vec<HandlerDescriptor> = parsed
            .iter()
            .flat_map(|file| handler::analyze_file(file, &state.types, &self.conventions))
            .collect();
        for handler in handlers {
            state.insert_handler(handler);
        }

        let report = DiscoveryReport {
            marked_files: scan.marked_files.len(),
            parsed_files: parsed.len(),
            imported_files,
            structs: state.types.struct_count(),
            handlers: state.handlers.len(),
            parse_errors: state.parse_errors.len(),
        };
        info!(
            "Discovery complete: {} structs, {} handlers, {} parse errors",
            report.structs, report.handlers, report.parse_errors
        );
        Ok(report)
    }

    /// Follows same-project imports of `parsed` transitively, registering the
    /// types of every imported module. Returns how many files were loaded.
    fn load_imports(
        state: &mut RegistryState,
        parsed: &[ParsedFile],
        manifest: &ProjectManifest,
    ) -> usize {
        let mut queue: VecDeque<(PathBuf, Vec<Vec<String>>)> = parsed
            .iter()
            .map(|file| (file.path.clone(), import_paths(&file.syntax_tree)))
            .collect();
        let mut loaded = 0;

        while let Some((from_file, imports)) = queue.pop_front() {
            for segments in imports {
                let Some(target) = manifest.resolve_import(&from_file, &segments) else {
                    continue;
                };
                let key = canonical(&target.key);
                if !state.visited.insert(key.clone()) {
                    continue;
                }

                // a single-file module is keyed by the file itself
                let files: Vec<PathBuf> = target
                    .files
                    .into_iter()
                    .filter(|file| canonical(file) == key || state.visit(file))
                    .collect();
                if files.is_empty() {
                    continue;
                }
                debug!(
                    "Loading types of {} ({} files) imported by {}",
                    target.key.display(),
                    files.len(),
                    from_file.display()
                );

                let (imported, _) = state.register_types(&files);
                loaded += imported.len();
                queue.extend(
                    imported
                        .iter()
                        .map(|file| (file.path.clone(), import_paths(&file.syntax_tree))),
                );
            }
        }
        loaded
    }

    /// Registers the type declarations of one more directory (not recursive) and
    /// re-synthesizes every schema when it added structs. Returns the number of
    /// structs added; an already loaded directory adds none.
    pub fn load_package_types(&self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(crate::error::Error::InvalidArgument(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut state = self.state.write();
        if !state.visit(dir) {
            debug!("Package {} already loaded", dir.display());
            return Ok(0);
        }

        let files: Vec<PathBuf> = rust_files_in(dir)
            .into_iter()
            .filter(|file| state.visit(file))
            .collect();
        let (_, added) = state.register_types(&files);
        if added > 0 {
            info!("Loaded {} structs from {}", added, dir.display());
            state.types.resynthesize();
        }
        Ok(added)
    }

    /// Drops all registry state; the next [`SourceRegistry::discover`] rebuilds it
    /// from scratch.
    pub fn clear_cache(&self) {
        let mut state = self.state.write();
        state.clear();
        self.enhanced.lock().clear();
        debug!("Registry cleared");
    }

    /// Whether the handler has been matched by an endpoint since the last
    /// discovery.
    pub fn is_enhanced(&self, qualified_name: &str) -> bool {
        self.enhanced.lock().contains(qualified_name)
    }

    /// Handlers no endpoint has matched yet, by qualified name.
    pub fn unmatched_handlers(&self) -> Vec<String> {
        let state = self.state.read();
        let enhanced = self.enhanced.lock();
        state
            .handlers
            .keys()
            .filter(|name| !enhanced.contains(*name))
            .cloned()
            .collect()
    }
}

impl DocumentationSource for SourceRegistry {
    fn enhance_endpoint(&self, endpoint: &mut EndpointDescriptor) -> EnhanceOutcome {
        let state = self.state.read();
        let outcome = enhancer::enhance(endpoint, &self.conventions, |name| state.handler(name));
        if let Some(handler) = outcome.handler() {
            self.enhanced.lock().insert(handler.to_string());
        }
        outcome
    }

    fn all_structs(&self) -> Vec<TypeDescriptor> {
        self.state.read().types.structs().cloned().collect()
    }

    fn all_enums(&self) -> Vec<EnumDescriptor> {
        self.state.read().types.enums().cloned().collect()
    }

    fn all_handlers(&self) -> Vec<HandlerDescriptor> {
        self.state.read().handlers.values().cloned().collect()
    }

    fn struct_by_name(&self, name: &str) -> Option<TypeDescriptor> {
        self.state.read().types.get_struct(name).cloned()
    }

    fn handler_by_name(&self, name: &str) -> Option<HandlerDescriptor> {
        self.state.read().handler(name).cloned()
    }

    fn parse_errors(&self) -> Vec<ParseErrorRecord> {
        self.state.read().parse_errors.clone()
    }
}
