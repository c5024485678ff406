use crate::error::{Error, Result};
use log::{debug, warn};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File scanner for traversing project directories.
///
/// The `FileScanner` recursively walks a project directory to find Rust source files,
/// and separates the files that opted into analysis with the marker comment from the
/// rest. Common directories that should be ignored, such as `target` and hidden
/// directories (those starting with `.`), are skipped.
///
/// # Example
///
/// ```no_run
/// use openapi_from_source::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./my-project"), "@openapi", 512);
/// let result = scanner.scan().unwrap();
/// println!("Found {} marked files", result.marked_files.len());
/// ```
pub struct FileScanner {
    root_path: PathBuf,
    marker: String,
    scan_bytes: usize,
}

/// Result of directory scanning operation.
pub struct ScanResult {
    /// Every discovered `.rs` file
    pub rust_files: Vec<PathBuf>,
    /// The subset of `rust_files` carrying the opt-in marker
    pub marked_files: Vec<PathBuf>,
    /// Warning messages for any issues encountered (e.g., inaccessible directories)
    pub warnings: Vec<String>,
}

impl FileScanner {
    /// Creates a new `FileScanner` for the specified root directory.
    ///
    /// # Arguments
    ///
    /// * `root_path` - The root directory to scan for Rust files
    /// * `marker` - The opt-in marker text
    /// * `scan_bytes` - How many leading bytes of each file are searched for the marker
    pub fn new(root_path: PathBuf, marker: &str, scan_bytes: usize) -> Self {
        Self {
            root_path,
            marker: marker.to_string(),
            scan_bytes,
        }
    }

    /// Scans the directory tree and collects all `.rs` files.
    ///
    /// If any directories or files cannot be accessed, warnings are logged and added to
    /// the result, but scanning continues.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be accessed.
    pub fn scan(&self) -> Result<ScanResult> {
        if !self.root_path.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "Not a directory: {}",
                self.root_path.display()
            )));
        }

        let mut rust_files = Vec::new();
        let mut marked_files = Vec::new();
        let mut warnings = Vec::new();

        for entry in WalkDir::new(&self.root_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                // Don't filter the root directory itself
                if e.path() == self.root_path {
                    return true;
                }

                let file_name = e.file_name().to_string_lossy();
                let is_hidden = file_name.starts_with('.');
                let is_target = file_name == "target";

                !is_hidden && !is_target
            })
        {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if !is_rust_file(path) {
                        continue;
                    }

                    match has_marker(path, &self.marker, self.scan_bytes) {
                        Ok(true) => {
                            debug!("Marked file: {}", path.display());
                            marked_files.push(path.to_path_buf());
                        }
                        Ok(false) => {}
                        Err(e) => {
                            let warning = format!("Failed to read {}: {}", path.display(), e);
                            warn!("{}", warning);
                            warnings.push(warning);
                        }
                    }
                    rust_files.push(path.to_path_buf());
                }
                Err(e) => {
                    let warning = format!("Failed to access path: {}", e);
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
        }

        Ok(ScanResult {
            rust_files,
            marked_files,
            warnings,
        })
    }
}

fn is_rust_file(path: &Path) -> bool {
    path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("rs")
}

/// Checks only the first `scan_bytes` of the file, never the whole content.
pub fn has_marker(path: &Path, marker: &str, scan_bytes: usize) -> std::io::Result<bool> {
    let mut buf = Vec::with_capacity(scan_bytes);
    File::open(path)?
        .take(scan_bytes as u64)
        .read_to_end(&mut buf)?;

    let head = String::from_utf8_lossy(&buf);
    Ok(head.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("//") && line.contains(marker)
    }))
}

/// Lists the `.rs` files directly inside `dir` (no recursion), sorted by name.
pub fn rust_files_in(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| is_rust_file(p))
        .collect();
    files.sort();
    files
}
