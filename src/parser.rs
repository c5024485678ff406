use crate::error::ParseErrorRecord;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// AST (Abstract Syntax Tree) parser for Rust source files.
///
/// The `AstParser` uses the `syn` crate to parse Rust source code into an abstract syntax tree.
/// Failures are returned as [`ParseErrorRecord`]s so discovery can record them and move on.
pub struct AstParser;

/// A successfully parsed Rust file with its abstract syntax tree.
#[derive(Debug)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// The parsed abstract syntax tree
    pub syntax_tree: syn::File,
}

impl AstParser {
    /// Parses a single Rust source file into an AST.
    ///
    /// # Errors
    ///
    /// Returns a record of kind `Io` if the file cannot be read and of kind `Syntax`
    /// (with the position of the offending token) if it is not valid Rust.
    pub fn parse_file(path: &Path) -> Result<ParsedFile, ParseErrorRecord> {
        debug!("Parsing file: {}", path.display());

        let content =
            fs::read_to_string(path).map_err(|e| ParseErrorRecord::io(path.to_path_buf(), &e))?;

        Self::parse_source(path, &content)
    }

    /// Parses source text that is already in memory.
    pub fn parse_source(path: &Path, content: &str) -> Result<ParsedFile, ParseErrorRecord> {
        let syntax_tree = syn::parse_file(content)
            .map_err(|e| ParseErrorRecord::syntax(path.to_path_buf(), &e))?;

        Ok(ParsedFile {
            path: path.to_path_buf(),
            syntax_tree,
        })
    }

    /// Parses multiple Rust source files, continuing even if some fail.
    ///
    /// Returns the successfully parsed files and the records of the failed ones,
    /// in input order.
    pub fn parse_files(paths: &[PathBuf]) -> (Vec<ParsedFile>, Vec<ParseErrorRecord>) {
        debug!("Parsing {} files", paths.len());

        let mut parsed = Vec::new();
        let mut errors = Vec::new();
        for path in paths {
            match Self::parse_file(path) {
                Ok(file) => parsed.push(file),
                Err(record) => {
                    warn!("Skipping {}", record);
                    errors.push(record);
                }
            }
        }

        debug!(
            "Parsing complete: {} succeeded, {} failed",
            parsed.len(),
            errors.len()
        );

        (parsed, errors)
    }
}

/// Trimmed text of the `///` doc comments in `attrs`, one entry per line.
pub fn doc_lines(attrs: &[syn::Attribute]) -> Vec<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .filter_map(|attr| match &attr.meta {
            syn::Meta::NameValue(nv) => match &nv.value {
                syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                }) => Some(s.value().trim().to_string()),
                _ => None,
            },
            _ => None,
        })
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_doc_lines() {
        let item: syn::ItemFn = syn::parse_str(
            "/// Lists users.\n///\n/// @tag admin\n#[inline]\nfn list() {}",
        )
        .unwrap();
        assert_eq!(doc_lines(&item.attrs), vec!["Lists users.", "@tag admin"]);
    }

    /// Helper function to create a temporary file with content
    fn create_temp_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let file_path = dir.path().join(name);
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file_path
    }

    #[test]
    fn test_parse_valid_rust_file() {
        let temp_dir = TempDir::new().unwrap();
        let valid_code = r#"
            // @openapi
            #[derive(Serialize)]
            pub struct Order {
                pub id: u64,
                pub total: f64,
            }

            pub async fn get_order(Path(id): Path<u64>) -> Json<Order> {
                Json(load_order(id))
            }
        "#;

        let file_path = create_temp_file(&temp_dir, "orders.rs", valid_code);
        let parsed = AstParser::parse_file(&file_path).unwrap();

        assert_eq!(parsed.path, file_path);
        assert_eq!(parsed.syntax_tree.items.len(), 2);
    }

    #[test]
    fn test_parse_invalid_rust_file() {
        let temp_dir = TempDir::new().unwrap();
        let invalid_code = "pub struct User {\n    pub id: u32\n    pub name: String\n}\n";

        let file_path = create_temp_file(&temp_dir, "invalid.rs", invalid_code);
        let record = AstParser::parse_file(&file_path).unwrap_err();

        assert_eq!(record.kind, ParseErrorKind::Syntax);
        assert_eq!(record.file, file_path);
        assert_eq!(record.position.map(|p| p.line), Some(3));
    }

    #[test]
    fn test_parse_nonexistent_file() {
        let record = AstParser::parse_file(Path::new("/nonexistent/file.rs")).unwrap_err();

        assert_eq!(record.kind, ParseErrorKind::Io);
        assert!(record.position.is_none());
    }

    #[test]
    fn test_parse_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = create_temp_file(&temp_dir, "empty.rs", "");

        let parsed = AstParser::parse_file(&file_path).unwrap();
        assert!(parsed.syntax_tree.items.is_empty());
    }

    #[test]
    fn test_parse_files_batch_keeps_going() {
        let temp_dir = TempDir::new().unwrap();

        let file1 = create_temp_file(&temp_dir, "file1.rs", "pub fn hello() {}");
        let file2 = create_temp_file(&temp_dir, "file2.rs", "pub fn broken( {");
        let file3 = create_temp_file(&temp_dir, "file3.rs", "pub struct World;");

        let (parsed, errors) = AstParser::parse_files(&[file1.clone(), file2.clone(), file3.clone()]);

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].path, file1);
        assert_eq!(parsed[1].path, file3);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].file, file2);
    }

    #[test]
    fn test_parse_files_empty_list() {
        let (parsed, errors) = AstParser::parse_files(&[]);

        assert!(parsed.is_empty());
        assert!(errors.is_empty());
    }
}
