use crate::conventions::Conventions;
use crate::discovery::{DocumentationSource, SourceRegistry};
use crate::enhancer::{EndpointDescriptor, EnhanceOutcome};
use crate::openapi_builder::OpenApiBuilder;
use crate::parser::AstParser;
use crate::routes::{detect_frameworks, extractor_for, load_routes_file};
use crate::scanner::FileScanner;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Generate OpenAPI documentation from the handler code of a Rust web service
#[derive(Parser, Debug)]
#[command(name = "openapi-from-source")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Rust project directory
    #[arg(value_name = "PROJECT_PATH")]
    pub project_path: PathBuf,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Web framework whose router code lists the routes (if not specified, auto-detect)
    #[arg(short = 'w', long = "framework", value_enum)]
    pub framework: Option<Framework>,

    /// YAML file listing `{method, path, handler}` routes, instead of reading router code
    #[arg(short = 'r', long = "routes", value_name = "FILE")]
    pub routes_path: Option<PathBuf>,

    /// YAML file overriding the naming conventions the analyzer keys on
    #[arg(short = 'c', long = "conventions", value_name = "FILE")]
    pub conventions_path: Option<PathBuf>,

    /// Title of the generated document
    #[arg(long = "title", default_value = "Generated API")]
    pub title: String,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Supported web frameworks
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Hash)]
pub enum Framework {
    /// Axum framework
    Axum,
    /// Actix-Web framework
    #[value(name = "actix-web")]
    ActixWeb,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.project_path.is_dir() {
        anyhow::bail!(
            "Project path is not a directory: {}",
            args.project_path.display()
        );
    }
    for file in [&args.routes_path, &args.conventions_path].into_iter().flatten() {
        if !file.is_file() {
            anyhow::bail!("File does not exist: {}", file.display());
        }
    }

    info!("Project path: {}", args.project_path.display());
    info!("Output format: {:?}", args.output_format);
    match &args.output_path {
        Some(output) => info!("Output file: {}", output.display()),
        None => info!("Output: stdout"),
    }

    Ok(args)
}

/// Tally of enhancement outcomes for the run summary.
#[derive(Debug, Default)]
struct EnhanceTally {
    matched: usize,
    without_schema: usize,
    unmatched: Vec<String>,
}

impl EnhanceTally {
    fn record(&mut self, endpoint: &EndpointDescriptor, outcome: &EnhanceOutcome) {
        match outcome {
            EnhanceOutcome::Matched { .. } => self.matched += 1,
            EnhanceOutcome::MatchedWithoutSchema { handler } => {
                debug!("Handler {} has no known request or response shape", handler);
                self.without_schema += 1;
            }
            EnhanceOutcome::Unmatched => self.unmatched.push(format!(
                "{} {} ({})",
                endpoint.method.as_str().to_uppercase(),
                endpoint.path,
                endpoint.handler_identifier
            )),
        }
    }
}

/// Reads the route table: from the routes file if given, else from the router
/// code of the selected or detected frameworks.
fn collect_endpoints(args: &CliArgs, conventions: &Conventions) -> Result<Vec<EndpointDescriptor>> {
    if let Some(routes_path) = &args.routes_path {
        info!("Reading routes from {}", routes_path.display());
        return load_routes_file(routes_path)
            .with_context(|| format!("Failed to load routes file {}", routes_path.display()));
    }

    // router code rarely carries the marker, so every file is a candidate
    let scanner = FileScanner::new(
        args.project_path.clone(),
        &conventions.marker,
        conventions.marker_scan_bytes,
    );
    let scan_result = scanner.scan()?;
    let (parsed_files, _) = AstParser::parse_files(&scan_result.rust_files);

    let frameworks = match args.framework {
        Some(framework) => vec![framework],
        None => detect_frameworks(&parsed_files),
    };
    if frameworks.is_empty() {
        anyhow::bail!(
            "No supported web framework detected. Use --framework or --routes.\n\
             Supported frameworks: axum, actix-web"
        );
    }
    info!("Frameworks: {:?}", frameworks);

    let mut endpoints = Vec::new();
    for framework in frameworks {
        let routes = extractor_for(framework).extract_routes(&parsed_files);
        debug!("Extracted {} routes for {:?}", routes.len(), framework);
        endpoints.extend(routes);
    }
    Ok(endpoints)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting OpenAPI document generation...");

    let conventions = match &args.conventions_path {
        Some(path) => Conventions::from_yaml_file(path)
            .with_context(|| format!("Failed to load conventions from {}", path.display()))?,
        None => Conventions::default(),
    };

    // Step 1: discover types and handlers of the marked files
    let registry = SourceRegistry::new(conventions.clone());
    let report = registry
        .discover(&args.project_path)
        .context("Discovery failed")?;
    for record in registry.parse_errors() {
        warn!("Skipped {}", record);
    }
    if report.marked_files == 0 {
        warn!(
            "No file carries the {} marker; schemas will be missing",
            conventions.marker
        );
    }

    // Step 2: the route table
    let mut endpoints = collect_endpoints(&args, &conventions)?;
    if endpoints.is_empty() {
        warn!("No routes found in the project");
    }

    // Step 3: enhance every endpoint and assemble the document
    let mut tally = EnhanceTally::default();
    let mut builder = OpenApiBuilder::new().with_info(
        args.title.clone(),
        "1.0.0".to_string(),
        Some("API documentation generated from Rust code".to_string()),
    );
    for endpoint in &mut endpoints {
        let outcome = registry.enhance_endpoint(endpoint);
        tally.record(endpoint, &outcome);
        builder.add_endpoint(endpoint);
    }
    builder.add_components(&registry);
    let document = builder.build();

    // Step 4: serialize and write
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&document)?,
        OutputFormat::Json => serialize_json(&document)?,
    };
    match &args.output_path {
        Some(output_path) => {
            write_to_file(&content, output_path)?;
            info!("Wrote OpenAPI document to {}", output_path.display());
        }
        None => println!("{}", content),
    }

    info!("Summary:");
    info!("  - Marked files: {}", report.marked_files);
    info!("  - Imported files: {}", report.imported_files);
    info!("  - Structs: {}", report.structs);
    info!("  - Handlers: {}", report.handlers);
    info!("  - Routes: {}", endpoints.len());
    info!(
        "  - Matched: {} ({} without schema)",
        tally.matched + tally.without_schema,
        tally.without_schema
    );
    for route in &tally.unmatched {
        warn!("Unmatched route: {}", route);
    }
    for handler in registry.unmatched_handlers() {
        debug!("Handler without route: {}", handler);
    }
    if report.parse_errors > 0 {
        warn!("{} files could not be parsed", report.parse_errors);
    }

    Ok(())
}
