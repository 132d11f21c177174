use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use log::{LevelFilter, debug, info};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[cfg(feature = "server")]
use archdraw::serve::{ServeArgs, run_serve};
use archdraw::templates::builtin_templates;
use archdraw::{
    CanvasDocument, CanvasEditor, Catalog, EditorConfig, EntityStore, LoadReport, MemoryStore,
    NodeCatalog, RoutingEngine, codec, svg,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

/// Validate a canvas document and optionally write a sanitized copy.
#[derive(Debug, Parser)]
#[command(name = "archdraw check")]
pub struct CheckArgs {
    /// Path to the canvas document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Write the reconciled document here. Use '-' for stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// JSON node catalog replacing the built-in one.
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,

    /// Fail when the document needed any repair.
    #[arg(long = "strict", action = ArgAction::SetTrue)]
    strict: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

/// Render a canvas document to SVG.
#[derive(Debug, Parser)]
#[command(
    name = "archdraw",
    about = "Render archdraw canvas documents to SVG."
)]
pub struct RenderArgs {
    /// Path to the canvas document. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// JSON node catalog replacing the built-in one.
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,

    /// Background color for the rendered canvas.
    #[arg(short = 'b', long = "background-color", default_value = "white")]
    background_color: String,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

/// Write one of the built-in templates as a canvas document.
#[derive(Debug, Parser)]
#[command(name = "archdraw template")]
pub struct TemplateArgs {
    /// Template name (see --list).
    #[arg(required_unless_present = "list")]
    name: Option<String>,

    /// List the built-in templates and exit.
    #[arg(long = "list", action = ArgAction::SetTrue)]
    list: bool,

    /// Output path. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long = "log-level", default_value = "warn")]
    log_level: String,
}

pub fn init_logging(level: &str) {
    let level = LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {level}. Using 'warn' instead.");
        LevelFilter::Warn
    });
    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(level)
        .try_init();
}

fn subcommand_args(args: &[String]) -> impl Iterator<Item = String> + '_ {
    std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned())
}

/// Runs every command that does not need the async runtime.
fn dispatch_offline(args: &[String]) -> Option<Result<()>> {
    let result = match args.get(1).map(|s| s.as_str()) {
        Some("check") => run_check(CheckArgs::parse_from(subcommand_args(args))),
        Some("render") => run_render(RenderArgs::parse_from(subcommand_args(args))),
        Some("template") => run_template(TemplateArgs::parse_from(subcommand_args(args))),
        Some("serve") => return None,
        _ => run_render(RenderArgs::parse_from(args.iter().cloned())),
    };
    Some(result)
}

#[cfg(feature = "server")]
pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match dispatch_offline(&args) {
        Some(result) => result,
        None => {
            let serve_args = ServeArgs::parse_from(subcommand_args(&args));
            init_logging(&serve_args.log_level);
            run_serve(serve_args).await
        }
    }
}

#[cfg(not(feature = "server"))]
pub fn dispatch_sync() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match dispatch_offline(&args) {
        Some(result) => result,
        None => Err(anyhow!(
            "'serve' command requires the 'server' feature to be enabled"
        )),
    }
}

fn run_check(cli: CheckArgs) -> Result<()> {
    init_logging(&cli.log_level);
    let input_source = parse_input(cli.input.as_deref())?;
    let catalog = load_catalog(cli.catalog.as_deref())?;
    let contents = load_document(&input_source)?;

    let (store, report, theme) = reconcile(&contents, &catalog)?;

    if !cli.quiet {
        eprintln!(
            "{} item(s), {} connection(s), {} dropped, {} warning(s)",
            store.node_count(),
            store.edge_count(),
            report.edges_dropped,
            report.warnings.len()
        );
        for warning in &report.warnings {
            eprintln!("  warning: {warning}");
        }
    }

    if let Some(output) = cli.output.as_deref() {
        let json = codec::encode(&store, &theme)
            .to_json()
            .context("failed to encode canvas document")?;
        write_output(parse_output(output)?, json.as_bytes(), cli.quiet)?;
    }

    if cli.strict && !report.warnings.is_empty() {
        bail!(
            "document needed {} repair(s); rerun without --strict to accept them",
            report.warnings.len()
        );
    }
    Ok(())
}

fn run_render(cli: RenderArgs) -> Result<()> {
    init_logging(&cli.log_level);
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = match cli.output.as_deref() {
        Some(output) => parse_output(output)?,
        None => default_svg_output(&input_source),
    };
    let catalog = load_catalog(cli.catalog.as_deref())?;
    let contents = load_document(&input_source)?;

    let (store, report, _) = reconcile(&contents, &catalog)?;
    for warning in &report.warnings {
        debug!(warning = warning.as_str(); "Document repaired while rendering");
    }

    let routes = RoutingEngine::default().route_all(&store);
    let rendered = svg::render_svg(&store, &routes, &catalog, &cli.background_color);
    write_output(output_dest, rendered.as_bytes(), cli.quiet)
}

fn run_template(cli: TemplateArgs) -> Result<()> {
    init_logging(&cli.log_level);
    if cli.list {
        let mut stdout = io::stdout();
        for template in builtin_templates() {
            writeln!(stdout, "{:<12} {}", template.name, template.description)?;
        }
        return Ok(());
    }

    let name = cli
        .name
        .as_deref()
        .ok_or_else(|| anyhow!("a template name is required"))?;
    let mut editor = CanvasEditor::new(EditorConfig::builtin(), Catalog::builtin(), MemoryStore::new());
    let report = editor
        .load_template(name)
        .with_context(|| format!("failed to load template '{name}'"))?;
    info!(
        template = name,
        items = report.nodes_created,
        connections = report.edges_created;
        "Template loaded"
    );

    let json = editor
        .export_json()
        .context("failed to encode canvas document")?;
    let dest = match cli.output.as_deref() {
        Some(output) => parse_output(output)?,
        None => OutputDestination::Stdout,
    };
    write_output(dest, json.as_bytes(), cli.quiet)
}

/// Decodes `contents` into a fresh store. The theme is returned for re-encoding.
fn reconcile(contents: &str, catalog: &Catalog) -> Result<(EntityStore, LoadReport, String)> {
    let (document, warnings): (CanvasDocument, Vec<String>) =
        codec::decode(contents).context("failed to parse canvas document")?;
    let mut store = EntityStore::new();
    let mut report = codec::apply(&mut store, &document, catalog as &dyn NodeCatalog);
    report.warnings = warnings
        .into_iter()
        .chain(std::mem::take(&mut report.warnings))
        .collect();
    Ok((store, report, document.theme))
}

fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        None => Ok(Catalog::builtin()),
        Some(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog '{}'", path.display()))?;
            Catalog::from_json(&contents)
                .with_context(|| format!("invalid catalog '{}'", path.display()))
        }
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: &str) -> Result<OutputDestination> {
    if output == "-" {
        return Ok(OutputDestination::Stdout);
    }
    let path = PathBuf::from(output);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(anyhow!(
                "output directory '{}' does not exist",
                parent.display()
            ));
        }
    }
    Ok(OutputDestination::File(path))
}

fn default_svg_output(input: &InputSource) -> OutputDestination {
    match input {
        InputSource::File(path) => {
            let default_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| format!("{name}.svg"))
                .unwrap_or_else(|| "out.svg".to_string());
            let mut default_path = path.to_path_buf();
            default_path.set_file_name(default_name);
            OutputDestination::File(default_path)
        }
        InputSource::Stdin => OutputDestination::Stdout,
    }
}

fn load_document(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no canvas document supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                eprintln!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}
