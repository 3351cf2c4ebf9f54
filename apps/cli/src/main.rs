//! `strata` command-line front end
//!
//! Usage:
//!   strata validate patient.json org.xml [--config validator.yaml]
//!   strata convert organization.json --to xml [--output organization.xml]
//!   strata describe DeviceMetric
//!   strata list

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value as JsonValue;
use strata_format::Format;
use strata_models::{DescriptorKind, FieldSpec, ParseOptions, SchemaRegistry};
use strata_validator::{ValidationOutcome, Validator, ValidatorConfig};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Parse, convert and validate FHIR R4 resources")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Additional descriptor files (JSON or YAML) loaded on top of the R4 core set
    #[arg(long, global = true, value_name = "DIR")]
    schema_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate resources and print an OperationOutcome
    Validate {
        /// Resource files (JSON or XML)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Validator configuration (YAML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Input format; detected from the content when omitted
        #[arg(long, value_enum)]
        format: Option<FormatArg>,
    },
    /// Convert a resource between JSON and XML
    Convert {
        file: PathBuf,
        /// Target format
        #[arg(long, value_enum)]
        to: FormatArg,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the fields of a resource, datatype or backbone structure
    Describe {
        /// Descriptor name, e.g. `Organization` or `DeviceMetric.calibration`
        name: String,
    },
    /// List registered resource types
    List,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum FormatArg {
    Json,
    Xml,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Json => Format::Json,
            FormatArg::Xml => Format::Xml,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "strata=debug" } else { "strata=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let registry = load_registry(cli.schema_dir.as_deref())?;

    match cli.command {
        Commands::Validate {
            files,
            config,
            format,
        } => validate(&registry, &files, config.as_deref(), format.map(Format::from)),
        Commands::Convert { file, to, output } => {
            convert(&registry, &file, to.into(), output.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Describe { name } => {
            describe(&registry, &name)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::List => {
            for resource_type in registry.resource_types() {
                println!("{resource_type}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_registry(schema_dir: Option<&Path>) -> Result<SchemaRegistry> {
    let mut builder = SchemaRegistry::builder()
        .with_r4_core()
        .context("failed to load the bundled R4 descriptors")?;
    if let Some(dir) = schema_dir {
        builder = builder
            .add_dir(dir)
            .with_context(|| format!("failed to load descriptors from {}", dir.display()))?;
    }
    let registry = builder.build().context("inconsistent descriptor set")?;
    debug!(descriptors = registry.len(), "Schema registry ready");
    Ok(registry)
}

fn read_input(path: &Path, format: Option<Format>) -> Result<(String, Format)> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let format = format
        .or_else(|| Format::detect(&text))
        .or_else(|| Format::from_path(path))
        .ok_or_else(|| anyhow!("cannot tell whether {} is JSON or XML", path.display()))?;
    Ok((text, format))
}

fn validate(
    registry: &SchemaRegistry,
    files: &[PathBuf],
    config: Option<&Path>,
    format: Option<Format>,
) -> Result<ExitCode> {
    let config = match config {
        Some(path) => {
            let yaml = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            ValidatorConfig::from_yaml(&yaml)
                .with_context(|| format!("invalid validator config {}", path.display()))?
        }
        None => ValidatorConfig::default(),
    };
    let validator = Validator::from_config(&config).context("invalid validator config")?;

    let mut failed = 0;
    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let outcome = validate_file(registry, &validator, path, format)?;
        info!(
            file = %path.display(),
            errors = outcome.error_count(),
            warnings = outcome.warning_count(),
            "Validated"
        );
        if outcome.has_errors() {
            failed += 1;
        }
        reports.push((path, outcome.to_operation_outcome()));
    }

    let output = match reports.len() {
        1 => reports.remove(0).1,
        _ => JsonValue::Array(
            reports
                .into_iter()
                .map(|(path, outcome)| {
                    serde_json::json!({ "file": path.display().to_string(), "outcome": outcome })
                })
                .collect(),
        ),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    if failed > 0 {
        info!(failed, total = files.len(), "Validation failed");
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn validate_file(
    registry: &SchemaRegistry,
    validator: &Validator,
    path: &Path,
    format: Option<Format>,
) -> Result<ValidationOutcome> {
    let (text, format) = read_input(path, format)?;
    // Missing required fields are reported as issues, not parse failures
    match format.parse(registry, &text, &ParseOptions::lenient()) {
        Ok(resource) => Ok(validator.validate(&resource)),
        Err(err) => {
            debug!(file = %path.display(), error = %err, "Parse failed");
            Ok(ValidationOutcome::fatal(None, err.to_string()))
        }
    }
}

fn convert(
    registry: &SchemaRegistry,
    path: &Path,
    to: Format,
    output: Option<&Path>,
) -> Result<()> {
    let (text, from) = read_input(path, None)?;
    let resource = from
        .parse(registry, &text, &ParseOptions::strict())
        .with_context(|| format!("failed to parse {} as {from}", path.display()))?;
    let rendered = to
        .render(&resource)
        .with_context(|| format!("failed to render {to}"))?;

    match output {
        Some(out) => {
            fs::write(out, rendered.as_bytes())
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(from = %from, to = %to, output = %out.display(), "Converted");
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn describe(registry: &SchemaRegistry, name: &str) -> Result<()> {
    let descriptor = registry
        .get(name)
        .ok_or_else(|| anyhow!("unknown type '{name}'"))?;

    let kind = match descriptor.kind() {
        DescriptorKind::Resource => "resource",
        DescriptorKind::ComplexType => "complex type",
        DescriptorKind::BackboneElement => "backbone element",
    };
    let abstract_marker = if descriptor.is_abstract() { ", abstract" } else { "" };
    println!("{} ({kind}{abstract_marker})", descriptor.name());
    if descriptor.lineage().len() > 1 {
        println!("  inherits: {}", descriptor.lineage()[1..].join(" > "));
    }
    if let Some(url) = descriptor.url() {
        println!("  url: {url}");
    }
    println!();

    let width = descriptor
        .fields()
        .iter()
        .map(|f| display_name(f).len())
        .max()
        .unwrap_or(0);
    for field in descriptor.fields() {
        let mut line = format!(
            "  {:<width$}  {:<6}  {}",
            display_name(field),
            field.cardinality.to_string(),
            field.field_type
        );
        if let Some(profiles) = &field.type_profiles {
            line.push_str(&format!("({})", profiles.join(" | ")));
        }
        if let Some(binding) = &field.binding {
            line.push_str(&format!("  [{} {}]", binding.strength, binding.value_set));
        }
        println!("{line}");
    }
    Ok(())
}

fn display_name(field: &FieldSpec) -> String {
    if field.is_choice() {
        format!("{}[x]", field.name)
    } else {
        field.name.clone()
    }
}
