use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;
use vcd_provider::import::DEFAULT_IMPORT_SEPARATOR;
use vcd_provider::resource::{data_source_names, get_resource, resource_names};
use vcd_provider::{Provider, VERSION};

/// Declarative-deployment provider for VMware Cloud Director
#[derive(Parser, Debug)]
#[command(name = "vcd-provider", version = VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the provider descriptor as JSON
    Schema,
    /// List resource and data source kinds
    Resources,
    /// Split an import identifier into its positional segments
    ParseImport {
        kind: String,
        id: String,
        /// Segment separator (default: VCD_IMPORT_SEPARATOR, then ".")
        #[arg(long)]
        separator: Option<String>,
    },
    /// Import one entity and print its state
    Read { kind: String, id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }

    fn directive(self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .map_err(|e| anyhow!("Failed to open log file {:?}: {}", log_path, e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // VCD_PROVIDER_LOG takes per-target directives, e.g. "vcd_provider::vcd=trace"
    let filter = EnvFilter::try_from_env("VCD_PROVIDER_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("vcd_provider={}", level.directive())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("vcd-provider {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(path) = std::env::var_os("VCD_LOG_FILE") {
        return PathBuf::from(path);
    }
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("vcd-provider").join("vcd-provider.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".vcd-provider").join("vcd-provider.log");
    }
    PathBuf::from("vcd-provider.log")
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    match args.command {
        Command::Schema => print_json(&Provider::schema())?,
        Command::Resources => {
            println!("Resources:");
            for name in resource_names() {
                println!("  {}", name);
            }
            println!("Data sources:");
            for name in data_source_names() {
                println!("  {}", name);
            }
        }
        Command::ParseImport { kind, id, separator } => {
            let descriptor = get_resource(&kind)
                .ok_or_else(|| anyhow!("unknown resource kind {:?}", kind))?;
            let separator = separator
                .or_else(|| std::env::var("VCD_IMPORT_SEPARATOR").ok())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_IMPORT_SEPARATOR.to_string());
            let path = descriptor.parse_import(&id, &separator)?;
            print_json(&serde_json::json!({
                "org": path.org,
                "vdc": path.vdc,
                "edge_gateway": path.edge_gateway,
                "entity": path.entity,
            }))?;
        }
        Command::Read { kind, id } => {
            let provider = Provider::configure(&serde_json::Value::Null)?;
            let applied = provider.import(&kind, &id).await?;
            for warning in &applied.warnings {
                eprintln!("Warning: {}", warning);
            }
            print_json(&applied.state)?;
        }
    }

    Ok(())
}
