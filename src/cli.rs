use crate::config::{BackendKind, CliOverrides, Config};
use crate::error::Result;
use crate::ui::OutputMode;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jarsources")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Decompile jar archives into sibling -sources jars")]
#[command(
    long_about = "jarsources walks every class in a jar, decompiles each top-level class with the \
                  selected backend and writes the results as <name>-sources.jar. Classes that \
                  cannot be decompiled are reported and skipped; the rest of the archive is kept."
)]
#[command(before_help = "☕ jarsources - Jar Decompiler")]
#[command(after_help = "EXAMPLES:\n  \
    jarsources guava-33.0.jar\n  \
    jarsources libs/ --destination sources/ --verbose\n  \
    jarsources app.jar --backend stream --command \"my-decompiler --stdin\"\n  \
    jarsources app.jar --backend tempfile --command \"procyon {path}\"\n  \
    jarsources libs/ --output-format json --quiet")]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Jar files, or directories searched recursively for them
    #[arg(required_unless_present = "generate_config")]
    pub sources: Vec<PathBuf>,

    /// Directory that receives the -sources archives
    #[arg(short, long, help = "Destination directory (defaults to the current directory)")]
    pub destination: Option<PathBuf>,

    /// Decompiler backend
    #[arg(short, long, value_enum)]
    pub backend: Option<BackendKind>,

    /// External decompiler command for the stream and tempfile backends
    #[arg(long, help = "External decompiler command; {path} is replaced by the class file")]
    pub command: Option<String>,

    /// Root for the tempfile backend's class copies
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long, help = "Path to TOML configuration file")]
    pub config: Option<PathBuf>,

    /// Number of archives processed at once (needs the `parallel` feature)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub output_format: OutputFormat,

    /// Verbose output level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Dry run (show what would be done without executing)
    #[arg(long, help = "List the archives and outputs without decompiling anything")]
    pub dry_run: bool,

    /// Generate sample configuration file
    #[arg(long, help = "Generate a sample configuration file")]
    pub generate_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON formatted output
    Json,
    /// Plain text output
    Plain,
}

impl From<OutputFormat> for OutputMode {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputMode::Human,
            OutputFormat::Json => OutputMode::Json,
            OutputFormat::Plain => OutputMode::Plain,
        }
    }
}

impl Cli {
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_defaults(self.config.as_ref())?;

        let overrides = self.create_cli_overrides();
        config.merge_with_cli_args(&overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn create_cli_overrides(&self) -> CliOverrides {
        CliOverrides::new()
            .with_destination(self.destination.clone())
            .with_backend(self.backend)
            .with_command(self.command.clone())
            .with_temp_dir(self.temp_dir.clone())
            .with_jobs(self.jobs)
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_format.into()
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose > 0 && !self.quiet
    }

    pub fn verbosity_level(&self) -> u8 {
        if self.quiet {
            0
        } else {
            self.verbose
        }
    }
}
