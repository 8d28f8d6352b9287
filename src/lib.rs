pub mod archive;
pub mod cli;
pub mod config;
pub mod decompiler;
pub mod discovery;
pub mod error;
pub mod pipeline;
pub mod report;
pub mod ui;

// Public API re-exports
pub use cli::{Cli, OutputFormat};
pub use config::{BackendKind, BatchConfig, CliOverrides, Config, DecompilerConfig, OutputConfig};
pub use error::{DecompileError, JarSourcesError, Result, UserFriendlyError};

// Core functionality re-exports
pub use archive::{open_archive, ArchiveWriter, VirtualNode};
pub use decompiler::{build_decompiler, Decompiler};
pub use discovery::ArchiveDiscovery;
pub use pipeline::{ArchiveJobResult, ArchiveOutcome, ArchiveTraverser, BatchProgress, PipelineCoordinator};
pub use report::BatchReport;
pub use ui::{GracefulShutdown, OutputFormatter, OutputMode, ProgressManager};

use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;

/// Main library interface: discovery, batch decompilation and reporting.
pub struct JarSources {
    config: Config,
    output_formatter: OutputFormatter,
    progress_manager: ProgressManager,
    shutdown: GracefulShutdown,
}

impl JarSources {
    /// Create a new instance; installs the Ctrl+C handler.
    pub fn new(config: Config, output_mode: OutputMode, verbose: u8, quiet: bool) -> Result<Self> {
        let shutdown = GracefulShutdown::new()?;
        Ok(Self::with_shutdown(config, output_mode, verbose, quiet, shutdown))
    }

    /// Create an instance around an existing cancellation flag (no signal handler is installed).
    pub fn with_shutdown(
        config: Config,
        output_mode: OutputMode,
        verbose: u8,
        quiet: bool,
        shutdown: GracefulShutdown,
    ) -> Self {
        let output_formatter = OutputFormatter::new(output_mode, verbose, quiet);
        let progress_manager = ProgressManager::new(!quiet && output_mode == OutputMode::Human);

        Self {
            config,
            output_formatter,
            progress_manager,
            shutdown,
        }
    }

    pub fn from_cli(cli_args: &Cli) -> Result<Self> {
        let config = cli_args.load_config()?;
        Self::new(
            config,
            cli_args.output_mode(),
            cli_args.verbose,
            cli_args.quiet,
        )
    }

    /// Expand inputs into the archives that would be processed.
    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        ArchiveDiscovery::new(&self.config).discover(inputs)
    }

    /// Source archive and planned output path for each discovered archive.
    pub fn plan(&self, inputs: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>> {
        let destination = &self.config.output.destination;
        self.discover(inputs)?
            .into_iter()
            .map(|source| {
                let name = pipeline::output_archive_name(&source, &self.config.output.suffix)?;
                Ok((source, destination.join(name)))
            })
            .collect()
    }

    /// Decompile every archive found under `inputs` into the configured destination.
    pub async fn decompile_archives(&self, inputs: &[PathBuf]) -> Result<BatchReport> {
        let start_time = Instant::now();
        self.shutdown.check_shutdown()?;

        self.output_formatter
            .start_operation("Looking for archives to decompile");
        let sources = self.discover(inputs)?;
        self.output_formatter
            .info(&format!("Found {} archive(s)", sources.len()));
        self.output_formatter.debug(&format!(
            "Backend: {}, destination: {}",
            self.config.decompiler.backend,
            self.config.output.destination.display()
        ));

        self.output_formatter.start_operation("Decompiling archives");
        let batch_progress = self.progress_manager.create_batch_progress(sources.len());
        let progress_callback = {
            let pb = batch_progress.clone();
            move |progress: &BatchProgress| {
                ui::progress::update_batch_progress(&pb, progress);
            }
        };

        let coordinator = PipelineCoordinator::new(self.config.clone())
            .with_shutdown(self.shutdown.clone())
            .with_progress(progress_callback);
        let destination = self.config.output.destination.clone();

        let outcomes = {
            let destination = destination.clone();
            task::spawn_blocking(move || coordinator.run_batch(&sources, &destination))
                .await
                .map_err(|e| JarSourcesError::Backend {
                    message: format!("Decompilation task failed: {}", e),
                })?
        };

        let report = BatchReport::from_outcomes(
            outcomes,
            &destination,
            self.config.decompiler.backend,
            start_time.elapsed(),
        );

        if report.summary.archives_cancelled > 0 {
            batch_progress.abandon_with_message("Cancelled");
        } else {
            ui::progress::finish_progress_with_summary(
                &batch_progress,
                &format!(
                    "Processed {} archive(s)",
                    report.summary.archives_succeeded + report.summary.archives_failed
                ),
                start_time.elapsed(),
            );
        }
        self.progress_manager.clear();

        Ok(report)
    }

    pub fn generate_sample_config<P: AsRef<Path>>(output_path: P) -> Result<()> {
        let sample_config = Config::create_sample_config();
        std::fs::write(output_path.as_ref(), sample_config)?;
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn output_formatter(&self) -> &OutputFormatter {
        &self.output_formatter
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.is_running()
    }

    pub fn request_shutdown(&self) {
        self.shutdown.request_shutdown();
    }

    pub fn handle_error(&self, error: &JarSourcesError) {
        self.output_formatter.print_user_friendly_error(error);
    }
}

pub fn version_info() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
