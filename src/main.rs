use clap::Parser;
use jarsources::{Cli, JarSources, JarSourcesError, OutputFormatter, UserFriendlyError};
use std::process;
use tracing_subscriber::EnvFilter;

const EXIT_STARTUP_ERROR: i32 = 1;

#[tokio::main]
async fn main() {
    let exit_code = run().await;
    process::exit(exit_code);
}

async fn run() -> i32 {
    let cli = Cli::parse();

    setup_logging(&cli);

    if cli.generate_config {
        return handle_generate_config(&cli);
    }

    let jarsources = match JarSources::from_cli(&cli) {
        Ok(jarsources) => jarsources,
        Err(e) => {
            print_startup_error(&cli, &e);
            return EXIT_STARTUP_ERROR;
        }
    };

    if cli.dry_run {
        return handle_dry_run(&cli, &jarsources);
    }

    match jarsources.decompile_archives(&cli.sources).await {
        Ok(report) => {
            jarsources.output_formatter().print_batch_report(&report);
            report.exit_code()
        }
        Err(e) => {
            jarsources.handle_error(&e);
            match e {
                JarSourcesError::Cancelled => jarsources::report::EXIT_CANCELLED,
                _ => EXIT_STARTUP_ERROR,
            }
        }
    }
}

/// Logs go to stderr, and only when asked for with -v or RUST_LOG.
fn setup_logging(cli: &Cli) {
    if !cli.is_verbose() && std::env::var("RUST_LOG").is_err() {
        return;
    }

    let directive = match cli.verbosity_level() {
        0 => "jarsources=warn",
        1 => "jarsources=info",
        2 => "jarsources=debug",
        _ => "jarsources=trace",
    };
    let filter = match directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_generate_config(cli: &Cli) -> i32 {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "jarsources.toml".to_string());

    match JarSources::generate_sample_config(&config_path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", config_path);
            println!("\nTo use this configuration:");
            println!("  jarsources <jar-or-directory> --config {}", config_path);
            println!("\nEdit the file to choose a backend and destination.");
            0
        }
        Err(e) => {
            eprintln!("Failed to generate configuration file: {}", e.user_message());
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            EXIT_STARTUP_ERROR
        }
    }
}

fn handle_dry_run(cli: &Cli, jarsources: &JarSources) -> i32 {
    let formatter = jarsources.output_formatter();

    formatter.info("DRY RUN MODE - nothing will be decompiled");
    formatter.print_separator();

    let config = jarsources.config();
    formatter.info("Configuration that would be used:");
    if cli.is_verbose() {
        println!("  Backend: {}", config.decompiler.backend);
        if let Some(ref command) = config.decompiler.command {
            println!("  Command: {}", command);
        }
        println!("  Archive extensions: {}", config.output.archive_extensions.join(", "));
        println!("  Output suffix: {}", config.output.suffix);
        println!("  Destination: {}", config.output.destination.display());
        println!("  Jobs: {}", config.batch.jobs);
    }

    let plan = match jarsources.plan(&cli.sources) {
        Ok(plan) => plan,
        Err(e) => {
            jarsources.handle_error(&e);
            return EXIT_STARTUP_ERROR;
        }
    };

    formatter.print_header("Decompilation plan");
    formatter.print_plan(&plan);
    formatter.print_separator();
    formatter.success(&format!("Dry run completed: {} archive(s) would be processed", plan.len()));

    0
}

fn print_startup_error(cli: &Cli, error: &JarSourcesError) {
    let formatter = OutputFormatter::new(cli.output_mode(), 0, false);
    formatter.print_user_friendly_error(error);
}
