use crate::error::{JarSourcesError, UserFriendlyError};
use crate::pipeline::Attachment;
use crate::report::{ArchiveStatus, BatchReport};
use crate::ui::progress::format_duration;
use console::{style, Emoji, Term};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

impl OutputMode {
    pub fn from_string(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputMode::Json,
            "plain" => OutputMode::Plain,
            _ => OutputMode::Human,
        }
    }
}

// Emojis with text fallbacks
static CHECKMARK: Emoji = Emoji("✅ ", "✓ ");
static CROSS: Emoji = Emoji("❌ ", "✗ ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static ROCKET: Emoji = Emoji("🚀 ", "> ");
static SPARKLES: Emoji = Emoji("✨ ", "* ");
static STOP: Emoji = Emoji("🛑 ", "- ");

pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors = match mode {
            OutputMode::Human => Term::stdout().features().colors_supported() && !quiet,
            _ => false,
        };

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Success, message),
            OutputMode::Json => self.print_json_message("success", message),
            OutputMode::Plain => println!("SUCCESS: {}", message),
        }
    }

    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Human => self.print_human_message(MessageType::Error, message),
            OutputMode::Json => self.print_json_message("error", message),
            OutputMode::Plain => eprintln!("ERROR: {}", message),
        }
    }

    pub fn warning(&self, message: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Warning, message),
                OutputMode::Json => self.print_json_message("warning", message),
                OutputMode::Plain => println!("WARNING: {}", message),
            }
        }
    }

    pub fn info(&self, message: &str) {
        if self.should_show_message(1) {
            match self.mode {
                OutputMode::Human => self.print_human_message(MessageType::Info, message),
                OutputMode::Json => self.print_json_message("info", message),
                OutputMode::Plain => println!("INFO: {}", message),
            }
        }
    }

    pub fn debug(&self, message: &str) {
        if self.should_show_message(2) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("  {}", style(message).dim());
                    } else {
                        println!("  DEBUG: {}", message);
                    }
                }
                OutputMode::Json => self.print_json_message("debug", message),
                OutputMode::Plain => println!("DEBUG: {}", message),
            }
        }
    }

    pub fn start_operation(&self, operation: &str) {
        if self.should_show_message(0) {
            match self.mode {
                OutputMode::Human => {
                    if self.use_colors {
                        println!("{}{}", ROCKET, style(operation).bold());
                    } else {
                        println!("> {}", operation);
                    }
                }
                OutputMode::Json => self.print_json_message("operation_start", operation),
                OutputMode::Plain => println!("STARTING: {}", operation),
            }
        }
    }

    pub fn print_user_friendly_error(&self, error: &JarSourcesError) {
        let user_message = error.user_message();
        self.error(&user_message);

        if let Some(suggestion) = error.suggestion() {
            match self.mode {
                OutputMode::Human => {
                    eprintln!();
                    if self.use_colors {
                        eprintln!(
                            "{}{}",
                            INFO,
                            style(&format!("Suggestion: {}", suggestion)).cyan()
                        );
                    } else {
                        eprintln!("Suggestion: {}", suggestion);
                    }
                }
                OutputMode::Json => {
                    self.print_json_object(&serde_json::json!({
                        "type": "suggestion",
                        "message": suggestion
                    }));
                }
                OutputMode::Plain => {
                    eprintln!("SUGGESTION: {}", suggestion);
                }
            }
        }
    }

    /// Final report; JSON mode always prints it, even when quiet.
    pub fn print_batch_report(&self, report: &BatchReport) {
        match self.mode {
            OutputMode::Json => {
                let json_output =
                    serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
                println!("{}", json_output);
            }
            _ if self.quiet => {}
            OutputMode::Human => self.print_human_report(report),
            OutputMode::Plain => self.print_plain_report(report),
        }
    }

    /// Source and planned output for each archive of a dry run.
    pub fn print_plan(&self, plan: &[(PathBuf, PathBuf)]) {
        match self.mode {
            OutputMode::Json => self.print_json_object(&serde_json::json!({
                "type": "plan",
                "archives": plan
                    .iter()
                    .map(|(source, output)| serde_json::json!({
                        "source": source,
                        "output": output
                    }))
                    .collect::<Vec<_>>()
            })),
            _ => {
                for (source, output) in plan {
                    println!("  {} -> {}", source.display(), output.display());
                }
            }
        }
    }

    pub fn print_header(&self, title: &str) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                println!();
                if self.use_colors {
                    println!("{} {}", SPARKLES, style(title).bold().cyan());
                } else {
                    println!("=== {} ===", title);
                }
                println!();
            }
            OutputMode::Json => {
                self.print_json_object(&serde_json::json!({
                    "type": "header",
                    "title": title
                }));
            }
            OutputMode::Plain => {
                println!("=== {} ===", title);
            }
        }
    }

    pub fn print_separator(&self) {
        if self.quiet {
            return;
        }

        match self.mode {
            OutputMode::Human => {
                if self.use_colors {
                    println!("{}", style("─".repeat(60)).dim());
                } else {
                    println!("{}", "-".repeat(60));
                }
            }
            OutputMode::Plain => {
                println!("{}", "-".repeat(60));
            }
            OutputMode::Json => {}
        }
    }

    fn should_show_message(&self, min_verbose_level: u8) -> bool {
        !self.quiet && self.verbose_level >= min_verbose_level
    }

    fn print_human_message(&self, msg_type: MessageType, message: &str) {
        #[allow(clippy::type_complexity)]
        let (emoji, color_fn): (Emoji, Box<dyn Fn(&str) -> console::StyledObject<&str>>) =
            match msg_type {
                MessageType::Success => (CHECKMARK, Box::new(|msg| style(msg).green().bold())),
                MessageType::Error => (CROSS, Box::new(|msg| style(msg).red().bold())),
                MessageType::Warning => (WARNING, Box::new(|msg| style(msg).yellow().bold())),
                MessageType::Info => (INFO, Box::new(|msg| style(msg).cyan())),
            };

        if self.use_colors {
            match msg_type {
                MessageType::Error => eprintln!("{}{}", emoji, color_fn(message)),
                _ => println!("{}{}", emoji, color_fn(message)),
            }
        } else {
            let prefix = match msg_type {
                MessageType::Success => "✓",
                MessageType::Error => "✗",
                MessageType::Warning => "!",
                MessageType::Info => "i",
            };

            match msg_type {
                MessageType::Error => eprintln!("{} {}", prefix, message),
                _ => println!("{} {}", prefix, message),
            }
        }
    }

    fn print_json_message(&self, level: &str, message: &str) {
        self.print_json_object(&serde_json::json!({
            "type": "message",
            "level": level,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339()
        }));
    }

    fn print_json_object(&self, obj: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(obj).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn highlight(&self, value: impl ToString) -> String {
        if self.use_colors {
            style(value.to_string()).cyan().bold().to_string()
        } else {
            value.to_string()
        }
    }

    fn print_human_report(&self, report: &BatchReport) {
        self.print_header("Decompilation Report");

        for entry in &report.archives {
            match (entry.status, &entry.report) {
                (ArchiveStatus::Succeeded, Some(archive)) => {
                    let verb = match archive.attachment {
                        Attachment::Created => "Created",
                        Attachment::Updated => "Updated",
                    };
                    let line = format!(
                        "{} {} ({}/{} classes)",
                        verb,
                        archive.output_path.display(),
                        archive.units_decompiled(),
                        archive.units_total
                    );
                    if self.use_colors {
                        println!("{}{}", CHECKMARK, style(line).green());
                    } else {
                        println!("✓ {}", line);
                    }
                    if !archive.failed_unit_names.is_empty() {
                        let failed: Vec<&str> =
                            archive.failed_unit_names.iter().map(String::as_str).collect();
                        println!("    could not decompile: {}", failed.join(", "));
                    }
                }
                (ArchiveStatus::Cancelled, _) => {
                    if self.use_colors {
                        println!("{}{}", STOP, style(entry.source.display()).yellow());
                    } else {
                        println!("- {} (cancelled)", entry.source.display());
                    }
                }
                _ => {
                    let line = format!(
                        "{}: {}",
                        entry.source.display(),
                        entry.error.as_deref().unwrap_or("failed")
                    );
                    if self.use_colors {
                        println!("{}{}", CROSS, style(line).red());
                    } else {
                        println!("✗ {}", line);
                    }
                }
            }
        }

        let summary = &report.summary;
        println!();
        self.print_separator();
        println!(
            "  Archives:   {} succeeded, {} failed, {} cancelled",
            self.highlight(summary.archives_succeeded),
            self.highlight(summary.archives_failed),
            self.highlight(summary.archives_cancelled)
        );
        println!(
            "  Classes:    {} decompiled, {} failed",
            self.highlight(summary.units_total.saturating_sub(summary.units_failed)),
            self.highlight(summary.units_failed)
        );
        println!("  Backend:    {}", report.backend);
        println!("  Output:     {}", report.destination.display());
        println!(
            "  Time taken: {}",
            self.highlight(format_duration(Duration::from_millis(summary.duration_ms)))
        );
        self.print_separator();
    }

    fn print_plain_report(&self, report: &BatchReport) {
        for entry in &report.archives {
            match (entry.status, &entry.report) {
                (ArchiveStatus::Succeeded, Some(archive)) => {
                    println!(
                        "OK {} -> {} failed={}",
                        entry.source.display(),
                        archive.output_path.display(),
                        archive.failed_unit_names.len()
                    );
                    for unit in &archive.failed_unit_names {
                        println!("FAILED_UNIT {} {}", archive.source_archive_name, unit);
                    }
                }
                (ArchiveStatus::Cancelled, _) => println!("CANCELLED {}", entry.source.display()),
                _ => println!(
                    "ERROR {}: {}",
                    entry.source.display(),
                    entry.error.as_deref().unwrap_or("failed")
                ),
            }
        }
        println!(
            "SUMMARY archives={} succeeded={} failed={} cancelled={} units={} units_failed={}",
            report.summary.archives_total,
            report.summary.archives_succeeded,
            report.summary.archives_failed,
            report.summary.archives_cancelled,
            report.summary.units_total,
            report.summary.units_failed
        );
    }
}

#[derive(Debug, Clone, Copy)]
enum MessageType {
    Success,
    Error,
    Warning,
    Info,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_mode_parsing() {
        assert_eq!(OutputMode::from_string("human"), OutputMode::Human);
        assert_eq!(OutputMode::from_string("json"), OutputMode::Json);
        assert_eq!(OutputMode::from_string("PLAIN"), OutputMode::Plain);
        assert_eq!(OutputMode::from_string("invalid"), OutputMode::Human);
    }

    #[test]
    fn test_formatter_creation() {
        let formatter = OutputFormatter::new(OutputMode::Plain, 1, false);
        assert_eq!(formatter.mode(), OutputMode::Plain);
        assert_eq!(formatter.verbose_level, 1);
        assert!(!formatter.use_colors);
    }

    #[test]
    fn test_quiet_mode() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert_eq!(formatter.verbose_level, 0);
        assert!(formatter.quiet);
        assert!(!formatter.use_colors);
    }

    #[test]
    fn test_should_show_message() {
        let formatter = OutputFormatter::new(OutputMode::Human, 2, false);
        assert!(formatter.should_show_message(0));
        assert!(formatter.should_show_message(1));
        assert!(formatter.should_show_message(2));
        assert!(!formatter.should_show_message(3));

        let quiet_formatter = OutputFormatter::new(OutputMode::Human, 2, true);
        assert!(!quiet_formatter.should_show_message(0));
        assert!(!quiet_formatter.should_show_message(2));
    }
}
