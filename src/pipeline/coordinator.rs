//! Drives archive jobs: one fresh writer and backend per archive, temp output persisted on success.
//!
//! Progress for one archive is split into setup (10%), traversal (70%, divided per unit) and
//! attach/copy (20%). The batch fraction is the mean over all archives.

use crate::archive::{open_archive, ArchiveWriter, WriteSummary};
use crate::config::Config;
use crate::decompiler::build_decompiler;
use crate::error::{JarSourcesError, Result};
use crate::pipeline::traverser::{count_compilation_units, ArchiveTraverser};
use crate::ui::GracefulShutdown;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const SETUP_SHARE: f64 = 0.1;
const TRAVERSAL_SHARE: f64 = 0.7;

/// Whether the output archive was new or replaced an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Attachment {
    Created,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub source_archive_name: String,
    pub output_archive_name: String,
    pub output_path: PathBuf,
    pub failed_unit_names: BTreeSet<String>,
    pub units_total: usize,
    pub backend: String,
    pub attachment: Attachment,
    pub written: WriteSummary,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl ArchiveReport {
    pub fn units_decompiled(&self) -> usize {
        self.units_total.saturating_sub(self.failed_unit_names.len())
    }
}

/// Result of one archive job; exactly one per source handed to `run_batch`.
#[derive(Debug)]
pub struct ArchiveOutcome {
    pub source: PathBuf,
    pub result: Result<ArchiveReport>,
}

impl ArchiveOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self.result, Err(JarSourcesError::Cancelled))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchProgress {
    /// Monotonic, in `[0, 1]`.
    pub fraction: f64,
    pub text: String,
}

pub type ProgressCallback = Arc<dyn Fn(&BatchProgress) + Send + Sync>;

pub struct PipelineCoordinator {
    config: Config,
    shutdown: GracefulShutdown,
    progress: Option<ProgressCallback>,
}

impl PipelineCoordinator {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shutdown: GracefulShutdown::detached(),
            progress: None,
        }
    }

    pub fn with_shutdown(mut self, shutdown: GracefulShutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&BatchProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Output file name for `source`, e.g. `guava-33.0.jar` -> `guava-33.0-sources.jar`.
    pub fn output_archive_name(&self, source: &Path) -> Result<String> {
        output_archive_name(source, &self.config.output.suffix)
    }

    /// Process every source independently; outcomes come back in input order.
    pub fn run_batch(&self, sources: &[PathBuf], destination: &Path) -> Vec<ArchiveOutcome> {
        if let Err(e) = fs::create_dir_all(destination) {
            warn!(
                "Cannot create destination {}: {}",
                destination.display(),
                e
            );
            return sources
                .iter()
                .map(|source| ArchiveOutcome {
                    source: source.clone(),
                    result: Err(JarSourcesError::Io(io::Error::new(e.kind(), e.to_string()))),
                })
                .collect();
        }

        let tracker = ProgressTracker::new(sources.len(), self.progress.clone());
        let conflicts = self.output_conflicts(sources);
        info!(
            "Decompiling {} archive(s) into {}",
            sources.len(),
            destination.display()
        );

        self.run_all(sources, &conflicts, destination, &tracker)
    }

    /// For each source, the earlier source that already claims the same output name.
    fn output_conflicts(&self, sources: &[PathBuf]) -> Vec<Option<PathBuf>> {
        let mut claimed: HashMap<String, &PathBuf> = HashMap::new();
        sources
            .iter()
            .map(|source| {
                if !self.config.is_archive_path(source) {
                    return None;
                }
                let name = self.output_archive_name(source).ok()?;
                match claimed.entry(name) {
                    Entry::Occupied(first) => Some(first.get().to_path_buf()),
                    Entry::Vacant(slot) => {
                        slot.insert(source);
                        None
                    }
                }
            })
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn run_all(
        &self,
        sources: &[PathBuf],
        conflicts: &[Option<PathBuf>],
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> Vec<ArchiveOutcome> {
        use rayon::prelude::*;

        let jobs = self.config.batch.jobs.max(1);
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| {
                sources
                    .par_iter()
                    .enumerate()
                    .map(|(index, source)| {
                        let conflict = conflicts[index].as_deref();
                        self.run_archive(index, source, conflict, destination, tracker)
                    })
                    .collect()
            }),
            Err(e) => {
                warn!("Falling back to sequential processing: {}", e);
                self.run_sequential(sources, conflicts, destination, tracker)
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run_all(
        &self,
        sources: &[PathBuf],
        conflicts: &[Option<PathBuf>],
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> Vec<ArchiveOutcome> {
        self.run_sequential(sources, conflicts, destination, tracker)
    }

    fn run_sequential(
        &self,
        sources: &[PathBuf],
        conflicts: &[Option<PathBuf>],
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> Vec<ArchiveOutcome> {
        sources
            .iter()
            .zip(conflicts)
            .enumerate()
            .map(|(index, (source, conflict))| {
                self.run_archive(index, source, conflict.as_deref(), destination, tracker)
            })
            .collect()
    }

    fn run_archive(
        &self,
        index: usize,
        source: &Path,
        conflict: Option<&Path>,
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> ArchiveOutcome {
        let result = match conflict {
            Some(first) => Err(JarSourcesError::OutputConflict {
                output: self
                    .output_archive_name(source)
                    .unwrap_or_else(|_| source.display().to_string()),
                first_source: first.display().to_string(),
            }),
            None => self.process_archive(index, source, destination, tracker),
        };

        match &result {
            Ok(report) => info!(
                "{} {} ({} of {} units, {} failed)",
                match report.attachment {
                    Attachment::Created => "Created",
                    Attachment::Updated => "Updated",
                },
                report.output_path.display(),
                report.units_decompiled(),
                report.units_total,
                report.failed_unit_names.len()
            ),
            Err(JarSourcesError::Cancelled) => info!("Cancelled {}", source.display()),
            Err(e) => warn!("Failed to process {}: {}", source.display(), e),
        }
        tracker.finish(index, source);

        ArchiveOutcome {
            source: source.to_path_buf(),
            result,
        }
    }

    fn process_archive(
        &self,
        index: usize,
        source: &Path,
        destination: &Path,
        tracker: &ProgressTracker,
    ) -> Result<ArchiveReport> {
        self.shutdown.check_shutdown()?;
        let start = Instant::now();

        if !self.config.is_archive_path(source) {
            return Err(JarSourcesError::UnsupportedArchive {
                path: source.display().to_string(),
            });
        }

        let display_name = file_name(source)?;
        tracker.update(index, 0.0, format!("Opening {}", display_name));

        let root = open_archive(source)?;
        let units_total = count_compilation_units(&root);
        let output_name = self.output_archive_name(source)?;
        let output_path = destination.join(&output_name);
        let attachment = if output_path.exists() {
            Attachment::Updated
        } else {
            Attachment::Created
        };

        // Dropped without persisting on every early return, which deletes it.
        let temp_output = tempfile::Builder::new()
            .prefix(".jarsources-")
            .suffix(".tmp")
            .tempfile_in(destination)?;
        let mut writer = ArchiveWriter::new(temp_output.as_file().try_clone()?);
        let mut decompiler = build_decompiler(&self.config.decompiler)?;
        let backend = decompiler.name().to_string();
        debug!(
            "{}: {} units, writing to {}",
            display_name,
            units_total,
            temp_output.path().display()
        );

        tracker.update(index, SETUP_SHARE, format!("Decompiling {}", display_name));

        let mut processed = 0usize;
        let job = ArchiveTraverser::new(decompiler.as_mut(), &mut writer)
            .with_shutdown(&self.shutdown)
            .with_unit_callback(|unit| {
                processed += 1;
                let within = SETUP_SHARE
                    + TRAVERSAL_SHARE * processed as f64 / units_total.max(1) as f64;
                tracker.update(index, within, format!("{}: {}", display_name, unit.name()));
            })
            .run(&root)?;

        tracker.update(
            index,
            SETUP_SHARE + TRAVERSAL_SHARE,
            format!("Writing {}", output_name),
        );
        let written = writer.close()?;
        drop(decompiler);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp_output.path(), fs::Permissions::from_mode(0o644))?;
        }
        temp_output
            .persist(&output_path)
            .map_err(|e| JarSourcesError::Io(e.error))?;

        Ok(ArchiveReport {
            source_archive_name: job.output_display_name,
            output_archive_name: output_name,
            output_path,
            failed_unit_names: job.failed,
            units_total,
            backend,
            attachment,
            written,
            duration: start.elapsed(),
        })
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| JarSourcesError::InvalidPath {
            path: path.display().to_string(),
        })
}

pub fn output_archive_name(source: &Path, suffix: &str) -> Result<String> {
    let invalid = || JarSourcesError::InvalidPath {
        path: source.display().to_string(),
    };
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(invalid)?;
    match source.extension().and_then(|e| e.to_str()) {
        Some(extension) => Ok(format!("{}{}.{}", stem, suffix, extension)),
        None => Ok(format!("{}{}", stem, suffix)),
    }
}

/// Per-archive fractions, averaged into one monotonic batch fraction.
struct ProgressTracker {
    fractions: Mutex<Vec<f64>>,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    fn new(archives: usize, callback: Option<ProgressCallback>) -> Self {
        Self {
            fractions: Mutex::new(vec![0.0; archives]),
            callback,
        }
    }

    fn update(&self, index: usize, within: f64, text: String) {
        let Some(callback) = &self.callback else {
            return;
        };
        let Ok(mut fractions) = self.fractions.lock() else {
            return;
        };
        if let Some(slot) = fractions.get_mut(index) {
            *slot = slot.max(within.clamp(0.0, 1.0));
        }
        let fraction = fractions.iter().sum::<f64>() / fractions.len().max(1) as f64;
        // Reported under the lock so parallel jobs cannot deliver fractions out of order.
        callback(&BatchProgress { fraction, text });
    }

    fn finish(&self, index: usize, source: &Path) {
        self.update(index, 1.0, format!("Finished {}", source.display()));
    }
}

mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }
}
