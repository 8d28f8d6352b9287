use crate::config::Config;
use crate::error::{JarSourcesError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Expands command-line inputs into the list of archives to process.
///
/// Files are taken as given, so an unsupported extension still yields an outcome. Directories
/// are searched recursively for the configured archive extensions, skipping archives that are
/// themselves outputs (`*<suffix>.<ext>`).
pub struct ArchiveDiscovery<'a> {
    config: &'a Config,
}

impl<'a> ArchiveDiscovery<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    pub fn discover(&self, inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut archives = Vec::new();
        let mut seen = HashSet::new();

        for input in inputs {
            if !input.exists() {
                return Err(JarSourcesError::InvalidPath {
                    path: input.display().to_string(),
                });
            }

            if input.is_dir() {
                for archive in self.scan_directory(input) {
                    if seen.insert(archive.clone()) {
                        archives.push(archive);
                    }
                }
            } else if seen.insert(input.clone()) {
                archives.push(input.clone());
            }
        }

        if archives.is_empty() {
            return Err(JarSourcesError::NoArchivesFound {
                searched_extensions: self.config.output.archive_extensions.clone(),
            });
        }

        debug!("Discovered {} archive(s)", archives.len());
        Ok(archives)
    }

    fn scan_directory(&self, root: &Path) -> Vec<PathBuf> {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        let mut found = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Scan error under {}: {}", root.display(), err);
                    continue;
                }
            };

            if self.is_candidate(&entry) {
                found.push(entry.into_path());
            }
        }
        found
    }

    fn is_candidate(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_file()
            && self.config.is_archive_path(entry.path())
            && !self.is_generated_output(entry.path())
    }

    fn is_generated_output(&self, path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(&self.config.output.suffix))
    }
}
