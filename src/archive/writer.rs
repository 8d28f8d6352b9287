use crate::error::Result;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub directories: usize,
    pub files: usize,
    pub bytes_written: u64,
}

/// Output archive for one job.
///
/// Owns the zip stream and the set of paths already written; a second entry with the same
/// path is silently ignored so the archive never contains duplicates.
pub struct ArchiveWriter {
    zip: Option<ZipWriter<BufWriter<File>>>,
    written_paths: HashSet<String>,
    summary: WriteSummary,
}

impl ArchiveWriter {
    pub fn new(file: File) -> Self {
        Self {
            zip: Some(ZipWriter::new(BufWriter::new(file))),
            written_paths: HashSet::new(),
            summary: WriteSummary::default(),
        }
    }

    pub fn open_for_write<P: AsRef<Path>>(destination: P) -> Result<Self> {
        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(destination)?;
        debug!("Opened output archive {}", destination.display());
        Ok(Self::new(file))
    }

    /// Returns `false` when the path was already written.
    pub fn add_directory_entry(&mut self, path: &str) -> Result<bool> {
        if !self.written_paths.insert(path.to_string()) {
            trace!("Skipping duplicate directory entry {}", path);
            return Ok(false);
        }

        self.zip_mut()?.add_directory(path, stored_options())?;
        self.summary.directories += 1;
        Ok(true)
    }

    /// Returns `false` when the path was already written.
    pub fn add_file_entry(&mut self, path: &str, content: &str) -> Result<bool> {
        if !self.written_paths.insert(path.to_string()) {
            trace!("Skipping duplicate file entry {}", path);
            return Ok(false);
        }

        let bytes = content.as_bytes();
        // Empty deflate streams trip up some readers; store them instead.
        let options = if bytes.is_empty() {
            stored_options()
        } else {
            stored_options().compression_method(CompressionMethod::Deflated)
        };

        let zip = self.zip_mut()?;
        zip.start_file(path, options)?;
        zip.write_all(bytes)?;

        self.summary.files += 1;
        self.summary.bytes_written += bytes.len() as u64;
        Ok(true)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.written_paths.contains(path)
    }

    pub fn summary(&self) -> WriteSummary {
        self.summary
    }

    /// Finish the central directory and flush everything to disk.
    pub fn close(mut self) -> Result<WriteSummary> {
        if let Some(zip) = self.zip.take() {
            let mut buffered = zip.finish()?;
            buffered.flush()?;
        }
        debug!(
            "Closed output archive: {} directories, {} files",
            self.summary.directories, self.summary.files
        );
        Ok(self.summary)
    }

    fn zip_mut(&mut self) -> Result<&mut ZipWriter<BufWriter<File>>> {
        self.zip
            .as_mut()
            .ok_or_else(|| std::io::Error::other("archive writer already closed").into())
    }
}

impl Drop for ArchiveWriter {
    fn drop(&mut self) {
        if let Some(zip) = self.zip.take() {
            if let Err(e) = zip.finish() {
                debug!("Failed to finalize abandoned archive writer: {}", e);
            }
        }
    }
}

fn stored_options() -> SimpleFileOptions {
    // Fixed timestamps keep repeated runs byte-identical.
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn test_writes_directory_and_file_entries() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");

        let mut writer = ArchiveWriter::open_for_write(&out).unwrap();
        assert!(writer.add_directory_entry("com/").unwrap());
        assert!(writer.add_file_entry("com/Foo.java", "class Foo {}").unwrap());
        let summary = writer.close().unwrap();

        assert_eq!(summary.directories, 1);
        assert_eq!(summary.files, 1);
        assert_eq!(summary.bytes_written, 12);

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("com/Foo.java")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "class Foo {}");
        assert!(archive.by_name("com/").unwrap().is_dir());
    }

    #[test]
    fn test_duplicate_paths_are_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("dup.jar");

        let mut writer = ArchiveWriter::open_for_write(&out).unwrap();
        assert!(writer.add_directory_entry("com/").unwrap());
        assert!(!writer.add_directory_entry("com/").unwrap());
        assert!(writer.add_file_entry("com/A.java", "first").unwrap());
        assert!(!writer.add_file_entry("com/A.java", "second").unwrap());
        assert!(writer.contains("com/A.java"));
        writer.close().unwrap();

        assert_eq!(entry_names(&out).len(), 2);

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let mut content = String::new();
        archive
            .by_name("com/A.java")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "first");
    }

    #[test]
    fn test_empty_content_is_stored() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("empty.jar");

        let mut writer = ArchiveWriter::open_for_write(&out).unwrap();
        writer.add_file_entry("Empty.java", "").unwrap();
        writer.add_file_entry("Full.java", "class Full {}").unwrap();
        writer.close().unwrap();

        let mut archive = ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let empty = archive.by_name("Empty.java").unwrap();
        assert_eq!(empty.compression(), CompressionMethod::Stored);
        assert_eq!(empty.size(), 0);
        assert_eq!(empty.crc32(), 0);
        drop(empty);

        let full = archive.by_name("Full.java").unwrap();
        assert_eq!(full.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_dropped_writer_still_produces_valid_archive() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("dropped.jar");

        {
            let mut writer = ArchiveWriter::open_for_write(&out).unwrap();
            writer.add_file_entry("A.java", "class A {}").unwrap();
        }

        assert_eq!(entry_names(&out), vec!["A.java".to_string()]);
    }

    #[test]
    fn test_identical_input_gives_identical_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.jar");
        let second = temp_dir.path().join("second.jar");

        for path in [&first, &second] {
            let mut writer = ArchiveWriter::open_for_write(path).unwrap();
            writer.add_directory_entry("pkg/").unwrap();
            writer.add_file_entry("pkg/A.java", "class A {}").unwrap();
            writer.close().unwrap();
        }

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_open_for_write_fails_on_missing_parent_file() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"file").unwrap();

        assert!(ArchiveWriter::open_for_write(blocker.join("out.jar")).is_err());
    }
}
