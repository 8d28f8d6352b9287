use crate::archive::{ArchiveWriter, VirtualNode};
use crate::decompiler::Decompiler;
use crate::error::{JarSourcesError, Result};
use crate::ui::GracefulShutdown;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

pub const SOURCE_EXTENSION: &str = "java";

/// What one traversal produced: the archive's display name and the units that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveJobResult {
    pub output_display_name: String,
    pub failed: BTreeSet<String>,
}

type UnitCallback<'a> = Box<dyn FnMut(&VirtualNode) + 'a>;

/// Depth-first walk over an archive tree that feeds units to a backend and entries to a writer.
pub struct ArchiveTraverser<'a> {
    decompiler: &'a mut dyn Decompiler,
    writer: &'a mut ArchiveWriter,
    shutdown: Option<&'a GracefulShutdown>,
    on_unit: Option<UnitCallback<'a>>,
    failed: BTreeSet<String>,
}

impl<'a> ArchiveTraverser<'a> {
    pub fn new(decompiler: &'a mut dyn Decompiler, writer: &'a mut ArchiveWriter) -> Self {
        Self {
            decompiler,
            writer,
            shutdown: None,
            on_unit: None,
            failed: BTreeSet::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: &'a GracefulShutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Called after each compilation unit, whether it decompiled or not.
    pub fn with_unit_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&VirtualNode) + 'a,
    {
        self.on_unit = Some(Box::new(callback));
        self
    }

    pub fn run(mut self, root: &VirtualNode) -> Result<ArchiveJobResult> {
        if root.children().is_empty() {
            return Err(JarSourcesError::EmptyArchive {
                archive: root.name().to_string(),
            });
        }

        debug!(
            "Traversing {} with the {} backend",
            root.name(),
            self.decompiler.name()
        );
        self.visit_children(root, "")?;

        if !self.failed.is_empty() {
            debug!("{} unit(s) failed in {}", self.failed.len(), root.name());
        }

        Ok(ArchiveJobResult {
            output_display_name: root.name().to_string(),
            failed: self.failed,
        })
    }

    fn visit_children(&mut self, directory: &VirtualNode, prefix: &str) -> Result<()> {
        for child in directory.children() {
            if child.is_directory() {
                if child.children().is_empty() {
                    trace!("Skipping empty directory {}", child.path());
                    continue;
                }
                let path = format!("{}{}/", prefix, child.name());
                self.writer.add_directory_entry(&path)?;
                self.visit_children(child, &path)?;
            } else if child.is_compilation_unit() {
                self.visit_unit(child, prefix)?;
            }
        }
        Ok(())
    }

    fn visit_unit(&mut self, unit: &VirtualNode, prefix: &str) -> Result<()> {
        if let Some(shutdown) = self.shutdown {
            shutdown.check_shutdown()?;
        }

        match self.decompiler.decompile(unit) {
            Ok(text) => {
                let path = format!("{}{}.{}", prefix, unit.base_name(), SOURCE_EXTENSION);
                self.writer.add_file_entry(&path, &text)?;
            }
            Err(e) => {
                warn!("{}", e);
                self.failed.insert(unit.name().to_string());
            }
        }

        if let Some(callback) = self.on_unit.as_mut() {
            callback(unit);
        }
        Ok(())
    }
}

/// Number of units a traversal of `root` will hand to the backend.
pub fn count_compilation_units(root: &VirtualNode) -> usize {
    root.children()
        .iter()
        .map(|child| {
            if child.is_directory() {
                count_compilation_units(child)
            } else if child.is_compilation_unit() {
                1
            } else {
                0
            }
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecompileError;
    use std::collections::HashSet;
    use std::fs::File;
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;
    use zip::ZipArchive;

    /// Echoes the unit name, refusing the ones listed in `refuse` and failing I/O on `unreadable`.
    struct ScriptedDecompiler {
        refuse: HashSet<&'static str>,
        unreadable: HashSet<&'static str>,
        calls: usize,
    }

    impl ScriptedDecompiler {
        fn new(refuse: &[&'static str]) -> Self {
            Self {
                refuse: refuse.iter().copied().collect(),
                unreadable: HashSet::new(),
                calls: 0,
            }
        }

        fn with_unreadable(mut self, names: &[&'static str]) -> Self {
            self.unreadable.extend(names.iter().copied());
            self
        }
    }

    impl Decompiler for ScriptedDecompiler {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn decompile(&mut self, unit: &VirtualNode) -> std::result::Result<String, DecompileError> {
            self.calls += 1;
            if self.unreadable.contains(unit.name()) {
                return Err(DecompileError::Io {
                    unit: unit.name().to_string(),
                    source: std::io::Error::other("temp copy failed"),
                });
            }
            if self.refuse.contains(unit.name()) {
                return Err(DecompileError::CannotDecompile {
                    unit: unit.name().to_string(),
                    reason: "refused".to_string(),
                });
            }
            Ok(format!("// {}", unit.base_name()))
        }
    }

    fn class(dir: &str, name: &str) -> VirtualNode {
        VirtualNode::file(name, format!("lib.jar!/{}{}", dir, name), b"\xCA\xFE".to_vec())
    }

    fn dir(name: &str, path: &str, children: Vec<VirtualNode>) -> VirtualNode {
        VirtualNode::directory(name, format!("lib.jar!/{}", path), children)
    }

    fn traverse(root: &VirtualNode, decompiler: &mut ScriptedDecompiler, out: &Path) -> Result<ArchiveJobResult> {
        let mut writer = ArchiveWriter::open_for_write(out).unwrap();
        let result = ArchiveTraverser::new(decompiler, &mut writer).run(root);
        writer.close().unwrap();
        result
    }

    fn entries(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    fn read_entry(path: &Path, name: &str) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut content = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
        content
    }

    #[test]
    fn test_empty_directories_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![
                dir("META-INF", "META-INF/", vec![]),
                dir(
                    "com",
                    "com/",
                    vec![dir("acme", "com/acme/", vec![class("com/acme/", "Foo.class")])],
                ),
            ],
        );

        let result = traverse(&root, &mut ScriptedDecompiler::new(&[]), &out).unwrap();

        assert_eq!(result.output_display_name, "lib.jar");
        assert!(result.failed.is_empty());
        let mut names = entries(&out);
        names.sort();
        assert_eq!(names, vec!["com/", "com/acme/", "com/acme/Foo.java"]);
        assert_eq!(read_entry(&out, "com/acme/Foo.java"), "// Foo");
    }

    #[test]
    fn test_io_failure_is_recorded_and_siblings_written() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![class("", "A.class"), class("", "Foo.class"), class("", "C.class")],
        );

        let mut decompiler = ScriptedDecompiler::new(&[]).with_unreadable(&["Foo.class"]);
        let result = traverse(&root, &mut decompiler, &out).unwrap();

        assert_eq!(result.failed, BTreeSet::from(["Foo.class".to_string()]));
        assert_eq!(entries(&out), vec!["A.java", "C.java"]);
        assert_eq!(decompiler.calls, 3);
    }

    #[test]
    fn test_nested_classes_produce_no_entry() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![
                class("", "Foo.class"),
                class("", "Foo$1.class"),
                class("", "Foo$Inner.class"),
                VirtualNode::file("app.properties", "lib.jar!/app.properties", b"a=b".to_vec()),
            ],
        );

        let mut decompiler = ScriptedDecompiler::new(&[]);
        traverse(&root, &mut decompiler, &out).unwrap();

        assert_eq!(entries(&out), vec!["Foo.java"]);
        assert_eq!(decompiler.calls, 1);
        assert_eq!(count_compilation_units(&root), 1);
    }

    #[test]
    fn test_failed_unit_does_not_abort_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![
                class("", "Alpha.class"),
                class("", "Bar.class"),
                class("", "Gamma.class"),
            ],
        );

        let result = traverse(&root, &mut ScriptedDecompiler::new(&["Bar.class"]), &out).unwrap();

        assert_eq!(entries(&out), vec!["Alpha.java", "Gamma.java"]);
        assert_eq!(
            result.failed,
            BTreeSet::from(["Bar.class".to_string()])
        );
    }

    #[test]
    fn test_duplicate_units_written_once() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![
                dir("com", "com/", vec![class("com/", "Foo.class")]),
                dir("com", "com/", vec![class("com/", "Foo.class"), class("com/", "Bar.class")]),
            ],
        );

        traverse(&root, &mut ScriptedDecompiler::new(&[]), &out).unwrap();

        assert_eq!(entries(&out), vec!["com/", "com/Foo.java", "com/Bar.java"]);
    }

    #[test]
    fn test_empty_archive_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir("empty.jar", "", vec![]);

        let result = traverse(&root, &mut ScriptedDecompiler::new(&[]), &out);
        assert!(matches!(
            result,
            Err(JarSourcesError::EmptyArchive { ref archive }) if archive == "empty.jar"
        ));
    }

    #[test]
    fn test_cancellation_stops_before_next_unit() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("out.jar");
        let root = dir(
            "lib.jar",
            "",
            vec![class("", "A.class"), class("", "B.class"), class("", "C.class")],
        );

        let shutdown = GracefulShutdown::detached();
        let mut decompiler = ScriptedDecompiler::new(&[]);
        let mut writer = ArchiveWriter::open_for_write(&out).unwrap();
        let mut seen = Vec::new();

        let result = ArchiveTraverser::new(&mut decompiler, &mut writer)
            .with_shutdown(&shutdown)
            .with_unit_callback(|unit| {
                seen.push(unit.name().to_string());
                shutdown.request_shutdown();
            })
            .run(&root);

        assert!(matches!(result, Err(JarSourcesError::Cancelled)));
        assert_eq!(seen, vec!["A.class"]);
        assert_eq!(decompiler.calls, 1);
    }
}
