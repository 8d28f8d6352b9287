use crate::error::{JarSourcesError, Result};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Separates the archive location from the entry path inside it, as in `lib.jar!/com/acme/Foo.class`.
pub const ARCHIVE_ROOT_MARKER: char = '!';

pub const CLASS_EXTENSION: &str = "class";
pub const NESTED_CLASS_SEPARATOR: char = '$';

type SharedArchive = Arc<Mutex<ZipArchive<BufReader<File>>>>;

#[derive(Clone)]
enum NodeContent {
    Directory(Vec<VirtualNode>),
    ArchiveEntry { archive: SharedArchive, index: usize },
    Bytes(Arc<[u8]>),
}

/// Read-only view of one node in an archive's directory tree.
#[derive(Clone)]
pub struct VirtualNode {
    name: String,
    path: String,
    content: NodeContent,
}

impl VirtualNode {
    pub fn directory<N, P>(name: N, path: P, children: Vec<VirtualNode>) -> Self
    where
        N: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            path: path.into(),
            content: NodeContent::Directory(children),
        }
    }

    /// Leaf node backed by bytes already in memory.
    pub fn file<N, P>(name: N, path: P, bytes: impl Into<Arc<[u8]>>) -> Self
    where
        N: Into<String>,
        P: Into<String>,
    {
        Self {
            name: name.into(),
            path: path.into(),
            content: NodeContent::Bytes(bytes.into()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path below the archive root, with a leading `/`.
    pub fn entry_path(&self) -> &str {
        match self.path.find(ARCHIVE_ROOT_MARKER) {
            Some(pos) => &self.path[pos + ARCHIVE_ROOT_MARKER.len_utf8()..],
            None => &self.path,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self.content, NodeContent::Directory(_))
    }

    pub fn children(&self) -> &[VirtualNode] {
        match &self.content {
            NodeContent::Directory(children) => children,
            _ => &[],
        }
    }

    pub fn extension(&self) -> &str {
        if self.is_directory() {
            return "";
        }
        match self.name.rfind('.') {
            Some(pos) if pos > 0 => &self.name[pos + 1..],
            _ => "",
        }
    }

    pub fn base_name(&self) -> &str {
        let extension = self.extension();
        if extension.is_empty() {
            &self.name
        } else {
            &self.name[..self.name.len() - extension.len() - 1]
        }
    }

    /// Top-level classes only; nested and anonymous classes come out with their enclosing class.
    pub fn is_compilation_unit(&self) -> bool {
        !self.is_directory()
            && self.extension() == CLASS_EXTENSION
            && !self.name.contains(NESTED_CLASS_SEPARATOR)
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.content {
            NodeContent::Directory(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", self.path),
            )),
            NodeContent::Bytes(bytes) => Ok(bytes.to_vec()),
            NodeContent::ArchiveEntry { archive, index } => {
                let mut archive = archive
                    .lock()
                    .map_err(|_| io::Error::other("archive reader lock poisoned"))?;
                let mut entry = archive.by_index(*index).map_err(io::Error::other)?;
                let mut data = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut data)?;
                Ok(data)
            }
        }
    }
}

impl fmt::Debug for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VirtualNode");
        debug.field("name", &self.name).field("path", &self.path);
        if self.is_directory() {
            debug.field("children", &self.children());
        }
        debug.finish()
    }
}

/// Build the tree of a jar/zip file, keeping the archive's own entry order.
///
/// Directories without an explicit entry are synthesized from the entry paths.
pub fn open_archive<P: AsRef<Path>>(archive_path: P) -> Result<VirtualNode> {
    let archive_path = archive_path.as_ref();
    let root_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| JarSourcesError::InvalidPath {
            path: archive_path.display().to_string(),
        })?
        .to_string();

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(BufReader::new(file))?;
    let total = archive.len();
    let mut indexed: Vec<(usize, String)> = Vec::with_capacity(total);
    for index in 0..total {
        let entry = archive.by_index_raw(index)?;
        if entry.enclosed_name().is_none() {
            warn!("Skipping unsafe entry name {:?} in {}", entry.name(), root_name);
            continue;
        }
        indexed.push((index, entry.name().to_string()));
    }
    debug!(
        "Read {} of {} entries from {}",
        indexed.len(),
        total,
        archive_path.display()
    );

    let shared: SharedArchive = Arc::new(Mutex::new(archive));
    let root_path = format!("{}{}/", archive_path.display(), ARCHIVE_ROOT_MARKER);
    let mut root = DirBuilder::new(root_name, root_path);
    for (index, name) in indexed {
        let is_dir = name.ends_with('/');
        let segments: Vec<&str> = name.split('/').filter(|s| !s.is_empty()).collect();
        root.insert(&segments, is_dir, index);
    }

    Ok(root.build(&shared))
}

enum BuilderNode {
    Dir(DirBuilder),
    Entry { name: String, path: String, index: usize },
}

struct DirBuilder {
    name: String,
    path: String,
    children: Vec<BuilderNode>,
    dirs: HashMap<String, usize>,
}

impl DirBuilder {
    fn new(name: String, path: String) -> Self {
        Self {
            name,
            path,
            children: Vec::new(),
            dirs: HashMap::new(),
        }
    }

    fn insert(&mut self, segments: &[&str], is_dir: bool, index: usize) {
        let Some((first, rest)) = segments.split_first() else {
            return;
        };

        if rest.is_empty() && !is_dir {
            self.children.push(BuilderNode::Entry {
                name: first.to_string(),
                path: format!("{}{}", self.path, first),
                index,
            });
            return;
        }

        let position = match self.dirs.get(*first) {
            Some(&position) => position,
            None => {
                let dir = DirBuilder::new(first.to_string(), format!("{}{}/", self.path, first));
                self.children.push(BuilderNode::Dir(dir));
                let position = self.children.len() - 1;
                self.dirs.insert(first.to_string(), position);
                position
            }
        };

        if let BuilderNode::Dir(dir) = &mut self.children[position] {
            dir.insert(rest, is_dir, index);
        }
    }

    fn build(self, archive: &SharedArchive) -> VirtualNode {
        let children = self
            .children
            .into_iter()
            .map(|child| match child {
                BuilderNode::Dir(dir) => dir.build(archive),
                BuilderNode::Entry { name, path, index } => VirtualNode {
                    name,
                    path,
                    content: NodeContent::ArchiveEntry {
                        archive: Arc::clone(archive),
                        index,
                    },
                },
            })
            .collect();

        VirtualNode::directory(self.name, self.path, children)
    }
}
