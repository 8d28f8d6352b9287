pub mod tree;
pub mod writer;

pub use tree::{open_archive, VirtualNode, ARCHIVE_ROOT_MARKER, CLASS_EXTENSION};
pub use writer::{ArchiveWriter, WriteSummary};
