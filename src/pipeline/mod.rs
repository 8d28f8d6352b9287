pub mod coordinator;
pub mod traverser;

pub use coordinator::{
    output_archive_name, ArchiveOutcome, ArchiveReport, Attachment, BatchProgress,
    PipelineCoordinator, ProgressCallback,
};
pub use traverser::{count_compilation_units, ArchiveJobResult, ArchiveTraverser, SOURCE_EXTENSION};
