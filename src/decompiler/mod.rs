pub mod class_file;
pub mod command;
pub mod skeleton;

pub use class_file::{ClassFile, ClassFormatError};
pub use command::{DecompilerCommand, StreamDecompiler, TempFileDecompiler, PATH_PLACEHOLDER};
pub use skeleton::{SkeletonDecompiler, SkeletonOptions};

use crate::archive::VirtualNode;
use crate::config::{BackendKind, DecompilerConfig};
use crate::error::{DecompileError, JarSourcesError, Result};
use tracing::debug;

/// Turns one compilation unit into source text.
///
/// A backend instance serves a single archive job and may keep private caches for it.
pub trait Decompiler: Send {
    fn name(&self) -> &'static str;

    fn decompile(&mut self, unit: &VirtualNode) -> std::result::Result<String, DecompileError>;
}

/// Build a fresh backend for one archive job.
pub fn build_decompiler(config: &DecompilerConfig) -> Result<Box<dyn Decompiler>> {
    debug!("Building {:?} decompiler backend", config.backend);
    let backend: Box<dyn Decompiler> = match config.backend {
        BackendKind::Skeleton => Box::new(SkeletonDecompiler::new(SkeletonOptions {
            include_private: config.include_private,
            header_comment: true,
        })),
        BackendKind::Stream => Box::new(StreamDecompiler::new(required_command(config)?)),
        BackendKind::Tempfile => Box::new(TempFileDecompiler::new(
            required_command(config)?,
            config.temp_dir.as_deref(),
        )?),
    };
    Ok(backend)
}

fn required_command(config: &DecompilerConfig) -> Result<DecompilerCommand> {
    let command_line = config
        .command
        .as_deref()
        .ok_or_else(|| JarSourcesError::Backend {
            message: format!(
                "the {} backend needs an external command (decompiler.command or --command)",
                config.backend
            ),
        })?;
    DecompilerCommand::parse(command_line)
}
