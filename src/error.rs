use thiserror::Error;

#[derive(Error, Debug)]
pub enum JarSourcesError {
    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive operation failed: {message}")]
    Zip {
        message: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Archive contains no entries: {archive}")]
    EmptyArchive { archive: String },

    #[error("Unsupported archive type: {path}")]
    UnsupportedArchive { path: String },

    #[error("{output} is already produced by {first_source}")]
    OutputConflict { output: String, first_source: String },

    #[error("Path validation failed: {path}")]
    InvalidPath { path: String },

    #[error("No archives found with extensions: {searched_extensions:?}")]
    NoArchivesFound { searched_extensions: Vec<String> },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Decompiler backend error: {message}")]
    Backend { message: String },

    #[error("Operation was cancelled by user")]
    Cancelled,
}

/// Failure to turn one compilation unit into source text.
///
/// These never abort an archive job; the traverser records the unit name and moves on.
#[derive(Error, Debug)]
pub enum DecompileError {
    #[error("cannot decompile {unit}: {reason}")]
    CannotDecompile { unit: String, reason: String },

    #[error("I/O failure while decompiling {unit}: {source}")]
    Io {
        unit: String,
        #[source]
        source: std::io::Error,
    },

    #[error("decompiler backend failed on {unit}: {message}")]
    Backend { unit: String, message: String },
}

impl DecompileError {
    pub fn unit(&self) -> &str {
        match self {
            DecompileError::CannotDecompile { unit, .. }
            | DecompileError::Io { unit, .. }
            | DecompileError::Backend { unit, .. } => unit,
        }
    }
}

pub trait UserFriendlyError {
    fn user_message(&self) -> String;
    fn suggestion(&self) -> Option<String>;
}

impl UserFriendlyError for JarSourcesError {
    fn user_message(&self) -> String {
        match self {
            JarSourcesError::Zip { message, .. } => {
                format!("Archive operation failed: {}", message)
            }
            JarSourcesError::EmptyArchive { archive } => {
                format!("Archive '{}' is empty, nothing to decompile", archive)
            }
            JarSourcesError::UnsupportedArchive { path } => {
                format!("Not a supported archive: {}", path)
            }
            JarSourcesError::OutputConflict { output, first_source } => {
                format!("Output {} would overwrite the one from {}", output, first_source)
            }
            JarSourcesError::InvalidPath { path } => {
                format!("Invalid file path: {}", path)
            }
            JarSourcesError::NoArchivesFound { searched_extensions } => {
                format!(
                    "No archives found to decompile. Searched for: {}",
                    searched_extensions.join(", ")
                )
            }
            JarSourcesError::Config { message } => {
                format!("Configuration error: {}", message)
            }
            JarSourcesError::Backend { message } => {
                format!("Decompiler backend error: {}", message)
            }
            JarSourcesError::Cancelled => "Operation was cancelled by user".to_string(),
            _ => self.to_string(),
        }
    }

    fn suggestion(&self) -> Option<String> {
        match self {
            JarSourcesError::Zip { .. } => Some(
                "Check that the file is a valid jar/zip archive and is not truncated.".to_string()
            ),
            JarSourcesError::UnsupportedArchive { .. } => Some(
                "Only archives with the configured extensions are processed (default: jar). Adjust `output.archive_extensions` in the configuration file.".to_string()
            ),
            JarSourcesError::NoArchivesFound { .. } => Some(
                "Pass jar files or directories containing them. Generated *-sources archives are skipped.".to_string()
            ),
            JarSourcesError::Config { .. } => Some(
                "Check your configuration file syntax and ensure all required fields are present.".to_string()
            ),
            JarSourcesError::Backend { .. } => Some(
                "Verify the decompiler command with --command, or switch to the built-in backend with --backend skeleton.".to_string()
            ),
            JarSourcesError::OutputConflict { .. } => Some(
                "Archives with the same file name need separate runs with different --destination directories.".to_string()
            ),
            JarSourcesError::InvalidPath { .. } => Some(
                "Ensure the path exists and you have the necessary read/write permissions.".to_string()
            ),
            _ => None,
        }
    }
}

impl From<zip::result::ZipError> for JarSourcesError {
    fn from(error: zip::result::ZipError) -> Self {
        match error {
            zip::result::ZipError::Io(io) => JarSourcesError::Io(io),
            other => JarSourcesError::Zip {
                message: other.to_string(),
                source: other,
            },
        }
    }
}

impl From<toml::de::Error> for JarSourcesError {
    fn from(error: toml::de::Error) -> Self {
        JarSourcesError::Config {
            message: error.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, JarSourcesError>;
