use crate::error::{JarSourcesError, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub decompiler: DecompilerConfig,
    pub output: OutputConfig,
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Built-in class-file reader, renders declarations with stub bodies
    Skeleton,
    /// External command reading the class bytes on stdin
    Stream,
    /// External command reading a temporary copy of the class file
    Tempfile,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Skeleton => "skeleton",
            BackendKind::Stream => "stream",
            BackendKind::Tempfile => "tempfile",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecompilerConfig {
    pub backend: BackendKind,
    /// Command line for the external backends; `{path}` marks where the temp file goes.
    pub command: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub include_private: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub destination: PathBuf,
    pub archive_extensions: Vec<String>,
    pub suffix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub jobs: usize,
}

impl Default for DecompilerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Skeleton,
            command: None,
            temp_dir: None,
            include_private: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            destination: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            archive_extensions: vec!["jar".to_string()],
            suffix: "-sources".to_string(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            jobs: num_cpus::get(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(JarSourcesError::Config {
                message: format!("Configuration file not found: {}", path.display()),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| JarSourcesError::Config {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| JarSourcesError::Config {
            message: format!("Failed to parse config file {}: {}", path.display(), e),
        })?;

        Ok(config)
    }

    pub fn load_with_defaults<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from_file(path),
            None => {
                let default_paths = ["jarsources.toml", ".jarsources.toml"];

                for default_path in &default_paths {
                    if Path::new(default_path).exists() {
                        return Self::load_from_file(default_path);
                    }
                }

                Ok(Self::default())
            }
        }
    }

    pub fn merge_with_cli_args(&mut self, cli_args: &CliOverrides) {
        if let Some(ref destination) = cli_args.destination {
            self.output.destination = destination.clone();
        }

        if let Some(backend) = cli_args.backend {
            self.decompiler.backend = backend;
        }

        if let Some(ref command) = cli_args.command {
            self.decompiler.command = Some(command.clone());
        }

        if let Some(ref temp_dir) = cli_args.temp_dir {
            self.decompiler.temp_dir = Some(temp_dir.clone());
        }

        if let Some(jobs) = cli_args.jobs {
            self.batch.jobs = jobs;
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self).map_err(|e| JarSourcesError::Config {
            message: format!("Failed to serialize config: {}", e),
        })?;

        std::fs::write(path, content).map_err(|e| JarSourcesError::Config {
            message: format!("Failed to write config file {}: {}", path.display(), e),
        })?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.archive_extensions.is_empty() {
            return Err(JarSourcesError::Config {
                message: "At least one archive extension must be specified".to_string(),
            });
        }

        if self.output.suffix.is_empty() {
            return Err(JarSourcesError::Config {
                message: "Output suffix must not be empty".to_string(),
            });
        }

        if self.output.suffix.contains(['/', '\\']) {
            return Err(JarSourcesError::Config {
                message: format!(
                    "Output suffix must not contain path separators: {}",
                    self.output.suffix
                ),
            });
        }

        if self.batch.jobs == 0 {
            return Err(JarSourcesError::Config {
                message: "Number of jobs must be greater than 0".to_string(),
            });
        }

        if self.decompiler.backend != BackendKind::Skeleton {
            let has_command = self
                .decompiler
                .command
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty());
            if !has_command {
                return Err(JarSourcesError::Config {
                    message: format!(
                        "The {} backend requires decompiler.command to be set",
                        self.decompiler.backend
                    ),
                });
            }
        }

        if self.output.destination.is_file() {
            return Err(JarSourcesError::Config {
                message: format!(
                    "Destination is a file, not a directory: {}",
                    self.output.destination.display()
                ),
            });
        }

        Ok(())
    }

    /// Whether `path` carries one of the configured archive extensions (case-insensitive).
    pub fn is_archive_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.output
                    .archive_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    pub fn create_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config).unwrap_or_else(|_| String::new())
    }
}

#[derive(Debug, Default)]
pub struct CliOverrides {
    pub destination: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub command: Option<String>,
    pub temp_dir: Option<PathBuf>,
    pub jobs: Option<usize>,
}

impl CliOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_destination(mut self, destination: Option<PathBuf>) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_backend(mut self, backend: Option<BackendKind>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_command(mut self, command: Option<String>) -> Self {
        self.command = command;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: Option<PathBuf>) -> Self {
        self.temp_dir = temp_dir;
        self
    }

    pub fn with_jobs(mut self, jobs: Option<usize>) -> Self {
        self.jobs = jobs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.decompiler.backend, BackendKind::Skeleton);
        assert_eq!(config.output.archive_extensions, vec!["jar"]);
        assert_eq!(config.output.suffix, "-sources");
        assert!(config.batch.jobs > 0);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.output.archive_extensions.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.suffix = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.batch.jobs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_external_backend_requires_command() {
        let mut config = Config::default();
        config.decompiler.backend = BackendKind::Stream;
        assert!(config.validate().is_err());

        config.decompiler.command = Some("procyon".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_operations() {
        let config = Config::default();
        let temp_file = NamedTempFile::new().unwrap();

        config.save_to_file(temp_file.path()).unwrap();

        let loaded_config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.output.suffix, loaded_config.output.suffix);
        assert_eq!(config.batch.jobs, loaded_config.batch.jobs);
    }

    #[test]
    fn test_partial_config_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[decompiler]\nbackend = \"tempfile\"\ncommand = \"cfr {{path}}\"").unwrap();

        let config = Config::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.decompiler.backend, BackendKind::Tempfile);
        assert_eq!(config.decompiler.command.as_deref(), Some("cfr {path}"));
        assert_eq!(config.output.suffix, "-sources");
    }

    #[test]
    fn test_invalid_config_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[decompiler]\nbackend = \"javap\"").unwrap();

        assert!(matches!(
            Config::load_from_file(temp_file.path()),
            Err(JarSourcesError::Config { .. })
        ));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();

        let overrides = CliOverrides::new()
            .with_backend(Some(BackendKind::Stream))
            .with_command(Some("my-decompiler --stdin".to_string()))
            .with_destination(Some(PathBuf::from("/tmp/out")))
            .with_jobs(Some(2));

        config.merge_with_cli_args(&overrides);

        assert_eq!(config.decompiler.backend, BackendKind::Stream);
        assert_eq!(config.decompiler.command.as_deref(), Some("my-decompiler --stdin"));
        assert_eq!(config.output.destination, PathBuf::from("/tmp/out"));
        assert_eq!(config.batch.jobs, 2);
    }

    #[test]
    fn test_archive_extension_matching() {
        let mut config = Config::default();
        assert!(config.is_archive_path(Path::new("lib/guava.jar")));
        assert!(config.is_archive_path(Path::new("GUAVA.JAR")));
        assert!(!config.is_archive_path(Path::new("guava.zip")));
        assert!(!config.is_archive_path(Path::new("jar")));

        config.output.archive_extensions.push("zip".to_string());
        assert!(config.is_archive_path(Path::new("guava.zip")));
    }

    #[test]
    fn test_sample_config_generation() {
        let sample = Config::create_sample_config();
        assert!(!sample.is_empty());
        assert!(sample.contains("[decompiler]"));
        assert!(sample.contains("[output]"));
        assert!(sample.contains("[batch]"));
        assert!(sample.contains("backend = \"skeleton\""));
    }
}
