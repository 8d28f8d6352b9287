use crate::archive::VirtualNode;
use crate::decompiler::Decompiler;
use crate::error::{DecompileError, JarSourcesError, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;
use tracing::{debug, trace, warn};

/// Replaced by the absolute temp-file path in the command's arguments.
pub const PATH_PLACEHOLDER: &str = "{path}";

/// External decompiler invocation, e.g. `procyon {path}` or `my-decompiler --stdin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompilerCommand {
    program: String,
    args: Vec<String>,
}

impl DecompilerCommand {
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| JarSourcesError::Config {
            message: "Decompiler command is empty".to_string(),
        })?;

        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn to_command(&self, path: Option<&Path>) -> Command {
        let mut command = Command::new(&self.program);
        match path {
            Some(path) => {
                let path = path.to_string_lossy();
                let mut substituted = false;
                for arg in &self.args {
                    if arg.contains(PATH_PLACEHOLDER) {
                        substituted = true;
                        command.arg(arg.replace(PATH_PLACEHOLDER, &path));
                    } else {
                        command.arg(arg);
                    }
                }
                if !substituted {
                    command.arg(&*path);
                }
            }
            None => {
                command.args(&self.args);
            }
        }
        command
    }
}

/// Pipes the unit's bytes into the command and takes its stdout as the source text.
#[derive(Debug, Clone)]
pub struct StreamDecompiler {
    command: DecompilerCommand,
}

impl StreamDecompiler {
    pub fn new(command: DecompilerCommand) -> Self {
        Self { command }
    }
}

impl Decompiler for StreamDecompiler {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn decompile(&mut self, unit: &VirtualNode) -> std::result::Result<String, DecompileError> {
        let bytes = unit.read_bytes().map_err(|source| DecompileError::Io {
            unit: unit.name().to_string(),
            source,
        })?;
        let empty_unit = bytes.is_empty();
        run_decompiler(unit.name(), self.command.to_command(None), Some(bytes), empty_unit)
    }
}

/// Copies each unit to a file under a private temp root and hands the path to the command.
///
/// The file lives at the unit's entry path below the root, so `lib.jar!/com/acme/Foo.class`
/// becomes `<root>/com/acme/Foo.class`. It is removed after every invocation.
pub struct TempFileDecompiler {
    command: DecompilerCommand,
    root: TempDir,
}

impl TempFileDecompiler {
    pub fn new(command: DecompilerCommand, temp_dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jarsources-");
        let root = match temp_dir {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        debug!("Temp-file decompiler root: {}", root.path().display());

        Ok(Self { command, root })
    }

    pub fn temp_root(&self) -> &Path {
        self.root.path()
    }

    fn temp_path_for(&self, unit: &VirtualNode) -> PathBuf {
        let mut path = self.root.path().to_path_buf();
        for component in Path::new(unit.entry_path()).components() {
            if let Component::Normal(segment) = component {
                path.push(segment);
            }
        }
        path
    }
}

impl Decompiler for TempFileDecompiler {
    fn name(&self) -> &'static str {
        "tempfile"
    }

    fn decompile(&mut self, unit: &VirtualNode) -> std::result::Result<String, DecompileError> {
        let io_error = |source: io::Error| DecompileError::Io {
            unit: unit.name().to_string(),
            source,
        };

        let bytes = unit.read_bytes().map_err(io_error)?;
        let temp_file = TempClassFile::create(self.temp_path_for(unit), &bytes).map_err(io_error)?;

        let result = run_decompiler(
            unit.name(),
            self.command.to_command(Some(temp_file.path())),
            None,
            bytes.is_empty(),
        );

        match (result, temp_file.remove()) {
            (Ok(text), Ok(())) => Ok(text),
            (Ok(_), Err(source)) => Err(io_error(source)),
            (Err(error), removed) => {
                if let Err(e) = removed {
                    warn!("Failed to remove temp file for {}: {}", unit.name(), e);
                }
                Err(error)
            }
        }
    }
}

/// Removes the file on drop unless `remove` already did.
struct TempClassFile {
    path: PathBuf,
    removed: bool,
}

impl TempClassFile {
    fn create(path: PathBuf, bytes: &[u8]) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        trace!("Wrote temp class file {}", path.display());
        Ok(Self {
            path,
            removed: false,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        fs::remove_file(&self.path)
    }
}

impl Drop for TempClassFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Empty output only counts as source text when the unit itself was empty.
fn run_decompiler(
    unit: &str,
    mut command: Command,
    input: Option<Vec<u8>>,
    empty_unit: bool,
) -> std::result::Result<String, DecompileError> {
    command
        .stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|e| DecompileError::Backend {
        unit: unit.to_string(),
        message: format!("failed to start decompiler: {}", e),
    })?;

    // Feed stdin on its own thread while stdout is drained.
    let feeder = match (input, child.stdin.take()) {
        (Some(bytes), Some(mut stdin)) => Some(std::thread::spawn(move || stdin.write_all(&bytes))),
        _ => None,
    };

    let output = child.wait_with_output().map_err(|source| DecompileError::Io {
        unit: unit.to_string(),
        source,
    })?;

    if let Some(feeder) = feeder {
        match feeder.join() {
            Ok(Err(e)) if e.kind() != io::ErrorKind::BrokenPipe => {
                debug!("Writing {} to decompiler stdin failed: {}", unit, e);
            }
            Err(_) => debug!("Stdin writer for {} panicked", unit),
            _ => {}
        }
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecompileError::CannotDecompile {
            unit: unit.to_string(),
            reason: format!("decompiler exited with {}: {}", output.status, stderr.trim()),
        });
    }

    let text = String::from_utf8_lossy(&output.stdout).into_owned();
    if text.trim().is_empty() && !empty_unit {
        return Err(DecompileError::CannotDecompile {
            unit: unit.to_string(),
            reason: "decompiler produced no output".to_string(),
        });
    }

    Ok(text)
}
