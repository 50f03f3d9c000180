//! Finding (or producing) the text rendering of a trace.

use crate::capture::CaptureHeader;
use crate::error::TraceError;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Stdio;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// File name of the binary capture.
pub const CAPTURE_NAME: &str = "trace.dat";
/// File name of the text rendering.
pub const RENDERING_NAME: &str = "trace.txt";

/// A trace directory, resolved to an absolute path once at construction.
///
/// Every later operation uses the stored path, so changing the working
/// directory of the process afterwards has no effect on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDir {
    path: PathBuf,
}

impl TraceDir {
    /// Capture `path`, resolving it against the current directory if it is
    /// relative.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref();
        let path = std::path::absolute(path).map_err(|err| TraceError::io(path, err))?;
        Ok(Self { path })
    }

    /// Capture the current working directory.
    pub fn current() -> Result<Self, TraceError> {
        let path = std::env::current_dir().map_err(|err| TraceError::io(".", err))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capture_path(&self) -> PathBuf {
        self.path.join(CAPTURE_NAME)
    }

    pub fn rendering_path(&self) -> PathBuf {
        self.path.join(RENDERING_NAME)
    }

    /// Read the header of the binary capture in this directory.
    pub fn capture_header(&self) -> Result<CaptureHeader, TraceError> {
        let path = self.capture_path();
        CaptureHeader::from_file(&path).map_err(|err| TraceError::io(path, err.into()))
    }
}

/// Turns the binary capture of a directory into its text rendering.
pub trait Converter {
    /// Produce [`TraceDir::rendering_path`] from [`TraceDir::capture_path`].
    fn convert(&self, dir: &TraceDir) -> std::io::Result<()>;
}

/// Converter running `trace-cmd report`.
#[derive(Debug, Clone)]
pub struct TraceCmd {
    program: PathBuf,
}

impl Default for TraceCmd {
    fn default() -> Self {
        Self {
            program: PathBuf::from("trace-cmd"),
        }
    }
}

impl TraceCmd {
    /// Use a specific `trace-cmd` binary.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Converter for TraceCmd {
    fn convert(&self, dir: &TraceDir) -> std::io::Result<()> {
        let target = dir.rendering_path();
        let partial = target.with_extension("txt.partial");
        let output = std::fs::File::create(&partial)?;
        let status = Command::new(&self.program)
            .arg("report")
            .arg("-i")
            .arg(dir.capture_path())
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(output)
            .status();
        let status = match status {
            Ok(status) => status,
            Err(err) => {
                remove_partial(&partial);
                return Err(err);
            }
        };
        if !status.success() {
            remove_partial(&partial);
            return Err(std::io::Error::other(format!(
                "{} report failed: {status}",
                self.program.display()
            )));
        }
        std::fs::rename(&partial, &target)
    }
}

/// Size and modification time of a file, used to detect changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub len: u64,
    pub modified_secs: u64,
    pub modified_nanos: u32,
}

impl Fingerprint {
    pub fn of(path: &Path) -> Result<Self, TraceError> {
        let meta = std::fs::metadata(path).map_err(|err| TraceError::io(path, err))?;
        let modified = meta
            .modified()
            .map_err(|err| TraceError::io(path, err))?
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            len: meta.len(),
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
        })
    }
}

/// Handle to an existing text rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRendering {
    path: PathBuf,
}

impl TextRendering {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn fingerprint(&self) -> Result<Fingerprint, TraceError> {
        Fingerprint::of(&self.path)
    }
}

/// Find the text rendering in `dir`, converting the binary capture if there
/// is no rendering yet.
pub fn locate(dir: &TraceDir, converter: &dyn Converter) -> Result<TextRendering, TraceError> {
    let rendering = dir.rendering_path();
    let capture = dir.capture_path();

    if rendering.is_file() {
        if modified(&capture) > modified(&rendering) {
            log::warn!(
                "\"{}\" is newer than \"{}\", using the existing rendering anyway",
                capture.display(),
                rendering.display()
            );
        }
        return Ok(TextRendering { path: rendering });
    }

    if !capture.is_file() {
        return Err(TraceError::missing(
            dir.path(),
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("neither {CAPTURE_NAME} nor {RENDERING_NAME} found"),
            ),
        ));
    }

    let header =
        CaptureHeader::from_file(&capture).map_err(|err| TraceError::missing(dir.path(), err.into()))?;
    log::info!(
        "Converting \"{}\" (format v{}, page size {})",
        capture.display(),
        header.version,
        header.page_size
    );
    converter
        .convert(dir)
        .map_err(|err| TraceError::missing(dir.path(), err))?;

    if !rendering.is_file() {
        return Err(TraceError::missing(
            dir.path(),
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("conversion did not produce {RENDERING_NAME}"),
            ),
        ));
    }
    Ok(TextRendering { path: rendering })
}

/// Best-effort removal of a half-written file.
pub(crate) fn remove_partial(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            log::debug!("Failed to remove \"{}\": {err}", path.display());
        }
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}
