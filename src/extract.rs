//! Lazy extraction of the event lines belonging to one subsystem.

use crate::error::TraceError;
use crate::locator::TextRendering;
use bstr::ByteSlice;
use bstr::io::BufReadExt;
use bstr::io::ByteLines;
use memchr::memmem::Finder;
use std::io::BufReader;
use std::path::PathBuf;

/// One matched line of the text rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLine {
    /// 1-based line number.
    pub number: usize,
    pub text: String,
}

/// Restartable source of the lines of a rendering containing `marker`.
///
/// No file handle is kept between calls to [`LineSource::lines`].
#[derive(Debug, Clone)]
pub struct LineSource {
    path: PathBuf,
    finder: Finder<'static>,
}

impl LineSource {
    pub fn new(rendering: &TextRendering, marker: &str) -> Self {
        Self {
            path: rendering.path().to_path_buf(),
            finder: Finder::new(marker.as_bytes()).into_owned(),
        }
    }

    /// Open the rendering and iterate over the matching lines.
    pub fn lines(&self) -> Result<Lines<'_>, TraceError> {
        let file = std::fs::File::open(&self.path).map_err(|err| TraceError::io(&self.path, err))?;
        Ok(Lines {
            source: self,
            inner: BufReader::new(file).byte_lines(),
            number: 0,
        })
    }
}

/// Iterator over matching lines. The file is closed when this is dropped.
pub struct Lines<'src> {
    source: &'src LineSource,
    inner: ByteLines<BufReader<std::fs::File>>,
    number: usize,
}

impl Iterator for Lines<'_> {
    type Item = Result<EventLine, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.inner.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(TraceError::io(&self.source.path, err))),
            };
            self.number += 1;
            if self.source.finder.find(&line).is_some() {
                return Some(Ok(EventLine {
                    number: self.number,
                    text: line.to_str_lossy().into_owned(),
                }));
            }
        }
    }
}
