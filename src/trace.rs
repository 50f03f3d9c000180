//! Entry point tying the pipeline together for one trace directory.

use crate::cache::CacheMode;
use crate::cache::Expect;
use crate::cache::Loaded;
use crate::cache::load_or_build;
use crate::error::TraceError;
use crate::export::write_csv;
use crate::extract::LineSource;
use crate::grammar::FieldGrammar;
use crate::locator::Converter;
use crate::locator::TraceCmd;
use crate::locator::TraceDir;
use crate::locator::locate;
use crate::locator::remove_partial;
use crate::parser::Record;
use crate::parser::parse;
use crate::subsystems;
use crate::table::MalformedPolicy;
use crate::table::Table;
use crate::table::assemble;
use std::io::Write;
use std::path::PathBuf;

/// Knobs for building tables.
pub struct TraceOptions {
    pub malformed: MalformedPolicy,
    pub cache: CacheMode,
    pub converter: Box<dyn Converter>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            malformed: MalformedPolicy::default(),
            cache: CacheMode::default(),
            converter: Box::new(TraceCmd::default()),
        }
    }
}

impl std::fmt::Debug for TraceOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceOptions")
            .field("malformed", &self.malformed)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl TraceOptions {
    #[must_use]
    pub fn with_malformed(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, mode: CacheMode) -> Self {
        self.cache = mode;
        self
    }

    #[must_use]
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converter = Box::new(converter);
        self
    }
}

/// A trace directory and the options used to build tables from it.
#[derive(Debug)]
pub struct Trace {
    dir: TraceDir,
    options: TraceOptions,
}

impl Trace {
    pub fn new(dir: TraceDir, options: TraceOptions) -> Self {
        Self { dir, options }
    }

    /// Open `path` (or the current directory) with default options.
    pub fn open(path: Option<&std::path::Path>) -> Result<Self, TraceError> {
        let dir = match path {
            Some(path) => TraceDir::new(path)?,
            None => TraceDir::current()?,
        };
        Ok(Self::new(dir, TraceOptions::default()))
    }

    pub fn dir(&self) -> &TraceDir {
        &self.dir
    }

    pub fn options(&self) -> &TraceOptions {
        &self.options
    }

    /// The table of the subsystem called `subsystem`.
    pub fn table(&self, subsystem: &str) -> Result<Table, TraceError> {
        Ok(self.load(subsystems::by_name(subsystem)?)?.table)
    }

    /// Build (or load from cache) the table for `grammar`.
    pub fn load(&self, grammar: &FieldGrammar) -> Result<Loaded, TraceError> {
        let rendering = locate(&self.dir, self.options.converter.as_ref())?;
        let expect = Expect {
            grammar,
            source: rendering.fingerprint()?,
            allow_skipped: self.options.malformed == MalformedPolicy::Skip,
        };
        load_or_build(&self.dir, &expect, self.options.cache, || {
            log::info!(
                "Parsing {} events from \"{}\"",
                grammar.subsystem,
                rendering.path().display()
            );
            let source = LineSource::new(&rendering, grammar.marker);
            let records = source
                .lines()?
                .map(|line| -> Result<Record, TraceError> { Ok(parse(&line?, grammar)?) });
            assemble(grammar, records, self.options.malformed)
        })
    }

    /// Write `<dir>/<subsystem>.csv` and return its path.
    pub fn export_csv(&self, subsystem: &str) -> Result<PathBuf, TraceError> {
        let table = self.table(subsystem)?;
        let path = self.dir.path().join(format!("{subsystem}.csv"));
        let tmp = path.with_extension("csv.tmp");
        let result = std::fs::File::create(&tmp).and_then(|file| {
            let mut writer = std::io::BufWriter::new(file);
            write_csv(&table, &mut writer)?;
            writer.flush()
        });
        if let Err(err) = result.and_then(|()| std::fs::rename(&tmp, &path)) {
            remove_partial(&tmp);
            return Err(TraceError::io(path, err));
        }
        Ok(path)
    }
}
