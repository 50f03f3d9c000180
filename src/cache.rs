//! Sidecar cache of assembled tables.
//!
//! One JSON artifact per subsystem lives next to the trace, named
//! `trace.<subsystem>.table.json`. It records a fingerprint of the text
//! rendering it was built from and is ignored (and rebuilt) when that no
//! longer matches.

use crate::error::TraceError;
use crate::grammar::FieldGrammar;
use crate::locator::Fingerprint;
use crate::locator::TraceDir;
use crate::locator::remove_partial;
use crate::table::Assembled;
use crate::table::Table;
use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// How the cache is used when building a table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Use a valid artifact, otherwise build and write one.
    #[default]
    ReadWrite,
    /// Always build, then overwrite the artifact.
    Refresh,
    /// Neither read nor write artifacts.
    Disabled,
}

/// Where a table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Loaded from the artifact, nothing was parsed.
    Hit,
    /// No artifact existed, the table was built and stored.
    Built,
    /// An artifact existed but was stale, corrupt or refreshed on request.
    Rebuilt,
    /// Built with caching disabled.
    Uncached,
}

/// A table and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub table: Table,
    pub skipped: usize,
    pub outcome: CacheOutcome,
}

/// What a usable artifact must agree with.
#[derive(Debug, Clone, Copy)]
pub struct Expect<'a> {
    pub grammar: &'a FieldGrammar,
    /// Fingerprint of the text rendering the table would be built from.
    pub source: Fingerprint,
    /// Whether a table with skipped malformed lines is acceptable.
    pub allow_skipped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
enum FormatVersion {
    V1 = 1,
}

#[derive(Debug, Serialize, Deserialize)]
struct Artifact {
    format: FormatVersion,
    source: Fingerprint,
    skipped: usize,
    table: Table,
}

/// Path of the artifact for `subsystem` in `dir`.
pub fn artifact_path(dir: &TraceDir, subsystem: &str) -> PathBuf {
    dir.path().join(format!("trace.{subsystem}.table.json"))
}

/// Return the cached table for `expect.grammar` if there is a valid one,
/// otherwise run `build`, store its result and return it.
pub fn load_or_build<F>(
    dir: &TraceDir,
    expect: &Expect<'_>,
    mode: CacheMode,
    build: F,
) -> Result<Loaded, TraceError>
where
    F: FnOnce() -> Result<Assembled, TraceError>,
{
    let path = artifact_path(dir, expect.grammar.subsystem);

    let outcome = match mode {
        CacheMode::Disabled => {
            let Assembled { table, skipped } = build()?;
            return Ok(Loaded {
                table,
                skipped,
                outcome: CacheOutcome::Uncached,
            });
        }
        CacheMode::Refresh => {
            if path.exists() {
                CacheOutcome::Rebuilt
            } else {
                CacheOutcome::Built
            }
        }
        CacheMode::ReadWrite => match read(&path) {
            Ok(Some(artifact)) if is_valid(&artifact, expect) => {
                log::debug!("Loaded {} from \"{}\"", expect.grammar.subsystem, path.display());
                return Ok(Loaded {
                    table: artifact.table,
                    skipped: artifact.skipped,
                    outcome: CacheOutcome::Hit,
                });
            }
            Ok(Some(_)) => {
                log::info!("\"{}\" is out of date, rebuilding", path.display());
                CacheOutcome::Rebuilt
            }
            Ok(None) => CacheOutcome::Built,
            Err(err) => {
                log::warn!("Ignoring unreadable cache \"{}\": {err}", path.display());
                CacheOutcome::Rebuilt
            }
        },
    };

    let Assembled { table, skipped } = build()?;
    let artifact = Artifact {
        format: FormatVersion::V1,
        source: expect.source,
        skipped,
        table,
    };
    if let Err(err) = write(&path, &artifact) {
        log::warn!("Failed to write cache \"{}\": {err}", path.display());
    }
    Ok(Loaded {
        table: artifact.table,
        skipped,
        outcome,
    })
}

fn is_valid(artifact: &Artifact, expect: &Expect<'_>) -> bool {
    artifact.source == expect.source
        && artifact.table.matches(expect.grammar)
        && (expect.allow_skipped || artifact.skipped == 0)
}

/// `Ok(None)` if there is no artifact.
fn read(path: &Path) -> Result<Option<Artifact>, TraceError> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(TraceError::io(path, err)),
    };
    let artifact = serde_json::from_reader(BufReader::new(file))
        .map_err(|err| TraceError::io(path, err.into()))?;
    Ok(Some(artifact))
}

/// Write `artifact` to a temporary file next to `path`, then rename it into
/// place so readers never observe a partial artifact.
fn write(path: &Path, artifact: &Artifact) -> Result<(), TraceError> {
    let tmp = path.with_extension(format!("json.{}.tmp", std::process::id()));
    let result = write_file(&tmp, artifact).and_then(|()| {
        std::fs::rename(&tmp, path).map_err(|err| TraceError::io(path, err))
    });
    if result.is_err() {
        remove_partial(&tmp);
    }
    result
}

fn write_file(tmp: &Path, artifact: &Artifact) -> Result<(), TraceError> {
    let file = std::fs::File::create(tmp).map_err(|err| TraceError::io(tmp, err))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, artifact).map_err(|err| TraceError::io(tmp, err.into()))?;
    writer.flush().map_err(|err| TraceError::io(tmp, err))?;
    let file = writer
        .into_inner()
        .map_err(|err| TraceError::io(tmp, err.into_error()))?;
    file.sync_all().map_err(|err| TraceError::io(tmp, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Record;
    use crate::parser::Value;
    use crate::grammar::field_grammar;
    use crate::subsystems::THERMAL_ZONE;
    use crate::table::MalformedPolicy;
    use crate::table::assemble;
    use smallvec::smallvec;
    use std::cell::Cell;

    fn sample() -> Assembled {
        let records = vec![
            Ok(Record {
                timestamp: 0.1 + 0.2,
                values: smallvec![Value::Int(0), Value::Int(i64::MIN), Value::Int(i64::MAX)],
            }),
            Ok(Record {
                timestamp: 361.555540,
                values: smallvec![Value::Int(1), Value::Int(44000), Value::Int(45000)],
            }),
        ];
        assemble(&THERMAL_ZONE, records, MalformedPolicy::FailFast).unwrap()
    }

    field_grammar!(
        #[subsystem("load")]
        #[marker("cpu_load:")]
        #[timestamp_key("time")]
        static LOAD {
            load: Float,
            freq: Float,
        }
    );

    fn fingerprint(len: u64) -> Fingerprint {
        Fingerprint {
            len,
            modified_secs: 1_700_000_000,
            modified_nanos: 42,
        }
    }

    fn setup() -> (tempfile::TempDir, TraceDir) {
        let tmp = tempfile::tempdir().unwrap();
        let dir = TraceDir::new(tmp.path()).unwrap();
        (tmp, dir)
    }

    #[test]
    fn test_build_then_hit() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        let builds = Cell::new(0);
        let build = || {
            builds.set(builds.get() + 1);
            Ok(sample())
        };

        let first = load_or_build(&dir, &expect, CacheMode::ReadWrite, build).unwrap();
        assert_eq!(first.outcome, CacheOutcome::Built);
        assert!(artifact_path(&dir, "thermal_zone").is_file());

        let second = load_or_build(&dir, &expect, CacheMode::ReadWrite, build).unwrap();
        assert_eq!(second.outcome, CacheOutcome::Hit);
        assert_eq!(builds.get(), 1);
        // Lossless, including extreme integers and inexact floats.
        assert_eq!(first.table, second.table);
        assert_eq!(second.table.index()[0], 0.1 + 0.2);

        // No temporary files are left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, ["trace.thermal_zone.table.json"]);
    }

    #[test]
    fn test_empty_table_round_trip() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(0),
            allow_skipped: false,
        };
        let empty = || {
            Ok(Assembled {
                table: Table::empty(&THERMAL_ZONE),
                skipped: 0,
            })
        };
        load_or_build(&dir, &expect, CacheMode::ReadWrite, empty).unwrap();
        let loaded = load_or_build(&dir, &expect, CacheMode::ReadWrite, || {
            panic!("should be cached")
        })
        .unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Hit);
        assert!(loaded.table.is_empty());
        assert_eq!(loaded.table, Table::empty(&THERMAL_ZONE));
    }

    #[test]
    fn test_stale_fingerprint_rebuilds() {
        let (_tmp, dir) = setup();
        let mut expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();

        expect.source = fingerprint(11);
        let rebuilt = load_or_build(&dir, &expect, CacheMode::ReadWrite, || {
            Ok(Assembled {
                table: Table::empty(&THERMAL_ZONE),
                skipped: 0,
            })
        })
        .unwrap();
        assert_eq!(rebuilt.outcome, CacheOutcome::Rebuilt);
        assert!(rebuilt.table.is_empty());

        // The rebuilt table replaced the old artifact.
        let hit = load_or_build(&dir, &expect, CacheMode::ReadWrite, || {
            panic!("should be cached")
        })
        .unwrap();
        assert!(hit.table.is_empty());
    }

    #[test]
    fn test_corrupt_artifact_rebuilds() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        let path = artifact_path(&dir, "thermal_zone");
        std::fs::write(&path, "{\"format\": 1, \"source\": ").unwrap();
        let loaded = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Rebuilt);

        // Unknown format versions are treated the same way.
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::write(&path, text.replacen("\"format\":1", "\"format\":9", 1)).unwrap();
        let loaded = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Rebuilt);
        let loaded = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Hit);
    }

    #[test]
    fn test_skipped_lines_need_lenient_reader() {
        let (_tmp, dir) = setup();
        let mut expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: true,
        };
        let lenient = || {
            let mut assembled = sample();
            assembled.skipped = 3;
            Ok(assembled)
        };
        load_or_build(&dir, &expect, CacheMode::ReadWrite, lenient).unwrap();
        let hit = load_or_build(&dir, &expect, CacheMode::ReadWrite, lenient).unwrap();
        assert_eq!(hit.outcome, CacheOutcome::Hit);
        assert_eq!(hit.skipped, 3);

        expect.allow_skipped = false;
        let strict = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(strict.outcome, CacheOutcome::Rebuilt);
        assert_eq!(strict.skipped, 0);
    }

    #[test]
    fn test_modes() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        let loaded = load_or_build(&dir, &expect, CacheMode::Disabled, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Uncached);
        assert!(!artifact_path(&dir, "thermal_zone").exists());

        let loaded = load_or_build(&dir, &expect, CacheMode::Refresh, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Built);
        let loaded = load_or_build(&dir, &expect, CacheMode::Refresh, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Rebuilt);
    }

    #[test]
    fn test_build_error_propagates() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        let err = load_or_build(&dir, &expect, CacheMode::ReadWrite, || {
            Err(TraceError::NoSuchColumn("x".into()))
        })
        .unwrap_err();
        assert!(matches!(err, TraceError::NoSuchColumn(_)));
        assert!(!artifact_path(&dir, "thermal_zone").exists());
    }

    #[test]
    fn test_floats_round_trip_exactly() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &LOAD,
            source: fingerprint(10),
            allow_skipped: false,
        };
        let mut records = vec![Ok(Record {
            timestamp: 1159.7941207808165,
            values: smallvec![Value::Float(0.30000000000000004), Value::Float(5e-324)],
        })];
        // Values needing all 17 significant digits, where a fast but
        // approximate float parser gets the last bit wrong.
        records.extend((1..500).map(|i| {
            let x = f64::from(i);
            Ok(Record {
                timestamp: 1159.7941207808165 + x / 3.0,
                values: smallvec![Value::Float(x.sqrt() / 7.0), Value::Float(1.0 / x + 1e-17 * x)],
            })
        }));
        let built = assemble(&LOAD, records, MalformedPolicy::FailFast).unwrap();
        let expected = built.table.clone();

        load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(built)).unwrap();
        let hit = load_or_build(&dir, &expect, CacheMode::ReadWrite, || {
            panic!("should be cached")
        })
        .unwrap();
        assert_eq!(hit.outcome, CacheOutcome::Hit);

        let bits = |values: &[f64]| values.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(hit.table.index()), bits(expected.index()));
        for name in ["load", "freq"] {
            assert_eq!(
                bits(hit.table.column(name).unwrap().as_floats().unwrap()),
                bits(expected.column(name).unwrap().as_floats().unwrap()),
                "column {name}"
            );
        }
        assert_eq!(hit.table, expected);
    }

    #[test]
    fn test_write_failure_still_returns_table() {
        let (_tmp, dir) = setup();
        let expect = Expect {
            grammar: &THERMAL_ZONE,
            source: fingerprint(10),
            allow_skipped: false,
        };
        // A directory in place of the artifact can be neither read nor
        // replaced by a rename.
        let path = artifact_path(&dir, "thermal_zone");
        std::fs::create_dir(&path).unwrap();

        let loaded = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(loaded.outcome, CacheOutcome::Rebuilt);
        assert_eq!(loaded.table, sample().table);
        assert_eq!(loaded.skipped, 0);
        assert!(path.is_dir());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");

        // Every later call builds again, none of them fail.
        let again = load_or_build(&dir, &expect, CacheMode::ReadWrite, || Ok(sample())).unwrap();
        assert_eq!(again.outcome, CacheOutcome::Rebuilt);
    }
}
