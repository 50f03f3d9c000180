//! Turn kernel event traces into per-subsystem, time-indexed tables.
//!
//! A [`Trace`] wraps a trace directory holding a `trace.dat` capture and/or
//! its `trace.txt` rendering. Asking it for a subsystem's [`Table`] locates
//! (or converts) the rendering, extracts the subsystem's event lines, parses
//! them by the subsystem's [`grammar::FieldGrammar`] and caches the result
//! next to the trace.

pub mod cache;
pub mod capture;
pub mod error;
pub mod export;
pub mod extract;
pub mod grammar;
pub mod locator;
pub mod parser;
pub mod subsystems;
pub mod table;
pub mod trace;
pub mod views;

pub use error::TraceError;
pub use table::Table;
pub use trace::Trace;
pub use trace::TraceOptions;
