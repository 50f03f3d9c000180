//! Declarative description of the line format of one subsystem.
//!
//! A [`FieldGrammar`] says which marker identifies the events of a subsystem,
//! where the timestamp lives and which `key=value` fields to pick up (in
//! column order). Grammars are normally declared with [`field_grammar!`],
//! see [`crate::subsystems`].

/// How a textual value is turned into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Caster {
    Int,
    Float,
}

/// Where the timestamp of an event line comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    /// The `<secs>.<usecs>:` field in the line header, as printed by
    /// `trace-cmd report`.
    Header,
    /// A `key=<secs>` token in the payload.
    Key(&'static str),
}

/// One field picked out of an event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Column name in the assembled table.
    pub name: &'static str,
    /// Key looked up in the payload. Usually the same as `name`.
    pub key: &'static str,
    pub caster: Caster,
}

/// The fixed, ordered field layout of one subsystem's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldGrammar {
    /// Subsystem name, also used to key the cache artifact.
    pub subsystem: &'static str,
    /// Substring identifying matching event lines, e.g.
    /// `thermal_power_allocator:`.
    pub marker: &'static str,
    pub timestamp: TimestampSource,
    pub fields: &'static [FieldSpec],
}

impl FieldGrammar {
    /// Column names, in table order.
    pub fn column_names(&self) -> impl ExactSizeIterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }

    /// Look up the field producing the column `name`.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Declare a `static` [`FieldGrammar`].
///
/// ```ignore
/// field_grammar!(
///     #[subsystem("thermal_zone")]
///     #[marker("thermal_temperature:")]
///     pub static THERMAL_ZONE {
///         zone_id: Int = "id",
///         temp: Int,
///     }
/// );
/// ```
///
/// An optional `#[timestamp_key("time")]` attribute after `marker` takes the
/// timestamp from a payload token instead of the line header.
#[doc(hidden)]
#[macro_export]
macro_rules! field_grammar {
    (
        #[subsystem($subsystem:literal)]
        #[marker($marker:literal)]
        $(#[timestamp_key($ts_key:literal)])?
        $vis:vis static $name:ident { $($field:ident: $caster:ident $(= $key:literal)?,)* }
    ) => {
        $vis static $name: $crate::grammar::FieldGrammar = $crate::grammar::FieldGrammar {
            subsystem: $subsystem,
            marker: $marker,
            timestamp: $crate::field_grammar!(@timestamp $($ts_key)?),
            fields: &[
                $(
                    $crate::grammar::FieldSpec {
                        name: stringify!($field),
                        key: $crate::field_grammar!(@key $field $($key)?),
                        caster: $crate::grammar::Caster::$caster,
                    },
                )*
            ],
        };
    };
    (@timestamp) => {
        $crate::grammar::TimestampSource::Header
    };
    (@timestamp $ts_key:literal) => {
        $crate::grammar::TimestampSource::Key($ts_key)
    };
    (@key $field:ident) => {
        stringify!($field)
    };
    (@key $field:ident $key:literal) => {
        $key
    };
}

#[doc(inline)]
pub use field_grammar;
