//! Column-oriented, time-indexed tables and their assembly from records.

use crate::error::TraceError;
use crate::grammar::Caster;
use crate::grammar::FieldGrammar;
use crate::parser::Record;
use crate::parser::Value;
use compact_str::CompactString;
use serde_derive::Deserialize;
use serde_derive::Serialize;

/// Values of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "values", rename_all = "lowercase")]
pub enum Column {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

impl Column {
    fn empty(caster: Caster) -> Self {
        match caster {
            Caster::Int => Self::Int(Vec::new()),
            Caster::Float => Self::Float(Vec::new()),
        }
    }

    pub fn caster(&self) -> Caster {
        match self {
            Self::Int(_) => Caster::Int,
            Self::Float(_) => Caster::Float,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> Option<Value> {
        match self {
            Self::Int(v) => v.get(row).copied().map(Value::Int),
            Self::Float(v) => v.get(row).copied().map(Value::Float),
        }
    }

    /// The values, widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            Self::Int(v) => v.iter().map(|&x| Value::Int(x).as_f64()).collect(),
            Self::Float(v) => v.clone(),
        }
    }

    pub fn as_ints(&self) -> Option<&[i64]> {
        match self {
            Self::Int(v) => Some(v),
            Self::Float(_) => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f64]> {
        match self {
            Self::Float(v) => Some(v),
            Self::Int(_) => None,
        }
    }

    /// Callers check the value type first, see [`Table::push`].
    fn push(&mut self, value: Value) {
        match (self, value) {
            (Self::Int(v), Value::Int(x)) => v.push(x),
            (Self::Float(v), Value::Float(x)) => v.push(x),
            _ => {}
        }
    }
}

/// A column together with its name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedColumn {
    pub name: CompactString,
    pub data: Column,
}

/// Time-indexed table for one subsystem.
///
/// The timestamps form the index, they are not a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    subsystem: CompactString,
    index: Vec<f64>,
    columns: Vec<NamedColumn>,
}

impl Table {
    /// A zero-row table with the columns declared by `grammar`.
    pub fn empty(grammar: &FieldGrammar) -> Self {
        Self {
            subsystem: grammar.subsystem.into(),
            index: Vec::new(),
            columns: grammar
                .fields
                .iter()
                .map(|field| NamedColumn {
                    name: field.name.into(),
                    data: Column::empty(field.caster),
                })
                .collect(),
        }
    }

    /// Append one row. The record is checked against the columns before
    /// anything is pushed, so a rejected record leaves the table unchanged.
    fn push(&mut self, record: Record) -> Result<(), TraceError> {
        if record.values.len() != self.columns.len() {
            return Err(self.invalid(format!(
                "{} values for {} columns",
                record.values.len(),
                self.columns.len()
            )));
        }
        if let Some((column, value)) = self
            .columns
            .iter()
            .zip(&record.values)
            .find(|(column, value)| column.data.caster() != value.caster())
        {
            return Err(self.invalid(format!(
                "{value:?} given for {:?} column `{}`",
                column.data.caster(),
                column.name
            )));
        }
        self.index.push(record.timestamp);
        for (column, value) in self.columns.iter_mut().zip(record.values) {
            column.data.push(value);
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> TraceError {
        TraceError::InvalidRecord {
            subsystem: self.subsystem.clone(),
            reason,
        }
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Timestamps in seconds, one per row.
    pub fn index(&self) -> &[f64] {
        &self.index
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn columns(&self) -> &[NamedColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.name == name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, TraceError> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.data)
            .ok_or_else(|| TraceError::NoSuchColumn(name.into()))
    }

    /// Values of one row, in column order.
    pub fn row(&self, row: usize) -> Option<Vec<Value>> {
        if row >= self.len() {
            return None;
        }
        self.columns.iter().map(|column| column.data.get(row)).collect()
    }

    /// A new table with only the named columns, in the order given.
    pub fn select(&self, names: &[&str]) -> Result<Self, TraceError> {
        let columns = names
            .iter()
            .map(|&name| {
                self.column(name).map(|data| NamedColumn {
                    name: name.into(),
                    data: data.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            subsystem: self.subsystem.clone(),
            index: self.index.clone(),
            columns,
        })
    }

    /// Check that this table has exactly the columns `grammar` declares.
    pub fn matches(&self, grammar: &FieldGrammar) -> bool {
        self.subsystem == grammar.subsystem
            && self.columns.len() == grammar.fields.len()
            && self
                .columns
                .iter()
                .zip(grammar.fields)
                .all(|(column, field)| {
                    column.name == field.name
                        && column.data.caster() == field.caster
                        && column.data.len() == self.index.len()
                })
    }
}

/// What to do with lines that carry the marker but fail to parse.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum MalformedPolicy {
    /// Abort on the first malformed line.
    #[default]
    FailFast,
    /// Skip malformed lines, counting them.
    Skip,
}

/// Result of [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub table: Table,
    /// Malformed lines dropped under [`MalformedPolicy::Skip`].
    pub skipped: usize,
}

/// Build a table from a lazy sequence of records in a single pass.
pub fn assemble<I>(
    grammar: &FieldGrammar,
    records: I,
    policy: MalformedPolicy,
) -> Result<Assembled, TraceError>
where
    I: IntoIterator<Item = Result<Record, TraceError>>,
{
    let mut table = Table::empty(grammar);
    let mut skipped = 0;
    for record in records {
        match record {
            Ok(record) => table.push(record)?,
            Err(TraceError::MalformedLine(err)) if policy == MalformedPolicy::Skip => {
                log::debug!("Skipping: {err}");
                skipped += 1;
            }
            Err(err) => return Err(err),
        }
    }
    if skipped > 0 {
        log::warn!(
            "Skipped {skipped} malformed {} lines, the table is incomplete",
            grammar.subsystem
        );
    }
    Ok(Assembled { table, skipped })
}
