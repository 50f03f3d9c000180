//! Delimited text export of a table.

use crate::table::Column;
use crate::table::Table;
use std::io::Write;

/// Write `table` as CSV: a `time,<columns>` header, then one line per row.
///
/// Times are printed with microsecond precision, like the text rendering
/// they were parsed from.
pub fn write_csv(table: &Table, writer: &mut impl Write) -> std::io::Result<()> {
    write!(writer, "time")?;
    for name in table.column_names() {
        write!(writer, ",{name}")?;
    }
    writeln!(writer)?;

    for (row, time) in table.index().iter().enumerate() {
        write!(writer, "{time:.6}")?;
        for column in table.columns() {
            match &column.data {
                Column::Int(values) => write!(writer, ",{}", values[row])?,
                Column::Float(values) => write!(writer, ",{}", values[row])?,
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
