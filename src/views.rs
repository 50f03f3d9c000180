//! Projections of a [`Table`] handed to plotting code.

use crate::error::TraceError;
use crate::table::Table;
use compact_str::CompactString;

/// One named column against the time index, as `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<'table> {
    pub name: CompactString,
    pub index: &'table [f64],
    pub values: Vec<f64>,
}

impl Series<'_> {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(time, value)` pairs.
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.index.iter().copied().zip(self.values.iter().copied())
    }

    /// Smallest and largest value, `None` for an empty series.
    pub fn range(&self) -> Option<(f64, f64)> {
        self.values.iter().copied().fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

/// The standard plots of the thermal subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotView {
    Temperature,
    InputPower,
    OutputPower,
}

impl PlotView {
    /// Columns plotted by this view.
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Temperature => &["currT"],
            Self::InputPower => &["Pgpu_in", "Pa7_in", "Pa15_in", "Ptot_in"],
            Self::OutputPower => &["Pgpu_out", "Pa7_out", "Pa15_out", "Ptot_out"],
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::InputPower => "Input Power",
            Self::OutputPower => "Output Power",
        }
    }
}

impl Table {
    pub fn series(&self, name: &str) -> Result<Series<'_>, TraceError> {
        let column = self.column(name)?;
        Ok(Series {
            name: name.into(),
            index: self.index(),
            values: column.to_f64(),
        })
    }

    /// The series making up `view`.
    pub fn plot_series(&self, view: PlotView) -> Result<Vec<Series<'_>>, TraceError> {
        view.columns().iter().map(|name| self.series(name)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Record;
    use crate::parser::Value;
    use crate::subsystems::THERMAL;
    use crate::subsystems::THERMAL_ZONE;
    use crate::table::MalformedPolicy;
    use crate::table::assemble;

    fn thermal_table(rows: &[(f64, i64)]) -> Table {
        let records = rows.iter().map(|&(timestamp, base)| {
            Ok(Record {
                timestamp,
                values: (0..12).map(|i| Value::Int(base + i)).collect(),
            })
        });
        assemble(&THERMAL, records, MalformedPolicy::FailFast)
            .unwrap()
            .table
    }

    #[test]
    fn test_series() {
        let table = thermal_table(&[(1.0, 0), (2.0, 100)]);
        let series = table.series("currT").unwrap();
        assert_eq!(series.values, [10.0, 110.0]);
        assert_eq!(series.points().collect::<Vec<_>>(), [(1.0, 10.0), (2.0, 110.0)]);
        assert_eq!(series.range(), Some((10.0, 110.0)));
        assert!(table.series("time").is_err());
    }

    #[test]
    fn test_plot_views() {
        let table = thermal_table(&[(1.0, 0)]);
        for view in [PlotView::Temperature, PlotView::InputPower, PlotView::OutputPower] {
            let series = table.plot_series(view).unwrap();
            assert_eq!(series.len(), view.columns().len());
        }
        let out = table.plot_series(PlotView::OutputPower).unwrap();
        assert_eq!(out[3].name, "Ptot_out");
        assert_eq!(out[3].values, [7.0]);

        let zones = Table::empty(&THERMAL_ZONE);
        assert!(matches!(
            zones.plot_series(PlotView::Temperature),
            Err(TraceError::NoSuchColumn(_))
        ));
    }

    #[test]
    fn test_empty_series() {
        let table = Table::empty(&THERMAL);
        let series = table.series("Ptot_in").unwrap();
        assert!(series.is_empty());
        assert_eq!(series.range(), None);
    }
}
