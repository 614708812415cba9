//! Line-chart response document for zonal time series.
//!
//! ```json
//! [{ "xAxis": {"data": ["2019-06-01 00:00", ...]},
//!    "yAxis": {"type": "value"},
//!    "series": [{"name": "...", "data": [1.2, "-", ...], "type": "line"}] }]
//! ```

use chrono::{Months, NaiveDate};
use serde::{Serialize, Serializer};

use crate::config::DisplayWindow;
use crate::error::{Error, Result, Stage};
use crate::zonal::ZonalSeries;

/// Timestamp format of the x axis.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Placeholder written for a step without data.
pub const NO_DATA: &str = "-";

/// One y value; serialized as a number or the `"-"` sentinel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChartValue {
    Value(f64),
    NoData,
}

impl From<Option<f64>> for ChartValue {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(x) if x.is_finite() => ChartValue::Value(x),
            _ => ChartValue::NoData,
        }
    }
}

impl Serialize for ChartValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ChartValue::Value(x) => serializer.serialize_f64(*x),
            ChartValue::NoData => serializer.serialize_str(NO_DATA),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct XAxis {
    pub data: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YAxis {
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<ChartValue>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub x_axis: XAxis,
    pub y_axis: YAxis,
    pub series: Vec<ChartSeries>,
}

/// Inclusive date range covered by `window`.
pub fn window_range(window: &DisplayWindow) -> Result<(NaiveDate, NaiveDate)> {
    let end = window
        .years
        .checked_mul(12)
        .and_then(|m| window.start.checked_add_months(Months::new(m)))
        .ok_or_else(|| Error::configuration(Stage::Aggregation, "display window is out of the calendar range"))?;
    Ok((window.start, end))
}

impl Chart {
    /// Build a line chart from series that share one time axis, keeping the
    /// steps that fall inside `window`.
    pub fn line(series: &[ZonalSeries], window: &DisplayWindow) -> Result<Self> {
        let (from, to) = window_range(window)?;
        let axis: &[NaiveDate] = series.first().map(|s| s.timestamps.as_slice()).unwrap_or(&[]);
        for s in series {
            if s.timestamps != axis || s.values.len() != axis.len() {
                return Err(Error::computation(
                    Stage::Aggregation,
                    format!("series '{}' does not share the time axis", s.name),
                ));
            }
        }
        let keep: Vec<usize> = axis
            .iter()
            .enumerate()
            .filter(|(_, d)| **d >= from && **d <= to)
            .map(|(i, _)| i)
            .collect();

        Ok(Self {
            x_axis: XAxis {
                data: keep.iter().map(|&i| format_timestamp(axis[i])).collect(),
            },
            y_axis: YAxis { kind: "value" },
            series: series
                .iter()
                .map(|s| ChartSeries {
                    name: s.name.clone(),
                    data: keep.iter().map(|&i| s.values[i].into()).collect(),
                    kind: "line",
                })
                .collect(),
        })
    }
}

pub fn format_timestamp(date: NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, 6, 1).unwrap()
    }

    fn series(name: &str, values: Vec<Option<f64>>) -> ZonalSeries {
        ZonalSeries { name: name.to_string(), timestamps: (2018..2018 + values.len() as i32).map(d).collect(), values }
    }

    #[test]
    fn serializes_response_shape_with_sentinel() {
        let window = DisplayWindow { start: d(2018), years: 10 };
        let chart = Chart::line(&[series("dike", vec![Some(1.5), None])], &window).unwrap();
        assert_eq!(
            serde_json::to_value(vec![chart]).unwrap(),
            json!([{
                "xAxis": {"data": ["2018-06-01 00:00", "2019-06-01 00:00"]},
                "yAxis": {"type": "value"},
                "series": [{"name": "dike", "data": [1.5, "-"], "type": "line"}]
            }])
        );
    }

    #[test]
    fn display_window_is_inclusive() {
        let window = DisplayWindow { start: d(2019), years: 2 };
        let s = series("a", vec![Some(0.0), Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        let chart = Chart::line(&[s], &window).unwrap();
        assert_eq!(chart.x_axis.data, vec!["2019-06-01 00:00", "2020-06-01 00:00", "2021-06-01 00:00"]);
        assert_eq!(chart.series[0].data, vec![ChartValue::Value(1.0), ChartValue::Value(2.0), ChartValue::Value(3.0)]);
        assert_eq!(chart.series[0].data.len(), chart.x_axis.data.len());
    }

    #[test]
    fn nan_becomes_no_data() {
        assert_eq!(ChartValue::from(Some(f64::NAN)), ChartValue::NoData);
    }

    #[test]
    fn mismatched_axes_are_rejected() {
        let window = DisplayWindow::default();
        let a = series("a", vec![Some(1.0), Some(2.0)]);
        let b = series("b", vec![Some(1.0)]);
        assert!(Chart::line(&[a, b], &window).is_err());
    }
}
