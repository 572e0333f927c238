use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Numeric metric columns carried by every trend dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricColumn {
    AverageDailyRate,
    OccupancyRate,
    AverageLengthOfStay,
    AverageBookingWindow,
}

impl MetricColumn {
    pub const ALL: [MetricColumn; 4] = [
        MetricColumn::AverageDailyRate,
        MetricColumn::OccupancyRate,
        MetricColumn::AverageLengthOfStay,
        MetricColumn::AverageBookingWindow,
    ];

    /// Column name. Only these literals are ever spliced into SQL.
    pub fn as_str(self) -> &'static str {
        match self {
            MetricColumn::AverageDailyRate => "average_daily_rate",
            MetricColumn::OccupancyRate => "occupancy_rate",
            MetricColumn::AverageLengthOfStay => "average_length_of_stay",
            MetricColumn::AverageBookingWindow => "average_booking_window",
        }
    }
}

impl std::str::FromStr for MetricColumn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricColumn::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown metric column: {s}"))
    }
}

/// Query-string parameters for trend reads.
#[derive(Debug, Default, Deserialize)]
pub struct TrendQueryParams {
    /// `start,end`, inclusive ISO dates.
    pub date_range: Option<String>,
    /// Comma-separated metric column names.
    pub metrics: Option<String>,
    /// Comma-separated region ids.
    pub lga_ids: Option<String>,
    /// Target tenant; site admin only.
    pub client_id: Option<i64>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A validated row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrendRow {
    pub date: NaiveDate,
    pub region_id: i64,
    pub average_daily_rate: Option<f64>,
    pub occupancy_rate: Option<f64>,
    pub average_length_of_stay: Option<f64>,
    pub average_booking_window: Option<f64>,
}

impl NewTrendRow {
    pub fn metric(&self, column: MetricColumn) -> Option<f64> {
        match column {
            MetricColumn::AverageDailyRate => self.average_daily_rate,
            MetricColumn::OccupancyRate => self.occupancy_rate,
            MetricColumn::AverageLengthOfStay => self.average_length_of_stay,
            MetricColumn::AverageBookingWindow => self.average_booking_window,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InsertTrendsRequest {
    pub rows: Vec<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTrendsRequest {
    pub ids: Vec<i64>,
}
