use chrono::{Duration, NaiveDate};
use serde_json::{json, Map, Value};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use crate::{
    db::tenant::TrendDataset,
    error::{is_foreign_key_violation, ApiError},
    models::trend::{MetricColumn, NewTrendRow, TrendQueryParams},
    services::policy::RegionScope,
};

pub const DEFAULT_LIMIT: i64 = 1_000;
pub const MAX_LIMIT: i64 = 10_000;
pub const MAX_BATCH_ROWS: usize = 10_000;

/// Rows per INSERT statement; keeps binds under the Postgres limit.
const INSERT_CHUNK: usize = 1_000;

/// A fully validated read request.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendFilter {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub metrics: Vec<MetricColumn>,
    pub regions: RegionScope,
    pub limit: i64,
    pub offset: i64,
}

impl TrendFilter {
    /// Validate query parameters against the caller's region scope.
    /// Nothing here touches the database.
    pub fn from_params(
        params: &TrendQueryParams,
        scope: RegionScope,
        today: NaiveDate,
    ) -> Result<Self, ApiError> {
        let (start, end) = parse_date_range(params.date_range.as_deref(), today)?;
        let metrics = parse_metrics(params.metrics.as_deref())?;
        let requested = parse_id_list(params.lga_ids.as_deref(), "lga_ids")?;
        let regions = scope.narrow(requested)?;

        let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(ApiError::validation(format!("limit must be between 1 and {MAX_LIMIT}")));
        }
        let offset = params.offset.unwrap_or(0);
        if offset < 0 {
            return Err(ApiError::validation("offset must not be negative"));
        }

        Ok(Self { start, end, metrics, regions, limit, offset })
    }
}

/// Parse `start,end`. Absent means the year ending today.
pub fn parse_date_range(raw: Option<&str>, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ApiError> {
    let Some(raw) = raw else {
        return Ok((today - Duration::days(365), today));
    };

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(ApiError::validation(
            "date_range must contain exactly two dates: start,end",
        ));
    }

    let parse = |s: &str| {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| ApiError::validation(format!("Invalid date '{s}', expected YYYY-MM-DD")))
    };
    let start = parse(parts[0])?;
    let end = parse(parts[1])?;
    if start > end {
        return Err(ApiError::validation("date_range start must not be after end"));
    }
    Ok((start, end))
}

/// Parse a comma-separated metric list. Absent means every metric.
pub fn parse_metrics(raw: Option<&str>) -> Result<Vec<MetricColumn>, ApiError> {
    let Some(raw) = raw else {
        return Ok(MetricColumn::ALL.to_vec());
    };

    let mut metrics = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let metric: MetricColumn = name
            .parse()
            .map_err(|_| ApiError::validation(format!("Unknown metric '{name}'")))?;
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    if metrics.is_empty() {
        return Err(ApiError::validation("metrics must name at least one metric"));
    }
    Ok(metrics)
}

pub fn parse_id_list(raw: Option<&str>, field: &str) -> Result<Option<Vec<i64>>, ApiError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let ids = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::validation(format!("{field} must be a list of integers")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Err(ApiError::validation(format!("{field} must not be empty")));
    }
    Ok(Some(ids))
}

/// Assemble the read query for one dataset.
pub fn build_select(dataset: &TrendDataset, filter: &TrendFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT t.id, t.date, t.region_id, l.name AS region_name");
    for metric in &filter.metrics {
        qb.push(", t.").push(metric.as_str());
    }
    qb.push(" FROM trends t JOIN lgas l ON l.id = t.region_id WHERE t.dataset_key = ")
        .push_bind(dataset.key())
        .push(" AND t.date BETWEEN ")
        .push_bind(filter.start)
        .push(" AND ")
        .push_bind(filter.end);

    if let RegionScope::Only(ids) = &filter.regions {
        qb.push(" AND t.region_id = ANY(").push_bind(ids.clone()).push(")");
    }

    qb.push(" ORDER BY t.date, t.region_id, t.id LIMIT ")
        .push_bind(filter.limit)
        .push(" OFFSET ")
        .push_bind(filter.offset);
    qb
}

pub struct TrendService;

impl TrendService {
    /// Run a read. An empty result is a valid empty list.
    pub async fn fetch(
        pool: &PgPool,
        dataset: &TrendDataset,
        filter: &TrendFilter,
    ) -> Result<Vec<Value>, ApiError> {
        let rows = build_select(dataset, filter).build().fetch_all(pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let mut obj = Map::new();
            obj.insert("id".into(), json!(row.try_get::<i64, _>("id")?));
            obj.insert("date".into(), json!(row.try_get::<NaiveDate, _>("date")?.to_string()));
            obj.insert("region_id".into(), json!(row.try_get::<i64, _>("region_id")?));
            obj.insert("region_name".into(), json!(row.try_get::<String, _>("region_name")?));
            for metric in &filter.metrics {
                let value: Option<f64> = row.try_get(metric.as_str())?;
                obj.insert(metric.as_str().into(), json!(value));
            }
            results.push(Value::Object(obj));
        }
        Ok(results)
    }

    /// Validate a whole upload. One bad row rejects the batch.
    pub fn validate_batch(rows: &[Map<String, Value>]) -> Result<Vec<NewTrendRow>, ApiError> {
        if rows.is_empty() {
            return Err(ApiError::validation("rows must contain at least one row"));
        }
        if rows.len() > MAX_BATCH_ROWS {
            return Err(ApiError::validation(format!("at most {MAX_BATCH_ROWS} rows per upload")));
        }
        rows.iter()
            .enumerate()
            .map(|(i, row)| validate_row(row).map_err(|msg| ApiError::validation(format!("rows[{i}]: {msg}"))))
            .collect()
    }

    /// Insert a validated batch inside one transaction.
    pub async fn insert_batch(
        pool: &PgPool,
        dataset: &TrendDataset,
        rows: &[NewTrendRow],
    ) -> Result<u64, ApiError> {
        let key = dataset.key();
        let mut tx = pool.begin().await?;
        let mut inserted = 0;

        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO trends (dataset_key, date, region_id, average_daily_rate, occupancy_rate, \
                 average_length_of_stay, average_booking_window) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(key.clone())
                    .push_bind(row.date)
                    .push_bind(row.region_id)
                    .push_bind(row.average_daily_rate)
                    .push_bind(row.occupancy_rate)
                    .push_bind(row.average_length_of_stay)
                    .push_bind(row.average_booking_window);
            });

            let result = qb.build().execute(&mut *tx).await.map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ApiError::validation("rows reference an unknown region_id")
                } else {
                    ApiError::Storage(e)
                }
            })?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub fn validate_delete_ids(ids: &[i64]) -> Result<(), ApiError> {
        if ids.is_empty() {
            return Err(ApiError::validation("ids must contain at least one id"));
        }
        if ids.iter().any(|id| *id <= 0) {
            return Err(ApiError::validation("ids must be positive integers"));
        }
        Ok(())
    }

    /// Delete rows by id. The dataset key and region scope bound what can match,
    /// so ids from another tenant simply do not exist here.
    pub async fn delete_by_ids(
        pool: &PgPool,
        dataset: &TrendDataset,
        scope: &RegionScope,
        ids: &[i64],
    ) -> Result<u64, ApiError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("DELETE FROM trends WHERE dataset_key = ");
        qb.push_bind(dataset.key())
            .push(" AND id = ANY(")
            .push_bind(ids.to_vec())
            .push(")");
        if let RegionScope::Only(regions) = scope {
            qb.push(" AND region_id = ANY(").push_bind(regions.clone()).push(")");
        }
        let result = qb.build().execute(pool).await?;
        Ok(result.rows_affected())
    }
}

fn validate_row(row: &Map<String, Value>) -> Result<NewTrendRow, String> {
    for key in row.keys() {
        if key != "date" && key != "region_id" && key.parse::<MetricColumn>().is_err() {
            return Err(format!("unknown field '{key}'"));
        }
    }

    let date = match row.get("date") {
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| format!("invalid date '{s}', expected YYYY-MM-DD"))?,
        Some(_) => return Err("date must be a string".into()),
        None => return Err("missing date".into()),
    };

    let region_id = match row.get("region_id") {
        Some(v) => v.as_i64().ok_or("region_id must be an integer")?,
        None => return Err("missing region_id".into()),
    };

    let metric = |column: MetricColumn| -> Result<Option<f64>, String> {
        match row.get(column.as_str()) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or_else(|| format!("{} is not a finite number", column.as_str())),
            Some(_) => Err(format!("{} must be a number", column.as_str())),
        }
    };

    let parsed = NewTrendRow {
        date,
        region_id,
        average_daily_rate: metric(MetricColumn::AverageDailyRate)?,
        occupancy_rate: metric(MetricColumn::OccupancyRate)?,
        average_length_of_stay: metric(MetricColumn::AverageLengthOfStay)?,
        average_booking_window: metric(MetricColumn::AverageBookingWindow)?,
    };

    if MetricColumn::ALL.iter().all(|m| parsed.metric(*m).is_none()) {
        return Err("at least one metric value is required".into());
    }
    Ok(parsed)
}
