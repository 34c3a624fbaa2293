//! Read-side aggregation over history and the monthly rollup table.
//!
//! Bucketed mode fetches a device's history once through the segment parent
//! and does the granularity truncation and averaging in one pass here, so the
//! range policies are plain code instead of templated SQL. Monthly-detail
//! mode serves the pre-aggregated `device_monthly` rows untouched.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

use crate::models::{DeviceState, Granularity, HistoryRecord, MonthlyAggregate};

// ---

/// One aggregation bucket of the bucketed read mode.
#[derive(Debug, Clone, Serialize)]
pub struct TimeBucket {
    // ---
    pub bucket_time: DateTime<Utc>,
    pub entries: u64,
    pub output_battery_avg: f64,
    pub lux_solar_avg: f64,
    pub voltage_battery_avg: f64,
    pub energy_solar_avg: f64,
    pub charge_battery_avg: f64,
}

#[derive(Debug, Default)]
struct BucketAccum {
    // ---
    count: u64,
    output_battery: f64,
    lux_solar: f64,
    voltage_battery: f64,
    energy_solar: f64,
    charge_battery: f64,
}

impl BucketAccum {
    // ---
    fn observe(&mut self, record: &HistoryRecord) {
        // ---
        self.count += 1;
        self.output_battery += record.output_battery;
        self.lux_solar += record.lux_solar;
        self.voltage_battery += record.voltage_battery;
        self.energy_solar += record.energy_solar;
        self.charge_battery += record.charge_battery;
    }

    fn into_bucket(self, bucket_time: DateTime<Utc>) -> TimeBucket {
        // ---
        let n = self.count as f64;
        TimeBucket {
            bucket_time,
            entries: self.count,
            output_battery_avg: self.output_battery / n,
            lux_solar_avg: self.lux_solar / n,
            voltage_battery_avg: self.voltage_battery / n,
            energy_solar_avg: self.energy_solar / n,
            charge_battery_avg: self.charge_battery / n,
        }
    }
}

/// Fold records into granularity buckets and apply the range policy.
///
/// Every record is truncated to the start of its granularity unit first, and
/// the bounds are applied to the resulting bucket keys: without `start` the
/// range is unbounded below and strictly below `end`; with `start` it is the
/// closed `[truncate(start), end]`, so a mid-bucket start still covers its
/// whole bucket. Output is ascending by bucket time.
pub fn bucketize(
    records: &[HistoryRecord],
    granularity: Granularity,
    start: Option<DateTime<Utc>>,
    end: DateTime<Utc>,
) -> Vec<TimeBucket> {
    // ---
    let mut buckets: BTreeMap<DateTime<Utc>, BucketAccum> = BTreeMap::new();
    for record in records {
        buckets
            .entry(granularity.truncate(record.create_time))
            .or_default()
            .observe(record);
    }

    let lower = start.map(|s| granularity.truncate(s));
    buckets
        .into_iter()
        .filter(|(bucket_time, _)| match lower {
            None => *bucket_time < end,
            Some(lower) => lower <= *bucket_time && *bucket_time <= end,
        })
        .map(|(bucket_time, accum)| accum.into_bucket(bucket_time))
        .collect()
}

// ---

/// Bucketed read mode: granularity-truncated per-bucket count and means for
/// one device. `end` defaults to now.
pub async fn bucketed_query(
    pool: &PgPool,
    device_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    granularity: Granularity,
) -> Result<Vec<TimeBucket>> {
    // ---
    let records: Vec<HistoryRecord> = sqlx::query_as(
        r#"
        SELECT device_id, create_time, location_lat, location_long,
               energy_solar, lux_solar, capacity_battery, charge_battery,
               output_battery, voltage_battery, plug_1_on, plug_2_on, state
        FROM device_history
        WHERE device_id = $1
        ORDER BY create_time
        "#,
    )
    .bind(device_id)
    .fetch_all(pool)
    .await?;

    Ok(bucketize(
        &records,
        granularity,
        start,
        end.unwrap_or_else(Utc::now),
    ))
}

/// Monthly-detail read mode: pre-aggregated rows in insertion order. Without
/// `start` the range is upper-bounded only; `end` defaults to now.
pub async fn monthly_detail(
    pool: &PgPool,
    device_id: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<Vec<MonthlyAggregate>> {
    // ---
    let end = end.unwrap_or_else(Utc::now);
    let rows: Vec<MonthlyAggregate> = match start {
        None => {
            sqlx::query_as(
                r#"
                SELECT * FROM device_monthly
                WHERE device_id = $1 AND create_time < $2
                ORDER BY id
                "#,
            )
            .bind(device_id)
            .bind(end)
            .fetch_all(pool)
            .await?
        }
        Some(start) => {
            sqlx::query_as(
                r#"
                SELECT * FROM device_monthly
                WHERE device_id = $1 AND create_time BETWEEN $2 AND $3
                ORDER BY id
                "#,
            )
            .bind(device_id)
            .bind(start)
            .bind(end)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

// ---

/// All device snapshots, optionally filtered by state, ordered by device id.
pub async fn list_devices(pool: &PgPool, state: Option<&str>) -> Result<Vec<DeviceState>> {
    // ---
    let rows: Vec<DeviceState> = match state {
        None => {
            sqlx::query_as("SELECT * FROM device_state ORDER BY device_id")
                .fetch_all(pool)
                .await?
        }
        Some(state) => {
            sqlx::query_as("SELECT * FROM device_state WHERE state = $1 ORDER BY device_id")
                .bind(state)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(rows)
}

/// Device snapshots whose last reported position falls inside the bounding
/// box spanned by the bottom-left and top-right corners (both inclusive).
pub async fn devices_in_bounds(
    pool: &PgPool,
    bottom_left_lat: f64,
    top_right_lat: f64,
    bottom_left_long: f64,
    top_right_long: f64,
) -> Result<Vec<DeviceState>> {
    // ---
    let rows: Vec<DeviceState> = sqlx::query_as(
        r#"
        SELECT * FROM device_state
        WHERE location_lat BETWEEN $1 AND $2
          AND location_long BETWEEN $3 AND $4
        ORDER BY device_id
        "#,
    )
    .bind(bottom_left_lat)
    .bind(top_right_lat)
    .bind(bottom_left_long)
    .bind(top_right_long)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// One device snapshot, or `None` if the device has never reported.
pub async fn device_by_id(pool: &PgPool, device_id: &str) -> Result<Option<DeviceState>> {
    // ---
    let row = sqlx::query_as("SELECT * FROM device_state WHERE device_id = $1")
        .bind(device_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::TimeZone;

    fn record(ts: DateTime<Utc>, output: f64, lux: f64) -> HistoryRecord {
        // ---
        HistoryRecord {
            device_id: "sol-0042".to_string(),
            create_time: ts,
            location_lat: 61.5,
            location_long: 23.8,
            energy_solar: 10.0,
            lux_solar: lux,
            capacity_battery: 5000,
            charge_battery: 80.0,
            output_battery: output,
            voltage_battery: 12.0,
            plug_1_on: true,
            plug_2_on: true,
            state: "Operational".to_string(),
        }
    }

    #[test]
    fn test_buckets_average_and_count() {
        // ---
        let base = Utc.with_ymd_and_hms(2026, 8, 14, 9, 0, 0).unwrap();
        let records = vec![
            record(base, 2.0, 30000.0),
            record(base + chrono::Duration::seconds(20), 4.0, 34000.0),
            record(base + chrono::Duration::minutes(1), 6.0, 38000.0),
        ];

        let end = Utc.with_ymd_and_hms(2026, 8, 15, 0, 0, 0).unwrap();
        let buckets = bucketize(&records, Granularity::Minute, None, end);

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_time, base);
        assert_eq!(buckets[0].entries, 2);
        assert_eq!(buckets[0].output_battery_avg, 3.0);
        assert_eq!(buckets[0].lux_solar_avg, 32000.0);
        assert_eq!(buckets[1].entries, 1);
        assert_eq!(buckets[1].output_battery_avg, 6.0);
    }

    #[test]
    fn test_buckets_are_ascending() {
        // ---
        let day1 = Utc.with_ymd_and_hms(2026, 8, 12, 10, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 8, 13, 10, 0, 0).unwrap();
        // Out-of-order input still produces ascending buckets.
        let records = vec![record(day2, 1.0, 1.0), record(day1, 1.0, 1.0)];

        let end = Utc.with_ymd_and_hms(2026, 8, 20, 0, 0, 0).unwrap();
        let buckets = bucketize(&records, Granularity::Day, None, end);

        assert_eq!(buckets.len(), 2);
        assert!(buckets[0].bucket_time < buckets[1].bucket_time);
    }

    #[test]
    fn test_open_start_is_strictly_below_end() {
        // ---
        let records = vec![
            record(Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap(), 1.0, 1.0),
            record(Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap(), 1.0, 1.0),
        ];

        // End falls exactly on the second bucket's key; without a start bound
        // that bucket is excluded.
        let end = Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap();
        let buckets = bucketize(&records, Granularity::Day, None, end);

        assert_eq!(buckets.len(), 1);
        assert_eq!(
            buckets[0].bucket_time,
            Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_mid_bucket_start_includes_whole_bucket() {
        // ---
        let records = vec![record(
            Utc.with_ymd_and_hms(2026, 8, 12, 9, 5, 0).unwrap(),
            1.0,
            1.0,
        )];

        // Start is later in the hour than the only sample, but the truncated
        // lower bound pulls the whole 09:00 bucket in.
        let start = Utc.with_ymd_and_hms(2026, 8, 12, 9, 45, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 12, 12, 0, 0).unwrap();
        let buckets = bucketize(&records, Granularity::Hour, Some(start), end);

        assert_eq!(buckets.len(), 1);
        assert_eq!(
            buckets[0].bucket_time,
            Utc.with_ymd_and_hms(2026, 8, 12, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_closed_range_includes_end_bucket() {
        // ---
        let records = vec![
            record(Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap(), 1.0, 1.0),
            record(Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap(), 1.0, 1.0),
            record(Utc.with_ymd_and_hms(2026, 8, 14, 0, 0, 0).unwrap(), 1.0, 1.0),
        ];

        let start = Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap();
        let buckets = bucketize(&records, Granularity::Day, Some(start), end);

        // With both bounds the range is closed, so the end-day bucket stays.
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bucket_time, end);
    }

    #[test]
    fn test_no_records_yields_no_buckets() {
        // ---
        let end = Utc.with_ymd_and_hms(2026, 8, 13, 0, 0, 0).unwrap();
        assert!(bucketize(&[], Granularity::Week, None, end).is_empty());
    }
}
