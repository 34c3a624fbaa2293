//! Partition router for the day-of-month history segments.
//!
//! History rows never land in the `device_history` parent directly. Each row
//! is placed into one of 31 physical segments chosen by the day-of-month of
//! its timestamp. A segment behaves as a lazily self-recycling circular
//! buffer: on the first write of a new monthly cycle the whole segment is
//! truncated before the row lands. There is no background sweep, so segments
//! for days 29-31 keep their contents an extra cycle in months lacking those
//! days.

use anyhow::Result;
use chrono::{DateTime, Datelike, Months, NaiveTime, TimeZone, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;

use crate::models::HistoryRecord;

// ---

/// Number of provisioned history segments, one per day of month.
pub const SEGMENT_COUNT: u32 = 31;

/// Physical table name of the segment holding `day` (1-31).
pub fn segment_table(day: u32) -> String {
    // ---
    format!("device_history_d{day:02}")
}

/// Whether a segment whose oldest record is `oldest` must be recycled before
/// a row stamped `incoming` may land.
///
/// The recycle boundary is the oldest record's timestamp one month later,
/// truncated to day granularity; an incoming timestamp strictly past that
/// boundary starts a new cycle. Month addition clamps at month end
/// (Jan 31 + 1 month = Feb 28), like the SQL interval arithmetic it
/// replaces.
pub fn cycle_expired(oldest: DateTime<Utc>, incoming: DateTime<Utc>) -> bool {
    // ---
    let boundary_date = (oldest + Months::new(1)).date_naive();
    let boundary = Utc.from_utc_datetime(&boundary_date.and_time(NaiveTime::MIN));
    incoming > boundary
}

// ---

/// Owns the fixed day-of-month mapping and serializes destructive recycling
/// against concurrent inserts into the same segment.
pub struct PartitionRouter {
    // ---
    pool: PgPool,
    /// One async lock per segment; recycling must be strictly sequenced
    /// before the triggering insert, so both happen under the same guard.
    segment_locks: Vec<Mutex<()>>,
}

impl PartitionRouter {
    // ---
    pub fn new(pool: PgPool) -> PartitionRouter {
        // ---
        PartitionRouter {
            pool,
            segment_locks: (0..SEGMENT_COUNT).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Append one history row into its day segment, recycling the segment
    /// first if its oldest record is a full cycle stale.
    pub async fn insert(&self, record: &HistoryRecord) -> Result<()> {
        // ---
        let day = record.create_time.day();
        let table = segment_table(day);

        let _guard = self.segment_locks[(day - 1) as usize].lock().await;

        let oldest: Option<DateTime<Utc>> =
            sqlx::query_scalar(&format!("SELECT MIN(create_time) FROM {table}"))
                .fetch_one(&self.pool)
                .await?;

        if let Some(oldest) = oldest {
            if cycle_expired(oldest, record.create_time) {
                tracing::info!(
                    "Recycling history segment {} (oldest record {})",
                    table,
                    oldest
                );
                sqlx::query(&format!("TRUNCATE {table}"))
                    .execute(&self.pool)
                    .await?;
            }
        }

        sqlx::query(&format!(
            r#"
            INSERT INTO {table} (
                device_id, create_time, location_lat, location_long,
                energy_solar, lux_solar, capacity_battery, charge_battery,
                output_battery, voltage_battery, plug_1_on, plug_2_on, state
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        ))
        .bind(&record.device_id)
        .bind(record.create_time)
        .bind(record.location_lat)
        .bind(record.location_long)
        .bind(record.energy_solar)
        .bind(record.lux_solar)
        .bind(record.capacity_battery)
        .bind(record.charge_battery)
        .bind(record.output_battery)
        .bind(record.voltage_battery)
        .bind(record.plug_1_on)
        .bind(record.plug_2_on)
        .bind(&record.state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
