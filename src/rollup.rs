//! Nightly rollup of raw history into per-device monthly statistics.
//!
//! One scheduled invocation scans every device with current-month history and
//! materializes a `device_monthly` row per (device, month start). All
//! statistics for a device come out of a single streaming pass over its
//! month's records (`MonthStats`), so there are no repeated rescans for the
//! min/max timestamps. The upsert is idempotent: rerunning with no new
//! telemetry rewrites an identical row.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, Utc};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::models::{month_start, DeviceStatus, HistoryRecord};
use crate::Config;

// ---

/// Round to two decimals, the precision the rate columns carry.
fn round2(value: f64) -> f64 {
    // ---
    (value * 100.0).round() / 100.0
}

/// Running (value, timestamp) extremes and sum for one metric.
///
/// When several samples share an extreme value, the *latest* matching
/// timestamp wins.
#[derive(Debug, Clone, Copy)]
pub struct MetricStats {
    // ---
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub min_timestamp: DateTime<Utc>,
    pub max_timestamp: DateTime<Utc>,
}

impl MetricStats {
    // ---
    fn new(value: f64, ts: DateTime<Utc>) -> MetricStats {
        // ---
        MetricStats {
            sum: value,
            min: value,
            max: value,
            min_timestamp: ts,
            max_timestamp: ts,
        }
    }

    fn observe(&mut self, value: f64, ts: DateTime<Utc>) {
        // ---
        self.sum += value;
        if value <= self.min {
            self.min = value;
            self.min_timestamp = ts;
        }
        if value >= self.max {
            self.max = value;
            self.max_timestamp = ts;
        }
    }
}

/// One month of per-device statistics, folded record by record.
#[derive(Debug, Clone)]
pub struct MonthStats {
    // ---
    pub count: u64,
    pub operational: u64,
    pub shutdown: u64,
    pub plug_1_off: u64,
    pub plug_2_off: u64,
    pub energy_solar: MetricStats,
    pub lux_solar: MetricStats,
    pub charge_battery: MetricStats,
    pub output_battery: MetricStats,
    /// Hour-equivalent totals: each sample contributes `value / 60`.
    pub energy_solar_norm_sum: f64,
    pub output_battery_norm_sum: f64,
    /// Location of the last record seen.
    pub location_lat: f64,
    pub location_long: f64,
}

impl MonthStats {
    // ---
    /// Fold a month of records in order; `None` when there are none, so a
    /// device without current-month history produces no aggregate row.
    pub fn from_records(records: &[HistoryRecord]) -> Option<MonthStats> {
        // ---
        let (first, rest) = records.split_first()?;

        let mut stats = MonthStats {
            count: 0,
            operational: 0,
            shutdown: 0,
            plug_1_off: 0,
            plug_2_off: 0,
            energy_solar: MetricStats::new(first.energy_solar, first.create_time),
            lux_solar: MetricStats::new(first.lux_solar, first.create_time),
            charge_battery: MetricStats::new(first.charge_battery, first.create_time),
            output_battery: MetricStats::new(first.output_battery, first.create_time),
            energy_solar_norm_sum: 0.0,
            output_battery_norm_sum: 0.0,
            location_lat: first.location_lat,
            location_long: first.location_long,
        };
        stats.observe_counts(first);
        stats.energy_solar_norm_sum += first.energy_solar / 60.0;
        stats.output_battery_norm_sum += first.output_battery / 60.0;

        for record in rest {
            stats.observe_counts(record);
            stats.energy_solar.observe(record.energy_solar, record.create_time);
            stats.lux_solar.observe(record.lux_solar, record.create_time);
            stats
                .charge_battery
                .observe(record.charge_battery, record.create_time);
            stats
                .output_battery
                .observe(record.output_battery, record.create_time);
            stats.energy_solar_norm_sum += record.energy_solar / 60.0;
            stats.output_battery_norm_sum += record.output_battery / 60.0;
            stats.location_lat = record.location_lat;
            stats.location_long = record.location_long;
        }
        Some(stats)
    }

    fn observe_counts(&mut self, record: &HistoryRecord) {
        // ---
        self.count += 1;
        if record.state == DeviceStatus::Operational.as_str() {
            self.operational += 1;
        } else if record.state == DeviceStatus::Shutdown.as_str() {
            self.shutdown += 1;
        }
        if !record.plug_1_on {
            self.plug_1_off += 1;
        }
        if !record.plug_2_on {
            self.plug_2_off += 1;
        }
    }

    pub fn avg(&self, metric: &MetricStats) -> f64 {
        // ---
        metric.sum / self.count as f64
    }

    pub fn operational_rate(&self) -> f64 {
        // ---
        round2(self.operational as f64 / self.count as f64)
    }

    pub fn shutdown_rate(&self) -> f64 {
        // ---
        round2(self.shutdown as f64 / self.count as f64)
    }

    /// Derived, not independently counted; rounding drift can push it
    /// slightly negative.
    pub fn fault_rate(&self) -> f64 {
        // ---
        1.0 - self.operational_rate() - self.shutdown_rate()
    }

    pub fn plug_off_rate_1(&self) -> f64 {
        // ---
        round2(self.plug_1_off as f64 / self.count as f64)
    }

    pub fn plug_off_rate_2(&self) -> f64 {
        // ---
        round2(self.plug_2_off as f64 / self.count as f64)
    }
}

// ---

/// Time left until the next daily occurrence of `HH:MM:SS` after `now`.
pub fn until_next_trigger(
    now: NaiveDateTime,
    hour: u32,
    minute: u32,
    second: u32,
) -> std::time::Duration {
    // ---
    let trigger = NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN);
    let mut target = now.date().and_time(trigger);
    if target <= now {
        target += Duration::days(1);
    }
    (target - now).to_std().unwrap_or_default()
}

/// Scheduled batch job materializing `device_monthly` rows.
pub struct RollupEngine {
    // ---
    pool: PgPool,
    /// Overlap gate: a trigger firing while a run is still in flight is
    /// skipped, not queued.
    gate: Mutex<()>,
}

impl RollupEngine {
    // ---
    pub fn new(pool: PgPool) -> RollupEngine {
        // ---
        RollupEngine {
            pool,
            gate: Mutex::new(()),
        }
    }

    /// Daily scheduler loop at the configured local wall-clock time.
    pub async fn run_forever(self: Arc<Self>, cfg: Config) {
        // ---
        loop {
            let wait = until_next_trigger(
                chrono::Local::now().naive_local(),
                cfg.rollup_hour,
                cfg.rollup_minute,
                cfg.rollup_second,
            );
            tokio::time::sleep(wait).await;
            self.run_scheduled().await;
        }
    }

    /// One scheduled trigger: run unless a previous run still holds the
    /// gate. Errors abort the run and are not retried until the next
    /// trigger.
    pub async fn run_scheduled(&self) {
        // ---
        let Ok(_guard) = self.gate.try_lock() else {
            warn!("Monthly rollup still running, skipping this trigger");
            return;
        };
        match self.run_once().await {
            Ok(devices) => info!("Monthly rollup complete for {} device(s)", devices),
            Err(e) => error!("Monthly rollup aborted: {:#}", e),
        }
    }

    /// Roll the current month up for every device with history in it.
    /// Returns the number of devices materialized.
    pub async fn run_once(&self) -> Result<usize> {
        // ---
        self.run_for_month(month_start(Utc::now())).await
    }

    async fn run_for_month(&self, month: DateTime<Utc>) -> Result<usize> {
        // ---
        let device_ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT device_id FROM device_history WHERE create_time >= $1",
        )
        .bind(month)
        .fetch_all(&self.pool)
        .await?;

        let mut materialized = 0;
        for device_id in &device_ids {
            let records: Vec<HistoryRecord> = sqlx::query_as(
                r#"
                SELECT device_id, create_time, location_lat, location_long,
                       energy_solar, lux_solar, capacity_battery, charge_battery,
                       output_battery, voltage_battery, plug_1_on, plug_2_on, state
                FROM device_history
                WHERE device_id = $1 AND create_time >= $2
                ORDER BY create_time
                "#,
            )
            .bind(device_id)
            .bind(month)
            .fetch_all(&self.pool)
            .await?;

            // Live ingestion may race the DISTINCT scan above; a device that
            // lost its month rows in between simply yields nothing.
            if let Some(stats) = MonthStats::from_records(&records) {
                self.upsert_monthly(device_id, month, &stats).await?;
                materialized += 1;
            }
        }
        Ok(materialized)
    }

    async fn upsert_monthly(
        &self,
        device_id: &str,
        month: DateTime<Utc>,
        stats: &MonthStats,
    ) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO device_monthly (
                device_id, create_time, location_lat, location_long,
                energy_solar_sum, energy_solar_avg, energy_solar_min, energy_solar_max,
                energy_solar_min_timestamp, energy_solar_max_timestamp,
                lux_solar_avg, lux_solar_min, lux_solar_max,
                lux_solar_min_timestamp, lux_solar_max_timestamp,
                charge_battery_avg, charge_battery_min, charge_battery_max,
                charge_battery_min_timestamp, charge_battery_max_timestamp,
                output_battery_sum, output_battery_avg, output_battery_min, output_battery_max,
                output_battery_min_timestamp, output_battery_max_timestamp,
                plug_off_rate_1, plug_off_rate_2,
                operational_rate, shutdown_rate, fault_rate
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28,
                $29, $30, $31
            )
            ON CONFLICT (device_id, create_time) DO UPDATE SET
                location_lat                 = EXCLUDED.location_lat,
                location_long                = EXCLUDED.location_long,
                energy_solar_sum             = EXCLUDED.energy_solar_sum,
                energy_solar_avg             = EXCLUDED.energy_solar_avg,
                energy_solar_min             = EXCLUDED.energy_solar_min,
                energy_solar_max             = EXCLUDED.energy_solar_max,
                energy_solar_min_timestamp   = EXCLUDED.energy_solar_min_timestamp,
                energy_solar_max_timestamp   = EXCLUDED.energy_solar_max_timestamp,
                lux_solar_avg                = EXCLUDED.lux_solar_avg,
                lux_solar_min                = EXCLUDED.lux_solar_min,
                lux_solar_max                = EXCLUDED.lux_solar_max,
                lux_solar_min_timestamp      = EXCLUDED.lux_solar_min_timestamp,
                lux_solar_max_timestamp      = EXCLUDED.lux_solar_max_timestamp,
                charge_battery_avg           = EXCLUDED.charge_battery_avg,
                charge_battery_min           = EXCLUDED.charge_battery_min,
                charge_battery_max           = EXCLUDED.charge_battery_max,
                charge_battery_min_timestamp = EXCLUDED.charge_battery_min_timestamp,
                charge_battery_max_timestamp = EXCLUDED.charge_battery_max_timestamp,
                output_battery_sum           = EXCLUDED.output_battery_sum,
                output_battery_avg           = EXCLUDED.output_battery_avg,
                output_battery_min           = EXCLUDED.output_battery_min,
                output_battery_max           = EXCLUDED.output_battery_max,
                output_battery_min_timestamp = EXCLUDED.output_battery_min_timestamp,
                output_battery_max_timestamp = EXCLUDED.output_battery_max_timestamp,
                plug_off_rate_1              = EXCLUDED.plug_off_rate_1,
                plug_off_rate_2              = EXCLUDED.plug_off_rate_2,
                operational_rate             = EXCLUDED.operational_rate,
                shutdown_rate                = EXCLUDED.shutdown_rate,
                fault_rate                   = EXCLUDED.fault_rate
            "#,
        )
        .bind(device_id)
        .bind(month)
        .bind(stats.location_lat)
        .bind(stats.location_long)
        .bind(stats.energy_solar_norm_sum)
        .bind(stats.avg(&stats.energy_solar))
        .bind(stats.energy_solar.min)
        .bind(stats.energy_solar.max)
        .bind(stats.energy_solar.min_timestamp)
        .bind(stats.energy_solar.max_timestamp)
        .bind(stats.avg(&stats.lux_solar))
        .bind(stats.lux_solar.min)
        .bind(stats.lux_solar.max)
        .bind(stats.lux_solar.min_timestamp)
        .bind(stats.lux_solar.max_timestamp)
        .bind(stats.avg(&stats.charge_battery))
        .bind(stats.charge_battery.min)
        .bind(stats.charge_battery.max)
        .bind(stats.charge_battery.min_timestamp)
        .bind(stats.charge_battery.max_timestamp)
        .bind(stats.output_battery_norm_sum)
        .bind(stats.avg(&stats.output_battery))
        .bind(stats.output_battery.min)
        .bind(stats.output_battery.max)
        .bind(stats.output_battery.min_timestamp)
        .bind(stats.output_battery.max_timestamp)
        .bind(stats.plug_off_rate_1())
        .bind(stats.plug_off_rate_2())
        .bind(stats.operational_rate())
        .bind(stats.shutdown_rate())
        .bind(stats.fault_rate())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
