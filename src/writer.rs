//! Telemetry write path.
//!
//! One decoded event becomes two effects, performed as one logical unit:
//! a full-row overwrite of the device's `device_state` snapshot and an
//! unconditional history append through the partition router. Delivery is
//! at-most-once: any failure is logged and reported to the caller as `false`,
//! and the sample is dropped without retry.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;

use crate::models::{HistoryRecord, TelemetryEvent};
use crate::partition::PartitionRouter;

// ---

pub struct TelemetryWriter {
    // ---
    pool: PgPool,
    router: PartitionRouter,
}

impl TelemetryWriter {
    // ---
    pub fn new(pool: PgPool) -> TelemetryWriter {
        // ---
        TelemetryWriter {
            router: PartitionRouter::new(pool.clone()),
            pool,
        }
    }

    /// Accept one event, stamping the receive time.
    ///
    /// Returns `false` if either the snapshot upsert or the history append
    /// failed; the event is not retried.
    pub async fn ingest(&self, event: &TelemetryEvent) -> bool {
        // ---
        match self.ingest_at(event, Utc::now()).await {
            Ok(()) => true,
            Err(e) => {
                error!("Dropping telemetry event from '{}': {:#}", event.id, e);
                false
            }
        }
    }

    /// Ingestion body with an explicit receive timestamp.
    pub async fn ingest_at(&self, event: &TelemetryEvent, received_at: DateTime<Utc>) -> Result<()> {
        // ---
        let record = HistoryRecord::from_event(event, received_at);

        self.upsert_device_state(&record).await?;
        self.router.insert(&record).await?;
        Ok(())
    }

    /// Last-write-wins full-row overwrite of the device snapshot. The
    /// administratively assigned `name` is left untouched.
    async fn upsert_device_state(&self, record: &HistoryRecord) -> Result<()> {
        // ---
        sqlx::query(
            r#"
            INSERT INTO device_state (
                device_id, create_time, location_lat, location_long,
                energy_solar, lux_solar, capacity_battery, charge_battery,
                output_battery, voltage_battery, plug_1_on, plug_2_on, state
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (device_id) DO UPDATE SET
                create_time      = EXCLUDED.create_time,
                location_lat     = EXCLUDED.location_lat,
                location_long    = EXCLUDED.location_long,
                energy_solar     = EXCLUDED.energy_solar,
                lux_solar        = EXCLUDED.lux_solar,
                capacity_battery = EXCLUDED.capacity_battery,
                charge_battery   = EXCLUDED.charge_battery,
                output_battery   = EXCLUDED.output_battery,
                voltage_battery  = EXCLUDED.voltage_battery,
                plug_1_on        = EXCLUDED.plug_1_on,
                plug_2_on        = EXCLUDED.plug_2_on,
                state            = EXCLUDED.state
            "#,
        )
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
