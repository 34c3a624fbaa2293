//! Database schema management for `solarflow-telemetry`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs` (EMBP: single gateway call).

use anyhow::Result;
use sqlx::PgPool;

use crate::partition::{segment_table, SEGMENT_COUNT};

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `device_state` snapshot table, the `device_history` parent
/// with its 31 day-of-month segment children, and the `device_monthly`
/// rollup table. Safe to call on every startup; no-op if objects already
/// exist, so a concurrent provisioning run never surfaces an
/// "already exists" failure.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Current snapshot per device, overwritten in full by the writer.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_state (
            device_id        TEXT PRIMARY KEY,
            name             TEXT,
            create_time      TIMESTAMPTZ      NOT NULL,
            location_lat     DOUBLE PRECISION NOT NULL,
            location_long    DOUBLE PRECISION NOT NULL,
            energy_solar     DOUBLE PRECISION NOT NULL,
            lux_solar        DOUBLE PRECISION NOT NULL,
            capacity_battery INTEGER          NOT NULL,
            charge_battery   DOUBLE PRECISION NOT NULL,
            output_battery   DOUBLE PRECISION NOT NULL,
            voltage_battery  DOUBLE PRECISION NOT NULL,
            plug_1_on        BOOLEAN          NOT NULL,
            plug_2_on        BOOLEAN          NOT NULL,
            state            TEXT             NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // History parent. Rows never land here directly; the partition router
    // writes into the day children, and reads through the parent see all of
    // them as one logical view.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_history (
            id               SERIAL PRIMARY KEY,
            device_id        TEXT             NOT NULL,
            create_time      TIMESTAMPTZ      NOT NULL,
            location_lat     DOUBLE PRECISION NOT NULL,
            location_long    DOUBLE PRECISION NOT NULL,
            energy_solar     DOUBLE PRECISION NOT NULL,
            lux_solar        DOUBLE PRECISION NOT NULL,
            capacity_battery INTEGER          NOT NULL,
            charge_battery   DOUBLE PRECISION NOT NULL,
            output_battery   DOUBLE PRECISION NOT NULL,
            voltage_battery  DOUBLE PRECISION NOT NULL,
            plug_1_on        BOOLEAN          NOT NULL,
            plug_2_on        BOOLEAN          NOT NULL,
            state            TEXT             NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // One child per day of month, each constrained to its own day and
    // indexed on create_time for the month-window scans.
    for day in 1..=SEGMENT_COUNT {
        let child = segment_table(day);
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {child} (
                CHECK (EXTRACT(DAY FROM create_time) = {day})
            ) INHERITS (device_history);
            "#
        );
        sqlx::query(&sql).execute(&mut *tx).await?;

        let idx = format!(
            "CREATE INDEX IF NOT EXISTS idx_{child}_create_time ON {child} (create_time);"
        );
        sqlx::query(&idx).execute(&mut *tx).await?;
    }

    // Monthly statistics, one row per (device, month start). The SERIAL id
    // preserves insertion order for the monthly-detail read; the unique
    // pair backs the rollup engine's idempotent upsert.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_monthly (
            id                           SERIAL PRIMARY KEY,
            device_id                    TEXT             NOT NULL,
            create_time                  TIMESTAMPTZ      NOT NULL,
            location_lat                 DOUBLE PRECISION NOT NULL,
            location_long                DOUBLE PRECISION NOT NULL,
            energy_solar_sum             DOUBLE PRECISION NOT NULL,
            energy_solar_avg             DOUBLE PRECISION NOT NULL,
            energy_solar_min             DOUBLE PRECISION NOT NULL,
            energy_solar_max             DOUBLE PRECISION NOT NULL,
            energy_solar_min_timestamp   TIMESTAMPTZ      NOT NULL,
            energy_solar_max_timestamp   TIMESTAMPTZ      NOT NULL,
            lux_solar_avg                DOUBLE PRECISION NOT NULL,
            lux_solar_min                DOUBLE PRECISION NOT NULL,
            lux_solar_max                DOUBLE PRECISION NOT NULL,
            lux_solar_min_timestamp      TIMESTAMPTZ      NOT NULL,
            lux_solar_max_timestamp      TIMESTAMPTZ      NOT NULL,
            charge_battery_avg           DOUBLE PRECISION NOT NULL,
            charge_battery_min           DOUBLE PRECISION NOT NULL,
            charge_battery_max           DOUBLE PRECISION NOT NULL,
            charge_battery_min_timestamp TIMESTAMPTZ      NOT NULL,
            charge_battery_max_timestamp TIMESTAMPTZ      NOT NULL,
            output_battery_sum           DOUBLE PRECISION NOT NULL,
            output_battery_avg           DOUBLE PRECISION NOT NULL,
            output_battery_min           DOUBLE PRECISION NOT NULL,
            output_battery_max           DOUBLE PRECISION NOT NULL,
            output_battery_min_timestamp TIMESTAMPTZ      NOT NULL,
            output_battery_max_timestamp TIMESTAMPTZ      NOT NULL,
            plug_off_rate_1              DOUBLE PRECISION NOT NULL,
            plug_off_rate_2              DOUBLE PRECISION NOT NULL,
            operational_rate             DOUBLE PRECISION NOT NULL,
            shutdown_rate                DOUBLE PRECISION NOT NULL,
            fault_rate                   DOUBLE PRECISION NOT NULL,
            UNIQUE (device_id, create_time)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Basic indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_device_monthly_device_id
            ON device_monthly (device_id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
