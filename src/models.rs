//! Data models for the telemetry engine.
//!
//! Three shapes live here:
//! - the nested wire event delivered by the transport (`TelemetryEvent`),
//! - the flattened storage rows (`DeviceState`, `HistoryRecord`,
//!   `MonthlyAggregate`),
//! - the read-side `Granularity` with its timestamp truncation rules.

use std::str::FromStr;

use anyhow::bail;
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Reported operating state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    // ---
    Operational,
    Shutdown,
    Fault,
}

impl DeviceStatus {
    // ---
    pub fn as_str(&self) -> &'static str {
        // ---
        match self {
            DeviceStatus::Operational => "Operational",
            DeviceStatus::Shutdown => "Shutdown",
            DeviceStatus::Fault => "Fault",
        }
    }
}

// ---

/// One decoded telemetry event as delivered by the transport.
///
/// Field names follow the device firmware's wire format, including the
/// `capasity` spelling inside `batterypack`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryEvent {
    // ---
    pub id: String,
    pub state: DeviceStatus,
    pub location: Location,
    pub solarpanel: SolarPanel,
    pub batterypack: BatteryPack,
    pub interface: DeviceInterface,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub long: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SolarPanel {
    pub energy: f64,
    pub lux: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatteryPack {
    #[serde(rename = "capasity")]
    pub capacity: i32,
    pub charge: f64,
    pub output_power: f64,
    pub voltage: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeviceInterface {
    pub switches: Switches,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Switches {
    pub plug_1: Plug,
    pub plug_2: Plug,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Plug {
    pub state: bool,
}

// ---

/// Current snapshot of one device, overwritten in full on every event.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DeviceState {
    // ---
    pub device_id: String,
    pub name: Option<String>,
    pub create_time: DateTime<Utc>,
    pub location_lat: f64,
    pub location_long: f64,
    pub energy_solar: f64,
    pub lux_solar: f64,
    pub capacity_battery: i32,
    pub charge_battery: f64,
    pub output_battery: f64,
    pub voltage_battery: f64,
    pub plug_1_on: bool,
    pub plug_2_on: bool,
    pub state: String,
}

/// One immutable history fact row, flattened from the wire event.
///
/// The SERIAL surrogate id is assigned by the database and not carried here;
/// both the insert path and the read paths work off the telemetry columns.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct HistoryRecord {
    // ---
    pub device_id: String,
    pub create_time: DateTime<Utc>,
    pub location_lat: f64,
    pub location_long: f64,
    pub energy_solar: f64,
    pub lux_solar: f64,
    pub capacity_battery: i32,
    pub charge_battery: f64,
    pub output_battery: f64,
    pub voltage_battery: f64,
    pub plug_1_on: bool,
    pub plug_2_on: bool,
    pub state: String,
}

impl HistoryRecord {
    // ---
    /// Flatten a wire event into a storage row, stamping the receive time.
    pub fn from_event(event: &TelemetryEvent, received_at: DateTime<Utc>) -> HistoryRecord {
        // ---
        HistoryRecord {
            device_id: event.id.clone(),
            create_time: received_at,
            location_lat: event.location.lat,
            location_long: event.location.long,
            energy_solar: event.solarpanel.energy,
            lux_solar: event.solarpanel.lux,
            capacity_battery: event.batterypack.capacity,
            charge_battery: event.batterypack.charge,
            output_battery: event.batterypack.output_power,
            voltage_battery: event.batterypack.voltage,
            plug_1_on: event.interface.switches.plug_1.state,
            plug_2_on: event.interface.switches.plug_2.state,
            state: event.state.as_str().to_string(),
        }
    }
}

/// Per-device monthly statistics materialized by the rollup engine.
///
/// Keyed by `(device_id, create_time)` where `create_time` is the month
/// start; `id` preserves insertion order for the monthly-detail read.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MonthlyAggregate {
    // ---
    pub id: i32,
    pub device_id: String,
    pub create_time: DateTime<Utc>,
    pub location_lat: f64,
    pub location_long: f64,
    pub energy_solar_sum: f64,
    pub energy_solar_avg: f64,
    pub energy_solar_min: f64,
    pub energy_solar_max: f64,
    pub energy_solar_min_timestamp: DateTime<Utc>,
    pub energy_solar_max_timestamp: DateTime<Utc>,
    pub lux_solar_avg: f64,
    pub lux_solar_min: f64,
    pub lux_solar_max: f64,
    pub lux_solar_min_timestamp: DateTime<Utc>,
    pub lux_solar_max_timestamp: DateTime<Utc>,
    pub charge_battery_avg: f64,
    pub charge_battery_min: f64,
    pub charge_battery_max: f64,
    pub charge_battery_min_timestamp: DateTime<Utc>,
    pub charge_battery_max_timestamp: DateTime<Utc>,
    pub output_battery_sum: f64,
    pub output_battery_avg: f64,
    pub output_battery_min: f64,
    pub output_battery_max: f64,
    pub output_battery_min_timestamp: DateTime<Utc>,
    pub output_battery_max_timestamp: DateTime<Utc>,
    pub plug_off_rate_1: f64,
    pub plug_off_rate_2: f64,
    pub operational_rate: f64,
    pub shutdown_rate: f64,
    pub fault_rate: f64,
}

// ---

/// Bucket width for read-side aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    // ---
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl Granularity {
    // ---
    /// Truncate `ts` to the start of its granularity unit (UTC).
    ///
    /// Weeks start on Monday, matching Postgres `date_trunc('week', ...)`.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        // ---
        let date = ts.date_naive();
        let day_start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
        match self {
            Granularity::Minute => {
                day_start + Duration::minutes(i64::from(ts.hour()) * 60 + i64::from(ts.minute()))
            }
            Granularity::Hour => day_start + Duration::hours(i64::from(ts.hour())),
            Granularity::Day => day_start,
            Granularity::Week => {
                day_start - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            Granularity::Month => {
                let first = date.with_day(1).unwrap_or(date);
                Utc.from_utc_datetime(&first.and_time(NaiveTime::MIN))
            }
        }
    }
}

impl FromStr for Granularity {
    // ---
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Granularity, Self::Err> {
        // ---
        match s {
            "minute" => Ok(Granularity::Minute),
            "hour" => Ok(Granularity::Hour),
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => bail!("unsupported granularity: {other}"),
        }
    }
}

/// Start of the month containing `ts` (UTC midnight on the 1st).
pub fn month_start(ts: DateTime<Utc>) -> DateTime<Utc> {
    // ---
    Granularity::Month.truncate(ts)
}
