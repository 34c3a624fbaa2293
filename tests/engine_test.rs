//! End-to-end checks over the engine's pure logic: wire decoding through
//! history flattening, segment routing, bucketed aggregation, and the monthly
//! statistics fold.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use solarflow_telemetry::partition::{cycle_expired, segment_table};
use solarflow_telemetry::query::bucketize;
use solarflow_telemetry::rollup::MonthStats;
use solarflow_telemetry::{Granularity, HistoryRecord, TelemetryEvent};

// ---

fn event_json(device: &str, state: &str, output_power: f64) -> String {
    // ---
    format!(
        r#"{{
            "id": "{device}",
            "state": "{state}",
            "location": {{ "lat": 61.4978, "long": 23.7610 }},
            "solarpanel": {{ "energy": 12.5, "lux": 35000.0 }},
            "batterypack": {{ "capasity": 5000, "charge": 87.5,
                              "output_power": {output_power}, "voltage": 12.1 }},
            "interface": {{ "switches": {{ "plug_1": {{ "state": true }},
                                           "plug_2": {{ "state": false }} }} }}
        }}"#
    )
}

fn record_at(device: &str, state: &str, output_power: f64, ts: DateTime<Utc>) -> HistoryRecord {
    // ---
    let event: TelemetryEvent =
        serde_json::from_str(&event_json(device, state, output_power)).expect("valid payload");
    HistoryRecord::from_event(&event, ts)
}

// ---

#[test]
fn every_event_routes_to_its_day_segment() -> Result<()> {
    // ---
    // A month of events: each flattened record targets exactly the segment
    // named after its timestamp's day of month.
    for day in 1..=31 {
        let ts = Utc.with_ymd_and_hms(2026, 8, day, 10, 0, 0).unwrap();
        let record = record_at("sol-0001", "Operational", 2.0, ts);

        assert_eq!(record.create_time.day(), day);
        assert_eq!(
            segment_table(record.create_time.day()),
            format!("device_history_d{day:02}")
        );
    }
    Ok(())
}

#[test]
fn stale_segment_recycles_exactly_on_new_cycle() -> Result<()> {
    // ---
    let oldest = Utc.with_ymd_and_hms(2026, 7, 14, 8, 0, 0).unwrap();

    // Writes within the same cycle append; the first write of the next cycle
    // triggers recycling, after which the segment holds only the new row.
    let same_cycle = oldest + Duration::hours(10);
    assert!(!cycle_expired(oldest, same_cycle));

    let next_cycle = Utc.with_ymd_and_hms(2026, 8, 14, 8, 0, 0).unwrap();
    assert!(cycle_expired(oldest, next_cycle));
    Ok(())
}

#[test]
fn ingest_to_bucket_pipeline() -> Result<()> {
    // ---
    // Four samples across two hours, decoded from wire payloads and bucketed
    // at hour granularity with open bounds.
    let base = Utc.with_ymd_and_hms(2026, 8, 14, 9, 0, 0).unwrap();
    let records = vec![
        record_at("sol-0042", "Operational", 2.0, base),
        record_at("sol-0042", "Operational", 4.0, base + Duration::minutes(30)),
        record_at("sol-0042", "Shutdown", 0.0, base + Duration::hours(1)),
        record_at("sol-0042", "Operational", 6.0, base + Duration::minutes(90)),
    ];

    let end = base + Duration::hours(6);
    let buckets = bucketize(&records, Granularity::Hour, None, end);

    assert_eq!(buckets.len(), 2);
    assert_eq!(buckets[0].bucket_time, base);
    assert_eq!(buckets[0].entries, 2);
    assert_eq!(buckets[0].output_battery_avg, 3.0);
    assert_eq!(buckets[1].bucket_time, base + Duration::hours(1));
    assert_eq!(buckets[1].entries, 2);
    assert_eq!(buckets[1].output_battery_avg, 3.0);

    // Every bucket lies strictly below the open-range end, ascending.
    assert!(buckets.windows(2).all(|w| w[0].bucket_time < w[1].bucket_time));
    assert!(buckets.iter().all(|b| b.bucket_time < end));
    Ok(())
}

#[test]
fn month_fold_is_deterministic_and_idempotent() -> Result<()> {
    // ---
    // Folding the same month twice yields identical statistics, which is what
    // makes the rollup's keyed upsert idempotent between runs.
    let base = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
    let records: Vec<HistoryRecord> = (0..60)
        .map(|i| {
            let state = if i % 10 < 7 { "Operational" } else { "Shutdown" };
            record_at("sol-0042", state, 2.0, base + Duration::minutes(i))
        })
        .collect();

    let first = MonthStats::from_records(&records).unwrap();
    let second = MonthStats::from_records(&records).unwrap();

    assert_eq!(first.count, second.count);
    assert_eq!(first.operational_rate(), second.operational_rate());
    assert_eq!(first.operational_rate(), 0.70);
    assert_eq!(first.shutdown_rate(), 0.30);
    assert!(first.fault_rate().abs() < 1e-9);

    // 60 one-minute contributions of 2.0 make one hour-equivalent total.
    assert!((first.output_battery_norm_sum - 2.0).abs() < 1e-9);
    assert_eq!(
        first.output_battery.min_timestamp,
        second.output_battery.min_timestamp
    );
    Ok(())
}

#[test]
fn empty_month_produces_no_aggregate() -> Result<()> {
    // ---
    assert!(MonthStats::from_records(&[]).is_none());
    Ok(())
}
