// Set reconciliation of a scraped snapshot against the persistent inventory.
//
// One pass, one timestamp: every vehicle present in the snapshot becomes
// active with refreshed attributes, every previously-active vehicle absent
// from a non-empty snapshot becomes removed, and first_seen survives
// untouched across passes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;
use std::collections::HashSet;

use crate::db::InventoryStore;
use crate::extract::VehicleRecord;

// ============================================================================
// RECONCILE SUMMARY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    /// Records written to the store this pass (including duplicate-VIN
    /// re-writes within the batch).
    pub upserted: usize,

    /// Entries flipped from active to removed this pass.
    pub newly_removed: usize,

    /// Total active entries after the pass.
    pub active_total: i64,

    /// Total removed entries after the pass.
    pub removed_total: i64,
}

impl ReconcileSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} upserted, {} newly removed, {} active / {} removed in store",
            self.upserted, self.newly_removed, self.active_total, self.removed_total
        )
    }
}

// ============================================================================
// RECONCILIATION PASS
// ============================================================================

/// Reconcile one snapshot against the store.
///
/// `now` is applied uniformly to the whole pass so every record touched in one
/// run shares the same `last_seen`. Duplicate VINs within the snapshot resolve
/// last-occurrence-wins: records are upserted in input order, so the final
/// write for a VIN is the last one in the sequence.
///
/// An empty snapshot (after dropping VIN-less records) upserts nothing and,
/// critically, removes nothing: a transient scrape failure must never mark the
/// whole inventory as removed.
///
/// Any store error aborts the pass and propagates; there are no
/// partial-commit semantics to unwind.
pub fn reconcile(
    store: &InventoryStore,
    snapshot: &[VehicleRecord],
    now: DateTime<Utc>,
) -> Result<ReconcileSummary> {
    // Step 1: only records with a VIN participate
    let with_vin: Vec<(&str, &VehicleRecord)> = snapshot
        .iter()
        .filter_map(|record| {
            record
                .vin
                .as_deref()
                .filter(|vin| !vin.is_empty())
                .map(|vin| (vin, record))
        })
        .collect();

    if with_vin.len() < snapshot.len() {
        info!(
            "Discarded {} record(s) without a VIN.",
            snapshot.len() - with_vin.len()
        );
    }

    // Step 2: upsert in input order - last occurrence of a duplicate VIN wins
    for (vin, record) in &with_vin {
        store.upsert(vin, record, now)?;
    }

    // Steps 3-5: sweep absent VINs, unless the snapshot came back empty
    let active_vins: HashSet<&str> = with_vin.iter().map(|(vin, _)| *vin).collect();
    let newly_removed = if active_vins.is_empty() {
        info!("Empty snapshot: skipping removal sweep.");
        0
    } else {
        let vins: Vec<String> = active_vins.iter().map(|v| v.to_string()).collect();
        store.mark_removed_except(&vins, now)?
    };

    let (active_total, removed_total) = store.status_counts()?;

    let summary = ReconcileSummary {
        upserted: with_vin.len(),
        newly_removed,
        active_total,
        removed_total,
    };

    info!("Reconciliation pass complete: {}", summary.summary());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::VehicleStatus;
    use crate::extract::parse_inventory_page;
    use chrono::TimeZone;

    fn rec(vin: &str) -> VehicleRecord {
        VehicleRecord {
            vin: Some(vin.to_string()),
            title: Some(format!("2020 Test Vehicle {vin}")),
            price: Some(20_000),
            ..VehicleRecord::default()
        }
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_every_snapshot_vin_ends_active_with_shared_timestamp() {
        let store = InventoryStore::open_in_memory().unwrap();
        let snapshot = vec![rec("A1"), rec("B2"), rec("C3")];

        let summary = reconcile(&store, &snapshot, ts(100)).unwrap();

        assert_eq!(summary.upserted, 3);
        assert_eq!(summary.newly_removed, 0);
        assert_eq!(summary.active_total, 3);
        assert_eq!(summary.removed_total, 0);

        for vin in ["A1", "B2", "C3"] {
            let entry = store.get(vin).unwrap().unwrap();
            assert_eq!(entry.status, VehicleStatus::Active);
            assert_eq!(entry.last_seen, ts(100));
            assert_eq!(entry.first_seen, ts(100));
        }
    }

    #[test]
    fn test_absent_active_vin_becomes_removed() {
        let store = InventoryStore::open_in_memory().unwrap();

        // B2 listed on the first pass, gone on the second
        reconcile(&store, &[rec("B2")], ts(100)).unwrap();
        let summary = reconcile(&store, &[rec("A1")], ts(200)).unwrap();

        assert_eq!(summary.upserted, 1);
        assert_eq!(summary.newly_removed, 1);
        assert_eq!(summary.active_total, 1);
        assert_eq!(summary.removed_total, 1);

        let b2 = store.get("B2").unwrap().unwrap();
        assert_eq!(b2.status, VehicleStatus::Removed);
        assert_eq!(b2.last_seen, ts(200));

        let a1 = store.get("A1").unwrap().unwrap();
        assert_eq!(a1.status, VehicleStatus::Active);
        assert_eq!(a1.first_seen, ts(200));
    }

    #[test]
    fn test_reconcile_is_idempotent_for_same_timestamp() {
        let store = InventoryStore::open_in_memory().unwrap();
        reconcile(&store, &[rec("OLD")], ts(50)).unwrap();

        let snapshot = vec![rec("A1"), rec("B2")];
        reconcile(&store, &snapshot, ts(100)).unwrap();
        let after_once = store.all_entries().unwrap();

        reconcile(&store, &snapshot, ts(100)).unwrap();
        let after_twice = store.all_entries().unwrap();

        assert_eq!(after_once, after_twice);
    }

    #[test]
    fn test_empty_snapshot_never_removes_anything() {
        let store = InventoryStore::open_in_memory().unwrap();
        reconcile(&store, &[rec("B2")], ts(100)).unwrap();

        let summary = reconcile(&store, &[], ts(200)).unwrap();

        assert_eq!(summary.upserted, 0);
        assert_eq!(summary.newly_removed, 0);

        // B2 untouched: still active, last_seen unchanged
        let b2 = store.get("B2").unwrap().unwrap();
        assert_eq!(b2.status, VehicleStatus::Active);
        assert_eq!(b2.last_seen, ts(100));
    }

    #[test]
    fn test_snapshot_of_only_vinless_records_is_also_safe() {
        let store = InventoryStore::open_in_memory().unwrap();
        reconcile(&store, &[rec("B2")], ts(100)).unwrap();

        // All records filtered out, so this counts as an empty snapshot
        let vinless = vec![VehicleRecord::default(), VehicleRecord {
            vin: Some(String::new()),
            ..VehicleRecord::default()
        }];
        let summary = reconcile(&store, &vinless, ts(200)).unwrap();

        assert_eq!(summary.upserted, 0);
        assert_eq!(summary.newly_removed, 0);
        assert_eq!(store.get("B2").unwrap().unwrap().status, VehicleStatus::Active);
    }

    #[test]
    fn test_first_seen_is_set_exactly_once() {
        let store = InventoryStore::open_in_memory().unwrap();

        reconcile(&store, &[rec("A1")], ts(100)).unwrap();
        reconcile(&store, &[], ts(150)).unwrap();
        reconcile(&store, &[rec("B2")], ts(200)).unwrap(); // A1 removed here
        reconcile(&store, &[rec("A1")], ts(300)).unwrap(); // A1 relisted

        let a1 = store.get("A1").unwrap().unwrap();
        assert_eq!(a1.first_seen, ts(100));
        assert_eq!(a1.last_seen, ts(300));
        assert_eq!(a1.status, VehicleStatus::Active);
    }

    #[test]
    fn test_duplicate_vin_last_occurrence_wins() {
        let store = InventoryStore::open_in_memory().unwrap();

        let first = VehicleRecord {
            vin: Some("C3".to_string()),
            price: Some(15_000),
            ..VehicleRecord::default()
        };
        let second = VehicleRecord {
            vin: Some("C3".to_string()),
            price: Some(14_500),
            ..VehicleRecord::default()
        };

        let summary = reconcile(&store, &[first, second], ts(100)).unwrap();

        assert_eq!(summary.upserted, 2);
        assert_eq!(summary.active_total, 1, "one entry per VIN");
        assert_eq!(store.get("C3").unwrap().unwrap().price, Some(14_500));
    }

    #[test]
    fn test_scraped_page_flows_into_fresh_store() {
        // End to end across the parse + reconcile seam
        let html = r#"<div class="listing-tile-wrapper" id="77">
            <h2 class="car-name">2020 Civic</h2>
            <span class="price">$12,500</span>
            <span class="car-meta">VIN A1</span>
        </div>"#;
        let snapshot = parse_inventory_page(html, "https://dealer.example");

        let store = InventoryStore::open_in_memory().unwrap();
        reconcile(&store, &snapshot, ts(100)).unwrap();

        let entry = store.get("A1").unwrap().unwrap();
        assert_eq!(entry.price, Some(12_500));
        assert_eq!(entry.year, Some(2020));
        assert_eq!(entry.status, VehicleStatus::Active);
        assert_eq!(entry.first_seen, ts(100));
        assert_eq!(entry.last_seen, ts(100));
    }
}
