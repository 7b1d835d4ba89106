pub mod types;

pub use types::*;

use chrono::{DateTime, Duration, Utc};

use crate::manifest::{ItemKind, Manifest};
use crate::order::gap::compute_gaps;
use crate::range::DateRange;

/// Fraction of `window` mirrored for `kind`, in `[0, 1]`.
///
/// The part of the window after `now` is treated as available: nothing can
/// be missing from the future. A window lying wholly in the future is 1.0,
/// otherwise a kind with no manifests at all is 0.0.
pub fn availability(
    manifests: &[Manifest],
    window: &DateRange,
    kind: ItemKind,
    now: DateTime<Utc>,
) -> f64 {
    estimate(manifests, window, kind, now).fraction
}

/// Like [`availability`] but keeps the figures the fraction was derived from.
pub fn estimate(
    manifests: &[Manifest],
    window: &DateRange,
    kind: ItemKind,
    now: DateTime<Utc>,
) -> KindAvailability {
    let relevant: Vec<Manifest> = manifests
        .iter()
        .filter(|m| m.kind == kind && m.dates.overlaps(window))
        .cloned()
        .collect();
    let gaps = compute_gaps(&relevant, window);

    let mut report = KindAvailability {
        kind,
        window: *window,
        fraction: 0.0,
        manifest_count: relevant.len() as u64,
        gap_count: gaps.len() as u64,
        missing_secs: 0,
    };

    let past_end = now.min(window.end);
    if past_end <= window.start {
        report.fraction = 1.0;
        return report;
    }
    if relevant.is_empty() {
        report.missing_secs = (past_end - window.start).num_seconds();
        return report;
    }
    if gaps.is_empty() {
        report.fraction = 1.0;
        return report;
    }

    let past = DateRange {
        start: window.start,
        end: past_end,
    };
    let missing = gaps
        .iter()
        .filter_map(|g| g.date_range().intersection(&past))
        .fold(Duration::zero(), |acc, r| acc + r.duration());

    let ratio = missing.num_milliseconds() as f64 / past.duration().num_milliseconds() as f64;
    report.missing_secs = missing.num_seconds();
    report.fraction = (1.0 - ratio).clamp(0.0, 1.0);
    report
}

/// Summarise the stored manifests of one kind.
pub fn summarize(kind: ItemKind, manifests: &[Manifest]) -> CoverageSummary {
    let own = manifests.iter().filter(|m| m.kind == kind);
    let mut summary = CoverageSummary {
        kind,
        manifest_count: 0,
        covered_secs: 0,
        earliest: None,
        latest: None,
        never_refreshed: 0,
    };
    for m in own {
        summary.manifest_count += 1;
        summary.covered_secs += m.dates.duration().num_seconds();
        summary.earliest = Some(summary.earliest.map_or(m.start(), |e| e.min(m.start())));
        summary.latest = Some(summary.latest.map_or(m.end(), |l| l.max(m.end())));
        if m.refreshed_at.is_none() {
            summary.never_refreshed += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::IdRange;
    use chrono::TimeZone;

    fn d(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 0, 0, 0).unwrap()
    }

    fn manifest(kind: ItemKind, start: DateTime<Utc>, end: DateTime<Utc>) -> Manifest {
        Manifest::new(kind, DateRange::new(start, end).unwrap(), IdRange::empty()).with_id(1)
    }

    fn window() -> DateRange {
        DateRange::new(d(2023, 1, 1), d(2023, 1, 11)).unwrap()
    }

    #[test]
    fn test_no_manifests_is_zero() {
        assert_eq!(availability(&[], &window(), ItemKind::Flag, d(2023, 6, 1)), 0.0);
    }

    #[test]
    fn test_future_window_is_available() {
        assert_eq!(availability(&[], &window(), ItemKind::Flag, d(2022, 12, 1)), 1.0);
    }

    #[test]
    fn test_containing_manifest_is_one() {
        let m = manifest(ItemKind::Flag, d(2022, 12, 1), d(2023, 2, 1));
        assert_eq!(availability(&[m], &window(), ItemKind::Flag, d(2023, 6, 1)), 1.0);
    }

    #[test]
    fn test_other_kinds_ignored() {
        let m = manifest(ItemKind::Permit, d(2022, 12, 1), d(2023, 2, 1));
        assert_eq!(availability(&[m], &window(), ItemKind::Flag, d(2023, 6, 1)), 0.0);
    }

    #[test]
    fn test_partial_coverage() {
        // Half of the ten-day window is covered.
        let m = manifest(ItemKind::Flag, d(2023, 1, 1), d(2023, 1, 6));
        let report = estimate(&[m], &window(), ItemKind::Flag, d(2023, 6, 1));
        assert!((report.fraction - 0.5).abs() < 1e-9);
        assert_eq!(report.gap_count, 1);
        assert_eq!(report.missing_secs, 5 * 86_400);
    }

    #[test]
    fn test_future_part_not_counted_missing() {
        // Covered through day 6, "now" is day 6: the uncovered rest lies in the future.
        let m = manifest(ItemKind::Flag, d(2023, 1, 1), d(2023, 1, 6));
        assert_eq!(availability(&[m], &window(), ItemKind::Flag, d(2023, 1, 6)), 1.0);

        let m = manifest(ItemKind::Flag, d(2023, 1, 1), d(2023, 1, 3));
        let fraction = availability(&[m], &window(), ItemKind::Flag, d(2023, 1, 5));
        assert!((fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_always_within_bounds() {
        let manifests = vec![
            manifest(ItemKind::Flag, d(2023, 1, 2), d(2023, 1, 3)),
            manifest(ItemKind::Flag, d(2023, 1, 5), d(2023, 1, 9)),
        ];
        for now_day in 1..=20 {
            let now = d(2023, 1, 1) + Duration::days(now_day);
            let f = availability(&manifests, &window(), ItemKind::Flag, now);
            assert!((0.0..=1.0).contains(&f), "fraction {f} out of bounds");
        }
    }

    #[test]
    fn test_summarize() {
        let mut refreshed = manifest(ItemKind::Ticket, d(2023, 1, 1), d(2023, 1, 3));
        refreshed.refreshed_at = Some(d(2023, 2, 1));
        let manifests = vec![
            refreshed,
            manifest(ItemKind::Ticket, d(2023, 1, 5), d(2023, 1, 6)),
            manifest(ItemKind::Flag, d(2022, 1, 5), d(2022, 1, 6)),
        ];
        let summary = summarize(ItemKind::Ticket, &manifests);
        assert_eq!(summary.manifest_count, 2);
        assert_eq!(summary.covered_secs, 3 * 86_400);
        assert_eq!(summary.earliest, Some(d(2023, 1, 1)));
        assert_eq!(summary.latest, Some(d(2023, 1, 6)));
        assert_eq!(summary.never_refreshed, 1);
    }
}
