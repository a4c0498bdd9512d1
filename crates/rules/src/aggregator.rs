//! Per-project buckets of today's requests, flushed into reports.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveTime, TimeZone, Utc};
use logwarden_core::Event;

use crate::report::ReportSummary;

/// One recorded request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyEntry {
    pub timestamp: DateTime<FixedOffset>,
    pub status: u16,
}

/// Owns every project's bucket. `record` and `drain` take the same lock, so
/// an entry is counted in exactly one report.
#[derive(Debug, Default)]
pub struct DailyAggregator {
    buckets: Mutex<HashMap<String, Vec<DailyEntry>>>,
}

impl DailyAggregator {
    pub fn new<I, S>(projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = projects
            .into_iter()
            .map(|p| (p.into(), Vec::new()))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
        }
    }

    /// Record `event` if it happened today in the local timezone.
    pub fn record(&self, event: &Event) -> bool {
        self.record_at(event, &Local::now())
    }

    /// Record `event` if its timestamp lies in the calendar day of `now`.
    /// Returns whether it was kept.
    pub fn record_at<Tz: TimeZone>(&self, event: &Event, now: &DateTime<Tz>) -> bool {
        let Some(timestamp) = event.timestamp else {
            return false;
        };
        let (start, end) = day_window(now);
        let at = timestamp.with_timezone(&Utc);
        if at < start || at >= end {
            return false;
        }

        self.buckets
            .lock()
            .expect("aggregator lock poisoned")
            .entry(event.project.clone())
            .or_default()
            .push(DailyEntry {
                timestamp,
                status: event.status,
            });
        true
    }

    /// Summarize and clear `project`'s bucket. Unknown projects drain empty.
    pub fn drain(&self, project: &str) -> ReportSummary {
        let entries = match self
            .buckets
            .lock()
            .expect("aggregator lock poisoned")
            .get_mut(project)
        {
            Some(bucket) => std::mem::take(bucket),
            None => Vec::new(),
        };
        ReportSummary::from_statuses(entries.iter().map(|e| e.status))
    }

    /// Number of entries waiting for the next report.
    pub fn pending(&self, project: &str) -> usize {
        self.buckets
            .lock()
            .expect("aggregator lock poisoned")
            .get(project)
            .map_or(0, Vec::len)
    }
}

/// `[midnight, next midnight)` of the day containing `now`, in `now`'s zone.
fn day_window<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let today = now.date_naive();
    let midnight = |date: chrono::NaiveDate| {
        let naive = date.and_time(NaiveTime::MIN);
        tz.from_local_datetime(&naive)
            .earliest()
            // midnight skipped by a DST jump: the day starts when the gap ends
            .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
    };
    let start = midnight(today);
    let end = today
        .succ_opt()
        .map(midnight)
        .unwrap_or_else(|| start + Duration::days(1));
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use logwarden_core::{Enrichment, Request};

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn at(day: u32, hour: u32, min: u32) -> DateTime<FixedOffset> {
        tz().with_ymd_and_hms(2026, 10, day, hour, min, 0).unwrap()
    }

    fn event(project: &str, ts: Option<DateTime<FixedOffset>>, status: u16) -> Event {
        Event {
            project: project.into(),
            remote_addr: "198.51.100.4".into(),
            remote_user: None,
            time_local: String::new(),
            timestamp: ts,
            request: "GET / HTTP/1.1".into(),
            parsed: Request {
                method: "GET".into(),
                uri: "https://example.com/".into(),
                protocol: "HTTP/1.1".into(),
            },
            status,
            body_bytes_sent: 0,
            referer: "-".into(),
            user_agent: "-".into(),
            enrichment: Enrichment::default(),
        }
    }

    #[test]
    fn records_only_todays_events() {
        let agg = DailyAggregator::new(["shop"]);
        let now = at(18, 15, 0);

        assert!(agg.record_at(&event("shop", Some(at(18, 0, 0)), 200), &now));
        assert!(agg.record_at(&event("shop", Some(at(18, 23, 59)), 200), &now));
        assert!(!agg.record_at(&event("shop", Some(at(17, 23, 59)), 200), &now));
        assert!(!agg.record_at(&event("shop", Some(at(19, 0, 0)), 200), &now));
        assert!(!agg.record_at(&event("shop", None, 200), &now));

        assert_eq!(agg.pending("shop"), 2);
    }

    #[test]
    fn window_follows_the_clock_zone() {
        let agg = DailyAggregator::new(["shop"]);
        let now = at(18, 10, 0);
        // 23:30 UTC on the 17th is 01:30 on the 18th at +02:00.
        let utc_late = Utc
            .with_ymd_and_hms(2026, 10, 17, 23, 30, 0)
            .unwrap()
            .with_timezone(&FixedOffset::east_opt(0).unwrap());
        assert!(agg.record_at(&event("shop", Some(utc_late), 200), &now));
    }

    /// -03:00 until 2026-10-18 00:00 local, then -02:00: local midnight of
    /// the 18th does not exist.
    #[derive(Debug, Clone, Copy)]
    struct MidnightGap;

    impl MidnightGap {
        fn switch_utc() -> chrono::NaiveDateTime {
            chrono::NaiveDate::from_ymd_opt(2026, 10, 18)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap()
        }
    }

    impl TimeZone for MidnightGap {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            MidnightGap
        }

        fn offset_from_local_date(
            &self,
            local: &chrono::NaiveDate,
        ) -> chrono::LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_time(NaiveTime::MIN))
        }

        fn offset_from_local_datetime(
            &self,
            local: &chrono::NaiveDateTime,
        ) -> chrono::LocalResult<FixedOffset> {
            let gap_start = Self::switch_utc() - Duration::hours(3);
            if *local < gap_start {
                chrono::LocalResult::Single(FixedOffset::west_opt(3 * 3600).unwrap())
            } else if *local < gap_start + Duration::hours(1) {
                chrono::LocalResult::None
            } else {
                chrono::LocalResult::Single(FixedOffset::west_opt(2 * 3600).unwrap())
            }
        }

        fn offset_from_utc_date(&self, utc: &chrono::NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_time(NaiveTime::MIN))
        }

        fn offset_from_utc_datetime(&self, utc: &chrono::NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch_utc() {
                FixedOffset::west_opt(3 * 3600).unwrap()
            } else {
                FixedOffset::west_opt(2 * 3600).unwrap()
            }
        }
    }

    #[test]
    fn day_starts_after_a_skipped_midnight() {
        let now = MidnightGap.from_utc_datetime(&(MidnightGap::switch_utc() + Duration::hours(9)));
        let (start, end) = day_window(&now);

        // 01:00 local at -02:00, the first instant of the 18th.
        assert_eq!(start, Utc.with_ymd_and_hms(2026, 10, 18, 3, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 10, 19, 2, 0, 0).unwrap());
    }

    #[test]
    fn drain_summarizes_then_empties() {
        let agg = DailyAggregator::new(["a"]);
        let now = at(18, 12, 0);
        for status in [200, 200, 404, 500] {
            agg.record_at(&event("a", Some(at(18, 9, 0)), status), &now);
        }

        let summary = agg.drain("a");
        assert_eq!(summary.total, 4);
        assert_eq!(summary.class_2xx, 2);
        assert_eq!(summary.class_4xx, 1);
        assert_eq!(summary.class_5xx, 1);
        assert_eq!(summary.class_3xx, 0);

        assert!(agg.drain("a").is_empty());
    }

    #[test]
    fn projects_are_kept_apart() {
        let agg = DailyAggregator::new(["a", "b"]);
        let now = at(18, 12, 0);
        agg.record_at(&event("a", Some(at(18, 9, 0)), 200), &now);
        agg.record_at(&event("b", Some(at(18, 9, 0)), 500), &now);
        agg.record_at(&event("b", Some(at(18, 9, 1)), 500), &now);

        assert_eq!(agg.drain("a").total, 1);
        assert_eq!(agg.drain("b").class_5xx, 2);
    }

    #[test]
    fn unknown_project_drains_to_zero() {
        let agg = DailyAggregator::new(["a"]);
        assert_eq!(agg.drain("nope"), ReportSummary::default());
    }

    #[test]
    fn concurrent_record_and_drain_lose_nothing() {
        let agg = Arc::new(DailyAggregator::new(["a"]));
        let now = at(18, 12, 0);
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let agg = Arc::clone(&agg);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        agg.record_at(&event("a", Some(at(18, 11, 0)), 200), &now);
                    }
                })
            })
            .collect();

        let mut drained = 0;
        for _ in 0..20 {
            drained += agg.drain("a").total;
        }
        for w in writers {
            w.join().unwrap();
        }
        drained += agg.drain("a").total;
        assert_eq!(drained, 1000);
    }
}
