//! Version selector resolution
//!
//! A selector string names a version id, a label, a branch or a point in
//! time, tried in that order. An empty selector falls back to the sticky
//! tag the resource was last updated with.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::{Result, VersionControlError};
use crate::history::VersionHistory;
use crate::ids::VersionId;
use crate::info::Sticky;
use crate::names::NameRegistry;
use crate::version::Version;
use crate::MAINLINE;

/// Outcome of resolving a selector
#[derive(Debug)]
pub struct Resolution<'h> {
    pub version: &'h Version,
    /// Sticky tag the resource should carry afterwards
    pub sticky: Option<Sticky>,
}

/// Where the resource currently stands, if it is a live resource
#[derive(Debug, Clone, Copy)]
pub struct Position<'a> {
    pub version_id: &'a VersionId,
    pub sticky: Option<&'a Sticky>,
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parse an absolute point in time. Naive forms are read as UTC.
pub fn parse_point_in_time(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    // Unix seconds, possibly fractional
    let secs: f64 = input.parse().ok()?;
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Resolve `selector` against `history`.
///
/// `position` is the live resource's current version and sticky tag; it is
/// `None` for detached lookups, which behave as an unpinned resource on
/// mainline.
pub fn resolve<'h>(
    history: &'h VersionHistory,
    names: &NameRegistry,
    position: Option<Position<'_>>,
    selector: Option<&str>,
) -> Result<Resolution<'h>> {
    let current_sticky = position.and_then(|p| p.sticky);

    let selector = match selector.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return resolve_sticky(history, position, current_sticky),
    };

    if history.has_version_id(selector) {
        let id = VersionId::from(selector);
        return Ok(Resolution {
            version: history.version(&id)?,
            sticky: Some(Sticky::Version(id)),
        });
    }

    if names.is_label(selector) {
        return Ok(Resolution {
            version: history.version_by_label(selector)?,
            sticky: Some(Sticky::Label(selector.to_string())),
        });
    }

    if names.is_branch(selector) {
        let sticky = (selector != MAINLINE).then(|| Sticky::Branch(selector.to_string()));
        return Ok(Resolution {
            version: history.latest_version(selector)?,
            sticky,
        });
    }

    let timestamp = parse_point_in_time(selector)
        .ok_or_else(|| VersionControlError::InvalidSelector(selector.to_string()))?;
    let branch = match position {
        Some(p) => history.find_branch_id(p.version_id)?,
        None => MAINLINE,
    };
    Ok(Resolution {
        version: history.version_by_date(branch, timestamp)?,
        sticky: Some(Sticky::Date(timestamp)),
    })
}

fn resolve_sticky<'h>(
    history: &'h VersionHistory,
    position: Option<Position<'_>>,
    sticky: Option<&Sticky>,
) -> Result<Resolution<'h>> {
    match sticky {
        Some(Sticky::Label(label)) => Ok(Resolution {
            version: history.version_by_label(label)?,
            sticky: sticky.cloned(),
        }),
        Some(Sticky::Branch(branch)) => Ok(Resolution {
            version: history.latest_version(branch)?,
            sticky: sticky.cloned(),
        }),
        Some(Sticky::Version(pinned)) => {
            // Already pinned: stay on the current version
            let id = position.map(|p| p.version_id).unwrap_or(pinned);
            Ok(Resolution {
                version: history.version(id)?,
                sticky: sticky.cloned(),
            })
        }
        Some(Sticky::Date(_)) | None => Ok(Resolution {
            version: history.latest_version(MAINLINE)?,
            sticky: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::HistoryId;
    use crate::version::Snapshot;
    use chrono::{Duration, Timelike};
    use std::collections::BTreeMap;

    fn snap() -> Snapshot {
        Snapshot {
            type_name: "Document".to_string(),
            attributes: BTreeMap::new(),
            children: Vec::new(),
            container: false,
        }
    }

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    struct Fixture {
        history: VersionHistory,
        names: NameRegistry,
        v1: VersionId,
        v2: VersionId,
        b1: VersionId,
    }

    fn fixture() -> Fixture {
        let mut history = VersionHistory::new(HistoryId::from("1"), 9_999_999_999);
        let mut names = NameRegistry::new();
        let v1 = history.create_version_at(snap(), MAINLINE, t(0)).unwrap().id.clone();
        let v2 = history.create_version_at(snap(), MAINLINE, t(10)).unwrap().id.clone();
        names.reserve_branch("bugfix").unwrap();
        history.create_branch("bugfix", &v1).unwrap();
        let b1 = history.create_version_at(snap(), "bugfix", t(20)).unwrap().id.clone();
        names.reserve_label("first").unwrap();
        history.label_version(&v1, "first", false).unwrap();
        Fixture { history, names, v1, v2, b1 }
    }

    // === Point In Time Parsing ===

    #[test]
    fn test_parse_rfc3339() {
        let ts = parse_point_in_time("2024-01-01T00:10:00+00:00").unwrap();
        assert_eq!(ts, t(10));
    }

    #[test]
    fn test_parse_naive_forms() {
        assert_eq!(parse_point_in_time("2024-01-01 00:10:00").unwrap(), t(10));
        assert_eq!(parse_point_in_time("2024-01-01 00:10").unwrap(), t(10));
        assert_eq!(parse_point_in_time("2024/01/01").unwrap(), t(0));
    }

    #[test]
    fn test_parse_epoch_seconds() {
        let ts = parse_point_in_time(&t(10).timestamp().to_string()).unwrap();
        assert_eq!(ts, t(10));

        let ts = parse_point_in_time("1704067200.5").unwrap();
        assert_eq!(ts.timestamp(), 1704067200);
        assert_eq!(ts.nanosecond(), 500_000_000);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_point_in_time("next tuesday").is_none());
        assert!(parse_point_in_time("").is_none());
        assert!(parse_point_in_time("NaN").is_none());
    }

    // === Selector Resolution ===

    #[test]
    fn test_empty_selector_unpinned_is_mainline_latest() {
        let f = fixture();
        let r = resolve(&f.history, &f.names, None, None).unwrap();
        assert_eq!(r.version.id, f.v2);
        assert!(r.sticky.is_none());
    }

    #[test]
    fn test_empty_selector_follows_label_sticky() {
        let mut f = fixture();
        let sticky = Sticky::Label("first".to_string());
        let pos = Position { version_id: &f.v2, sticky: Some(&sticky) };
        let r = resolve(&f.history, &f.names, Some(pos), Some("")).unwrap();
        assert_eq!(r.version.id, f.v1);
        assert_eq!(r.sticky, Some(sticky.clone()));

        // Label moved since: follow it
        f.history.label_version(&f.v2, "first", true).unwrap();
        let pos = Position { version_id: &f.v1, sticky: Some(&sticky) };
        let r = resolve(&f.history, &f.names, Some(pos), None).unwrap();
        assert_eq!(r.version.id, f.v2);
    }

    #[test]
    fn test_empty_selector_follows_branch_sticky() {
        let f = fixture();
        let sticky = Sticky::Branch("bugfix".to_string());
        let pos = Position { version_id: &f.v1, sticky: Some(&sticky) };
        let r = resolve(&f.history, &f.names, Some(pos), None).unwrap();
        assert_eq!(r.version.id, f.b1);
        assert_eq!(r.sticky, Some(sticky.clone()));
    }

    #[test]
    fn test_empty_selector_version_sticky_is_noop() {
        let f = fixture();
        let sticky = Sticky::Version(f.v1.clone());
        let pos = Position { version_id: &f.v1, sticky: Some(&sticky) };
        let r = resolve(&f.history, &f.names, Some(pos), None).unwrap();
        assert_eq!(r.version.id, f.v1);
        assert_eq!(r.sticky, Some(sticky.clone()));
    }

    #[test]
    fn test_empty_selector_date_sticky_resets_to_mainline() {
        let f = fixture();
        let sticky = Sticky::Date(t(5));
        let pos = Position { version_id: &f.v1, sticky: Some(&sticky) };
        let r = resolve(&f.history, &f.names, Some(pos), None).unwrap();
        assert_eq!(r.version.id, f.v2);
        assert!(r.sticky.is_none());
    }

    #[test]
    fn test_version_id_selector() {
        let f = fixture();
        let r = resolve(&f.history, &f.names, None, Some(f.v1.as_str())).unwrap();
        assert_eq!(r.version.id, f.v1);
        assert_eq!(r.sticky, Some(Sticky::Version(f.v1.clone())));
    }

    #[test]
    fn test_label_selector() {
        let f = fixture();
        let r = resolve(&f.history, &f.names, None, Some("first")).unwrap();
        assert_eq!(r.version.id, f.v1);
        assert_eq!(r.sticky, Some(Sticky::Label("first".to_string())));
    }

    #[test]
    fn test_branch_selectors() {
        let f = fixture();
        let r = resolve(&f.history, &f.names, None, Some("bugfix")).unwrap();
        assert_eq!(r.version.id, f.b1);
        assert_eq!(r.sticky, Some(Sticky::Branch("bugfix".to_string())));

        let r = resolve(&f.history, &f.names, None, Some("mainline")).unwrap();
        assert_eq!(r.version.id, f.v2);
        assert!(r.sticky.is_none());
    }

    #[test]
    fn test_date_selector_uses_current_branch() {
        let f = fixture();
        let pos = Position { version_id: &f.b1, sticky: None };
        let when = "2024-01-01T00:15:00Z";

        // From the branch, mainline's v2 (after the fork) is invisible
        let r = resolve(&f.history, &f.names, Some(pos), Some(when)).unwrap();
        assert_eq!(r.version.id, f.v1);
        assert_eq!(r.sticky, Some(Sticky::Date(t(15))));

        // Detached lookups start from mainline
        let r = resolve(&f.history, &f.names, None, Some(when)).unwrap();
        assert_eq!(r.version.id, f.v2);
    }

    #[test]
    fn test_invalid_selector() {
        let f = fixture();
        let err = resolve(&f.history, &f.names, None, Some("no such thing")).unwrap_err();
        assert!(matches!(err, VersionControlError::InvalidSelector(_)));
    }

    #[test]
    fn test_reserved_label_not_in_this_history() {
        let mut f = fixture();
        f.names.reserve_label("elsewhere").unwrap();
        let err = resolve(&f.history, &f.names, None, Some("elsewhere")).unwrap_err();
        assert!(matches!(err, VersionControlError::InvalidSelector(_)));
    }
}
