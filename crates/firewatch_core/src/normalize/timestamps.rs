use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::domain::ValidationWarning;

fn to_canonical(dt: OffsetDateTime) -> Option<String> {
    dt.to_offset(UtcOffset::UTC).format(&Rfc3339).ok()
}

/// Zone-less layouts sensor gateways emit. Parsed as UTC with a warning.
fn parse_naive(raw: &str) -> Option<OffsetDateTime> {
    let layouts = [
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    layouts
        .iter()
        .find_map(|layout| PrimitiveDateTime::parse(raw, *layout).ok())
        .map(PrimitiveDateTime::assume_utc)
}

/// Whole seconds since the Unix epoch, as telemetry packets carry them.
fn parse_epoch(raw: &str) -> Option<OffsetDateTime> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let secs: i64 = raw.parse().ok()?;
    OffsetDateTime::from_unix_timestamp(secs).ok()
}

/// Normalize a reading timestamp to canonical RFC3339 UTC.
///
/// Accepts RFC3339 silently, and zone-less ISO layouts or epoch seconds with a
/// `INGEST_TS_NORMALIZED` warning. Anything else yields `None` plus
/// `INGEST_TS_UNPARSEABLE`. Empty input yields `None` with no warning.
pub fn normalize_timestamp(
    field: &str,
    raw_input: &str,
    warnings: &mut Vec<ValidationWarning>,
) -> Option<String> {
    let trimmed = raw_input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return to_canonical(dt);
    }

    let fallback = parse_naive(trimmed)
        .map(|dt| (dt, "assumed UTC"))
        .or_else(|| parse_epoch(trimmed).map(|dt| (dt, "epoch seconds")));

    if let Some((dt, how)) = fallback {
        let canonical = to_canonical(dt)?;
        warnings.push(
            ValidationWarning::new(
                "INGEST_TS_NORMALIZED",
                format!("Normalized non-RFC3339 timestamp for {field} ({how})"),
            )
            .with_details(format!("raw={trimmed}; canonical={canonical}")),
        );
        return Some(canonical);
    }

    warnings.push(
        ValidationWarning::new(
            "INGEST_TS_UNPARSEABLE",
            format!("Unparseable timestamp for {field}"),
        )
        .with_details(format!("raw={trimmed}")),
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_with_offset_is_moved_to_utc() {
        let mut w = Vec::new();
        let out = normalize_timestamp("detected_at", "2026-07-04T14:30:00+02:00", &mut w);
        assert_eq!(out.as_deref(), Some("2026-07-04T12:30:00Z"));
        assert!(w.is_empty());
    }

    #[test]
    fn naive_layout_assumes_utc_and_warns() {
        let mut w = Vec::new();
        let out = normalize_timestamp("detected_at", "2026-07-04 14:30", &mut w);
        assert_eq!(out.as_deref(), Some("2026-07-04T14:30:00Z"));
        assert_eq!(w[0].code, "INGEST_TS_NORMALIZED");
    }

    #[test]
    fn epoch_seconds() {
        let mut w = Vec::new();
        let out = normalize_timestamp("detected_at", "1767225600", &mut w);
        assert_eq!(out.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(w.len(), 1);
    }

    #[test]
    fn garbage_is_reported() {
        let mut w = Vec::new();
        assert_eq!(normalize_timestamp("detected_at", "yesterday", &mut w), None);
        assert_eq!(w[0].code, "INGEST_TS_UNPARSEABLE");
    }
}
