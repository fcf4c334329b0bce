use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// An amount as it arrives from clients or the vision model: either a plain
/// number or free text with currency symbols and digit grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountValue {
    Number(f64),
    Text(String),
}

/// Coerce a heterogeneous amount into a canonical positive decimal.
///
/// Numbers pass through as-is. Strings are stripped of everything that is not
/// an ASCII digit or a decimal point, so Indian grouping ("₹1,50,000") and
/// western grouping ("$1,500.00") both reduce to the plain number. Returns
/// `0.0` for missing/empty/unparseable input; callers must treat `0.0` as
/// "amount unknown", never as a valid donation.
pub fn normalize_amount(input: Option<&AmountValue>) -> f64 {
    match input {
        None => 0.0,
        Some(AmountValue::Number(n)) => {
            if n.is_finite() {
                *n
            } else {
                0.0
            }
        }
        Some(AmountValue::Text(s)) => normalize_amount_str(s),
    }
}

pub fn normalize_amount_str(input: &str) -> f64 {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    match cleaned.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// A timestamp as the persistence layer or clients may hand it over: an
/// ISO/RFC3339 string, a bare epoch-seconds number, or an epoch wrapper
/// object in either of the document-store native shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Seconds { seconds: i64 },
    UnderscoreSeconds {
        #[serde(rename = "_seconds")]
        seconds: i64,
    },
    Epoch(i64),
    Iso(String),
}

/// Coerce any recognized timestamp shape into a UTC instant. Returns `None`
/// for anything unrecognized or producing an invalid date; never panics.
/// All timestamp-shape branching lives here and nowhere else.
pub fn normalize_date(input: Option<&TimestampValue>) -> Option<DateTime<Utc>> {
    match input {
        None => None,
        Some(TimestampValue::Seconds { seconds })
        | Some(TimestampValue::UnderscoreSeconds { seconds })
        | Some(TimestampValue::Epoch(seconds)) => DateTime::from_timestamp(*seconds, 0),
        Some(TimestampValue::Iso(s)) => parse_iso(s),
    }
}

fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_rupee_symbol_and_indian_grouping() {
        assert_eq!(normalize_amount_str("₹1,50,000"), 150000.0);
        assert_eq!(normalize_amount_str("₹500"), 500.0);
        assert_eq!(normalize_amount_str("₹3,000"), 3000.0);
    }

    #[test]
    fn strips_western_grouping() {
        assert_eq!(normalize_amount_str("$1,500.00"), 1500.0);
        assert_eq!(normalize_amount_str("1,234.56"), 1234.56);
    }

    #[test]
    fn unknown_amounts_become_zero() {
        assert_eq!(normalize_amount(None), 0.0);
        assert_eq!(normalize_amount_str(""), 0.0);
        assert_eq!(normalize_amount_str("abc"), 0.0);
        assert_eq!(normalize_amount_str("1.2.3"), 0.0);
        assert_eq!(
            normalize_amount(Some(&AmountValue::Number(f64::NAN))),
            0.0
        );
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(normalize_amount(Some(&AmountValue::Number(500.0))), 500.0);
        assert_eq!(normalize_amount(Some(&AmountValue::Number(0.5))), 0.5);
    }

    #[test]
    fn idempotent_over_its_own_output() {
        for raw in ["₹1,50,000", "$1,500.00", "500", "12.5"] {
            let once = normalize_amount_str(raw);
            let twice = normalize_amount_str(&once.to_string());
            assert_eq!(once, twice, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn parses_rfc3339_and_date_only() {
        let iso = TimestampValue::Iso("2026-02-18T10:30:00Z".to_string());
        let dt = normalize_date(Some(&iso)).expect("rfc3339");
        assert_eq!(dt.timestamp(), 1771410600);

        let date_only = TimestampValue::Iso("2026-02-18".to_string());
        assert!(normalize_date(Some(&date_only)).is_some());
    }

    #[test]
    fn parses_epoch_wrappers() {
        let secs = TimestampValue::Seconds { seconds: 1771410600 };
        assert_eq!(
            normalize_date(Some(&secs)).map(|d| d.timestamp()),
            Some(1771410600)
        );

        // document-store native shape with a leading underscore
        let wrapped: TimestampValue =
            serde_json::from_str(r#"{"_seconds": 1771410600}"#).expect("deserialize");
        assert_eq!(
            normalize_date(Some(&wrapped)).map(|d| d.timestamp()),
            Some(1771410600)
        );

        let bare: TimestampValue = serde_json::from_str("1771410600").expect("deserialize");
        assert_eq!(
            normalize_date(Some(&bare)).map(|d| d.timestamp()),
            Some(1771410600)
        );
    }

    #[test]
    fn unrecognized_dates_are_none() {
        assert_eq!(normalize_date(None), None);
        let garbage = TimestampValue::Iso("not a date".to_string());
        assert_eq!(normalize_date(Some(&garbage)), None);
        let empty = TimestampValue::Iso("".to_string());
        assert_eq!(normalize_date(Some(&empty)), None);
    }
}
