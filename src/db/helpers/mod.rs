use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_default_timestamps() {
        let parsed = parse_datetime("2026-10-19T07:05:00+00:00", "created_at").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-10-19T07:05:00+00:00");
    }

    #[test]
    fn reports_field_on_failure() {
        let err = parse_datetime("yesterday", "end_date").unwrap_err();
        assert!(err.to_string().contains("end_date"));
        assert!(parse_optional_datetime(None, "deleted_at").unwrap().is_none());
    }
}
