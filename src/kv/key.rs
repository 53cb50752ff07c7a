use crate::error::OvsdbError;
use std::time::{SystemTime, UNIX_EPOCH};

pub const COMMENT_TABLE: &str = "_comment";

/// Structured backend key for one row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataKey {
    pub database: String,
    pub table: String,
    /// Row UUID, or the timestamp for `_comment` keys.
    pub uuid: String,
}

/// Converts between structured keys and the flat
/// `<prefix>/<database>/<table>/<uuid>` form used on the backend.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix: String,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn data_key(&self, database: &str, table: &str, uuid: &str) -> String {
        format!("{}/{}/{}/{}", self.prefix, database, table, uuid)
    }

    /// Prefix covering every row of a table; the trailing slash keeps
    /// `table1` from matching `table10`.
    pub fn table_prefix(&self, database: &str, table: &str) -> String {
        format!("{}/{}/{}/", self.prefix, database, table)
    }

    pub fn comment_key(&self, database: &str, timestamp: &str) -> String {
        self.data_key(database, COMMENT_TABLE, timestamp)
    }

    pub fn parse(&self, flat: &str) -> Result<DataKey, OvsdbError> {
        let rest = flat
            .strip_prefix(self.prefix.as_str())
            .and_then(|r| r.strip_prefix('/'))
            .ok_or(OvsdbError::Internal)?;
        let mut parts = rest.splitn(3, '/');
        let database = parts.next().filter(|p| !p.is_empty());
        let table = parts.next().filter(|p| !p.is_empty());
        let uuid = parts.next().filter(|p| !p.is_empty());
        match (database, table, uuid) {
            (Some(database), Some(table), Some(uuid)) => Ok(DataKey {
                database: database.to_string(),
                table: table.to_string(),
                uuid: uuid.to_string(),
            }),
            _ => Err(OvsdbError::Internal),
        }
    }
}

/// RFC 3339 timestamp (UTC, second precision) for comment keys.
pub fn rfc3339_now() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    rfc3339_utc(secs)
}

pub fn rfc3339_utc(unix_secs: u64) -> String {
    let days = (unix_secs / 86_400) as i64;
    let rem = unix_secs % 86_400;
    let (year, month, day) = civil_from_days(days);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        month,
        day,
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60
    )
}

// Gregorian date from days since the Unix epoch.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::{rfc3339_utc, KeyCodec};

    #[test]
    fn data_key_roundtrip_with_slashed_prefix() {
        let codec = KeyCodec::new("ovsdb/nb");
        let flat = codec.data_key("simple", "table1", "36bef046-7da7-43a5-905a-c17899216fcb");
        assert_eq!(
            flat,
            "ovsdb/nb/simple/table1/36bef046-7da7-43a5-905a-c17899216fcb"
        );
        let key = codec.parse(&flat).unwrap();
        assert_eq!(key.database, "simple");
        assert_eq!(key.table, "table1");
        assert_eq!(key.uuid, "36bef046-7da7-43a5-905a-c17899216fcb");
    }

    #[test]
    fn table_prefix_does_not_match_longer_table_names() {
        let codec = KeyCodec::new("ovsdb");
        let prefix = codec.table_prefix("db", "table1");
        assert!(codec.data_key("db", "table1", "x").starts_with(&prefix));
        assert!(!codec.data_key("db", "table10", "x").starts_with(&prefix));
    }

    #[test]
    fn parse_rejects_foreign_and_truncated_keys() {
        let codec = KeyCodec::new("ovsdb/nb");
        assert!(codec.parse("other/simple/table1/u").is_err());
        assert!(codec.parse("ovsdb/nb/simple/table1").is_err());
        assert!(codec.parse("ovsdb/nb//table1/u").is_err());
    }

    #[test]
    fn rfc3339_known_values() {
        assert_eq!(rfc3339_utc(0), "1970-01-01T00:00:00Z");
        assert_eq!(rfc3339_utc(951_782_400), "2000-02-29T00:00:00Z");
        assert_eq!(rfc3339_utc(1_704_067_199), "2023-12-31T23:59:59Z");
    }
}
