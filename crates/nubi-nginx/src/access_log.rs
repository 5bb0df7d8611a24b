//! nginx combined-format access log parsing
//!
//! Logs are tailed from nginx, never stored. Presentation heuristics
//! (geolocation, browser sniffing) belong to the UI and are not modeled
//! here.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use utoipa::ToSchema;

// 127.0.0.1 - - [10/Dec/2024:10:00:00 +0000] "GET /path HTTP/1.1" 200 1234 "ref" "ua"
static COMBINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(\S+) \S+ \S+ \[([^\]]+)\] "(\S+) (\S+)[^"]*" (\d+) (\d+) "([^"]*)" "([^"]*)""#)
        .unwrap()
});

/// One parsed access-log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogRecord {
    /// Client address
    pub ip: String,
    /// Timestamp as written by nginx, e.g. `10/Dec/2024:10:00:00 +0000`
    pub time: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    /// Response body bytes
    pub size: i64,
    pub referer: String,
    pub user_agent: String,
}

/// Aggregate view over an access log
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogStats {
    pub total_requests: u64,
    pub unique_ips: usize,
    pub status_codes: HashMap<u16, u64>,
    /// Most recent entries, newest first
    pub recent: Vec<AccessLogRecord>,
}

/// Parse one combined-format line; `None` for lines in any other format.
pub fn parse_line(line: &str) -> Option<AccessLogRecord> {
    let caps = COMBINED_RE.captures(line)?;

    Some(AccessLogRecord {
        ip: caps[1].to_string(),
        time: caps[2].to_string(),
        method: caps[3].to_string(),
        path: caps[4].to_string(),
        status: caps[5].parse().ok()?,
        size: caps[6].parse().ok()?,
        referer: caps[7].to_string(),
        user_agent: caps[8].to_string(),
    })
}

/// Return up to `limit` most recent parsed entries, newest first.
///
/// A missing log file yields an empty list, matching the first-run case.
pub async fn tail(path: &Path, limit: usize) -> Vec<AccessLogRecord> {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(_) => return Vec::new(),
    };

    contents
        .lines()
        .rev()
        .filter_map(parse_line)
        .take(limit)
        .collect()
}

/// Scan the whole log into aggregate statistics, keeping the newest
/// `recent_limit` entries.
pub async fn stats(path: &Path, recent_limit: usize) -> AccessLogStats {
    let contents = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(_) => return AccessLogStats::default(),
    };

    let mut stats = AccessLogStats::default();
    let mut ips: HashMap<String, u64> = HashMap::new();

    for record in contents.lines().filter_map(parse_line) {
        stats.total_requests += 1;
        *ips.entry(record.ip.clone()).or_default() += 1;
        *stats.status_codes.entry(record.status).or_default() += 1;
        stats.recent.push(record);
    }

    stats.unique_ips = ips.len();
    stats.recent.reverse();
    stats.recent.truncate(recent_limit);
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LINE: &str = r#"203.0.113.9 - - [10/Dec/2024:10:00:00 +0000] "GET /api/users HTTP/1.1" 200 1234 "https://example.com" "Mozilla/5.0""#;

    #[test]
    fn parses_combined_format() {
        let record = parse_line(LINE).unwrap();
        assert_eq!(record.ip, "203.0.113.9");
        assert_eq!(record.time, "10/Dec/2024:10:00:00 +0000");
        assert_eq!(record.method, "GET");
        assert_eq!(record.path, "/api/users");
        assert_eq!(record.status, 200);
        assert_eq!(record.size, 1234);
        assert_eq!(record.referer, "https://example.com");
        assert_eq!(record.user_agent, "Mozilla/5.0");
    }

    #[test]
    fn rejects_other_formats() {
        assert!(parse_line("").is_none());
        assert!(parse_line("2024-12-10 error something broke").is_none());
    }

    #[tokio::test]
    async fn tail_returns_newest_first() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        let lines: Vec<String> = (0..5)
            .map(|i| {
                format!(
                    r#"10.0.0.{i} - - [10/Dec/2024:10:00:0{i} +0000] "GET /p{i} HTTP/1.1" 200 10 "-" "curl""#
                )
            })
            .collect();
        std::fs::write(&log, lines.join("\n")).unwrap();

        let records = tail(&log, 2).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, "/p4");
        assert_eq!(records[1].path, "/p3");
    }

    #[tokio::test]
    async fn missing_log_is_empty_not_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(tail(&dir.path().join("nope.log"), 10).await.is_empty());
        let s = stats(&dir.path().join("nope.log"), 10).await;
        assert_eq!(s.total_requests, 0);
    }

    #[tokio::test]
    async fn stats_aggregate_status_codes_and_ips() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("access.log");
        let body = [
            r#"10.0.0.1 - - [10/Dec/2024:10:00:00 +0000] "GET /a HTTP/1.1" 200 10 "-" "curl""#,
            r#"10.0.0.1 - - [10/Dec/2024:10:00:01 +0000] "GET /b HTTP/1.1" 404 10 "-" "curl""#,
            r#"10.0.0.2 - - [10/Dec/2024:10:00:02 +0000] "POST /c HTTP/1.1" 200 10 "-" "curl""#,
            "garbage line",
        ]
        .join("\n");
        std::fs::write(&log, body).unwrap();

        let s = stats(&log, 10).await;
        assert_eq!(s.total_requests, 3);
        assert_eq!(s.unique_ips, 2);
        assert_eq!(s.status_codes[&200], 2);
        assert_eq!(s.status_codes[&404], 1);
        assert_eq!(s.recent[0].path, "/c");
    }
}
