//! Request counts from a reverse-proxy access log
//!
//! Lines are Traefik JSON entries; anything that does not parse as JSON is
//! matched as plain text.

use crate::models::RequestStats;
use chrono::Local;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Default, Deserialize)]
struct AccessLogEntry {
    #[serde(rename = "RequestHost", default)]
    request_host: String,
    #[serde(rename = "StartUTC", default)]
    start_utc: String,
    #[serde(default)]
    time: String,
}

/// Running tally for one domain
#[derive(Debug)]
struct Tally<'a> {
    domain: &'a str,
    today: &'a str,
    stats: RequestStats,
}

impl<'a> Tally<'a> {
    fn new(domain: &'a str, today: &'a str) -> Self {
        Self {
            domain,
            today,
            stats: RequestStats::empty(domain),
        }
    }

    fn observe(&mut self, line: &str) {
        match serde_json::from_str::<AccessLogEntry>(line) {
            Ok(entry) => {
                if entry.request_host != self.domain {
                    return;
                }
                self.stats.total_count += 1;
                if entry.start_utc.starts_with(self.today) || entry.time.starts_with(self.today) {
                    self.stats.today_count += 1;
                }
            }
            Err(_) => {
                if !line.contains(self.domain) {
                    return;
                }
                self.stats.total_count += 1;
                if line.contains(self.today) {
                    self.stats.today_count += 1;
                }
            }
        }
    }
}

/// Access log on disk
#[derive(Debug, Clone)]
pub struct AccessLog {
    path: PathBuf,
}

impl AccessLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Count requests for `domain`, in total and for today's local date
    pub async fn count(&self, domain: &str) -> io::Result<RequestStats> {
        let today = Local::now().format("%Y-%m-%d").to_string();
        self.count_on(domain, &today).await
    }

    async fn count_on(&self, domain: &str, today: &str) -> io::Result<RequestStats> {
        let file = File::open(&self.path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut tally = Tally::new(domain, today);

        while let Some(line) = lines.next_line().await? {
            tally.observe(&line);
        }

        Ok(tally.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const TODAY: &str = "2025-12-29";

    fn log_file(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_count_json_entries() {
        let file = log_file(&[
            r#"{"RequestHost":"example.com","StartUTC":"2025-12-29T14:00:31.427569156Z"}"#,
            r#"{"RequestHost":"example.com","StartUTC":"2025-12-28T09:12:00Z"}"#,
            r#"{"RequestHost":"example.com","time":"2025-12-29T10:00:00+08:00"}"#,
            r#"{"RequestHost":"other.com","StartUTC":"2025-12-29T14:00:31Z"}"#,
        ]);

        let stats = AccessLog::new(file.path())
            .count_on("example.com", TODAY)
            .await
            .unwrap();

        assert_eq!(stats.domain, "example.com");
        assert_eq!(stats.total_count, 3);
        assert_eq!(stats.today_count, 2);
    }

    #[tokio::test]
    async fn test_json_host_must_match_exactly() {
        let file = log_file(&[
            r#"{"RequestHost":"api.example.com","StartUTC":"2025-12-29T14:00:31Z"}"#,
        ]);

        let stats = AccessLog::new(file.path())
            .count_on("example.com", TODAY)
            .await
            .unwrap();

        assert_eq!(stats.total_count, 0);
    }

    #[tokio::test]
    async fn test_count_text_fallback() {
        let file = log_file(&[
            r#"10.0.0.1 - - [29/Dec/2025] "GET / HTTP/1.1" 200 example.com 2025-12-29"#,
            r#"10.0.0.1 - - [28/Dec/2025] "GET / HTTP/1.1" 200 example.com 2025-12-28"#,
            r#"10.0.0.2 - - [29/Dec/2025] "GET / HTTP/1.1" 200 other.com 2025-12-29"#,
            "",
        ]);

        let stats = AccessLog::new(file.path())
            .count_on("example.com", TODAY)
            .await
            .unwrap();

        assert_eq!(stats.total_count, 2);
        assert_eq!(stats.today_count, 1);
    }

    #[tokio::test]
    async fn test_count_uses_local_date() {
        let today = Local::now().format("%Y-%m-%d").to_string();
        let line = format!(r#"{{"RequestHost":"example.com","StartUTC":"{}T00:00:01Z"}}"#, today);
        let file = log_file(&[&line]);

        let stats = AccessLog::new(file.path()).count("example.com").await.unwrap();

        assert_eq!(stats.total_count, 1);
        assert_eq!(stats.today_count, 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = AccessLog::new(dir.path().join("access.log"));

        assert!(log.count("example.com").await.is_err());
    }
}
