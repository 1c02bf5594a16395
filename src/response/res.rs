use crate::stat::{HttpStat, Timings};
use hyper::{StatusCode, Version};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportStyle {
    Verbose,
    Compact,
    Json,
}

/// Outcome of one timed request, ready to print.
#[derive(Debug, Clone)]
pub struct StatReport {
    pub url: String,
    pub status: StatusCode,
    pub version: Version,
    pub body_len: u64,
    pub body_path: Option<String>,
    pub stat: HttpStat,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    url: &'a str,
    status: u16,
    version: String,
    body_bytes: u64,
    tls: bool,
    reused: bool,
    timings: Timings,
}

impl StatReport {
    pub fn render(&self, style: ReportStyle) -> Result<String, anyhow::Error> {
        let timings = self.stat.timings();
        let rendered = match style {
            ReportStyle::Verbose => {
                let body = match self.body_path.as_ref() {
                    Some(path) => format!("Body stored in: {}", path),
                    None => format!("Body discarded ({} bytes)", self.body_len),
                };
                format!(
                    "{:?} {}\n{}\n\n{:#}",
                    self.version, self.status, body, timings
                )
            }
            ReportStyle::Compact => format!(
                "{:?} {} {}",
                self.version,
                self.status.as_u16(),
                timings
            ),
            ReportStyle::Json => serde_json::to_string_pretty(&JsonReport {
                url: &self.url,
                status: self.status.as_u16(),
                version: format!("{:?}", self.version),
                body_bytes: self.body_len,
                tls: self.stat.is_tls(),
                reused: self.stat.is_reused(),
                timings,
            })?,
        };
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn report() -> StatReport {
        let t0 = Instant::now();
        let mut stat = HttpStat::new();
        stat.on_get_conn("example.com:80");
        stat.on_dns_start(t0);
        stat.on_dns_done(t0 + Duration::from_millis(3));
        stat.on_connect_start(t0 + Duration::from_millis(3));
        stat.on_connect_done(t0 + Duration::from_millis(8));
        stat.on_wrote_request(t0 + Duration::from_millis(9));
        stat.on_first_response_byte(t0 + Duration::from_millis(20));
        stat.end(t0 + Duration::from_millis(25));

        StatReport {
            url: "http://example.com/".to_string(),
            status: StatusCode::OK,
            version: Version::HTTP_11,
            body_len: 1256,
            body_path: None,
            stat,
        }
    }

    #[test]
    fn verbose_starts_with_status_and_body_summary() {
        let out = report().render(ReportStyle::Verbose).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 OK\nBody discarded (1256 bytes)\n\nDNS lookup:"));
        assert!(out.ends_with("Total:            25 ms\n"));
    }

    #[test]
    fn compact_is_one_line() {
        let out = report().render(ReportStyle::Compact).unwrap();
        assert!(out.starts_with("HTTP/1.1 200 DNSLookup: 3 ms, TCPConnection: 5 ms"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn json_carries_flags_and_timings() {
        let out = report().render(ReportStyle::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["status"], 200);
        assert_eq!(value["tls"], false);
        assert_eq!(value["reused"], false);
        assert_eq!(value["timings"]["ServerProcessing"], 11);
        assert_eq!(value["timings"]["Total"], 25);
    }
}
