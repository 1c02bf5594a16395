use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;
use std::time::Duration;

/// Names of the reported values, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    ContentTransfer,
    NameLookup,
    Connect,
    Pretransfer,
    StartTransfer,
    Total,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::DnsLookup,
        Metric::TcpConnection,
        Metric::TlsHandshake,
        Metric::ServerProcessing,
        Metric::ContentTransfer,
        Metric::NameLookup,
        Metric::Connect,
        Metric::Pretransfer,
        Metric::StartTransfer,
        Metric::Total,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::DnsLookup => "DNSLookup",
            Metric::TcpConnection => "TCPConnection",
            Metric::TlsHandshake => "TLSHandshake",
            Metric::ServerProcessing => "ServerProcessing",
            Metric::ContentTransfer => "ContentTransfer",
            Metric::NameLookup => "NameLookup",
            Metric::Connect => "Connect",
            Metric::Pretransfer => "Pretransfer",
            Metric::StartTransfer => "StartTransfer",
            Metric::Total => "Total",
        }
    }

    /// Only known once the body has been drained.
    pub fn needs_end(self) -> bool {
        matches!(self, Metric::ContentTransfer | Metric::Total)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Phase durations and cumulative timeline of one request.
///
/// `{}` renders the one-line form, `{:#}` the two-block report. Both print
/// `-` for content transfer and total until the request is finalized.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub dns_lookup: Duration,
    pub tcp_connection: Duration,
    pub tls_handshake: Duration,
    pub server_processing: Duration,
    pub content_transfer: Duration,

    pub name_lookup: Duration,
    pub connect: Duration,
    pub pretransfer: Duration,
    pub start_transfer: Duration,
    pub total: Duration,

    pub finalized: bool,
}

impl Timings {
    pub fn get(&self, metric: Metric) -> Duration {
        match metric {
            Metric::DnsLookup => self.dns_lookup,
            Metric::TcpConnection => self.tcp_connection,
            Metric::TlsHandshake => self.tls_handshake,
            Metric::ServerProcessing => self.server_processing,
            Metric::ContentTransfer => self.content_transfer,
            Metric::NameLookup => self.name_lookup,
            Metric::Connect => self.connect,
            Metric::Pretransfer => self.pretransfer,
            Metric::StartTransfer => self.start_transfer,
            Metric::Total => self.total,
        }
    }

    pub fn durations(&self) -> [(Metric, Duration); 10] {
        Metric::ALL.map(|metric| (metric, self.get(metric)))
    }

    fn millis(&self, metric: Metric) -> Option<u128> {
        if metric.needs_end() && !self.finalized {
            None
        } else {
            Some(self.get(metric).as_millis())
        }
    }

    fn fmt_verbose(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DNS lookup:        {:>4} ms", self.dns_lookup.as_millis())?;
        writeln!(f, "TCP connection:    {:>4} ms", self.tcp_connection.as_millis())?;
        writeln!(f, "TLS handshake:     {:>4} ms", self.tls_handshake.as_millis())?;
        writeln!(f, "Server processing: {:>4} ms", self.server_processing.as_millis())?;
        writeln!(
            f,
            "Content transfer:  {:>4} ms\n",
            Field(self.millis(Metric::ContentTransfer))
        )?;

        writeln!(f, "Name Lookup:    {:>4} ms", self.name_lookup.as_millis())?;
        writeln!(f, "Connect:        {:>4} ms", self.connect.as_millis())?;
        writeln!(f, "Pre Transfer:   {:>4} ms", self.pretransfer.as_millis())?;
        writeln!(f, "Start Transfer: {:>4} ms", self.start_transfer.as_millis())?;
        writeln!(f, "Total:          {:>4} ms", Field(self.millis(Metric::Total)))
    }

    fn fmt_compact(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, metric) in Metric::ALL.into_iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {} ms", metric, Field(self.millis(metric)))?;
        }
        Ok(())
    }
}

impl fmt::Display for Timings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            self.fmt_verbose(f)
        } else {
            self.fmt_compact(f)
        }
    }
}

/// Milliseconds, or `-` when not measured yet. Honours width and alignment.
struct Field(Option<u128>);

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(ms) => fmt::Display::fmt(&ms, f),
            None => f.pad("-"),
        }
    }
}

impl Serialize for Timings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Metric::ALL.len()))?;
        for metric in Metric::ALL {
            let ms = self
                .millis(metric)
                .map(|ms| u64::try_from(ms).unwrap_or(u64::MAX));
            map.serialize_entry(metric.key(), &ms)?;
        }
        map.end()
    }
}
