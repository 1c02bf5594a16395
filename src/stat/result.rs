use std::fmt;
use std::time::{Duration, Instant};

use super::report::Timings;

/// Port that makes `get_conn` guess TLS before any handshake hook fires.
const TLS_PORT: &str = "443";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum TlsSignal {
    #[default]
    Unknown,
    /// Guessed from the destination port.
    PortHeuristic,
    /// A handshake hook fired on this request.
    Handshake,
}

/// Timeline of one request, reduced from lifecycle hook events.
///
/// Every mark is optional: a hook that never fired leaves its mark unset and
/// the phases depending on it read as zero. Phase durations and cumulative
/// values are derived from the marks on every read, so back-filling marks
/// (reused connections, dialers without hooks) collapses those phases to
/// exactly zero.
///
/// The reducer methods take the event time explicitly; the hook-facing
/// wrapper is [`StatRecorder`](crate::trace::StatRecorder).
#[derive(Debug, Default, Clone)]
pub struct HttpStat {
    dns_start: Option<Instant>,
    dns_done: Option<Instant>,
    tcp_start: Option<Instant>,
    tcp_done: Option<Instant>,
    tls_start: Option<Instant>,
    tls_done: Option<Instant>,
    server_write_done: Option<Instant>,
    server_first_byte: Option<Instant>,
    transfer_done: Option<Instant>,

    tls: TlsSignal,
    reused: bool,
}

impl HttpStat {
    pub fn new() -> Self {
        Self::default()
    }

    /// The client is about to look for a connection to `host_port`.
    pub fn on_get_conn(&mut self, host_port: &str) {
        if self.tls != TlsSignal::Unknown {
            return;
        }
        match split_port(host_port) {
            Some(TLS_PORT) => self.tls = TlsSignal::PortHeuristic,
            Some(_) => {}
            None => trace!("ignoring malformed host:port {:?}", host_port),
        }
    }

    pub fn on_dns_start(&mut self, now: Instant) {
        self.dns_start = Some(now);
    }

    pub fn on_dns_done(&mut self, now: Instant) {
        self.dns_done = Some(now);
    }

    pub fn on_connect_start(&mut self, now: Instant) {
        self.tcp_start = Some(now);

        // Dialing an IP literal skips name resolution.
        if self.dns_start.is_none() {
            self.dns_start = Some(now);
            self.dns_done = Some(now);
        }
    }

    pub fn on_connect_done(&mut self, now: Instant) {
        self.tcp_done = Some(now);
    }

    pub fn on_tls_handshake_start(&mut self, now: Instant) {
        self.tls = TlsSignal::Handshake;
        self.tls_start = Some(now);
    }

    pub fn on_tls_handshake_done(&mut self, now: Instant) {
        self.tls_done = Some(now);
    }

    pub fn on_got_conn(&mut self, reused: bool, now: Instant) {
        if reused {
            self.reused = true;
            self.collapse_connection_marks(now);
        }
    }

    pub fn on_wrote_request(&mut self, now: Instant) {
        self.server_write_done = Some(now);

        // No dial hooks at all (the dialer does not report) or a pooled
        // connection: nothing was looked up, dialed or negotiated for this
        // request.
        let unhooked = self.dns_start.is_none() && self.tcp_start.is_none();
        if unhooked || self.reused {
            self.collapse_connection_marks(now);
        }
    }

    pub fn on_first_response_byte(&mut self, now: Instant) {
        self.server_first_byte = Some(now);
    }

    /// Records when the response body was fully read.
    ///
    /// Call once, after draining the body. A second call overwrites the
    /// first. Without a `dns_start` mark the request never ran and
    /// `content_transfer`/`total` stay zero.
    pub fn end(&mut self, t: Instant) {
        self.transfer_done = Some(t);
    }

    fn collapse_connection_marks(&mut self, now: Instant) {
        trace!(reused = self.reused, "collapsing dns/tcp/tls marks");
        self.dns_start = Some(now);
        self.dns_done = Some(now);
        self.tcp_start = Some(now);
        self.tcp_done = Some(now);
        if self.is_tls() {
            self.tls_start = Some(now);
            self.tls_done = Some(now);
        }
    }

    pub fn is_tls(&self) -> bool {
        self.tls != TlsSignal::Unknown
    }

    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Whether [`end`](Self::end) has been called.
    pub fn is_finalized(&self) -> bool {
        self.transfer_done.is_some()
    }

    pub fn dns_lookup(&self) -> Duration {
        span(self.dns_start, self.dns_done)
    }

    pub fn tcp_connection(&self) -> Duration {
        span(self.tcp_start, self.tcp_done)
    }

    pub fn tls_handshake(&self) -> Duration {
        if self.is_tls() {
            span(self.tls_start, self.tls_done)
        } else {
            Duration::ZERO
        }
    }

    pub fn server_processing(&self) -> Duration {
        span(self.server_write_done, self.server_first_byte)
    }

    pub fn content_transfer(&self) -> Duration {
        if self.dns_start.is_none() {
            return Duration::ZERO;
        }
        span(self.server_first_byte, self.transfer_done)
    }

    pub fn name_lookup(&self) -> Duration {
        span(self.dns_start, self.dns_done)
    }

    pub fn connect(&self) -> Duration {
        span(self.dns_start, self.tcp_done)
    }

    /// Time until the request was fully written.
    pub fn pretransfer(&self) -> Duration {
        span(self.dns_start, self.server_write_done)
    }

    pub fn start_transfer(&self) -> Duration {
        span(self.dns_start, self.server_first_byte)
    }

    pub fn total(&self) -> Duration {
        if self.dns_start.is_none() {
            return Duration::ZERO;
        }
        span(self.dns_start, self.transfer_done)
    }

    /// Content transfer so far, measured up to `t` instead of the end mark.
    pub fn content_transfer_at(&self, t: Instant) -> Duration {
        span(self.server_first_byte, Some(t))
    }

    /// Whole request so far, measured up to `t` instead of the end mark.
    pub fn total_at(&self, t: Instant) -> Duration {
        span(self.dns_start, Some(t))
    }

    pub fn timings(&self) -> Timings {
        Timings {
            dns_lookup: self.dns_lookup(),
            tcp_connection: self.tcp_connection(),
            tls_handshake: self.tls_handshake(),
            server_processing: self.server_processing(),
            content_transfer: self.content_transfer(),
            name_lookup: self.name_lookup(),
            connect: self.connect(),
            pretransfer: self.pretransfer(),
            start_transfer: self.start_transfer(),
            total: self.total(),
            finalized: self.is_finalized(),
        }
    }
}

/// Same output as [`Timings`]: compact with `{}`, verbose with `{:#}`.
impl fmt::Display for HttpStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.timings(), f)
    }
}

fn span(from: Option<Instant>, to: Option<Instant>) -> Duration {
    match (from, to) {
        (Some(from), Some(to)) => to.saturating_duration_since(from),
        _ => Duration::ZERO,
    }
}

/// Port part of `host:port` or `[v6]:port`; `None` when malformed.
fn split_port(host_port: &str) -> Option<&str> {
    if let Some(rest) = host_port.strip_prefix('[') {
        let (_, after) = rest.split_once(']')?;
        return after.strip_prefix(':');
    }
    let (host, port) = host_port.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    Some(port)
}
