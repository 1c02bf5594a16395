use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::{ClientTrace, GotConnInfo, TraceContext};
use crate::stat::{HttpStat, Timings};

/// Caller-owned handle to the [`HttpStat`] of one request.
///
/// Bind it with [`with_http_stat`], drive exactly one request with the
/// returned context, drain the body, then call [`end`](Self::end). Clones
/// share the same timeline. Using one recorder for two requests in flight
/// at once mixes their marks.
#[derive(Debug, Clone, Default)]
pub struct StatRecorder {
    inner: Arc<Mutex<HttpStat>>,
}

/// Binds `recorder` to `ctx`: the returned context, once attached to a
/// request, stamps every lifecycle hook into the recorder.
pub fn with_http_stat(ctx: TraceContext, recorder: &StatRecorder) -> TraceContext {
    ctx.with_trace(Arc::new(recorder.clone()))
}

impl StatRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HttpStat> {
        // The reducer cannot panic halfway through an update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stamp(&self, f: impl FnOnce(&mut HttpStat, Instant)) {
        f(&mut *self.lock(), Instant::now());
    }

    /// Marks the response body as fully read at `t`.
    pub fn end(&self, t: Instant) {
        self.lock().end(t);
    }

    pub fn snapshot(&self) -> HttpStat {
        self.lock().clone()
    }

    pub fn timings(&self) -> Timings {
        self.lock().timings()
    }

    pub fn content_transfer_at(&self, t: Instant) -> Duration {
        self.lock().content_transfer_at(t)
    }

    pub fn total_at(&self, t: Instant) -> Duration {
        self.lock().total_at(t)
    }
}

impl ClientTrace for StatRecorder {
    fn get_conn(&self, host_port: &str) {
        self.lock().on_get_conn(host_port);
    }

    fn dns_start(&self, _host: &str) {
        self.stamp(HttpStat::on_dns_start);
    }

    fn dns_done(&self) {
        self.stamp(HttpStat::on_dns_done);
    }

    fn connect_start(&self, _network: &str, _addr: &SocketAddr) {
        self.stamp(HttpStat::on_connect_start);
    }

    fn connect_done(&self, _network: &str, _addr: &SocketAddr) {
        self.stamp(HttpStat::on_connect_done);
    }

    fn tls_handshake_start(&self) {
        self.stamp(HttpStat::on_tls_handshake_start);
    }

    fn tls_handshake_done(&self) {
        self.stamp(HttpStat::on_tls_handshake_done);
    }

    fn got_conn(&self, info: GotConnInfo) {
        self.stamp(|stat, now| stat.on_got_conn(info.reused, now));
    }

    fn wrote_request(&self) {
        self.stamp(HttpStat::on_wrote_request);
    }

    fn got_first_response_byte(&self) {
        self.stamp(HttpStat::on_first_response_byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn hooks_stamp_the_shared_timeline() {
        let recorder = StatRecorder::new();
        let ctx = with_http_stat(TraceContext::new(), &recorder);
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();

        ctx.get_conn("localhost:80");
        ctx.dns_start("localhost");
        sleep(Duration::from_millis(2));
        ctx.dns_done();
        ctx.connect_start("tcp", &addr);
        sleep(Duration::from_millis(2));
        ctx.connect_done("tcp", &addr);
        ctx.got_conn(GotConnInfo { reused: false });
        sleep(Duration::from_millis(1));
        ctx.wrote_request();
        sleep(Duration::from_millis(2));
        ctx.got_first_response_byte();
        sleep(Duration::from_millis(2));

        let sampled = recorder.total_at(Instant::now());
        assert!(sampled >= Duration::from_millis(9));
        assert!(recorder.content_transfer_at(Instant::now()) >= Duration::from_millis(2));
        assert!(!recorder.timings().finalized);

        recorder.end(Instant::now());
        let timings = recorder.timings();
        assert!(timings.finalized);
        assert!(timings.dns_lookup >= Duration::from_millis(2));
        assert!(timings.tcp_connection >= Duration::from_millis(2));
        assert_eq!(timings.tls_handshake, Duration::ZERO);
        assert!(timings.server_processing >= Duration::from_millis(2));
        assert!(timings.content_transfer >= Duration::from_millis(2));
        assert!(timings.total >= sampled);
        assert!(!recorder.snapshot().is_reused());
    }

    #[test]
    fn bound_but_unused_recorder_stays_zero() {
        let recorder = StatRecorder::new();
        let _ctx = with_http_stat(TraceContext::new(), &recorder);
        recorder.end(Instant::now());

        let timings = recorder.timings();
        assert_eq!(timings.total, Duration::ZERO);
        assert_eq!(timings.content_transfer, Duration::ZERO);
        assert_eq!(timings.dns_lookup, Duration::ZERO);
    }
}
