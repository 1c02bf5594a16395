//! Lifecycle hooks fired by [`Client`](crate::http::client::Client) while it
//! drives a request, and the context that carries them.
//!
//! Hooks are bound explicitly: build a [`TraceContext`], attach it to the
//! request, and hand the request to the client. Nothing is registered
//! globally.

mod recorder;

pub use recorder::{with_http_stat, StatRecorder};

use http::Request;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

/// Details of the connection a request is about to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GotConnInfo {
    /// The connection came out of the keep-alive pool.
    pub reused: bool,
}

/// Request lifecycle callbacks. Every hook defaults to a no-op.
///
/// Hooks of one request fire in lifecycle order, one at a time, though not
/// necessarily on the same thread. Any of them may be skipped (reused
/// connection, IP literal, dialer without hooks) and a few may fire more
/// than once.
pub trait ClientTrace: Send + Sync + 'static {
    /// Before a connection is looked up or dialed for `host_port`.
    fn get_conn(&self, _host_port: &str) {}

    fn dns_start(&self, _host: &str) {}

    fn dns_done(&self) {}

    /// Once per attempted address.
    fn connect_start(&self, _network: &str, _addr: &SocketAddr) {}

    fn connect_done(&self, _network: &str, _addr: &SocketAddr) {}

    fn tls_handshake_start(&self) {}

    fn tls_handshake_done(&self) {}

    /// A connection was obtained, fresh or from the pool.
    fn got_conn(&self, _info: GotConnInfo) {}

    /// The request was handed to the socket and flushed.
    fn wrote_request(&self) {}

    fn got_first_response_byte(&self) {}
}

/// Execution context of one request: the hook sets bound to it.
///
/// Cloning is cheap. Binding more hooks on top of an existing context keeps
/// the earlier ones; all of them fire, in binding order.
#[derive(Clone, Default)]
pub struct TraceContext {
    hooks: Vec<Arc<dyn ClientTrace>>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trace(mut self, trace: Arc<dyn ClientTrace>) -> Self {
        self.hooks.push(trace);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// The context attached to `req`, or an empty one.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        req.extensions()
            .get::<TraceContext>()
            .cloned()
            .unwrap_or_default()
    }

    /// Threads this context into `req` so the client fires its hooks.
    pub fn attach<B>(self, req: &mut Request<B>) {
        req.extensions_mut().insert(self);
    }

    fn each(&self, f: impl Fn(&dyn ClientTrace)) {
        for hook in &self.hooks {
            f(hook.as_ref());
        }
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl ClientTrace for TraceContext {
    fn get_conn(&self, host_port: &str) {
        self.each(|t| t.get_conn(host_port));
    }

    fn dns_start(&self, host: &str) {
        self.each(|t| t.dns_start(host));
    }

    fn dns_done(&self) {
        self.each(|t| t.dns_done());
    }

    fn connect_start(&self, network: &str, addr: &SocketAddr) {
        self.each(|t| t.connect_start(network, addr));
    }

    fn connect_done(&self, network: &str, addr: &SocketAddr) {
        self.each(|t| t.connect_done(network, addr));
    }

    fn tls_handshake_start(&self) {
        self.each(|t| t.tls_handshake_start());
    }

    fn tls_handshake_done(&self) {
        self.each(|t| t.tls_handshake_done());
    }

    fn got_conn(&self, info: GotConnInfo) {
        self.each(|t| t.got_conn(info));
    }

    fn wrote_request(&self) {
        self.each(|t| t.wrote_request());
    }

    fn got_first_response_byte(&self) {
        self.each(|t| t.got_first_response_byte());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EventLog {
        tag: &'static str,
        events: Arc<Mutex<Vec<String>>>,
    }

    impl ClientTrace for EventLog {
        fn get_conn(&self, host_port: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:get_conn:{}", self.tag, host_port));
        }

        fn got_conn(&self, info: GotConnInfo) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:got_conn:{}", self.tag, info.reused));
        }
    }

    #[test]
    fn bound_hooks_fire_in_binding_order() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let ctx = TraceContext::new()
            .with_trace(Arc::new(EventLog {
                tag: "a",
                events: events.clone(),
            }))
            .with_trace(Arc::new(EventLog {
                tag: "b",
                events: events.clone(),
            }));

        ctx.get_conn("example.com:443");
        ctx.got_conn(GotConnInfo { reused: true });
        ctx.wrote_request();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                "a:get_conn:example.com:443",
                "b:get_conn:example.com:443",
                "a:got_conn:true",
                "b:got_conn:true",
            ]
        );
    }

    #[test]
    fn context_travels_in_request_extensions() {
        let mut req = Request::new(());
        assert!(TraceContext::from_request(&req).is_empty());

        TraceContext::new()
            .with_trace(Arc::new(EventLog::default()))
            .attach(&mut req);
        assert!(!TraceContext::from_request(&req).is_empty());
    }
}
