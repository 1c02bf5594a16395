use crate::http::resolver::resolve;
use crate::trace::{ClientTrace, TraceContext};
use anyhow::Context;
use futures::future::BoxFuture;
use hyper::Uri;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Where a request goes. Also the keep-alive pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Destination {
    pub fn from_uri(uri: &Uri) -> Result<Self, anyhow::Error> {
        let scheme = match uri.scheme_str() {
            Some("http") => Scheme::Http,
            Some("https") => Scheme::Https,
            Some(other) => bail!("unsupported scheme: {}", other),
            None => bail!("uri has no scheme: {}", uri),
        };
        let host = uri.host().ok_or_else(|| anyhow!("uri has no host: {}", uri))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        ensure!(!host.is_empty(), "uri has an empty host: {}", uri);

        Ok(Self {
            scheme,
            host: host.to_string(),
            port: uri.port_u16().unwrap_or(scheme.default_port()),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn is_https(&self) -> bool {
        self.scheme == Scheme::Https
    }

    /// Host without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }

    pub fn has_default_port(&self) -> bool {
        self.port == self.scheme.default_port()
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn host_port(&self) -> String {
        match self.ip() {
            Some(IpAddr::V6(ip)) => format!("[{}]:{}", ip, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }

    /// Value for the `Host` header.
    pub fn authority(&self) -> String {
        if !self.has_default_port() {
            return self.host_port();
        }
        match self.ip() {
            Some(IpAddr::V6(ip)) => format!("[{}]", ip),
            _ => self.host.clone(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}", scheme, self.host_port())
    }
}

/// Dials the TCP stream for a destination.
///
/// Implementations decide whether dns/connect hooks fire. TLS is layered on
/// top by the client.
pub trait Connect: Send + Sync + 'static {
    fn connect<'a>(
        &'a self,
        dst: &'a Destination,
        trace: &'a TraceContext,
    ) -> BoxFuture<'a, Result<TcpStream, anyhow::Error>>;
}

/// Resolves and dials address by address, reporting every step to the
/// request's hooks.
#[derive(Debug, Clone, Default)]
pub struct TracedConnector {
    connect_timeout: Option<Duration>,
}

impl TracedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Option<Duration>) {
        self.connect_timeout = connect_timeout;
    }

    async fn dial(&self, addr: SocketAddr) -> Result<TcpStream, anyhow::Error> {
        let connecting = TcpStream::connect(addr);
        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, connecting)
                .await
                .map_err(|_| anyhow!("connect to {} timed out after {:?}", addr, limit))??,
            None => connecting.await?,
        };
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

impl Connect for TracedConnector {
    fn connect<'a>(
        &'a self,
        dst: &'a Destination,
        trace: &'a TraceContext,
    ) -> BoxFuture<'a, Result<TcpStream, anyhow::Error>> {
        Box::pin(async move {
            let addrs = match dst.ip() {
                Some(ip) => vec![SocketAddr::new(ip, dst.port())],
                None => {
                    trace.dns_start(dst.host());
                    let resolved = resolve(dst.host(), dst.port()).await;
                    trace.dns_done();
                    resolved?
                }
            };

            let mut last_error = None;
            for addr in addrs {
                trace.connect_start("tcp", &addr);
                let dialed = self.dial(addr).await;
                trace.connect_done("tcp", &addr);
                match dialed {
                    Ok(stream) => {
                        debug!("Connected to {} ({})", dst.host(), addr);
                        return Ok(stream);
                    }
                    Err(e) => {
                        debug!("Connect to {} failed: {}", addr, e);
                        last_error = Some(e);
                    }
                }
            }
            Err(last_error.unwrap_or_else(|| anyhow!("no address to connect to for {}", dst)))
        })
    }
}

/// Dials without firing any hook, like a dialer that predates tracing.
/// Timing then collapses dns/tcp/tls into the request-written mark.
#[derive(Debug, Clone, Default)]
pub struct PlainConnector;

impl Connect for PlainConnector {
    fn connect<'a>(
        &'a self,
        dst: &'a Destination,
        _trace: &'a TraceContext,
    ) -> BoxFuture<'a, Result<TcpStream, anyhow::Error>> {
        Box::pin(async move {
            TcpStream::connect((dst.host(), dst.port()))
                .await
                .with_context(|| format!("failed to connect to {}", dst))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dst(uri: &str) -> Destination {
        Destination::from_uri(&uri.parse().unwrap()).unwrap()
    }

    #[test]
    fn destination_defaults_port_by_scheme() {
        let https = dst("https://example.com/a?b=c");
        assert!(https.is_https());
        assert_eq!(https.port(), 443);
        assert_eq!(https.host_port(), "example.com:443");
        assert_eq!(https.authority(), "example.com");

        let http = dst("http://example.com:8080");
        assert_eq!(http.scheme(), Scheme::Http);
        assert_eq!(http.host_port(), "example.com:8080");
        assert_eq!(http.authority(), "example.com:8080");
        assert_eq!(http.to_string(), "http://example.com:8080");
    }

    #[test]
    fn destination_handles_ip_literals() {
        let v6 = dst("http://[::1]:8080/");
        assert_eq!(v6.host(), "::1");
        assert_eq!(v6.ip(), Some("::1".parse().unwrap()));
        assert_eq!(v6.host_port(), "[::1]:8080");

        let v4 = dst("https://127.0.0.1/");
        assert_eq!(v4.authority(), "127.0.0.1");
        assert_eq!(v4.host_port(), "127.0.0.1:443");
    }

    #[test]
    fn destination_rejects_other_schemes() {
        assert!(Destination::from_uri(&"ftp://example.com".parse().unwrap()).is_err());
        assert!(Destination::from_uri(&"/relative".parse().unwrap()).is_err());
    }
}
