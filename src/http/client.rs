use crate::http::connector::{Connect, Destination, TracedConnector};
use crate::http::pool::{Pool, PooledConn};
use crate::http::stream::{RequestSlot, TracedStream};
use crate::tls::config::{client_config, TlsOptions};
use crate::trace::{ClientTrace, GotConnInfo, TraceContext};
use anyhow::Context;
use bytes::Bytes;
use http::header::{HeaderValue, HOST};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::{Request, Response, Uri};
use hyper_util::rt::TokioIo;
use pki_types::{CertificateDer, ServerName};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector;
use tracing::Instrument;

/// HTTP/1.1 client that fires the hooks of the [`TraceContext`] attached to
/// each request.
///
/// Connections are kept alive and reused across requests to the same
/// scheme, host and port. Cloning shares the pool.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientRef>,
}

struct ClientRef {
    connector: Arc<dyn Connect>,
    tls: TlsConnector,
    pool: Pool,
}

#[derive(Default)]
pub struct ClientBuilder {
    connector: Option<Arc<dyn Connect>>,
    connect_timeout: Option<Duration>,
    tls: TlsOptions,
}

impl ClientBuilder {
    /// Replaces the default [`TracedConnector`].
    pub fn connector(mut self, connector: impl Connect) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Per-address limit for the default connector.
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = Some(connect_timeout);
        self
    }

    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.tls.extra_roots.push(cert);
        self
    }

    /// Trust the PEM bundle at `path` instead of the bundled roots.
    pub fn ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ca_file = Some(path.into());
        self
    }

    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.tls.insecure = accept;
        self
    }

    pub fn build(self) -> Result<Client, anyhow::Error> {
        let tls = client_config(&self.tls)?;
        let connector: Arc<dyn Connect> = match self.connector {
            Some(connector) => connector,
            None => {
                let mut connector = TracedConnector::new();
                connector.set_connect_timeout(self.connect_timeout);
                Arc::new(connector)
            }
        };

        Ok(Client {
            inner: Arc::new(ClientRef {
                connector,
                tls: TlsConnector::from(Arc::new(tls)),
                pool: Pool::default(),
            }),
        })
    }
}

impl Client {
    pub fn new() -> Result<Self, anyhow::Error> {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Sends `req`, which must carry an absolute `http`/`https` URI, and
    /// returns once the response head has arrived. The body is left for the
    /// caller to drain.
    pub async fn request(
        &self,
        mut req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, anyhow::Error> {
        let trace = TraceContext::from_request(&req);
        let dst = Destination::from_uri(req.uri())?;

        trace.get_conn(&dst.host_port());
        let mut conn = match self.inner.pool.checkout(&dst).await {
            Some(conn) => {
                debug!("Reusing connection to {}", dst);
                trace.got_conn(GotConnInfo { reused: true });
                conn
            }
            None => {
                let conn = self.dial(&dst, &trace).await?;
                trace.got_conn(GotConnInfo { reused: false });
                conn
            }
        };

        to_origin_form(&mut req, &dst)?;
        conn.slot.arm(trace);
        let res = conn
            .sender
            .send_request(req)
            .await
            .with_context(|| format!("Failed to send request to {}", dst))?;

        self.inner.pool.checkin(dst, conn);
        Ok(res)
    }

    async fn dial(
        &self,
        dst: &Destination,
        trace: &TraceContext,
    ) -> Result<PooledConn, anyhow::Error> {
        let stream = self
            .inner
            .connector
            .connect(dst, trace)
            .await
            .with_context(|| format!("Failed to connect to {}", dst))?;
        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let slot = RequestSlot::default();

        let sender = if dst.is_https() {
            let domain = ServerName::try_from(dst.host())
                .map_err(|e| anyhow!("{}", e))?
                .to_owned();
            trace.tls_handshake_start();
            let tls_stream = self.inner.tls.connect(domain, stream).await;
            trace.tls_handshake_done();
            let tls_stream =
                tls_stream.with_context(|| format!("TLS handshake with {} failed", dst))?;
            handshake(
                TracedStream::new(tls_stream, slot.clone()),
                local_addr,
                remote_addr,
            )
            .await?
        } else {
            handshake(
                TracedStream::new(stream, slot.clone()),
                local_addr,
                remote_addr,
            )
            .await?
        };

        Ok(PooledConn { sender, slot })
    }
}

async fn handshake<S>(
    stream: TracedStream<S>,
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
) -> Result<SendRequest<Full<Bytes>>, anyhow::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sender, conn) = http1::handshake(TokioIo::new(stream))
        .instrument(info_span!("Http Handshake"))
        .await?;
    tokio::task::spawn(
        async move {
            if let Err(err) = conn.await {
                debug!("Connection failed: {:?}", err);
            }
        }
        .instrument(info_span!(
            "conn",
            localAddr = %local_addr,
            remoteAddr = %remote_addr,
        )),
    );
    Ok(sender)
}

/// HTTP/1.1 request line wants the path only; the authority moves to `Host`.
fn to_origin_form(
    req: &mut Request<Full<Bytes>>,
    dst: &Destination,
) -> Result<(), anyhow::Error> {
    if !req.headers().contains_key(HOST) {
        req.headers_mut()
            .insert(HOST, HeaderValue::from_str(&dst.authority())?);
    }
    let origin: Uri = req
        .uri()
        .path_and_query()
        .map_or("/", |p| p.as_str())
        .parse()?;
    *req.uri_mut() = origin;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_form_keeps_path_and_query() {
        let mut req = Request::get("http://example.com:8080/a/b?c=d")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let dst = Destination::from_uri(req.uri()).unwrap();
        to_origin_form(&mut req, &dst).unwrap();

        assert_eq!(req.uri(), "/a/b?c=d");
        assert_eq!(req.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn origin_form_keeps_explicit_host_header() {
        let mut req = Request::get("https://example.com")
            .header(HOST, "other.example")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let dst = Destination::from_uri(req.uri()).unwrap();
        to_origin_form(&mut req, &dst).unwrap();

        assert_eq!(req.uri(), "/");
        assert_eq!(req.headers()[HOST], "other.example");
    }
}
