use crate::tls::verifier::StatCertVerifier;
use anyhow::Context;
use pki_types::CertificateDer;
use rustls::crypto::ring::{default_provider, DEFAULT_CIPHER_SUITES};
use rustls::crypto::CryptoProvider;
use rustls::{ClientConfig, RootCertStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM bundle replacing the bundled webpki roots.
    pub ca_file: Option<PathBuf>,
    /// Trusted in addition to the roots above.
    pub extra_roots: Vec<CertificateDer<'static>>,
    pub insecure: bool,
}

/// Client configuration for HTTP/1.1 over TLS with the ring provider.
/// Honours `SSLKEYLOGFILE`.
pub fn client_config(opts: &TlsOptions) -> Result<ClientConfig, anyhow::Error> {
    let mut root_store = RootCertStore::empty();
    if let Some(file_path) = opts.ca_file.as_ref() {
        let f = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open CA bundle {}", file_path.display()))?;
        let mut rd = std::io::BufReader::new(f);
        for cert in rustls_pemfile::certs(&mut rd) {
            root_store.add(cert?)?;
        }
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }
    for cert in &opts.extra_roots {
        root_store.add(cert.clone())?;
    }

    let provider = Arc::new(CryptoProvider {
        cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
        ..default_provider()
    });
    let verifier = StatCertVerifier::new(opts.insecure, provider.clone(), &root_store)?;

    let mut tls_config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(rustls::DEFAULT_VERSIONS)?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    tls_config
        .dangerous()
        .set_certificate_verifier(Arc::new(verifier));
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];
    tls_config.key_log = Arc::new(rustls::KeyLogFile::new());

    Ok(tls_config)
}
