use std::net::{SocketAddr, ToSocketAddrs};

/// Resolves `host` on the blocking pool, logging what came back.
pub async fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, anyhow::Error> {
    let owned = host.to_string();
    debug!("Resolving DNS for: {}", host);

    let addresses: Vec<SocketAddr> =
        tokio::task::spawn_blocking(move || (owned, port).to_socket_addrs())
            .await??
            .collect();

    if addresses.is_empty() {
        error!("DNS resolution for {} returned no addresses.", host);
        return Err(anyhow!("No IP addresses found for host {}", host));
    }

    for (i, addr) in addresses.iter().enumerate() {
        if i == 0 {
            debug!("Resolved IP: {}", addr.ip());
        } else {
            debug!("Resolved IP (alternative): {}", addr.ip());
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let addrs = resolve("localhost", 8080).await.unwrap();
        assert!(addrs.iter().all(|a| a.port() == 8080));
        assert!(addrs.iter().any(|a| a.ip().is_loopback()));
    }
}
