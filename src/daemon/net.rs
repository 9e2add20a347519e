use std::io;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Bind `host:port`. Port `0` takes any free port; a busy nonzero port falls
/// back to any free port instead of failing.
///
/// Binding directly (rather than probing and releasing first) means the port
/// written to the descriptor is the one actually held.
pub async fn bind_listener(host: &str, port: u16) -> io::Result<TcpListener> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if port == 0 {
        return TcpListener::bind((host, 0)).await;
    }

    match TcpListener::bind((host, port)).await {
        Ok(listener) => Ok(listener),
        Err(e)
            if e.kind() == io::ErrorKind::AddrInUse
                || e.kind() == io::ErrorKind::PermissionDenied =>
        {
            warn!(host, port, error = %e, "Requested port unavailable, using a free port");
            let listener = TcpListener::bind((host, 0)).await?;
            info!(port = listener.local_addr()?.port(), "Bound fallback port");
            Ok(listener)
        }
        Err(e) => Err(e),
    }
}

/// `http://host:port`, with IPv6 literals bracketed.
pub fn format_base_url(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("http://[{host}]:{port}")
    } else {
        format!("http://{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_brackets_ipv6() {
        assert_eq!(format_base_url("127.0.0.1", 80), "http://127.0.0.1:80");
        assert_eq!(format_base_url("::1", 9000), "http://[::1]:9000");
        assert_eq!(format_base_url("[::1]", 9000), "http://[::1]:9000");
        assert_eq!(format_base_url("localhost", 1), "http://localhost:1");
    }

    #[tokio::test]
    async fn port_zero_picks_a_free_port() {
        let listener = bind_listener("127.0.0.1", 0).await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn busy_port_falls_back() {
        let held = bind_listener("127.0.0.1", 0).await.unwrap();
        let busy = held.local_addr().unwrap().port();

        let listener = bind_listener("127.0.0.1", busy).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert_ne!(port, busy);
        assert_ne!(port, 0);
    }
}
