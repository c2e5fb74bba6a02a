//! Reverse tunnel interface boundary
//!
//! The tunnel transport itself is an external collaborator: what the agent
//! needs from it is a listener-shaped handle that yields bidirectional
//! streams for inbound session requests, obtained with the bearer token
//! from authorization. The traits here pin down that seam; `DialBackTunnel`
//! is a minimal TCP dial-back implementation for the binary, and tests
//! inject their own.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tether_core::error::TunnelError;
use tether_core::types::ServiceDescriptor;

/// A bidirectional session stream carried over the tunnel
pub trait TunnelStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> TunnelStream for T {}

/// An established reverse listener: accepts inbound session streams without
/// the device being inbound-reachable.
#[async_trait]
pub trait ReverseListener: Send {
    async fn accept(&mut self) -> Result<Box<dyn TunnelStream>, TunnelError>;
}

/// Acquires a reverse listener from the service, keyed by the bearer token
#[async_trait]
pub trait TunnelTransport: Send + Sync {
    async fn open(
        &self,
        service: &ServiceDescriptor,
        token: &str,
    ) -> Result<Box<dyn ReverseListener>, TunnelError>;
}

/// TCP dial-back transport.
///
/// Each accept dials the service, presents the bearer token, and parks the
/// connection until the service opens a session on it with an `OPEN` line.
/// One connection is pending at a time.
pub struct DialBackTunnel;

const HANDSHAKE_PREFIX: &str = "TETHER-TUNNEL";
const OPEN_LINE: &str = "OPEN";

#[async_trait]
impl TunnelTransport for DialBackTunnel {
    async fn open(
        &self,
        service: &ServiceDescriptor,
        token: &str,
    ) -> Result<Box<dyn ReverseListener>, TunnelError> {
        Ok(Box::new(DialBackListener {
            endpoint: format!("{}:{}", service.host, service.port),
            token: token.to_string(),
        }))
    }
}

struct DialBackListener {
    endpoint: String,
    token: String,
}

#[async_trait]
impl ReverseListener for DialBackListener {
    async fn accept(&mut self) -> Result<Box<dyn TunnelStream>, TunnelError> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| TunnelError(format!("dial {} failed: {}", self.endpoint, e)))?;

        let mut reader = BufReader::new(stream);

        let handshake = format!("{} {}\n", HANDSHAKE_PREFIX, self.token);
        reader
            .get_mut()
            .write_all(handshake.as_bytes())
            .await
            .map_err(|e| TunnelError(format!("handshake write failed: {}", e)))?;

        // Parked until the service starts a session on this connection
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .await
            .map_err(|e| TunnelError(format!("tunnel read failed: {}", e)))?;

        if n == 0 {
            return Err(TunnelError("tunnel closed by service".to_string()));
        }

        if line.trim() != OPEN_LINE {
            return Err(TunnelError(format!(
                "unexpected tunnel control line: {:?}",
                line.trim()
            )));
        }

        Ok(Box::new(reader))
    }
}
