//! Connection establishment for the uploader
//!
//! The uploader only needs "something that opens a writable stream";
//! [`IcecastConnector`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::handshake::{check_response, SourceRequest};
use crate::error::UploadError;

/// Idle time before TCP keepalive probes start
const KEEPALIVE_IDLE: Duration = Duration::from_secs(30);

/// Largest handshake reply read
const RESPONSE_LIMIT: usize = 4096;

/// Opens a connection that is ready to receive the encoded stream
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: AsyncWrite + Unpin + Send;

    async fn connect(&self) -> Result<Self::Conn, UploadError>;

    /// Human readable endpoint, for logging
    fn target(&self) -> String;
}

/// SOURCE-over-TCP connector for one mountpoint
#[derive(Debug, Clone)]
pub struct IcecastConnector {
    host: String,
    port: u16,
    request: SourceRequest,
}

impl IcecastConnector {
    pub fn new(host: impl Into<String>, port: u16, request: SourceRequest) -> Self {
        Self {
            host: host.into(),
            port,
            request,
        }
    }
}

#[async_trait]
impl Connector for IcecastConnector {
    type Conn = TcpStream;

    async fn connect(&self) -> Result<TcpStream, UploadError> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.set_nodelay(true)?;
        SockRef::from(&stream)
            .set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_IDLE))?;

        stream.write_all(&self.request.to_bytes()).await?;

        let mut response = vec![0u8; RESPONSE_LIMIT];
        let n = stream.read(&mut response).await?;
        response.truncate(n);
        debug!(
            "[{}] server replied {:?}",
            self.request.label,
            String::from_utf8_lossy(&response)
        );
        check_response(&response)?;

        Ok(stream)
    }

    fn target(&self) -> String {
        format!("{}:{}{}", self.host, self.port, self.request.mountpoint())
    }
}
