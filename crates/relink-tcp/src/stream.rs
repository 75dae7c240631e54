//! TCP stream implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use relink_transport_traits::{
    Stream, StreamFactory, StreamTimeouts, TransportError, TransportResult,
};

/// TCP stream configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Write timeout in milliseconds, `None` to wait indefinitely
    pub write_timeout_ms: Option<u64>,
    /// Disable Nagle's algorithm
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            write_timeout_ms: Some(5000),
            nodelay: true,
        }
    }
}

impl TcpConfig {
    /// Derive a TCP configuration from generic stream timeouts
    pub fn from_timeouts(timeouts: &StreamTimeouts) -> Self {
        Self {
            connect_timeout_ms: timeouts.connect.as_millis() as u64,
            write_timeout_ms: timeouts.write.map(|limit| limit.as_millis() as u64),
            ..Self::default()
        }
    }
}

/// A [`Stream`] over a Tokio TCP socket
#[derive(Debug)]
pub struct TcpStreamTransport {
    /// `host:port` target
    address: String,
    config: TcpConfig,
    /// Inter-character read timeout
    char_timeout: Option<Duration>,
    /// Open socket, `None` until `open()` succeeds
    socket: Option<TcpStream>,
}

impl TcpStreamTransport {
    /// Create an unopened stream for `address`
    #[must_use]
    pub fn new(address: impl Into<String>, config: TcpConfig) -> Self {
        Self {
            address: address.into(),
            config,
            char_timeout: None,
            socket: None,
        }
    }

    /// Returns the configured inter-character timeout
    pub fn char_timeout(&self) -> Option<Duration> {
        self.char_timeout
    }

    fn socket_mut(&mut self) -> TransportResult<&mut TcpStream> {
        self.socket.as_mut().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl Stream for TcpStreamTransport {
    fn address(&self) -> &str {
        &self.address
    }

    fn set_char_timeout(&mut self, timeout: Duration) {
        self.char_timeout = Some(timeout);
    }

    async fn open(&mut self) -> TransportResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        debug!("Connecting to TCP endpoint at {}", self.address);

        let socket = timeout(connect_timeout, TcpStream::connect(self.address.as_str()))
            .await
            .map_err(|_| TransportError::ConnectionTimeout {
                operation: format!("connect {}", self.address),
                timeout: connect_timeout,
            })?
            .map_err(|e| {
                TransportError::ConnectionFailed(format!(
                    "Failed to connect to {}: {e}",
                    self.address
                ))
            })?;

        if self.config.nodelay {
            socket.set_nodelay(true)?;
        }

        debug!("Connected to TCP endpoint at {}", self.address);
        self.socket = Some(socket);
        Ok(())
    }

    async fn flush(&mut self) -> TransportResult<()> {
        self.socket_mut()?.flush().await?;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> TransportResult<usize> {
        let char_timeout = self.char_timeout;
        let address = self.address.clone();
        let socket = self.socket_mut()?;

        let n = match char_timeout {
            Some(limit) => timeout(limit, socket.read(buf)).await.map_err(|_| {
                TransportError::ReadTimeout {
                    operation: format!("read {address}"),
                    timeout: limit,
                }
            })??,
            None => socket.read(buf).await?,
        };

        trace!("Read {} bytes from {}", n, address);
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> TransportResult<()> {
        let write_timeout = self.config.write_timeout_ms.map(Duration::from_millis);
        let address = self.address.clone();
        let socket = self.socket_mut()?;

        match write_timeout {
            Some(limit) => timeout(limit, socket.write_all(data))
                .await
                .map_err(|_| TransportError::SendFailed(format!("write to {address} timed out")))??,
            None => socket.write_all(data).await?,
        }

        trace!("Wrote {} bytes to {}", data.len(), address);
        Ok(())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut socket) = self.socket.take() {
            debug!("Closing TCP stream to {}", self.address);
            // The peer may already be gone
            if let Err(e) = socket.shutdown().await {
                trace!("TCP shutdown for {} reported: {}", self.address, e);
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

/// Creates [`TcpStreamTransport`]s from `host:port` addresses
#[derive(Debug, Clone, Default)]
pub struct TcpStreamFactory {
    config: TcpConfig,
}

impl TcpStreamFactory {
    /// Create a factory with the given configuration
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Create a factory builder
    #[must_use]
    pub fn builder() -> TcpStreamFactoryBuilder {
        TcpStreamFactoryBuilder::new()
    }

    /// Returns the configuration handed to every created stream
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl StreamFactory for TcpStreamFactory {
    fn create(&self, address: &str) -> TransportResult<Box<dyn Stream>> {
        let valid = address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            return Err(TransportError::InvalidAddress(format!(
                "expected host:port, got {address:?}"
            )));
        }

        Ok(Box::new(TcpStreamTransport::new(address, self.config.clone())))
    }
}

/// TCP stream factory builder
#[derive(Debug)]
pub struct TcpStreamFactoryBuilder {
    config: TcpConfig,
}

impl TcpStreamFactoryBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    /// Set connection timeout
    #[must_use]
    pub const fn connect_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.connect_timeout_ms = timeout;
        self
    }

    /// Set write timeout
    #[must_use]
    pub const fn write_timeout_ms(mut self, timeout: Option<u64>) -> Self {
        self.config.write_timeout_ms = timeout;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    #[must_use]
    pub const fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Build the factory
    #[must_use]
    pub fn build(self) -> TcpStreamFactory {
        TcpStreamFactory::new(self.config)
    }
}

impl Default for TcpStreamFactoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_config_default() {
        let config = TcpConfig::default();
        assert_eq!(config.connect_timeout_ms, 5000);
        assert!(config.nodelay);
    }

    #[test]
    fn test_tcp_config_from_timeouts() {
        let config = TcpConfig::from_timeouts(&StreamTimeouts::unlimited());
        assert_eq!(config.connect_timeout_ms, 30_000);
        assert_eq!(config.write_timeout_ms, None);
        assert!(config.nodelay);
    }

    #[test]
    fn test_factory_builder() {
        let factory = TcpStreamFactory::builder()
            .connect_timeout_ms(250)
            .write_timeout_ms(None)
            .nodelay(false)
            .build();

        assert_eq!(factory.config().connect_timeout_ms, 250);
        assert_eq!(factory.config().write_timeout_ms, None);
        assert!(!factory.config().nodelay);
    }

    #[test]
    fn test_factory_rejects_address_without_port() {
        let factory = TcpStreamFactory::default();
        assert!(matches!(
            factory.create("dev1"),
            Err(TransportError::InvalidAddress(_))
        ));
        assert!(matches!(
            factory.create("dev1:notaport"),
            Err(TransportError::InvalidAddress(_))
        ));

        let stream = factory.create("dev1:4000").unwrap();
        assert_eq!(stream.address(), "dev1:4000");
        assert!(!stream.is_open());
    }

    #[tokio::test]
    async fn test_read_without_open_is_not_connected() {
        let mut stream = TcpStreamTransport::new("127.0.0.1:1", TcpConfig::default());
        let mut buf = [0u8; 8];
        assert_eq!(
            stream.read(&mut buf).await,
            Err(TransportError::NotConnected)
        );
    }

    #[tokio::test]
    async fn test_open_write_read_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(&buf).await.unwrap();
        });

        let mut stream = TcpStreamTransport::new(addr.to_string(), TcpConfig::default());
        stream.set_char_timeout(Duration::from_secs(2));
        stream.open().await.unwrap();
        stream.flush().await.unwrap();
        assert!(stream.is_open());

        stream.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        let mut filled = 0;
        while filled < buf.len() {
            filled += stream.read(&mut buf[filled..]).await.unwrap();
        }
        assert_eq!(&buf, b"ping");

        stream.close().await.unwrap();
        assert!(!stream.is_open());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_char_timeout_expires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(socket);
        });

        let mut stream = TcpStreamTransport::new(addr.to_string(), TcpConfig::default());
        stream.set_char_timeout(Duration::from_millis(20));
        stream.open().await.unwrap();

        let mut buf = [0u8; 8];
        assert!(matches!(
            stream.read(&mut buf).await,
            Err(TransportError::ReadTimeout { .. })
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failure() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut stream = TcpStreamTransport::new(addr.to_string(), TcpConfig::default());
        let err = stream.open().await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::ConnectionFailed(_) | TransportError::ConnectionTimeout { .. }
        ));
    }
}
