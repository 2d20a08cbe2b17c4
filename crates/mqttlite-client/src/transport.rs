//! Transport boundary. The engine treats the channel as an opaque,
//! in-order byte stream; closure (`read` returning 0) is reported
//! distinctly from errors. TLS variants plug in behind the same trait and
//! are selected by `EncryptionMode` before connecting.

use mqttlite_protocol::error::{MqttError, Result};
use std::future::Future;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub trait Transport: Send {
    /// Establishes (or re-establishes) the connection.
    fn connect(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Reads into `buf`, resolving with 0 when the peer closed. Must be
    /// cancel-safe: dropping the future loses no bytes.
    fn read(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Writes the whole buffer.
    fn write(&mut self, buf: &[u8]) -> impl Future<Output = Result<()>> + Send;

    fn close(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn is_connected(&self) -> bool;
}

/// TLS mode selector, matching the device shell's `encryption: 0-3`
/// argument. The engine passes it through to the transport factory and
/// otherwise ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    None = 0,
    Psk = 1,
    OneWayCert = 2,
    TwoWayCert = 3,
}

impl TryFrom<u8> for EncryptionMode {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Psk),
            2 => Ok(Self::OneWayCert),
            3 => Ok(Self::TwoWayCert),
            other => Err(MqttError::Configuration(format!(
                "Invalid encryption mode: {other} (expected 0-3)"
            ))),
        }
    }
}

/// Plain TCP transport. Reconnectable: `close` then `connect` yields a
/// fresh stream, which the downgrade and auto-reconnect paths rely on.
#[derive(Debug)]
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            stream: None,
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Transport for TcpTransport {
    async fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| MqttError::ConnectionError(format!("{}:{}: {e}", self.host, self.port)))?;
        let _ = stream.set_nodelay(true);
        self.stream = Some(stream);
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.stream.as_mut() {
            Some(stream) => stream.read(buf).await.map_err(MqttError::from),
            None => Err(MqttError::NotConnected),
        }
    }

    async fn write(&mut self, buf: &[u8]) -> Result<()> {
        match self.stream.as_mut() {
            Some(stream) => stream.write_all(buf).await.map_err(MqttError::from),
            None => Err(MqttError::NotConnected),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }
}
