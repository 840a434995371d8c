//! Transport abstractions for the bridge protocol
//!
//! The protocol needs line-based writes and both line-based and
//! fixed-length binary reads over one persistent duplex stream. `LineIo`
//! captures exactly that surface; `Connect` creates fresh connections so the
//! frame retry path can tear down and rebuild the channel.

use async_trait::async_trait;
use scape_rl_core::{Result, ScapeRLError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Duplex byte stream with line and exact-length reads
#[async_trait]
pub trait LineIo: Send {
    /// Write `line` followed by a newline and flush
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Read one line, stripped of its terminator
    async fn read_line(&mut self) -> Result<String>;

    /// Fill `buf` exactly from the stream
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Tear the stream down; errors are ignored
    async fn shutdown(&mut self);
}

/// Factory for fresh connections to the simulation endpoint
#[async_trait]
pub trait Connect: Send {
    type Io: LineIo;

    async fn connect(&self) -> Result<Self::Io>;
}

/// TCP transport with a per-operation timeout
pub struct TcpTransport {
    stream: BufReader<TcpStream>,
    timeout: Duration,
}

impl TcpTransport {
    pub fn new(stream: TcpStream, timeout: Duration) -> Self {
        Self {
            stream: BufReader::new(stream),
            timeout,
        }
    }
}

#[async_trait]
impl LineIo for TcpTransport {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let timeout = self.timeout;
        let stream = self.stream.get_mut();
        let write = async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await
        };
        tokio::time::timeout(timeout, write)
            .await
            .map_err(|_| ScapeRLError::Timeout(format!("write timed out: {line}")))?
            .map_err(|e| ScapeRLError::Connection(format!("write failed: {e}")))
    }

    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(self.timeout, self.stream.read_line(&mut line))
            .await
            .map_err(|_| ScapeRLError::Timeout("read timed out waiting for line".into()))?
            .map_err(|e| ScapeRLError::Connection(format!("read failed: {e}")))?;
        if n == 0 {
            return Err(ScapeRLError::Connection("connection closed".into()));
        }
        Ok(line.trim_end().to_string())
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        tokio::time::timeout(self.timeout, self.stream.read_exact(buf))
            .await
            .map_err(|_| ScapeRLError::Timeout("read timed out mid-payload".into()))?
            .map_err(|e| ScapeRLError::Connection(format!("payload read failed: {e}")))?;
        Ok(())
    }

    async fn shutdown(&mut self) {
        let _ = self.stream.get_mut().shutdown().await;
    }
}

/// Connects `TcpTransport`s to a fixed endpoint
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Endpoint address (`host:port`)
    pub addr: String,
    /// Connect and per-operation I/O timeout
    pub timeout: Duration,
}

impl TcpConnector {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            timeout,
        }
    }
}

#[async_trait]
impl Connect for TcpConnector {
    type Io = TcpTransport;

    async fn connect(&self) -> Result<TcpTransport> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| ScapeRLError::Timeout(format!("connect timeout to {}", self.addr)))?
            .map_err(|e| ScapeRLError::Connection(format!("connect to {} failed: {e}", self.addr)))?;

        // Input events are tiny; don't let Nagle batch them
        stream
            .set_nodelay(true)
            .map_err(|e| ScapeRLError::Connection(format!("failed to set TCP_NODELAY: {e}")))?;

        Ok(TcpTransport::new(stream, self.timeout))
    }
}
