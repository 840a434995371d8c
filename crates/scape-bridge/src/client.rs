//! Bridge protocol client
//!
//! Encodes commands onto the transport and decodes the three response
//! shapes: acknowledgement line, state line, and framed binary payload.
//! Frame reads own the only reconnect-and-retry path in the system; every
//! other operation fails immediately and lets the caller decide.

use crate::transport::{Connect, LineIo, TcpConnector};
use scape_rl_core::frame::NOT_CAPTURABLE;
use scape_rl_core::{CursorButton, Frame, FrameHeader, Result, ScapeRLError, StateSnapshot};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

/// Header re-read cadence while the capture side is still starting up
const HEADER_RETRY_PAUSE: Duration = Duration::from_millis(50);
const HEADER_RETRY_ATTEMPTS: u32 = 20;

/// Bounds for the frame retry-with-reconnect loop
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total budget before the last error is surfaced
    pub deadline: Duration,
    /// Pause between closing a dead connection and redialing
    pub reconnect_pause: Duration,
    /// Extra pause after a failed redial
    pub connect_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(15),
            reconnect_pause: Duration::from_millis(100),
            connect_backoff: Duration::from_millis(200),
        }
    }
}

/// Protocol client owning one connection to the simulation bridge
pub struct BridgeClient<C: Connect> {
    connector: C,
    io: Option<C::Io>,
    retry: RetryPolicy,
}

/// Client over the standard TCP transport
pub type TcpBridgeClient = BridgeClient<TcpConnector>;

impl TcpBridgeClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_connector(TcpConnector::new(host, port))
    }
}

impl<C: Connect> BridgeClient<C> {
    pub fn with_connector(connector: C) -> Self {
        Self {
            connector,
            io: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn set_retry_policy(&mut self, retry: RetryPolicy) {
        self.retry = retry;
    }

    /// Establish the connection. A second call while connected is a no-op.
    pub async fn connect(&mut self) -> Result<()> {
        if self.io.is_some() {
            return Ok(());
        }
        self.io = Some(self.connector.connect().await?);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.io.is_some()
    }

    /// Release the connection. Safe to call repeatedly; never errors.
    pub async fn close(&mut self) {
        if let Some(mut io) = self.io.take() {
            io.shutdown().await;
        }
    }

    fn io_mut(&mut self) -> Result<&mut C::Io> {
        self.io
            .as_mut()
            .ok_or_else(|| ScapeRLError::Connection("not connected".into()))
    }

    /// Write one command line and read its single-line response.
    async fn command(&mut self, line: &str) -> Result<String> {
        let io = self.io_mut()?;
        io.write_line(line).await?;
        io.read_line().await
    }

    pub async fn ping(&mut self) -> Result<String> {
        self.command("PING").await
    }

    pub async fn move_to(&mut self, x: u32, y: u32) -> Result<String> {
        self.command(&format!("MOVE {x} {y}")).await
    }

    pub async fn button_down(&mut self, button: CursorButton) -> Result<String> {
        self.command(&format!("DOWN {}", button.as_i32())).await
    }

    pub async fn button_up(&mut self, button: CursorButton) -> Result<String> {
        self.command(&format!("UP {}", button.as_i32())).await
    }

    pub async fn drag(&mut self, dx: i32, dy: i32) -> Result<String> {
        self.command(&format!("DRAG {dx} {dy}")).await
    }

    /// Read the current state snapshot.
    pub async fn state(&mut self) -> Result<StateSnapshot> {
        let line = self.command("STATE").await?;
        StateSnapshot::parse(&line)
    }

    /// Whether the session has finished login/UI initialization.
    pub async fn ready(&mut self) -> Result<bool> {
        let line = self.command("READY").await?;
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 2 || parts[0] != "READY" {
            return Err(ScapeRLError::Protocol(format!("bad ready header: {line}")));
        }
        Ok(parts[1] == "1")
    }

    /// Fetch the current frame without advancing the simulation.
    pub async fn frame(&mut self) -> Result<Frame> {
        self.request_frame(false).await
    }

    /// Advance at least one render cycle and fetch the resulting frame.
    pub async fn step_frame(&mut self) -> Result<Frame> {
        self.request_frame(true).await
    }

    /// One `FRAME`/`STEP` round trip, no reconnection.
    ///
    /// A `NOT_CAPTURABLE` header is re-read in place on a short cadence:
    /// the capture side may lag the accept loop during startup.
    async fn read_frame(&mut self, advance: bool) -> Result<Frame> {
        let command = if advance { "STEP" } else { "FRAME" };
        let io = self.io_mut()?;
        io.write_line(command).await?;

        let mut header_line = io.read_line().await?;
        if header_line == NOT_CAPTURABLE {
            for _ in 0..HEADER_RETRY_ATTEMPTS {
                sleep(HEADER_RETRY_PAUSE).await;
                header_line = io.read_line().await?;
                if !header_line.is_empty() && !header_line.starts_with("ERR") {
                    break;
                }
            }
        }

        let header = FrameHeader::parse(&header_line)?;
        let mut data = vec![0u8; header.len];
        io.read_exact(&mut data).await?;
        Frame::from_parts(header, data)
    }

    /// Frame request with the retry-with-reconnect wrapper.
    ///
    /// Any failure in the frame path (timeout, malformed header, closed
    /// connection) tears the connection down, pauses briefly, redials and
    /// reissues the request, until the policy deadline elapses. The last
    /// error is surfaced then. This is the only automatic reconnection in
    /// the client.
    pub async fn request_frame(&mut self, advance: bool) -> Result<Frame> {
        let deadline = Instant::now() + self.retry.deadline;
        let mut last_err: Option<ScapeRLError> = None;

        while Instant::now() < deadline {
            if self.io.is_none() {
                if let Err(e) = self.connect().await {
                    debug!("frame retry: reconnect failed: {e}");
                    last_err = Some(e);
                    sleep(self.retry.connect_backoff).await;
                    continue;
                }
            }

            match self.read_frame(advance).await {
                Ok(frame) => return Ok(frame),
                Err(e) => {
                    warn!("frame read failed, reconnecting: {e}");
                    last_err = Some(e);
                    self.close().await;
                    sleep(self.retry.reconnect_pause).await;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ScapeRLError::Timeout("frame retry budget exhausted".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Scripted transport event: what the next read produces
    enum Event {
        Line(&'static str),
        Bytes(Vec<u8>),
        Fail,
    }

    struct ScriptIo {
        events: VecDeque<Event>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl LineIo for ScriptIo {
        async fn write_line(&mut self, line: &str) -> Result<()> {
            self.writes.lock().unwrap().push(line.to_string());
            Ok(())
        }

        async fn read_line(&mut self) -> Result<String> {
            match self.events.pop_front() {
                Some(Event::Line(line)) => Ok(line.to_string()),
                Some(Event::Bytes(_)) => panic!("script expected a payload read here"),
                Some(Event::Fail) | None => {
                    Err(ScapeRLError::Connection("connection closed".into()))
                }
            }
        }

        async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            match self.events.pop_front() {
                Some(Event::Bytes(bytes)) if bytes.len() == buf.len() => {
                    buf.copy_from_slice(&bytes);
                    Ok(())
                }
                // Short payload: the stream ended before `len` bytes arrived
                Some(Event::Bytes(_)) => {
                    Err(ScapeRLError::Connection("connection closed mid-payload".into()))
                }
                _ => Err(ScapeRLError::Connection("connection closed".into())),
            }
        }

        async fn shutdown(&mut self) {}
    }

    /// Hands out one scripted session per connect; `None` fails the dial.
    #[derive(Clone)]
    struct ScriptConnector {
        sessions: Arc<Mutex<VecDeque<Option<VecDeque<Event>>>>>,
        connects: Arc<Mutex<usize>>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptConnector {
        fn new(sessions: Vec<Option<Vec<Event>>>) -> Self {
            Self {
                sessions: Arc::new(Mutex::new(
                    sessions
                        .into_iter()
                        .map(|s| s.map(VecDeque::from))
                        .collect(),
                )),
                connects: Arc::new(Mutex::new(0)),
                writes: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn connect_count(&self) -> usize {
            *self.connects.lock().unwrap()
        }

        fn writes(&self) -> Vec<String> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connect for ScriptConnector {
        type Io = ScriptIo;

        async fn connect(&self) -> Result<ScriptIo> {
            *self.connects.lock().unwrap() += 1;
            match self.sessions.lock().unwrap().pop_front() {
                Some(Some(events)) => Ok(ScriptIo {
                    events,
                    writes: self.writes.clone(),
                }),
                Some(None) | None => Err(ScapeRLError::Connection("connection refused".into())),
            }
        }
    }

    fn small_frame_bytes() -> Vec<u8> {
        vec![7u8; 12] // 2x2x3
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let connector = ScriptConnector::new(vec![Some(vec![])]);
        let mut client = BridgeClient::with_connector(connector.clone());

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(connector.connect_count(), 1);
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_close_twice_is_safe() {
        let connector = ScriptConnector::new(vec![Some(vec![])]);
        let mut client = BridgeClient::with_connector(connector.clone());

        client.connect().await.unwrap();
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_command_wrappers_encode_and_ack() {
        let connector = ScriptConnector::new(vec![Some(vec![
            Event::Line("PONG"),
            Event::Line("OK"),
            Event::Line("OK"),
            Event::Line("OK"),
            Event::Line("OK"),
        ])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        assert_eq!(client.ping().await.unwrap(), "PONG");
        assert_eq!(client.move_to(10, 20).await.unwrap(), "OK");
        client.button_down(CursorButton::Left).await.unwrap();
        client.button_up(CursorButton::Right).await.unwrap();
        client.drag(5, -3).await.unwrap();

        assert_eq!(
            connector.writes(),
            vec!["PING", "MOVE 10 20", "DOWN 1", "UP 3", "DRAG 5 -3"]
        );
    }

    #[tokio::test]
    async fn test_state_parses_snapshot() {
        let connector = ScriptConnector::new(vec![Some(vec![Event::Line(
            "STATE 1154 32 10 10 -1 -1 8841 6 25",
        )])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        let snap = client.state().await.unwrap();
        assert_eq!(snap.total_xp, 1154);
        assert_eq!(snap.loop_cycle, 8841);
        assert_eq!(connector.writes(), vec!["STATE"]);
    }

    #[tokio::test]
    async fn test_state_malformed_is_protocol_error() {
        let connector = ScriptConnector::new(vec![Some(vec![Event::Line("STATE 1 2 3")])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        assert!(matches!(
            client.state().await,
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_ready_flag() {
        let connector = ScriptConnector::new(vec![Some(vec![
            Event::Line("READY 0"),
            Event::Line("READY 1"),
            Event::Line("READY"),
        ])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        assert!(!client.ready().await.unwrap());
        assert!(client.ready().await.unwrap());
        assert!(matches!(
            client.ready().await,
            Err(ScapeRLError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_read_frame_happy_path() {
        let connector = ScriptConnector::new(vec![Some(vec![
            Event::Line("FRAME 2 2 3 12"),
            Event::Bytes(small_frame_bytes()),
        ])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        let frame = client.read_frame(true).await.unwrap();
        assert_eq!((frame.width, frame.height, frame.channels), (2, 2, 3));
        assert_eq!(frame.data, small_frame_bytes());
        assert_eq!(connector.writes(), vec!["STEP"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_frame_retries_not_capturable_header() {
        let connector = ScriptConnector::new(vec![Some(vec![
            Event::Line("ERR no-headless"),
            Event::Line("ERR no-headless"),
            Event::Line("FRAME 2 2 3 12"),
            Event::Bytes(small_frame_bytes()),
        ])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        let frame = client.read_frame(false).await.unwrap();
        assert_eq!(frame.width, 2);
        // One command only; the header was re-read, not re-requested
        assert_eq!(connector.writes(), vec!["FRAME"]);
    }

    #[tokio::test]
    async fn test_read_frame_rejects_short_payload() {
        let connector = ScriptConnector::new(vec![Some(vec![
            Event::Line("FRAME 2 2 3 12"),
            Event::Bytes(vec![7u8; 5]),
        ])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        assert!(matches!(
            client.read_frame(false).await,
            Err(ScapeRLError::Connection(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_frame_reconnects_until_success() {
        // Two dead connections, then a healthy one
        let connector = ScriptConnector::new(vec![
            Some(vec![Event::Fail]),
            Some(vec![Event::Fail]),
            Some(vec![
                Event::Line("FRAME 2 2 3 12"),
                Event::Bytes(small_frame_bytes()),
            ]),
        ]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        let frame = client.step_frame().await.unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(connector.connect_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_frame_surfaces_last_error_after_deadline() {
        let connector = ScriptConnector::new(vec![Some(vec![Event::Fail])]);
        let mut client = BridgeClient::with_connector(connector.clone());
        client.connect().await.unwrap();

        let start = Instant::now();
        let err = client.frame().await.unwrap_err();
        assert!(matches!(err, ScapeRLError::Connection(_)));
        assert!(start.elapsed() >= Duration::from_secs(15));
    }
}
