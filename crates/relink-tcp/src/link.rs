//! Newline-delimited link over any [`Stream`]

use async_trait::async_trait;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};
use tracing::{debug, trace, warn};

use relink_transport_traits::{Link, LinkState, Stream, TransportError, TransportResult};

/// Default upper bound for a single received line
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Size of a single read from the bound stream
const READ_CHUNK: usize = 4096;

/// A [`Link`] that exchanges newline-terminated text frames.
///
/// This is the link a connector uses when none is supplied. The bound stream
/// is replaced on every reconnect; partially received data from a previous
/// stream is discarded.
pub struct LineLink {
    io: Option<Box<dyn Stream>>,
    codec: LinesCodec,
    buffer: BytesMut,
    state: LinkState,
}

impl std::fmt::Debug for LineLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineLink")
            .field("io", &self.io)
            .field("buffered", &self.buffer.len())
            .field("state", &self.state)
            .finish()
    }
}

impl LineLink {
    /// Create an unbound link
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create an unbound link that rejects lines longer than `max` bytes
    #[must_use]
    pub fn with_max_line_length(max: usize) -> Self {
        Self {
            io: None,
            codec: LinesCodec::new_with_max_length(max),
            buffer: BytesMut::with_capacity(READ_CHUNK),
            state: LinkState::Closed,
        }
    }

    fn open_io(&mut self) -> TransportResult<&mut Box<dyn Stream>> {
        if !self.state.is_open() {
            return Err(TransportError::NotConnected);
        }
        self.io.as_mut().ok_or(TransportError::NotConnected)
    }

    /// Send one line; the terminator is appended here
    pub async fn send_line(&mut self, line: &str) -> TransportResult<()> {
        let io = self.open_io()?;
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');

        io.write_all(&frame).await?;
        io.flush().await?;
        trace!("Sent line: {}", line);
        Ok(())
    }

    /// Receive one line without its terminator.
    ///
    /// Returns `Ok(None)` once the peer has closed the stream and no buffered
    /// data is left. Each underlying read is bounded by the stream's
    /// inter-character timeout.
    pub async fn recv_line(&mut self) -> TransportResult<Option<String>> {
        loop {
            if let Some(line) = self.codec.decode(&mut self.buffer).map_err(decode_error)? {
                trace!("Received line: {}", line);
                return Ok(Some(line));
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.open_io()?.read(&mut chunk).await?;
            if n == 0 {
                debug!("Peer closed link stream");
                self.state = LinkState::Failed {
                    reason: "peer closed the stream".to_string(),
                };
                return self
                    .codec
                    .decode_eof(&mut self.buffer)
                    .map_err(decode_error);
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

impl Default for LineLink {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_error(err: LinesCodecError) -> TransportError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => {
            TransportError::ReceiveFailed("line exceeds maximum length".to_string())
        }
        LinesCodecError::Io(e) => TransportError::from(e),
    }
}

#[async_trait]
impl Link for LineLink {
    fn set_io(&mut self, io: Box<dyn Stream>) {
        if let Some(previous) = self.io.as_ref()
            && previous.is_open()
        {
            warn!(
                "Replacing stream to {} that was never closed",
                previous.address()
            );
        }
        self.io = Some(io);
        self.buffer.clear();
        self.codec = LinesCodec::new_with_max_length(self.codec.max_length());
        self.state = LinkState::Bound;
    }

    async fn open(&mut self) -> TransportResult<i32> {
        match self.io.as_ref() {
            Some(io) if io.is_open() => {
                self.state = LinkState::Open;
                Ok(0)
            }
            _ => Ok(-1),
        }
    }

    async fn close(&mut self) {
        if let Some(mut io) = self.io.take()
            && let Err(e) = io.close().await
        {
            debug!("Closing link stream to {} failed: {}", io.address(), e);
        }
        self.buffer.clear();
        self.state = LinkState::Closed;
    }

    fn state(&self) -> LinkState {
        self.state.clone()
    }

    fn endpoint(&self) -> Option<String> {
        self.io.as_ref().map(|io| io.address().to_string())
    }
}
