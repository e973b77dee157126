use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::Payload;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::codec::{BincodeCodec, Codec};
use crate::error::{Error, Result};

/// Largest frame body accepted on receive
pub const MAX_FRAME_LEN: usize = 100 * 1024 * 1024;

/// Messages exchanged between a client and a telemetry server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame of every session
    Hello { identity: String },
    /// Client will publish `topic` with `wire_type`
    Announce { topic: String, wire_type: String },
    /// Client wants updates for `topic`
    Subscribe { topic: String, wire_type: String },
    /// Latest value of a topic, in either direction
    Update { topic: String, payload: Payload },
}

/// Open a TCP connection, failing after `timeout`
pub async fn connect(endpoint: &str, timeout: Duration) -> Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint))
        .await
        .map_err(|_| Error::Custom(format!("Connect timeout exceeded for {}", endpoint)))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Split a stream into framed read and write halves
pub fn split(stream: TcpStream) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
    let (read, write) = stream.into_split();
    (FrameReader::new(read), FrameWriter::new(write))
}

/// Reads length-prefixed frames
///
/// Each frame is a 4-byte big-endian length followed by the codec body.
pub struct FrameReader<R> {
    inner: R,
    codec: BincodeCodec,
}

impl<R: AsyncRead + Unpin + Send> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            codec: BincodeCodec,
        }
    }

    /// Receive one raw frame body
    pub async fn receive_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.inner.read_u32().await.map_err(closed_on_eof)? as usize;

        // Validate length (max 100MB to prevent DOS)
        if len > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!(
                "Message too large: {} bytes",
                len
            )));
        }

        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await.map_err(closed_on_eof)?;
        Ok(buf)
    }

    /// Receive and decode one frame
    pub async fn receive(&mut self) -> Result<Frame> {
        let bytes = self.receive_bytes().await?;
        self.codec.decode(&bytes)
    }
}

/// Writes length-prefixed frames
pub struct FrameWriter<W> {
    inner: W,
    codec: BincodeCodec,
}

impl<W: AsyncWrite + Unpin + Send> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            codec: BincodeCodec,
        }
    }

    /// Send one raw frame body
    pub async fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!(
                "Message too large: {} bytes",
                bytes.len()
            )));
        }
        self.inner.write_u32(bytes.len() as u32).await?;
        self.inner.write_all(bytes).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Encode and send one frame
    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        let bytes = self.codec.encode(frame)?;
        self.send_bytes(&bytes).await
    }

    /// Shut down the write direction
    pub async fn close(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

fn closed_on_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        e.into()
    }
}
