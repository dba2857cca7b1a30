//! Frame I/O over simulated byte streams.
//!
//! Frames are written back to back; the header's payload size marks the
//! boundary.

use std::io::{self, ErrorKind};

use switchboard_proto::{Frame, FrameHeader};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Read one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; FrameHeader::SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {},
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let header = FrameHeader::from_bytes(&header_buf)
        .map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    let payload_size = header.payload_size() as usize;

    let mut buf = Vec::with_capacity(FrameHeader::SIZE + payload_size);
    buf.extend_from_slice(&header_buf);
    buf.resize(FrameHeader::SIZE + payload_size, 0);
    reader.read_exact(&mut buf[FrameHeader::SIZE..]).await?;

    Frame::decode(&buf).map(Some).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(frame.encoded_len());
    frame.encode(&mut buf).map_err(|e| io::Error::new(ErrorKind::InvalidData, e))?;
    writer.write_all(&buf).await?;
    writer.flush().await
}
