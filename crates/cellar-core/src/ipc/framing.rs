//! Length-prefixed JSON framing for byte streams.
//!
//! Format: 4-byte length (u32 LE) + JSON-encoded envelope.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

use super::protocol::Envelope;

/// Default upper bound on a frame body.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Largest body the 4-byte length prefix can describe.
pub const MAX_WIRE_LEN: usize = u32::MAX as usize;

/// Encode an envelope as a frame body, checking it against the size limit.
pub fn encode_frame(envelope: &Envelope, max_len: usize) -> Result<Vec<u8>> {
    let bytes = serde_json::to_vec(envelope)?;
    if bytes.len() > max_len || u32::try_from(bytes.len()).is_err() {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes (limit {})",
            bytes.len(),
            max_len.min(MAX_WIRE_LEN)
        )));
    }
    Ok(bytes)
}

/// Write one frame and flush.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope, max_len: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(envelope, max_len)?;
    write_body(writer, &bytes).await
}

async fn write_body<W>(writer: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::Ipc(format!("IPC message too large: {} bytes", bytes.len())))?;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .await
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read one frame body. Returns `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(Error::Ipc(format!("Failed to read IPC message length: {}", e))),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;

    // A bad length leaves the stream unsynchronized; the caller must stop reading.
    if len > max_len {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes (limit {})",
            len, max_len
        )));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .await
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    Ok(Some(bytes))
}

/// Forward frames from `reader` into `tx` until either side closes.
///
/// Frames that are not valid JSON are logged and skipped; the stream stays
/// aligned because the length prefix was intact.
pub async fn pump_frames_in<R>(mut reader: R, tx: mpsc::Sender<Envelope>, max_len: usize)
where
    R: AsyncRead + Unpin,
{
    loop {
        let bytes = match read_frame(&mut reader, max_len).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Stopping frame reader: {}", e);
                break;
            }
        };
        match serde_json::from_slice::<Envelope>(&bytes) {
            Ok(envelope) => {
                if tx.send(envelope).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Dropping frame that is not valid JSON: {}", e),
        }
    }
    tracing::debug!("frame reader finished");
}

/// Write envelopes from `rx` to `writer` until the channel closes.
///
/// An envelope that does not fit in a frame is logged and skipped; only a
/// failed write stops the pump.
pub async fn pump_frames_out<W>(mut rx: mpsc::Receiver<Envelope>, mut writer: W, max_len: usize)
where
    W: AsyncWrite + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        let bytes = match encode_frame(&envelope, max_len) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Dropping outbound message: {}", e);
                continue;
            }
        };
        if let Err(e) = write_body(&mut writer, &bytes).await {
            tracing::warn!("Stopping frame writer: {}", e);
            break;
        }
    }
    tracing::debug!("frame writer finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_frame_layout() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &json!({ "id": "1", "src": "1" }), DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();
        let body_len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(body_len, buf.len() - 4);

        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).await.unwrap().unwrap();
        assert_eq!(
            serde_json::from_slice::<Envelope>(&body).unwrap(),
            json!({ "id": "1", "src": "1" })
        );
        assert!(read_frame(&mut cursor, DEFAULT_MAX_FRAME_LEN).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frames_are_rejected() {
        let mut buf = Vec::new();
        let big = json!({ "src": "x".repeat(64) });
        assert!(write_frame(&mut buf, &big, 16).await.is_err());
        assert!(buf.is_empty());

        let mut cursor = std::io::Cursor::new(1000u32.to_le_bytes().to_vec());
        assert!(read_frame(&mut cursor, 16).await.is_err());
    }

    #[tokio::test]
    async fn test_pump_skips_oversized_envelopes() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(json!({ "src": "x".repeat(64) })).await.unwrap();
        tx.send(json!({ "id": "ok" })).await.unwrap();
        drop(tx);

        let mut buf = Vec::new();
        pump_frames_out(rx, &mut buf, 32).await;
        let mut cursor = std::io::Cursor::new(buf);
        let body = read_frame(&mut cursor, 32).await.unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<Envelope>(&body).unwrap(), json!({ "id": "ok" }));
        assert!(read_frame(&mut cursor, 32).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pump_skips_invalid_json() {
        let mut buf = Vec::new();
        let garbage = b"not json";
        buf.extend_from_slice(&(garbage.len() as u32).to_le_bytes());
        buf.extend_from_slice(garbage);
        write_frame(&mut buf, &json!({ "id": "ok" }), DEFAULT_MAX_FRAME_LEN)
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        pump_frames_in(std::io::Cursor::new(buf), tx, DEFAULT_MAX_FRAME_LEN).await;
        assert_eq!(rx.recv().await, Some(json!({ "id": "ok" })));
        assert_eq!(rx.recv().await, None);
    }
}
