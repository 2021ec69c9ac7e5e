//! Length-Prefixed Transport
//!
//! Moves whole messages over any tokio byte stream:
//!
//! ```text
//! u64 body length (big-endian) | body
//! ```
//!
//! A stream that ends exactly on a message boundary is a clean close. Ending
//! anywhere else, or announcing a body larger than the receiver accepts, is
//! fatal for the connection.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::codec::{prepend_size, read_size_prefix, SIZE_PREFIX_LEN};

/// Default cap on a single message body (16 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: u64 = 16 * 1024 * 1024;

/// Transport failures. All of them end the connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying stream failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Announced body exceeds the receiver's limit
    #[error("message of {len} bytes exceeds limit of {max}")]
    Oversize {
        /// Announced length
        len: u64,
        /// Limit
        max: u64,
    },

    /// Stream ended inside a message
    #[error("stream ended inside a message: got {got} of {expected} bytes")]
    Truncated {
        /// Bytes expected
        expected: u64,
        /// Bytes received
        got: u64,
    },
}

/// Read one message body.
///
/// Returns `Ok(None)` if the stream closed cleanly before a new message.
pub async fn read_message<R>(reader: &mut R, max_len: u64) -> Result<Option<Vec<u8>>, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    let mut filled = 0;
    while filled < SIZE_PREFIX_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TransportError::Truncated {
                expected: SIZE_PREFIX_LEN as u64,
                got: filled as u64,
            });
        }
        filled += n;
    }

    let len = read_size_prefix(prefix);
    if len > max_len {
        return Err(TransportError::Oversize { len, max: max_len });
    }
    let len_usize = usize::try_from(len).map_err(|_| TransportError::Oversize { len, max: max_len })?;

    let mut body = vec![0u8; len_usize];
    let mut got = 0;
    while got < len_usize {
        let n = reader.read(&mut body[got..]).await?;
        if n == 0 {
            return Err(TransportError::Truncated {
                expected: len,
                got: got as u64,
            });
        }
        got += n;
    }
    Ok(Some(body))
}

/// Write one message body with its length prefix, then flush.
pub async fn write_message<W>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&prepend_size(payload)).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip_and_clean_eof() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_message(&mut a, b"hello").await.unwrap();
        write_message(&mut a, b"").await.unwrap();
        drop(a);

        assert_eq!(read_message(&mut b, 64).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_message(&mut b, 64).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_message(&mut b, 64).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversize_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_message(&mut a, &[0u8; 100]).await.unwrap();
        assert!(matches!(
            read_message(&mut b, 99).await,
            Err(TransportError::Oversize { len: 100, max: 99 })
        ));
    }

    #[tokio::test]
    async fn test_truncated_body_and_prefix() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&10u64.to_be_bytes()).await.unwrap();
        a.write_all(&[1, 2, 3]).await.unwrap();
        drop(a);
        assert!(matches!(
            read_message(&mut b, 64).await,
            Err(TransportError::Truncated { expected: 10, got: 3 })
        ));

        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&[0, 0, 0]).await.unwrap();
        drop(a);
        assert!(matches!(
            read_message(&mut b, 64).await,
            Err(TransportError::Truncated { expected: 8, got: 3 })
        ));
    }
}
