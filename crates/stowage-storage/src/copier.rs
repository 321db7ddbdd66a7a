//! Streaming copier
//!
//! Copies bytes from a reader to a writer in fixed-size buffer increments
//! until EOF, without materializing the file in memory. Both ends are
//! released on every exit path; a mid-copy failure surfaces as a write or
//! read error and leaves the destination indeterminate.

use crate::traits::{StorageError, StorageResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Copy `reader` into `writer` in `buffer_size` increments.
///
/// Returns the number of bytes copied. The writer is flushed and shut down on
/// success so the destination observes a complete object.
pub async fn copy<R, W>(reader: &mut R, writer: &mut W, buffer_size: usize) -> StorageResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        let n = reader
            .read(&mut buffer)
            .await
            .map_err(|e| StorageError::ReadFailed(format!("Failed to read from source: {}", e)))?;

        if n == 0 {
            break;
        }

        writer
            .write_all(&buffer[..n])
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to write chunk: {}", e)))?;

        copied += n as u64;
    }

    writer
        .shutdown()
        .await
        .map_err(|e| StorageError::WriteFailed(format!("Failed to finish write: {}", e)))?;

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_copy_round_trips_with_small_buffer() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = Cursor::new(data.clone());
        let mut out = Vec::new();

        let copied = copy(&mut reader, &mut out, 64).await.unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_copy_empty_source() {
        let mut reader = Cursor::new(Vec::<u8>::new());
        let mut out = Vec::new();

        let copied = copy(&mut reader, &mut out, 1024).await.unwrap();
        assert_eq!(copied, 0);
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_copy_write_failure_surfaces() {
        struct RejectingWriter;

        impl AsyncWrite for RejectingWriter {
            fn poll_write(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                std::task::Poll::Ready(Err(std::io::Error::other("disk full")))
            }

            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let mut reader = Cursor::new(vec![1u8; 16]);
        let mut writer = RejectingWriter;

        let result = copy(&mut reader, &mut writer, 8).await;
        assert!(matches!(result, Err(StorageError::WriteFailed(_))));
    }
}
