//! Final delivery: copy the committed document into the caller's sink.
//!
//! Read and write failures mean different things here. A failed *read* is a
//! pipeline fault (our own file is unreadable) and is returned as an error.
//! A failed *write* means the consumer went away; copying stops at once and
//! the outcome is reported as [`CopyOutcome::Disconnected`] so the caller
//! can log it apart from real faults and still clean up.

use crate::error::DistillError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CHUNK: usize = 64 * 1024;

/// How a copy ended.
#[derive(Debug)]
pub enum CopyOutcome {
    /// Every byte reached the sink and it was flushed.
    Completed { bytes: u64 },
    /// The sink failed after `bytes` had been written.
    Disconnected { bytes: u64, error: std::io::Error },
}

impl CopyOutcome {
    pub fn bytes(&self) -> u64 {
        match self {
            Self::Completed { bytes } | Self::Disconnected { bytes, .. } => *bytes,
        }
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected { .. })
    }
}

/// Copy `reader` to `sink` until end of input or the first sink error.
pub async fn copy_to_sink<R, W>(reader: &mut R, sink: &mut W) -> Result<CopyOutcome, DistillError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK];
    let mut bytes = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| DistillError::io("reading distilled output", e))?;
        if n == 0 {
            break;
        }
        if let Err(error) = sink.write_all(&buf[..n]).await {
            return Ok(CopyOutcome::Disconnected { bytes, error });
        }
        bytes += n as u64;
    }
    if let Err(error) = sink.flush().await {
        return Ok(CopyOutcome::Disconnected { bytes, error });
    }
    Ok(CopyOutcome::Completed { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn copies_everything() {
        let mut reader: &[u8] = b"%PDF-1.7 body";
        let mut sink = Vec::new();
        let outcome = copy_to_sink(&mut reader, &mut sink).await.unwrap();
        assert!(matches!(outcome, CopyOutcome::Completed { bytes: 13 }));
        assert_eq!(sink, b"%PDF-1.7 body");
    }

    #[tokio::test]
    async fn sink_failure_is_a_disconnect() {
        let mut reader: &[u8] = b"hello world";
        let mut sink = Builder::new()
            .write(b"hello")
            .write_error(Error::new(ErrorKind::BrokenPipe, "client went away"))
            .build();
        let outcome = copy_to_sink(&mut reader, &mut sink).await.unwrap();
        assert!(outcome.is_disconnect());
        match outcome {
            CopyOutcome::Disconnected { error, .. } => {
                assert_eq!(error.kind(), ErrorKind::BrokenPipe)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn source_failure_is_an_error() {
        let mut reader = Builder::new()
            .read(b"partial")
            .read_error(Error::new(ErrorKind::Other, "disk gone"))
            .build();
        let mut sink = Vec::new();
        let err = copy_to_sink(&mut reader, &mut sink).await.unwrap_err();
        assert!(matches!(err, DistillError::Io { .. }));
        assert_eq!(sink, b"partial");
    }

    #[tokio::test]
    async fn empty_input_completes_with_zero_bytes() {
        let mut reader: &[u8] = b"";
        let mut sink = Vec::new();
        let outcome = copy_to_sink(&mut reader, &mut sink).await.unwrap();
        assert_eq!(outcome.bytes(), 0);
        assert!(!outcome.is_disconnect());
    }
}
