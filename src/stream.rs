//! Streams an artifact in 8 KiB chunks, then deletes it.

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use axum::body::{Body, Bytes};
use tokio::{fs::File, io::AsyncRead};
use tokio_stream::Stream;
use tokio_util::io::ReaderStream;

use crate::artifact::TempAudioArtifact;

/// Read size for streamed artifacts.
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Byte stream over a [`TempAudioArtifact`] that owns it.
///
/// The artifact is deleted exactly once: when the stream is drained, after
/// the first read error, or when the stream is dropped early (client gone).
pub struct ArtifactStream<R = File> {
    reader: Option<ReaderStream<R>>,
    artifact: TempAudioArtifact,
    sent: u64,
}

impl ArtifactStream {
    /// Open `artifact` for streaming. On failure the artifact is dropped,
    /// and with it deleted.
    pub async fn open(artifact: TempAudioArtifact) -> io::Result<Self> {
        let file = File::open(artifact.path()).await?;
        Ok(Self::with_reader(file, artifact))
    }
}

impl<R: AsyncRead + Unpin> ArtifactStream<R> {
    /// Stream `reader` as the content of `artifact`.
    fn with_reader(reader: R, artifact: TempAudioArtifact) -> Self {
        Self {
            reader: Some(ReaderStream::with_capacity(reader, CHUNK_SIZE)),
            artifact,
            sent: 0,
        }
    }

    pub fn into_body(self) -> Body
    where
        R: Send + 'static,
    {
        Body::from_stream(self)
    }
}

impl<R> ArtifactStream<R> {
    /// Close the reader and delete the artifact.
    fn finish(&mut self) {
        self.reader = None;
        self.artifact.delete();
    }
}

impl<R: AsyncRead + Unpin> Stream for ArtifactStream<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(reader) = this.reader.as_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(reader).poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(chunk))) => {
                this.sent += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                tracing::error!(
                    path = %this.artifact.path().display(),
                    error = %e,
                    "error while streaming audio file"
                );
                this.finish();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                tracing::info!(
                    path = %this.artifact.path().display(),
                    bytes = this.sent,
                    "audio file streamed"
                );
                this.finish();
                Poll::Ready(None)
            }
        }
    }
}

impl<R> Drop for ArtifactStream<R> {
    fn drop(&mut self) {
        if !self.artifact.is_released() {
            tracing::warn!(
                path = %self.artifact.path().display(),
                bytes = self.sent,
                "stream dropped before completion; client likely disconnected"
            );
            self.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn artifact_with(dir: &std::path::Path, len: usize) -> (TempAudioArtifact, Vec<u8>) {
        let a = TempAudioArtifact::allocate(Some(dir)).unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        std::fs::write(a.path(), &data).unwrap();
        (a, data)
    }

    #[tokio::test]
    async fn test_streams_all_bytes_in_chunks_then_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let (a, data) = artifact_with(dir.path(), 3 * CHUNK_SIZE + 100);
        let path = a.path().to_path_buf();

        let mut s = ArtifactStream::open(a).await.unwrap();
        let mut got = Vec::new();
        while let Some(chunk) = s.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            got.extend_from_slice(&chunk);
        }
        assert_eq!(got, data);
        assert!(!path.exists());

        // polling past the end stays finished
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn test_early_drop_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = artifact_with(dir.path(), 4 * CHUNK_SIZE);
        let path = a.path().to_path_buf();

        let mut s = ArtifactStream::open(a).await.unwrap();
        let first = s.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        assert!(path.exists());

        drop(s);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = artifact_with(dir.path(), 0);
        let path = a.path().to_path_buf();
        let mut s = ArtifactStream::open(a).await.unwrap();
        assert!(s.next().await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_open_failure_still_deletes_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = artifact_with(dir.path(), 10);
        let path = a.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        assert!(ArtifactStream::open(a).await.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    /// Yields one block of bytes, then fails every read.
    struct FlakyReader {
        served: bool,
    }

    impl AsyncRead for FlakyReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.served {
                return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk went away")));
            }
            self.served = true;
            buf.put_slice(&[7u8; 100]);
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_read_error_aborts_and_deletes_once() {
        let dir = tempfile::tempdir().unwrap();
        let (a, _) = artifact_with(dir.path(), 100);
        let path = a.path().to_path_buf();

        let mut s = ArtifactStream::with_reader(FlakyReader { served: false }, a);
        let first = s.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);
        assert!(path.exists());

        let err = s.next().await.unwrap().unwrap_err();
        assert_eq!(err.to_string(), "disk went away");
        assert!(s.artifact.is_released());
        assert!(!path.exists());

        // the error ends the stream
        assert!(s.next().await.is_none());
        drop(s);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
