//! ChunkSource - the ordered byte source of a run

use std::io;
use std::path::Path;

use bytes::Bytes;
use contracts::{Chunk, ContractError};
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, trace};

/// Ordered stream of chunks. Ends when every sender is dropped.
///
/// A sent `Err` is fatal for the run.
pub struct ChunkSource {
    rx: mpsc::Receiver<io::Result<Chunk>>,
    reader: Option<JoinHandle<()>>,
}

impl ChunkSource {
    /// Create a source fed manually through the returned sender
    pub fn channel(capacity: usize) -> (mpsc::Sender<io::Result<Chunk>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx, reader: None })
    }

    /// Source that yields the given chunks in order, then ends
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let chunks: Vec<Chunk> = chunks.into_iter().map(Into::into).collect();
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // capacity covers every chunk, and rx is alive
            let _ = tx.try_send(Ok(chunk));
        }
        Self { rx, reader: None }
    }

    /// Read `reader` in chunks of at most `chunk_size` bytes.
    ///
    /// Spawns a reader task; requires a tokio runtime.
    pub fn from_reader<R>(reader: R, chunk_size: usize, capacity: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let mut stream = ReaderStream::with_capacity(reader, chunk_size.max(1));

        let handle = tokio::spawn(async move {
            let mut chunks = 0u64;
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    trace!("Source consumer gone, reader stopping");
                    return;
                }
                if failed {
                    return;
                }
                chunks += 1;
            }
            debug!(chunks, "Source reader reached end of input");
        });

        Self {
            rx,
            reader: Some(handle),
        }
    }

    /// Open a file and read it with [`ChunkSource::from_reader`]
    ///
    /// # Errors
    /// [`ContractError::Source`] if the file cannot be opened.
    pub async fn from_path(
        path: impl AsRef<Path>,
        chunk_size: usize,
        capacity: usize,
    ) -> Result<Self, ContractError> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| ContractError::Source {
            message: format!("failed to open {}", path.display()),
            source: Some(e),
        })?;
        Ok(Self::from_reader(file, chunk_size, capacity))
    }

    /// Next chunk, `None` at end of stream
    pub async fn recv(&mut self) -> Option<io::Result<Chunk>> {
        self.rx.recv().await
    }
}

impl Drop for ChunkSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
