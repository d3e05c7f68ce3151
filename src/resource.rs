use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_stream::Stream;

use crate::etag::EntityTag;

const CHUNK_SIZE: usize = 4096;

/// A stored file or collection as observed by a single `stat`.
#[derive(Debug)]
pub struct Resource {
    pub path: PathBuf,
    pub metadata: std::fs::Metadata,
}

impl Resource {
    /// `Ok(None)` when nothing exists at `path`.
    pub async fn stat(path: &Path) -> io::Result<Option<Self>> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(Some(Self {
                path: path.to_path_buf(),
                metadata,
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            // A file where a collection was expected along the way
            Err(e) if e.kind() == io::ErrorKind::NotADirectory => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn is_collection(&self) -> bool {
        self.metadata.is_dir()
    }

    pub fn len(&self) -> u64 {
        self.metadata.len()
    }

    pub fn etag(&self) -> io::Result<EntityTag> {
        EntityTag::from_metadata(&self.metadata)
    }

    pub async fn open(&self) -> io::Result<FileBody> {
        let file = File::open(&self.path).await?;
        Ok(FileBody {
            file,
            len: self.len(),
        })
    }
}

/// A response body that is streamed from disk after the headers.
#[derive(Debug)]
pub struct FileBody {
    file: File,
    pub len: u64,
}

impl FileBody {
    pub fn into_stream(self) -> FileIterator<File> {
        FileIterator::new(self.file)
    }
}

pub struct FileIterator<R: AsyncRead + Unpin> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FileIterator<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: vec![0; CHUNK_SIZE],
        }
    }
}

impl<R: AsyncRead + Unpin> Stream for FileIterator<R> {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Split the mutable borrow of self into two parts
        let self_mut = self.as_mut().get_mut();
        let reader = Pin::new(&mut self_mut.reader);
        let mut read_buf = ReadBuf::new(&mut self_mut.buffer);

        match reader.poll_read(cx, &mut read_buf) {
            Poll::Ready(Ok(())) => {
                let filled = read_buf.filled();
                if filled.is_empty() {
                    Poll::Ready(None) // End of file
                } else {
                    Poll::Ready(Some(Ok(Bytes::copy_from_slice(filled))))
                }
            }
            Poll::Pending => Poll::Pending,
            Poll::Ready(Err(e)) => Poll::Ready(Some(Err(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_stat_missing() {
        let temp = TempDir::new().unwrap();

        assert!(Resource::stat(&temp.path().join("absent")).await.unwrap().is_none());

        std::fs::write(temp.path().join("file"), b"x").unwrap();
        let below_file = temp.path().join("file").join("child");
        assert!(Resource::stat(&below_file).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_streams_whole_file_in_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("big.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let resource = Resource::stat(&path).await.unwrap().unwrap();
        assert!(!resource.is_collection());
        assert_eq!(resource.len(), 10_000);

        let body = resource.open().await.unwrap();
        assert_eq!(body.len, 10_000);

        let mut stream = body.into_stream();
        let mut read = Vec::new();
        let mut chunks = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= CHUNK_SIZE);
            read.extend_from_slice(&chunk);
            chunks += 1;
        }

        assert_eq!(read, data);
        assert!(chunks >= 3);
    }
}
