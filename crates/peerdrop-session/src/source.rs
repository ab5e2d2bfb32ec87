use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use peerdrop_shared::{split_chunks, FileMeta};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Where the bytes of a queued file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file waiting in the sender's queue.
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub meta: FileMeta,
    pub source: FileSource,
}

impl OutgoingFile {
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            meta: FileMeta::new(name, data.len() as u64, Utc::now()),
            source: FileSource::Memory(data),
        }
    }

    /// Describe a file on disk. The size is captured now; the file is only
    /// read when its turn comes.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let modified: DateTime<Utc> = metadata.modified().map(Into::into).unwrap_or_else(|_| Utc::now());

        Ok(Self {
            meta: FileMeta::new(name, metadata.len(), modified),
            source: FileSource::Path(path.to_path_buf()),
        })
    }
}

/// Yields the chunks of one file following the `split_chunks` plan.
pub(crate) struct ChunkReader {
    plan: std::vec::IntoIter<(u64, usize)>,
    input: ChunkInput,
}

enum ChunkInput {
    Memory(Bytes),
    File(File),
}

impl ChunkReader {
    pub(crate) async fn open(file: &OutgoingFile, chunk_size: usize) -> std::io::Result<Self> {
        let plan: Vec<_> = split_chunks(file.meta.size, chunk_size).collect();
        let input = match &file.source {
            FileSource::Memory(data) => {
                if data.len() as u64 != file.meta.size {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!(
                            "'{}' holds {} bytes but announces {}",
                            file.meta.name,
                            data.len(),
                            file.meta.size
                        ),
                    ));
                }
                ChunkInput::Memory(data.clone())
            }
            FileSource::Path(path) => ChunkInput::File(File::open(path).await?),
        };
        Ok(Self {
            plan: plan.into_iter(),
            input,
        })
    }

    /// `None` once the announced size has been produced. A file that shrank
    /// on disk fails with `UnexpectedEof`.
    pub(crate) async fn next_chunk(&mut self) -> std::io::Result<Option<Bytes>> {
        let Some((offset, len)) = self.plan.next() else {
            return Ok(None);
        };
        match &mut self.input {
            ChunkInput::Memory(data) => {
                let start = offset as usize;
                Ok(Some(data.slice(start..start + len)))
            }
            ChunkInput::File(file) => {
                let mut buf = BytesMut::zeroed(len);
                file.read_exact(&mut buf).await?;
                Ok(Some(buf.freeze()))
            }
        }
    }
}
