//! Streaming tar.gz writer.
//!
//! Entries are produced lazily, framed as GNU tar and gzip-compressed as the
//! response body is polled. Media is downloaded only when its entry is
//! reached, so memory use is bounded by the largest single object.

use crate::metrics::EXPORT_MEDIA_SKIPPED;
use async_compression::tokio::bufread::GzipEncoder;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use kennel_core::StorageReference;
use kennel_storage::ObjectStore;
use std::io;
use std::sync::Arc;
use tar::{EntryType, Header};
use time::OffsetDateTime;
use tokio_util::io::{ReaderStream, StreamReader};

const BLOCK: usize = 512;
const NAME_FIELD_LEN: usize = 100;
const LONG_LINK_NAME: &[u8] = b"././@LongLink";
const END_OF_ARCHIVE: [u8; BLOCK * 2] = [0u8; BLOCK * 2];
const MAX_ROOT_LEN: usize = 64;

/// One entry of the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// A directory; `path` ends with `/`.
    Directory { path: String },
    /// A regular file with its full content.
    File { path: String, data: Bytes },
}

impl ArchiveEntry {
    pub fn path(&self) -> &str {
        match self {
            Self::Directory { path } | Self::File { path, .. } => path,
        }
    }

    /// Content length in bytes; zero for directories.
    pub fn size(&self) -> u64 {
        match self {
            Self::Directory { .. } => 0,
            Self::File { data, .. } => data.len() as u64,
        }
    }
}

/// The three CSV files of an archive.
#[derive(Debug, Clone, Default)]
pub struct DataFiles {
    pub dog: String,
    pub updates: String,
    pub history: String,
}

/// Reduce a dog name to a safe archive root folder.
///
/// Keeps ASCII letters, digits, `-`, `_` and `.`, maps whitespace to `_` and
/// drops everything else. Falls back to `fallback` when nothing usable is left.
pub fn sanitize_root(name: &str, fallback: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .take(MAX_ROOT_LEN)
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        fallback.to_string()
    } else {
        cleaned
    }
}

/// Lazy entry sequence: directories, then CSV files, then media.
///
/// A media object that cannot be downloaded is logged, counted and left out.
pub fn archive_entries(
    root: String,
    avatars_bucket: String,
    updates_bucket: String,
    data: DataFiles,
    media: Vec<StorageReference>,
    storage: Arc<dyn ObjectStore>,
) -> impl Stream<Item = ArchiveEntry> + Send + 'static {
    async_stream::stream! {
        for dir in [
            format!("{root}/"),
            format!("{root}/data/"),
            format!("{root}/media/"),
            format!("{root}/media/{avatars_bucket}/"),
            format!("{root}/media/{updates_bucket}/"),
        ] {
            yield ArchiveEntry::Directory { path: dir };
        }

        for (name, content) in [
            ("dog.csv", data.dog),
            ("updates.csv", data.updates),
            ("history.csv", data.history),
        ] {
            yield ArchiveEntry::File {
                path: format!("{root}/data/{name}"),
                data: Bytes::from(content),
            };
        }

        for reference in media {
            match storage.get(&reference.bucket, &reference.path).await {
                Ok(bytes) => {
                    yield ArchiveEntry::File {
                        path: format!("{root}/media/{}/{}", reference.bucket, reference.path),
                        data: bytes,
                    };
                }
                Err(e) => {
                    EXPORT_MEDIA_SKIPPED.inc();
                    tracing::warn!(
                        bucket = %reference.bucket,
                        path = %reference.path,
                        error = %e,
                        "Media download failed, leaving it out of the archive"
                    );
                }
            }
        }
    }
}

/// Frame entries as a GNU tar byte stream.
pub fn tar_stream<S>(entries: S) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = ArchiveEntry> + Send + 'static,
{
    let framed = async_stream::stream! {
        let mut entries = Box::pin(entries);
        let mtime = u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or(0);

        while let Some(entry) = entries.next().await {
            let (entry_type, mode) = match &entry {
                ArchiveEntry::Directory { .. } => (EntryType::Directory, 0o755),
                ArchiveEntry::File { .. } => (EntryType::Regular, 0o644),
            };
            let name = entry.path().as_bytes();

            if name.len() > NAME_FIELD_LEN {
                let mut long_name = Vec::with_capacity(name.len() + 1);
                long_name.extend_from_slice(name);
                long_name.push(0);
                let header = build_header(
                    LONG_LINK_NAME,
                    EntryType::GNULongName,
                    0o644,
                    long_name.len() as u64,
                    mtime,
                );
                yield header;
                yield padded(Bytes::from(long_name));
            }

            yield build_header(
                truncate_name(name),
                entry_type,
                mode,
                entry.size(),
                mtime,
            );
            match entry {
                ArchiveEntry::File { data, .. } if !data.is_empty() => {
                    yield padded(data);
                }
                _ => {}
            }
        }

        yield Bytes::from_static(&END_OF_ARCHIVE);
    };
    framed.map(Ok::<Bytes, io::Error>)
}

/// Gzip-compress a byte stream.
pub fn gzip_stream<S>(input: S) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    ReaderStream::new(GzipEncoder::new(StreamReader::new(Box::pin(input))))
}

fn truncate_name(name: &[u8]) -> &[u8] {
    &name[..name.len().min(NAME_FIELD_LEN)]
}

fn build_header(name: &[u8], entry_type: EntryType, mode: u32, size: u64, mtime: u64) -> Bytes {
    let mut header = Header::new_gnu();
    // Written directly so directory names keep their trailing slash.
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_entry_type(entry_type);
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_size(size);
    header.set_mtime(mtime);
    header.set_cksum();
    Bytes::copy_from_slice(header.as_bytes())
}

fn padded(data: Bytes) -> Bytes {
    let remainder = data.len() % BLOCK;
    if remainder == 0 {
        return data;
    }
    let mut buf = Vec::with_capacity(data.len() + BLOCK - remainder);
    buf.extend_from_slice(&data);
    buf.resize(data.len() + BLOCK - remainder, 0);
    Bytes::from(buf)
}
