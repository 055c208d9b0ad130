//! Byte sources and the on-disk decompression cache

use crate::error::Result;
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A seekable stream a volume scan can be decoded from
pub trait ByteSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> ByteSource for T {}

/// Total length of a stream, leaving its position unchanged
pub fn stream_len<S: Seek + ?Sized>(stream: &mut S) -> Result<u64> {
    let pos = stream.stream_position()?;
    let len = stream.seek(SeekFrom::End(0))?;
    if pos != len {
        stream.seek(SeekFrom::Start(pos))?;
    }
    Ok(len)
}

/// Read up to `buf.len()` bytes at `offset`
///
/// Returns how many bytes were read; fewer than requested means the stream
/// ended.
pub fn read_at<S: Read + Seek + ?Sized>(stream: &mut S, offset: u64, buf: &mut [u8]) -> Result<usize> {
    stream.seek(SeekFrom::Start(offset))?;
    read_full(stream, buf)
}

/// Fill `buf` from `input`, returning fewer bytes only at end of input
pub fn read_full<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Directory of uncompressed copies, keyed by source path
///
/// Entries are pure cache: deleting them only costs a re-decompression.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cache file for `source`, e.g. `/data/Z_RADR.bin` + `uncompress` gives
    /// `<root>/-data-Z_RADR.bin.uncompress`
    pub fn path_for(&self, source: &Path, suffix: &str) -> PathBuf {
        let absolute = fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf());
        let key: String = absolute
            .to_string_lossy()
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' => '-',
                c => c,
            })
            .collect();
        self.root.join(format!("{}.{}", key, suffix))
    }

    /// An existing, non-empty cache entry for `source`
    pub fn lookup(&self, source: &Path, suffix: &str) -> Option<PathBuf> {
        let path = self.path_for(source, suffix);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => Some(path),
            _ => None,
        }
    }

    /// Produce a cache entry by running `fill` against a fresh file
    ///
    /// The entry only becomes visible once `fill` succeeds; a failed run
    /// leaves nothing behind.
    pub fn store<T, F>(&self, target: &Path, fill: F) -> Result<T>
    where
        F: FnOnce(&mut BufWriter<File>) -> Result<T>,
    {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let partial = target.with_extension(format!(
            "{}.part",
            target.extension().and_then(|e| e.to_str()).unwrap_or("cache")
        ));

        let outcome: Result<T> = (|| {
            let mut writer = BufWriter::new(File::create(&partial)?);
            let value = fill(&mut writer)?;
            writer.flush()?;
            Ok(value)
        })();

        match outcome {
            Ok(value) => {
                fs::rename(&partial, target)?;
                debug!(path = %target.display(), "stored cache entry");
                Ok(value)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    if rm.kind() != ErrorKind::NotFound {
                        warn!(path = %partial.display(), error = %rm, "failed to delete partial cache entry");
                    }
                }
                Err(e)
            }
        }
    }
}
