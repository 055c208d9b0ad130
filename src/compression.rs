//! Decompression of radar files
//!
//! Two layers are undone here:
//!
//! - Whole-file wrapping (gzip, bzip2, zstd), the way archived files are
//!   usually distributed.
//! - The Archive II container: a 24 byte volume header followed by
//!   length-prefixed chunks, each chunk a complete bzip2 stream.
//!
//! A chunk that fails to inflate is logged at `warn` and left out of the
//! output; decoding continues with the next chunk. The radials it held are
//! silently missing from the result, so the count of dropped chunks is
//! reported back in [`ArchiveReport`] and surfaces as a scan warning.

use crate::config::DecoderConfig;
use crate::error::{RadarError, Result};
use crate::io::{read_at, read_full, ByteSource, DiskCache};
use crate::utils::format_bytes;
use bzip2::read::{BzDecoder, MultiBzDecoder};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Size of the Archive II volume header copied verbatim to the output
pub const ARCHIVE_HEADER_SIZE: usize = 24;

/// Archive container tag prefix (`AR2V0001` and later)
pub const ARCHIVE_CONTAINER_TAG: &[u8; 4] = b"AR2V";

/// Marker opening each bzip2 chunk of an archive container
pub const BZIP2_CHUNK_MARKER: &[u8; 2] = b"BZ";

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

/// How a radar file is compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionMethod {
    /// Plain records
    None = 0,
    /// Whole file gzip
    Gzip = 1,
    /// Whole file bzip2
    Bzip2 = 2,
    /// Whole file zstd
    Zstd = 3,
    /// Archive II container of bzip2 chunks
    ArchiveBzip2 = 4,
}

impl CompressionMethod {
    /// Identify the compression from the first bytes of a file
    ///
    /// Needs at least 30 bytes to recognize an archive container.
    pub fn detect(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            CompressionMethod::Gzip
        } else if head.starts_with(BZIP2_MAGIC) {
            CompressionMethod::Bzip2
        } else if head.starts_with(ZSTD_MAGIC) {
            CompressionMethod::Zstd
        } else if is_archive_container(head) {
            CompressionMethod::ArchiveBzip2
        } else {
            CompressionMethod::None
        }
    }

    /// Suffix of the cache entry holding the uncompressed copy
    pub fn cache_suffix(&self) -> &'static str {
        match self {
            CompressionMethod::ArchiveBzip2 => "uncompress",
            _ => "inflate",
        }
    }
}

/// True when `head` opens a bzip2 chunked archive container
///
/// The tag must be `AR2V....` and the first chunk, after its 4 byte length,
/// must start with `BZ`. `ARCHIVE2` files are never containers.
pub fn is_archive_container(head: &[u8]) -> bool {
    let marker = ARCHIVE_HEADER_SIZE + 4;
    head.len() >= marker + 2
        && head.starts_with(ARCHIVE_CONTAINER_TAG)
        && &head[marker..marker + 2] == BZIP2_CHUNK_MARKER
}

/// Trait for decompression operations
pub trait Decompressor: Send + Sync {
    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Get the compression method
    fn method(&self) -> CompressionMethod;
}

/// No compression
#[derive(Debug, Default)]
pub struct NoneDecompressor;

impl Decompressor for NoneDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::None
    }
}

/// Whole file gzip
#[derive(Debug, Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decompressed = Vec::new();
        MultiGzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| RadarError::Decompression(e.to_string()))?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Gzip
    }
}

/// Whole file bzip2
#[derive(Debug, Default)]
pub struct Bzip2Decompressor;

impl Decompressor for Bzip2Decompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decompressed = Vec::new();
        MultiBzDecoder::new(data)
            .read_to_end(&mut decompressed)
            .map_err(|e| RadarError::Decompression(e.to_string()))?;
        Ok(decompressed)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Bzip2
    }
}

/// Whole file zstd
#[derive(Debug, Default)]
pub struct ZstdDecompressor;

impl Decompressor for ZstdDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| RadarError::Decompression(e.to_string()))
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

/// Outcome of inflating an archive container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Chunks found in the input
    pub chunks: usize,

    /// Indices of chunks whose output was dropped
    pub dropped_chunks: Vec<usize>,

    /// Bytes written, header included
    pub bytes_out: u64,
}

impl ArchiveReport {
    pub fn is_complete(&self) -> bool {
        self.dropped_chunks.is_empty()
    }
}

/// Archive II bzip2 chunk container
#[derive(Debug, Default)]
pub struct ArchiveDecompressor;

impl ArchiveDecompressor {
    /// Inflate an archive container from `input` into `output`
    ///
    /// Fails only when the header or the first chunk length cannot be read;
    /// chunks that do not inflate are dropped and listed in the report.
    pub fn decompress_stream<R: Read, W: Write>(&self, input: &mut R, output: &mut W) -> Result<ArchiveReport> {
        let mut header = [0u8; ARCHIVE_HEADER_SIZE];
        input.read_exact(&mut header)?;
        output.write_all(&header)?;

        let mut report = ArchiveReport {
            bytes_out: ARCHIVE_HEADER_SIZE as u64,
            ..ArchiveReport::default()
        };
        let mut produced_data = false;

        loop {
            let mut len_bytes = [0u8; 4];
            let got = read_full(input, &mut len_bytes)?;
            if got < len_bytes.len() {
                if !produced_data {
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("truncated chunk length after {} bytes of archive", report.bytes_out),
                    )
                    .into());
                }
                debug!(chunks = report.chunks, "archive ended without terminator");
                break;
            }

            let raw_len = i32::from_be_bytes(len_bytes);
            if raw_len == -1 {
                debug!(chunks = report.chunks, "archive terminator");
                break;
            }
            // The final chunk carries its length negated
            let last = raw_len < 0;
            let len = raw_len.unsigned_abs() as usize;

            let chunk = report.chunks;
            report.chunks += 1;

            let mut buf = vec![0u8; len];
            let got = read_full(input, &mut buf)?;
            if got < len {
                if !produced_data {
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("chunk {} truncated: {} of {} bytes", chunk, got, len),
                    )
                    .into());
                }
                warn!(chunk, expected = len, got, "dropping truncated archive chunk");
                report.dropped_chunks.push(chunk);
                break;
            }

            match inflate_chunk(&buf) {
                Ok(plain) => {
                    output.write_all(&plain)?;
                    report.bytes_out += plain.len() as u64;
                    produced_data = true;
                    debug!(chunk, compressed = len, unpacked = plain.len(), "inflated archive chunk");
                }
                Err(e) => {
                    warn!(chunk, error = %e, "dropping archive chunk that failed to inflate");
                    report.dropped_chunks.push(chunk);
                }
            }

            if last {
                break;
            }
        }

        info!(
            chunks = report.chunks,
            dropped = report.dropped_chunks.len(),
            size = %format_bytes(report.bytes_out as usize),
            "uncompressed archive container"
        );
        Ok(report)
    }
}

impl Decompressor for ArchiveDecompressor {
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 4);
        self.decompress_stream(&mut Cursor::new(data), &mut out)?;
        Ok(out)
    }

    fn method(&self) -> CompressionMethod {
        CompressionMethod::ArchiveBzip2
    }
}

/// Inflate one chunk; it must open with the `BZ` sub-header
fn inflate_chunk(chunk: &[u8]) -> Result<Vec<u8>> {
    if !chunk.starts_with(BZIP2_CHUNK_MARKER) {
        return Err(RadarError::Decompression(format!(
            "chunk does not start with BZ marker ({} bytes)",
            chunk.len()
        )));
    }
    let mut plain = Vec::with_capacity(chunk.len() * 8);
    BzDecoder::new(chunk)
        .read_to_end(&mut plain)
        .map_err(|e| RadarError::Decompression(e.to_string()))?;
    Ok(plain)
}

/// Get a decompressor for a given method
pub fn get_decompressor(method: CompressionMethod) -> Box<dyn Decompressor> {
    match method {
        CompressionMethod::None => Box::new(NoneDecompressor),
        CompressionMethod::Gzip => Box::new(GzipDecompressor),
        CompressionMethod::Bzip2 => Box::new(Bzip2Decompressor),
        CompressionMethod::Zstd => Box::new(ZstdDecompressor),
        CompressionMethod::ArchiveBzip2 => Box::new(ArchiveDecompressor),
    }
}

/// Undo every compression layer of an in-memory file
///
/// Plain input, including any `ARCHIVE2` file, comes back borrowed and
/// unchanged.
pub fn decompress(source: &[u8]) -> Result<Cow<'_, [u8]>> {
    decompress_with_report(source).map(|(data, _)| data)
}

/// Like [`decompress`], also returning the archive report when a chunk
/// container was inflated
pub fn decompress_with_report(source: &[u8]) -> Result<(Cow<'_, [u8]>, Option<ArchiveReport>)> {
    let method = CompressionMethod::detect(source);
    if method == CompressionMethod::None {
        return Ok((Cow::Borrowed(source), None));
    }
    let mut out = Vec::with_capacity(source.len() * 4);
    let report = inflate_into(method, &mut Cursor::new(source), &mut out)?;
    Ok((Cow::Owned(out), report))
}

/// Write the fully uncompressed form of `input` to `output`
fn inflate_into<R: Read, W: Write>(
    method: CompressionMethod,
    input: &mut R,
    output: &mut W,
) -> Result<Option<ArchiveReport>> {
    if method == CompressionMethod::ArchiveBzip2 {
        return ArchiveDecompressor.decompress_stream(input, output).map(Some);
    }

    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let inflated = get_decompressor(method).decompress(&raw)?;
    if is_archive_container(&inflated) {
        return ArchiveDecompressor
            .decompress_stream(&mut Cursor::new(&inflated), output)
            .map(Some);
    }
    output.write_all(&inflated)?;
    Ok(None)
}

/// A stream ready for record decoding
pub struct PreparedSource {
    /// Uncompressed bytes
    pub stream: Box<dyn ByteSource>,

    /// Compression found on the original file
    pub method: CompressionMethod,

    /// Archive inflation outcome, when one ran during this open
    pub report: Option<ArchiveReport>,

    /// True when the stream was served from the disk cache
    pub from_cache: bool,
}

/// Open `path`, undoing compression through the disk cache when enabled
///
/// A cache entry that already exists is used as is; decompression happens at
/// most once per source path.
pub fn open_source(path: &Path, config: &DecoderConfig) -> Result<PreparedSource> {
    let mut file = File::open(path)?;
    let mut head = [0u8; ARCHIVE_HEADER_SIZE + 8];
    let n = read_at(&mut file, 0, &mut head)?;
    let method = CompressionMethod::detect(&head[..n]);

    if method == CompressionMethod::None {
        return Ok(PreparedSource {
            stream: Box::new(BufReader::new(file)),
            method,
            report: None,
            from_cache: false,
        });
    }

    file.seek(SeekFrom::Start(0))?;
    let mut input = BufReader::new(file);

    if !config.use_disk_cache {
        let mut out = Vec::new();
        let report = inflate_into(method, &mut input, &mut out)?;
        return Ok(PreparedSource {
            stream: Box::new(Cursor::new(out)),
            method,
            report,
            from_cache: false,
        });
    }

    let cache = DiskCache::new(config.resolved_cache_dir());
    let suffix = method.cache_suffix();
    if let Some(hit) = cache.lookup(path, suffix) {
        debug!(path = %path.display(), cache = %hit.display(), "using cached uncompressed file");
        return Ok(PreparedSource {
            stream: Box::new(BufReader::new(File::open(hit)?)),
            method,
            report: None,
            from_cache: true,
        });
    }

    let target = cache.path_for(path, suffix);
    let report = cache.store(&target, |w| inflate_into(method, &mut input, w))?;
    Ok(PreparedSource {
        stream: Box::new(BufReader::new(File::open(&target)?)),
        method,
        report,
        from_cache: false,
    })
}
