//! Order-independent checksums for tar streams.
//!
//! `TarSum` wraps a tar stream and computes a content checksum while the
//! stream is read, without buffering the archive. Each entry is hashed over
//! a canonical encoding of its header fields followed by its body; the
//! final checksum hashes the sorted per-entry digests, so two archives with
//! the same entries in different order produce the same sum. The wrapped
//! stream passes through byte-for-byte, optionally gzip-compressed, which
//! lets an upload be checksummed and transferred in a single pass.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};

use crate::error::{Result, StevedoreError};

#[cfg(test)]
mod tests;

const BLOCK_SIZE: usize = 512;
const BODY_CHUNK: u64 = 32 * 1024;

/// Checksum algorithms understood by registry blob routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumType {
    /// Plain sha256 over the raw bytes.
    Sha256,
    /// Order-independent tar checksum.
    TarsumSha256,
}

impl SumType {
    /// The label used in checksum strings and blob URLs.
    pub fn label(&self) -> &'static str {
        match self {
            SumType::Sha256 => "sha256",
            SumType::TarsumSha256 => "tarsum+sha256",
        }
    }
}

impl fmt::Display for SumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SumType {
    type Err = StevedoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(SumType::Sha256),
            "tarsum+sha256" => Ok(SumType::TarsumSha256),
            _ => Err(StevedoreError::sum_type_not_supported(s)),
        }
    }
}

/// Splits a `<label>:<hex>` checksum string into its sum type and digest.
pub fn parse_checksum(checksum: &str) -> Result<(SumType, &str)> {
    match checksum.split_once(':') {
        Some((label, hex)) if !hex.is_empty() => Ok((label.parse()?, hex)),
        _ => Err(StevedoreError::validation(format!(
            "malformed checksum string: {}",
            checksum
        ))),
    }
}

enum Sink {
    Plain,
    Gzip(Option<GzEncoder<Vec<u8>>>),
}

enum State {
    Header,
    Body {
        hasher: Sha256,
        name: String,
        body_left: u64,
        padding_left: u64,
    },
    Finished,
}

/// A checksumming pass-through reader for tar streams.
///
/// Reading from a `TarSum` yields the archive bytes unchanged (gzipped
/// when requested) while per-entry digests accumulate. The stream must be
/// drained before [`TarSum::sum`] can produce the final checksum.
///
/// # Examples
///
/// ```
/// use std::io::Read;
/// use libstevedore::tarsum::TarSum;
///
/// # fn example(archive: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
/// let mut tarsum = TarSum::new(archive, false);
/// let mut out = Vec::new();
/// tarsum.read_to_end(&mut out)?;
/// let checksum = tarsum.sum(b"")?;
/// assert!(checksum.starts_with("tarsum+sha256:"));
/// # Ok(())
/// # }
/// ```
pub struct TarSum<R: Read> {
    reader: R,
    sink: Sink,
    pending: Vec<u8>,
    pos: usize,
    state: State,
    sums: BTreeMap<String, String>,
}

impl<R: Read> TarSum<R> {
    /// Wraps a tar stream. When `compress_output` is set the pass-through
    /// bytes are gzip-compressed; the checksum is always computed over the
    /// uncompressed archive.
    pub fn new(reader: R, compress_output: bool) -> Self {
        let sink = if compress_output {
            Sink::Gzip(Some(GzEncoder::new(Vec::new(), Compression::default())))
        } else {
            Sink::Plain
        };

        Self {
            reader,
            sink,
            pending: Vec::new(),
            pos: 0,
            state: State::Header,
            sums: BTreeMap::new(),
        }
    }

    /// Whether the end-of-archive marker has been consumed.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// Per-entry digests keyed by cleaned entry path.
    pub fn sums(&self) -> &BTreeMap<String, String> {
        &self.sums
    }

    /// The final checksum, formatted `tarsum+sha256:<hex>`.
    ///
    /// `extra` is mixed into the hash ahead of the entry digests; the v1
    /// push protocol feeds the image JSON through it so the checksum binds
    /// metadata and layer together. Fails unless the stream has been read
    /// to the end.
    pub fn sum(&self, extra: &[u8]) -> Result<String> {
        if !self.is_finished() {
            return Err(StevedoreError::validation(
                "tar stream has not been fully read; checksum is incomplete",
            ));
        }

        let mut digests: Vec<&String> = self.sums.values().collect();
        digests.sort();

        let mut hasher = Sha256::new();
        hasher.update(extra);
        for digest in digests {
            hasher.update(digest.as_bytes());
        }

        Ok(format!(
            "{}:{}",
            SumType::TarsumSha256,
            hex::encode(hasher.finalize())
        ))
    }

    fn write_out(&mut self, bytes: &[u8]) -> io::Result<()> {
        match &mut self.sink {
            Sink::Plain => self.pending.extend_from_slice(bytes),
            Sink::Gzip(Some(encoder)) => {
                encoder.write_all(bytes)?;
                self.pending.append(encoder.get_mut());
            }
            Sink::Gzip(None) => unreachable!("write after gzip finish"),
        }
        Ok(())
    }

    fn finish_output(&mut self) -> io::Result<()> {
        if let Sink::Gzip(encoder) = &mut self.sink
            && let Some(encoder) = encoder.take()
        {
            let remainder = encoder.finish()?;
            self.pending.extend_from_slice(&remainder);
        }
        Ok(())
    }

    /// Advances the state machine by one step, producing pass-through
    /// bytes into the pending buffer.
    fn step(&mut self) -> io::Result<()> {
        match std::mem::replace(&mut self.state, State::Finished) {
            State::Header => self.step_header(),
            State::Body {
                hasher,
                name,
                body_left,
                padding_left,
            } => self.step_body(hasher, name, body_left, padding_left),
            State::Finished => Ok(()),
        }
    }

    fn step_header(&mut self) -> io::Result<()> {
        let mut block = [0u8; BLOCK_SIZE];
        self.reader.read_exact(&mut block).map_err(truncated)?;

        if block.iter().all(|&b| b == 0) {
            // End of archive: two zero blocks.
            let mut second = [0u8; BLOCK_SIZE];
            self.reader.read_exact(&mut second).map_err(truncated)?;
            if second.iter().any(|&b| b != 0) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "malformed tar stream: lone zero block before end of archive",
                ));
            }
            self.write_out(&block)?;
            self.write_out(&second)?;
            self.finish_output()?;
            self.state = State::Finished;
            return Ok(());
        }

        let mut header = tar::Header::new_old();
        header.as_mut_bytes().copy_from_slice(&block);

        let name = String::from_utf8_lossy(&header.path_bytes()).into_owned();
        let mut hasher = Sha256::new();
        encode_header(&mut hasher, &header, &name)?;

        let size = parse_numeric(&header.as_old().size).map_err(corrupt_header)?;
        let padding = (BLOCK_SIZE as u64 - size % BLOCK_SIZE as u64) % BLOCK_SIZE as u64;

        self.write_out(&block)?;

        if size == 0 {
            self.record_entry(&name, hasher);
            self.state = State::Header;
        } else {
            self.state = State::Body {
                hasher,
                name,
                body_left: size,
                padding_left: padding,
            };
        }
        Ok(())
    }

    fn step_body(
        &mut self,
        mut hasher: Sha256,
        name: String,
        mut body_left: u64,
        mut padding_left: u64,
    ) -> io::Result<()> {
        let chunk = (body_left + padding_left).min(BODY_CHUNK);
        let mut buf = vec![0u8; chunk as usize];
        self.reader.read_exact(&mut buf).map_err(truncated)?;

        let hashed = body_left.min(chunk);
        hasher.update(&buf[..hashed as usize]);
        body_left -= hashed;
        padding_left -= chunk - hashed;

        self.write_out(&buf)?;

        if body_left == 0 && padding_left == 0 {
            self.record_entry(&name, hasher);
            self.state = State::Header;
        } else {
            self.state = State::Body {
                hasher,
                name,
                body_left,
                padding_left,
            };
        }
        Ok(())
    }

    fn record_entry(&mut self, name: &str, hasher: Sha256) {
        let key = name
            .strip_prefix("./")
            .unwrap_or(name)
            .trim_end_matches('/')
            .to_string();
        self.sums.insert(key, hex::encode(hasher.finalize()));
    }
}

impl<R: Read> Read for TarSum<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if self.pos < self.pending.len() {
                let n = buf.len().min(self.pending.len() - self.pos);
                buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
                self.pos += n;
                if self.pos == self.pending.len() {
                    self.pending.clear();
                    self.pos = 0;
                }
                return Ok(n);
            }
            if self.is_finished() {
                return Ok(0);
            }
            self.step()?;
        }
    }
}

/// Feeds the canonical header-field encoding into the entry hasher.
///
/// Fields are hashed as `field-name` + `value` with no delimiter, numbers
/// in decimal, matching the wire checksum layers are published under.
fn encode_header(hasher: &mut Sha256, header: &tar::Header, name: &str) -> io::Result<()> {
    let old = header.as_old();
    let mode = parse_numeric(&old.mode).map_err(corrupt_header)?;
    let uid = parse_numeric(&old.uid).map_err(corrupt_header)?;
    let gid = parse_numeric(&old.gid).map_err(corrupt_header)?;
    let size = parse_numeric(&old.size).map_err(corrupt_header)?;
    let mtime = parse_numeric(&old.mtime).map_err(corrupt_header)?;

    let typeflag = match header.entry_type().as_byte() {
        0 => b'0',
        b => b,
    };
    let linkname = header
        .link_name_bytes()
        .map(|l| String::from_utf8_lossy(&l).into_owned())
        .unwrap_or_default();
    let uname = header
        .username_bytes()
        .map(|u| String::from_utf8_lossy(u).into_owned())
        .unwrap_or_default();
    let gname = header
        .groupname_bytes()
        .map(|g| String::from_utf8_lossy(g).into_owned())
        .unwrap_or_default();
    let devmajor = header
        .device_major()
        .ok()
        .flatten()
        .map(i64::from)
        .unwrap_or(0);
    let devminor = header
        .device_minor()
        .ok()
        .flatten()
        .map(i64::from)
        .unwrap_or(0);

    for (field, value) in [
        ("name", name.to_string()),
        ("mode", mode.to_string()),
        ("uid", uid.to_string()),
        ("gid", gid.to_string()),
        ("size", size.to_string()),
        ("mtime", mtime.to_string()),
        ("typeflag", (typeflag as char).to_string()),
        ("linkname", linkname),
        ("uname", uname),
        ("gname", gname),
        ("devmajor", devmajor.to_string()),
        ("devminor", devminor.to_string()),
    ] {
        hasher.update(field.as_bytes());
        hasher.update(value.as_bytes());
    }
    Ok(())
}

/// Parses an octal numeric header field the way tar readers do: spaces
/// and NULs are padding, an all-padding field reads as zero, and a field
/// whose first byte has the high bit set is GNU base-256.
fn parse_numeric(field: &[u8]) -> io::Result<u64> {
    if field.first().is_some_and(|b| b & 0x80 != 0) {
        let mut value = u64::from(field[0] & 0x7f);
        for &b in &field[1..] {
            value = value << 8 | u64::from(b);
        }
        return Ok(value);
    }

    let is_pad = |b: &u8| *b == 0 || *b == b' ';
    let Some(start) = field.iter().position(|b| !is_pad(b)) else {
        return Ok(0);
    };
    let end = field.iter().rposition(|b| !is_pad(b)).unwrap_or(start) + 1;

    let mut value = 0u64;
    for &b in &field[start..end] {
        if !b.is_ascii_digit() || b > b'7' {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "numeric field is not octal",
            ));
        }
        value = value * 8 + u64::from(b - b'0');
    }
    Ok(value)
}

fn truncated(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        io::Error::new(
            io::ErrorKind::InvalidData,
            "malformed tar stream: truncated before end of archive",
        )
    } else {
        e
    }
}

fn corrupt_header(e: io::Error) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("malformed tar header: {}", e),
    )
}
