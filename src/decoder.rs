//! Streaming input decoder
//!
//! Terminal input arrives as bytes in whatever encoding the session was
//! negotiated with. Consumers work with UTF-16 code units, so characters
//! outside the Basic Multilingual Plane come out as a surrogate pair: the
//! high surrogate on one call, the low surrogate on the very next one.
//!
//! Reads from a tty routinely return partial multi-byte sequences. The decoder
//! keeps incomplete trailing bytes and resumes once more input arrives; only a
//! sequence still incomplete at the true end of the stream is an error.

use std::collections::VecDeque;
use std::fmt;
use std::io::{self, Read};

use thiserror::Error;

/// Size of a single read from the underlying source
const READ_CHUNK: usize = 256;

/// U+FFFD REPLACEMENT CHARACTER
pub const REPLACEMENT: u16 = 0xFFFD;

/// Character encodings the decoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Charset {
    Utf8,
    Utf16Be,
    Utf16Le,
    Latin1,
    Ascii,
}

impl Charset {
    /// Look up a charset by name. Case, `-` and `_` are ignored.
    pub fn for_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "utf8" | "unicode11utf8" | "cp65001" => Some(Charset::Utf8),
            "utf16be" | "unicodebigunmarked" | "cp1201" => Some(Charset::Utf16Be),
            "utf16le" | "unicodelittleunmarked" | "cp1200" => Some(Charset::Utf16Le),
            "iso88591" | "latin1" | "l1" | "cp819" | "ibm819" | "cp28591" => Some(Charset::Latin1),
            "usascii" | "ascii" | "us" | "646" | "iso646us" | "cp20127" => Some(Charset::Ascii),
            _ => None,
        }
    }

    /// Map a Windows console codepage to a charset
    pub fn for_codepage(codepage: u32) -> Option<Self> {
        match codepage {
            65001 => Some(Charset::Utf8),
            1200 => Some(Charset::Utf16Le),
            1201 => Some(Charset::Utf16Be),
            28591 => Some(Charset::Latin1),
            20127 => Some(Charset::Ascii),
            _ => None,
        }
    }

    /// Canonical name
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Utf16Be => "UTF-16BE",
            Charset::Utf16Le => "UTF-16LE",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }

    /// Encode output text. Characters the charset cannot represent become `?`.
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Charset::Utf8 => text.as_bytes().to_vec(),
            Charset::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
            Charset::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Charset::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Charset::Ascii => text
                .chars()
                .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
                .collect(),
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with an invalid byte sequence in the middle of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Malformed {
    /// Emit U+FFFD for each maximal invalid subsequence
    #[default]
    Replace,
    /// Surface a [`DecodeError::Malformed`]
    Report,
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read input: {0}")]
    Io(#[from] io::Error),

    #[error("Input ended inside a multi-byte sequence ({} trailing bytes)", .bytes.len())]
    Truncated { bytes: Vec<u8> },

    #[error("Malformed {charset} input at byte {offset}: {bytes:02x?}")]
    Malformed {
        charset: Charset,
        offset: u64,
        bytes: Vec<u8>,
    },
}

/// Pull decoder from a byte source to UTF-16 code units
pub struct MultiByteDecoder<R> {
    reader: R,
    charset: Charset,
    policy: Malformed,
    /// Bytes read but not yet decoded
    pending: Vec<u8>,
    /// Stream offset of `pending[0]`
    offset: u64,
    /// Decoded units not yet handed out
    units: VecDeque<u16>,
    /// Error to surface once `units` has drained
    error: Option<DecodeError>,
    eof: bool,
}

impl<R: Read> MultiByteDecoder<R> {
    pub fn new(charset: Charset, reader: R) -> Self {
        Self::with_policy(charset, reader, Malformed::default())
    }

    pub fn with_policy(charset: Charset, reader: R, policy: Malformed) -> Self {
        Self {
            reader,
            charset,
            policy,
            pending: Vec::new(),
            offset: 0,
            units: VecDeque::new(),
            error: None,
            eof: false,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Next code unit, or `None` once the source is exhausted.
    pub fn next_unit(&mut self) -> Result<Option<u16>, DecodeError> {
        loop {
            if let Some(unit) = self.units.pop_front() {
                return Ok(Some(unit));
            }
            if let Some(err) = self.error.take() {
                return Err(err);
            }
            if !self.pending.is_empty() {
                self.decode_pending();
                if !self.units.is_empty() || self.error.is_some() {
                    continue;
                }
            }
            if self.eof {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let bytes = std::mem::take(&mut self.pending);
                return Err(DecodeError::Truncated { bytes });
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> Result<(), DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(());
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decode as much of `pending` as possible, leaving an incomplete tail
    fn decode_pending(&mut self) {
        let bytes = std::mem::take(&mut self.pending);
        let consumed = match self.charset {
            Charset::Utf8 => self.decode_utf8(&bytes),
            Charset::Utf16Be => self.decode_utf16(&bytes, u16::from_be_bytes),
            Charset::Utf16Le => self.decode_utf16(&bytes, u16::from_le_bytes),
            Charset::Latin1 => {
                self.units.extend(bytes.iter().map(|b| u16::from(*b)));
                bytes.len()
            }
            Charset::Ascii => self.decode_ascii(&bytes),
        };
        self.offset += consumed as u64;
        self.pending = bytes[consumed..].to_vec();
    }

    fn decode_utf8(&mut self, bytes: &[u8]) -> usize {
        let mut pos = 0;
        while pos < bytes.len() {
            match std::str::from_utf8(&bytes[pos..]) {
                Ok(s) => {
                    self.units.extend(s.encode_utf16());
                    pos = bytes.len();
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    // the prefix up to valid_up_to is always well formed
                    if let Ok(s) = std::str::from_utf8(&bytes[pos..pos + valid]) {
                        self.units.extend(s.encode_utf16());
                    }
                    pos += valid;
                    match e.error_len() {
                        Some(len) => {
                            let keep_going = self.malformed(pos, &bytes[pos..pos + len]);
                            pos += len;
                            if !keep_going {
                                break;
                            }
                        }
                        // incomplete sequence at the end, wait for more input
                        None => break,
                    }
                }
            }
        }
        pos
    }

    fn decode_utf16(&mut self, bytes: &[u8], unit: fn([u8; 2]) -> u16) -> usize {
        let mut pos = 0;
        while pos + 2 <= bytes.len() {
            let first = unit([bytes[pos], bytes[pos + 1]]);
            match first {
                0xD800..=0xDBFF => {
                    if pos + 4 > bytes.len() {
                        break;
                    }
                    let second = unit([bytes[pos + 2], bytes[pos + 3]]);
                    if (0xDC00..=0xDFFF).contains(&second) {
                        self.units.push_back(first);
                        self.units.push_back(second);
                        pos += 4;
                    } else {
                        let keep_going = self.malformed(pos, &bytes[pos..pos + 2]);
                        pos += 2;
                        if !keep_going {
                            break;
                        }
                    }
                }
                0xDC00..=0xDFFF => {
                    let keep_going = self.malformed(pos, &bytes[pos..pos + 2]);
                    pos += 2;
                    if !keep_going {
                        break;
                    }
                }
                _ => {
                    self.units.push_back(first);
                    pos += 2;
                }
            }
        }
        pos
    }

    fn decode_ascii(&mut self, bytes: &[u8]) -> usize {
        for (pos, b) in bytes.iter().enumerate() {
            if b.is_ascii() {
                self.units.push_back(u16::from(*b));
            } else if !self.malformed(pos, &bytes[pos..pos + 1]) {
                return pos + 1;
            }
        }
        bytes.len()
    }

    /// Apply the malformed-input policy. Returns whether decoding continues.
    fn malformed(&mut self, pos: usize, bytes: &[u8]) -> bool {
        match self.policy {
            Malformed::Replace => {
                self.units.push_back(REPLACEMENT);
                true
            }
            Malformed::Report => {
                self.error = Some(DecodeError::Malformed {
                    charset: self.charset,
                    offset: self.offset + pos as u64,
                    bytes: bytes.to_vec(),
                });
                false
            }
        }
    }
}

impl<R: Read> Iterator for MultiByteDecoder<R> {
    type Item = Result<u16, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_unit().transpose()
    }
}
