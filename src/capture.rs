//! Parser for the header of a binary `trace-cmd` capture (`trace.dat`).
//!
//! Only the fixed part of the header is read. It is enough to tell a real
//! capture from garbage before spending time on conversion, and to report
//! basic platform information.

use byteorder::BigEndian;
use byteorder::ByteOrder;
use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use compact_str::CompactString;
use std::io::Read;

/// Magic bytes at the start of every `trace.dat`.
const MAGIC: &[u8; 10] = b"\x17\x08\x44tracing";

/// Longest version string we accept before giving up.
const MAX_VERSION_LEN: usize = 16;

/// Error type for capture header parsing.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Not a trace-cmd capture (bad magic)")]
    BadMagic,
    #[error("Invalid capture header: {0}")]
    Invalid(String),
    #[error("Failed to read capture header: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<CaptureError> for std::io::Error {
    fn from(err: CaptureError) -> Self {
        match err {
            CaptureError::IoError(err) => err,
            other => Self::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// Byte order the capture was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Fixed part of the `trace.dat` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureHeader {
    /// File format version, e.g. `6` or `7`.
    pub version: CompactString,
    pub endian: Endian,
    /// Size of a C `long` on the traced machine.
    pub long_size: u8,
    pub page_size: u32,
}

impl CaptureHeader {
    pub fn parse(mut data: impl Read) -> Result<Self, CaptureError> {
        let mut magic = [0u8; MAGIC.len()];
        data.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(CaptureError::BadMagic);
        }

        let mut version = CompactString::default();
        loop {
            match data.read_u8()? {
                0 => break,
                b if b.is_ascii_digit() && version.len() < MAX_VERSION_LEN => {
                    version.push(char::from(b));
                }
                b => {
                    return Err(CaptureError::Invalid(format!(
                        "Unexpected byte {b:#04x} in version string"
                    )));
                }
            }
        }
        if version.is_empty() {
            return Err(CaptureError::Invalid("Empty version string".to_string()));
        }

        let endian = match data.read_u8()? {
            0 => Endian::Little,
            1 => Endian::Big,
            b => {
                return Err(CaptureError::Invalid(format!("Unknown endianness {b}")));
            }
        };
        let long_size = data.read_u8()?;
        if long_size != 4 && long_size != 8 {
            return Err(CaptureError::Invalid(format!(
                "Unsupported long size {long_size}"
            )));
        }
        let page_size = match endian {
            Endian::Little => Self::read_page_size::<LittleEndian>(&mut data)?,
            Endian::Big => Self::read_page_size::<BigEndian>(&mut data)?,
        };

        Ok(Self {
            version,
            endian,
            long_size,
            page_size,
        })
    }

    fn read_page_size<O: ByteOrder>(data: &mut impl Read) -> Result<u32, CaptureError> {
        Ok(data.read_u32::<O>()?)
    }

    /// Read the header of the capture at `path`.
    pub fn from_file(path: &std::path::Path) -> Result<Self, CaptureError> {
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file))
    }
}
