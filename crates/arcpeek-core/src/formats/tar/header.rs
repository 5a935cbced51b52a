//! TAR header block decoding.
//!
//! Field layout (POSIX ustar; GNU and v7 headers share the first 257
//! bytes):
//!
//! | Offset | Size | Field    |
//! |--------|------|----------|
//! | 0      | 100  | name     |
//! | 100    | 8    | mode     |
//! | 108    | 8    | uid      |
//! | 116    | 8    | gid      |
//! | 124    | 12   | size     |
//! | 136    | 12   | mtime    |
//! | 148    | 8    | checksum |
//! | 156    | 1    | typeflag |
//! | 157    | 100  | linkname |
//! | 257    | 6    | magic    |
//! | 263    | 2    | version  |
//! | 265    | 32   | uname    |
//! | 297    | 32   | gname    |
//! | 329    | 8    | devmajor |
//! | 337    | 8    | devminor |
//! | 345    | 155  | prefix   |

use std::ops::Range;

use crate::ArcError;
use crate::Result;

/// Size of one TAR block.
pub(crate) const BLOCK_SIZE: usize = 512;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHECKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const PREFIX: Range<usize> = 345..500;

/// POSIX magic; GNU writes `"ustar  \0"` across magic and version.
const POSIX_MAGIC: &[u8; 6] = b"ustar\0";

/// Borrowed view of a 512-byte header block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Header<'a> {
    block: &'a [u8; BLOCK_SIZE],
}

impl<'a> Header<'a> {
    pub(crate) const fn new(block: &'a [u8; BLOCK_SIZE]) -> Self {
        Self { block }
    }

    pub(crate) const fn typeflag(&self) -> u8 {
        self.block[TYPEFLAG]
    }

    /// Entry name, joined with the ustar prefix when one is present.
    pub(crate) fn path_name(&self) -> String {
        let name = field_bytes(&self.block[NAME]);
        let prefix = field_bytes(&self.block[PREFIX]);
        if self.is_posix() && !prefix.is_empty() {
            format!(
                "{}/{}",
                String::from_utf8_lossy(prefix),
                String::from_utf8_lossy(name)
            )
        } else {
            String::from_utf8_lossy(name).into_owned()
        }
    }

    pub(crate) fn link_name(&self) -> String {
        field_string(&self.block[LINKNAME])
    }

    pub(crate) fn uname(&self) -> Option<String> {
        Some(field_string(&self.block[UNAME])).filter(|s| !s.is_empty())
    }

    pub(crate) fn gname(&self) -> Option<String> {
        Some(field_string(&self.block[GNAME])).filter(|s| !s.is_empty())
    }

    pub(crate) fn mode(&self) -> Result<u32> {
        Ok((parse_numeric(&self.block[MODE], "mode")? & 0o7777) as u32)
    }

    pub(crate) fn uid(&self) -> Result<u64> {
        parse_numeric(&self.block[UID], "uid")
    }

    pub(crate) fn gid(&self) -> Result<u64> {
        parse_numeric(&self.block[GID], "gid")
    }

    pub(crate) fn size(&self) -> Result<u64> {
        parse_numeric(&self.block[SIZE], "size")
    }

    pub(crate) fn mtime(&self) -> Result<i64> {
        let raw = parse_numeric(&self.block[MTIME], "mtime")?;
        i64::try_from(raw).map_err(|_| ArcError::Malformed(format!("mtime {raw} out of range")))
    }

    pub(crate) fn stored_checksum(&self) -> Result<u64> {
        parse_numeric(&self.block[CHECKSUM], "checksum")
    }

    /// Unsigned and signed sums of the block with the checksum field
    /// counted as spaces. Some historic writers used the signed sum.
    pub(crate) fn computed_checksums(&self) -> (u64, i64) {
        let mut unsigned = 0u64;
        let mut signed = 0i64;
        for (i, &byte) in self.block.iter().enumerate() {
            let byte = if CHECKSUM.contains(&i) { b' ' } else { byte };
            unsigned += u64::from(byte);
            signed += i64::from(byte.cast_signed());
        }
        (unsigned, signed)
    }

    /// Returns `true` if the stored checksum matches either sum.
    pub(crate) fn checksum_matches(&self, stored: u64) -> bool {
        let (unsigned, signed) = self.computed_checksums();
        stored == unsigned || i64::try_from(stored).is_ok_and(|stored| stored == signed)
    }

    fn is_posix(&self) -> bool {
        &self.block[MAGIC] == POSIX_MAGIC
    }
}

/// Returns `true` for an all-zero block, the end-of-archive marker.
pub(crate) fn is_zero_block(block: &[u8; BLOCK_SIZE]) -> bool {
    block.iter().all(|&b| b == 0)
}

/// Rounds `size` up to a whole number of blocks.
pub(crate) fn padded(size: u64) -> Option<u64> {
    size.checked_next_multiple_of(BLOCK_SIZE as u64)
}

/// Bytes of a NUL-terminated field.
pub(crate) fn field_bytes(field: &[u8]) -> &[u8] {
    field
        .iter()
        .position(|&b| b == 0)
        .map_or(field, |end| &field[..end])
}

pub(crate) fn field_string(field: &[u8]) -> String {
    String::from_utf8_lossy(field_bytes(field)).into_owned()
}

/// Parses an octal or base-256 numeric field.
///
/// Octal fields may be padded with leading spaces or NULs and terminated
/// by a space or NUL. Base-256 fields set the high bit of the first byte;
/// negative values are rejected.
pub(crate) fn parse_numeric(field: &[u8], name: &str) -> Result<u64> {
    let malformed = |detail: &str| ArcError::Malformed(format!("invalid {name} field: {detail}"));

    if let Some(&first) = field.first()
        && first & 0x80 != 0
    {
        if first & 0x40 != 0 {
            return Err(malformed("negative base-256 value"));
        }
        return field[1..]
            .iter()
            .try_fold(u64::from(first & 0x3f), |acc, &b| {
                acc.checked_mul(256)
                    .and_then(|acc| acc.checked_add(u64::from(b)))
            })
            .ok_or_else(|| malformed("base-256 value overflows"));
    }

    let digits = field
        .iter()
        .skip_while(|&&b| b == b' ' || b == 0)
        .take_while(|&&b| b != b' ' && b != 0);

    let mut value = 0u64;
    for &b in digits {
        if !(b'0'..=b'7').contains(&b) {
            return Err(malformed(&format!("unexpected byte {b:#04x}")));
        }
        value = value
            .checked_mul(8)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| malformed("octal value overflows"))?;
    }
    Ok(value)
}
