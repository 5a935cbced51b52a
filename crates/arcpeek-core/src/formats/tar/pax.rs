//! pax extended header records.
//!
//! A pax header's data is a sequence of `"<len> <key>=<value>\n"` records,
//! where `<len>` counts the whole record including itself and the newline.
//! Unknown keys are ignored; an empty value removes an earlier setting.

use log::trace;

use crate::ArcError;
use crate::Result;

/// Header fields overridden by pax records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PaxOverrides {
    pub(crate) path: Option<String>,
    pub(crate) linkpath: Option<String>,
    pub(crate) size: Option<u64>,
    pub(crate) mtime: Option<(i64, u32)>,
    pub(crate) uid: Option<u64>,
    pub(crate) gid: Option<u64>,
    pub(crate) uname: Option<String>,
    pub(crate) gname: Option<String>,
}

impl PaxOverrides {
    /// Applies the records in `data` on top of the current values.
    pub(crate) fn apply(&mut self, data: &[u8]) -> Result<()> {
        let mut rest = data;
        while !rest.is_empty() {
            if rest.iter().all(|&b| b == 0) {
                break;
            }
            let (key, value, consumed) = split_record(rest)?;
            trace!("pax record {key}={value}");
            self.set(key, value)?;
            rest = &rest[consumed..];
        }
        Ok(())
    }

    /// Merges global settings into `self`, keeping values already set.
    ///
    /// Path, link path and size are per-entry by nature and never come
    /// from a global header.
    pub(crate) fn inherit(&mut self, global: &Self) {
        if self.mtime.is_none() {
            self.mtime = global.mtime;
        }
        if self.uid.is_none() {
            self.uid = global.uid;
        }
        if self.gid.is_none() {
            self.gid = global.gid;
        }
        if self.uname.is_none() {
            self.uname.clone_from(&global.uname);
        }
        if self.gname.is_none() {
            self.gname.clone_from(&global.gname);
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let present = !value.is_empty();
        match key {
            "path" => self.path = present.then(|| value.to_string()),
            "linkpath" => self.linkpath = present.then(|| value.to_string()),
            "uname" => self.uname = present.then(|| value.to_string()),
            "gname" => self.gname = present.then(|| value.to_string()),
            "size" => self.size = present.then(|| parse_decimal(key, value)).transpose()?,
            "uid" => self.uid = present.then(|| parse_decimal(key, value)).transpose()?,
            "gid" => self.gid = present.then(|| parse_decimal(key, value)).transpose()?,
            "mtime" => self.mtime = present.then(|| parse_time(value)).transpose()?,
            _ => {}
        }
        Ok(())
    }
}

/// Splits one record off the front of `data`.
fn split_record(data: &[u8]) -> Result<(&str, &str, usize)> {
    let malformed = |detail: &str| ArcError::Malformed(format!("invalid pax record: {detail}"));

    let space = data
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| malformed("missing length"))?;
    let len: usize = std::str::from_utf8(&data[..space])
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| malformed("bad length"))?;
    if len <= space + 1 || len > data.len() {
        return Err(malformed(&format!("length {len} out of bounds")));
    }

    let record = &data[space + 1..len];
    let body = record
        .strip_suffix(b"\n")
        .ok_or_else(|| malformed("missing newline"))?;
    let body = std::str::from_utf8(body).map_err(|_| malformed("not UTF-8"))?;
    let (key, value) = body
        .split_once('=')
        .ok_or_else(|| malformed("missing '='"))?;
    Ok((key, value, len))
}

fn parse_decimal(key: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .map_err(|_| ArcError::Malformed(format!("invalid pax {key} value: {value:?}")))
}

/// Parses `[-]seconds[.fraction]` into seconds and nanoseconds.
///
/// Negative times round the seconds down so nanoseconds stay positive.
fn parse_time(value: &str) -> Result<(i64, u32)> {
    let malformed = || ArcError::Malformed(format!("invalid pax mtime value: {value:?}"));

    let (negative, unsigned) = value
        .strip_prefix('-')
        .map_or((false, value), |rest| (true, rest));
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));

    let secs: i64 = whole.parse().map_err(|_| malformed())?;
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let mut nanos = 0u32;
    for (i, digit) in fraction.bytes().take(9).enumerate() {
        nanos += u32::from(digit - b'0') * 10u32.pow(8 - i as u32);
    }

    if !negative {
        return Ok((secs, nanos));
    }
    if nanos == 0 {
        Ok((-secs, 0))
    } else {
        Ok((-secs - 1, 1_000_000_000 - nanos))
    }
}
