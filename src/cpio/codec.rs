//! Header codecs for the cpio variants.
//!
//! A codec turns an [`EntryHeader`] into the fixed-layout record that
//! precedes an entry's content. It also knows the variant's end-of-archive
//! record and how content must be aligned after it.
//!
//! | Variant | Magic            | Fields                     | Data alignment |
//! |---------|------------------|----------------------------|----------------|
//! | `bin`   | `0o070707` (u16) | 13 little-endian u16 words | 2 bytes        |
//! | `odc`   | `070707`         | ASCII octal                | none           |
//! | `newc`  | `070701`         | ASCII hex, 8 digits        | 4 bytes        |

use std::fmt;
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use super::structures::EntryHeader;
use crate::error::{CpioError, CpioResult};

/// Encodes entry headers for one cpio variant.
pub trait HeaderCodec: fmt::Debug + Send + Sync {
    /// Short variant name, used in error messages
    fn name(&self) -> &'static str;

    /// Encode a header record, including the entry name and any padding the
    /// variant requires between the name and the content.
    fn encode(&self, header: &EntryHeader) -> CpioResult<Vec<u8>>;

    /// The end-of-archive record, without the NUL that terminates its name.
    ///
    /// The encoder always follows it with a 4-byte zero terminator.
    fn trailer(&self) -> &'static [u8];

    /// Content is zero-padded to a multiple of this many bytes.
    fn data_alignment(&self) -> u64;
}

/// The built-in cpio variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Bin,
    Odc,
    Newc,
}

impl Format {
    pub fn codec(self) -> Arc<dyn HeaderCodec> {
        match self {
            Format::Bin => Arc::new(BinCodec),
            Format::Odc => Arc::new(OdcCodec),
            Format::Newc => Arc::new(NewcCodec),
        }
    }

    pub fn trailer(self) -> &'static [u8] {
        match self {
            Format::Bin => BIN_TRAILER,
            Format::Odc => ODC_TRAILER,
            Format::Newc => NEWC_TRAILER,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Bin => f.write_str("bin"),
            Format::Odc => f.write_str("odc"),
            Format::Newc => f.write_str("newc"),
        }
    }
}

/// Old binary magic, stored as a native u16.
pub const BIN_MAGIC: u16 = 0o070707;
pub const BIN_HEADER_SIZE: usize = 26;
pub const ODC_MAGIC: &[u8] = b"070707";
pub const ODC_HEADER_SIZE: usize = 76;
pub const NEWC_MAGIC: &[u8] = b"070701";
pub const NEWC_HEADER_SIZE: usize = 110;

pub const BIN_TRAILER: &[u8] = b"\xc7\x71\
\0\0\0\0\0\0\0\0\0\0\
\x01\0\
\0\0\0\0\0\0\
\x0b\0\
\0\0\0\0\
TRAILER!!!";

pub const ODC_TRAILER: &[u8] = concat!(
    "070707", "000000", "000000", "000000", "000000", "000000", "000001", "000000",
    "00000000000", "000013", "00000000000", "TRAILER!!!",
)
.as_bytes();

pub const NEWC_TRAILER: &[u8] = concat!(
    "070701", "00000000", "00000000", "00000000", "00000000", "00000001", "00000000",
    "00000000", "00000000", "00000000", "00000000", "00000000", "0000000b", "00000000",
    "TRAILER!!!",
)
.as_bytes();

/// Length of a name field including its terminating NUL.
fn name_size(header: &EntryHeader) -> CpioResult<u64> {
    if header.name.is_empty() || header.name.contains('\0') {
        return Err(CpioError::InvalidName(header.name.clone()));
    }
    Ok(header.name.len() as u64 + 1)
}

fn check(format: &'static str, field: &'static str, value: u64, max: u64) -> CpioResult<u64> {
    if value > max {
        return Err(CpioError::FieldOverflow {
            format,
            field,
            value,
        });
    }
    Ok(value)
}

fn push_name(record: &mut Vec<u8>, name: &str) {
    record.extend_from_slice(name.as_bytes());
    record.push(0);
}

fn pad_to(record: &mut Vec<u8>, alignment: usize) {
    let rem = record.len() % alignment;
    if rem != 0 {
        record.resize(record.len() + alignment - rem, 0);
    }
}

/// Old binary format (`cpio -H bin`).
///
/// The `dev` and inode numbers are truncated to 16 bits, as other writers of
/// this format do; every other field, `rdev` included, must fit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinCodec;

impl HeaderCodec for BinCodec {
    fn name(&self) -> &'static str {
        "bin"
    }

    fn encode(&self, header: &EntryHeader) -> CpioResult<Vec<u8>> {
        let fmt = self.name();
        let namesize = check(fmt, "namesize", name_size(header)?, 0xFFFF)?;
        let mode = check(fmt, "mode", header.mode as u64, 0xFFFF)?;
        let uid = check(fmt, "uid", header.uid as u64, 0xFFFF)?;
        let gid = check(fmt, "gid", header.gid as u64, 0xFFFF)?;
        let nlink = check(fmt, "nlink", header.nlink as u64, 0xFFFF)?;
        let rdev = check(fmt, "rdev", header.rdev, 0xFFFF)?;
        let mtime = check(fmt, "mtime", header.mtime, 0xFFFF_FFFF)?;
        let file_size = check(fmt, "filesize", header.file_size, 0xFFFF_FFFF)?;

        // Four-byte values are stored most significant half first
        let fields: [u16; 13] = [
            BIN_MAGIC,
            header.dev as u16,
            header.ino as u16,
            mode as u16,
            uid as u16,
            gid as u16,
            nlink as u16,
            rdev as u16,
            (mtime >> 16) as u16,
            mtime as u16,
            namesize as u16,
            (file_size >> 16) as u16,
            file_size as u16,
        ];

        let mut record = vec![0u8; BIN_HEADER_SIZE];
        LittleEndian::write_u16_into(&fields, &mut record);
        push_name(&mut record, &header.name);
        pad_to(&mut record, 2);
        Ok(record)
    }

    fn trailer(&self) -> &'static [u8] {
        Format::Bin.trailer()
    }

    fn data_alignment(&self) -> u64 {
        2
    }
}

/// Portable ASCII format (`cpio -H odc`).
#[derive(Debug, Clone, Copy, Default)]
pub struct OdcCodec;

const ODC_SHORT_MAX: u64 = 0o777777;
const ODC_LONG_MAX: u64 = 0o77777777777;

impl HeaderCodec for OdcCodec {
    fn name(&self) -> &'static str {
        "odc"
    }

    fn encode(&self, header: &EntryHeader) -> CpioResult<Vec<u8>> {
        let fmt = self.name();
        let namesize = check(fmt, "namesize", name_size(header)?, ODC_SHORT_MAX)?;
        let fixed = format!(
            "{:06o}{:06o}{:06o}{:06o}{:06o}{:06o}{:06o}{:011o}{:06o}{:011o}",
            check(fmt, "dev", header.dev, ODC_SHORT_MAX)?,
            check(fmt, "ino", header.ino, ODC_SHORT_MAX)?,
            check(fmt, "mode", header.mode as u64, ODC_SHORT_MAX)?,
            check(fmt, "uid", header.uid as u64, ODC_SHORT_MAX)?,
            check(fmt, "gid", header.gid as u64, ODC_SHORT_MAX)?,
            check(fmt, "nlink", header.nlink as u64, ODC_SHORT_MAX)?,
            check(fmt, "rdev", header.rdev, ODC_SHORT_MAX)?,
            check(fmt, "mtime", header.mtime, ODC_LONG_MAX)?,
            namesize,
            check(fmt, "filesize", header.file_size, ODC_LONG_MAX)?,
        );

        let mut record = Vec::with_capacity(ODC_HEADER_SIZE + namesize as usize);
        record.extend_from_slice(ODC_MAGIC);
        record.extend_from_slice(fixed.as_bytes());
        push_name(&mut record, &header.name);
        Ok(record)
    }

    fn trailer(&self) -> &'static [u8] {
        Format::Odc.trailer()
    }

    fn data_alignment(&self) -> u64 {
        1
    }
}

/// SVR4 portable format without checksums (`cpio -H newc`).
#[derive(Debug, Clone, Copy, Default)]
pub struct NewcCodec;

const NEWC_MAX: u64 = 0xFFFF_FFFF;

/// Split a Linux `dev_t` into its major and minor numbers.
fn split_dev(dev: u64) -> (u64, u64) {
    let major = ((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff);
    let minor = (dev & 0xff) | ((dev >> 12) & !0xff);
    (major & NEWC_MAX, minor & NEWC_MAX)
}

impl HeaderCodec for NewcCodec {
    fn name(&self) -> &'static str {
        "newc"
    }

    fn encode(&self, header: &EntryHeader) -> CpioResult<Vec<u8>> {
        let fmt = self.name();
        let namesize = check(fmt, "namesize", name_size(header)?, NEWC_MAX)?;
        let (dev_major, dev_minor) = split_dev(header.dev);
        let (rdev_major, rdev_minor) = split_dev(header.rdev);
        let fixed = format!(
            "{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}{:08x}",
            check(fmt, "ino", header.ino, NEWC_MAX)?,
            header.mode,
            header.uid,
            header.gid,
            header.nlink,
            check(fmt, "mtime", header.mtime, NEWC_MAX)?,
            check(fmt, "filesize", header.file_size, NEWC_MAX)?,
            dev_major,
            dev_minor,
            rdev_major,
            rdev_minor,
            namesize,
            0u32,
        );

        let mut record = Vec::with_capacity(NEWC_HEADER_SIZE + namesize as usize + 3);
        record.extend_from_slice(NEWC_MAGIC);
        record.extend_from_slice(fixed.as_bytes());
        push_name(&mut record, &header.name);
        pad_to(&mut record, 4);
        Ok(record)
    }

    fn trailer(&self) -> &'static [u8] {
        Format::Newc.trailer()
    }

    fn data_alignment(&self) -> u64 {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntryHeader {
        EntryHeader {
            dev: 0o777777,
            ino: 1,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            nlink: 1,
            rdev: 0,
            mtime: 0x5F5E_1000,
            file_size: 3,
            name: "abc".to_string(),
        }
    }

    #[test]
    fn test_trailer_constants_match_encoded_trailer() {
        for format in [Format::Bin, Format::Odc, Format::Newc] {
            let codec = format.codec();
            let encoded = codec.encode(&EntryHeader::trailer()).unwrap();
            let trailer = codec.trailer();
            assert_eq!(&encoded[..trailer.len()], trailer, "{format}");
            // the terminator supplies the name's NUL and any record padding
            assert!(encoded.len() <= trailer.len() + 4, "{format}");
            assert!(encoded[trailer.len()..].iter().all(|b| *b == 0), "{format}");
        }
    }

    #[test]
    fn test_bin_layout() {
        let record = BinCodec.encode(&sample()).unwrap();
        // 26 byte header + "abc\0", already even
        assert_eq!(record.len(), 30);
        assert_eq!(LittleEndian::read_u16(&record[0..2]), BIN_MAGIC);
        assert_eq!(LittleEndian::read_u16(&record[2..4]), 0xFFFF);
        assert_eq!(LittleEndian::read_u16(&record[6..8]), 0o100644);
        assert_eq!(LittleEndian::read_u16(&record[16..18]), 0x5F5E);
        assert_eq!(LittleEndian::read_u16(&record[18..20]), 0x1000);
        assert_eq!(LittleEndian::read_u16(&record[20..22]), 4);
        assert_eq!(LittleEndian::read_u16(&record[24..26]), 3);
        assert_eq!(&record[26..], b"abc\0");
    }

    #[test]
    fn test_bin_pads_odd_name() {
        let mut header = sample();
        header.name = "ab".to_string();
        let record = BinCodec.encode(&header).unwrap();
        assert_eq!(record.len(), 30);
        assert_eq!(&record[26..], b"ab\0\0");
    }

    #[test]
    fn test_odc_layout() {
        let record = OdcCodec.encode(&sample()).unwrap();
        assert_eq!(record.len(), ODC_HEADER_SIZE + 4);
        let text = std::str::from_utf8(&record[..ODC_HEADER_SIZE]).unwrap();
        assert_eq!(&text[0..6], "070707");
        assert_eq!(&text[6..12], "777777");
        assert_eq!(&text[12..18], "000001");
        assert_eq!(&text[18..24], "100644");
        assert_eq!(&text[42..48], "000000");
        assert_eq!(&text[48..59], "13727410000");
        assert_eq!(&text[59..65], "000004");
        assert_eq!(&text[65..76], "00000000003");
    }

    #[test]
    fn test_newc_layout() {
        let record = NewcCodec.encode(&sample()).unwrap();
        // 110 + 4 is already a multiple of four
        assert_eq!(record.len(), 116);
        let text = std::str::from_utf8(&record[..NEWC_HEADER_SIZE]).unwrap();
        assert_eq!(&text[0..6], "070701");
        assert_eq!(&text[6..14], "00000001");
        assert_eq!(&text[14..22], "000081a4");
        assert_eq!(&text[54..62], "00000003");
        assert_eq!(&text[94..102], "00000004");
        assert_eq!(&record[110..], b"abc\0\0\0");
    }

    #[test]
    fn test_newc_splits_device_numbers() {
        let mut header = sample();
        header.rdev = (8 << 8) | 1;
        let record = NewcCodec.encode(&header).unwrap();
        let text = std::str::from_utf8(&record[..NEWC_HEADER_SIZE]).unwrap();
        assert_eq!(&text[78..86], "00000008");
        assert_eq!(&text[86..94], "00000001");
    }

    #[test]
    fn test_field_overflow() {
        let mut header = sample();
        header.uid = 70_000;
        let err = BinCodec.encode(&header).unwrap_err();
        assert_eq!(
            err,
            CpioError::FieldOverflow {
                format: "bin",
                field: "uid",
                value: 70_000
            }
        );

        let mut header = sample();
        header.rdev = 0x1_0001;
        assert!(matches!(
            BinCodec.encode(&header),
            Err(CpioError::FieldOverflow { field: "rdev", value: 0x1_0001, .. })
        ));

        let mut header = sample();
        header.file_size = 1 << 40;
        assert!(matches!(
            NewcCodec.encode(&header),
            Err(CpioError::FieldOverflow { field: "filesize", .. })
        ));
    }

    #[test]
    fn test_rejects_bad_names() {
        let mut header = sample();
        header.name = String::new();
        assert!(matches!(OdcCodec.encode(&header), Err(CpioError::InvalidName(_))));
        header.name = "a\0b".to_string();
        assert!(matches!(NewcCodec.encode(&header), Err(CpioError::InvalidName(_))));
    }
}
