//! Minimal cpio reader used to check what the encoder produced.

#![allow(dead_code)]

use std::io::{Cursor, Read};

use anyhow::{Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use runcpio::cpio::TRAILER_NAME;
use runcpio::{EntryHeader, Format};

/// One decoded archive member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub header: EntryHeader,
    pub data: Vec<u8>,
}

/// Decoded members plus the offset just past the trailer record.
#[derive(Debug)]
pub struct Archive {
    pub members: Vec<Member>,
    pub trailer_end: u64,
}

fn alignment(format: Format) -> u64 {
    match format {
        Format::Bin => 2,
        Format::Odc => 1,
        Format::Newc => 4,
    }
}

fn align(cursor: &mut Cursor<&[u8]>, alignment: u64) {
    let pos = cursor.position();
    let rem = pos % alignment;
    if rem != 0 {
        cursor.set_position(pos + alignment - rem);
    }
}

fn makedev(major: u64, minor: u64) -> u64 {
    ((major & 0xfff) << 8) | ((major & !0xfff) << 32) | (minor & 0xff) | ((minor & !0xff) << 12)
}

fn ascii_field(cursor: &mut Cursor<&[u8]>, width: usize, radix: u32) -> Result<u64> {
    let mut buf = vec![0u8; width];
    cursor.read_exact(&mut buf)?;
    let text = std::str::from_utf8(&buf)?;
    Ok(u64::from_str_radix(text, radix)?)
}

/// Returns the header (name left empty) and the name size
fn read_fixed(cursor: &mut Cursor<&[u8]>, format: Format) -> Result<(EntryHeader, u64)> {
    let mut header = EntryHeader::trailer();
    header.name.clear();

    let namesize = match format {
        Format::Bin => {
            if cursor.read_u16::<LittleEndian>()? != 0o070707 {
                bail!("bad bin magic at {}", cursor.position() - 2);
            }
            header.dev = cursor.read_u16::<LittleEndian>()? as u64;
            header.ino = cursor.read_u16::<LittleEndian>()? as u64;
            header.mode = cursor.read_u16::<LittleEndian>()? as u32;
            header.uid = cursor.read_u16::<LittleEndian>()? as u32;
            header.gid = cursor.read_u16::<LittleEndian>()? as u32;
            header.nlink = cursor.read_u16::<LittleEndian>()? as u32;
            header.rdev = cursor.read_u16::<LittleEndian>()? as u64;
            let hi = cursor.read_u16::<LittleEndian>()? as u64;
            let lo = cursor.read_u16::<LittleEndian>()? as u64;
            header.mtime = (hi << 16) | lo;
            let namesize = cursor.read_u16::<LittleEndian>()? as u64;
            let hi = cursor.read_u16::<LittleEndian>()? as u64;
            let lo = cursor.read_u16::<LittleEndian>()? as u64;
            header.file_size = (hi << 16) | lo;
            namesize
        }
        Format::Odc => {
            let mut magic = [0u8; 6];
            cursor.read_exact(&mut magic)?;
            if &magic != b"070707" {
                bail!("bad odc magic at {}", cursor.position() - 6);
            }
            header.dev = ascii_field(cursor, 6, 8)?;
            header.ino = ascii_field(cursor, 6, 8)?;
            header.mode = ascii_field(cursor, 6, 8)? as u32;
            header.uid = ascii_field(cursor, 6, 8)? as u32;
            header.gid = ascii_field(cursor, 6, 8)? as u32;
            header.nlink = ascii_field(cursor, 6, 8)? as u32;
            header.rdev = ascii_field(cursor, 6, 8)?;
            header.mtime = ascii_field(cursor, 11, 8)?;
            let namesize = ascii_field(cursor, 6, 8)?;
            header.file_size = ascii_field(cursor, 11, 8)?;
            namesize
        }
        Format::Newc => {
            let mut magic = [0u8; 6];
            cursor.read_exact(&mut magic)?;
            if &magic != b"070701" {
                bail!("bad newc magic at {}", cursor.position() - 6);
            }
            header.ino = ascii_field(cursor, 8, 16)?;
            header.mode = ascii_field(cursor, 8, 16)? as u32;
            header.uid = ascii_field(cursor, 8, 16)? as u32;
            header.gid = ascii_field(cursor, 8, 16)? as u32;
            header.nlink = ascii_field(cursor, 8, 16)? as u32;
            header.mtime = ascii_field(cursor, 8, 16)?;
            header.file_size = ascii_field(cursor, 8, 16)?;
            let dev_major = ascii_field(cursor, 8, 16)?;
            let dev_minor = ascii_field(cursor, 8, 16)?;
            header.dev = makedev(dev_major, dev_minor);
            let rdev_major = ascii_field(cursor, 8, 16)?;
            let rdev_minor = ascii_field(cursor, 8, 16)?;
            header.rdev = makedev(rdev_major, rdev_minor);
            let namesize = ascii_field(cursor, 8, 16)?;
            let _check = ascii_field(cursor, 8, 16)?;
            namesize
        }
    };
    Ok((header, namesize))
}

pub fn decode(format: Format, archive: &[u8]) -> Result<Archive> {
    let mut cursor = Cursor::new(archive);
    let mut members = Vec::new();

    loop {
        let (mut header, namesize) = read_fixed(&mut cursor, format)?;
        let mut name = vec![0u8; namesize as usize];
        cursor.read_exact(&mut name)?;
        if name.pop() != Some(0) {
            bail!("entry name is not NUL terminated");
        }
        header.name = String::from_utf8(name)?;
        align(&mut cursor, alignment(format));

        if header.name == TRAILER_NAME {
            return Ok(Archive {
                members,
                trailer_end: cursor.position(),
            });
        }

        let mut data = vec![0u8; header.file_size as usize];
        cursor.read_exact(&mut data)?;
        align(&mut cursor, alignment(format));
        members.push(Member { header, data });
    }
}
