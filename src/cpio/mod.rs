//! cpio archive encoding.
//!
//! This module turns a sequence of entries into a cpio byte stream without
//! holding the archive in memory.
//!
//! ## Architecture
//!
//! - [`structures`]: entry metadata ([`Header`], [`EntryHeader`]) and content
//! - [`codec`]: header record encoders for each cpio variant
//! - [`pack`]: the [`Pack`] encoder and its entry state machine
//!
//! ## Archive Layout
//!
//! ```text
//! ( header record | content | zero pad to the variant's alignment )*
//! trailer record ("TRAILER!!!")
//! 4 zero bytes
//! zero fill to the next multiple of the block size
//! ```
//!
//! ## Limitations
//!
//! - Write only; there is no decoder
//! - One entry may be open at a time
//! - No `crc` (070702) variant, since its checksum must precede the content

pub mod codec;
mod pack;
mod structures;

pub use codec::{BinCodec, Format, HeaderCodec, NewcCodec, OdcCodec};
pub use pack::{Pack, State, TERMINATOR_LEN};
pub(crate) use pack::{SharedState, lock};
pub use structures::*;
