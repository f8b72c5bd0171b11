//! # runcpio
//!
//! A streaming cpio archive encoder.
//!
//! Entries are admitted one at a time and encoded straight into an output
//! stream that a consumer reads as [`tokio::io::AsyncRead`]. Content can be
//! handed over up front or streamed through an [`EntrySink`], which applies
//! backpressure when the consumer falls behind. Memory use stays around one
//! high-water mark of buffered output no matter how large the entries are.
//!
//! ## Features
//!
//! - `bin`, `odc` and `newc` header variants, or a custom [`HeaderCodec`]
//! - Streamed entry bodies with declared-size verification
//! - Header-only entries for directories, symlinks and devices
//! - Trailer and block padding on finalize, deferred while an entry is open
//!
//! ## Example
//!
//! ```no_run
//! use runcpio::{Content, Format, Header, Pack, PackOptions};
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = PackOptions::default().with_format(Format::Newc);
//!     let (mut pack, reader) = Pack::new(options)?;
//!
//!     // Drain the archive while it is being produced
//!     let consumer = tokio::spawn(async move {
//!         let mut reader = reader;
//!         let mut out = tokio::io::stdout();
//!         tokio::io::copy(&mut reader, &mut out).await
//!     });
//!
//!     pack.entry(Header::directory("docs"), Content::Streamed)?;
//!     pack.entry(Header::new("docs/README"), "hello from runcpio\n")?;
//!
//!     let mut sink = pack.entry(Header::file("docs/data.bin", 4), Content::Streamed)?;
//!     sink.write_all(&[1, 2, 3, 4]).await?;
//!     sink.finish()?;
//!
//!     pack.finalize();
//!     consumer.await??;
//!     Ok(())
//! }
//! ```

pub mod cpio;
pub mod error;
pub mod io;
pub mod options;

pub use cpio::{Content, EntryHeader, FileKind, Format, Header, HeaderCodec, Pack, State};
pub use error::{CpioError, CpioResult};
pub use io::{EntrySink, PackReader};
pub use options::{ClosedAdmission, PackOptions};
