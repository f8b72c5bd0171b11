//! Byte plumbing between the encoder, entry sinks and the output reader.
//!
//! - [`buffer`]: bounded output queue with the suspend/resume append contract
//! - [`sink`]: the `AsyncWrite` handed out for each entry
//! - [`reader`]: the `AsyncRead` consuming the archive

mod buffer;
mod reader;
mod sink;

pub(crate) use buffer::OutputBuffer;
pub use reader::PackReader;
pub(crate) use sink::Rejection;
pub use sink::EntrySink;
