//! The streaming archive encoder.
//!
//! [`Pack`] admits entries one at a time and appends their encoded bytes to
//! an output buffer that a [`PackReader`] drains. Entries whose content is
//! not known up front hand back an [`EntrySink`]; while that sink is open the
//! encoder is `Streaming` and refuses further entries.
//!
//! ## State machine
//!
//! ```text
//!            entry(streamed, regular)
//!   Idle ─────────────────────────────▶ Streaming
//!    ▲  ◀──────────── sink closed ────────  │
//!    │                                       │ finalize()
//!    │ finalize()                            ▼
//!    ▼                             FinalizePending
//!   Finalized ◀──────── sink closed ─────────┘
//!
//!   any state ── destroy() / failed entry ──▶ Destroyed
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{debug, warn};

use super::codec::HeaderCodec;
use super::structures::{Content, Header};
use crate::error::{CpioError, CpioResult};
use crate::io::{EntrySink, OutputBuffer, PackReader, Rejection};
use crate::options::{ClosedAdmission, PackOptions};

/// Zero bytes written between the trailer record and the block fill.
pub const TERMINATOR_LEN: usize = 4;

/// Lifecycle of a [`Pack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Ready to admit an entry.
    Idle,
    /// A regular entry's sink is open.
    Streaming,
    /// `finalize()` was called while streaming; it runs when the sink closes.
    FinalizePending,
    /// Trailer written and output ended.
    Finalized,
    /// Abandoned after `destroy()` or a failed entry.
    Destroyed,
}

impl State {
    pub fn is_closed(&self) -> bool {
        matches!(self, State::Finalized | State::Destroyed)
    }
}

pub(crate) type SharedState = Arc<Mutex<Shared>>;

/// Lock the shared state, ignoring poisoning: every mutation leaves the state
/// consistent before it can panic.
pub(crate) fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Zero bytes needed to bring `len` up to a multiple of `alignment`.
pub(crate) fn padding(len: u64, alignment: u64) -> u64 {
    match len % alignment {
        0 => 0,
        rem => alignment - rem,
    }
}

/// State shared by the encoder, the active sink and the reader.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: State,
    pub(crate) output: OutputBuffer,
    trailer: &'static [u8],
    data_alignment: u64,
    block_size: u64,
    failure: Option<CpioError>,
}

impl Shared {
    fn new(options: &PackOptions) -> Self {
        Self {
            state: State::Idle,
            output: OutputBuffer::new(options.high_water_mark),
            trailer: options.codec.trailer(),
            data_alignment: options.codec.data_alignment(),
            block_size: options.block_size as u64,
            failure: None,
        }
    }

    /// The error readers and writers see once the archive is destroyed.
    pub(crate) fn failure(&self) -> CpioError {
        self.failure.clone().unwrap_or(CpioError::Destroyed)
    }

    /// Fails unless a regular entry's sink may still write.
    pub(crate) fn check_streaming(&self) -> CpioResult<()> {
        match self.state {
            State::Streaming | State::FinalizePending => Ok(()),
            _ => Err(self.failure()),
        }
    }

    fn pad_entry(&mut self, len: u64) {
        let pad = padding(len, self.data_alignment);
        if pad > 0 {
            self.output.append_zeros(pad as usize);
        }
    }

    pub(crate) fn finalize(&mut self) {
        match self.state {
            State::Idle => {}
            State::Streaming => {
                debug!("finalize requested while streaming, deferring");
                self.state = State::FinalizePending;
                return;
            }
            State::FinalizePending | State::Finalized | State::Destroyed => return,
        }

        self.output.append(Bytes::from_static(self.trailer));
        self.output.append_zeros(TERMINATOR_LEN);
        let fill = self.block_size - self.output.emitted() % self.block_size;
        self.output.append_zeros(fill as usize);
        self.output.end();
        self.state = State::Finalized;

        debug!(
            emitted = self.output.emitted(),
            fill, "archive finalized"
        );
    }

    /// Close the open entry after its sink received `written` bytes.
    pub(crate) fn complete_entry(
        &mut self,
        name: &str,
        declared: u64,
        written: u64,
    ) -> CpioResult<()> {
        let finalize = match self.state {
            State::Streaming => false,
            State::FinalizePending => true,
            _ => return Err(self.failure()),
        };
        self.state = State::Idle;

        if written != declared {
            let err = CpioError::SizeMismatch {
                name: name.to_string(),
                declared,
                written,
            };
            self.destroy(Some(err.clone()));
            return Err(err);
        }

        self.pad_entry(written);
        if finalize {
            self.finalize();
        }
        Ok(())
    }

    /// Abandon the open entry because its content source failed.
    pub(crate) fn fail_entry(&mut self, err: CpioError) -> CpioError {
        if self.check_streaming().is_err() {
            return self.failure();
        }
        self.state = State::Idle;
        self.destroy(Some(err.clone()));
        err
    }

    pub(crate) fn destroy(&mut self, err: Option<CpioError>) {
        if self.state == State::Destroyed {
            return;
        }
        match &err {
            Some(err) => warn!(error = %err, "destroying archive"),
            None => debug!("destroying archive"),
        }
        self.state = State::Destroyed;
        self.failure = err;
        self.output.release();
    }
}

/// Streaming cpio encoder.
///
/// Created together with the [`PackReader`] that consumes its output. Each
/// call to [`entry`](Pack::entry) appends one archive member; content given
/// up front is written immediately, otherwise the returned [`EntrySink`]
/// accepts the body. [`finalize`](Pack::finalize) closes the archive.
///
/// ## Example
///
/// ```no_run
/// use runcpio::{Content, Header, Pack, PackOptions};
/// use tokio::io::{AsyncReadExt, AsyncWriteExt};
///
/// # async fn run() -> anyhow::Result<()> {
/// let (mut pack, mut reader) = Pack::new(PackOptions::default())?;
/// let consumer = tokio::spawn(async move {
///     let mut archive = Vec::new();
///     reader.read_to_end(&mut archive).await.map(|_| archive)
/// });
///
/// pack.entry(Header::directory("etc"), Content::Streamed)?;
/// pack.entry(Header::new("etc/hostname"), "runcpio\n")?;
///
/// let mut sink = pack.entry(Header::file("etc/motd", 5), Content::Streamed)?;
/// sink.write_all(b"hello").await?;
/// sink.finish()?;
///
/// pack.finalize();
/// let archive = consumer.await??;
/// assert_eq!(archive.len() % 512, 0);
/// # Ok(())
/// # }
/// ```
///
/// Dropping a `Pack` that is neither finalized nor waiting to finalize
/// destroys the archive, so a reader never waits on output that cannot come.
pub struct Pack {
    shared: SharedState,
    codec: Arc<dyn HeaderCodec>,
    closed_admission: ClosedAdmission,
    next_ino: u64,
}

impl Pack {
    /// Create an encoder and the reader for its output.
    ///
    /// # Errors
    ///
    /// Returns [`CpioError::InvalidOptions`] for a zero block size, high-water
    /// mark or codec alignment.
    pub fn new(options: PackOptions) -> CpioResult<(Self, PackReader)> {
        options.validate()?;
        let shared = Arc::new(Mutex::new(Shared::new(&options)));
        let pack = Self {
            shared: shared.clone(),
            codec: options.codec,
            closed_admission: options.closed_admission,
            next_ino: 1,
        };
        Ok((pack, PackReader::new(shared)))
    }

    /// Admit one entry.
    ///
    /// Unset header fields are defaulted first: inode numbers come from a
    /// counter owned by this encoder, starting at 1.
    ///
    /// With [`Content::Immediate`] the header's size is replaced by the
    /// content length and the whole member is written before returning; the
    /// returned sink rejects writes. With [`Content::Streamed`] only the header
    /// is written. Regular files then get a sink that must receive exactly the
    /// declared number of bytes and be closed with [`EntrySink::finish`]; other
    /// file types get a sink that rejects writes.
    ///
    /// Once the archive is finalized or destroyed, entries are ignored and an
    /// inert sink is returned, unless the encoder was configured with
    /// [`ClosedAdmission::Reject`].
    ///
    /// # Errors
    ///
    /// - [`CpioError::EntryInProgress`] if another entry's sink is still open
    /// - [`CpioError::ArchiveClosed`] under [`ClosedAdmission::Reject`]
    /// - codec errors ([`CpioError::InvalidName`], [`CpioError::FieldOverflow`]);
    ///   nothing is written in that case
    pub fn entry(
        &mut self,
        header: Header,
        content: impl Into<Content>,
    ) -> CpioResult<EntrySink> {
        let mut shared = lock(&self.shared);
        match shared.state {
            State::Streaming | State::FinalizePending => return Err(CpioError::EntryInProgress),
            State::Finalized | State::Destroyed => {
                return match self.closed_admission {
                    ClosedAdmission::Ignore => {
                        debug!(name = %header.name, "ignoring entry for closed archive");
                        Ok(EntrySink::rejecting(Rejection::Closed))
                    }
                    ClosedAdmission::Reject => Err(CpioError::ArchiveClosed),
                };
            }
            State::Idle => {}
        }

        // The counter only advances once the entry is actually written
        let candidate = self.next_ino;
        let mut used_ino = false;
        let mut header = header.resolve(|| {
            used_ino = true;
            candidate
        });

        let content = content.into();
        if let Content::Immediate(body) = &content {
            header.file_size = body.len() as u64;
        }
        let record = self.codec.encode(&header)?;
        if used_ino {
            self.next_ino += 1;
        }
        shared.output.append(Bytes::from(record));

        match content {
            Content::Immediate(body) => {
                debug!(
                    name = %header.name,
                    ino = header.ino,
                    size = header.file_size,
                    "appending entry"
                );
                shared.output.append(body);
                shared.pad_entry(header.file_size);
                Ok(EntrySink::rejecting(Rejection::NoBody))
            }
            Content::Streamed => {
                let kind = header.kind();
                if !kind.has_body() {
                    if header.file_size != 0 {
                        warn!(
                            name = %header.name,
                            size = header.file_size,
                            ?kind,
                            "declared size on an entry without a body"
                        );
                    }
                    debug!(
                        name = %header.name,
                        ino = header.ino,
                        ?kind,
                        "appending header-only entry"
                    );
                    return Ok(EntrySink::rejecting(Rejection::NoBody));
                }

                debug!(
                    name = %header.name,
                    ino = header.ino,
                    size = header.file_size,
                    "streaming entry"
                );
                shared.state = State::Streaming;
                drop(shared);
                Ok(EntrySink::regular(self.shared.clone(), header))
            }
        }
    }

    /// Stream `reader` into a new regular-file entry.
    ///
    /// The header must declare the exact number of bytes `reader` yields.
    /// The output must be drained concurrently, otherwise this waits for the
    /// reader side once the high-water mark is reached.
    ///
    /// # Returns
    ///
    /// The number of content bytes copied.
    pub async fn append_reader<R>(&mut self, header: Header, reader: &mut R) -> CpioResult<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut sink = self.entry(header, Content::Streamed)?;
        match tokio::io::copy(reader, &mut sink).await {
            Ok(copied) => {
                sink.finish()?;
                Ok(copied)
            }
            Err(err) => Err(sink.abort(CpioError::from_io(err))),
        }
    }

    /// Write the trailer and block fill, then end the output.
    ///
    /// While an entry is streaming this only records the request; the
    /// archive is finalized when that entry's sink closes successfully.
    /// Calling it again is a no-op.
    pub fn finalize(&mut self) {
        lock(&self.shared).finalize();
    }

    /// Abandon the archive.
    ///
    /// The reader observes `err` (or [`CpioError::Destroyed`]) and an open
    /// sink fails its next write. Later calls are no-ops.
    pub fn destroy(&mut self, err: Option<CpioError>) {
        lock(&self.shared).destroy(err);
    }

    pub fn state(&self) -> State {
        lock(&self.shared).state
    }

    /// Bytes appended to the output so far, including padding.
    pub fn bytes_emitted(&self) -> u64 {
        lock(&self.shared).output.emitted()
    }
}

impl Drop for Pack {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        if matches!(shared.state, State::Idle | State::Streaming) {
            shared.destroy(None);
        }
    }
}
