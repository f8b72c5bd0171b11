use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{debug, trace, warn};

use super::buffer::Flow;
use crate::cpio::{EntryHeader, SharedState, lock};
use crate::error::{CpioError, CpioResult};

/// Why a sink refuses every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// The entry cannot carry a streamed body.
    NoBody,
    /// The entry was ignored because the archive is closed.
    Closed,
}

impl Rejection {
    fn error(self) -> CpioError {
        match self {
            Rejection::NoBody => CpioError::NoBodyAllowed,
            Rejection::Closed => CpioError::ArchiveClosed,
        }
    }
}

/// Content sink handed out by [`Pack::entry`](crate::Pack::entry).
///
/// For a streamed regular file this forwards writes into the archive output,
/// waiting whenever the output is above its high-water mark. It must be
/// closed with [`finish`](EntrySink::finish) (or `shutdown()`) after exactly
/// the declared number of bytes; dropping it unfinished fails the entry and
/// destroys the archive.
///
/// Every other entry gets a sink that fails all writes.
pub struct EntrySink {
    kind: SinkKind,
}

enum SinkKind {
    Regular(RegularSink),
    Rejecting(Rejection),
}

impl fmt::Debug for EntrySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SinkKind::Regular(sink) => f
                .debug_struct("EntrySink")
                .field("name", &sink.header.name)
                .field("declared", &sink.header.file_size)
                .field("written", &sink.written)
                .finish(),
            SinkKind::Rejecting(rejection) => f
                .debug_struct("EntrySink")
                .field("rejecting", rejection)
                .finish(),
        }
    }
}

impl EntrySink {
    pub(crate) fn regular(shared: SharedState, header: EntryHeader) -> Self {
        Self {
            kind: SinkKind::Regular(RegularSink {
                shared,
                header,
                written: 0,
                outcome: None,
            }),
        }
    }

    pub(crate) fn rejecting(rejection: Rejection) -> Self {
        Self {
            kind: SinkKind::Rejecting(rejection),
        }
    }

    /// Whether writes can succeed, i.e. this is an open regular-file sink.
    pub fn is_writable(&self) -> bool {
        matches!(&self.kind, SinkKind::Regular(sink) if sink.outcome.is_none())
    }

    /// The resolved header of a streamed entry.
    pub fn header(&self) -> Option<&EntryHeader> {
        match &self.kind {
            SinkKind::Regular(sink) => Some(&sink.header),
            SinkKind::Rejecting(_) => None,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        match &self.kind {
            SinkKind::Regular(sink) => sink.written,
            SinkKind::Rejecting(_) => 0,
        }
    }

    /// Close the entry and report how it completed.
    ///
    /// For a streamed regular file this verifies the byte count, pads the
    /// content and runs a pending finalize. Rejecting sinks always succeed.
    ///
    /// # Errors
    ///
    /// [`CpioError::SizeMismatch`] when the bytes written differ from the
    /// declared size; the archive is destroyed. If the archive was already
    /// destroyed, the error that destroyed it.
    pub fn finish(mut self) -> CpioResult<()> {
        match &mut self.kind {
            SinkKind::Regular(sink) => sink.close(),
            SinkKind::Rejecting(_) => Ok(()),
        }
    }

    /// Fail the entry because its content source broke.
    ///
    /// An open regular-file entry destroys the archive. The error the entry
    /// completed with is returned.
    pub fn abort(mut self, err: impl Into<CpioError>) -> CpioError {
        let err = err.into();
        match &mut self.kind {
            SinkKind::Regular(sink) => sink.fail(err),
            SinkKind::Rejecting(_) => err,
        }
    }
}

impl AsyncWrite for EntrySink {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().kind {
            SinkKind::Regular(sink) => sink.poll_write(cx, buf),
            SinkKind::Rejecting(rejection) => Poll::Ready(Err(rejection.error().into())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().kind {
            SinkKind::Regular(sink) => Poll::Ready(sink.close().map_err(Into::into)),
            SinkKind::Rejecting(_) => Poll::Ready(Ok(())),
        }
    }
}

struct RegularSink {
    shared: SharedState,
    header: EntryHeader,
    written: u64,
    /// Set once the entry completed, successfully or not
    outcome: Option<CpioResult<()>>,
}

impl RegularSink {
    fn poll_write(&mut self, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        if self.outcome.is_some() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "entry already closed",
            )));
        }

        let mut shared = lock(&self.shared);
        if let Err(err) = shared.check_streaming() {
            return Poll::Ready(Err(err.into()));
        }
        if shared.output.poll_resume(cx).is_pending() {
            return Poll::Pending;
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }

        // Short writes keep a single large buffer under the high-water mark
        let accepted = buf.len().min(shared.output.room());
        if shared.output.append(Bytes::copy_from_slice(&buf[..accepted])) == Flow::Suspend {
            trace!(
                name = %self.header.name,
                buffered = shared.output.buffered(),
                "output saturated, suspending entry writer"
            );
        }
        self.written += accepted as u64;
        Poll::Ready(Ok(accepted))
    }

    fn close(&mut self) -> CpioResult<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = lock(&self.shared).complete_entry(
            &self.header.name,
            self.header.file_size,
            self.written,
        );
        match &outcome {
            Ok(()) => debug!(name = %self.header.name, written = self.written, "entry complete"),
            Err(err) => warn!(name = %self.header.name, error = %err, "entry failed"),
        }
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn fail(&mut self, err: CpioError) -> CpioError {
        match &self.outcome {
            Some(Err(existing)) => return existing.clone(),
            Some(Ok(())) => return err,
            None => {}
        }

        let err = lock(&self.shared).fail_entry(err);
        warn!(name = %self.header.name, error = %err, "entry aborted");
        self.outcome = Some(Err(err.clone()));
        err
    }
}

impl Drop for RegularSink {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            self.fail(CpioError::Upstream(
                "entry sink dropped before it was finished".to_string(),
            ));
        }
    }
}
