use std::collections::VecDeque;
use std::task::{Context, Poll, Waker};

use bytes::{Buf, Bytes};
use tokio::io::ReadBuf;

/// What an appender should do after handing over a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// The consumer can take more; keep writing.
    Continue,
    /// The consumer is saturated; wait for the resume signal.
    Suspend,
}

/// Bounded queue of output chunks shared by the producer and the reader.
///
/// Appending never blocks, but it reports [`Flow::Suspend`] once the queued
/// byte count reaches the high-water mark. A suspended writer parks its waker
/// here and is woken by the reader when the queue drains below the mark.
#[derive(Debug)]
pub(crate) struct OutputBuffer {
    chunks: VecDeque<Bytes>,
    buffered: usize,
    high_water_mark: usize,
    emitted: u64,
    ended: bool,
    suspended: bool,
    reader: Option<Waker>,
    writer: Option<Waker>,
}

impl OutputBuffer {
    pub(crate) fn new(high_water_mark: usize) -> Self {
        Self {
            chunks: VecDeque::new(),
            buffered: 0,
            high_water_mark,
            emitted: 0,
            ended: false,
            suspended: false,
            reader: None,
            writer: None,
        }
    }

    /// Queue a chunk for the reader.
    pub(crate) fn append(&mut self, chunk: Bytes) -> Flow {
        if !chunk.is_empty() {
            self.emitted += chunk.len() as u64;
            self.buffered += chunk.len();
            self.chunks.push_back(chunk);
            if let Some(waker) = self.reader.take() {
                waker.wake();
            }
        }

        if self.buffered >= self.high_water_mark {
            self.suspended = true;
            Flow::Suspend
        } else {
            Flow::Continue
        }
    }

    /// Queue `len` zero bytes.
    pub(crate) fn append_zeros(&mut self, len: usize) -> Flow {
        self.append(Bytes::from(vec![0u8; len]))
    }

    /// Total bytes ever appended.
    pub(crate) fn emitted(&self) -> u64 {
        self.emitted
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffered
    }

    /// Bytes a writer may append before reaching the high-water mark, at
    /// least one so a resumed writer always makes progress.
    pub(crate) fn room(&self) -> usize {
        self.high_water_mark.saturating_sub(self.buffered).max(1)
    }

    /// Mark the end of output. Queued chunks stay readable.
    pub(crate) fn end(&mut self) {
        self.ended = true;
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }

    pub(crate) fn is_ended(&self) -> bool {
        self.ended
    }

    /// Ready once a suspended writer has been resumed by the reader.
    pub(crate) fn poll_resume(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if !self.suspended {
            return Poll::Ready(());
        }
        self.writer = Some(cx.waker().clone());
        Poll::Pending
    }

    /// Move queued bytes into `buf`. Returns the number of bytes copied.
    pub(crate) fn read_into(&mut self, buf: &mut ReadBuf<'_>) -> usize {
        let mut copied = 0;
        while buf.remaining() > 0 {
            let Some(front) = self.chunks.front_mut() else {
                break;
            };
            let n = front.len().min(buf.remaining());
            buf.put_slice(&front[..n]);
            front.advance(n);
            if front.is_empty() {
                self.chunks.pop_front();
            }
            copied += n;
        }
        self.buffered -= copied;

        if self.suspended && self.buffered < self.high_water_mark {
            tracing::trace!(buffered = self.buffered, "resuming entry writer");
            self.suspended = false;
            if let Some(waker) = self.writer.take() {
                waker.wake();
            }
        }
        copied
    }

    pub(crate) fn register_reader(&mut self, cx: &mut Context<'_>) {
        self.reader = Some(cx.waker().clone());
    }

    /// Drop queued output and wake every parked task so it can observe the
    /// new state.
    pub(crate) fn release(&mut self) {
        self.chunks.clear();
        self.buffered = 0;
        self.suspended = false;
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
        if let Some(waker) = self.writer.take() {
            waker.wake();
        }
    }
}
