use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::cpio::{SharedState, State, lock};
use crate::error::{CpioError, CpioResult};

/// Consumer side of a [`Pack`](crate::Pack)'s output.
///
/// Reading drains the encoder's buffer and resumes a suspended entry writer
/// once the buffer falls below the high-water mark. The stream ends after the
/// archive is finalized; if it is destroyed instead, reads fail with the
/// error that destroyed it.
///
/// Dropping the reader before the archive is finalized destroys the archive.
#[derive(Debug)]
pub struct PackReader {
    shared: SharedState,
}

impl PackReader {
    pub(crate) fn new(shared: SharedState) -> Self {
        Self { shared }
    }

    /// Read the remaining output into memory.
    pub async fn into_bytes(mut self) -> CpioResult<Vec<u8>> {
        let mut archive = Vec::new();
        self.read_to_end(&mut archive)
            .await
            .map_err(CpioError::from_io)?;
        Ok(archive)
    }
}

impl AsyncRead for PackReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut shared = lock(&self.shared);
        if shared.state == State::Destroyed {
            return Poll::Ready(Err(shared.failure().into()));
        }
        if buf.remaining() == 0 || shared.output.read_into(buf) > 0 || shared.output.is_ended() {
            return Poll::Ready(Ok(()));
        }

        shared.output.register_reader(cx);
        Poll::Pending
    }
}

impl Drop for PackReader {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        if !shared.state.is_closed() {
            shared.destroy(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Content, Header, Pack, PackOptions};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_reader_waits_for_output() {
        let (mut pack, reader) = Pack::new(PackOptions::default()).unwrap();
        let consumer = tokio::spawn(reader.into_bytes());

        tokio::time::sleep(Duration::from_millis(10)).await;
        pack.entry(Header::new("late"), "data").unwrap();
        pack.finalize();

        let archive = consumer.await.unwrap().unwrap();
        assert_eq!(archive.len(), 512);
    }

    #[tokio::test]
    async fn test_reader_reports_destroy_error() {
        let (mut pack, reader) = Pack::new(PackOptions::default()).unwrap();
        let mut sink = pack.entry(Header::file("a", 10), Content::Streamed).unwrap();
        sink.write_all(b"1234567").await.unwrap();
        let err = sink.finish().unwrap_err();

        assert_eq!(reader.into_bytes().await.unwrap_err(), err);
    }

    #[tokio::test]
    async fn test_dropping_reader_releases_writer() {
        let options = PackOptions::default().with_high_water_mark(4);
        let (mut pack, reader) = Pack::new(options).unwrap();
        let mut sink = pack.entry(Header::file("a", 8), Content::Streamed).unwrap();

        let writer = tokio::spawn(async move {
            // the first chunk saturates the output, the second has to wait
            let result = match sink.write_all(b"abcd").await {
                Ok(()) => sink.write_all(b"efgh").await,
                Err(err) => Err(err),
            };
            (sink, result)
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!writer.is_finished());

        drop(reader);
        let (_sink, result) = writer.await.unwrap();
        assert_eq!(CpioError::from_io(result.unwrap_err()), CpioError::Destroyed);
        assert_eq!(pack.state(), State::Destroyed);
    }
}
