use std::sync::Arc;

use crate::cpio::{Format, HeaderCodec};
use crate::error::{CpioError, CpioResult};

/// Archives are zero-filled to a multiple of this many bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Buffered output size at which entry writers are suspended.
pub const DEFAULT_HIGH_WATER_MARK: usize = 16 * 1024;

/// What [`Pack::entry`](crate::Pack::entry) does once the archive is
/// finalized or destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosedAdmission {
    /// Write nothing and hand back a sink that rejects writes.
    #[default]
    Ignore,
    /// Fail with [`CpioError::ArchiveClosed`].
    Reject,
}

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct PackOptions {
    pub codec: Arc<dyn HeaderCodec>,
    pub block_size: usize,
    pub high_water_mark: usize,
    pub closed_admission: ClosedAdmission,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            codec: Format::default().codec(),
            block_size: DEFAULT_BLOCK_SIZE,
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            closed_admission: ClosedAdmission::default(),
        }
    }
}

impl PackOptions {
    pub fn with_format(mut self, format: Format) -> Self {
        self.codec = format.codec();
        self
    }

    pub fn with_codec(mut self, codec: impl HeaderCodec + 'static) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_high_water_mark(mut self, high_water_mark: usize) -> Self {
        self.high_water_mark = high_water_mark;
        self
    }

    pub fn with_closed_admission(mut self, policy: ClosedAdmission) -> Self {
        self.closed_admission = policy;
        self
    }

    pub fn validate(&self) -> CpioResult<()> {
        if self.block_size == 0 {
            return Err(CpioError::InvalidOptions("block size must be at least 1"));
        }
        if self.high_water_mark == 0 {
            return Err(CpioError::InvalidOptions("high-water mark must be at least 1"));
        }
        if self.codec.data_alignment() == 0 {
            return Err(CpioError::InvalidOptions("codec data alignment must be at least 1"));
        }
        Ok(())
    }
}
