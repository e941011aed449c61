// Speech codec capability
//
// The compression itself lives behind two traits: a `CodecEngine` hands out
// encoder states, and each `FrameEncoder` is one of those states. Dropping a
// `FrameEncoder` releases the underlying codec handle.

#[cfg(feature = "native-speex")]
pub mod native;

use crate::types::SpeexMode;

/// Failure reported by a codec or resampler binding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct EngineFailure {
    pub reason: String,
}

impl EngineFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineFailure>;

/// Allocates encoder states for a given mode
pub trait CodecEngine {
    type Encoder: FrameEncoder;

    fn allocate(&self, mode: SpeexMode) -> EngineResult<Self::Encoder>;
}

/// One stateful encoder. State carries over from frame to frame.
pub trait FrameEncoder {
    fn set_quality(&mut self, quality: i32) -> EngineResult<()>;

    /// Number of samples consumed by one `encode_frame` call
    fn frame_size(&self) -> EngineResult<usize>;

    /// Bits per second at the current settings
    fn bitrate(&self) -> EngineResult<i32>;

    /// Encode exactly `frame_size()` samples into one compressed frame
    fn encode_frame(&mut self, pcm: &[i16]) -> EngineResult<Vec<u8>>;
}

impl<E: CodecEngine + ?Sized> CodecEngine for &E {
    type Encoder = E::Encoder;

    fn allocate(&self, mode: SpeexMode) -> EngineResult<Self::Encoder> {
        (**self).allocate(mode)
    }
}
