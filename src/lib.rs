//! speexogg - encode mono PCM or WAV audio into a Speex stream inside Ogg pages
//!
//! The pipeline runs WAV parsing, optional resampling, frame-by-frame Speex
//! encoding and Ogg packaging. The speech codec and the resampler sit behind
//! the [`CodecEngine`] and [`ResamplerFactory`] traits; enable the
//! `native-speex` feature for the libspeex binding.
//!
//! ```no_run
//! # #[cfg(feature = "native-speex")]
//! # fn demo() -> speexogg::Result<()> {
//! use speexogg::{EncodingSessionConfig, NativeSpeex, SpeexEncoder};
//!
//! let mut encoder = SpeexEncoder::new(NativeSpeex, EncodingSessionConfig::default())?;
//! let mut ogg = encoder.encode_wav_file("memo.wav")?;
//! ogg.extend(encoder.finish()?);
//! std::fs::write("memo.spx", ogg)?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod ogg;
pub mod resample;
pub mod session;
pub mod types;
pub mod wav;

pub use codec::{CodecEngine, EngineFailure, EngineResult, FrameEncoder};
#[cfg(feature = "native-speex")]
pub use codec::native::NativeSpeex;
pub use error::{Error, ErrorCategory, Result};
pub use ogg::page::OggPage;
pub use ogg::speex::{CommentHeader, SpeexHeader};
pub use ogg::OggPacketizer;
pub use resample::{
    LinearResampler, LinearResampling, Resampler, ResamplerFactory, RubatoResampler,
    RubatoResampling,
};
pub use session::SpeexEncoder;
pub use types::{
    AudioFormat, EncodingSessionConfig, SampleRate, SpeexMode, DEFAULT_STREAM_SERIAL,
    MAX_FRAMES_PER_OGG_PAGE,
};
pub use wav::{parse_wav, WavAudio};
