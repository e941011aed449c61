// Shared value types: sample rates, codec modes, format and session config

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Upper bound of frames packed into one Ogg data page.
///
/// Not a format requirement; it keeps pages small. Overridable per session
/// through [`EncodingSessionConfig::max_frames_per_page`].
pub const MAX_FRAMES_PER_OGG_PAGE: usize = 79;

/// Default Ogg bitstream serial number
pub const DEFAULT_STREAM_SERIAL: u32 = 0x5350_5847;

/// Sample rates accepted on input and output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz32000,
    Hz44100,
}

impl SampleRate {
    pub const ALL: [SampleRate; 4] = [
        SampleRate::Hz8000,
        SampleRate::Hz16000,
        SampleRate::Hz32000,
        SampleRate::Hz44100,
    ];

    pub fn hz(self) -> u32 {
        match self {
            SampleRate::Hz8000 => 8000,
            SampleRate::Hz16000 => 16000,
            SampleRate::Hz32000 => 32000,
            SampleRate::Hz44100 => 44100,
        }
    }

    pub fn from_hz(hz: u32) -> Result<Self> {
        match hz {
            8000 => Ok(SampleRate::Hz8000),
            16000 => Ok(SampleRate::Hz16000),
            32000 => Ok(SampleRate::Hz32000),
            44100 => Ok(SampleRate::Hz44100),
            other => Err(Error::UnsupportedSampleRate(other)),
        }
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = Error;

    fn try_from(hz: u32) -> Result<Self> {
        SampleRate::from_hz(hz)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> u32 {
        rate.hz()
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.hz())
    }
}

/// Speex operating mode (codec profile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeexMode {
    /// 8 kHz band, 160-sample frames
    Narrowband,
    /// 16 kHz band, 320-sample frames
    #[default]
    Wideband,
    /// 32 kHz band, 640-sample frames
    UltraWideband,
}

impl SpeexMode {
    /// Mode id as stored in the Speex identification header
    pub fn id(self) -> i32 {
        match self {
            SpeexMode::Narrowband => 0,
            SpeexMode::Wideband => 1,
            SpeexMode::UltraWideband => 2,
        }
    }

    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(SpeexMode::Narrowband),
            1 => Some(SpeexMode::Wideband),
            2 => Some(SpeexMode::UltraWideband),
            _ => None,
        }
    }

    /// Bitstream version every Speex mode writes into the header
    pub fn bitstream_version(self) -> i32 {
        4
    }
}

impl std::fmt::Display for SpeexMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeexMode::Narrowband => write!(f, "narrowband"),
            SpeexMode::Wideband => write!(f, "wideband"),
            SpeexMode::UltraWideband => write!(f, "ultra-wideband"),
        }
    }
}

/// Format description recovered from a WAV container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: SampleRate,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl AudioFormat {
    pub fn block_align(&self) -> usize {
        self.channels as usize * (self.bits_per_sample as usize / 8)
    }
}

/// Parameters fixed for the lifetime of one encoding session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingSessionConfig {
    pub mode: SpeexMode,
    /// Speex quality, 0..=10 for the libspeex binding
    pub quality: i32,
    pub output_sample_rate: SampleRate,
    pub max_frames_per_page: usize,
    pub stream_serial: u32,
    /// User comments in `KEY=value` form
    pub comments: Vec<String>,
}

impl Default for EncodingSessionConfig {
    fn default() -> Self {
        Self {
            mode: SpeexMode::default(),
            quality: 5,
            output_sample_rate: SampleRate::Hz16000,
            max_frames_per_page: MAX_FRAMES_PER_OGG_PAGE,
            stream_serial: DEFAULT_STREAM_SERIAL,
            comments: Vec::new(),
        }
    }
}

impl EncodingSessionConfig {
    pub fn new(mode: SpeexMode, quality: i32, output_sample_rate: SampleRate) -> Self {
        Self {
            mode,
            quality,
            output_sample_rate,
            ..Self::default()
        }
    }
}
