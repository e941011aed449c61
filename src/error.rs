// Error taxonomy for the encoding pipeline
//
// Every fallible operation in the crate reports exactly one of these variants.
// Parse errors come from the WAV reader, construction errors from setting up a
// session, header errors from synthesizing the Speex/Ogg header packets.

use thiserror::Error;

/// Broad grouping of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad WAV input; the caller has to supply a corrected buffer
    Parse,
    /// The session could not be set up and must not be used
    Construction,
    /// Header packets could not be synthesized yet
    Header,
    /// A frame could not be encoded or packed
    Encoding,
    Io,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("WAV size field declares {declared} bytes but the buffer holds {actual}")]
    IncorrectFileSize { declared: u64, actual: u64 },

    #[error("RIFF/WAVE container identifier not found")]
    ContainerIdNotFound,

    #[error("'fmt ' chunk not found")]
    FormatIdNotFound,

    #[error("'data' chunk not found")]
    DataChunkIdNotFound,

    #[error("audio properties could not be extracted: {0}")]
    AudioPropertiesNotExtracted(String),

    #[error("could not allocate encoder state")]
    CouldNotAllocateEncoderState,

    #[error("could not set up resampler for {from} Hz -> {to} Hz")]
    CouldNotSetupResampler { from: u32, to: u32 },

    #[error("could not obtain encoder frame size")]
    CouldNotObtainFrameSize,

    #[error("could not obtain encoder bitrate")]
    CouldNotObtainBitrate,

    #[error("encoder rejected quality {0}")]
    CouldNotSetQuality(i32),

    #[error("not enough data to create the Speex header")]
    NotEnoughDataToCreateSpeexHeader,

    #[error("resampling {from} Hz -> {to} Hz failed")]
    ResampleFailed { from: u32, to: u32 },

    #[error("encoding frame {index} failed")]
    EncodeFrameFailed { index: usize },

    #[error("page would need {segments} lacing segments (max 255)")]
    PageOverflow { segments: usize },

    #[error("frames per page must be within 1..=255, got {0}")]
    InvalidFramesPerPage(usize),

    #[error("unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("stream already finished")]
    StreamFinished,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable identifier of the taxonomy entry
    pub fn code(&self) -> &'static str {
        match self {
            Error::IncorrectFileSize { .. } => "WAVE_PARSER_INCORRECT_FILESIZE",
            Error::ContainerIdNotFound => "WAVE_PARSER_CONTAINER_ID_NOT_FOUND",
            Error::FormatIdNotFound => "WAVE_PARSER_FORMAT_ID_NOT_FOUND",
            Error::DataChunkIdNotFound => "WAVE_PARSER_DATA_CHUNK_ID_NOT_FOUND",
            Error::AudioPropertiesNotExtracted(_) => "WAVE_PARSER_AUDIO_PROPERTIES_NOT_EXTRACTED",
            Error::CouldNotAllocateEncoderState => "SPEEX_ENCODER_COULD_NOT_ALLOCATE_ENCODER_STATE",
            Error::CouldNotSetupResampler { .. } => "SPEEX_ENCODER_COULD_NOT_SETUP_RESAMPLER",
            Error::CouldNotObtainFrameSize => "SPEEX_ENCODER_COULD_NOT_OBTAIN_FRAME_SIZE",
            Error::CouldNotObtainBitrate => "SPEEX_ENCODER_COULD_NOT_OBTAIN_BITRATE",
            Error::CouldNotSetQuality(_) => "SPEEX_ENCODER_COULD_NOT_SET_QUALITY",
            Error::NotEnoughDataToCreateSpeexHeader => {
                "SPEEX_ENCODER_NOT_ENOUGH_DATA_TO_CREATE_SPEEX_HEADER"
            }
            Error::ResampleFailed { .. } => "SPEEX_ENCODER_COULD_NOT_RESAMPLE",
            Error::EncodeFrameFailed { .. } => "SPEEX_ENCODER_COULD_NOT_ENCODE_FRAME",
            Error::PageOverflow { .. } => "OGG_PAGE_OVERFLOW",
            Error::InvalidFramesPerPage(_) => "OGG_INVALID_FRAMES_PER_PAGE",
            Error::UnsupportedSampleRate(_) => "UNSUPPORTED_SAMPLE_RATE",
            Error::StreamFinished => "SPEEX_ENCODER_STREAM_FINISHED",
            Error::Io(_) => "IO_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::IncorrectFileSize { .. }
            | Error::ContainerIdNotFound
            | Error::FormatIdNotFound
            | Error::DataChunkIdNotFound
            | Error::AudioPropertiesNotExtracted(_)
            | Error::UnsupportedSampleRate(_) => ErrorCategory::Parse,
            Error::CouldNotAllocateEncoderState
            | Error::CouldNotSetupResampler { .. }
            | Error::CouldNotObtainFrameSize
            | Error::CouldNotObtainBitrate
            | Error::CouldNotSetQuality(_)
            | Error::InvalidFramesPerPage(_) => ErrorCategory::Construction,
            Error::NotEnoughDataToCreateSpeexHeader => ErrorCategory::Header,
            Error::ResampleFailed { .. }
            | Error::EncodeFrameFailed { .. }
            | Error::PageOverflow { .. }
            | Error::StreamFinished => ErrorCategory::Encoding,
            Error::Io(_) => ErrorCategory::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
