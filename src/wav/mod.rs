// WAV (RIFF/WAVE) container parsing
//
// RIFF Structure:
// - "RIFF" (4 bytes)
// - RIFF size (4 bytes, little-endian) = file size - 8
// - "WAVE" (4 bytes)
// - Chunks: id (4 bytes) + size (4 bytes, little-endian) + body, padded to even length
//   - "fmt " : format tag, channels, sample rate, byte rate, block align, bits per sample
//   - "data" : interleaved PCM samples
//
// Only 16-bit mono PCM at one of the supported sample rates is accepted.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{AudioFormat, SampleRate};

pub const RIFF_SIGNATURE: &[u8; 4] = b"RIFF";
pub const WAVE_SIGNATURE: &[u8; 4] = b"WAVE";
pub const FMT_CHUNK_ID: &[u8; 4] = b"fmt ";
pub const DATA_CHUNK_ID: &[u8; 4] = b"data";

const WAVE_FORMAT_PCM: u16 = 1;
const RIFF_HEADER_SIZE: usize = 12;
const CHUNK_HEADER_SIZE: usize = 8;
const FMT_CHUNK_MIN_SIZE: usize = 16;

/// Decoded WAV contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavAudio {
    pub format: AudioFormat,
    pub samples: Vec<i16>,
}

/// Location of a chunk body inside the buffer
#[derive(Debug, Clone, Copy)]
struct ChunkRef {
    offset: usize,
    size: usize,
}

/// Parse a complete WAV file held in memory.
///
/// Checks run in a fixed order and the first failure is reported: file size,
/// container tags, format chunk, data chunk, then the audio properties.
pub fn parse_wav(data: &[u8]) -> Result<WavAudio> {
    check_file_size(data)?;

    if data.len() < RIFF_HEADER_SIZE
        || &data[0..4] != RIFF_SIGNATURE
        || &data[8..12] != WAVE_SIGNATURE
    {
        return Err(Error::ContainerIdNotFound);
    }

    let (fmt, data_chunk) = find_chunks(data);
    let fmt = fmt.ok_or(Error::FormatIdNotFound)?;
    let data_chunk = data_chunk.ok_or(Error::DataChunkIdNotFound)?;

    let format = read_format(data, fmt)?;
    let samples = read_samples(data, data_chunk, &format)?;

    debug!(
        sample_rate = format.sample_rate.hz(),
        samples = samples.len(),
        "parsed WAV container"
    );

    Ok(WavAudio { format, samples })
}

fn check_file_size(data: &[u8]) -> Result<()> {
    let actual = data.len() as u64;
    if data.len() < CHUNK_HEADER_SIZE {
        return Err(Error::IncorrectFileSize { declared: 0, actual });
    }
    let declared = LittleEndian::read_u32(&data[4..8]) as u64 + CHUNK_HEADER_SIZE as u64;
    if declared != actual {
        return Err(Error::IncorrectFileSize { declared, actual });
    }
    Ok(())
}

/// Walk the chunk list and remember where "fmt " and "data" start.
///
/// A chunk whose declared size runs past the buffer is still recorded so the
/// property check can report it; the walk stops there.
fn find_chunks(data: &[u8]) -> (Option<ChunkRef>, Option<ChunkRef>) {
    let mut fmt = None;
    let mut data_chunk = None;
    let mut pos = RIFF_HEADER_SIZE;

    while pos + CHUNK_HEADER_SIZE <= data.len() {
        let id = &data[pos..pos + 4];
        let size = LittleEndian::read_u32(&data[pos + 4..pos + 8]) as usize;
        let chunk = ChunkRef {
            offset: pos + CHUNK_HEADER_SIZE,
            size,
        };

        if id == FMT_CHUNK_ID && fmt.is_none() {
            fmt = Some(chunk);
        } else if id == DATA_CHUNK_ID && data_chunk.is_none() {
            data_chunk = Some(chunk);
        }

        if fmt.is_some() && data_chunk.is_some() {
            break;
        }

        // Chunk bodies are padded to an even length
        match chunk.offset.checked_add(size + (size & 1)) {
            Some(next) if next <= data.len() => pos = next,
            _ => break,
        }
    }

    (fmt, data_chunk)
}

fn read_format(data: &[u8], fmt: ChunkRef) -> Result<AudioFormat> {
    if fmt.size < FMT_CHUNK_MIN_SIZE || fmt.offset + FMT_CHUNK_MIN_SIZE > data.len() {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "format chunk too short ({} bytes)",
            fmt.size
        )));
    }

    let body = &data[fmt.offset..fmt.offset + FMT_CHUNK_MIN_SIZE];
    let format_tag = LittleEndian::read_u16(&body[0..2]);
    let channels = LittleEndian::read_u16(&body[2..4]);
    let sample_rate = LittleEndian::read_u32(&body[4..8]);
    let block_align = LittleEndian::read_u16(&body[12..14]);
    let bits_per_sample = LittleEndian::read_u16(&body[14..16]);

    if format_tag != WAVE_FORMAT_PCM {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "unsupported format tag {:#06x}",
            format_tag
        )));
    }
    if channels != 1 {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "only mono is supported, got {} channels",
            channels
        )));
    }
    if bits_per_sample != 16 {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "only 16-bit samples are supported, got {}",
            bits_per_sample
        )));
    }
    let sample_rate = SampleRate::from_hz(sample_rate).map_err(|_| {
        Error::AudioPropertiesNotExtracted(format!("unsupported sample rate {}", sample_rate))
    })?;

    let format = AudioFormat {
        sample_rate,
        channels,
        bits_per_sample,
    };
    if block_align as usize != format.block_align() {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "block align {} does not match {} channel(s) of {} bits",
            block_align, channels, bits_per_sample
        )));
    }

    Ok(format)
}

fn read_samples(data: &[u8], chunk: ChunkRef, format: &AudioFormat) -> Result<Vec<i16>> {
    let end = chunk.offset.checked_add(chunk.size).unwrap_or(usize::MAX);
    if end > data.len() {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "data chunk declares {} bytes but only {} remain",
            chunk.size,
            data.len() - chunk.offset
        )));
    }
    if chunk.size % format.block_align() != 0 {
        return Err(Error::AudioPropertiesNotExtracted(format!(
            "data length {} is not a multiple of the {}-byte frame",
            chunk.size,
            format.block_align()
        )));
    }

    let mut samples = vec![0i16; chunk.size / 2];
    LittleEndian::read_i16_into(&data[chunk.offset..end], &mut samples);
    Ok(samples)
}
