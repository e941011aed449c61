// Speex-in-Ogg header packets
//
// Identification header (80 bytes, integers little-endian i32):
//   0  "Speex   "               8 bytes
//   8  version string           20 bytes, NUL padded
//   28 version id               36 header size
//   40 rate                     44 mode
//   48 mode bitstream version   52 channels
//   56 bitrate                  60 frame size
//   64 vbr                      68 frames per packet
//   72 extra headers            76, 80 reserved
//
// Comment header:
//   vendor length (u32 LE, always 32), vendor string (32 bytes, NUL padded),
//   comment count (u32 LE), then each comment as length (u32 LE) + bytes.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use encoding_rs::UTF_8;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{SampleRate, SpeexMode};

pub const SPEEX_SIGNATURE: &[u8; 8] = b"Speex   ";
pub const SPEEX_VERSION: &str = "1.2.0";
pub const SPEEX_HEADER_SIZE: usize = 80;
pub const VENDOR_FIELD_SIZE: usize = 32;
pub const VENDOR_STRING: &str = "Encoded with speexogg";

const VERSION_FIELD_SIZE: usize = 20;
const SPEEX_VERSION_ID: i32 = 1;

/// Speex identification header
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeexHeader {
    pub version: String,
    pub version_id: i32,
    pub header_size: i32,
    pub rate: i32,
    pub mode: i32,
    pub mode_bitstream_version: i32,
    pub nb_channels: i32,
    pub bitrate: i32,
    pub frame_size: i32,
    pub vbr: i32,
    pub frames_per_packet: i32,
    pub extra_headers: i32,
}

impl SpeexHeader {
    /// Describe a mono stream; fails while the encoder reports no frame size
    pub fn new(rate: SampleRate, mode: SpeexMode, frame_size: usize, bitrate: i32) -> Result<Self> {
        let frame_size = match i32::try_from(frame_size) {
            Ok(size) if size > 0 => size,
            _ => return Err(Error::NotEnoughDataToCreateSpeexHeader),
        };

        Ok(SpeexHeader {
            version: SPEEX_VERSION.to_string(),
            version_id: SPEEX_VERSION_ID,
            header_size: SPEEX_HEADER_SIZE as i32,
            rate: rate.hz() as i32,
            mode: mode.id(),
            mode_bitstream_version: mode.bitstream_version(),
            nb_channels: 1,
            bitrate,
            frame_size,
            vbr: 0,
            frames_per_packet: 1,
            extra_headers: 0,
        })
    }

    pub fn to_packet(&self) -> Vec<u8> {
        let mut packet = vec![0u8; SPEEX_HEADER_SIZE];
        packet[0..8].copy_from_slice(SPEEX_SIGNATURE);

        let version = self.version.as_bytes();
        let len = version.len().min(VERSION_FIELD_SIZE);
        packet[8..8 + len].copy_from_slice(&version[..len]);

        let fields = [
            self.version_id,
            self.header_size,
            self.rate,
            self.mode,
            self.mode_bitstream_version,
            self.nb_channels,
            self.bitrate,
            self.frame_size,
            self.vbr,
            self.frames_per_packet,
            self.extra_headers,
        ];
        LittleEndian::write_i32_into(&fields, &mut packet[28..72]);
        packet
    }

    /// Decode an identification packet
    pub fn parse(packet: &[u8]) -> Option<Self> {
        if packet.len() < SPEEX_HEADER_SIZE || &packet[0..8] != SPEEX_SIGNATURE {
            return None;
        }

        let mut fields = [0i32; 11];
        LittleEndian::read_i32_into(&packet[28..72], &mut fields);

        Some(SpeexHeader {
            version: decode_padded(&packet[8..28]),
            version_id: fields[0],
            header_size: fields[1],
            rate: fields[2],
            mode: fields[3],
            mode_bitstream_version: fields[4],
            nb_channels: fields[5],
            bitrate: fields[6],
            frame_size: fields[7],
            vbr: fields[8],
            frames_per_packet: fields[9],
            extra_headers: fields[10],
        })
    }
}

/// Comment header with a fixed-width vendor field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl Default for CommentHeader {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CommentHeader {
    pub fn new(comments: Vec<String>) -> Self {
        Self {
            vendor: VENDOR_STRING.to_string(),
            comments,
        }
    }

    pub fn to_packet(&self) -> Vec<u8> {
        let body: usize = self.comments.iter().map(|c| 4 + c.len()).sum();
        let mut packet = vec![0u8; 4 + VENDOR_FIELD_SIZE + 4 + body];

        LittleEndian::write_u32(&mut packet[0..4], VENDOR_FIELD_SIZE as u32);
        let vendor = self.vendor.as_bytes();
        let len = vendor.len().min(VENDOR_FIELD_SIZE);
        packet[4..4 + len].copy_from_slice(&vendor[..len]);
        LittleEndian::write_u32(&mut packet[36..40], self.comments.len() as u32);

        let mut pos = 40;
        for comment in &self.comments {
            LittleEndian::write_u32(&mut packet[pos..pos + 4], comment.len() as u32);
            pos += 4;
            packet[pos..pos + comment.len()].copy_from_slice(comment.as_bytes());
            pos += comment.len();
        }
        packet
    }

    /// Read a comment header; any vendor length is accepted
    pub fn read<R: Read>(reader: &mut R) -> std::io::Result<Self> {
        let vendor_length = reader.read_u32::<LittleEndian>()? as usize;
        let vendor_bytes = read_field(reader, vendor_length)?;

        let comment_count = reader.read_u32::<LittleEndian>()? as usize;
        let mut comments = Vec::with_capacity(comment_count.min(64));
        for _ in 0..comment_count {
            let length = reader.read_u32::<LittleEndian>()? as usize;
            let bytes = read_field(reader, length)?;
            comments.push(UTF_8.decode(&bytes).0.into_owned());
        }

        Ok(CommentHeader {
            vendor: decode_padded(&vendor_bytes),
            comments,
        })
    }
}

/// Read a length-prefixed field without trusting the length for allocation
fn read_field<R: Read>(reader: &mut R, length: usize) -> std::io::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    reader.by_ref().take(length as u64).read_to_end(&mut bytes)?;
    if bytes.len() != length {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(bytes)
}

/// Decode a NUL padded text field
fn decode_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    UTF_8.decode(&bytes[..end]).0.into_owned()
}
