// OGG Speex stream writing
//
// OGG File Structure:
// - OGG Page Header (27 bytes)
//   - Capture Pattern: "OggS" (4 bytes)
//   - Version: 0 (1 byte)
//   - Header Type: 1=continuation, 2=bos, 4=eos (1 byte)
//   - Granule Position (8 bytes)
//   - Bitstream Serial Number (4 bytes)
//   - Page Sequence Number (4 bytes)
//   - CRC Checksum (4 bytes)
//   - Number of Page Segments (1 byte)
//   - Segment Table (variable)
//
// Speex Structure:
// 1. Identification Header (first page, BOS)
// 2. Comment Header (second page)
// 3. Audio Data pages, one Speex frame per packet

pub mod crc;
pub mod page;
pub mod speex;

use tracing::trace;

use crate::error::{Error, Result};
use page::OggPage;
use speex::{CommentHeader, SpeexHeader};

pub use page::OggPageHeader;

// OGG signature
pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";

// OGG page header types
pub const OGG_HEADER_TYPE_BOS: u8 = 0x02; // Beginning of Stream
pub const OGG_HEADER_TYPE_EOS: u8 = 0x04; // End of Stream

/// Packs compressed frames into Ogg pages.
///
/// The two header pages go out before the first data page and only once.
/// Page sequence numbers and the granule position keep counting across
/// calls, so consecutive outputs concatenate into one valid stream. The
/// packetizer is cheap to clone; callers stage writes on a clone and keep it
/// only if the whole call succeeds.
#[derive(Debug, Clone)]
pub struct OggPacketizer {
    serial: u32,
    max_frames_per_page: usize,
    identification: Vec<u8>,
    comment: Vec<u8>,
    headers_written: bool,
    next_sequence: u32,
    granule_position: u64,
}

impl OggPacketizer {
    pub fn new(
        serial: u32,
        max_frames_per_page: usize,
        identification: &SpeexHeader,
        comment: &CommentHeader,
    ) -> Result<Self> {
        if !(1..=255).contains(&max_frames_per_page) {
            return Err(Error::InvalidFramesPerPage(max_frames_per_page));
        }
        Ok(Self {
            serial,
            max_frames_per_page,
            identification: identification.to_packet(),
            comment: comment.to_packet(),
            headers_written: false,
            next_sequence: 0,
            granule_position: 0,
        })
    }

    /// Append the identification and comment pages unless already written
    pub fn write_headers(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if self.headers_written {
            return Ok(());
        }

        let identification = self.identification.clone();
        let comment = self.comment.clone();
        self.write_page(OGG_HEADER_TYPE_BOS, &[identification.as_slice()], out)?;
        self.write_page(0, &[comment.as_slice()], out)?;

        self.headers_written = true;
        Ok(())
    }

    /// Append data pages for `frames`, each `samples_per_frame` samples long.
    ///
    /// Page k of this call holds frames [max·k, max·(k+1)). Returns the
    /// number of data pages written.
    pub fn write_frames(
        &mut self,
        frames: &[Vec<u8>],
        samples_per_frame: u64,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        self.write_data(frames, samples_per_frame, 0, out)
    }

    /// Append the last data pages followed by the end-of-stream page.
    ///
    /// The final frame ends in `padding` samples of filler silence; the
    /// closing granule position leaves them out.
    pub fn write_final(
        &mut self,
        frames: &[Vec<u8>],
        samples_per_frame: u64,
        padding: u64,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        let pages = self.write_data(frames, samples_per_frame, padding, out)?;
        self.write_end(out)?;
        Ok(pages)
    }

    fn write_data(
        &mut self,
        frames: &[Vec<u8>],
        samples_per_frame: u64,
        padding: u64,
        out: &mut Vec<u8>,
    ) -> Result<usize> {
        self.write_headers(out)?;

        let pages = frames.len().div_ceil(self.max_frames_per_page);
        for (index, chunk) in frames.chunks(self.max_frames_per_page).enumerate() {
            let mut samples = chunk.len() as u64 * samples_per_frame;
            if index + 1 == pages {
                samples = samples.saturating_sub(padding);
            }
            self.granule_position += samples;
            let packets: Vec<&[u8]> = chunk.iter().map(Vec::as_slice).collect();
            self.write_page(0, &packets, out)?;
        }
        Ok(pages)
    }

    /// Append an empty page flagged end-of-stream
    pub fn write_end(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.write_headers(out)?;
        self.write_page(OGG_HEADER_TYPE_EOS, &[], out)
    }

    fn write_page(&mut self, header_type: u8, packets: &[&[u8]], out: &mut Vec<u8>) -> Result<()> {
        let granule = if self.headers_written {
            self.granule_position
        } else {
            0
        };
        let page = OggPage::from_packets(header_type, granule, self.serial, self.next_sequence, packets)?;
        trace!(
            sequence = self.next_sequence,
            packets = packets.len(),
            granule,
            "writing Ogg page"
        );
        out.extend_from_slice(&page.to_bytes());
        self.next_sequence += 1;
        Ok(())
    }
}
