use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};

use super::crc;
use crate::error::{Error, Result};
use crate::ogg::{OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_EOS, OGG_SIGNATURE};

const PAGE_HEADER_SIZE: usize = 27;
const MAX_SEGMENTS: usize = 255;
const CRC_RANGE: std::ops::Range<usize> = 22..26;

/// OGG Page Header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPageHeader {
    pub version: u8,
    pub header_type: u8,
    pub granule_position: u64,
    pub bitstream_serial: u32,
    pub page_sequence: u32,
    pub crc: u32,
    pub segment_table: Vec<u8>,
}

/// OGG Page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OggPage {
    pub header: OggPageHeader,
    pub data: Vec<u8>,
}

impl OggPageHeader {
    /// Read OGG page header from a reader
    pub fn read<R: Read>(reader: &mut R) -> Option<Self> {
        let mut header = [0u8; PAGE_HEADER_SIZE];
        reader.read_exact(&mut header).ok()?;

        if &header[0..4] != OGG_SIGNATURE || header[4] != 0 {
            return None;
        }

        let segment_count = header[26];
        let mut segment_table = vec![0u8; segment_count as usize];
        reader.read_exact(&mut segment_table).ok()?;

        Some(OggPageHeader {
            version: header[4],
            header_type: header[5],
            granule_position: LittleEndian::read_u64(&header[6..14]),
            bitstream_serial: LittleEndian::read_u32(&header[14..18]),
            page_sequence: LittleEndian::read_u32(&header[18..22]),
            crc: LittleEndian::read_u32(&header[CRC_RANGE]),
            segment_table,
        })
    }

    /// Calculate total page data size from segment table
    pub fn data_size(&self) -> usize {
        self.segment_table.iter().map(|&x| x as usize).sum()
    }

    pub fn is_bos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_BOS != 0
    }

    pub fn is_eos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_EOS != 0
    }
}

impl OggPage {
    /// Build a page holding whole packets, one lacing run per packet
    pub fn from_packets(
        header_type: u8,
        granule_position: u64,
        bitstream_serial: u32,
        page_sequence: u32,
        packets: &[&[u8]],
    ) -> Result<Self> {
        let mut segment_table = Vec::new();
        let mut data = Vec::with_capacity(packets.iter().map(|p| p.len()).sum());

        for packet in packets {
            segment_table.extend(lacing_values(packet.len()));
            data.extend_from_slice(packet);
        }
        if segment_table.len() > MAX_SEGMENTS {
            return Err(Error::PageOverflow {
                segments: segment_table.len(),
            });
        }

        let mut page = OggPage {
            header: OggPageHeader {
                version: 0,
                header_type,
                granule_position,
                bitstream_serial,
                page_sequence,
                crc: 0,
                segment_table,
            },
            data,
        };
        page.header.crc = crc::checksum(&page.serialize_with_crc(0));
        Ok(page)
    }

    /// Read OGG page from a reader
    pub fn read<R: Read>(reader: &mut R) -> Option<Self> {
        let header = OggPageHeader::read(reader)?;

        let mut data = vec![0u8; header.data_size()];
        reader.read_exact(&mut data).ok()?;

        Some(OggPage { header, data })
    }

    /// Read every page until the input runs out or stops parsing
    pub fn read_all<R: Read>(reader: &mut R) -> Vec<Self> {
        std::iter::from_fn(|| Self::read(reader)).collect()
    }

    /// Split the page body into packets along the lacing values.
    ///
    /// A trailing run that ends in a 255 lacing value continues on the next
    /// page; it is returned as the last element.
    pub fn packets(&self) -> Vec<&[u8]> {
        let mut packets = Vec::new();
        let mut start = 0;
        let mut end = 0;
        for &lace in &self.header.segment_table {
            end += lace as usize;
            if lace < 255 {
                packets.push(&self.data[start..end]);
                start = end;
            }
        }
        if start < end {
            packets.push(&self.data[start..end]);
        }
        packets
    }

    /// Check the stored CRC against the page contents
    pub fn verify_crc(&self) -> bool {
        crc::checksum(&self.serialize_with_crc(0)) == self.header.crc
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.serialize_with_crc(self.header.crc)
    }

    fn serialize_with_crc(&self, crc: u32) -> Vec<u8> {
        let table = &self.header.segment_table;
        let mut out = vec![0u8; PAGE_HEADER_SIZE + table.len() + self.data.len()];

        out[0..4].copy_from_slice(OGG_SIGNATURE);
        out[4] = self.header.version;
        out[5] = self.header.header_type;
        LittleEndian::write_u64(&mut out[6..14], self.header.granule_position);
        LittleEndian::write_u32(&mut out[14..18], self.header.bitstream_serial);
        LittleEndian::write_u32(&mut out[18..22], self.header.page_sequence);
        LittleEndian::write_u32(&mut out[CRC_RANGE], crc);
        out[26] = table.len() as u8;
        out[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + table.len()].copy_from_slice(table);
        out[PAGE_HEADER_SIZE + table.len()..].copy_from_slice(&self.data);
        out
    }
}

/// Lacing values for one packet; a multiple of 255 gets a closing 0
fn lacing_values(size: usize) -> impl Iterator<Item = u8> {
    let full = size / 255;
    let rest = (size % 255) as u8;
    std::iter::repeat(255u8).take(full).chain(std::iter::once(rest))
}
