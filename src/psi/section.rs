//! A complete, validated section, as reassembled from transport stream packets.

use super::{
    CurrentNext, Etid, SectionCommonHeader, TableSyntaxHeader, LONG_SECTION_HEADER_SIZE,
    MAX_PRIVATE_LONG_SECTION_PAYLOAD_SIZE, MAX_PRIVATE_SECTION_SIZE,
    MAX_PRIVATE_SHORT_SECTION_PAYLOAD_SIZE, MIN_LONG_SECTION_SIZE, MIN_SHORT_SECTION_SIZE,
    SECTION_CRC32_SIZE, SHORT_SECTION_HEADER_SIZE,
};
use crate::mpegts_crc;
use crate::packet::Pid;
use std::fmt;
use thiserror::Error;

/// Reasons for which some bytes could not be accepted as a [`Section`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SectionError {
    /// Fewer bytes than a section header, more than the maximum section size, or a long section
    /// too short to hold its header and CRC.
    #[error("invalid section header")]
    InvalidHeader,
    /// `section_length` does not agree with the amount of data.
    #[error("section_length implies {declared} bytes but {actual} bytes were given")]
    SizeMismatch { declared: usize, actual: usize },
    #[error("section_number {section_number} is greater than last_section_number {last_section_number}")]
    InvalidSectionNumber {
        section_number: u8,
        last_section_number: u8,
    },
    #[error("CRC32 mismatch: section carries {expected:#010x}, computed {computed:#010x}")]
    Crc32Mismatch { expected: u32, computed: u32 },
    #[error("payload of {0} bytes is too large for a section")]
    PayloadTooLarge(usize),
}

/// What to do with the CRC32 of a long section when building a [`Section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcValidation {
    /// Reject the section if the CRC32 is wrong.
    Check,
    /// Overwrite the CRC32 with the correct value.
    Compute,
    /// Accept the CRC32 as-is.
    Ignore,
}

/// One complete section.
///
/// A `Section` owns a copy of its bytes (header, payload and CRC for long sections) and is never
/// modified once built, so that the demultiplexer can hand the same `Rc<Section>` to a section
/// handler and keep it in a table under construction.
#[derive(Clone, PartialEq, Eq)]
pub struct Section {
    data: Box<[u8]>,
    source_pid: Pid,
    first_packet_index: u64,
    last_packet_index: u64,
}

impl Section {
    /// Validate the given bytes as a complete section.
    ///
    /// The length of `data` must be exactly the size announced by the `section_length` field.
    pub fn from_bytes(
        data: &[u8],
        source_pid: Pid,
        crc: CrcValidation,
    ) -> Result<Section, SectionError> {
        if data.len() < MIN_SHORT_SECTION_SIZE || data.len() > MAX_PRIVATE_SECTION_SIZE {
            return Err(SectionError::InvalidHeader);
        }
        let header = SectionCommonHeader::new(data);
        if header.total_size() != data.len() {
            return Err(SectionError::SizeMismatch {
                declared: header.total_size(),
                actual: data.len(),
            });
        }
        let mut data: Box<[u8]> = data.into();
        if header.is_long() {
            if data.len() < MIN_LONG_SECTION_SIZE {
                return Err(SectionError::InvalidHeader);
            }
            let syntax = TableSyntaxHeader::new(&data[SHORT_SECTION_HEADER_SIZE..]);
            if syntax.section_number() > syntax.last_section_number() {
                return Err(SectionError::InvalidSectionNumber {
                    section_number: syntax.section_number(),
                    last_section_number: syntax.last_section_number(),
                });
            }
            let crc_offset = data.len() - SECTION_CRC32_SIZE;
            match crc {
                CrcValidation::Check => {
                    if mpegts_crc::sum32(&data) != 0 {
                        return Err(SectionError::Crc32Mismatch {
                            expected: read_u32(&data[crc_offset..]),
                            computed: mpegts_crc::compute(&data[..crc_offset]),
                        });
                    }
                }
                CrcValidation::Compute => {
                    let computed = mpegts_crc::compute(&data[..crc_offset]);
                    data[crc_offset..].copy_from_slice(&computed.to_be_bytes());
                }
                CrcValidation::Ignore => {}
            }
        }
        Ok(Section {
            data,
            source_pid,
            first_packet_index: 0,
            last_packet_index: 0,
        })
    }

    /// Build a short section around the given payload.
    pub fn new_short(
        table_id: u8,
        private: bool,
        payload: &[u8],
        source_pid: Pid,
    ) -> Result<Section, SectionError> {
        if payload.len() > MAX_PRIVATE_SHORT_SECTION_PAYLOAD_SIZE {
            return Err(SectionError::PayloadTooLarge(payload.len()));
        }
        let mut data = Vec::with_capacity(SHORT_SECTION_HEADER_SIZE + payload.len());
        data.push(table_id);
        data.extend_from_slice(&length_field(false, private, payload.len()).to_be_bytes());
        data.extend_from_slice(payload);
        Section::from_bytes(&data, source_pid, CrcValidation::Ignore)
    }

    /// Build a long section around the given payload, computing its CRC32.
    #[allow(clippy::too_many_arguments)]
    pub fn new_long(
        table_id: u8,
        private: bool,
        table_id_extension: u16,
        version: u8,
        current_next: CurrentNext,
        section_number: u8,
        last_section_number: u8,
        payload: &[u8],
        source_pid: Pid,
    ) -> Result<Section, SectionError> {
        if payload.len() > MAX_PRIVATE_LONG_SECTION_PAYLOAD_SIZE {
            return Err(SectionError::PayloadTooLarge(payload.len()));
        }
        let section_length = TableSyntaxHeader::SIZE + payload.len() + SECTION_CRC32_SIZE;
        let mut data = Vec::with_capacity(SHORT_SECTION_HEADER_SIZE + section_length);
        data.push(table_id);
        data.extend_from_slice(&length_field(true, private, section_length).to_be_bytes());
        data.extend_from_slice(&table_id_extension.to_be_bytes());
        let cn = match current_next {
            CurrentNext::Current => 1,
            CurrentNext::Next => 0,
        };
        data.push(0b1100_0000 | (version & 0b1_1111) << 1 | cn);
        data.push(section_number);
        data.push(last_section_number);
        data.extend_from_slice(payload);
        data.extend_from_slice(&[0; SECTION_CRC32_SIZE]);
        Section::from_bytes(&data, source_pid, CrcValidation::Compute)
    }

    /// A copy of this long section with different section numbering (and an updated CRC).
    /// Short sections are returned unchanged.
    pub fn renumbered(&self, section_number: u8, last_section_number: u8) -> Section {
        if !self.is_long() {
            return self.clone();
        }
        let mut data = self.data.clone();
        data[6] = section_number;
        data[7] = last_section_number.max(section_number);
        let crc_offset = data.len() - SECTION_CRC32_SIZE;
        let crc = mpegts_crc::compute(&data[..crc_offset]);
        data[crc_offset..].copy_from_slice(&crc.to_be_bytes());
        Section { data, ..*self }
    }

    /// Records the indexes of the first and last transport stream packets which carried this
    /// section.
    pub fn with_packet_indexes(mut self, first: u64, last: u64) -> Section {
        self.first_packet_index = first;
        self.last_packet_index = last;
        self
    }

    fn header(&self) -> SectionCommonHeader {
        SectionCommonHeader::new(&self.data)
    }
    fn syntax(&self) -> Option<TableSyntaxHeader<'_>> {
        if self.is_long() {
            Some(TableSyntaxHeader::new(&self.data[SHORT_SECTION_HEADER_SIZE..]))
        } else {
            None
        }
    }

    pub fn table_id(&self) -> u8 {
        self.data[0]
    }
    pub fn is_long(&self) -> bool {
        self.header().is_long()
    }
    pub fn is_private(&self) -> bool {
        self.header().private_indicator
    }
    /// `None` for short sections.
    pub fn table_id_extension(&self) -> Option<u16> {
        self.syntax().map(|s| s.id())
    }
    pub fn etid(&self) -> Etid {
        match self.table_id_extension() {
            Some(ext) => Etid::long(self.table_id(), ext),
            None => Etid::short(self.table_id()),
        }
    }
    /// Always zero for short sections.
    pub fn version(&self) -> u8 {
        self.syntax().map(|s| s.version()).unwrap_or(0)
    }
    /// Short sections are always `Current`.
    pub fn current_next(&self) -> CurrentNext {
        self.syntax()
            .map(|s| s.current_next_indicator())
            .unwrap_or(CurrentNext::Current)
    }
    pub fn section_number(&self) -> u8 {
        self.syntax().map(|s| s.section_number()).unwrap_or(0)
    }
    pub fn last_section_number(&self) -> u8 {
        self.syntax().map(|s| s.last_section_number()).unwrap_or(0)
    }
    /// The CRC32 carried at the end of a long section.
    pub fn crc32(&self) -> Option<u32> {
        if self.is_long() {
            Some(read_u32(&self.data[self.data.len() - SECTION_CRC32_SIZE..]))
        } else {
            None
        }
    }

    /// The complete section, headers and CRC included.
    pub fn content(&self) -> &[u8] {
        &self.data
    }
    /// The bytes between the section headers and the CRC.
    pub fn payload(&self) -> &[u8] {
        if self.is_long() {
            &self.data[LONG_SECTION_HEADER_SIZE..self.data.len() - SECTION_CRC32_SIZE]
        } else {
            &self.data[SHORT_SECTION_HEADER_SIZE..]
        }
    }
    pub fn size(&self) -> usize {
        self.data.len()
    }
    pub fn source_pid(&self) -> Pid {
        self.source_pid
    }
    pub fn first_packet_index(&self) -> u64 {
        self.first_packet_index
    }
    pub fn last_packet_index(&self) -> u64 {
        self.last_packet_index
    }
}

fn length_field(long: bool, private: bool, section_length: usize) -> u16 {
    let mut v = 0b0011_0000_0000_0000 | (section_length as u16 & 0x0fff);
    if long {
        v |= 0b1000_0000_0000_0000;
    }
    if private {
        v |= 0b0100_0000_0000_0000;
    }
    v
}

fn read_u32(buf: &[u8]) -> u32 {
    u32::from(buf[0]) << 24 | u32::from(buf[1]) << 16 | u32::from(buf[2]) << 8 | u32::from(buf[3])
}

impl fmt::Debug for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Section");
        d.field("pid", &self.source_pid)
            .field("table_id", &self.table_id())
            .field("size", &self.size());
        if let Some(ext) = self.table_id_extension() {
            d.field("table_id_extension", &ext)
                .field("version", &self.version())
                .field("current_next", &self.current_next())
                .field("section_number", &self.section_number())
                .field("last_section_number", &self.last_section_number());
        }
        d.finish()
    }
}
