//! Types for processing tables of *Program Specific Information* in a transport stream.
//!
//! # Concepts
//!
//! * There are multiple standard types of Program Specific Information, like the *Program
//!   Association Table* and *Program Map Table*.  Standards derived from mpegts may define their
//!   own table types.
//! * A PSI *Table* can split into *Sections*
//! * A Section can be split across a small number of individual transport stream *Packets*
//! * A Section may use the 'long' syntax common across a number of the standard table types
//!   (carrying a version, section numbering and a CRC), or the 'short' syntax, which is an
//!   opaque bag of bytes following the 3-byte common header.
//!
//! # Core types
//!
//! * [`Section`](section/struct.Section.html) is one complete, validated section
//! * [`BinaryTable`](table/struct.BinaryTable.html) is the ordered set of sections making up one
//!   version of a table
//!
//! Decoding the content of specific table types is left to other code operating on these
//! generic types.

pub mod section;
pub mod table;

use std::fmt;

/// Size of the header common to short and long sections (`table_id` and `section_length`).
pub const SHORT_SECTION_HEADER_SIZE: usize = 3;
/// Size of the header of a long section, including the common header.
pub const LONG_SECTION_HEADER_SIZE: usize = SHORT_SECTION_HEADER_SIZE + TableSyntaxHeader::SIZE;
/// Size of the CRC32 which ends every long section.
pub const SECTION_CRC32_SIZE: usize = 4;
/// Maximum size of a section in an MPEG-defined table.
pub const MAX_PSI_SECTION_SIZE: usize = 1024;
/// Maximum size of a section in a private (DVB, ATSC, ...) table.
pub const MAX_PRIVATE_SECTION_SIZE: usize = 4096;
/// Minimum size of a short section.
pub const MIN_SHORT_SECTION_SIZE: usize = SHORT_SECTION_HEADER_SIZE;
/// Minimum size of a long section.
pub const MIN_LONG_SECTION_SIZE: usize = LONG_SECTION_HEADER_SIZE + SECTION_CRC32_SIZE;
/// Maximum payload size of a short private section.
pub const MAX_PRIVATE_SHORT_SECTION_PAYLOAD_SIZE: usize =
    MAX_PRIVATE_SECTION_SIZE - SHORT_SECTION_HEADER_SIZE;
/// Maximum payload size of a long private section.
pub const MAX_PRIVATE_LONG_SECTION_PAYLOAD_SIZE: usize =
    MAX_PRIVATE_SECTION_SIZE - LONG_SECTION_HEADER_SIZE - SECTION_CRC32_SIZE;

/// Table id of the DVB _Stuffing Table_, whose sections are always short regardless of their
/// `section_syntax_indicator`.
pub const TID_ST: u8 = 0x72;
/// The reserved table id value, which marks the start of stuffing bytes in a packet payload.
pub const TID_STUFFING: u8 = 0xff;

/// Applicability of a long section.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CurrentNext {
    /// The table is applicable now
    Current,
    /// The table will become applicable at some future time
    Next,
}

impl CurrentNext {
    fn from(v: u8) -> CurrentNext {
        if v & 1 == 0 {
            CurrentNext::Next
        } else {
            CurrentNext::Current
        }
    }
}

/// The first three bytes of every section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionCommonHeader {
    pub table_id: u8,
    pub section_syntax_indicator: bool,
    pub private_indicator: bool,
    /// Value of the 12-bit `section_length` field, which counts the bytes *following* this
    /// header.
    pub section_length: usize,
}

impl SectionCommonHeader {
    pub const SIZE: usize = SHORT_SECTION_HEADER_SIZE;

    /// Panics if fewer than 3 bytes are given.
    pub fn new(buf: &[u8]) -> SectionCommonHeader {
        assert!(buf.len() >= Self::SIZE);
        SectionCommonHeader {
            table_id: buf[0],
            section_syntax_indicator: buf[1] & 0b1000_0000 != 0,
            private_indicator: buf[1] & 0b0100_0000 != 0,
            section_length: ((u16::from(buf[1] & 0b0000_1111) << 8) | u16::from(buf[2])) as usize,
        }
    }

    /// Total size of the section, header included.
    pub fn total_size(&self) -> usize {
        self.section_length + Self::SIZE
    }

    /// `true` if the section uses the long syntax.
    ///
    /// MPEG says that is the case whenever `section_syntax_indicator` is set, but DVB stuffing
    /// tables are always short whatever the indicator says.
    pub fn is_long(&self) -> bool {
        self.section_syntax_indicator && self.table_id != TID_ST
    }

    /// `true` if the total size lies within the limits for a section of this form.
    pub fn has_valid_size(&self) -> bool {
        let size = self.total_size();
        size >= MIN_SHORT_SECTION_SIZE
            && size <= MAX_PRIVATE_SECTION_SIZE
            && (!self.is_long() || size >= MIN_LONG_SECTION_SIZE)
    }
}

/// Represents the fields that appear within table sections that use the common 'section syntax'.
///
/// This will only be used for a table section if the
/// [`section_syntax_indicator`](struct.SectionCommonHeader.html#structfield.section_syntax_indicator)
/// field in the `SectionCommonHeader` of the section is `true`.
#[derive(Debug)]
pub struct TableSyntaxHeader<'buf> {
    buf: &'buf [u8],
}

impl<'buf> TableSyntaxHeader<'buf> {
    pub const SIZE: usize = 5;

    /// Panics if fewer than 5 bytes are given.
    pub fn new(buf: &'buf [u8]) -> TableSyntaxHeader<'buf> {
        assert!(buf.len() >= Self::SIZE);
        TableSyntaxHeader { buf }
    }
    /// The initial 16-bit field within a 'section syntax' PSI table (which immediately follows the
    /// `section_length` field).
    /// _13818-1_ refers to this field as,
    ///  - `transport_stream_id` when it appears within a Program Association Section
    ///  - part of the `reserved` field when it appears within a Conditional Access Section
    ///  - `program_number` when it appears within a Program Map Section
    ///  - `table_id_extension` when it appears within a Private Section
    pub fn id(&self) -> u16 {
        u16::from(self.buf[0]) << 8 | u16::from(self.buf[1])
    }
    /// A 5-bit value that can be used to quickly check if this table has changed since the last
    /// time it was periodically inserted within the transport stream being read.
    pub fn version(&self) -> u8 {
        (self.buf[2] >> 1) & 0b0001_1111
    }
    /// Is this table applicable now, or will it become applicable at some future time.
    pub fn current_next_indicator(&self) -> CurrentNext {
        CurrentNext::from(self.buf[2])
    }
    /// The number of this section, within a potentially multi-section table.
    pub fn section_number(&self) -> u8 {
        self.buf[3]
    }
    /// Indicates the value of `section_number()` that will appear within the last section within
    /// a table.
    pub fn last_section_number(&self) -> u8 {
        self.buf[4]
    }
}

/// _Extended table id_: the table id, plus the table id extension for long sections.
///
/// Two PMTs for different programs may be carried on the same PID, and are distinguished by
/// their extension (the `program_number`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Etid {
    table_id: u8,
    table_id_extension: Option<u16>,
}

impl Etid {
    /// Identity of a table made of short sections.
    pub fn short(table_id: u8) -> Etid {
        Etid {
            table_id,
            table_id_extension: None,
        }
    }
    /// Identity of a table made of long sections.
    pub fn long(table_id: u8, table_id_extension: u16) -> Etid {
        Etid {
            table_id,
            table_id_extension: Some(table_id_extension),
        }
    }
    pub fn table_id(&self) -> u8 {
        self.table_id
    }
    pub fn table_id_extension(&self) -> Option<u16> {
        self.table_id_extension
    }
    pub fn is_long(&self) -> bool {
        self.table_id_extension.is_some()
    }
}

impl fmt::Display for Etid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.table_id_extension {
            Some(ext) => write!(f, "TID 0x{:02X}/0x{:04X}", self.table_id, ext),
            None => write!(f, "TID 0x{:02X}", self.table_id),
        }
    }
}
