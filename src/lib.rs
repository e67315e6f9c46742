//! Reassembles the sections and tables of _Program Specific Information_ (and of the private
//! tables defined by DVB, ATSC, ISDB, etc.) from MPEG2 Transport Stream packets, per the
//! _ISO/IEC 13818-1_ standard.
//!
//! # Design principals
//!
//!  * *Push based*.  The caller feeds packets, or buffers of packets, to a
//!    [`SectionDemux`](demultiplex/struct.SectionDemux.html), which calls back into handler
//!    implementations supplied by the caller as sections and tables become complete.
//!  * *Robust*.  Broadcast streams are lossy.  Nothing in the packet path fails: problems are
//!    counted, logged, and the demultiplexer recovers at the next opportunity.
//!  * *Generic*.  Sections and tables are delivered as validated bytes along with the fields common
//!    to all table types.  Decoding the content of particular table types is left to other code.
//!  * *Transport Neutral*.  There is no code here consuming from files or the network.  The APIs
//!    accept `&[u8]`, and the caller handles providing the data from wherever.
//!
//! # Example
//!
//! ```
//! use mpegts_section_demux::demultiplex::{DemuxHandle, SectionDemux, TableHandler};
//! use mpegts_section_demux::psi::table::BinaryTable;
//!
//! struct PrintTables;
//! impl TableHandler for PrintTables {
//!     fn handle_table(&mut self, demux: &mut DemuxHandle<'_>, table: &BinaryTable) {
//!         println!(
//!             "PID {}: {:?} version {}, {} sections",
//!             demux.pid(),
//!             table.etid(),
//!             table.version(),
//!             table.section_count()
//!         );
//!     }
//! }
//!
//! let mut demux = SectionDemux::with_table_handler(PrintTables);
//! # let buf = [0u8; 0];
//! demux.push(&buf[..]);
//! ```

pub mod demultiplex;
mod mpegts_crc;
pub mod packet;
pub mod psi;

#[cfg(test)]
mod test_util;
