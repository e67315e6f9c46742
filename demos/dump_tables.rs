//! Prints each section and table found in the transport stream file named on the command line.

use hex_slice::AsHex;
use mpegts_section_demux::demultiplex::{
    DemuxHandle, FlushMode, InvalidSection, SectionDemux, SectionHandler, TableHandler,
};
use mpegts_section_demux::packet::Packet;
use mpegts_section_demux::psi::section::Section;
use mpegts_section_demux::psi::table::BinaryTable;
use std::cmp;
use std::env;
use std::fs::File;
use std::io::Read;
use std::rc::Rc;

struct DumpTables;
impl TableHandler for DumpTables {
    fn handle_table(&mut self, demux: &mut DemuxHandle<'_>, table: &BinaryTable) {
        if let Some(etid) = table.etid() {
            println!(
                "{:?}: table {} version {} ({} sections, {} bytes, packets {:?}..{:?})",
                demux.pid(),
                etid,
                table.version(),
                table.section_count(),
                table.total_size(),
                table.first_packet_index(),
                table.last_packet_index(),
            );
        }
    }
}

struct DumpSections;
impl SectionHandler for DumpSections {
    fn handle_section(&mut self, _demux: &mut DemuxHandle<'_>, section: &Rc<Section>) {
        let payload = section.payload();
        println!(
            "  {:?} {:x}",
            section,
            payload[..cmp::min(payload.len(), 16)].plain_hex(false)
        );
    }
    fn handle_invalid_section(
        &mut self,
        demux: &mut DemuxHandle<'_>,
        section: &InvalidSection<'_>,
    ) {
        println!(
            "{:?}: invalid section of {} bytes in packets {}..{}",
            demux.pid(),
            section.data().len(),
            section.first_packet_index(),
            section.last_packet_index(),
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    // open input file named on command line,
    let name = env::args().nth(1).unwrap();
    let mut f = File::open(&name).unwrap_or_else(|_| panic!("file not found: {}", &name));

    let mut demux = SectionDemux::new(Some(DumpTables), Some(DumpSections));

    // consume the input file, holding back any partial packet until the next read
    let mut buf = vec![0u8; Packet::SIZE * 1024];
    let mut pending = 0;
    loop {
        match f.read(&mut buf[pending..]).expect("read failed") {
            0 => break,
            n => {
                let len = pending + n;
                let whole = len - len % Packet::SIZE;
                demux.push(&buf[..whole]);
                buf.copy_within(whole..len, 0);
                pending = len - whole;
            }
        }
    }
    demux.flush(FlushMode::Pack);

    println!("{} packets", demux.packet_count());
    print!("{}", demux.status());
}
