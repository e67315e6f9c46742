#![no_main]

use libfuzzer_sys::fuzz_target;
use mpegts_section_demux::demultiplex::{
    DemuxHandle, FlushMode, InvalidSection, SectionDemux, SectionHandler, TableHandler,
};
use mpegts_section_demux::psi::section::Section;
use mpegts_section_demux::psi::table::BinaryTable;
use std::rc::Rc;

pub struct FuzzHandler;
impl TableHandler for FuzzHandler {
    fn handle_table(&mut self, demux: &mut DemuxHandle<'_>, table: &BinaryTable) {
        // exercise the deferred reset path
        if table.total_size() % 7 == 0 {
            let pid = demux.pid();
            demux.reset_pid(pid);
        }
    }
}
impl SectionHandler for FuzzHandler {
    fn handle_section(&mut self, _demux: &mut DemuxHandle<'_>, section: &Rc<Section>) {
        assert!(section.section_number() <= section.last_section_number());
    }
    fn handle_invalid_section(
        &mut self,
        _demux: &mut DemuxHandle<'_>,
        section: &InvalidSection<'_>,
    ) {
        assert!(!section.data().is_empty());
    }
}

fuzz_target!(|data: &[u8]| {
    let mut demux = SectionDemux::new(Some(FuzzHandler), Some(FuzzHandler));
    demux.track_invalid_versions(true);
    demux.push(data);
    demux.flush(FlushMode::FillGaps);
});
