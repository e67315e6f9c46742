//! Reassembly of sections and tables from the packets of a transport stream.
//!
//! A [`SectionDemux`](struct.SectionDemux.html) is fed packets one at a time.  For each PID
//! that passes its PID filter it tracks continuity, buffers the bytes of incomplete sections, and
//! frames complete sections out of the buffer.  Valid sections are handed to a
//! [`SectionHandler`](trait.SectionHandler.html), and collected per table so that each version
//! of a table is handed once to a [`TableHandler`](trait.TableHandler.html) when complete.
//!
//! Errors in the stream never stop processing.  They are counted in a
//! [`Status`](struct.Status.html) and logged at a configurable level, and the affected section or
//! PID is discarded until the stream can be followed again.

mod context;
mod status;

pub use self::status::Status;

use self::context::{EtidContext, PidContext, PidContexts};
use crate::packet::{Packet, Pid};
use crate::psi::section::{CrcValidation, Section, SectionError};
use crate::psi::table::BinaryTable;
use crate::psi::{
    CurrentNext, Etid, SectionCommonHeader, TableSyntaxHeader, SHORT_SECTION_HEADER_SIZE,
    TID_STUFFING,
};
use fixedbitset::FixedBitSet;
use log::warn;
use std::rc::Rc;

/// Receives each complete table, once per version.
pub trait TableHandler {
    fn handle_table(&mut self, demux: &mut DemuxHandle<'_>, table: &BinaryTable);
}

/// Receives each valid section as soon as it is complete, including repetitions of sections
/// already seen.
pub trait SectionHandler {
    fn handle_section(&mut self, demux: &mut DemuxHandle<'_>, section: &Rc<Section>);

    /// Called for sections which were framed but rejected: truncated, badly numbered, filtered
    /// out as current or next, or failing their CRC check.
    fn handle_invalid_section(
        &mut self,
        _demux: &mut DemuxHandle<'_>,
        _section: &InvalidSection<'_>,
    ) {
    }
}

/// A handler which ignores everything, used as the type of an absent handler.
#[derive(Debug, Default)]
pub struct NullHandler;
impl TableHandler for NullHandler {
    fn handle_table(&mut self, _demux: &mut DemuxHandle<'_>, _table: &BinaryTable) {}
}
impl SectionHandler for NullHandler {
    fn handle_section(&mut self, _demux: &mut DemuxHandle<'_>, _section: &Rc<Section>) {}
}

/// The bytes of a rejected section, as framed from the stream.
#[derive(Debug)]
pub struct InvalidSection<'a> {
    data: &'a [u8],
    pid: Pid,
    first_packet_index: u64,
    last_packet_index: u64,
}
impl<'a> InvalidSection<'a> {
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
    pub fn source_pid(&self) -> Pid {
        self.pid
    }
    pub fn first_packet_index(&self) -> u64 {
        self.first_packet_index
    }
    pub fn last_packet_index(&self) -> u64 {
        self.last_packet_index
    }
}

// A handler can't modify the PID contexts of the demultiplexer while one of them is in use by
// the packet being processed, so handlers record the changes they want and the demultiplexer
// applies them when the handler returns.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DemuxChange {
    /// Discard the contexts of every PID.
    ResetAll,
    /// Discard the context of one PID.
    ResetPid(Pid),
    /// Add a PID to the filter.
    AddPid(Pid),
    /// Remove a PID from the filter, discarding its context.
    RemovePid(Pid),
}

/// Changes queued by handlers through a `DemuxHandle`, in the order requested.
#[derive(Debug, Default)]
pub(crate) struct DemuxChangeset {
    updates: Vec<DemuxChange>,
}
impl DemuxChangeset {
    fn push(&mut self, change: DemuxChange) {
        self.updates.push(change)
    }

    /// Apply the pending changes, returning `true` if the context of `in_use` was discarded.
    fn apply(
        &mut self,
        contexts: &mut PidContexts,
        pid_filter: &mut FixedBitSet,
        in_use: Option<Pid>,
    ) -> bool {
        let mut discarded = false;
        for update in self.updates.drain(..) {
            match update {
                DemuxChange::ResetAll => {
                    contexts.clear();
                    discarded |= in_use.is_some();
                }
                DemuxChange::ResetPid(pid) => {
                    contexts.remove(pid);
                    discarded |= in_use == Some(pid);
                }
                DemuxChange::AddPid(pid) => pid_filter.insert(usize::from(pid)),
                DemuxChange::RemovePid(pid) => {
                    pid_filter.set(usize::from(pid), false);
                    contexts.remove(pid);
                    discarded |= in_use == Some(pid);
                }
            }
        }
        discarded
    }

    fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// The view of the demultiplexer given to handlers.
///
/// Changes requested through the handle take effect as soon as the handler returns.  If they
/// discard the PID being processed, the rest of the current packet is ignored.
pub struct DemuxHandle<'a> {
    changeset: &'a mut DemuxChangeset,
    status: &'a Status,
    pid: Pid,
    packet_index: u64,
}
impl<'a> DemuxHandle<'a> {
    fn new(
        changeset: &'a mut DemuxChangeset,
        status: &'a Status,
        pid: Pid,
        packet_index: u64,
    ) -> DemuxHandle<'a> {
        DemuxHandle {
            changeset,
            status,
            pid,
            packet_index,
        }
    }

    /// Forget all partially received sections and tables on every PID.
    pub fn reset(&mut self) {
        self.changeset.push(DemuxChange::ResetAll)
    }
    /// Forget all partially received sections and tables on the given PID.
    pub fn reset_pid(&mut self, pid: Pid) {
        self.changeset.push(DemuxChange::ResetPid(pid))
    }
    pub fn add_pid(&mut self, pid: Pid) {
        self.changeset.push(DemuxChange::AddPid(pid))
    }
    /// Stop processing the given PID, and reset it.
    pub fn remove_pid(&mut self, pid: Pid) {
        self.changeset.push(DemuxChange::RemovePid(pid))
    }
    /// The PID which carried the data being handled.
    pub fn pid(&self) -> Pid {
        self.pid
    }
    /// Index of the packet being processed.
    pub fn packet_index(&self) -> u64 {
        self.packet_index
    }
    /// Error counters, as of the start of the handler call.
    pub fn status(&self) -> &Status {
        self.status
    }
}

/// How [`SectionDemux::flush()`](struct.SectionDemux.html#method.flush) turns incomplete
/// tables into valid ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Remove missing sections and renumber the rest.
    Pack,
    /// Replace missing sections with empty ones.
    FillGaps,
}

/// Extracts sections and tables from transport stream packets.
pub struct SectionDemux<T: TableHandler = NullHandler, S: SectionHandler = NullHandler> {
    table_handler: Option<T>,
    section_handler: Option<S>,
    contexts: PidContexts,
    pid_filter: FixedBitSet,
    changeset: DemuxChangeset,
    handler_pid: Option<Pid>,
    status: Status,
    packet_count: u64,
    get_current: bool,
    get_next: bool,
    track_invalid_versions: bool,
    ts_error_level: log::Level,
}

impl<T: TableHandler> SectionDemux<T, NullHandler> {
    pub fn with_table_handler(table_handler: T) -> Self {
        SectionDemux::new(Some(table_handler), None)
    }
}

impl<S: SectionHandler> SectionDemux<NullHandler, S> {
    pub fn with_section_handler(section_handler: S) -> Self {
        SectionDemux::new(None, Some(section_handler))
    }
}

impl<T: TableHandler, S: SectionHandler> SectionDemux<T, S> {
    /// A demultiplexer accepting every PID, and sections marked 'current' only.
    pub fn new(table_handler: Option<T>, section_handler: Option<S>) -> Self {
        let mut pid_filter = FixedBitSet::with_capacity(Pid::PID_COUNT);
        pid_filter.insert_range(..);
        SectionDemux {
            table_handler,
            section_handler,
            contexts: PidContexts::default(),
            pid_filter,
            changeset: DemuxChangeset::default(),
            handler_pid: None,
            status: Status::default(),
            packet_count: 0,
            get_current: true,
            get_next: false,
            track_invalid_versions: false,
            ts_error_level: log::Level::Debug,
        }
    }

    pub fn table_handler(&self) -> Option<&T> {
        self.table_handler.as_ref()
    }
    pub fn table_handler_mut(&mut self) -> Option<&mut T> {
        self.table_handler.as_mut()
    }
    /// Replacing the table handler also forgets partially received tables.
    pub fn set_table_handler(&mut self, table_handler: Option<T>) {
        self.table_handler = table_handler;
        self.reset();
    }
    pub fn section_handler(&self) -> Option<&S> {
        self.section_handler.as_ref()
    }
    pub fn section_handler_mut(&mut self) -> Option<&mut S> {
        self.section_handler.as_mut()
    }
    pub fn set_section_handler(&mut self, section_handler: Option<S>) {
        self.section_handler = section_handler;
    }

    /// Choose whether sections marked 'current' and sections marked 'next' are processed.
    /// Short sections count as 'current'.
    pub fn set_current_next(&mut self, current: bool, next: bool) {
        self.get_current = current;
        self.get_next = next;
    }
    /// When enabled, a section whose content changes without a change of version replaces the
    /// previous one, and the table is reported again.
    pub fn track_invalid_versions(&mut self, on: bool) {
        self.track_invalid_versions = on;
    }
    /// Log level for errors found in the stream.
    pub fn set_ts_error_level(&mut self, level: log::Level) {
        self.ts_error_level = level;
    }

    pub fn has_pid(&self, pid: Pid) -> bool {
        self.pid_filter.contains(usize::from(pid))
    }
    pub fn add_pid(&mut self, pid: Pid) {
        self.pid_filter.insert(usize::from(pid));
    }
    pub fn add_all_pids(&mut self) {
        self.pid_filter.insert_range(..);
    }
    /// Stop processing the given PID, and reset it.
    pub fn remove_pid(&mut self, pid: Pid) {
        self.pid_filter.set(usize::from(pid), false);
        self.reset_pid(pid);
    }
    /// Process only the given PIDs.  PIDs no longer processed are reset.
    pub fn set_pid_filter<I: IntoIterator<Item = Pid>>(&mut self, pids: I) {
        let mut filter = FixedBitSet::with_capacity(Pid::PID_COUNT);
        for pid in pids {
            filter.insert(usize::from(pid));
        }
        for pid in self.contexts.pids() {
            if !filter.contains(usize::from(pid)) {
                self.contexts.remove(pid);
            }
        }
        self.pid_filter = filter;
    }

    /// Forget all partially received sections and tables.
    pub fn reset(&mut self) {
        self.contexts.clear();
    }
    /// Forget all partially received sections and tables on the given PID.
    pub fn reset_pid(&mut self, pid: Pid) {
        self.contexts.remove(pid);
    }

    pub fn status(&self) -> &Status {
        &self.status
    }
    pub fn reset_status(&mut self) {
        self.status.reset();
    }
    /// Number of packets passed to `feed_packet()` so far, including those on filtered-out PIDs.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Split the given buffer into packets and process each of them.  Any trailing partial packet
    /// is ignored.
    pub fn push(&mut self, buf: &[u8]) {
        let mut chunks = buf.chunks_exact(Packet::SIZE);
        for pk_buf in &mut chunks {
            self.feed_packet(&Packet::new(pk_buf));
        }
        let rest = chunks.remainder();
        if !rest.is_empty() {
            warn!(
                "ignoring {} trailing bytes which don't make a complete packet",
                rest.len()
            );
        }
    }

    pub fn feed_packet(&mut self, pk: &Packet<'_>) {
        if self.has_pid(pk.pid()) {
            self.process_packet(pk);
        }
        self.packet_count += 1;
    }

    /// Report incomplete tables, made valid using the given mode.  Tables already reported are
    /// not reported again.
    pub fn flush(&mut self, mode: FlushMode) {
        for pid in self.contexts.pids() {
            // may have been reset by a handler while flushing a previous PID
            if !self.contexts.contains(pid) {
                continue;
            }
            let mut pc = self.contexts.checkout(pid);
            let mut discarded = false;
            for tc in pc.tids.values_mut() {
                self.before_calling_handler(pid);
                self.notify(pid, tc, Some(mode));
                if self.after_calling_handler() {
                    discarded = true;
                    break;
                }
            }
            if !discarded {
                self.contexts.insert(pid, pc);
            }
        }
    }

    fn before_calling_handler(&mut self, pid: Pid) {
        debug_assert!(self.changeset.is_empty());
        self.handler_pid = Some(pid);
    }

    /// Applies changes requested by the handler, returning `true` if the context of the PID being
    /// processed was discarded.
    fn after_calling_handler(&mut self) -> bool {
        let in_use = self.handler_pid.take();
        self.changeset
            .apply(&mut self.contexts, &mut self.pid_filter, in_use)
    }

    /// Pass the table of the given context to the table handler, if the table is complete (or if
    /// flushing) and was not already reported.
    fn notify(&mut self, pid: Pid, tc: &mut EtidContext, flush: Option<FlushMode>) {
        if tc.notified || (flush.is_none() && !tc.is_complete()) {
            return;
        }
        let handler = match self.table_handler.as_mut() {
            Some(h) => h,
            None => return,
        };
        let mut table = tc.build_table();
        match flush {
            Some(FlushMode::Pack) => {
                table.pack_sections();
            }
            Some(FlushMode::FillGaps) => {
                table.fill_gaps();
            }
            None => {}
        }
        if table.is_valid() {
            tc.notified = true;
            let mut handle =
                DemuxHandle::new(&mut self.changeset, &self.status, pid, self.packet_count);
            handler.handle_table(&mut handle, &table);
        }
    }

    fn process_packet(&mut self, pk: &Packet<'_>) {
        if !pk.has_valid_sync() {
            self.status.invalid_packets += 1;
            return;
        }
        let pid = pk.pid();
        let mut pc = self.contexts.checkout(pid);
        if self.process_in_context(&mut pc, pk) {
            self.contexts.insert(pid, pc);
        }
    }

    /// Returns `false` if a handler discarded the context.
    fn process_in_context(&mut self, pc: &mut PidContext, pk: &Packet<'_>) -> bool {
        let pid = pk.pid();
        let index = self.packet_count;

        if pk.is_scrambled() {
            self.status.scrambled += 1;
            pc.sync_lost();
            return true;
        }

        let cc = pk.continuity_counter();
        if pc.sync {
            if cc == pc.continuity {
                // duplicate packet
                return true;
            }
            if !cc.follows(pc.continuity) {
                log::log!(
                    self.ts_error_level,
                    "demux sync lost on discontinuity, PID {}, packet index {}",
                    pid,
                    index
                );
                self.status.discontinuities += 1;
                pc.sync_lost();
            }
        }
        pc.continuity = cc;

        let mut payload = match pk.payload() {
            Some(p) => p,
            None => return true,
        };

        let pusi = pk.payload_unit_start_indicator();
        // index of the packet in which the next section to be framed started
        let mut pusi_pkt_index = pc.pusi_pkt_index;
        let mut pointer_field = None;
        if pusi {
            pc.pusi_pkt_index = index;
            // a PES start code prefix; 00 00 01 can't start a PSI payload
            if payload.starts_with(&[0, 0, 1]) {
                pc.sync_lost();
                return true;
            }
            let pointer = usize::from(payload[0]);
            payload = &payload[1..];
            if pointer >= payload.len() {
                warn!(
                    "PID {}: pointer_field {} beyond end of packet payload of {} bytes",
                    pid,
                    pointer,
                    payload.len()
                );
                pc.sync_lost();
                return true;
            }
            if pointer == 0 && pc.ts.is_empty() {
                pusi_pkt_index = index;
            }
            pointer_field = Some(pointer);
        }

        if !pc.sync {
            // can only start following the PID at the start of a section
            let pointer = match pointer_field {
                Some(p) => p,
                None => return true,
            };
            payload = &payload[pointer..];
            pointer_field = Some(0);
            pusi_pkt_index = index;
            pc.sync = true;
        }

        pc.ts.extend_from_slice(payload);
        // offset in pc.ts of the section announced by pointer_field
        let pusi_section = pointer_field.map(|p| pc.ts.len() - payload.len() + p);

        let mut start = 0;
        while pc.ts.len() - start >= SHORT_SECTION_HEADER_SIZE {
            let later_pusi = pusi_section.filter(|&p| start < p);

            if pc.ts[start] == TID_STUFFING {
                match later_pusi {
                    Some(p) => {
                        start = p;
                        continue;
                    }
                    None => {
                        // rest of packet is stuffing
                        start = pc.ts.len();
                        break;
                    }
                }
            }

            let header = SectionCommonHeader::new(&pc.ts[start..]);
            let tid = header.table_id;
            let mut section_length = header.total_size();
            if !header.has_valid_size() {
                log::log!(
                    self.ts_error_level,
                    "invalid section length: {} bytes, PID {}, TID 0x{:02X}, packet index {}",
                    section_length,
                    pid,
                    tid,
                    index
                );
                self.status.invalid_section_lengths += 1;
                match later_pusi {
                    Some(p) => {
                        start = p;
                        continue;
                    }
                    None => {
                        pc.sync_lost();
                        return true;
                    }
                }
            }

            let mut section_ok = true;
            if let Some(p) = later_pusi {
                if start + section_length > p {
                    let actual_length = p - start;
                    log::log!(
                        self.ts_error_level,
                        "truncated section: {} bytes instead of {}, PID {}, TID 0x{:02X}, packet index {}",
                        actual_length,
                        section_length,
                        pid,
                        tid,
                        index
                    );
                    self.status.truncated_sections += 1;
                    section_ok = false;
                    section_length = actual_length;
                }
            }

            if pc.ts.len() - start < section_length {
                // wait for the rest of the section
                break;
            }
            let end = start + section_length;

            let long = header.is_long();
            let mut etid = Etid::short(tid);
            let mut version = 0;
            let mut is_next = false;
            let mut section_number = 0;
            let mut last_section_number = 0;
            if section_ok && long {
                let syntax = TableSyntaxHeader::new(&pc.ts[start + SHORT_SECTION_HEADER_SIZE..]);
                etid = Etid::long(tid, syntax.id());
                version = syntax.version();
                is_next = syntax.current_next_indicator() == CurrentNext::Next;
                section_number = syntax.section_number();
                last_section_number = syntax.last_section_number();
                if section_number > last_section_number {
                    log::log!(
                        self.ts_error_level,
                        "invalid section index: {}/{}, PID {}, TID 0x{:02X}, packet index {}",
                        section_number,
                        last_section_number,
                        pid,
                        tid,
                        index
                    );
                    self.status.invalid_section_indexes += 1;
                    section_ok = false;
                }
            }

            if is_next && !self.get_next {
                self.status.next_sections += 1;
                section_ok = false;
            }
            if !is_next && !self.get_current {
                section_ok = false;
            }

            if section_ok {
                // tables are only collected for a table handler
                let mut tc = if self.table_handler.is_some() {
                    Some(pc.tids.entry(etid).or_default())
                } else {
                    None
                };

                if let Some(tc) = tc.as_mut() {
                    // short sections have no version, so each one is a new table
                    if !long || tc.sect_expected == 0 || tc.version != version {
                        tc.init(version, last_section_number);
                    }
                    if usize::from(last_section_number) + 1 != tc.sect_expected {
                        log::log!(
                            self.ts_error_level,
                            "inconsistent last section index: {}, was {}, PID {}, TID 0x{:02X}, packet index {}",
                            last_section_number,
                            tc.sect_expected - 1,
                            pid,
                            tid,
                            index
                        );
                        self.status.invalid_section_indexes += 1;
                        section_ok = false;
                    }
                }

                if section_ok && self.track_invalid_versions && long {
                    if let Some(tc) = tc.as_mut() {
                        let data = &pc.ts[start..end];
                        let changed = tc.sects[usize::from(section_number)]
                            .as_ref()
                            .map_or(false, |old| old.content() != data);
                        if changed {
                            log::log!(
                                self.ts_error_level,
                                "section updated without version update, PID {}, TID 0x{:02X}, section {}, version {}, packet index {}",
                                pid,
                                tid,
                                section_number,
                                version,
                                index
                            );
                            tc.forget(section_number);
                            self.status.invalid_versions += 1;
                        }
                    }
                }

                let mut sect = None;
                let is_new = tc
                    .as_ref()
                    .map_or(false, |tc| !tc.has_section(section_number));
                if section_ok && (self.section_handler.is_some() || is_new) {
                    match Section::from_bytes(&pc.ts[start..end], pid, CrcValidation::Check) {
                        Ok(s) => sect = Some(Rc::new(s.with_packet_indexes(pusi_pkt_index, index))),
                        Err(e) => {
                            log::log!(
                                self.ts_error_level,
                                "{}, PID {}, TID 0x{:02X}, section {}, version {}, packet index {}",
                                e,
                                pid,
                                tid,
                                section_number,
                                version,
                                index
                            );
                            if let SectionError::Crc32Mismatch { .. } = e {
                                self.status.wrong_crc += 1;
                            }
                            section_ok = false;
                        }
                    }
                }

                if section_ok {
                    self.before_calling_handler(pid);
                    if let (Some(handler), Some(s)) =
                        (self.section_handler.as_mut(), sect.as_ref())
                    {
                        let mut handle =
                            DemuxHandle::new(&mut self.changeset, &self.status, pid, index);
                        handler.handle_section(&mut handle, s);
                    }
                    if let (Some(tc), Some(s)) = (tc, sect) {
                        if !tc.has_section(section_number) {
                            tc.store(s);
                            self.notify(pid, tc, None);
                        }
                    }
                    if self.after_calling_handler() {
                        return false;
                    }
                }
            }

            if !section_ok && self.section_handler.is_some() {
                self.before_calling_handler(pid);
                if let Some(handler) = self.section_handler.as_mut() {
                    let invalid = InvalidSection {
                        data: &pc.ts[start..end],
                        pid,
                        first_packet_index: pusi_pkt_index,
                        last_packet_index: index,
                    };
                    let mut handle =
                        DemuxHandle::new(&mut self.changeset, &self.status, pid, index);
                    handler.handle_invalid_section(&mut handle, &invalid);
                }
                if self.after_calling_handler() {
                    return false;
                }
            }

            start = end;
            // any further section necessarily starts in this packet
            pusi_pkt_index = index;
        }

        if start >= pc.ts.len() {
            pc.ts.clear();
        } else if start > 0 {
            pc.ts.drain(..start);
        }
        true
    }
}
