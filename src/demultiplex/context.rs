//! Per-PID and per-table reassembly state.

use crate::packet::{ContinuityCounter, Pid};
use crate::psi::section::Section;
use crate::psi::table::BinaryTable;
use crate::psi::Etid;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Sections received so far for one version of one table on one PID.
#[derive(Debug, Default)]
pub(crate) struct EtidContext {
    /// The table for the current version was already passed to the table handler.
    pub notified: bool,
    pub version: u8,
    /// Zero until the first section is seen.
    pub sect_expected: usize,
    pub sect_received: usize,
    pub sects: Vec<Option<Rc<Section>>>,
}

impl EtidContext {
    /// Forget every section and start collecting a new version of the table.
    pub fn init(&mut self, version: u8, last_section_number: u8) {
        self.notified = false;
        self.version = version;
        self.sect_expected = usize::from(last_section_number) + 1;
        self.sect_received = 0;
        self.sects.clear();
        self.sects.resize(self.sect_expected, None);
    }

    pub fn is_complete(&self) -> bool {
        self.sect_expected > 0 && self.sect_received == self.sect_expected
    }

    pub fn has_section(&self, section_number: u8) -> bool {
        self.sects
            .get(usize::from(section_number))
            .map_or(false, |s| s.is_some())
    }

    pub fn store(&mut self, section: Rc<Section>) {
        let slot = &mut self.sects[usize::from(section.section_number())];
        if slot.is_none() {
            *slot = Some(section);
            self.sect_received += 1;
        }
    }

    /// Remove a stored section so that the slot can be refilled, and arrange for the table to be
    /// reported again once complete.
    pub fn forget(&mut self, section_number: u8) {
        if let Some(slot) = self.sects.get_mut(usize::from(section_number)) {
            if slot.take().is_some() {
                self.sect_received -= 1;
                self.notified = false;
            }
        }
    }

    /// Assemble whatever sections are present into a table.
    pub fn build_table(&self) -> BinaryTable {
        let mut table = BinaryTable::new();
        for s in self.sects.iter().flatten() {
            // sections of one context always share etid, version and size
            let _ = table.add_section(Rc::clone(s));
        }
        table
    }
}

/// Reassembly state for one PID.
#[derive(Debug, Default)]
pub(crate) struct PidContext {
    pub continuity: ContinuityCounter,
    /// `false` until the start of a section has been seen since the last discontinuity.
    pub sync: bool,
    /// Bytes of incomplete sections.
    pub ts: Vec<u8>,
    pub tids: BTreeMap<Etid, EtidContext>,
    /// Index of the last packet on this PID with payload_unit_start_indicator set.
    pub pusi_pkt_index: u64,
}

impl PidContext {
    pub fn sync_lost(&mut self) {
        self.sync = false;
        self.ts.clear();
    }
}

/// The `PidContext` instances of a demultiplexer, indexed by PID value.
#[derive(Debug, Default)]
pub(crate) struct PidContexts {
    by_pid: Vec<Option<PidContext>>,
}

impl PidContexts {
    pub fn contains(&self, pid: Pid) -> bool {
        self.by_pid
            .get(usize::from(pid))
            .map_or(false, |c| c.is_some())
    }

    /// Remove the context for the given PID, creating a new one if none existed.
    pub fn checkout(&mut self, pid: Pid) -> PidContext {
        self.by_pid
            .get_mut(usize::from(pid))
            .and_then(|c| c.take())
            .unwrap_or_default()
    }

    pub fn insert(&mut self, pid: Pid, ctx: PidContext) {
        let i = usize::from(pid);
        if i >= self.by_pid.len() {
            self.by_pid.resize_with(i + 1, || None);
        }
        self.by_pid[i] = Some(ctx);
    }

    pub fn remove(&mut self, pid: Pid) {
        if let Some(c) = self.by_pid.get_mut(usize::from(pid)) {
            *c = None;
        }
    }

    pub fn clear(&mut self) {
        self.by_pid.clear();
    }

    pub fn pids(&self) -> Vec<Pid> {
        self.by_pid
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|_| Pid::new(i as u16)))
            .collect()
    }
}
