//! A table is the set of sections sharing one [`Etid`] and version.

use super::section::Section;
use super::{CurrentNext, Etid};
use crate::packet::Pid;
use std::rc::Rc;
use thiserror::Error;

/// Reasons for which a section could not be added to a [`BinaryTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TableError {
    /// The section has a different table id, extension or version than the sections already
    /// present.
    #[error("section does not belong to this table")]
    SectionTableMismatch,
    /// The section's `last_section_number` does not agree with the table size.
    #[error("section count does not match the table")]
    IncompatibleSectionCount,
    #[error("section {0} is already present in the table")]
    DuplicateSection(u8),
}

/// An ordered set of sections, indexed by `section_number`, some of which may be missing while
/// the table is being assembled.
///
/// A table made of short sections has exactly one section.
#[derive(Debug, Clone, Default)]
pub struct BinaryTable {
    sections: Vec<Option<Rc<Section>>>,
    missing: usize,
}

impl BinaryTable {
    pub fn new() -> BinaryTable {
        BinaryTable::default()
    }

    /// Add a section to the table.  The first section added decides the identity, version and
    /// size of the table.
    pub fn add_section(&mut self, section: Rc<Section>) -> Result<(), TableError> {
        let index = usize::from(section.section_number());
        match self.first() {
            None => {
                self.sections = vec![None; usize::from(section.last_section_number()) + 1];
                self.missing = self.sections.len();
            }
            Some(first) => {
                if first.etid() != section.etid() || first.version() != section.version() {
                    return Err(TableError::SectionTableMismatch);
                }
                if usize::from(section.last_section_number()) + 1 != self.sections.len() {
                    return Err(TableError::IncompatibleSectionCount);
                }
            }
        }
        let slot = &mut self.sections[index];
        if slot.is_some() {
            return Err(TableError::DuplicateSection(section.section_number()));
        }
        *slot = Some(section);
        self.missing -= 1;
        Ok(())
    }

    /// `true` once every section of the table is present.
    pub fn is_valid(&self) -> bool {
        !self.sections.is_empty() && self.missing == 0
    }

    /// Remove missing sections, renumbering the remaining ones so that they are contiguous.
    ///
    /// Returns the new validity of the table, which is `false` only if the table has no section
    /// at all.
    pub fn pack_sections(&mut self) -> bool {
        if self.missing > 0 {
            let present: Vec<Rc<Section>> = self.sections.drain(..).flatten().collect();
            let last = present.len().saturating_sub(1) as u8;
            self.sections = present
                .into_iter()
                .enumerate()
                .map(|(n, s)| {
                    let n = n as u8;
                    if s.section_number() == n && s.last_section_number() == last {
                        Some(s)
                    } else {
                        Some(Rc::new(s.renumbered(n, last)))
                    }
                })
                .collect();
            self.missing = 0;
        }
        self.is_valid()
    }

    /// Replace each missing section with an empty long section carrying the table's identity,
    /// up to the declared `last_section_number`.
    ///
    /// Tables of short sections, and tables with no section at all, are left unchanged.  Returns
    /// the new validity of the table.
    pub fn fill_gaps(&mut self) -> bool {
        let template = match self.first() {
            Some(s) if s.is_long() => Rc::clone(s),
            _ => return self.is_valid(),
        };
        let ext = template.table_id_extension().unwrap_or(0);
        let last = template.last_section_number();
        for (n, slot) in self.sections.iter_mut().enumerate() {
            if slot.is_some() {
                continue;
            }
            match Section::new_long(
                template.table_id(),
                template.is_private(),
                ext,
                template.version(),
                template.current_next(),
                n as u8,
                last,
                &[],
                template.source_pid(),
            ) {
                Ok(s) => {
                    let s = s.with_packet_indexes(
                        template.first_packet_index(),
                        template.last_packet_index(),
                    );
                    *slot = Some(Rc::new(s));
                    self.missing -= 1;
                }
                Err(_) => return false,
            }
        }
        self.is_valid()
    }

    fn first(&self) -> Option<&Rc<Section>> {
        self.sections.iter().flatten().next()
    }

    /// Number of section slots, present or missing.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
    /// Number of sections still missing.
    pub fn missing_count(&self) -> usize {
        self.missing
    }
    /// The section with the given `section_number`, if present.
    pub fn section_at(&self, index: usize) -> Option<&Rc<Section>> {
        self.sections.get(index).and_then(|s| s.as_ref())
    }
    /// The sections present in the table, in `section_number` order.
    pub fn sections(&self) -> impl Iterator<Item = &Rc<Section>> {
        self.sections.iter().flatten()
    }
    /// Total size in bytes of all sections present.
    pub fn total_size(&self) -> usize {
        self.sections().map(|s| s.size()).sum()
    }
    pub fn is_short_section(&self) -> bool {
        self.sections.len() == 1 && self.sections[0].as_ref().map_or(false, |s| !s.is_long())
    }
    pub fn etid(&self) -> Option<Etid> {
        self.first().map(|s| s.etid())
    }
    pub fn table_id(&self) -> Option<u8> {
        self.first().map(|s| s.table_id())
    }
    pub fn version(&self) -> u8 {
        self.first().map(|s| s.version()).unwrap_or(0)
    }
    pub fn current_next(&self) -> CurrentNext {
        self.first()
            .map(|s| s.current_next())
            .unwrap_or(CurrentNext::Current)
    }
    pub fn source_pid(&self) -> Option<Pid> {
        self.first().map(|s| s.source_pid())
    }
    /// Index of the first TS packet which carried any of this table's sections.
    pub fn first_packet_index(&self) -> Option<u64> {
        self.sections().map(|s| s.first_packet_index()).min()
    }
    /// Index of the last TS packet which carried any of this table's sections.
    pub fn last_packet_index(&self) -> Option<u64> {
        self.sections().map(|s| s.last_packet_index()).max()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_matches::assert_matches;

    fn sect(version: u8, n: u8, last: u8, payload: &[u8]) -> Rc<Section> {
        Rc::new(
            Section::new_long(
                0x4e,
                true,
                0x0101,
                version,
                CurrentNext::Current,
                n,
                last,
                payload,
                Pid::new(0x12),
            )
            .unwrap()
            .with_packet_indexes(u64::from(n) * 10, u64::from(n) * 10 + 1),
        )
    }

    #[test]
    fn empty() {
        let table = BinaryTable::new();
        assert!(!table.is_valid());
        assert_eq!(table.section_count(), 0);
        assert_eq!(table.etid(), None);
        assert_eq!(table.first_packet_index(), None);
    }

    #[test]
    fn complete_out_of_order() {
        let mut table = BinaryTable::new();
        table.add_section(sect(3, 2, 2, b"c")).unwrap();
        assert!(!table.is_valid());
        assert_eq!(table.section_count(), 3);
        assert_eq!(table.missing_count(), 2);
        table.add_section(sect(3, 0, 2, b"a")).unwrap();
        table.add_section(sect(3, 1, 2, b"b")).unwrap();
        assert!(table.is_valid());
        let payloads: Vec<&[u8]> = table.sections().map(|s| s.payload()).collect();
        assert_eq!(payloads, vec![&b"a"[..], b"b", b"c"]);
        assert_eq!(table.etid(), Some(Etid::long(0x4e, 0x0101)));
        assert_eq!(table.version(), 3);
        assert_eq!(table.source_pid(), Some(Pid::new(0x12)));
        assert_eq!(table.first_packet_index(), Some(0));
        assert_eq!(table.last_packet_index(), Some(21));
        assert_eq!(table.total_size(), 3 * 13);
        assert!(!table.is_short_section());
    }

    #[test]
    fn rejects() {
        let mut table = BinaryTable::new();
        table.add_section(sect(3, 0, 1, b"a")).unwrap();
        assert_matches!(
            table.add_section(sect(4, 1, 1, b"b")),
            Err(TableError::SectionTableMismatch)
        );
        assert_matches!(
            table.add_section(sect(3, 1, 2, b"b")),
            Err(TableError::IncompatibleSectionCount)
        );
        assert_matches!(
            table.add_section(sect(3, 0, 1, b"a")),
            Err(TableError::DuplicateSection(0))
        );
        assert_eq!(table.missing_count(), 1);
    }

    #[test]
    fn pack() {
        let mut table = BinaryTable::new();
        table.add_section(sect(1, 1, 4, b"b")).unwrap();
        table.add_section(sect(1, 3, 4, b"d")).unwrap();
        assert!(table.pack_sections());
        assert_eq!(table.section_count(), 2);
        let s0 = table.section_at(0).unwrap();
        assert_eq!(s0.payload(), b"b");
        assert_eq!(s0.section_number(), 0);
        assert_eq!(s0.last_section_number(), 1);
        let s1 = table.section_at(1).unwrap();
        assert_eq!(s1.payload(), b"d");
        assert_eq!(s1.section_number(), 1);
        assert!(crate::mpegts_crc::sum32(s1.content()) == 0);
    }

    #[test]
    fn fill() {
        let mut table = BinaryTable::new();
        for n in [0, 1, 3, 4] {
            table.add_section(sect(7, n, 4, b"x")).unwrap();
        }
        assert!(table.fill_gaps());
        assert_eq!(table.section_count(), 5);
        let gap = table.section_at(2).unwrap();
        assert!(gap.payload().is_empty());
        assert_eq!(gap.section_number(), 2);
        assert_eq!(gap.last_section_number(), 4);
        assert_eq!(gap.version(), 7);
        assert_eq!(gap.etid(), Etid::long(0x4e, 0x0101));
    }

    #[test]
    fn short_table() {
        let s = Rc::new(Section::new_short(0x70, true, b"time", Pid::new(0x14)).unwrap());
        let mut table = BinaryTable::new();
        table.add_section(s).unwrap();
        assert!(table.is_valid());
        assert!(table.is_short_section());
        assert_eq!(table.etid(), Some(Etid::short(0x70)));
    }
}
