//! Error counters of a [`SectionDemux`](../struct.SectionDemux.html).

use std::fmt;

/// Counts of each kind of problem the demultiplexer has met in the stream.
///
/// Problems never interrupt processing; they are counted here and the affected PID or section is
/// recovered or discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Packets without a valid sync byte.
    pub invalid_packets: u64,
    /// Continuity counter errors.
    pub discontinuities: u64,
    pub scrambled: u64,
    /// Sections whose `section_length` is out of range for their form.
    pub invalid_section_lengths: u64,
    /// Sections cut short by the start of another section.
    pub truncated_sections: u64,
    /// `section_number` greater than `last_section_number`, or a `last_section_number` which
    /// changed without a new version.
    pub invalid_section_indexes: u64,
    /// Sections whose content changed without a version change (only counted when tracking is
    /// enabled).
    pub invalid_versions: u64,
    pub wrong_crc: u64,
    /// Sections marked "next" and dropped because they are not accepted.
    pub next_sections: u64,
}

impl Status {
    fn counters(&self) -> [(&'static str, u64); 9] {
        [
            ("Invalid TS packets", self.invalid_packets),
            ("TS packets discontinuities", self.discontinuities),
            ("Scrambled TS packets", self.scrambled),
            ("Invalid section lengths", self.invalid_section_lengths),
            ("Truncated sections", self.truncated_sections),
            ("Invalid section index", self.invalid_section_indexes),
            ("Invalid unchanged section version", self.invalid_versions),
            ("Corrupted sections (bad CRC)", self.wrong_crc),
            ("Next sections (not yet applicable)", self.next_sections),
        ]
    }

    /// `true` if any counter is non-zero.
    pub fn has_errors(&self) -> bool {
        self.counters().iter().any(|(_, v)| *v != 0)
    }

    pub fn reset(&mut self) {
        *self = Status::default();
    }

    /// Log one line per counter at the given level, each line starting with `prefix`.  When
    /// `errors_only` is set, zero counters are skipped.
    pub fn log(&self, level: log::Level, prefix: &str, errors_only: bool) {
        for (label, value) in self.counters().iter() {
            if !errors_only || *value != 0 {
                log::log!(level, "{}{}: {}", prefix, label, value);
            }
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, value) in self.counters().iter() {
            writeln!(f, "{}: {}", label, value)?;
        }
        Ok(())
    }
}
