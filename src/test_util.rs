//! Builds transport stream packets carrying sections, for tests.

use crate::packet::{Packet, Pid};

const PAYLOAD_SIZE: usize = Packet::SIZE - 4;

/// Splits sections into the packets of one PID, setting `payload_unit_start_indicator` and the
/// pointer field wherever a section starts, and padding the last packet with `0xff`.
pub(crate) struct Packetizer {
    pid: Pid,
    cc: u8,
}

impl Packetizer {
    pub fn new(pid: Pid) -> Packetizer {
        Packetizer { pid, cc: 0 }
    }

    fn header(&mut self, pusi: bool) -> Vec<u8> {
        let pid = u16::from(self.pid);
        let mut pk = Vec::with_capacity(Packet::SIZE);
        pk.push(Packet::SYNC_BYTE);
        pk.push((pid >> 8) as u8 | if pusi { 0b0100_0000 } else { 0 });
        pk.push(pid as u8);
        pk.push(0b0001_0000 | self.cc);
        self.cc = (self.cc + 1) & 0b1111;
        pk
    }

    /// Packets carrying the given sections back to back.
    pub fn packetize(&mut self, sections: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut data = Vec::new();
        let mut starts = Vec::new();
        for s in sections {
            starts.push(data.len());
            data.extend_from_slice(s);
        }
        let mut packets = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            // pointer_field takes one byte of payload when a section starts in the packet
            let start_here = starts
                .iter()
                .copied()
                .find(|&s| s >= pos && s < pos + PAYLOAD_SIZE - 1);
            let mut pk = match start_here {
                Some(start) => {
                    let mut pk = self.header(true);
                    pk.push((start - pos) as u8);
                    let n = (PAYLOAD_SIZE - 1).min(data.len() - pos);
                    pk.extend_from_slice(&data[pos..pos + n]);
                    pos += n;
                    pk
                }
                None => {
                    let mut pk = self.header(false);
                    let limit = starts
                        .iter()
                        .copied()
                        .find(|&s| s > pos)
                        .unwrap_or(data.len());
                    let n = PAYLOAD_SIZE.min(limit - pos);
                    pk.extend_from_slice(&data[pos..pos + n]);
                    pos += n;
                    pk
                }
            };
            pk.resize(Packet::SIZE, 0xff);
            packets.push(pk);
        }
        packets
    }

    /// A packet with the given payload, padded with `0xff`.
    pub fn packet(&mut self, pusi: bool, payload: &[u8]) -> Vec<u8> {
        let mut pk = self.header(pusi);
        pk.extend_from_slice(payload);
        pk.resize(Packet::SIZE, 0xff);
        pk
    }
}

#[test]
fn section_spanning_packets() {
    let section = vec![0x42; 300];
    let short = vec![0x43; 20];
    let packets = Packetizer::new(Pid::new(0x101)).packetize(&[&section, &short]);
    assert_eq!(packets.len(), 2);
    let p0 = Packet::new(&packets[0]);
    assert!(p0.payload_unit_start_indicator());
    assert_eq!(p0.pid(), Pid::new(0x101));
    assert_eq!(p0.payload().unwrap()[0], 0);
    let p1 = Packet::new(&packets[1]);
    assert!(p1.payload_unit_start_indicator());
    assert_eq!(p1.continuity_counter().count(), 1);
    assert_eq!(p1.payload().unwrap()[0], 117);
}
