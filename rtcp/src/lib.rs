//! ## RTCP packet synthesis
//!
//! Builds compound RTCP control packets (RFC 3550 section 6) from the
//! parenthesized descriptions used in traffic scripts. Each top-level
//! group is one record, named by its first leaf child:
//!
//! ```text
//! (SDES (src=0xdeadbeef cname="alice@host")) (BYE (ssrc=0xdeadbeef))
//! ```
//!
//! Records share a common 4-byte header:
//!
//! ```bash
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|  count  |  packet type  |             length            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The length field (32-bit words minus one) and the count are computed
//! from what was serialized unless the description overrides them with
//! `len=` or `count=` leaves. Every record is a whole number of 32-bit
//! words, so the compound packet is too.

pub mod tree;

mod app;
mod bye;
mod report;
mod sdes;

use anyhow::{bail, Result};
use bytes::BytesMut;
use num_enum::TryFromPrimitive;

use tree::Node;

pub const RTCP_VERSION: u8 = 2;

/// RTCP packet type codes.
#[repr(u8)]
#[derive(TryFromPrimitive)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    SR = 200,
    RR = 201,
    SDES = 202,
    BYE = 203,
    APP = 204,
}

/// Serializes the compound packet described by `text`, appending one
/// record per top-level group to `buf`. Stray top-level leaves are
/// ignored. Returns the number of bytes written.
///
/// # Unit Test
///
/// ```
/// use bytes::BytesMut;
///
/// let mut buf = BytesMut::new();
/// let len = rtcp::compound("(BYE (ssrc=0x1))", &mut buf).unwrap();
///
/// assert_eq!(len, 8);
/// assert_eq!(&buf[..], &[0x81, 0xCB, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01]);
/// ```
pub fn compound(text: &str, buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();
    for node in tree::parse(text) {
        if let Node::Group(children) = node {
            record(&children, buf)?;
        }
    }
    Ok(buf.len() - start)
}

/// A record group dispatches on the first leaf child naming its type.
fn record(children: &[Node], buf: &mut BytesMut) -> Result<usize> {
    for child in children {
        match child.name() {
            Some("SDES") => return sdes::write(children, buf),
            Some("SR") => return report::write_sr(children, buf),
            Some("RR") => return report::write_rr(children, buf),
            Some("BYE") => return bye::write(children, buf),
            Some("APP") => return app::write(children, buf),
            _ => {}
        }
    }
    bail!("no RTCP payload type");
}

/// Common header overrides taken from `p=`, `count=` and `len=` leaves.
/// Zero is indistinguishable from "not given" and is replaced by the
/// computed value when the record is finished.
pub(crate) struct CommonHeader {
    kind: PacketKind,
    padding: u8,
    count: u8,
    length: u16,
}

impl CommonHeader {
    pub(crate) fn new(kind: PacketKind) -> Self {
        Self {
            kind,
            padding: 0,
            count: 0,
            length: 0,
        }
    }

    /// Absorbs an override leaf; false if the leaf is not a common header
    /// parameter.
    pub(crate) fn absorb(&mut self, node: &Node) -> bool {
        match node.name() {
            Some("p") => self.padding = (node.num() & 1) as u8,
            Some("count") => self.count = (node.num() & 0x1f) as u8,
            Some("len") => self.length = node.num() as u16,
            _ => return false,
        }
        true
    }

    /// Writes the header over the four bytes reserved at `start`, filling
    /// in the computed length and the number of serialized sub-records
    /// where no override was given.
    pub(crate) fn patch(&self, buf: &mut BytesMut, start: usize, records: u32) {
        let total = buf.len() - start;
        let count = if self.count != 0 { self.count } else { records as u8 & 0x1f };
        let length = if self.length != 0 { self.length } else { (total / 4 - 1) as u16 };

        buf[start] = (RTCP_VERSION << 6) | (self.padding << 5) | count;
        buf[start + 1] = self.kind as u8;
        buf[start + 2..start + 4].copy_from_slice(&length.to_be_bytes());
    }
}

pub(crate) fn put_u32_at(buf: &mut BytesMut, at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::PacketKind;

    #[test]
    fn sdes_chunk_is_padded_into_a_fresh_word() {
        let mut buf = BytesMut::new();
        let len = super::compound("(SDES (src=0xA cname=\"x\"))", &mut buf).unwrap();

        assert_eq!(len, 16);
        assert_eq!(
            &buf[..],
            &[
                0x81, 0xCA, 0x00, 0x03, // header, count 1, length 3
                0x00, 0x00, 0x00, 0x0A, // SRC
                0x01, 0x01, 0x78, 0x00, // CNAME "x", END
                0x00, 0x00, 0x00, 0x00, // chunk padding
            ]
        );
    }

    #[test]
    fn records_concatenate_into_a_compound_packet() {
        let mut buf = BytesMut::new();
        let len = super::compound(
            "(SDES (src=0xA cname=\"x\")) (BYE (ssrc=0xA))",
            &mut buf,
        )
        .unwrap();

        assert_eq!(len, 24);
        assert_eq!(len % 4, 0);
        assert_eq!(PacketKind::try_from(buf[1]).unwrap(), PacketKind::SDES);
        assert_eq!(PacketKind::try_from(buf[17]).unwrap(), PacketKind::BYE);
    }

    #[test]
    fn length_field_counts_words_minus_one() {
        for (text, words) in [
            ("(BYE (ssrc=1))", 1u16),
            ("(RR ssrc=1 (ssrc=2))", 7),
            ("(SR ssrc=1)", 6),
        ] {
            let mut buf = BytesMut::new();
            let len = super::compound(text, &mut buf).unwrap();
            assert_eq!(len, 4 * (words as usize + 1), "{}", text);
            assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), words, "{}", text);
        }
    }

    #[test]
    fn count_and_length_overrides_beat_computed_values() {
        let mut buf = BytesMut::new();
        super::compound("(BYE count=7 len=9 (ssrc=1))", &mut buf).unwrap();

        assert_eq!(buf[0] & 0x1f, 7);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 9);
    }

    #[test]
    fn padding_bit_override() {
        let mut buf = BytesMut::new();
        super::compound("(BYE p=1 (ssrc=1))", &mut buf).unwrap();
        assert_eq!(buf[0], 0x80 | 0x20 | 0x01);
    }

    #[test]
    fn top_level_leaves_are_ignored() {
        let mut buf = BytesMut::new();
        let len = super::compound("junk=1 (BYE (ssrc=1))", &mut buf).unwrap();
        assert_eq!(len, 8);
    }

    #[test]
    fn record_without_a_type_name_is_fatal() {
        let mut buf = BytesMut::new();
        let err = super::compound("(ssrc=1)", &mut buf).unwrap_err();
        assert!(err.to_string().contains("no RTCP payload type"));
    }

    #[test]
    fn unknown_record_level_leaf_is_fatal() {
        let mut buf = BytesMut::new();
        let err = super::compound("(BYE bogus=1 (ssrc=1))", &mut buf).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn app_records_serialize_to_nothing() {
        let mut buf = BytesMut::new();
        let len = super::compound("(APP ssrc=1)", &mut buf).unwrap();
        assert_eq!(len, 0);
    }
}
