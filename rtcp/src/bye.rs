use anyhow::{bail, Result};
use bytes::{BufMut, BytesMut};

use crate::tree::Node;
use crate::{CommonHeader, PacketKind};

/// BYE: Goodbye RTCP Packet
///
/// ```text
///        0                   1                   2                   3
///        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |V=2|P|    SC   |   PT=BYE=203  |             length            |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                           SSRC/CSRC                           |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       :                              ...                              :
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```
///
/// Each inner group contributes one 32-bit source identifier, taken from
/// its `ssrc=` leaf.
pub(crate) fn write(children: &[Node], buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();
    buf.put_bytes(0, 4);

    let mut header = CommonHeader::new(PacketKind::BYE);
    let mut sources = 0;

    for child in children {
        match child {
            Node::Group(list) => {
                let mut ssrc = 0u32;
                for leaf in list {
                    if leaf.name() == Some("ssrc") {
                        ssrc = leaf.num() as u32;
                    }
                }
                buf.put_u32(ssrc);
                sources += 1;
            }
            Node::Leaf { name, .. } => {
                if name == "BYE" || header.absorb(child) {
                    continue;
                }
                bail!("invalid RTCP type {}", name);
            }
        }
    }

    header.patch(buf, start, sources);
    Ok(buf.len() - start)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;
    use crate::tree::parse;
    use crate::tree::Node;

    fn children(text: &str) -> Vec<Node> {
        match parse(text).remove(0) {
            Node::Group(children) => children,
            _ => panic!("not a group"),
        }
    }

    #[test]
    fn one_source_word_per_group() {
        let mut buf = BytesMut::new();
        let len = super::write(&children("(BYE (ssrc=0x1) (ssrc=0x2))"), &mut buf).unwrap();

        assert_eq!(len, 12);
        assert_eq!(buf[0], 0x82);
        assert_eq!(&buf[4..8], &[0x00, 0x00, 0x00, 0x01]);
        assert_eq!(&buf[8..12], &[0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn group_without_ssrc_leaves_a_zero_word() {
        let mut buf = BytesMut::new();
        let len = super::write(&children("(BYE ())"), &mut buf).unwrap();

        assert_eq!(len, 8);
        assert_eq!(&buf[4..8], &[0x00, 0x00, 0x00, 0x00]);
    }
}
