use anyhow::{bail, ensure, Result};
use bytes::{BufMut, BytesMut};

use crate::tree::Node;
use crate::{put_u32_at, CommonHeader, PacketKind};

/// SDES: Source Description RTCP Packet
///
/// ```text
///        0                   1                   2                   3
///        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |V=2|P|    SC   |  PT=SDES=202  |             length            |
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
///       |                          SSRC/CSRC_1                          |
///       +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///       |                           SDES items                          |
///       |                              ...                              |
///       +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```
///
/// One chunk per inner group. Within a chunk the `src=` leaf sets the
/// source identifier and every other leaf becomes an item, `type (8) |
/// length (8) | text`. Item text is limited to 255 octets.
pub(crate) fn write(children: &[Node], buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();
    buf.put_bytes(0, 4);

    let mut header = CommonHeader::new(PacketKind::SDES);
    let mut chunks = 0;

    for child in children {
        match child {
            Node::Group(list) => {
                chunk(list, buf)?;
                chunks += 1;
            }
            Node::Leaf { name, .. } => {
                if name == "SDES" || header.absorb(child) {
                    continue;
                }
                bail!("invalid RTCP type {}", name);
            }
        }
    }

    header.patch(buf, start, chunks);
    Ok(buf.len() - start)
}

/// One source chunk: SRC word, items, a single END octet, then zero
/// padding into the next 32-bit word.
fn chunk(list: &[Node], buf: &mut BytesMut) -> Result<()> {
    let start = buf.len();
    buf.put_u32(0);

    for node in list {
        if let Node::Leaf { name, .. } = node {
            if name == "src" {
                put_u32_at(buf, start, node.num() as u32);
            } else {
                let text = node.text();
                ensure!(
                    text.len() <= u8::MAX as usize,
                    "SDES item {} is longer than 255 octets",
                    name
                );
                buf.put_u8(item_kind(name));
                buf.put_u8(text.len() as u8);
                buf.put(text.as_bytes());
            }
        }
    }

    buf.put_u8(0);
    let used = buf.len() - start;
    buf.put_bytes(0, 4 - (used & 3));
    Ok(())
}

/// SDES item codes (RFC 3550 section 12.2). Unknown names map to the
/// table's END terminator.
fn item_kind(name: &str) -> u8 {
    const ITEM_KINDS: [(&str, u8); 9] = [
        ("end", 0),
        ("cname", 1),
        ("name", 2),
        ("email", 3),
        ("phone", 4),
        ("loc", 5),
        ("tool", 6),
        ("note", 7),
        ("priv", 8),
    ];

    ITEM_KINDS
        .iter()
        .find(|(item, _)| name.eq_ignore_ascii_case(item))
        .map(|(_, kind)| *kind)
        .unwrap_or(0)
}
