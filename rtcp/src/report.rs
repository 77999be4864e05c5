use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Result};
use bytes::{BufMut, BytesMut};

use crate::tree::Node;
use crate::{put_u32_at, CommonHeader, PacketKind};

/// Seconds between 1-Jan-1900 (the NTP era) and 1-Jan-1970 (the Unix
/// epoch).
const NTP_UNIX_OFFSET: u32 = 2_208_988_800;

// common header + ssrc + sender info
const SR_HEAD_LEN: usize = 28;
// common header + ssrc
const RR_HEAD_LEN: usize = 8;
const REPORT_BLOCK_LEN: usize = 24;

/// SR: Sender Report RTCP Packet
///
/// ```text
///        0                   1                   2                   3
///        0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// header |V=2|P|    RC   |   PT=SR=200   |             length            |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                         SSRC of sender                        |
///        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// sender |              NTP timestamp, most significant word             |
/// info   +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |             NTP timestamp, least significant word             |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                         RTP timestamp                         |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                     sender's packet count                     |
///        +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
///        |                      sender's octet count                     |
///        +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// report |                           ...                                 |
/// blocks +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// ```
///
/// The NTP timestamp is populated from the wall clock; an `ntp=` leaf
/// overrides the seconds word only, the fraction keeps its wall-clock
/// value. Each inner group becomes a report block.
pub(crate) fn write_sr(children: &[Node], buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();
    buf.put_bytes(0, SR_HEAD_LEN);

    let mut header = CommonHeader::new(PacketKind::SR);
    let mut blocks = 0;

    let (ntp_sec, ntp_frac) = ntp_now();
    put_u32_at(buf, start + 8, ntp_sec);
    put_u32_at(buf, start + 12, ntp_frac);

    for child in children {
        match child {
            Node::Group(list) => {
                report_block(list, buf)?;
                blocks += 1;
            }
            Node::Leaf { name, .. } => match name.as_str() {
                "SR" => {}
                "ssrc" => put_u32_at(buf, start + 4, child.num() as u32),
                "ntp" => put_u32_at(buf, start + 8, child.num() as u32),
                "ts" => put_u32_at(buf, start + 16, child.num() as u32),
                "psent" => put_u32_at(buf, start + 20, child.num() as u32),
                "osent" => put_u32_at(buf, start + 24, child.num() as u32),
                other => {
                    if !header.absorb(child) {
                        bail!("invalid RTCP type {}", other);
                    }
                }
            },
        }
    }

    header.patch(buf, start, blocks);
    Ok(buf.len() - start)
}

/// RR: Receiver Report RTCP Packet. Same shape as SR without the sender
/// info section.
pub(crate) fn write_rr(children: &[Node], buf: &mut BytesMut) -> Result<usize> {
    let start = buf.len();
    buf.put_bytes(0, RR_HEAD_LEN);

    let mut header = CommonHeader::new(PacketKind::RR);
    let mut blocks = 0;

    for child in children {
        match child {
            Node::Group(list) => {
                report_block(list, buf)?;
                blocks += 1;
            }
            Node::Leaf { name, .. } => match name.as_str() {
                "RR" => {}
                "ssrc" => put_u32_at(buf, start + 4, child.num() as u32),
                other => {
                    if !header.absorb(child) {
                        bail!("invalid RTCP type {}", other);
                    }
                }
            },
        }
    }

    header.patch(buf, start, blocks);
    Ok(buf.len() - start)
}

/// Reception report block (24 bytes):
///
/// ```text
/// ssrc (32) | fraction (8) | cumulative lost (24) |
/// extended highest sequence (32) | jitter (32) | lsr (32) | dlsr (32)
/// ```
fn report_block(list: &[Node], buf: &mut BytesMut) -> Result<()> {
    let start = buf.len();
    buf.put_bytes(0, REPORT_BLOCK_LEN);

    for node in list {
        if let Node::Leaf { name, .. } = node {
            let value = node.num();
            match name.as_str() {
                "ssrc" => put_u32_at(buf, start, value as u32),
                // scaled into the 8-bit fixed point field, high bits
                // truncated by the field width
                "fraction" => buf[start + 4] = value.wrapping_mul(256) as u8,
                "lost" => {
                    let lost = value as u32 & 0x00ff_ffff;
                    buf[start + 5] = (lost >> 16) as u8;
                    buf[start + 6] = (lost >> 8) as u8;
                    buf[start + 7] = lost as u8;
                }
                "last_seq" => put_u32_at(buf, start + 8, value as u32),
                "jit" => put_u32_at(buf, start + 12, value as u32),
                "lsr" => put_u32_at(buf, start + 16, value as u32),
                "dlsr" => put_u32_at(buf, start + 20, value as u32),
                other => bail!("invalid RTCP RR type {}", other),
            }
        }
    }
    Ok(())
}

fn ntp_now() -> (u32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (
        (now.as_secs() as u32).wrapping_add(NTP_UNIX_OFFSET),
        usec_to_ntp_frac(now.subsec_micros()),
    )
}

/// Converts microseconds to a fraction of a second scaled by 2^32 (the
/// low word of an NTP timestamp) using the factorization
/// `2^32/10^6 = 4096 + 256 - 1825/32`. Maximum conversion error 3e-7.
fn usec_to_ntp_frac(usec: u32) -> u32 {
    let t = usec.wrapping_mul(1825) >> 5;
    (usec << 12).wrapping_add(usec << 8).wrapping_sub(t)
}
