//! ## RTP packet synthesis
//!
//! Builds RTP data packets (RFC 3550 section 5.1) from the textual
//! descriptions used in traffic scripts. A description is a flat list of
//! `parameter=value` tokens naming header fields, the CSRC list, the
//! header extension and the hex payload:
//!
//! ```text
//! v=2 p=0 x=0 cc=0 m=0 pt=0 seq=1 ts=0 ssrc=0xdeadbeef data=0a0b
//! ```
//!
//! ### RTP Fixed Header Fields
//!
//! ```bash
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |                           timestamp                           |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!  |           synchronization source (SSRC) identifier            |
//!  +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//!  |            contributing source (CSRC) identifiers             |
//!  |                             ....                              |
//!  +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Fields default to zero (version to two) and may be given in any order,
//! with one contract inherited from the script grammar: the extension
//! tokens address the buffer at `12 + 4*cc`, and `data=` lands after the
//! extension, so `cc=` and `ext_len=` must carry their final values before
//! the tokens that depend on them. A description violating the contract
//! yields a malformed packet, not an error.

pub mod hex;

use bytes::BytesMut;

const VERSION_MASK: u8 = 0b11000000;
const PADDING_MASK: u8 = 0b00100000;
const EXTENSION_MASK: u8 = 0b00010000;
const CSRC_COUNT_MASK: u8 = 0b00001111;
const MARKER_MASK: u8 = 0b10000000;
const PAYLOAD_KIND_MASK: u8 = 0b01111111;

pub const RTP_VERSION: u8 = 2;

/// Fixed header bytes before the CSRC list.
pub const FIXED_HEADER_LEN: usize = 12;

/// Largest datagram the encoder will produce.
pub const MAX_PACKET: usize = 1500;

const MAX_CSRC: usize = 16;

/// Encodes the RTP packet described by `text` into `buf`, replacing its
/// contents, and returns the packet length. Unknown tokens are ignored;
/// `len=` overrides the computed length.
///
/// # Unit Test
///
/// ```
/// use bytes::BytesMut;
///
/// let mut buf = BytesMut::new();
/// let len = rtp::encode(
///     "v=2 p=0 x=0 cc=0 m=0 pt=96 seq=1 ts=0 ssrc=0x11223344 data=AA",
///     &mut buf,
/// );
///
/// assert_eq!(len, 13);
/// assert_eq!(&buf[..], &[
///     0x80, 0x60, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x11, 0x22,
///     0x33, 0x44, 0xAA
/// ]);
/// ```
#[rustfmt::skip]
pub fn encode(text: &str, buf: &mut BytesMut) -> usize {
    buf.clear();
    buf.resize(MAX_PACKET, 0);
    buf[0] = RTP_VERSION << 6;

    let mut cc = 0;         // CSRC count as known so far
    let mut high_csrc = 0;  // count implied by csrcN= slots
    let mut payload = 0;    // payload bytes written by data=
    let mut ext = 0;        // extension bytes (header plus words)
    let mut length = 0;     // explicit len= override

    for word in text.split_ascii_whitespace() {
        let (key, text_value) = match word.split_once('=') {
            Some((key, value)) => (key, value),
            None => (word, ""),
        };

        let value = parse_num(text_value);
        match key {
            "v" => buf[0] = (buf[0] & !VERSION_MASK) | ((value as u8 & 0b11) << 6),
            "p" => buf[0] = set_bit(buf[0], PADDING_MASK, value != 0),
            "x" => buf[0] = set_bit(buf[0], EXTENSION_MASK, value & 1 != 0),
            "cc" => {
                cc = value as usize & 0b1111;
                buf[0] = (buf[0] & !CSRC_COUNT_MASK) | cc as u8;
            }
            "m" => buf[1] = set_bit(buf[1], MARKER_MASK, value & 1 != 0),
            "pt" => buf[1] = (buf[1] & !PAYLOAD_KIND_MASK) | (value as u8 & PAYLOAD_KIND_MASK),
            "seq" => buf[2..4].copy_from_slice(&(value as u16).to_be_bytes()),
            "ts" => buf[4..8].copy_from_slice(&(value as u32).to_be_bytes()),
            "ssrc" => buf[8..12].copy_from_slice(&(value as u32).to_be_bytes()),
            "ext_type" => {
                let at = FIXED_HEADER_LEN + 4 * cc;
                buf[at..at + 2].copy_from_slice(&(value as u16).to_be_bytes());
                ext += 4;
            }
            "ext_len" => {
                let at = FIXED_HEADER_LEN + 4 * cc + 2;
                buf[at..at + 2].copy_from_slice(&(value as u16).to_be_bytes());
                ext += 4 * value as usize;
            }
            "ext_data" => {
                let at = (FIXED_HEADER_LEN + 4 * cc + 4).min(MAX_PACKET);
                hex::decode(text_value, &mut buf[at..]);
            }
            "data" => {
                let at = (FIXED_HEADER_LEN + 4 * cc + ext).min(MAX_PACKET);
                payload = hex::decode(text_value, &mut buf[at..]);
            }
            "len" => length = value as usize,
            _ if key.starts_with("csrc") => {
                if let Ok(slot) = key[4..].parse::<usize>() {
                    if slot < MAX_CSRC {
                        let at = FIXED_HEADER_LEN + 4 * slot;
                        buf[at..at + 4].copy_from_slice(&(value as u32).to_be_bytes());
                        high_csrc = high_csrc.max(slot + 1);
                    }
                }
            }
            _ => {}
        }
    }

    if cc == 0 && high_csrc > 0 {
        // CC is a four-bit field
        cc = high_csrc.min(0b1111);
        buf[0] = (buf[0] & !CSRC_COUNT_MASK) | cc as u8;
    }
    if length == 0 {
        length = FIXED_HEADER_LEN + 4 * cc + payload + ext;
    }

    let length = length.min(MAX_PACKET);
    buf.truncate(length);
    length
}

fn set_bit(byte: u8, mask: u8, on: bool) -> u8 {
    if on {
        byte | mask
    } else {
        byte & !mask
    }
}

/// Numeric token values follow the strtoul conventions: `0x` prefix for
/// hexadecimal, leading `0` for octal, decimal otherwise. Parsing stops at
/// the first invalid character.
fn parse_num(text: &str) -> u64 {
    let text = text.trim_start();
    let (digits, radix) = if let Some(rest) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        (rest, 16)
    } else if text.starts_with('0') {
        (text, 8)
    } else {
        (text, 10)
    };

    let mut value: u64 = 0;
    for ch in digits.chars() {
        match ch.to_digit(radix) {
            Some(digit) => value = value.wrapping_mul(radix as u64).wrapping_add(digit as u64),
            None => break,
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    #[test]
    fn defaults_to_version_two_and_zeroed_fields() {
        let mut buf = BytesMut::new();
        let len = super::encode("pt=0 seq=0x1234 ts=0xcafebabe ssrc=0x1", &mut buf);

        assert_eq!(len, 12);
        assert_eq!(
            &buf[..],
            &[0x80, 0x00, 0x12, 0x34, 0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn csrc_slots_imply_the_count_field() {
        let mut buf = BytesMut::new();
        let len = super::encode("seq=1 csrc0=0x10 csrc2=0x30", &mut buf);

        // highest slot is 2, so three CSRC words are claimed
        assert_eq!(len, 24);
        assert_eq!(buf[0] & 0x0f, 3);
        assert_eq!(&buf[12..16], &[0x00, 0x00, 0x00, 0x10]);
        assert_eq!(&buf[20..24], &[0x00, 0x00, 0x00, 0x30]);
    }

    #[test]
    fn explicit_cc_wins_over_csrc_slots() {
        let mut buf = BytesMut::new();
        super::encode("cc=1 csrc0=0x10 csrc2=0x30", &mut buf);
        assert_eq!(buf[0] & 0x0f, 1);
    }

    #[test]
    fn out_of_range_csrc_slots_are_dropped() {
        let mut buf = BytesMut::new();
        let len = super::encode("seq=1 csrc16=0x10", &mut buf);
        assert_eq!(len, 12);
        assert_eq!(buf[0] & 0x0f, 0);
    }

    #[test]
    fn extension_header_and_payload_layout() {
        let mut buf = BytesMut::new();
        let len = super::encode(
            "x=1 seq=1 ext_type=0xBEDE ext_len=1 ext_data=11223344 data=AA",
            &mut buf,
        );

        assert_eq!(len, 21);
        assert_eq!(buf[0], 0x90);
        assert_eq!(&buf[12..14], &[0xBE, 0xDE]);
        assert_eq!(&buf[14..16], &[0x00, 0x01]);
        assert_eq!(&buf[16..20], &[0x11, 0x22, 0x33, 0x44]);
        assert_eq!(buf[20], 0xAA);
    }

    #[test]
    fn len_token_overrides_the_computed_length() {
        let mut buf = BytesMut::new();
        assert_eq!(super::encode("seq=1 len=64", &mut buf), 64);
        assert_eq!(buf.len(), 64);
    }

    #[test]
    fn marker_and_payload_type_share_a_byte() {
        let mut buf = BytesMut::new();
        super::encode("m=1 pt=0x7f", &mut buf);
        assert_eq!(buf[1], 0xFF);
    }

    #[test]
    fn numbers_accept_hex_octal_and_decimal() {
        assert_eq!(super::parse_num("0x1f"), 31);
        assert_eq!(super::parse_num("017"), 15);
        assert_eq!(super::parse_num("17"), 17);
        assert_eq!(super::parse_num(""), 0);
        assert_eq!(super::parse_num("12junk"), 12);
    }
}
