use std::fs::File;
use std::io::{stdin, BufRead, BufReader, Seek, SeekFrom, Stdin};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bytes::BytesMut;

/// Which of the two egress sockets a packet is sent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficKind {
    Data = 0,
    Control = 1,
}

/// One synthesized packet, buffered until its playout tick. The bytes
/// stay in the pacer's scratch buffer.
#[derive(Debug)]
pub struct Packet {
    pub len: usize,
    pub kind: TrafficKind,
    pub time: Duration,
}

enum Input {
    File(BufReader<File>),
    Stdin(Stdin),
}

/// Reassembles logical script lines: `#` comments are dropped and a line
/// starting with whitespace continues the previous one. The head line of
/// the next description is held back between calls.
pub struct ScriptReader {
    input: Input,
    held: String,
}

impl ScriptReader {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let input = match path {
            Some(path) => Input::File(BufReader::new(
                File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
            )),
            None => Input::Stdin(stdin()),
        };
        Ok(Self {
            input,
            held: String::new(),
        })
    }

    /// Whether the input can be replayed from the start (stdin cannot).
    pub fn can_rewind(&self) -> bool {
        matches!(self.input, Input::File(_))
    }

    pub fn rewind(&mut self) -> Result<()> {
        if let Input::File(reader) = &mut self.input {
            reader.seek(SeekFrom::Start(0))?;
        }
        self.held.clear();
        Ok(())
    }

    /// The next logical line, `None` at end of input.
    pub fn next_line(&mut self) -> Option<String> {
        let mut text = std::mem::take(&mut self.held);
        let mut line = String::new();

        loop {
            line.clear();
            if self.read_raw(&mut line) == 0 {
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            if !text.is_empty() && !line.starts_with(char::is_whitespace) {
                self.held.push_str(&line);
                break;
            }
            text.push_str(&line);
        }

        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn read_raw(&mut self, line: &mut String) -> usize {
        let read = match &mut self.input {
            Input::File(reader) => reader.read_line(line),
            Input::Stdin(stdin) => stdin.read_line(line),
        };
        match read {
            Ok(read) => read,
            // a mid-run read failure ends the script like EOF would
            Err(err) => {
                log::warn!("script read error: {}", err);
                0
            }
        }
    }
}

/// Synthesizes the packet described by one logical line into `scratch`,
/// returning its playout time and traffic class.
pub fn generate(text: &str, scratch: &mut BytesMut) -> Result<Packet> {
    let (stamp, rest) = split_token(text);
    let Some(time) = parse_time(stamp) else {
        bail!("line {{{}}} is invalid", text.trim_end());
    };

    let (kind, params) = split_token(rest);
    match kind {
        "RTP" => {
            let len = rtp::encode(params, scratch);
            Ok(Packet {
                len,
                kind: TrafficKind::Data,
                time,
            })
        }
        "RTCP" => {
            scratch.clear();
            let len = rtcp::compound(params, scratch)?;
            Ok(Packet {
                len,
                kind: TrafficKind::Control,
                time,
            })
        }
        "" => bail!("line {{{}}} is invalid", text.trim_end()),
        other => bail!("type {} is not supported", other),
    }
}

/// Splits the first whitespace-delimited token off `text`.
fn split_token(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], &text[at..]),
        None => (text, ""),
    }
}

/// Playout stamps are `<sec>.<usec>`, two plain integers.
fn parse_time(stamp: &str) -> Option<Duration> {
    let (sec, usec) = stamp.split_once('.')?;
    let sec: u64 = sec.parse().ok()?;
    let usec: u64 = usec.parse().ok()?;
    Duration::from_secs(sec).checked_add(Duration::from_micros(usec))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use bytes::BytesMut;

    use super::{generate, ScriptReader, TrafficKind};

    fn reader(tag: &str, content: &str) -> (std::path::PathBuf, ScriptReader) {
        let path = std::env::temp_dir().join(format!(
            "rtpsend-script-{}-{}.txt",
            std::process::id(),
            tag
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        (path.clone(), ScriptReader::open(Some(&path)).unwrap())
    }

    #[test]
    fn comments_are_dropped_and_continuations_joined() {
        let (path, mut reader) =
            reader("framer", "# intro\n0.0 RTP seq=1\n ts=5\n# middle\n0.1 RTP seq=2\n");

        assert_eq!(reader.next_line().unwrap(), "0.0 RTP seq=1\n ts=5\n");
        assert_eq!(reader.next_line().unwrap(), "0.1 RTP seq=2\n");
        assert!(reader.next_line().is_none());

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rewind_restarts_from_the_first_line() {
        let (path, mut reader) = reader("rewind", "0.0 RTP seq=1\n0.1 RTP seq=2\n");

        assert!(reader.next_line().is_some());
        assert!(reader.next_line().is_some());
        assert!(reader.next_line().is_none());

        reader.rewind().unwrap();
        assert_eq!(reader.next_line().unwrap(), "0.0 RTP seq=1\n");

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rtp_lines_go_to_the_data_socket() {
        let mut scratch = BytesMut::new();
        let packet = generate("0.020000 RTP seq=1\n", &mut scratch).unwrap();

        assert_eq!(packet.kind, TrafficKind::Data);
        assert_eq!(packet.time, Duration::from_millis(20));
        assert_eq!(packet.len, 12);
    }

    #[test]
    fn rtcp_lines_go_to_the_control_socket() {
        let mut scratch = BytesMut::new();
        let packet = generate("5.000000 RTCP (BYE (ssrc=0xdeadbeef))\n", &mut scratch).unwrap();

        assert_eq!(packet.kind, TrafficKind::Control);
        assert_eq!(packet.time, Duration::from_secs(5));
        assert_eq!(packet.len, 8);
    }

    #[test]
    fn the_microsecond_field_is_a_plain_integer() {
        let mut scratch = BytesMut::new();
        let packet = generate("1.5 RTP seq=1", &mut scratch).unwrap();
        assert_eq!(packet.time, Duration::new(1, 5_000));
    }

    #[test]
    fn bad_stamps_and_unknown_types_are_fatal() {
        let mut scratch = BytesMut::new();
        assert!(generate("zero RTP seq=1", &mut scratch).is_err());
        assert!(generate("0 RTP seq=1", &mut scratch).is_err());
        assert!(generate("0.0 SRTP seq=1", &mut scratch).is_err());
        assert!(generate("0.0", &mut scratch).is_err());
    }
}
