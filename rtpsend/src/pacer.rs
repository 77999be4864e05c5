use std::time::Duration;

use anyhow::Result;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tokio::time::{sleep_until, Instant};

use crate::script::{generate, Packet, ScriptReader};

/// Plays a script out in real time. One cooperative loop owns the
/// sockets, the reader and a single scratch buffer; each tick sends the
/// packet buffered on the previous one, synthesizes the next line and
/// sleeps until its playout instant.
///
/// Script times translate to wall-clock instants by a base offset latched
/// on the first packet, so drift never accumulates beyond timer and
/// syscall latency. A stamp behind the clock is sent immediately with a
/// warning. At end of input the loop either rewinds (re-anchoring the
/// base, so the replay paces like the first pass) or returns.
pub struct Pacer {
    sockets: [UdpSocket; 2],
    reader: ScriptReader,
    scratch: BytesMut,
    looping: bool,
    verbose: bool,
}

impl Pacer {
    pub fn new(sockets: [UdpSocket; 2], reader: ScriptReader, looping: bool, verbose: bool) -> Self {
        Self {
            sockets,
            reader,
            scratch: BytesMut::with_capacity(rtp::MAX_PACKET),
            looping,
            verbose,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut pending: Option<Packet> = None;
        let mut anchor: Option<(Instant, Duration)> = None;
        let mut produced = false;

        loop {
            if let Some(packet) = pending.take() {
                if packet.len > 0 {
                    let socket = &self.sockets[packet.kind as usize];
                    if let Err(err) = socket.send(&self.scratch[..packet.len]).await {
                        log::warn!("send failed: {}", err);
                    }
                }
            }

            let Some(text) = self.reader.next_line() else {
                // an input without a single description has nothing to
                // replay
                if self.looping && produced {
                    self.reader.rewind()?;
                    anchor = None;
                    produced = false;
                    log::info!("rewound input file");
                    continue;
                }
                return Ok(());
            };
            produced = true;

            if self.verbose {
                print!("{}", text);
            }
            let packet = generate(&text, &mut self.scratch)?;

            let now = Instant::now();
            let (base, first) = *anchor.get_or_insert((now, packet.time));
            let target = packet
                .time
                .checked_sub(first)
                .and_then(|offset| base.checked_add(offset));
            let target = match target {
                Some(target) if target >= now => target,
                _ => {
                    log::warn!(
                        "non-monotonic time {}.{} - sent immediately",
                        packet.time.as_secs(),
                        packet.time.subsec_micros()
                    );
                    now
                }
            };

            sleep_until(target).await;
            pending = Some(packet);
        }
    }
}
