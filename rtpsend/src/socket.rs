use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{anyhow, Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::{lookup_host, UdpSocket};

use crate::config::{Config, Destination};

/// Connects the two egress sockets: data traffic on the destination port,
/// control traffic on the port above it. The locked source port and the
/// router alert option come from the configuration.
pub async fn connect_pair(config: &Config) -> Result<[UdpSocket; 2]> {
    let addr = resolve(&config.destination).await?;
    let pair = [
        connect_to(config, addr, 0)?,
        connect_to(config, addr, 1)?,
    ];

    log::info!(
        "sending to {}:{} (data) and :{} (control)",
        addr,
        config.destination.port,
        config.destination.port.wrapping_add(1)
    );
    Ok(pair)
}

/// Name resolution is IPv4, like the wire format the tool speaks. The
/// wildcard address is not a destination; it falls back to loopback.
async fn resolve(destination: &Destination) -> Result<IpAddr> {
    let mut addrs = lookup_host((destination.host.as_str(), destination.port))
        .await
        .with_context(|| format!("cannot resolve {}", destination.host))?;

    let addr = addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow!("no IPv4 address for {}", destination.host))?;

    Ok(if addr.ip().is_unspecified() {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    } else {
        addr.ip()
    })
}

fn connect_to(config: &Config, addr: IpAddr, index: u16) -> Result<UdpSocket> {
    let remote = SocketAddr::new(addr, config.destination.port.wrapping_add(index));
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("cannot create socket")?;

    let local_port = match config.source_port {
        Some(port) => {
            socket.set_reuse_address(true)?;
            #[cfg(unix)]
            socket.set_reuse_port(true)?;
            port.wrapping_add(index)
        }
        None => 0,
    };
    socket
        .bind(&SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), local_port).into())
        .with_context(|| format!("cannot bind local port {}", local_port))?;

    if addr.is_multicast() {
        socket
            .set_multicast_ttl_v4(config.destination.ttl as u32)
            .context("IP_MULTICAST_TTL")?;
    }
    if config.alert {
        set_router_alert(&socket)?;
    }

    socket
        .connect(&remote.into())
        .with_context(|| format!("cannot connect to {}", remote))?;
    socket.set_nonblocking(true)?;

    Ok(UdpSocket::from_std(socket.into())?)
}

/// RFC 2113 router alert, the option bytes registered for RTP.
#[cfg(unix)]
fn set_router_alert(socket: &Socket) -> Result<()> {
    use std::os::fd::AsRawFd;

    const ALERT: [u8; 4] = [148, 4, 0, 1];

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_IP,
            libc::IP_OPTIONS,
            ALERT.as_ptr() as *const _,
            ALERT.len() as libc::socklen_t,
        )
    };
    anyhow::ensure!(
        ret == 0,
        "IP router alert option: {}",
        std::io::Error::last_os_error()
    );
    Ok(())
}

#[cfg(not(unix))]
fn set_router_alert(_socket: &Socket) -> Result<()> {
    log::warn!("IP router alert option not supported on this platform");
    Ok(())
}
