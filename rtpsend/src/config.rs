use std::path::PathBuf;
use std::process;
use std::str::FromStr;

use anyhow::{anyhow, ensure, Context};
use clap::{Parser, ValueEnum};

/// Time to live applied to multicast destinations when the address
/// argument carries none.
pub const DEFAULT_TTL: u8 = 16;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
        }
    }
}

/// Where the generated traffic goes: `host/port[/ttl]`. Data packets use
/// `port`, control packets `port + 1`.
#[derive(Debug, Clone)]
pub struct Destination {
    pub host: String,
    pub port: u16,
    pub ttl: u8,
}

impl FromStr for Destination {
    type Err = anyhow::Error;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut fields = spec.split('/');

        let host = fields
            .next()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| anyhow!("missing host in {}", spec))?
            .to_string();
        let port = fields
            .next()
            .ok_or_else(|| anyhow!("missing port in {}", spec))?
            .parse()
            .with_context(|| format!("bad port in {}", spec))?;
        let ttl = match fields.next() {
            Some(ttl) => ttl.parse().with_context(|| format!("bad ttl in {}", spec))?,
            None => DEFAULT_TTL,
        };
        ensure!(fields.next().is_none(), "trailing fields in {}", spec);

        Ok(Self { host, port, ttl })
    }
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Config {
    /// read the script from a file instead of stdin
    #[arg(short = 'f', long = "file")]
    pub file: Option<PathBuf>,

    /// set the IP router alert option on outgoing packets
    #[arg(short = 'a', long = "alert")]
    pub alert: bool,

    /// rewind the script file on end of input (ignored for stdin)
    #[arg(short = 'l', long = "loop")]
    pub looping: bool,

    /// lock the local source ports, PORT for data and PORT+1 for control
    #[arg(short = 's', long = "source", value_name = "PORT")]
    pub source_port: Option<u16>,

    /// echo each script line to stdout before it is sent
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// log level
    #[arg(short = 'd', long = "debug", value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// destination address, host/port[/ttl]
    #[arg(value_name = "address/port[/ttl]")]
    pub destination: Destination,
}

impl Config {
    /// Parse the command line. Help and version requests print and leave
    /// with status 0; bad arguments leave with status 1.
    pub fn load() -> Self {
        match Self::try_parse() {
            Ok(config) => config,
            Err(err) => {
                let code = if err.use_stderr() { 1 } else { 0 };
                let _ = err.print();
                process::exit(code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Destination;

    #[test]
    fn destination_spec_fields() {
        let dest: Destination = "224.2.0.1/3456/31".parse().unwrap();
        assert_eq!(dest.host, "224.2.0.1");
        assert_eq!(dest.port, 3456);
        assert_eq!(dest.ttl, 31);
    }

    #[test]
    fn ttl_defaults_to_sixteen() {
        let dest: Destination = "example.net/9000".parse().unwrap();
        assert_eq!(dest.ttl, 16);
    }

    #[test]
    fn malformed_specs_are_rejected() {
        assert!("".parse::<Destination>().is_err());
        assert!("/9000".parse::<Destination>().is_err());
        assert!("host".parse::<Destination>().is_err());
        assert!("host/notaport".parse::<Destination>().is_err());
        assert!("host/9000/16/junk".parse::<Destination>().is_err());
    }
}
