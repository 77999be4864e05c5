pub mod config;
pub mod pacer;
pub mod script;
pub mod socket;

use anyhow::Result;

use self::{config::Config, pacer::Pacer, script::ScriptReader};

/// Opens the script and connects the egress sockets, returning the pacer
/// ready to run. Kept apart from the binary so integration tests can
/// start the sender in-process.
pub async fn startup(config: &Config) -> Result<Pacer> {
    let reader = ScriptReader::open(config.file.as_deref())?;
    let sockets = socket::connect_pair(config).await?;

    // a non-seekable input cannot loop
    let looping = config.looping && reader.can_rewind();
    Ok(Pacer::new(sockets, reader, looping, config.verbose))
}
