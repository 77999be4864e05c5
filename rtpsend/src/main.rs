use std::process;

use rtpsend::config::Config;

/// Exit status: 0 for a clean end of script, 1 for setup failures, 2 for
/// protocol errors in the script.
#[tokio::main]
async fn main() {
    let config = Config::load();
    if let Err(err) = simple_logger::init_with_level(config.log_level.as_level()) {
        eprintln!("{}", err);
        process::exit(1);
    }

    let pacer = match rtpsend::startup(&config).await {
        Ok(pacer) => pacer,
        Err(err) => {
            log::error!("{:#}", err);
            process::exit(1);
        }
    };

    if let Err(err) = pacer.run().await {
        log::error!("{:#}", err);
        process::exit(2);
    }
}
