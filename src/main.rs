use std::io::{self, BufReader};

use tokio::runtime::Handle;
use tracing::info;

use roomkeeper::config::Settings;
use roomkeeper::shell::Shell;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let settings = Settings::from_env()?;
    roomkeeper::observability::init(settings.metrics_port)?;

    info!("roomkeeper starting");
    info!("  grace period: {:?}", settings.grace_period);
    info!("  occupancy threshold: {}", settings.occupancy_threshold);
    info!(
        "  metrics: {}",
        settings
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let mut shell = Shell::new(settings, Handle::current())?;

    // The shell blocks on stdin; keep it off the async workers that run releases.
    tokio::task::spawn_blocking(move || {
        let stdin = BufReader::new(io::stdin());
        let mut stdout = io::stdout();
        shell.run(stdin, &mut stdout)
    })
    .await??;

    info!("roomkeeper stopped");
    Ok(())
}
