use std::net::SocketAddr;

use crate::shell::Command;

// ── Reservation lifecycle ───────────────────────────────────────

/// Counter: reservations accepted.
pub const RESERVATIONS_BOOKED_TOTAL: &str = "roomkeeper_reservations_booked_total";

/// Counter: bookings rejected for overlapping an active reservation.
pub const BOOKING_CONFLICTS_TOTAL: &str = "roomkeeper_booking_conflicts_total";

/// Counter: reservations removed by explicit cancellation.
pub const RESERVATIONS_CANCELLED_TOTAL: &str = "roomkeeper_reservations_cancelled_total";

/// Counter: reservations withdrawn by the release scheduler.
pub const AUTO_RELEASES_TOTAL: &str = "roomkeeper_auto_releases_total";

/// Counter: pending releases cancelled because the room became occupied.
pub const RELEASES_DISARMED_TOTAL: &str = "roomkeeper_releases_disarmed_total";

/// Gauge: release tasks currently waiting out their grace period.
pub const PENDING_RELEASES: &str = "roomkeeper_pending_releases";

// ── Shell ───────────────────────────────────────────────────────

/// Counter: shell commands executed. Labels: command, status.
pub const COMMANDS_TOTAL: &str = "roomkeeper_commands_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::Configure { .. } => "configure",
        Command::SetCapacity { .. } => "set_capacity",
        Command::Resize { .. } => "resize",
        Command::Rooms => "rooms",
        Command::Book { .. } => "book",
        Command::Cancel { .. } => "cancel",
        Command::Occupy { .. } => "occupy",
        Command::Show { .. } => "show",
        Command::All => "all",
        Command::Occupancy { .. } => "occupancy",
        Command::Export => "export",
        Command::History => "history",
        Command::Help => "help",
        Command::Exit => "exit",
    }
}
