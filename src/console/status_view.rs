use itertools::Itertools;

use crate::{channel::Channel, event_log::EventLog, session::Session};

/// One screen worth of session state for the `status` command.
pub fn render_status<C: Channel>(session: &Session<C>) -> String {
    let telemetry = session.telemetry();
    let battery = session.battery();
    let control = session.control();

    let direction = control
        .active_direction()
        .map(|d| d.to_string())
        .unwrap_or_else(|| "none".to_string());
    let hazard = match session.interlock().latched_kind() {
        Some(kind) => format!("{} (latched)", kind),
        None => "clear".to_string(),
    };
    let frame = match session.current_frame() {
        Some(frame) => format!("#{} {:?}, {} bytes", frame.seq, frame.kind, frame.data.len()),
        None => "none".to_string(),
    };

    [
        format!("link:       {}", telemetry.connection),
        format!(
            "battery:    {}% {:.2}V ({}, ~{}h left)",
            battery.percent,
            battery.volts(),
            battery.level,
            battery.estimated_runtime_hours()
        ),
        format!(
            "wifi:       {}",
            if telemetry.wifi_present { "up" } else { "down" }
        ),
        format!(
            "cpu:        {:.0}% ({})",
            telemetry.cpu_load_percent,
            telemetry.cpu_load_level()
        ),
        format!("drive:      {}", control.drive_mode()),
        format!("perception: {}", control.perception_mode()),
        format!("direction:  {}", direction),
        format!("speed:      {}%", control.speed_percent()),
        format!("hazard:     {}", hazard),
        format!("frame:      {}", frame),
    ]
    .iter()
    .join("\n")
}

pub fn render_log(log: &EventLog) -> String {
    if log.is_empty() {
        return "event log is empty".to_string();
    }
    log.entries()
        .map(|entry| format!("[{:>4}] {:<5} {}", entry.seq, entry.level, entry.message))
        .join("\n")
}
