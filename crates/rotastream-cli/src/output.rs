//! Event output on stderr

use colored::Colorize;
use rotastream::RotatorEvent;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global flag for JSON output mode
static JSON_MODE: AtomicBool = AtomicBool::new(false);

/// Enable or disable JSON output mode
pub fn set_json_mode(enabled: bool) {
    JSON_MODE.store(enabled, Ordering::SeqCst);
}

/// Check if JSON output mode is enabled
pub fn is_json_mode() -> bool {
    JSON_MODE.load(Ordering::SeqCst)
}

/// One line describing an event, colored by severity
pub fn format_event(event: &RotatorEvent) -> String {
    let label = match event {
        RotatorEvent::Open { .. } | RotatorEvent::RotatedOn { .. } => event.name().green(),
        RotatorEvent::RotatedOff { .. } => event.name().cyan(),
        RotatorEvent::Error { fatal: true, .. } => event.name().red().bold(),
        RotatorEvent::Error { .. } => event.name().yellow(),
        RotatorEvent::Drain | RotatorEvent::Pipe { .. } | RotatorEvent::Close => event.name().dimmed(),
    };

    let detail = match event {
        RotatorEvent::Open { path }
        | RotatorEvent::RotatedOn { path }
        | RotatorEvent::RotatedOff { path } => path.display().to_string(),
        RotatorEvent::Pipe { source } => source.clone(),
        RotatorEvent::Error { message, .. } => message.clone(),
        RotatorEvent::Drain | RotatorEvent::Close => String::new(),
    };

    if detail.is_empty() {
        format!("[rotastream] {}", label)
    } else {
        format!("[rotastream] {} {}", label, detail)
    }
}

pub fn print_event(event: &RotatorEvent) {
    if is_json_mode() {
        match serde_json::to_string(event) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Error serializing to JSON: {}", e),
        }
        return;
    }
    eprintln!("{}", format_event(event));
}
