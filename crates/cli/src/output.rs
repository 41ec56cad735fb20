//! CLI output formatting utilities.

use std::time::Duration;

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
}

/// Format a duration the way humans read build times.
pub fn format_duration(d: Duration) -> String {
  let secs = d.as_secs_f64();
  if secs < 1.0 {
    format!("{}ms", d.as_millis())
  } else if secs < 60.0 {
    format!("{secs:.1}s")
  } else {
    format!("{}m {:02}s", d.as_secs() / 60, d.as_secs() % 60)
  }
}
