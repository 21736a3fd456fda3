pub mod progress;

pub use progress::{format_bytes, format_duration, format_eta, format_speed, format_stats};
