// monitor.rs

use crate::bridge::Bridge;
use crate::midi::{Message, MidiEngine};
use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn create_message_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("MIDI");
    pb
}

pub fn format_message(message: &Message, at: DateTime<Local>) -> String {
    format!("{} {}", at.format("%H:%M:%S%.3f"), message)
}

/// Host-style polling loop: drains the bridge the way a plugin host would
/// once per frame, printing each message.
pub struct Monitor<E: MidiEngine> {
    bridge: Arc<Bridge<E>>,
    spinner: ProgressBar,
    received: u64,
}

impl<E: MidiEngine> Monitor<E> {
    pub fn new(bridge: Arc<Bridge<E>>) -> Self {
        Monitor {
            bridge,
            spinner: create_message_spinner(),
            received: 0,
        }
    }

    /// Replaces the spinner, e.g. with a hidden one.
    pub fn with_spinner(mut self, spinner: ProgressBar) -> Self {
        self.spinner = spinner;
        self
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    /// Drains every queued message, returning the lines printed.
    pub fn poll_once(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(message) = self.bridge.try_dequeue_incoming() {
            let line = format_message(&message, Local::now());
            self.spinner.suspend(|| println!("{}", line));
            lines.push(line);
            self.received += 1;
        }

        self.spinner.set_message(format!(
            "{} sources, {} messages received",
            self.bridge.count_sources(),
            self.received
        ));
        self.spinner.tick();
        lines
    }

    pub fn run(&mut self) {
        info!("Monitoring incoming MIDI every {:?}", DEFAULT_POLL_INTERVAL);
        loop {
            self.poll_once();
            thread::sleep(DEFAULT_POLL_INTERVAL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MockMidiEngine;
    use chrono::TimeZone;

    #[test]
    fn test_format_message() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let message = Message::new(0x1A, 0x90, 0x40, 0x7F);
        assert_eq!(format_message(&message, at), "12:30:05.000 (1A) 90 40 7F");
    }

    #[test]
    fn test_poll_once_drains_queue() {
        let engine = MockMidiEngine::with_devices(&["Keys"], &[]);
        let bridge = Arc::new(Bridge::new(engine.clone()));
        let mut monitor = Monitor::new(bridge.clone()).with_spinner(ProgressBar::hidden());

        assert_eq!(bridge.count_sources(), 1);
        engine.emit("Keys", &[0x90, 0x40, 0x7F, 0x80, 0x40, 0x00]);

        let lines = monitor.poll_once();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("90 40 7F"));
        assert!(lines[1].ends_with("80 40 00"));
        assert_eq!(monitor.received(), 2);
        assert!(monitor.poll_once().is_empty());
    }
}
