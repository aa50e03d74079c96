//! Test-pattern video source
//!
//! Produces moving character-art frames in place of camera capture so a
//! session has outgoing video without any capture hardware.

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use asciichat_runtime::{SessionHandle, StopHandle};

/// Brightness ramp, darkest first
const RAMP: &[u8] = b" .:-=+*#%@";

/// Diagonal bands that drift one column per frame
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u16,
    height: u16,
    tick: u64,
}

impl TestPattern {
    /// Character cells are roughly twice as tall as wide, hence the height
    pub fn new(width: u16) -> Self {
        Self {
            width,
            height: (width / 3).max(10),
            tick: 0,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn next_frame(&mut self) -> String {
        let width = usize::from(self.width);
        let height = usize::from(self.height);
        let offset = (self.tick % RAMP.len() as u64) as usize;
        self.tick = self.tick.wrapping_add(1);

        let mut frame = String::with_capacity((width + 1) * height);
        for row in 0..height {
            if row > 0 {
                frame.push('\n');
            }
            frame.extend((0..width).map(|col| {
                let band = (row + col + RAMP.len() - offset) / 2 % RAMP.len();
                char::from(RAMP[band])
            }));
        }
        frame
    }
}

/// Push frames into the session at `fps` until `stop` fires
pub async fn run_test_pattern(
    handle: SessionHandle,
    mut pattern: TestPattern,
    fps: u32,
    stop: StopHandle,
) {
    let period = Duration::from_secs(1) / fps.max(1);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        width = pattern.width(),
        height = pattern.height(),
        fps,
        "Test pattern started"
    );

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => {
                if !handle.is_running() {
                    break;
                }
                handle.push_frame(pattern.next_frame());
            }
        }
    }

    debug!("Test pattern stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_dimensions() {
        let mut pattern = TestPattern::new(40);
        let frame = pattern.next_frame();
        let lines: Vec<&str> = frame.lines().collect();

        assert_eq!(lines.len(), usize::from(pattern.height()));
        assert!(lines.iter().all(|line| line.chars().count() == 40));
        assert!(!frame.ends_with('\n'));
    }

    #[test]
    fn test_frames_move() {
        let mut pattern = TestPattern::new(60);
        let first = pattern.next_frame();
        let second = pattern.next_frame();
        assert_ne!(first, second);
        assert!(first.bytes().all(|b| b == b'\n' || RAMP.contains(&b)));
    }

    #[test]
    fn test_minimum_height() {
        assert_eq!(TestPattern::new(40).height(), 13);
        assert_eq!(TestPattern::new(20).height(), 10);
        assert_eq!(TestPattern::new(300).height(), 100);
    }
}
