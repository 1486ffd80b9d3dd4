//! Ordered frame list with blink playback.
//!
//! The sequencer does not own a timer. The host schedules ticks (a
//! `gloo_timers::callback::Interval` in the web frontend) and hands back the
//! [`BlinkToken`] it received from [`FrameSequencer::blink_start`]. Ticks
//! carrying a token other than the live one are ignored, so at most one blink
//! advances the sequence at any time.

use std::time::Duration;

use crate::frame::Frame;

/// Handle identifying one blink run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlinkToken(u64);

#[derive(Debug, Clone, Copy)]
struct Blink {
    token: BlinkToken,
    interval: Duration,
}

/// Ordered frames and the index of the one on display.
#[derive(Debug, Default)]
pub struct FrameSequencer {
    frames: Vec<Frame>,
    current: usize,
    blink: Option<Blink>,
    next_token: u64,
}

impl FrameSequencer {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            current: 0,
            blink: None,
            next_token: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> Option<&Frame> {
        self.frames.get(self.current)
    }

    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn frame_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Move to the next frame, wrapping. Returns the new index.
    pub fn advance(&mut self) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.frames.len();
        Some(self.current)
    }

    /// Move to the previous frame, wrapping. Returns the new index.
    pub fn previous(&mut self) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }
        let len = self.frames.len();
        self.current = (self.current + len - 1) % len;
        Some(self.current)
    }

    /// Jump to a frame. Out of range indices are rejected.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.frames.len() {
            log::debug!("select: frame {index} out of range ({} frames)", self.frames.len());
            return false;
        }
        self.current = index;
        true
    }

    /// Start blinking at `interval`, replacing any running blink.
    pub fn blink_start(&mut self, interval: Duration) -> BlinkToken {
        if let Some(previous) = self.blink.take() {
            log::debug!("blink {:?} superseded", previous.token);
        }
        self.next_token += 1;
        let token = BlinkToken(self.next_token);
        self.blink = Some(Blink { token, interval });
        log::info!("blink started every {} ms", interval.as_millis());
        token
    }

    /// Advance for a tick of the live blink. Stale tokens do nothing.
    pub fn blink_tick(&mut self, token: BlinkToken) -> Option<usize> {
        match self.blink {
            Some(blink) if blink.token == token => self.advance(),
            _ => None,
        }
    }

    /// Stop the running blink, if any. Returns whether one was running.
    pub fn blink_stop(&mut self) -> bool {
        match self.blink.take() {
            Some(_) => {
                log::info!("blink stopped on frame {}", self.current);
                true
            }
            None => false,
        }
    }

    pub fn is_blinking(&self) -> bool {
        self.blink.is_some()
    }

    /// Interval of the running blink.
    pub fn blink_interval(&self) -> Option<Duration> {
        self.blink.map(|b| b.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameInfo;

    fn frames(n: usize) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                Frame::new(
                    i,
                    FrameInfo {
                        frame_id: format!("frame-{i}"),
                        url: None,
                        width: 64,
                        height: 64,
                        candidates: Vec::new(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_advance_wraps() {
        let mut seq = FrameSequencer::new(frames(3));
        assert_eq!(seq.advance(), Some(1));
        assert_eq!(seq.advance(), Some(2));
        assert_eq!(seq.advance(), Some(0));
        assert_eq!(seq.previous(), Some(2));
    }

    #[test]
    fn test_empty_sequencer() {
        let mut seq = FrameSequencer::default();
        assert_eq!(seq.advance(), None);
        assert_eq!(seq.previous(), None);
        assert!(!seq.select(0));
        let token = seq.blink_start(Duration::from_millis(500));
        assert_eq!(seq.blink_tick(token), None);
    }

    #[test]
    fn test_select() {
        let mut seq = FrameSequencer::new(frames(4));
        assert!(seq.select(2));
        assert_eq!(seq.current().unwrap().frame_id(), "frame-2");
        assert!(!seq.select(4));
        assert_eq!(seq.current_index(), 2);
    }

    #[test]
    fn test_new_blink_supersedes_old() {
        let mut seq = FrameSequencer::new(frames(4));
        let first = seq.blink_start(Duration::from_millis(500));
        let second = seq.blink_start(Duration::from_millis(250));
        assert_ne!(first, second);
        assert_eq!(seq.blink_tick(first), None);
        assert_eq!(seq.blink_tick(second), Some(1));
        assert_eq!(seq.blink_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_stop_without_blink() {
        let mut seq = FrameSequencer::new(frames(2));
        assert!(!seq.blink_stop());
        assert!(!seq.is_blinking());
    }
}
