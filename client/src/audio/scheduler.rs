/// Playback buffer scheduling and mixing
///
/// Time is counted in output samples since the output stream started.
/// Every inbound speech buffer gets a start position; `render` mixes all
/// buffers that cover the current window into the device callback's slice.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// How inbound speech buffers are placed on the output timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Each buffer starts immediately; bursty delivery overlaps in the mix
    #[default]
    Overlap,
    /// Each buffer starts no earlier than the end of the previous one
    Fifo,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Overlap => write!(f, "overlap"),
            PlaybackMode::Fifo => write!(f, "fifo"),
        }
    }
}

impl FromStr for PlaybackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overlap" => Ok(PlaybackMode::Overlap),
            "fifo" => Ok(PlaybackMode::Fifo),
            other => Err(format!("unknown playback mode: {}", other)),
        }
    }
}

#[derive(Debug)]
struct ScheduledBuffer {
    start: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Mono mixer with start-time bookkeeping
#[derive(Debug)]
pub struct PlaybackScheduler {
    mode: PlaybackMode,
    /// Next sample position to render
    cursor: u64,
    /// End of the latest scheduled buffer
    scheduled_end: u64,
    active: VecDeque<ScheduledBuffer>,
}

impl PlaybackScheduler {
    /// Create a scheduler in the given mode
    pub fn new(mode: PlaybackMode) -> Self {
        Self {
            mode,
            cursor: 0,
            scheduled_end: 0,
            active: VecDeque::new(),
        }
    }

    /// Place a buffer on the timeline
    ///
    /// # Returns
    /// The sample position where the buffer starts playing
    pub fn schedule(&mut self, samples: Vec<f32>) -> u64 {
        let start = match self.mode {
            PlaybackMode::Overlap => self.cursor,
            PlaybackMode::Fifo => self.cursor.max(self.scheduled_end),
        };

        if samples.is_empty() {
            return start;
        }

        let buffer = ScheduledBuffer { start, samples };
        self.scheduled_end = self.scheduled_end.max(buffer.end());
        self.active.push_back(buffer);
        start
    }

    /// Mix the next `out.len()` samples into `out` and advance the cursor
    ///
    /// Positions with no scheduled audio are silent. The mix is clamped to
    /// [-1.0, 1.0].
    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);

        let window_start = self.cursor;
        let window_end = self.cursor + out.len() as u64;

        for buffer in &self.active {
            if buffer.start >= window_end || buffer.end() <= window_start {
                continue;
            }

            let from = buffer.start.max(window_start);
            let to = buffer.end().min(window_end);
            for pos in from..to {
                out[(pos - window_start) as usize] += buffer.samples[(pos - buffer.start) as usize];
            }
        }

        for sample in out.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.cursor = window_end;
        self.active.retain(|buffer| buffer.end() > window_end);
    }

    /// Number of buffers not yet fully played
    pub fn active_buffers(&self) -> usize {
        self.active.len()
    }

    /// Samples between the cursor and the end of the scheduled audio
    pub fn pending_samples(&self) -> u64 {
        self.scheduled_end.saturating_sub(self.cursor)
    }

    /// Whether nothing is left to play
    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    /// Current mode
    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Change the mode for subsequently scheduled buffers
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
    }

    /// Current render position
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
}
