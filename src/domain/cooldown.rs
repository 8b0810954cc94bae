//! Per-(instrument, strategy) signal cooldown.
//!
//! Owned by the caller's run context. Detectors stay stateless; the engine
//! asks the tracker before evaluating an instrument and records each entry it
//! actually opens.

use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct CooldownTracker {
    bars: usize,
    last_entry: HashMap<(String, String), usize>,
}

impl CooldownTracker {
    pub fn new(bars: usize) -> Self {
        Self {
            bars,
            last_entry: HashMap::new(),
        }
    }

    /// True while fewer than `bars` steps have passed since the last entry.
    pub fn is_cooling(&self, instrument: &str, strategy: &str, step: usize) -> bool {
        if self.bars == 0 {
            return false;
        }
        self.last_entry
            .get(&(instrument.to_string(), strategy.to_string()))
            .is_some_and(|&last| step < last + self.bars)
    }

    pub fn record(&mut self, instrument: &str, strategy: &str, step: usize) {
        self.last_entry
            .insert((instrument.to_string(), strategy.to_string()), step);
    }
}
