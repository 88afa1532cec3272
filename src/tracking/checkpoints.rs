use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform integers for checkpoint and challenge selection.
pub trait RandomSource: Send {
    /// Returns a value in `[0, upper)`. Callers never pass zero.
    fn next_below(&mut self, upper: u64) -> u64;
}

/// Thread-local RNG; the default outside tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_below(&mut self, upper: u64) -> u64 {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Reproducible RNG for a given seed.
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_below(&mut self, upper: u64) -> u64 {
        self.rng.gen_range(0..upper)
    }
}

/// Replays a fixed list of draws (each reduced modulo `upper`). Once the list
/// runs out it counts upwards, so draw-until-distinct loops always finish.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    values: Vec<u64>,
    cursor: usize,
    fallback: u64,
}

impl ScriptedRandom {
    pub fn new(values: impl Into<Vec<u64>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
            fallback: 0,
        }
    }
}

impl RandomSource for ScriptedRandom {
    fn next_below(&mut self, upper: u64) -> u64 {
        if let Some(value) = self.values.get(self.cursor) {
            self.cursor += 1;
            return value % upper;
        }
        let value = self.fallback % upper;
        self.fallback = self.fallback.wrapping_add(1);
        value
    }
}

/// Draws up to `count` distinct whole-second offsets in
/// `[ceil(0.05 * duration), floor(0.95 * duration)]`, sorted ascending.
///
/// A non-finite or non-positive duration, or a window too narrow to hold a
/// single second, yields no checkpoints.
pub fn generate_checkpoints(
    duration_seconds: f64,
    count: usize,
    rng: &mut dyn RandomSource,
) -> Vec<u32> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return Vec::new();
    }

    // Offsets are whole seconds in u32; longer windows are cut at u32::MAX.
    let min = (duration_seconds * 0.05).ceil() as u64;
    let max = ((duration_seconds * 0.95).floor() as u64).min(u64::from(u32::MAX));
    if min > max {
        return Vec::new();
    }
    let possible = max - min + 1;
    let target = (count as u64).min(possible) as usize;

    let mut picked = BTreeSet::new();
    while picked.len() < target {
        if let Ok(offset) = u32::try_from(min + rng.next_below(possible)) {
            picked.insert(offset);
        }
    }

    picked.into_iter().collect()
}

pub fn pick_challenge_offset(checkpoints: &[u32], rng: &mut dyn RandomSource) -> Option<u32> {
    if checkpoints.is_empty() {
        return None;
    }
    let index = rng.next_below(checkpoints.len() as u64) as usize;
    checkpoints.get(index).copied()
}
