// THEORY:
// A color class is a name ("red", "blue", ...) plus the closed HSV box(es) a pixel
// must fall inside to belong to it. Most classes need one box. Red needs two,
// because its hues straddle the wrap point of the hue circle.
//
// The `ColorTable` is the validated, read-only view of the configured classes. It
// is built once at startup; a class whose intervals are malformed is logged and
// left out, which makes every later lookup of that class behave like an unknown
// class (an all-zero mask) instead of a failure.

use crate::core_modules::pixel::pixel::{HUE_MAX, HsvPixel};
use crate::error::RescueError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Most intervals a single class may own.
pub const MAX_INTERVALS_PER_CLASS: usize = 2;

/// A closed `[low, high]` box in 8-bit HSV space, stored as `[h, s, v]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvInterval {
    pub low: [u8; 3],
    pub high: [u8; 3],
}

impl HsvInterval {
    pub const fn new(low: [u8; 3], high: [u8; 3]) -> Self {
        Self { low, high }
    }

    /// Inclusive on both ends, like `inRange`.
    #[inline]
    pub fn contains(&self, pixel: HsvPixel) -> bool {
        let channels = [pixel.hue, pixel.saturation, pixel.value];
        channels
            .iter()
            .zip(self.low.iter().zip(self.high.iter()))
            .all(|(c, (lo, hi))| lo <= c && c <= hi)
    }

    fn validate(&self, class: &str) -> Result<(), RescueError> {
        for (channel, (lo, hi)) in ["H", "S", "V"].iter().zip(self.low.iter().zip(self.high.iter())) {
            if lo > hi {
                return Err(RescueError::InvalidColorRange {
                    class: class.to_string(),
                    reason: format!("{channel} min {lo} exceeds max {hi}"),
                });
            }
        }
        if self.high[0] > HUE_MAX {
            return Err(RescueError::InvalidColorRange {
                class: class.to_string(),
                reason: format!("hue max {} is outside 0..={HUE_MAX}", self.high[0]),
            });
        }
        Ok(())
    }
}

/// A named class and its one or two intervals.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorClass {
    pub name: String,
    intervals: Vec<HsvInterval>,
}

impl ColorClass {
    pub fn new(name: &str, intervals: Vec<HsvInterval>) -> Result<Self, RescueError> {
        if intervals.is_empty() || intervals.len() > MAX_INTERVALS_PER_CLASS {
            return Err(RescueError::InvalidColorRange {
                class: name.to_string(),
                reason: format!(
                    "expected 1 to {MAX_INTERVALS_PER_CLASS} intervals, found {}",
                    intervals.len()
                ),
            });
        }
        for interval in &intervals {
            interval.validate(name)?;
        }
        Ok(Self { name: name.to_string(), intervals })
    }

    pub fn intervals(&self) -> &[HsvInterval] {
        &self.intervals
    }

    /// True when the pixel falls inside ANY of the class's intervals.
    #[inline]
    pub fn matches(&self, pixel: HsvPixel) -> bool {
        self.intervals.iter().any(|interval| interval.contains(pixel))
    }
}

/// All usable color classes, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ColorTable {
    classes: BTreeMap<String, ColorClass>,
}

impl ColorTable {
    /// Builds the table, dropping (and logging) every malformed class.
    pub fn from_config(ranges: &BTreeMap<String, Vec<HsvInterval>>) -> Self {
        let mut classes = BTreeMap::new();
        for (name, intervals) in ranges {
            match ColorClass::new(name, intervals.clone()) {
                Ok(class) => {
                    classes.insert(name.clone(), class);
                }
                Err(err) => warn!(%err, "color class disabled"),
            }
        }
        Self { classes }
    }

    pub fn get(&self, name: &str) -> Option<&ColorClass> {
        self.classes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}
