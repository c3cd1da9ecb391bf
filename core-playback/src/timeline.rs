//! # Section Timeline
//!
//! Ordered, cumulative-duration view of a book's narration sections, built
//! from the metadata ranges embedded in the manifest.
//!
//! ```text
//! index     0 (sentinel)   1            2          ...
//! end_time  0.0            d1           d1 + d2    ...
//! ```
//!
//! A point `t` belongs to the first entry whose `end_time >= t`, so a
//! boundary resolves to the section that ends there and `t <= 0` resolves to
//! the sentinel ("before any section"). Navigation therefore lands
//! `boundary_epsilon` past a boundary.
//!
//! Timelines are immutable; the engine publishes a fresh one per manifest.

use crate::models::Section;
use serde::{Deserialize, Serialize};

/// One metadata range as parsed from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionRange {
    pub section_id: i64,
    pub duration: f64,
    pub playback_order: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionTimeline {
    entries: Vec<Section>,
}

impl SectionTimeline {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort `ranges` by playback order and accumulate end times.
    ///
    /// Without ranges the timeline stays empty (no sentinel) and every
    /// lookup answers `None`.
    pub fn build(ranges: impl IntoIterator<Item = SectionRange>) -> Self {
        let mut ranges: Vec<SectionRange> = ranges.into_iter().collect();
        if ranges.is_empty() {
            return Self::empty();
        }
        ranges.sort_by_key(|range| range.playback_order);

        let mut entries = Vec::with_capacity(ranges.len() + 1);
        entries.push(Section::sentinel());

        let mut end_time = 0.0;
        for range in ranges {
            let duration = if range.duration.is_finite() {
                range.duration.max(0.0)
            } else {
                0.0
            };
            end_time += duration;
            entries.push(Section {
                section_id: range.section_id,
                duration,
                playback_order: range.playback_order,
                end_time,
            });
        }

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, sentinel first.
    pub fn entries(&self) -> &[Section] {
        &self.entries
    }

    /// Real sections only.
    pub fn sections(&self) -> &[Section] {
        self.entries.get(1..).unwrap_or(&[])
    }

    pub fn total_duration(&self) -> f64 {
        self.entries.last().map_or(0.0, |entry| entry.end_time)
    }

    /// Index of the entry active at `t`. `None` before the first section and
    /// past the end.
    pub fn lookup(&self, t: f64) -> Option<usize> {
        let index = self.entries.partition_point(|entry| entry.end_time < t);
        if index == 0 || index >= self.entries.len() {
            None
        } else {
            Some(index)
        }
    }

    pub fn section_at(&self, t: f64) -> Option<&Section> {
        self.lookup(t).map(|index| &self.entries[index])
    }

    /// Global time at which the entry at `index` starts.
    pub fn section_start(&self, index: usize) -> Option<f64> {
        if index == 0 || index >= self.entries.len() {
            return None;
        }
        Some(self.entries[index - 1].end_time)
    }

    /// Seconds into the active section.
    pub fn section_progress(&self, t: f64) -> f64 {
        match self.navigation_index(t).and_then(|index| self.section_start(index)) {
            Some(start) => (t - start).max(0.0),
            None => t.max(0.0),
        }
    }

    /// Where `next` should land from `t`; `None` in the last section.
    pub fn next_target(&self, t: f64, epsilon: f64) -> Option<f64> {
        let index = self.navigation_index(t)?;
        if index + 1 >= self.entries.len() {
            return None;
        }
        Some((self.entries[index].end_time + epsilon).min(self.total_duration()))
    }

    /// Where `previous` should land from `t`: just inside the section before
    /// the active one, or the very start from the first section.
    pub fn previous_target(&self, t: f64, epsilon: f64) -> Option<f64> {
        let index = self.navigation_index(t)?;
        if index < 2 {
            return Some(0.0);
        }
        Some(self.entries[index - 2].end_time + epsilon)
    }

    // Like `lookup`, but the start of the book counts as the first section
    // and anything past the end as the last one.
    fn navigation_index(&self, t: f64) -> Option<usize> {
        if self.entries.len() < 2 {
            return None;
        }
        match self.lookup(t) {
            Some(index) => Some(index),
            None if t <= 0.0 => Some(1),
            None => Some(self.entries.len() - 1),
        }
    }
}
