//! The ordered weather list and its insertion rule.

use crate::{coordinate::Coordinate, model::WeatherEntry};

/// Where [`WeatherList::insert`] put a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// Placed at index 0 as the current-location entry.
    PinnedCurrent,
    /// Appended at the given index.
    Appended(usize),
    /// Same place name as the entry at index 0; dropped.
    DroppedEcho,
}

/// Weather rows in display order.
///
/// Index 0 holds the current-location entry once one has arrived; everything
/// else is in arrival order.
#[derive(Debug, Clone, Default)]
pub struct WeatherList {
    entries: Vec<WeatherEntry>,
    pinned_current: bool,
}

impl WeatherList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[WeatherEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the row fetched for the saved city `coord`, skipping a pinned current entry.
    pub fn position_of_city(&self, coord: &Coordinate) -> Option<usize> {
        let skip = usize::from(self.pinned_current);
        self.entries
            .iter()
            .skip(skip)
            .position(|entry| entry.is_place(coord))
            .map(|index| index + skip)
    }

    /// True while index 0 is the current-location entry.
    pub fn has_current_entry(&self) -> bool {
        self.pinned_current
    }

    /// Insert `entry` given the device coordinate, if location access produced one.
    pub fn insert(&mut self, entry: WeatherEntry, device: Option<Coordinate>) -> Insertion {
        let Some(here) = device else {
            return self.append(entry);
        };

        if self
            .entries
            .first()
            .is_some_and(|first| first.record.place_name == entry.record.place_name)
        {
            return Insertion::DroppedEcho;
        }

        if entry.is_place(&here) {
            self.entries.insert(0, entry);
            self.pinned_current = true;
            return Insertion::PinnedCurrent;
        }

        self.append(entry)
    }

    pub fn remove(&mut self, index: usize) -> Option<WeatherEntry> {
        if index >= self.entries.len() {
            return None;
        }
        if index == 0 {
            self.pinned_current = false;
        }
        Some(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pinned_current = false;
    }

    fn append(&mut self, entry: WeatherEntry) -> Insertion {
        self.entries.push(entry);
        Insertion::Appended(self.entries.len() - 1)
    }
}
