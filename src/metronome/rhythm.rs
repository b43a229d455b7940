//! Rhythm model: tempo plus metrical grouping.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Slowest tempo `set_tempo` accepts.
pub const MIN_BPM: u32 = 30;
/// Fastest tempo `set_tempo` accepts.
pub const MAX_BPM: u32 = 350;
/// Most beats a single group may hold.
pub const MAX_GROUP_BEATS: i32 = 16;
/// Groups below this count get an empty trailing group to edit.
const EDITABLE_GROUPS: usize = 4;

/// Tempo and beat grouping of a rhythm.
///
/// `divisions` splits the bar into groups; `[3, 2, 2]` is a 7-beat meter
/// grouped 3 + 2 + 2. Only the first beat of each group is accented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmModel {
    pub bpm: u32,
    pub divisions: Vec<i32>,
}

impl Default for RhythmModel {
    fn default() -> Self {
        Self {
            bpm: 120,
            divisions: vec![1, 0],
        }
    }
}

impl RhythmModel {
    pub fn new(bpm: u32, divisions: Vec<i32>) -> Result<Self, EngineError> {
        let model = Self { bpm, divisions };
        model.validate()?;
        Ok(model)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.bpm == 0 {
            return Err(EngineError::BpmInvalid { bpm: self.bpm });
        }
        Ok(())
    }

    pub fn emphasis_pattern(&self) -> Vec<bool> {
        emphasis_pattern(&self.divisions)
    }

    /// Set the tempo, clamped to [`MIN_BPM`]..=[`MAX_BPM`].
    pub fn set_tempo(&mut self, bpm: u32) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Set the number of beats in `group`.
    ///
    /// The first group keeps at least one beat and no group holds more than
    /// [`MAX_GROUP_BEATS`]. Groups after the first empty one are dropped, and
    /// while there are fewer than four groups an empty one is kept at the
    /// end for the next edit. Returns false if `group` does not exist.
    pub fn set_subdivisions(&mut self, group: usize, beats: i32) -> bool {
        if group >= self.divisions.len() {
            return false;
        }

        let min = if group == 0 { 1 } else { 0 };
        self.divisions[group] = beats.clamp(min, MAX_GROUP_BEATS);

        if let Some(first_empty) = self.divisions.iter().position(|&b| b == 0) {
            self.divisions.truncate(first_empty + 1);
        }
        if self.divisions.len() < EDITABLE_GROUPS && self.divisions.last() != Some(&0) {
            self.divisions.push(0);
        }
        true
    }

    /// Number of beats before the accent pattern repeats.
    pub fn beats_per_cycle(&self) -> usize {
        self.emphasis_pattern().len()
    }
}

/// Expand groupings to one flag per beat, `true` on each group's first beat.
///
/// Groups of zero or fewer beats are dropped. An empty result becomes
/// `[true]` so every beat is accented.
///
/// ```
/// use metronome_player::metronome::emphasis_pattern;
/// let pattern = emphasis_pattern(&[4, 2, 3]);
/// assert_eq!(
///     pattern,
///     [true, false, false, false, true, false, true, false, false]
/// );
/// ```
pub fn emphasis_pattern(divisions: &[i32]) -> Vec<bool> {
    let pattern: Vec<bool> = divisions
        .iter()
        .filter(|&&beats| beats > 0)
        .flat_map(|&beats| (0..beats).map(|beat| beat == 0))
        .collect();

    if pattern.is_empty() {
        vec![true]
    } else {
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rhythm() {
        let rhythm = RhythmModel::default();
        assert_eq!(rhythm.bpm, 120);
        assert_eq!(rhythm.emphasis_pattern(), vec![true]);
    }

    #[test]
    fn test_emphasis_pattern_groups() {
        assert_eq!(
            emphasis_pattern(&[3, 2, 2, 0]),
            vec![true, false, false, true, false, true, false]
        );
        assert_eq!(emphasis_pattern(&[1, 1]), vec![true, true]);
    }

    #[test]
    fn test_emphasis_pattern_drops_non_positive_groups() {
        assert_eq!(emphasis_pattern(&[0, -3, 2]), vec![true, false]);
        assert_eq!(emphasis_pattern(&[]), vec![true]);
        assert_eq!(emphasis_pattern(&[0, -1]), vec![true]);
    }

    #[test]
    fn test_zero_bpm_is_invalid() {
        assert!(matches!(
            RhythmModel::new(0, vec![4]),
            Err(EngineError::BpmInvalid { bpm: 0 })
        ));
        assert_eq!(RhythmModel::new(90, vec![4]).unwrap().beats_per_cycle(), 4);
    }

    #[test]
    fn test_set_tempo_clamps() {
        let mut rhythm = RhythmModel::default();
        rhythm.set_tempo(10);
        assert_eq!(rhythm.bpm, MIN_BPM);
        rhythm.set_tempo(400);
        assert_eq!(rhythm.bpm, MAX_BPM);
        rhythm.set_tempo(96);
        assert_eq!(rhythm.bpm, 96);
    }

    #[test]
    fn test_set_subdivisions_grows_groups() {
        let mut rhythm = RhythmModel::default();
        assert!(rhythm.set_subdivisions(1, 3));
        assert_eq!(rhythm.divisions, vec![1, 3, 0]);
        assert!(rhythm.set_subdivisions(2, 2));
        assert_eq!(rhythm.divisions, vec![1, 3, 2, 0]);
        assert!(rhythm.set_subdivisions(3, 4));
        assert_eq!(rhythm.divisions, vec![1, 3, 2, 4], "no empty group past four");
    }

    #[test]
    fn test_set_subdivisions_clamps_beats() {
        let mut rhythm = RhythmModel::default();
        rhythm.set_subdivisions(0, 0);
        assert_eq!(rhythm.divisions, vec![1, 0], "first group keeps one beat");
        rhythm.set_subdivisions(0, 40);
        assert_eq!(rhythm.divisions, vec![16, 0]);
        rhythm.set_subdivisions(1, -2);
        assert_eq!(rhythm.divisions, vec![16, 0]);
    }

    #[test]
    fn test_set_subdivisions_cuts_after_empty_group() {
        let mut rhythm = RhythmModel::new(120, vec![4, 2, 3, 0]).unwrap();
        assert!(rhythm.set_subdivisions(1, 0));
        assert_eq!(rhythm.divisions, vec![4, 0]);
        assert!(!rhythm.set_subdivisions(2, 3), "group no longer exists");
        assert_eq!(rhythm.divisions, vec![4, 0]);
    }

    #[test]
    fn test_rhythm_json() {
        let rhythm: RhythmModel = serde_json::from_str(r#"{"bpm": 96}"#).unwrap();
        assert_eq!(rhythm.bpm, 96);
        assert_eq!(rhythm.divisions, vec![1, 0]);
    }
}
