//! Timelines, tracks and collections.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Item, Marker, Metadata, Rational, RationalTime, TimeRange};

/// Media kind carried by a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// An ordered sequence of items sharing one edit rate.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    pub name: String,
    pub kind: TrackKind,
    pub edit_rate: Rational,
    pub items: Vec<Item>,
    pub markers: Vec<Marker>,
    pub metadata: Metadata,
}

impl Track {
    pub fn new(name: impl Into<String>, kind: TrackKind, edit_rate: Rational) -> Self {
        Self {
            name: name.into(),
            kind,
            edit_rate,
            items: Vec::new(),
            markers: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Append an item.
    pub fn push(&mut self, item: impl Into<Item>) -> &mut Self {
        self.items.push(item.into());
        self
    }

    /// Total track length at the track's edit rate.
    pub fn duration(&self) -> RationalTime {
        self.items.iter().fold(RationalTime::zero(self.edit_rate), |acc, item| {
            acc.add(item.track_duration())
        })
    }

    /// Total track length, or `None` if the sum overflows.
    pub fn checked_duration(&self) -> Option<RationalTime> {
        self.items
            .iter()
            .try_fold(RationalTime::zero(self.edit_rate), |acc, item| acc.checked_add(item.track_duration()))
    }

    /// Range of every item in track time.
    ///
    /// Non-transition items are laid end to end. A transition gets the range
    /// `[cut - in_offset, cut + out_offset)` around the cut it sits on.
    pub fn item_ranges(&self) -> Vec<TimeRange> {
        let mut cursor = RationalTime::zero(self.edit_rate);
        let mut out = Vec::with_capacity(self.items.len());
        for item in &self.items {
            match item {
                Item::Transition(t) => {
                    let start = cursor.sub(t.in_offset);
                    out.push(TimeRange::new(start, t.duration().rescaled_to(self.edit_rate)));
                }
                other => {
                    let dur = other.track_duration().rescaled_to(self.edit_rate);
                    out.push(TimeRange::new(cursor, dur));
                    cursor = cursor.add(dur);
                }
            }
        }
        out
    }
}

/// A top-level composition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timeline {
    pub name: String,
    pub rate: Rational,
    pub global_start_time: Option<RationalTime>,
    pub tracks: Vec<Track>,
    pub markers: Vec<Marker>,
    pub metadata: Metadata,
}

impl Timeline {
    pub fn new(name: impl Into<String>, rate: Rational) -> Self {
        Self {
            name: name.into(),
            rate,
            global_start_time: None,
            tracks: Vec::new(),
            markers: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    /// Longest track duration, at the timeline rate.
    pub fn duration(&self) -> RationalTime {
        self.tracks
            .iter()
            .map(|t| t.duration().rescaled_to(self.rate))
            .max_by_key(|t| t.value)
            .unwrap_or(RationalTime::zero(self.rate))
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Video)
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(|t| t.kind == TrackKind::Audio)
    }
}

/// A named group of timelines.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Collection {
    pub name: String,
    pub timelines: Vec<Timeline>,
    pub metadata: Metadata,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timelines: Vec::new(),
            metadata: Metadata::new(),
        }
    }
}

/// Anything a reader can produce or a writer can consume.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SerializableObject {
    Timeline(Timeline),
    Collection(Collection),
}

impl SerializableObject {
    /// All timelines, in order.
    pub fn timelines(&self) -> Vec<&Timeline> {
        match self {
            Self::Timeline(t) => vec![t],
            Self::Collection(c) => c.timelines.iter().collect(),
        }
    }

    pub fn into_timeline(self) -> Option<Timeline> {
        match self {
            Self::Timeline(t) => Some(t),
            Self::Collection(c) => c.timelines.into_iter().next(),
        }
    }
}

impl From<Timeline> for SerializableObject {
    fn from(t: Timeline) -> Self {
        Self::Timeline(t)
    }
}

impl From<Collection> for SerializableObject {
    fn from(c: Collection) -> Self {
        Self::Collection(c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clip, Gap, Transition};

    fn fps24() -> Rational {
        Rational::whole(24)
    }

    #[test]
    fn test_track_ranges_with_transition() {
        let mut track = Track::new("V1", TrackKind::Video, fps24());
        track.push(Clip::new("a", TimeRange::from_units(0, 48, fps24())));
        track.push(Transition::dissolve(
            RationalTime::new(12, fps24()),
            RationalTime::new(12, fps24()),
        ));
        track.push(Clip::new("b", TimeRange::from_units(100, 48, fps24())));
        track.push(Gap::new(RationalTime::new(10, fps24())));

        let ranges = track.item_ranges();
        assert_eq!(ranges[0], TimeRange::from_units(0, 48, fps24()));
        assert_eq!(ranges[1], TimeRange::from_units(36, 24, fps24()));
        assert_eq!(ranges[2], TimeRange::from_units(48, 48, fps24()));
        assert_eq!(ranges[3], TimeRange::from_units(96, 10, fps24()));
        assert_eq!(track.duration().value, 106);
    }

    #[test]
    fn test_timeline_duration() {
        let mut tl = Timeline::new("edit", fps24());
        let mut v = Track::new("V1", TrackKind::Video, fps24());
        v.push(Gap::new(RationalTime::new(24, fps24())));
        let mut a = Track::new("A1", TrackKind::Audio, Rational::whole(48000));
        a.push(Gap::new(RationalTime::new(96000, Rational::whole(48000))));
        tl.tracks.push(v);
        tl.tracks.push(a);
        assert_eq!(tl.duration().value, 48);
        assert_eq!(tl.video_tracks().count(), 1);
    }
}
