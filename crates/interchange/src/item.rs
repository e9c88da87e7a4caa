//! Items that populate a track.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Metadata, MetadataValue, Rational, RationalTime, TimeRange, Track};

/// A marker on a clip, track, nested composition or timeline.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Marker {
    pub name: String,
    /// Range in the owner's time space (source time for clips).
    pub marked_range: TimeRange,
    pub color: Option<String>,
    pub metadata: Metadata,
}

impl Marker {
    pub fn new(name: impl Into<String>, marked_range: TimeRange) -> Self {
        Self {
            name: name.into(),
            marked_range,
            color: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Description of the media a clip plays.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MediaReference {
    pub name: String,
    pub available_range: Option<TimeRange>,
    pub metadata: Metadata,
}

impl MediaReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            available_range: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_available_range(mut self, range: TimeRange) -> Self {
        self.available_range = Some(range);
        self
    }
}

/// Effect applied to a clip.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Effect {
    /// Constant playback speed change.
    LinearTimeWarp { time_scalar: Rational },
}

/// A clip of media.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Clip {
    pub name: String,
    /// Trimmed range in source time; the duration is the time the clip occupies in its track.
    pub source_range: TimeRange,
    pub media_reference: Option<MediaReference>,
    pub effects: Vec<Effect>,
    pub markers: Vec<Marker>,
    pub metadata: Metadata,
}

impl Clip {
    pub fn new(name: impl Into<String>, source_range: TimeRange) -> Self {
        Self {
            name: name.into(),
            source_range,
            media_reference: None,
            effects: Vec::new(),
            markers: Vec::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_media(mut self, media: MediaReference) -> Self {
        self.media_reference = Some(media);
        self
    }

    /// Speed factor of the first linear time warp, if any.
    pub fn time_scalar(&self) -> Option<Rational> {
        self.effects.iter().map(|e| match e {
            Effect::LinearTimeWarp { time_scalar } => *time_scalar,
        }).next()
    }
}

/// Empty space in a track.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Gap {
    pub duration: RationalTime,
    pub metadata: Metadata,
}

impl Gap {
    pub fn new(duration: RationalTime) -> Self {
        Self {
            duration,
            metadata: Metadata::new(),
        }
    }
}

/// Transition family.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TransitionType {
    SmpteDissolve,
    Custom(String),
}

/// A transition centred on the cut between its two neighbours.
///
/// It occupies no track time of its own: `in_offset` reaches back into the
/// outgoing item and `out_offset` forward into the incoming one.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transition {
    pub name: String,
    pub transition_type: TransitionType,
    pub in_offset: RationalTime,
    pub out_offset: RationalTime,
    pub metadata: Metadata,
}

impl Transition {
    pub fn dissolve(in_offset: RationalTime, out_offset: RationalTime) -> Self {
        Self {
            name: String::new(),
            transition_type: TransitionType::SmpteDissolve,
            in_offset,
            out_offset,
            metadata: Metadata::new(),
        }
    }

    /// Total overlap length.
    pub fn duration(&self) -> RationalTime {
        self.in_offset.add(self.out_offset)
    }
}

/// A composition used as an item of another composition.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Nested {
    pub name: String,
    /// Range of the nested composition that is used.
    pub source_range: TimeRange,
    pub tracks: Vec<Track>,
    pub markers: Vec<Marker>,
    pub metadata: Metadata,
}

impl Nested {
    pub fn new(name: impl Into<String>, source_range: TimeRange) -> Self {
        Self {
            name: name.into(),
            source_range,
            tracks: Vec::new(),
            markers: Vec::new(),
            metadata: Metadata::new(),
        }
    }
}

/// An item the producer could not interpret, carried verbatim.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OpaqueItem {
    /// Producer-specific kind name.
    pub kind: String,
    pub duration: RationalTime,
    /// Producer-specific preserved content.
    pub payload: MetadataValue,
    pub metadata: Metadata,
}

/// An entry in a track.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Item {
    Clip(Clip),
    Gap(Gap),
    Transition(Transition),
    Nested(Nested),
    Opaque(OpaqueItem),
}

impl Item {
    /// Short name of the variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Clip(_) => "Clip",
            Self::Gap(_) => "Gap",
            Self::Transition(_) => "Transition",
            Self::Nested(_) => "Nested",
            Self::Opaque(_) => "Opaque",
        }
    }

    /// Time the item occupies in its track. Transitions occupy none.
    pub fn track_duration(&self) -> RationalTime {
        match self {
            Self::Clip(c) => c.source_range.duration,
            Self::Gap(g) => g.duration,
            Self::Transition(t) => RationalTime::zero(t.in_offset.rate),
            Self::Nested(n) => n.source_range.duration,
            Self::Opaque(o) => o.duration,
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Transition(_))
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Self::Clip(c) => &c.metadata,
            Self::Gap(g) => &g.metadata,
            Self::Transition(t) => &t.metadata,
            Self::Nested(n) => &n.metadata,
            Self::Opaque(o) => &o.metadata,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        match self {
            Self::Clip(c) => &mut c.metadata,
            Self::Gap(g) => &mut g.metadata,
            Self::Transition(t) => &mut t.metadata,
            Self::Nested(n) => &mut n.metadata,
            Self::Opaque(o) => &mut o.metadata,
        }
    }
}

impl From<Clip> for Item {
    fn from(v: Clip) -> Self {
        Self::Clip(v)
    }
}

impl From<Gap> for Item {
    fn from(v: Gap) -> Self {
        Self::Gap(v)
    }
}

impl From<Transition> for Item {
    fn from(v: Transition) -> Self {
        Self::Transition(v)
    }
}

impl From<Nested> for Item {
    fn from(v: Nested) -> Self {
        Self::Nested(v)
    }
}

impl From<OpaqueItem> for Item {
    fn from(v: OpaqueItem) -> Self {
        Self::Opaque(v)
    }
}
