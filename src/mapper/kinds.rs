//! Classification of AAF objects for the timeline mapper.

use interchange::TrackKind;

use crate::core::{class, datadef, opdef, pid};
use crate::graph::ObjectRef;
use crate::util::Auid;

/// Component variants the mapper distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Sequence,
    SourceClip,
    Filler,
    Transition,
    OperationGroup,
    Timecode,
    /// CommentMarker or DescriptiveMarker.
    Marker,
    /// Anything else, including vendor classes.
    Other,
}

impl ComponentKind {
    pub fn of(obj: &ObjectRef<'_>) -> Self {
        // most derived first: markers are events, source clips are references
        if obj.is_a(class::COMMENT_MARKER) {
            Self::Marker
        } else if obj.is_a(class::SOURCE_CLIP) {
            Self::SourceClip
        } else if obj.is_a(class::SEQUENCE) {
            Self::Sequence
        } else if obj.is_a(class::FILLER) {
            Self::Filler
        } else if obj.is_a(class::TRANSITION) {
            Self::Transition
        } else if obj.is_a(class::OPERATION_GROUP) {
            Self::OperationGroup
        } else if obj.is_a(class::TIMECODE) {
            Self::Timecode
        } else {
            Self::Other
        }
    }
}

/// Mob roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MobKind {
    Composition,
    Master,
    Source,
    Other,
}

impl MobKind {
    pub fn of(obj: &ObjectRef<'_>) -> Self {
        if obj.is_a(class::COMPOSITION_MOB) {
            Self::Composition
        } else if obj.is_a(class::MASTER_MOB) {
            Self::Master
        } else if obj.is_a(class::SOURCE_MOB) {
            Self::Source
        } else {
            Self::Other
        }
    }
}

/// Track kind of a data definition.
pub fn track_kind(data_def: Option<Auid>) -> TrackKind {
    match data_def {
        Some(d) if datadef::is_picture(d) => TrackKind::Video,
        Some(d) if datadef::is_sound(d) => TrackKind::Audio,
        _ => TrackKind::Other,
    }
}

/// Data definition written for a track kind.
pub fn data_definition(kind: TrackKind) -> Auid {
    match kind {
        TrackKind::Video => datadef::PICTURE,
        TrackKind::Audio => datadef::SOUND,
        TrackKind::Other => datadef::AUXILIARY,
    }
}

/// Dissolve operation matching a track kind.
pub fn dissolve_for(kind: TrackKind) -> Auid {
    match kind {
        TrackKind::Audio => opdef::MONO_AUDIO_DISSOLVE,
        _ => opdef::VIDEO_DISSOLVE,
    }
}

/// Data definition of a component.
pub fn component_data_def(obj: &ObjectRef<'_>) -> Option<Auid> {
    obj.weak_auid(pid::DATA_DEFINITION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_kind() {
        assert_eq!(track_kind(Some(datadef::PICTURE)), TrackKind::Video);
        assert_eq!(track_kind(Some(datadef::LEGACY_SOUND)), TrackKind::Audio);
        assert_eq!(track_kind(Some(datadef::TIMECODE)), TrackKind::Other);
        assert_eq!(track_kind(None), TrackKind::Other);
        for k in [TrackKind::Video, TrackKind::Audio, TrackKind::Other] {
            assert_eq!(track_kind(Some(data_definition(k))), k);
        }
    }
}
