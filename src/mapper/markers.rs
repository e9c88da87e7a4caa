//! Markers carried by EventMobSlots.
//!
//! Each marker is a CommentMarker or DescriptiveMarker on an EventMobSlot.
//! `DescribedSlots` names the timeline slots it annotates; a marker without
//! it belongs to the whole composition.

use interchange::{Clip, Item, Marker, Rational, RationalTime, TimeRange, Track};
use tracing::{trace, warn};

use super::kinds::ComponentKind;
use super::metadata::{read_metadata, tagged_values, write_attribute, write_metadata};
use crate::core::{class, datadef, pid, Value};
use crate::facade::MetadataEncoding;
use crate::graph::{definition_ref, GraphBuilder, ObjectRef};
use crate::util::Result;

/// Attribute holding a marker's color.
pub const COLOR_ATTRIBUTE: &str = "_ATN_CRM_COLOR";

/// A marker read from an event slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotMarker {
    /// Slot ids it describes; empty for composition markers.
    pub described: Vec<u32>,
    pub marker: Marker,
}

pub(super) fn read_marker(obj: &ObjectRef<'_>, rate: Rational) -> SlotMarker {
    let position = obj.i64(pid::POSITION).unwrap_or(0);
    let length = obj.i64(pid::LENGTH).unwrap_or(0);
    let mut marker = Marker::new(
        obj.string(pid::COMMENT).unwrap_or_default(),
        TimeRange::from_units(position, length, rate),
    );
    marker.metadata = read_metadata(obj);
    marker.metadata.remove(COLOR_ATTRIBUTE);
    marker.color = tagged_values(obj, pid::COMPONENT_ATTRIBUTES)
        .into_iter()
        .find(|(name, _)| *name == COLOR_ATTRIBUTE)
        .and_then(|(_, v)| v.as_string());
    let described = match obj.data(pid::DESCRIBED_SLOTS) {
        Some(Value::UInt32Array(ids)) => ids.clone(),
        _ => Vec::new(),
    };
    SlotMarker { described, marker }
}

/// Markers of an EventMobSlot, in slot order.
pub fn read_event_slot(slot: &ObjectRef<'_>) -> Vec<SlotMarker> {
    let Some(rate) = slot.rational(pid::EVENT_EDIT_RATE) else {
        return Vec::new();
    };
    let Some(segment) = slot.strong(pid::SEGMENT) else {
        return Vec::new();
    };
    let components = match ComponentKind::of(&segment) {
        ComponentKind::Sequence => segment.strong_vec(pid::COMPONENTS),
        _ => vec![segment],
    };
    let mut out = Vec::new();
    for c in components {
        if ComponentKind::of(&c) == ComponentKind::Marker {
            out.push(read_marker(&c, rate));
        } else {
            trace!(component = ?c, "event slot component skipped");
        }
    }
    out
}

/// Write `markers` as an EventMobSlot of `mob`, describing `described` slots.
///
/// Ranges are rescaled to `rate`, the slot's edit rate.
pub fn write_event_slot(
    b: &mut GraphBuilder,
    mob: usize,
    slot_id: u32,
    rate: Rational,
    described: Option<u32>,
    markers: &[Marker],
    enc: MetadataEncoding,
) -> Result<()> {
    let slot = b.add(class::EVENT_MOB_SLOT)?;
    b.set(slot, pid::SLOT_ID, slot_id)?;
    b.set(slot, pid::EVENT_EDIT_RATE, rate)?;

    let seq = b.add(class::SEQUENCE)?;
    let data_def = definition_ref(pid::DATA_DEFINITIONS, datadef::DESCRIPTIVE_METADATA);
    b.set_weak(seq, pid::DATA_DEFINITION, data_def.clone())?;
    for m in markers {
        let dm = b.add(class::DESCRIPTIVE_MARKER)?;
        b.set_weak(dm, pid::DATA_DEFINITION, data_def.clone())?;
        b.set(dm, pid::POSITION, m.marked_range.start_time.rescaled_to(rate).value)?;
        b.set(dm, pid::LENGTH, m.marked_range.duration.rescaled_to(rate).value)?;
        b.set(dm, pid::COMMENT, enc.apply(&m.name))?;
        if let Some(slot) = described {
            b.set(dm, pid::DESCRIBED_SLOTS, Value::UInt32Array(vec![slot]))?;
        }
        write_metadata(b, dm, &m.metadata, enc)?;
        if let Some(color) = &m.color {
            write_attribute(b, dm, COLOR_ATTRIBUTE, &enc.apply(color))?;
        }
        b.push_strong(seq, pid::COMPONENTS, dm)?;
    }
    b.set_strong(slot, pid::SEGMENT, seq)?;
    b.push_strong(mob, pid::SLOTS, slot)
}

// ============================================================================
// Clip attachment
// ============================================================================

fn to_clip_time(clip: &Clip, item_start: RationalTime, marker: &Marker) -> Marker {
    let rate = clip.source_range.start_time.rate;
    let offset = marker.marked_range.start_time.sub(item_start);
    let mut out = marker.clone();
    out.marked_range = TimeRange::new(
        clip.source_range.start_time.add(offset).rescaled_to(rate),
        marker.marked_range.duration.rescaled_to(rate),
    );
    out
}

fn to_track_time(clip: &Clip, item_start: RationalTime, marker: &Marker, track_rate: Rational) -> Marker {
    let offset = marker.marked_range.start_time.sub(clip.source_range.start_time);
    let mut out = marker.clone();
    out.marked_range = TimeRange::new(
        item_start.add(offset).rescaled_to(track_rate),
        marker.marked_range.duration.rescaled_to(track_rate),
    );
    out
}

/// Move each track marker onto the clip whose track range contains its
/// start. Markers starting in gaps or transitions stay on the track.
pub fn attach_to_clips(track: &mut Track) {
    let ranges = track.item_ranges();
    let markers = std::mem::take(&mut track.markers);
    for marker in markers {
        let start = marker.marked_range.start_time;
        let hit = ranges
            .iter()
            .zip(track.items.iter())
            .position(|(r, item)| !item.is_transition() && r.contains(start));
        match hit.map(|i| (i, &mut track.items[i])) {
            Some((i, Item::Clip(clip))) => {
                let local = to_clip_time(clip, ranges[i].start_time, &marker);
                trace!(marker = %marker.name, clip = %clip.name, "marker attached");
                clip.markers.push(local);
            }
            _ => track.markers.push(marker),
        }
    }
}

/// Track markers plus every clip marker converted back to track time.
pub fn track_markers(track: &Track) -> Vec<Marker> {
    let mut out = track.markers.clone();
    for (item, range) in track.items.iter().zip(track.item_ranges()) {
        if let Item::Clip(clip) = item {
            for m in &clip.markers {
                if m.marked_range.start_time.rate.is_valid() {
                    out.push(to_track_time(clip, range.start_time, m, track.edit_rate));
                } else {
                    warn!(marker = %m.name, clip = %clip.name, "marker with an invalid rate dropped");
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange::{Gap, TrackKind};

    fn r24() -> Rational {
        Rational::whole(24)
    }

    fn track() -> Track {
        let mut t = Track::new("V1", TrackKind::Video, r24());
        t.push(Clip::new("a", TimeRange::from_units(100, 24, r24())));
        t.push(Gap::new(RationalTime::new(12, r24())));
        t.push(Clip::new("b", TimeRange::from_units(0, 24, r24())));
        t
    }

    #[test]
    fn test_attach_to_clips() {
        let mut t = track();
        t.markers.push(Marker::new("in a", TimeRange::from_units(10, 1, r24())));
        t.markers.push(Marker::new("in gap", TimeRange::from_units(30, 1, r24())));
        t.markers.push(Marker::new("b start", TimeRange::from_units(36, 0, r24())));
        attach_to_clips(&mut t);

        assert_eq!(t.markers.len(), 1);
        assert_eq!(t.markers[0].name, "in gap");
        let Item::Clip(a) = &t.items[0] else { panic!() };
        assert_eq!(a.markers[0].marked_range, TimeRange::from_units(110, 1, r24()));
        let Item::Clip(b) = &t.items[2] else { panic!() };
        assert_eq!(b.markers[0].marked_range.start_time.value, 0);

        let mut back = track_markers(&t);
        back.sort_by_key(|m| m.marked_range.start_time.value);
        let starts: Vec<_> = back.iter().map(|m| m.marked_range.start_time.value).collect();
        assert_eq!(starts, vec![10, 30, 36]);
    }
}
