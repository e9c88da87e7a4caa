//! AAF object graph to timelines.
//!
//! ```text
//! ContentStorage.Mobs
//!   └─ top-level CompositionMob ──► Timeline
//!        ├─ TimelineMobSlot ──► Track ── Sequence.Components ──► Items
//!        ├─ Timecode slot   ──► global start time
//!        └─ EventMobSlot    ──► Markers
//! SourceClip ─► MasterMob ─► SourceMob    ──► Clip + MediaReference
//! SourceClip ─► CompositionMob            ──► Nested
//! ```

use std::collections::HashSet;

use interchange::{
    Clip, Effect, Gap, Item, Marker, MediaReference, Metadata, MetadataValue, Nested, OpaqueItem, Rational,
    RationalTime, TimeRange, Timeline, Track, TrackKind, Transition, TransitionType,
};
use tracing::{debug, trace, warn};

use super::kinds::{component_data_def, track_kind, ComponentKind, MobKind};
use super::markers::{attach_to_clips, read_event_slot, read_marker, SlotMarker};
use super::metadata::{read_metadata, tagged_values, ORIGINAL_NAME, RESERVED_KEY};
use super::opaque::{capture, capture_extensions};
use super::simplify::simplify_timeline;
use crate::core::{class, datadef, definition_name, opdef, paramdef, pid, usage};
use crate::facade::DecodeOptions;
use crate::graph::{ObjectRef, ResolvedGraph};
use crate::util::{DecodeErrorKind, Error, MobId, Result};

/// Longest MasterMob chain followed to reach a SourceMob.
const MAX_CHAIN: usize = 16;

/// Comment holding a transition's name.
pub const TRANSITION_NAME: &str = "Name";

fn structure(detail: impl Into<String>) -> Error {
    Error::decode(DecodeErrorKind::Structure, detail)
}

/// Mob owning an object, if any.
fn owning_mob<'g>(obj: &ObjectRef<'g>) -> Option<ObjectRef<'g>> {
    let mut cur = obj.parent();
    while let Some(p) = cur {
        if p.is_a(class::MOB) {
            return Some(p);
        }
        cur = p.parent();
    }
    None
}

/// Mobs of the content storage, in stored order.
pub fn content_mobs(g: &ResolvedGraph) -> Result<Vec<ObjectRef<'_>>> {
    let header = g.root_object().strong(pid::ROOT_HEADER).ok_or_else(|| structure("file has no header"))?;
    let content = header.strong(pid::CONTENT).ok_or_else(|| structure("header has no content storage"))?;
    Ok(content.strong_vec(pid::MOBS))
}

/// Top-level compositions, in content order.
///
/// A composition is top-level when its usage code says so, or when no
/// SourceClip owned by another composition references it.
pub fn top_level_compositions(g: &ResolvedGraph) -> Result<Vec<ObjectRef<'_>>> {
    let mut referenced: HashSet<MobId> = HashSet::new();
    for id in g.objects() {
        let obj = g.object(id);
        if !obj.is_a(class::SOURCE_CLIP) {
            continue;
        }
        let Some(target) = obj.mob_id(pid::SOURCE_ID) else { continue };
        let Some(owner) = owning_mob(&obj) else { continue };
        if MobKind::of(&owner) == MobKind::Composition && owner.mob_id(pid::MOB_ID) != Some(target) {
            referenced.insert(target);
        }
    }
    Ok(content_mobs(g)?
        .into_iter()
        .filter(|m| MobKind::of(m) == MobKind::Composition)
        .filter(|m| {
            m.auid(pid::USAGE_CODE) == Some(usage::TOP_LEVEL)
                || m.mob_id(pid::MOB_ID).map_or(true, |id| !referenced.contains(&id))
        })
        .collect())
}

/// Comments, attributes and preserved extension properties of an object.
fn metadata_of(obj: &ObjectRef<'_>) -> Result<Metadata> {
    let mut md = read_metadata(obj);
    if let Some(ext) = capture_extensions(*obj)? {
        md.insert(RESERVED_KEY.to_string(), ext);
    }
    Ok(md)
}

fn merge_missing(into: &mut Metadata, from: Metadata) {
    for (k, v) in from {
        into.entry(k).or_insert(v);
    }
}

fn duration_mut(item: &mut Item) -> Option<&mut RationalTime> {
    match item {
        Item::Clip(c) => Some(&mut c.source_range.duration),
        Item::Nested(n) => Some(&mut n.source_range.duration),
        Item::Gap(g) => Some(&mut g.duration),
        Item::Opaque(o) => Some(&mut o.duration),
        Item::Transition(_) => None,
    }
}

/// Shorten an item's duration by `by`, saturating at zero.
fn trim_end(item: &mut Item, by: RationalTime) {
    let Some(dur) = duration_mut(item) else { return };
    let by = by.rescaled_to(dur.rate).value;
    let short = by > dur.value;
    dur.value = dur.value.saturating_sub(by).max(0);
    if short {
        warn!(item = item_name(item), "transition longer than its neighbour");
    }
}

/// Advance an item's start by `by` and shorten it to match.
fn trim_start(item: &mut Item, by: RationalTime) -> Result<()> {
    let start = match item {
        Item::Clip(c) => Some(&mut c.source_range.start_time),
        Item::Nested(n) => Some(&mut n.source_range.start_time),
        _ => None,
    };
    if let Some(start) = start {
        let moved = start.checked_add(by);
        *start = moved.ok_or_else(|| structure(format!("start {start} advanced by {by} overflows")))?;
    }
    trim_end(item, by);
    Ok(())
}

fn item_name(item: &Item) -> &str {
    match item {
        Item::Clip(c) => &c.name,
        Item::Nested(n) => &n.name,
        Item::Opaque(o) => &o.kind,
        other => other.kind_name(),
    }
}

/// Cut the overlap of every transition out of its neighbours, so items lay
/// end to end and the track keeps the sequence's length.
fn apply_transitions(items: &mut [Item]) -> Result<()> {
    for i in 0..items.len() {
        let Item::Transition(t) = &items[i] else { continue };
        let (in_offset, out_offset) = (t.in_offset, t.out_offset);
        match i.checked_sub(1).filter(|&p| !items[p].is_transition()) {
            Some(p) => trim_end(&mut items[p], out_offset),
            None => warn!(index = i, "transition has no outgoing item"),
        }
        match Some(i + 1).filter(|&n| n < items.len() && !items[n].is_transition()) {
            Some(n) => trim_start(&mut items[n], in_offset)?,
            None => warn!(index = i, "transition has no incoming item"),
        }
    }
    Ok(())
}

/// Markers that sat among a sequence's components, moved to the track at
/// the position where they occurred.
fn place_inline_markers(items: &[Item], inline: Vec<(usize, Marker)>, rate: Rational) -> Vec<Marker> {
    let mut out = Vec::with_capacity(inline.len());
    for (index, mut marker) in inline {
        let start = items[..index]
            .iter()
            .fold(RationalTime::zero(rate), |acc, item| acc.add(item.track_duration()));
        marker.marked_range = TimeRange::new(start, marker.marked_range.duration);
        trace!(marker = %marker.name, start = start.value, "sequence marker moved to track");
        out.push(marker);
    }
    out
}

/// Tracks, markers and metadata of one CompositionMob.
struct Composition {
    name: String,
    tracks: Vec<Track>,
    markers: Vec<Marker>,
    metadata: Metadata,
    global_start: Option<RationalTime>,
}

/// Decode state: the compositions being mapped, innermost last.
struct Mapper<'o> {
    opts: &'o DecodeOptions,
    stack: Vec<MobId>,
}

impl<'o> Mapper<'o> {
    fn new(opts: &'o DecodeOptions) -> Self {
        Self { opts, stack: Vec::new() }
    }

    fn composition<'g>(&mut self, mob: ObjectRef<'g>) -> Result<Composition> {
        let id = mob.mob_id(pid::MOB_ID).unwrap_or(MobId::ZERO);
        self.stack.push(id);
        let out = self.composition_inner(mob);
        self.stack.pop();
        out
    }

    fn composition_inner<'g>(&mut self, mob: ObjectRef<'g>) -> Result<Composition> {
        let mut tracks = Vec::new();
        let mut slot_ids = Vec::new();
        let mut events: Vec<SlotMarker> = Vec::new();
        let mut global_start = None;

        for slot in mob.strong_vec(pid::SLOTS) {
            if slot.is_a(class::EVENT_MOB_SLOT) {
                events.extend(read_event_slot(&slot));
                continue;
            }
            if !slot.is_a(class::TIMELINE_MOB_SLOT) {
                trace!(slot = ?slot, "slot skipped");
                continue;
            }
            if let Some(start) = timecode_start(&slot) {
                global_start.get_or_insert(start);
                continue;
            }
            tracks.push(self.track(&slot)?);
            slot_ids.push(slot.u32(pid::SLOT_ID).unwrap_or(0));
        }

        let mut markers = Vec::new();
        for SlotMarker { described, marker } in events {
            let target = described.first().and_then(|s| slot_ids.iter().position(|id| id == s));
            match target {
                Some(i) => {
                    let rate = tracks[i].edit_rate;
                    let mut m = marker;
                    m.marked_range = TimeRange::new(
                        m.marked_range.start_time.rescaled_to(rate),
                        m.marked_range.duration.rescaled_to(rate),
                    );
                    tracks[i].markers.push(m);
                }
                None => {
                    if !described.is_empty() {
                        warn!(slots = ?described, marker = %marker.name, "marker describes no track");
                    }
                    markers.push(marker);
                }
            }
        }
        if self.opts.attach_markers {
            tracks.iter_mut().for_each(attach_to_clips);
        }

        Ok(Composition {
            name: mob.string(pid::MOB_NAME).unwrap_or_default().to_string(),
            tracks,
            markers,
            metadata: metadata_of(&mob)?,
            global_start,
        })
    }

    fn track<'g>(&mut self, slot: &ObjectRef<'g>) -> Result<Track> {
        let rate = slot.rational(pid::EDIT_RATE).filter(Rational::is_positive).ok_or_else(|| {
            structure(format!("{slot:?} has edit rate {:?}", slot.rational(pid::EDIT_RATE)))
        })?;
        let segment = slot.strong(pid::SEGMENT).ok_or_else(|| structure(format!("{slot:?} has no segment")))?;
        let mut track = Track::new(
            slot.string(pid::SLOT_NAME).unwrap_or_default(),
            track_kind(component_data_def(&segment)),
            rate,
        );
        let components = if ComponentKind::of(&segment) == ComponentKind::Sequence {
            track.metadata = metadata_of(&segment)?;
            segment.strong_vec(pid::COMPONENTS)
        } else {
            vec![segment]
        };
        let mut inline = Vec::new();
        self.items(components, rate, &mut track.items, &mut inline)?;
        apply_transitions(&mut track.items)?;
        track.markers = place_inline_markers(&track.items, inline, rate);
        trace!(track = %track.name, items = track.items.len(), "track mapped");
        Ok(track)
    }

    /// Flatten nested sequences into `items`. Markers found among the
    /// components are recorded with the index of the item that follows them.
    fn items<'g>(
        &mut self,
        components: Vec<ObjectRef<'g>>,
        rate: Rational,
        items: &mut Vec<Item>,
        inline: &mut Vec<(usize, Marker)>,
    ) -> Result<()> {
        for c in components {
            match ComponentKind::of(&c) {
                ComponentKind::Sequence => self.items(c.strong_vec(pid::COMPONENTS), rate, items, inline)?,
                ComponentKind::Marker => {
                    let marker = read_marker(&c, rate).marker;
                    let length = marker.marked_range.duration;
                    inline.push((items.len(), marker));
                    if length.value > 0 {
                        items.push(Item::Gap(Gap::new(length)));
                    }
                }
                _ => items.push(self.item(c, rate)?),
            }
        }
        Ok(())
    }

    fn item<'g>(&mut self, c: ObjectRef<'g>, rate: Rational) -> Result<Item> {
        let length = RationalTime::new(c.i64(pid::LENGTH).unwrap_or(0), rate);
        trace!(component = ?c, "component");
        Ok(match ComponentKind::of(&c) {
            ComponentKind::Filler => {
                let mut gap = Gap::new(length);
                gap.metadata = metadata_of(&c)?;
                Item::Gap(gap)
            }
            ComponentKind::SourceClip => self.source_clip(c, rate)?,
            ComponentKind::Transition => transition(c, rate)?,
            ComponentKind::OperationGroup => match self.speed_change(c, rate)? {
                Some(clip) => clip,
                None => opaque(c, length)?,
            },
            _ => opaque(c, length)?,
        })
    }

    fn source_clip<'g>(&mut self, c: ObjectRef<'g>, rate: Rational) -> Result<Item> {
        let range = TimeRange::from_units(c.i64(pid::START_TIME).unwrap_or(0), c.i64(pid::LENGTH).unwrap_or(0), rate);
        let mut md = metadata_of(&c)?;
        let original_name = match md.remove(ORIGINAL_NAME) {
            Some(MetadataValue::String(s)) => Some(s),
            Some(other) => {
                md.insert(ORIGINAL_NAME.to_string(), other);
                None
            }
            None => None,
        };

        let target = c.referenced_mob(pid::SOURCE_ID);
        if let Some(mob) = target.filter(|m| MobKind::of(m) == MobKind::Composition) {
            let id = mob.mob_id(pid::MOB_ID).unwrap_or(MobId::ZERO);
            if self.stack.contains(&id) || self.stack.len() > MAX_CHAIN {
                warn!(mob = %id, "composition references itself, mapped as a clip");
            } else {
                let comp = self.composition(mob)?;
                let mut nested = Nested::new(comp.name, range);
                nested.tracks = comp.tracks;
                nested.markers = comp.markers;
                nested.metadata = comp.metadata;
                merge_missing(&mut nested.metadata, md);
                return Ok(Item::Nested(nested));
            }
        }

        let name = target.and_then(|m| m.string(pid::MOB_NAME)).unwrap_or_default();
        let mut clip = Clip::new(original_name.unwrap_or_else(|| name.to_string()), range);
        clip.media_reference = target.and_then(|m| media_reference(&m, c.u32(pid::SOURCE_MOB_SLOT_ID)));
        clip.metadata = md;
        Ok(Item::Clip(clip))
    }

    /// A VideoSpeedControl with a constant ratio over one source clip.
    fn speed_change<'g>(&mut self, og: ObjectRef<'g>, rate: Rational) -> Result<Option<Item>> {
        if !self.opts.transcribe_linear_speed_effects || og.weak_auid(pid::OPERATION) != Some(opdef::VIDEO_SPEED_CONTROL) {
            return Ok(None);
        }
        let inputs = og.strong_vec(pid::INPUT_SEGMENTS);
        let [input] = inputs.as_slice() else { return Ok(None) };
        if ComponentKind::of(input) != ComponentKind::SourceClip {
            return Ok(None);
        }
        let ratio = og
            .strong_vec(pid::PARAMETERS)
            .into_iter()
            .filter(|p| p.is_a(class::CONSTANT_VALUE) && p.auid(pid::PARAMETER_DEFINITION) == Some(paramdef::SPEED_RATIO))
            .find_map(|p| p.indirect(pid::CONSTANT_VALUE)?.as_rational());
        let Some(time_scalar) = ratio else { return Ok(None) };
        let Item::Clip(mut clip) = self.source_clip(*input, rate)? else {
            return Ok(None);
        };
        clip.source_range.duration = RationalTime::new(og.i64(pid::LENGTH).unwrap_or(0), rate);
        clip.effects.push(Effect::LinearTimeWarp { time_scalar });
        merge_missing(&mut clip.metadata, metadata_of(&og)?);
        Ok(Some(Item::Clip(clip)))
    }
}

/// Start of a timecode slot, at the slot's rate.
fn timecode_start(slot: &ObjectRef<'_>) -> Option<RationalTime> {
    let rate = slot.rational(pid::EDIT_RATE)?;
    let segment = slot.strong(pid::SEGMENT)?;
    let timecode = match ComponentKind::of(&segment) {
        ComponentKind::Timecode => Some(segment),
        ComponentKind::Sequence => segment
            .strong_vec(pid::COMPONENTS)
            .into_iter()
            .find(|c| ComponentKind::of(c) == ComponentKind::Timecode),
        _ => None,
    };
    match timecode {
        Some(tc) => Some(RationalTime::new(tc.i64(pid::TIMECODE_START).unwrap_or(0), rate)),
        None if component_data_def(&segment).is_some_and(datadef::is_timecode) => Some(RationalTime::zero(rate)),
        None => None,
    }
}

/// SourceMob at the end of a MasterMob chain, with the slot the chain arrived at.
fn media_reference(mob: &ObjectRef<'_>, slot_id: Option<u32>) -> Option<MediaReference> {
    let mut mob = *mob;
    let mut slot_id = slot_id;
    for _ in 0..MAX_CHAIN {
        let slot = mob
            .strong_vec(pid::SLOTS)
            .into_iter()
            .find(|s| slot_id.is_none() || s.u32(pid::SLOT_ID) == slot_id);
        match MobKind::of(&mob) {
            MobKind::Source => {
                let mut media = MediaReference::new(mob.string(pid::MOB_NAME).unwrap_or_default());
                media.metadata = read_metadata(&mob);
                if let Some(slot) = slot {
                    let rate = slot.rational(pid::EDIT_RATE).unwrap_or(Rational::whole(24));
                    let length = slot.strong(pid::SEGMENT).and_then(|s| s.i64(pid::LENGTH));
                    media.available_range =
                        length.map(|len| TimeRange::from_units(slot.i64(pid::ORIGIN).unwrap_or(0), len, rate));
                }
                return Some(media);
            }
            MobKind::Master => {
                let segment = slot?.strong(pid::SEGMENT)?;
                let clip = match ComponentKind::of(&segment) {
                    ComponentKind::SourceClip => segment,
                    _ => segment
                        .strong_vec(pid::COMPONENTS)
                        .into_iter()
                        .find(|c| ComponentKind::of(c) == ComponentKind::SourceClip)?,
                };
                slot_id = clip.u32(pid::SOURCE_MOB_SLOT_ID);
                mob = clip.referenced_mob(pid::SOURCE_ID)?;
            }
            _ => return None,
        }
    }
    warn!("mob chain longer than {MAX_CHAIN}, media reference dropped");
    None
}

fn transition(c: ObjectRef<'_>, rate: Rational) -> Result<Item> {
    let length = c.i64(pid::LENGTH).unwrap_or(0);
    let cut = c.i64(pid::CUT_POINT).unwrap_or(0).clamp(0, length.max(0));
    let og = c.strong(pid::OPERATION_GROUP);
    let op = og.and_then(|o| o.weak_auid(pid::OPERATION));

    let transition_type = match op {
        Some(id) if opdef::is_dissolve(id) => TransitionType::SmpteDissolve,
        Some(id) => {
            let declared = og.and_then(|o| o.weak_object(pid::OPERATION)).and_then(|d| d.string(pid::NAME));
            let builtin: Option<&str> = definition_name(id);
            TransitionType::Custom(builtin.or(declared).map_or_else(|| id.to_string(), str::to_string))
        }
        None => TransitionType::SmpteDissolve,
    };
    let name = og
        .map(|o| tagged_values(&o, pid::COMPONENT_USER_COMMENTS))
        .unwrap_or_default()
        .into_iter()
        .find(|(n, _)| *n == TRANSITION_NAME)
        .and_then(|(_, v)| v.as_string())
        .unwrap_or_default();

    Ok(Item::Transition(Transition {
        name,
        transition_type,
        in_offset: RationalTime::new(cut, rate),
        out_offset: RationalTime::new(length - cut, rate),
        metadata: metadata_of(&c)?,
    }))
}

fn opaque(c: ObjectRef<'_>, duration: RationalTime) -> Result<Item> {
    debug!(class = %c.class_name(), "component kept opaque");
    Ok(Item::Opaque(OpaqueItem {
        kind: c.class_name(),
        duration,
        payload: capture(c)?,
        metadata: Metadata::new(),
    }))
}

/// Map every top-level composition of a resolved graph.
pub fn decode_timelines(g: &ResolvedGraph, opts: &DecodeOptions) -> Result<Vec<Timeline>> {
    let mut out = Vec::new();
    for mob in top_level_compositions(g)? {
        if opts.is_cancelled() {
            return Err(Error::decode(DecodeErrorKind::Cancelled, "decode cancelled between compositions"));
        }
        let comp = Mapper::new(opts).composition(mob)?;
        let rate = opts
            .rate
            .or_else(|| comp.tracks.iter().find(|t| t.kind == TrackKind::Video).map(|t| t.edit_rate))
            .or_else(|| comp.tracks.first().map(|t| t.edit_rate))
            .unwrap_or(Rational::whole(24));
        let mut tl = Timeline::new(comp.name, rate);
        tl.global_start_time = comp.global_start;
        tl.tracks = comp.tracks;
        tl.markers = comp.markers;
        tl.metadata = comp.metadata;
        if opts.simplified {
            simplify_timeline(&mut tl);
        }
        debug!(timeline = %tl.name, tracks = tl.tracks.len(), "composition mapped");
        out.push(tl);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange::Gap;

    fn r24() -> Rational {
        Rational::whole(24)
    }

    #[test]
    fn test_transition_adjustment() {
        let mut items = vec![
            Item::Clip(Clip::new("a", TimeRange::from_units(0, 48, r24()))),
            Item::Transition(Transition::dissolve(RationalTime::new(12, r24()), RationalTime::new(12, r24()))),
            Item::Clip(Clip::new("b", TimeRange::from_units(100, 48, r24()))),
        ];
        apply_transitions(&mut items).unwrap();
        let Item::Clip(a) = &items[0] else { panic!() };
        let Item::Clip(b) = &items[2] else { panic!() };
        assert_eq!(a.source_range, TimeRange::from_units(0, 36, r24()));
        assert_eq!(b.source_range, TimeRange::from_units(112, 36, r24()));
    }

    #[test]
    fn test_transition_saturates() {
        let mut items = vec![
            Item::Gap(Gap::new(RationalTime::new(4, r24()))),
            Item::Transition(Transition::dissolve(RationalTime::new(0, r24()), RationalTime::new(10, r24()))),
        ];
        apply_transitions(&mut items).unwrap();
        assert_eq!(items[0].track_duration().value, 0);
    }
}
