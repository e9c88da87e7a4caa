//! Timelines to an AAF object graph.
//!
//! Each timeline becomes a top-level CompositionMob. Clips reference a
//! MasterMob that in turn references a SourceMob describing the media;
//! clips with the same name, media and track kind share both mobs. Every
//! definition referenced weakly is written once into the Dictionary.

use std::collections::HashSet;

use interchange::{
    Clip, Item, Marker, MediaReference, Metadata, Nested, Rational, RationalTime, Timeline, Track, TrackKind,
    Transition, TransitionType,
};
use tracing::{debug, trace};

use super::kinds::{data_definition, dissolve_for};
use super::markers::{track_markers, write_event_slot};
use super::metadata::{write_comment, write_metadata, ORIGINAL_NAME};
use super::opaque::write_class_definitions;
use super::decode::TRANSITION_NAME;
use super::simplify::simplify_timeline;
use crate::core::{
    class, datadef, definition_name, mangle_name, opdef, paramdef, pid, typeid, usage, ClassTable, Indirect,
    TimeStamp, Value, VersionType,
};
use crate::facade::EncodeOptions;
use crate::graph::{definition_ref, meta_ref, GraphBuilder, RawGraph, RawValue};
use crate::util::{Auid, EncodeErrorKind, Error, MobId, Result};

/// Namespace of identifiers minted for named custom operations.
const CUSTOM_OPERATION_NAMESPACE: Auid =
    Auid::new(0x5f0e_1d3a, 0x4c2b, 0x4e61, [0x9a, 0x7d, 0x2b, 0x11, 0x6c, 0x80, 0x3f, 0x52]);

fn invalid_rate(what: &str, rate: Rational) -> Error {
    Error::encode(EncodeErrorKind::InvalidRate, format!("{what} has edit rate {rate}"))
}

fn check_rate(what: &str, rate: Rational) -> Result<Rational> {
    if rate.is_positive() {
        Ok(rate)
    } else {
        Err(invalid_rate(what, rate))
    }
}

/// Units of `t` at `rate`.
fn units(t: RationalTime, rate: Rational) -> i64 {
    t.rescaled_to(rate).value
}

fn overflow(what: impl std::fmt::Display) -> Error {
    Error::encode(EncodeErrorKind::Layout, format!("{what} overflows a 64-bit length"))
}

/// Undo the decode-side transition trim: neighbours overlap the transition again.
fn extend_for_transitions(items: &[Item]) -> Result<Vec<Item>> {
    let mut out = items.to_vec();
    for i in 0..out.len() {
        let Item::Transition(t) = &out[i] else { continue };
        let (in_offset, out_offset) = (t.in_offset, t.out_offset);
        if let Some(p) = i.checked_sub(1).filter(|&p| !out[p].is_transition()) {
            extend_end(&mut out[p], out_offset)?;
        }
        if let Some(n) = Some(i + 1).filter(|&n| n < out.len() && !out[n].is_transition()) {
            let start = match &mut out[n] {
                Item::Clip(c) => Some(&mut c.source_range.start_time),
                Item::Nested(nd) => Some(&mut nd.source_range.start_time),
                _ => None,
            };
            if let Some(start) = start {
                let moved = start.checked_sub(in_offset);
                *start = moved.ok_or_else(|| overflow(format_args!("start {start} before transition")))?;
            }
            extend_end(&mut out[n], in_offset)?;
        }
    }
    Ok(out)
}

fn extend_end(item: &mut Item, by: RationalTime) -> Result<()> {
    let dur = match item {
        Item::Clip(c) => &mut c.source_range.duration,
        Item::Nested(n) => &mut n.source_range.duration,
        Item::Gap(g) => &mut g.duration,
        Item::Opaque(o) => &mut o.duration,
        Item::Transition(_) => return Ok(()),
    };
    let extended = dur.checked_add(by);
    *dur = extended.ok_or_else(|| overflow(format_args!("duration {dur} under a transition")))?;
    Ok(())
}

/// Identity of a MasterMob/SourceMob pair.
struct MediaKey {
    name: String,
    media: Option<MediaReference>,
    kind: TrackKind,
}

/// Encoder state shared by the mapping and payload rebuild code.
pub(super) struct EncodeCx<'o> {
    pub(super) b: GraphBuilder,
    pub(super) opts: &'o EncodeOptions,
    pub(super) meta: usize,
    pub(super) dictionary: usize,
    pub(super) content: usize,
    /// `(collection pid, identification bytes)` of written definitions.
    pub(super) definitions: HashSet<(u16, Vec<u8>)>,
    pub(super) mob_ids: HashSet<MobId>,
    media: Vec<(MediaKey, MobId)>,
}

impl<'o> EncodeCx<'o> {
    /// Root, MetaDictionary, Header with one Identification, Dictionary and
    /// an empty ContentStorage.
    fn new(opts: &'o EncodeOptions) -> Result<Self> {
        let mut b = GraphBuilder::new(ClassTable::builtin());
        let root = b.root();
        let meta = b.add(class::META_DICTIONARY)?;
        b.set_strong(root, pid::ROOT_META_DICTIONARY, meta)?;

        let header = b.add(class::HEADER)?;
        b.set_strong(root, pid::ROOT_HEADER, header)?;
        b.set(header, pid::BYTE_ORDER, Value::Int16(0x4949))?;
        b.set(header, pid::LAST_MODIFIED, TimeStamp::now())?;
        b.set(header, pid::VERSION, VersionType { major: 1, minor: 1 })?;
        b.set(header, pid::OBJECT_MODEL_VERSION, 1u32)?;

        let product = env!("CARGO_PKG_NAME");
        let ident = b.add(class::IDENTIFICATION)?;
        b.set(ident, pid::COMPANY_NAME, product)?;
        b.set(ident, pid::PRODUCT_NAME, product)?;
        b.set(ident, pid::PRODUCT_VERSION_STRING, env!("CARGO_PKG_VERSION"))?;
        b.set(ident, pid::PRODUCT_ID, Auid::name_based(Auid::NIL, product.as_bytes()))?;
        b.set(ident, pid::DATE, TimeStamp::now())?;
        b.set(ident, pid::GENERATION_AUID, Auid::random())?;
        b.push_strong(header, pid::IDENTIFICATION_LIST, ident)?;

        let dictionary = b.add(class::DICTIONARY)?;
        b.set_strong(header, pid::DICTIONARY, dictionary)?;
        let content = b.add(class::CONTENT_STORAGE)?;
        b.set_strong(header, pid::CONTENT, content)?;
        b.set_raw(content, pid::MOBS, RawValue::StrongSet {
            name: mangle_name("Mobs", pid::MOBS),
            key_pid: pid::MOB_ID,
            elements: Vec::new(),
        })?;

        Ok(Self {
            b,
            opts,
            meta,
            dictionary,
            content,
            definitions: HashSet::new(),
            mob_ids: HashSet::new(),
            media: Vec::new(),
        })
    }

    fn text(&self, s: &str) -> String {
        self.opts.metadata_encoding.apply(s)
    }

    fn empty_vector(&mut self, obj: usize, pid: u16, name: &str) -> Result<()> {
        self.b.set_raw(obj, pid, RawValue::StrongVector { name: mangle_name(name, pid), elements: Vec::new() })
    }

    fn metadata(&mut self, obj: usize, md: &Metadata) -> Result<()> {
        write_metadata(&mut self.b, obj, md, self.opts.metadata_encoding)?;
        self.restore_extensions(obj, md)
    }

    fn new_mob(&mut self, class: Auid, name: &str) -> Result<(usize, MobId)> {
        let mob = self.b.add(class)?;
        let id = MobId::new_umid();
        self.mob_ids.insert(id);
        let now = TimeStamp::now();
        self.b.set(mob, pid::MOB_ID, id)?;
        let name = self.text(name);
        self.b.set(mob, pid::MOB_NAME, name)?;
        self.b.set(mob, pid::MOB_LAST_MODIFIED, now)?;
        self.b.set(mob, pid::CREATION_TIME, now)?;
        self.empty_vector(mob, pid::SLOTS, "Slots")?;
        Ok((mob, id))
    }

    fn add_mob(&mut self, mob: usize) -> Result<()> {
        self.b.insert_strong(self.content, pid::MOBS, mob)
    }

    fn timeline_slot(&mut self, mob: usize, slot_id: u32, name: &str, rate: Rational, origin: i64) -> Result<usize> {
        let slot = self.b.add(class::TIMELINE_MOB_SLOT)?;
        self.b.set(slot, pid::SLOT_ID, slot_id)?;
        if !name.is_empty() {
            let name = self.text(name);
            self.b.set(slot, pid::SLOT_NAME, name)?;
        }
        self.b.set(slot, pid::EDIT_RATE, rate)?;
        self.b.set(slot, pid::ORIGIN, origin)?;
        self.b.push_strong(mob, pid::SLOTS, slot)?;
        Ok(slot)
    }

    // ------------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------------

    /// Add a definition object unless one with the same id was written.
    fn definition(&mut self, collection: u16, class: Auid, id: Auid, name: &str) -> Result<Option<usize>> {
        if !self.definitions.insert((collection, id.to_le_bytes().to_vec())) {
            return Ok(None);
        }
        let def = self.b.add(class)?;
        self.b.set(def, pid::IDENTIFICATION, id)?;
        self.b.set(def, pid::NAME, name)?;
        self.b.insert_strong(self.dictionary, collection, def)?;
        trace!(%id, name, "definition written");
        Ok(Some(def))
    }

    fn data_def(&mut self, obj: usize, id: Auid) -> Result<()> {
        let name = definition_name(id).unwrap_or_default();
        self.definition(pid::DATA_DEFINITIONS, class::DATA_DEFINITION, id, name)?;
        self.b.set_weak(obj, pid::DATA_DEFINITION, definition_ref(pid::DATA_DEFINITIONS, id))
    }

    fn param_def(&mut self, id: Auid) -> Result<()> {
        let name = definition_name(id).unwrap_or_default();
        if let Some(def) = self.definition(pid::PARAMETER_DEFINITIONS, class::PARAMETER_DEFINITION, id, name)? {
            self.b.set_weak(def, pid::PARAMETER_TYPE, meta_ref(pid::TYPE_DEFINITIONS, typeid::RATIONAL))?;
        }
        Ok(())
    }

    fn operation_def(&mut self, id: Auid, name: &str, data_def: Auid, inputs: i32, params: &[Auid]) -> Result<()> {
        let Some(def) = self.definition(pid::OPERATION_DEFINITIONS, class::OPERATION_DEFINITION, id, name)? else {
            return Ok(());
        };
        let dd_name = definition_name(data_def).unwrap_or_default();
        self.definition(pid::DATA_DEFINITIONS, class::DATA_DEFINITION, data_def, dd_name)?;
        self.b.set_weak(def, pid::OPDEF_DATA_DEFINITION, definition_ref(pid::DATA_DEFINITIONS, data_def))?;
        self.b.set(def, pid::IS_TIME_WARP, id == opdef::VIDEO_SPEED_CONTROL)?;
        self.b.set(def, pid::NUMBER_INPUTS, inputs)?;
        for &p in params {
            self.param_def(p)?;
            self.b.insert_weak(def, pid::PARAMETERS_DEFINED, definition_ref(pid::PARAMETER_DEFINITIONS, p))?;
        }
        Ok(())
    }

    /// Operation id and name of a transition type.
    fn transition_operation(&self, t: &TransitionType, kind: TrackKind) -> (Auid, String) {
        let named = |id: Auid| (id, definition_name(id).unwrap_or_default().to_string());
        match t {
            TransitionType::SmpteDissolve => named(dissolve_for(kind)),
            TransitionType::Custom(s) => {
                if let Ok(id) = s.parse::<Auid>() {
                    return (id, definition_name(id).map_or_else(|| s.clone(), str::to_string));
                }
                match opdef::ALL.iter().find(|(_, n)| *n == s.as_str()) {
                    Some((id, _)) => named(*id),
                    None => (Auid::name_based(CUSTOM_OPERATION_NAMESPACE, s.as_bytes()), s.clone()),
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Compositions
    // ------------------------------------------------------------------------

    fn timeline(&mut self, tl: &Timeline) -> Result<MobId> {
        check_rate(&format!("timeline {:?}", tl.name), tl.rate)?;
        let marker_rate = tl.markers.first().map_or(tl.rate, |m| m.marked_range.start_time.rate);
        let (mob, id) = self.composition(&tl.name, &tl.tracks, &tl.metadata, usage::TOP_LEVEL)?;
        let mut next_slot = tl.tracks.len() as u32 + 1;
        if let Some(start) = tl.global_start_time {
            self.timecode_slot(mob, next_slot, start, tl.duration())?;
            next_slot += 1;
        }
        self.markers(mob, next_slot, &tl.tracks, &tl.markers, marker_rate)?;
        self.add_mob(mob)?;
        debug!(timeline = %tl.name, mob = %id, "timeline encoded");
        Ok(id)
    }

    fn nested(&mut self, n: &Nested) -> Result<MobId> {
        let fallback = n.tracks.first().map_or(n.source_range.duration.rate, |t| t.edit_rate);
        let marker_rate = n.markers.first().map_or(fallback, |m| m.marked_range.start_time.rate);
        let (mob, id) = self.composition(&n.name, &n.tracks, &n.metadata, usage::LOWER_LEVEL)?;
        self.markers(mob, n.tracks.len() as u32 + 1, &n.tracks, &n.markers, marker_rate)?;
        self.add_mob(mob)?;
        Ok(id)
    }

    /// CompositionMob with one TimelineMobSlot per track, slot ids from 1.
    fn composition(&mut self, name: &str, tracks: &[Track], md: &Metadata, usage_code: Auid) -> Result<(usize, MobId)> {
        let (mob, id) = self.new_mob(class::COMPOSITION_MOB, name)?;
        self.b.set(mob, pid::USAGE_CODE, usage_code)?;
        self.metadata(mob, md)?;
        for (i, track) in tracks.iter().enumerate() {
            self.track(mob, i as u32 + 1, track)?;
        }
        Ok((mob, id))
    }

    fn markers(&mut self, mob: usize, first_slot: u32, tracks: &[Track], own: &[Marker], rate: Rational) -> Result<()> {
        let enc = self.opts.metadata_encoding;
        let mut slot_id = first_slot;
        if !own.is_empty() {
            check_rate("composition markers", rate)?;
            write_event_slot(&mut self.b, mob, slot_id, rate, None, own, enc)?;
            slot_id += 1;
        }
        for (i, track) in tracks.iter().enumerate() {
            let markers = track_markers(track);
            if markers.is_empty() {
                continue;
            }
            write_event_slot(&mut self.b, mob, slot_id, track.edit_rate, Some(i as u32 + 1), &markers, enc)?;
            slot_id += 1;
        }
        Ok(())
    }

    fn timecode_slot(&mut self, mob: usize, slot_id: u32, start: RationalTime, length: RationalTime) -> Result<()> {
        let rate = check_rate("global start time", start.rate)?;
        let slot = self.timeline_slot(mob, slot_id, "TC1", rate, 0)?;
        let tc = self.b.add(class::TIMECODE)?;
        self.data_def(tc, datadef::TIMECODE)?;
        self.b.set(tc, pid::LENGTH, units(length, rate))?;
        self.b.set(tc, pid::TIMECODE_START, start.value)?;
        self.b.set(tc, pid::TIMECODE_FPS, rate.to_f64().round().clamp(1.0, u16::MAX as f64) as u16)?;
        self.b.set(tc, pid::TIMECODE_DROP, false)?;
        self.b.set_strong(slot, pid::SEGMENT, tc)
    }

    fn track(&mut self, mob: usize, slot_id: u32, track: &Track) -> Result<()> {
        let rate = check_rate(&format!("track {:?}", track.name), track.edit_rate)?;
        let slot = self.timeline_slot(mob, slot_id, &track.name, rate, 0)?;
        let seq = self.b.add(class::SEQUENCE)?;
        let dd = data_definition(track.kind);
        self.data_def(seq, dd)?;
        let duration = track.checked_duration().ok_or_else(|| overflow(format_args!("track {:?}", track.name)))?;
        self.b.set(seq, pid::LENGTH, units(duration, rate))?;
        self.empty_vector(seq, pid::COMPONENTS, "Components")?;
        self.metadata(seq, &track.metadata)?;

        for item in extend_for_transitions(&track.items)? {
            let component = self.item(&item, track.kind, rate)?;
            self.b.push_strong(seq, pid::COMPONENTS, component)?;
        }
        self.b.set_strong(slot, pid::SEGMENT, seq)?;
        trace!(track = %track.name, items = track.items.len(), "track encoded");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    fn item(&mut self, item: &Item, kind: TrackKind, rate: Rational) -> Result<usize> {
        match item {
            Item::Gap(g) => {
                let filler = self.b.add(class::FILLER)?;
                self.data_def(filler, data_definition(kind))?;
                self.b.set(filler, pid::LENGTH, units(g.duration, rate))?;
                self.metadata(filler, &g.metadata)?;
                Ok(filler)
            }
            Item::Clip(c) => match c.time_scalar() {
                Some(scalar) => self.speed_change(c, scalar, kind, rate),
                None => self.source_clip(c, kind, rate),
            },
            Item::Transition(t) => self.transition(t, kind, rate),
            Item::Nested(n) => {
                let id = self.nested(n)?;
                let sc = self.b.add(class::SOURCE_CLIP)?;
                self.data_def(sc, data_definition(kind))?;
                self.b.set(sc, pid::LENGTH, units(n.source_range.duration, rate))?;
                self.b.set(sc, pid::START_TIME, units(n.source_range.start_time, rate))?;
                self.b.set(sc, pid::SOURCE_ID, id)?;
                self.b.set(sc, pid::SOURCE_MOB_SLOT_ID, 1u32)?;
                Ok(sc)
            }
            Item::Opaque(o) => {
                trace!(kind = %o.kind, "opaque item rebuilt");
                self.rebuild_opaque(&o.payload)
            }
        }
    }

    fn source_clip(&mut self, c: &Clip, kind: TrackKind, rate: Rational) -> Result<usize> {
        let limit = self.opts.clip_name_limit;
        let truncated = limit.filter(|&n| c.name.chars().count() > n);
        let name: String = match truncated {
            Some(n) => c.name.chars().take(n).collect(),
            None => c.name.clone(),
        };
        let master = self.master_mob(&name, c.media_reference.as_ref(), kind, rate)?;

        let sc = self.b.add(class::SOURCE_CLIP)?;
        self.data_def(sc, data_definition(kind))?;
        self.b.set(sc, pid::LENGTH, units(c.source_range.duration, rate))?;
        self.b.set(sc, pid::START_TIME, units(c.source_range.start_time, rate))?;
        self.b.set(sc, pid::SOURCE_ID, master)?;
        self.b.set(sc, pid::SOURCE_MOB_SLOT_ID, 1u32)?;
        if truncated.is_some() {
            let full = self.text(&c.name);
            write_comment(&mut self.b, sc, ORIGINAL_NAME, Indirect::string(&full))?;
        }
        self.metadata(sc, &c.metadata)?;
        Ok(sc)
    }

    /// VideoSpeedControl over the clip: the group spans the clip's track
    /// time, the source clip inside it spans the media it consumes.
    fn speed_change(&mut self, c: &Clip, scalar: Rational, kind: TrackKind, rate: Rational) -> Result<usize> {
        let duration = units(c.source_range.duration, rate);
        let mut inner = c.clone();
        inner.effects.clear();
        let consumed = (duration as f64 * scalar.to_f64()).round() as i64;
        inner.source_range.duration = RationalTime::new(consumed, rate);
        let input = self.source_clip(&inner, kind, rate)?;

        self.operation_def(
            opdef::VIDEO_SPEED_CONTROL,
            "VideoSpeedControl",
            datadef::PICTURE,
            1,
            &[paramdef::SPEED_RATIO],
        )?;
        let og = self.b.add(class::OPERATION_GROUP)?;
        self.data_def(og, data_definition(kind))?;
        self.b.set(og, pid::LENGTH, duration)?;
        self.b.set_weak(og, pid::OPERATION, definition_ref(pid::OPERATION_DEFINITIONS, opdef::VIDEO_SPEED_CONTROL))?;
        self.b.push_strong(og, pid::INPUT_SEGMENTS, input)?;

        let param = self.b.add(class::CONSTANT_VALUE)?;
        self.b.set(param, pid::PARAMETER_DEFINITION, paramdef::SPEED_RATIO)?;
        self.b.set(param, pid::CONSTANT_VALUE, Indirect::rational(scalar))?;
        self.b.push_strong(og, pid::PARAMETERS, param)?;
        Ok(og)
    }

    fn transition(&mut self, t: &Transition, kind: TrackKind, rate: Rational) -> Result<usize> {
        let cut = units(t.in_offset, rate);
        let length = cut
            .checked_add(units(t.out_offset, rate))
            .ok_or_else(|| overflow(format_args!("transition {:?}", t.name)))?;
        let (op, op_name) = self.transition_operation(&t.transition_type, kind);
        let op_data_def = if kind == TrackKind::Audio { datadef::SOUND } else { datadef::PICTURE };
        let params: &[Auid] = if opdef::is_dissolve(op) { &[paramdef::LEVEL] } else { &[] };
        self.operation_def(op, &op_name, op_data_def, 2, params)?;

        let og = self.b.add(class::OPERATION_GROUP)?;
        self.data_def(og, data_definition(kind))?;
        self.b.set(og, pid::LENGTH, length)?;
        self.b.set_weak(og, pid::OPERATION, definition_ref(pid::OPERATION_DEFINITIONS, op))?;
        if !t.name.is_empty() {
            let name = self.text(&t.name);
            write_comment(&mut self.b, og, TRANSITION_NAME, Indirect::string(&name))?;
        }

        let tr = self.b.add(class::TRANSITION)?;
        self.data_def(tr, data_definition(kind))?;
        self.b.set(tr, pid::LENGTH, length)?;
        self.b.set(tr, pid::CUT_POINT, cut)?;
        self.b.set_strong(tr, pid::OPERATION_GROUP, og)?;
        self.metadata(tr, &t.metadata)?;
        Ok(tr)
    }

    // ------------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------------

    /// MasterMob for a clip, shared with earlier clips of the same name,
    /// media and kind.
    fn master_mob(&mut self, name: &str, media: Option<&MediaReference>, kind: TrackKind, rate: Rational) -> Result<MobId> {
        let found = self
            .media
            .iter()
            .find(|(k, _)| k.name == name && k.media.as_ref() == media && k.kind == kind)
            .map(|(_, id)| *id);
        if let Some(id) = found {
            return Ok(id);
        }

        let source = match media {
            Some(m) => Some(self.source_mob(m, kind, rate)?),
            None => None,
        };
        let (mob, id) = self.new_mob(class::MASTER_MOB, name)?;
        let slot = self.timeline_slot(mob, 1, "", rate, 0)?;
        let sc = self.b.add(class::SOURCE_CLIP)?;
        self.data_def(sc, data_definition(kind))?;
        self.b.set(sc, pid::SOURCE_ID, source.unwrap_or(MobId::ZERO))?;
        self.b.set(sc, pid::SOURCE_MOB_SLOT_ID, u32::from(source.is_some()))?;
        self.b.set(sc, pid::START_TIME, 0i64)?;
        if let Some(range) = media.and_then(|m| m.available_range) {
            self.b.set(sc, pid::LENGTH, units(range.duration, rate))?;
        }
        self.b.set_strong(slot, pid::SEGMENT, sc)?;
        self.add_mob(mob)?;

        self.media.push((MediaKey { name: name.to_string(), media: media.cloned(), kind }, id));
        Ok(id)
    }

    /// SourceMob with an ImportDescriptor. Its slot's origin and length hold
    /// the available range.
    fn source_mob(&mut self, media: &MediaReference, kind: TrackKind, rate: Rational) -> Result<MobId> {
        let (mob, id) = self.new_mob(class::SOURCE_MOB, &media.name)?;
        let descriptor = self.b.add(class::IMPORT_DESCRIPTOR)?;
        self.b.set_strong(mob, pid::ESSENCE_DESCRIPTION, descriptor)?;
        write_metadata(&mut self.b, mob, &media.metadata, self.opts.metadata_encoding)?;

        let (slot_rate, origin) = match media.available_range {
            Some(r) => (check_rate(&format!("media {:?}", media.name), r.start_time.rate)?, r.start_time.value),
            None => (rate, 0),
        };
        let slot = self.timeline_slot(mob, 1, "", slot_rate, origin)?;
        let sc = self.b.add(class::SOURCE_CLIP)?;
        self.data_def(sc, data_definition(kind))?;
        self.b.set(sc, pid::SOURCE_MOB_SLOT_ID, 0u32)?;
        self.b.set(sc, pid::START_TIME, 0i64)?;
        if let Some(r) = media.available_range {
            self.b.set(sc, pid::LENGTH, units(r.duration, slot_rate))?;
        }
        self.b.set_strong(slot, pid::SEGMENT, sc)?;
        self.add_mob(mob)?;
        Ok(id)
    }
}

/// Build the object graph of `timelines`, ready for [`crate::graph::write_graph`].
pub fn encode_timelines(timelines: &[&Timeline], opts: &EncodeOptions) -> Result<(RawGraph, ClassTable)> {
    let mut cx = EncodeCx::new(opts)?;
    for &tl in timelines {
        if opts.simplify {
            let mut simple = tl.clone();
            simplify_timeline(&mut simple);
            cx.timeline(&simple)?;
        } else {
            cx.timeline(tl)?;
        }
    }
    let meta = cx.meta;
    write_class_definitions(&mut cx.b, meta)?;
    debug!(
        timelines = timelines.len(),
        mobs = cx.mob_ids.len(),
        definitions = cx.definitions.len(),
        "graph built"
    );
    Ok(cx.b.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange::{Gap, TimeRange};

    fn r24() -> Rational {
        Rational::whole(24)
    }

    #[test]
    fn test_extend_inverts_trim() {
        let items = vec![
            Item::Clip(Clip::new("a", TimeRange::from_units(0, 36, r24()))),
            Item::Transition(Transition::dissolve(RationalTime::new(12, r24()), RationalTime::new(12, r24()))),
            Item::Clip(Clip::new("b", TimeRange::from_units(112, 36, r24()))),
            Item::Gap(Gap::new(RationalTime::new(5, r24()))),
        ];
        let out = extend_for_transitions(&items).unwrap();
        let Item::Clip(a) = &out[0] else { panic!() };
        let Item::Clip(b) = &out[2] else { panic!() };
        assert_eq!(a.source_range, TimeRange::from_units(0, 48, r24()));
        assert_eq!(b.source_range, TimeRange::from_units(100, 48, r24()));
        assert_eq!(out[3], items[3]);
    }

    #[test]
    fn test_track_length_overflow() {
        let mut track = Track::new("V1", TrackKind::Video, r24());
        track.push(Gap::new(RationalTime::new(10, r24())));
        track.push(Gap::new(RationalTime::new(i64::MAX, r24())));
        let mut tl = Timeline::new("t", r24());
        tl.tracks.push(track);
        let err = encode_timelines(&[&tl], &EncodeOptions::default()).unwrap_err();
        assert_eq!(err.encode_kind(), Some(EncodeErrorKind::Layout));
    }

    #[test]
    fn test_invalid_rate() {
        let mut tl = Timeline::new("t", r24());
        tl.tracks.push(Track::new("V1", TrackKind::Video, Rational::new(0, 1)));
        let err = encode_timelines(&[&tl], &EncodeOptions::default()).unwrap_err();
        assert_eq!(err.encode_kind(), Some(EncodeErrorKind::InvalidRate));
    }

    #[test]
    fn test_shared_media_mobs() {
        let media = MediaReference::new("tape").with_available_range(TimeRange::from_units(0, 100, r24()));
        let mut track = Track::new("V1", TrackKind::Video, r24());
        for _ in 0..3 {
            track.push(Clip::new("shot", TimeRange::from_units(0, 10, r24())).with_media(media.clone()));
        }
        let mut tl = Timeline::new("t", r24());
        tl.tracks.push(track);
        let (graph, _) = encode_timelines(&[&tl], &EncodeOptions::default()).unwrap();
        let mobs = graph
            .instances
            .iter()
            .filter(|i| i.class == class::MASTER_MOB || i.class == class::SOURCE_MOB)
            .count();
        assert_eq!(mobs, 2);
    }
}
