//! Collapsing of trivial nested compositions.

use interchange::{Item, Nested, TimeRange, Timeline, Track};
use tracing::trace;

/// True for a nested composition holding one track with one item and no markers.
fn is_trivial(n: &Nested) -> bool {
    n.markers.is_empty()
        && n.tracks.len() == 1
        && n.tracks[0].items.len() == 1
        && n.tracks[0].markers.is_empty()
}

/// Replace a trivial nested composition by its only item, trimmed to the
/// range the parent uses. Clips, gaps and nested items collapse; anything
/// else is kept as is.
fn collapse(mut n: Nested) -> Item {
    let collapsible = is_trivial(&n) && matches!(n.tracks[0].items[0], Item::Clip(_) | Item::Gap(_) | Item::Nested(_));
    if !collapsible {
        return Item::Nested(n);
    }
    let range = n.source_range;
    let Some(mut inner) = n.tracks.pop().and_then(|mut t| t.items.pop()) else {
        return Item::Nested(n);
    };
    let shift = |r: TimeRange| {
        let rate = r.start_time.rate;
        TimeRange::new(r.start_time.add(range.start_time).rescaled_to(rate), range.duration.rescaled_to(rate))
    };
    match &mut inner {
        Item::Clip(c) => c.source_range = shift(c.source_range),
        Item::Nested(inner_n) => inner_n.source_range = shift(inner_n.source_range),
        Item::Gap(g) => g.duration = range.duration.rescaled_to(g.duration.rate),
        _ => {}
    }
    trace!(name = %n.name, kind = inner.kind_name(), "nested composition collapsed");
    let md = inner.metadata_mut();
    for (k, v) in n.metadata {
        md.entry(k).or_insert(v);
    }
    inner
}

fn simplify_items(items: Vec<Item>) -> Vec<Item> {
    items
        .into_iter()
        .map(|item| match item {
            Item::Nested(mut n) => {
                for t in &mut n.tracks {
                    simplify_track(t);
                }
                collapse(n)
            }
            other => other,
        })
        .collect()
}

fn simplify_track(track: &mut Track) {
    let items = std::mem::take(&mut track.items);
    track.items = simplify_items(items);
}

/// Collapse every single-track, single-item nested composition, depth first.
pub fn simplify_timeline(timeline: &mut Timeline) {
    for t in &mut timeline.tracks {
        simplify_track(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interchange::{Clip, Rational, RationalTime, TrackKind};

    fn r24() -> Rational {
        Rational::whole(24)
    }

    #[test]
    fn test_collapse_nested_clip() {
        let mut inner = Track::new("V1", TrackKind::Video, r24());
        inner.push(Clip::new("shot", TimeRange::from_units(100, 48, r24())));
        let mut n = Nested::new("comp", TimeRange::from_units(12, 24, r24()));
        n.tracks.push(inner);
        n.metadata.insert("note".into(), "kept".into());

        let mut tl = Timeline::new("t", r24());
        let mut track = Track::new("V1", TrackKind::Video, r24());
        track.push(n);
        tl.tracks.push(track);
        simplify_timeline(&mut tl);

        let Item::Clip(c) = &tl.tracks[0].items[0] else { panic!("not collapsed") };
        assert_eq!(c.name, "shot");
        assert_eq!(c.source_range, TimeRange::from_units(112, 24, r24()));
        assert_eq!(c.metadata.get("note"), Some(&"kept".into()));
    }

    #[test]
    fn test_keeps_multi_track_nested() {
        let mut n = Nested::new("comp", TimeRange::from_units(0, 24, r24()));
        for _ in 0..2 {
            let mut t = Track::new("V", TrackKind::Video, r24());
            t.push(interchange::Gap::new(RationalTime::new(24, r24())));
            n.tracks.push(t);
        }
        assert!(matches!(collapse(n), Item::Nested(_)));
    }
}
