//! Container to [`RawGraph`].
//!
//! The ownership tree is read breadth first. Every instance of one level is
//! decoded on the rayon pool; strong targets are first recorded as indices
//! into the instance's own child list and then renumbered into the arena once
//! the level is complete:
//!
//! ```text
//! level k:    [ a  b  c ]                 arena s .. s+n
//! children:     a0 a1 | c0                local 0,1 | 0
//! level k+1:  [ a0 a1 c0 ]                arena s+n+cum+local
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use smallvec::SmallVec;
use tracing::{debug, trace};

use super::raw::{RawGraph, RawInstance, RawProperty, RawValue};
use crate::cfb::{Container, EntryId};
use crate::core::*;
use crate::util::{DecodeErrorKind, Error, Result};

/// Counters shared by a decode.
#[derive(Debug, Default)]
pub struct LoadStats {
    pub instances_decoded: AtomicUsize,
}

impl LoadStats {
    pub fn instances(&self) -> usize {
        self.instances_decoded.load(Ordering::Relaxed)
    }
}

/// One decoded instance whose strong targets are local child indices.
struct Pending {
    instance: RawInstance,
    children: Vec<EntryId>,
}

fn missing(c: &Container, parent: EntryId, name: &str) -> Error {
    Error::decode(
        DecodeErrorKind::Structure,
        format!("{:?} references missing storage {name:?}", c.path_of(parent)),
    )
}

fn cancelled() -> Error {
    Error::decode(DecodeErrorKind::Cancelled, "decode cancelled")
}

/// Decode every object reachable from the root storage.
pub fn load_graph(
    c: &Container,
    table: &ClassTable,
    cancel: Option<&AtomicBool>,
    stats: &LoadStats,
) -> Result<RawGraph> {
    let refs = read_referenced_properties(c)?;
    let mut graph = RawGraph::default();
    let mut level = vec![c.root()];
    let mut level_start = 0usize;
    let mut depth = 0usize;

    while !level.is_empty() {
        if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
            return Err(cancelled());
        }
        let decoded: Vec<Pending> = level
            .par_iter()
            .map(|&id| {
                let p = load_instance(c, id, table, &refs)?;
                stats.instances_decoded.fetch_add(1, Ordering::Relaxed);
                Ok(p)
            })
            .collect::<Result<_>>()?;

        let next_start = level_start + decoded.len();
        let mut next = Vec::new();
        for mut p in decoded {
            let base = next_start + next.len();
            for prop in p.instance.properties.iter_mut() {
                match &mut prop.value {
                    RawValue::Strong { target, .. } => *target += base,
                    RawValue::StrongVector { elements, .. } | RawValue::StrongSet { elements, .. } => {
                        elements.iter_mut().for_each(|e| *e += base);
                    }
                    _ => {}
                }
            }
            next.extend(p.children);
            graph.add(p.instance);
        }
        trace!(depth, instances = level.len(), "level decoded");
        level_start = next_start;
        level = next;
        depth += 1;
    }

    debug!(instances = graph.len(), depth, "graph loaded");
    Ok(graph)
}

fn load_instance(c: &Container, id: EntryId, table: &ClassTable, refs: &ReferencedProperties) -> Result<Pending> {
    let class_id = if id == c.root() { class::ROOT } else { c.clsid(id) };
    let props_id = c.child(id, PROPERTIES_STREAM).ok_or_else(|| {
        Error::decode(DecodeErrorKind::Stream, format!("{:?} has no properties stream", c.path_of(id)))
    })?;
    let bytes = c.read_entry(props_id)?;
    let decoded = decode_instance(&bytes, class_id, table, refs).map_err(|e| match e {
        Error::Decode(mut d) => {
            d.detail = format!("{} (object {:?})", d.detail, c.path_of(id));
            Error::Decode(d)
        }
        other => other,
    })?;
    trace!(path = %c.path_of(id), class = %table.class_name(class_id), "instance decoded");

    let mut children: Vec<EntryId> = Vec::new();
    let mut local = |e: EntryId| -> usize {
        // a storage named twice maps to one instance (reported by the resolver)
        match children.iter().position(|&x| x == e) {
            Some(i) => i,
            None => {
                children.push(e);
                children.len() - 1
            }
        }
    };

    let mut properties = SmallVec::with_capacity(decoded.properties.len());
    for prop in decoded.properties {
        let value = match (prop.form, prop.value) {
            (_, DecodedValue::Data(v)) => RawValue::Data(v),
            (_, DecodedValue::Opaque(b)) => RawValue::Opaque(b),
            (_, DecodedValue::Weak(w)) => RawValue::Weak(w),
            (_, DecodedValue::Strong(name)) => {
                let e = c.child(id, &name).ok_or_else(|| missing(c, id, &name))?;
                RawValue::Strong { target: local(e), name }
            }
            (_, DecodedValue::Stream(name)) => {
                let e = c.child(id, &name).ok_or_else(|| missing(c, id, &name))?;
                RawValue::Stream { bytes: c.read_entry(e)?, name }
            }
            (StoredForm::StrongRefVector, DecodedValue::Collection(name)) => {
                let index = StrongIndex::parse_vector(&read_index(c, id, &name)?)?;
                let elements = collection_elements(c, id, &name, &index)?.into_iter().map(&mut local).collect();
                RawValue::StrongVector { name, elements }
            }
            (StoredForm::StrongRefSet, DecodedValue::Collection(name)) => {
                let index = StrongIndex::parse_set(&read_index(c, id, &name)?)?;
                let key_pid = index.key.map_or(0, |(pid, _)| pid);
                let elements = collection_elements(c, id, &name, &index)?.into_iter().map(&mut local).collect();
                RawValue::StrongSet { name, key_pid, elements }
            }
            (form, DecodedValue::Collection(name)) => {
                let index = WeakIndex::parse(&read_index(c, id, &name)?)?;
                let path = if index.keys.is_empty() { Vec::new() } else { weak_path(refs, index.tag)? };
                let refs = index
                    .keys
                    .into_iter()
                    .map(|key| WeakRef { path: path.clone(), key_pid: index.key_pid, key })
                    .collect();
                if form == StoredForm::WeakRefSet {
                    RawValue::WeakSet { name, refs }
                } else {
                    RawValue::WeakVector { name, refs }
                }
            }
        };
        properties.push(RawProperty::new(prop.pid, value));
    }

    Ok(Pending {
        instance: RawInstance { class: class_id, path: c.path_of(id), properties },
        children,
    })
}

fn read_index(c: &Container, parent: EntryId, name: &str) -> Result<Vec<u8>> {
    let idx = index_name(name);
    let e = c.child(parent, &idx).ok_or_else(|| {
        Error::decode(DecodeErrorKind::Stream, format!("{:?} has no stream {idx:?}", c.path_of(parent)))
    })?;
    c.read_entry(e)
}

fn collection_elements(c: &Container, parent: EntryId, name: &str, index: &StrongIndex) -> Result<Vec<EntryId>> {
    index
        .entries
        .iter()
        .map(|e| {
            let el = element_name(name, e.local_key);
            c.child(parent, &el).ok_or_else(|| missing(c, parent, &el))
        })
        .collect()
}
