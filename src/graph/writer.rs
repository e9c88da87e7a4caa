//! [`RawGraph`] to container storages.
//!
//! Each object becomes a storage holding its `properties` stream:
//!
//! ```text
//! /                         Root (CLSID b3b398a5-...)
//! ├── properties
//! ├── referenced properties weak reference paths, written last
//! ├── MetaDictionary-1/
//! └── Header-2/
//!     ├── properties
//!     ├── Content-3b03/
//!     └── IdentificationList-3b06 index
//!         IdentificationList-3b06{0}/ ...
//! ```
//!
//! Collections are re-keyed `0..n` in element order.

use tracing::{debug, trace};

use super::raw::{RawGraph, RawValue};
use crate::cfb::ContainerWriter;
use crate::core::*;
use crate::util::{EncodeErrorKind, Error, Result};

fn layout(detail: impl Into<String>) -> Error {
    Error::encode(EncodeErrorKind::Layout, detail)
}

fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Write every object reachable from the graph root into `out`.
pub fn write_graph(graph: &RawGraph, table: &ClassTable, out: &mut ContainerWriter) -> Result<()> {
    let mut refs = ReferencedProperties::default();
    let mut written = vec![false; graph.len()];
    let mut stack = vec![(graph.root, String::new())];
    let mut count = 0usize;

    while let Some((idx, path)) = stack.pop() {
        let inst = graph.get(idx).ok_or_else(|| layout(format!("reference to missing object #{idx}")))?;
        if std::mem::replace(&mut written[idx], true) {
            return Err(layout(format!("{} object #{idx} is owned twice", table.class_name(inst.class))));
        }
        if path.is_empty() {
            out.set_clsid("", class::ROOT)?;
        } else {
            out.create_storage(&path, inst.class)?;
        }

        let mut props = Vec::with_capacity(inst.properties.len());
        let mut children = Vec::new();
        for p in &inst.properties {
            let value = match &p.value {
                RawValue::Data(v) => DecodedValue::Data(v.clone()),
                RawValue::Opaque(b) => DecodedValue::Opaque(b.clone()),
                RawValue::Weak(w) => DecodedValue::Weak(w.clone()),
                RawValue::Strong { name, target } => {
                    children.push((*target, join(&path, name)));
                    DecodedValue::Strong(name.clone())
                }
                RawValue::StrongVector { name, elements } => {
                    out.write_stream(&join(&path, &index_name(name)), StrongIndex::vector(elements.len()).to_bytes())?;
                    for (i, &e) in elements.iter().enumerate() {
                        children.push((e, join(&path, &element_name(name, i as u32))));
                    }
                    DecodedValue::Collection(name.clone())
                }
                RawValue::StrongSet { name, key_pid, elements } => {
                    let keys = elements
                        .iter()
                        .map(|&e| match graph.get(e).and_then(|el| el.data(*key_pid)) {
                            Some(v) => Ok(encode_value(v)),
                            None => Err(layout(format!("element #{e} of {name:?} lacks key {key_pid:#06x}"))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let key_size = keys.first().map_or(0, Vec::len);
                    if keys.iter().any(|k| k.len() != key_size) || key_size > u8::MAX as usize {
                        return Err(layout(format!("keys of {name:?} differ in size")));
                    }
                    let index = StrongIndex::set(*key_pid, key_size as u8, keys);
                    out.write_stream(&join(&path, &index_name(name)), index.to_bytes())?;
                    for (i, &e) in elements.iter().enumerate() {
                        children.push((e, join(&path, &element_name(name, i as u32))));
                    }
                    DecodedValue::Collection(name.clone())
                }
                RawValue::WeakVector { name, refs: targets } | RawValue::WeakSet { name, refs: targets } => {
                    let index = match targets.first() {
                        Some(first) => WeakIndex {
                            tag: refs.intern(&first.path),
                            key_pid: first.key_pid,
                            keys: targets.iter().map(|w| w.key.clone()).collect(),
                        },
                        None => WeakIndex::default(),
                    };
                    out.write_stream(&join(&path, &index_name(name)), index.to_bytes())?;
                    DecodedValue::Collection(name.clone())
                }
                RawValue::Stream { name, bytes } => {
                    out.write_stream(&join(&path, name), bytes.clone())?;
                    DecodedValue::Stream(name.clone())
                }
            };
            props.push(DecodedProperty { pid: p.pid, form: p.form(), value });
        }

        let bytes = encode_instance(inst.class, &props, table, &mut refs)?;
        out.write_stream(&join(&path, PROPERTIES_STREAM), bytes)?;
        trace!(path = %path, class = %table.class_name(inst.class), "object written");
        count += 1;

        // reversed so siblings are written in order
        stack.extend(children.into_iter().rev());
    }

    out.write_stream(REFERENCED_PROPERTIES_STREAM, refs.to_bytes())?;
    debug!(objects = count, weak_paths = refs.paths.len(), "graph written");
    Ok(())
}
