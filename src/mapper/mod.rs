//! Timeline mapping between AAF compositions and `interchange` timelines.
//!
//! ```text
//! CompositionMob (TopLevel)          Timeline
//! ├── TimelineMobSlot ─ Sequence     ├── Track
//! │   ├── SourceClip ─> MasterMob    │   ├── Clip { media_reference }
//! │   │          └──> SourceMob      │   │
//! │   ├── Transition                 │   ├── Transition
//! │   ├── SourceClip ─> CompositionMob   ├── Nested
//! │   ├── Filler                     │   ├── Gap
//! │   └── (anything else)            │   └── Opaque { payload }
//! ├── TimelineMobSlot ─ Timecode     ├── global_start_time
//! └── EventMobSlot ─ markers         └── markers
//! ```
//!
//! Tagged values on mapped objects become metadata. Properties the mapper
//! does not interpret, and objects it cannot map, are captured into
//! metadata payloads and rebuilt on encode.

mod decode;
mod encode;
mod kinds;
mod markers;
mod metadata;
mod opaque;
mod simplify;

pub use decode::{content_mobs, decode_timelines, top_level_compositions};
pub use encode::encode_timelines;
pub use kinds::{ComponentKind, MobKind};
pub use markers::{attach_to_clips, track_markers, COLOR_ATTRIBUTE};
pub use metadata::{read_metadata, ORIGINAL_NAME, RESERVED_KEY};
pub use opaque::{capture, capture_extensions, write_class_definitions};
pub use simplify::simplify_timeline;
