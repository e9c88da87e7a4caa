//! Built-in AAF object model.
//!
//! Class and property definitions for the baseline classes the mapper reads
//! and writes, plus the well-known definition identifiers (data, operation,
//! parameter definitions and usage codes). File-specific extension classes
//! are merged on top of these by [`super::ClassTable`].

use std::sync::OnceLock;

use super::types::TypeTag;
use crate::util::Auid;

// ============================================================================
// Definitions
// ============================================================================

/// A property of a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDef {
    pub pid: u16,
    pub name: String,
    pub tag: TypeTag,
    /// Declared type AUID when it differs from the tag's own id.
    pub type_id: Option<Auid>,
    pub optional: bool,
    /// Values identify their object globally.
    pub unique: bool,
    /// Values are identifiers of objects registered under this key pid.
    pub references: Option<u16>,
}

impl PropertyDef {
    pub fn new(pid: u16, name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            pid,
            name: name.into(),
            tag,
            type_id: None,
            optional: false,
            unique: false,
            references: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, key_pid: u16) -> Self {
        self.references = Some(key_pid);
        self
    }

    /// Type AUID written to a property definition.
    pub fn declared_type(&self) -> Option<Auid> {
        self.type_id.or_else(|| self.tag.type_id())
    }
}

/// A class and the properties it introduces (inherited ones live on parents).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub id: Auid,
    pub name: String,
    pub parent: Option<Auid>,
    pub concrete: bool,
    pub properties: Vec<PropertyDef>,
}

impl ClassDef {
    fn new(id: Auid, name: &str, parent: Option<Auid>, concrete: bool, properties: Vec<PropertyDef>) -> Self {
        Self { id, name: name.to_string(), parent, concrete, properties }
    }

    pub fn property(&self, pid: u16) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.pid == pid)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Property ids.
pub mod pid {
    // root pseudo-object
    pub const ROOT_META_DICTIONARY: u16 = 0x0001;
    pub const ROOT_HEADER: u16 = 0x0002;
    // MetaDictionary / meta definitions
    pub const CLASS_DEFINITIONS: u16 = 0x0003;
    pub const TYPE_DEFINITIONS: u16 = 0x0004;
    pub const META_IDENTIFICATION: u16 = 0x0005;
    pub const META_NAME: u16 = 0x0006;
    pub const META_DESCRIPTION: u16 = 0x0007;
    pub const PARENT_CLASS: u16 = 0x0008;
    pub const PROPERTIES: u16 = 0x0009;
    pub const IS_CONCRETE: u16 = 0x000A;
    pub const PROPERTY_TYPE: u16 = 0x000B;
    pub const IS_OPTIONAL: u16 = 0x000C;
    pub const LOCAL_IDENTIFICATION: u16 = 0x000D;
    pub const IS_UNIQUE_IDENTIFIER: u16 = 0x000E;
    // InterchangeObject
    pub const OBJECT_CLASS: u16 = 0x0101;
    pub const GENERATION: u16 = 0x0102;
    // Component
    pub const DATA_DEFINITION: u16 = 0x0201;
    pub const LENGTH: u16 = 0x0202;
    pub const COMPONENT_KLV_DATA: u16 = 0x0203;
    pub const COMPONENT_USER_COMMENTS: u16 = 0x0204;
    pub const COMPONENT_ATTRIBUTES: u16 = 0x0205;
    // EssenceGroup
    pub const CHOICES: u16 = 0x0501;
    pub const STILL_FRAME: u16 = 0x0502;
    // Event / markers
    pub const POSITION: u16 = 0x0601;
    pub const COMMENT: u16 = 0x0602;
    pub const ANNOTATION: u16 = 0x0901;
    pub const DESCRIPTION: u16 = 0x6101;
    pub const DESCRIBED_SLOTS: u16 = 0x6102;
    // OperationGroup
    pub const OPERATION: u16 = 0x0B01;
    pub const INPUT_SEGMENTS: u16 = 0x0B02;
    pub const PARAMETERS: u16 = 0x0B03;
    pub const BYPASS_OVERRIDE: u16 = 0x0B04;
    pub const RENDERING: u16 = 0x0B05;
    // NestedScope / ScopeReference / Pulldown
    pub const NESTED_SLOTS: u16 = 0x0C01;
    pub const INPUT_SEGMENT: u16 = 0x0D01;
    pub const RELATIVE_SCOPE: u16 = 0x0E01;
    pub const RELATIVE_SLOT: u16 = 0x0E02;
    // Selector
    pub const SELECTED: u16 = 0x0F01;
    pub const ALTERNATES: u16 = 0x0F02;
    // Sequence
    pub const COMPONENTS: u16 = 0x1001;
    // SourceReference / SourceClip
    pub const SOURCE_ID: u16 = 0x1101;
    pub const SOURCE_MOB_SLOT_ID: u16 = 0x1102;
    pub const CHANNEL_IDS: u16 = 0x1103;
    pub const MONO_SOURCE_SLOT_IDS: u16 = 0x1104;
    pub const START_TIME: u16 = 0x1201;
    pub const FADE_IN_LENGTH: u16 = 0x1202;
    pub const FADE_OUT_LENGTH: u16 = 0x1204;
    // Timecode
    pub const TIMECODE_START: u16 = 0x1501;
    pub const TIMECODE_FPS: u16 = 0x1502;
    pub const TIMECODE_DROP: u16 = 0x1503;
    // Transition
    pub const OPERATION_GROUP: u16 = 0x1801;
    pub const CUT_POINT: u16 = 0x1802;
    // ContentStorage
    pub const MOBS: u16 = 0x1901;
    pub const ESSENCE_DATA: u16 = 0x1902;
    // DefinitionObject
    pub const IDENTIFICATION: u16 = 0x1B01;
    pub const NAME: u16 = 0x1B02;
    pub const DEF_DESCRIPTION: u16 = 0x1B03;
    // OperationDefinition / ParameterDefinition
    pub const OPDEF_DATA_DEFINITION: u16 = 0x1E01;
    pub const IS_TIME_WARP: u16 = 0x1E02;
    pub const DEGRADE_TO: u16 = 0x1E03;
    pub const OPERATION_CATEGORY: u16 = 0x1E06;
    pub const NUMBER_INPUTS: u16 = 0x1E07;
    pub const BYPASS: u16 = 0x1E08;
    pub const PARAMETERS_DEFINED: u16 = 0x1E09;
    pub const PARAMETER_TYPE: u16 = 0x1F01;
    pub const DISPLAY_UNITS: u16 = 0x1F03;
    // Dictionary
    pub const OPERATION_DEFINITIONS: u16 = 0x2603;
    pub const PARAMETER_DEFINITIONS: u16 = 0x2604;
    pub const DATA_DEFINITIONS: u16 = 0x2605;
    pub const PLUGIN_DEFINITIONS: u16 = 0x2606;
    pub const CODEC_DEFINITIONS: u16 = 0x2607;
    pub const CONTAINER_DEFINITIONS: u16 = 0x2608;
    pub const INTERPOLATION_DEFINITIONS: u16 = 0x2609;
    pub const KLV_DATA_DEFINITIONS: u16 = 0x260A;
    pub const TAGGED_VALUE_DEFINITIONS: u16 = 0x260B;
    // EssenceData
    pub const ESSENCE_MOB_ID: u16 = 0x2701;
    pub const ESSENCE_STREAM: u16 = 0x2702;
    pub const SAMPLE_INDEX: u16 = 0x2B01;
    // EssenceDescriptor family
    pub const LOCATOR: u16 = 0x2F01;
    pub const SAMPLE_RATE: u16 = 0x3001;
    pub const DESCRIPTOR_LENGTH: u16 = 0x3002;
    pub const CONTAINER_FORMAT: u16 = 0x3004;
    pub const CODEC_DEFINITION: u16 = 0x3005;
    pub const FILE_DESCRIPTORS: u16 = 0x3F01;
    // Header
    pub const BYTE_ORDER: u16 = 0x3B01;
    pub const LAST_MODIFIED: u16 = 0x3B02;
    pub const CONTENT: u16 = 0x3B03;
    pub const DICTIONARY: u16 = 0x3B04;
    pub const VERSION: u16 = 0x3B05;
    pub const IDENTIFICATION_LIST: u16 = 0x3B06;
    pub const OBJECT_MODEL_VERSION: u16 = 0x3B07;
    pub const OPERATIONAL_PATTERN: u16 = 0x3B09;
    pub const ESSENCE_CONTAINERS: u16 = 0x3B0A;
    pub const DESCRIPTIVE_SCHEMES: u16 = 0x3B0B;
    // Identification
    pub const COMPANY_NAME: u16 = 0x3C01;
    pub const PRODUCT_NAME: u16 = 0x3C02;
    pub const PRODUCT_VERSION: u16 = 0x3C03;
    pub const PRODUCT_VERSION_STRING: u16 = 0x3C04;
    pub const PRODUCT_ID: u16 = 0x3C05;
    pub const DATE: u16 = 0x3C06;
    pub const TOOLKIT_VERSION: u16 = 0x3C07;
    pub const PLATFORM: u16 = 0x3C08;
    pub const GENERATION_AUID: u16 = 0x3C09;
    // Locators
    pub const URL_STRING: u16 = 0x4001;
    pub const LOCATOR_NAME: u16 = 0x4101;
    // Mob
    pub const MOB_ID: u16 = 0x4401;
    pub const MOB_NAME: u16 = 0x4402;
    pub const SLOTS: u16 = 0x4403;
    pub const MOB_LAST_MODIFIED: u16 = 0x4404;
    pub const CREATION_TIME: u16 = 0x4405;
    pub const MOB_USER_COMMENTS: u16 = 0x4406;
    pub const MOB_KLV_DATA: u16 = 0x4407;
    pub const USAGE_CODE: u16 = 0x4408;
    pub const MOB_ATTRIBUTES: u16 = 0x4409;
    pub const DEFAULT_FADE_LENGTH: u16 = 0x4501;
    pub const ESSENCE_DESCRIPTION: u16 = 0x4701;
    // MobSlot
    pub const SLOT_ID: u16 = 0x4801;
    pub const SLOT_NAME: u16 = 0x4802;
    pub const SEGMENT: u16 = 0x4803;
    pub const PHYSICAL_TRACK_NUMBER: u16 = 0x4804;
    pub const EVENT_EDIT_RATE: u16 = 0x4901;
    pub const EVENT_SLOT_ORIGIN: u16 = 0x4902;
    pub const EDIT_RATE: u16 = 0x4B01;
    pub const ORIGIN: u16 = 0x4B02;
    pub const MARK_IN: u16 = 0x4B03;
    pub const MARK_OUT: u16 = 0x4B04;
    pub const USER_POS: u16 = 0x4B05;
    // Parameters
    pub const PARAMETER_DEFINITION: u16 = 0x4C01;
    pub const INTERPOLATION: u16 = 0x4D01;
    pub const POINT_LIST: u16 = 0x4D02;
    pub const CONSTANT_VALUE: u16 = 0x4E01;
    // TaggedValue / ControlPoint / KLVData
    pub const TAG_NAME: u16 = 0x5001;
    pub const TAG_VALUE: u16 = 0x5003;
    pub const CONTROL_POINT_VALUE: u16 = 0x5004;
    pub const CONTROL_POINT_TIME: u16 = 0x5005;
    pub const KLV_VALUE: u16 = 0x5101;
}

const CLASS_TAIL: [u8; 8] = [0x06, 0x0e, 0x2b, 0x34, 0x02, 0x06, 0x01, 0x01];

const fn class_id(code: u16) -> Auid {
    Auid::new(0x0d01_0101, 0x0101, code, CLASS_TAIL)
}

const fn meta_class_id(code: u16) -> Auid {
    Auid::new(0x0d01_0101, code, 0x0000, CLASS_TAIL)
}

/// Class AUIDs.
pub mod class {
    use super::{class_id, meta_class_id};
    use crate::util::Auid;

    /// Pseudo class of the root storage.
    pub const ROOT: Auid = Auid::new(0xb3b3_98a5, 0x1c90, 0x11d4, [0x80, 0x53, 0x08, 0x00, 0x36, 0x21, 0x08, 0x04]);

    pub const INTERCHANGE_OBJECT: Auid = class_id(0x0100);
    pub const COMPONENT: Auid = class_id(0x0200);
    pub const SEGMENT: Auid = class_id(0x0300);
    pub const ESSENCE_GROUP: Auid = class_id(0x0500);
    pub const EVENT: Auid = class_id(0x0600);
    pub const COMMENT_MARKER: Auid = class_id(0x0800);
    pub const FILLER: Auid = class_id(0x0900);
    pub const OPERATION_GROUP: Auid = class_id(0x0A00);
    pub const NESTED_SCOPE: Auid = class_id(0x0B00);
    pub const PULLDOWN: Auid = class_id(0x0C00);
    pub const SCOPE_REFERENCE: Auid = class_id(0x0D00);
    pub const SELECTOR: Auid = class_id(0x0E00);
    pub const SEQUENCE: Auid = class_id(0x0F00);
    pub const SOURCE_REFERENCE: Auid = class_id(0x1000);
    pub const SOURCE_CLIP: Auid = class_id(0x1100);
    pub const TIMECODE: Auid = class_id(0x1400);
    pub const TRANSITION: Auid = class_id(0x1700);
    pub const CONTENT_STORAGE: Auid = class_id(0x1800);
    pub const CONTROL_POINT: Auid = class_id(0x1900);
    pub const DEFINITION_OBJECT: Auid = class_id(0x1A00);
    pub const DATA_DEFINITION: Auid = class_id(0x1B00);
    pub const OPERATION_DEFINITION: Auid = class_id(0x1C00);
    pub const PARAMETER_DEFINITION: Auid = class_id(0x1D00);
    pub const PLUGIN_DEFINITION: Auid = class_id(0x1E00);
    pub const CODEC_DEFINITION: Auid = class_id(0x1F00);
    pub const CONTAINER_DEFINITION: Auid = class_id(0x2000);
    pub const INTERPOLATION_DEFINITION: Auid = class_id(0x2100);
    pub const DICTIONARY: Auid = class_id(0x2200);
    pub const ESSENCE_DATA: Auid = class_id(0x2300);
    pub const ESSENCE_DESCRIPTOR: Auid = class_id(0x2400);
    pub const FILE_DESCRIPTOR: Auid = class_id(0x2500);
    pub const AIFC_DESCRIPTOR: Auid = class_id(0x2600);
    pub const DIGITAL_IMAGE_DESCRIPTOR: Auid = class_id(0x2700);
    pub const CDCI_DESCRIPTOR: Auid = class_id(0x2800);
    pub const RGBA_DESCRIPTOR: Auid = class_id(0x2900);
    pub const WAVE_DESCRIPTOR: Auid = class_id(0x2C00);
    pub const TAPE_DESCRIPTOR: Auid = class_id(0x2E00);
    pub const HEADER: Auid = class_id(0x2F00);
    pub const IDENTIFICATION: Auid = class_id(0x3000);
    pub const LOCATOR: Auid = class_id(0x3100);
    pub const NETWORK_LOCATOR: Auid = class_id(0x3200);
    pub const TEXT_LOCATOR: Auid = class_id(0x3300);
    pub const MOB: Auid = class_id(0x3400);
    pub const COMPOSITION_MOB: Auid = class_id(0x3500);
    pub const MASTER_MOB: Auid = class_id(0x3600);
    pub const SOURCE_MOB: Auid = class_id(0x3700);
    pub const MOB_SLOT: Auid = class_id(0x3800);
    pub const EVENT_MOB_SLOT: Auid = class_id(0x3900);
    pub const STATIC_MOB_SLOT: Auid = class_id(0x3A00);
    pub const TIMELINE_MOB_SLOT: Auid = class_id(0x3B00);
    pub const PARAMETER: Auid = class_id(0x3C00);
    pub const CONSTANT_VALUE: Auid = class_id(0x3D00);
    pub const VARYING_VALUE: Auid = class_id(0x3E00);
    pub const TAGGED_VALUE: Auid = class_id(0x3F00);
    pub const KLV_DATA: Auid = class_id(0x4000);
    pub const DESCRIPTIVE_MARKER: Auid = class_id(0x4100);
    pub const SOUND_DESCRIPTOR: Auid = class_id(0x4200);
    pub const MULTIPLE_DESCRIPTOR: Auid = class_id(0x4400);
    pub const PCM_DESCRIPTOR: Auid = class_id(0x4800);
    pub const PHYSICAL_DESCRIPTOR: Auid = class_id(0x4900);
    pub const IMPORT_DESCRIPTOR: Auid = class_id(0x4A00);
    pub const RECORDING_DESCRIPTOR: Auid = class_id(0x4B00);
    pub const TAGGED_VALUE_DEFINITION: Auid = class_id(0x4C00);
    pub const KLV_DATA_DEFINITION: Auid = class_id(0x4D00);

    pub const CLASS_DEFINITION: Auid = meta_class_id(0x0201);
    pub const PROPERTY_DEFINITION: Auid = meta_class_id(0x0202);
    pub const TYPE_DEFINITION: Auid = meta_class_id(0x0203);
    pub const META_DEFINITION: Auid = meta_class_id(0x0224);
    pub const META_DICTIONARY: Auid = meta_class_id(0x0225);

    /// Concrete type definition classes and their names.
    pub const TYPE_DEFINITION_KINDS: [(u16, &str); 15] = [
        (0x0204, "TypeDefinitionInteger"),
        (0x0205, "TypeDefinitionStrongObjectReference"),
        (0x0206, "TypeDefinitionWeakObjectReference"),
        (0x0207, "TypeDefinitionEnumeration"),
        (0x0208, "TypeDefinitionFixedArray"),
        (0x0209, "TypeDefinitionVariableArray"),
        (0x020A, "TypeDefinitionSet"),
        (0x020B, "TypeDefinitionString"),
        (0x020C, "TypeDefinitionStream"),
        (0x020D, "TypeDefinitionRecord"),
        (0x020E, "TypeDefinitionRename"),
        (0x0220, "TypeDefinitionExtendibleEnumeration"),
        (0x0221, "TypeDefinitionIndirect"),
        (0x0222, "TypeDefinitionOpaque"),
        (0x0223, "TypeDefinitionCharacter"),
    ];

    pub fn type_definition_kind(code: u16) -> Auid {
        meta_class_id(code)
    }
}

const DEF_TAIL_V1: [u8; 8] = [0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x01];
const DEF_TAIL_V5: [u8; 8] = [0x06, 0x0e, 0x2b, 0x34, 0x04, 0x01, 0x01, 0x05];

/// Data definition AUIDs.
pub mod datadef {
    use super::{DEF_TAIL_V1, DEF_TAIL_V5};
    use crate::util::Auid;

    pub const PICTURE: Auid = Auid::new(0x0103_0202, 0x0100, 0x0000, DEF_TAIL_V1);
    pub const SOUND: Auid = Auid::new(0x0103_0202, 0x0200, 0x0000, DEF_TAIL_V1);
    pub const TIMECODE: Auid = Auid::new(0x0103_0201, 0x0100, 0x0000, DEF_TAIL_V1);
    pub const EDGECODE: Auid = Auid::new(0x0103_0201, 0x0200, 0x0000, DEF_TAIL_V1);
    pub const DESCRIPTIVE_METADATA: Auid = Auid::new(0x0103_0201, 0x1000, 0x0000, DEF_TAIL_V1);
    pub const AUXILIARY: Auid = Auid::new(0x0103_0203, 0x0100, 0x0000, DEF_TAIL_V5);
    pub const LEGACY_PICTURE: Auid =
        Auid::new(0x6f3c_8ce1, 0x6cef, 0x11d2, [0x80, 0x7d, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f]);
    pub const LEGACY_SOUND: Auid =
        Auid::new(0x78e1_ebe1, 0x6cef, 0x11d2, [0x80, 0x7d, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f]);
    pub const LEGACY_TIMECODE: Auid =
        Auid::new(0x7f27_5e81, 0x77e5, 0x11d2, [0x80, 0x7f, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f]);
    pub const MATTE: Auid =
        Auid::new(0x05cb_a731, 0x1daa, 0x11d3, [0x80, 0xad, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f]);
    pub const PICTURE_WITH_MATTE: Auid =
        Auid::new(0x05cb_a732, 0x1daa, 0x11d3, [0x80, 0xad, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f]);

    pub const ALL: [(Auid, &str); 11] = [
        (PICTURE, "Picture"),
        (SOUND, "Sound"),
        (TIMECODE, "Timecode"),
        (EDGECODE, "Edgecode"),
        (DESCRIPTIVE_METADATA, "DescriptiveMetadata"),
        (AUXILIARY, "Auxiliary"),
        (LEGACY_PICTURE, "Picture"),
        (LEGACY_SOUND, "Sound"),
        (LEGACY_TIMECODE, "Timecode"),
        (MATTE, "Matte"),
        (PICTURE_WITH_MATTE, "PictureWithMatte"),
    ];

    pub fn is_picture(id: Auid) -> bool {
        matches!(id, PICTURE | LEGACY_PICTURE | PICTURE_WITH_MATTE)
    }

    pub fn is_sound(id: Auid) -> bool {
        matches!(id, SOUND | LEGACY_SOUND)
    }

    pub fn is_timecode(id: Auid) -> bool {
        matches!(id, TIMECODE | LEGACY_TIMECODE)
    }
}

const EFFECT_TAIL: [u8; 8] = [0x8a, 0x29, 0x00, 0x50, 0x04, 0x0e, 0xf7, 0xd2];

/// Operation definition AUIDs.
pub mod opdef {
    use super::EFFECT_TAIL;
    use crate::util::Auid;

    pub const VIDEO_DISSOLVE: Auid = Auid::new(0x0c3b_ea40, 0xfc05, 0x11d2, EFFECT_TAIL);
    pub const MONO_AUDIO_DISSOLVE: Auid = Auid::new(0x0c3b_ea44, 0xfc05, 0x11d2, EFFECT_TAIL);
    pub const VIDEO_SPEED_CONTROL: Auid =
        Auid::new(0x9d2e_a890, 0x0968, 0x11d3, [0x8a, 0x38, 0x00, 0x50, 0x04, 0x0e, 0xf7, 0xd2]);
    pub const VIDEO_REPEAT: Auid =
        Auid::new(0x9d2e_a891, 0x0968, 0x11d3, [0x8a, 0x38, 0x00, 0x50, 0x04, 0x0e, 0xf7, 0xd2]);

    pub const ALL: [(Auid, &str); 4] = [
        (VIDEO_DISSOLVE, "VideoDissolve"),
        (MONO_AUDIO_DISSOLVE, "MonoAudioDissolve"),
        (VIDEO_SPEED_CONTROL, "VideoSpeedControl"),
        (VIDEO_REPEAT, "VideoRepeat"),
    ];

    pub fn is_dissolve(id: Auid) -> bool {
        matches!(id, VIDEO_DISSOLVE | MONO_AUDIO_DISSOLVE)
    }
}

/// Parameter definition AUIDs.
pub mod paramdef {
    use crate::util::Auid;

    pub const SPEED_RATIO: Auid =
        Auid::new(0x7255_9a80, 0x24d7, 0x11d3, [0x8a, 0x50, 0x00, 0x50, 0x04, 0x0e, 0xf7, 0xd2]);
    pub const LEVEL: Auid =
        Auid::new(0xe496_2320, 0x2267, 0x11d3, [0x8a, 0x4c, 0x00, 0x50, 0x04, 0x0e, 0xf7, 0xd2]);

    pub const ALL: [(Auid, &str); 2] = [(SPEED_RATIO, "SpeedRatio"), (LEVEL, "Level")];
}

/// Container, codec and interpolation definitions files may reference without declaring.
pub mod miscdef {
    use crate::util::Auid;

    const TAIL: [u8; 8] = [0x80, 0x9b, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f];
    const INTERP_TAIL: [u8; 8] = [0x80, 0xa9, 0x00, 0x60, 0x08, 0x14, 0x3e, 0x6f];

    pub const CONTAINER_AAF: Auid = Auid::new(0x4313_b571, 0xd8ba, 0x11d2, TAIL);
    pub const CONTAINER_EXTERNAL: Auid = Auid::new(0x4313_b572, 0xd8ba, 0x11d2, TAIL);
    pub const INTERPOLATION_LINEAR: Auid = Auid::new(0x5b6c_85a4, 0x0ede, 0x11d3, INTERP_TAIL);
    pub const INTERPOLATION_CONSTANT: Auid = Auid::new(0x5b6c_85a5, 0x0ede, 0x11d3, INTERP_TAIL);

    pub const ALL: [Auid; 4] = [CONTAINER_AAF, CONTAINER_EXTERNAL, INTERPOLATION_LINEAR, INTERPOLATION_CONSTANT];
}

/// Mob usage codes.
pub mod usage {
    use super::DEF_TAIL_V5;
    use crate::util::Auid;

    pub const SUB_CLIP: Auid = Auid::new(0x0d01_0101, 0x0101, 0x0000, DEF_TAIL_V5);
    pub const ADJUSTED_CLIP: Auid = Auid::new(0x0d01_0101, 0x0102, 0x0000, DEF_TAIL_V5);
    pub const TOP_LEVEL: Auid = Auid::new(0x0d01_0101, 0x0500, 0x0000, DEF_TAIL_V5);
    pub const LOWER_LEVEL: Auid = Auid::new(0x0d01_0101, 0x0600, 0x0000, DEF_TAIL_V5);
}

/// Name of a well-known definition AUID.
pub fn definition_name(id: Auid) -> Option<&'static str> {
    datadef::ALL
        .iter()
        .chain(opdef::ALL.iter())
        .chain(paramdef::ALL.iter())
        .find(|(a, _)| *a == id)
        .map(|(_, n)| *n)
}

/// True if `key` under `key_pid` names a definition every reader knows,
/// so files may reference it without declaring it.
pub fn is_builtin_definition(key_pid: u16, key: &[u8]) -> bool {
    let Some(id) = Auid::from_slice(key) else {
        return false;
    };
    match key_pid {
        pid::IDENTIFICATION => definition_name(id).is_some() || miscdef::ALL.contains(&id),
        pid::META_IDENTIFICATION => {
            builtin_classes().iter().any(|c| c.id == id)
                || !matches!(TypeTag::from_type_id(id), TypeTag::Opaque(_))
        }
        _ => false,
    }
}

// ============================================================================
// Class table
// ============================================================================

fn p(pid: u16, name: &str, tag: TypeTag) -> PropertyDef {
    PropertyDef::new(pid, name, tag)
}

fn o(pid: u16, name: &str, tag: TypeTag) -> PropertyDef {
    PropertyDef::new(pid, name, tag).optional()
}

const DEF_SET: TypeTag = TypeTag::StrongRefSet { key_pid: pid::IDENTIFICATION };
const META_SET: TypeTag = TypeTag::StrongRefSet { key_pid: pid::META_IDENTIFICATION };

/// The baseline classes.
pub fn builtin_classes() -> &'static [ClassDef] {
    static CLASSES: OnceLock<Vec<ClassDef>> = OnceLock::new();
    CLASSES.get_or_init(build_classes)
}

fn build_classes() -> Vec<ClassDef> {
    use class as c;
    use TypeTag as T;
    use pid as k;

    let io = Some(c::INTERCHANGE_OBJECT);
    let mut v = vec![
        ClassDef::new(c::ROOT, "Root", None, true, vec![
            p(k::ROOT_META_DICTIONARY, "MetaDictionary", T::StrongRef),
            p(k::ROOT_HEADER, "Header", T::StrongRef),
        ]),
        ClassDef::new(c::INTERCHANGE_OBJECT, "InterchangeObject", None, false, vec![
            o(k::OBJECT_CLASS, "ObjectClass", T::Auid),
            o(k::GENERATION, "Generation", T::Auid),
        ]),
        // Components
        ClassDef::new(c::COMPONENT, "Component", io, false, vec![
            p(k::DATA_DEFINITION, "DataDefinition", T::WeakRef),
            o(k::LENGTH, "Length", T::Int64),
            o(k::COMPONENT_KLV_DATA, "KLVData", T::StrongRefVector),
            o(k::COMPONENT_USER_COMMENTS, "UserComments", T::StrongRefVector),
            o(k::COMPONENT_ATTRIBUTES, "Attributes", T::StrongRefVector),
        ]),
        ClassDef::new(c::SEGMENT, "Segment", Some(c::COMPONENT), false, vec![]),
        ClassDef::new(c::ESSENCE_GROUP, "EssenceGroup", Some(c::SEGMENT), true, vec![
            p(k::CHOICES, "Choices", T::StrongRefVector),
            o(k::STILL_FRAME, "StillFrame", T::StrongRef),
        ]),
        ClassDef::new(c::EVENT, "Event", Some(c::SEGMENT), false, vec![
            p(k::POSITION, "Position", T::Int64),
            o(k::COMMENT, "Comment", T::String),
        ]),
        ClassDef::new(c::COMMENT_MARKER, "CommentMarker", Some(c::EVENT), true, vec![
            o(k::ANNOTATION, "Annotation", T::StrongRef),
        ]),
        ClassDef::new(c::DESCRIPTIVE_MARKER, "DescriptiveMarker", Some(c::COMMENT_MARKER), true, vec![
            o(k::DESCRIBED_SLOTS, "DescribedSlots", T::UInt32Array),
            o(k::DESCRIPTION, "Description", T::StrongRef),
        ]),
        ClassDef::new(c::FILLER, "Filler", Some(c::SEGMENT), true, vec![]),
        ClassDef::new(c::OPERATION_GROUP, "OperationGroup", Some(c::SEGMENT), true, vec![
            p(k::OPERATION, "Operation", T::WeakRef),
            o(k::INPUT_SEGMENTS, "InputSegments", T::StrongRefVector),
            o(k::PARAMETERS, "Parameters", T::StrongRefVector),
            o(k::BYPASS_OVERRIDE, "BypassOverride", T::UInt32),
            o(k::RENDERING, "Rendering", T::StrongRef),
        ]),
        ClassDef::new(c::NESTED_SCOPE, "NestedScope", Some(c::SEGMENT), true, vec![
            p(k::NESTED_SLOTS, "Slots", T::StrongRefVector),
        ]),
        ClassDef::new(c::PULLDOWN, "Pulldown", Some(c::SEGMENT), true, vec![
            p(k::INPUT_SEGMENT, "InputSegment", T::StrongRef),
        ]),
        ClassDef::new(c::SCOPE_REFERENCE, "ScopeReference", Some(c::SEGMENT), true, vec![
            p(k::RELATIVE_SCOPE, "RelativeScope", T::UInt32),
            p(k::RELATIVE_SLOT, "RelativeSlot", T::UInt32),
        ]),
        ClassDef::new(c::SELECTOR, "Selector", Some(c::SEGMENT), true, vec![
            p(k::SELECTED, "Selected", T::StrongRef),
            o(k::ALTERNATES, "Alternates", T::StrongRefVector),
        ]),
        ClassDef::new(c::SEQUENCE, "Sequence", Some(c::SEGMENT), true, vec![
            p(k::COMPONENTS, "Components", T::StrongRefVector),
        ]),
        ClassDef::new(c::SOURCE_REFERENCE, "SourceReference", Some(c::SEGMENT), false, vec![
            o(k::SOURCE_ID, "SourceID", T::MobId).references(k::MOB_ID),
            p(k::SOURCE_MOB_SLOT_ID, "SourceMobSlotID", T::UInt32),
            o(k::CHANNEL_IDS, "ChannelIDs", T::UInt32Array),
            o(k::MONO_SOURCE_SLOT_IDS, "MonoSourceSlotIDs", T::UInt32Array),
        ]),
        ClassDef::new(c::SOURCE_CLIP, "SourceClip", Some(c::SOURCE_REFERENCE), true, vec![
            o(k::START_TIME, "StartTime", T::Int64),
            o(k::FADE_IN_LENGTH, "FadeInLength", T::Int64),
            o(k::FADE_OUT_LENGTH, "FadeOutLength", T::Int64),
        ]),
        ClassDef::new(c::TIMECODE, "Timecode", Some(c::SEGMENT), true, vec![
            p(k::TIMECODE_START, "Start", T::Int64),
            p(k::TIMECODE_FPS, "FPS", T::UInt16),
            p(k::TIMECODE_DROP, "Drop", T::Boolean),
        ]),
        ClassDef::new(c::TRANSITION, "Transition", Some(c::COMPONENT), true, vec![
            p(k::OPERATION_GROUP, "OperationGroup", T::StrongRef),
            p(k::CUT_POINT, "CutPoint", T::Int64),
        ]),
        // Parameters and tagged values
        ClassDef::new(c::PARAMETER, "Parameter", io, false, vec![
            p(k::PARAMETER_DEFINITION, "Definition", T::Auid),
        ]),
        ClassDef::new(c::CONSTANT_VALUE, "ConstantValue", Some(c::PARAMETER), true, vec![
            p(k::CONSTANT_VALUE, "Value", T::Indirect),
        ]),
        ClassDef::new(c::VARYING_VALUE, "VaryingValue", Some(c::PARAMETER), true, vec![
            p(k::INTERPOLATION, "Interpolation", T::WeakRef),
            p(k::POINT_LIST, "PointList", T::StrongRefVector),
        ]),
        ClassDef::new(c::CONTROL_POINT, "ControlPoint", io, true, vec![
            p(k::CONTROL_POINT_VALUE, "Value", T::Indirect),
            p(k::CONTROL_POINT_TIME, "Time", T::Rational),
        ]),
        ClassDef::new(c::TAGGED_VALUE, "TaggedValue", io, true, vec![
            p(k::TAG_NAME, "Name", T::String),
            p(k::TAG_VALUE, "Value", T::Indirect),
        ]),
        ClassDef::new(c::KLV_DATA, "KLVData", io, true, vec![p(k::KLV_VALUE, "Value", T::Bytes)]),
        // Header and content
        ClassDef::new(c::HEADER, "Header", io, true, vec![
            p(k::BYTE_ORDER, "ByteOrder", T::Int16),
            p(k::LAST_MODIFIED, "LastModified", T::TimeStamp),
            p(k::CONTENT, "Content", T::StrongRef),
            p(k::DICTIONARY, "Dictionary", T::StrongRef),
            p(k::VERSION, "Version", T::Version),
            p(k::IDENTIFICATION_LIST, "IdentificationList", T::StrongRefVector),
            o(k::OBJECT_MODEL_VERSION, "ObjectModelVersion", T::UInt32),
            o(k::OPERATIONAL_PATTERN, "OperationalPattern", T::Auid),
            o(k::ESSENCE_CONTAINERS, "EssenceContainers", T::AuidArray),
            o(k::DESCRIPTIVE_SCHEMES, "DescriptiveSchemes", T::AuidArray),
        ]),
        ClassDef::new(c::IDENTIFICATION, "Identification", io, true, vec![
            p(k::COMPANY_NAME, "CompanyName", T::String),
            p(k::PRODUCT_NAME, "ProductName", T::String),
            o(k::PRODUCT_VERSION, "ProductVersion", T::ProductVersion),
            p(k::PRODUCT_VERSION_STRING, "ProductVersionString", T::String),
            p(k::PRODUCT_ID, "ProductID", T::Auid),
            p(k::DATE, "Date", T::TimeStamp),
            o(k::TOOLKIT_VERSION, "ToolkitVersion", T::ProductVersion),
            o(k::PLATFORM, "Platform", T::String),
            p(k::GENERATION_AUID, "GenerationAUID", T::Auid),
        ]),
        ClassDef::new(c::CONTENT_STORAGE, "ContentStorage", io, true, vec![
            p(k::MOBS, "Mobs", T::StrongRefSet { key_pid: k::MOB_ID }),
            o(k::ESSENCE_DATA, "EssenceData", T::StrongRefSet { key_pid: k::ESSENCE_MOB_ID }),
        ]),
        ClassDef::new(c::ESSENCE_DATA, "EssenceData", io, true, vec![
            p(k::ESSENCE_MOB_ID, "MobID", T::MobId).unique(),
            p(k::ESSENCE_STREAM, "Data", T::Stream),
            o(k::SAMPLE_INDEX, "SampleIndex", T::Stream),
        ]),
        ClassDef::new(c::DICTIONARY, "Dictionary", io, true, vec![
            o(k::OPERATION_DEFINITIONS, "OperationDefinitions", DEF_SET),
            o(k::PARAMETER_DEFINITIONS, "ParameterDefinitions", DEF_SET),
            o(k::DATA_DEFINITIONS, "DataDefinitions", DEF_SET),
            o(k::PLUGIN_DEFINITIONS, "PluginDefinitions", DEF_SET),
            o(k::CODEC_DEFINITIONS, "CodecDefinitions", DEF_SET),
            o(k::CONTAINER_DEFINITIONS, "ContainerDefinitions", DEF_SET),
            o(k::INTERPOLATION_DEFINITIONS, "InterpolationDefinitions", DEF_SET),
            o(k::KLV_DATA_DEFINITIONS, "KLVDataDefinitions", DEF_SET),
            o(k::TAGGED_VALUE_DEFINITIONS, "TaggedValueDefinitions", DEF_SET),
        ]),
        // Definitions
        ClassDef::new(c::DEFINITION_OBJECT, "DefinitionObject", io, false, vec![
            p(k::IDENTIFICATION, "Identification", T::Auid).unique(),
            p(k::NAME, "Name", T::String),
            o(k::DEF_DESCRIPTION, "Description", T::String),
        ]),
        ClassDef::new(c::OPERATION_DEFINITION, "OperationDefinition", Some(c::DEFINITION_OBJECT), true, vec![
            p(k::OPDEF_DATA_DEFINITION, "DataDefinition", T::WeakRef),
            o(k::IS_TIME_WARP, "IsTimeWarp", T::Boolean),
            o(k::DEGRADE_TO, "DegradeTo", T::WeakRefVector),
            o(k::OPERATION_CATEGORY, "OperationCategory", T::Auid),
            p(k::NUMBER_INPUTS, "NumberInputs", T::Int32),
            o(k::BYPASS, "Bypass", T::UInt32),
            o(k::PARAMETERS_DEFINED, "ParametersDefined", T::WeakRefSet),
        ]),
        ClassDef::new(c::PARAMETER_DEFINITION, "ParameterDefinition", Some(c::DEFINITION_OBJECT), true, vec![
            p(k::PARAMETER_TYPE, "Type", T::WeakRef),
            o(k::DISPLAY_UNITS, "DisplayUnits", T::String),
        ]),
        // Mobs
        ClassDef::new(c::MOB, "Mob", io, false, vec![
            p(k::MOB_ID, "MobID", T::MobId).unique(),
            o(k::MOB_NAME, "Name", T::String),
            p(k::SLOTS, "Slots", T::StrongRefVector),
            p(k::MOB_LAST_MODIFIED, "LastModified", T::TimeStamp),
            p(k::CREATION_TIME, "CreationTime", T::TimeStamp),
            o(k::MOB_USER_COMMENTS, "UserComments", T::StrongRefVector),
            o(k::MOB_KLV_DATA, "KLVData", T::StrongRefVector),
            o(k::USAGE_CODE, "UsageCode", T::Auid),
            o(k::MOB_ATTRIBUTES, "Attributes", T::StrongRefVector),
        ]),
        ClassDef::new(c::COMPOSITION_MOB, "CompositionMob", Some(c::MOB), true, vec![
            o(k::DEFAULT_FADE_LENGTH, "DefaultFadeLength", T::Int64),
        ]),
        ClassDef::new(c::MASTER_MOB, "MasterMob", Some(c::MOB), true, vec![]),
        ClassDef::new(c::SOURCE_MOB, "SourceMob", Some(c::MOB), true, vec![
            p(k::ESSENCE_DESCRIPTION, "EssenceDescription", T::StrongRef),
        ]),
        ClassDef::new(c::MOB_SLOT, "MobSlot", io, false, vec![
            p(k::SLOT_ID, "SlotID", T::UInt32),
            o(k::SLOT_NAME, "SlotName", T::String),
            p(k::SEGMENT, "Segment", T::StrongRef),
            o(k::PHYSICAL_TRACK_NUMBER, "PhysicalTrackNumber", T::UInt32),
        ]),
        ClassDef::new(c::EVENT_MOB_SLOT, "EventMobSlot", Some(c::MOB_SLOT), true, vec![
            p(k::EVENT_EDIT_RATE, "EditRate", T::Rational),
            o(k::EVENT_SLOT_ORIGIN, "EventSlotOrigin", T::Int64),
        ]),
        ClassDef::new(c::STATIC_MOB_SLOT, "StaticMobSlot", Some(c::MOB_SLOT), true, vec![]),
        ClassDef::new(c::TIMELINE_MOB_SLOT, "TimelineMobSlot", Some(c::MOB_SLOT), true, vec![
            p(k::EDIT_RATE, "EditRate", T::Rational),
            p(k::ORIGIN, "Origin", T::Int64),
            o(k::MARK_IN, "MarkIn", T::Int64),
            o(k::MARK_OUT, "MarkOut", T::Int64),
            o(k::USER_POS, "UserPos", T::Int64),
        ]),
        // Essence descriptors and locators
        ClassDef::new(c::ESSENCE_DESCRIPTOR, "EssenceDescriptor", io, false, vec![
            o(k::LOCATOR, "Locator", T::StrongRefVector),
        ]),
        ClassDef::new(c::FILE_DESCRIPTOR, "FileDescriptor", Some(c::ESSENCE_DESCRIPTOR), false, vec![
            o(k::SAMPLE_RATE, "SampleRate", T::Rational),
            o(k::DESCRIPTOR_LENGTH, "Length", T::Int64),
            o(k::CONTAINER_FORMAT, "ContainerFormat", T::WeakRef),
            o(k::CODEC_DEFINITION, "CodecDefinition", T::WeakRef),
        ]),
        ClassDef::new(c::MULTIPLE_DESCRIPTOR, "MultipleDescriptor", Some(c::FILE_DESCRIPTOR), true, vec![
            p(k::FILE_DESCRIPTORS, "FileDescriptors", T::StrongRefVector),
        ]),
        ClassDef::new(c::NETWORK_LOCATOR, "NetworkLocator", Some(c::LOCATOR), true, vec![
            p(k::URL_STRING, "URLString", T::String),
        ]),
        ClassDef::new(c::TEXT_LOCATOR, "TextLocator", Some(c::LOCATOR), true, vec![
            p(k::LOCATOR_NAME, "Name", T::String),
        ]),
        ClassDef::new(c::LOCATOR, "Locator", io, false, vec![]),
        // Meta model
        ClassDef::new(c::META_DICTIONARY, "MetaDictionary", None, true, vec![
            o(k::CLASS_DEFINITIONS, "ClassDefinitions", META_SET),
            o(k::TYPE_DEFINITIONS, "TypeDefinitions", META_SET),
        ]),
        ClassDef::new(c::META_DEFINITION, "MetaDefinition", None, false, vec![
            p(k::META_IDENTIFICATION, "Identification", T::Auid).unique(),
            p(k::META_NAME, "Name", T::String),
            o(k::META_DESCRIPTION, "Description", T::String),
        ]),
        ClassDef::new(c::CLASS_DEFINITION, "ClassDefinition", Some(c::META_DEFINITION), true, vec![
            p(k::PARENT_CLASS, "ParentClass", T::WeakRef),
            o(k::PROPERTIES, "Properties", META_SET),
            p(k::IS_CONCRETE, "IsConcrete", T::Boolean),
        ]),
        ClassDef::new(c::PROPERTY_DEFINITION, "PropertyDefinition", Some(c::META_DEFINITION), true, vec![
            p(k::PROPERTY_TYPE, "Type", T::WeakRef),
            p(k::IS_OPTIONAL, "IsOptional", T::Boolean),
            p(k::LOCAL_IDENTIFICATION, "LocalIdentification", T::UInt16),
            o(k::IS_UNIQUE_IDENTIFIER, "IsUniqueIdentifier", T::Boolean),
        ]),
        ClassDef::new(c::TYPE_DEFINITION, "TypeDefinition", Some(c::META_DEFINITION), false, vec![]),
    ];

    // Definition subclasses with no properties of their own.
    for (id, name) in [
        (c::DATA_DEFINITION, "DataDefinition"),
        (c::PLUGIN_DEFINITION, "PluginDefinition"),
        (c::CODEC_DEFINITION, "CodecDefinition"),
        (c::CONTAINER_DEFINITION, "ContainerDefinition"),
        (c::INTERPOLATION_DEFINITION, "InterpolationDefinition"),
        (c::TAGGED_VALUE_DEFINITION, "TaggedValueDefinition"),
        (c::KLV_DATA_DEFINITION, "KLVDataDefinition"),
    ] {
        v.push(ClassDef::new(id, name, Some(c::DEFINITION_OBJECT), true, vec![]));
    }

    // Descriptor subclasses; their own properties are kept as raw bytes.
    for (id, name, parent, concrete) in [
        (c::PHYSICAL_DESCRIPTOR, "PhysicalDescriptor", c::ESSENCE_DESCRIPTOR, false),
        (c::IMPORT_DESCRIPTOR, "ImportDescriptor", c::PHYSICAL_DESCRIPTOR, true),
        (c::RECORDING_DESCRIPTOR, "RecordingDescriptor", c::PHYSICAL_DESCRIPTOR, true),
        (c::TAPE_DESCRIPTOR, "TapeDescriptor", c::ESSENCE_DESCRIPTOR, true),
        (c::DIGITAL_IMAGE_DESCRIPTOR, "DigitalImageDescriptor", c::FILE_DESCRIPTOR, false),
        (c::CDCI_DESCRIPTOR, "CDCIDescriptor", c::DIGITAL_IMAGE_DESCRIPTOR, true),
        (c::RGBA_DESCRIPTOR, "RGBADescriptor", c::DIGITAL_IMAGE_DESCRIPTOR, true),
        (c::SOUND_DESCRIPTOR, "SoundDescriptor", c::FILE_DESCRIPTOR, true),
        (c::PCM_DESCRIPTOR, "PCMDescriptor", c::SOUND_DESCRIPTOR, true),
        (c::WAVE_DESCRIPTOR, "WAVEDescriptor", c::FILE_DESCRIPTOR, true),
        (c::AIFC_DESCRIPTOR, "AIFCDescriptor", c::FILE_DESCRIPTOR, true),
    ] {
        v.push(ClassDef::new(id, name, Some(parent), concrete, vec![]));
    }

    for (code, name) in c::TYPE_DEFINITION_KINDS {
        v.push(ClassDef::new(c::type_definition_kind(code), name, Some(c::TYPE_DEFINITION), true, vec![]));
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_unique_ids() {
        let classes = builtin_classes();
        let ids: HashSet<_> = classes.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), classes.len());
        for c in classes {
            if let Some(parent) = c.parent {
                assert!(ids.contains(&parent), "{} has unknown parent", c.name);
            }
        }
    }

    #[test]
    fn test_class_ids() {
        assert_eq!(class::HEADER.to_string(), "0d010101-0101-2f00-060e-2b3402060101");
        assert_eq!(class::CLASS_DEFINITION.to_string(), "0d010101-0201-0000-060e-2b3402060101");
    }

    #[test]
    fn test_builtin_definitions() {
        let pic = datadef::PICTURE.to_le_bytes();
        assert!(is_builtin_definition(pid::IDENTIFICATION, &pic));
        assert!(!is_builtin_definition(pid::MOB_ID, &pic));
        assert!(is_builtin_definition(pid::META_IDENTIFICATION, &class::SOURCE_CLIP.to_le_bytes()));
        assert!(!is_builtin_definition(pid::IDENTIFICATION, &[1u8; 16]));
        assert_eq!(definition_name(opdef::VIDEO_DISSOLVE), Some("VideoDissolve"));
        assert!(datadef::is_sound(datadef::LEGACY_SOUND));
    }
}
