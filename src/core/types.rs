//! Property type tags and built-in type identifiers.

use super::stored::StoredForm;
use crate::util::Auid;

const TYPE_TAIL: [u8; 8] = [0x06, 0x0e, 0x2b, 0x34, 0x01, 0x04, 0x01, 0x01];

const fn type_id(data1: u32) -> Auid {
    Auid::new(data1, 0x0000, 0x0000, TYPE_TAIL)
}

/// Built-in type definition AUIDs.
pub mod typeid {
    use super::type_id;
    use crate::util::Auid;

    pub const UINT8: Auid = type_id(0x0101_0100);
    pub const UINT16: Auid = type_id(0x0101_0200);
    pub const UINT32: Auid = type_id(0x0101_0300);
    pub const UINT64: Auid = type_id(0x0101_0400);
    pub const INT8: Auid = type_id(0x0101_0500);
    pub const INT16: Auid = type_id(0x0101_0600);
    pub const INT32: Auid = type_id(0x0101_0700);
    pub const INT64: Auid = type_id(0x0101_0800);
    pub const POSITION: Auid = type_id(0x0101_2001);
    pub const LENGTH: Auid = type_id(0x0101_2002);
    pub const AUID: Auid = type_id(0x0103_0100);
    pub const MOB_ID: Auid = type_id(0x0103_0200);
    pub const BOOLEAN: Auid = type_id(0x0104_0100);
    pub const STRING: Auid = type_id(0x0110_0200);
    pub const RATIONAL: Auid = type_id(0x0301_0100);
    pub const PRODUCT_VERSION: Auid = type_id(0x0301_0200);
    pub const VERSION: Auid = type_id(0x0301_0300);
    pub const TIME_STAMP: Auid = type_id(0x0301_0700);
    pub const UINT8_ARRAY: Auid = type_id(0x0401_0100);
    pub const AUID_ARRAY: Auid = type_id(0x0401_0600);
    pub const UINT32_SET: Auid = type_id(0x0403_0200);
    pub const DATA_VALUE: Auid = type_id(0x0410_0100);
    pub const INDIRECT: Auid = type_id(0x0410_0300);
    pub const OPAQUE: Auid = type_id(0x0410_0400);
}

/// How a property's value is typed.
///
/// Data tags decode to a [`super::Value`]; reference tags describe which
/// stored form the property must use. `Opaque` carries an unrecognized type
/// AUID whose values are kept as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int8,
    Int16,
    Int32,
    Int64,
    Boolean,
    Rational,
    Auid,
    MobId,
    String,
    TimeStamp,
    Version,
    ProductVersion,
    AuidArray,
    UInt32Array,
    Bytes,
    Indirect,
    StrongRef,
    StrongRefVector,
    /// Strong set keyed by the element property `key_pid`.
    StrongRefSet { key_pid: u16 },
    WeakRef,
    WeakRefVector,
    WeakRefSet,
    Stream,
    Opaque(Auid),
}

impl TypeTag {
    /// Byte size of fixed-size data types.
    pub fn fixed_size(&self) -> Option<usize> {
        Some(match self {
            Self::UInt8 | Self::Int8 | Self::Boolean => 1,
            Self::UInt16 | Self::Int16 | Self::Version => 2,
            Self::UInt32 | Self::Int32 => 4,
            Self::UInt64 | Self::Int64 | Self::Rational | Self::TimeStamp => 8,
            Self::ProductVersion => 9,
            Self::Auid => 16,
            Self::MobId => 32,
            _ => return None,
        })
    }

    /// Stored form a property of this type is written with.
    pub fn stored_form(&self) -> StoredForm {
        match self {
            Self::StrongRef => StoredForm::StrongRef,
            Self::StrongRefVector => StoredForm::StrongRefVector,
            Self::StrongRefSet { .. } => StoredForm::StrongRefSet,
            Self::WeakRef => StoredForm::WeakRef,
            Self::WeakRefVector => StoredForm::WeakRefVector,
            Self::WeakRefSet => StoredForm::WeakRefSet,
            Self::Stream => StoredForm::DataStream,
            _ => StoredForm::Data,
        }
    }

    /// True for plain data types.
    pub fn is_data(&self) -> bool {
        self.stored_form() == StoredForm::Data && !matches!(self, Self::Opaque(_))
    }

    /// Map a type definition AUID to a tag. Unknown ids become `Opaque`.
    pub fn from_type_id(id: Auid) -> Self {
        use typeid::*;
        match id {
            UINT8 => Self::UInt8,
            UINT16 => Self::UInt16,
            UINT32 => Self::UInt32,
            UINT64 => Self::UInt64,
            INT8 => Self::Int8,
            INT16 => Self::Int16,
            INT32 => Self::Int32,
            INT64 | POSITION | LENGTH => Self::Int64,
            AUID => Self::Auid,
            MOB_ID => Self::MobId,
            BOOLEAN => Self::Boolean,
            STRING => Self::String,
            RATIONAL => Self::Rational,
            PRODUCT_VERSION => Self::ProductVersion,
            VERSION => Self::Version,
            TIME_STAMP => Self::TimeStamp,
            UINT8_ARRAY | DATA_VALUE => Self::Bytes,
            AUID_ARRAY => Self::AuidArray,
            UINT32_SET => Self::UInt32Array,
            INDIRECT => Self::Indirect,
            other => Self::Opaque(other),
        }
    }

    /// Type definition AUID of a data type, if it has one.
    pub fn type_id(&self) -> Option<Auid> {
        use typeid::*;
        Some(match self {
            Self::UInt8 => UINT8,
            Self::UInt16 => UINT16,
            Self::UInt32 => UINT32,
            Self::UInt64 => UINT64,
            Self::Int8 => INT8,
            Self::Int16 => INT16,
            Self::Int32 => INT32,
            Self::Int64 => INT64,
            Self::Boolean => BOOLEAN,
            Self::Rational => RATIONAL,
            Self::Auid => AUID,
            Self::MobId => MOB_ID,
            Self::String => STRING,
            Self::TimeStamp => TIME_STAMP,
            Self::Version => VERSION,
            Self::ProductVersion => PRODUCT_VERSION,
            Self::AuidArray => AUID_ARRAY,
            Self::UInt32Array => UINT32_SET,
            Self::Bytes => UINT8_ARRAY,
            Self::Indirect => INDIRECT,
            Self::Opaque(id) => *id,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_id_roundtrip() {
        for tag in [
            TypeTag::UInt8,
            TypeTag::Int64,
            TypeTag::Rational,
            TypeTag::String,
            TypeTag::MobId,
            TypeTag::Indirect,
            TypeTag::UInt32Array,
        ] {
            let id = tag.type_id().unwrap();
            assert_eq!(TypeTag::from_type_id(id), tag);
        }
        assert_eq!(TypeTag::from_type_id(typeid::LENGTH), TypeTag::Int64);
        let odd = Auid::new(1, 2, 3, [4; 8]);
        assert_eq!(TypeTag::from_type_id(odd), TypeTag::Opaque(odd));
    }

    #[test]
    fn test_forms() {
        assert_eq!(TypeTag::Rational.stored_form(), StoredForm::Data);
        assert_eq!(TypeTag::StrongRefSet { key_pid: 0x4401 }.stored_form(), StoredForm::StrongRefSet);
        assert!(TypeTag::Int32.is_data());
        assert!(!TypeTag::Opaque(Auid::NIL).is_data());
        assert_eq!(TypeTag::MobId.fixed_size(), Some(32));
        assert_eq!(TypeTag::String.fixed_size(), None);
    }
}
