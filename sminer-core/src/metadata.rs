//! Wire layout of runtime metadata V14 and V15
//!
//! Only the type registry and the pallet table are modelled. Everything
//! after the pallet list (extrinsic info, runtime type, V15 APIs) is left
//! unread.

use parity_scale_codec::{Compact, Decode, Encode};

use crate::schema::{Field, PalletInfo, Primitive, StorageEntry, StorageHasher, TypeDef, Variant};

/// `magic ++ version` in front of every metadata blob
#[derive(Debug, Clone, Copy, Encode, Decode)]
pub(crate) struct MetadataPrefix {
    pub magic: u32,
    pub version: u8,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PortableType {
    #[codec(compact)]
    pub id: u32,
    pub path: Vec<String>,
    pub params: Vec<TypeParameter>,
    pub def: TypeDefinition,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct TypeParameter {
    pub name: String,
    pub ty: Option<Compact<u32>>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct FieldDef {
    pub name: Option<String>,
    #[codec(compact)]
    pub ty: u32,
    pub type_name: Option<String>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct VariantDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    pub index: u8,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) enum TypeDefinition {
    Composite {
        fields: Vec<FieldDef>,
    },
    Variant {
        variants: Vec<VariantDef>,
    },
    Sequence {
        #[codec(compact)]
        ty: u32,
    },
    Array {
        len: u32,
        #[codec(compact)]
        ty: u32,
    },
    Tuple {
        items: Vec<Compact<u32>>,
    },
    Primitive {
        primitive: Primitive,
    },
    Compact {
        #[codec(compact)]
        ty: u32,
    },
    BitSequence {
        #[codec(compact)]
        store: u32,
        #[codec(compact)]
        order: u32,
    },
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) enum StorageEntryType {
    Plain {
        #[codec(compact)]
        value: u32,
    },
    Map {
        hashers: Vec<StorageHasher>,
        #[codec(compact)]
        key: u32,
        #[codec(compact)]
        value: u32,
    },
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct StorageEntryDef {
    pub name: String,
    pub modifier: u8,
    pub ty: StorageEntryType,
    pub default: Vec<u8>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PalletStorageDef {
    pub prefix: String,
    pub entries: Vec<StorageEntryDef>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct ConstantDef {
    pub name: String,
    #[codec(compact)]
    pub ty: u32,
    pub value: Vec<u8>,
    pub docs: Vec<String>,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PalletV14 {
    pub name: String,
    pub storage: Option<PalletStorageDef>,
    pub calls: Option<Compact<u32>>,
    pub events: Option<Compact<u32>>,
    pub constants: Vec<ConstantDef>,
    pub error: Option<Compact<u32>>,
    pub index: u8,
}

/// V15 appends pallet docs
#[derive(Debug, Clone, Encode, Decode)]
pub(crate) struct PalletV15 {
    pub name: String,
    pub storage: Option<PalletStorageDef>,
    pub calls: Option<Compact<u32>>,
    pub events: Option<Compact<u32>>,
    pub constants: Vec<ConstantDef>,
    pub error: Option<Compact<u32>>,
    pub index: u8,
    pub docs: Vec<String>,
}

impl From<FieldDef> for Field {
    fn from(field: FieldDef) -> Self {
        Field {
            name: field.name,
            ty: field.ty,
        }
    }
}

impl From<VariantDef> for Variant {
    fn from(variant: VariantDef) -> Self {
        Variant {
            name: variant.name,
            index: variant.index,
            fields: variant.fields.into_iter().map(Field::from).collect(),
        }
    }
}

impl From<TypeDefinition> for TypeDef {
    fn from(def: TypeDefinition) -> Self {
        match def {
            TypeDefinition::Composite { fields } => {
                TypeDef::Composite(fields.into_iter().map(Field::from).collect())
            }
            TypeDefinition::Variant { variants } => {
                TypeDef::Variant(variants.into_iter().map(Variant::from).collect())
            }
            TypeDefinition::Sequence { ty } => TypeDef::Sequence(ty),
            TypeDefinition::Array { len, ty } => TypeDef::Array { len, ty },
            TypeDefinition::Tuple { items } => TypeDef::Tuple(items.into_iter().map(|c| c.0).collect()),
            TypeDefinition::Primitive { primitive } => TypeDef::Primitive(primitive),
            TypeDefinition::Compact { ty } => TypeDef::Compact(ty),
            TypeDefinition::BitSequence { store, order } => TypeDef::BitSequence { store, order },
        }
    }
}

impl From<StorageEntryDef> for StorageEntry {
    fn from(entry: StorageEntryDef) -> Self {
        let (hashers, key, value) = match entry.ty {
            StorageEntryType::Plain { value } => (Vec::new(), None, value),
            StorageEntryType::Map { hashers, key, value } => (hashers, Some(key), value),
        };
        StorageEntry {
            name: entry.name,
            hashers,
            key,
            value,
        }
    }
}

impl From<PalletV14> for PalletInfo {
    fn from(pallet: PalletV14) -> Self {
        PalletInfo {
            name: pallet.name,
            index: pallet.index,
            calls: pallet.calls.map(|c| c.0),
            events: pallet.events.map(|c| c.0),
            storage: pallet
                .storage
                .map(|s| s.entries.into_iter().map(StorageEntry::from).collect())
                .unwrap_or_default(),
        }
    }
}

impl From<PalletV15> for PalletV14 {
    fn from(pallet: PalletV15) -> Self {
        PalletV14 {
            name: pallet.name,
            storage: pallet.storage,
            calls: pallet.calls,
            events: pallet.events,
            constants: pallet.constants,
            error: pallet.error,
            index: pallet.index,
        }
    }
}
