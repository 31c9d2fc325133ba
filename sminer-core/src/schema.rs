//! Chain schema (runtime metadata)
//!
//! The remote ledger publishes its schema as SCALE-encoded runtime metadata.
//! This module decodes the parts the client needs:
//! - the portable type registry (to check call arguments and decode events)
//! - the pallet table (name/index, call and event enums, storage entries)
//!
//! Metadata versions 14 and 15 are supported. Both share the registry and
//! pallet layout; V15 appends per-pallet docs.

use std::collections::HashMap;

use parity_scale_codec::{Decode, Encode};

use crate::error::{ChainError, Result};
use crate::metadata::{MetadataPrefix, PalletV14, PalletV15, PortableType};

/// `meta` as a little-endian u32
pub const METADATA_MAGIC: u32 = 0x6174_656d;

/// Type identifier inside the registry
pub type TypeId = u32;

/// Primitive types of the registry, in tag order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Primitive {
    Bool,
    Char,
    Str,
    U8,
    U16,
    U32,
    U64,
    U128,
    U256,
    I8,
    I16,
    I32,
    I64,
    I128,
    I256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: Option<String>,
    pub ty: TypeId,
}

impl Field {
    pub fn named(name: &str, ty: TypeId) -> Self {
        Self {
            name: Some(name.to_string()),
            ty,
        }
    }

    pub fn unnamed(ty: TypeId) -> Self {
        Self { name: None, ty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub index: u8,
    pub fields: Vec<Field>,
}

impl Variant {
    pub fn new(name: &str, index: u8, fields: Vec<Field>) -> Self {
        Self {
            name: name.to_string(),
            index,
            fields,
        }
    }
}

/// Shape of a registry type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Composite(Vec<Field>),
    Variant(Vec<Variant>),
    Sequence(TypeId),
    Array { len: u32, ty: TypeId },
    Tuple(Vec<TypeId>),
    Primitive(Primitive),
    Compact(TypeId),
    BitSequence { store: TypeId, order: TypeId },
}

/// Kinds of argument the transaction builder can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    U8,
    U16,
    U32,
    U64,
    U128,
    Compact,
    Bytes,
    BytesSeq,
    AccountId,
    MultiAddress,
}

/// Maximum nesting followed when resolving or decoding types
pub(crate) const MAX_TYPE_DEPTH: usize = 32;

/// Portable type registry
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<TypeId, TypeDef>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: TypeId, def: TypeDef) {
        self.types.insert(id, def);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Iterate over `(id, def)` pairs in id order
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        let mut ids: Vec<_> = self.types.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter().filter_map(|id| self.types.get(&id).map(|def| (id, def)))
    }

    pub fn resolve(&self, id: TypeId) -> Result<&TypeDef> {
        self.types
            .get(&id)
            .ok_or_else(|| ChainError::Codec(format!("type {} missing from registry", id)))
    }

    /// Follow single-field composites down to the wrapped type
    pub fn unwrap_newtypes(&self, mut id: TypeId) -> Result<(TypeId, &TypeDef)> {
        for _ in 0..MAX_TYPE_DEPTH {
            match self.resolve(id)? {
                TypeDef::Composite(fields) if fields.len() == 1 => id = fields[0].ty,
                def => return Ok((id, def)),
            }
        }
        Err(ChainError::Codec(format!("type {} nests too deeply", id)))
    }

    fn is_byte(&self, id: TypeId) -> Result<bool> {
        Ok(matches!(
            self.unwrap_newtypes(id)?.1,
            TypeDef::Primitive(Primitive::U8)
        ))
    }

    /// Whether a value of `kind` encodes as the registry type `id`
    pub fn accepts(&self, id: TypeId, kind: ArgKind) -> Result<bool> {
        let (_, def) = self.unwrap_newtypes(id)?;
        Ok(match (kind, def) {
            (ArgKind::U8, TypeDef::Primitive(Primitive::U8))
            | (ArgKind::U16, TypeDef::Primitive(Primitive::U16))
            | (ArgKind::U32, TypeDef::Primitive(Primitive::U32))
            | (ArgKind::U64, TypeDef::Primitive(Primitive::U64))
            | (ArgKind::U128, TypeDef::Primitive(Primitive::U128))
            | (ArgKind::Compact, TypeDef::Compact(_)) => true,
            (ArgKind::Bytes, TypeDef::Sequence(inner)) => self.is_byte(*inner)?,
            (ArgKind::BytesSeq, TypeDef::Sequence(inner)) => {
                self.accepts(*inner, ArgKind::Bytes)?
            }
            (ArgKind::AccountId, TypeDef::Array { len: 32, ty }) => self.is_byte(*ty)?,
            (ArgKind::MultiAddress, TypeDef::Variant(variants)) => {
                match variants.iter().find(|v| v.index == 0) {
                    Some(id) if id.name == "Id" && id.fields.len() == 1 => {
                        self.accepts(id.fields[0].ty, ArgKind::AccountId)?
                    }
                    _ => false,
                }
            }
            _ => false,
        })
    }
}

/// Hashers used to build storage map keys, in tag order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum StorageHasher {
    Blake2_128,
    Blake2_256,
    Blake2_128Concat,
    Twox128,
    Twox256,
    Twox64Concat,
    Identity,
}

/// A pallet storage entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEntry {
    pub name: String,
    /// Empty for plain values
    pub hashers: Vec<StorageHasher>,
    pub key: Option<TypeId>,
    pub value: TypeId,
}

/// A runtime pallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalletInfo {
    pub name: String,
    pub index: u8,
    pub calls: Option<TypeId>,
    pub events: Option<TypeId>,
    pub storage: Vec<StorageEntry>,
}

/// A call resolved from an operation name
#[derive(Debug, Clone, Copy)]
pub struct CallInfo<'a> {
    pub pallet: &'a str,
    pub pallet_index: u8,
    pub name: &'a str,
    pub call_index: u8,
    pub fields: &'a [Field],
}

/// Decoded runtime schema
#[derive(Debug, Clone)]
pub struct ChainSchema {
    version: u8,
    registry: TypeRegistry,
    pallets: Vec<PalletInfo>,
}

impl ChainSchema {
    pub fn new(registry: TypeRegistry, pallets: Vec<PalletInfo>) -> Self {
        Self {
            version: 14,
            registry,
            pallets,
        }
    }

    /// Decode SCALE-encoded runtime metadata
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut input = bytes;
        let prefix = MetadataPrefix::decode(&mut input)?;
        if prefix.magic != METADATA_MAGIC {
            return Err(ChainError::Codec(format!(
                "bad metadata magic 0x{:08x}",
                prefix.magic
            )));
        }

        let types = Vec::<PortableType>::decode(&mut input)?;
        let pallets: Vec<PalletInfo> = match prefix.version {
            14 => Vec::<PalletV14>::decode(&mut input)?
                .into_iter()
                .map(PalletInfo::from)
                .collect(),
            15 => Vec::<PalletV15>::decode(&mut input)?
                .into_iter()
                .map(|p| PalletInfo::from(PalletV14::from(p)))
                .collect(),
            v => {
                return Err(ChainError::Codec(format!(
                    "unsupported metadata version {}",
                    v
                )))
            }
        };

        let mut registry = TypeRegistry::new();
        for ty in types {
            registry.insert(ty.id, ty.def.into());
        }

        Ok(Self {
            version: prefix.version,
            registry,
            pallets,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn pallets(&self) -> &[PalletInfo] {
        &self.pallets
    }

    pub fn pallet(&self, name: &str) -> Option<&PalletInfo> {
        self.pallets.iter().find(|p| p.name == name)
    }

    pub fn pallet_by_index(&self, index: u8) -> Option<&PalletInfo> {
        self.pallets.iter().find(|p| p.index == index)
    }

    /// Resolve an operation name of the form `Pallet.call`
    pub fn call(&self, operation: &str) -> Result<CallInfo<'_>> {
        let unknown = || ChainError::UnknownCall(operation.to_string());

        let (pallet_name, call_name) = operation.split_once('.').ok_or_else(unknown)?;
        let pallet = self.pallet(pallet_name).ok_or_else(unknown)?;
        let calls_ty = pallet.calls.ok_or_else(unknown)?;

        let TypeDef::Variant(variants) = self.registry.resolve(calls_ty)? else {
            return Err(ChainError::Codec(format!(
                "call type of {} is not an enum",
                pallet.name
            )));
        };
        let variant = variants
            .iter()
            .find(|v| v.name == call_name)
            .ok_or_else(unknown)?;

        Ok(CallInfo {
            pallet: &pallet.name,
            pallet_index: pallet.index,
            name: &variant.name,
            call_index: variant.index,
            fields: &variant.fields,
        })
    }

    pub fn storage_entry(&self, pallet: &str, entry: &str) -> Option<&StorageEntry> {
        self.pallet(pallet)?
            .storage
            .iter()
            .find(|e| e.name == entry)
    }
}
