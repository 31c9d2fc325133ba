//! Test fixtures: a small miner runtime schema, a metadata encoder and an
//! event-log builder
//!
//! The schema mirrors the shape of a storage-mining runtime closely enough
//! to exercise call encoding, account nonce decoding and event decoding
//! without a live node.

use parity_scale_codec::{Compact, Encode};

use crate::crypto::AccountId;
use crate::events::{Phase, ProofPhase};
use crate::metadata::{
    FieldDef, MetadataPrefix, PalletStorageDef, PalletV14, PalletV15, PortableType,
    StorageEntryDef, StorageEntryType, TypeDefinition, VariantDef,
};
use crate::schema::{
    ChainSchema, Field, PalletInfo, Primitive, StorageEntry, StorageHasher, TypeDef, TypeId,
    TypeRegistry, Variant, METADATA_MAGIC,
};

pub const SYSTEM_INDEX: u8 = 0;
pub const BALANCES_INDEX: u8 = 5;
pub const SMINER_INDEX: u8 = 10;
pub const SEGMENT_BOOK_INDEX: u8 = 11;

pub const TY_U8: TypeId = 0;
pub const TY_U32: TypeId = 1;
pub const TY_U64: TypeId = 2;
pub const TY_U128: TypeId = 3;
pub const TY_ACCOUNT_BYTES: TypeId = 4;
pub const TY_ACCOUNT: TypeId = 5;
pub const TY_BYTES: TypeId = 6;
pub const TY_BYTES_SEQ: TypeId = 7;
pub const TY_COMPACT_U128: TypeId = 8;
pub const TY_MULTI_ADDRESS: TypeId = 9;
pub const TY_DISPATCH_CLASS: TypeId = 10;
pub const TY_PAYS: TypeId = 11;
pub const TY_DISPATCH_INFO: TypeId = 12;
pub const TY_DISPATCH_ERROR: TypeId = 13;
pub const TY_SYSTEM_EVENT: TypeId = 14;
pub const TY_SMINER_CALL: TypeId = 15;
pub const TY_SMINER_EVENT: TypeId = 16;
pub const TY_SEGMENT_CALL: TypeId = 17;
pub const TY_SEGMENT_EVENT: TypeId = 18;
pub const TY_BALANCES_EVENT: TypeId = 19;
pub const TY_ACCOUNT_DATA: TypeId = 20;
pub const TY_ACCOUNT_INFO: TypeId = 21;
pub const TY_BYTES4: TypeId = 22;
pub const TY_MODULE_ERROR: TypeId = 23;
pub const TY_MINER_INFO: TypeId = 24;

/// Variant index of `BadOrigin` in the dispatch error enum
const BAD_ORIGIN: u8 = 2;

fn phase_offset(phase: ProofPhase) -> u8 {
    match phase {
        ProofPhase::A => 0,
        ProofPhase::B => 1,
        ProofPhase::C => 2,
        ProofPhase::D => 3,
    }
}

fn proof_fields() -> Vec<Field> {
    vec![Field::named("peer_id", TY_U64), Field::named("segment_id", TY_U64)]
}

/// Schema of a storage-mining runtime with System, Balances, Sminer and
/// SegmentBook pallets
pub fn miner_schema() -> ChainSchema {
    let mut reg = TypeRegistry::new();

    reg.insert(TY_U8, TypeDef::Primitive(Primitive::U8));
    reg.insert(TY_U32, TypeDef::Primitive(Primitive::U32));
    reg.insert(TY_U64, TypeDef::Primitive(Primitive::U64));
    reg.insert(TY_U128, TypeDef::Primitive(Primitive::U128));
    reg.insert(TY_ACCOUNT_BYTES, TypeDef::Array { len: 32, ty: TY_U8 });
    reg.insert(TY_ACCOUNT, TypeDef::Composite(vec![Field::unnamed(TY_ACCOUNT_BYTES)]));
    reg.insert(TY_BYTES, TypeDef::Sequence(TY_U8));
    reg.insert(TY_BYTES_SEQ, TypeDef::Sequence(TY_BYTES));
    reg.insert(TY_COMPACT_U128, TypeDef::Compact(TY_U128));
    reg.insert(
        TY_MULTI_ADDRESS,
        TypeDef::Variant(vec![
            Variant::new("Id", 0, vec![Field::unnamed(TY_ACCOUNT)]),
            Variant::new("Raw", 3, vec![Field::unnamed(TY_BYTES)]),
        ]),
    );
    reg.insert(
        TY_DISPATCH_CLASS,
        TypeDef::Variant(vec![
            Variant::new("Normal", 0, vec![]),
            Variant::new("Operational", 1, vec![]),
            Variant::new("Mandatory", 2, vec![]),
        ]),
    );
    reg.insert(
        TY_PAYS,
        TypeDef::Variant(vec![Variant::new("Yes", 0, vec![]), Variant::new("No", 1, vec![])]),
    );
    reg.insert(
        TY_DISPATCH_INFO,
        TypeDef::Composite(vec![
            Field::named("weight", TY_U64),
            Field::named("class", TY_DISPATCH_CLASS),
            Field::named("pays_fee", TY_PAYS),
        ]),
    );
    reg.insert(TY_BYTES4, TypeDef::Array { len: 4, ty: TY_U8 });
    reg.insert(
        TY_MODULE_ERROR,
        TypeDef::Composite(vec![Field::named("index", TY_U8), Field::named("error", TY_BYTES4)]),
    );
    reg.insert(
        TY_DISPATCH_ERROR,
        TypeDef::Variant(vec![
            Variant::new("Other", 0, vec![]),
            Variant::new("CannotLookup", 1, vec![]),
            Variant::new("BadOrigin", BAD_ORIGIN, vec![]),
            Variant::new("Module", 3, vec![Field::unnamed(TY_MODULE_ERROR)]),
        ]),
    );
    reg.insert(
        TY_SYSTEM_EVENT,
        TypeDef::Variant(vec![
            Variant::new(
                "ExtrinsicSuccess",
                0,
                vec![Field::named("dispatch_info", TY_DISPATCH_INFO)],
            ),
            Variant::new(
                "ExtrinsicFailed",
                1,
                vec![
                    Field::named("dispatch_error", TY_DISPATCH_ERROR),
                    Field::named("dispatch_info", TY_DISPATCH_INFO),
                ],
            ),
        ]),
    );
    reg.insert(
        TY_SMINER_CALL,
        TypeDef::Variant(vec![Variant::new(
            "regnstk",
            0,
            vec![
                Field::named("beneficiary", TY_MULTI_ADDRESS),
                Field::named("ip", TY_U32),
                Field::named("port", TY_U32),
                Field::named("fileport", TY_U32),
                Field::named("staking_val", TY_COMPACT_U128),
            ],
        )]),
    );
    reg.insert(
        TY_SMINER_EVENT,
        TypeDef::Variant(vec![
            Variant::new(
                "Registered",
                0,
                vec![Field::named("acc", TY_ACCOUNT), Field::named("staking_val", TY_U128)],
            ),
            Variant::new("TimedTask", 1, vec![]),
        ]),
    );

    let post = |name: &str, index: u8| {
        Variant::new(
            name,
            index,
            vec![
                Field::named("peer_id", TY_U64),
                Field::named("segment_id", TY_U64),
                Field::named("proof", TY_BYTES),
                Field::named("cid", TY_BYTES),
            ],
        )
    };
    let post_multi = |name: &str, index: u8| {
        Variant::new(
            name,
            index,
            vec![
                Field::named("peer_id", TY_U64),
                Field::named("segment_id", TY_U64),
                Field::named("proof", TY_BYTES_SEQ),
                Field::named("sealed_cid", TY_BYTES_SEQ),
            ],
        )
    };
    reg.insert(
        TY_SEGMENT_CALL,
        TypeDef::Variant(vec![
            Variant::new(
                "intent_submit",
                0,
                vec![
                    Field::named("size_type", TY_U8),
                    Field::named("submit_type", TY_U8),
                    Field::named("peer_id", TY_U64),
                    Field::named("uncid", TY_BYTES_SEQ),
                    Field::named("hash", TY_BYTES),
                    Field::named("shardhash", TY_BYTES),
                ],
            ),
            Variant::new(
                "intent_submit_po_st",
                1,
                vec![
                    Field::named("segment_id", TY_U64),
                    Field::named("size_type", TY_U8),
                    Field::named("submit_type", TY_U8),
                ],
            ),
            post("submit_to_vpa", 2),
            post("submit_to_vpb", 3),
            post_multi("submit_to_vpc", 4),
            post_multi("submit_to_vpd", 5),
        ]),
    );

    let mut segment_events = vec![Variant::new(
        "ParamSet",
        0,
        vec![
            Field::named("peer_id", TY_U64),
            Field::named("segment_id", TY_U64),
            Field::named("random", TY_U32),
        ],
    )];
    for phase in ProofPhase::ALL {
        segment_events.push(Variant::new(
            &phase.submitted_event(),
            1 + phase_offset(phase),
            proof_fields(),
        ));
    }
    for phase in ProofPhase::ALL {
        segment_events.push(Variant::new(
            &phase.verified_event(),
            5 + phase_offset(phase),
            proof_fields(),
        ));
    }
    reg.insert(TY_SEGMENT_EVENT, TypeDef::Variant(segment_events));

    reg.insert(
        TY_BALANCES_EVENT,
        TypeDef::Variant(vec![Variant::new(
            "Transfer",
            2,
            vec![
                Field::named("from", TY_ACCOUNT),
                Field::named("to", TY_ACCOUNT),
                Field::named("amount", TY_U128),
            ],
        )]),
    );
    reg.insert(
        TY_ACCOUNT_DATA,
        TypeDef::Composite(vec![
            Field::named("free", TY_U128),
            Field::named("reserved", TY_U128),
            Field::named("frozen", TY_U128),
            Field::named("flags", TY_U128),
        ]),
    );
    reg.insert(
        TY_ACCOUNT_INFO,
        TypeDef::Composite(vec![
            Field::named("nonce", TY_U32),
            Field::named("consumers", TY_U32),
            Field::named("providers", TY_U32),
            Field::named("sufficients", TY_U32),
            Field::named("data", TY_ACCOUNT_DATA),
        ]),
    );

    reg.insert(
        TY_MINER_INFO,
        TypeDef::Composite(vec![
            Field::named("peerid", TY_U64),
            Field::named("beneficiary", TY_ACCOUNT),
            Field::named("ip", TY_U32),
            Field::named("collaterals", TY_U128),
            Field::named("state", TY_BYTES),
        ]),
    );

    let pallets = vec![
        PalletInfo {
            name: "System".into(),
            index: SYSTEM_INDEX,
            calls: None,
            events: Some(TY_SYSTEM_EVENT),
            storage: vec![StorageEntry {
                name: "Account".into(),
                hashers: vec![StorageHasher::Blake2_128Concat],
                key: Some(TY_ACCOUNT),
                value: TY_ACCOUNT_INFO,
            }],
        },
        PalletInfo {
            name: "Balances".into(),
            index: BALANCES_INDEX,
            calls: None,
            events: Some(TY_BALANCES_EVENT),
            storage: Vec::new(),
        },
        PalletInfo {
            name: "Sminer".into(),
            index: SMINER_INDEX,
            calls: Some(TY_SMINER_CALL),
            events: Some(TY_SMINER_EVENT),
            storage: vec![StorageEntry {
                name: "MinerItems".into(),
                hashers: vec![StorageHasher::Blake2_128Concat],
                key: Some(TY_ACCOUNT),
                value: TY_MINER_INFO,
            }],
        },
        PalletInfo {
            name: "SegmentBook".into(),
            index: SEGMENT_BOOK_INDEX,
            calls: Some(TY_SEGMENT_CALL),
            events: Some(TY_SEGMENT_EVENT),
            storage: Vec::new(),
        },
    ];

    ChainSchema::new(reg, pallets)
}

fn field_def(field: &Field) -> FieldDef {
    FieldDef {
        name: field.name.clone(),
        ty: field.ty,
        type_name: None,
        docs: Vec::new(),
    }
}

fn type_definition(def: &TypeDef) -> TypeDefinition {
    match def {
        TypeDef::Composite(fields) => TypeDefinition::Composite {
            fields: fields.iter().map(field_def).collect(),
        },
        TypeDef::Variant(variants) => TypeDefinition::Variant {
            variants: variants
                .iter()
                .map(|v| VariantDef {
                    name: v.name.clone(),
                    fields: v.fields.iter().map(field_def).collect(),
                    index: v.index,
                    docs: Vec::new(),
                })
                .collect(),
        },
        TypeDef::Sequence(ty) => TypeDefinition::Sequence { ty: *ty },
        TypeDef::Array { len, ty } => TypeDefinition::Array { len: *len, ty: *ty },
        TypeDef::Tuple(items) => TypeDefinition::Tuple {
            items: items.iter().map(|ty| Compact(*ty)).collect(),
        },
        TypeDef::Primitive(p) => TypeDefinition::Primitive { primitive: *p },
        TypeDef::Compact(ty) => TypeDefinition::Compact { ty: *ty },
        TypeDef::BitSequence { store, order } => TypeDefinition::BitSequence {
            store: *store,
            order: *order,
        },
    }
}

fn storage_entry_def(entry: &StorageEntry) -> StorageEntryDef {
    let ty = match entry.key {
        None => StorageEntryType::Plain { value: entry.value },
        Some(key) => StorageEntryType::Map {
            hashers: entry.hashers.clone(),
            key,
            value: entry.value,
        },
    };
    StorageEntryDef {
        name: entry.name.clone(),
        modifier: 0,
        ty,
        default: Vec::new(),
        docs: Vec::new(),
    }
}

fn pallet_def(pallet: &PalletInfo) -> PalletV14 {
    PalletV14 {
        name: pallet.name.clone(),
        storage: (!pallet.storage.is_empty()).then(|| PalletStorageDef {
            prefix: pallet.name.clone(),
            entries: pallet.storage.iter().map(storage_entry_def).collect(),
        }),
        calls: pallet.calls.map(Compact),
        events: pallet.events.map(Compact),
        constants: Vec::new(),
        error: None,
        index: pallet.index,
    }
}

fn encode_types(schema: &ChainSchema, out: &mut Vec<u8>) {
    let types: Vec<PortableType> = schema
        .registry()
        .iter()
        .map(|(id, def)| PortableType {
            id,
            path: Vec::new(),
            params: Vec::new(),
            def: type_definition(def),
            docs: Vec::new(),
        })
        .collect();
    types.encode_to(out);
}

/// Extrinsic metadata and runtime type, ignored by the decoder
fn encode_trailer(out: &mut Vec<u8>) {
    (Compact(0u32), 4u8, Vec::<u8>::new(), Compact(0u32)).encode_to(out);
}

/// Encode `schema` as V14 runtime metadata
pub fn encode_metadata(schema: &ChainSchema) -> Vec<u8> {
    let mut out = MetadataPrefix {
        magic: METADATA_MAGIC,
        version: 14,
    }
    .encode();
    encode_types(schema, &mut out);
    let pallets: Vec<PalletV14> = schema.pallets().iter().map(pallet_def).collect();
    pallets.encode_to(&mut out);
    encode_trailer(&mut out);
    out
}

/// Encode `schema` as V15 runtime metadata
pub fn encode_metadata_v15(schema: &ChainSchema) -> Vec<u8> {
    let mut out = MetadataPrefix {
        magic: METADATA_MAGIC,
        version: 15,
    }
    .encode();
    encode_types(schema, &mut out);
    let pallets: Vec<PalletV15> = schema
        .pallets()
        .iter()
        .map(pallet_def)
        .map(|p| PalletV15 {
            name: p.name,
            storage: p.storage,
            calls: p.calls,
            events: p.events,
            constants: p.constants,
            error: p.error,
            index: p.index,
            docs: vec!["fixture pallet".into()],
        })
        .collect();
    pallets.encode_to(&mut out);
    encode_trailer(&mut out);
    out
}

/// `System.Account` value in the fixture layout
pub fn encode_account_info(nonce: u32, free: u128) -> Vec<u8> {
    // nonce, consumers, providers, sufficients, then free/reserved/frozen/flags
    (nonce, 0u32, 1u32, 0u32, free, 0u128, 0u128, 0u128).encode()
}

/// `Sminer.MinerItems` value in the fixture layout
pub fn encode_miner_info(peer_id: u64, beneficiary: AccountId, collaterals: u128) -> Vec<u8> {
    (
        peer_id,
        beneficiary,
        0xc0a8_0101u32,
        collaterals,
        b"positive".to_vec(),
    )
        .encode()
}

/// Builds a raw `System.Events` value record by record
#[derive(Debug, Clone, Default)]
pub struct EventLogBuilder {
    count: usize,
    body: Vec<u8>,
}

impl EventLogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, extrinsic: Option<u32>, pallet: u8, variant: u8, fields: &[u8]) -> Self {
        let phase = match extrinsic {
            Some(index) => Phase::ApplyExtrinsic(index),
            None => Phase::Finalization,
        };
        (phase, pallet, variant).encode_to(&mut self.body);
        self.body.extend_from_slice(fields);
        Vec::<[u8; 32]>::new().encode_to(&mut self.body);
        self.count += 1;
        self
    }

    fn dispatch_info() -> Vec<u8> {
        // weight, class Normal, pays Yes
        (1_000u64, 0u8, 0u8).encode()
    }

    pub fn extrinsic_success(self, extrinsic: u32) -> Self {
        self.push(Some(extrinsic), SYSTEM_INDEX, 0, &Self::dispatch_info())
    }

    /// `ExtrinsicFailed` with `DispatchError::BadOrigin`
    pub fn extrinsic_failed(self, extrinsic: u32) -> Self {
        let mut fields = vec![BAD_ORIGIN];
        fields.extend(Self::dispatch_info());
        self.push(Some(extrinsic), SYSTEM_INDEX, 1, &fields)
    }

    pub fn balances_transfer(self, extrinsic: u32, from: AccountId, to: AccountId, amount: u128) -> Self {
        let fields = (from, to, amount).encode();
        self.push(Some(extrinsic), BALANCES_INDEX, 2, &fields)
    }

    pub fn registered(self, extrinsic: u32, account: AccountId, staking: u128) -> Self {
        let fields = (account, staking).encode();
        self.push(Some(extrinsic), SMINER_INDEX, 0, &fields)
    }

    /// Emitted at block finalization
    pub fn timed_task(self) -> Self {
        self.push(None, SMINER_INDEX, 1, &[])
    }

    pub fn param_set(self, extrinsic: u32, peer_id: u64, segment_id: u64, random: u32) -> Self {
        let fields = (peer_id, segment_id, random).encode();
        self.push(Some(extrinsic), SEGMENT_BOOK_INDEX, 0, &fields)
    }

    pub fn proof_submitted(self, extrinsic: u32, phase: ProofPhase, peer_id: u64, segment_id: u64) -> Self {
        let fields = (peer_id, segment_id).encode();
        self.push(Some(extrinsic), SEGMENT_BOOK_INDEX, 1 + phase_offset(phase), &fields)
    }

    pub fn proof_verified(self, extrinsic: u32, phase: ProofPhase, peer_id: u64, segment_id: u64) -> Self {
        let fields = (peer_id, segment_id).encode();
        self.push(Some(extrinsic), SEGMENT_BOOK_INDEX, 5 + phase_offset(phase), &fields)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Compact(self.count as u32).encode();
        out.extend_from_slice(&self.body);
        out
    }
}
