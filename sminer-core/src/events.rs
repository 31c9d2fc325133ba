//! Typed block events
//!
//! A block's `System.Events` storage value is a `Vec<EventRecord>`. Every
//! event is decoded through the registry so that unrelated events of any
//! shape are consumed correctly, then the kinds the miner cares about are
//! lifted into [`ChainEvent`].

use std::fmt;

use parity_scale_codec::{Decode, Encode};

use crate::codec::read_len;
use crate::crypto::AccountId;
use crate::error::{ChainError, Result};
use crate::schema::{ChainSchema, TypeDef};
use crate::value::Value;

/// Pallet and event names the miner correlates on
pub mod names {
    pub const SYSTEM: &str = "System";
    pub const SMINER: &str = "Sminer";
    pub const SEGMENT_BOOK: &str = "SegmentBook";

    pub const EXTRINSIC_SUCCESS: &str = "ExtrinsicSuccess";
    pub const EXTRINSIC_FAILED: &str = "ExtrinsicFailed";
    pub const PARAM_SET: &str = "ParamSet";
    pub const TIMED_TASK: &str = "TimedTask";
    pub const REGISTERED: &str = "Registered";
}

/// When in the block an event was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum Phase {
    ApplyExtrinsic(u32),
    Finalization,
    Initialization,
}

/// Verification stage of a segment proof
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofPhase {
    A,
    B,
    C,
    D,
}

impl ProofPhase {
    pub const ALL: [ProofPhase; 4] = [ProofPhase::A, ProofPhase::B, ProofPhase::C, ProofPhase::D];

    fn letter(self) -> char {
        match self {
            ProofPhase::A => 'A',
            ProofPhase::B => 'B',
            ProofPhase::C => 'C',
            ProofPhase::D => 'D',
        }
    }

    /// Event name emitted when a proof of this phase is accepted
    pub fn submitted_event(self) -> String {
        format!("VP{}Submitted", self.letter())
    }

    /// Event name emitted when a proof of this phase is verified
    pub fn verified_event(self) -> String {
        format!("VP{}Verified", self.letter())
    }
}

impl fmt::Display for ProofPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VP{}", self.letter())
    }
}

/// Events the miner understands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    ExtrinsicSuccess,
    ExtrinsicFailed {
        /// Name of the dispatch error variant
        error: String,
    },
    SegmentParamSet {
        peer_id: u64,
        segment_id: u64,
        random: u32,
    },
    ProofSubmitted {
        phase: ProofPhase,
        peer_id: u64,
        segment_id: u64,
    },
    ProofVerified {
        phase: ProofPhase,
        peer_id: u64,
        segment_id: u64,
    },
    TimedTask,
    Registered {
        account: AccountId,
        staking: u128,
    },
    Other {
        pallet: String,
        variant: String,
    },
}

impl ChainEvent {
    /// `Pallet.Event` label for logs
    pub fn label(&self) -> String {
        match self {
            ChainEvent::ExtrinsicSuccess => format!("{}.{}", names::SYSTEM, names::EXTRINSIC_SUCCESS),
            ChainEvent::ExtrinsicFailed { .. } => {
                format!("{}.{}", names::SYSTEM, names::EXTRINSIC_FAILED)
            }
            ChainEvent::SegmentParamSet { .. } => {
                format!("{}.{}", names::SEGMENT_BOOK, names::PARAM_SET)
            }
            ChainEvent::ProofSubmitted { phase, .. } => {
                format!("{}.{}", names::SEGMENT_BOOK, phase.submitted_event())
            }
            ChainEvent::ProofVerified { phase, .. } => {
                format!("{}.{}", names::SEGMENT_BOOK, phase.verified_event())
            }
            ChainEvent::TimedTask => format!("{}.{}", names::SMINER, names::TIMED_TASK),
            ChainEvent::Registered { .. } => format!("{}.{}", names::SMINER, names::REGISTERED),
            ChainEvent::Other { pallet, variant } => format!("{}.{}", pallet, variant),
        }
    }
}

/// One entry of a block's event log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub phase: Phase,
    pub event: ChainEvent,
    pub topics: Vec<[u8; 32]>,
}

/// Decode the raw `System.Events` value of a block
pub fn decode_event_records(schema: &ChainSchema, raw: &[u8]) -> Result<Vec<EventRecord>> {
    let mut input = raw;
    let count = read_len(&mut input)?;
    let mut records = Vec::with_capacity(count.min(input.len()));

    for position in 0..count {
        let phase = Phase::decode(&mut input)?;
        let pallet_index = u8::decode(&mut input)?;
        let pallet = schema.pallet_by_index(pallet_index).ok_or_else(|| {
            ChainError::Codec(format!(
                "event {} from unknown pallet index {}",
                position, pallet_index
            ))
        })?;
        let events_ty = pallet.events.ok_or_else(|| {
            ChainError::Codec(format!("pallet {} declares no events", pallet.name))
        })?;
        if !matches!(schema.registry().resolve(events_ty)?, TypeDef::Variant(_)) {
            return Err(ChainError::Codec(format!(
                "event type of {} is not an enum",
                pallet.name
            )));
        }

        let value = schema.registry().decode_value(events_ty, &mut input)?;
        let event = lift(&pallet.name, value)?;
        let topics = Vec::<[u8; 32]>::decode(&mut input)?;

        records.push(EventRecord {
            phase,
            event,
            topics,
        });
    }

    Ok(records)
}

fn lift(pallet: &str, value: Value) -> Result<ChainEvent> {
    let Value::Variant { name, fields, .. } = value else {
        return Err(ChainError::Codec(format!("{} event is not a variant", pallet)));
    };
    let args: Vec<Value> = fields.into_iter().map(|(_, v)| v).collect();
    let shape = || ChainError::Codec(format!("unexpected fields for {}.{}", pallet, name));

    let u64_at = |i: usize| args.get(i).and_then(Value::as_u64).ok_or_else(shape);

    let event = match (pallet, name.as_str()) {
        (names::SYSTEM, names::EXTRINSIC_SUCCESS) => ChainEvent::ExtrinsicSuccess,
        (names::SYSTEM, names::EXTRINSIC_FAILED) => ChainEvent::ExtrinsicFailed {
            error: args
                .first()
                .and_then(Value::variant_name)
                .unwrap_or("Unknown")
                .to_string(),
        },
        (names::SEGMENT_BOOK, names::PARAM_SET) => ChainEvent::SegmentParamSet {
            peer_id: u64_at(0)?,
            segment_id: u64_at(1)?,
            random: args.get(2).and_then(Value::as_u32).ok_or_else(shape)?,
        },
        (names::SMINER, names::TIMED_TASK) => ChainEvent::TimedTask,
        (names::SMINER, names::REGISTERED) => ChainEvent::Registered {
            account: args.first().and_then(Value::as_account).ok_or_else(shape)?,
            staking: args.get(1).and_then(Value::as_u128).ok_or_else(shape)?,
        },
        (names::SEGMENT_BOOK, event) => {
            match ProofPhase::ALL.iter().find_map(|p| {
                if event == p.submitted_event() {
                    Some((*p, true))
                } else if event == p.verified_event() {
                    Some((*p, false))
                } else {
                    None
                }
            }) {
                Some((phase, true)) => ChainEvent::ProofSubmitted {
                    phase,
                    peer_id: u64_at(0)?,
                    segment_id: u64_at(1)?,
                },
                Some((phase, false)) => ChainEvent::ProofVerified {
                    phase,
                    peer_id: u64_at(0)?,
                    segment_id: u64_at(1)?,
                },
                None => ChainEvent::Other {
                    pallet: pallet.to_string(),
                    variant: name.clone(),
                },
            }
        }
        _ => ChainEvent::Other {
            pallet: pallet.to_string(),
            variant: name.clone(),
        },
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, EventLogBuilder};
    use proptest::prelude::*;

    #[test]
    fn test_decode_mixed_block() {
        let schema = fixtures::miner_schema();
        let alice = AccountId([1u8; 32]);
        let bob = AccountId([2u8; 32]);

        let raw = EventLogBuilder::new()
            .balances_transfer(0, alice, bob, 500)
            .extrinsic_success(0)
            .registered(1, bob, 7)
            .param_set(1, 3, 11, 0xdead)
            .proof_submitted(2, ProofPhase::C, 3, 11)
            .proof_verified(2, ProofPhase::D, 4, 12)
            .timed_task()
            .extrinsic_failed(2)
            .build();

        let records = decode_event_records(&schema, &raw).unwrap();
        let events: Vec<_> = records.iter().map(|r| r.event.clone()).collect();
        assert_eq!(
            events,
            vec![
                ChainEvent::Other {
                    pallet: "Balances".into(),
                    variant: "Transfer".into()
                },
                ChainEvent::ExtrinsicSuccess,
                ChainEvent::Registered {
                    account: bob,
                    staking: 7
                },
                ChainEvent::SegmentParamSet {
                    peer_id: 3,
                    segment_id: 11,
                    random: 0xdead
                },
                ChainEvent::ProofSubmitted {
                    phase: ProofPhase::C,
                    peer_id: 3,
                    segment_id: 11
                },
                ChainEvent::ProofVerified {
                    phase: ProofPhase::D,
                    peer_id: 4,
                    segment_id: 12
                },
                ChainEvent::TimedTask,
                ChainEvent::ExtrinsicFailed {
                    error: "BadOrigin".into()
                },
            ]
        );
        assert_eq!(records[0].phase, Phase::ApplyExtrinsic(0));
        assert_eq!(records[6].phase, Phase::Finalization);
    }

    #[test]
    fn test_empty_log() {
        let schema = fixtures::miner_schema();
        let raw = EventLogBuilder::new().build();
        assert!(decode_event_records(&schema, &raw).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_pallet_fails() {
        let schema = fixtures::miner_schema();
        // one record, ApplyExtrinsic(0), pallet 200
        let raw = vec![0x04, 0x00, 0, 0, 0, 0, 200, 0x00, 0x00];
        assert!(matches!(
            decode_event_records(&schema, &raw),
            Err(ChainError::Codec(_))
        ));
    }

    #[test]
    fn test_unknown_phase_fails() {
        let schema = fixtures::miner_schema();
        assert!(matches!(
            decode_event_records(&schema, &[0x04, 0x07, 0x00]),
            Err(ChainError::Codec(_))
        ));
    }

    proptest! {
        #[test]
        fn test_arbitrary_bytes_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..256)) {
            let schema = fixtures::miner_schema();
            let _ = decode_event_records(&schema, &raw);
        }
    }

    #[test]
    fn test_truncated_log_fails() {
        let schema = fixtures::miner_schema();
        let raw = EventLogBuilder::new().param_set(0, 1, 2, 3).build();
        assert!(decode_event_records(&schema, &raw[..raw.len() - 3]).is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(ProofPhase::B.submitted_event(), "VPBSubmitted");
        assert_eq!(
            ChainEvent::ProofVerified {
                phase: ProofPhase::A,
                peer_id: 0,
                segment_id: 0
            }
            .label(),
            "SegmentBook.VPAVerified"
        );
    }
}
