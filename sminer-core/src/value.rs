//! Registry-driven decoding of arbitrary SCALE values

use parity_scale_codec::{Compact, Decode};

use crate::codec::{read_len, take};
use crate::crypto::AccountId;
use crate::error::{ChainError, Result};
use crate::schema::{Field, Primitive, TypeDef, TypeId, TypeRegistry, MAX_TYPE_DEPTH};

/// A decoded value of any registry type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Char(char),
    Str(String),
    Uint(u128),
    Int(i128),
    /// 256-bit integers, little-endian
    Wide([u8; 32]),
    /// Sequences and arrays of `u8`
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Composite(Vec<(Option<String>, Value)>),
    Variant {
        name: String,
        index: u8,
        fields: Vec<(Option<String>, Value)>,
    },
    BitSeq {
        bits: usize,
        data: Vec<u8>,
    },
}

impl Value {
    /// Strip single-field composite wrappers
    fn inner(&self) -> &Value {
        let mut value = self;
        while let Value::Composite(fields) = value {
            if fields.len() != 1 {
                break;
            }
            value = &fields[0].1;
        }
        value
    }

    pub fn as_u128(&self) -> Option<u128> {
        match self.inner() {
            Value::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_u128().and_then(|v| u64::try_from(v).ok())
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_u128().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self.inner() {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_account(&self) -> Option<AccountId> {
        let bytes: [u8; 32] = self.as_bytes()?.try_into().ok()?;
        Some(AccountId(bytes))
    }

    /// Named field of a composite or variant
    pub fn field(&self, name: &str) -> Option<&Value> {
        let fields = match self {
            Value::Composite(fields) | Value::Variant { fields, .. } => fields,
            _ => return None,
        };
        fields
            .iter()
            .find(|(n, _)| n.as_deref() == Some(name))
            .map(|(_, v)| v)
    }

    /// Variant name, looking through newtype wrappers
    pub fn variant_name(&self) -> Option<&str> {
        match self.inner() {
            Value::Variant { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl TypeRegistry {
    /// Decode a value of type `ty` from the front of `input`
    pub fn decode_value(&self, ty: TypeId, input: &mut &[u8]) -> Result<Value> {
        self.decode_at(ty, input, 0)
    }

    fn decode_fields(
        &self,
        fields: &[Field],
        input: &mut &[u8],
        depth: usize,
    ) -> Result<Vec<(Option<String>, Value)>> {
        fields
            .iter()
            .map(|f| Ok((f.name.clone(), self.decode_at(f.ty, input, depth + 1)?)))
            .collect()
    }

    fn decode_at(&self, ty: TypeId, input: &mut &[u8], depth: usize) -> Result<Value> {
        if depth > MAX_TYPE_DEPTH {
            return Err(ChainError::Codec(format!("type {} nests too deeply", ty)));
        }

        match self.resolve(ty)? {
            TypeDef::Composite(fields) => {
                Ok(Value::Composite(self.decode_fields(fields, input, depth)?))
            }
            TypeDef::Variant(variants) => {
                let index = u8::decode(input)?;
                let variant = variants.iter().find(|v| v.index == index).ok_or_else(|| {
                    ChainError::Codec(format!("type {} has no variant {}", ty, index))
                })?;
                Ok(Value::Variant {
                    name: variant.name.clone(),
                    index,
                    fields: self.decode_fields(&variant.fields, input, depth)?,
                })
            }
            TypeDef::Sequence(inner) => {
                if self.is_plain_u8(*inner)? {
                    return Ok(Value::Bytes(Vec::<u8>::decode(input)?));
                }
                let len = read_len(input)?;
                let mut items = Vec::with_capacity(len.min(input.len()));
                for _ in 0..len {
                    items.push(self.decode_at(*inner, input, depth + 1)?);
                }
                Ok(Value::Seq(items))
            }
            TypeDef::Array { len, ty: inner } => {
                let len = *len as usize;
                if self.is_plain_u8(*inner)? {
                    return Ok(Value::Bytes(take(input, len)?.to_vec()));
                }
                (0..len)
                    .map(|_| self.decode_at(*inner, input, depth + 1))
                    .collect::<Result<_>>()
                    .map(Value::Seq)
            }
            TypeDef::Tuple(items) => items
                .iter()
                .map(|item| self.decode_at(*item, input, depth + 1))
                .collect::<Result<_>>()
                .map(Value::Seq),
            TypeDef::Primitive(p) => decode_primitive(*p, input),
            TypeDef::Compact(_) => Ok(Value::Uint(Compact::<u128>::decode(input)?.0)),
            TypeDef::BitSequence { store, .. } => {
                let word = match self.resolve(*store)? {
                    TypeDef::Primitive(Primitive::U8) => 1,
                    TypeDef::Primitive(Primitive::U16) => 2,
                    TypeDef::Primitive(Primitive::U32) => 4,
                    TypeDef::Primitive(Primitive::U64) => 8,
                    other => {
                        return Err(ChainError::Codec(format!(
                            "unsupported bit store {:?}",
                            other
                        )))
                    }
                };
                let bits = read_len(input)?;
                let words = bits.div_ceil(word * 8);
                let data = take(input, words * word)?.to_vec();
                Ok(Value::BitSeq { bits, data })
            }
        }
    }

    fn is_plain_u8(&self, ty: TypeId) -> Result<bool> {
        Ok(matches!(
            self.resolve(ty)?,
            TypeDef::Primitive(Primitive::U8)
        ))
    }
}

fn decode_primitive(p: Primitive, input: &mut &[u8]) -> Result<Value> {
    Ok(match p {
        Primitive::Bool => Value::Bool(bool::decode(input)?),
        Primitive::Char => {
            let raw = u32::decode(input)?;
            Value::Char(
                char::from_u32(raw)
                    .ok_or_else(|| ChainError::Codec(format!("invalid char {}", raw)))?,
            )
        }
        Primitive::Str => Value::Str(String::decode(input)?),
        Primitive::U8 => Value::Uint(u8::decode(input)?.into()),
        Primitive::U16 => Value::Uint(u16::decode(input)?.into()),
        Primitive::U32 => Value::Uint(u32::decode(input)?.into()),
        Primitive::U64 => Value::Uint(u64::decode(input)?.into()),
        Primitive::U128 => Value::Uint(u128::decode(input)?),
        Primitive::I8 => Value::Int(i8::decode(input)?.into()),
        Primitive::I16 => Value::Int(i16::decode(input)?.into()),
        Primitive::I32 => Value::Int(i32::decode(input)?.into()),
        Primitive::I64 => Value::Int(i64::decode(input)?.into()),
        Primitive::I128 => Value::Int(i128::decode(input)?),
        Primitive::U256 | Primitive::I256 => Value::Wide(<[u8; 32]>::decode(input)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Variant;
    use parity_scale_codec::Encode;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.insert(0, TypeDef::Primitive(Primitive::U8));
        reg.insert(1, TypeDef::Primitive(Primitive::U32));
        reg.insert(2, TypeDef::Array { len: 32, ty: 0 });
        reg.insert(3, TypeDef::Composite(vec![Field::unnamed(2)]));
        reg.insert(4, TypeDef::Sequence(0));
        reg.insert(5, TypeDef::Sequence(1));
        reg.insert(6, TypeDef::Compact(1));
        reg.insert(
            7,
            TypeDef::Variant(vec![
                Variant::new("Empty", 0, vec![]),
                Variant::new("Pair", 3, vec![Field::named("a", 1), Field::named("b", 4)]),
            ]),
        );
        reg.insert(8, TypeDef::Tuple(vec![0, 6]));
        reg.insert(9, TypeDef::BitSequence { store: 0, order: 0 });
        reg.insert(10, TypeDef::Primitive(Primitive::I16));
        reg.insert(11, TypeDef::Tuple(vec![]));
        reg.insert(12, TypeDef::Sequence(11));
        reg
    }

    fn decode(ty: TypeId, bytes: &[u8]) -> Result<Value> {
        let mut input = bytes;
        let value = registry().decode_value(ty, &mut input)?;
        assert!(input.is_empty(), "trailing bytes after type {}", ty);
        Ok(value)
    }

    #[test]
    fn test_byte_collections_collapse() {
        let raw = b"hello".to_vec().encode();
        assert_eq!(decode(4, &raw).unwrap(), Value::Bytes(b"hello".to_vec()));

        let account = decode(3, &[7u8; 32]).unwrap();
        assert_eq!(account.as_account(), Some(AccountId([7u8; 32])));
    }

    #[test]
    fn test_sequences_and_compacts() {
        let raw = vec![5u32, 6].encode();
        assert_eq!(
            decode(5, &raw).unwrap(),
            Value::Seq(vec![Value::Uint(5), Value::Uint(6)])
        );

        let raw = (9u8, Compact(100_000u32)).encode();
        assert_eq!(
            decode(8, &raw).unwrap(),
            Value::Seq(vec![Value::Uint(9), Value::Uint(100_000)])
        );
    }

    #[test]
    fn test_zero_sized_elements_outnumber_input() {
        // five unit tuples and nothing after the length prefix
        let raw = Compact(5u32).encode();
        assert_eq!(
            decode(12, &raw).unwrap(),
            Value::Seq(vec![Value::Seq(vec![]); 5])
        );
    }

    #[test]
    fn test_variants_by_index() {
        let raw = (3u8, 42u32, vec![1u8, 2]).encode();

        let value = decode(7, &raw).unwrap();
        assert_eq!(value.variant_name(), Some("Pair"));
        assert_eq!(value.field("a").and_then(Value::as_u32), Some(42));
        assert_eq!(value.field("b").and_then(Value::as_bytes), Some(&[1u8, 2][..]));

        assert!(decode(7, &[1]).is_err());
    }

    #[test]
    fn test_bit_sequence_and_signed() {
        let mut raw = Compact(10u32).encode();
        raw.extend_from_slice(&[0xff, 0x03]);
        assert_eq!(
            decode(9, &raw).unwrap(),
            Value::BitSeq {
                bits: 10,
                data: vec![0xff, 0x03]
            }
        );

        assert_eq!(decode(10, &(-2i16).encode()).unwrap(), Value::Int(-2));
    }

    #[test]
    fn test_missing_type_is_an_error() {
        let mut input = &[0u8][..];
        assert!(registry().decode_value(99, &mut input).is_err());
    }
}
