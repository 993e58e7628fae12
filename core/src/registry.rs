// Copyright 2019-2025 Parity Technologies (UK) Ltd.
// This file is dual-licensed as Apache-2.0 or GPL-3.0.
// see LICENSE for license details.

//! Traversal of SCALE bytes driven by the runtime's own
//! [`PortableRegistry`].
//!
//! Two walks over the same shape: [`skip`] advances past a value without
//! building anything, [`read`] produces a [`Value`] tree. Both return the
//! offset of the first byte after the value, and the two must always agree
//! on it.
//!
//! [`read`] recursion is bounded; past the bound the remaining subtree is
//! measured with [`skip`] and surfaced as raw hex instead of failing the
//! whole extrinsic.

use crate::{DecodeError, Value, compact};
use scale_info::{PortableRegistry, TypeDef, TypeDefPrimitive, form::PortableForm};

/// How deep [`read`] recurses before falling back to raw hex.
pub const MAX_READ_DEPTH: usize = 16;

// Skip has no tree to build so it is allowed to go deeper, but it still
// needs a bound: a malformed registry can reference itself.
const MAX_SKIP_DEPTH: usize = 128;

/// Advance past one value of type `ty`, returning the offset just after it.
pub fn skip(
    bytes: &[u8],
    offset: usize,
    ty: u32,
    types: &PortableRegistry,
) -> Result<usize, DecodeError> {
    skip_at(bytes, offset, ty, types, 0)
}

/// Decode one value of type `ty`, returning the value and the offset just
/// after it.
pub fn read(
    bytes: &[u8],
    offset: usize,
    ty: u32,
    types: &PortableRegistry,
) -> Result<(Value, usize), DecodeError> {
    read_at(bytes, offset, ty, types, 0)
}

fn resolve<'a>(
    types: &'a PortableRegistry,
    ty: u32,
) -> Result<&'a scale_info::Type<PortableForm>, DecodeError> {
    types.resolve(ty).ok_or(DecodeError::TypeNotFound(ty))
}

fn take<'a>(bytes: &'a [u8], offset: usize, n: usize) -> Result<&'a [u8], DecodeError> {
    bytes
        .get(offset..offset + n)
        .ok_or(DecodeError::Eof(offset))
}

fn is_u8(types: &PortableRegistry, ty: u32) -> bool {
    matches!(
        types.resolve(ty).map(|t| &t.type_def),
        Some(TypeDef::Primitive(TypeDefPrimitive::U8))
    )
}

/// Width in bytes of a fixed-size primitive, or `None` for bool/char/str
/// which are handled separately.
fn primitive_width(p: &TypeDefPrimitive) -> Option<usize> {
    use TypeDefPrimitive::*;
    match p {
        U8 | I8 => Some(1),
        U16 | I16 => Some(2),
        U32 | I32 => Some(4),
        U64 | I64 => Some(8),
        U128 | I128 => Some(16),
        U256 | I256 => Some(32),
        Bool | Char | Str => None,
    }
}

/// Follow newtype wrappers down to the primitive a compact encoding
/// targets. `Compact<T>` is only valid when `T` bottoms out at an unsigned
/// integer.
fn compact_target(types: &PortableRegistry, mut ty: u32) -> Result<TypeDefPrimitive, DecodeError> {
    for _ in 0..MAX_SKIP_DEPTH {
        let resolved = resolve(types, ty)?;
        match &resolved.type_def {
            TypeDef::Primitive(p) => return Ok(p.clone()),
            TypeDef::Composite(c) if c.fields.len() == 1 => ty = c.fields[0].ty.id,
            TypeDef::Tuple(t) if t.fields.len() == 1 => ty = t.fields[0].id,
            _ => return Err(DecodeError::TypeNotFound(ty)),
        }
    }
    Err(DecodeError::DepthLimit(ty))
}

fn skip_at(
    bytes: &[u8],
    offset: usize,
    ty: u32,
    types: &PortableRegistry,
    depth: usize,
) -> Result<usize, DecodeError> {
    if depth > MAX_SKIP_DEPTH {
        return Err(DecodeError::DepthLimit(ty));
    }
    let resolved = resolve(types, ty)?;
    match &resolved.type_def {
        TypeDef::Primitive(p) => match p {
            TypeDefPrimitive::Bool => Ok(offset + 1),
            TypeDefPrimitive::Char => Ok(offset + 4),
            TypeDefPrimitive::Str => {
                let (len, next) = compact::compact_u32(bytes, offset)?;
                take(bytes, next, len as usize)?;
                Ok(next + len as usize)
            }
            other => {
                let width = primitive_width(other).expect("bool/char/str handled above");
                take(bytes, offset, width)?;
                Ok(offset + width)
            }
        },
        TypeDef::Compact(_) => {
            let len = compact::compact_len(bytes, offset)?;
            Ok(offset + len)
        }
        TypeDef::Sequence(seq) => {
            let (count, mut at) = compact::compact_u32(bytes, offset)?;
            let count = count as usize;
            if is_u8(types, seq.type_param.id) {
                take(bytes, at, count)?;
                return Ok(at + count);
            }
            if count > bytes.len().saturating_sub(at) {
                return Err(DecodeError::LengthOutOfBounds { len: count, offset });
            }
            for _ in 0..count {
                at = skip_at(bytes, at, seq.type_param.id, types, depth + 1)?;
            }
            Ok(at)
        }
        TypeDef::Array(arr) => {
            let count = arr.len as usize;
            if is_u8(types, arr.type_param.id) {
                take(bytes, offset, count)?;
                return Ok(offset + count);
            }
            let mut at = offset;
            for _ in 0..count {
                at = skip_at(bytes, at, arr.type_param.id, types, depth + 1)?;
            }
            Ok(at)
        }
        TypeDef::Tuple(tuple) => {
            let mut at = offset;
            for field in &tuple.fields {
                at = skip_at(bytes, at, field.id, types, depth + 1)?;
            }
            Ok(at)
        }
        TypeDef::Composite(composite) => {
            let mut at = offset;
            for field in &composite.fields {
                at = skip_at(bytes, at, field.ty.id, types, depth + 1)?;
            }
            Ok(at)
        }
        TypeDef::Variant(def) => {
            let index = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
            let variant = def
                .variants
                .iter()
                .find(|v| v.index == index)
                .ok_or(DecodeError::VariantNotFound { ty, index })?;
            let mut at = offset + 1;
            for field in &variant.fields {
                at = skip_at(bytes, at, field.ty.id, types, depth + 1)?;
            }
            Ok(at)
        }
        TypeDef::BitSequence(bits) => {
            let (nbits, at) = compact::compact_u32(bytes, offset)?;
            let store_bytes = bit_store_width(types, bits.bit_store_type.id)?;
            let payload = (nbits as usize).div_ceil(store_bytes * 8) * store_bytes;
            take(bytes, at, payload)?;
            Ok(at + payload)
        }
    }
}

fn read_at(
    bytes: &[u8],
    offset: usize,
    ty: u32,
    types: &PortableRegistry,
    depth: usize,
) -> Result<(Value, usize), DecodeError> {
    if depth > MAX_READ_DEPTH {
        // Too deep to represent; measure the subtree and hand back hex.
        let end = skip_at(bytes, offset, ty, types, depth)?;
        return Ok((Value::hex(&bytes[offset..end]), end));
    }
    let resolved = resolve(types, ty)?;
    match &resolved.type_def {
        TypeDef::Primitive(p) => read_primitive(bytes, offset, p),
        TypeDef::Compact(c) => {
            let target = compact_target(types, c.type_param.id)?;
            match target {
                TypeDefPrimitive::U8 | TypeDefPrimitive::U16 | TypeDefPrimitive::U32 => {
                    let (v, next) = compact::compact_u32(bytes, offset)?;
                    Ok((Value::U64(v as u64), next))
                }
                TypeDefPrimitive::U64 => {
                    let (v, next) = compact::compact_u64(bytes, offset)?;
                    Ok((Value::BigNum(v.to_string()), next))
                }
                TypeDefPrimitive::U128 => {
                    let (v, next) = compact::compact_u128(bytes, offset)?;
                    Ok((Value::BigNum(v.to_string()), next))
                }
                TypeDefPrimitive::U256 => {
                    let (v, next) = compact::compact_u256(bytes, offset)?;
                    Ok((Value::BigNum(v.to_string()), next))
                }
                _ => Err(DecodeError::Compact(offset)),
            }
        }
        TypeDef::Sequence(seq) => {
            let (count, mut at) = compact::compact_u32(bytes, offset)?;
            let count = count as usize;
            if is_u8(types, seq.type_param.id) {
                let raw = take(bytes, at, count)?;
                return Ok((Value::hex(raw), at + count));
            }
            if count > bytes.len().saturating_sub(at) {
                return Err(DecodeError::LengthOutOfBounds { len: count, offset });
            }
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let (item, next) = read_at(bytes, at, seq.type_param.id, types, depth + 1)?;
                items.push(item);
                at = next;
            }
            Ok((Value::List(items), at))
        }
        TypeDef::Array(arr) => {
            let count = arr.len as usize;
            if is_u8(types, arr.type_param.id) {
                let raw = take(bytes, offset, count)?;
                return Ok((Value::hex(raw), offset + count));
            }
            let mut items = Vec::with_capacity(count.min(1024));
            let mut at = offset;
            for _ in 0..count {
                let (item, next) = read_at(bytes, at, arr.type_param.id, types, depth + 1)?;
                items.push(item);
                at = next;
            }
            Ok((Value::List(items), at))
        }
        TypeDef::Tuple(tuple) => match tuple.fields.len() {
            0 => Ok((Value::Null, offset)),
            1 => read_at(bytes, offset, tuple.fields[0].id, types, depth + 1),
            _ => {
                let mut items = Vec::with_capacity(tuple.fields.len());
                let mut at = offset;
                for field in &tuple.fields {
                    let (item, next) = read_at(bytes, at, field.id, types, depth + 1)?;
                    items.push(item);
                    at = next;
                }
                Ok((Value::List(items), at))
            }
        },
        TypeDef::Composite(composite) => match composite.fields.len() {
            0 => Ok((Value::Null, offset)),
            // Newtype wrappers are transparent.
            1 => read_at(bytes, offset, composite.fields[0].ty.id, types, depth + 1),
            _ => read_fields(bytes, offset, &composite.fields, types, depth),
        },
        TypeDef::Variant(def) => {
            let index = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
            let variant = def
                .variants
                .iter()
                .find(|v| v.index == index)
                .ok_or(DecodeError::VariantNotFound { ty, index })?;
            let at = offset + 1;
            match variant.fields.len() {
                0 => Ok((Value::Str(variant.name.clone()), at)),
                1 if variant.fields[0].name.is_none() => {
                    let (inner, next) =
                        read_at(bytes, at, variant.fields[0].ty.id, types, depth + 1)?;
                    Ok((Value::entry(variant.name.clone(), inner), next))
                }
                _ => {
                    let (fields, next) =
                        read_fields(bytes, at, &variant.fields, types, depth)?;
                    Ok((Value::entry(variant.name.clone(), fields), next))
                }
            }
        }
        TypeDef::BitSequence(bits) => {
            let (nbits, at) = compact::compact_u32(bytes, offset)?;
            let store_bytes = bit_store_width(types, bits.bit_store_type.id)?;
            let payload = (nbits as usize).div_ceil(store_bytes * 8) * store_bytes;
            let raw = take(bytes, at, payload)?;
            Ok((Value::hex(raw), at + payload))
        }
    }
}

/// Decode a field list: a map when every field is named, a list otherwise.
fn read_fields(
    bytes: &[u8],
    offset: usize,
    fields: &[scale_info::Field<PortableForm>],
    types: &PortableRegistry,
    depth: usize,
) -> Result<(Value, usize), DecodeError> {
    let all_named = fields.iter().all(|f| f.name.is_some());
    let mut at = offset;
    if all_named {
        let mut entries = Vec::with_capacity(fields.len());
        for field in fields {
            let (value, next) = read_at(bytes, at, field.ty.id, types, depth + 1)?;
            entries.push((field.name.clone().expect("all named; checked above"), value));
            at = next;
        }
        Ok((Value::Map(entries), at))
    } else {
        let mut items = Vec::with_capacity(fields.len());
        for field in fields {
            let (value, next) = read_at(bytes, at, field.ty.id, types, depth + 1)?;
            items.push(value);
            at = next;
        }
        Ok((Value::List(items), at))
    }
}

fn read_primitive(
    bytes: &[u8],
    offset: usize,
    p: &TypeDefPrimitive,
) -> Result<(Value, usize), DecodeError> {
    use TypeDefPrimitive::*;
    match p {
        Bool => {
            let b = *bytes.get(offset).ok_or(DecodeError::Eof(offset))?;
            match b {
                0 => Ok((Value::Bool(false), offset + 1)),
                1 => Ok((Value::Bool(true), offset + 1)),
                _ => Err(DecodeError::Codec("invalid bool byte".into())),
            }
        }
        Char => {
            let raw = take(bytes, offset, 4)?;
            let code = u32::from_le_bytes(raw.try_into().expect("4 bytes taken"));
            let c = char::from_u32(code).ok_or(DecodeError::Codec("invalid char".into()))?;
            Ok((Value::Str(c.to_string()), offset + 4))
        }
        Str => {
            let (len, at) = compact::compact_u32(bytes, offset)?;
            let raw = take(bytes, at, len as usize)?;
            let value = match core::str::from_utf8(raw) {
                Ok(s) => Value::Str(s.to_owned()),
                Err(_) => Value::hex(raw),
            };
            Ok((value, at + len as usize))
        }
        U8 => {
            let raw = take(bytes, offset, 1)?;
            Ok((Value::U64(raw[0] as u64), offset + 1))
        }
        U16 => {
            let raw = take(bytes, offset, 2)?;
            let v = u16::from_le_bytes(raw.try_into().expect("2 bytes taken"));
            Ok((Value::U64(v as u64), offset + 2))
        }
        U32 => {
            let raw = take(bytes, offset, 4)?;
            let v = u32::from_le_bytes(raw.try_into().expect("4 bytes taken"));
            Ok((Value::U64(v as u64), offset + 4))
        }
        U64 => {
            let raw = take(bytes, offset, 8)?;
            let v = u64::from_le_bytes(raw.try_into().expect("8 bytes taken"));
            Ok((Value::BigNum(v.to_string()), offset + 8))
        }
        U128 => {
            let raw = take(bytes, offset, 16)?;
            let v = u128::from_le_bytes(raw.try_into().expect("16 bytes taken"));
            Ok((Value::BigNum(v.to_string()), offset + 16))
        }
        U256 => {
            let raw = take(bytes, offset, 32)?;
            let v = primitive_types::U256::from_little_endian(raw);
            Ok((Value::BigNum(v.to_string()), offset + 32))
        }
        I8 => {
            let raw = take(bytes, offset, 1)?;
            Ok((Value::I64(raw[0] as i8 as i64), offset + 1))
        }
        I16 => {
            let raw = take(bytes, offset, 2)?;
            let v = i16::from_le_bytes(raw.try_into().expect("2 bytes taken"));
            Ok((Value::I64(v as i64), offset + 2))
        }
        I32 => {
            let raw = take(bytes, offset, 4)?;
            let v = i32::from_le_bytes(raw.try_into().expect("4 bytes taken"));
            Ok((Value::I64(v as i64), offset + 4))
        }
        I64 => {
            let raw = take(bytes, offset, 8)?;
            let v = i64::from_le_bytes(raw.try_into().expect("8 bytes taken"));
            Ok((Value::BigNum(v.to_string()), offset + 8))
        }
        I128 => {
            let raw = take(bytes, offset, 16)?;
            let v = i128::from_le_bytes(raw.try_into().expect("16 bytes taken"));
            Ok((Value::BigNum(v.to_string()), offset + 16))
        }
        // No native i256; the raw bytes are more honest than a lossy cast.
        I256 => {
            let raw = take(bytes, offset, 32)?;
            Ok((Value::hex(raw), offset + 32))
        }
    }
}

fn bit_store_width(types: &PortableRegistry, ty: u32) -> Result<usize, DecodeError> {
    let resolved = resolve(types, ty)?;
    match &resolved.type_def {
        TypeDef::Primitive(p) => {
            primitive_width(p).ok_or(DecodeError::Codec("invalid bit store type".into()))
        }
        _ => Err(DecodeError::Codec("invalid bit store type".into())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use codec::{Compact, Encode};
    use pretty_assertions::assert_eq;
    use scale_info::TypeInfo;

    fn registry_of<T: TypeInfo + 'static>() -> (PortableRegistry, u32) {
        let mut registry = scale_info::Registry::new();
        let id = registry.register_type(&scale_info::meta_type::<T>());
        (registry.into(), id.id)
    }

    fn read_all<T: TypeInfo + 'static>(bytes: &[u8]) -> Value {
        let (types, ty) = registry_of::<T>();
        let (value, end) = read(bytes, 0, ty, &types).unwrap();
        // skip and read must agree on the end offset for every value.
        assert_eq!(skip(bytes, 0, ty, &types).unwrap(), end);
        assert_eq!(end, bytes.len());
        value
    }

    #[derive(TypeInfo, Encode)]
    struct TransferArgs {
        dest: [u8; 32],
        value: u128,
    }

    #[test]
    fn named_composite_becomes_a_map() {
        let encoded = TransferArgs {
            dest: [0xab; 32],
            value: 12_345,
        }
        .encode();
        let value = read_all::<TransferArgs>(&encoded);
        assert_eq!(
            value,
            Value::Map(vec![
                ("dest".into(), Value::hex([0xab; 32])),
                ("value".into(), Value::BigNum("12345".into())),
            ])
        );
    }

    #[derive(TypeInfo, Encode)]
    struct Wrapper(u32);

    #[test]
    fn newtype_composite_is_transparent() {
        let encoded = Wrapper(77).encode();
        assert_eq!(read_all::<Wrapper>(&encoded), Value::U64(77));
    }

    #[allow(unused)]
    #[derive(TypeInfo, Encode)]
    enum Junction {
        Parachain(#[codec(compact)] u32),
        AccountId32 { network: Option<()>, id: [u8; 32] },
        AccountIndex64(#[codec(compact)] u64),
        GeneralKey(Vec<u8>),
        PalletInstance(u8),
    }

    #[test]
    fn junction_vectors() {
        // 0x0432: variant 4, one byte payload.
        let value = read_all::<Junction>(&crate::from_hex("0x0432").unwrap());
        assert_eq!(value, Value::entry("PalletInstance", Value::U64(0x32)));

        // 0x00a10f: variant 0, compact 1000.
        let value = read_all::<Junction>(&crate::from_hex("0x00a10f").unwrap());
        assert_eq!(value, Value::entry("Parachain", Value::U64(1000)));

        // 0x0100 ++ 32 bytes of 0xab: variant 1, network None, raw id.
        let mut bytes = vec![0x01, 0x00];
        bytes.extend_from_slice(&[0xab; 32]);
        let value = read_all::<Junction>(&bytes);
        assert_eq!(
            value,
            Value::entry(
                "AccountId32",
                Value::Map(vec![
                    ("network".into(), Value::Str("None".into())),
                    ("id".into(), Value::hex([0xab; 32])),
                ])
            )
        );
    }

    #[test]
    fn byte_sequences_fast_path_to_hex() {
        let encoded = vec![1u8, 2, 3].encode();
        assert_eq!(read_all::<Vec<u8>>(&encoded), Value::Hex("0x010203".into()));

        let encoded = vec![100u16, 200].encode();
        assert_eq!(
            read_all::<Vec<u16>>(&encoded),
            Value::List(vec![Value::U64(100), Value::U64(200)])
        );
    }

    #[test]
    fn compact_fields_decode_by_target_width() {
        let encoded = (Compact(5u32), Compact(u128::MAX)).encode();
        let value = read_all::<(Compact<u32>, Compact<u128>)>(&encoded);
        assert_eq!(
            value,
            Value::List(vec![
                Value::U64(5),
                Value::BigNum(u128::MAX.to_string()),
            ])
        );
    }

    #[test]
    fn overlong_sequence_length_is_rejected() {
        let (types, ty) = registry_of::<Vec<u32>>();
        // Claims 2^28 elements with two bytes of payload.
        let bytes = Compact(1u32 << 28).encode();
        assert!(matches!(
            read(&bytes, 0, ty, &types),
            Err(DecodeError::LengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn unknown_variant_index_errors() {
        let (types, ty) = registry_of::<Option<u8>>();
        let err = read(&[0x09], 0, ty, &types).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::VariantNotFound { index: 0x09, .. }
        ));
    }

    #[test]
    fn tuples_and_strings() {
        let encoded = ("hello".to_string(), true, 7u8).encode();
        assert_eq!(
            read_all::<(String, bool, u8)>(&encoded),
            Value::List(vec![
                Value::Str("hello".into()),
                Value::Bool(true),
                Value::U64(7),
            ])
        );
    }

    type Deep = Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<Vec<u32>>>>>>>>>>>>>>>>>>;

    #[test]
    fn depth_bound_falls_back_to_hex() {
        // Eighteen nested vecs push past the read bound; the subtree must
        // come back as hex with the right end offset, not an error.
        let mut encoded = vec![9u32].encode();
        for _ in 0..17 {
            let mut next = Compact(1u32).encode();
            next.extend_from_slice(&encoded);
            encoded = next;
        }
        let (types, ty) = registry_of::<Deep>();
        let (value, end) = read(&encoded, 0, ty, &types).unwrap();
        assert_eq!(end, encoded.len());
        assert_eq!(skip(&encoded, 0, ty, &types).unwrap(), end);
        fn has_hex(v: &Value) -> bool {
            match v {
                Value::Hex(_) => true,
                Value::List(items) => items.iter().any(has_hex),
                Value::Map(entries) => entries.iter().any(|(_, v)| has_hex(v)),
                _ => false,
            }
        }
        assert!(has_hex(&value));
    }
}
