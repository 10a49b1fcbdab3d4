use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::inst::{Arg, ArgKind, Instruction, Value};
use crate::nls::Nls;
use crate::opcode::{IntWidth, ScalarKind};
use crate::reloc::OffsetMap;

fn put_arg(buf: &mut BytesMut, arg: &Arg, map: &OffsetMap, nls: Nls, offset: u32) -> Result<()> {
    let mismatch = || Error::ValueMismatch { offset, tag: arg.kind.tag() };
    match (arg.kind, &arg.value) {
        (ArgKind::Scalar(ScalarKind::OffsetRef), Value::Int(target)) => {
            buf.put_u32_le(map.resolve(*target)?);
        }
        (ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Byte)), Value::Int(v))
        | (ArgKind::RepeatCount, Value::Int(v))
        | (ArgKind::ListCount, Value::Int(v)) => {
            buf.put_u8(u8::try_from(*v).map_err(|_| mismatch())?);
        }
        (ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Word)), Value::Int(v)) => {
            buf.put_u16_le(u16::try_from(*v).map_err(|_| mismatch())?);
        }
        (ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Dword)), Value::Int(v)) => buf.put_u32_le(*v),
        (ArgKind::Scalar(ScalarKind::Float32), Value::Float(v)) => buf.put_f32_le(*v),
        (ArgKind::Scalar(ScalarKind::WideString(_)), Value::Str(s)) => {
            buf.put_slice(&nls.encode_cstr(s, offset)?);
        }
        _ => return Err(mismatch()),
    }
    Ok(())
}

/// Serializes `insts` for `nls`, rewriting every offset reference through `map`.
///
/// `map` must come from [`relocate`](crate::reloc::relocate) over the same
/// instructions and encoding.
pub fn encode(insts: &[Instruction], map: &OffsetMap, nls: Nls) -> Result<Vec<u8>> {
    let mut buf = BytesMut::with_capacity(map.total_len() as usize);
    for inst in insts {
        buf.put_u8(inst.opcode);
        for arg in &inst.args {
            put_arg(&mut buf, arg, map, nls, inst.original_offset)?;
        }
    }

    let actual = buf.len() as u32;
    if actual != map.total_len() {
        return Err(Error::LengthMismatch { expected: map.total_len(), actual });
    }
    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::Slot;
    use crate::reloc::relocate;
    use pretty_assertions::assert_eq;

    fn push(inst: &mut Instruction, kind: ArgKind, value: Value) {
        let index = inst.args.len() as u16;
        inst.args.push(Arg::new(kind, value, Slot::new(0, index)));
    }

    #[test]
    fn writes_little_endian_fields() {
        let mut inst = Instruction::new(0, 0x01);
        push(&mut inst, ArgKind::Scalar(ScalarKind::BYTE), Value::Int(0xAB));
        push(&mut inst, ArgKind::Scalar(ScalarKind::WORD), Value::Int(0x1234));
        push(&mut inst, ArgKind::Scalar(ScalarKind::Float32), Value::Float(1.5));
        push(&mut inst, ArgKind::Scalar(ScalarKind::STR), Value::Str("A".into()));
        let map = relocate(std::slice::from_ref(&inst), Nls::Utf16Le).unwrap();
        let bytes = encode(&[inst], &map, Nls::Utf16Le).unwrap();
        assert_eq!(
            bytes,
            vec![0x01, 0xAB, 0x34, 0x12, 0x00, 0x00, 0xC0, 0x3F, 0x41, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn rewrites_references_after_text_grows() {
        let mut jump = Instruction::new(0, 0x06);
        push(&mut jump, ArgKind::Scalar(ScalarKind::OffsetRef), Value::Int(11));
        let mut say = Instruction::new(5, 0x15);
        push(&mut say, ArgKind::Scalar(ScalarKind::TEXT), Value::Str("Hello".into()));
        let end = Instruction::new(11, 0xff);
        let insts = vec![jump, say, end];

        let map = relocate(&insts, Nls::Utf16Le).unwrap();
        let bytes = encode(&insts, &map, Nls::Utf16Le).unwrap();
        // 5 + 1 + 12 = 18
        assert_eq!(&bytes[1..5], &18u32.to_le_bytes());
        assert_eq!(bytes[18], 0xff);
    }

    #[test]
    fn dangling_reference_is_reported() {
        let mut jump = Instruction::new(0, 0x06);
        push(&mut jump, ArgKind::Scalar(ScalarKind::OffsetRef), Value::Int(3));
        let insts = vec![jump];
        let map = relocate(&insts, Nls::Utf16Le).unwrap();
        assert!(matches!(
            encode(&insts, &map, Nls::Utf16Le),
            Err(Error::DanglingReference { original_offset: 3 })
        ));
    }

    #[test]
    fn map_from_another_encoding_is_a_length_mismatch() {
        let mut say = Instruction::new(0, 0x15);
        push(&mut say, ArgKind::Scalar(ScalarKind::TEXT), Value::Str("abc".into()));
        let insts = vec![say];
        let map = relocate(&insts, Nls::Utf8).unwrap();
        assert!(matches!(
            encode(&insts, &map, Nls::Utf16Le),
            Err(Error::LengthMismatch { expected: 5, actual: 9 })
        ));
    }

    #[test]
    fn unencodable_text_names_the_instruction() {
        let mut say = Instruction::new(40, 0x15);
        push(&mut say, ArgKind::Scalar(ScalarKind::TEXT), Value::Str("😀".into()));
        let insts = vec![say];
        match encode(&insts, &OffsetMap::default(), Nls::ShiftJis) {
            Err(Error::UnsupportedCharacter { offset, ch, .. }) => assert_eq!((offset, ch), (40, '😀')),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
