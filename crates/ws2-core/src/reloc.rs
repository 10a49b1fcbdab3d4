use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::inst::{Arg, Instruction, Value};
use crate::nls::Nls;

/// Original start offset of every instruction mapped to where it lands after
/// re-encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OffsetMap {
    map: BTreeMap<u32, u32>,
    total_len: u32,
}

impl OffsetMap {
    pub fn get(&self, original_offset: u32) -> Option<u32> {
        self.map.get(&original_offset).copied()
    }

    pub fn resolve(&self, original_offset: u32) -> Result<u32> {
        self.get(original_offset).ok_or(Error::DanglingReference { original_offset })
    }

    /// Length in bytes of the whole re-encoded stream.
    pub fn total_len(&self) -> u32 {
        self.total_len
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }
}

/// Encoded size of one arg. Count bytes are one byte; their members are
/// separate args and get measured on their own.
pub fn arg_len(arg: &Arg, nls: Nls, offset: u32) -> Result<u32> {
    match (&arg.value, arg.kind.fixed_width()) {
        (_, Some(width)) => Ok(width),
        (Value::Str(s), None) => nls.cstr_len(s, offset),
        (_, None) => Err(Error::ValueMismatch { offset, tag: arg.kind.tag() }),
    }
}

pub fn instruction_len(inst: &Instruction, nls: Nls) -> Result<u32> {
    let mut len = 1;
    for arg in &inst.args {
        len += arg_len(arg, nls, inst.original_offset)?;
    }
    Ok(len)
}

/// Lays the instructions out again for `nls` and records where each one moves.
pub fn relocate(insts: &[Instruction], nls: Nls) -> Result<OffsetMap> {
    let mut map = BTreeMap::new();
    let mut cursor: u32 = 0;
    for inst in insts {
        if map.insert(inst.original_offset, cursor).is_some() {
            return Err(Error::DuplicateOffset { offset: inst.original_offset });
        }
        cursor += instruction_len(inst, nls)?;
    }

    let moved = map.iter().filter(|(old, new)| old != new).count();
    log::debug!("relocated {} instructions ({} moved), {} bytes", map.len(), moved, cursor);
    Ok(OffsetMap { map, total_len: cursor })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{ArgKind, Slot};
    use crate::opcode::ScalarKind;
    use pretty_assertions::assert_eq;

    fn inst(offset: u32, opcode: u8, args: Vec<(ArgKind, Value)>) -> Instruction {
        let mut inst = Instruction::new(offset, opcode);
        for (i, (kind, value)) in args.into_iter().enumerate() {
            inst.args.push(Arg::new(kind, value, Slot::new(0, i as u16)));
        }
        inst
    }

    #[test]
    fn counts_every_field_once() {
        let insts = vec![
            inst(0, 0x01, vec![
                (ArgKind::Scalar(ScalarKind::BYTE), Value::Int(1)),
                (ArgKind::Scalar(ScalarKind::WORD), Value::Int(1)),
                (ArgKind::Scalar(ScalarKind::DWORD), Value::Int(1)),
                (ArgKind::Scalar(ScalarKind::Float32), Value::Float(1.0)),
                (ArgKind::Scalar(ScalarKind::OffsetRef), Value::Int(0)),
            ]),
            inst(16, 0x02, vec![
                (ArgKind::RepeatCount, Value::Int(0)),
                (ArgKind::ListCount, Value::Int(0)),
            ]),
            inst(19, 0x03, vec![]),
        ];
        let map = relocate(&insts, Nls::Utf16Le).unwrap();
        assert_eq!(map.iter().collect::<Vec<_>>(), vec![(0, 0), (16, 16), (19, 19)]);
        assert_eq!(map.total_len(), 20);
    }

    #[test]
    fn strings_shift_later_instructions() {
        let text = |s: &str| (ArgKind::Scalar(ScalarKind::TEXT), Value::Str(s.into()));
        // "AB" was 6 bytes in UTF-16LE; "ABCD" is 10
        let insts = vec![inst(0, 0x15, vec![text("ABCD")]), inst(7, 0xff, vec![])];
        let map = relocate(&insts, Nls::Utf16Le).unwrap();
        assert_eq!(map.get(7), Some(11));
        assert_eq!(map.total_len(), 12);

        let map = relocate(&insts, Nls::Gbk).unwrap();
        assert_eq!(map.get(7), Some(6));
    }

    #[test]
    fn duplicate_offsets_are_rejected() {
        let insts = vec![inst(0, 0xff, vec![]), inst(0, 0xff, vec![])];
        assert!(matches!(relocate(&insts, Nls::Utf16Le), Err(Error::DuplicateOffset { offset: 0 })));
    }

    #[test]
    fn missing_target_is_dangling() {
        let map = relocate(&[inst(0, 0xff, vec![])], Nls::Utf16Le).unwrap();
        assert!(matches!(map.resolve(5), Err(Error::DanglingReference { original_offset: 5 })));
    }
}
