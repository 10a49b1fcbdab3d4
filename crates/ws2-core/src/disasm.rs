use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::inst::{Arg, ArgKind, Instruction, Slot, Value};
use crate::opcode::{FieldKind, OpcodeTable, ScalarKind, REPEAT_PATTERN};

/// Hands out slots while the args of one instruction are flattened.
struct SlotAlloc {
    next_group: u16,
    own_index: u16,
}

impl SlotAlloc {
    fn new() -> Self {
        Self { next_group: 1, own_index: 0 }
    }

    fn own(&mut self) -> Slot {
        let slot = Slot::new(0, self.own_index);
        self.own_index += 1;
        slot
    }

    fn fresh_group(&mut self) -> u16 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }
}

fn read_scalar(cursor: &mut Cursor, kind: ScalarKind) -> Result<Value> {
    let value = match kind {
        ScalarKind::FixedInt(width) => Value::Int(cursor.read_fixed_int(width)?),
        ScalarKind::Float32 => Value::Float(cursor.read_f32()?),
        ScalarKind::OffsetRef => Value::Int(cursor.read_u32()?),
        ScalarKind::WideString(_) => Value::Str(cursor.read_wide_cstr()?),
    };
    Ok(value)
}

fn decode_one(cursor: &mut Cursor, table: &OpcodeTable) -> Result<Instruction> {
    let offset = cursor.position() as u32;
    let opcode = cursor.read_u8()?;
    let sig = table.get(opcode).ok_or(Error::UnknownOpcode { offset, opcode })?;

    let mut inst = Instruction::new(offset, opcode);
    let mut slots = SlotAlloc::new();

    for field in sig.fields() {
        match *field {
            FieldKind::Scalar(kind) => {
                let value = read_scalar(cursor, kind)?;
                inst.args.push(Arg::new(ArgKind::Scalar(kind), value, slots.own()));
            }
            FieldKind::RepeatGroup => {
                let count = cursor.read_u8()?;
                inst.args.push(Arg::new(ArgKind::RepeatCount, Value::Int(count.into()), slots.own()));
                for _ in 0..count {
                    let group = slots.fresh_group();
                    for (index, kind) in REPEAT_PATTERN.iter().enumerate() {
                        let value = read_scalar(cursor, *kind)?;
                        inst.args.push(Arg::new(
                            ArgKind::Scalar(*kind),
                            value,
                            Slot::new(group, index as u16),
                        ));
                    }
                }
            }
            FieldKind::List(kind) => {
                let count_slot = slots.own();
                let group = slots.fresh_group();
                let elems = cursor.read_count_prefixed_list(|c| read_scalar(c, kind))?;
                inst.args.push(Arg::new(ArgKind::ListCount, Value::Int(elems.len() as u32), count_slot));
                for (index, value) in elems.into_iter().enumerate() {
                    inst.args.push(Arg::new(ArgKind::Scalar(kind), value, Slot::new(group, index as u16)));
                }
            }
        }
    }

    Ok(inst)
}

/// Decodes a whole (already decrypted) script into its instructions.
///
/// Instructions come back in stream order and tile `data` exactly.
pub fn disassemble(data: &[u8], table: &OpcodeTable) -> Result<Vec<Instruction>> {
    let mut cursor = Cursor::new(data);
    let mut insts = Vec::new();
    while !cursor.at_end() {
        insts.push(decode_one(&mut cursor, table)?);
    }
    log::debug!("disassembled {} instructions from {} bytes", insts.len(), data.len());
    Ok(insts)
}
