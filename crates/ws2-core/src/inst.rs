use crate::opcode::{IntWidth, ScalarKind, StrRole};

/// What an argument was read as, and therefore how it is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Scalar(ScalarKind),
    /// Count byte of a repeat group.
    RepeatCount,
    /// Count byte of a list.
    ListCount,
}

impl ArgKind {
    pub fn tag(self) -> &'static str {
        match self {
            ArgKind::Scalar(kind) => match kind {
                ScalarKind::FixedInt(IntWidth::Byte) => "c",
                ScalarKind::FixedInt(IntWidth::Word) => "w",
                ScalarKind::FixedInt(IntWidth::Dword) => "i",
                ScalarKind::Float32 => "f",
                ScalarKind::OffsetRef => "I",
                ScalarKind::WideString(StrRole::Plain) => "t",
                ScalarKind::WideString(StrRole::Text) => "T",
            },
            ArgKind::RepeatCount => "O",
            ArgKind::ListCount => "list",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "O" => Some(ArgKind::RepeatCount),
            "list" => Some(ArgKind::ListCount),
            _ => {
                let mut chars = tag.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => ScalarKind::from_tag(c).map(ArgKind::Scalar),
                    _ => None,
                }
            }
        }
    }

    /// Width on the wire, or `None` for strings whose width depends on the encoding.
    pub fn fixed_width(self) -> Option<u32> {
        match self {
            ArgKind::Scalar(ScalarKind::FixedInt(w)) => Some(w.bytes()),
            ArgKind::Scalar(ScalarKind::Float32) | ArgKind::Scalar(ScalarKind::OffsetRef) => Some(4),
            ArgKind::Scalar(ScalarKind::WideString(_)) => None,
            ArgKind::RepeatCount | ArgKind::ListCount => Some(IntWidth::Byte.bytes()),
        }
    }

    pub fn is_count(self) -> bool {
        matches!(self, ArgKind::RepeatCount | ArgKind::ListCount)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(u32),
    Float(f32),
    Str(String),
}

/// Position of a flattened argument inside its instruction.
///
/// Group 0 holds the fields named directly by the signature. Each repeat-group
/// record and each list gets its own group, numbered in order of appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Slot {
    pub group: u16,
    pub index: u16,
}

impl Slot {
    pub fn new(group: u16, index: u16) -> Self {
        Self { group, index }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub kind: ArgKind,
    pub value: Value,
    pub slot: Slot,
}

impl Arg {
    pub fn new(kind: ArgKind, value: Value, slot: Slot) -> Self {
        Self { kind, value, slot }
    }

    pub fn as_int(&self) -> Option<u32> {
        match self.value {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, ArgKind::Scalar(k) if k.is_text())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub original_offset: u32,
    pub opcode: u8,
    pub args: Vec<Arg>,
}

impl Instruction {
    pub fn new(original_offset: u32, opcode: u8) -> Self {
        Self { original_offset, opcode, args: Vec::new() }
    }

    pub fn text_args_mut(&mut self) -> impl Iterator<Item = &mut Arg> {
        self.args.iter_mut().filter(|a| a.is_text())
    }

    pub fn group(&self, group: u16) -> impl Iterator<Item = &Arg> {
        self.args.iter().filter(move |a| a.slot.group == group)
    }
}
