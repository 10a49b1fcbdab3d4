//! Opcode table: maps each opcode byte to the layout of its operands.
//!
//! Signatures come from an `oplist`-style mapping (`"14": "itTc"`, ...). Each
//! character names one field:
//!
//! | char | field                                             |
//! |------|---------------------------------------------------|
//! | `c`  | u8                                                |
//! | `w`  | u16                                               |
//! | `i`  | u32                                               |
//! | `f`  | f32                                               |
//! | `I`  | u32 offset of another instruction                 |
//! | `t`  | UTF-16LE string                                   |
//! | `T`  | UTF-16LE string holding translatable text         |
//! | `O`  | u8 count, then that many `wTcwct` records         |
//! | `7x` | u8 count, then that many fields of scalar kind `x`|
//!
//! Signatures are parsed once when the table is built, so the disassembler only
//! ever walks a static list of [`FieldKind`]s.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde_yaml::{Mapping, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntWidth {
    Byte,
    Word,
    Dword,
}

impl IntWidth {
    pub fn bytes(self) -> u32 {
        match self {
            IntWidth::Byte => 1,
            IntWidth::Word => 2,
            IntWidth::Dword => 4,
        }
    }
}

/// Whether a string operand is something a translator is expected to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrRole {
    Plain,
    Text,
}

/// A field that occupies exactly one [`Arg`](crate::inst::Arg).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    FixedInt(IntWidth),
    Float32,
    WideString(StrRole),
    OffsetRef,
}

impl ScalarKind {
    pub const BYTE: ScalarKind = ScalarKind::FixedInt(IntWidth::Byte);
    pub const WORD: ScalarKind = ScalarKind::FixedInt(IntWidth::Word);
    pub const DWORD: ScalarKind = ScalarKind::FixedInt(IntWidth::Dword);
    pub const STR: ScalarKind = ScalarKind::WideString(StrRole::Plain);
    pub const TEXT: ScalarKind = ScalarKind::WideString(StrRole::Text);

    pub fn from_tag(tag: char) -> Option<Self> {
        let kind = match tag {
            'c' => Self::BYTE,
            'w' => Self::WORD,
            'i' => Self::DWORD,
            'f' => ScalarKind::Float32,
            'I' => ScalarKind::OffsetRef,
            't' => Self::STR,
            'T' => Self::TEXT,
            _ => return None,
        };
        Some(kind)
    }

    pub fn tag(self) -> char {
        match self {
            ScalarKind::FixedInt(IntWidth::Byte) => 'c',
            ScalarKind::FixedInt(IntWidth::Word) => 'w',
            ScalarKind::FixedInt(IntWidth::Dword) => 'i',
            ScalarKind::Float32 => 'f',
            ScalarKind::OffsetRef => 'I',
            ScalarKind::WideString(StrRole::Plain) => 't',
            ScalarKind::WideString(StrRole::Text) => 'T',
        }
    }

    pub fn is_text(self) -> bool {
        self == Self::TEXT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// Count byte followed by that many [`REPEAT_PATTERN`] records.
    RepeatGroup,
    /// Count byte followed by that many elements of one scalar kind.
    List(ScalarKind),
}

/// Layout of one record inside a repeat group (choice menus).
pub const REPEAT_PATTERN: [ScalarKind; 6] = [
    ScalarKind::WORD,
    ScalarKind::TEXT,
    ScalarKind::BYTE,
    ScalarKind::WORD,
    ScalarKind::BYTE,
    ScalarKind::STR,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    source: String,
    fields: Vec<FieldKind>,
}

impl Signature {
    pub fn parse(source: &str) -> Result<Self> {
        let mut fields = Vec::new();
        let mut chars = source.chars();
        while let Some(c) = chars.next() {
            let field = match c {
                'O' => FieldKind::RepeatGroup,
                '7' => {
                    let elem = chars.next().ok_or_else(|| {
                        Error::InvalidOpcodeTable(format!("list without element kind in {source:?}"))
                    })?;
                    let elem = ScalarKind::from_tag(elem).ok_or_else(|| {
                        Error::InvalidOpcodeTable(format!(
                            "list element {elem:?} is not a scalar kind in {source:?}"
                        ))
                    })?;
                    FieldKind::List(elem)
                }
                other => FieldKind::Scalar(ScalarKind::from_tag(other).ok_or_else(|| {
                    Error::InvalidOpcodeTable(format!("unknown field kind {other:?} in {source:?}"))
                })?),
            };
            fields.push(field);
        }

        Ok(Self { source: source.to_string(), fields })
    }

    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[derive(Debug, Clone, Default)]
pub struct OpcodeTable {
    signatures: BTreeMap<u8, Signature>,
}

impl OpcodeTable {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (u8, &'a str)>) -> Result<Self> {
        let mut signatures = BTreeMap::new();
        for (opcode, sig) in pairs {
            signatures.insert(opcode, Signature::parse(sig)?);
        }
        Ok(Self { signatures })
    }

    /// Parses a YAML or JSON mapping of hex opcode keys to signatures.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let raw: Mapping =
            serde_yaml::from_str(s).map_err(|e| Error::InvalidOpcodeTable(e.to_string()))?;

        let mut signatures = BTreeMap::new();
        for (key, sig) in &raw {
            let opcode = parse_opcode_key(key)?;
            let sig = sig.as_str().ok_or_else(|| {
                Error::InvalidOpcodeTable(format!("signature of opcode {opcode:02x} is not a string"))
            })?;
            if signatures.insert(opcode, Signature::parse(sig)?).is_some() {
                return Err(Error::InvalidOpcodeTable(format!("opcode {opcode:02x} listed twice")));
            }
        }

        log::debug!("loaded {} opcode signatures", signatures.len());
        Ok(Self { signatures })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&s)
    }

    pub fn get(&self, opcode: u8) -> Option<&Signature> {
        self.signatures.get(&opcode)
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

fn parse_opcode_key(key: &Value) -> Result<u8> {
    // unquoted keys such as `14` come back from YAML as numbers
    let text = match key {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(Error::InvalidOpcodeTable(format!("opcode key {other:?} is not a string")))
        }
    };
    if text.is_empty() || text.len() > 2 {
        return Err(Error::InvalidOpcodeTable(format!("opcode key {text:?} is not a hex byte")));
    }
    u8::from_str_radix(&text, 16)
        .map_err(|_| Error::InvalidOpcodeTable(format!("opcode key {text:?} is not a hex byte")))
}
