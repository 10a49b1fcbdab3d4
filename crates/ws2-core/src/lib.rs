//! ws2-core
//!
//! Reading and rewriting AdvHD `.ws2` scripts and the `.arc` archives that
//! carry them.
//!
//! A script is decoded against an [`OpcodeTable`] into a flat list of
//! [`Instruction`]s, rendered to an editable [`listing`], parsed back, and
//! re-encoded. Re-encoding goes through [`relocate`] first so that jump
//! targets still land on the right instruction after text changed length.

pub mod archive;
pub mod batch;
pub mod cipher;
pub mod config;
pub mod cursor;
pub mod disasm;
pub mod encode;
pub mod error;
pub mod inject;
pub mod inst;
pub mod listing;
pub mod nls;
pub mod opcode;
pub mod reloc;

pub use archive::{Archive, ArchiveEntry, ArchiveFile, ScriptFilter};
pub use config::ProjectConfig;
pub use disasm::disassemble;
pub use encode::encode;
pub use error::{Error, Result};
pub use inject::{inject, InjectionReport, Replacement, ReplacementQueue, TextRules, VecReplacementQueue};
pub use inst::{Arg, ArgKind, Instruction, Slot, Value};
pub use nls::Nls;
pub use opcode::{FieldKind, OpcodeTable, ScalarKind, Signature};
pub use reloc::{relocate, OffsetMap};

/// Relocates and encodes in one go.
pub fn reassemble(insts: &[Instruction], nls: Nls) -> Result<Vec<u8>> {
    let map = relocate(insts, nls)?;
    encode(insts, &map, nls)
}
