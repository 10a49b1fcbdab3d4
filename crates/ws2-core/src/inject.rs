//! Writes translated text back into the text arguments of a parsed script.
//!
//! Translations arrive as an ordered queue, one record per text slot in the
//! order the extraction step met them. Dialogue lines keep their trailing
//! `%K` / `%P` wait codes; choice labels are padded the way the engine lays
//! them out.

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inst::{Instruction, Value};

/// Characters of the wait/page control codes that end a dialogue line.
const CONTROL_CODE_CHARS: &[char] = &['%', 'K', 'P'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Replacement {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), name: None }
    }
}

pub trait ReplacementQueue {
    fn pop_next(&mut self) -> Option<Replacement>;
    fn remaining(&self) -> usize;
}

#[derive(Debug, Clone, Default)]
pub struct VecReplacementQueue {
    records: VecDeque<Replacement>,
}

impl VecReplacementQueue {
    pub fn new(records: impl IntoIterator<Item = Replacement>) -> Self {
        Self { records: records.into_iter().collect() }
    }

    /// Accepts a YAML or JSON list of `{message, name?}` records.
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let records: Vec<Replacement> =
            serde_yaml::from_str(s).map_err(|e| Error::Config(format!("bad translation file: {e}")))?;
        Ok(Self::new(records))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&s)
    }
}

impl ReplacementQueue for VecReplacementQueue {
    fn pop_next(&mut self) -> Option<Replacement> {
        self.records.pop_front()
    }

    fn remaining(&self) -> usize {
        self.records.len()
    }
}

/// Which opcodes carry translatable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRules {
    pub dialogue_opcode: u8,
    pub choice_opcode: u8,
}

impl Default for TextRules {
    fn default() -> Self {
        Self { dialogue_opcode: 0x14, choice_opcode: 0x0f }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    pub replaced: usize,
    /// Slots left untranslated because the queue ran dry.
    pub starved: usize,
    /// Records still queued after the last instruction.
    pub leftover: usize,
}

impl InjectionReport {
    pub fn warnings(&self) -> usize {
        self.starved + usize::from(self.leftover > 0)
    }
}

fn trailing_control_codes(s: &str) -> &str {
    &s[s.trim_end_matches(CONTROL_CODE_CHARS).len()..]
}

/// Whether a dialogue string has anything besides line breaks and wait codes.
fn has_visible_text(s: &str) -> bool {
    !s.replace("\\n", "").trim_end_matches(CONTROL_CODE_CHARS).is_empty()
}

fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

fn dialogue_line(original: &str, translated: &str) -> String {
    let mut line = escape_newlines(translated).trim_end_matches(CONTROL_CODE_CHARS).to_string();
    line.push_str(trailing_control_codes(original));
    line
}

fn choice_label(translated: &str) -> String {
    format!("  {}  ", escape_newlines(translated).trim())
}

/// Applies `queue` to the text slots of `insts` in order.
///
/// Running out of records, or having some left, is logged and counted but not
/// an error: the untouched slots keep their original text.
pub fn inject(
    insts: &mut [Instruction],
    queue: &mut dyn ReplacementQueue,
    rules: TextRules,
) -> InjectionReport {
    let mut report = InjectionReport::default();

    for inst in insts.iter_mut() {
        let offset = inst.original_offset;
        if inst.opcode == rules.dialogue_opcode {
            let Some(arg) = inst.text_args_mut().next() else {
                continue;
            };
            let Value::Str(original) = &mut arg.value else {
                continue;
            };
            if !has_visible_text(original) {
                continue;
            }
            match queue.pop_next() {
                Some(r) => {
                    *original = dialogue_line(original, &r.message);
                    report.replaced += 1;
                }
                None => {
                    log::warn!("ran out of translations at dialogue instruction @{offset}");
                    report.starved += 1;
                }
            }
        } else if inst.opcode == rules.choice_opcode {
            for arg in inst.text_args_mut() {
                let Value::Str(label) = &mut arg.value else {
                    continue;
                };
                match queue.pop_next() {
                    Some(r) => {
                        *label = choice_label(&r.message);
                        report.replaced += 1;
                    }
                    None => {
                        log::warn!("ran out of translations at choice instruction @{offset}");
                        report.starved += 1;
                    }
                }
            }
        }
    }

    report.leftover = queue.remaining();
    if report.leftover > 0 {
        log::warn!(
            "{} translation(s) left unused; extraction and injection disagree on the text slots",
            report.leftover
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::{Arg, ArgKind, Slot};
    use crate::opcode::ScalarKind;
    use pretty_assertions::assert_eq;

    fn inst(offset: u32, opcode: u8, texts: &[&str]) -> Instruction {
        let mut inst = Instruction::new(offset, opcode);
        inst.args.push(Arg::new(ArgKind::Scalar(ScalarKind::DWORD), Value::Int(1), Slot::new(0, 0)));
        for (i, t) in texts.iter().enumerate() {
            inst.args.push(Arg::new(
                ArgKind::Scalar(ScalarKind::TEXT),
                Value::Str(t.to_string()),
                Slot::new(0, i as u16 + 1),
            ));
        }
        inst
    }

    fn texts(inst: &Instruction) -> Vec<&str> {
        inst.args.iter().filter_map(|a| a.as_str()).collect()
    }

    #[test]
    fn dialogue_keeps_original_control_codes() {
        let mut insts = vec![inst(0, 0x14, &["こんにちは%K%P"])];
        let mut queue = VecReplacementQueue::new([Replacement::new("Hello\nthere%K")]);
        let report = inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[0]), vec!["Hello\\nthere%K%P"]);
        assert_eq!(report, InjectionReport { replaced: 1, starved: 0, leftover: 0 });
    }

    #[test]
    fn empty_dialogue_consumes_nothing() {
        let mut insts = vec![inst(0, 0x14, &["\\n%K%P"]), inst(9, 0x14, &["text"])];
        let mut queue = VecReplacementQueue::new([Replacement::new("done")]);
        inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[0]), vec!["\\n%K%P"]);
        assert_eq!(texts(&insts[1]), vec!["done"]);
    }

    #[test]
    fn only_first_dialogue_text_is_replaced() {
        let mut insts = vec![inst(0, 0x14, &["a", "b"])];
        let mut queue = VecReplacementQueue::new([Replacement::new("x"), Replacement::new("y")]);
        let report = inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[0]), vec!["x", "b"]);
        assert_eq!(report.leftover, 1);
        assert_eq!(report.warnings(), 1);
    }

    #[test]
    fn choices_are_padded() {
        let mut insts = vec![inst(0, 0x0f, &["はい", "いいえ"])];
        let mut queue = VecReplacementQueue::new([Replacement::new(" Yes"), Replacement::new("No ")]);
        inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[0]), vec!["  Yes  ", "  No  "]);
    }

    #[test]
    fn drained_queue_keeps_original_text() {
        let mut insts = vec![inst(0, 0x14, &["one"]), inst(5, 0x0f, &["two", "three"])];
        let mut queue = VecReplacementQueue::new([Replacement::new("uno")]);
        let report = inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[1]), vec!["two", "three"]);
        assert_eq!(report, InjectionReport { replaced: 1, starved: 2, leftover: 0 });
    }

    #[test]
    fn other_opcodes_are_ignored() {
        let mut insts = vec![inst(0, 0x15, &["name"])];
        let mut queue = VecReplacementQueue::new([Replacement::new("x")]);
        let report = inject(&mut insts, &mut queue, TextRules::default());
        assert_eq!(texts(&insts[0]), vec!["name"]);
        assert_eq!(report.replaced, 0);
    }

    #[test]
    fn loads_json_records() {
        let mut queue = VecReplacementQueue::from_yaml_str(
            r#"[{"message": "hi", "name": "Ann"}, {"message": "bye"}]"#,
        )
        .unwrap();
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.pop_next().unwrap().name.as_deref(), Some("Ann"));
        assert_eq!(queue.pop_next().unwrap(), Replacement::new("bye"));
        assert!(queue.pop_next().is_none());
    }
}
