//! Line-oriented text form of a disassembled script.
//!
//! ```text
//! // source: 00_start.ws2
//! @0|#15|t::AB|c::7|
//! @8|#0F|O::1|w::0|T::Yes|c::1|w::9|c::0|t::lbl|
//! ```
//!
//! Every instruction is one line: its original offset, its opcode in hex, then
//! `tag::value` for every flattened argument. Count bytes are written with the
//! `O` / `list` tags so the parser can tell record boundaries apart.

use std::fmt::Write as _;

use crate::error::{Error, Result};
use crate::inst::{Arg, ArgKind, Instruction, Slot, Value};
use crate::opcode::{IntWidth, ScalarKind, REPEAT_PATTERN};

const COMMENT: &str = "//";

fn escape_into(out: &mut String, s: &str) {
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        let escape = match c {
            '|' | '\r' | '\n' => true,
            '\\' => rest.starts_with("\\u{"),
            _ => false,
        };
        if escape {
            let _ = write!(out, "\\u{{{:X}}}", c as u32);
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
}

fn unescape(s: &str, line: usize) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = rest.find("\\u{") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 3..];
        let end = after
            .find('}')
            .ok_or_else(|| Error::malformed(line, "unterminated \\u{} escape"))?;
        let c = u32::from_str_radix(&after[..end], 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| Error::malformed(line, format!("bad escape \\u{{{}}}", &after[..end])))?;
        out.push(c);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn render_float(v: f32) -> String {
    if v.is_finite() {
        v.to_string()
    } else {
        format!("0x{:08X}", v.to_bits())
    }
}

fn render_arg(out: &mut String, arg: &Arg) {
    out.push_str(arg.kind.tag());
    out.push_str("::");
    match &arg.value {
        Value::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float(v) => out.push_str(&render_float(*v)),
        Value::Str(s) => escape_into(out, s),
    }
    out.push('|');
}

pub fn render_instruction(inst: &Instruction) -> String {
    let mut line = format!("@{}|#{:02X}|", inst.original_offset, inst.opcode);
    for arg in &inst.args {
        render_arg(&mut line, arg);
    }
    line
}

/// Renders one line per instruction, each terminated by `\n`.
pub fn render(insts: &[Instruction]) -> String {
    let mut out = String::new();
    for inst in insts {
        out.push_str(&render_instruction(inst));
        out.push('\n');
    }
    out
}

/// Like [`render`], preceded by a comment line naming the source file.
pub fn render_with_header(source: &str, insts: &[Instruction]) -> String {
    let mut out = format!("{COMMENT} source: {source}\n");
    out.push_str(&render(insts));
    out
}

fn parse_int(value: &str, max: u32, line: usize) -> Result<u32> {
    let v: u32 = value
        .parse()
        .map_err(|_| Error::malformed(line, format!("{value:?} is not an unsigned integer")))?;
    if v > max {
        return Err(Error::malformed(line, format!("{v} does not fit in {max}")));
    }
    Ok(v)
}

fn parse_float(value: &str, line: usize) -> Result<f32> {
    if let Some(hex) = value.strip_prefix("0x") {
        return u32::from_str_radix(hex, 16)
            .map(f32::from_bits)
            .map_err(|_| Error::malformed(line, format!("{value:?} is not a float bit pattern")));
    }
    value
        .parse()
        .map_err(|_| Error::malformed(line, format!("{value:?} is not a float")))
}

fn parse_value(kind: ArgKind, value: &str, line: usize) -> Result<Value> {
    let value = match kind {
        ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Byte))
        | ArgKind::RepeatCount
        | ArgKind::ListCount => Value::Int(parse_int(value, u8::MAX.into(), line)?),
        ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Word)) => {
            Value::Int(parse_int(value, u16::MAX.into(), line)?)
        }
        ArgKind::Scalar(ScalarKind::FixedInt(IntWidth::Dword))
        | ArgKind::Scalar(ScalarKind::OffsetRef) => Value::Int(parse_int(value, u32::MAX, line)?),
        ArgKind::Scalar(ScalarKind::Float32) => Value::Float(parse_float(value, line)?),
        ArgKind::Scalar(ScalarKind::WideString(_)) => Value::Str(unescape(value, line)?),
    };
    Ok(value)
}

/// What the next args of a line belong to.
#[derive(Clone, Copy)]
enum Pending {
    Own,
    Repeat { group: u16, index: u16, left: u32 },
    List { group: u16, index: u16, left: u32, elem: Option<ArgKind> },
}

/// Rebuilds slots from the count tags while a line is read.
struct SlotTracker {
    line: usize,
    own_index: u16,
    next_group: u16,
    pending: Pending,
}

impl SlotTracker {
    fn new(line: usize) -> Self {
        Self { line, own_index: 0, next_group: 1, pending: Pending::Own }
    }

    fn fresh_group(&mut self) -> u16 {
        let group = self.next_group;
        self.next_group += 1;
        group
    }

    fn own(&mut self) -> Slot {
        let slot = Slot::new(0, self.own_index);
        self.own_index += 1;
        slot
    }

    fn assign(&mut self, kind: ArgKind, value: &Value) -> Result<Slot> {
        match self.pending {
            Pending::Own => {
                let slot = self.own();
                let count = count_of(value);
                match kind {
                    ArgKind::RepeatCount if count > 0 => {
                        let group = self.fresh_group();
                        self.pending = Pending::Repeat { group, index: 0, left: count * 6 };
                    }
                    ArgKind::ListCount => {
                        let group = self.fresh_group();
                        if count > 0 {
                            self.pending = Pending::List { group, index: 0, left: count, elem: None };
                        }
                    }
                    _ => {}
                }
                Ok(slot)
            }
            Pending::Repeat { group, index, left } => {
                let expected = ArgKind::Scalar(REPEAT_PATTERN[index as usize]);
                if kind != expected {
                    return Err(Error::malformed(
                        self.line,
                        format!("repeat record wants {} but found {}", expected.tag(), kind.tag()),
                    ));
                }
                self.pending = if left == 1 {
                    Pending::Own
                } else if index as usize + 1 == REPEAT_PATTERN.len() {
                    Pending::Repeat { group: self.fresh_group(), index: 0, left: left - 1 }
                } else {
                    Pending::Repeat { group, index: index + 1, left: left - 1 }
                };
                Ok(Slot::new(group, index))
            }
            Pending::List { group, index, left, elem } => {
                if kind.is_count() || elem.is_some_and(|k| k != kind) {
                    return Err(Error::malformed(
                        self.line,
                        format!("unexpected {} inside list", kind.tag()),
                    ));
                }
                self.pending = if left == 1 {
                    Pending::Own
                } else {
                    Pending::List { group, index: index + 1, left: left - 1, elem: Some(kind) }
                };
                Ok(Slot::new(group, index))
            }
        }
    }

    fn finish(&self) -> Result<()> {
        match self.pending {
            Pending::Own => Ok(()),
            Pending::Repeat { left, .. } | Pending::List { left, .. } => Err(Error::malformed(
                self.line,
                format!("line ends {left} argument(s) short of its count"),
            )),
        }
    }
}

fn count_of(value: &Value) -> u32 {
    match value {
        Value::Int(v) => *v,
        _ => 0,
    }
}

/// Parses one data line. `line` is the 1-based line number used in errors.
pub fn parse_line(text: &str, line: usize) -> Result<Instruction> {
    let mut fields = text.split('|');

    let offset = fields
        .next()
        .and_then(|f| f.strip_prefix('@'))
        .ok_or_else(|| Error::malformed(line, "missing @offset"))?;
    let offset: u32 = offset
        .parse()
        .map_err(|_| Error::malformed(line, format!("bad offset {offset:?}")))?;

    let opcode = fields
        .next()
        .and_then(|f| f.strip_prefix('#'))
        .ok_or_else(|| Error::malformed(line, "missing #opcode"))?;
    if opcode.is_empty() || opcode.len() > 2 {
        return Err(Error::malformed(line, format!("bad opcode {opcode:?}")));
    }
    let opcode = u8::from_str_radix(opcode, 16)
        .map_err(|_| Error::malformed(line, format!("bad opcode {opcode:?}")))?;

    let mut inst = Instruction::new(offset, opcode);
    let mut slots = SlotTracker::new(line);
    let fields: Vec<&str> = fields.collect();
    let last = fields.len().saturating_sub(1);

    for (i, field) in fields.iter().enumerate() {
        if field.is_empty() && i == last {
            break;
        }
        let (tag, value) = field
            .split_once("::")
            .ok_or_else(|| Error::malformed(line, format!("field {field:?} is not tag::value")))?;
        let kind = ArgKind::from_tag(tag)
            .ok_or_else(|| Error::malformed(line, format!("unknown tag {tag:?}")))?;
        let value = parse_value(kind, value, line)?;
        let slot = slots.assign(kind, &value)?;
        inst.args.push(Arg::new(kind, value, slot));
    }
    slots.finish()?;

    Ok(inst)
}

/// Parses a whole listing, skipping blank lines and `//` comments.
pub fn parse(text: &str) -> Result<Vec<Instruction>> {
    let mut insts = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with(COMMENT) {
            continue;
        }
        // nothing after the last `|` belongs to a value
        let line = match line.rfind('|') {
            Some(end) if line[end + 1..].trim().is_empty() => &line[..=end],
            _ => line,
        };
        insts.push(parse_line(line, i + 1)?);
    }
    Ok(insts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn arg(kind: ArgKind, value: Value, group: u16, index: u16) -> Arg {
        Arg::new(kind, value, Slot::new(group, index))
    }

    #[test]
    fn renders_one_line() {
        let mut inst = Instruction::new(12, 0x0f);
        inst.args.push(arg(ArgKind::Scalar(ScalarKind::STR), Value::Str("a|b".into()), 0, 0));
        inst.args.push(arg(ArgKind::Scalar(ScalarKind::Float32), Value::Float(0.5), 0, 1));
        inst.args.push(arg(ArgKind::Scalar(ScalarKind::BYTE), Value::Int(7), 0, 2));
        assert_eq!(render_instruction(&inst), "@12|#0F|t::a\\u{7C}b|f::0.5|c::7|");
    }

    #[test]
    fn instruction_without_args() {
        let inst = Instruction::new(3, 0xff);
        assert_eq!(render_instruction(&inst), "@3|#FF|");
        assert_eq!(parse_line("@3|#FF|", 1).unwrap(), inst);
    }

    #[test]
    fn escapes_survive_a_round_trip() {
        let tricky = "line1\nline2\r|pipe|\\u{41} and \\n stay";
        let mut inst = Instruction::new(0, 0x14);
        inst.args.push(arg(ArgKind::Scalar(ScalarKind::TEXT), Value::Str(tricky.into()), 0, 0));
        let text = render(&[inst.clone()]);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\\n stay"));
        assert_eq!(parse(&text).unwrap(), vec![inst]);
    }

    #[test]
    fn non_finite_floats_use_bit_patterns() {
        let mut inst = Instruction::new(0, 0x01);
        inst.args.push(arg(ArgKind::Scalar(ScalarKind::Float32), Value::Float(f32::INFINITY), 0, 0));
        let line = render_instruction(&inst);
        assert_eq!(line, "@0|#01|f::0x7F800000|");
        assert_eq!(parse_line(&line, 1).unwrap(), inst);
    }

    #[test]
    fn rebuilds_repeat_group_slots() {
        let line = "@0|#0F|O::2|w::0|T::Yes|c::1|w::9|c::0|t::a|w::1|T::No|c::1|w::9|c::0|t::b|";
        let inst = parse_line(line, 1).unwrap();
        assert_eq!(inst.args[0].slot, Slot::new(0, 0));
        assert_eq!(inst.args[2].slot, Slot::new(1, 1));
        assert_eq!(inst.args[8].slot, Slot::new(2, 1));
        assert_eq!(inst.args[8].as_str(), Some("No"));
        assert_eq!(render_instruction(&inst), line);
    }

    #[test]
    fn rebuilds_list_slots() {
        let inst = parse_line("@0|#20|c::1|list::2|w::5|w::6|i::9|", 1).unwrap();
        let slots: Vec<_> = inst.args.iter().map(|a| (a.slot.group, a.slot.index)).collect();
        assert_eq!(slots, vec![(0, 0), (0, 1), (1, 0), (1, 1), (0, 2)]);
    }

    #[test]
    fn legacy_count_stays_flat() {
        let inst = parse_line("@0|#0F|c::1|w::0|T::Yes|c::1|w::9|c::0|t::a|", 1).unwrap();
        assert!(inst.args.iter().all(|a| a.slot.group == 0));
        assert_eq!(inst.args.len(), 7);
    }

    #[test]
    fn skips_comments_and_blank_lines() {
        let text = "// source: a.ws2\n\n@0|#15|t::AB|c::7|\n   \n@8|#FF|\n";
        let insts = parse(text).unwrap();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[1].original_offset, 8);
    }

    #[test]
    fn trailing_whitespace_after_the_last_field_is_ignored() {
        let insts = parse("@0|#15|t::A B |c::7|  \r\n@8|#FF|\t\n").unwrap();
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].args[0].as_str(), Some("A B "));
        assert_eq!(insts[0].args.len(), 2);
        assert!(insts[1].args.is_empty());
    }

    #[test]
    fn malformed_lines_report_their_number() {
        let cases = [
            "@0|#15|t::ok|\nnot a record\n",
            "@0|#15|t::ok|\n@x|#15|\n",
            "@0|#15|t::ok|\n@4|#1FF|\n",
            "@0|#15|t::ok|\n@4|#15|c::256|\n",
            "@0|#15|t::ok|\n@4|#15|q::1|\n",
            "@0|#15|t::ok|\n@4|#15|t::\\u{zz}|\n",
            "@0|#15|t::ok|\n@4|#0F|O::1|w::0|T::x|\n",
            "@0|#15|t::ok|\n@4|#0F|O::1|w::0|c::1|\n",
        ];
        for case in cases {
            match parse(case) {
                Err(Error::MalformedRecord { line, .. }) => assert_eq!(line, 2, "{case}"),
                other => panic!("{case}: unexpected {other:?}"),
            }
        }
    }
}
