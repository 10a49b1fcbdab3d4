//! Target text encodings for re-encoded strings.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use encoding_rs::{Encoding as RsEncoding, GBK, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Nls {
    /// What the engine itself stores.
    #[default]
    Utf16Le,
    ShiftJis,
    Gbk,
    Utf8,
}

impl FromStr for Nls {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf16le" | "utf-16-le" | "utf-16le" | "utf16" => Ok(Nls::Utf16Le),
            "sjis" | "shiftjis" | "shift_jis" | "shift-jis" | "932" | "cp932" => Ok(Nls::ShiftJis),
            "gbk" | "936" | "cp936" => Ok(Nls::Gbk),
            "utf8" | "utf-8" => Ok(Nls::Utf8),
            other => Err(Error::Config(format!("unknown NLS: {other}"))),
        }
    }
}

impl TryFrom<String> for Nls {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Nls> for String {
    fn from(nls: Nls) -> Self {
        nls.name().to_string()
    }
}

impl fmt::Display for Nls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Nls {
    pub fn name(self) -> &'static str {
        match self {
            Nls::Utf16Le => "utf16le",
            Nls::ShiftJis => "sjis",
            Nls::Gbk => "gbk",
            Nls::Utf8 => "utf8",
        }
    }

    fn as_encoding_rs(self) -> Option<&'static RsEncoding> {
        match self {
            // encoding_rs only decodes UTF-16
            Nls::Utf16Le => None,
            Nls::ShiftJis => Some(SHIFT_JIS),
            Nls::Gbk => Some(GBK),
            Nls::Utf8 => Some(UTF_8),
        }
    }

    pub fn terminator_width(self) -> u32 {
        match self {
            Nls::Utf16Le => 2,
            Nls::ShiftJis | Nls::Gbk | Nls::Utf8 => 1,
        }
    }

    /// Look-alike replacements for characters the target code page lacks.
    ///
    /// Must run before both measuring and writing a string.
    pub fn substitute<'a>(self, s: &'a str) -> Cow<'a, str> {
        match self {
            Nls::Gbk => Cow::Owned(substitute_for_gbk(s)),
            Nls::Utf16Le | Nls::ShiftJis | Nls::Utf8 => Cow::Borrowed(s),
        }
    }

    /// Encodes `s` without terminator. `offset` is only used for error reports.
    pub fn encode(self, s: &str, offset: u32) -> Result<Vec<u8>> {
        let s = self.substitute(s);
        let Some(enc) = self.as_encoding_rs() else {
            return Ok(s.encode_utf16().flat_map(u16::to_le_bytes).collect());
        };

        let (bytes, _, had_errors) = enc.encode(&s);
        if had_errors {
            let ch = first_unmappable(enc, &s).unwrap_or(char::REPLACEMENT_CHARACTER);
            return Err(Error::UnsupportedCharacter { offset, ch, encoding: self.name() });
        }
        Ok(bytes.into_owned())
    }

    /// Encodes `s` followed by the terminator.
    pub fn encode_cstr(self, s: &str, offset: u32) -> Result<Vec<u8>> {
        let mut bytes = self.encode(s, offset)?;
        bytes.resize(bytes.len() + self.terminator_width() as usize, 0);
        Ok(bytes)
    }

    /// On-wire size of `s` including the terminator.
    pub fn cstr_len(self, s: &str, offset: u32) -> Result<u32> {
        let len = match self {
            Nls::Utf16Le => self.substitute(s).encode_utf16().count() as u32 * 2,
            _ => self.encode(s, offset)?.len() as u32,
        };
        Ok(len + self.terminator_width())
    }
}

fn first_unmappable(enc: &'static RsEncoding, s: &str) -> Option<char> {
    let mut buf = [0u8; 4];
    s.chars().find(|c| enc.encode(c.encode_utf8(&mut buf)).2)
}

fn substitute_for_gbk(text: &str) -> String {
    let mut text = text
        .replace('〜', "～")
        .replace('♪', "")
        .replace('♡', "")
        .replace('・', "·")
        .replace("･･･", "…")
        .replace('⋯', "…");
    // two passes, so runs of up to four brackets collapse to one
    for _ in 0..2 {
        text = text.replace("「「", "「").replace("」」", "」");
    }
    text
}
