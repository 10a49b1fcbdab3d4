use std::path::{Path, PathBuf};

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::archive::ScriptFilter;
use crate::error::{Error, Result};
use crate::inject::TextRules;
use crate::nls::Nls;

pub const DEFAULT_CONFIG_FILE: &str = "ws2.toml";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig {
    pub level_filter: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self { level_filter: LevelFilter::Info }
    }
}

/// Opcodes whose text the injector rewrites, as hex strings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct TextConfig {
    pub dialogue_opcode: String,
    pub choice_opcode: String,
}

impl Default for TextConfig {
    fn default() -> Self {
        let rules = TextRules::default();
        Self {
            dialogue_opcode: format!("{:02x}", rules.dialogue_opcode),
            choice_opcode: format!("{:02x}", rules.choice_opcode),
        }
    }
}

fn parse_opcode(field: &str, value: &str) -> Result<u8> {
    u8::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|_| Error::Config(format!("{field} = {value:?} is not a hex byte")))
}

impl TextConfig {
    pub fn rules(&self) -> Result<TextRules> {
        Ok(TextRules {
            dialogue_opcode: parse_opcode("dialogue_opcode", &self.dialogue_opcode)?,
            choice_opcode: parse_opcode("choice_opcode", &self.choice_opcode)?,
        })
    }
}

/// Project file shared by the command line tools.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    pub opcode_table: Option<PathBuf>,
    pub encoding: Nls,
    pub script_extension: String,
    pub text: TextConfig,
    pub logger: LoggerConfig,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            opcode_table: None,
            encoding: Nls::default(),
            script_extension: "ws2".to_string(),
            text: TextConfig::default(),
            logger: LoggerConfig::default(),
        }
    }
}

impl ProjectConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: ProjectConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.text.rules()?;
        Ok(config)
    }

    /// Relative paths inside the file are resolved against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&s)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        if let (Some(table), Some(dir)) = (&config.opcode_table, path.parent()) {
            if table.is_relative() {
                config.opcode_table = Some(dir.join(table));
            }
        }
        Ok(config)
    }

    /// Loads `path` when given, else `ws2.toml` in the working directory if it
    /// exists, else the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    pub fn script_filter(&self) -> ScriptFilter {
        ScriptFilter::new(&self.script_extension)
    }
}
