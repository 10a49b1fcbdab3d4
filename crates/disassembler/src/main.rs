use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser as ClapParser;
use ws2_core::{batch, cipher, listing, OpcodeTable, ProjectConfig, ScriptFilter};

/// Disassemble AdvHD .ws2 scripts into text listings
#[derive(ClapParser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// A .ws2 file, or a directory searched recursively
    #[arg(short, long, required = true)]
    input: PathBuf,

    /// Directory the listings are written to
    #[arg(short, long, required = true)]
    output: PathBuf,

    /// Opcode table (YAML or JSON); overrides `opcode_table` from the config
    #[arg(short, long)]
    table: Option<PathBuf>,

    /// Project config, `ws2.toml` in the working directory by default
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Inputs are still under the archive cipher
    #[arg(short, long)]
    encrypted: bool,
}

struct Disassembler {
    table: OpcodeTable,
    encrypted: bool,
    root: PathBuf,
    output: PathBuf,
}

impl Disassembler {
    fn new(table: OpcodeTable, encrypted: bool, root: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            table,
            encrypted,
            root: root.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
        }
    }

    /// `in/a/s.ws2` under root `in` becomes `<output>/a/s.txt`.
    fn listing_path(&self, input: &Path) -> PathBuf {
        batch::mirrored_path(&self.root, input, &self.output).with_extension("txt")
    }

    fn disassemble_file(&self, input: &Path) -> Result<()> {
        let mut data = std::fs::read(input)?;
        if self.encrypted {
            cipher::decrypt_in_place(&mut data);
        }
        let insts = ws2_core::disassemble(&data, &self.table)?;

        let source = input.file_name().unwrap_or_default().to_string_lossy();
        let text = listing::render_with_header(&source, &insts);
        let path = self.listing_path(input);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
        log::debug!("{} instructions -> {}", insts.len(), path.display());
        Ok(())
    }
}

fn load_table(args: &Args, config: &ProjectConfig) -> Result<OpcodeTable> {
    let Some(path) = args.table.as_ref().or(config.opcode_table.as_ref()) else {
        bail!("no opcode table: pass --table or set `opcode_table` in the config");
    };
    OpcodeTable::load(path).with_context(|| format!("loading opcode table {}", path.display()))
}

fn run(args: Args, config: ProjectConfig) -> Result<()> {
    let table = load_table(&args, &config)?;
    let filter: ScriptFilter = config.script_filter();
    let inputs = batch::collect_inputs(&args.input, &filter)?;
    if inputs.is_empty() {
        bail!("no scripts found under {}", args.input.display());
    }

    std::fs::create_dir_all(&args.output)?;
    let disassembler = Disassembler::new(table, args.encrypted, &args.input, &args.output);
    let summary = batch::run(&inputs, |input| disassembler.disassemble_file(input));
    if !summary.is_success() {
        bail!("{} of {} script(s) failed", summary.failed.len(), summary.processed);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ProjectConfig::discover(args.config.as_deref())?;
    env_logger::Builder::new()
        .filter_level(config.logger.level_filter)
        .parse_default_env()
        .init();

    run(args, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("disassembler-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn listing_is_named_after_the_script() {
        let d = Disassembler::new(OpcodeTable::default(), false, "scripts", "out");
        assert_eq!(d.listing_path(Path::new("scripts/00_start.ws2")), Path::new("out/00_start.txt"));
        assert_eq!(d.listing_path(Path::new("scripts/ex/00_start.ws2")), Path::new("out/ex/00_start.txt"));
    }

    #[test]
    fn test_disassemble_encrypted_file() -> Result<()> {
        let dir = scratch_dir("encrypted");
        let input = dir.join("a.ws2");
        std::fs::write(&input, cipher::encrypt(&[0x15, 0x41, 0x00, 0x00, 0x00, 0x07]))?;

        let table = OpcodeTable::from_pairs([(0x15, "tc")])?;
        Disassembler::new(table, true, &input, &dir).disassemble_file(&input)?;

        let text = std::fs::read_to_string(dir.join("a.txt"))?;
        assert_eq!(text, "// source: a.ws2\n@0|#15|t::A|c::7|\n");
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_same_name_in_two_folders() -> Result<()> {
        let dir = scratch_dir("same-name");
        let input = dir.join("in");
        for (sub, text) in [("a", b"A"), ("b", b"B")] {
            std::fs::create_dir_all(input.join(sub))?;
            std::fs::write(input.join(sub).join("s.ws2"), [0x15, text[0], 0x00, 0x00, 0x00, 0x02])?;
        }

        let args = Args {
            input: input.clone(),
            output: dir.join("out"),
            table: None,
            config: None,
            encrypted: false,
        };
        let mut config = ProjectConfig::default();
        let table = dir.join("oplist.json");
        std::fs::write(&table, r#"{"15": "tc"}"#)?;
        config.opcode_table = Some(table);
        run(args, config)?;

        let a = std::fs::read_to_string(dir.join("out").join("a").join("s.txt"))?;
        let b = std::fs::read_to_string(dir.join("out").join("b").join("s.txt"))?;
        assert!(a.ends_with("@0|#15|t::A|c::2|\n"));
        assert!(b.ends_with("@0|#15|t::B|c::2|\n"));
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
