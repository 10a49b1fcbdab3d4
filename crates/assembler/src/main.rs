use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use ws2_core::{
    batch, cipher, inject, listing, Nls, ProjectConfig, ScriptFilter, TextRules, VecReplacementQueue,
};

/// Rebuild AdvHD .ws2 scripts from disassembly listings
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// A listing, or a directory of `.txt` listings
    #[clap(short, long)]
    input: PathBuf,

    /// Directory the rebuilt scripts are written to
    #[clap(short, long)]
    output: PathBuf,

    /// Directory holding one `<listing>.json` translation file per listing
    #[clap(short, long)]
    translations: Option<PathBuf>,

    /// Text encoding of the rebuilt scripts; overrides `encoding` from the config
    #[clap(short, long)]
    encoding: Option<Nls>,

    /// Project config, `ws2.toml` in the working directory by default
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Write plain scripts instead of applying the archive cipher
    #[clap(long)]
    no_encrypt: bool,
}

struct Assembler {
    nls: Nls,
    rules: TextRules,
    translations: Option<PathBuf>,
    encrypt: bool,
    root: PathBuf,
    output: PathBuf,
    script_extension: String,
}

impl Assembler {
    /// `a.txt` looks for `a.txt.json`, then `a.json`.
    fn translation_file(&self, listing: &Path) -> Option<PathBuf> {
        let dir = self.translations.as_ref()?;
        let name = listing.file_name()?.to_string_lossy();
        let stem = listing.file_stem()?.to_string_lossy();
        [format!("{name}.json"), format!("{stem}.json")]
            .into_iter()
            .map(|candidate| dir.join(candidate))
            .find(|path| path.is_file())
    }

    /// `txt/ex/a.txt` under root `txt` becomes `<output>/ex/a.ws2`.
    fn script_path(&self, listing: &Path) -> PathBuf {
        let mirrored = batch::mirrored_path(&self.root, listing, &self.output);
        let stem = mirrored.file_stem().unwrap_or(mirrored.as_os_str()).to_string_lossy();
        let stem = stem.strip_suffix(&format!(".{}", self.script_extension)).unwrap_or(&*stem);
        mirrored.with_file_name(format!("{stem}.{}", self.script_extension))
    }

    fn assemble_file(&self, listing_path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(listing_path)?;
        let mut insts = listing::parse(&text)?;

        match self.translation_file(listing_path) {
            Some(path) => {
                let mut queue = VecReplacementQueue::load(&path)
                    .with_context(|| format!("loading translations {}", path.display()))?;
                let report = inject(&mut insts, &mut queue, self.rules);
                log::info!(
                    "{}: {} text slot(s) replaced, {} warning(s)",
                    listing_path.display(),
                    report.replaced,
                    report.warnings()
                );
            }
            None if self.translations.is_some() => {
                log::warn!("{}: no translation file, keeping original text", listing_path.display());
            }
            None => {}
        }

        let mut data = ws2_core::reassemble(&insts, self.nls)?;
        if self.encrypt {
            cipher::encrypt_in_place(&mut data);
        }
        let path = self.script_path(listing_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn compile(args: Args, config: ProjectConfig) -> Result<()> {
    let inputs = batch::collect_inputs(&args.input, &ScriptFilter::new("txt"))?;
    if inputs.is_empty() {
        bail!("no listings found under {}", args.input.display());
    }
    std::fs::create_dir_all(&args.output)?;

    let assembler = Assembler {
        nls: args.encoding.unwrap_or(config.encoding),
        rules: config.text.rules()?,
        translations: args.translations,
        encrypt: !args.no_encrypt,
        root: args.input,
        output: args.output,
        script_extension: config.script_extension.clone(),
    };
    log::info!("assembling {} listing(s) as {}", inputs.len(), assembler.nls);

    let summary = batch::run(&inputs, |input| assembler.assemble_file(input));
    if !summary.is_success() {
        bail!("{} of {} listing(s) failed", summary.failed.len(), summary.processed);
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

    compile(args, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("assembler-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn assembler(dir: &Path, translations: Option<PathBuf>, encrypt: bool) -> Assembler {
        Assembler {
            nls: Nls::Utf16Le,
            rules: TextRules::default(),
            translations,
            encrypt,
            root: dir.to_path_buf(),
            output: dir.to_path_buf(),
            script_extension: "ws2".to_string(),
        }
    }

    #[test]
    fn script_is_named_after_the_listing() {
        let mut a = assembler(Path::new("out"), None, true);
        a.root = PathBuf::from("txt");
        assert_eq!(a.script_path(Path::new("txt/00_start.txt")), Path::new("out/00_start.ws2"));
        assert_eq!(a.script_path(Path::new("txt/00_start.ws2.txt")), Path::new("out/00_start.ws2"));
        assert_eq!(a.script_path(Path::new("txt/ex/00_start.txt")), Path::new("out/ex/00_start.ws2"));
    }

    #[test]
    fn test_compile_with_translation() -> Result<()> {
        let dir = scratch_dir("translation");
        let trans = dir.join("trans");
        std::fs::create_dir_all(&trans)?;
        std::fs::write(dir.join("a.txt"), "// source: a.ws2\n@0|#06|I::14|\n@5|#14|i::1|t::|T::やあ%K|c::0|\n@14|#FF|\n")?;
        std::fs::write(trans.join("a.txt.json"), r#"[{"message": "Hi"}]"#)?;

        assembler(&dir, Some(trans), false).assemble_file(&dir.join("a.txt"))?;

        let data = std::fs::read(dir.join("a.ws2"))?;
        // 5 + (1 + 4 + 2 + 10 + 1) = 23
        assert_eq!(&data[1..5], &23u32.to_le_bytes());
        assert_eq!(data.len(), 24);
        assert_eq!(data[23], 0xff);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_compile_encrypts_by_default() -> Result<()> {
        let dir = scratch_dir("encrypt");
        std::fs::write(dir.join("b.txt"), "@0|#15|t::A|c::7|\n")?;
        assembler(&dir, None, true).assemble_file(&dir.join("b.txt"))?;
        let data = std::fs::read(dir.join("b.ws2"))?;
        assert_eq!(cipher::decrypt(&data), vec![0x15, 0x41, 0x00, 0x00, 0x00, 0x07]);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn test_same_name_in_two_folders() -> Result<()> {
        let dir = scratch_dir("same-name");
        let txt = dir.join("txt");
        for sub in ["a", "b"] {
            std::fs::create_dir_all(txt.join(sub))?;
            std::fs::write(txt.join(sub).join("s.txt"), format!("@0|#15|t::{sub}|c::2|\n"))?;
        }

        let mut a = assembler(&dir.join("out"), None, false);
        a.root = txt.clone();
        for sub in ["a", "b"] {
            a.assemble_file(&txt.join(sub).join("s.txt"))?;
        }
        assert_eq!(std::fs::read(dir.join("out").join("a").join("s.ws2"))?, vec![0x15, b'a', 0, 0, 0, 2]);
        assert_eq!(std::fs::read(dir.join("out").join("b").join("s.ws2"))?, vec![0x15, b'b', 0, 0, 0, 2]);
        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
