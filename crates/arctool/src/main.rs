use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ws2_core::{archive, batch, cipher, ProjectConfig, ScriptFilter};

/// AdvHD .arc archive and script cipher tool
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Project config, `ws2.toml` in the working directory by default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every entry of an archive
    Unpack {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Decrypt scripts while extracting
        #[arg(short, long)]
        decrypt: bool,
    },
    /// Build an archive from every file under a directory
    Pack {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Encrypt scripts while packing
        #[arg(short, long)]
        encrypt: bool,
    },
    /// Encrypt a script, or every script in a directory
    Enc {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Decrypt a script, or every script in a directory
    Dec {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

fn transform_file(input: &Path, output: &Path, direction: Direction) -> Result<()> {
    let mut data = std::fs::read(input)?;
    match direction {
        Direction::Encrypt => cipher::encrypt_in_place(&mut data),
        Direction::Decrypt => cipher::decrypt_in_place(&mut data),
    }
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, data).with_context(|| format!("writing {}", output.display()))
}

/// A single file maps to `output` itself; a directory maps each of its
/// scripts to the same relative path inside `output`.
fn transform(input: &Path, output: &Path, filter: &ScriptFilter, direction: Direction) -> Result<()> {
    if input.is_file() {
        return transform_file(input, output, direction);
    }

    let inputs = batch::collect_inputs(input, filter)?;
    if inputs.is_empty() {
        bail!("no scripts found under {}", input.display());
    }
    let summary = batch::run(&inputs, |path| {
        transform_file(path, &batch::mirrored_path(input, path, output), direction)
    });
    if !summary.is_success() {
        bail!("{} of {} file(s) failed", summary.failed.len(), summary.processed);
    }
    Ok(())
}

fn run(command: Command, config: &ProjectConfig) -> Result<()> {
    let scripts = config.script_filter();
    match command {
        Command::Unpack { input, output, decrypt } => {
            let count = archive::unpack_to_dir(&input, &output, decrypt.then_some(&scripts))
                .with_context(|| format!("unpacking {}", input.display()))?;
            log::info!("extracted {} entries", count);
        }
        Command::Pack { input, output, encrypt } => {
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let count = archive::pack_dir(&input, &output, encrypt.then_some(&scripts))
                .with_context(|| format!("packing {}", input.display()))?;
            log::info!("packed {} files", count);
        }
        Command::Enc { input, output } => transform(&input, &output, &scripts, Direction::Encrypt)?,
        Command::Dec { input, output } => transform(&input, &output, &scripts, Direction::Decrypt)?,
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

    run(args.command, &config)
}
