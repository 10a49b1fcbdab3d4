use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::archive::{collect_files, ScriptFilter};
use crate::error::Result;

#[derive(Debug)]
pub struct BatchSummary<E> {
    pub processed: usize,
    pub failed: Vec<(PathBuf, E)>,
}

impl<E> BatchSummary<E> {
    pub fn succeeded(&self) -> usize {
        self.processed - self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// `input` itself when it is a file, otherwise every file below it whose name
/// passes `filter`.
pub fn collect_inputs(input: impl AsRef<Path>, filter: &ScriptFilter) -> Result<Vec<PathBuf>> {
    let input = input.as_ref();
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    Ok(collect_files(input)?
        .into_iter()
        .filter(|p| p.file_name().is_some_and(|n| filter.matches(&n.to_string_lossy())))
        .collect())
}

/// Where `input`, collected from `root`, lands under `output_dir`. The path
/// below `root` is kept so equal names in different folders stay apart; a
/// lone file keeps only its name.
pub fn mirrored_path(root: &Path, input: &Path, output_dir: &Path) -> PathBuf {
    let relative = match input.strip_prefix(root) {
        Ok(rel) if !rel.as_os_str().is_empty() => rel,
        _ => input.file_name().map(Path::new).unwrap_or(input),
    };
    output_dir.join(relative)
}

/// Runs `job` on every input. A failing file is logged and recorded; the
/// rest of the batch still runs.
pub fn run<E, F>(inputs: &[PathBuf], mut job: F) -> BatchSummary<E>
where
    E: Display,
    F: FnMut(&Path) -> std::result::Result<(), E>,
{
    let mut summary = BatchSummary { processed: 0, failed: Vec::new() };
    for input in inputs {
        summary.processed += 1;
        match job(input) {
            Ok(()) => log::info!("{}: done", input.display()),
            Err(e) => {
                log::error!("{}: {:#}", input.display(), e);
                summary.failed.push((input.clone(), e));
            }
        }
    }

    if summary.is_success() {
        log::info!("{} file(s) processed", summary.processed);
    } else {
        log::warn!("{} of {} file(s) failed", summary.failed.len(), summary.processed);
    }
    summary
}
