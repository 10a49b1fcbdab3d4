//! AdvHD `.arc` container.
//!
//! ```text
//! u32 entry_count
//! u32 index_size
//! entry_count x { u32 size, u32 offset, utf16le name, 0x0000 }
//! data, addressed relative to 8 + index_size
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};

use crate::cipher;
use crate::cursor::Cursor;
use crate::error::{Error, Result};

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u32,
    /// Relative to the start of the data region.
    pub data_offset: u32,
}

impl ArchiveEntry {
    fn index_len(name: &str) -> usize {
        8 + name.encode_utf16().count() * 2 + 2
    }
}

/// Selects the entries that get the script cipher, by file extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFilter {
    suffix: String,
}

impl ScriptFilter {
    pub fn new(extension: &str) -> Self {
        Self { suffix: format!(".{}", extension.trim_start_matches('.').to_ascii_lowercase()) }
    }

    pub fn matches(&self, name: &str) -> bool {
        name.to_ascii_lowercase().ends_with(&self.suffix)
    }
}

impl Default for ScriptFilter {
    fn default() -> Self {
        Self::new("ws2")
    }
}

/// A named file going into, or coming out of, an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), data: data.into() }
    }
}

fn read_index_entry(index: &mut Cursor) -> Result<ArchiveEntry> {
    let size = index.read_u32()?;
    let data_offset = index.read_u32()?;
    let name = index.read_wide_cstr()?;
    Ok(ArchiveEntry { name, size, data_offset })
}

#[derive(Debug, Clone)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
    data: Bytes,
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptArchive(reason.into())
}

impl Archive {
    pub fn parse(buf: impl Into<Bytes>) -> Result<Self> {
        let buf: Bytes = buf.into();
        let mut header = Cursor::new(&buf);
        let count = header.read_u32().map_err(|_| corrupt("missing header"))?;
        let index_size = header.read_u32().map_err(|_| corrupt("missing header"))? as usize;

        let data_start = HEADER_LEN
            .checked_add(index_size)
            .filter(|end| *end <= buf.len())
            .ok_or_else(|| corrupt(format!("index of {index_size} bytes runs past end of file")))?;

        let mut index = Cursor::new(&buf[HEADER_LEN..data_start]);
        let mut entries = Vec::with_capacity((count as usize).min(index_size / 10));
        for i in 0..count {
            if index.at_end() {
                return Err(corrupt(format!("index ends before entry {i} of {count}")));
            }
            let entry = read_index_entry(&mut index)
                .map_err(|e| corrupt(format!("entry {i} of {count}: {e}")))?;
            entries.push(entry);
        }

        let data = buf.slice(data_start..);
        for entry in &entries {
            let end = entry.data_offset as u64 + entry.size as u64;
            if end > data.len() as u64 {
                return Err(corrupt(format!(
                    "{} spans {}..{} but the data region holds {} bytes",
                    entry.name,
                    entry.data_offset,
                    end,
                    data.len()
                )));
            }
        }

        log::debug!("archive holds {} entries, {} data bytes", entries.len(), data.len());
        Ok(Self { entries, data })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(fs::read(path.as_ref())?)
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_data(&self, index: usize) -> Option<&[u8]> {
        let entry = self.entries.get(index)?;
        let start = entry.data_offset as usize;
        self.data.get(start..start + entry.size as usize)
    }

    pub fn entry_data_by_name(&self, name: &str) -> Option<&[u8]> {
        let index = self.entries.iter().position(|e| e.name == name)?;
        self.entry_data(index)
    }

    /// Copies every entry out, decrypting scripts when `scripts` is given.
    pub fn files(&self, scripts: Option<&ScriptFilter>) -> Vec<ArchiveFile> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let mut data = self.entry_data(i).unwrap_or_default().to_vec();
                if scripts.is_some_and(|f| f.matches(&entry.name)) {
                    cipher::decrypt_in_place(&mut data);
                }
                ArchiveFile { name: entry.name.clone(), data }
            })
            .collect()
    }
}

pub fn unpack(buf: &[u8], scripts: Option<&ScriptFilter>) -> Result<Vec<ArchiveFile>> {
    Ok(Archive::parse(Bytes::copy_from_slice(buf))?.files(scripts))
}

/// Builds an archive, keeping the order of `files`. Scripts are encrypted when
/// `scripts` is given.
pub fn pack(files: &[ArchiveFile], scripts: Option<&ScriptFilter>) -> Result<Vec<u8>> {
    let index_size: usize = files.iter().map(|f| ArchiveEntry::index_len(&f.name)).sum();
    let data_size: usize = files.iter().map(|f| f.data.len()).sum();
    if u32::try_from(HEADER_LEN + index_size + data_size).is_err() {
        return Err(corrupt("archive would exceed 4 GiB"));
    }

    let mut index = BytesMut::with_capacity(HEADER_LEN + index_size);
    index.put_u32_le(files.len() as u32);
    index.put_u32_le(index_size as u32);
    let mut data = BytesMut::with_capacity(data_size);

    for file in files {
        index.put_u32_le(file.data.len() as u32);
        index.put_u32_le(data.len() as u32);
        for unit in file.name.encode_utf16() {
            index.put_u16_le(unit);
        }
        index.put_u16_le(0);

        let start = data.len();
        data.put_slice(&file.data);
        if scripts.is_some_and(|f| f.matches(&file.name)) {
            cipher::encrypt_in_place(&mut data[start..]);
        }
    }

    index.unsplit(data);
    Ok(index.to_vec())
}

/// Turns an entry name into a path under `root`, refusing anything that
/// would land outside it.
fn entry_path(root: &Path, name: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(name.replace('\\', "/"));
    let escapes = relative.components().any(|c| !matches!(c, Component::Normal(_)));
    if name.is_empty() || escapes {
        return Err(corrupt(format!("entry name {name:?} escapes the output directory")));
    }
    Ok(root.join(relative))
}

pub fn unpack_to_dir(
    archive: impl AsRef<Path>,
    output_dir: impl AsRef<Path>,
    scripts: Option<&ScriptFilter>,
) -> Result<usize> {
    let output_dir = output_dir.as_ref();
    let archive = Archive::open(archive)?;
    log::info!("unpacking {} entries into {}", archive.len(), output_dir.display());

    let files = archive.files(scripts);
    for file in &files {
        let path = entry_path(output_dir, &file.name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &file.data)?;
        log::debug!("{} ({} bytes)", file.name, file.data.len());
    }
    Ok(files.len())
}

/// Every regular file under `dir`, recursively, in sorted path order.
pub fn collect_files(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} is not a directory", dir.display()),
        )));
    }
    // the directory part is literal; only the suffix is a pattern
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("**").join("*");
    let pattern = pattern.to_string_lossy();
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| Error::Config(e.to_string()))?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Packs every file under `input_dir` under its base name.
pub fn pack_dir(
    input_dir: impl AsRef<Path>,
    archive: impl AsRef<Path>,
    scripts: Option<&ScriptFilter>,
) -> Result<usize> {
    let input_dir = input_dir.as_ref();
    let mut files = Vec::new();
    for path in collect_files(input_dir)? {
        let Some(name) = path.file_name() else {
            continue;
        };
        let name = name.to_string_lossy().into_owned();
        if files.iter().any(|f: &ArchiveFile| f.name == name) {
            log::warn!("{} shares its base name with an earlier file", path.display());
        }
        files.push(ArchiveFile { name, data: fs::read(&path)? });
    }
    if files.is_empty() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("nothing to pack in {}", input_dir.display()),
        )));
    }

    fs::write(archive.as_ref(), pack(&files, scripts)?)?;
    log::info!("packed {} files into {}", files.len(), archive.as_ref().display());
    Ok(files.len())
}
