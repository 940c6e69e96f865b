use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::{trace, warn};
use zip::read::ZipArchive;
use zip::result::ZipError;

use crate::error::IngestError;

pub const PACKAGE_EXTENSION: &str = ".pk3";

type Archive = ZipArchive<BufReader<fs::File>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackageInfo {
    pub dir: PathBuf,
    pub file_name: String,
}

impl PackageInfo {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub(crate) fn label(&self) -> String {
        self.path().display().to_string()
    }
}

/// Lists the packages of one directory in processing order: descending
/// lexical file name, so `02-patch.pk3` is read before `01-base.pk3`.
pub fn discover_packages(dir: &Path) -> Result<Vec<PackageInfo>, IngestError> {
    let read_dir = fs::read_dir(dir).map_err(|err| IngestError::io(dir, err))?;
    let mut names = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|err| IngestError::io(dir, err))?;
        let file_type = entry.file_type().map_err(|err| IngestError::io(entry.path(), err))?;
        if file_type.is_dir() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            warn!(path = %entry.path().display(), "skipping package with non utf-8 name");
            continue;
        };
        if name.ends_with(PACKAGE_EXTENSION) {
            names.push(name);
        }
    }
    names.sort_by(|a, b| b.cmp(a));
    Ok(names
        .into_iter()
        .map(|file_name| PackageInfo {
            dir: dir.to_path_buf(),
            file_name,
        })
        .collect())
}

/// Forward-only reader over the file entries of one package.
pub struct PackageReader {
    info: PackageInfo,
    archive: Archive,
    next_index: usize,
}

impl PackageReader {
    pub fn open(info: PackageInfo) -> Result<Self, IngestError> {
        let path = info.path();
        let file = fs::File::open(&path).map_err(|err| IngestError::io(&path, err))?;
        let archive = ZipArchive::new(BufReader::new(file))
            .map_err(|err| zip_error(&info.label(), "open failed", err))?;
        Ok(Self {
            info,
            archive,
            next_index: 0,
        })
    }

    pub fn info(&self) -> &PackageInfo {
        &self.info
    }

    /// Number of archive members, directories included.
    pub fn member_count(&self) -> usize {
        self.archive.len()
    }

    pub fn next_entry(&mut self) -> Result<Option<PackageEntry<'_>>, IngestError> {
        let Some((index, path)) = self.next_file()? else {
            return Ok(None);
        };
        Ok(Some(self.entry_at(index, path)))
    }

    // Skips directory members and unsafe names without decompressing anything.
    pub(crate) fn next_file(&mut self) -> Result<Option<(usize, String)>, IngestError> {
        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;
            let member = self.archive.by_index_raw(index).map_err(|err| {
                zip_error(&self.info.label(), &format!("entry {} failed", index), err)
            })?;
            if member.is_dir() {
                continue;
            }
            let raw_name = member.name().to_string();
            drop(member);
            match normalize_entry_path(&raw_name) {
                Some(path) => return Ok(Some((index, path))),
                None => {
                    warn!(package = %self.info.label(), entry = %raw_name, "skipping unsafe entry path");
                }
            }
        }
        Ok(None)
    }

    pub(crate) fn entry_at(&mut self, index: usize, path: String) -> PackageEntry<'_> {
        PackageEntry {
            package: &self.info,
            archive: &mut self.archive,
            index,
            path,
            content: None,
        }
    }
}

/// One file inside a package. Content is decompressed on the first call to
/// [`PackageEntry::bytes`]; an entry dropped unread is released without
/// decompressing.
pub struct PackageEntry<'a> {
    package: &'a PackageInfo,
    archive: &'a mut Archive,
    index: usize,
    path: String,
    content: Option<Vec<u8>>,
}

impl<'a> PackageEntry<'a> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn package(&self) -> &'a PackageInfo {
        self.package
    }

    pub fn is_read(&self) -> bool {
        self.content.is_some()
    }

    pub fn bytes(&mut self) -> Result<&[u8], IngestError> {
        let content = match self.content.take() {
            Some(content) => content,
            None => self.decompress()?,
        };
        Ok(self.content.insert(content).as_slice())
    }

    /// Content as text; invalid UTF-8 sequences become U+FFFD.
    pub fn text(&mut self) -> Result<String, IngestError> {
        let bytes = self.bytes()?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Acknowledges the entry, letting the stream move on.
    pub fn ack(self) {}

    fn decompress(&mut self) -> Result<Vec<u8>, IngestError> {
        let label = self.package.label();
        let mut file = self
            .archive
            .by_index(self.index)
            .map_err(|err| zip_error(&label, &format!("read of '{}' failed", self.path), err))?;
        let mut buffer = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buffer).map_err(|err| {
            if err.kind() == std::io::ErrorKind::InvalidData {
                IngestError::format(format!("{}::{}", label, self.path), err)
            } else {
                IngestError::io(self.package.path(), err)
            }
        })?;
        Ok(buffer)
    }
}

impl Drop for PackageEntry<'_> {
    fn drop(&mut self) {
        if self.content.is_none() {
            trace!(package = %self.package.label(), entry = %self.path, "entry released unread");
        }
    }
}

fn zip_error(package: &str, action: &str, err: ZipError) -> IngestError {
    match err {
        ZipError::Io(source) => IngestError::io(package, source),
        other => IngestError::format(package, format!("{}: {}", action, other)),
    }
}

/// Normalizes an archive member name to a relative forward-slash path, or
/// `None` when the name could escape the directory it is extracted into.
pub fn normalize_entry_path(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let normalized = normalized.trim_end_matches('/');
    if normalized.is_empty() || normalized.starts_with('/') {
        return None;
    }
    for segment in normalized.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return None;
        }
        if segment.contains(':') {
            return None;
        }
    }
    Some(normalized.to_string())
}
