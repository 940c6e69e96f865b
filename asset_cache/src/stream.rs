use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use tracing::{debug, info, trace};

use crate::error::IngestError;
use crate::package::{discover_packages, PackageEntry, PackageInfo, PackageReader};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub directories: usize,
    pub packages: usize,
    pub emitted: usize,
    pub duplicates: usize,
}

/// Merges the packages of several source directories into one entry
/// sequence: directories in the given order, packages in descending name
/// order within a directory, entries in archive order within a package.
///
/// With dedup enabled only the first occurrence of an entry path is
/// emitted. Entries are handed out one at a time: the returned
/// [`PackageEntry`] borrows the stream, so the next entry cannot be
/// requested until the current one is acknowledged or dropped.
pub struct PackageStream {
    sources: VecDeque<PathBuf>,
    pending: VecDeque<PackageInfo>,
    current: Option<PackageReader>,
    seen: Option<HashSet<String>>,
    stats: StreamStats,
    finished: bool,
}

impl PackageStream {
    pub fn new<I, P>(sources: I, dedup: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            pending: VecDeque::new(),
            current: None,
            seen: dedup.then(HashSet::new),
            stats: StreamStats::default(),
            finished: false,
        }
    }

    pub fn dedup(&self) -> bool {
        self.seen.is_some()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    pub fn current_package(&self) -> Option<&PackageInfo> {
        self.current.as_ref().map(PackageReader::info)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns the next entry, `Ok(None)` once every source is exhausted.
    /// After the end or an error the stream stays finished.
    pub fn next_entry(&mut self) -> Result<Option<PackageEntry<'_>>, IngestError> {
        if self.finished {
            return Ok(None);
        }
        let next = match self.advance() {
            Ok(Some(next)) => next,
            Ok(None) => {
                info!(
                    packages = self.stats.packages,
                    emitted = self.stats.emitted,
                    duplicates = self.stats.duplicates,
                    "package stream complete"
                );
                self.finish();
                return Ok(None);
            }
            Err(err) => {
                self.finish();
                return Err(err);
            }
        };
        if self.current.is_none() {
            self.finish();
            return Ok(None);
        }
        let Some(reader) = self.current.as_mut() else {
            return Ok(None);
        };
        let (index, path) = next;
        debug!(package = %reader.info().label(), entry = %path, "emitting entry");
        Ok(Some(reader.entry_at(index, path)))
    }

    /// Drives the stream to the end, handing each entry to `handler`. The
    /// handler returning is the acknowledgment; an error stops the stream
    /// and is returned annotated with the package and entry path.
    pub fn for_each<F>(&mut self, mut handler: F) -> Result<StreamStats, IngestError>
    where
        F: FnMut(PackageEntry<'_>) -> Result<(), IngestError>,
    {
        loop {
            let failure = match self.next_entry()? {
                Some(entry) => {
                    let package = entry.package().label();
                    let path = entry.path().to_string();
                    handler(entry).err().map(|err| err.in_entry(&package, &path))
                }
                None => break,
            };
            if let Some(err) = failure {
                self.finish();
                return Err(err);
            }
        }
        Ok(self.stats)
    }

    fn finish(&mut self) {
        self.finished = true;
        self.current = None;
        self.pending.clear();
        self.sources.clear();
    }

    fn advance(&mut self) -> Result<Option<(usize, String)>, IngestError> {
        loop {
            let Some(reader) = self.current.as_mut() else {
                if !self.open_next_package()? {
                    return Ok(None);
                }
                continue;
            };
            let Some((index, path)) = reader.next_file()? else {
                debug!(package = %reader.info().label(), "package exhausted");
                self.current = None;
                continue;
            };
            if let Some(seen) = self.seen.as_mut() {
                if !seen.insert(path.clone()) {
                    self.stats.duplicates += 1;
                    trace!(entry = %path, "skipping duplicate entry");
                    continue;
                }
            }
            self.stats.emitted += 1;
            return Ok(Some((index, path)));
        }
    }

    fn open_next_package(&mut self) -> Result<bool, IngestError> {
        loop {
            if let Some(info) = self.pending.pop_front() {
                info!(package = %info.label(), "reading package");
                self.current = Some(PackageReader::open(info)?);
                self.stats.packages += 1;
                return Ok(true);
            }
            let Some(dir) = self.sources.pop_front() else {
                return Ok(false);
            };
            let packages = discover_packages(&dir)?;
            debug!(dir = %dir.display(), packages = packages.len(), "discovered packages");
            self.stats.directories += 1;
            self.pending.extend(packages);
        }
    }
}
