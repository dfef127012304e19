//! Classpath traversal: recursive directory walking and archive entry
//! iteration, with scope filtering, modification-timestamp tracking, and
//! per-file dispatch into the classfile parser or the path-pattern
//! matchers.

use bumpalo::Bump;
use chrono::{TimeZone, Utc};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;
use tracing::{trace, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::classfile::{self, ClassfileError, ConstantTargets};
use crate::scan::matchers::FileMatch;
use crate::scan::{Result, ScanError, Scanner};

impl Scanner {
    /// Walks one directory root. Directories are visited while a
    /// whitelisted package lies at or below them; blacklisted directories
    /// prune their whole subtree. Files are dispatched only when their own
    /// path is in scope.
    pub(super) fn walk_directory(
        &mut self,
        root: &Path,
        targets: &ConstantTargets,
        timestamp_only: bool,
        max_mtime: &mut Option<SystemTime>,
    ) -> Result<()> {
        let filter = self.filter.clone();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if !entry.file_type().is_dir() {
                    return true;
                }
                let rooted = rooted_path(root, entry.path(), true);
                filter.dir_scope(&rooted).is_some_and(|scope| scope.recurse)
            });

        for entry in walker {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if entry.file_type().is_dir() {
                bump_mtime(max_mtime, metadata.modified()?);
                continue;
            }

            let rooted = rooted_path(root, entry.path(), false);
            if !filter.file_in_scope(&rooted) {
                continue;
            }
            bump_mtime(max_mtime, metadata.modified()?);
            if timestamp_only {
                continue;
            }

            let relative = &rooted[1..];
            if relative.ends_with(".class") {
                let bytes = fs::read(entry.path())?;
                self.consume_classfile(&bytes, &entry.path().to_string_lossy(), targets);
            } else {
                self.offer_directory_file(entry.path(), relative)?;
            }
        }

        Ok(())
    }

    /// Iterates one archive root. Entry paths are matched against the same
    /// scope prefixes as directory files; archives nested inside the
    /// archive are treated as plain entries, never recursed into.
    pub(super) fn walk_archive(
        &mut self,
        path: &Path,
        targets: &ConstantTargets,
        timestamp_only: bool,
        max_mtime: &mut Option<SystemTime>,
    ) -> Result<()> {
        let metadata = fs::metadata(path)?;
        if !self.use_entry_timestamps {
            bump_mtime(max_mtime, metadata.modified()?);
        }

        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file).map_err(|source| ScanError::Archive {
            path: path.to_path_buf(),
            source,
        })?;

        let filter = self.filter.clone();
        let now = SystemTime::now();
        let mut warned_future = false;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|source| ScanError::Archive {
                path: path.to_path_buf(),
                source,
            })?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_owned();
            let rooted = format!("/{name}");
            if !filter.file_in_scope(&rooted) {
                continue;
            }

            if let Some(modified) = entry.last_modified().and_then(entry_system_time) {
                if modified > now && !warned_future {
                    warn!(
                        "archive {} has an entry timestamped in the future",
                        path.display()
                    );
                    warned_future = true;
                }
                if self.use_entry_timestamps {
                    bump_mtime(max_mtime, modified);
                }
            }
            if timestamp_only {
                continue;
            }

            if name.ends_with(".class") {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                drop(entry);
                let origin = format!("{}!/{name}", path.display());
                self.consume_classfile(&bytes, &origin, targets);
            } else {
                drop(entry);
                self.offer_archive_entry(&mut archive, index, path, &name)?;
            }
        }

        Ok(())
    }

    /// Feeds one classfile's bytes through the header parser. Parse
    /// failures never abort the scan: streams without the magic number are
    /// skipped silently, anything else malformed is logged and dropped.
    fn consume_classfile(&mut self, bytes: &[u8], origin: &str, targets: &ConstantTargets) {
        let arena = Bump::new();
        let mut hits = Vec::new();

        match classfile::read_outline(bytes, &arena, &mut self.encountered, targets, &mut hits) {
            Ok(Some(outline)) => {
                self.classfiles_parsed += 1;
                self.graph.record(outline);
            }
            Ok(None) => {}
            Err(ClassfileError::InvalidClassfile) => {
                trace!("{origin}: no classfile magic, skipping");
            }
            Err(error) => warn!("{origin}: malformed classfile skipped ({error})"),
        }

        for hit in hits {
            let matcher = &mut self.field_matchers[hit.matcher];
            (matcher.callback)(&hit.class, &hit.field, &hit.value);
        }
    }

    /// Runs a directory file past every path pattern; each match gets its
    /// own stream, closed when the callback returns.
    fn offer_directory_file(&mut self, absolute: &Path, relative: &str) -> Result<()> {
        for index in 0..self.path_matchers.len() {
            if !self.path_matchers[index].pattern.is_match(relative) {
                continue;
            }
            let mut file = File::open(absolute)?;
            let matcher = &mut self.path_matchers[index];
            (matcher.callback)(FileMatch {
                absolute,
                relative,
                reader: &mut file,
            })?;
        }
        Ok(())
    }

    /// Same as [`Self::offer_directory_file`], re-opening the archive entry
    /// for every matching pattern.
    fn offer_archive_entry(
        &mut self,
        archive: &mut ZipArchive<File>,
        index: usize,
        archive_path: &Path,
        relative: &str,
    ) -> Result<()> {
        for matcher_index in 0..self.path_matchers.len() {
            if !self.path_matchers[matcher_index].pattern.is_match(relative) {
                continue;
            }
            let mut entry = archive.by_index(index).map_err(|source| ScanError::Archive {
                path: archive_path.to_path_buf(),
                source,
            })?;
            let matcher = &mut self.path_matchers[matcher_index];
            (matcher.callback)(FileMatch {
                absolute: archive_path,
                relative,
                reader: &mut entry,
            })?;
        }
        Ok(())
    }
}

/// `.jar` and `.zip` files are archive roots, case-insensitively.
pub(super) fn is_archive(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("jar") || ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false)
}

/// Builds the rooted, slash-separated path used for scope tests: `/` for
/// the root itself, `/w/x/` for directories, `/w/A.class` for files.
fn rooted_path(root: &Path, path: &Path, is_dir: bool) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut rooted = String::from("/");
    for component in relative.components() {
        rooted.push_str(&component.as_os_str().to_string_lossy());
        rooted.push('/');
    }
    if !is_dir && rooted.len() > 1 {
        rooted.pop();
    }
    rooted
}

fn bump_mtime(max_mtime: &mut Option<SystemTime>, observed: SystemTime) {
    *max_mtime = Some(max_mtime.map_or(observed, |current| current.max(observed)));
}

/// DOS timestamps in archive entries have no zone; they are interpreted as
/// UTC, which also matches how the test fixtures are written.
fn entry_system_time(timestamp: zip::DateTime) -> Option<SystemTime> {
    Utc.with_ymd_and_hms(
        i32::from(timestamp.year()),
        u32::from(timestamp.month()),
        u32::from(timestamp.day()),
        u32::from(timestamp.hour()),
        u32::from(timestamp.minute()),
        u32::from(timestamp.second()),
    )
    .single()
    .map(SystemTime::from)
}
