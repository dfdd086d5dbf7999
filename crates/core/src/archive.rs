//! Non-destructive placement of files and folders under the archive root.

use crate::error::TriageError;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

#[derive(Debug, Default, Clone)]
pub struct MergeReport {
    /// Source and final destination of every file placed.
    pub placed: Vec<(PathBuf, PathBuf)>,
    /// How many of those needed a `_N` suffix.
    pub renamed: usize,
    pub failures: Vec<(PathBuf, String)>,
}

pub struct ArchiveManager {
    copy_then_delete: bool,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ArchiveManager {
    pub fn new(copy_then_delete: bool) -> Self {
        Self {
            copy_then_delete,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Moves a file or folder into `dst_folder` and returns where it landed.
    /// Existing names are never overwritten: files get the smallest free
    /// `_N` suffix and same-named folders are merged.
    pub fn move_into(&self, src: &Path, dst_folder: &Path) -> Result<PathBuf, TriageError> {
        let name = file_name(src)?;
        if src.is_dir() {
            let target = dst_folder.join(name);
            if target.is_dir() {
                let report = self.merge_dir(src, &target);
                return match report.failures.first() {
                    None => Ok(target),
                    Some((path, reason)) => Err(TriageError::moving(
                        path,
                        &target,
                        std::io::Error::other(reason.clone()),
                    )),
                };
            }
        }

        let lock = self.folder_lock(dst_folder);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(dst_folder).map_err(|e| TriageError::moving(src, dst_folder, e))?;
        let mut target = dst_folder.join(name);
        if target.exists() {
            target = resolve_conflict(&target);
            debug!("name taken, using {}", target.display());
        }
        self.relocate(src, &target)?;
        Ok(target)
    }

    /// Copies a file into `dst_folder` with the same collision policy; the
    /// source stays where it is.
    pub fn copy_into(&self, src: &Path, dst_folder: &Path) -> Result<PathBuf, TriageError> {
        let name = file_name(src)?;
        let lock = self.folder_lock(dst_folder);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        fs::create_dir_all(dst_folder).map_err(|e| TriageError::moving(src, dst_folder, e))?;
        let mut target = dst_folder.join(name);
        if target.exists() {
            target = resolve_conflict(&target);
        }
        fs::copy(src, &target).map_err(|e| TriageError::moving(src, &target, e))?;
        Ok(target)
    }

    /// Archives every entry of `src_dir` into `dst`. Entries that fail stay
    /// behind and are listed in the report; the rest continue.
    pub fn merge_into(&self, src_dir: &Path, dst: &Path) -> Result<MergeReport, TriageError> {
        if !src_dir.is_dir() {
            return Err(TriageError::moving(
                src_dir,
                dst,
                std::io::Error::new(std::io::ErrorKind::NotFound, "source is not a directory"),
            ));
        }
        fs::create_dir_all(dst).map_err(|e| TriageError::moving(src_dir, dst, e))?;
        let report = self.merge_dir(src_dir, dst);
        info!(
            placed = report.placed.len(),
            renamed = report.renamed,
            failed = report.failures.len(),
            "merged {} into {}",
            src_dir.display(),
            dst.display()
        );
        Ok(report)
    }

    fn merge_dir(&self, src: &Path, dst: &Path) -> MergeReport {
        let mut report = MergeReport::default();
        self.merge_dir_into(src, dst, &mut report);
        report
    }

    fn merge_dir_into(&self, src: &Path, dst: &Path, report: &mut MergeReport) {
        let entries = match sorted_entries(src) {
            Ok(entries) => entries,
            Err(e) => {
                report.failures.push((src.to_path_buf(), e.to_string()));
                return;
            }
        };
        for entry in entries {
            let Some(name) = entry.file_name().map(|n| n.to_os_string()) else {
                continue;
            };
            let target = dst.join(&name);
            if entry.is_dir() && target.is_dir() {
                self.merge_dir_into(&entry, &target, report);
                continue;
            }
            let renamed = target.exists();
            match self.move_into(&entry, dst) {
                Ok(placed) => {
                    report.renamed += usize::from(renamed);
                    report.placed.push((entry, placed));
                }
                Err(e) => {
                    warn!("{e}");
                    report.failures.push((entry, e.to_string()));
                }
            }
        }
        // Only succeeds once everything below has been moved out.
        if let Err(e) = fs::remove_dir(src) {
            debug!("left {} in place: {e}", src.display());
        }
    }

    fn relocate(&self, src: &Path, dst: &Path) -> Result<(), TriageError> {
        if !self.copy_then_delete {
            match fs::rename(src, dst) {
                Ok(()) => return Ok(()),
                Err(e) if src.is_dir() => return Err(TriageError::moving(src, dst, e)),
                Err(e) => debug!("rename failed ({e}), copying instead"),
            }
        }
        if src.is_dir() {
            fs::create_dir_all(dst).map_err(|e| TriageError::moving(src, dst, e))?;
            let report = self.merge_dir(src, dst);
            return match report.failures.into_iter().next() {
                None => Ok(()),
                Some((path, reason)) => Err(TriageError::moving(
                    &path,
                    dst,
                    std::io::Error::other(reason),
                )),
            };
        }
        fs::copy(src, dst).map_err(|e| TriageError::moving(src, dst, e))?;
        if let Err(e) = fs::remove_file(src) {
            let _ = fs::remove_file(dst);
            return Err(TriageError::moving(src, dst, e));
        }
        Ok(())
    }

    fn folder_lock(&self, folder: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(folder.to_path_buf()).or_default())
    }
}

/// `name_N.ext` with the smallest `N >= 1` not already present.
pub fn resolve_conflict(dest: &Path) -> PathBuf {
    resolve_conflict_by(dest, |candidate| candidate.exists())
}

/// Like [`resolve_conflict`], with `taken` deciding which names are in use.
pub fn resolve_conflict_by(dest: &Path, taken: impl Fn(&Path) -> bool) -> PathBuf {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    let stem = dest
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let ext = dest
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut counter = 1;
    loop {
        let name = if ext.is_empty() {
            format!("{}_{}", stem, counter)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let candidate = parent.join(name);
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, TriageError> {
    path.file_name().ok_or_else(|| {
        TriageError::moving(
            path,
            path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
        )
    })
}

fn sorted_entries(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}
