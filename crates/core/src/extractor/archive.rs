//! Containers: member names always, member contents when enabled.
//!
//! Members are unpacked into a scratch directory that lives exactly as long as
//! the extraction call, then fed back through the registry one level deeper.

use super::{ExtractCx, Extractor};
use crate::error::TriageError;
use crate::models::extension_key;
use flate2::read::GzDecoder;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["zip"]
    }

    fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        let file = fs::File::open(path).map_err(|e| TriageError::extraction(path, e))?;
        let mut archive =
            zip::ZipArchive::new(file).map_err(|e| TriageError::extraction(path, e))?;
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();

        let Some(scratch) = scratch_for(cx)? else {
            return Ok(names.join("\n"));
        };
        let mut unpacked = 0u64;
        for i in 0..archive.len() {
            cx.check_deadline(path)?;
            let mut entry = archive
                .by_index(i)
                .map_err(|e| TriageError::extraction(path, e))?;
            if entry.is_dir() {
                continue;
            }
            let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
                warn!("skipping unsafe member {} in {}", entry.name(), path.display());
                continue;
            };
            let remaining = cx.settings.max_archive_bytes.saturating_sub(unpacked);
            let target = scratch.path().join(relative);
            match unpack_capped(&mut entry, &target, remaining)
                .map_err(|e| TriageError::extraction(path, e))?
            {
                Some(written) => unpacked += written,
                None => {
                    debug!("byte cap reached in {}", path.display());
                    break;
                }
            }
        }
        Ok(assemble(&names, scratch.path(), cx))
    }
}

/// `.tar`, `.tar.gz` and `.tgz`.
pub struct TarExtractor;

impl Extractor for TarExtractor {
    fn name(&self) -> &'static str {
        "tar"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["tar", "tgz"]
    }

    fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        let file = fs::File::open(path).map_err(|e| TriageError::extraction(path, e))?;
        let reader: Box<dyn Read> = if extension_key(path).as_deref() == Some("tgz") {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut archive = tar::Archive::new(reader);
        let scratch = scratch_for(cx)?;

        let mut names = Vec::new();
        let mut unpacked = 0u64;
        let entries = archive
            .entries()
            .map_err(|e| TriageError::extraction(path, e))?;
        let mut capped = false;
        for entry in entries {
            cx.check_deadline(path)?;
            let mut entry = entry.map_err(|e| TriageError::extraction(path, e))?;
            let member = entry
                .path()
                .map_err(|e| TriageError::extraction(path, e))?
                .into_owned();
            let is_file = entry.header().entry_type().is_file();
            names.push(member.to_string_lossy().into_owned());
            let Some(dir) = scratch.as_ref() else {
                continue;
            };
            if !is_file || capped {
                continue;
            }
            let Some(relative) = enclosed(&member) else {
                warn!("skipping unsafe member {} in {}", member.display(), path.display());
                continue;
            };
            let remaining = cx.settings.max_archive_bytes.saturating_sub(unpacked);
            match unpack_capped(&mut entry, &dir.path().join(relative), remaining)
                .map_err(|e| TriageError::extraction(path, e))?
            {
                Some(written) => unpacked += written,
                None => {
                    debug!("byte cap reached in {}", path.display());
                    capped = true;
                }
            }
        }
        match scratch {
            Some(dir) => Ok(assemble(&names, dir.path(), cx)),
            None => Ok(names.join("\n")),
        }
    }
}

#[cfg(feature = "archives")]
pub use self::listing::{RarExtractor, SevenZipExtractor};

/// Formats read for member names only.
#[cfg(feature = "archives")]
mod listing {
    use super::*;

    pub struct RarExtractor;

    impl Extractor for RarExtractor {
        fn name(&self) -> &'static str {
            "rar"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["rar"]
        }

        fn extract(&self, path: &Path, cx: &ExtractCx<'_>) -> Result<String, TriageError> {
            let listing = unrar::Archive::new(path)
                .open_for_listing()
                .map_err(|e| TriageError::extraction(path, e))?;
            let mut names = Vec::new();
            for header in listing {
                cx.check_deadline(path)?;
                let header = header.map_err(|e| TriageError::extraction(path, e))?;
                if !header.is_directory() {
                    names.push(header.filename.to_string_lossy().into_owned());
                }
            }
            Ok(names.join("\n"))
        }
    }

    pub struct SevenZipExtractor;

    impl Extractor for SevenZipExtractor {
        fn name(&self) -> &'static str {
            "7z"
        }

        fn extensions(&self) -> &'static [&'static str] {
            &["7z"]
        }

        fn extract(&self, path: &Path, _cx: &ExtractCx<'_>) -> Result<String, TriageError> {
            let reader = sevenz_rust::SevenZReader::open(path, sevenz_rust::Password::empty())
                .map_err(|e| TriageError::extraction(path, e))?;
            let names: Vec<String> = reader
                .archive()
                .files
                .iter()
                .filter(|f| !f.is_directory())
                .map(|f| f.name().to_string())
                .collect();
            Ok(names.join("\n"))
        }
    }
}

/// Registered for rar and 7z when the listing readers are not built in, so
/// the run log says why nothing was read.
pub struct UnsupportedArchiveExtractor;

impl Extractor for UnsupportedArchiveExtractor {
    fn name(&self) -> &'static str {
        "unsupported-archive"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["rar", "7z"]
    }

    fn extract(&self, path: &Path, _cx: &ExtractCx<'_>) -> Result<String, TriageError> {
        Err(TriageError::Unsupported {
            path: path.to_path_buf(),
            format: extension_key(path).unwrap_or_default(),
        })
    }
}

/// A scratch directory when member contents are wanted at this depth.
fn scratch_for(cx: &ExtractCx<'_>) -> Result<Option<TempDir>, TriageError> {
    if !cx.settings.archive_contents || cx.depth >= cx.settings.max_archive_depth {
        return Ok(None);
    }
    let mut builder = tempfile::Builder::new();
    builder.prefix("triage-");
    let root = cx
        .settings
        .scratch_root
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    builder
        .tempdir_in(&root)
        .map(Some)
        .map_err(|e| TriageError::extraction(&root, format!("scratch directory: {e}")))
}

/// Copies at most `remaining` bytes of a member to `target`. `None` means the
/// member ran past the cap; the partial file is removed.
fn unpack_capped(member: &mut dyn Read, target: &Path, remaining: u64) -> io::Result<Option<u64>> {
    if remaining == 0 {
        return Ok(None);
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = fs::File::create(target)?;
    let written = io::copy(&mut member.take(remaining.saturating_add(1)), &mut out)?;
    if written > remaining {
        drop(out);
        fs::remove_file(target)?;
        return Ok(None);
    }
    Ok(Some(written))
}

/// The member path when every component stays below the scratch root.
fn enclosed(member: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in member.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Member names, then each member's text in path order, within budget.
fn assemble(names: &[String], root: &Path, cx: &ExtractCx<'_>) -> String {
    let mut out = names.join("\n");
    let members: Vec<PathBuf> = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    for member in members {
        if out.chars().count() >= cx.budget || cx.expired() {
            break;
        }
        let extraction = cx.nested(&member);
        if let Some(reason) = extraction.failure() {
            debug!("member {} unreadable: {reason}", member.display());
            continue;
        }
        let text = extraction.text().trim();
        if !text.is_empty() {
            out.push('\n');
            out.push_str(text);
        }
    }
    out
}
