//! Walks the intake directory and fingerprints each candidate document.

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task;
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashMode {
    #[default]
    None,
    Fast, // first 64 KiB + size
    Full, // full-file blake3
}

impl From<&str> for HashMode {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fast" => HashMode::Fast,
            "full" => HashMode::Full,
            _ => HashMode::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScannedItem {
    pub path: PathBuf,
    pub size: u64,
    pub hash: Option<String>,
}

/// Regular files under `root`, sorted by path. Hidden entries, glob
/// excludes and anything inside `skip` (typically the archive root) are left
/// out.
pub async fn scan(
    root: &Path,
    excludes: &[String],
    hash_mode: HashMode,
    skip: &[PathBuf],
) -> anyhow::Result<Vec<ScannedItem>> {
    if !root.is_dir() {
        anyhow::bail!("source directory {} does not exist", root.display());
    }
    let (tx, mut rx) = mpsc::channel(100);
    let exclude_set = build_globset(excludes)?;
    let skip: Vec<PathBuf> = skip.iter().filter_map(|p| p.canonicalize().ok()).collect();
    let root = root.to_path_buf();

    let walker_handle = task::spawn_blocking(move || {
        for entry in WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || should_descend(e, &exclude_set, &skip))
        {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!("walk error: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let size = match fs::metadata(path) {
                Ok(m) => m.len(),
                Err(_) => continue,
            };
            let hash = match hash_mode {
                HashMode::None => None,
                HashMode::Fast => fast_hash(path, size).ok(),
                HashMode::Full => full_hash(path).ok(),
            };
            let item = ScannedItem {
                path: path.to_path_buf(),
                size,
                hash,
            };
            if tx.blocking_send(item).is_err() {
                // Receiver dropped, stop walking.
                break;
            }
        }
    });

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    walker_handle.await.context("scanner task failed")?;
    items.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(items)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid exclude pattern {pat:?}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

fn should_descend(entry: &walkdir::DirEntry, excludes: &GlobSet, skip: &[PathBuf]) -> bool {
    let path = entry.path();
    if excludes.is_match(path) || is_hidden(path) {
        return false;
    }
    if entry.file_type().is_dir() && !skip.is_empty() {
        if let Ok(canonical) = path.canonicalize() {
            return !skip.contains(&canonical);
        }
    }
    true
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

fn fast_hash(path: &Path, size: u64) -> anyhow::Result<String> {
    use std::io::Read;
    const BYTES: u64 = 64 * 1024;
    let file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.take(BYTES).read_to_end(&mut buf)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update(&buf);
    hasher.update(&size.to_le_bytes());
    Ok(hasher.finalize().to_hex().to_string())
}

fn full_hash(path: &Path) -> anyhow::Result<String> {
    use std::io::Read;
    let mut file = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn skips_hidden_excluded_and_archive_root() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path();
        touch(&src.join("b/report.pdf"));
        touch(&src.join("a.txt"));
        touch(&src.join(".hidden/secret.txt"));
        touch(&src.join(".DS_Store"));
        touch(&src.join("tmp/scratch.log"));
        touch(&src.join("archive/外界公司/old.docx"));

        let items = scan(
            src,
            &["**/tmp".to_string()],
            HashMode::None,
            &[src.join("archive")],
        )
        .await
        .unwrap();
        let names: Vec<PathBuf> = items
            .iter()
            .map(|i| i.path.strip_prefix(src).unwrap().to_path_buf())
            .collect();
        assert_eq!(names, vec![PathBuf::from("a.txt"), PathBuf::from("b/report.pdf")]);
    }

    #[tokio::test]
    async fn hashes_identify_content() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("one.txt"), "same").unwrap();
        fs::write(tmp.path().join("two.txt"), "same").unwrap();
        for mode in [HashMode::Fast, HashMode::Full] {
            let items = scan(tmp.path(), &[], mode, &[]).await.unwrap();
            assert_eq!(items.len(), 2);
            assert!(items[0].hash.is_some());
            assert_eq!(items[0].hash, items[1].hash);
        }
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(scan(&tmp.path().join("nope"), &[], HashMode::None, &[])
            .await
            .is_err());
    }
}
