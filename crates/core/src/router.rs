use crate::archive::{resolve_conflict_by, ArchiveManager};
use crate::error::TriageError;
use crate::taxonomy::Taxonomy;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct RouteOutcome {
    pub destinations: Vec<PathBuf>,
    pub error: Option<TriageError>,
}

/// Places a document under `<archive_root>/<label>/` for each selected label.
/// All but the last label receive a copy; the file itself moves into the last.
pub struct Router {
    archive_root: PathBuf,
    manager: Arc<ArchiveManager>,
    dry_run: bool,
    /// Destinations already handed out by this dry run.
    planned: Mutex<HashSet<PathBuf>>,
}

impl Router {
    pub fn new(archive_root: PathBuf, manager: Arc<ArchiveManager>, dry_run: bool) -> Self {
        Self {
            archive_root,
            manager,
            dry_run,
            planned: Mutex::new(HashSet::new()),
        }
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Creates one folder per label so the archive layout is complete even
    /// for labels nothing was filed under.
    pub fn prepare(&self, taxonomy: &Taxonomy) -> Result<(), TriageError> {
        if self.dry_run {
            return Ok(());
        }
        for label in taxonomy.labels() {
            let folder = self.label_folder(label);
            fs::create_dir_all(&folder).map_err(|e| TriageError::moving(&self.archive_root, &folder, e))?;
        }
        Ok(())
    }

    pub fn label_folder(&self, label: &str) -> PathBuf {
        self.archive_root.join(label)
    }

    pub fn route(&self, path: &Path, labels: &[String]) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();
        let Some((last, rest)) = labels.split_last() else {
            outcome.error = Some(TriageError::Classification("no labels to route to".into()));
            return outcome;
        };
        if self.dry_run {
            outcome.destinations = labels.iter().map(|l| self.planned(path, l)).collect();
            return outcome;
        }

        for label in rest {
            match self.manager.copy_into(path, &self.label_folder(label)) {
                Ok(dst) => outcome.destinations.push(dst),
                Err(e) => {
                    warn!("{e}");
                    self.roll_back(&outcome.destinations);
                    outcome.destinations.clear();
                    outcome.error = Some(e);
                    return outcome;
                }
            }
        }
        match self.manager.move_into(path, &self.label_folder(last)) {
            Ok(dst) => {
                debug!("{} -> {}", path.display(), dst.display());
                outcome.destinations.push(dst);
            }
            Err(e) => {
                warn!("{e}");
                self.roll_back(&outcome.destinations);
                outcome.destinations.clear();
                outcome.error = Some(e);
            }
        }
        outcome
    }

    /// Where the file would land, given what is on disk and what earlier
    /// documents of this run were already planned into.
    fn planned(&self, path: &Path, label: &str) -> PathBuf {
        let name = path.file_name().unwrap_or(path.as_os_str());
        let target = self.label_folder(label).join(name);
        let mut planned = self.planned.lock().unwrap_or_else(PoisonError::into_inner);
        let taken = |p: &Path| p.exists() || planned.contains(p);
        let chosen = if taken(&target) {
            resolve_conflict_by(&target, taken)
        } else {
            target
        };
        planned.insert(chosen.clone());
        chosen
    }

    fn roll_back(&self, copies: &[PathBuf]) {
        for copy in copies {
            if let Err(e) = fs::remove_file(copy) {
                warn!("could not remove partial copy {}: {e}", copy.display());
            }
        }
    }
}
