//! The fixed, ordered label set of a run.

use crate::config::TaxonomyConfig;
use crate::error::TriageError;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Taxonomy {
    labels: Arc<[String]>,
}

impl Taxonomy {
    pub fn new<I, S>(labels: I) -> Result<Self, TriageError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(|l| l.into().trim().to_string()).collect();
        if labels.is_empty() {
            return Err(TriageError::Taxonomy("no labels given".into()));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if label.is_empty() {
                return Err(TriageError::Taxonomy("blank label".into()));
            }
            if label.contains('/') || label.contains('\\') || label == "." || label == ".." {
                return Err(TriageError::Taxonomy(format!(
                    "label {label:?} cannot be used as a folder name"
                )));
            }
            if !seen.insert(label.as_str()) {
                return Err(TriageError::Taxonomy(format!("duplicate label {label:?}")));
            }
        }
        Ok(Self {
            labels: labels.into(),
        })
    }

    /// One label per line; blank lines and `#` comments are ignored.
    pub fn from_file(path: &Path) -> Result<Self, TriageError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TriageError::Taxonomy(format!("{}: {e}", path.display())))?;
        Self::new(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn from_config(cfg: &TaxonomyConfig) -> Result<Self, TriageError> {
        if !cfg.labels.is_empty() {
            return Self::new(cfg.labels.iter().cloned());
        }
        match &cfg.path {
            Some(p) => Self::from_file(Path::new(p)),
            None => Err(TriageError::Taxonomy(
                "configure taxonomy.labels or taxonomy.path".into(),
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order() {
        let t = Taxonomy::new(["b", "a", "c"]).unwrap();
        assert_eq!(t.labels(), &["b".to_string(), "a".into(), "c".into()]);
        assert_eq!(t.index_of("c"), Some(2));
        assert_eq!(t.label(1), Some("a"));
    }

    #[test]
    fn rejects_duplicates_and_blanks() {
        assert!(Taxonomy::new(["a", "a"]).is_err());
        assert!(Taxonomy::new(["a", " "]).is_err());
        assert!(Taxonomy::new(Vec::<String>::new()).is_err());
        assert!(Taxonomy::new(["../x"]).is_err());
    }

    #[test]
    fn reads_label_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "# categories\n财务_经费提醒\n\n外界公司\n").unwrap();
        let t = Taxonomy::from_file(&path).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t.label(0), Some("财务_经费提醒"));
    }
}
