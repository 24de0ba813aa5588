//! YAML definition loading shared by the rule set and the playbook set.
//!
//! One directory is scanned, non-recursively, for `*.yaml` / `*.yml` files
//! in lexical path order. A file that fails to read, parse or validate is
//! reported and skipped; only an unreadable directory fails the load.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::LoadError;
use crate::models::playbook::{Playbook, PlaybookDocument};
use crate::models::rule::{Rule, RuleDocument};

/// Outcome of loading a single definition file.
#[derive(Debug, Clone, Serialize)]
pub struct LoadResult {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: LoadStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum LoadStatus {
    Loaded { id: String },
    Skipped { reason: String },
    Failed { error: String },
}

/// A definition file shape: `rule:` or `playbook:` at the root.
pub trait Definition: Sized {
    type Document: DeserializeOwned;

    const KIND: &'static str;

    fn from_document(doc: Self::Document) -> Self;

    fn id(&self) -> &str;

    fn validate(&self) -> Result<(), String>;
}

impl Definition for Rule {
    type Document = RuleDocument;
    const KIND: &'static str = "rule";

    fn from_document(doc: RuleDocument) -> Self {
        doc.rule
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), String> {
        Rule::validate(self)
    }
}

impl Definition for Playbook {
    type Document = PlaybookDocument;
    const KIND: &'static str = "playbook";

    fn from_document(doc: PlaybookDocument) -> Self {
        doc.playbook
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), String> {
        Playbook::validate(self)
    }
}

/// Parsed definitions in load order plus a per-file report.
#[derive(Debug)]
pub struct Loaded<T> {
    pub definitions: Vec<(PathBuf, T)>,
    pub results: Vec<LoadResult>,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

fn is_dotfile(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

/// Parse and validate a single definition file.
pub fn load_file<T: Definition>(path: &Path) -> Result<T, LoadError> {
    let contents = fs::read_to_string(path)?;
    let doc: T::Document = serde_yaml::from_str(&contents)?;
    let definition = T::from_document(doc);
    definition.validate().map_err(LoadError::Validation)?;
    Ok(definition)
}

/// Load every definition file in `dir`.
pub fn load_dir<T: Definition>(dir: &Path) -> Result<Loaded<T>, LoadError> {
    let directory_error = |source| LoadError::Directory {
        path: dir.display().to_string(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(directory_error)? {
        let path = entry.map_err(directory_error)?.path();
        if path.is_file() && is_yaml(&path) && !is_dotfile(&path) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut definitions = Vec::with_capacity(paths.len());
    let mut results = Vec::with_capacity(paths.len());
    for path in paths {
        match load_file::<T>(&path) {
            Ok(definition) => {
                tracing::info!(
                    kind = T::KIND,
                    id = definition.id(),
                    path = %path.display(),
                    "Loaded definition"
                );
                results.push(LoadResult {
                    path: path.clone(),
                    status: LoadStatus::Loaded {
                        id: definition.id().to_string(),
                    },
                });
                definitions.push((path, definition));
            }
            Err(e) => {
                tracing::warn!(
                    kind = T::KIND,
                    path = %path.display(),
                    error = %e,
                    "Failed to load definition file"
                );
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Failed {
                        error: e.to_string(),
                    },
                });
            }
        }
    }

    Ok(Loaded {
        definitions,
        results,
    })
}
