//! Baseline registry
//!
//! Loads, validates and indexes named baselines. Validation is fail-fast:
//! a document with any bad entry is rejected whole, and a directory load
//! stops at the first bad document.

pub mod document;
pub mod validation;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::error::BaselineError;
use crate::models::Baseline;

pub use document::parse_baseline;
pub use validation::BaselineBuilder;

/// Name of the baseline shipped with the crate
pub const BUILTIN_BASELINE: &str = "posture-recommended";

const BUILTIN_DOCUMENT: &str = include_str!("builtin.json");

#[derive(Debug, Default, Clone)]
pub struct BaselineRegistry {
    baselines: BTreeMap<String, Arc<Baseline>>,
}

impl BaselineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the shipped baseline
    pub fn with_builtin() -> Result<Self, BaselineError> {
        let mut registry = Self::new();
        registry.load_baseline(BUILTIN_DOCUMENT)?;
        Ok(registry)
    }

    /// Parse, validate and register a baseline document
    pub fn load_baseline(&mut self, content: &str) -> Result<Arc<Baseline>, BaselineError> {
        let baseline = parse_baseline(content, Path::new("<inline>"))?;
        self.insert(baseline)
    }

    pub fn load_file(&mut self, path: &Path) -> Result<Arc<Baseline>, BaselineError> {
        let content = std::fs::read_to_string(path).map_err(|e| BaselineError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let baseline = parse_baseline(&content, path)?;
        self.insert(baseline)
    }

    /// Load every `*.json` document under `dir`, recursively, in path order
    pub fn load_dir(&mut self, dir: &Path) -> Result<Vec<Arc<Baseline>>, BaselineError> {
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| BaselineError::Io {
                path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
                message: e.to_string(),
            })?;
            let path = entry.path();
            if entry.file_type().is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path.to_path_buf());
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            loaded.push(self.load_file(&path)?);
        }

        tracing::info!(dir = %dir.display(), count = loaded.len(), "Loaded baselines");
        Ok(loaded)
    }

    /// Register an already-built baseline. Names are unique per registry.
    pub fn insert(&mut self, baseline: Baseline) -> Result<Arc<Baseline>, BaselineError> {
        if self.baselines.contains_key(&baseline.name) {
            return Err(BaselineError::validation(
                &baseline.name,
                "a baseline with this name is already registered",
            ));
        }
        let baseline = Arc::new(baseline);
        self.baselines.insert(baseline.name.clone(), Arc::clone(&baseline));
        Ok(baseline)
    }

    pub fn get_baseline(&self, name: &str) -> Result<Arc<Baseline>, BaselineError> {
        self.baselines
            .get(name)
            .cloned()
            .ok_or_else(|| BaselineError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.baselines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.baselines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baselines.is_empty()
    }
}
