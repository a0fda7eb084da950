use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::Intent;
use crate::traits::CorpusSource;

/// Reads one intent per JSON file below a corpus root.
pub struct FsCorpusSource {
    config: CorpusConfig,
}

impl FsCorpusSource {
    pub fn new(config: CorpusConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CorpusSource for FsCorpusSource {
    async fn get_intents(&self) -> Result<Vec<Intent>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || scan_corpus(&config)).await?
    }
}

pub fn scan_corpus(config: &CorpusConfig) -> Result<Vec<Intent>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files: Vec<(String, PathBuf)> = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        files.push((rel_str, path.to_path_buf()));
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut seen = HashSet::new();
    let mut intents = Vec::with_capacity(files.len());
    for (rel_str, path) in files {
        let intent = read_intent(&path).with_context(|| format!("Invalid intent file: {}", rel_str))?;
        if !seen.insert(intent.name.clone()) {
            bail!("Duplicate intent '{}' in {}", intent.name, rel_str);
        }
        intents.push(intent);
    }

    tracing::debug!(root = %root.display(), intents = intents.len(), "corpus scanned");
    Ok(intents)
}

fn read_intent(path: &Path) -> Result<Intent> {
    let content = std::fs::read_to_string(path)?;
    let intent: Intent = serde_json::from_str(&content)?;
    if intent.name.trim().is_empty() {
        bail!("intent name must not be empty");
    }
    Ok(intent)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
