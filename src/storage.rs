//! Finding, reading and writing artifacts.

use anyhow::{Context, Result};
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FileSettings;

/// Which artifacts to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every stylesheet, minified variants included.
    Stylesheets,
    /// Stylesheets that are not minified variants.
    SourceStylesheets,
    Scripts,
}

/// Storage the batch coordinator loads from and writes to.
pub trait Storage: Sync {
    fn list(&self, selection: Selection) -> Result<Vec<PathBuf>>;
    fn read(&self, path: &Path) -> Result<String>;
    fn write(&self, path: &Path, contents: &str) -> Result<()>;
}

/// Artifacts on disk below a root directory, selected by glob.
pub struct FsStorage {
    root: PathBuf,
    files: FileSettings,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>, files: FileSettings) -> Self {
        Self {
            root: root.into(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn globs(&self, selection: Selection) -> Vec<String> {
        match selection {
            Selection::Stylesheets => self.files.stylesheets.clone(),
            Selection::SourceStylesheets => {
                let mut globs = self.files.stylesheets.clone();
                globs.push(format!("!**/*{}", self.files.minified_suffix));
                globs
            }
            Selection::Scripts => self.files.scripts.clone(),
        }
    }
}

impl Storage for FsStorage {
    fn list(&self, selection: Selection) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            anyhow::bail!("{} is not a directory", self.root.display());
        }

        let mut overrides = OverrideBuilder::new(&self.root);
        for glob in self.globs(selection) {
            overrides
                .add(&glob)
                .with_context(|| format!("Invalid file pattern '{}'", glob))?;
        }
        let overrides = overrides.build().context("Failed to build file patterns")?;

        // Build output is usually gitignored, so ignore files must not apply.
        let walker = WalkBuilder::new(&self.root)
            .hidden(false)
            .git_ignore(false)
            .ignore(false)
            .git_global(false)
            .git_exclude(false)
            .parents(false)
            .overrides(overrides)
            .build();

        let mut paths = Vec::new();
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    eprintln!("Warning: Failed to access entry: {}", err);
                    continue;
                }
            };
            if entry.file_type().is_some_and(|ft| ft.is_file()) {
                paths.push(entry.into_path());
            }
        }

        paths.sort();
        Ok(paths)
    }

    fn read(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }
}
