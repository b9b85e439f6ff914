//! Explicit environment map used for `env("VAR")` substitution.
//!
//! `.env` files are read into this map instead of being exported into the
//! process, so resolving a datasource never mutates global state.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct Environment {
    vars: HashMap<String, String>,
    loaded: Vec<PathBuf>,
}

impl Environment {
    /// Snapshot of the current process environment. Variables whose name or
    /// value is not valid UTF-8 are skipped.
    pub fn from_process() -> Self {
        Self::from_os_vars(std::env::vars_os())
    }

    fn from_os_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        Self {
            vars: vars
                .into_iter()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
            loaded: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            loaded: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Merge a `.env` file. Values already present win, so load files in
    /// priority order. Returns `false` when the file does not exist or was
    /// already loaded.
    pub fn load_file(&mut self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Ok(false);
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self
            .loaded
            .iter()
            .any(|p| p.canonicalize().unwrap_or_else(|_| p.clone()) == canonical)
        {
            return Ok(false);
        }

        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for item in iter {
            let (key, value) =
                item.with_context(|| format!("Failed to parse {}", path.display()))?;
            self.vars.entry(key).or_insert(value);
        }
        self.loaded.push(path.to_path_buf());
        Ok(true)
    }

    /// Files merged so far, in load order.
    #[cfg(test)]
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded
    }
}
