//! Snapshot of the environment the checks run against.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;

/// Name of the search-path variable.
pub const SEARCH_PATH_VAR: &str = "PATH";

/// Environment variables and the split search path, captured once per pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    vars: BTreeMap<String, String>,
    search_path: Vec<PathBuf>,
}

impl HostEnvironment {
    /// Capture the current process environment.
    ///
    /// Variables that are not valid Unicode are left out, except the search
    /// path, which is split as the platform stores it.
    pub fn from_process() -> Self {
        Self::from_vars_os(std::env::vars_os())
    }

    /// Build from raw variable pairs, as the process environment yields them.
    pub fn from_vars_os<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut search_path = None;
        let mut text = BTreeMap::new();
        for (key, value) in vars {
            let Ok(key) = key.into_string() else {
                continue;
            };
            if key.eq_ignore_ascii_case(SEARCH_PATH_VAR) {
                search_path = Some(split_search_path(&value));
            }
            if let Ok(value) = value.into_string() {
                text.insert(key, value);
            }
        }
        Self {
            vars: text,
            search_path: search_path.unwrap_or_default(),
        }
    }

    /// Build from explicit variable pairs. The search path is read from
    /// `PATH`, matched without regard to case.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_vars_os(
            vars.into_iter()
                .map(|(k, v)| (OsString::from(k.into()), OsString::from(v.into()))),
        )
    }

    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// The first search-path directory that directly contains `file_name`.
    pub fn find_in_path(&self, file_name: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|dir| dir.join(file_name))
            .find(|candidate| candidate.is_file())
    }
}

fn split_search_path(value: &OsStr) -> Vec<PathBuf> {
    std::env::split_paths(value)
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}
