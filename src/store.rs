// SPDX-License-Identifier: BSD-3-Clause
//! Persisted facts shared between functions and translation units.
//!
//! Three tables, all append-only from the analysis' point of view:
//!
//! - summaries: "parameter P of F has capacity equal to parameter Q", either
//!   observed at one call site ([`Origin::CallerInfo`]) or holding for every
//!   caller ([`Origin::CallImplies`], [`Origin::ReturnImplies`]),
//! - call sites: every direct call, so a callee can tell how many of its
//!   callers said nothing about a parameter,
//! - array limits: variables known to bound some array, used by the
//!   off-by-one check.
//!
//! Relations and limit kinds are stored as text and codes, the way they are
//! exchanged with other tools, and are parsed by the consumer.

use std::{
    collections::{BTreeSet, HashSet},
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::place::QualifiedName;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Couldn't access fact store {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed fact store {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(
    Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    CallerInfo,
    CallImplies,
    ReturnImplies,
}

/// A call expression inside a function.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Caller {
    pub function: String,
    pub call: u32,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SummaryRow {
    pub origin: Origin,
    /// File the row was derived from.
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller: Option<Caller>,
    /// Function the row describes.
    pub function: String,
    #[serde(default)]
    pub is_static: bool,
    pub limit_kind: u32,
    pub param: usize,
    pub key: String,
    pub value: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSite {
    pub file: String,
    pub caller: Caller,
    pub callee: String,
    #[serde(default)]
    pub is_static: bool,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayLimit {
    pub file: String,
    pub limit: QualifiedName,
    /// `None` when the owner is unknown; such a limit bounds every array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<QualifiedName>,
    pub kind: u32,
}

/// Identifies a function for lookups. Static functions only match rows from
/// their own file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionKey<'a> {
    pub file: &'a str,
    pub name: &'a str,
    pub is_static: bool,
}

impl FunctionKey<'_> {
    fn matches(&self, file: &str, name: &str, is_static: bool) -> bool {
        self.name == name && self.is_static == is_static && (!is_static || self.file == file)
    }
}

pub trait FactStore {
    fn insert_summary(&mut self, row: SummaryRow);

    fn insert_call(&mut self, site: CallSite);

    fn insert_array_limit(&mut self, row: ArrayLimit);

    fn summaries(&self, function: &FunctionKey<'_>) -> Vec<SummaryRow>;

    fn call_sites(&self, function: &FunctionKey<'_>) -> Vec<CallSite>;

    /// Whether `candidate` is a recorded limit of `array` (or of every array,
    /// when either owner is unknown).
    fn is_array_limit(&self, array: Option<&QualifiedName>, candidate: &QualifiedName) -> bool;
}

// ------------------------------------------------------------------
// In-memory store

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStore {
    #[serde(default)]
    pub summaries: BTreeSet<SummaryRow>,
    #[serde(default)]
    pub calls: BTreeSet<CallSite>,
    #[serde(default)]
    pub array_limits: BTreeSet<ArrayLimit>,
}

impl MemoryStore {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.calls.is_empty() && self.array_limits.is_empty()
    }

    /// Files that contributed at least one row.
    pub fn files(&self) -> HashSet<&str> {
        self.summaries
            .iter()
            .map(|r| r.file.as_str())
            .chain(self.calls.iter().map(|r| r.file.as_str()))
            .chain(self.array_limits.iter().map(|r| r.file.as_str()))
            .collect()
    }

    fn remove_files(&mut self, files: &HashSet<&str>) {
        self.summaries.retain(|r| !files.contains(r.file.as_str()));
        self.calls.retain(|r| !files.contains(r.file.as_str()));
        self.array_limits
            .retain(|r| !files.contains(r.file.as_str()));
    }

    /// Missing files are empty stores.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MemoryStore::default()),
            Err(source) => {
                return Err(Error::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&text).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let text = serde_json::to_string_pretty(self).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, text).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FactStore for MemoryStore {
    fn insert_summary(&mut self, row: SummaryRow) {
        self.summaries.insert(row);
    }

    fn insert_call(&mut self, site: CallSite) {
        self.calls.insert(site);
    }

    fn insert_array_limit(&mut self, row: ArrayLimit) {
        self.array_limits.insert(row);
    }

    fn summaries(&self, function: &FunctionKey<'_>) -> Vec<SummaryRow> {
        self.summaries
            .iter()
            .filter(|r| function.matches(&r.file, &r.function, r.is_static))
            .cloned()
            .collect()
    }

    fn call_sites(&self, function: &FunctionKey<'_>) -> Vec<CallSite> {
        self.calls
            .iter()
            .filter(|r| function.matches(&r.file, &r.callee, r.is_static))
            .cloned()
            .collect()
    }

    fn is_array_limit(&self, array: Option<&QualifiedName>, candidate: &QualifiedName) -> bool {
        self.array_limits.iter().any(|r| {
            r.limit == *candidate
                && (array.is_none() || r.array.is_none() || r.array.as_ref() == array)
        })
    }
}

// ------------------------------------------------------------------
// JSON-file-backed store

/// A [`MemoryStore`] that lives in a JSON file between runs.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    store: MemoryStore,
}

impl JsonStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let store = MemoryStore::load(&path)?;
        Ok(JsonStore { path, store })
    }

    pub fn save(&self) -> Result<(), Error> {
        self.store.save(&self.path)
    }

    #[inline]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

impl FactStore for JsonStore {
    fn insert_summary(&mut self, row: SummaryRow) {
        self.store.insert_summary(row)
    }

    fn insert_call(&mut self, site: CallSite) {
        self.store.insert_call(site)
    }

    fn insert_array_limit(&mut self, row: ArrayLimit) {
        self.store.insert_array_limit(row)
    }

    fn summaries(&self, function: &FunctionKey<'_>) -> Vec<SummaryRow> {
        self.store.summaries(function)
    }

    fn call_sites(&self, function: &FunctionKey<'_>) -> Vec<CallSite> {
        self.store.call_sites(function)
    }

    fn is_array_limit(&self, array: Option<&QualifiedName>, candidate: &QualifiedName) -> bool {
        self.store.is_array_limit(array, candidate)
    }
}

// ------------------------------------------------------------------
// Batch loading

/// Combines per-file stores. Rows derived from a file are replaced wholesale
/// by any later input that also has rows from that file, so re-merging an
/// input is a no-op and inputs from different files commute.
pub fn merge<'a>(inputs: impl IntoIterator<Item = &'a MemoryStore>) -> MemoryStore {
    let mut out = MemoryStore::default();
    for input in inputs {
        let files = input.files();
        out.remove_files(&files);
        out.summaries.extend(input.summaries.iter().cloned());
        out.calls.extend(input.calls.iter().cloned());
        out.array_limits
            .extend(input.array_limits.iter().cloned());
    }
    out
}
