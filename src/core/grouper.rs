//! Burst-shot collapsing.
//! Files sharing a leading digits/underscores prefix are treated as takes of
//! the same subject; the one with the longest file name represents them.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\d_]+").expect("static regex"));

/// One deduplicated photograph fed to the allocator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shot {
    pub path: PathBuf,
}

impl Shot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn file_name(&self) -> String {
        file_name(&self.path)
    }

    fn sort_key(&self) -> String {
        self.file_name().to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub key: String,
}

impl Candidate {
    pub fn new(path: PathBuf) -> Self {
        let key = prefix_key(&file_name(&path));
        Self { path, key }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Leading run of digits/underscores with trailing underscores removed.
///
/// Falls back to the whole file name only when there is no such run. A run
/// of underscores alone yields the empty key, so those files share a group.
pub fn prefix_key(file_name: &str) -> String {
    match PREFIX.find(file_name) {
        Some(m) => m.as_str().trim_end_matches('_').to_string(),
        None => file_name.to_string(),
    }
}

/// Keep one path per prefix key: the one with the longest file name.
///
/// Ties keep the first path seen. The output order is unspecified.
pub fn group<I>(candidates: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut best: HashMap<String, Candidate> = HashMap::new();

    for path in candidates {
        let candidate = Candidate::new(path);
        match best.get_mut(&candidate.key) {
            Some(current) => {
                let current_len = file_name(&current.path).chars().count();
                let new_len = file_name(&candidate.path).chars().count();
                if new_len > current_len {
                    *current = candidate;
                }
            }
            None => {
                best.insert(candidate.key.clone(), candidate);
            }
        }
    }

    best.into_values().map(|c| c.path).collect()
}

/// Group, then order case-insensitively by file name.
pub fn group_shots<I>(candidates: I) -> Vec<Shot>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut shots: Vec<Shot> = group(candidates).into_iter().map(Shot::new).collect();
    sort_shots(&mut shots);
    shots
}

pub fn sort_shots(shots: &mut [Shot]) {
    shots.sort_by(|a, b| {
        a.sort_key()
            .cmp(&b.sort_key())
            .then_with(|| a.path.cmp(&b.path))
    });
}
