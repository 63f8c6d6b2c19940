//! Stage handling for incident folders. An incident is a folder of ordered
//! stage sub-folders: 0 = arrival, 1 = before work, 2+ = during work.

use crate::core::grouper::Shot;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IncidentError {
    #[error("No start photo in the first stage folder")]
    MissingStart,

    #[error("No before-work photo in the second stage folder")]
    MissingBefore,
}

/// How the shots of an incident are turned into a timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentPolicy {
    /// Arrival, before-work and main-window shots are timed separately.
    #[default]
    StageTyped,
    /// All stages form one sequence timed like a leaf folder.
    FlatConcatenation,
}

/// Shots of one incident sorted into their roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedShots {
    pub start: Shot,
    pub before: Shot,
    pub main: Vec<Shot>,
    /// Extra arrival shots that get no timestamp.
    pub skipped: Vec<Shot>,
}

impl StagedShots {
    /// Shots in timeline order: start, before, then the main window.
    pub fn ordered(&self) -> Vec<Shot> {
        let mut shots = Vec::with_capacity(self.main.len() + 2);
        shots.push(self.start.clone());
        shots.push(self.before.clone());
        shots.extend(self.main.iter().cloned());
        shots
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BeforeMarker {
    Before,
    Main,
    Unmarked,
}

fn before_marker(shot: &Shot) -> BeforeMarker {
    let name = shot.file_name();
    if name.starts_with("1_") {
        BeforeMarker::Before
    } else if name.starts_with("2_") {
        BeforeMarker::Main
    } else {
        BeforeMarker::Unmarked
    }
}

/// Assign roles to per-stage shot lists.
///
/// `stages` is positional: an empty first stage means there is no start shot
/// even when later stages are populated. Each stage must already be grouped
/// and sorted.
pub fn classify(stages: Vec<Vec<Shot>>) -> Result<StagedShots, IncidentError> {
    let mut stages = stages.into_iter();

    let mut arrival = stages.next().unwrap_or_default().into_iter();
    let start = arrival.next().ok_or(IncidentError::MissingStart)?;
    let skipped: Vec<Shot> = arrival.collect();

    let mut before: Option<Shot> = None;
    let mut main = Vec::new();
    for shot in stages.next().unwrap_or_default() {
        match before_marker(&shot) {
            BeforeMarker::Main => main.push(shot),
            _ if before.is_none() => before = Some(shot),
            _ => main.push(shot),
        }
    }
    let before = before.ok_or(IncidentError::MissingBefore)?;

    for stage in stages {
        main.extend(stage);
    }

    Ok(StagedShots {
        start,
        before,
        main,
        skipped,
    })
}

/// Stage lists joined in stage order.
pub fn concatenate(stages: Vec<Vec<Shot>>) -> Vec<Shot> {
    stages.into_iter().flatten().collect()
}
