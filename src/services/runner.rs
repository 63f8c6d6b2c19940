//! Batch orchestration for works and days runs.
//!
//! Every top-level folder is planned and stamped independently on the rayon
//! pool with its own RNG, so one folder's failure or randomness never leaks
//! into a sibling.

use crate::config::Settings;
use crate::core::allocator::{Allocation, Allocator};
use crate::core::difference::DifferenceMetric;
use crate::core::grouper::{group_shots, Shot};
use crate::core::incident::IncidentError;
use crate::core::jitter::{folder_rng, pick_location, RandomJitter};
use crate::core::timestamp::{folder_date, leading_folder_date, normalize, Timestamp};
use crate::services::discovery::{discover_work, leaf_directories, list_candidates, WorkItem};
use crate::services::history::StampRecord;
use crate::services::stamper::StampSink;
use chrono::NaiveDate;
use indicatif::ProgressBar;
use rand::rngs::StdRng;
use rand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FolderError {
    #[error("No DD.MM.YYYY date in folder name {folder}")]
    MissingDate { folder: String },

    #[error(transparent)]
    Incident(#[from] IncidentError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FolderKind {
    Incident,
    Leaf,
    Day,
}

/// One photograph and the time it was given.
#[derive(Debug, Clone, Serialize)]
pub struct StampEntry {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub date: String,
    pub time: String,
    pub location: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub kind: FolderKind,
    pub stamps: Vec<StampEntry>,
    pub skipped: Vec<PathBuf>,
    pub error: Option<String>,
}

impl FolderReport {
    fn new(folder: &Path, kind: FolderKind) -> Self {
        Self {
            folder: folder.to_path_buf(),
            kind,
            stamps: Vec::new(),
            skipped: Vec::new(),
            error: None,
        }
    }

    fn failed(mut self, error: &FolderError) -> Self {
        log::error!("Skipping folder {}: {}", self.folder.display(), error);
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub seed: u64,
    pub folders: Vec<FolderReport>,
}

impl RunReport {
    pub fn stamped(&self) -> usize {
        self.entries().filter(|e| e.error.is_none()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries().filter(|e| e.error.is_some()).count()
    }

    pub fn failed_folders(&self) -> usize {
        self.folders.iter().filter(|f| f.error.is_some()).count()
    }

    /// History lines for every image that was actually written.
    pub fn history_records(&self) -> Vec<StampRecord> {
        self.entries()
            .filter_map(|e| {
                e.output.as_ref().map(|output| {
                    StampRecord::new(&e.source, output, e.date.clone(), e.time.clone(), &e.location)
                })
            })
            .collect()
    }

    fn entries(&self) -> impl Iterator<Item = &StampEntry> {
        self.folders.iter().flat_map(|f| f.stamps.iter())
    }
}

pub struct Runner<'a> {
    settings: &'a Settings,
    sink: &'a dyn StampSink,
    metric: &'a dyn DifferenceMetric,
    seed: u64,
    progress: Option<ProgressBar>,
}

impl<'a> Runner<'a> {
    pub fn new(
        settings: &'a Settings,
        sink: &'a dyn StampSink,
        metric: &'a dyn DifferenceMetric,
        seed: u64,
    ) -> Self {
        Self {
            settings,
            sink,
            metric,
            seed,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Stamp every incident and leaf folder directly under `root`.
    pub fn run_works(&self, root: &Path) -> std::io::Result<RunReport> {
        let items = discover_work(root)?;
        log::info!("Found {} top-level folder(s) in {}", items.len(), root.display());
        self.start_progress(items.len());

        let folders = items
            .par_iter()
            .map(|item| {
                let report = self.works_folder(root, item);
                self.tick();
                report
            })
            .collect();

        self.finish_progress();
        Ok(RunReport {
            seed: self.seed,
            folders,
        })
    }

    /// Stamp one photograph in every dated leaf folder under `root`.
    pub fn run_days(&self, root: &Path) -> RunReport {
        let dirs = leaf_directories(root);
        log::info!("Found {} leaf folder(s) in {}", dirs.len(), root.display());
        self.start_progress(dirs.len());

        let folders = dirs
            .par_iter()
            .map(|dir| {
                let report = self.day_folder(root, dir);
                self.tick();
                report
            })
            .collect();

        self.finish_progress();
        RunReport {
            seed: self.seed,
            folders,
        }
    }

    fn works_folder(&self, root: &Path, item: &WorkItem) -> FolderReport {
        let kind = match item {
            WorkItem::Incident { .. } => FolderKind::Incident,
            WorkItem::Leaf { .. } => FolderKind::Leaf,
        };
        let mut report = FolderReport::new(item.path(), kind);
        let mut rng = folder_rng(self.seed, root, item.path());

        let (date, allocation) = match self.plan(item, &mut rng) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                log::info!("No photographs in {}, skipping", item.path().display());
                return report;
            }
            Err(e) => return report.failed(&e),
        };

        for shot in &allocation.skipped {
            log::warn!("Extra arrival photo left unstamped: {}", shot.path.display());
        }
        report.skipped = allocation.skipped.into_iter().map(|s| s.path).collect();

        for (shot, seconds) in allocation.entries {
            let at = normalize(seconds, date);
            let location = pick_location(&self.settings.locations, &mut rng).unwrap_or_default();
            report.stamps.push(self.stamp(&shot.path, &at, location));
        }
        report
    }

    fn plan(&self, item: &WorkItem, rng: &mut StdRng) -> Result<Option<(NaiveDate, Allocation)>, FolderError> {
        let allocator = Allocator::new(self.settings.schedule);
        let mut jitter = RandomJitter::new(rng, self.settings.jitter_seconds);

        match item {
            WorkItem::Incident { path, stages } => {
                let grouped = stages
                    .iter()
                    .map(|stage| list_candidates(stage).map(group_shots))
                    .collect::<Result<Vec<Vec<Shot>>, _>>()?;
                if grouped.iter().all(Vec::is_empty) {
                    return Ok(None);
                }

                // the arrival stage carries the date, the incident folder is the fallback
                let date = stages
                    .first()
                    .and_then(|stage| date_of(stage))
                    .or_else(|| date_of(path))
                    .ok_or_else(|| missing_date(stages.first().unwrap_or(path)))?;

                let allocation =
                    allocator.incident(grouped, self.settings.policy, self.metric, &mut jitter)?;
                log::debug!(
                    "Allocated {} shot(s) for incident {}",
                    allocation.entries.len(),
                    path.display()
                );
                Ok(Some((date, allocation)))
            }
            WorkItem::Leaf { path } => {
                let shots = group_shots(list_candidates(path)?);
                if shots.is_empty() {
                    return Ok(None);
                }
                let date = date_of(path).ok_or_else(|| missing_date(path))?;

                let times = allocator.flat(&shots, self.metric, &mut jitter);
                Ok(Some((
                    date,
                    Allocation {
                        entries: shots.into_iter().zip(times).collect(),
                        skipped: Vec::new(),
                    },
                )))
            }
        }
    }

    fn day_folder(&self, root: &Path, dir: &Path) -> FolderReport {
        let mut report = FolderReport::new(dir, FolderKind::Day);
        let date = dir
            .file_name()
            .and_then(|n| leading_folder_date(&n.to_string_lossy()));
        let Some(date) = date else {
            log::warn!("Folder name {} does not start with a date, skipping", dir.display());
            return report;
        };

        let mut candidates = match list_candidates(dir) {
            Ok(candidates) => candidates,
            Err(e) => return report.failed(&FolderError::Io(e)),
        };
        candidates.sort();
        let Some(source) = longest_name(&candidates) else {
            log::info!("No photographs in {}, skipping", dir.display());
            return report;
        };

        let mut rng = folder_rng(self.seed, root, dir);
        let window = self.settings.schedule.window();
        let seconds = rng.random_range(window.start..=window.end());
        let at = normalize(seconds, date);
        let location = pick_location(&self.settings.locations, &mut rng).unwrap_or_default();
        report.stamps.push(self.stamp(source, &at, location));
        report
    }

    fn stamp(&self, source: &Path, at: &Timestamp, location: &str) -> StampEntry {
        let mut entry = StampEntry {
            source: source.to_path_buf(),
            output: None,
            date: at.date.format("%Y-%m-%d").to_string(),
            time: at.clock(),
            location: location.to_string(),
            error: None,
        };
        match self.sink.stamp(source, at, location) {
            Ok(output) => entry.output = output,
            Err(e) => {
                log::error!("Failed to stamp {}: {}", source.display(), e);
                entry.error = Some(e.to_string());
            }
        }
        entry
    }

    fn start_progress(&self, len: usize) {
        if let Some(pb) = &self.progress {
            pb.set_length(len as u64);
        }
    }

    fn tick(&self) {
        if let Some(pb) = &self.progress {
            pb.inc(1);
        }
    }

    fn finish_progress(&self) {
        if let Some(pb) = &self.progress {
            pb.finish_with_message("Done");
        }
    }
}

fn date_of(dir: &Path) -> Option<NaiveDate> {
    dir.file_name().and_then(|n| folder_date(&n.to_string_lossy()))
}

fn missing_date(dir: &Path) -> FolderError {
    FolderError::MissingDate {
        folder: dir.to_string_lossy().into_owned(),
    }
}

/// First path with the most characters in its file name.
fn longest_name(paths: &[PathBuf]) -> Option<&PathBuf> {
    let len = |p: &PathBuf| {
        p.file_name()
            .map(|n| n.to_string_lossy().chars().count())
            .unwrap_or(0)
    };
    paths.iter().fold(None, |best, p| match best {
        Some(b) if len(b) >= len(p) => Some(b),
        _ => Some(p),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::allocator::Schedule;
    use crate::core::incident::IncidentPolicy;
    use crate::services::stamper::StampError;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct ZeroMetric;

    impl DifferenceMetric for ZeroMetric {
        fn difference(&self, _a: &Path, _b: &Path) -> f64 {
            0.0
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<(String, Timestamp)>>,
        fail_on: Option<&'static str>,
    }

    impl RecordingSink {
        fn failing(name: &'static str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on: Some(name),
            }
        }

        fn names(&self) -> Vec<String> {
            let mut names: Vec<String> = self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect();
            names.sort();
            names
        }
    }

    impl StampSink for RecordingSink {
        fn stamp(&self, source: &Path, at: &Timestamp, _location: &str) -> Result<Option<PathBuf>, StampError> {
            let name = source.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_on == Some(name.as_str()) {
                return Err(StampError::InvalidPath { path: name });
            }
            self.calls.lock().unwrap().push((name, *at));
            Ok(Some(source.with_extension("out.png")))
        }
    }

    fn settings(jitter_seconds: i64, start: i64) -> Settings {
        Settings {
            root: PathBuf::from("."),
            schedule: Schedule {
                start,
                duration_before: 1_800,
                duration: 3_600,
            },
            jitter_seconds,
            locations: vec!["Depot".to_string(), "North gate".to_string()],
            policy: IncidentPolicy::StageTyped,
            font_path: None,
            max_dimension: 2000,
        }
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    fn clocks(report: &FolderReport) -> Vec<String> {
        report.stamps.iter().map(|s| format!("{} {}", s.date, s.time)).collect()
    }

    #[test]
    fn test_leaf_folder() {
        let temp_dir = TempDir::new().unwrap();
        let leaf = temp_dir.path().join("07.03.2024");
        for name in ["1_a.jpg", "1_a_long.jpg", "2_b.jpg", "3_c.png", "3_c_stamped.png", "notes.txt"] {
            touch(&leaf.join(name));
        }

        let settings = settings(0, 28_800);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        assert_eq!(report.folders.len(), 1);
        let folder = &report.folders[0];
        assert_eq!(folder.kind, FolderKind::Leaf);
        let sources: Vec<String> = folder
            .stamps
            .iter()
            .map(|s| s.source.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(sources, vec!["1_a_long.jpg", "2_b.jpg", "3_c.png"]);
        assert_eq!(
            clocks(folder),
            vec!["2024-03-07 08:00:00", "2024-03-07 08:30:00", "2024-03-07 09:30:00"]
        );
        assert!(folder.stamps.iter().all(|s| s.location == "Depot" || s.location == "North gate"));
        assert_eq!(report.stamped(), 3);
        assert_eq!(report.history_records().len(), 3);
    }

    #[test]
    fn test_incident_folder() {
        let temp_dir = TempDir::new().unwrap();
        let incident = temp_dir.path().join("1");
        touch(&incident.join("1 07.03.2024").join("arrive.jpg"));
        touch(&incident.join("1 07.03.2024").join("zz_extra.jpg"));
        touch(&incident.join("2").join("1_before.jpg"));
        touch(&incident.join("3").join("m1.jpg"));
        touch(&incident.join("3").join("m2.jpg"));

        let settings = settings(0, 28_800);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        let folder = &report.folders[0];
        assert_eq!(folder.kind, FolderKind::Incident);
        assert!(folder.error.is_none());
        assert_eq!(
            clocks(folder),
            vec![
                "2024-03-07 08:00:00",
                "2024-03-07 08:30:00",
                "2024-03-07 08:30:00",
                "2024-03-07 09:30:00"
            ]
        );
        assert_eq!(folder.skipped.len(), 1);
        assert!(sink.names().iter().all(|n| n != "zz_extra.jpg"));
    }

    #[test]
    fn test_flat_concatenation_policy() {
        let temp_dir = TempDir::new().unwrap();
        let incident = temp_dir.path().join("1");
        touch(&incident.join("1 07.03.2024").join("arrive.jpg"));
        touch(&incident.join("1 07.03.2024").join("zz_extra.jpg"));
        touch(&incident.join("2").join("1_before.jpg"));

        let mut settings = settings(0, 28_800);
        settings.policy = IncidentPolicy::FlatConcatenation;
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        assert_eq!(report.folders[0].stamps.len(), 3);
        assert!(report.folders[0].skipped.is_empty());
    }

    #[test]
    fn test_folder_errors_do_not_stop_siblings() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("misc").join("a.jpg"));
        touch(&temp_dir.path().join("2").join("1 07.03.2024").join("a.jpg"));
        touch(&temp_dir.path().join("2").join("2").join("2_main.jpg"));
        touch(&temp_dir.path().join("07.03.2024").join("a.jpg"));
        fs::create_dir_all(temp_dir.path().join("empty")).unwrap();

        let settings = settings(0, 28_800);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        assert_eq!(report.folders.len(), 4);
        assert_eq!(report.failed_folders(), 2);
        assert_eq!(report.stamped(), 1);

        let by_name = |name: &str| {
            report
                .folders
                .iter()
                .find(|f| f.folder.file_name().unwrap() == name)
                .unwrap()
        };
        assert!(by_name("misc").error.as_ref().unwrap().contains("date"));
        assert!(by_name("2").error.as_ref().unwrap().contains("before-work"));
        assert!(by_name("empty").error.is_none());
        assert!(by_name("empty").stamps.is_empty());
    }

    #[test]
    fn test_stamp_failure_is_recorded() {
        let temp_dir = TempDir::new().unwrap();
        let leaf = temp_dir.path().join("07.03.2024");
        touch(&leaf.join("1_a.jpg"));
        touch(&leaf.join("2_b.jpg"));

        let settings = settings(0, 28_800);
        let sink = RecordingSink::failing("1_a.jpg");
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        assert_eq!(report.stamped(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.history_records().len(), 1);
        assert_eq!(sink.names(), vec!["2_b.jpg"]);
    }

    #[test]
    fn test_late_start_rolls_into_next_day() {
        let temp_dir = TempDir::new().unwrap();
        let leaf = temp_dir.path().join("31.12.2024");
        touch(&leaf.join("1_a.jpg"));
        touch(&leaf.join("2_b.jpg"));

        let settings = settings(0, 23 * 3_600 + 50 * 60);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1)
            .run_works(temp_dir.path())
            .unwrap();

        assert_eq!(
            clocks(&report.folders[0]),
            vec!["2024-12-31 23:50:00", "2025-01-01 00:20:00"]
        );
    }

    #[test]
    fn test_seeded_runs_reproducible() {
        let temp_dir = TempDir::new().unwrap();
        for leaf in ["07.03.2024", "08.03.2024"] {
            for name in ["1_a.jpg", "2_b.jpg", "3_c.jpg", "4_d.jpg"] {
                touch(&temp_dir.path().join(leaf).join(name));
            }
        }

        let settings = settings(1_800, 28_800);
        let run = |seed| {
            let sink = RecordingSink::default();
            let report = Runner::new(&settings, &sink, &ZeroMetric, seed)
                .run_works(temp_dir.path())
                .unwrap();
            report
                .folders
                .iter()
                .flat_map(|f| f.stamps.iter().map(|s| (s.time.clone(), s.location.clone())))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(99), run(99));
        assert_eq!(run(99).len(), 8);
    }

    #[test]
    fn test_days_mode() {
        let temp_dir = TempDir::new().unwrap();
        let day = temp_dir.path().join("march").join("07.03.2024");
        touch(&day.join("a.jpg"));
        touch(&day.join("longest_name.jpg"));
        touch(&day.join("other_name.jpg"));
        touch(&temp_dir.path().join("march").join("undated").join("a.jpg"));
        fs::create_dir_all(temp_dir.path().join("09.03.2024")).unwrap();

        let settings = settings(0, 28_800);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 5).run_days(temp_dir.path());

        assert_eq!(report.folders.len(), 3);
        assert_eq!(sink.names(), vec!["longest_name.jpg"]);

        let calls = sink.calls.lock().unwrap();
        let at = calls[0].1;
        assert_eq!(at.date, NaiveDate::from_ymd_opt(2024, 3, 7).unwrap());
        assert!((28_800..=32_400).contains(&at.seconds));
    }

    #[test]
    fn test_days_same_named_leaves_draw_independently() {
        let temp_dir = TempDir::new().unwrap();
        for object in ["objA", "objB"] {
            touch(&temp_dir.path().join(object).join("07.03.2024").join("photo.jpg"));
        }

        let mut settings = settings(0, 28_800);
        settings.locations = (0..20).map(|i| format!("loc{i}")).collect();
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 12_345).run_days(temp_dir.path());

        let picks: Vec<(String, String)> = report
            .folders
            .iter()
            .map(|f| (f.stamps[0].time.clone(), f.stamps[0].location.clone()))
            .collect();
        assert_eq!(picks.len(), 2);
        assert_ne!(picks[0], picks[1]);
    }

    #[test]
    fn test_days_requires_leading_date() {
        let temp_dir = TempDir::new().unwrap();
        touch(&temp_dir.path().join("Report 07.03.2024 backup").join("a.jpg"));
        touch(&temp_dir.path().join("08.03.2024 site").join("b.jpg"));

        let settings = settings(0, 28_800);
        let sink = RecordingSink::default();
        let report = Runner::new(&settings, &sink, &ZeroMetric, 1).run_days(temp_dir.path());

        assert_eq!(report.folders.len(), 2);
        assert_eq!(sink.names(), vec!["b.jpg"]);
    }

    #[test]
    fn test_longest_name_keeps_first_on_tie() {
        let paths = vec![PathBuf::from("d/ab.jpg"), PathBuf::from("d/cd.jpg"), PathBuf::from("d/e.jpg")];
        assert_eq!(longest_name(&paths), Some(&paths[0]));
        assert_eq!(longest_name(&[]), None);
    }

    #[test]
    fn test_report_serializes() {
        let report = RunReport {
            seed: 3,
            folders: vec![FolderReport::new(Path::new("x"), FolderKind::Leaf)],
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"leaf\""));
        assert!(json.contains("\"seed\":3"));
    }
}
