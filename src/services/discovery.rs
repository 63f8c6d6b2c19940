use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Extensions accepted as photographs to stamp.
pub const CANDIDATE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Marker inserted into the names of generated files.
pub const STAMPED_MARKER: &str = "_stamped";

static STAGE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)").expect("static regex"));

/// One top-level folder under the run root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Folder with ordered stage sub-folders.
    Incident { path: PathBuf, stages: Vec<PathBuf> },
    /// Folder holding photographs directly.
    Leaf { path: PathBuf },
}

impl WorkItem {
    pub fn path(&self) -> &Path {
        match self {
            WorkItem::Incident { path, .. } | WorkItem::Leaf { path } => path,
        }
    }
}

fn lower_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| allowed.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn is_stamped(path: &Path) -> bool {
    lower_name(path).contains(STAMPED_MARKER)
}

pub fn is_candidate(path: &Path) -> bool {
    has_extension(path, &CANDIDATE_EXTENSIONS) && !is_stamped(path)
}

/// Photographs directly inside `dir`, excluding generated output.
pub fn list_candidates(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && is_candidate(&path) {
            found.push(path);
        }
    }
    Ok(found)
}

/// Leading integer of a stage folder name.
pub fn stage_number(name: &str) -> Option<u64> {
    STAGE_NUMBER
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Numbered folders first, by number; the rest by name.
pub fn compare_stages(a: &Path, b: &Path) -> Ordering {
    let (na, nb) = (lower_name(a), lower_name(b));
    match (stage_number(&na), stage_number(&nb)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| na.cmp(&nb)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => na.cmp(&nb),
    }
}

/// Immediate sub-directories of `dir` in stage order.
pub fn subdirectories(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort_by(|a, b| compare_stages(a, b));
    Ok(dirs)
}

/// Classify every directory directly under `root`.
pub fn discover_work(root: &Path) -> std::io::Result<Vec<WorkItem>> {
    let mut items = Vec::new();
    for path in subdirectories(root)? {
        let stages = subdirectories(&path)?;
        if stages.is_empty() {
            items.push(WorkItem::Leaf { path });
        } else {
            items.push(WorkItem::Incident { path, stages });
        }
    }
    Ok(items)
}

/// Every directory under `root` (itself included) without sub-directories.
pub fn leaf_directories(root: &Path) -> Vec<PathBuf> {
    let mut leaves: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            fs::read_dir(entry.path())
                .map(|mut it| !it.any(|e| e.map(|e| e.path().is_dir()).unwrap_or(false)))
                .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();
    leaves.sort();
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate(Path::new("a/1_x.JPG")));
        assert!(is_candidate(Path::new("a/b.jpeg")));
        assert!(is_candidate(Path::new("a/b.png")));
        assert!(!is_candidate(Path::new("a/b.bmp")));
        assert!(!is_candidate(Path::new("a/b_stamped.png")));
        assert!(!is_candidate(Path::new("a/b_STAMPED.jpg")));
        assert!(!is_candidate(Path::new("a/noext")));
    }

    #[test]
    fn test_list_candidates() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("1_a.jpg"));
        touch(&root.join("1_a_stamped.png"));
        touch(&root.join("notes.txt"));
        fs::create_dir(root.join("nested.jpg")).unwrap();

        let found = list_candidates(root).unwrap();
        assert_eq!(found, vec![root.join("1_a.jpg")]);
    }

    #[test]
    fn test_stage_order() {
        let mut dirs = vec![
            PathBuf::from("10 later"),
            PathBuf::from("misc"),
            PathBuf::from("2 before"),
            PathBuf::from("1 07.03.2024"),
            PathBuf::from("Attic"),
        ];
        dirs.sort_by(|a, b| compare_stages(a, b));
        let names: Vec<String> = dirs.iter().map(|d| d.to_string_lossy().into_owned()).collect();
        assert_eq!(names, vec!["1 07.03.2024", "2 before", "10 later", "Attic", "misc"]);
        assert_eq!(stage_number("03 work"), Some(3));
        assert_eq!(stage_number("work 3"), None);
    }

    #[test]
    fn test_discover_work() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(&root.join("1").join("1 07.03.2024").join("a.jpg"));
        touch(&root.join("1").join("2").join("b.jpg"));
        touch(&root.join("08.03.2024").join("c.jpg"));
        touch(&root.join("loose.jpg"));

        let items = discover_work(root).unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            WorkItem::Incident { path, stages } => {
                assert_eq!(path, &root.join("1"));
                assert_eq!(
                    stages,
                    &vec![root.join("1").join("1 07.03.2024"), root.join("1").join("2")]
                );
            }
            other => panic!("expected incident, got {:?}", other),
        }
        // "08.03.2024" sorts by its leading 8
        assert_eq!(
            items[1],
            WorkItem::Leaf {
                path: root.join("08.03.2024")
            }
        );
    }

    #[test]
    fn test_leaf_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a").join("b")).unwrap();
        fs::create_dir_all(root.join("c")).unwrap();
        touch(&root.join("a").join("top.jpg"));

        let leaves = leaf_directories(root);
        assert_eq!(leaves, vec![root.join("a").join("b"), root.join("c")]);
    }
}
