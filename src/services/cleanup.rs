use crate::services::discovery::{has_extension, is_stamped, leaf_directories};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Formats considered for landscape rotation.
pub const ROTATABLE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "tiff"];

/// Files under `root` that a previous run generated.
pub fn find_stamped(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_stamped(entry.path()))
        .map(|entry| entry.into_path())
        .collect()
}

/// Delete every generated file under `root`. Returns how many were removed.
pub fn remove_stamped(root: &Path) -> usize {
    let mut removed = 0;
    for path in find_stamped(root) {
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Removed stamped image: {}", path.display());
                removed += 1;
            }
            Err(e) => log::error!("Error removing file {}: {}", path.display(), e),
        }
    }
    removed
}

/// Rotate landscape photographs in leaf folders a quarter turn clockwise,
/// in place. Returns how many files were rotated.
pub fn rotate_landscape(root: &Path) -> usize {
    let mut rotated = 0;
    for dir in leaf_directories(root) {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::error!("Error reading {}: {}", dir.display(), e);
                continue;
            }
        };
        for path in entries.filter_map(Result::ok).map(|e| e.path()) {
            if !path.is_file() || !has_extension(&path, &ROTATABLE_EXTENSIONS) {
                continue;
            }
            match rotate_if_landscape(&path) {
                Ok(true) => {
                    log::info!("Rotated image: {}", path.display());
                    rotated += 1;
                }
                Ok(false) => {}
                Err(e) => log::error!("Error processing file {}: {}", path.display(), e),
            }
        }
    }
    rotated
}

/// Which pre-stamping passes to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prepare {
    pub clean: bool,
    pub rotate: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Prepared {
    pub removed: usize,
    pub rotated: usize,
}

/// Drop earlier outputs, then turn landscape photos upright.
pub fn prepare(root: &Path, passes: Prepare) -> Prepared {
    let mut done = Prepared::default();
    if passes.clean {
        done.removed = remove_stamped(root);
    }
    if passes.rotate {
        done.rotated = rotate_landscape(root);
    }
    done
}

fn rotate_if_landscape(path: &Path) -> Result<bool, image::ImageError> {
    let img = image::open(path)?;
    if img.width() <= img.height() {
        return Ok(false);
    }
    img.rotate90().save(path)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn create_test_image(path: &Path, width: u32, height: u32) {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        img.save(path).unwrap();
    }

    #[test]
    fn test_remove_stamped() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("1").join("2");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("a.jpg"), b"x").unwrap();
        fs::write(nested.join("a_stamped.png"), b"x").unwrap();
        fs::write(temp_dir.path().join("b_Stamped.png"), b"x").unwrap();

        assert_eq!(find_stamped(temp_dir.path()).len(), 2);
        assert_eq!(remove_stamped(temp_dir.path()), 2);
        assert!(nested.join("a.jpg").exists());
        assert!(!nested.join("a_stamped.png").exists());
        assert_eq!(remove_stamped(temp_dir.path()), 0);
    }

    #[test]
    fn test_rotate_landscape() {
        let temp_dir = TempDir::new().unwrap();
        let leaf = temp_dir.path().join("07.03.2024");
        fs::create_dir_all(&leaf).unwrap();
        create_test_image(&leaf.join("wide.png"), 40, 20);
        create_test_image(&leaf.join("tall.png"), 20, 40);
        fs::write(leaf.join("broken.jpg"), b"not an image").unwrap();

        assert_eq!(rotate_landscape(temp_dir.path()), 1);
        let wide = image::open(leaf.join("wide.png")).unwrap();
        assert_eq!((wide.width(), wide.height()), (20, 40));
        let tall = image::open(leaf.join("tall.png")).unwrap();
        assert_eq!((tall.width(), tall.height()), (20, 40));
    }

    #[test]
    fn test_prepare_passes() {
        let temp_dir = TempDir::new().unwrap();
        let leaf = temp_dir.path().join("07.03.2024");
        fs::create_dir_all(&leaf).unwrap();
        create_test_image(&leaf.join("wide.png"), 40, 20);
        create_test_image(&leaf.join("wide_stamped.png"), 20, 40);

        let done = prepare(temp_dir.path(), Prepare { clean: false, rotate: false });
        assert_eq!(done, Prepared::default());
        assert!(leaf.join("wide_stamped.png").exists());

        let done = prepare(temp_dir.path(), Prepare { clean: true, rotate: true });
        assert_eq!(done, Prepared { removed: 1, rotated: 1 });
        assert!(!leaf.join("wide_stamped.png").exists());
        let wide = image::open(leaf.join("wide.png")).unwrap();
        assert_eq!((wide.width(), wide.height()), (20, 40));
    }
}
