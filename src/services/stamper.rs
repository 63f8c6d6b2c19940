use crate::config::Settings;
use crate::core::timestamp::Timestamp;
use crate::services::discovery::STAMPED_MARKER;
use image::{DynamicImage, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fonts tried when the configuration does not name one.
pub const DEFAULT_FONT_CANDIDATES: [&str; 6] = [
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const FONT_SIZE_RATIO: f32 = 0.031;
const PADDING_RATIO: f32 = 0.004;
const LINE_SPACING_RATIO: f32 = 0.28;
const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Error)]
pub enum StampError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    #[error("Unusable font {path}")]
    Font { path: String },

    #[error("No usable font found (tried {tried:?})")]
    NoFont { tried: Vec<String> },
}

/// Consumer of one synthesized timestamp per photograph.
pub trait StampSink: Sync {
    /// Returns the written output file, if any.
    fn stamp(&self, source: &Path, at: &Timestamp, location: &str) -> Result<Option<PathBuf>, StampError>;
}

/// Writes nothing; used for plan-only runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunSink;

impl StampSink for DryRunSink {
    fn stamp(&self, source: &Path, at: &Timestamp, location: &str) -> Result<Option<PathBuf>, StampError> {
        log::debug!(
            "[dry-run] {} -> {} @ {}",
            source.display(),
            at,
            location.replace('\n', " / ")
        );
        Ok(None)
    }
}

/// `<dir>/<stem>_stamped.png`
pub fn output_path(source: &Path) -> Result<PathBuf, StampError> {
    let stem = source
        .file_stem()
        .ok_or_else(|| StampError::InvalidPath {
            path: source.to_string_lossy().to_string(),
        })?
        .to_string_lossy();
    let name = format!("{}{}.png", stem, STAMPED_MARKER);
    Ok(match source.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    })
}

/// Text block drawn onto a picture: the date/time line, then the location.
pub fn stamp_lines(at: &Timestamp, location: &str) -> Vec<String> {
    let mut lines = vec![at.label()];
    lines.extend(location.split('\n').map(str::to_string));
    lines
}

/// Burns the timestamp and location into the top-right corner.
pub struct TextStamper {
    font: Font<'static>,
    max_dimension: u32,
}

impl TextStamper {
    pub fn new(font: Font<'static>, max_dimension: u32) -> Self {
        Self {
            font,
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn from_font_file(path: &Path, max_dimension: u32) -> Result<Self, StampError> {
        let bytes = fs::read(path)?;
        let font = Font::try_from_vec(bytes).ok_or_else(|| StampError::Font {
            path: path.to_string_lossy().to_string(),
        })?;
        log::info!("Loaded stamp font: {}", path.display());
        Ok(Self::new(font, max_dimension))
    }

    /// Configured font, else the first usable system candidate.
    pub fn from_settings(settings: &Settings) -> Result<Self, StampError> {
        if let Some(path) = &settings.font_path {
            return Self::from_font_file(path, settings.max_dimension);
        }

        for candidate in DEFAULT_FONT_CANDIDATES {
            let path = Path::new(candidate);
            if !path.is_file() {
                continue;
            }
            match Self::from_font_file(path, settings.max_dimension) {
                Ok(stamper) => return Ok(stamper),
                Err(e) => log::warn!("Failed to load font candidate {}: {}", candidate, e),
            }
        }

        Err(StampError::NoFont {
            tried: DEFAULT_FONT_CANDIDATES.iter().map(|s| s.to_string()).collect(),
        })
    }

    pub fn render(&self, img: DynamicImage, lines: &[String]) -> RgbaImage {
        let img = if img.width() > self.max_dimension || img.height() > self.max_dimension {
            img.thumbnail(self.max_dimension, self.max_dimension)
        } else {
            img
        };
        let mut canvas = img.to_rgba8();
        let (width, height) = canvas.dimensions();

        let font_size = (height as f32 * FONT_SIZE_RATIO).floor().max(1.0);
        let scale = Scale::uniform(font_size);
        let padding_x = width as f32 * PADDING_RATIO;
        let padding_y = height as f32 * PADDING_RATIO;

        let mut baseline = padding_y + font_size;
        for line in lines {
            let ink = self.measure(line, scale);
            if let Some(ink) = ink {
                let x = width as f32 - padding_x - ink.width() - ink.min_x;
                self.draw_line(&mut canvas, line, scale, x, baseline);
            }
            let ink_height = ink.map(|i| i.height()).unwrap_or(0.0);
            baseline += ink_height + font_size * LINE_SPACING_RATIO;
        }

        canvas
    }

    fn measure(&self, text: &str, scale: Scale) -> Option<Ink> {
        self.font
            .layout(text, scale, point(0.0, 0.0))
            .filter_map(|g| g.pixel_bounding_box())
            .fold(None, |acc: Option<Ink>, bb| {
                let ink = Ink {
                    min_x: bb.min.x as f32,
                    min_y: bb.min.y as f32,
                    max_x: bb.max.x as f32,
                    max_y: bb.max.y as f32,
                };
                Some(match acc {
                    Some(a) => a.union(ink),
                    None => ink,
                })
            })
    }

    fn draw_line(&self, canvas: &mut RgbaImage, text: &str, scale: Scale, x: f32, baseline: f32) {
        let (width, height) = (canvas.width() as i32, canvas.height() as i32);
        for glyph in self.font.layout(text, scale, point(x, baseline)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px < 0 || py < 0 || px >= width || py >= height {
                    return;
                }
                let pixel = canvas.get_pixel_mut(px as u32, py as u32);
                blend(pixel, TEXT_COLOR, coverage);
            });
        }
    }
}

impl StampSink for TextStamper {
    fn stamp(&self, source: &Path, at: &Timestamp, location: &str) -> Result<Option<PathBuf>, StampError> {
        let output = output_path(source)?;
        let img = image::open(source)?;
        let stamped = self.render(img, &stamp_lines(at, location));
        stamped.save(&output)?;
        log::info!("Saved stamped image: {}", output.display());
        Ok(Some(output))
    }
}

/// Ink bounding box of a laid-out line.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Ink {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Ink {
    fn union(self, other: Ink) -> Ink {
        Ink {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    fn height(&self) -> f32 {
        self.max_y - self.min_y
    }
}

fn blend(pixel: &mut Rgba<u8>, color: Rgba<u8>, coverage: f32) {
    let alpha = (coverage.clamp(0.0, 1.0) * color[3] as f32) / 255.0;
    for c in 0..3 {
        let mixed = pixel[c] as f32 * (1.0 - alpha) + color[c] as f32 * alpha;
        pixel[c] = mixed.round().clamp(0.0, 255.0) as u8;
    }
    pixel[3] = pixel[3].max((alpha * 255.0).round() as u8);
}
