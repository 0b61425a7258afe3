//! User settings persisted as JSON.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};
use crate::store::JsonStore;
use crate::wrap::{DEFAULT_WRAP_WIDTH, MAX_WRAP_WIDTH, MIN_WRAP_WIDTH};

/// Journal configuration.
///
/// Fields missing from a settings file take their default values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Column used by the wrap action.
    pub wrap_width: u32,
    pub show_titlebar: bool,
    /// Directory holding `<name>.json` books.
    pub books_dir: PathBuf,
    /// Base directory for page images.
    pub images_dir: PathBuf,
    /// Book opened at startup.
    pub default_book: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
            show_titlebar: false,
            books_dir: PathBuf::from("journal/books"),
            images_dir: PathBuf::from("journal/images"),
            default_book: "default".to_string(),
        }
    }
}

impl Settings {
    /// Copy with `wrap_width` brought into the supported range.
    pub fn clamped(mut self) -> Self {
        self.wrap_width = self.wrap_width.clamp(MIN_WRAP_WIDTH, MAX_WRAP_WIDTH);
        self
    }

    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("no settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(JournalError::io(path, err)),
            Ok(_) => {}
        }
        let settings: Self = JsonStore::default().read_json(path)?;
        Ok(settings.clamped())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        JsonStore::default().write_json(path, self)
    }

    /// Wrap width as a column count.
    pub fn wrap_columns(&self) -> usize {
        self.wrap_width as usize
    }

    /// File backing the book called `name`.
    pub fn book_path(&self, name: &str) -> PathBuf {
        self.books_dir.join(format!("{name}.json"))
    }

    pub fn default_book_path(&self) -> PathBuf {
        self.book_path(&self.default_book)
    }

    /// Saved variable list, beside the books directory.
    pub fn variables_path(&self) -> PathBuf {
        self.books_dir.with_file_name("variables.json")
    }

    /// Image paths in books are resolved against `images_dir` unless absolute.
    pub fn resolve_image(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.images_dir.join(file)
        }
    }

    /// Inverse of [`Settings::resolve_image`] for paths under `images_dir`.
    pub fn relative_image(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.images_dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
