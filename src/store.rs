//! Book, variable and settings files.
//!
//! [`BookStore`] is the persistence seam the journal talks to. Books cross it
//! as [`PersistedBook`] values, where page images are stored by source path
//! and placement instead of by resident handle. [`JsonStore`] is the
//! file-backed implementation: JSON documents, plain-text export, capped
//! reads and write-to-temp-then-rename saves.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::book::{Book, Page};
use crate::error::{JournalError, PersistenceErrorKind, Result};
use crate::image::{ImageBinding, ImageCache, ImageLayout, ImageLoader, NormRect, Tint};
use crate::variables::{VariableEngine, VariableEntry};

const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;
static WRITE_NONCE: AtomicUsize = AtomicUsize::new(0);

/// Saved form of a whole book.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedBook {
    /// Left page of the spread that was open when saved.
    #[serde(default)]
    pub current_page: usize,
    #[serde(default)]
    pub pages: Vec<PersistedPage>,
}

/// Saved form of one page.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistedPage {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<PersistedImage>,
}

/// Saved form of a page image: where it came from and how it is drawn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedImage {
    pub file: PathBuf,
    pub uv: [f32; 4],
    pub xy: [f32; 4],
    pub tint: [u8; 4],
    #[serde(default)]
    pub background: bool,
}

impl PersistedImage {
    pub fn layout(&self) -> ImageLayout {
        ImageLayout {
            uv: NormRect::from(self.uv),
            placement: NormRect::from(self.xy),
            tint: Tint(self.tint),
            background: self.background,
        }
    }

    /// Unbound binding carrying the saved source and layout.
    pub fn to_binding(&self) -> ImageBinding {
        ImageBinding::restored(self.file.clone(), self.layout())
    }

    fn from_binding(file: &Path, binding: &ImageBinding) -> Self {
        let layout = &binding.layout;
        Self {
            file: file.to_path_buf(),
            uv: layout.uv.to_array(),
            xy: layout.placement.to_array(),
            tint: layout.tint.0,
            background: layout.background,
        }
    }
}

impl PersistedBook {
    /// Snapshot `book`, resolving bound images to their source paths.
    ///
    /// Images that were saved but could not be loaded keep their saved path.
    pub fn capture<L: ImageLoader>(book: &Book, images: &ImageCache<L>) -> Self {
        let pages = book
            .pages()
            .iter()
            .map(|page| {
                let binding = page.image();
                let file = binding
                    .handle()
                    .and_then(|id| images.source_path(id))
                    .or_else(|| binding.pending_source());
                PersistedPage {
                    title: page.title.clone(),
                    content: page.content.clone(),
                    image: file.map(|file| PersistedImage::from_binding(file, binding)),
                }
            })
            .collect();
        Self {
            current_page: book.current_spread(),
            pages,
        }
    }
}

/// Persistence collaborator for books.
pub trait BookStore {
    /// Read a saved book.
    fn load_book(&self, path: &Path) -> Result<PersistedBook>;

    /// Write a book.
    fn save_book(&self, path: &Path, book: &PersistedBook) -> Result<()>;

    /// Export page titles and contents as plain text.
    fn save_text(&self, path: &Path, book: &Book) -> Result<()>;

    /// Import a book from a secondary format.
    fn load_legacy(&self, path: &Path) -> Result<PersistedBook> {
        Err(JournalError::persistence(
            path,
            PersistenceErrorKind::Unsupported,
        ))
    }
}

/// File-backed store writing JSON documents.
///
/// Reads and writes larger than `max_file_bytes` are refused with
/// [`PersistenceErrorKind::TooLarge`].
#[derive(Clone, Debug)]
pub struct JsonStore {
    max_file_bytes: u64,
}

impl Default for JsonStore {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl JsonStore {
    /// Set the maximum file size in bytes. Values of `0` are treated as `1`.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes.max(1);
        self
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Read and decode a JSON document.
    pub fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let payload = self.read_capped(path)?;
        serde_json::from_slice(&payload).map_err(|err| JournalError::decode(path, err))
    }

    /// Encode `value` as pretty JSON and replace `path` with it.
    pub fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let payload =
            serde_json::to_vec_pretty(value).map_err(|err| JournalError::decode(path, err))?;
        self.write_atomic(path, &payload)
    }

    pub fn load_variables(&self, path: &Path) -> Result<VariableEngine> {
        let saved: Vec<VariableEntry> = self.read_json(path)?;
        Ok(VariableEngine::restore(saved))
    }

    pub fn save_variables(&self, path: &Path, variables: &VariableEngine) -> Result<()> {
        self.write_json(path, &variables.list())
    }

    fn read_capped(&self, path: &Path) -> Result<Vec<u8>> {
        let len = fs::metadata(path)
            .map_err(|err| JournalError::io(path, err))?
            .len();
        if len > self.max_file_bytes {
            return Err(JournalError::persistence(path, PersistenceErrorKind::TooLarge));
        }
        let file = File::open(path).map_err(|err| JournalError::io(path, err))?;
        let mut payload = Vec::with_capacity(len as usize);
        file.take(self.max_file_bytes.saturating_add(1))
            .read_to_end(&mut payload)
            .map_err(|err| JournalError::io(path, err))?;
        if payload.len() as u64 > self.max_file_bytes {
            return Err(JournalError::persistence(path, PersistenceErrorKind::TooLarge));
        }
        Ok(payload)
    }

    fn write_atomic(&self, path: &Path, payload: &[u8]) -> Result<()> {
        if payload.len() as u64 > self.max_file_bytes {
            return Err(JournalError::persistence(path, PersistenceErrorKind::TooLarge));
        }
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|err| JournalError::io(path, err))?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "journal".to_string());
        let nonce = WRITE_NONCE.fetch_add(1, Ordering::Relaxed);
        let temp_path = parent.join(format!(
            "{}.tmp-{}-{}",
            file_name,
            std::process::id(),
            nonce
        ));

        let result = write_file(&temp_path, payload).and_then(|()| fs::rename(&temp_path, path));
        if let Err(err) = result {
            remove_file_quiet(&temp_path);
            log::warn!("Unable to write {}: {}", path.display(), err);
            return Err(JournalError::io(path, err));
        }
        Ok(())
    }
}

fn write_file(path: &Path, payload: &[u8]) -> io::Result<()> {
    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(payload)?;
    writer.flush()?;
    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()
}

fn remove_file_quiet(path: &Path) {
    let _ = fs::remove_file(path);
}

impl BookStore for JsonStore {
    fn load_book(&self, path: &Path) -> Result<PersistedBook> {
        let book: PersistedBook = self.read_json(path)?;
        log::info!("Loaded {} pages from {}", book.pages.len(), path.display());
        Ok(book)
    }

    fn save_book(&self, path: &Path, book: &PersistedBook) -> Result<()> {
        self.write_json(path, book)?;
        log::info!("Saved {} pages to {}", book.pages.len(), path.display());
        Ok(())
    }

    fn save_text(&self, path: &Path, book: &Book) -> Result<()> {
        self.write_atomic(path, render_text(book).as_bytes())
    }
}

/// Plain-text rendering of a book: per page the title, a blank line, the
/// content and a separating blank line. Blank pages are kept so numbering
/// survives.
pub fn render_text(book: &Book) -> String {
    let mut out = String::with_capacity(
        book.pages()
            .iter()
            .map(|p| p.title.len() + p.content.len() + 4)
            .sum(),
    );
    for page in book.pages() {
        push_page_text(&mut out, page);
    }
    out
}

fn push_page_text(out: &mut String, page: &Page) {
    out.push_str(&page.title);
    out.push_str("\n\n");
    out.push_str(&page.content);
    if !page.content.ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
}

/// Sorted stems of the files in `dir` with the given extension.
///
/// A missing directory lists as empty.
pub fn list_stems(dir: &Path, extension: &str) -> Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(JournalError::io(dir, err)),
    };
    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !matches {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push(stem.to_string());
        }
    }
    out.sort();
    Ok(out)
}
