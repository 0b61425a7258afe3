//! Shared page images.
//!
//! Pages never own image resources. Each page carries an [`ImageBinding`]
//! that holds an opaque [`ImageId`] plus its placement parameters, and the
//! [`ImageCache`] owns the loaded resources, de-duplicated by source path and
//! reference counted by the bindings pointing at them.
//!
//! ```
//! use journal_book::{ImageBinding, ImageCache, ImageLoader};
//! use std::path::Path;
//!
//! struct Stub;
//! impl ImageLoader for Stub {
//!     type Image = ();
//!     fn load_image(&mut self, _path: &Path) -> std::io::Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! let mut cache = ImageCache::new(Stub);
//! let (mut left, mut right) = (ImageBinding::default(), ImageBinding::default());
//! cache.bind(&mut left, Path::new("map.dds")).unwrap();
//! cache.bind(&mut right, Path::new("map.dds")).unwrap();
//! assert_eq!(cache.len(), 1);
//! cache.release(&mut left);
//! cache.release(&mut right);
//! assert!(cache.is_empty());
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use crate::error::{JournalError, Result};

/// Opaque identity of a resident image, assigned when it is loaded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(u64);

impl ImageId {
    /// Raw numeric id, stable for the lifetime of the cache entry.
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Axis-aligned rectangle in normalized `[0, 1]` coordinates.
///
/// Always satisfies `x0 <= x1` and `y0 <= y1`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormRect {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

impl Default for NormRect {
    fn default() -> Self {
        Self::FULL
    }
}

impl NormRect {
    /// The whole unit square.
    pub const FULL: Self = Self {
        x0: 0.0,
        y0: 0.0,
        x1: 1.0,
        y1: 1.0,
    };

    /// Build a rectangle, clamping every edge into `[0, 1]` and ordering
    /// each axis.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (x0, x1) = ordered(unit(x0), unit(x1));
        let (y0, y1) = ordered(unit(y0), unit(y1));
        Self { x0, y0, x1, y1 }
    }

    /// Edges as `[x0, y0, x1, y1]`.
    pub fn to_array(self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }

    /// Horizontal span as `(x0, x1)`.
    pub fn horizontal(self) -> (f32, f32) {
        (self.x0, self.x1)
    }

    /// Vertical span as `(y0, y1)`.
    pub fn vertical(self) -> (f32, f32) {
        (self.y0, self.y1)
    }

    /// Edit the horizontal span. An edge dragged past the other one pulls
    /// the other edge along.
    pub fn set_horizontal(&mut self, lo: f32, hi: f32) {
        (self.x0, self.x1) = edit_span((self.x0, self.x1), lo, hi);
    }

    /// Edit the vertical span. An edge dragged past the other one pulls the
    /// other edge along.
    pub fn set_vertical(&mut self, lo: f32, hi: f32) {
        (self.y0, self.y1) = edit_span((self.y0, self.y1), lo, hi);
    }
}

impl From<[f32; 4]> for NormRect {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn edit_span(current: (f32, f32), lo: f32, hi: f32) -> (f32, f32) {
    let (mut lo, mut hi) = (unit(lo), unit(hi));
    if lo > hi {
        if lo != current.0 {
            hi = lo;
        } else {
            lo = hi;
        }
    }
    (lo, hi)
}

/// RGBA tint multiplied into the image when drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tint(pub [u8; 4]);

impl Default for Tint {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Tint {
    /// Opaque white, i.e. the image's own colors.
    pub const WHITE: Self = Self([255, 255, 255, 255]);
}

/// How a page image is drawn.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImageLayout {
    /// Texture sampling sub-rectangle.
    pub uv: NormRect,
    /// Placement within the page text area.
    pub placement: NormRect,
    pub tint: Tint,
    /// When set, page text is still shown under the image.
    pub background: bool,
}

/// A page's reference to a shared image plus how it is drawn.
///
/// A binding does not own its image. It is deliberately not `Clone`: a copy
/// would point at a cache entry without being counted by it.
#[derive(Debug, Default, PartialEq)]
pub struct ImageBinding {
    handle: Option<ImageId>,
    pending: Option<PathBuf>,
    pub layout: ImageLayout,
    ever_bound: bool,
}

impl ImageBinding {
    /// Unbound binding for an image saved at `source`. It keeps `layout` on
    /// its first bind and remembers `source` until a bind succeeds or the
    /// image is released.
    pub fn restored(source: PathBuf, layout: ImageLayout) -> Self {
        Self {
            handle: None,
            pending: Some(source),
            layout,
            ever_bound: true,
        }
    }

    /// Bound image, if any.
    pub fn handle(&self) -> Option<ImageId> {
        self.handle
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    /// Saved source of an image that could not be loaded yet.
    pub fn pending_source(&self) -> Option<&Path> {
        self.pending.as_deref()
    }

    fn reset_placement(&mut self) {
        self.layout.uv = NormRect::FULL;
        self.layout.placement = NormRect::FULL;
    }
}

/// Resource-loading hooks used by [`ImageCache`].
pub trait ImageLoader {
    /// Loaded resource (texture handle, decoded pixels, ...).
    type Image;

    /// Load the image stored at `path`.
    fn load_image(&mut self, path: &Path) -> io::Result<Self::Image>;

    /// Destroy a resource whose last binding went away.
    fn release_image(&mut self, _image: Self::Image) {}
}

const DEFAULT_MAX_IMAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Loader that reads image files into memory without decoding them.
///
/// Reads are capped at `max_bytes`; larger files fail to load.
#[derive(Clone, Debug)]
pub struct FileBytesLoader {
    max_bytes: u64,
}

impl Default for FileBytesLoader {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

impl FileBytesLoader {
    /// Set the maximum accepted file size. Values of `0` are treated as `1`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes.max(1);
        self
    }
}

impl ImageLoader for FileBytesLoader {
    type Image = Vec<u8>;

    fn load_image(&mut self, path: &Path) -> io::Result<Vec<u8>> {
        let file = File::open(path)?;
        let mut bytes = Vec::with_capacity(8);
        file.take(self.max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > self.max_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("image exceeds {} bytes", self.max_bytes),
            ));
        }
        if bytes.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "empty image"));
        }
        Ok(bytes)
    }
}

struct CacheEntry<I> {
    refcount: usize,
    source_path: PathBuf,
    image: I,
}

/// Reference-counted, path de-duplicated image store.
///
/// Every entry is referenced by at least one binding. The entry and its
/// resource are destroyed in the same call that drops the last reference.
pub struct ImageCache<L: ImageLoader> {
    loader: L,
    entries: HashMap<ImageId, CacheEntry<L::Image>>,
    by_path: HashMap<PathBuf, ImageId>,
    next_id: u64,
}

impl<L: ImageLoader> core::fmt::Debug for ImageCache<L> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ImageCache")
            .field("entries", &self.entries.len())
            .field("total_refcount", &self.total_refcount())
            .finish()
    }
}

impl<L: ImageLoader> ImageCache<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            entries: HashMap::new(),
            by_path: HashMap::new(),
            next_id: 1,
        }
    }

    /// Take one reference on the image at `path`, loading it if it is not
    /// resident yet. A failed load leaves the cache unchanged.
    pub fn acquire(&mut self, path: &Path) -> Result<ImageId> {
        if let Some(&id) = self.by_path.get(path) {
            if let Some(entry) = self.entries.get_mut(&id) {
                entry.refcount += 1;
                log::debug!(
                    "image {} reused ({}), refcount {}",
                    id.0,
                    path.display(),
                    entry.refcount
                );
                return Ok(id);
            }
        }

        let image = match self.loader.load_image(path) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("Unable to load image {}: {}", path.display(), err);
                return Err(JournalError::ResourceLoad {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        };
        let id = ImageId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            CacheEntry {
                refcount: 1,
                source_path: path.to_path_buf(),
                image,
            },
        );
        self.by_path.insert(path.to_path_buf(), id);
        log::debug!("image {} loaded ({})", id.0, path.display());
        Ok(id)
    }

    /// Point `binding` at the image stored at `path`.
    ///
    /// Binding the image the binding already shows is a no-op. Otherwise the
    /// new image is acquired first and only then is the previous one
    /// released, so a failed load leaves the binding as it was. A binding
    /// that has never been bound starts from the full-image rectangles;
    /// later switches keep them. Tint and background are never touched.
    pub fn bind(&mut self, binding: &mut ImageBinding, path: &Path) -> Result<()> {
        if let (Some(current), Some(&id)) = (binding.handle, self.by_path.get(path)) {
            if current == id {
                return Ok(());
            }
        }

        let id = self.acquire(path)?;
        if let Some(old) = binding.handle.take() {
            self.release_id(old);
        }
        if !binding.ever_bound {
            binding.reset_placement();
            binding.ever_bound = true;
        }
        binding.handle = Some(id);
        binding.pending = None;
        Ok(())
    }

    /// Drop `binding`'s reference, if it holds one, and clear its handle and
    /// any pending source.
    pub fn release(&mut self, binding: &mut ImageBinding) {
        binding.pending = None;
        if let Some(id) = binding.handle.take() {
            self.release_id(id);
        }
    }

    fn release_id(&mut self, id: ImageId) {
        let Some(entry) = self.entries.get_mut(&id) else {
            log::warn!("release of unknown image {}", id.0);
            return;
        };
        entry.refcount -= 1;
        if entry.refcount > 0 {
            log::debug!("image {} released, refcount {}", id.0, entry.refcount);
            return;
        }
        if let Some(entry) = self.entries.remove(&id) {
            self.by_path.remove(&entry.source_path);
            log::debug!(
                "image {} destroyed ({})",
                id.0,
                entry.source_path.display()
            );
            self.loader.release_image(entry.image);
        }
    }

    /// Resident image for `id`.
    pub fn get(&self, id: ImageId) -> Option<&L::Image> {
        self.entries.get(&id).map(|entry| &entry.image)
    }

    /// Resident image a binding points at.
    pub fn image_for(&self, binding: &ImageBinding) -> Option<&L::Image> {
        binding.handle.and_then(|id| self.get(id))
    }

    pub fn refcount(&self, id: ImageId) -> Option<usize> {
        self.entries.get(&id).map(|entry| entry.refcount)
    }

    pub fn source_path(&self, id: ImageId) -> Option<&Path> {
        self.entries.get(&id).map(|entry| entry.source_path.as_path())
    }

    /// Resident id for `path`, if loaded.
    pub fn id_for_path(&self, path: &Path) -> Option<ImageId> {
        self.by_path.get(path).copied()
    }

    /// Sum of reference counts over all entries.
    pub fn total_refcount(&self) -> usize {
        self.entries.values().map(|entry| entry.refcount).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: ImageLoader> Drop for ImageCache<L> {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            log::debug!(
                "dropping image cache with {} resident images",
                self.entries.len()
            );
        }
        self.by_path.clear();
        for (_, entry) in self.entries.drain() {
            self.loader.release_image(entry.image);
        }
    }
}
