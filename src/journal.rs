//! The journal session: one book, its image cache, the variable list and the
//! settings, owned together.
//!
//! Every operation goes through a [`Journal`] value created by the host at
//! session start. Page images are bound through the session so their cache
//! references stay balanced when pages are deleted or books are replaced.

use std::path::{Path, PathBuf};

use crate::book::{Book, Page, Side};
use crate::error::{JournalError, Result};
use crate::image::{ImageCache, ImageLayout, ImageLoader};
use crate::settings::Settings;
use crate::store::{BookStore, JsonStore, PersistedBook, PersistedPage};
use crate::variables::VariableEngine;

/// Session context.
pub struct Journal<L: ImageLoader, S: BookStore = JsonStore> {
    book: Book,
    images: ImageCache<L>,
    variables: VariableEngine,
    settings: Settings,
    store: S,
    book_path: Option<PathBuf>,
}

impl<L: ImageLoader, S: BookStore> core::fmt::Debug for Journal<L, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Journal")
            .field("pages", &self.book.len())
            .field("current_spread", &self.book.current_spread())
            .field("images", &self.images.len())
            .field("variables", &self.variables.len())
            .field("book_path", &self.book_path)
            .finish()
    }
}

impl<L: ImageLoader> Journal<L, JsonStore> {
    /// Blank session using the JSON store.
    pub fn new(loader: L, settings: Settings) -> Self {
        Self::with_store(loader, JsonStore::default(), settings)
    }

    /// Session with the default book and the saved variable list.
    ///
    /// Either file may be absent or unreadable; the session then starts
    /// blank or with the built-in variables, and the failure is logged.
    pub fn open(loader: L, settings: Settings) -> Self {
        let mut journal = Self::new(loader, settings);

        let variables_path = journal.settings.variables_path();
        if variables_path.exists() {
            match journal.store.load_variables(&variables_path) {
                Ok(variables) => journal.variables = variables,
                Err(err) => log::warn!("Unable to restore variables: {}", err),
            }
        }

        let book_path = journal.settings.default_book_path();
        if book_path.exists() {
            if let Err(err) = journal.load_book(&book_path) {
                log::warn!("Starting with a blank book: {}", err);
            }
        } else {
            journal.book_path = Some(book_path);
        }
        journal
    }

    /// Write the variable list next to the books.
    pub fn save_variables(&self) -> Result<()> {
        self.store
            .save_variables(&self.settings.variables_path(), &self.variables)
    }
}

impl<L: ImageLoader, S: BookStore> Journal<L, S> {
    pub fn with_store(loader: L, store: S, settings: Settings) -> Self {
        Self {
            book: Book::new(),
            images: ImageCache::new(loader),
            variables: VariableEngine::with_builtins(),
            settings: settings.clamped(),
            store,
            book_path: None,
        }
    }

    pub fn book(&self) -> &Book {
        &self.book
    }

    pub fn title_mut(&mut self, index: usize) -> Option<&mut String> {
        self.book.page_mut(index).map(|page| &mut page.title)
    }

    pub fn content_mut(&mut self, index: usize) -> Option<&mut String> {
        self.book.page_mut(index).map(|page| &mut page.content)
    }

    /// Draw settings of a page image. The image itself is changed with
    /// [`Journal::set_page_image`] and [`Journal::clear_page_image`].
    pub fn image_layout_mut(&mut self, index: usize) -> Option<&mut ImageLayout> {
        self.book.page_mut(index).map(Page::image_layout_mut)
    }

    pub fn insert_before(&mut self, at: usize) -> Result<()> {
        self.book.insert_before(at)
    }

    pub fn insert_after(&mut self, at: usize) -> Result<()> {
        self.book.insert_after(at)
    }

    /// First step of a page deletion; finish with [`Journal::confirm_delete`].
    pub fn request_delete(&mut self, at: usize) -> Result<()> {
        self.book.request_delete(at)
    }

    pub fn cancel_delete(&mut self) {
        self.book.cancel_delete();
    }

    pub fn next_page(&mut self) -> bool {
        self.book.next_page()
    }

    pub fn previous_page(&mut self) -> bool {
        self.book.previous_page()
    }

    pub fn select_page(&mut self, index: usize) -> Result<()> {
        self.book.select_page(index)
    }

    pub fn append_text(&mut self, side: Side, text: &str) {
        self.book.append_text(side, text);
    }

    pub fn images(&self) -> &ImageCache<L> {
        &self.images
    }

    pub fn variables(&self) -> &VariableEngine {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableEngine {
        &mut self.variables
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the settings. The wrap width is clamped.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings.clamped();
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// File the current book was loaded from or will be saved to.
    pub fn book_path(&self) -> Option<&Path> {
        self.book_path.as_deref()
    }

    /// Bind the image at `path` to a page of the current spread.
    ///
    /// Relative paths are taken from the configured images directory. On
    /// failure the page keeps its previous image.
    pub fn show_image(&mut self, side: Side, path: &Path) -> Result<()> {
        let index = self.book.side_index(side);
        self.set_page_image(index, path)
    }

    pub fn hide_image(&mut self, side: Side) {
        let page = self.book.side_mut(side);
        self.images.release(&mut page.image);
    }

    pub fn set_page_image(&mut self, index: usize, path: &Path) -> Result<()> {
        let len = self.book.len();
        let resolved = self.settings.resolve_image(path);
        let page = self
            .book
            .page_mut(index)
            .ok_or(JournalError::OutOfRange { index, len })?;
        self.images.bind(&mut page.image, &resolved)
    }

    pub fn clear_page_image(&mut self, index: usize) -> Result<()> {
        let len = self.book.len();
        let page = self
            .book
            .page_mut(index)
            .ok_or(JournalError::OutOfRange { index, len })?;
        self.images.release(&mut page.image);
        Ok(())
    }

    /// Complete a pending page deletion, releasing the page's image.
    pub fn confirm_delete(&mut self) -> bool {
        match self.book.confirm_delete() {
            Some(mut page) => {
                self.images.release(&mut page.image);
                true
            }
            None => false,
        }
    }

    /// Replace the book with the one stored at `path`.
    ///
    /// On error the current book is kept unchanged.
    pub fn load_book(&mut self, path: &Path) -> Result<()> {
        let saved = self.store.load_book(path).inspect_err(|err| {
            log::warn!("Unable to load book {}: {}", path.display(), err);
        })?;
        self.replace_book(saved);
        self.book_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Replace the book with one imported through the store's secondary
    /// format. The imported book is not associated with a save path.
    pub fn load_legacy(&mut self, path: &Path) -> Result<()> {
        let saved = self.store.load_legacy(path)?;
        self.replace_book(saved);
        self.book_path = None;
        Ok(())
    }

    /// Swap in `saved`, acquiring its images before the old book's images are
    /// released. Pages whose image cannot be loaded keep their text only.
    pub fn replace_book(&mut self, saved: PersistedBook) {
        let mut pages = Vec::with_capacity(saved.pages.len());
        for (index, persisted) in saved.pages.into_iter().enumerate() {
            pages.push(self.restore_page(index, persisted));
        }
        let old = core::mem::replace(
            &mut self.book,
            Book::from_pages(pages, saved.current_page),
        );
        self.release_pages(old);
        log::info!(
            "Book replaced: {} pages, {} images resident",
            self.book.len(),
            self.images.len()
        );
    }

    fn restore_page(&mut self, index: usize, persisted: PersistedPage) -> Page {
        let mut page = Page::with_text(persisted.title, persisted.content);
        if let Some(image) = persisted.image {
            page.image = image.to_binding();
            let path = self.settings.resolve_image(&image.file);
            if let Err(err) = self.images.bind(&mut page.image, &path) {
                log::warn!("Page {} shown without its image: {}", index, err);
            }
        }
        page
    }

    fn release_pages(&mut self, book: Book) {
        for mut page in book.into_pages() {
            self.images.release(&mut page.image);
        }
    }

    /// Saved form of the current book, image paths relative to the images
    /// directory where possible.
    pub fn capture(&self) -> PersistedBook {
        let mut saved = PersistedBook::capture(&self.book, &self.images);
        for image in saved.pages.iter_mut().filter_map(|p| p.image.as_mut()) {
            image.file = self.settings.relative_image(&image.file);
        }
        saved
    }

    pub fn save_book(&self, path: &Path) -> Result<()> {
        self.store.save_book(path, &self.capture())
    }

    /// Save to the file the book came from, or to the default book.
    pub fn save(&mut self) -> Result<()> {
        let path = match &self.book_path {
            Some(path) => path.clone(),
            None => self.settings.default_book_path(),
        };
        self.save_book(&path)?;
        self.book_path = Some(path);
        Ok(())
    }

    pub fn save_text(&self, path: &Path) -> Result<()> {
        self.store.save_text(path, &self.book)
    }

    /// Handle a host message: `"<text>"` or `"<text>@<book>"`.
    ///
    /// The `@<book>` suffix first loads that book from the books directory.
    /// The remaining text is then looked up with [`Book::jump_to`]. Returns
    /// whether a page was found; an empty message does nothing.
    pub fn command(&mut self, message: &str) -> Result<bool> {
        if message.is_empty() {
            return Ok(false);
        }
        let needle = match message.rfind('@') {
            Some(at) => {
                let path = self.settings.book_path(&message[at + 1..]);
                self.load_book(&path)?;
                &message[..at]
            }
            None => message,
        };
        let found = self.book.jump_to(needle);
        if !found {
            log::debug!("no page mentions {:?}", needle);
        }
        Ok(found)
    }

    /// Append the output of variable `index` to a page of the spread.
    pub fn append_variable(&mut self, side: Side, index: usize) -> Result<()> {
        let text = self.variables.invoke(index)?;
        self.book.append_text(side, &text);
        Ok(())
    }

    /// Reflow every page at the configured width.
    pub fn wrap_all(&mut self) {
        self.book.wrap_all(self.settings.wrap_columns());
    }

    /// End the session, releasing every page image. Returns the emptied cache.
    pub fn close(mut self) -> ImageCache<L> {
        let book = core::mem::take(&mut self.book);
        self.release_pages(book);
        self.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    #[derive(Default)]
    struct FakeLoader {
        missing: HashSet<PathBuf>,
        loads: usize,
    }

    impl ImageLoader for FakeLoader {
        type Image = PathBuf;

        fn load_image(&mut self, path: &Path) -> io::Result<PathBuf> {
            if self.missing.contains(path) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "missing"));
            }
            self.loads += 1;
            Ok(path.to_path_buf())
        }
    }

    fn settings() -> Settings {
        Settings {
            images_dir: PathBuf::from("img"),
            ..Settings::default()
        }
    }

    fn journal() -> Journal<FakeLoader> {
        Journal::new(FakeLoader::default(), settings())
    }

    #[test]
    fn deleting_a_page_releases_its_image() {
        let mut j = journal();
        j.show_image(Side::Left, Path::new("a.dds")).unwrap();
        j.show_image(Side::Right, Path::new("a.dds")).unwrap();
        let id = j.book().left().image().handle().unwrap();
        assert_eq!(j.images().refcount(id), Some(2));

        j.insert_after(1).unwrap();
        j.request_delete(0).unwrap();
        assert!(j.confirm_delete());
        assert_eq!(j.images().refcount(id), Some(1));
        assert!(!j.confirm_delete());
    }

    #[test]
    fn replacing_the_book_keeps_shared_images_resident() {
        let mut j = journal();
        j.show_image(Side::Left, Path::new("shared.dds")).unwrap();
        j.show_image(Side::Right, Path::new("old.dds")).unwrap();
        let saved = PersistedBook {
            current_page: 0,
            pages: vec![
                PersistedPage {
                    title: "t".into(),
                    image: j.capture().pages[0].image.clone(),
                    ..PersistedPage::default()
                },
                PersistedPage::default(),
                PersistedPage::default(),
            ],
        };
        assert_eq!(saved.pages[0].image.as_ref().unwrap().file, Path::new("shared.dds"));

        j.replace_book(saved);
        assert_eq!(j.book().len(), 3);
        assert_eq!(j.images().len(), 1);
        assert_eq!(j.images().total_refcount(), 1);
        assert_eq!(j.images().loader().loads, 2);
    }

    #[test]
    fn unloadable_image_leaves_page_text() {
        let mut loader = FakeLoader::default();
        loader.missing.insert(PathBuf::from("img/gone.dds"));
        let mut j = Journal::new(loader, settings());
        let mut saved = PersistedBook::default();
        saved.pages.push(PersistedPage {
            title: "kept".into(),
            content: "text".into(),
            image: Some(crate::store::PersistedImage {
                file: PathBuf::from("gone.dds"),
                uv: [0.0, 0.0, 1.0, 1.0],
                xy: [0.0, 0.0, 1.0, 1.0],
                tint: [255; 4],
                background: false,
            }),
        });

        j.replace_book(saved);
        assert_eq!(j.book().len(), 2);
        assert_eq!(j.book().left().title, "kept");
        assert!(!j.book().left().image().is_bound());
        assert_eq!(
            j.book().left().image().pending_source(),
            Some(Path::new("gone.dds"))
        );
        assert!(j.images().is_empty());

        let image = j.capture().pages[0].image.clone().unwrap();
        assert_eq!(image.file, Path::new("gone.dds"));
    }

    #[test]
    fn failed_switch_keeps_previous_image() {
        let mut loader = FakeLoader::default();
        loader.missing.insert(PathBuf::from("img/bad.dds"));
        let mut j = Journal::new(loader, settings());
        j.show_image(Side::Left, Path::new("good.dds")).unwrap();
        let before = j.book().left().image().handle();

        assert!(matches!(
            j.show_image(Side::Left, Path::new("bad.dds")),
            Err(JournalError::ResourceLoad { .. })
        ));
        assert_eq!(j.book().left().image().handle(), before);
    }

    #[test]
    fn out_of_range_page_image() {
        let mut j = journal();
        assert!(matches!(
            j.set_page_image(7, Path::new("a.dds")),
            Err(JournalError::OutOfRange { index: 7, len: 2 })
        ));
        assert!(j.clear_page_image(2).is_err());
    }

    #[test]
    fn command_searches_the_open_book() {
        let mut j = journal();
        *j.content_mut(1).unwrap() = "the harbour".into();
        j.insert_after(1).unwrap();
        *j.title_mut(2).unwrap() = "Lighthouse".into();

        assert!(j.command("Lighthouse").unwrap());
        assert_eq!(j.book().current_spread(), 1);
        assert!(!j.command("nowhere").unwrap());
        assert_eq!(j.book().current_spread(), 1);
        assert!(!j.command("").unwrap());
    }

    #[test]
    fn append_variable_writes_into_the_spread() {
        let mut j = journal();
        let text = VariableEngine::with_builtins()
            .list()
            .iter()
            .position(|v| v.kind() == crate::variables::VariableKind::Text)
            .unwrap();
        let copy = j.variables_mut().duplicate(text, "Sig").unwrap();
        assert!(j.variables_mut().set_params(copy, "-- me"));

        j.append_variable(Side::Right, copy).unwrap();
        assert_eq!(j.book().right().content, "-- me");
        assert!(j.append_variable(Side::Right, 99).is_err());
    }

    #[test]
    fn session_edits_cannot_unbalance_the_cache() {
        let mut j = journal();
        j.show_image(Side::Left, Path::new("a.dds")).unwrap();
        j.show_image(Side::Right, Path::new("a.dds")).unwrap();

        *j.title_mut(0).unwrap() = "renamed".into();
        j.image_layout_mut(0).unwrap().background = true;
        assert!(j.title_mut(2).is_none());
        assert!(j.image_layout_mut(2).is_none());
        assert_eq!(j.images().total_refcount(), 2);
        assert!(j.book().left().image().layout.background);

        j.request_delete(1).unwrap();
        assert!(j.confirm_delete());
        j.request_delete(0).unwrap();
        assert!(j.confirm_delete());
        assert!(j.images().is_empty());
        assert_eq!(j.images().total_refcount(), 0);
    }

    #[test]
    fn close_releases_everything() {
        let mut j = journal();
        j.show_image(Side::Left, Path::new("a.dds")).unwrap();
        let cache = j.close();
        assert!(cache.is_empty());
    }
}
