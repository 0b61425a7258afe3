//! Book pages and the two-page spread cursor.
//!
//! A [`Book`] always holds at least two pages and its spread cursor always
//! addresses two valid pages: `pages[current_spread]` on the left and
//! `pages[current_spread + 1]` on the right. Every structural mutation
//! re-establishes that before returning.

use crate::error::{JournalError, Result};
use crate::image::{ImageBinding, ImageLayout};
use crate::wrap::{greedy_word_wrap, has_visible_symbols};

/// Pages a book never shrinks below.
pub const MIN_PAGES: usize = 2;

/// Chapter label shown for pages without a visible title.
pub const UNTITLED_LABEL: &str = "(n/a)";

/// One leaf of the book.
///
/// The image binding is only reachable mutably inside the crate, so a page
/// handed out by `&mut` can never drop a counted image reference.
#[derive(Debug, Default)]
pub struct Page {
    pub title: String,
    pub content: String,
    pub(crate) image: ImageBinding,
}

impl Page {
    /// Page with the given title and content and no image.
    pub fn with_text(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            image: ImageBinding::default(),
        }
    }

    /// Optional overlay image.
    pub fn image(&self) -> &ImageBinding {
        &self.image
    }

    /// Draw settings of the overlay image.
    pub fn image_layout_mut(&mut self) -> &mut ImageLayout {
        &mut self.image.layout
    }

    /// Whether the title or content has anything besides spaces and control
    /// characters.
    pub fn has_visible_content(&self) -> bool {
        has_visible_symbols(&self.title) || has_visible_symbols(&self.content)
    }
}

/// Page of the current spread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Two-phase page deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DeleteState {
    #[default]
    Idle,
    /// Deletion of this page index awaits confirmation.
    ConfirmPending(usize),
}

/// Ordered pages plus the spread cursor.
#[derive(Debug)]
pub struct Book {
    pages: Vec<Page>,
    current_spread: usize,
    delete_state: DeleteState,
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

impl Book {
    /// Two blank pages, spread at the start.
    pub fn new() -> Self {
        Self::from_pages(Vec::new(), 0)
    }

    /// Adopt `pages`, padding to [`MIN_PAGES`] and pulling the cursor back
    /// inside the book when needed.
    pub fn from_pages(pages: Vec<Page>, current_spread: usize) -> Self {
        let mut book = Self {
            pages,
            current_spread,
            delete_state: DeleteState::Idle,
        };
        book.normalize();
        book
    }

    pub(crate) fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Mutable page access. The slice cannot change the page count.
    pub fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Always false once constructed; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Index of the left page of the current spread.
    pub fn current_spread(&self) -> usize {
        self.current_spread
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    pub fn page_mut(&mut self, index: usize) -> Option<&mut Page> {
        self.pages.get_mut(index)
    }

    /// Page index shown on `side` of the current spread.
    pub fn side_index(&self, side: Side) -> usize {
        match side {
            Side::Left => self.current_spread,
            Side::Right => self.current_spread + 1,
        }
    }

    pub fn side(&self, side: Side) -> &Page {
        &self.pages[self.side_index(side)]
    }

    pub fn side_mut(&mut self, side: Side) -> &mut Page {
        let index = self.side_index(side);
        &mut self.pages[index]
    }

    pub fn left(&self) -> &Page {
        self.side(Side::Left)
    }

    pub fn right(&self) -> &Page {
        self.side(Side::Right)
    }

    pub fn left_mut(&mut self) -> &mut Page {
        self.side_mut(Side::Left)
    }

    pub fn right_mut(&mut self) -> &mut Page {
        self.side_mut(Side::Right)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.pages.len() {
            Ok(())
        } else {
            Err(JournalError::OutOfRange {
                index,
                len: self.pages.len(),
            })
        }
    }

    fn normalize(&mut self) {
        while self.pages.len() < MIN_PAGES {
            self.pages.push(Page::default());
        }
        while self.current_spread > 0 && self.current_spread + 2 > self.pages.len() {
            self.current_spread -= 1;
        }
    }

    /// Insert a blank page in front of page `at`.
    pub fn insert_before(&mut self, at: usize) -> Result<()> {
        self.check_index(at)?;
        self.insert_blank(at);
        Ok(())
    }

    /// Insert a blank page right after page `at`.
    pub fn insert_after(&mut self, at: usize) -> Result<()> {
        self.check_index(at)?;
        self.insert_blank(at + 1);
        Ok(())
    }

    fn insert_blank(&mut self, position: usize) {
        self.cancel_delete();
        self.pages.insert(position, Page::default());
        self.normalize();
        log::debug!("inserted page {} (len={})", position, self.pages.len());
    }

    pub fn delete_state(&self) -> DeleteState {
        self.delete_state
    }

    /// First phase of page deletion: remember `at` until confirmed.
    pub fn request_delete(&mut self, at: usize) -> Result<()> {
        self.check_index(at)?;
        self.delete_state = DeleteState::ConfirmPending(at);
        Ok(())
    }

    /// Abandon a pending deletion.
    pub fn cancel_delete(&mut self) {
        self.delete_state = DeleteState::Idle;
    }

    /// Second phase of page deletion: remove the pending page.
    ///
    /// Returns the removed page so its image can be released. Returns `None`
    /// when nothing was pending.
    #[must_use = "the removed page may still hold an image reference"]
    pub fn confirm_delete(&mut self) -> Option<Page> {
        let DeleteState::ConfirmPending(at) = core::mem::take(&mut self.delete_state) else {
            return None;
        };
        if at >= self.pages.len() {
            return None;
        }
        let page = self.pages.remove(at);
        self.normalize();
        log::debug!("deleted page {} (len={})", at, self.pages.len());
        Some(page)
    }

    /// Advance the spread by one page.
    ///
    /// On the final spread, a new blank page is appended only when the last
    /// page has visible content, so the book grows once the writer has used
    /// it. Returns whether the spread moved.
    pub fn next_page(&mut self) -> bool {
        if self.current_spread + 2 < self.pages.len() {
            self.current_spread += 1;
            return true;
        }
        if self.current_spread + 2 == self.pages.len()
            && self.pages.last().is_some_and(Page::has_visible_content)
        {
            self.pages.push(Page::default());
            self.current_spread += 1;
            log::debug!("book grew to {} pages", self.pages.len());
            return true;
        }
        false
    }

    /// Step the spread back by one page. Returns whether it moved.
    pub fn previous_page(&mut self) -> bool {
        if self.current_spread > 0 {
            self.current_spread -= 1;
            true
        } else {
            false
        }
    }

    /// Put the spread on page `index`, or on the last pair when `index` is
    /// the last page.
    pub fn select_page(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.current_spread = index.min(self.pages.len() - 2);
        Ok(())
    }

    /// One label per page: its title, or [`UNTITLED_LABEL`].
    pub fn chapter_titles(&self) -> impl Iterator<Item = &str> + '_ {
        self.pages.iter().map(|page| {
            if has_visible_symbols(&page.title) {
                page.title.as_str()
            } else {
                UNTITLED_LABEL
            }
        })
    }

    /// First page whose title or content contains `needle`.
    pub fn find_text(&self, needle: &str) -> Option<usize> {
        self.pages
            .iter()
            .position(|page| page.title.contains(needle) || page.content.contains(needle))
    }

    /// Move the spread onto the first page containing `needle`.
    pub fn jump_to(&mut self, needle: &str) -> bool {
        match self.find_text(needle) {
            Some(index) => {
                self.current_spread = index.min(self.pages.len() - 2);
                true
            }
            None => false,
        }
    }

    /// Append `text` to the content of a page of the current spread.
    pub fn append_text(&mut self, side: Side, text: &str) {
        self.side_mut(side).content.push_str(text);
    }

    /// Reflow the content of every page to `width` columns.
    pub fn wrap_all(&mut self, width: usize) {
        for page in &mut self.pages {
            page.content = greedy_word_wrap(&page.content, width);
        }
    }
}
