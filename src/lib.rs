//! Paginated journal book core.
//!
//! A [`Journal`] session owns a [`Book`] shown as two-page spreads, an
//! [`ImageCache`] of reference-counted page images, a [`VariableEngine`] of
//! text producers and the user [`Settings`]. Books, variable lists and
//! settings are persisted through the [`BookStore`] seam, by default as JSON
//! with [`JsonStore`].
//!
//! ```
//! use journal_book::{Book, Side};
//!
//! let mut book = Book::new();
//! book.side_mut(Side::Right).content.push_str("Day one.");
//! assert!(book.next_page());
//! assert_eq!(book.len(), 3);
//! ```

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod book;
pub mod error;
pub mod image;
pub mod journal;
pub mod settings;
pub mod store;
pub mod variables;
pub mod wrap;

pub use book::{Book, DeleteState, Page, Side, MIN_PAGES, UNTITLED_LABEL};
pub use error::{JournalError, PersistenceErrorKind, Result};
pub use image::{
    FileBytesLoader, ImageBinding, ImageCache, ImageId, ImageLayout, ImageLoader, NormRect, Tint,
};
pub use journal::Journal;
pub use settings::Settings;
pub use store::{
    list_stems, render_text, BookStore, JsonStore, PersistedBook, PersistedImage, PersistedPage,
};
pub use variables::{VariableEngine, VariableEntry, VariableKind};
pub use wrap::{
    greedy_word_wrap, has_visible_symbols, DEFAULT_WRAP_WIDTH, MAX_WRAP_WIDTH, MIN_WRAP_WIDTH,
};
