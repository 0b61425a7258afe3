use std::cell::RefCell;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use journal_book::{
    DeleteState, ImageLoader, Journal, JournalError, JsonStore, PersistenceErrorKind, Settings,
    Side, VariableKind,
};

/// Loader that records every load and release.
#[derive(Clone, Default)]
struct RecordingLoader {
    missing: HashSet<PathBuf>,
    log: Rc<RefCell<Vec<String>>>,
}

impl ImageLoader for RecordingLoader {
    type Image = PathBuf;

    fn load_image(&mut self, path: &Path) -> io::Result<PathBuf> {
        if self.missing.contains(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such image"));
        }
        self.log
            .borrow_mut()
            .push(format!("load {}", path.display()));
        Ok(path.to_path_buf())
    }

    fn release_image(&mut self, image: PathBuf) {
        self.log
            .borrow_mut()
            .push(format!("release {}", image.display()));
    }
}

fn settings_in(root: &Path) -> Settings {
    Settings {
        books_dir: root.join("books"),
        images_dir: root.join("images"),
        ..Settings::default()
    }
}

#[test]
fn writing_on_the_last_page_grows_the_book() {
    let dir = tempfile::tempdir().unwrap();
    let mut journal = Journal::new(RecordingLoader::default(), settings_in(dir.path()));

    assert!(!journal.next_page());
    assert_eq!(journal.book().len(), 2);

    let right = journal.book().side_index(Side::Right);
    *journal.content_mut(right).unwrap() = "  \t\n".into();
    assert!(!journal.next_page());

    *journal.title_mut(right).unwrap() = "Monday".into();
    assert!(journal.next_page());
    assert_eq!(journal.book().len(), 3);
    assert_eq!(journal.book().current_spread(), 1);
    assert_eq!(journal.book().left().title, "Monday");

    assert!(journal.previous_page());
    assert!(!journal.previous_page());
}

#[test]
fn pages_share_one_image_until_the_last_release() {
    let dir = tempfile::tempdir().unwrap();
    let loader = RecordingLoader::default();
    let log = loader.log.clone();
    let mut journal = Journal::new(loader, settings_in(dir.path()));

    journal.show_image(Side::Left, Path::new("map.dds")).unwrap();
    journal.show_image(Side::Right, Path::new("map.dds")).unwrap();
    journal.show_image(Side::Right, Path::new("map.dds")).unwrap();
    assert_eq!(journal.images().len(), 1);
    assert_eq!(journal.images().total_refcount(), 2);

    journal.hide_image(Side::Left);
    assert_eq!(journal.images().len(), 1);
    journal.hide_image(Side::Right);
    assert!(journal.images().is_empty());

    let expected = dir.path().join("images/map.dds");
    assert_eq!(
        *log.borrow(),
        [
            format!("load {}", expected.display()),
            format!("release {}", expected.display()),
        ]
    );
}

#[test]
fn deletion_needs_confirmation_and_keeps_two_pages() {
    let dir = tempfile::tempdir().unwrap();
    let mut journal = Journal::new(RecordingLoader::default(), settings_in(dir.path()));
    journal.show_image(Side::Right, Path::new("a.dds")).unwrap();

    journal.request_delete(1).unwrap();
    assert_eq!(journal.book().delete_state(), DeleteState::ConfirmPending(1));
    journal.cancel_delete();
    assert!(!journal.confirm_delete());
    assert_eq!(journal.images().len(), 1);

    journal.request_delete(1).unwrap();
    assert!(journal.confirm_delete());
    assert_eq!(journal.book().len(), 2);
    assert!(journal.images().is_empty());

    assert!(matches!(
        journal.request_delete(2),
        Err(JournalError::OutOfRange { index: 2, len: 2 })
    ));
}

#[test]
fn saved_book_reopens_with_images_and_spread() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let path = settings.book_path("trip");

    let mut journal = Journal::new(RecordingLoader::default(), settings.clone());
    *journal.title_mut(1).unwrap() = "Day 1".into();
    assert!(journal.next_page());
    let right = journal.book().side_index(Side::Right);
    *journal.content_mut(right).unwrap() = "Rain all day.".into();
    journal.show_image(Side::Right, Path::new("clouds.dds")).unwrap();
    journal.image_layout_mut(right).unwrap().background = true;
    journal.save_book(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"clouds.dds\""));

    let mut reopened = Journal::new(RecordingLoader::default(), settings);
    reopened.load_book(&path).unwrap();
    assert_eq!(reopened.book().len(), 3);
    assert_eq!(reopened.book().current_spread(), 1);
    assert_eq!(reopened.book().left().title, "Day 1");
    let right = reopened.book().right();
    assert_eq!(right.content, "Rain all day.");
    assert!(right.image().is_bound());
    assert!(right.image().layout.background);
    assert_eq!(reopened.book_path(), Some(path.as_path()));
}

#[test]
fn failed_load_keeps_the_current_book() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    std::fs::create_dir_all(&settings.books_dir).unwrap();
    let broken = settings.book_path("broken");
    std::fs::write(&broken, "{\"pages\": [").unwrap();

    let mut journal = Journal::new(RecordingLoader::default(), settings);
    *journal.title_mut(0).unwrap() = "keep me".into();
    journal.show_image(Side::Left, Path::new("a.dds")).unwrap();

    let err = journal.load_book(&broken).unwrap_err();
    assert_eq!(err.persistence_kind(), Some(PersistenceErrorKind::Decode));
    assert_eq!(journal.book().left().title, "keep me");
    assert_eq!(journal.images().total_refcount(), 1);

    let err = journal.load_legacy(Path::new("old.xml")).unwrap_err();
    assert_eq!(err.persistence_kind(), Some(PersistenceErrorKind::Unsupported));
}

#[test]
fn command_loads_the_named_book_then_searches() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());

    let mut author = Journal::new(RecordingLoader::default(), settings.clone());
    *author.title_mut(0).unwrap() = "Intro".into();
    *author.title_mut(1).unwrap() = "Notes".into();
    author.insert_after(1).unwrap();
    author.insert_after(2).unwrap();
    *author.content_mut(3).unwrap() = "The hidden cave".into();
    author.save_book(&settings.book_path("quest")).unwrap();

    let mut journal = Journal::new(RecordingLoader::default(), settings);
    assert!(journal.command("hidden cave@quest").unwrap());
    assert_eq!(journal.book().len(), 4);
    assert_eq!(journal.book().current_spread(), 2);

    assert!(journal.command("Notes").unwrap());
    assert_eq!(journal.book().current_spread(), 1);

    assert!(journal.command("x@missing").is_err());
    assert_eq!(journal.book().len(), 4);
}

#[test]
fn open_restores_default_book_and_variables() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());

    let mut first = Journal::open(RecordingLoader::default(), settings.clone());
    assert_eq!(first.book().len(), 2);
    assert_eq!(first.book_path(), Some(settings.default_book_path().as_path()));
    *first.title_mut(0).unwrap() = "Hello".into();
    let text = first
        .variables()
        .list()
        .iter()
        .position(|v| v.kind() == VariableKind::Text)
        .unwrap();
    first.variables_mut().duplicate(text, "Greeting").unwrap();
    first.variables_mut().set_params(0, "Dear diary,");
    first.save().unwrap();
    first.save_variables().unwrap();

    let second = Journal::open(RecordingLoader::default(), settings);
    assert_eq!(second.book().left().title, "Hello");
    let greeting = second.variables().get(0).unwrap();
    assert_eq!(greeting.name(), "Greeting");
    assert!(greeting.is_deletable());
    assert_eq!(second.variables().invoke(0).unwrap(), "Dear diary,");
    assert_eq!(second.variables().len(), VariableKind::BUILTINS.len() + 1);
}

#[test]
fn wrap_uses_the_configured_width() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings {
        wrap_width: 40,
        ..settings_in(dir.path())
    };
    let mut journal = Journal::new(RecordingLoader::default(), settings);
    let long = "word ".repeat(20);
    *journal.content_mut(0).unwrap() = long.clone();

    journal.wrap_all();
    let wrapped = &journal.book().left().content;
    assert_eq!(wrapped.len(), long.len());
    assert!(wrapped.lines().all(|line| line.len() <= 40));
    assert!(wrapped.contains('\n'));
}

#[test]
fn plain_text_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut journal =
        Journal::<_, JsonStore>::new(RecordingLoader::default(), settings_in(dir.path()));
    *journal.title_mut(0).unwrap() = "One".into();
    *journal.content_mut(0).unwrap() = "first".into();
    *journal.title_mut(1).unwrap() = "Two".into();

    let out = dir.path().join("export/journal.txt");
    journal.save_text(&out).unwrap();
    assert_eq!(
        std::fs::read_to_string(out).unwrap(),
        "One\n\nfirst\n\nTwo\n\n\n\n"
    );
}

#[test]
fn reopening_without_the_image_keeps_the_text() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let path = settings.book_path("album");

    let mut journal = Journal::new(RecordingLoader::default(), settings.clone());
    *journal.content_mut(0).unwrap() = "Under the bridge".into();
    journal.show_image(Side::Left, Path::new("bridge.dds")).unwrap();
    journal.save_book(&path).unwrap();

    let mut loader = RecordingLoader::default();
    loader.missing.insert(settings.images_dir.join("bridge.dds"));
    let mut reopened = Journal::new(loader, settings);
    reopened.load_book(&path).unwrap();
    assert_eq!(reopened.book().left().content, "Under the bridge");
    assert!(!reopened.book().left().image().is_bound());
    assert!(reopened.images().is_empty());
}

#[test]
fn saving_after_a_missing_image_keeps_the_reference() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_in(dir.path());
    let path = settings.book_path("album");

    let mut journal = Journal::new(RecordingLoader::default(), settings.clone());
    journal.show_image(Side::Left, Path::new("bridge.dds")).unwrap();
    journal.image_layout_mut(0).unwrap().background = true;
    journal.save_book(&path).unwrap();

    let mut loader = RecordingLoader::default();
    loader.missing.insert(settings.images_dir.join("bridge.dds"));
    let mut offline = Journal::new(loader, settings.clone());
    offline.load_book(&path).unwrap();
    let left = offline.book().left().image();
    assert!(!left.is_bound());
    assert_eq!(left.pending_source(), Some(Path::new("bridge.dds")));
    *offline.content_mut(0).unwrap() = "Edited offline".into();
    offline.save().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"bridge.dds\""));

    let mut online = Journal::new(RecordingLoader::default(), settings);
    online.load_book(&path).unwrap();
    let left = online.book().left();
    assert_eq!(left.content, "Edited offline");
    assert!(left.image().is_bound());
    assert!(left.image().layout.background);
    assert_eq!(online.images().total_refcount(), 1);
}

#[test]
fn session_deletes_release_shown_images() {
    let dir = tempfile::tempdir().unwrap();
    let mut journal = Journal::new(RecordingLoader::default(), settings_in(dir.path()));
    journal.show_image(Side::Left, Path::new("a.dds")).unwrap();
    journal.show_image(Side::Right, Path::new("b.dds")).unwrap();
    journal.insert_after(1).unwrap();
    journal.select_page(2).unwrap();
    assert_eq!(journal.book().side_index(Side::Right), 2);
    journal.show_image(Side::Right, Path::new("a.dds")).unwrap();
    assert_eq!(journal.images().len(), 2);
    assert_eq!(journal.images().total_refcount(), 3);

    *journal.title_mut(2).unwrap() = "overwritten".into();
    journal.append_text(Side::Left, "more");
    assert_eq!(journal.images().total_refcount(), 3);

    while journal.book().pages().iter().any(|p| p.image().is_bound()) {
        let index = journal
            .book()
            .pages()
            .iter()
            .position(|p| p.image().is_bound())
            .unwrap();
        journal.request_delete(index).unwrap();
        assert!(journal.confirm_delete());
    }
    assert_eq!(journal.images().total_refcount(), 0);
    assert!(journal.images().is_empty());
    assert_eq!(journal.book().len(), 2);
}
