//! journal-book - inspect and maintain journal books

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use journal_book::{FileBytesLoader, Journal, Settings, VariableEngine};

#[derive(Parser)]
#[command(name = "journal-book")]
#[command(version, about = "Inspect and maintain journal books", long_about = None)]
#[command(after_help = "EXAMPLES:
    journal-book pages trip.json              List page titles
    journal-book wrap trip.json --width 80    Rewrap every page
    journal-book find trip.json harbour       Show the matching spread")]
struct Cli {
    /// Settings file
    #[arg(long, env = "JOURNAL_SETTINGS", value_name = "PATH")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List chapter labels, one per page
    Pages { book: PathBuf },
    /// Rewrap every page in place
    Wrap {
        book: PathBuf,
        /// Column width (defaults to the settings value)
        #[arg(short, long)]
        width: Option<u32>,
    },
    /// Write the book as plain text
    Export { book: PathBuf, output: PathBuf },
    /// Print every built-in variable with its current output
    Vars,
    /// Print the spread a journal command would open
    Find { book: PathBuf, text: String },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), journal_book::JournalError> {
    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.command {
        Command::Pages { book } => {
            let journal = open_book(settings, &book)?;
            for (index, label) in journal.book().chapter_titles().enumerate() {
                println!("{:>4}  {label}", index + 1);
            }
        }
        Command::Wrap { book, width } => {
            let settings = match width {
                Some(width) => Settings {
                    wrap_width: width,
                    ..settings
                },
                None => settings,
            };
            let mut journal = open_book(settings, &book)?;
            journal.wrap_all();
            journal.save_book(&book)?;
            println!(
                "Wrapped {} pages at {} columns",
                journal.book().len(),
                journal.settings().wrap_width
            );
        }
        Command::Export { book, output } => {
            let journal = open_book(settings, &book)?;
            journal.save_text(&output)?;
            println!("Wrote {}", output.display());
        }
        Command::Vars => {
            let variables = VariableEngine::with_builtins();
            for entry in variables.list() {
                println!("{}: {}", entry.name(), entry.invoke());
            }
        }
        Command::Find { book, text } => {
            let mut journal = open_book(settings, &book)?;
            if !journal.command(&text)? {
                println!("No page mentions {text:?}");
                return Ok(());
            }
            let spread = journal.book().current_spread();
            for (offset, page) in [journal.book().left(), journal.book().right()]
                .into_iter()
                .enumerate()
            {
                println!("--- page {} ---", spread + offset + 1);
                println!("{}", page.title);
                println!();
                println!("{}", page.content);
            }
        }
    }
    Ok(())
}

fn open_book(
    settings: Settings,
    path: &Path,
) -> Result<Journal<FileBytesLoader>, journal_book::JournalError> {
    let mut journal = Journal::new(FileBytesLoader::default(), settings);
    journal.load_book(path)?;
    Ok(journal)
}
