//! Text variables: named producers whose output is pasted into pages.
//!
//! Built-in entries have fixed parameters and cannot be deleted. Copies made
//! with [`VariableEngine::duplicate`] are user entries: editable, deletable
//! and saved with the user's variable list. Producers never fail; problems
//! show up in the produced text.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JournalError, Result};

/// Built-in producer behind a variable entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableKind {
    /// Local wall-clock time, formatted with strftime params.
    LocalTime,
    /// UTC time, formatted with strftime params.
    UtcTime,
    /// Local calendar date, formatted with strftime params.
    Date,
    /// Params echoed verbatim.
    Text,
}

impl VariableKind {
    /// Every built-in, in default display order.
    pub const BUILTINS: [VariableKind; 4] =
        [Self::LocalTime, Self::Date, Self::UtcTime, Self::Text];

    /// Produce text for `params`.
    pub fn produce(self, params: &str) -> String {
        match self {
            Self::LocalTime | Self::Date => format_time(Local::now(), params),
            Self::UtcTime => format_time(Utc::now(), params),
            Self::Text => params.to_string(),
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            Self::LocalTime => "Local time",
            Self::UtcTime => "UTC time",
            Self::Date => "Date",
            Self::Text => "Text",
        }
    }

    fn default_params(self) -> &'static str {
        match self {
            Self::LocalTime | Self::UtcTime => "%Y-%m-%d %H:%M",
            Self::Date => "%A, %d %B %Y",
            Self::Text => "",
        }
    }

    fn info(self) -> &'static str {
        match self {
            Self::LocalTime => {
                "Current local time.\n\
                 Parameters: strftime format, e.g. %H:%M or %Y-%m-%d %H:%M:%S.\n\
                 Make a copy to change the format."
            }
            Self::UtcTime => {
                "Current UTC time.\n\
                 Parameters: strftime format, e.g. %H:%M or %Y-%m-%dT%H:%M:%SZ.\n\
                 Make a copy to change the format."
            }
            Self::Date => {
                "Current local date.\n\
                 Parameters: strftime format, e.g. %d.%m.%Y or %A.\n\
                 Make a copy to change the format."
            }
            Self::Text => {
                "Text snippet.\n\
                 Parameters: the text to insert, verbatim.\n\
                 Make a copy and type the snippet into its parameters."
            }
        }
    }
}

fn format_time<Tz>(now: DateTime<Tz>, params: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: core::fmt::Display,
{
    let items: Vec<Item<'_>> = StrftimeItems::new(params).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return format!("(invalid format: {})", params);
    }
    let mut out = String::with_capacity(params.len() + 16);
    if write!(out, "{}", now.format_with_items(items.iter())).is_err() {
        return format!("(invalid format: {})", params);
    }
    out
}

/// A named, invocable, optionally editable text producer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableEntry {
    name: String,
    params: String,
    #[serde(default)]
    info: String,
    deletable: bool,
    kind: VariableKind,
}

impl VariableEntry {
    /// Read-only built-in entry.
    pub fn builtin(kind: VariableKind) -> Self {
        Self {
            name: kind.default_name().to_string(),
            params: kind.default_params().to_string(),
            info: kind.info().to_string(),
            deletable: false,
            kind,
        }
    }

    /// Editable user entry.
    pub fn user(kind: VariableKind, name: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: params.into(),
            info: kind.info().to_string(),
            deletable: true,
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &str {
        &self.params
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    /// User entries are deletable and editable; built-ins are neither.
    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    pub fn is_editable(&self) -> bool {
        self.deletable
    }

    /// Produce this entry's text from its current params.
    pub fn invoke(&self) -> String {
        self.kind.produce(&self.params)
    }
}

/// Ordered list of variable entries. Order is display and precedence order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableEngine {
    entries: Vec<VariableEntry>,
}

impl Default for VariableEngine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl VariableEngine {
    /// Engine holding only the built-ins.
    pub fn with_builtins() -> Self {
        Self {
            entries: VariableKind::BUILTINS
                .iter()
                .map(|&kind| VariableEntry::builtin(kind))
                .collect(),
        }
    }

    /// Rebuild an engine from a saved list.
    ///
    /// Saved order is kept. Built-ins get their fixed name, params and help
    /// text back, missing built-ins are appended, duplicated built-ins are
    /// dropped, and every other entry becomes a user entry.
    pub fn restore(saved: Vec<VariableEntry>) -> Self {
        let mut entries = Vec::with_capacity(saved.len() + VariableKind::BUILTINS.len());
        let mut seen = Vec::with_capacity(VariableKind::BUILTINS.len());
        for entry in saved {
            if entry.deletable {
                entries.push(VariableEntry::user(entry.kind, entry.name, entry.params));
            } else if !seen.contains(&entry.kind) {
                seen.push(entry.kind);
                entries.push(VariableEntry::builtin(entry.kind));
            }
        }
        for kind in VariableKind::BUILTINS {
            if !seen.contains(&kind) {
                entries.push(VariableEntry::builtin(kind));
            }
        }
        Self { entries }
    }

    pub fn list(&self) -> &[VariableEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VariableEntry> {
        self.entries.get(index)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.entries.len() {
            Ok(())
        } else {
            Err(JournalError::OutOfRange {
                index,
                len: self.entries.len(),
            })
        }
    }

    /// Swap entry `index` with its predecessor. Returns whether it moved.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.entries.len() {
            return false;
        }
        self.entries.swap(index, index - 1);
        true
    }

    /// Swap entry `index` with its successor. Returns whether it moved.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index >= self.entries.len().saturating_sub(1) {
            return false;
        }
        self.entries.swap(index, index + 1);
        true
    }

    /// Copy entry `index` under `new_name` as an editable user entry at the
    /// front of the list. Returns the copy's index, always `0`.
    pub fn duplicate(&mut self, index: usize, new_name: impl Into<String>) -> Result<usize> {
        self.check_index(index)?;
        let mut copy = self.entries[index].clone();
        copy.name = new_name.into();
        copy.deletable = true;
        self.entries.insert(0, copy);
        Ok(0)
    }

    /// Remove a user entry.
    pub fn delete(&mut self, index: usize) -> Result<VariableEntry> {
        self.check_index(index)?;
        if !self.entries[index].deletable {
            return Err(JournalError::Immutable { index });
        }
        Ok(self.entries.remove(index))
    }

    /// Produce text from entry `index`.
    pub fn invoke(&self, index: usize) -> Result<String> {
        self.check_index(index)?;
        Ok(self.entries[index].invoke())
    }

    /// Replace a user entry's params. Built-ins and unknown indices are left
    /// alone. Returns whether the params changed.
    pub fn set_params(&mut self, index: usize, params: impl Into<String>) -> bool {
        match self.entries.get_mut(index) {
            Some(entry) if entry.deletable => {
                entry.params = params.into();
                true
            }
            _ => false,
        }
    }

    /// Help text of entry `index`.
    pub fn info(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(VariableEntry::info)
    }
}
