//! Watch event types
//!
//! This module defines the closed set of event kinds a caller can subscribe
//! to and the immutable [`RawEvent`] produced by decoding native
//! notifications.

use dirwatch_core::error::Error;
use enumflags2::{bitflags, BitFlags};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of change reported to handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[bitflags]
#[repr(u8)]
pub enum EventKind {
    FileAdded,
    FileRemoved,
    FileModified,
    FileRenamed,
    FolderAdded,
    FolderRemoved,
    FolderModified,
    FolderRenamed,
}

/// Set of subscribed event kinds
pub type EventKindSet = BitFlags<EventKind>;

/// Whether a changed entry is a regular file or a folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Folder,
}

impl EventKind {
    /// Every kind, the default subscription
    pub fn all() -> EventKindSet {
        BitFlags::all()
    }

    /// Kinds that are held back until the target can be opened for read
    pub fn gated() -> EventKindSet {
        EventKind::FileAdded | EventKind::FileModified | EventKind::FileRenamed
    }

    /// Whether this kind must pass the readiness gate
    pub fn is_gated(self) -> bool {
        Self::gated().contains(self)
    }

    /// Whether this kind refers to a folder
    pub fn is_folder(self) -> bool {
        matches!(
            self,
            Self::FolderAdded | Self::FolderRemoved | Self::FolderModified | Self::FolderRenamed
        )
    }

    /// Stable kebab-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileAdded => "file-added",
            Self::FileRemoved => "file-removed",
            Self::FileModified => "file-modified",
            Self::FileRenamed => "file-renamed",
            Self::FolderAdded => "folder-added",
            Self::FolderRemoved => "folder-removed",
            Self::FolderModified => "folder-modified",
            Self::FolderRenamed => "folder-renamed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::all()
            .iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::invalid_input(format!("Unknown event kind '{s}'")))
    }
}

/// A decoded, not-yet-filtered change notification
///
/// Removed events carry only `old_path`, added and modified events carry
/// only `new_path`, renamed events carry both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    kind: EventKind,
    new_path: PathBuf,
    old_path: PathBuf,
}

impl RawEvent {
    /// An entry appeared at `path`
    pub fn added(entry: EntryType, path: impl Into<PathBuf>) -> Self {
        let kind = match entry {
            EntryType::File => EventKind::FileAdded,
            EntryType::Folder => EventKind::FolderAdded,
        };
        Self {
            kind,
            new_path: path.into(),
            old_path: PathBuf::new(),
        }
    }

    /// The entry at `path` vanished
    pub fn removed(entry: EntryType, path: impl Into<PathBuf>) -> Self {
        let kind = match entry {
            EntryType::File => EventKind::FileRemoved,
            EntryType::Folder => EventKind::FolderRemoved,
        };
        Self {
            kind,
            new_path: PathBuf::new(),
            old_path: path.into(),
        }
    }

    /// The entry at `path` changed in place
    pub fn modified(entry: EntryType, path: impl Into<PathBuf>) -> Self {
        let kind = match entry {
            EntryType::File => EventKind::FileModified,
            EntryType::Folder => EventKind::FolderModified,
        };
        Self {
            kind,
            new_path: path.into(),
            old_path: PathBuf::new(),
        }
    }

    /// The entry moved from `old_path` to `new_path`
    pub fn renamed(
        entry: EntryType,
        old_path: impl Into<PathBuf>,
        new_path: impl Into<PathBuf>,
    ) -> Self {
        let kind = match entry {
            EntryType::File => EventKind::FileRenamed,
            EntryType::Folder => EventKind::FolderRenamed,
        };
        Self {
            kind,
            new_path: new_path.into(),
            old_path: old_path.into(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Post-change path; empty for removals
    pub fn new_path(&self) -> &Path {
        &self.new_path
    }

    /// Pre-change path; empty for additions and modifications
    pub fn old_path(&self) -> &Path {
        &self.old_path
    }

    /// The path the event is about: the vanished path for removals, the
    /// current path otherwise
    pub fn path(&self) -> &Path {
        match self.kind {
            EventKind::FileRemoved | EventKind::FolderRemoved => &self.old_path,
            _ => &self.new_path,
        }
    }
}
