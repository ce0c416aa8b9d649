//! Per-kind event handlers
//!
//! Handlers are set once, before watching starts, and are called
//! synchronously from the dispatch engine. Kinds without a handler are
//! no-ops. Handlers are expected not to panic: a panicking handler stops the
//! dispatch engine for the rest of the session.

use crate::events::{EventKind, RawEvent};
use std::fmt;
use std::path::Path;

type PathHandler = Box<dyn Fn(&Path) + Send + Sync>;
type RenameHandler = Box<dyn Fn(&Path, &Path) + Send + Sync>;

/// Table of handlers, one optional closure per [`EventKind`]
#[derive(Default)]
pub struct Handlers {
    file_added: Option<PathHandler>,
    file_removed: Option<PathHandler>,
    file_modified: Option<PathHandler>,
    file_renamed: Option<RenameHandler>,
    folder_added: Option<PathHandler>,
    folder_removed: Option<PathHandler>,
    folder_modified: Option<PathHandler>,
    folder_renamed: Option<RenameHandler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_file_added(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.file_added = Some(Box::new(f));
        self
    }

    pub fn on_file_removed(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.file_removed = Some(Box::new(f));
        self
    }

    pub fn on_file_modified(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.file_modified = Some(Box::new(f));
        self
    }

    /// Called with `(old_path, new_path)`
    pub fn on_file_renamed(mut self, f: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        self.file_renamed = Some(Box::new(f));
        self
    }

    pub fn on_folder_added(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.folder_added = Some(Box::new(f));
        self
    }

    pub fn on_folder_removed(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.folder_removed = Some(Box::new(f));
        self
    }

    pub fn on_folder_modified(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.folder_modified = Some(Box::new(f));
        self
    }

    /// Called with `(old_path, new_path)`
    pub fn on_folder_renamed(
        mut self,
        f: impl Fn(&Path, &Path) + Send + Sync + 'static,
    ) -> Self {
        self.folder_renamed = Some(Box::new(f));
        self
    }

    /// Whether a handler is registered for `kind`
    pub fn handles(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::FileAdded => self.file_added.is_some(),
            EventKind::FileRemoved => self.file_removed.is_some(),
            EventKind::FileModified => self.file_modified.is_some(),
            EventKind::FileRenamed => self.file_renamed.is_some(),
            EventKind::FolderAdded => self.folder_added.is_some(),
            EventKind::FolderRemoved => self.folder_removed.is_some(),
            EventKind::FolderModified => self.folder_modified.is_some(),
            EventKind::FolderRenamed => self.folder_renamed.is_some(),
        }
    }

    /// Invoke the handler registered for the event's kind
    pub(crate) fn dispatch(&self, event: &RawEvent) {
        let single = match event.kind() {
            EventKind::FileAdded => &self.file_added,
            EventKind::FileRemoved => &self.file_removed,
            EventKind::FileModified => &self.file_modified,
            EventKind::FolderAdded => &self.folder_added,
            EventKind::FolderRemoved => &self.folder_removed,
            EventKind::FolderModified => &self.folder_modified,
            EventKind::FileRenamed => {
                return call_rename(&self.file_renamed, event);
            }
            EventKind::FolderRenamed => {
                return call_rename(&self.folder_renamed, event);
            }
        };
        if let Some(handler) = single {
            handler(event.path());
        }
    }
}

fn call_rename(handler: &Option<RenameHandler>, event: &RawEvent) {
    if let Some(handler) = handler {
        handler(event.old_path(), event.new_path());
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<_> = EventKind::all()
            .iter()
            .filter(|kind| self.handles(*kind))
            .map(EventKind::as_str)
            .collect();
        f.debug_struct("Handlers")
            .field("registered", &registered)
            .finish()
    }
}
