//! Decoding of native notifications into [`RawEvent`]s
//!
//! Backends report renames as two halves (old name, then new name), as one
//! combined notification carrying both paths, or as both. The decoder merges
//! adjacent halves, suppresses a combined notification that repeats the pair
//! it just merged, and drops an old-name half that is not immediately
//! followed by its partner.

use crate::events::{EntryType, RawEvent};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event as NotifyEvent, EventKind as NotifyKind};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

/// A buffer entry that cannot be decoded; ends the current listening pass
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The backend lost events and asked for a rescan
    #[error("notification buffer overflowed")]
    Overflow,
    /// The watched directory itself went away
    #[error("watched directory {} was removed", .0.display())]
    RootRemoved(PathBuf),
    /// An entry did not carry the paths its kind requires
    #[error("malformed notification: {0}")]
    Malformed(String),
}

/// Stateful decoder for one listening pass
#[derive(Debug)]
pub struct NativeDecoder {
    root: PathBuf,
    pending_old: Option<PathBuf>,
    last_pair: Option<(PathBuf, PathBuf)>,
}

impl NativeDecoder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending_old: None,
            last_pair: None,
        }
    }

    /// Whether an old-name half is waiting for its new-name partner
    pub fn has_pending_rename(&self) -> bool {
        self.pending_old.is_some()
    }

    /// Decode one native notification, appending the results to `out`
    pub fn decode(
        &mut self,
        event: &NotifyEvent,
        out: &mut Vec<RawEvent>,
    ) -> Result<(), DecodeError> {
        if event.need_rescan() {
            return Err(DecodeError::Overflow);
        }

        match event.kind {
            NotifyKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let path = single_path(event)?;
                self.drop_orphan();
                self.last_pair = None;
                self.pending_old = Some(path.to_path_buf());
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let path = single_path(event)?;
                self.new_name(path, out);
            }
            NotifyKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let (from, to) = path_pair(event)?;
                self.drop_orphan();
                let repeat = self
                    .last_pair
                    .take()
                    .is_some_and(|(old, new)| old == from && new == to);
                if repeat {
                    trace!("Skipping combined rename already merged from halves");
                } else {
                    out.push(RawEvent::renamed(entry_type_on_disk(to), from, to));
                }
            }
            NotifyKind::Modify(ModifyKind::Name(_)) => {
                // Backends that cannot tell the halves apart: the half whose
                // path still exists is the new name
                let path = single_path(event)?;
                if path.exists() {
                    self.new_name(path, out);
                } else {
                    self.drop_orphan();
                    self.last_pair = None;
                    self.pending_old = Some(path.to_path_buf());
                }
            }
            ref kind => {
                self.drop_orphan();
                self.last_pair = None;
                self.decode_plain(kind, event, out)?;
            }
        }

        Ok(())
    }

    /// End of buffer: an old-name half still waiting is an orphan
    pub fn finish_buffer(&mut self) {
        self.drop_orphan();
    }

    fn new_name(&mut self, path: &Path, out: &mut Vec<RawEvent>) {
        let entry = entry_type_on_disk(path);
        match self.pending_old.take() {
            Some(old) => {
                self.last_pair = Some((old.clone(), path.to_path_buf()));
                out.push(RawEvent::renamed(entry, old, path));
            }
            None => {
                // Moved in from outside the watched tree
                self.last_pair = None;
                out.push(RawEvent::added(entry, path));
            }
        }
    }

    fn decode_plain(
        &self,
        kind: &NotifyKind,
        event: &NotifyEvent,
        out: &mut Vec<RawEvent>,
    ) -> Result<(), DecodeError> {
        match kind {
            NotifyKind::Create(create) => {
                for path in &event.paths {
                    let entry = match create {
                        CreateKind::File => EntryType::File,
                        CreateKind::Folder => EntryType::Folder,
                        _ => entry_type_on_disk(path),
                    };
                    out.push(RawEvent::added(entry, path));
                }
            }
            NotifyKind::Remove(remove) => {
                for path in &event.paths {
                    if path == &self.root {
                        return Err(DecodeError::RootRemoved(path.clone()));
                    }
                    let entry = match remove {
                        RemoveKind::Folder => EntryType::Folder,
                        _ => EntryType::File,
                    };
                    out.push(RawEvent::removed(entry, path));
                }
            }
            NotifyKind::Modify(ModifyKind::Data(_)) | NotifyKind::Modify(ModifyKind::Any) => {
                for path in &event.paths {
                    if path == &self.root {
                        continue;
                    }
                    out.push(RawEvent::modified(entry_type_on_disk(path), path));
                }
            }
            other => trace!("Ignoring native event {:?}", other),
        }
        Ok(())
    }

    fn drop_orphan(&mut self) {
        if let Some(old) = self.pending_old.take() {
            warn!(
                path = %old.display(),
                "Dropping old-name rename notification without a matching new-name notification"
            );
        }
    }
}

fn single_path(event: &NotifyEvent) -> Result<&Path, DecodeError> {
    match event.paths.as_slice() {
        [path] => Ok(path),
        paths => Err(DecodeError::Malformed(format!(
            "{:?} expects one path, got {}",
            event.kind,
            paths.len()
        ))),
    }
}

fn path_pair(event: &NotifyEvent) -> Result<(&Path, &Path), DecodeError> {
    match event.paths.as_slice() {
        [from, to] => Ok((from, to)),
        paths => Err(DecodeError::Malformed(format!(
            "combined rename expects two paths, got {}",
            paths.len()
        ))),
    }
}

fn entry_type_on_disk(path: &Path) -> EntryType {
    if path.is_dir() {
        EntryType::Folder
    } else {
        EntryType::File
    }
}
