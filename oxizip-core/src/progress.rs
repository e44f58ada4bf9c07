//! Advisory progress reporting.
//!
//! Long running archive operations report what they are doing to a
//! [`ProgressSink`]. Sinks only observe: nothing they do can change the
//! outcome of the operation that called them.

/// Events emitted while saving or extracting an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveEvent<'a> {
    /// A save is about to write `entries` entries.
    SaveStarted {
        /// Number of entries that will be written.
        entries: usize,
    },
    /// One entry has been written to the output.
    EntrySaved {
        /// Position of the entry in the central directory.
        index: usize,
        /// Entry name.
        name: &'a str,
        /// Uncompressed size in bytes.
        size: u64,
    },
    /// The end of central directory record has been written.
    SaveCompleted {
        /// Number of entries in the saved archive.
        entries: usize,
        /// Total size of the archive in bytes.
        bytes: u64,
    },
    /// An extraction of `entries` entries is starting.
    ExtractStarted {
        /// Number of entries selected for extraction.
        entries: usize,
    },
    /// One entry has been handled.
    EntryExtracted {
        /// Position of the entry in the archive.
        index: usize,
        /// Entry name.
        name: &'a str,
        /// Uncompressed size in bytes.
        size: u64,
        /// The entry was skipped by the overwrite policy.
        skipped: bool,
    },
    /// Extraction finished, successfully or not.
    ExtractCompleted {
        /// Entries written to disk.
        extracted: usize,
        /// Entries skipped or failed.
        not_extracted: usize,
    },
}

/// Receiver for [`ArchiveEvent`]s.
///
/// Implementations must be cheap; they are called on the thread doing the
/// work, between entries.
pub trait ProgressSink {
    /// Handle one event.
    fn on_event(&self, event: &ArchiveEvent<'_>);
}

/// A sink that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_event(&self, _event: &ArchiveEvent<'_>) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&ArchiveEvent<'_>),
{
    fn on_event(&self, event: &ArchiveEvent<'_>) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_closure_sink() {
        let seen = RefCell::new(Vec::new());
        let sink = |event: &ArchiveEvent<'_>| {
            if let ArchiveEvent::EntrySaved { name, .. } = event {
                seen.borrow_mut().push(name.to_string());
            }
        };

        sink.on_event(&ArchiveEvent::SaveStarted { entries: 1 });
        sink.on_event(&ArchiveEvent::EntrySaved {
            index: 0,
            name: "a.txt",
            size: 3,
        });
        sink.on_event(&ArchiveEvent::SaveCompleted {
            entries: 1,
            bytes: 120,
        });

        assert_eq!(seen.into_inner(), vec!["a.txt".to_string()]);
    }

    #[test]
    fn test_no_progress() {
        NoProgress.on_event(&ArchiveEvent::ExtractStarted { entries: 0 });
    }
}
