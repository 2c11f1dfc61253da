use crate::provider::Provider;

/// Change notification emitted after every committed write. Subscribers
/// re-run their query on any event that can affect it; events carry no row
/// data, so a missed event only costs one extra re-query.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    FilesChanged {
        provider: Provider,
        /// `None` when the write did not know which folder it touched
        /// (single-row updates); treated as "could be any folder".
        folder_id: Option<String>,
    },
    FoldersChanged {
        provider: Provider,
    },
    CoversChanged {
        id: String,
    },
    SettingsChanged,
}

impl StoreEvent {
    /// Whether this event can change the result of a files-by-folder query.
    pub fn touches_files(&self, provider: Provider, folder_id: &str) -> bool {
        match self {
            StoreEvent::FilesChanged {
                provider: p,
                folder_id: f,
            } => *p == provider && f.as_deref().is_none_or(|f| f == folder_id),
            _ => false,
        }
    }
}
