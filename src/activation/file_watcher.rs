//! Credentials file change detection using the `notify` crate.
//!
//! Watches the directory holding the credentials file (the file itself is
//! replaced by rename on every save, which would drop a direct watch) and
//! emits [`PlatformSignal::CredentialsFileChanged`] for events on that file.

use std::ffi::OsString;
use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::source::ActivationSource;
use super::types::PlatformSignal;

fn is_relevant(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

/// Spawn the file watcher.
///
/// Returns the watcher handle (MUST be kept alive - dropping it stops watching).
pub fn spawn_file_watcher(
    credentials_path: &Path,
    source: ActivationSource,
) -> notify::Result<RecommendedWatcher> {
    let file_name = credentials_path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| notify::Error::generic("credentials path has no file name"))?;
    let dir = credentials_path
        .parent()
        .ok_or_else(|| notify::Error::generic("credentials path has no parent directory"))?;
    std::fs::create_dir_all(dir).map_err(notify::Error::io)?;

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event, &file_name) => {
            tracing::debug!("Credentials file event: {:?}", event.kind);
            if !source.emit(PlatformSignal::CredentialsFileChanged) {
                tracing::debug!("Activation loop gone, ignoring file event");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!("Credentials file watcher error: {}", e),
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;

    tracing::info!("Watching {} for credential changes", credentials_path.display());
    Ok(watcher)
}
