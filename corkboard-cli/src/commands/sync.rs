//! Headless sync session for one note.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context as _, Result};
use corkboard_core::clock::StampClock;
use corkboard_core::workspace::{Note, Workspace};
use corkboard_sync::{
    CanvasSession, EngineConfig, NoteApi, PushClient, RemoteNote, RestClient,
    SyncDriver,
};
use corkboard_types::{CollectionId, NoteId};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::context::Context;

/// Open `note_id`, bring it up to date with the server and keep it synced
/// until Ctrl-C.
pub async fn sync_note(
    ctx: &Context,
    collection_id: &str,
    note_id: &str,
    use_push: bool,
) -> Result<()> {
    let collection_id = CollectionId::from(collection_id);
    let note_id = NoteId::from(note_id);
    let config = &ctx.config;

    let rest = Arc::new(RestClient::from_config(config).context("Invalid API configuration")?);
    let mut workspace = ctx.workspace();
    let clock = StampClock::system();

    match rest.get_note(&note_id).await {
        Ok(remote) => adopt_remote(&mut workspace, &collection_id, remote, &clock)?,
        Err(err) if err.is_unreachable() => {
            warn!(note_id = %note_id, %err, "Server unreachable, starting from the local cache");
        }
        Err(err) => return Err(err).context(format!("Failed to fetch note '{}'", note_id)),
    }
    let collection_id = owning_collection(&workspace, collection_id, &note_id);

    let push_enabled = use_push && config.ws_enabled;
    let engine = EngineConfig {
        push_enabled,
        ..EngineConfig::from_config(config)
    };
    let now = Instant::now();
    let mut session = CanvasSession::new(
        workspace,
        ctx.store.clone(),
        engine,
        config.history_capacity,
        clock,
        now,
    );
    let effects = session
        .open_note(collection_id, note_id.clone(), now)
        .with_context(|| format!("Note '{}' is not in the local cache", note_id))?;

    let (push, inbound, push_task) = if push_enabled {
        let client = PushClient::new(
            config.ws_url.as_str(),
            config.sync.reconnect_base(),
            config.sync.reconnect_max(),
        );
        let (handle, inbound, task) = client.spawn();
        (Some(handle), Some(inbound), Some(task))
    } else {
        (None, None, None)
    };

    let session = Arc::new(Mutex::new(session));
    let driver = SyncDriver::new(session, rest, push);
    driver.execute(effects);

    info!(note_id = %note_id, push = push_enabled, "Syncing, press Ctrl-C to stop");
    driver
        .run(inbound, async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "Failed to listen for Ctrl-C");
            }
        })
        .await?;

    if let Some(task) = push_task {
        let _ = task.await;
    }
    Ok(())
}

/// The collection that holds `note_id` in the cache, falling back to the
/// one asked for.
fn owning_collection(
    workspace: &Workspace,
    requested: CollectionId,
    note_id: &NoteId,
) -> CollectionId {
    match workspace.find_note(note_id) {
        Some((owner, _)) if owner != &requested => {
            warn!(
                note_id = %note_id,
                requested = %requested,
                owner = %owner,
                "Note is cached under another collection, opening it there"
            );
            owner.clone()
        }
        _ => requested,
    }
}

/// Merge the server copy of a note into the cached workspace, creating the
/// collection and note when missing. A note already cached elsewhere is
/// updated where it is. Never lowers the cached version.
fn adopt_remote(
    workspace: &mut Workspace,
    collection_id: &CollectionId,
    remote: RemoteNote,
    clock: &StampClock,
) -> Result<()> {
    let now = clock.now_utc();
    if workspace.find_note(&remote.id).is_none() {
        if workspace.collection(collection_id).is_err() {
            workspace.create_collection(collection_id.clone(), collection_id.as_str())?;
        }
        let title = remote.title.clone().unwrap_or_else(|| "Untitled".to_string());
        let mut note = Note::new(remote.id.clone(), title, now);
        note.boxes = remote.boxes;
        note.version = remote.version.max(1);
        if let Some(zoom) = remote.zoom {
            note.zoom = zoom;
        }
        if let Some(pan) = remote.pan {
            note.pan = pan;
        }
        workspace.insert_note(collection_id, note)?;
        return Ok(());
    }
    let cached = workspace
        .find_note(&remote.id)
        .map_or(0, |(_, n)| n.version);
    if remote.version > cached {
        info!(note_id = %remote.id, from = cached, to = remote.version, "Pulled newer server copy");
        workspace.apply_remote_update(&remote.id, remote.boxes, remote.version, now);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str, version: u64) -> RemoteNote {
        RemoteNote {
            id: id.into(),
            title: Some("Plan".into()),
            boxes: vec![],
            version,
            zoom: None,
            pan: None,
        }
    }

    #[test]
    fn note_cached_elsewhere_is_updated_and_opened_in_place() {
        let clock = StampClock::manual(1_700_000_000_000);
        let mut workspace = Workspace::new();
        workspace.create_collection("home".into(), "Home").unwrap();
        workspace
            .create_note(&"home".into(), "n".into(), "Plan", clock.now_utc())
            .unwrap();

        adopt_remote(&mut workspace, &"work".into(), remote("n", 7), &clock).unwrap();
        assert!(workspace.collection(&"work".into()).is_err());
        assert_eq!(workspace.note(&"home".into(), &"n".into()).unwrap().version, 7);

        let owner = owning_collection(&workspace, "work".into(), &"n".into());
        assert_eq!(owner, CollectionId::new("home"));
    }

    #[test]
    fn unknown_note_is_created_in_the_requested_collection() {
        let clock = StampClock::manual(1_700_000_000_000);
        let mut workspace = Workspace::new();

        adopt_remote(&mut workspace, &"work".into(), remote("n", 3), &clock).unwrap();
        let note = workspace.note(&"work".into(), &"n".into()).unwrap();
        assert_eq!((note.title.as_str(), note.version), ("Plan", 3));
        assert_eq!(
            owning_collection(&workspace, "work".into(), &"n".into()),
            CollectionId::new("work")
        );
    }
}
