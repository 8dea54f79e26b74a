//! Print one cached note box by box.

use crate::context::Context;
use anyhow::{Context as _, Result};
use corkboard_types::NoteId;

pub fn show_note(ctx: &Context, note_id: &str, json: bool) -> Result<()> {
    let workspace = ctx.workspace();
    let id = NoteId::from(note_id);
    let (collection_id, note) = workspace
        .find_note(&id)
        .with_context(|| format!("Note '{}' not found in the local cache", note_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(note)?);
        return Ok(());
    }

    println!("{} [{}] in {}", note.title, note.id, collection_id);
    println!(
        "version {}, zoom {:.2}, pan ({:.0}, {:.0})",
        note.version, note.zoom, note.pan.x, note.pan.y
    );
    let mut boxes: Vec<_> = note.boxes.iter().collect();
    boxes.sort_by_key(|b| b.z_index);
    for b in boxes {
        println!();
        println!(
            "{} at ({:.0}, {:.0}) {:.0}x{:.0} z={}",
            b.id, b.x, b.y, b.width, b.height, b.z_index
        );
        for text in b.content.block_texts() {
            for line in text.lines().filter(|l| !l.trim().is_empty()) {
                println!("  {line}");
            }
        }
    }
    Ok(())
}
