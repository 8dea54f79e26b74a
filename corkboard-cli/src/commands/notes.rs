//! List collections and notes from the local cache.

use crate::context::Context;
use anyhow::Result;
use serde_json::json;

pub fn list_notes(ctx: &Context, json: bool) -> Result<()> {
    let workspace = ctx.workspace();

    if json {
        let collections: Vec<_> = workspace
            .ordered_collections()
            .map(|c| {
                let notes: Vec<_> = c
                    .ordered_notes()
                    .map(|n| {
                        json!({
                            "id": n.id,
                            "title": n.title,
                            "version": n.version,
                            "boxes": n.boxes.len(),
                            "updatedAt": n.updated_at,
                        })
                    })
                    .collect();
                json!({ "id": c.id, "title": c.title, "notes": notes })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&collections)?);
        return Ok(());
    }

    if workspace.collections.is_empty() {
        println!("No collections cached.");
        return Ok(());
    }
    for collection in workspace.ordered_collections() {
        println!("{} [{}]", collection.title, collection.id);
        for note in collection.ordered_notes() {
            println!(
                "  - {} [{}] v{}, {} box(es)",
                note.title,
                note.id,
                note.version,
                note.boxes.len()
            );
        }
    }
    Ok(())
}
