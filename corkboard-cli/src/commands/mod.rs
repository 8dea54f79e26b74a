//! CLI command implementations.

pub mod export;
pub mod notes;
pub mod show;
pub mod sync;

pub use export::{export_workspace, import_workspace};
pub use notes::list_notes;
pub use show::show_note;
pub use sync::sync_note;
