//! Room template and symbol pool catalogue for Glyphmatch.
//!
//! The catalogue is the read-only lookup the room core consumes at room
//! creation time: `theme id -> {max_players, display_name, palette}` plus
//! a per-theme symbol pool with a built-in default fallback. It is loaded
//! once from a JSON file (or built from the compiled-in defaults) and
//! never mutated at runtime.

mod catalog;
mod error;

pub use catalog::{RoomTemplate, ThemeCatalog, DEFAULT_SYMBOL_POOL};
pub use error::CatalogError;
