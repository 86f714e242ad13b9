//! The theme catalogue: templates, palettes, and symbol pools.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use glyphmatch_protocol::Symbol;
use serde::{Deserialize, Serialize};

use crate::CatalogError;

/// The default symbol pool, used whenever a theme carries no pool of its
/// own (or an empty one). Eighty distinct tokens — enough for an 18-seat
/// relay room at four symbols per hand.
pub const DEFAULT_SYMBOL_POOL: &[&str] = &[
    "😀", "😂", "😊", "😎", "🥳", "🤯", "😱", "👻", "👽", "🤖", "👾", "🤠",
    "🧐", "🧑‍🚀", "🦸", "🧑‍🌾", "🧑‍🍳", "🧑‍🔧", "🧑‍🎨", "🧑‍🎤", "🐶", "🐱",
    "🐭", "🦊", "🐻", "🐼", "🐨", "🐵", "🦁", "🐸", "🐳", "🦋", "🦄", "🐞",
    "🐢", "🌵", "🌴", "🌸", "🍁", "🍄", "🍎", "🍌", "🍉", "🍕", "🍔", "🍟",
    "🍩", "🍿", "🍭", "🍹", "⚽️", "🏀", "🎯", "🎮", "🎲", "🚀", "⚓️", "💡",
    "💎", "🎁", "🎉", "🔑", "💰", "💣", "⚙️", "🧭", "🔭", "🔮", "🛡️", "🏳️",
    "❤️", "⭐", "☀️", "🌙", "⚡️", "🔥", "💧", "🌈", "✨", "⏳",
];

// ---------------------------------------------------------------------------
// RoomTemplate
// ---------------------------------------------------------------------------

/// One room theme: capacity, presentation hints, and an optional themed
/// symbol pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomTemplate {
    /// Theme identifier. Matched case-insensitively.
    pub id: String,

    /// Human-readable name shown in room lists.
    pub display_name: String,

    /// Maximum players a room built from this template holds.
    pub max_players: usize,

    /// Decorative color palette (hex strings), passed through to clients.
    #[serde(default)]
    pub palette: Vec<String>,

    /// Themed symbol pool. Empty means "use the default pool".
    #[serde(default)]
    pub symbol_pool: Vec<Symbol>,
}

impl RoomTemplate {
    fn validate(&self) -> Result<(), CatalogError> {
        if self.id.trim().is_empty() {
            return Err(CatalogError::InvalidTemplate {
                id: self.id.clone(),
                reason: "blank theme id".into(),
            });
        }
        if self.max_players == 0 {
            return Err(CatalogError::InvalidTemplate {
                id: self.id.clone(),
                reason: "max_players must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// On-disk shape of a catalogue file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    default_pool: Vec<Symbol>,
    themes: Vec<RoomTemplate>,
}

// ---------------------------------------------------------------------------
// ThemeCatalog
// ---------------------------------------------------------------------------

/// The loaded catalogue. Built once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct ThemeCatalog {
    /// Templates keyed by uppercased theme id.
    templates: HashMap<String, RoomTemplate>,
    default_pool: Vec<Symbol>,
}

impl ThemeCatalog {
    /// Builds a catalogue from templates and an explicit default pool.
    ///
    /// An empty `default_pool` falls back to [`DEFAULT_SYMBOL_POOL`].
    pub fn from_templates(
        templates: Vec<RoomTemplate>,
        default_pool: Vec<Symbol>,
    ) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(templates.len());
        for template in templates {
            template.validate()?;
            let key = template.id.to_uppercase();
            if map.insert(key, template).is_some() {
                tracing::warn!("duplicate theme id in catalogue, last wins");
            }
        }

        let default_pool = if default_pool.is_empty() {
            builtin_pool()
        } else {
            dedup(default_pool)
        };

        Ok(Self {
            templates: map,
            default_pool,
        })
    }

    /// Parses a catalogue from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(CatalogError::Parse)?;
        Self::from_templates(file.themes, file.default_pool)
    }

    /// Loads a catalogue from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(CatalogError::Read)?;
        let catalog = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            themes = catalog.templates.len(),
            "theme catalogue loaded"
        );
        Ok(catalog)
    }

    /// The compiled-in catalogue: a handful of themes over the default
    /// pool. Used when no catalogue file is configured.
    pub fn builtin() -> Self {
        let templates = vec![
            RoomTemplate {
                id: "STUDIO".into(),
                display_name: "The Studio".into(),
                max_players: 3,
                palette: vec![
                    "#2b2d42".into(),
                    "#8d99ae".into(),
                    "#ef233c".into(),
                ],
                symbol_pool: vec![],
            },
            RoomTemplate {
                id: "GALLERY".into(),
                display_name: "The Gallery".into(),
                max_players: 6,
                palette: vec![
                    "#1a535c".into(),
                    "#4ecdc4".into(),
                    "#ffe66d".into(),
                ],
                symbol_pool: vec![],
            },
            RoomTemplate {
                id: "ARCADE".into(),
                display_name: "The Arcade".into(),
                max_players: 18,
                palette: vec![
                    "#22223b".into(),
                    "#9a8c98".into(),
                    "#f2e9e4".into(),
                ],
                symbol_pool: [
                    "🎮", "🎲", "🎯", "👾", "🕹️", "🏆", "🎰", "🎪", "🃏",
                    "🎳", "🏓", "🎱", "🪀", "🎻", "🥁", "🎺", "🎷", "🎸",
                ]
                .iter()
                .map(|s| Symbol::new(*s))
                .collect(),
            },
        ];
        Self::from_templates(templates, Vec::new())
            .expect("builtin templates are valid")
    }

    /// Looks up a template by theme id (case-insensitive).
    pub fn template(&self, theme: &str) -> Option<&RoomTemplate> {
        self.templates.get(&theme.to_uppercase())
    }

    /// Returns the symbol pool for a theme: the themed pool when present
    /// and non-empty, the default pool otherwise. The result is
    /// de-duplicated with order preserved; it is empty only when even the
    /// default pool is empty, which callers must treat as a fatal setup
    /// condition for the room.
    pub fn symbols_for_theme(&self, theme: &str) -> Vec<Symbol> {
        let themed = self
            .template(theme)
            .map(|t| t.symbol_pool.as_slice())
            .unwrap_or(&[]);

        if themed.is_empty() {
            self.default_pool.clone()
        } else {
            dedup(themed.to_vec())
        }
    }

    /// All known theme ids (uppercased), in no particular order.
    pub fn theme_ids(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

fn builtin_pool() -> Vec<Symbol> {
    DEFAULT_SYMBOL_POOL.iter().map(|s| Symbol::new(*s)).collect()
}

/// Removes duplicate tokens, keeping first occurrences in order.
fn dedup(pool: Vec<Symbol>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    pool.into_iter()
        .filter(|symbol| seen.insert(symbol.clone()))
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
