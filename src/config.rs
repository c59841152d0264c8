/// Site tables, polling policies and timings.
///
/// Everything here has a built-in default. A JSON object stored under
/// [`CONFIG_KEY`] is layered over the defaults field by field, so an override
/// only needs to name what it changes.
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::poller::{Backoff, PollPolicy};
use crate::relay::SlotStore;

/// Storage key holding an optional JSON override of [`Config`]
pub const CONFIG_KEY: &str = "pgn_relay_config";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The single relay slot shared by source and destination tabs
    pub relay_key: String,
    pub destination: DestinationSite,
    pub sources: Vec<SourceSite>,
    pub anchor_poll: PollPolicy,
    pub destination_poll: PollPolicy,
    pub timings: Timings,
}

/// A site the notation is read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSite {
    pub name: String,
    pub hosts: Vec<String>,
    /// Path regex whose first capture group is the game identifier
    pub game_id_pattern: Option<String>,
    /// Element attribute carrying the game identifier
    pub game_id_attribute: Option<FieldSource>,
    /// Export endpoint with an `{id}` placeholder
    pub export_url: Option<String>,
    pub embedded_state: Vec<EmbeddedState>,
    pub notation_text: Vec<String>,
    pub notation_fields: Vec<String>,
    pub download_links: Vec<String>,
    pub position: Vec<FieldSource>,
    pub anchors: Vec<AnchorSpec>,
}

/// Where to read a string: an attribute when named, otherwise the form value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSource {
    pub selector: String,
    #[serde(default)]
    pub attribute: Option<String>,
}

/// JSON blob in a data attribute, plus the path to its notation field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedState {
    pub selector: String,
    pub attribute: String,
    pub field: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Before,
    After,
    Prepend,
    Append,
}

/// Candidate insertion point for the button; lower priority wins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSpec {
    pub selector: String,
    pub placement: Placement,
    #[serde(default)]
    pub priority: u8,
}

/// The analysis site the notation is delivered to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationSite {
    pub url: String,
    pub hosts: Vec<String>,
    pub input_selector: String,
    /// Fallback: text input whose placeholder contains this (case-insensitive)
    pub input_placeholder_hint: String,
    pub trigger_selector: String,
    /// Fallback: button whose label contains this (case-insensitive)
    pub trigger_label_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Pause between focus, value-set and blur on the destination input
    pub settle_ms: u32,
    /// Pause between blur and the trigger click
    pub trigger_delay_ms: u32,
    pub label_restore_ms: u32,
    pub notification_ms: u32,
    pub mutation_debounce_ms: u32,
    /// Rest between bursts once an anchor burst is exhausted
    pub long_pause_ms: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            settle_ms: 120,
            trigger_delay_ms: 300,
            label_restore_ms: 2_000,
            notification_ms: 3_500,
            mutation_debounce_ms: 250,
            long_pause_ms: 10_000,
        }
    }
}

impl Default for DestinationSite {
    fn default() -> Self {
        DestinationSite {
            url: "https://wintrchess.com/analysis".to_string(),
            hosts: vec!["wintrchess.com".to_string()],
            input_selector: "textarea[placeholder*='PGN']".to_string(),
            input_placeholder_hint: "pgn".to_string(),
            trigger_selector: "button.analyse-button".to_string(),
            trigger_label_hint: "analy".to_string(),
        }
    }
}

impl Default for SourceSite {
    fn default() -> Self {
        SourceSite {
            name: String::new(),
            hosts: Vec::new(),
            game_id_pattern: None,
            game_id_attribute: None,
            export_url: None,
            embedded_state: Vec::new(),
            notation_text: Vec::new(),
            notation_fields: Vec::new(),
            download_links: Vec::new(),
            position: Vec::new(),
            anchors: Vec::new(),
        }
    }
}

impl SourceSite {
    /// The game server: every game has a public export endpoint.
    pub fn game_server() -> SourceSite {
        SourceSite {
            name: "lichess".to_string(),
            hosts: vec!["lichess.org".to_string()],
            game_id_pattern: Some(
                r"^/([A-Za-z0-9]{8})(?:[A-Za-z0-9]{4})?(?:/(?:white|black))?/?$".to_string(),
            ),
            game_id_attribute: Some(FieldSource {
                selector: "main[data-game-id]".to_string(),
                attribute: Some("data-game-id".to_string()),
            }),
            export_url: Some(
                "https://lichess.org/game/export/{id}?clocks=false&evals=false".to_string(),
            ),
            embedded_state: vec![EmbeddedState {
                selector: "#page-init-data".to_string(),
                attribute: "data-init".to_string(),
                field: vec!["data".to_string(), "game".to_string(), "pgn".to_string()],
            }],
            notation_text: vec![".pgn".to_string(), ".analyse__underboard .pgn".to_string()],
            notation_fields: vec!["textarea.pgn".to_string()],
            download_links: vec!["a[download][href^='data:']".to_string()],
            position: vec![FieldSource {
                selector: ".pair input.copyable".to_string(),
                attribute: None,
            }],
            anchors: vec![
                AnchorSpec {
                    selector: ".analyse__controls".to_string(),
                    placement: Placement::Append,
                    priority: 0,
                },
                AnchorSpec {
                    selector: ".game__meta".to_string(),
                    placement: Placement::After,
                    priority: 1,
                },
            ],
        }
    }

    /// The game-analysis site: no export endpoint, notation lives in the page.
    pub fn analysis_site() -> SourceSite {
        SourceSite {
            name: "chess.com".to_string(),
            hosts: vec!["chess.com".to_string()],
            game_id_pattern: None,
            game_id_attribute: None,
            export_url: None,
            embedded_state: vec![
                EmbeddedState {
                    selector: "[data-game-state]".to_string(),
                    attribute: "data-game-state".to_string(),
                    field: vec!["pgn".to_string()],
                },
                EmbeddedState {
                    selector: "[data-analysis]".to_string(),
                    attribute: "data-analysis".to_string(),
                    field: vec!["game".to_string(), "pgn".to_string()],
                },
            ],
            notation_text: vec!["pre.pgn".to_string(), ".share-menu-pgn".to_string()],
            notation_fields: vec![
                "textarea.share-menu-tab-pgn-textarea".to_string(),
                "textarea[name='pgn']".to_string(),
            ],
            download_links: vec![
                "a[download][href^='data:']".to_string(),
                "a[href*='pgn=']".to_string(),
            ],
            position: vec![
                FieldSource {
                    selector: "input.share-menu-tab-fen-input".to_string(),
                    attribute: None,
                },
                FieldSource {
                    selector: "[data-fen]".to_string(),
                    attribute: Some("data-fen".to_string()),
                },
            ],
            anchors: vec![
                AnchorSpec {
                    selector: "#board-controls-settings".to_string(),
                    placement: Placement::Before,
                    priority: 0,
                },
                AnchorSpec {
                    selector: ".board-controls-bottom".to_string(),
                    placement: Placement::Append,
                    priority: 1,
                },
            ],
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relay_key: "pgn_relay_payload".to_string(),
            destination: DestinationSite::default(),
            sources: vec![SourceSite::game_server(), SourceSite::analysis_site()],
            anchor_poll: PollPolicy {
                max_attempts: 10,
                base_delay_ms: 500,
                max_delay_ms: 500,
                backoff: Backoff::Fixed,
            },
            destination_poll: PollPolicy {
                max_attempts: 30,
                base_delay_ms: 250,
                max_delay_ms: 2_000,
                backoff: Backoff::Exponential,
            },
            timings: Timings::default(),
        }
    }
}

impl Config {
    /// Layer a JSON override over the defaults. A malformed override is
    /// ignored with a warning.
    pub fn from_override(json: Option<&str>) -> Config {
        match json {
            None => Config::default(),
            Some(text) => match serde_json::from_str::<Config>(text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Ignoring malformed config override: {}", e);
                    Config::default()
                }
            },
        }
    }

    /// Read the override from extension storage. Storage errors fall back to
    /// the defaults as well; configuration never blocks the page.
    pub async fn load<S: SlotStore>(store: &S) -> Config {
        match store.get(CONFIG_KEY).await {
            Ok(json) => Config::from_override(json.as_deref()),
            Err(e) => {
                debug!("No config override available: {}", e);
                Config::default()
            }
        }
    }
}
