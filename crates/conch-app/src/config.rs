//! Startup configuration for the conch front-end.

use std::collections::HashMap;

use conch_types::error::{ConchError, Result};
use serde::Deserialize;

use conch_shell::{Color, Palette};

/// User configuration, read from a TOML file at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct ConchConfig {
    /// Prompt printed before each input line.
    #[serde(default = "default_prompt")]
    pub prompt: String,
    /// Startup text color name.
    #[serde(default = "default_color")]
    pub text_color: String,
    /// Startup background color name.
    #[serde(default = "default_color")]
    pub background: String,
    /// Print the banner line on startup (and on `home`).
    #[serde(default = "default_banner")]
    pub banner: bool,
    /// Aliases seeded into the session.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_prompt() -> String {
    "conch> ".to_string()
}

fn default_color() -> String {
    "default".to_string()
}

fn default_banner() -> bool {
    true
}

impl Default for ConchConfig {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
            text_color: default_color(),
            background: default_color(),
            banner: default_banner(),
            aliases: HashMap::new(),
        }
    }
}

impl ConchConfig {
    /// Resolve the configured color names into a startup palette.
    pub fn startup_palette(&self) -> Result<Palette> {
        Ok(Palette {
            text: Color::parse(&self.text_color)?,
            background: Color::parse(&self.background)?,
        })
    }
}

/// Parse a configuration file body.
pub fn parse_config(toml_str: &str) -> Result<ConchConfig> {
    toml::from_str(toml_str).map_err(|e| ConchError::Config(format!("conch.toml: {e}")))
}

/// Load configuration from the first of: CLI argument, `$CONCH_CONFIG`,
/// `./conch.toml`. A missing file is normal; a malformed one logs a warning.
/// The shell starts with defaults either way.
pub fn load() -> ConchConfig {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CONCH_CONFIG").ok())
        .unwrap_or_else(|| "conch.toml".to_string());

    match std::fs::read_to_string(&path) {
        Ok(text) => match parse_config(&text) {
            Ok(cfg) => {
                log::info!("Loaded config from {path}");
                cfg
            },
            Err(e) => {
                log::warn!("{e} -- using default configuration");
                ConchConfig::default()
            },
        },
        Err(_) => ConchConfig::default(),
    }
}
