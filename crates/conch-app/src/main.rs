//! conch terminal entry point.
//!
//! Reads an optional TOML config (CLI arg, `$CONCH_CONFIG`, or ./conch.toml),
//! builds the command registry, and runs the interactive loop.

mod config;
mod repl;

use anyhow::Result;

use conch_shell::{CommandRegistry, Palette, register_builtins};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = config::load();
    log::info!("Starting conch v{}", env!("CARGO_PKG_VERSION"));

    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry);

    // Seed aliases from config.
    for (name, expansion) in &cfg.aliases {
        registry.set_alias(name, expansion);
    }

    let palette = match cfg.startup_palette() {
        Ok(p) => p,
        Err(e) => {
            log::warn!("{e} -- using default colors");
            Palette::default()
        },
    };

    let mut repl = repl::Repl::new(registry, cfg, palette);
    repl.run()?;

    log::info!("conch shut down cleanly");
    Ok(())
}
