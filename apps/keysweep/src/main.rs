//! # Keysweep - Registry Key Removal Pass
//!
//! The main binary for keysweep.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                 apps/keysweep (THE BINARY)           │
//! │                                                      │
//! │  ┌─────────────┐   ┌─────────────┐   ┌───────────┐   │
//! │  │    CLI      │   │   Config    │   │  Tracing  │   │
//! │  │   (clap)    │   │   (toml)    │   │ (fmt,json)│   │
//! │  └──────┬──────┘   └──────┬──────┘   └─────┬─────┘   │
//! │         └─────────────────┼────────────────┘         │
//! │                           ▼                          │
//! │                  ┌────────────────┐                  │
//! │                  │ keysweep-core  │                  │
//! │                  │  (THE LOGIC)   │                  │
//! │                  └────────────────┘                  │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! keysweep import -i setup.json
//! keysweep run
//! keysweep -B snapshot -D setup.json run --output staged.json
//! keysweep staged --json-mode
//! ```

use clap::Parser;
use keysweep::cli::{self, Cli};
use keysweep::config::{Config, Settings};
use keysweep::logging;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = Cli::parse();

    // Tracing is not up yet, so config errors go straight to stderr.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // KEYSWEEP_LOG_FORMAT=json enables machine-parseable output.
    let env_format = std::env::var("KEYSWEEP_LOG_FORMAT").ok();
    let settings = Settings::resolve(&cli.overrides(), &config, env_format.as_deref());
    logging::init(settings.log_format, &settings.log_filter);

    match cli::execute(cli, &settings) {
        Ok(0) => {}
        Ok(code) => std::process::exit(cli::exit_status(code)),
        Err(e) => {
            tracing::error!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
