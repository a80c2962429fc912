//! Config & CLI driver (C9+, §1+, §6). Recognized options (`extent`,
//! `contention`, `network_id`, `rotation_enabled`) plus the ambient options
//! every CLI entry point in the pack exposes, collected via `clap`'s
//! derive API the way the teacher's `main.rs` builds its own `Args`.

use clap::Parser;

use crate::error::{Error, Result};

#[derive(Parser, Debug, Clone)]
#[command(name = "proton", about = "A persistent, balanced, content-addressed B+-tree")]
pub struct Config {
    /// Maximum serialized footprint (bytes) a node may reach before splitting.
    #[clap(short = 'x', long, default_value_t = 4096)]
    pub extent: usize,

    /// Split target as a fraction of `extent`, in (0, 1].
    #[clap(short, long, default_value_t = 0.5)]
    pub contention: f64,

    /// Network identifier mixed into every block's content address.
    #[clap(long, default_value = "proton")]
    pub network_id: String,

    /// Enables the deterministic-seed secret API, for reproducible runs
    /// and rotation drills. Off by default: production trees should mint
    /// secrets from entropy.
    #[clap(long, default_value_t = false)]
    pub rotation_enabled: bool,

    /// Seed used to derive secrets when `rotation_enabled` is set.
    #[clap(long, default_value_t = 0)]
    pub seed: u64,

    /// Directory backing the on-disk block store.
    #[clap(short, long, default_value = "/tmp/protondata")]
    pub datadir: String,

    /// The degree the CLI driver uses when demonstrating a fresh tree.
    #[clap(short = 'n', long, default_value_t = 2)]
    pub degree: usize,

    /// Run with verbose (debug-level) logging.
    #[clap(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validates the recognized options (§6), surfacing a violation as
    /// `Error::InvariantViolation` rather than panicking.
    pub fn validate(&self) -> Result<()> {
        if self.extent == 0 {
            return Err(Error::InvariantViolation("extent must be nonzero".into()));
        }
        if !(self.contention > 0.0 && self.contention <= 1.0) {
            return Err(Error::InvariantViolation(format!(
                "contention {} outside (0, 1]",
                self.contention
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            extent: 4096,
            contention: 0.5,
            network_id: "proton".into(),
            rotation_enabled: false,
            seed: 0,
            datadir: "/tmp/protondata".into(),
            degree: 2,
            verbose: false,
        }
    }

    #[test]
    fn zero_extent_is_rejected() {
        let mut cfg = base();
        cfg.extent = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn contention_out_of_range_is_rejected() {
        let mut cfg = base();
        cfg.contention = 1.5;
        assert!(cfg.validate().is_err());
        cfg.contention = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn default_config_validates() {
        assert!(base().validate().is_ok());
    }
}
