//! `BootConfig`: pool sizing and boot-level knobs loadable from a TOML
//! file, mirroring `core-config`'s `ConfigFile`/`load_from` shape —
//! `#[serde(default = "...")]` per field, graceful fallback to
//! defaults on a missing or unparsable file rather than a hard error.

use std::path::Path;

use serde::Deserialize;

/// How much of the embedded boot image to load (spec 6.4: `base`,
/// `sys`, `mods`). This runtime has no embedded image to select from,
/// so the field is carried for API parity and future use rather than
/// branching on today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BootLevel {
    Base,
    Sys,
    #[default]
    Mods,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootConfig {
    /// Bytes the allocator's ballast counter resets to after a
    /// recycle (spec 4.5's "ballast" GC trigger).
    #[serde(default = "BootConfig::default_ballast_bytes")]
    pub ballast_bytes: i64,
    /// Call-frame nesting limit before `core_eval::EvalError::StackOverflow`
    /// (spec 4.6's stack-depth guard). Carried here so it is
    /// configurable per embedding even though the evaluator itself
    /// bakes in its own constant today.
    #[serde(default = "BootConfig::default_stack_depth")]
    pub stack_depth: usize,
    #[serde(default)]
    pub boot_level: BootLevel,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            ballast_bytes: Self::default_ballast_bytes(),
            stack_depth: Self::default_stack_depth(),
            boot_level: BootLevel::default(),
        }
    }
}

impl BootConfig {
    const fn default_ballast_bytes() -> i64 {
        1 << 20
    }

    const fn default_stack_depth() -> usize {
        core_eval::MAX_FRAME_DEPTH
    }
}

/// Loads a `BootConfig` from `path`, or from defaults if `path` is
/// `None`, unreadable, or fails to parse (breadth-first resilience,
/// matching `core-config::load_from`) — logged instead of silent so
/// the fallback is visible in the boot trace.
pub fn load_from(path: Option<&Path>) -> BootConfig {
    let Some(path) = path else {
        return BootConfig::default();
    };
    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str::<BootConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(target: "runtime.boot", path = %path.display(), %err, "boot_config_parse_error");
                BootConfig::default()
            }
        },
        Err(err) => {
            tracing::warn!(target: "runtime.boot", path = %path.display(), %err, "boot_config_read_error");
            BootConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_eval_stack_depth() {
        let config = BootConfig::default();
        assert_eq!(config.stack_depth, core_eval::MAX_FRAME_DEPTH);
        assert_eq!(config.boot_level, BootLevel::Mods);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_from(Some(Path::new("/nonexistent/boot.toml")));
        assert_eq!(config.ballast_bytes, BootConfig::default_ballast_bytes());
    }

    #[test]
    fn parses_a_well_formed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.toml");
        std::fs::write(&path, "ballast_bytes = 4096\nboot_level = \"sys\"\n").unwrap();
        let config = load_from(Some(&path));
        assert_eq!(config.ballast_bytes, 4096);
        assert_eq!(config.boot_level, BootLevel::Sys);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.toml");
        std::fs::write(&path, "ballast_bytes = [not valid").unwrap();
        let config = load_from(Some(&path));
        assert_eq!(config.ballast_bytes, BootConfig::default_ballast_bytes());
    }
}
