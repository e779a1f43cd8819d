//! Target policy and filesystem configuration (§3, §6).
//!
//! The target policy turns a decoder's detected `(bit_depth, sample_rate)`
//! into the values actually written to cache entries: an optional override
//! wins outright, otherwise the detected value is kept if it is a member of
//! the recognized set, otherwise a fixed fallback is used. This is a direct
//! port of `qua-config.c`'s `qua_config_get_target_bit_depth` /
//! `_get_target_sample_rate`, generalized from its space-separated-string
//! validity list to a typed `&[u32]` slice.

use std::env;
use std::path::PathBuf;

/// Bit depths cache entries are allowed to carry.
pub const VALID_BIT_DEPTHS: &[u32] = &[16, 32];
/// Fallback bit depth when detected depth is not in [`VALID_BIT_DEPTHS`].
pub const FALLBACK_BIT_DEPTH: u32 = 32;

/// Sample rates cache entries are allowed to carry.
pub const VALID_SAMPLE_RATES: &[u32] = &[
    44_100, 48_000, 88_200, 96_000, 176_400, 192_000, 352_800, 384_000,
];
/// Fallback sample rate when detected rate is not in [`VALID_SAMPLE_RATES`].
pub const FALLBACK_SAMPLE_RATE: u32 = 96_000;

/// Cache budget in bytes (§3, §6): 2 GiB.
pub const CACHE_BUDGET_BYTES: u64 = 2 * 1024 * 1024 * 1024;
/// Fraction of the budget eviction drives usage down to.
pub const CACHE_EVICT_TARGET_RATIO: f64 = 0.7;

/// Resolve a target value: override (if set and positive) wins, else the
/// detected value if it is a member of `valid`, else `fallback`.
///
/// This is the generalized, typed form of `qua_config_get_target_bit_depth`
/// / `_get_target_sample_rate`: both call sites in the original differ only
/// in which constants they pass, so here they collapse to one function.
pub fn resolve_target(detected: u32, override_value: Option<u32>, valid: &[u32], fallback: u32) -> u32 {
    if let Some(v) = override_value {
        if v > 0 {
            return v;
        }
    }
    if valid.contains(&detected) {
        detected
    } else {
        fallback
    }
}

/// Declarative rule set that resolves detected rate/bit-depth into the
/// values actually written to cache entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetPolicy {
    pub bit_depth_override: Option<u32>,
    pub sample_rate_override: Option<u32>,
}

impl TargetPolicy {
    /// Build a policy from the `QUA_BIT_DEPTH` / `QUA_SAMPLE_RATE`
    /// environment overrides, if set to positive integers.
    pub fn from_env() -> Self {
        TargetPolicy {
            bit_depth_override: env::var("QUA_BIT_DEPTH").ok().and_then(|s| s.parse().ok()),
            sample_rate_override: env::var("QUA_SAMPLE_RATE").ok().and_then(|s| s.parse().ok()),
        }
    }

    pub fn target_bit_depth(&self, detected: u32) -> u32 {
        resolve_target(detected, self.bit_depth_override, VALID_BIT_DEPTHS, FALLBACK_BIT_DEPTH)
    }

    pub fn target_sample_rate(&self, detected: u32) -> u32 {
        resolve_target(
            detected,
            self.sample_rate_override,
            VALID_SAMPLE_RATES,
            FALLBACK_SAMPLE_RATE,
        )
    }
}

/// The `$XDG_CONFIG_HOME/qua-player` directory, falling back to
/// `$HOME/.config/qua-player` (§6).
pub fn state_dir() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("qua-player");
        }
    }
    let home = env::var("HOME").unwrap_or_else(|_| "/".to_string());
    PathBuf::from(home).join(".config").join("qua-player")
}

/// Path to the playback state record (§3, §6).
pub fn current_song_path() -> PathBuf {
    state_dir().join("current-song")
}

/// Path to the append-only play history (§3, §6).
pub fn history_path() -> PathBuf {
    state_dir().join("history")
}

/// Default cache directory (§6): shared-memory-backed.
pub fn default_cache_dir() -> PathBuf {
    PathBuf::from("/dev/shm/qua-cache")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn override_wins_outright() {
        assert_eq!(resolve_target(44_100, Some(48_000), VALID_SAMPLE_RATES, FALLBACK_SAMPLE_RATE), 48_000);
    }

    #[test]
    fn zero_override_is_ignored() {
        assert_eq!(resolve_target(44_100, Some(0), VALID_SAMPLE_RATES, FALLBACK_SAMPLE_RATE), 44_100);
    }

    #[test]
    fn detected_used_when_valid() {
        assert_eq!(resolve_target(88_200, None, VALID_SAMPLE_RATES, FALLBACK_SAMPLE_RATE), 88_200);
    }

    #[test]
    fn fallback_used_when_detected_invalid() {
        assert_eq!(resolve_target(22_050, None, VALID_SAMPLE_RATES, FALLBACK_SAMPLE_RATE), FALLBACK_SAMPLE_RATE);
        assert_eq!(resolve_target(24, None, VALID_BIT_DEPTHS, FALLBACK_BIT_DEPTH), FALLBACK_BIT_DEPTH);
    }

    #[test]
    fn negative_override_rejected_as_unset() {
        // override_value is u32 so "negative" isn't representable; zero and
        // unset share the same fallthrough path, covered above.
        let policy = TargetPolicy {
            bit_depth_override: None,
            sample_rate_override: None,
        };
        assert_eq!(policy.target_bit_depth(16), 16);
        assert_eq!(policy.target_sample_rate(48_000), 48_000);
    }
}
