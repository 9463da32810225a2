//! Named layer line-ups for runs and benchmarks.

use anyhow::{anyhow, Result};
use maze_core::BrainConfig;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ProfileSpec {
    pub id: &'static str,
    pub description: &'static str,
    pub use_reflex: bool,
    pub use_tactical: bool,
    pub use_strategic: bool,
}

impl ProfileSpec {
    /// `brain` with this profile's layer switches.
    pub fn apply(&self, brain: BrainConfig) -> BrainConfig {
        let mut brain = brain;
        brain.arbiter.use_reflex = self.use_reflex;
        brain.arbiter.use_tactical = self.use_tactical;
        brain.arbiter.use_strategic = self.use_strategic;
        brain
    }
}

pub const DEFAULT_PROFILE: &str = "hierarchical";

const PROFILES: &[ProfileSpec] = &[
    ProfileSpec {
        id: "hierarchical",
        description: "Reflex, tactical and strategic layers under the full arbiter.",
        use_reflex: true,
        use_tactical: true,
        use_strategic: true,
    },
    ProfileSpec {
        id: "planner",
        description: "Strategic A* follower only.",
        use_reflex: false,
        use_tactical: false,
        use_strategic: true,
    },
    ProfileSpec {
        id: "planner-reflex",
        description: "A* follower with threat reflexes, no learned policy.",
        use_reflex: true,
        use_tactical: false,
        use_strategic: true,
    },
    ProfileSpec {
        id: "tactical",
        description: "Learned table policy only.",
        use_reflex: false,
        use_tactical: true,
        use_strategic: false,
    },
];

pub fn profiles() -> &'static [ProfileSpec] {
    PROFILES
}

pub fn profile_ids() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.id).collect()
}

pub fn find_profile(id: &str) -> Option<&'static ProfileSpec> {
    PROFILES.iter().find(|p| p.id == id)
}

pub fn require_profile(id: &str) -> Result<&'static ProfileSpec> {
    find_profile(id).ok_or_else(|| {
        anyhow!(
            "unknown profile '{id}'. available: {}",
            profile_ids().join(", ")
        )
    })
}

/// Comma-separated ids, or every profile when `input` is `None`.
pub fn resolve_profiles(input: Option<&str>) -> Result<Vec<&'static ProfileSpec>> {
    match input {
        None => Ok(PROFILES.iter().collect()),
        Some(raw) => {
            let mut out = Vec::new();
            for token in raw.split(',') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                out.push(require_profile(token)?);
            }
            if out.is_empty() {
                return Err(anyhow!("--profiles resolved to empty list"));
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let mut ids = profile_ids();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), PROFILES.len());
        assert!(find_profile(DEFAULT_PROFILE).is_some());
    }

    #[test]
    fn resolve_skips_blanks_and_rejects_unknown() {
        let picked = resolve_profiles(Some(" planner, ,tactical")).expect("resolve");
        assert_eq!(
            picked.iter().map(|p| p.id).collect::<Vec<_>>(),
            vec!["planner", "tactical"]
        );
        assert!(resolve_profiles(Some("planner,warp")).is_err());
        assert!(resolve_profiles(Some(" , ")).is_err());
        assert_eq!(resolve_profiles(None).expect("all").len(), PROFILES.len());
    }

    #[test]
    fn apply_only_touches_layer_switches() {
        let base = BrainConfig::default();
        let brain = require_profile("planner").expect("planner").apply(base);
        assert!(!brain.arbiter.use_reflex);
        assert!(!brain.arbiter.use_tactical);
        assert!(brain.arbiter.use_strategic);
        assert_eq!(brain.follower, base.follower);
        assert_eq!(brain.arbiter.lockout_duration, base.arbiter.lockout_duration);
    }
}
