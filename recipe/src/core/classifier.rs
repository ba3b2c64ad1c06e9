//! Deterministic classification of builder names.
//!
//! The builder name is scanned once into [`BuilderFlags`]; all later branching
//! works off the flags and the derived [`Branch`].

use std::fmt;

use serde::Serialize;

/// Name-derived flags for a builder such as `Infra-PerCommit-Large`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuilderFlags {
    pub is_build: bool,
    pub is_large: bool,
    pub is_race: bool,
    pub is_medium: bool,
    pub is_small: bool,
}

impl BuilderFlags {
    /// Substring match on the builder name (case-sensitive).
    pub fn from_builder_name(name: &str) -> Self {
        Self {
            is_build: name.contains("Build"),
            is_large: name.contains("Large"),
            is_race: name.contains("Race"),
            is_medium: name.contains("Medium"),
            is_small: name.contains("Small"),
        }
    }

    /// Large and race test runs need the cloud emulators.
    pub fn needs_emulators(&self) -> bool {
        self.is_large || self.is_race
    }

    /// Select exactly one branch: Build > Race > Large > Medium > Small.
    ///
    /// Small is also the fallback when no flag is set.
    pub fn branch(&self) -> Branch {
        if self.is_build {
            Branch::Build
        } else if self.is_race {
            Branch::Race
        } else if self.is_large {
            Branch::Large
        } else if self.is_medium {
            Branch::Medium
        } else {
            Branch::Small
        }
    }
}

/// The single execution path chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    Build,
    Race,
    Large,
    Medium,
    Small,
}

impl Branch {
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::Build => "build",
            Branch::Race => "race",
            Branch::Large => "large",
            Branch::Medium => "medium",
            Branch::Small => "small",
        }
    }

    /// Test-size flags passed to the unit test driver. Empty for `Build`.
    pub fn test_flags(self) -> &'static [&'static str] {
        match self {
            Branch::Build => &[],
            Branch::Race => &["--race", "--large", "--medium", "--small"],
            Branch::Large => &["--large"],
            Branch::Medium => &["--medium"],
            Branch::Small => &["--small"],
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch_of(name: &str) -> Branch {
        BuilderFlags::from_builder_name(name).branch()
    }

    #[test]
    fn plain_variants_select_their_branch() {
        assert_eq!(branch_of("Infra-PerCommit-Build"), Branch::Build);
        assert_eq!(branch_of("Infra-PerCommit-Race"), Branch::Race);
        assert_eq!(branch_of("Infra-PerCommit-Large"), Branch::Large);
        assert_eq!(branch_of("Infra-PerCommit-Medium"), Branch::Medium);
        assert_eq!(branch_of("Infra-PerCommit-Small"), Branch::Small);
    }

    #[test]
    fn build_takes_precedence_over_everything() {
        assert_eq!(branch_of("Infra-Race-Large-Medium-Small-Build"), Branch::Build);
        assert_eq!(branch_of("Infra-Large-Build"), Branch::Build);
    }

    #[test]
    fn race_takes_precedence_over_sizes() {
        assert_eq!(branch_of("Infra-Small-Medium-Large-Race"), Branch::Race);
        assert_eq!(branch_of("Infra-Large-Medium"), Branch::Large);
        assert_eq!(branch_of("Infra-Small-Medium"), Branch::Medium);
    }

    #[test]
    fn unknown_builder_falls_back_to_small() {
        let flags = BuilderFlags::from_builder_name("Infra-PerCommit");
        assert_eq!(flags, BuilderFlags::default());
        assert_eq!(flags.branch(), Branch::Small);
    }

    #[test]
    fn every_flag_combination_selects_exactly_one_branch_by_priority() {
        for bits in 0u8..32 {
            let flags = BuilderFlags {
                is_build: bits & 1 != 0,
                is_race: bits & 2 != 0,
                is_large: bits & 4 != 0,
                is_medium: bits & 8 != 0,
                is_small: bits & 16 != 0,
            };
            let expected = if flags.is_build {
                Branch::Build
            } else if flags.is_race {
                Branch::Race
            } else if flags.is_large {
                Branch::Large
            } else if flags.is_medium {
                Branch::Medium
            } else {
                Branch::Small
            };
            assert_eq!(flags.branch(), expected, "bits={bits:05b}");
        }
    }

    #[test]
    fn emulators_only_for_large_or_race() {
        assert!(BuilderFlags::from_builder_name("Infra-PerCommit-Large").needs_emulators());
        assert!(BuilderFlags::from_builder_name("Infra-PerCommit-Race").needs_emulators());
        assert!(!BuilderFlags::from_builder_name("Infra-PerCommit-Medium").needs_emulators());
        assert!(!BuilderFlags::from_builder_name("Infra-PerCommit-Build").needs_emulators());
    }

    #[test]
    fn race_runs_every_test_size() {
        assert_eq!(
            Branch::Race.test_flags(),
            &["--race", "--large", "--medium", "--small"]
        );
        assert!(Branch::Build.test_flags().is_empty());
    }
}
