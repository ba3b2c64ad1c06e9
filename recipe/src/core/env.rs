//! Process environment composition.
//!
//! Builders borrow the base environment and always return a fresh map, so one
//! base can be reused for every branch of a recipe.

use crate::core::types::Environment;

/// Variable holding the executable search path.
pub const PATH_VAR: &str = "PATH";

#[cfg(windows)]
pub const PATH_SEPARATOR: &str = ";";
#[cfg(not(windows))]
pub const PATH_SEPARATOR: &str = ":";

/// Local endpoints of the cloud emulators started for large and race runs.
pub const EMULATOR_HOSTS: [(&str, &str); 4] = [
    ("DATASTORE_EMULATOR_HOST", "localhost:8891"),
    ("BIGTABLE_EMULATOR_HOST", "localhost:8892"),
    ("PUBSUB_EMULATOR_HOST", "localhost:8893"),
    ("FIRESTORE_EMULATOR_HOST", "localhost:8894"),
];

/// Emulator endpoint overrides as owned pairs.
pub fn emulator_hosts() -> Vec<(String, String)> {
    EMULATOR_HOSTS
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Compose `base` with `path_prepend` segments placed before the existing
/// `PATH`, then apply `overrides` in order (later entries win).
pub fn build<S: AsRef<str>>(
    base: &Environment,
    overrides: &[(String, String)],
    path_prepend: &[S],
) -> Environment {
    EnvironmentBuilder::new(base)
        .prepend_path(path_prepend)
        .set_all(overrides.iter().cloned())
        .build()
}

/// Stepwise form of [`build`] with append and conditional override support.
#[derive(Debug, Clone)]
pub struct EnvironmentBuilder<'a> {
    base: &'a Environment,
    prepend: Vec<String>,
    append: Vec<String>,
    overrides: Vec<(String, String)>,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(base: &'a Environment) -> Self {
        Self {
            base,
            prepend: Vec::new(),
            append: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Segments that go before the existing `PATH`, in the given order.
    pub fn prepend_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.prepend
            .extend(segments.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    /// Segments that go after the existing `PATH`, in the given order.
    pub fn append_path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.append
            .extend(segments.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.push((key.into(), value.into()));
        self
    }

    pub fn set_all<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.overrides.extend(pairs);
        self
    }

    /// Apply an override set only when `condition` holds.
    pub fn set_all_if<I>(self, condition: bool, pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if condition { self.set_all(pairs) } else { self }
    }

    pub fn build(&self) -> Environment {
        let mut env = self.base.clone();
        if !self.prepend.is_empty() || !self.append.is_empty() {
            let existing = env
                .get(PATH_VAR)
                .filter(|value| !value.is_empty())
                .cloned();
            let segments: Vec<&str> = self
                .prepend
                .iter()
                .map(String::as_str)
                .chain(existing.as_deref())
                .chain(self.append.iter().map(String::as_str))
                .filter(|segment| !segment.is_empty())
                .collect();
            env.insert(PATH_VAR.to_string(), segments.join(PATH_SEPARATOR));
        }
        for (key, value) in &self.overrides {
            env.insert(key.clone(), value.clone());
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Environment {
        Environment::from([
            ("HOME".to_string(), "/home/bot".to_string()),
            (PATH_VAR.to_string(), join(&["/usr/bin", "/bin"])),
        ])
    }

    fn join(parts: &[&str]) -> String {
        parts.join(PATH_SEPARATOR)
    }

    #[test]
    fn prepend_keeps_order_and_existing_entries() {
        let env = build(&base(), &[], &["/go/bin", "/gopath/bin"]);
        assert_eq!(
            env[PATH_VAR],
            join(&["/go/bin", "/gopath/bin", "/usr/bin", "/bin"])
        );
        assert_eq!(env["HOME"], "/home/bot");
    }

    #[test]
    fn later_overrides_win() {
        let overrides = vec![
            ("GOFLAGS".to_string(), "-mod=mod".to_string()),
            ("GOFLAGS".to_string(), "-mod=readonly".to_string()),
        ];
        let env = build::<&str>(&base(), &overrides, &[]);
        assert_eq!(env["GOFLAGS"], "-mod=readonly");
        assert_eq!(env[PATH_VAR], base()[PATH_VAR]);
    }

    #[test]
    fn override_of_path_applies_after_merge() {
        let overrides = vec![(PATH_VAR.to_string(), "/only".to_string())];
        let env = build(&base(), &overrides, &["/go/bin"]);
        assert_eq!(env[PATH_VAR], "/only");
    }

    #[test]
    fn build_is_pure_and_leaves_base_untouched() {
        let base = base();
        let snapshot = base.clone();
        let overrides = vec![("CHROME_HEADLESS".to_string(), "1".to_string())];
        let first = build(&base, &overrides, &["/go/bin"]);
        let second = build(&base, &overrides, &["/go/bin"]);
        assert_eq!(first, second);
        assert_eq!(base, snapshot);
    }

    #[test]
    fn missing_path_uses_only_new_segments() {
        let env = EnvironmentBuilder::new(&Environment::new())
            .prepend_path(["/a"])
            .append_path(["/z"])
            .build();
        assert_eq!(env[PATH_VAR], join(&["/a", "/z"]));
    }

    #[test]
    fn append_goes_after_existing_entries() {
        let env = EnvironmentBuilder::new(&base())
            .prepend_path(["/go/bin"])
            .append_path(["/depot_tools"])
            .build();
        assert_eq!(
            env[PATH_VAR],
            join(&["/go/bin", "/usr/bin", "/bin", "/depot_tools"])
        );
    }

    #[test]
    fn conditional_overrides_apply_only_when_set() {
        let with = EnvironmentBuilder::new(&base())
            .set_all_if(true, emulator_hosts())
            .build();
        let without = EnvironmentBuilder::new(&base())
            .set_all_if(false, emulator_hosts())
            .build();
        for (key, value) in EMULATOR_HOSTS {
            assert_eq!(with[key], value);
            assert!(!without.contains_key(key));
        }
    }
}
