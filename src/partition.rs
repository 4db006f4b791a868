//! Versioned partition naming.
//!
//! Each generation owns exactly two partitions, `shell-{version}` and
//! `runtime-{version}`. Activation deletes every other name carrying one
//! of those prefixes, so the format must never change.

use std::fmt;

use crate::error::{Error, Result};

const SHELL_PREFIX: &str = "shell-";
const RUNTIME_PREFIX: &str = "runtime-";

/// The role a partition plays within a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    /// Boot assets, pre-populated at install.
    Shell,
    /// Resources fetched during normal operation.
    Runtime,
}

impl PartitionKind {
    const fn prefix(self) -> &'static str {
        match self {
            Self::Shell => SHELL_PREFIX,
            Self::Runtime => RUNTIME_PREFIX,
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shell => f.write_str("shell"),
            Self::Runtime => f.write_str("runtime"),
        }
    }
}

/// The partition names of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partitions {
    version: String,
    shell: String,
    runtime: String,
}

impl Partitions {
    /// Derives the partition names for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the version is empty or contains
    /// whitespace or path separators.
    pub fn for_version(version: &str) -> Result<Self> {
        if version.is_empty() {
            return Err(Error::Config("version must not be empty".into()));
        }
        if version
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(Error::Config(format!(
                "version {version:?} must not contain whitespace or path separators"
            )));
        }
        Ok(Self {
            version: version.to_string(),
            shell: format!("{SHELL_PREFIX}{version}"),
            runtime: format!("{RUNTIME_PREFIX}{version}"),
        })
    }

    /// Returns the version these names were derived from.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the Shell partition name.
    #[must_use]
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Returns the Runtime partition name.
    #[must_use]
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Returns the name for the given role.
    #[must_use]
    pub fn name(&self, kind: PartitionKind) -> &str {
        match kind {
            PartitionKind::Shell => &self.shell,
            PartitionKind::Runtime => &self.runtime,
        }
    }

    /// Lookup order used when serving from cache: Shell first, then Runtime.
    #[must_use]
    pub fn lookup_order(&self) -> [&str; 2] {
        [&self.shell, &self.runtime]
    }

    /// Returns true if `name` is one of this generation's partitions.
    #[must_use]
    pub fn is_current(&self, name: &str) -> bool {
        name == self.shell || name == self.runtime
    }

    /// Returns true if `name` belongs to some other generation and should
    /// be deleted on activation.
    #[must_use]
    pub fn is_stale(&self, name: &str) -> bool {
        is_managed(name) && !self.is_current(name)
    }
}

/// Returns true if `name` carries one of the partition prefixes.
#[must_use]
pub fn is_managed(name: &str) -> bool {
    kind_of(name).is_some()
}

/// Returns the role encoded in `name`'s prefix, if any.
#[must_use]
pub fn kind_of(name: &str) -> Option<PartitionKind> {
    [PartitionKind::Shell, PartitionKind::Runtime]
        .into_iter()
        .find(|kind| name.starts_with(kind.prefix()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn names_follow_format() {
        let p = Partitions::for_version("v1").unwrap();
        assert_eq!(p.shell(), "shell-v1");
        assert_eq!(p.runtime(), "runtime-v1");
        assert_eq!(p.name(PartitionKind::Runtime), "runtime-v1");
        assert_eq!(p.lookup_order(), ["shell-v1", "runtime-v1"]);
    }

    #[test]
    fn empty_version_rejected() {
        assert!(matches!(Partitions::for_version(""), Err(Error::Config(_))));
        assert!(Partitions::for_version("v 1").is_err());
        assert!(Partitions::for_version("../v1").is_err());
    }

    #[test]
    fn stale_detection() {
        let p = Partitions::for_version("v2").unwrap();
        assert!(p.is_stale("shell-v1"));
        assert!(p.is_stale("runtime-v1"));
        assert!(!p.is_stale("shell-v2"));
        assert!(!p.is_stale("runtime-v2"));
        assert!(!p.is_stale("images"));
        assert!(!p.is_stale("shellfish"));
    }

    #[test]
    fn kind_from_prefix() {
        assert_eq!(kind_of("shell-x"), Some(PartitionKind::Shell));
        assert_eq!(kind_of("runtime-x"), Some(PartitionKind::Runtime));
        assert_eq!(kind_of("other"), None);
    }

    proptest! {
        #[test]
        fn current_names_are_never_stale(version in "[a-zA-Z0-9._-]{1,24}") {
            let p = Partitions::for_version(&version).unwrap();
            prop_assert!(!p.is_stale(p.shell()));
            prop_assert!(!p.is_stale(p.runtime()));
            prop_assert_ne!(p.shell(), p.runtime());
        }

        #[test]
        fn other_versions_are_stale(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
            prop_assume!(a != b);
            let current = Partitions::for_version(&a).unwrap();
            let old = Partitions::for_version(&b).unwrap();
            prop_assert!(current.is_stale(old.shell()));
            prop_assert!(current.is_stale(old.runtime()));
        }
    }
}
