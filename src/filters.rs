//! Classifies symbol names that must never receive an alias. These are
//! compiler- and kernel-generated artifacts whose duplication is structural
//! rather than meaningful: CFI trampolines, NOP prefixes, once-flags, trace
//! tables, lock-class keys and the like.

use crate::error::Result;
use anyhow::Context;
use regex::RegexSet;

/// Artifacts that are never aliased under any configuration.
const ALWAYS_EXCLUDED: &[&str] = &["^__cfi_.*$", "^__pfx_.*$"];

/// Additional exclusions for generated data objects. Suppressed when the
/// caller asks for every data symbol to be eligible.
const DATA_EXCLUDED: &[&str] = &[
    "^_*TRACE_SYSTEM.*$",
    "^__already_done\\.[0-9]+$",
    "^___tp_str\\.[0-9]+$",
    "^___done\\.[0-9]+$",
    "^__print_once\\.[0-9]+$",
    "^_rs\\.[0-9]+$",
    "^__compound_literal\\.[0-9]+$",
    "^___once_key\\.[0-9]+$",
    "^__func__\\.[0-9]+$",
    "^__msg\\.[0-9]+$",
    "^CSWTCH\\.[0-9]+$",
    "^__flags\\.[0-9]+$",
    "^__wkey.*$",
    "^__mkey.*$",
    "^__key.*$",
];

/// The never-alias pattern list, compiled once per run.
pub(crate) struct NameFilter {
    patterns: RegexSet,
}

impl NameFilter {
    pub(crate) fn new(alias_data_all: bool) -> Result<NameFilter> {
        let expanded = if alias_data_all { &[][..] } else { DATA_EXCLUDED };
        let patterns = RegexSet::new(ALWAYS_EXCLUDED.iter().chain(expanded))
            .context("Failed to compile symbol filter patterns")?;
        Ok(NameFilter { patterns })
    }

    /// True when `name` matches any enabled pattern and must keep its
    /// original spelling as the only one.
    pub(crate) fn excludes(&self, name: &str) -> bool {
        self.patterns.is_match(name)
    }
}

#[cfg(test)]
mod tests {
    use super::NameFilter;

    #[test]
    fn test_always_excluded_patterns() {
        for filter in [NameFilter::new(false).unwrap(), NameFilter::new(true).unwrap()] {
            assert!(filter.excludes("__cfi_device_show"));
            assert!(filter.excludes("__pfx_device_show"));
            assert!(!filter.excludes("device_show"));
        }
    }

    #[test]
    fn test_generated_data_patterns() {
        let filter = NameFilter::new(false).unwrap();
        assert!(filter.excludes("TRACE_SYSTEM_sched"));
        assert!(filter.excludes("__TRACE_SYSTEM_block"));
        assert!(filter.excludes("__already_done.12"));
        assert!(filter.excludes("___tp_str.3"));
        assert!(filter.excludes("___done.0"));
        assert!(filter.excludes("__print_once.7"));
        assert!(filter.excludes("_rs.4"));
        assert!(filter.excludes("__compound_literal.99"));
        assert!(filter.excludes("___once_key.1"));
        assert!(filter.excludes("__func__.55"));
        assert!(filter.excludes("__msg.2"));
        assert!(filter.excludes("CSWTCH.33"));
        assert!(filter.excludes("__flags.8"));
        assert!(filter.excludes("__wkey_something"));
        assert!(filter.excludes("__mkey_something"));
        assert!(filter.excludes("__key.21"));
    }

    #[test]
    fn test_patterns_are_anchored() {
        let filter = NameFilter::new(false).unwrap();
        // The serial suffix requires the trailing digits; a bare prefix match
        // must not veto an unrelated symbol.
        assert!(!filter.excludes("__func__"));
        assert!(!filter.excludes("x__already_done.12"));
        assert!(!filter.excludes("my_rs.4"));
    }

    #[test]
    fn test_alias_data_all_keeps_only_the_baseline() {
        let filter = NameFilter::new(true).unwrap();
        assert!(filter.excludes("__cfi_x"));
        assert!(filter.excludes("__pfx_x"));
        assert!(!filter.excludes("TRACE_SYSTEM_sched"));
        assert!(!filter.excludes("__key.21"));
        assert!(!filter.excludes("CSWTCH.33"));
    }
}
