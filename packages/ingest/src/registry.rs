//! Domain registry. Loads the three domain definitions from embedded TOML.
//!
//! Each `.toml` file in `packages/ingest/domains/` is baked into the binary
//! at compile time via [`include_str!`].

use crate::domain::{DomainDefinition, parse_domain_toml};

/// Identifier of the enrolment domain.
pub const ENROLMENT: &str = "enrolment";
/// Identifier of the demographic-update domain.
pub const DEMOGRAPHIC: &str = "demographic";
/// Identifier of the biometric-update domain.
pub const BIOMETRIC: &str = "biometric";

/// TOML configs embedded at compile time.
const DOMAIN_TOMLS: &[(&str, &str)] = &[
    (ENROLMENT, include_str!("../domains/enrolment.toml")),
    (DEMOGRAPHIC, include_str!("../domains/demographic.toml")),
    (BIOMETRIC, include_str!("../domains/biometric.toml")),
];

/// Returns all configured domain definitions, parsed from embedded TOML.
///
/// # Panics
///
/// Panics if any TOML config is malformed (the configs are embedded, so
/// this is caught by the tests below).
#[must_use]
pub fn all_domains() -> Vec<DomainDefinition> {
    DOMAIN_TOMLS
        .iter()
        .map(|(name, toml)| {
            parse_domain_toml(toml).unwrap_or_else(|e| panic!("Failed to parse {name}.toml: {e}"))
        })
        .collect()
}

/// Looks up a domain by identifier.
#[must_use]
pub fn find_domain(id: &str) -> Option<DomainDefinition> {
    all_domains().into_iter().find(|d| d.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_all_domains() {
        let ids: Vec<String> = all_domains().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, [ENROLMENT, DEMOGRAPHIC, BIOMETRIC]);
    }

    #[test]
    fn registry_keys_match_config_ids() {
        for (name, toml) in DOMAIN_TOMLS {
            assert_eq!(parse_domain_toml(toml).unwrap().id, *name);
        }
    }

    #[test]
    fn totals_follow_domain_prefixes() {
        let totals: Vec<String> = all_domains().into_iter().map(|d| d.total_column).collect();
        assert_eq!(totals, ["enrol_total", "demo_total", "bio_total"]);
    }

    #[test]
    fn demographic_renames_truncated_header() {
        let demo = find_domain(DEMOGRAPHIC).unwrap();
        assert_eq!(demo.canonical_header("demo_age_17_"), "demo_age_17_plus");
        assert!(find_domain("unknown").is_none());
    }
}
