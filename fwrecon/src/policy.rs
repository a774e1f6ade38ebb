//! Guardrail policy files.
//!
//! A policy names the high-risk zones, the shadow-detection scope, the date
//! format for rule metadata, and an ordered list of rules. Each rule refers to
//! a registered family by id and may override the family's default severity.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guardrail::{lookup_family, Severity};

const EMBEDDED_POLICY: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/policies/default.toml"));

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("failed to read policy {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse policy {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("rule '{rule}' refers to unknown guardrail family '{family}'")]
    UnknownFamily { rule: String, family: String },
    #[error("rule id '{0}' is declared more than once")]
    DuplicateRule(String),
}

/// Which rule lists shadow detection considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadowScope {
    /// Only the target device-group's own rules.
    #[default]
    DeviceGroup,
    /// Also peer groups' rules whose zones are all defined in the target.
    SharedZones,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    #[serde(default)]
    pub high_risk_zones: Vec<String>,
    #[serde(default)]
    pub shadow_scope: ShadowScope,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default, rename = "rule")]
    pub rules: Vec<GuardrailRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailRule {
    pub id: String,
    pub family: String,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub explanation: String,
    /// Threshold for counting families such as `change_budget`.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Object selectors (`kind:name`) for families such as `protected_objects`.
    #[serde(default)]
    pub objects: Vec<String>,
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

impl GuardrailPolicy {
    /// The embedded default policy.
    pub fn embedded() -> Result<Self, PolicyError> {
        parse_policy(EMBEDDED_POLICY, "embedded")
    }

    /// Check that rule ids are unique and every family is registered.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id.as_str()) {
                return Err(PolicyError::DuplicateRule(rule.id.clone()));
            }
            if lookup_family(&rule.family).is_none() {
                return Err(PolicyError::UnknownFamily {
                    rule: rule.id.clone(),
                    family: rule.family.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn is_high_risk(&self, zone: &str) -> bool {
        self.high_risk_zones.iter().any(|z| z == zone)
    }
}

pub fn load_policy(path: Option<&Path>) -> Result<GuardrailPolicy, PolicyError> {
    load_policy_with_source(path).map(|(policy, _)| policy)
}

/// Load a policy file, or the embedded default, reporting where it came from.
pub fn load_policy_with_source(
    path: Option<&Path>,
) -> Result<(GuardrailPolicy, String), PolicyError> {
    let (policy, source) = match path {
        Some(path) => {
            let label = path.display().to_string();
            let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
                path: label.clone(),
                source,
            })?;
            (parse_policy(&raw, &label)?, format!("file:{label}"))
        }
        None => (GuardrailPolicy::embedded()?, "embedded".to_string()),
    };
    policy.validate()?;
    Ok((policy, source))
}

fn parse_policy(raw: &str, label: &str) -> Result<GuardrailPolicy, PolicyError> {
    toml::from_str::<GuardrailPolicy>(raw).map_err(|source| PolicyError::Parse {
        path: label.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{load_policy_with_source, PolicyError, ShadowScope};

    #[test]
    fn embedded_policy_loads_and_validates() {
        let (policy, source) = load_policy_with_source(None).expect("embedded policy");
        assert_eq!(source, "embedded");
        assert_eq!(policy.shadow_scope, ShadowScope::DeviceGroup);
        assert!(policy.is_high_risk("untrust"));
        let families: Vec<&str> = policy.rules.iter().map(|r| r.family.as_str()).collect();
        assert_eq!(
            families,
            vec![
                "overly_broad",
                "deny_logging",
                "rule_metadata",
                "shadowed_rule",
                "change_budget"
            ]
        );
    }

    #[test]
    fn policy_source_reports_override_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("policy.toml");
        fs::write(
            &path,
            r#"
high_risk_zones = ["wan"]
shadow_scope = "shared_zones"

[[rule]]
id = "protect-core"
family = "protected_objects"
severity = "block"
objects = ["security_rule:deny-all"]
"#,
        )
        .expect("write policy");

        let (policy, source) = load_policy_with_source(Some(&path)).expect("policy");
        assert_eq!(source, format!("file:{}", path.display()));
        assert_eq!(policy.shadow_scope, ShadowScope::SharedZones);
        assert_eq!(policy.date_format, "%Y-%m-%d");
        assert_eq!(policy.rules[0].objects, vec!["security_rule:deny-all"]);
    }

    #[test]
    fn unknown_family_is_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("policy.toml");
        fs::write(&path, "[[rule]]\nid = \"x\"\nfamily = \"astrology\"\n").expect("write");
        let err = load_policy_with_source(Some(&path)).expect_err("unknown family");
        assert!(matches!(err, PolicyError::UnknownFamily { family, .. } if family == "astrology"));
    }

    #[test]
    fn duplicate_rule_ids_are_rejected() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("policy.toml");
        fs::write(
            &path,
            "[[rule]]\nid = \"x\"\nfamily = \"deny_logging\"\n\n[[rule]]\nid = \"x\"\nfamily = \"rule_metadata\"\n",
        )
        .expect("write");
        let err = load_policy_with_source(Some(&path)).expect_err("duplicate");
        assert!(matches!(err, PolicyError::DuplicateRule(id) if id == "x"));
    }
}
