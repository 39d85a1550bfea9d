// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, RwLock},
    time::SystemTime,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// An operator-supplied labeling constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelPolicy {
    pub name: String,
    #[serde(default)]
    pub required_labels: Vec<String>,
    #[serde(default)]
    pub forbidden_labels: Vec<String>,
    #[serde(default)]
    pub label_patterns: Vec<String>,
    pub enforcement: Enforcement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Drop,
    Warn,
    Fix,
}

impl fmt::Display for Enforcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let enforcement = match self {
            Enforcement::Drop => "drop",
            Enforcement::Warn => "warn",
            Enforcement::Fix => "fix",
        };
        write!(f, "{enforcement}")
    }
}

impl FromStr for Enforcement {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("drop") {
            Ok(Enforcement::Drop)
        } else if s.eq_ignore_ascii_case("warn") {
            Ok(Enforcement::Warn)
        } else if s.eq_ignore_ascii_case("fix") {
            Ok(Enforcement::Fix)
        } else {
            Err("enforcement should be one of drop, warn, fix")
        }
    }
}

/// The operator policy document. Top-level sections other than `policies`
/// (`global`, `custom_rules`, ...) are accepted and ignored.
#[derive(Debug, Default, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    policies: Vec<LabelPolicy>,
}

#[derive(Debug)]
pub enum PolicyError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read policy file: {err}"),
            Self::Yaml(err) => write!(f, "failed to parse policy document: {err}"),
            Self::Invalid(msg) => write!(f, "invalid policy: {msg}"),
        }
    }
}

impl std::error::Error for PolicyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Name given to the synthetic policy built from the `required_labels` /
/// `forbidden_labels` configuration overlays.
pub const CONFIG_OVERLAY_POLICY: &str = "config-overlay";

/// Owns the current policy snapshot and reloads it when the source file's
/// modification time advances.
///
/// Reload is atomic: either the new document replaces the old wholesale, or
/// the previous snapshot stays and a warning is logged.
pub struct PolicyManager {
    policy_file: Option<PathBuf>,
    overlay: Option<LabelPolicy>,
    snapshot: RwLock<Arc<Vec<LabelPolicy>>>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl PolicyManager {
    pub fn new(policy_file: Option<PathBuf>, overlay: Option<LabelPolicy>) -> Self {
        let initial = overlay.iter().cloned().collect::<Vec<_>>();
        Self {
            policy_file,
            overlay,
            snapshot: RwLock::new(Arc::new(initial)),
            last_modified: Mutex::new(None),
        }
    }

    /// Builds the config overlay policy, if any labels were configured.
    pub fn overlay_from_labels(
        required_labels: &[String],
        forbidden_labels: &[String],
    ) -> Option<LabelPolicy> {
        if required_labels.is_empty() && forbidden_labels.is_empty() {
            return None;
        }
        Some(LabelPolicy {
            name: CONFIG_OVERLAY_POLICY.to_string(),
            required_labels: required_labels.to_vec(),
            forbidden_labels: forbidden_labels.to_vec(),
            label_patterns: Vec::new(),
            enforcement: Enforcement::Warn,
        })
    }

    /// Initial load. Unlike [`reload_if_changed`](Self::reload_if_changed),
    /// failures here surface to the caller.
    pub fn load(&self) -> Result<(), PolicyError> {
        let Some(path) = self.policy_file.as_deref() else {
            return Ok(());
        };
        let modified = file_mtime(path);
        let policies = self.read_and_validate(path)?;
        self.swap_snapshot(policies);
        *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = modified;
        Ok(())
    }

    /// Immutable snapshot of the active policies. File-sourced policies come
    /// first, the config overlay last.
    pub fn current(&self) -> Arc<Vec<LabelPolicy>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-reads the policy file when its mtime advanced. Returns whether a
    /// new snapshot was installed. Any failure keeps the previous snapshot.
    pub fn reload_if_changed(&self) -> bool {
        let Some(path) = self.policy_file.as_deref() else {
            return false;
        };
        let modified = file_mtime(path);
        {
            let last = self.last_modified.lock().unwrap_or_else(|e| e.into_inner());
            if modified.is_none() || modified == *last {
                return false;
            }
        }
        match self.read_and_validate(path) {
            Ok(policies) => {
                self.swap_snapshot(policies);
                *self.last_modified.lock().unwrap_or_else(|e| e.into_inner()) = modified;
                crate::sift_info!("Reloaded policy file {}", path.display());
                true
            }
            Err(err) => {
                crate::sift_warn!(
                    "Keeping previous policies, reload of {} failed: {}",
                    path.display(),
                    err
                );
                false
            }
        }
    }

    fn swap_snapshot(&self, mut policies: Vec<LabelPolicy>) {
        if let Some(overlay) = &self.overlay {
            policies.push(overlay.clone());
        }
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(policies);
    }

    fn read_and_validate(&self, path: &Path) -> Result<Vec<LabelPolicy>, PolicyError> {
        let text = std::fs::read_to_string(path).map_err(PolicyError::Io)?;
        parse_and_validate(&text)
    }

    /// Renders policies into the numbered-list form the advisory prompt
    /// expects.
    pub fn summaries(policies: &[LabelPolicy]) -> Vec<String> {
        policies
            .iter()
            .map(|policy| {
                let mut summary = format!("Policy '{}': ", policy.name);
                if !policy.required_labels.is_empty() {
                    summary.push_str(&format!(
                        "Required labels: [{}]. ",
                        policy.required_labels.join(", ")
                    ));
                }
                if !policy.forbidden_labels.is_empty() {
                    summary.push_str(&format!(
                        "Forbidden labels: [{}]. ",
                        policy.forbidden_labels.join(", ")
                    ));
                }
                if !policy.label_patterns.is_empty() {
                    summary.push_str(&format!(
                        "Label patterns: [{}]. ",
                        policy.label_patterns.join(", ")
                    ));
                }
                summary.push_str(&format!("Enforcement: {}", policy.enforcement));
                summary
            })
            .collect()
    }
}

/// Parses a policy document and checks every policy: non-empty name, valid
/// enforcement (enforced by the type), compiling label patterns.
pub fn parse_and_validate(text: &str) -> Result<Vec<LabelPolicy>, PolicyError> {
    let document: PolicyDocument = serde_yaml::from_str(text).map_err(PolicyError::Yaml)?;
    for policy in &document.policies {
        if policy.name.trim().is_empty() {
            return Err(PolicyError::Invalid("policy name must not be empty".into()));
        }
        for pattern in &policy.label_patterns {
            Regex::new(pattern).map_err(|err| {
                PolicyError::Invalid(format!(
                    "policy '{}' has invalid label pattern '{}': {}",
                    policy.name, pattern, err
                ))
            })?;
        }
    }
    Ok(document.policies)
}

fn file_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
