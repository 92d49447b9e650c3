//! Domain primitive types used across the Lumper workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
///
/// Generated IDs are the last dash-separated segment of a UUID v4, which
/// keeps them short enough to type while staying collision-resistant for a
/// single host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random container ID.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().to_string();
        let tail = uuid.rsplit('-').next().unwrap_or(uuid.as_str());
        Self(tail.to_owned())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a container as persisted in its metadata record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Container process has been launched and not yet reaped.
    Running,
    /// Container process has exited.
    Stopped,
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Resource limits requested for a container's cgroup.
///
/// A `None` field means the corresponding cgroup subsystem entry is not
/// created at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Memory limit in kernel format (e.g. `"100m"`), written verbatim to
    /// `memory.limit_in_bytes`.
    pub memory_limit: Option<String>,
    /// Number of CPUs; converted to a CFS quota. Must be positive.
    pub cpus: Option<u32>,
}

impl ResourceConfig {
    /// Returns true if no subsystem entry would be created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.memory_limit.is_none() && self.cpus.is_none()
    }

    /// Checks the limits are expressible before any cgroup entry is built.
    ///
    /// # Errors
    ///
    /// Returns a config error if the memory limit is not in kernel format
    /// (bytes with an optional k/m/g suffix) or `cpus` is zero.
    pub fn validate(&self) -> crate::error::Result<()> {
        if let Some(limit) = &self.memory_limit {
            if !is_kernel_size(limit) {
                return Err(crate::error::LumperError::Config {
                    message: format!(
                        "bad memory limit {limit:?}: expected bytes with an optional k/m/g suffix"
                    ),
                });
            }
        }
        if self.cpus == Some(0) {
            return Err(crate::error::LumperError::Config {
                message: "cpus must be positive".into(),
            });
        }
        Ok(())
    }
}

fn is_kernel_size(value: &str) -> bool {
    let digits = value
        .strip_suffix(['k', 'K', 'm', 'M', 'g', 'G'])
        .unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_short() {
        let a = ContainerId::generate();
        let b = ContainerId::generate();
        assert_ne!(a, b);
        // Last UUID v4 segment is 12 hex chars.
        assert_eq!(a.as_str().len(), 12);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn container_status_display_lowercase() {
        assert_eq!(format!("{}", ContainerStatus::Running), "running");
        assert_eq!(format!("{}", ContainerStatus::Stopped), "stopped");
    }

    #[test]
    fn container_status_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let back: ContainerStatus = serde_json::from_str("\"stopped\"").unwrap();
        assert_eq!(back, ContainerStatus::Stopped);
    }

    #[test]
    fn resource_config_empty_when_defaulted() {
        assert!(ResourceConfig::default().is_empty());
        let cfg = ResourceConfig {
            memory_limit: Some("100m".into()),
            cpus: None,
        };
        assert!(!cfg.is_empty());
    }

    #[test]
    fn validate_accepts_kernel_format_limits() {
        for limit in ["100m", "512K", "1g", "10485760"] {
            let cfg = ResourceConfig {
                memory_limit: Some(limit.into()),
                cpus: Some(1),
            };
            cfg.validate().expect("limit should be accepted");
        }
        ResourceConfig::default().validate().expect("empty config");
    }

    #[test]
    fn validate_rejects_malformed_memory_limits() {
        for limit in ["", "m", "10x", "ten", "1.5g", "-1m"] {
            let cfg = ResourceConfig {
                memory_limit: Some(limit.into()),
                cpus: None,
            };
            assert!(
                matches!(
                    cfg.validate(),
                    Err(crate::error::LumperError::Config { .. })
                ),
                "limit {limit:?} should be rejected"
            );
        }
    }

    #[test]
    fn validate_rejects_zero_cpus() {
        let cfg = ResourceConfig {
            memory_limit: None,
            cpus: Some(0),
        };
        assert!(matches!(
            cfg.validate(),
            Err(crate::error::LumperError::Config { .. })
        ));
    }
}
