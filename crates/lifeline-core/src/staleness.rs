use crate::response::ConfigSnapshot;
use crate::CoreError;

/// Decides whether a host component runs with outdated configuration.
///
/// Receives a snapshot rather than the entity so implementations never
/// touch entity locks. Failures are reported to the caller, which logs and
/// ignores them.
pub trait StalenessHelper: Send + Sync {
    fn is_stale(&self, snapshot: &ConfigSnapshot) -> Result<bool, CoreError>;
}

/// Compares the applied tag of every desired config type with its desired tag.
///
/// A host that has not reported any applied configuration is not stale.
/// Once it has, a desired type that is missing from the report, or whose
/// effective tag (host override first) differs, makes it stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagStalenessHelper;

impl StalenessHelper for TagStalenessHelper {
    fn is_stale(&self, snapshot: &ConfigSnapshot) -> Result<bool, CoreError> {
        if snapshot.actual.is_empty() {
            return Ok(false);
        }
        Ok(snapshot
            .effective_desired
            .iter()
            .any(|(config_type, desired_tag)| {
                snapshot
                    .actual
                    .get(config_type)
                    .and_then(|applied| applied.effective_tag(&snapshot.host_name))
                    != Some(desired_tag.as_str())
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lifeline_schema::{AppliedConfig, HostOverride};

    fn snapshot(desired: &[(&str, &str)], actual: &[(&str, AppliedConfig)]) -> ConfigSnapshot {
        ConfigSnapshot {
            host_name: "h1".to_owned(),
            effective_desired: desired
                .iter()
                .map(|(t, v)| ((*t).to_owned(), (*v).to_owned()))
                .collect(),
            actual: actual
                .iter()
                .map(|(t, a)| ((*t).to_owned(), a.clone()))
                .collect(),
            ..ConfigSnapshot::default()
        }
    }

    fn applied(tag: &str) -> AppliedConfig {
        AppliedConfig {
            version: Some(tag.to_owned()),
            ..AppliedConfig::default()
        }
    }

    #[test]
    fn nothing_reported_is_not_stale() {
        let snap = snapshot(&[("core-site", "v2")], &[]);
        assert!(!TagStalenessHelper.is_stale(&snap).unwrap());
    }

    #[test]
    fn matching_tags_are_not_stale() {
        let snap = snapshot(&[("core-site", "v2")], &[("core-site", applied("v2"))]);
        assert!(!TagStalenessHelper.is_stale(&snap).unwrap());
    }

    #[test]
    fn differing_tag_is_stale() {
        let snap = snapshot(&[("core-site", "v2")], &[("core-site", applied("v1"))]);
        assert!(TagStalenessHelper.is_stale(&snap).unwrap());
    }

    #[test]
    fn unreported_desired_type_is_stale() {
        let snap = snapshot(
            &[("core-site", "v1"), ("hdfs-site", "v1")],
            &[("core-site", applied("v1"))],
        );
        assert!(TagStalenessHelper.is_stale(&snap).unwrap());
    }

    #[test]
    fn host_override_takes_precedence() {
        let mut overridden = applied("v1");
        overridden.host_overrides.push(HostOverride {
            host_name: "h1".to_owned(),
            version_tag: "v9".to_owned(),
        });
        let snap = snapshot(&[("core-site", "v9")], &[("core-site", overridden)]);
        assert!(!TagStalenessHelper.is_stale(&snap).unwrap());
    }
}
