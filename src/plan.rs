//! Deployment-target selection: the declarative deploy plan and its diff
//! against what the state store says is already deployed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StageError};
use crate::store::{CURRENTLY_DEPLOYED_KEY, StateStore, env_vars_key};

/// Version string that forces an environment to be redeployed every run.
pub const ALWAYS_DEPLOY_VERSION: &str = "latest";

/// The declarative deploy plan file (`deploy.yml`): the desired mapping of
/// environment name to version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployPlan {
    /// Desired state: environment name to the version that should be live.
    #[serde(default)]
    pub environments: BTreeMap<String, String>,
}

/// One environment to process: a name plus the env-var mapping injected into
/// every toolchain invocation for that environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub environment: String,
    pub env_vars: BTreeMap<String, String>,
}

/// Loads the deploy plan from a YAML file.
pub fn load_plan(path: &Path) -> Result<DeployPlan> {
    let contents = std::fs::read_to_string(path).map_err(|source| StageError::IoError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| StageError::PlanError {
        path: path.to_path_buf(),
        source,
    })
}

/// Computes which environments need deploying.
///
/// An environment is included when its desired version is absent from the
/// already-deployed map or differs from it, and unconditionally when the
/// desired version is `"latest"`.
pub fn needs_deployment(
    already_deployed: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut difference = BTreeMap::new();
    for (name, version) in desired {
        if version == ALWAYS_DEPLOY_VERSION || already_deployed.get(name) != Some(version) {
            difference.insert(name.clone(), version.clone());
        }
    }
    difference
}

/// Reads the already-deployed map from the state store. An absent key is a
/// valid first run and yields an empty map.
pub fn load_currently_deployed(store: &dyn StateStore) -> Result<BTreeMap<String, String>> {
    match store.get(CURRENTLY_DEPLOYED_KEY)? {
        Some(payload) => {
            serde_json::from_str(&payload).map_err(|source| StageError::SerializationError {
                message: format!("'{CURRENTLY_DEPLOYED_KEY}' is not a JSON object"),
                source,
            })
        }
        None => Ok(BTreeMap::new()),
    }
}

/// Records successfully staged environments by merging them into the
/// previously recorded map and writing the result back.
///
/// Merging rather than replacing keeps environments deployed by earlier runs
/// on record.
pub fn record_deployments(
    store: &dyn StateStore,
    staged: &BTreeMap<String, String>,
) -> Result<()> {
    let mut recorded = load_currently_deployed(store)?;
    recorded.extend(staged.iter().map(|(k, v)| (k.clone(), v.clone())));

    let payload =
        serde_json::to_string(&recorded).map_err(|source| StageError::SerializationError {
            message: format!("failed to encode '{CURRENTLY_DEPLOYED_KEY}'"),
            source,
        })?;
    store.put(CURRENTLY_DEPLOYED_KEY, &payload)
}

/// Builds the deploy target for `environment`, fetching its env-var map from
/// the state store. An absent env-var key means no injected variables.
pub fn load_target(store: &dyn StateStore, environment: &str) -> Result<DeployTarget> {
    let key = env_vars_key(environment);
    let env_vars = match store.get(&key)? {
        Some(payload) => {
            serde_json::from_str(&payload).map_err(|source| StageError::SerializationError {
                message: format!("'{key}' is not a JSON object of variable to value"),
                source,
            })?
        }
        None => BTreeMap::new(),
    };

    Ok(DeployTarget {
        environment: environment.to_string(),
        env_vars,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::store::MemStore;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_diff_same_keys_different_values() {
        let already = map(&[("staging", "v0.0.4"), ("dev", "v0.0.4"), ("production", "v0.0.5")]);
        let desired = map(&[("staging", "v0.0.4"), ("dev", "v0.0.3"), ("production", "v0.0.3")]);
        assert_eq!(
            needs_deployment(&already, &desired),
            map(&[("dev", "v0.0.3"), ("production", "v0.0.3")])
        );
    }

    #[test]
    fn test_diff_same_values_different_keys() {
        let already = map(&[("staging", "v0.0.4"), ("dev", "v0.0.4"), ("production", "v0.0.5")]);
        let desired = map(&[("staging", "v0.0.4"), ("dev", "v0.0.4"), ("qa", "v0.0.5")]);
        assert_eq!(needs_deployment(&already, &desired), map(&[("qa", "v0.0.5")]));
    }

    #[test]
    fn test_diff_different_keys_and_values() {
        let already = map(&[("staging", "v0.0.4"), ("dev", "v0.0.4"), ("production", "v0.0.5")]);
        let desired = map(&[("staging", "v0.0.4"), ("dev", "v0.0.5"), ("qa", "v0.0.5")]);
        assert_eq!(
            needs_deployment(&already, &desired),
            map(&[("dev", "v0.0.5"), ("qa", "v0.0.5")])
        );
    }

    #[test]
    fn test_diff_nothing_deployed_yet() {
        let desired = map(&[("staging", "v0.0.4"), ("dev", "v0.0.3"), ("production", "v0.0.3")]);
        assert_eq!(needs_deployment(&BTreeMap::new(), &desired), desired);
    }

    #[test]
    fn test_diff_nothing_desired() {
        let already = map(&[("staging", "v0.0.4"), ("dev", "v0.0.3")]);
        assert_eq!(needs_deployment(&already, &BTreeMap::new()), BTreeMap::new());
    }

    #[test]
    fn test_diff_latest_always_included() {
        let both = map(&[("staging", "latest"), ("dev", "v0.0.3"), ("production", "v0.0.3")]);
        assert_eq!(
            needs_deployment(&both, &both),
            map(&[("staging", "latest")])
        );
    }

    #[test]
    fn test_diff_both_empty() {
        assert_eq!(
            needs_deployment(&BTreeMap::new(), &BTreeMap::new()),
            BTreeMap::new()
        );
    }

    #[test]
    fn test_load_plan_yaml() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let plan_file = temp_dir.path().join("deploy.yml");
        std::fs::write(
            &plan_file,
            "environments:\n  staging: v0.0.4\n  production: latest\n",
        )
        .unwrap();

        let plan = load_plan(&plan_file).unwrap();
        assert_eq!(
            plan.environments,
            map(&[("staging", "v0.0.4"), ("production", "latest")])
        );
    }

    #[test]
    fn test_record_deployments_merges() {
        let store = MemStore::new().with_entry(
            CURRENTLY_DEPLOYED_KEY,
            r#"{"production":"v0.0.5","staging":"v0.0.4"}"#,
        );

        record_deployments(&store, &map(&[("staging", "v0.0.6"), ("qa", "v0.0.6")])).unwrap();

        let recorded = load_currently_deployed(&store).unwrap();
        assert_eq!(
            recorded,
            map(&[("production", "v0.0.5"), ("staging", "v0.0.6"), ("qa", "v0.0.6")])
        );
    }

    #[test]
    fn test_load_target_missing_env_vars_is_empty() {
        let store = MemStore::new();
        let target = load_target(&store, "staging").unwrap();
        assert_eq!(target.environment, "staging");
        assert!(target.env_vars.is_empty());
    }

    #[test]
    fn test_load_target_parses_env_vars() {
        let store = MemStore::new().with_entry("staging/env_vars", r#"{"REGION":"us-east-1"}"#);
        let target = load_target(&store, "staging").unwrap();
        assert_eq!(target.env_vars, map(&[("REGION", "us-east-1")]));
    }

    proptest! {
        /// Every key in the diff comes from the desired map, and a desired
        /// entry survives the diff exactly when it is "latest" or not
        /// already deployed at that version.
        #[test]
        fn prop_diff_membership(
            already in proptest::collection::btree_map("[a-z]{1,4}", "v[0-9]", 0..6),
            desired in proptest::collection::btree_map("[a-z]{1,4}", "v[0-9]", 0..6),
        ) {
            let diff = needs_deployment(&already, &desired);
            for (name, version) in &desired {
                let expected = version == ALWAYS_DEPLOY_VERSION
                    || already.get(name) != Some(version);
                prop_assert_eq!(diff.contains_key(name), expected);
            }
            for name in diff.keys() {
                prop_assert!(desired.contains_key(name));
            }
        }
    }
}
