//! The incremental build orchestrator.
//!
//! Per deployment target: load the previous snapshot, discover and validate
//! units, fan every unit out to a bounded rayon pool, wait for all workers
//! at the barrier, then publish the aggregated manifest list and the new
//! snapshot. Nothing is published if any worker failed.
//!
//! Workers never share mutable state: each returns its own result and the
//! owning thread folds them after the barrier, so the snapshot gets exactly
//! one entry per unit and the manifest list keeps discovery order without
//! any locking.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::builder::{ArtifactBuilder, unit_output_dir};
use crate::discovery::discover_units;
use crate::error::{Result, StageError};
use crate::hashing::hash_directory;
use crate::logging::Logger;
use crate::plan::DeployTarget;
use crate::snapshot::HashSnapshot;
use crate::store::{StateStore, source_hashes_key};
use crate::unit::{Unit, UnitKind, UnitManifest};

/// File name of the artifact-configuration output, written per environment.
pub const UNIT_CONFIGS_FILENAME: &str = "unit_configs.json";

/// The staging pipeline for one repository root.
pub struct Pipeline<'a> {
    root: &'a Path,
    output_root: &'a Path,
    store: &'a dyn StateStore,
    builder: &'a dyn ArtifactBuilder,
    jobs: Option<usize>,
    logger: Logger,
}

/// What one run produced for one deployment target.
#[derive(Debug)]
pub struct StageOutcome {
    /// One manifest entry per discovered unit, in discovery order.
    pub manifests: Vec<UnitManifest>,
    /// The published snapshot: exactly one entry per discovered unit.
    pub snapshot: HashSnapshot,
    /// Identities of the units that were actually rebuilt.
    pub built: Vec<String>,
    /// Where the manifest list was written.
    pub configs_path: PathBuf,
}

/// What one worker produced for one unit.
struct UnitOutcome {
    manifest: UnitManifest,
    identity: String,
    hash: String,
    built: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        root: &'a Path,
        output_root: &'a Path,
        store: &'a dyn StateStore,
        builder: &'a dyn ArtifactBuilder,
        jobs: Option<usize>,
        logger: Logger,
    ) -> Self {
        Self {
            root,
            output_root,
            store,
            builder,
            jobs,
            logger,
        }
    }

    /// Runs the full pipeline for one deployment target.
    ///
    /// # Errors
    ///
    /// Configuration and store errors abort immediately. Per-unit failures
    /// are collected at the barrier and returned together as
    /// [`StageError::UnitFailures`]; in that case nothing was published.
    pub fn stage(&self, target: &DeployTarget) -> Result<StageOutcome> {
        let logger = self.logger.scoped(&target.environment);

        let previous = self.load_previous_snapshot(&target.environment)?;
        if previous.is_empty() {
            logger.verbose(1, "No previous snapshot; treating every unit as stale");
        }

        let units = discover_units(self.root)?;
        logger.info(format!("Discovered {} unit(s)", units.len()));

        let outcomes = self.fan_out(&units, target, &previous, &logger)?;

        // Fold worker results on the owning thread: one snapshot entry and
        // one manifest entry per unit, manifest order = discovery order.
        let mut snapshot = HashSnapshot::new();
        let mut manifests = Vec::with_capacity(outcomes.len());
        let mut built = Vec::new();
        for outcome in outcomes {
            snapshot.record(outcome.identity.clone(), outcome.hash);
            manifests.push(outcome.manifest);
            if outcome.built {
                built.push(outcome.identity);
            }
        }

        let configs_path = self.write_unit_configs(&target.environment, &manifests)?;
        self.publish_snapshot(&target.environment, &snapshot)?;

        logger.info(format!(
            "Staged {} unit(s), rebuilt {}, snapshot published",
            manifests.len(),
            built.len()
        ));

        Ok(StageOutcome {
            manifests,
            snapshot,
            built,
            configs_path,
        })
    }

    /// Runs one worker per unit on the bounded pool and waits for all of
    /// them. The `collect` is the barrier: it completes only after every
    /// worker has finished, so the failure report is complete and no output
    /// escapes early.
    fn fan_out(
        &self,
        units: &[Unit],
        target: &DeployTarget,
        previous: &HashSnapshot,
        logger: &Logger,
    ) -> Result<Vec<UnitOutcome>> {
        let run = || -> Vec<Result<UnitOutcome>> {
            units
                .par_iter()
                .map(|unit| {
                    self.process_unit(unit, target, previous, logger)
                        .map_err(|err| StageError::UnitFailed {
                            identity: unit.identity.clone(),
                            source: Box::new(err),
                        })
                })
                .collect()
        };

        let results = match self.jobs {
            Some(jobs) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(jobs)
                    .build()
                    .map_err(|err| StageError::ConfigError {
                        message: format!("failed to build worker pool of {jobs}: {err}"),
                    })?;
                pool.install(run)
            }
            None => run(),
        };

        let total = results.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => failures.push(err),
            }
        }

        if failures.is_empty() {
            Ok(outcomes)
        } else {
            Err(StageError::UnitFailures { total, failures })
        }
    }

    /// One worker: hash, bookkeep, and conditionally build.
    fn process_unit(
        &self,
        unit: &Unit,
        target: &DeployTarget,
        previous: &HashSnapshot,
        logger: &Logger,
    ) -> Result<UnitOutcome> {
        let hash = hash_directory(&unit.dir)?;
        logger.verbose(1, format!("{}: {hash}", unit.identity));

        let manifest = unit.manifest_entry(&hash)?;

        let mut built = false;
        if previous.is_stale(&unit.identity, &hash) {
            match unit.classify()? {
                UnitKind::Service => {
                    let output_dir =
                        unit_output_dir(self.output_root, &target.environment, &unit.identity);
                    self.builder.build(unit, target, &output_dir)?;
                    logger.info(format!("{}: rebuilt", unit.identity));
                    built = true;
                }
                UnitKind::StaticAsset => {
                    // Static-asset staging is not implemented yet; the unit
                    // still gets full hash bookkeeping.
                    logger.info(format!(
                        "{}: changed, but static-asset staging is not implemented; skipping",
                        unit.identity
                    ));
                }
            }
        } else {
            logger.verbose(1, format!("{}: unchanged, build skipped", unit.identity));
        }

        Ok(UnitOutcome {
            manifest,
            identity: unit.identity.clone(),
            hash,
            built,
        })
    }

    /// Loads the previous snapshot; an absent store key is a valid first
    /// run and yields an empty snapshot.
    fn load_previous_snapshot(&self, environment: &str) -> Result<HashSnapshot> {
        match self.store.get(&source_hashes_key(environment))? {
            Some(payload) => HashSnapshot::from_json(&payload),
            None => Ok(HashSnapshot::new()),
        }
    }

    fn publish_snapshot(&self, environment: &str, snapshot: &HashSnapshot) -> Result<()> {
        self.store
            .put(&source_hashes_key(environment), &snapshot.to_json()?)
    }

    /// Writes the aggregated manifest list for the downstream provisioning
    /// step.
    fn write_unit_configs(
        &self,
        environment: &str,
        manifests: &[UnitManifest],
    ) -> Result<PathBuf> {
        let env_dir = self.output_root.join(environment);
        std::fs::create_dir_all(&env_dir).map_err(|source| StageError::IoError {
            path: env_dir.clone(),
            source,
        })?;

        let path = env_dir.join(UNIT_CONFIGS_FILENAME);
        let payload =
            serde_json::to_string_pretty(manifests).map_err(|source| {
                StageError::SerializationError {
                    message: "failed to encode unit configs".to_string(),
                    source,
                }
            })?;
        std::fs::write(&path, payload).map_err(|source| StageError::IoError {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }
}
