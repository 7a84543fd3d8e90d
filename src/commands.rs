//! Implementation of stagehand subcommands.
//!
//! This module contains the logic for executing each stagehand command. The
//! main entry point is the [`execute`] function which dispatches to the
//! appropriate command handler.
//!
//! # Commands
//!
//! - [`deploy`]: Full run - plan diff, staging, deployment recording
//! - [`stage`]: Stage a single environment
//! - [`plan`]: Print the needs-deployment diff

use std::collections::BTreeMap;

use crate::builder::{DEFAULT_BUILD_COMMAND, DEFAULT_PACKAGE_COMMAND, ShellBuilder};
use crate::cli::{Cli, Commands, GlobalOpts};
use crate::error::Result;
use crate::logging::Logger;
use crate::pipeline::Pipeline;
use crate::plan::{
    load_currently_deployed, load_plan, load_target, needs_deployment, record_deployments,
};
use crate::store::{DirStore, StateStore, wait_until_ready};

/// Execute the command selected by the parsed CLI arguments.
///
/// This is the main entry point when using stagehand as a library: build a
/// [`Cli`] (via its builder or argv parsing) and hand it here.
pub fn execute(cli: &Cli) -> Result<()> {
    let opts = cli.global_opts();
    let logger = Logger::new(opts.verbose(), opts.quiet());
    let store = DirStore::new(opts.get_store_dir());

    match cli.command() {
        Commands::Deploy => deploy(opts, &store, &logger),
        Commands::Stage { environment } => stage(opts, &store, environment, &logger),
        Commands::Plan => plan(opts, &store, &logger),
    }
}

/// Executes the deploy command: the full batch run invoked by automation.
///
/// Diffs the deploy plan against the recorded deployment state, stages every
/// environment that needs it (one fully before the next begins), and merges
/// the successes back into the record. Any failure aborts before anything is
/// recorded.
pub fn deploy(opts: &GlobalOpts, store: &dyn StateStore, logger: &Logger) -> Result<()> {
    wait_until_ready(store, logger)?;

    let deploy_plan = load_plan(opts.plan_file())?;
    let already = load_currently_deployed(store)?;
    let pending = needs_deployment(&already, &deploy_plan.environments);

    if pending.is_empty() {
        logger.info("Nothing to deploy; every environment matches the plan");
        return Ok(());
    }

    logger.info(format!(
        "Deploying {} environment(s): {}",
        pending.len(),
        pending
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for environment in pending.keys() {
        stage(opts, store, environment, logger)?;
    }

    record_deployments(store, &pending)?;
    logger.info("Deployment state recorded");

    Ok(())
}

/// Executes the stage command: runs the pipeline for one environment.
pub fn stage(
    opts: &GlobalOpts,
    store: &dyn StateStore,
    environment: &str,
    logger: &Logger,
) -> Result<()> {
    // Idempotent; deploy probes before its plan reads, and a direct stage
    // invocation gets the same guard here.
    wait_until_ready(store, logger)?;

    let target = load_target(store, environment)?;

    let builder = ShellBuilder::new(
        opts.build_command().unwrap_or(DEFAULT_BUILD_COMMAND),
        opts.package_command().unwrap_or(DEFAULT_PACKAGE_COMMAND),
    );

    let root = opts.get_root();
    let output_root = opts.get_output_root();
    let pipeline = Pipeline::new(
        &root,
        &output_root,
        store,
        &builder,
        opts.jobs(),
        logger.clone(),
    );

    let outcome = pipeline.stage(&target)?;
    logger.verbose(
        1,
        format!("Unit configs written to {}", outcome.configs_path.display()),
    );

    Ok(())
}

/// Executes the plan command: prints which environments need deploying.
///
/// Output goes to stdout as a JSON object so automation can consume it; the
/// command has no side effects.
pub fn plan(opts: &GlobalOpts, store: &dyn StateStore, logger: &Logger) -> Result<()> {
    let deploy_plan = load_plan(opts.plan_file())?;
    let already = load_currently_deployed(store)?;
    let pending: BTreeMap<String, String> = needs_deployment(&already, &deploy_plan.environments);

    match serde_json::to_string_pretty(&pending) {
        Ok(json) => println!("{json}"),
        Err(source) => {
            return Err(crate::error::StageError::SerializationError {
                message: "failed to encode plan output".to_string(),
                source,
            });
        }
    }

    if pending.is_empty() {
        logger.verbose(1, "Every environment matches the plan");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::store::{CURRENTLY_DEPLOYED_KEY, MemStore};
    use crate::unit::MANIFEST_FILENAME;

    fn add_unit(root: &Path, name: &str, marker: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(MANIFEST_FILENAME), marker).unwrap();
        fs::write(dir.join("main.go"), format!("package {name}")).unwrap();
    }

    fn test_opts(repo: &TempDir, out: &TempDir, plan_file: &Path) -> GlobalOpts {
        GlobalOpts::builder()
            .root(repo.path())
            .output_root(out.path())
            .plan_file(plan_file)
            .build_command("cp main.go {output}/app")
            .package_command("mv app handler.zip")
            .build()
    }

    #[test]
    fn test_deploy_stages_pending_environments_and_records() {
        let repo = TempDir::new().unwrap();
        add_unit(repo.path(), "login", r#"{"type": "API"}"#);

        let out = TempDir::new().unwrap();
        let plan_path = repo.path().join("deploy.yml");
        fs::write(&plan_path, "environments:\n  staging: v1\n  dev: v1\n").unwrap();

        let store = MemStore::new()
            .with_entry(CURRENTLY_DEPLOYED_KEY, r#"{"dev":"v1"}"#);
        let opts = test_opts(&repo, &out, &plan_path);
        let logger = Logger::new(0, true);

        deploy(&opts, &store, &logger).unwrap();

        // Only staging was pending; it was staged and recorded
        assert!(store.get("staging/source_hashes").unwrap().is_some());
        assert!(store.get("dev/source_hashes").unwrap().is_none());
        let recorded = load_currently_deployed(&store).unwrap();
        assert_eq!(recorded.get("staging").map(String::as_str), Some("v1"));
        assert_eq!(recorded.get("dev").map(String::as_str), Some("v1"));
        assert!(out
            .path()
            .join("staging/services/login/handler.zip")
            .exists());
    }

    #[test]
    fn test_deploy_with_nothing_pending_is_a_noop() {
        let repo = TempDir::new().unwrap();
        add_unit(repo.path(), "login", r#"{"type": "API"}"#);

        let out = TempDir::new().unwrap();
        let plan_path = repo.path().join("deploy.yml");
        fs::write(&plan_path, "environments:\n  dev: v1\n").unwrap();

        let store = MemStore::new().with_entry(CURRENTLY_DEPLOYED_KEY, r#"{"dev":"v1"}"#);
        let opts = test_opts(&repo, &out, &plan_path);

        deploy(&opts, &store, &Logger::new(0, true)).unwrap();
        assert!(store.get("dev/source_hashes").unwrap().is_none());
    }

    #[test]
    fn test_stage_single_environment() {
        let repo = TempDir::new().unwrap();
        add_unit(repo.path(), "register", r#"{"type": "API"}"#);

        let out = TempDir::new().unwrap();
        let plan_path = repo.path().join("deploy.yml");
        let store = MemStore::new();
        let opts = test_opts(&repo, &out, &plan_path);

        stage(&opts, &store, "production", &Logger::new(0, true)).unwrap();

        assert!(store.get("production/source_hashes").unwrap().is_some());
        assert!(out.path().join("production/unit_configs.json").exists());
    }

    #[test]
    fn test_stage_probes_store_readiness() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Counts readiness probes while delegating everything else.
        #[derive(Default)]
        struct ProbeCountingStore {
            inner: MemStore,
            probes: AtomicUsize,
        }

        impl StateStore for ProbeCountingStore {
            fn get(&self, key: &str) -> crate::error::Result<Option<String>> {
                self.inner.get(key)
            }

            fn put(&self, key: &str, value: &str) -> crate::error::Result<()> {
                self.inner.put(key, value)
            }

            fn probe(&self) -> crate::error::Result<()> {
                self.probes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let repo = TempDir::new().unwrap();
        add_unit(repo.path(), "login", r#"{"type": "API"}"#);

        let out = TempDir::new().unwrap();
        let plan_path = repo.path().join("deploy.yml");
        let store = ProbeCountingStore::default();
        let opts = test_opts(&repo, &out, &plan_path);

        stage(&opts, &store, "staging", &Logger::new(0, true)).unwrap();
        assert!(store.probes.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_failed_staging_records_nothing() {
        let repo = TempDir::new().unwrap();
        add_unit(repo.path(), "login", r#"{"type": "API"}"#);

        let out = TempDir::new().unwrap();
        let plan_path = repo.path().join("deploy.yml");
        fs::write(&plan_path, "environments:\n  staging: v1\n").unwrap();

        let store = MemStore::new();
        let opts = GlobalOpts::builder()
            .root(repo.path())
            .output_root(out.path())
            .plan_file(&plan_path)
            .build_command("exit 1")
            .package_command("true")
            .build();

        let err = deploy(&opts, &store, &Logger::new(0, true)).unwrap_err();
        assert!(matches!(
            err,
            crate::error::StageError::UnitFailures { .. }
        ));
        assert!(store.get(CURRENTLY_DEPLOYED_KEY).unwrap().is_none());
        assert!(store.get("staging/source_hashes").unwrap().is_none());
    }
}
