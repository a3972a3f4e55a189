//! Behaviour-driven tests for end-to-end deployment.
//!
//! Every platform boundary is an in-memory double from the `test-support`
//! feature, so the scenarios exercise the real pipeline without network
//! access or a print spooler. Tests use the rstest-bdd mutable world pattern.

use printdeploy_installer::config::DeploymentConfig;
use printdeploy_installer::error::DeployError;
use printdeploy_installer::pipeline::{DeploymentReport, PipelineContext, Platform, run_pipeline};
use printdeploy_installer::process::CommandExecutor;
use printdeploy_installer::test_utils::{
    FakePrintSubsystem, HttpCall, StubHttpClient, sha256_hex, success_output, zip_bytes,
};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::process::Output;
use std::time::Duration;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// World types
// ---------------------------------------------------------------------------

/// Accepts every command and records its program name.
#[derive(Default)]
struct RecordingExecutor {
    programs: RefCell<Vec<String>>,
}

impl CommandExecutor for RecordingExecutor {
    fn run(&self, cmd: &str, _args: &[&str], _timeout: Duration) -> io::Result<Output> {
        self.programs.borrow_mut().push(cmd.to_owned());
        Ok(success_output())
    }
}

#[derive(Default)]
struct DeploymentWorld {
    staging: Option<TempDir>,
    http: StubHttpClient,
    executor: RecordingExecutor,
    print: FakePrintSubsystem,
    source: String,
    package: Vec<u8>,
    digest: String,
    printers: BTreeMap<u32, String>,
    outcome: Option<Result<DeploymentReport, DeployError>>,
    created_before_repeat: usize,
}

impl DeploymentWorld {
    fn config(&self) -> DeploymentConfig {
        let printers: Vec<String> = self
            .printers
            .iter()
            .map(|(number, address)| format!("{number} = \"{address}\""))
            .collect();
        let text = format!(
            concat!(
                "source = \"{}\"\n",
                "expected_sha256 = \"{}\"\n",
                "driver_name = \"HP Universal Printing PCL 6\"\n",
                "name_template = \"Office {{number}}\"\n",
                "[printers]\n",
                "{}\n",
            ),
            self.source,
            self.digest,
            printers.join("\n"),
        );
        DeploymentConfig::from_toml_str(&text).expect("scenario configuration")
    }

    fn run(&mut self) {
        let config = self.config();
        let staging = self
            .staging
            .get_or_insert_with(|| tempfile::tempdir().expect("create staging dir"));
        let context = PipelineContext {
            config: &config,
            staging_dir: staging.path(),
        };
        let platform = Platform {
            http: &self.http,
            executor: &self.executor,
            print: &self.print,
        };
        self.outcome = Some(run_pipeline(&context, platform));
    }

    fn outcome(&self) -> &Result<DeploymentReport, DeployError> {
        self.outcome.as_ref().expect("deployment has not run")
    }
}

#[fixture]
fn world() -> DeploymentWorld {
    DeploymentWorld::default()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a driver package served at \"{url}\"")]
fn given_package(world: &mut DeploymentWorld, url: String) {
    world.package = zip_bytes(&[
        ("upd/hpcu270u.inf", "[Version]"),
        ("upd/hpcu270u.cat", "catalog"),
    ]);
    world.http = std::mem::take(&mut world.http).with_download(&url, &world.package);
    world.source = url;
}

#[given("a driver page at \"{url}\" that links to no package")]
fn given_empty_page(world: &mut DeploymentWorld, url: String) {
    world.http = std::mem::take(&mut world.http)
        .with_content_type(&url, "text/html")
        .with_page(&url, r#"<html><a href="release-notes.pdf">Notes</a></html>"#);
    world.source = url;
}

#[given("the expected digest matches the package")]
fn given_matching_digest(world: &mut DeploymentWorld) {
    world.digest = sha256_hex(&world.package);
}

#[given("an expected digest that does not match the package")]
fn given_mismatching_digest(world: &mut DeploymentWorld) {
    world.digest = "f".repeat(64);
}

#[given("no expected digest")]
fn given_no_digest(world: &mut DeploymentWorld) {
    world.digest = String::new();
}

#[given("the printer map entry {number} is \"{address}\"")]
fn given_printer_entry(world: &mut DeploymentWorld, number: u32, address: String) {
    world.printers.insert(number, address);
}

#[when("the deployment runs")]
fn when_deployment_runs(world: &mut DeploymentWorld) {
    world.run();
}

#[when("the deployment is repeated")]
fn when_deployment_repeated(world: &mut DeploymentWorld) {
    world.created_before_repeat = world.print.total_created();
    world.run();
}

#[then("the deployment succeeds")]
fn then_succeeds(world: &mut DeploymentWorld) {
    if let Err(err) = world.outcome() {
        panic!("deployment failed: {err}");
    }
}

#[then("the deployment fails with \"{kind}\"")]
fn then_fails_with(world: &mut DeploymentWorld, kind: String) {
    match world.outcome() {
        Ok(_) => panic!("expected {kind}, deployment succeeded"),
        Err(err) => assert_eq!(err.kind(), kind),
    }
}

#[then("port \"{name}\" exists")]
fn then_port_exists(world: &mut DeploymentWorld, name: String) {
    assert!(world.print.port_names().contains(&name), "missing port {name}");
}

#[then("printer \"{name}\" exists")]
fn then_printer_exists(world: &mut DeploymentWorld, name: String) {
    assert!(
        world.print.printer_records().iter().any(|p| p.name == name),
        "missing printer {name}"
    );
}

#[then("the second run creates nothing")]
fn then_second_run_creates_nothing(world: &mut DeploymentWorld) {
    let report = world.outcome().as_ref().expect("repeat succeeded");
    assert_eq!(report.provisioning.ports_created, 0);
    assert_eq!(report.provisioning.printers_created, 0);
    assert_eq!(world.print.total_created(), world.created_before_repeat);
    assert_eq!(world.print.port_names().len(), 1);
    assert_eq!(world.print.printer_records().len(), 1);
}

#[then("no ports or printers were created")]
fn then_nothing_created(world: &mut DeploymentWorld) {
    assert_eq!(world.print.total_created(), 0);
    assert!(world.executor.programs.borrow().is_empty());
}

#[then("entry {number} is reported as skipped")]
fn then_entry_skipped(world: &mut DeploymentWorld, number: u32) {
    let report = world.outcome().as_ref().expect("deployment succeeded");
    assert!(
        report.provisioning.skipped.iter().any(|s| s.number == number),
        "entry {number} was not skipped"
    );
    assert!(report.provisioning.printers.iter().all(|p| p.number != number));
}

#[then("no package was downloaded")]
fn then_no_download(world: &mut DeploymentWorld) {
    assert!(
        !world
            .http
            .calls()
            .iter()
            .any(|call| matches!(call, HttpCall::Download(_)))
    );
}

#[then("no metadata request was made")]
fn then_no_probe(world: &mut DeploymentWorld) {
    assert!(
        !world
            .http
            .calls()
            .iter()
            .any(|call| matches!(call, HttpCall::Probe(_)))
    );
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/deployment.feature",
    name = "Deploy a verified package and converge on rerun"
)]
fn scenario_deploy_and_converge(world: DeploymentWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/deployment.feature",
    name = "Reject a package whose digest does not match"
)]
fn scenario_digest_mismatch(world: DeploymentWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/deployment.feature",
    name = "Skip an entry with an invalid address"
)]
fn scenario_invalid_address(world: DeploymentWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/deployment.feature",
    name = "Fail when a driver page links to no package"
)]
fn scenario_page_without_package(world: DeploymentWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/deployment.feature",
    name = "Accept a direct archive link without probing it"
)]
fn scenario_direct_archive(world: DeploymentWorld) {
    let _ = world;
}
