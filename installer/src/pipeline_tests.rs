//! Unit tests for deployment orchestration.
//!
//! Every platform boundary is replaced by an in-memory double so the tests
//! can assert which stages ran and what they left behind.

use super::{Platform, PipelineContext, run_pipeline};
use crate::artefact::extraction::ExtractionOutcome;
use crate::artefact::verification::VerificationOutcome;
use crate::config::DeploymentConfig;
use crate::descriptor::DriverNotFoundError;
use crate::error::DeployError;
use crate::stager::{DriverOrigin, STAGING_UTILITY};
use crate::test_utils::{
    ExpectedCall, FakePrintSubsystem, HttpCall, StubExecutor, StubHttpClient, failure_output,
    sha256_hex, success_output, zip_bytes,
};
use rstest::{fixture, rstest};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PACKAGE_URL: &str = "https://vendor.example/drivers/upd.zip";
const INSTALLER_URL: &str = "https://vendor.example/drivers/upd.exe";
const DRIVER: &str = "HP Universal Printing PCL 6";

fn package() -> Vec<u8> {
    zip_bytes(&[
        ("hpcu270u.inf", "[Version]"),
        ("readme.txt", "release notes"),
    ])
}

fn config(source: &str, sha256: &str, printers: &str) -> DeploymentConfig {
    let text = format!(
        concat!(
            "source = \"{source}\"\n",
            "expected_sha256 = \"{sha256}\"\n",
            "driver_name = \"{driver}\"\n",
            "name_template = \"Office {{number}}\"\n",
            "\n",
            "[printers]\n",
            "{printers}\n",
        ),
        source = source,
        sha256 = sha256,
        driver = DRIVER,
        printers = printers,
    );
    DeploymentConfig::from_toml_str(&text).expect("valid configuration")
}

#[fixture]
fn staging() -> TempDir {
    tempfile::tempdir().expect("create staging dir")
}

fn staged_descriptor(staging: &Path, stem: &str) -> String {
    staging
        .join("extracted")
        .join(stem)
        .join("hpcu270u.inf")
        .to_str()
        .expect("utf-8 path")
        .to_owned()
}

fn pnputil(staging: &Path) -> ExpectedCall {
    pnputil_for(staging, "upd")
}

fn pnputil_for(staging: &Path, stem: &str) -> ExpectedCall {
    let inf = staged_descriptor(staging, stem);
    ExpectedCall::new(
        STAGING_UTILITY,
        &["/add-driver", inf.as_str(), "/install"],
        Ok(success_output()),
    )
}

#[rstest]
fn provisions_printer_and_converges_on_rerun(staging: TempDir) {
    let bytes = package();
    let config = config(PACKAGE_URL, &sha256_hex(&bytes), "1 = \"10.20.30.41\"");
    let http = StubHttpClient::new().with_download(PACKAGE_URL, &bytes);
    let executor = StubExecutor::new(vec![pnputil(staging.path())]);
    let print = FakePrintSubsystem::new();
    let platform = Platform {
        http: &http,
        executor: &executor,
        print: &print,
    };
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let first = run_pipeline(&context, platform).expect("first run");
    assert!(matches!(first.verification, VerificationOutcome::Verified(_)));
    assert!(matches!(first.extraction, ExtractionOutcome::Bundle(_)));
    assert_eq!(first.driver.origin, DriverOrigin::Created);
    assert_eq!(print.port_names(), vec!["IP_10.20.30.41".to_owned()]);
    let names: Vec<String> = print.printer_records().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Office 1".to_owned()]);
    let created = print.total_created();

    let second = run_pipeline(&context, platform).expect("second run");
    assert_eq!(second.driver.origin, DriverOrigin::AlreadyRegistered);
    assert_eq!(print.total_created(), created);
    assert_eq!(
        (second.provisioning.ports_created, second.provisioning.printers_created),
        (0, 0)
    );
    executor.assert_finished();
}

#[rstest]
fn direct_archive_url_is_never_probed(staging: TempDir) {
    let bytes = package();
    let config = config(PACKAGE_URL, "", "1 = \"10.0.0.1\"");
    let http = StubHttpClient::new().with_download(PACKAGE_URL, &bytes);
    let executor = StubExecutor::new(vec![pnputil(staging.path())]);
    let print = FakePrintSubsystem::new();
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let report = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )
    .expect("deployment");

    assert_eq!(report.verification, VerificationOutcome::Skipped);
    assert_eq!(http.calls(), vec![HttpCall::Download(PACKAGE_URL.to_owned())]);
}

#[rstest]
#[case::zip_content_type("application/zip")]
#[case::opaque_binary("application/octet-stream")]
fn extensionless_binary_source_deploys(staging: TempDir, #[case] content_type: &str) {
    let source = "https://vendor.example/get?id=42";
    let bytes = package();
    let config = config(source, &sha256_hex(&bytes), "1 = \"10.20.30.41\"");
    let http = StubHttpClient::new()
        .with_content_type(source, content_type)
        .with_download(source, &bytes);
    let executor = StubExecutor::new(vec![pnputil_for(staging.path(), "get")]);
    let print = FakePrintSubsystem::new();
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let report = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )
    .expect("deployment");

    assert_eq!(
        report.package.local_path,
        staging.path().join("downloads").join("get.zip")
    );
    assert!(matches!(report.extraction, ExtractionOutcome::Bundle(_)));
    assert_eq!(print.port_names(), vec!["IP_10.20.30.41".to_owned()]);
    executor.assert_finished();
}

#[rstest]
fn digest_mismatch_stops_before_extraction(staging: TempDir) {
    let config = config(PACKAGE_URL, &"0".repeat(64), "1 = \"10.20.30.41\"");
    let http = StubHttpClient::new().with_download(PACKAGE_URL, &package());
    let executor = StubExecutor::new(Vec::new());
    let print = FakePrintSubsystem::new();
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let err = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )
    .expect_err("digest mismatch");

    assert!(matches!(err, DeployError::Integrity(_)));
    assert_eq!(err.exit_code(), 12);
    assert!(!staging.path().join("extracted").exists());
    assert_eq!(print.total_created(), 0);
    assert!(print.port_names().is_empty());
}

#[rstest]
fn page_without_package_link_fails_before_download(staging: TempDir) {
    let page = "https://vendor.example/support/drivers/";
    let config = config(page, "", "1 = \"10.20.30.41\"");
    let http = StubHttpClient::new()
        .with_content_type(page, "text/html; charset=utf-8")
        .with_page(page, r#"<a href="/manuals/upd.pdf">Manual</a>"#);
    let executor = StubExecutor::new(Vec::new());
    let print = FakePrintSubsystem::new();
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let err = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )
    .expect_err("no asset link");

    assert_eq!(err.kind(), "SourceResolutionError");
    assert!(
        !http
            .calls()
            .iter()
            .any(|call| matches!(call, HttpCall::Download(_)))
    );
    assert_eq!(print.total_created(), 0);
}

#[rstest]
fn installer_fallback_without_bundle_reports_dedicated_error(staging: TempDir) {
    let config = config(INSTALLER_URL, "", "1 = \"10.20.30.41\"");
    let http = StubHttpClient::new().with_download(INSTALLER_URL, b"MZ\x90\x00not a zip");
    let exe: PathBuf = staging.path().join("downloads").join("upd.exe");
    let executor = StubExecutor::new(vec![ExpectedCall::new(
        exe.to_str().expect("utf-8 path"),
        &["/s"],
        Ok(failure_output("reboot required")),
    )]);
    let print = FakePrintSubsystem::new();
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };

    let err = run_pipeline(
        &context,
        Platform {
            http: &http,
            executor: &executor,
            print: &print,
        },
    )
    .expect_err("nothing to stage");

    assert!(matches!(
        err,
        DeployError::DriverNotFound(DriverNotFoundError::InstallerLeftNoBundle { .. })
    ));
    assert!(exe.exists(), "installer must keep its original name");
    assert!(!exe.with_extension("zip").exists());
    executor.assert_finished();
}

#[rstest]
fn work_dir_is_named_after_package(staging: TempDir) {
    let config = config(PACKAGE_URL, "", "1 = \"10.0.0.1\"");
    let context = PipelineContext {
        config: &config,
        staging_dir: staging.path(),
    };
    let package = crate::artefact::download::DownloadedPackage {
        local_path: context.downloads_dir().join("upd-7.0.1.zip"),
        byte_length: 0,
    };

    assert_eq!(
        context.work_dir_for(&package),
        staging.path().join("extracted").join("upd-7.0.1")
    );
}
