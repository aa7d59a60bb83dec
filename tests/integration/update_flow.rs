//! The full update pipeline: metadata check, download, staging, swap,
//! finalization, and cleanup.

use std::sync::atomic::Ordering;

use updatepulse_client::core::{UpdateError, UpdateStage};
use updatepulse_client::engine::{UpdateEngine, UpdateOutcome};

use crate::common::{
    MockServer, PACKAGE_ID, PackageFixture, build_package_archive, shipped_config,
};

fn engine<'a>(fixture: &PackageFixture, server: &'a MockServer) -> UpdateEngine<&'a MockServer> {
    UpdateEngine::new(fixture.store(), server).with_staging_root(&fixture.staging_root)
}

/// An installed 1.0.0 fixture with one application file and one update
/// script, plus a served 1.1.0 archive.
fn installed_fixture() -> (PackageFixture, MockServer) {
    let fixture = PackageFixture::new("1.0.0");
    fixture.store().mark_installed().unwrap();
    fixture.write_file("dummy-package.sh", "#!/bin/sh\necho old\n");
    fixture.write_file("updatepulse-api.sh", "old update script\n");
    fixture.write_file("assets/logo.txt", "old logo\n");

    let archive_path = fixture.scratch_path("pkg.zip");
    build_package_archive(
        &archive_path,
        &[
            ("dummy-package.sh", "#!/bin/sh\necho new\n"),
            ("updatepulse-api.sh", "new update script\n"),
            ("updatepulse.json", &shipped_config("1.1.0")),
            ("assets/banner.txt", "new banner\n"),
        ],
    );
    let server = MockServer::new("1.1.0").with_archive(archive_path);

    (fixture, server)
}

#[tokio::test]
async fn equal_versions_is_a_no_op() {
    let fixture = PackageFixture::new("1.0.0");
    fixture.store().mark_installed().unwrap();
    fixture.write_file("dummy-package.sh", "#!/bin/sh\necho old\n");
    let server = MockServer::new("1.0.0");

    let outcome = engine(&fixture, &server).update().await.unwrap();

    assert_eq!(outcome, UpdateOutcome::NoUpdateAvailable);
    assert_eq!(fixture.read_file("dummy-package.sh"), "#!/bin/sh\necho old\n");
    assert_eq!(server.download_calls.load(Ordering::SeqCst), 0);
    assert!(!fixture.staging_path(&format!("{PACKAGE_ID}.zip")).exists());
}

#[tokio::test]
async fn older_remote_version_is_a_no_op() {
    let fixture = PackageFixture::new("1.0.0");
    fixture.store().mark_installed().unwrap();
    let server = MockServer::new("0.9.9");

    let outcome = engine(&fixture, &server).update().await.unwrap();
    assert_eq!(outcome, UpdateOutcome::NoUpdateAvailable);
}

#[tokio::test]
async fn update_requires_installed_marker() {
    let fixture = PackageFixture::new("1.0.0");
    let server = MockServer::new("1.1.0");

    let err = engine(&fixture, &server).update().await.unwrap_err();

    assert!(matches!(err, UpdateError::NotInstalled));
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn update_replaces_installation_and_reports_versions() {
    let (fixture, server) = installed_fixture();

    let outcome = engine(&fixture, &server).update().await.unwrap();

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            old_version: "1.0.0".to_string(),
            new_version: "1.1.0".to_string(),
        }
    );
    assert_eq!(fixture.read_file("dummy-package.sh"), "#!/bin/sh\necho new\n");
    assert_eq!(fixture.read_file("assets/banner.txt"), "new banner\n");
    assert!(!fixture.has_file("assets/logo.txt"), "old assets are gone");

    let config = fixture.store().load().unwrap();
    assert_eq!(config.package_data.version, "1.1.0");
    assert!(fixture.store().is_installed(), "marker survives the swap");
}

#[tokio::test]
async fn update_preserves_license_state_across_swap() {
    let (fixture, server) = installed_fixture();

    let store = fixture.store();
    let mut config = store.load().unwrap();
    config.license_key = Some("aaa-bbb-ccc".to_string());
    config.license_signature = Some("sig-0001".to_string());
    store.save(&config).unwrap();

    engine(&fixture, &server).update().await.unwrap();

    // The shipped config carried neither field; the engine reinstates the
    // pre-swap values
    let config = store.load().unwrap();
    assert_eq!(config.license_key.as_deref(), Some("aaa-bbb-ccc"));
    assert_eq!(config.license_signature.as_deref(), Some("sig-0001"));
    assert_eq!(config.package_data.version, "1.1.0");
}

#[tokio::test]
async fn swap_keeps_old_update_scripts_but_takes_new_json() {
    let (fixture, server) = installed_fixture();
    fixture.write_file("updatepulse-foo.py", "old script\n");
    fixture.write_file("updatepulse-foo.json", "old json\n");

    let archive_path = fixture.scratch_path("pkg.zip");
    build_package_archive(
        &archive_path,
        &[
            ("dummy-package.sh", "#!/bin/sh\necho new\n"),
            ("updatepulse-foo.py", "new script\n"),
            ("updatepulse-foo.json", "new json\n"),
            ("updatepulse.json", &shipped_config("1.1.0")),
        ],
    );

    engine(&fixture, &server).update().await.unwrap();

    // Script survives from the old tree; configuration comes from the new
    assert_eq!(fixture.read_file("updatepulse-foo.py"), "old script\n");
    assert_eq!(fixture.read_file("updatepulse-foo.json"), "new json\n");
}

#[tokio::test]
async fn staging_artifacts_are_removed_on_success() {
    let (fixture, server) = installed_fixture();

    engine(&fixture, &server).update().await.unwrap();

    assert!(!fixture.staging_path(&format!("{PACKAGE_ID}.zip")).exists());
    assert!(!fixture.staging_path(PACKAGE_ID).exists());
}

#[tokio::test]
async fn download_failure_reports_stage_and_changes_nothing() {
    let (fixture, mut server) = installed_fixture();
    server.download_unreachable = true;

    let err = engine(&fixture, &server).update().await.unwrap_err();

    match err {
        UpdateError::StageFailed { stage, source } => {
            assert_eq!(stage, UpdateStage::Download);
            assert!(matches!(*source, UpdateError::Network { .. }));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert_eq!(fixture.read_file("dummy-package.sh"), "#!/bin/sh\necho old\n");
    let config = fixture.store().load().unwrap();
    assert_eq!(config.package_data.version, "1.0.0");
}

#[tokio::test]
async fn corrupt_archive_reports_stage_and_cleans_staging() {
    let (fixture, mut server) = installed_fixture();
    let garbage = fixture.scratch_path("garbage.zip");
    std::fs::write(&garbage, b"this is not a zip archive").unwrap();
    server.archive = Some(garbage);

    let err = engine(&fixture, &server).update().await.unwrap_err();

    match err {
        UpdateError::StageFailed { stage, source } => {
            assert_eq!(stage, UpdateStage::Extract);
            assert!(matches!(*source, UpdateError::CorruptArchive { .. }));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
    // Live tree untouched, staging cleaned up
    assert_eq!(fixture.read_file("dummy-package.sh"), "#!/bin/sh\necho old\n");
    assert!(!fixture.staging_path(&format!("{PACKAGE_ID}.zip")).exists());
    assert!(!fixture.staging_path(PACKAGE_ID).exists());
}

#[tokio::test]
async fn archive_without_package_directory_is_corrupt() {
    let (fixture, mut server) = installed_fixture();
    // Well-formed zip, but nothing under `<package_id>/`
    let archive_path = fixture.scratch_path("mispacked.zip");
    {
        use std::io::Write;
        let file = std::fs::File::create(&archive_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("some-other-dir/main.sh", options).unwrap();
        zip.write_all(b"echo hi\n").unwrap();
        zip.finish().unwrap();
    }
    server.archive = Some(archive_path);

    let err = engine(&fixture, &server).update().await.unwrap_err();
    match err {
        UpdateError::StageFailed { stage, source } => {
            assert_eq!(stage, UpdateStage::Extract);
            assert!(matches!(*source, UpdateError::CorruptArchive { .. }));
        }
        other => panic!("expected StageFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_staging_directory_is_replaced() {
    let (fixture, server) = installed_fixture();
    // Leftovers from a previous failed run
    let stale = fixture.staging_path(PACKAGE_ID);
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(stale.join("leftover.txt"), "stale").unwrap();

    engine(&fixture, &server).update().await.unwrap();

    assert!(!fixture.has_file("leftover.txt"));
    assert_eq!(fixture.read_file("dummy-package.sh"), "#!/bin/sh\necho new\n");
}

#[cfg(unix)]
#[tokio::test]
async fn permissions_are_normalized_after_swap() {
    use std::os::unix::fs::PermissionsExt;

    let (fixture, server) = installed_fixture();
    engine(&fixture, &server).update().await.unwrap();

    let mode = |name: &str| {
        std::fs::metadata(fixture.package_dir.join(name))
            .unwrap()
            .permissions()
            .mode()
            & 0o777
    };

    // Entry points named with the package id prefix stay executable
    assert_eq!(mode("dummy-package.sh"), 0o755);
    assert_eq!(mode("updatepulse.json"), 0o644);
    assert_eq!(mode("assets"), 0o755);
    assert_eq!(mode("assets/banner.txt"), 0o644);
}

#[tokio::test]
async fn concrete_scenario_one_zero_to_one_one() {
    // Record {version: "1.0.0"}, server offers {version: "1.1.0",
    // download_url: ".../pkg.zip"}; afterwards the record shows 1.1.0 and
    // no temporary archive remains on disk.
    let (fixture, server) = installed_fixture();

    let outcome = engine(&fixture, &server).update().await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    assert_eq!(
        fixture.store().load().unwrap().package_data.version,
        "1.1.0"
    );
    assert!(!fixture.staging_path(&format!("{PACKAGE_ID}.zip")).exists());
    assert_eq!(server.metadata_calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.download_calls.load(Ordering::SeqCst), 1);
}
