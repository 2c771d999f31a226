//! End-to-end patching of a mock AppImage bundle through the public API.

use relocpatch::batch::batch::{Batch, FileOutcome};
use relocpatch::config::config::PatchConfig;
use relocpatch::rewriter::rewriter::{BinaryPathRewriter, WriteMode};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// Both layouts in one library, as some distributions patch their builds
const LIBWEBKIT: &[u8] = b"\x7fELF\x02\x01\x01\0\
/usr/libexec/webkit2gtk-4.1\0\
/usr/lib64/webkit2gtk-4.1/injected-bundle/\0\
/usr/lib/x86_64-linux-gnu/webkit2gtk-4.1/injected-bundle/\0\
/usr/lib/x86_64-linux-gnu/webkit2gtk-4.1\0\
\xff\xfe\0";

const LIBWEBKIT_PATCHED: &[u8] = b"\x7fELF\x02\x01\x01\0\
/tmp/scumbag-webkit/libexec\0\
/tmp/scumbag-webkit/lib64/injected-bundle/\0\
/tmp/scumbag-webkit/lib/x86_64-linux-gnu/injected-bundle/\0\
/tmp/scumbag-webkit/lib/x86_64-linux-gnu\0\
\xff\xfe\0";

fn mock_app_dir(root: &Path) {
    let lib = root.join("usr/lib");
    fs::create_dir_all(&lib).unwrap();
    fs::write(lib.join("libwebkit2gtk-4.1.so.0"), LIBWEBKIT).unwrap();
    // libjavascriptcoregtk is intentionally absent
}

#[test]
fn test_patch_default_bundle() {
    let temp = TempDir::new().unwrap();
    let app_dir = temp.path();
    mock_app_dir(app_dir);

    let config = PatchConfig::webkit2gtk_4_1().unwrap();
    let targets = config.resolve_targets(app_dir);
    let rewriter = BinaryPathRewriter::new(WriteMode::Atomic);
    let report = Batch::new(&rewriter, &config.candidates).run(&targets);

    assert_eq!(report.patched(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.occurrences(), 4);

    let patched = fs::read(app_dir.join("usr/lib/libwebkit2gtk-4.1.so.0")).unwrap();
    assert_eq!(patched.len(), LIBWEBKIT.len());
    assert_eq!(patched, LIBWEBKIT_PATCHED);
}

#[test]
fn test_patch_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let app_dir = temp.path();
    mock_app_dir(app_dir);

    let config = PatchConfig::webkit2gtk_4_1().unwrap();
    let targets = config.resolve_targets(app_dir);
    let rewriter = BinaryPathRewriter::new(WriteMode::InPlace);

    Batch::new(&rewriter, &config.candidates).run(&targets);
    let second = Batch::new(&rewriter, &config.candidates).run(&targets);

    assert!(matches!(
        second.files[0].outcome,
        FileOutcome::Unchanged { .. }
    ));
    assert_eq!(second.occurrences(), 0);
    assert_eq!(
        fs::read(app_dir.join("usr/lib/libwebkit2gtk-4.1.so.0")).unwrap(),
        LIBWEBKIT_PATCHED
    );
}

#[test]
fn test_invalid_config_touches_nothing() {
    let temp = TempDir::new().unwrap();
    let app_dir = temp.path();
    mock_app_dir(app_dir);
    let config_path = app_dir.join("relocpatch.json");
    fs::write(
        &config_path,
        r#"{
            "targets": ["usr/lib/libwebkit2gtk-4.1.so.0"],
            "candidates": [
                {"old": "/usr/libexec/webkit2gtk-4.1", "new": "/tmp/scumbag-webkit/libexec"},
                {"old": "/usr/lib64/webkit2gtk-4.1/injected-bundle/", "new": "/tmp/short/"}
            ]
        }"#,
    )
    .unwrap();

    assert!(PatchConfig::load(&config_path).is_err());
    assert_eq!(
        fs::read(app_dir.join("usr/lib/libwebkit2gtk-4.1.so.0")).unwrap(),
        LIBWEBKIT
    );
}
