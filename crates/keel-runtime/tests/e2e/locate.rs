//! Locator tests: suffix rule, root order and archive handle release

use super::harness::*;
use keel_runtime::{open_archive_handles, Locator, ResourceRoot, RuntimeError, ScanPolicy};

const SUFFIX: &str = ".kbc";

#[test]
fn test_single_archive_match_under_offset() {
    let fx = Fixture::new();
    let path = fx.archive(
        "tools.zip",
        &[
            ("lib/", Vec::new()),
            ("lib/com/acme/Tool.kbc", b"unit".to_vec()),
            ("lib/com/acme/MyTool.kbc", b"unit".to_vec()),
            ("lib/com/acme/Tool.kbc.orig", b"unit".to_vec()),
            ("other/com/acme/Tool.kbc", b"unit".to_vec()),
        ],
    );
    let root = ResourceRoot::archive(&path, "lib");

    let found = Locator::default()
        .locate(std::slice::from_ref(&root), "Tool", SUFFIX)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].relative_path, "com/acme/Tool.kbc");
    assert_eq!(found[0].root, root);
    assert_eq!(
        found[0].url,
        format!("archive:{}!/lib/com/acme/Tool.kbc", path.display())
    );
    assert_eq!(open_archive_handles(), 0);
}

#[test]
fn test_every_result_satisfies_suffix_rule() {
    let fx = Fixture::new();
    let dir = fx.dir_root("classes");
    for rel in [
        "classes/Tool.kbc",
        "classes/a/Tool.kbc",
        "classes/a/XTool.kbc",
        "classes/a/Tool.kbcx",
        "classes/b/Tool.txt",
        "classes/Tool/Other.kbc",
    ] {
        fx.write(rel, b"");
    }
    let archive = fx.archive(
        "t.zip",
        &[
            ("Tool.kbc", Vec::new()),
            ("x/ATool.kbc", Vec::new()),
            ("x/Tool.kbc/", Vec::new()),
            ("y/z/Tool.kbc", Vec::new()),
        ],
    );

    let roots = [dir, ResourceRoot::archive(&archive, "")];
    let found = Locator::default().locate(&roots, "Tool", SUFFIX).unwrap();

    assert!(!found.is_empty());
    for resource in &found {
        let rel = &resource.relative_path;
        assert!(
            rel == "Tool.kbc" || rel.ends_with("/Tool.kbc"),
            "{rel} does not satisfy the suffix rule"
        );
    }
    assert_eq!(
        relative_paths(&found),
        ["Tool.kbc", "a/Tool.kbc", "Tool.kbc", "y/z/Tool.kbc"]
    );
}

#[test]
fn test_matches_follow_root_order() {
    let fx = Fixture::new();
    fx.write("second/p/Tool.kbc", b"");
    fx.write("first/q/Tool.kbc", b"");
    let archive = fx.archive("middle.zip", &[("m/Tool.kbc", Vec::new())]);

    let roots = [
        fx.dir_root("second"),
        ResourceRoot::archive(&archive, ""),
        fx.dir_root("first"),
    ];
    let found = Locator::default().locate(&roots, "Tool", SUFFIX).unwrap();

    assert_eq!(relative_paths(&found), ["p/Tool.kbc", "m/Tool.kbc", "q/Tool.kbc"]);
    assert_eq!(found[0].root, roots[0]);
    assert_eq!(found[1].root, roots[1]);
    assert_eq!(found[2].root, roots[2]);
}

#[test]
fn test_archives_closed_after_mid_scan_failure() {
    let fx = Fixture::new();
    let one = fx.archive("one.zip", &[("a/Tool.kbc", Vec::new())]);
    let two = fx.archive("two.zip", &[("b/Other.kbc", Vec::new())]);
    let broken = fx.broken_archive("three.zip");
    let four = fx.archive("four.zip", &[("c/Tool.kbc", Vec::new())]);
    let roots = [
        ResourceRoot::archive(&one, ""),
        ResourceRoot::archive(&two, ""),
        ResourceRoot::archive(&broken, ""),
        ResourceRoot::archive(&four, ""),
    ];

    let err = Locator::default().locate(&roots, "Tool", SUFFIX).unwrap_err();
    match err {
        RuntimeError::RootUnavailable { root, .. } => assert!(root.ends_with("three.zip")),
        other => panic!("Expected RootUnavailable, got {other:?}"),
    }
    assert_eq!(open_archive_handles(), 0);
}

#[test]
fn test_missing_archive_is_unavailable() {
    let fx = Fixture::new();
    let roots = [ResourceRoot::archive(fx.path("absent.zip"), "")];
    let err = Locator::default().locate(&roots, "Tool", SUFFIX).unwrap_err();
    assert!(matches!(err, RuntimeError::RootUnavailable { .. }));
}

#[test]
fn test_skip_policy_reports_partial_scan() {
    let fx = Fixture::new();
    let broken = fx.broken_archive("broken.zip");
    let good = fx.archive("good.zip", &[("g/Tool.kbc", Vec::new())]);
    let roots = [
        ResourceRoot::archive(&broken, ""),
        ResourceRoot::archive(&good, ""),
    ];

    let locator = Locator::new(ScanPolicy::SkipUnavailable);
    let found = locator.locate(&roots, "Tool", SUFFIX).unwrap();
    assert_eq!(relative_paths(&found), ["g/Tool.kbc"]);
    assert_eq!(open_archive_handles(), 0);
}

#[test]
fn test_results_reflect_live_state() {
    let fx = Fixture::new();
    let roots = [fx.dir_root("live")];
    let locator = Locator::default();

    assert!(locator.locate(&roots, "Tool", SUFFIX).unwrap().is_empty());
    fx.write("live/n/Tool.kbc", b"");
    assert_eq!(
        relative_paths(&locator.locate(&roots, "Tool", SUFFIX).unwrap()),
        ["n/Tool.kbc"]
    );
}
