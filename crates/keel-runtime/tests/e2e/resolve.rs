//! Entry resolution tests: direct names, reconstruction and tie-breaks

use super::harness::*;
use keel_runtime::{
    Delegation, EntryResolver, LoaderContext, ResourceRoot, RuntimeError,
};

fn isolated(roots: Vec<ResourceRoot>) -> std::sync::Arc<LoaderContext> {
    LoaderContext::builder(roots).build()
}

#[test]
fn test_fully_qualified_name_resolves_directly() {
    let fx = Fixture::new();
    fx.write("classes/com/acme/Tool.kbc", &reporting_unit("com.acme.Tool"));
    let context = isolated(vec![fx.dir_root("classes")]);

    let module = EntryResolver::default().resolve("com.acme.Tool", &context).unwrap();
    assert_eq!(module.name().as_str(), "com.acme.Tool");
}

#[test]
fn test_simple_name_reconstructed_from_archive() {
    let fx = Fixture::new();
    let archive = fx.archive(
        "tools.zip",
        &[("com/acme/Tool.kbc", reporting_unit("com.acme.Tool"))],
    );
    let context = isolated(vec![ResourceRoot::archive(&archive, "")]);

    let module = EntryResolver::default().resolve("Tool", &context).unwrap();
    assert_eq!(module.name().as_str(), "com.acme.Tool");
    assert!(module.origin().starts_with("archive:"));
}

#[test]
fn test_archive_offset_is_not_part_of_the_name() {
    let fx = Fixture::new();
    let archive = fx.archive(
        "bundle.kar",
        &[("classes/com/acme/Tool.kbc", reporting_unit("com.acme.Tool"))],
    );
    let context = isolated(vec![ResourceRoot::parse(&format!(
        "{}!/classes",
        archive.display()
    ))]);

    let module = EntryResolver::default().resolve("Tool", &context).unwrap();
    assert_eq!(module.name().as_str(), "com.acme.Tool");
}

#[test]
fn test_ambiguous_directory_path_strips_leading_segment() {
    let fx = Fixture::new();
    // `a` is a plain directory above the namespace root, so the unit at
    // a/b/c/Foo.kbc declares `b.c.Foo`; that name loads through root R/a
    fx.write("r/a/b/c/Foo.kbc", &reporting_unit("b.c.Foo"));
    let context = isolated(vec![fx.dir_root("r"), fx.dir_root("r/a")]);

    let module = EntryResolver::default().resolve("Foo", &context).unwrap();
    assert_eq!(module.name().as_str(), "b.c.Foo");
}

#[test]
fn test_earliest_root_wins() {
    let fx = Fixture::new();
    let x = fx.archive("x.zip", &[("x/Tool.kbc", reporting_unit("x.Tool"))]);
    let y = fx.archive("y.zip", &[("y/Tool.kbc", reporting_unit("y.Tool"))]);

    let forward = isolated(vec![
        ResourceRoot::archive(&x, ""),
        ResourceRoot::archive(&y, ""),
    ]);
    let module = EntryResolver::default().resolve("Tool", &forward).unwrap();
    assert_eq!(module.name().as_str(), "x.Tool");

    let reversed = isolated(vec![
        ResourceRoot::archive(&y, ""),
        ResourceRoot::archive(&x, ""),
    ]);
    let module = EntryResolver::default().resolve("Tool", &reversed).unwrap();
    assert_eq!(module.name().as_str(), "y.Tool");
}

#[test]
fn test_archive_candidate_must_load() {
    let fx = Fixture::new();
    let archive = fx.archive(
        "t.zip",
        &[("com/acme/Tool.kbc", reporting_unit("elsewhere.Tool"))],
    );
    let context = isolated(vec![ResourceRoot::archive(&archive, "")]);

    let err = EntryResolver::default().resolve("Tool", &context).unwrap_err();
    assert!(matches!(err, RuntimeError::Resolution { .. }), "{err}");
    assert!(err.to_string().contains("com/acme/Tool.kbc"), "{err}");
}

#[test]
fn test_no_match_is_resolution_error() {
    let fx = Fixture::new();
    let context = isolated(vec![fx.dir_root("empty")]);

    let err = EntryResolver::default().resolve("Missing", &context).unwrap_err();
    assert!(matches!(err, RuntimeError::Resolution { ref name, .. } if name == "Missing"));
}

#[test]
fn test_invalid_name_is_resolution_error() {
    let context = isolated(Vec::new());
    let err = EntryResolver::default().resolve("com..Tool", &context).unwrap_err();
    assert!(matches!(err, RuntimeError::Resolution { .. }));
}

#[test]
fn test_unreadable_root_aborts_resolution() {
    let fx = Fixture::new();
    let broken = fx.broken_archive("broken.zip");
    fx.write("classes/Tool.kbc", &reporting_unit("Tool"));
    let context = isolated(vec![
        ResourceRoot::archive(&broken, ""),
        fx.dir_root("classes"),
    ]);

    let err = EntryResolver::default().resolve("Tool", &context).unwrap_err();
    assert!(matches!(err, RuntimeError::RootUnavailable { .. }));
}

#[test]
fn test_delegation_reaches_host_natives() {
    let context = LoaderContext::builder(Vec::new())
        .parent(builtin_host())
        .delegation(Delegation::DelegateToParent)
        .build();

    let module = EntryResolver::default().resolve("keel.lang.Echo", &context).unwrap();
    assert!(module.is_native());
    assert!(!std::sync::Arc::ptr_eq(module.context(), &context));
}

#[cfg(unix)]
#[test]
fn test_simple_name_found_through_symlinked_directory() {
    let fx = Fixture::new();
    fx.write("outside/com/acme/Tool.kbc", &reporting_unit("lib.com.acme.Tool"));
    let root = fx.dir_root("r");
    let ResourceRoot::Directory { path } = &root else {
        unreachable!()
    };
    std::os::unix::fs::symlink(fx.path("outside"), path.join("lib")).unwrap();
    let context = isolated(vec![root.clone()]);

    EntryResolver::default().resolve("lib.com.acme.Tool", &context).unwrap();
    let module = EntryResolver::default().resolve("Tool", &context).unwrap();
    assert_eq!(module.name().as_str(), "lib.com.acme.Tool");
}
