//! Bootstrap tests: end-to-end runs and active context restoration

use std::sync::Arc;

use super::harness::*;
use keel_runtime::{
    active_context, native, Bootstrap, BootstrapOptions, Console, ContextId, Failure,
    LoaderContext, NativeModule, ResourceRoot, RuntimeError, ScanPolicy,
};
use parking_lot::Mutex;

#[test]
fn test_end_to_end_archive_tool() {
    let fx = Fixture::new();
    let archive = fx.archive(
        "tool.zip",
        &[
            ("com/", Vec::new()),
            ("com/acme/", Vec::new()),
            ("com/acme/Tool.kbc", reporting_unit("com.acme.Tool")),
        ],
    );

    let (result, captured) = run_captured(
        vec![ResourceRoot::archive(&archive, "")],
        "Tool",
        &["--x"],
    );
    result.unwrap();
    assert_eq!(captured.lines(), ["com.acme.Tool:[--x]"]);
}

#[test]
fn test_end_to_end_outcome_returned_unmodified() {
    let fx = Fixture::new();
    let archive = fx.archive(
        "tool.zip",
        &[(
            "com/acme/Tool.kbc",
            throwing_unit("com.acme.Tool", "UsageError", "unknown option --x"),
        )],
    );

    let (result, _) = run_captured(
        vec![ResourceRoot::archive(&archive, "")],
        "Tool",
        &["--x"],
    );
    let err = result.unwrap_err();
    assert_eq!(err.to_string(), "UsageError: unknown option --x");
}

#[test]
fn test_active_context_restored_for_every_outcome() {
    let fx = Fixture::new();
    fx.write("classes/Ok.kbc", &reporting_unit("Ok"));
    fx.write("classes/Bad.kbc", &throwing_unit("Bad", "Boom", "bang"));
    fx.write("classes/NoMain.kbc", &keel_bytecode::ModuleBuilder::new("NoMain").encode());
    let broken = fx.broken_archive("broken.zip");
    let roots = vec![fx.dir_root("classes")];

    let cases: [(Vec<ResourceRoot>, &str, fn(&RuntimeError) -> bool); 4] = [
        (roots.clone(), "Missing", |e| matches!(e, RuntimeError::Resolution { .. })),
        (roots.clone(), "Bad", |e| matches!(e, RuntimeError::Invocation(_))),
        (roots.clone(), "NoMain", |e| matches!(e, RuntimeError::EntryNotFound { .. })),
        (
            vec![ResourceRoot::archive(&broken, "")],
            "Ok",
            |e| matches!(e, RuntimeError::RootUnavailable { .. }),
        ),
    ];

    assert!(active_context().is_none());
    let (result, _) = run_captured(roots.clone(), "Ok", &[]);
    result.unwrap();
    assert!(active_context().is_none());

    for (roots, name, expected) in cases {
        let (result, _) = run_captured(roots, name, &[]);
        let err = result.unwrap_err();
        assert!(expected(&err), "{name}: unexpected {err:?}");
        assert!(active_context().is_none(), "{name}: slot not restored");
    }
}

fn recording_host(seen: Arc<Mutex<Vec<(Option<ContextId>, ContextId)>>>) -> Arc<LoaderContext> {
    let mut recorder = NativeModule::new("test.Recorder");
    recorder.register_function("main", move |call, _| {
        seen.lock()
            .push((active_context().map(|c| c.id()), call.context().id()));
        Ok(())
    });
    let mut natives = native::builtins();
    natives.insert(recorder);
    LoaderContext::host(natives, Vec::new())
}

#[test]
fn test_active_context_is_the_run_context() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let host = recording_host(Arc::clone(&seen));
    let bootstrap = Bootstrap::new(Arc::clone(&host)).console(Console::capture().0);

    bootstrap.run(Vec::new(), "test.Recorder", &[]).unwrap();
    bootstrap.run(Vec::new(), "test.Recorder", &[]).unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    for (active, defining) in seen.iter() {
        let active = active.expect("slot set during the run");
        // the recorder is defined by the host; the run's context is a fresh child
        assert_eq!(*defining, host.id());
        assert_ne!(active, host.id());
    }
    assert_ne!(seen[0].0, seen[1].0, "each run builds a new context");
    assert!(active_context().is_none());
}

#[test]
fn test_nested_run_restores_outer_context() {
    let observed = Arc::new(Mutex::new(Vec::new()));

    let nested_host = LoaderContext::host(native::builtins(), Vec::new());
    let mut nest = NativeModule::new("test.Nest");
    {
        let observed = Arc::clone(&observed);
        nest.register_function("main", move |_, _| {
            let before = active_context().map(|c| c.id());
            let inner = Bootstrap::new(Arc::clone(&nested_host)).console(Console::capture().0);
            inner
                .run(Vec::new(), "keel.lang.Echo", &[])
                .map_err(Failure::from)?;
            let after = active_context().map(|c| c.id());
            observed.lock().push((before, after));
            Ok(())
        });
    }
    let mut natives = native::builtins();
    natives.insert(nest);
    let bootstrap = Bootstrap::new(LoaderContext::host(natives, Vec::new()));

    bootstrap.run(Vec::new(), "test.Nest", &[]).unwrap();
    let observed = observed.lock();
    assert_eq!(observed.len(), 1);
    let (before, after) = observed[0];
    assert!(before.is_some());
    assert_eq!(before, after);
    assert!(active_context().is_none());
}

#[test]
fn test_launch_uses_active_context() {
    let fx = Fixture::new();
    fx.write("classes/app/Target.kbc", &reporting_unit("app.Target"));

    // Target is only on the run's roots, never on the host
    let (result, captured) = run_captured(
        vec![fx.dir_root("classes")],
        "keel.lang.Launch",
        &["Target", "x", "y"],
    );
    result.unwrap();
    assert_eq!(captured.lines(), ["app.Target:[x, y]"]);
}

#[test]
fn test_launch_propagates_inner_failure() {
    let fx = Fixture::new();
    fx.write("classes/Bad.kbc", &throwing_unit("Bad", "Boom", "bang"));

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "keel.lang.Launch", &["Bad"]);
    let err = result.unwrap_err();
    assert_eq!(err.as_failure(), Some(&Failure::new("Boom", "bang")));
}

/// `main` hands all of its arguments to `keel.lang.Launch`.
fn relaunching_unit(name: &str) -> Vec<u8> {
    unit(name, |b, w| {
        let launch = b.add_string("keel.lang.Launch");
        let main = b.add_string("main");
        w.emit_load_args();
        w.emit_invoke(launch, main);
        w.emit_return();
    })
}

#[test]
fn test_launch_recursion_hits_depth_limit() {
    let fx = Fixture::new();
    fx.write("classes/Loop.kbc", &relaunching_unit("Loop"));
    let hops = vec!["Loop"; 200];

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "Loop", &hops);
    let failure = result.unwrap_err().as_failure().cloned().unwrap();
    assert_eq!(failure.kind(), "VmFault");
    assert!(failure.message().contains("Call depth limit"), "{failure}");
    assert!(active_context().is_none());
}

#[test]
fn test_native_only_launch_chain_hits_depth_limit() {
    let fx = Fixture::new();
    let hops = vec!["keel.lang.Launch"; 200];

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "keel.lang.Launch", &hops);
    let failure = result.unwrap_err().as_failure().cloned().unwrap();
    assert_eq!(failure.kind(), "VmFault");
    assert!(failure.message().contains("Call depth limit"), "{failure}");
}

#[test]
fn test_skip_unavailable_option() {
    let fx = Fixture::new();
    let broken = fx.broken_archive("broken.zip");
    fx.write("classes/app/Tool.kbc", &reporting_unit("app.Tool"));
    let roots = vec![ResourceRoot::archive(&broken, ""), fx.dir_root("classes")];

    let (result, _) = run_captured(roots.clone(), "Tool", &[]);
    assert!(matches!(result, Err(RuntimeError::RootUnavailable { .. })));

    let options = BootstrapOptions {
        scan_policy: ScanPolicy::SkipUnavailable,
        ..Default::default()
    };
    let (result, captured) = run_captured_with(options, roots, "Tool", &["ok"]);
    result.unwrap();
    assert_eq!(captured.lines(), ["app.Tool:[ok]"]);
}

#[test]
fn test_host_roots_reachable_by_delegation() {
    let fx = Fixture::new();
    fx.write("host/lib/Shared.kbc", &reporting_unit("lib.Shared"));
    let host = LoaderContext::host(native::builtins(), vec![fx.dir_root("host")]);
    let (console, captured) = Console::capture();
    let bootstrap = Bootstrap::new(host).console(console);

    bootstrap.run(Vec::new(), "lib.Shared", &args(&["z"])).unwrap();
    assert_eq!(captured.lines(), ["lib.Shared:[z]"]);

    // simple names are only searched on the run's own roots
    let err = bootstrap.run(Vec::new(), "Shared", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::Resolution { .. }));
}
