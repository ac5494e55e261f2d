//! Invocation tests: entry lookup, failure propagation and nested calls

use super::harness::*;
use keel_bytecode::{Function, ModuleBuilder, Signature, ValueType, ENTRY_FUNCTION};
use keel_runtime::{
    BootstrapOptions, EntryResolver, Invoker, LoaderContext, RuntimeError, INDEX_OUT_OF_BOUNDS,
};

#[test]
fn test_failure_kind_and_message_unchanged() {
    let fx = Fixture::new();
    fx.write(
        "classes/app/Cli.kbc",
        &throwing_unit("app.Cli", "UsageError", "missing required flag --x"),
    );

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "app.Cli", &[]);
    let err = result.unwrap_err();
    assert!(matches!(err, RuntimeError::Invocation(_)));
    let failure = err.as_failure().unwrap();
    assert_eq!(failure.kind(), "UsageError");
    assert_eq!(failure.message(), "missing required flag --x");
}

#[test]
fn test_nested_failure_passes_through_caller() {
    let fx = Fixture::new();
    fx.write(
        "classes/app/Inner.kbc",
        &throwing_unit("app.Inner", "ConfigError", "bad port"),
    );
    fx.write(
        "classes/app/Outer.kbc",
        &unit("app.Outer", |b, w| {
            let target = b.add_string("app.Inner");
            let main = b.add_string(ENTRY_FUNCTION);
            w.emit_load_args();
            w.emit_invoke(target, main);
            w.emit_return();
        }),
    );

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "app.Outer", &[]);
    let err = result.unwrap_err();
    let failure = err.as_failure().unwrap();
    assert_eq!(failure.kind(), "ConfigError");
    assert_eq!(failure.message(), "bad port");
}

#[test]
fn test_invoke_resolves_through_defining_context() {
    let fx = Fixture::new();
    fx.write(
        "classes/app/Hello.kbc",
        &unit("app.Hello", |b, w| {
            let echo = b.add_string("keel.lang.Echo");
            let main = b.add_string(ENTRY_FUNCTION);
            w.emit_load_args();
            w.emit_invoke(echo, main);
            w.emit_return();
        }),
    );

    let (result, captured) =
        run_captured(vec![fx.dir_root("classes")], "Hello", &["hi", "there"]);
    result.unwrap();
    assert_eq!(captured.lines(), ["hi there"]);
}

#[test]
fn test_invoke_of_missing_module_fails_the_caller() {
    let fx = Fixture::new();
    fx.write(
        "classes/app/Lost.kbc",
        &unit("app.Lost", |b, w| {
            let target = b.add_string("no.such.Module");
            let main = b.add_string(ENTRY_FUNCTION);
            w.emit_load_args();
            w.emit_invoke(target, main);
            w.emit_return();
        }),
    );

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "app.Lost", &[]);
    let err = result.unwrap_err();
    let failure = err.as_failure().expect("failure inside the logic");
    assert_eq!(failure.kind(), "ResolutionError");
    assert!(failure.message().contains("no.such.Module"));
}

#[test]
fn test_load_arg_out_of_range() {
    let fx = Fixture::new();
    fx.write(
        "classes/Second.kbc",
        &unit("Second", |_, w| {
            w.emit_load_arg(1);
            w.emit_print();
            w.emit_return();
        }),
    );

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "Second", &["one"]);
    let err = result.unwrap_err();
    assert_eq!(err.as_failure().unwrap().kind(), INDEX_OUT_OF_BOUNDS);
}

#[test]
fn test_vm_fault_is_wrapped_minimally() {
    let fx = Fixture::new();
    fx.write(
        "classes/Underflow.kbc",
        &unit("Underflow", |_, w| {
            w.emit_concat();
            w.emit_return();
        }),
    );
    let options = BootstrapOptions {
        verify: false,
        ..Default::default()
    };

    let (result, _) = run_captured_with(options, vec![fx.dir_root("classes")], "Underflow", &[]);
    let err = result.unwrap_err();
    let failure = err.as_failure().unwrap();
    assert_eq!(failure.kind(), "VmFault");
    assert!(failure.message().contains("Stack underflow"));
}

#[test]
fn test_verification_rejects_unit_at_load() {
    let fx = Fixture::new();
    fx.write(
        "classes/Underflow.kbc",
        &unit("Underflow", |_, w| {
            w.emit_concat();
            w.emit_return();
        }),
    );

    let (result, _) = run_captured(vec![fx.dir_root("classes")], "Underflow", &[]);
    assert!(matches!(result, Err(RuntimeError::Resolution { .. })));
}

fn unit_with_main(name: &str, flags: u32, signature: Signature) -> Vec<u8> {
    let mut builder = ModuleBuilder::new(name);
    builder.add_function(Function {
        name: ENTRY_FUNCTION.to_string(),
        flags,
        signature,
        code: vec![keel_bytecode::Opcode::Return as u8],
    });
    builder.encode()
}

#[test]
fn test_entry_not_found() {
    let fx = Fixture::new();
    fx.write(
        "classes/Private.kbc",
        &unit_with_main("Private", 0, Signature::entry()),
    );
    fx.write(
        "classes/Nullary.kbc",
        &unit_with_main("Nullary", keel_bytecode::function_flags::PUBLIC, Signature::nullary()),
    );
    fx.write(
        "classes/Typed.kbc",
        &unit_with_main(
            "Typed",
            keel_bytecode::function_flags::PUBLIC,
            Signature {
                params: vec![ValueType::StrArray],
                returns: ValueType::Int,
            },
        ),
    );
    fx.write("classes/Empty.kbc", &ModuleBuilder::new("Empty").encode());
    let context = LoaderContext::builder(vec![fx.dir_root("classes")]).build();
    let resolver = EntryResolver::default();
    let invoker = Invoker::default();

    for (name, expected) in [
        ("Private", "not public"),
        ("Nullary", "() -> Void"),
        ("Typed", "(StrArray) -> Int"),
        ("Empty", "no function 'main'"),
    ] {
        let module = resolver.resolve(name, &context).unwrap();
        let err = invoker.invoke(&module, &[]).unwrap_err();
        assert!(
            matches!(err, RuntimeError::EntryNotFound { .. }),
            "{name}: {err}"
        );
        assert!(err.to_string().contains(expected), "{name}: {err}");
    }
}

#[test]
fn test_entry_point_capability() {
    let fx = Fixture::new();
    fx.write("classes/app/Report.kbc", &reporting_unit("app.Report"));
    let context = LoaderContext::builder(vec![fx.dir_root("classes")]).build();
    let module = EntryResolver::default().resolve("Report", &context).unwrap();

    let (console, captured) = keel_runtime::Console::capture();
    let entry = Invoker::new(console).entry_point(&module).unwrap();
    assert!(entry.signature().is_entry());
    assert_eq!(entry.module().name().as_str(), "app.Report");

    entry.run(&args(&["a"])).unwrap();
    entry.run(&args(&["b", "c"])).unwrap();
    assert_eq!(captured.lines(), ["app.Report:[a]", "app.Report:[b, c]"]);
}
