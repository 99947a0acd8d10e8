use crate::common::{build_fixture, prepare_debugee_process, DebugeeRunInfo, TestHooks};
use serial_test::serial;
use spray::debugger::error::Error;
use spray::debugger::variable::render::ValueFilter;
use spray::debugger::Debugger;

fn debugger_at_line(
    fixture: &str,
    file: &str,
    line: u64,
) -> (Debugger, DebugeeRunInfo) {
    let bin = build_fixture(fixture);
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();
    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_line(file, line).unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(line));
    (debugger, info)
}

#[test]
#[serial]
fn test_typed_print_defaults() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    // signed integers print as decimal
    assert_eq!(debugger.read_variable("a").unwrap().render(None), "1");
    // unsigned integers print as hex
    assert_eq!(debugger.read_variable("b").unwrap().render(None), "0x3");
    // plain char prints as a quoted character
    assert_eq!(debugger.read_variable("h").unwrap().render(None), "'a'");
    // explicit signed/unsigned chars print as decimal
    assert_eq!(debugger.read_variable("i").unwrap().render(None), "98");
    assert_eq!(debugger.read_variable("j").unwrap().render(None), "99");
    assert_eq!(
        debugger.read_variable("n").unwrap().render(None),
        "0x8000000000000000"
    );
}

#[test]
#[serial]
fn test_typedefs_resolve_to_canonical_type() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    // myint is a typedef chain down to a signed 32 bit integer
    assert_eq!(
        debugger.read_variable("o").unwrap().render(None),
        "-123456789"
    );
    // small is uint8_t, canonically an unsigned char
    assert_eq!(debugger.read_variable("p").unwrap().render(None), "255");
    assert_eq!(
        debugger.read_variable("p").unwrap().render(Some(ValueFilter::Bytes)),
        "00 00 00 00 00 00 00 ff"
    );
}

#[test]
#[serial]
fn test_print_decl_site() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let value = debugger.read_variable("a").unwrap();
    assert_eq!(value.decl, Some(("tests/fixtures/vars.c".to_string(), 10)));
}

#[test]
#[serial]
fn test_inner_scope_shadows_outer() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 21);

    // inside the block the inner `a` wins
    assert_eq!(debugger.read_variable("a").unwrap().render(None), "555");
}

#[test]
#[serial]
fn test_global_variable_read() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    assert_eq!(
        debugger.read_variable("global_counter").unwrap().render(None),
        "42"
    );
}

#[test]
#[serial]
fn test_missing_variable() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let err = debugger.read_variable("nonexistent").unwrap_err();
    assert!(matches!(err, Error::VariableNotFound(_)));
    assert_eq!(
        err.to_string(),
        "Failed to find a variable called nonexistent"
    );
}

#[test]
#[serial]
fn test_variable_write_and_filters() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let value = debugger.write_variable("a", "103").unwrap();
    assert_eq!(value.render(None), "103");

    let value = debugger.read_variable("a").unwrap();
    assert_eq!(value.render(Some(ValueFilter::Hex)), "0x67");
    assert_eq!(value.render(Some(ValueFilter::Dec)), "103");
    assert_eq!(
        value.render(Some(ValueFilter::Addr)),
        "0x0000000000000067"
    );
    assert_eq!(
        value.render(Some(ValueFilter::Bytes)),
        "00 00 00 00 00 00 00 67"
    );
    assert_eq!(
        value.render(Some(ValueFilter::Bits)),
        "00000000 00000000 00000000 00000000 00000000 00000000 00000000 01100111"
    );
}

#[test]
#[serial]
fn test_variable_write_negative_and_char() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let value = debugger.write_variable("a", "-5").unwrap();
    assert_eq!(value.render(None), "-5");

    let value = debugger.write_variable("h", "'z'").unwrap();
    assert_eq!(value.render(None), "'z'");
}

#[test]
#[serial]
fn test_invalid_write_literal() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let err = debugger.write_variable("a", "certainly-not-a-number").unwrap_err();
    assert!(matches!(err, Error::InvalidSetValue));
    assert_eq!(err.to_string(), "Invalid value to set the location to");
}

#[test]
#[serial]
fn test_register_read_write() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let value = debugger.write_register("rbx", "0xdeadbeef").unwrap();
    assert_eq!(value.as_u64(), 0xdeadbeef);
    assert_eq!(value.render_as_literal("0xdeadbeef"), "0xdeadbeef");

    let value = debugger.write_register("rax", "123").unwrap();
    assert_eq!(value.render_as_literal("123"), "123");

    let value = debugger.read_register("rbx").unwrap();
    assert_eq!(value.render(None), "00 00 00 00 de ad be ef");

    let err = debugger.read_register("nope").unwrap_err();
    assert!(matches!(err, Error::RegisterNameNotFound(_)));
}

#[test]
#[serial]
fn test_memory_read_unmapped() {
    let (debugger, _) = debugger_at_line("vars", "vars.c", 23);

    let err = debugger.read_memory(0x10, 8).unwrap_err();
    assert!(matches!(err, Error::MemoryUnmapped(_)));
}
