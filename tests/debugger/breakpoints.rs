use crate::common::{build_fixture, build_multi_fixture, prepare_debugee_process, DebugeeRunInfo, TestHooks};
use serial_test::serial;
use spray::debugger::error::Error;
use spray::debugger::Debugger;

#[test]
#[serial]
fn test_run_to_main() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();

    // the session opens at the first statement of main
    assert_eq!(info.line(), Some(10));
    assert_eq!(info.file(), Some("tests/fixtures/calc.c".to_string()));
}

#[test]
#[serial]
fn test_continue_to_exit() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let mut debugger = Debugger::new(process, TestHooks::default()).unwrap();

    debugger.start_debugee().unwrap();
    debugger.continue_debugee().unwrap();

    assert!(debugger.is_exited());
    assert_eq!(debugger.exit_code(), Some(0));
}

#[test]
#[serial]
fn test_brkpt_on_function() {
    let bin = build_fixture("nested");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("add").unwrap();

    // the breakpoint lands at the first body statement, past the prologue
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(2));

    // `add` is called twice: from mul and from main
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(2));

    debugger.continue_debugee().unwrap();
    assert_eq!(debugger.exit_code(), Some(0));
}

#[test]
#[serial]
fn test_brkpt_on_line() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_line("calc.c", 4).unwrap();

    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(4));
    assert_eq!(info.file(), Some("tests/fixtures/calc.c".to_string()));
}

#[test]
#[serial]
fn test_brkpt_byte_patching() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let mut debugger = Debugger::new(process, TestHooks::default()).unwrap();
    debugger.start_debugee().unwrap();

    let addr = debugger.set_breakpoint_at_fn("weird_sum").unwrap();

    // enabled breakpoint means an INT3 byte at the target address
    let patched = debugger.read_memory(addr.as_usize(), 1).unwrap();
    assert_eq!(patched[0], 0xCC);

    // removing the breakpoint restores the original instruction byte
    debugger.remove_breakpoint_at_fn("weird_sum").unwrap();
    let restored = debugger.read_memory(addr.as_usize(), 1).unwrap();
    assert_ne!(restored[0], 0xCC);

    // enable/disable is an involution
    let addr2 = debugger.set_breakpoint_at_fn("weird_sum").unwrap();
    assert_eq!(addr, addr2);
    debugger.remove_breakpoint_at_fn("weird_sum").unwrap();
    let restored2 = debugger.read_memory(addr.as_usize(), 1).unwrap();
    assert_eq!(restored[0], restored2[0]);
}

#[test]
#[serial]
fn test_brkpt_set_is_idempotent() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let mut debugger = Debugger::new(process, TestHooks::default()).unwrap();
    debugger.start_debugee().unwrap();

    debugger.set_breakpoint_at_fn("weird_sum").unwrap();
    debugger.set_breakpoint_at_fn("weird_sum").unwrap();
    debugger.set_breakpoint_at_line("calc.c", 3).unwrap();

    // function and line resolve to the same statement, one breakpoint total
    assert_eq!(debugger.breakpoint_addresses().len(), 1);
}

#[test]
#[serial]
fn test_brkpt_delete() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("weird_sum").unwrap();

    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(3));

    // delete while stopped on the breakpoint, then run to the end
    debugger.remove_breakpoint_at_fn("weird_sum").unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(debugger.exit_code(), Some(0));
}

#[test]
#[serial]
fn test_brkpt_unknown_function() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let mut debugger = Debugger::new(process, TestHooks::default()).unwrap();
    debugger.start_debugee().unwrap();

    let err = debugger.set_breakpoint_at_fn("no_such_function").unwrap_err();
    assert!(matches!(err, Error::FunctionNotFound(_)));
}

#[test]
#[serial]
fn test_brkpt_on_empty_line_falls_through() {
    let bin = build_multi_fixture();

    // resolution alone: line 1 of the recursive unit has no statement, the
    // lookup falls through to the function on line 3
    {
        let process = prepare_debugee_process(&bin);
        let debugger = Debugger::new(process, TestHooks::default()).unwrap();
        let place = debugger
            .debug_info()
            .find_stmt_place("mf_other.c", 1)
            .unwrap();
        assert_eq!(place.line_number, 3);
        let place = debugger
            .debug_info()
            .find_stmt_place("mf_other.c", 2)
            .unwrap();
        assert_eq!(place.line_number, 3);
    }

    // end to end: the fallen-through breakpoint is hit
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();
    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_line("mf_other.c", 1).unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(3));
    assert_eq!(info.file(), Some("tests/fixtures/mf_other.c".to_string()));
}

#[test]
#[serial]
fn test_brkpt_file_resolution_by_basename_and_suffix() {
    let bin = build_multi_fixture();
    let process = prepare_debugee_process(&bin);
    let debugger = Debugger::new(process, TestHooks::default()).unwrap();

    let by_basename = debugger
        .debug_info()
        .find_stmt_place("mf_main.c", 4)
        .unwrap()
        .to_owned();
    let by_suffix = debugger
        .debug_info()
        .find_stmt_place("tests/fixtures/mf_main.c", 4)
        .unwrap()
        .to_owned();
    assert_eq!(by_basename, by_suffix);
    assert!(debugger.debug_info().find_stmt_place("nowhere.c", 4).is_none());
}
