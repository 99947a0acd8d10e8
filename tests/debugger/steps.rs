use crate::common::{build_fixture, prepare_debugee_process, DebugeeRunInfo, TestHooks};
use serial_test::serial;
use spray::debugger::error::Error;
use spray::debugger::Debugger;

#[test]
#[serial]
fn test_step_over_stays_in_function() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    assert_eq!(info.line(), Some(10));

    debugger.step_over().unwrap();
    assert_eq!(info.line(), Some(11));
    debugger.step_over().unwrap();
    assert_eq!(info.line(), Some(12));

    // line 12 calls weird_sum, step-over must not stop inside of it
    debugger.step_over().unwrap();
    assert_eq!(info.line(), Some(13));
    assert_eq!(info.file(), Some("tests/fixtures/calc.c".to_string()));
}

#[test]
#[serial]
fn test_step_into_call() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.step_over().unwrap();
    debugger.step_over().unwrap();
    assert_eq!(info.line(), Some(12));

    // a step at the call line enters the callee past its prologue
    debugger.step_into().unwrap();
    assert_eq!(info.line(), Some(3));

    debugger.step_into().unwrap();
    assert_eq!(info.line(), Some(4));
}

#[test]
#[serial]
fn test_step_out() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("weird_sum").unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(3));

    debugger.step_out().unwrap();
    assert_eq!(info.line(), Some(12));
}

#[test]
#[serial]
fn test_instruction_step() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    let pc0 = debugger.current_pc().unwrap();

    debugger.step_instruction().unwrap();
    let pc1 = debugger.current_pc().unwrap();
    assert!(pc1 > pc0);

    // a single instruction cannot skip more than one source line here
    let line = info.line().unwrap();
    assert!(line == 10 || line == 11);
}

#[test]
#[serial]
fn test_instruction_step_over_breakpoint() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    let addr = debugger.set_breakpoint_at_fn("weird_sum").unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(3));

    // stepping off a breakpoint executes the original instruction and
    // leaves the trap byte in place afterwards
    debugger.step_instruction().unwrap();
    assert!(debugger.current_pc().unwrap() > addr);
    let byte = debugger.read_memory(addr.as_usize(), 1).unwrap();
    assert_eq!(byte[0], 0xCC);
}

#[test]
#[serial]
fn test_step_past_all_lines_fails() {
    let bin = build_fixture("calc");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_line("calc.c", 14).unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(14));

    // stepping beyond the program end runs out of lines to stop at
    let mut steps = 0;
    let err = loop {
        match debugger.step_into() {
            Ok(()) => {
                steps += 1;
                assert!(steps < 10, "stepping never left the program");
            }
            Err(e) => break e,
        }
    };
    assert!(matches!(err, Error::NoPlaceToStepTo));
}
