use crate::common::{build_fixture, prepare_debugee_process, DebugeeRunInfo, TestHooks};
use serial_test::serial;
use spray::debugger::Debugger;

#[test]
#[serial]
fn test_backtrace_through_nested_calls() {
    let bin = build_fixture("nested");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("add").unwrap();
    debugger.continue_debugee().unwrap();
    assert_eq!(info.line(), Some(2));

    let unwind = debugger.backtrace().unwrap();

    // innermost first: add stopped at its body, called from mul line 8,
    // called from main line 13
    assert!(unwind.frames.len() >= 3);
    assert_eq!(unwind.frames[0].symbol(), "add:2");
    assert_eq!(unwind.frames[1].symbol(), "mul:8");
    assert_eq!(unwind.frames[2].symbol(), "main:13");

    // the fixture is built with a frame pointer, no warning expected
    assert!(!unwind.frame_pointer_omitted);
}

#[test]
#[serial]
fn test_backtrace_symbolization_fallback() {
    let bin = build_fixture("nested");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("add").unwrap();
    debugger.continue_debugee().unwrap();

    let unwind = debugger.backtrace().unwrap();

    // every frame renders as `name:line`, a bare symbol name or `<?>`
    for frame in &unwind.frames {
        let symbol = frame.symbol();
        assert!(!symbol.is_empty());
        if frame.func_name.is_none() {
            assert_eq!(symbol, "<?>");
        }
    }
}

#[test]
#[serial]
fn test_return_address_of_frame() {
    let bin = build_fixture("nested");
    let process = prepare_debugee_process(&bin);
    let info = DebugeeRunInfo::default();
    let mut debugger = Debugger::new(process, TestHooks::new(info.clone())).unwrap();

    debugger.start_debugee().unwrap();
    debugger.set_breakpoint_at_fn("add").unwrap();
    debugger.continue_debugee().unwrap();

    // the return address points back into mul
    let ret = debugger.return_addr().unwrap();
    let place = debugger
        .debug_info()
        .find_place_from_pc(ret.into_global(0))
        .unwrap();
    assert_eq!(place.line_number, 8);
}
