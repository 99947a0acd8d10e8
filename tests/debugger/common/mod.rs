use spray::debugger::address::RelocatedAddress;
use spray::debugger::debugee::dwarf::unit::PlaceDescriptorOwned;
use spray::debugger::process::{Child, Installed};
use spray::debugger::EventHook;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::Command;
use std::rc::Rc;

/// Compile a single-file C fixture with debug info and a frame pointer.
/// Sources are passed relative to the crate root so the recorded DWARF
/// paths stay workspace relative.
pub fn build_fixture(name: &str) -> PathBuf {
    let source = format!("tests/fixtures/{name}.c");
    build_fixture_from(name, &[source.as_str()])
}

/// Compile the two-unit fixture.
pub fn build_multi_fixture() -> PathBuf {
    build_fixture_from(
        "multi",
        &["tests/fixtures/mf_main.c", "tests/fixtures/mf_other.c"],
    )
}

fn build_fixture_from(name: &str, sources: &[&str]) -> PathBuf {
    let out = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(format!("{name}.bin"));
    let status = Command::new("cc")
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .args(["-g", "-O0", "-no-pie", "-fno-omit-frame-pointer", "-o"])
        .arg(&out)
        .args(sources)
        .status()
        .expect("cc is required to build test fixtures");
    assert!(status.success(), "fixture {name} failed to compile");
    out
}

/// Launch a fixture as a traced child, stopped at the entry point.
pub fn prepare_debugee_process(prog: &PathBuf) -> Child<Installed> {
    Child::new(prog.clone(), Vec::<String>::new())
        .install()
        .expect("debugee process install")
}

/// Shared record of the last reported stop, filled in by [`TestHooks`].
#[derive(Clone, Default)]
pub struct DebugeeRunInfo {
    place: Rc<RefCell<Option<PlaceDescriptorOwned>>>,
}

impl DebugeeRunInfo {
    pub fn line(&self) -> Option<u64> {
        self.place.borrow().as_ref().map(|place| place.line_number)
    }

    pub fn file(&self) -> Option<String> {
        self.place
            .borrow()
            .as_ref()
            .map(|place| place.file_display.clone())
    }
}

#[derive(Default)]
pub struct TestHooks {
    info: DebugeeRunInfo,
}

impl TestHooks {
    pub fn new(info: DebugeeRunInfo) -> Self {
        Self { info }
    }
}

impl EventHook for TestHooks {
    fn on_breakpoint(
        &self,
        _pc: RelocatedAddress,
        place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        if place.is_some() {
            *self.info.place.borrow_mut() = place;
        }
        Ok(())
    }

    fn on_step(
        &self,
        _pc: RelocatedAddress,
        place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        if place.is_some() {
            *self.info.place.borrow_mut() = place;
        }
        Ok(())
    }
}
