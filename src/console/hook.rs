use crate::console::print;
use crate::console::view::FileView;
use crate::debugger::address::RelocatedAddress;
use crate::debugger::debugee::dwarf::unit::PlaceDescriptorOwned;
use crate::debugger::EventHook;
use nix::sys::signal::Signal;

/// Window height around the current line.
const SOURCE_BOUNDS: u64 = 3;

/// Prints stop events of the tracee to stdout.
pub struct TerminalHook {
    file_view: FileView,
}

impl TerminalHook {
    pub fn new() -> Self {
        Self {
            file_view: FileView::new(),
        }
    }

    fn print_source(&self, place: &PlaceDescriptorOwned) -> anyhow::Result<()> {
        print!("{}", self.file_view.render_source(place, SOURCE_BOUNDS)?);
        Ok(())
    }
}

impl Default for TerminalHook {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHook for TerminalHook {
    fn on_breakpoint(
        &self,
        pc: RelocatedAddress,
        mb_place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        match mb_place {
            Some(place) => {
                println!(
                    "Hit breakpoint at address {} in {}",
                    print::address(pc),
                    place.file_display
                );
                self.print_source(&place)?;
            }
            None => println!("Hit breakpoint at address {}", print::address(pc)),
        }
        Ok(())
    }

    fn on_step(
        &self,
        _pc: RelocatedAddress,
        mb_place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        if let Some(place) = mb_place {
            self.print_source(&place)?;
        }
        Ok(())
    }

    fn on_signal(&self, signal: Signal) {
        println!("Child was stopped by {signal}");
    }
}
