pub mod address;
pub mod breakpoint;
mod code;
pub mod debugee;
pub mod error;
pub mod process;
pub mod register;
mod step;
pub mod unwind;
pub mod variable;

use crate::debugger::address::RelocatedAddress;
use crate::debugger::breakpoint::{Breakpoint, BreakpointRegistry};
use crate::debugger::debugee::dwarf::unit::PlaceDescriptorOwned;
use crate::debugger::debugee::dwarf::DebugInformation;
use crate::debugger::debugee::tracer::StopReason;
use crate::debugger::debugee::{Debugee, ExecutionStatus};
use crate::debugger::error::Error;
use crate::debugger::process::{Child, Installed};
use log::info;
use nix::sys::signal::Signal;
use nix::unistd::Pid;

/// Event sink for stops of the debugged process. The user interface decides
/// how a stop is rendered.
pub trait EventHook {
    /// The tracee hit a user breakpoint.
    fn on_breakpoint(
        &self,
        pc: RelocatedAddress,
        place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        _ = (pc, place);
        Ok(())
    }

    /// A step command finished at a new location.
    fn on_step(
        &self,
        pc: RelocatedAddress,
        place: Option<PlaceDescriptorOwned>,
    ) -> anyhow::Result<()> {
        _ = (pc, place);
        Ok(())
    }

    /// The tracee stopped with a signal.
    fn on_signal(&self, signal: Signal) {
        _ = signal;
    }

    /// The tracee exited with a code.
    fn on_exit(&self, code: i32) {
        _ = code;
    }
}

/// An [`EventHook`] that silently swallows all events.
pub struct DoNothingHook;

impl EventHook for DoNothingHook {}

/// Debugging session: owns the traced child, the breakpoint registry and the
/// debug information, and exposes the command-level operations on top of
/// them.
pub struct Debugger {
    #[allow(unused)]
    process: Child<Installed>,
    debugee: Debugee,
    breakpoints: BreakpointRegistry,
    hooks: Box<dyn EventHook>,
}

impl Debugger {
    /// Create a debugger for an already launched and stopped child.
    pub fn new(
        process: Child<Installed>,
        hooks: impl EventHook + 'static,
    ) -> Result<Self, Error> {
        let debug_info = DebugInformation::new(&process.program)?;
        info!(target: "debugger", "debug information for {:?} loaded", process.program);
        let debugee = Debugee::new(process.pid(), debug_info)?;

        Ok(Self {
            process,
            debugee,
            breakpoints: BreakpointRegistry::default(),
            hooks: Box::new(hooks),
        })
    }

    pub fn pid(&self) -> Pid {
        self.debugee.pid()
    }

    pub fn debug_info(&self) -> &DebugInformation {
        &self.debugee.debug_info
    }

    pub fn is_exited(&self) -> bool {
        self.debugee.is_exited()
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.debugee.execution_status() {
            ExecutionStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Source place of the current stop, if the pc is covered by a line
    /// table.
    pub fn current_place(&self) -> Result<Option<PlaceDescriptorOwned>, Error> {
        let location = self.debugee.location()?;
        Ok(self
            .debugee
            .debug_info
            .find_place_from_pc(location.global_pc)
            .map(|place| place.to_owned()))
    }

    /// Current program counter.
    pub fn current_pc(&self) -> Result<RelocatedAddress, Error> {
        self.debugee.tracee().pc()
    }

    /// Run the freshly launched tracee to the first statement of `main` and
    /// report the stop. Binaries without a `main` in their debug info stay at
    /// the entry point.
    pub fn start_debugee(&mut self) -> Result<(), Error> {
        let mb_addr = {
            let debug_info = &self.debugee.debug_info;
            match debug_info.find_function_by_name("main")? {
                Some(main) => {
                    let place = main.prolog_end_place()?;
                    Some(place.address.relocate(self.debugee.mapping_offset()))
                }
                None => None,
            }
        };

        let Some(addr) = mb_addr else {
            return self.report_step_stop();
        };

        if self.breakpoints.enabled_at(addr) {
            return self.continue_debugee().map(|_| ());
        }

        self.breakpoints
            .add_and_enable(Breakpoint::new_temporary(addr, self.debugee.pid()))?;
        let stop = self.resume_to_next_stop();
        self.breakpoints.remove(addr)?;

        match stop? {
            StopReason::DebugeeExit(code) => {
                self.hooks.on_exit(code);
                Ok(())
            }
            StopReason::SignalStop(signal) => {
                self.hooks.on_signal(signal);
                Ok(())
            }
            _ => self.report_step_stop(),
        }
    }

    /// Resume the tracee until the next stop and report it.
    pub fn continue_debugee(&mut self) -> Result<StopReason, Error> {
        let stop = self.resume_to_next_stop()?;
        match stop {
            StopReason::Breakpoint(addr) => {
                let place = self
                    .debugee
                    .debug_info
                    .find_place_from_pc(addr.into_global(self.debugee.mapping_offset()))
                    .map(|place| place.to_owned());
                self.hooks
                    .on_breakpoint(addr, place)
                    .map_err(Error::Hook)?;
            }
            StopReason::SignalStop(signal) => self.hooks.on_signal(signal),
            StopReason::DebugeeExit(code) => self.hooks.on_exit(code),
            _ => {}
        }
        Ok(stop)
    }

    /// Step the tracee to the next source line (step-into).
    pub fn step_into(&mut self) -> Result<(), Error> {
        self.step_in()?;
        self.report_step_stop()
    }

    /// Step the tracee over the current source line (step-over).
    pub fn step_over(&mut self) -> Result<(), Error> {
        self.step_over_any()?;
        self.report_step_stop()
    }

    /// Step the tracee out of the current function.
    pub fn step_out(&mut self) -> Result<(), Error> {
        self.step_out_frame()?;
        self.report_step_stop()
    }

    /// Execute a single machine instruction.
    pub fn step_instruction(&mut self) -> Result<(), Error> {
        self.single_step_instruction()?;
        self.report_step_stop()
    }

    fn report_step_stop(&self) -> Result<(), Error> {
        let location = self.debugee.location()?;
        let place = self
            .debugee
            .debug_info
            .find_place_from_pc(location.global_pc)
            .map(|place| place.to_owned());
        self.hooks.on_step(location.pc, place).map_err(Error::Hook)
    }

    /// Install a breakpoint at an absolute address.
    pub fn set_breakpoint_at_addr(&mut self, addr: RelocatedAddress) -> Result<(), Error> {
        self.breakpoints
            .add_and_enable(Breakpoint::new(addr, self.debugee.pid()))
    }

    /// Install a breakpoint at the first body statement of a function.
    pub fn set_breakpoint_at_fn(&mut self, name: &str) -> Result<RelocatedAddress, Error> {
        let addr = self.resolve_function(name)?;
        self.set_breakpoint_at_addr(addr)?;
        Ok(addr)
    }

    /// Install a breakpoint at a source line. An empty line falls through to
    /// the next statement of the same file.
    pub fn set_breakpoint_at_line(
        &mut self,
        file: &str,
        line: u64,
    ) -> Result<RelocatedAddress, Error> {
        let addr = self.resolve_line(file, line)?;
        self.set_breakpoint_at_addr(addr)?;
        Ok(addr)
    }

    /// Remove a breakpoint by address.
    pub fn remove_breakpoint_at_addr(&mut self, addr: RelocatedAddress) -> Result<(), Error> {
        self.breakpoints.remove(addr)?;
        Ok(())
    }

    /// Remove a breakpoint set on a function.
    pub fn remove_breakpoint_at_fn(&mut self, name: &str) -> Result<(), Error> {
        let addr = self.resolve_function(name)?;
        self.remove_breakpoint_at_addr(addr)
    }

    /// Remove a breakpoint set on a source line.
    pub fn remove_breakpoint_at_line(&mut self, file: &str, line: u64) -> Result<(), Error> {
        let addr = self.resolve_line(file, line)?;
        self.remove_breakpoint_at_addr(addr)
    }

    /// Addresses of all registered breakpoints.
    pub fn breakpoint_addresses(&self) -> Vec<RelocatedAddress> {
        self.breakpoints.addresses()
    }

    /// Read `len` bytes of tracee memory (used by tests and inspection).
    pub fn read_memory(&self, addr: usize, len: usize) -> Result<Vec<u8>, Error> {
        self.debugee.tracee().read_memory(addr, len)
    }

    fn resolve_function(&self, name: &str) -> Result<RelocatedAddress, Error> {
        let debug_info = &self.debugee.debug_info;
        let func = debug_info
            .find_function_by_name(name)?
            .ok_or_else(|| Error::FunctionNotFound(name.to_string()))?;
        let place = func.prolog_end_place()?;
        Ok(place.address.relocate(self.debugee.mapping_offset()))
    }

    fn resolve_line(&self, file: &str, line: u64) -> Result<RelocatedAddress, Error> {
        let debug_info = &self.debugee.debug_info;
        let place = debug_info
            .find_stmt_place(file, line)
            .ok_or_else(|| Error::NoSuitablePlace(format!("{file}:{line}")))?;
        Ok(place.address.relocate(self.debugee.mapping_offset()))
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        if !self.debugee.is_exited() {
            _ = self.breakpoints.disable_all();
            _ = self.debugee.tracee_mut().kill();
            _ = nix::sys::wait::waitpid(self.debugee.pid(), None);
        }
    }
}
