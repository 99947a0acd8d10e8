pub mod dwarf;
pub mod tracee;
pub mod tracer;

use crate::debugger::address::{GlobalAddress, RelocatedAddress};
use crate::debugger::debugee::dwarf::DebugInformation;
use crate::debugger::debugee::tracee::Tracee;
use crate::debugger::debugee::tracer::{StopReason, Tracer};
use crate::debugger::error::Error;
use log::info;
use nix::unistd::Pid;
use std::path::Path;

/// Execution state of the tracee process.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionStatus {
    InProgress,
    Exited(i32),
}

/// A tracee location snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Location {
    pub pc: RelocatedAddress,
    pub global_pc: GlobalAddress,
}

/// The process being debugged: the traced child together with its parsed
/// debug information and the load-time address bias.
pub struct Debugee {
    tracer: Tracer,
    pub debug_info: DebugInformation,
    execution_status: ExecutionStatus,
    mapping_offset: usize,
}

impl Debugee {
    /// Create a debugee from an already traced and stopped child.
    ///
    /// The load-time bias for position independent executables is resolved
    /// here, once, from the tracee memory map.
    pub fn new(pid: Pid, debug_info: DebugInformation) -> Result<Self, Error> {
        let mapping_offset = if debug_info.is_relocatable() {
            mapping_offset(pid, debug_info.pathname())?
        } else {
            0
        };
        info!(target: "debugger", "mapping offset: {mapping_offset:#x}");

        Ok(Self {
            tracer: Tracer::new(Tracee::new(pid)),
            debug_info,
            execution_status: ExecutionStatus::InProgress,
            mapping_offset,
        })
    }

    pub fn tracee(&self) -> &Tracee {
        &self.tracer.tracee
    }

    pub fn tracee_mut(&mut self) -> &mut Tracee {
        &mut self.tracer.tracee
    }

    pub fn pid(&self) -> Pid {
        self.tracer.tracee.pid
    }

    pub fn execution_status(&self) -> ExecutionStatus {
        self.execution_status
    }

    pub fn is_exited(&self) -> bool {
        matches!(self.execution_status, ExecutionStatus::Exited(_))
    }

    /// VAS offset added to every DWARF-supplied address.
    pub fn mapping_offset(&self) -> usize {
        self.mapping_offset
    }

    /// Current tracee location.
    pub fn location(&self) -> Result<Location, Error> {
        let pc = self.tracee().pc()?;
        Ok(Location {
            pc,
            global_pc: pc.into_global(self.mapping_offset),
        })
    }

    /// Continue execution until the next stop.
    pub fn resume(&mut self) -> Result<StopReason, Error> {
        let reason = self.tracer.resume()?;
        self.apply_stop_reason(reason);
        Ok(reason)
    }

    /// Execute a single instruction.
    pub fn single_step(&mut self) -> Result<StopReason, Error> {
        let reason = self.tracer.single_step()?;
        self.apply_stop_reason(reason);
        Ok(reason)
    }

    fn apply_stop_reason(&mut self, reason: StopReason) {
        match reason {
            StopReason::DebugeeExit(code) => self.execution_status = ExecutionStatus::Exited(code),
            StopReason::DebugeeSignalled(_) => {
                self.execution_status = ExecutionStatus::Exited(-1)
            }
            _ => {}
        }
    }
}

/// Find the lowest load address of the executable in the tracee memory map.
fn mapping_offset(pid: Pid, program: &Path) -> Result<usize, Error> {
    let program = program.canonicalize()?;
    let maps = proc_maps::get_process_maps(pid.as_raw()).map_err(Error::IO)?;

    maps.iter()
        .filter(|map| {
            map.filename()
                .map(|f| f == program.as_path())
                .unwrap_or(false)
        })
        .map(|map| map.start())
        .min()
        .ok_or(Error::MappingNotFound(RelocatedAddress::from(0_usize)))
}
