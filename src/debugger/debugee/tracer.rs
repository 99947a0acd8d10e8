use crate::debugger::address::RelocatedAddress;
use crate::debugger::code;
use crate::debugger::debugee::tracee::{Tracee, TraceeStatus};
use crate::debugger::error::Error;
use crate::debugger::error::Error::Waitpid;
use log::debug;
use nix::sys;
use nix::sys::signal::Signal;
use nix::sys::wait::{waitpid, WaitStatus};

/// Signals that don't interrupt the debugging process, they are delivered to
/// the tracee directly when they fire.
static QUIET_SIGNALS: [Signal; 6] = [
    Signal::SIGALRM,
    Signal::SIGURG,
    Signal::SIGCHLD,
    Signal::SIGIO,
    Signal::SIGVTALRM,
    Signal::SIGPROF,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The tracee exited with a code.
    DebugeeExit(i32),
    /// The tracee was terminated by a signal.
    DebugeeSignalled(Signal),
    /// The tracee trapped on a breakpoint. The address is the trap byte
    /// location (after INT3 the PC points one past it, the tracer rewinds).
    Breakpoint(RelocatedAddress),
    /// A single step completed.
    SingleStep(RelocatedAddress),
    /// The tracee stopped with an OS signal.
    SignalStop(Signal),
}

/// Ptrace tracer: resume the tracee and decode the next wait status.
pub struct Tracer {
    pub tracee: Tracee,
}

impl Tracer {
    pub fn new(tracee: Tracee) -> Self {
        Self { tracee }
    }

    /// Continue the tracee until the next interesting stop. Quiet signals are
    /// reinjected without surfacing a stop.
    pub fn resume(&mut self) -> Result<StopReason, Error> {
        let mut inject: Option<Signal> = None;
        loop {
            self.tracee.r#continue(inject.take())?;
            debug!(target: "tracer", "resume debugee execution, wait for updates");
            let reason = self.next_stop()?;
            if let StopReason::SignalStop(signal) = reason {
                if QUIET_SIGNALS.contains(&signal) {
                    inject = Some(signal);
                    continue;
                }
            }
            return Ok(reason);
        }
    }

    /// Execute a single instruction.
    pub fn single_step(&mut self) -> Result<StopReason, Error> {
        self.tracee.single_step()?;
        self.next_stop()
    }

    /// Block in `waitpid` and decode the new tracee status.
    fn next_stop(&mut self) -> Result<StopReason, Error> {
        let status = waitpid(self.tracee.pid, None).map_err(Waitpid)?;
        debug!(target: "tracer", "received new debugee status: {status:?}");

        match status {
            WaitStatus::Exited(_, code) => {
                self.tracee.status = TraceeStatus::Exited;
                Ok(StopReason::DebugeeExit(code))
            }
            WaitStatus::Signaled(_, signal, _) => {
                self.tracee.status = TraceeStatus::Exited;
                Ok(StopReason::DebugeeSignalled(signal))
            }
            WaitStatus::Stopped(_, Signal::SIGTRAP) => {
                self.tracee.status = TraceeStatus::Stopped;
                let info = sys::ptrace::getsiginfo(self.tracee.pid).map_err(Error::Ptrace)?;
                match info.si_code {
                    code::TRAP_TRACE => Ok(StopReason::SingleStep(self.tracee.pc()?)),
                    code::TRAP_BRKPT | code::SI_KERNEL => {
                        // after INT3 the PC points past the trap byte
                        let brkpt_addr = self.tracee.pc()?.offset(-1);
                        self.tracee.set_pc(brkpt_addr)?;
                        Ok(StopReason::Breakpoint(brkpt_addr))
                    }
                    _ => Ok(StopReason::SignalStop(Signal::SIGTRAP)),
                }
            }
            WaitStatus::Stopped(_, signal) => {
                self.tracee.status = TraceeStatus::Stopped;
                Ok(StopReason::SignalStop(signal))
            }
            status => {
                debug!(target: "tracer", "unexpected wait status {status:?}, wait again");
                self.tracee.status = TraceeStatus::Stopped;
                self.next_stop()
            }
        }
    }
}
