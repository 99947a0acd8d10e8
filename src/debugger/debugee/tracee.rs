use crate::debugger::address::RelocatedAddress;
use crate::debugger::error::Error;
use crate::debugger::register::{Register, RegisterMap};
use nix::errno::Errno;
use nix::libc::c_void;
use nix::sys;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::mem;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TraceeStatus {
    Stopped,
    Running,
    Exited,
}

/// Single traced process. All ptrace requests go through this type.
pub struct Tracee {
    pub pid: Pid,
    pub status: TraceeStatus,
}

impl Tracee {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            status: TraceeStatus::Stopped,
        }
    }

    fn ensure_stopped(&self) -> Result<(), Error> {
        if self.status != TraceeStatus::Stopped {
            return Err(Error::NotStopped);
        }
        Ok(())
    }

    /// Get a snapshot of the tracee registers.
    pub fn registers(&self) -> Result<RegisterMap, Error> {
        self.ensure_stopped()?;
        RegisterMap::current(self.pid)
    }

    /// Write a register snapshot back into the tracee.
    pub fn set_registers(&self, map: RegisterMap) -> Result<(), Error> {
        self.ensure_stopped()?;
        map.persist(self.pid)
    }

    /// Current program counter value.
    pub fn pc(&self) -> Result<RelocatedAddress, Error> {
        Ok(RelocatedAddress::from(
            self.registers()?.value(Register::Rip),
        ))
    }

    /// Set a new program counter value.
    pub fn set_pc(&self, value: RelocatedAddress) -> Result<(), Error> {
        let mut map = self.registers()?;
        map.update(Register::Rip, value.into());
        self.set_registers(map)
    }

    /// Read `len` bytes of tracee memory starting at `addr`.
    ///
    /// The transfer is word oriented (`PTRACE_PEEKDATA`); a fault inside the
    /// requested range fails the whole read with [`Error::MemoryUnmapped`].
    pub fn read_memory(&self, addr: usize, len: usize) -> Result<Vec<u8>, Error> {
        self.ensure_stopped()?;
        let mut result = Vec::with_capacity(len);
        let mut address = addr;
        let mut left = len;
        while left > 0 {
            let word = sys::ptrace::read(self.pid, address as *mut c_void)
                .map_err(|e| mem_error(e, address))?;
            let bytes = (word as u64).to_ne_bytes();
            let take = left.min(mem::size_of::<u64>());
            result.extend_from_slice(&bytes[..take]);
            left -= take;
            address += take;
        }
        Ok(result)
    }

    /// Write bytes into tracee memory at `addr`.
    ///
    /// Word oriented (`PTRACE_POKEDATA`); a partial word at the end is merged
    /// with the current memory content via read-modify-write.
    pub fn write_memory(&self, addr: usize, data: &[u8]) -> Result<(), Error> {
        self.ensure_stopped()?;
        let word_size = mem::size_of::<u64>();
        let mut address = addr;
        let mut rest = data;
        while !rest.is_empty() {
            let word = if rest.len() >= word_size {
                u64::from_ne_bytes(rest[..word_size].try_into().expect("slice len is checked"))
            } else {
                let current = sys::ptrace::read(self.pid, address as *mut c_void)
                    .map_err(|e| mem_error(e, address))? as u64;
                let mut bytes = current.to_ne_bytes();
                bytes[..rest.len()].copy_from_slice(rest);
                u64::from_ne_bytes(bytes)
            };
            unsafe {
                sys::ptrace::write(self.pid, address as *mut c_void, word as *mut c_void)
                    .map_err(|e| mem_error(e, address))?;
            }
            let taken = rest.len().min(word_size);
            rest = &rest[taken..];
            address += taken;
        }
        Ok(())
    }

    /// Resume the tracee, optionally delivering a signal.
    pub fn r#continue(&mut self, sig: Option<Signal>) -> Result<(), Error> {
        self.ensure_stopped()?;
        sys::ptrace::cont(self.pid, sig).map_err(Error::Ptrace)?;
        self.status = TraceeStatus::Running;
        Ok(())
    }

    /// Execute the next instruction, the tracee traps afterwards.
    pub fn single_step(&mut self) -> Result<(), Error> {
        self.ensure_stopped()?;
        sys::ptrace::step(self.pid, None).map_err(Error::Ptrace)?;
        self.status = TraceeStatus::Running;
        Ok(())
    }

    /// Detach from the tracee, leaving it running free.
    pub fn detach(&mut self) -> Result<(), Error> {
        sys::ptrace::detach(self.pid, None).map_err(Error::Ptrace)?;
        self.status = TraceeStatus::Exited;
        Ok(())
    }

    /// Kill the tracee. Works in both the stopped and the running state.
    pub fn kill(&mut self) -> Result<(), Error> {
        match sys::signal::kill(self.pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {
                self.status = TraceeStatus::Exited;
                Ok(())
            }
            Err(e) => Err(Error::Syscall("kill", e)),
        }
    }
}

fn mem_error(errno: Errno, addr: usize) -> Error {
    match errno {
        Errno::EIO | Errno::EFAULT => Error::MemoryUnmapped(addr),
        e => Error::Ptrace(e),
    }
}
