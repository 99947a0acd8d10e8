use crate::debugger::address::RelocatedAddress;
use crate::debugger::error::Error;
use nix::errno::Errno;
use nix::libc::c_void;
use nix::sys;
use nix::unistd::Pid;
use std::cell::Cell;
use std::collections::HashMap;

/// x86-64 one byte trap instruction.
const INT3: u64 = 0xCC;

#[derive(PartialEq, Clone, Copy)]
enum BrkptType {
    /// Breakpoint set by the user, lives until deleted.
    UserDefined,
    /// Breakpoint set by a step algorithm, removed before the command returns.
    Temporary,
}

/// Software breakpoint representation.
///
/// While enabled the byte at `addr` in tracee memory is `0xCC` and the
/// original byte is saved here; while disabled the original byte is restored.
pub struct Breakpoint {
    pub addr: RelocatedAddress,
    pid: Pid,
    saved_byte: Cell<u8>,
    enabled: Cell<bool>,
    r#type: BrkptType,
}

impl Breakpoint {
    fn new_inner(addr: RelocatedAddress, pid: Pid, r#type: BrkptType) -> Self {
        Self {
            addr,
            pid,
            saved_byte: Default::default(),
            enabled: Default::default(),
            r#type,
        }
    }

    pub fn new(addr: RelocatedAddress, pid: Pid) -> Self {
        Self::new_inner(addr, pid, BrkptType::UserDefined)
    }

    pub fn new_temporary(addr: RelocatedAddress, pid: Pid) -> Self {
        Self::new_inner(addr, pid, BrkptType::Temporary)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn is_temporary(&self) -> bool {
        self.r#type == BrkptType::Temporary
    }

    fn as_ptr(&self) -> *mut c_void {
        usize::from(self.addr) as *mut c_void
    }

    pub fn enable(&self) -> Result<(), Error> {
        let data = sys::ptrace::read(self.pid, self.as_ptr()).map_err(Error::Ptrace)?;
        self.saved_byte.set((data & 0xff) as u8);
        let data_with_trap = (data as u64 & !0xff) | INT3;
        unsafe {
            sys::ptrace::write(self.pid, self.as_ptr(), data_with_trap as *mut c_void)
                .map_err(Error::Ptrace)?;
        }
        self.enabled.set(true);

        Ok(())
    }

    pub fn disable(&self) -> Result<(), Error> {
        let data = sys::ptrace::read(self.pid, self.as_ptr()).map_err(Error::Ptrace)? as u64;
        let restored: u64 = (data & !0xff) | self.saved_byte.get() as u64;
        unsafe {
            sys::ptrace::write(self.pid, self.as_ptr(), restored as *mut c_void)
                .map_err(Error::Ptrace)?;
        }
        self.enabled.set(false);

        Ok(())
    }
}

/// Address-keyed breakpoint registry, at most one breakpoint per address.
#[derive(Default)]
pub struct BreakpointRegistry {
    breakpoints: HashMap<RelocatedAddress, Breakpoint>,
}

impl BreakpointRegistry {
    /// Register and enable a breakpoint. Setting a breakpoint at an address
    /// that already has one is a no-op.
    pub fn add_and_enable(&mut self, brkpt: Breakpoint) -> Result<(), Error> {
        if self.breakpoints.contains_key(&brkpt.addr) {
            return Ok(());
        }
        brkpt.enable()?;
        self.breakpoints.insert(brkpt.addr, brkpt);
        Ok(())
    }

    /// Disable a breakpoint and remove it from the registry.
    pub fn remove(&mut self, addr: RelocatedAddress) -> Result<Option<Breakpoint>, Error> {
        let Some(brkpt) = self.breakpoints.remove(&addr) else {
            return Ok(None);
        };
        if brkpt.is_enabled() {
            match brkpt.disable() {
                // the tracee may already be gone, nothing to restore then
                Err(Error::Ptrace(Errno::ESRCH)) => {}
                other => other?,
            }
        }
        Ok(Some(brkpt))
    }

    pub fn get(&self, addr: RelocatedAddress) -> Option<&Breakpoint> {
        self.breakpoints.get(&addr)
    }

    pub fn get_enabled(&self, addr: RelocatedAddress) -> Option<&Breakpoint> {
        self.breakpoints.get(&addr).filter(|b| b.is_enabled())
    }

    /// True iff an enabled breakpoint is registered at `addr`.
    pub fn enabled_at(&self, addr: RelocatedAddress) -> bool {
        self.get_enabled(addr).is_some()
    }

    pub fn addresses(&self) -> Vec<RelocatedAddress> {
        self.breakpoints.keys().copied().collect()
    }

    /// Disable all breakpoints, restoring the patched bytes (used on detach).
    pub fn disable_all(&mut self) -> Result<(), Error> {
        for brkpt in self.breakpoints.values() {
            if brkpt.is_enabled() {
                match brkpt.disable() {
                    Err(Error::Ptrace(Errno::ESRCH)) => {}
                    other => other?,
                }
            }
        }
        Ok(())
    }
}
