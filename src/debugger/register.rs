use crate::debugger::error::Error;
use nix::libc::user_regs_struct;
use nix::sys;
use nix::unistd::Pid;
use smallvec::{smallvec, SmallVec};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

/// The 27 x86-64 user registers exposed by `PTRACE_GETREGS`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, EnumString, EnumIter, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Register {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rdi,
    Rsi,
    Rbp,
    Rsp,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    Rip,
    Eflags,
    Cs,
    OrigRax,
    FsBase,
    GsBase,
    Fs,
    Gs,
    Ss,
    Ds,
    Es,
}

impl Register {
    /// Stable DWARF register number of this register, used by location
    /// expressions. `orig_rax` is a kernel artifact without a DWARF number.
    pub fn dwarf_number(self) -> Option<u16> {
        let number = match self {
            Register::Rax => 0,
            Register::Rdx => 1,
            Register::Rcx => 2,
            Register::Rbx => 3,
            Register::Rsi => 4,
            Register::Rdi => 5,
            Register::Rbp => 6,
            Register::Rsp => 7,
            Register::R8 => 8,
            Register::R9 => 9,
            Register::R10 => 10,
            Register::R11 => 11,
            Register::R12 => 12,
            Register::R13 => 13,
            Register::R14 => 14,
            Register::R15 => 15,
            Register::Rip => 16,
            Register::Eflags => 49,
            Register::Es => 50,
            Register::Cs => 51,
            Register::Ss => 52,
            Register::Ds => 53,
            Register::Fs => 54,
            Register::Gs => 55,
            Register::FsBase => 58,
            Register::GsBase => 59,
            Register::OrigRax => return None,
        };
        Some(number)
    }

    /// Resolve a DWARF register number back to a register.
    pub fn from_dwarf_number(number: gimli::Register) -> Result<Register, Error> {
        Register::iter()
            .find(|register| register.dwarf_number() == Some(number.0))
            .ok_or(Error::RegisterNotFound(number))
    }
}

/// Snapshot of the tracee register file.
#[derive(Clone, Copy)]
pub struct RegisterMap(user_regs_struct);

impl RegisterMap {
    pub fn current(pid: Pid) -> Result<Self, Error> {
        Ok(RegisterMap(
            sys::ptrace::getregs(pid).map_err(Error::Ptrace)?,
        ))
    }

    fn slot_mut(&mut self, register: Register) -> &mut u64 {
        let regs = &mut self.0;
        match register {
            Register::Rax => &mut regs.rax,
            Register::Rbx => &mut regs.rbx,
            Register::Rcx => &mut regs.rcx,
            Register::Rdx => &mut regs.rdx,
            Register::Rdi => &mut regs.rdi,
            Register::Rsi => &mut regs.rsi,
            Register::Rbp => &mut regs.rbp,
            Register::Rsp => &mut regs.rsp,
            Register::R8 => &mut regs.r8,
            Register::R9 => &mut regs.r9,
            Register::R10 => &mut regs.r10,
            Register::R11 => &mut regs.r11,
            Register::R12 => &mut regs.r12,
            Register::R13 => &mut regs.r13,
            Register::R14 => &mut regs.r14,
            Register::R15 => &mut regs.r15,
            Register::Rip => &mut regs.rip,
            Register::Eflags => &mut regs.eflags,
            Register::Cs => &mut regs.cs,
            Register::OrigRax => &mut regs.orig_rax,
            Register::FsBase => &mut regs.fs_base,
            Register::GsBase => &mut regs.gs_base,
            Register::Fs => &mut regs.fs,
            Register::Gs => &mut regs.gs,
            Register::Ss => &mut regs.ss,
            Register::Ds => &mut regs.ds,
            Register::Es => &mut regs.es,
        }
    }

    pub fn value(mut self, register: Register) -> u64 {
        *self.slot_mut(register)
    }

    pub fn update(&mut self, register: Register, value: u64) {
        *self.slot_mut(register) = value;
    }

    pub fn persist(self, pid: Pid) -> Result<(), Error> {
        sys::ptrace::setregs(pid, self.0).map_err(Error::Ptrace)
    }
}

/// Register file indexed by DWARF register numbers.
/// See <https://docs.rs/gimli/latest/gimli/struct.UnwindTableRow.html#method.register>
#[derive(Debug)]
pub struct DwarfRegisterMap(SmallVec<[Option<u64>; 0x80]>);

impl DwarfRegisterMap {
    pub fn value(&self, register: gimli::Register) -> Result<u64, Error> {
        self.0
            .get(register.0 as usize)
            .copied()
            .flatten()
            .ok_or(Error::RegisterNotFound(register))
    }
}

impl From<RegisterMap> for DwarfRegisterMap {
    fn from(map: RegisterMap) -> Self {
        let mut dwarf_map: SmallVec<[Option<u64>; 0x80]> = smallvec![None; 0x80];
        for register in Register::iter() {
            if let Some(number) = register.dwarf_number() {
                dwarf_map[number as usize] = Some(map.value(register));
            }
        }
        DwarfRegisterMap(dwarf_map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn zeroed_map() -> RegisterMap {
        RegisterMap(unsafe { std::mem::zeroed() })
    }

    #[test]
    fn register_names_round_trip() {
        assert_eq!(Register::from_str("rip").unwrap(), Register::Rip);
        assert_eq!(Register::from_str("fs_base").unwrap(), Register::FsBase);
        assert_eq!(Register::from_str("orig_rax").unwrap(), Register::OrigRax);
        assert_eq!(Register::R13.to_string(), "r13");
        assert_eq!(Register::Eflags.to_string(), "eflags");
        assert!(Register::from_str("not_a_register").is_err());
    }

    #[test]
    fn dwarf_numbering_round_trips() {
        assert_eq!(Register::Rbp.dwarf_number(), Some(6));
        assert_eq!(Register::Rsp.dwarf_number(), Some(7));
        assert_eq!(Register::OrigRax.dwarf_number(), None);

        for register in Register::iter() {
            let Some(number) = register.dwarf_number() else {
                continue;
            };
            assert_eq!(
                Register::from_dwarf_number(gimli::Register(number)).unwrap(),
                register
            );
        }
        assert!(Register::from_dwarf_number(gimli::Register(100)).is_err());
    }

    #[test]
    fn register_map_slots_are_distinct() {
        let mut map = zeroed_map();
        for (n, register) in Register::iter().enumerate() {
            map.update(register, n as u64 + 1);
        }
        for (n, register) in Register::iter().enumerate() {
            assert_eq!(map.value(register), n as u64 + 1);
        }
    }

    #[test]
    fn dwarf_map_mirrors_the_numbering() {
        let mut map = zeroed_map();
        map.update(Register::Rbp, 0xbeef);
        map.update(Register::Rip, 0xcafe);

        let dwarf_map = DwarfRegisterMap::from(map);
        assert_eq!(dwarf_map.value(gimli::Register(6)).unwrap(), 0xbeef);
        assert_eq!(dwarf_map.value(gimli::Register(16)).unwrap(), 0xcafe);
        assert!(dwarf_map.value(gimli::Register(100)).is_err());
    }
}
