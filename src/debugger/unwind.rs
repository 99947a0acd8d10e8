use crate::debugger::address::RelocatedAddress;
use crate::debugger::error::Error;
use crate::debugger::register::Register;
use crate::debugger::Debugger;
use std::mem;

/// One stack frame in the unwind path.
#[derive(Debug, Clone)]
pub struct FrameSpan {
    pub ip: RelocatedAddress,
    /// Function (or ELF symbol) name, `None` when symbolization missed.
    pub func_name: Option<String>,
    /// Source line at `ip`, known only for frames with DWARF coverage.
    pub line: Option<u64>,
}

impl FrameSpan {
    /// Frame symbol in the backtrace output form: `name:line`, a bare name,
    /// or `<?>`.
    pub fn symbol(&self) -> String {
        match (&self.func_name, self.line) {
            (Some(name), Some(line)) => format!("{name}:{line}"),
            (Some(name), None) => name.clone(),
            (None, _) => "<?>".to_string(),
        }
    }
}

/// Stack unwind result: frames ordered innermost first, plus a warning flag
/// raised when the executable seems to omit the frame pointer.
pub struct UnwindResult {
    pub frames: Vec<FrameSpan>,
    pub frame_pointer_omitted: bool,
}

impl Debugger {
    /// Walk the stack via saved frame pointers and symbolize each pc.
    ///
    /// The walk stops on a null frame pointer, an unreadable frame or a
    /// non-monotonic frame pointer chain (loop guard).
    pub fn backtrace(&self) -> Result<UnwindResult, Error> {
        let registers = self.debugee.tracee().registers()?;
        let mut pc = RelocatedAddress::from(registers.value(Register::Rip));
        let mut rbp = registers.value(Register::Rbp);

        let mut frames = vec![];
        let mut frame_pointer_omitted = false;

        loop {
            frames.push(self.symbolize(pc));

            // the sanity check covers the first three frames
            if frames.len() <= 3 {
                frame_pointer_omitted |= self.frame_omits_frame_pointer(pc);
            }

            if rbp == 0 {
                break;
            }
            let Ok(ret) = self.read_stack_slot(rbp + 8) else {
                break;
            };
            let Ok(prev_rbp) = self.read_stack_slot(rbp) else {
                break;
            };
            if ret == 0 {
                break;
            }
            // a sane frame chain grows towards higher addresses
            if prev_rbp != 0 && prev_rbp <= rbp {
                break;
            }

            pc = RelocatedAddress::from(ret);
            rbp = prev_rbp;
        }

        Ok(UnwindResult {
            frames,
            frame_pointer_omitted,
        })
    }

    /// Return address of the current frame, read from the saved frame
    /// pointer slot.
    pub fn return_addr(&self) -> Result<RelocatedAddress, Error> {
        let registers = self.debugee.tracee().registers()?;
        let rbp = registers.value(Register::Rbp);
        if rbp == 0 {
            return Err(Error::NoReturnAddress);
        }
        let ret = self
            .read_stack_slot(rbp + 8)
            .map_err(|_| Error::NoReturnAddress)?;
        if ret == 0 {
            return Err(Error::NoReturnAddress);
        }
        Ok(RelocatedAddress::from(ret))
    }

    fn read_stack_slot(&self, addr: u64) -> Result<u64, Error> {
        let bytes = self
            .debugee
            .tracee()
            .read_memory(addr as usize, mem::size_of::<u64>())?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|data: Vec<u8>| Error::TypeBinaryRepr("u64", data.into_boxed_slice()))?;
        Ok(u64::from_le_bytes(bytes))
    }

    fn symbolize(&self, pc: RelocatedAddress) -> FrameSpan {
        let debug_info = &self.debugee.debug_info;
        let global_pc = pc.into_global(self.debugee.mapping_offset());

        if let Some(func) = debug_info.find_function_by_pc(global_pc) {
            let line = debug_info
                .find_place_from_pc(global_pc)
                .map(|place| place.line_number);
            return FrameSpan {
                ip: pc,
                func_name: func.name().map(|name| name.to_string()),
                line,
            };
        }

        FrameSpan {
            ip: pc,
            func_name: debug_info
                .find_symbol_by_addr(global_pc)
                .map(|symbol| symbol.name.clone()),
            line: None,
        }
    }

    fn frame_omits_frame_pointer(&self, pc: RelocatedAddress) -> bool {
        let global_pc = pc.into_global(self.debugee.mapping_offset());
        let Some(func) = self.debugee.debug_info.find_function_by_pc(global_pc) else {
            return false;
        };
        func.omits_frame_pointer(self.debugee.pid(), self.debugee.mapping_offset())
    }
}
