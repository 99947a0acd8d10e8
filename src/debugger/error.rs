use crate::debugger::address::{GlobalAddress, RelocatedAddress};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- generic errors --------------------------------------------
    #[error(transparent)]
    IO(#[from] std::io::Error),

    // --------------------------------- debugger entity not found ---------------------------------
    #[error("no debug information for {0}")]
    NoDebugInformation(&'static str),
    #[error("unknown register {0:?}")]
    RegisterNotFound(gimli::Register),
    #[error("unknown register name `{0}`")]
    RegisterNameNotFound(String),
    #[error("no source line information at address {0}")]
    PlaceNotFound(GlobalAddress),
    #[error("no breakpoint location for `{0}`")]
    NoSuitablePlace(String),
    #[error("function not found at address {0}")]
    FunctionNotFoundAt(GlobalAddress),
    #[error("Failed to find a function or address called {0}")]
    FunctionNotFound(String),
    #[error("function name `{0}` is ambiguous")]
    AmbiguousFunction(String),
    #[error("Failed to find a variable called {0}")]
    VariableNotFound(String),

    // --------------------------------- remote memory errors --------------------------------------
    #[error("memory at {0:#018x} is not mapped in the child")]
    MemoryUnmapped(usize),
    #[error("invalid binary representation of type `{0}`: {1:?}")]
    TypeBinaryRepr(&'static str, Box<[u8]>),

    // --------------------------------- syscall errors --------------------------------------------
    #[error("waitpid syscall error: {0}")]
    Waitpid(nix::Error),
    #[error("ptrace syscall error: {0}")]
    Ptrace(nix::Error),
    #[error("{0} syscall error: {1}")]
    Syscall(&'static str, nix::Error),

    // --------------------------------- parsing errors --------------------------------------------
    #[error("dwarf parsing error: {0}")]
    DwarfParsing(#[from] gimli::Error),
    #[error("object file parsing error: {0}")]
    ObjParsing(#[from] object::Error),

    // --------------------------------- dwarf evaluation errors -----------------------------------
    #[error("dwarf expression evaluation: `{0}` required")]
    EvalOptionRequired(&'static str),
    #[error("dwarf expression evaluation: unsupported requirement ({0})")]
    EvalUnsupportedRequire(String),
    #[error("no frame base address")]
    NoFrameBase,
    #[error("unsupported variable location")]
    UnsupportedLocation,

    // --------------------------------- stepping errors -------------------------------------------
    #[error("Failed to find another line to step to")]
    NoPlaceToStepTo,
    #[error("no return address for the current frame")]
    NoReturnAddress,

    // --------------------------------- value errors ----------------------------------------------
    #[error("Invalid value to set the location to")]
    InvalidSetValue,
    #[error("the value of `{0}` does not fit the location")]
    TypeMismatch(String),

    // --------------------------------- third party errors ----------------------------------------
    #[error("hook: {0}")]
    Hook(anyhow::Error),

    // --------------------------------- debugee process errors ------------------------------------
    #[error("debugee process exited with code {0}")]
    ProcessExit(i32),
    #[error("child must be stopped to do this")]
    NotStopped,
    #[error("failed to spawn `{0}`: {1}")]
    Spawn(PathBuf, std::io::Error),
    #[error("executable mapping not found at {0}")]
    MappingNotFound(RelocatedAddress),
}

/// Transforms `Result` into `Option` and logs an error if it occurs.
#[macro_export]
macro_rules! weak_error {
    ($res: expr) => {
        match $res {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!(target: "debugger", "{:#}", e);
                None
            }
        }
    };
}
