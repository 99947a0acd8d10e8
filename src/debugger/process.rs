use crate::debugger::error::Error;
use crate::debugger::error::Error::Waitpid;
use nix::sys;
use nix::sys::personality::Persona;
use nix::sys::ptrace::Options;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use std::marker::PhantomData;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

/// Process state.
pub trait State {}

/// Process running and traced with the `ptrace` system call.
pub struct Installed;

impl State for Installed {}

/// Process prepared for instantiation.
pub struct Template;

impl State for Template {}

/// The traced child process.
pub struct Child<S: State> {
    pub program: PathBuf,
    args: Vec<String>,
    pid: Option<Pid>,
    _p: PhantomData<S>,
}

impl Child<Template> {
    /// Create a new process template, but don't start it.
    ///
    /// # Arguments
    ///
    /// * `program`: path to the executable
    /// * `args`: program arguments
    pub fn new<ARGS: IntoIterator<Item = I>, I: Into<String>>(
        program: impl Into<PathBuf>,
        args: ARGS,
    ) -> Child<Template> {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            pid: None,
            _p: PhantomData,
        }
    }

    /// Launch the child: it requests tracing and execs the target, the caller
    /// waits for the initial trap at the entry point.
    ///
    /// Address space randomization is switched off so addresses in the
    /// not-position-independent case stay equal to the DWARF-supplied ones.
    pub fn install(self) -> Result<Child<Installed>, Error> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        unsafe {
            cmd.pre_exec(move || {
                sys::ptrace::traceme()?;
                sys::personality::set(Persona::ADDR_NO_RANDOMIZE)?;
                Ok(())
            });
        }

        let child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(self.program.clone(), e))?;
        let pid = Pid::from_raw(child.id() as i32);

        waitpid(pid, Some(WaitPidFlag::WSTOPPED)).map_err(Waitpid)?;
        sys::ptrace::setoptions(pid, Options::PTRACE_O_EXITKILL).map_err(Error::Ptrace)?;

        Ok(Child {
            program: self.program,
            args: self.args,
            pid: Some(pid),
            _p: PhantomData,
        })
    }
}

impl Child<Installed> {
    /// Return the running process pid.
    pub fn pid(&self) -> Pid {
        self.pid.expect("installed process always has a pid")
    }
}
