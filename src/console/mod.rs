pub mod hook;
pub mod parser;
pub mod print;
pub mod view;

use crate::console::hook::TerminalHook;
use crate::console::parser::{BreakpointTarget, Command, ValueTarget};
use crate::debugger::address::RelocatedAddress;
use crate::debugger::error::Error;
use crate::debugger::process::{Child, Installed};
use crate::debugger::register::Register;
use crate::debugger::variable::render::ValueFilter;
use crate::debugger::variable::TypedValue;
use crate::debugger::Debugger;
use crossterm::tty::IsTty;
use nix::sys::signal::{kill, Signal};
use rustyline::error::ReadlineError;
use rustyline::history::MemHistory;
use rustyline::{Config, Editor};
use std::fmt::Display;
use std::io;
use std::io::BufRead;
use std::str::FromStr;

const PROMPT: &str = "(spray) ";

enum Input {
    /// Interactive terminal, line editing and history enabled.
    Tty(Box<Editor<(), MemHistory>>),
    /// Piped input, plain line reading without a prompt.
    Pipe(io::Lines<io::BufReader<io::Stdin>>),
}

enum InputLine {
    Line(String),
    Cancelled,
    Eof,
}

pub struct AppBuilder;

impl AppBuilder {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self
    }

    pub fn build(self, process: Child<Installed>) -> anyhow::Result<TerminalApplication> {
        let debugger = Debugger::new(process, TerminalHook::new())?;

        let input = if io::stdin().is_tty() {
            let editor =
                Editor::<(), MemHistory>::with_history(Config::builder().build(), MemHistory::new())?;
            Input::Tty(Box::new(editor))
        } else {
            Input::Pipe(io::BufReader::new(io::stdin()).lines())
        };

        Ok(TerminalApplication {
            debugger,
            input,
            last_command: None,
        })
    }
}

pub struct TerminalApplication {
    debugger: Debugger,
    input: Input,
    last_command: Option<String>,
}

impl TerminalApplication {
    pub fn run(mut self) -> anyhow::Result<()> {
        // Ctrl-C while the child runs turns into a stop of the child; at the
        // prompt the line editor swallows it as input cancellation
        let pid = self.debugger.pid();
        ctrlc::set_handler(move || {
            _ = kill(pid, Signal::SIGSTOP);
        })?;

        if let Err(e) = self.debugger.start_debugee() {
            self.report_error(e);
        }

        loop {
            if let Some(code) = self.debugger.exit_code() {
                println!("Child exited with code {code}");
                break;
            }

            let line = match self.read_line() {
                InputLine::Line(line) => line,
                InputLine::Cancelled => continue,
                InputLine::Eof => break,
            };

            let line = if line.is_empty() {
                // an empty line repeats the previous command
                match &self.last_command {
                    Some(last) => last.clone(),
                    None => continue,
                }
            } else {
                line
            };

            let quit = self.handle_command(&line);
            self.last_command = Some(line);
            if quit {
                break;
            }
        }

        Ok(())
    }

    fn read_line(&mut self) -> InputLine {
        match &mut self.input {
            Input::Tty(editor) => match editor.readline(PROMPT) {
                Ok(line) => {
                    _ = editor.add_history_entry(&line);
                    InputLine::Line(line.trim().to_string())
                }
                Err(ReadlineError::Interrupted) => InputLine::Cancelled,
                Err(_) => InputLine::Eof,
            },
            Input::Pipe(lines) => match lines.next() {
                Some(Ok(line)) => InputLine::Line(line.trim().to_string()),
                _ => InputLine::Eof,
            },
        }
    }

    /// Execute one command line. Returns `true` when the session should end.
    fn handle_command(&mut self, line: &str) -> bool {
        let cmd = match parser::parse_command(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                self.report_error(e);
                return false;
            }
        };

        match cmd {
            Command::Break(target) => self.handle_breakpoint(target, true),
            Command::Delete(target) => self.handle_breakpoint(target, false),
            Command::Continue => {
                if let Err(e) = self.debugger.continue_debugee() {
                    self.report_error(e);
                }
            }
            Command::StepInto => self.handle_step(Debugger::step_into),
            Command::StepOver => self.handle_step(Debugger::step_over),
            Command::StepOut => self.handle_step(Debugger::step_out),
            Command::StepInstruction => self.handle_step(Debugger::step_instruction),
            Command::Print { target, filter } => self.handle_print(target, filter),
            Command::Set {
                target,
                literal,
                filter,
            } => self.handle_set(target, &literal, filter),
            Command::Backtrace => self.handle_backtrace(),
            Command::Quit => return true,
        }

        false
    }

    fn handle_step(&mut self, step: fn(&mut Debugger) -> Result<(), Error>) {
        match step(&mut self.debugger) {
            // child exit is reported by the main loop
            Ok(()) | Err(Error::ProcessExit(_)) => {}
            Err(e) => self.report_error(e),
        }
    }

    fn handle_breakpoint(&mut self, target: BreakpointTarget, install: bool) {
        let result = match target {
            BreakpointTarget::Address(addr) => {
                let addr = RelocatedAddress::from(addr);
                if install {
                    self.debugger.set_breakpoint_at_addr(addr)
                } else {
                    self.debugger.remove_breakpoint_at_addr(addr)
                }
            }
            BreakpointTarget::Line(file, line) => {
                if install {
                    self.debugger.set_breakpoint_at_line(&file, line).map(|_| ())
                } else {
                    self.debugger.remove_breakpoint_at_line(&file, line)
                }
            }
            BreakpointTarget::Symbol(name) => {
                let function_result = if install {
                    self.debugger.set_breakpoint_at_fn(&name).map(|_| ())
                } else {
                    self.debugger.remove_breakpoint_at_fn(&name)
                };
                match function_result {
                    // the function wins over the address interpretation,
                    // retry as a bare hex address only if it doesn't exist
                    Err(Error::FunctionNotFound(_)) => {
                        match usize::from_str_radix(&name, 16) {
                            Ok(addr) => {
                                let addr = RelocatedAddress::from(addr);
                                if install {
                                    self.debugger.set_breakpoint_at_addr(addr)
                                } else {
                                    self.debugger.remove_breakpoint_at_addr(addr)
                                }
                            }
                            Err(_) => Err(Error::FunctionNotFound(name)),
                        }
                    }
                    other => other,
                }
            }
        };

        if let Err(e) = result {
            self.report_error(e);
        }
    }

    fn handle_print(&mut self, target: ValueTarget, filter: Option<ValueFilter>) {
        match target {
            ValueTarget::Register(name) => match self.debugger.read_register(&name) {
                Ok(value) => println!("{:>8} {}", name, value.render(filter)),
                Err(e) => self.report_error(e),
            },
            ValueTarget::Address(addr) => match self.debugger.read_memory_value(addr) {
                Ok(value) => println!("{:>8} {}", "", value.render(filter)),
                Err(e) => self.report_error(e),
            },
            ValueTarget::Variable(name) => match self.debugger.read_variable(&name) {
                Ok(value) => {
                    println!("{:>8} {}{}", "", value.render(filter), decl_suffix(&value))
                }
                Err(e) => self.report_variable_error(e),
            },
        }
    }

    fn handle_set(&mut self, target: ValueTarget, literal: &str, filter: Option<ValueFilter>) {
        let echo = |value: &TypedValue| match filter {
            Some(filter) => value.render(Some(filter)),
            None => value.render_as_literal(literal),
        };

        match target {
            ValueTarget::Register(name) => match self.debugger.write_register(&name, literal) {
                Ok(value) => println!("{:>8} {} (read after write)", name, echo(&value)),
                Err(e) => self.report_error(e),
            },
            ValueTarget::Address(addr) => match self.debugger.write_memory_value(addr, literal) {
                Ok(value) => println!("{:>8} {} (read after write)", "", echo(&value)),
                Err(e) => self.report_error(e),
            },
            ValueTarget::Variable(name) => match self.debugger.write_variable(&name, literal) {
                Ok(value) => println!(
                    "{:>8} {} (read after write){}",
                    "",
                    echo(&value),
                    decl_suffix(&value)
                ),
                Err(e) => self.report_variable_error(e),
            },
        }
    }

    fn handle_backtrace(&mut self) {
        let unwind = match self.debugger.backtrace() {
            Ok(unwind) => unwind,
            Err(e) => return self.report_error(e),
        };

        if unwind.frame_pointer_omitted {
            println!(
                "{} it seems like this executable doesn't maintain a frame pointer.",
                print::warn_prefix()
            );
            println!("      This results in incorrect or incomplete backtraces.");
            println!(
                "{} Try to compile again with `-fno-omit-frame-pointer`.",
                print::hint_prefix()
            );
            println!();
        }

        println!("How did we even get here? (backtrace)");
        for frame in unwind.frames.iter().rev() {
            println!("  {} {}", frame.ip, frame.symbol());
        }
    }

    /// A bareword that is not a variable but looks like a register deserves
    /// a hint before the error.
    fn report_variable_error(&self, e: Error) {
        if let Error::VariableNotFound(ref name) = e {
            if Register::from_str(name).is_ok() {
                println!(
                    "{} The variable name '{name}' is also the name of a register",
                    print::warn_prefix()
                );
                println!(
                    "{} All register names start with a '%'. Use '%{name}' to access the '{name}' register instead",
                    print::hint_prefix()
                );
            }
        }
        self.report_error(e);
    }

    fn report_error(&self, e: impl Display) {
        println!("{} {e}", print::err_prefix());
    }
}

fn decl_suffix(value: &TypedValue) -> String {
    match &value.decl {
        Some((file, line)) => format!(" ({file}:{line})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_lines_carry_the_label_column() {
        // the label column is 8 wide: register names right-aligned, memory
        // and variables blank
        assert_eq!(format!("{:>8} {}", "rip", "x"), "     rip x");
        assert_eq!(format!("{:>8} {}", "", "x"), "         x");
    }

    #[test]
    fn register_names_collide_with_barewords() {
        // the precondition of the WARN/HINT pair on `print rax`
        assert!(Register::from_str("rax").is_ok());
        assert!(Register::from_str("eflags").is_ok());
        assert!(Register::from_str("some_variable").is_err());
    }
}
