use crate::debugger::variable::render::ValueFilter;
use std::str::FromStr;

/// Canonical command names, in resolution order: a typed token resolves to
/// the first command it is a prefix of (`s` is step, `se` is set, `b` is
/// break, `ba` is backtrace).
const COMMAND_TABLE: [&str; 11] = [
    "break",
    "delete",
    "continue",
    "step",
    "next",
    "leave",
    "inst",
    "print",
    "set",
    "backtrace",
    "quit",
];

/// Operand of `break`/`delete`.
#[derive(Debug, Clone, PartialEq)]
pub enum BreakpointTarget {
    /// A `0x`-prefixed absolute address.
    Address(usize),
    /// A bareword: a function name, retried as a hex address when no such
    /// function exists.
    Symbol(String),
    /// A `file:line` source position, the file may be a basename.
    Line(String, u64),
}

/// Operand of `print`/`set`.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTarget {
    /// `%`-prefixed register name.
    Register(String),
    /// A `0x`-prefixed absolute address.
    Address(usize),
    /// A source variable, resolved in the current scope.
    Variable(String),
}

#[derive(Debug, PartialEq)]
pub enum Command {
    Break(BreakpointTarget),
    Delete(BreakpointTarget),
    Continue,
    StepInto,
    StepOver,
    StepOut,
    StepInstruction,
    Print {
        target: ValueTarget,
        filter: Option<ValueFilter>,
    },
    Set {
        target: ValueTarget,
        literal: String,
        filter: Option<ValueFilter>,
    },
    Backtrace,
    Quit,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command")]
    UnknownCommand,
    #[error("Missing value to set the location to")]
    MissingSetValue,
    #[error("Trailing characters in command")]
    TrailingCharacters,
    #[error("Invalid filter")]
    InvalidFilter,
    #[error("missing a location the command applies to")]
    MissingOperand,
    #[error("invalid line number in `{0}`")]
    InvalidLineNumber(String),
}

/// Parse a single prompt line into a command.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let [cmd, args @ ..] = tokens.as_slice() else {
        return Err(ParseError::UnknownCommand);
    };

    let canonical = COMMAND_TABLE
        .iter()
        .find(|canonical| canonical.starts_with(cmd))
        .ok_or(ParseError::UnknownCommand)?;

    match *canonical {
        "break" => Ok(Command::Break(parse_breakpoint_target(args)?)),
        "delete" => Ok(Command::Delete(parse_breakpoint_target(args)?)),
        "continue" => no_args(args, Command::Continue),
        "step" => no_args(args, Command::StepInto),
        "next" => no_args(args, Command::StepOver),
        "leave" => no_args(args, Command::StepOut),
        "inst" => no_args(args, Command::StepInstruction),
        "backtrace" => no_args(args, Command::Backtrace),
        "quit" => no_args(args, Command::Quit),
        "print" => {
            let [operand, rest @ ..] = args else {
                return Err(ParseError::MissingOperand);
            };
            Ok(Command::Print {
                target: parse_value_target(operand),
                filter: parse_filter(rest)?,
            })
        }
        "set" => {
            let [operand, rest @ ..] = args else {
                return Err(ParseError::MissingOperand);
            };
            let [literal, rest @ ..] = rest else {
                return Err(ParseError::MissingSetValue);
            };
            Ok(Command::Set {
                target: parse_value_target(operand),
                literal: literal.to_string(),
                filter: parse_filter(rest)?,
            })
        }
        _ => unreachable!("the command table is exhaustive"),
    }
}

fn no_args(args: &[&str], cmd: Command) -> Result<Command, ParseError> {
    if !args.is_empty() {
        return Err(ParseError::TrailingCharacters);
    }
    Ok(cmd)
}

fn parse_filter(rest: &[&str]) -> Result<Option<ValueFilter>, ParseError> {
    match rest {
        [] => Ok(None),
        ["|"] => Err(ParseError::InvalidFilter),
        ["|", name] => ValueFilter::from_str(name)
            .map(Some)
            .map_err(|_| ParseError::InvalidFilter),
        ["|", name, ..] => {
            // report the bad filter first, extra tokens second
            ValueFilter::from_str(name).map_err(|_| ParseError::InvalidFilter)?;
            Err(ParseError::TrailingCharacters)
        }
        _ => Err(ParseError::TrailingCharacters),
    }
}

fn parse_breakpoint_target(args: &[&str]) -> Result<BreakpointTarget, ParseError> {
    let [operand] = args else {
        return Err(if args.is_empty() {
            ParseError::MissingOperand
        } else {
            ParseError::TrailingCharacters
        });
    };

    if let Some((file, line)) = operand.rsplit_once(':') {
        let line = line
            .parse::<u64>()
            .map_err(|_| ParseError::InvalidLineNumber(operand.to_string()))?;
        return Ok(BreakpointTarget::Line(file.to_string(), line));
    }

    if let Some(hex) = operand.strip_prefix("0x") {
        if let Ok(addr) = usize::from_str_radix(hex, 16) {
            return Ok(BreakpointTarget::Address(addr));
        }
    }

    Ok(BreakpointTarget::Symbol(operand.to_string()))
}

fn parse_value_target(operand: &str) -> ValueTarget {
    if let Some(register) = operand.strip_prefix('%') {
        return ValueTarget::Register(register.to_string());
    }
    if let Some(hex) = operand.strip_prefix("0x") {
        if let Ok(addr) = usize::from_str_radix(hex, 16) {
            return ValueTarget::Address(addr);
        }
    }
    ValueTarget::Variable(operand.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_resolve_by_prefix() {
        assert_eq!(parse_command("c").unwrap(), Command::Continue);
        assert_eq!(parse_command("continue").unwrap(), Command::Continue);
        assert_eq!(parse_command("s").unwrap(), Command::StepInto);
        assert_eq!(parse_command("ste").unwrap(), Command::StepInto);
        assert_eq!(parse_command("n").unwrap(), Command::StepOver);
        assert_eq!(parse_command("l").unwrap(), Command::StepOut);
        assert_eq!(parse_command("i").unwrap(), Command::StepInstruction);
        assert_eq!(parse_command("q").unwrap(), Command::Quit);
        // the first command in table order wins a prefix collision
        assert_eq!(
            parse_command("b main").unwrap(),
            Command::Break(BreakpointTarget::Symbol("main".to_string()))
        );
        assert_eq!(parse_command("ba").unwrap(), Command::Backtrace);
        assert!(matches!(parse_command("se a 1").unwrap(), Command::Set { .. }));
        assert_eq!(parse_command("d 0x1:b").is_err(), true);
        assert_eq!(parse_command("xyz"), Err(ParseError::UnknownCommand));
        assert_eq!(parse_command("stepp"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn breakpoint_operand_forms() {
        assert_eq!(
            parse_command("b 0x0040116b").unwrap(),
            Command::Break(BreakpointTarget::Address(0x40116b))
        );
        assert_eq!(
            parse_command("break file1.c:4").unwrap(),
            Command::Break(BreakpointTarget::Line("file1.c".to_string(), 4))
        );
        assert_eq!(
            parse_command("break tests/assets/file1.c:4").unwrap(),
            Command::Break(BreakpointTarget::Line(
                "tests/assets/file1.c".to_string(),
                4
            ))
        );
        // `add` parses as a hex number, but stays a symbol until resolution
        assert_eq!(
            parse_command("b add").unwrap(),
            Command::Break(BreakpointTarget::Symbol("add".to_string()))
        );
        assert_eq!(
            parse_command("d 0x401146").unwrap(),
            Command::Delete(BreakpointTarget::Address(0x401146))
        );
        assert_eq!(parse_command("b"), Err(ParseError::MissingOperand));
        assert_eq!(
            parse_command("b main extra"),
            Err(ParseError::TrailingCharacters)
        );
        assert_eq!(
            parse_command("b file1.c:four"),
            Err(ParseError::InvalidLineNumber("file1.c:four".to_string()))
        );
    }

    #[test]
    fn print_operand_and_filters() {
        assert_eq!(
            parse_command("p %rip").unwrap(),
            Command::Print {
                target: ValueTarget::Register("rip".to_string()),
                filter: None,
            }
        );
        assert_eq!(
            parse_command("print 0x403020").unwrap(),
            Command::Print {
                target: ValueTarget::Address(0x403020),
                filter: None,
            }
        );
        assert_eq!(
            parse_command("p a | bytes").unwrap(),
            Command::Print {
                target: ValueTarget::Variable("a".to_string()),
                filter: Some(ValueFilter::Bytes),
            }
        );
        // the pipe and the filter name are separate tokens
        assert_eq!(
            parse_command("p a |bytes"),
            Err(ParseError::TrailingCharacters)
        );
        assert_eq!(parse_command("p a |"), Err(ParseError::InvalidFilter));
        assert_eq!(
            parse_command("p a | blah-invalid-filter"),
            Err(ParseError::InvalidFilter)
        );
        assert_eq!(
            parse_command("p a | hex extra"),
            Err(ParseError::TrailingCharacters)
        );
    }

    #[test]
    fn set_operand_forms_and_errors() {
        assert_eq!(
            parse_command("set %rbx 0xdeadbeef").unwrap(),
            Command::Set {
                target: ValueTarget::Register("rbx".to_string()),
                literal: "0xdeadbeef".to_string(),
                filter: None,
            }
        );
        assert_eq!(
            parse_command("se a 0x600 | bytes").unwrap(),
            Command::Set {
                target: ValueTarget::Variable("a".to_string()),
                literal: "0x600".to_string(),
                filter: Some(ValueFilter::Bytes),
            }
        );
        assert_eq!(parse_command("se %rax"), Err(ParseError::MissingSetValue));
        assert_eq!(parse_command("se 0x123"), Err(ParseError::MissingSetValue));
        assert_eq!(
            parse_command("se %rax 0xc0ffee 0xbeef"),
            Err(ParseError::TrailingCharacters)
        );
        assert_eq!(
            parse_command("se a 0x10 |hex"),
            Err(ParseError::TrailingCharacters)
        );
        assert_eq!(parse_command("se a 0x10 |"), Err(ParseError::InvalidFilter));
    }

    #[test]
    fn no_arg_commands_reject_operands() {
        assert_eq!(
            parse_command("continue now"),
            Err(ParseError::TrailingCharacters)
        );
        assert_eq!(parse_command("q now"), Err(ParseError::TrailingCharacters));
    }
}
