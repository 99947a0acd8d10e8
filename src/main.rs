//! Debugger application entry point.

use clap::Parser;
use spray::console::{print, AppBuilder};
use spray::debugger::process::Child;

const USAGE: &str = "usage: spray [-c | --no-color] [--] <executable> [<args>...]";

#[derive(Parser, Debug, Clone)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Args {
    /// Suppress ANSI escapes in the output
    #[arg(short = 'c', long = "no-color")]
    no_color: bool,

    /// Executable file (debugee)
    executable: String,

    /// Arguments passed to the debugee
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(_) => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if args.no_color {
        print::disable_color();
    }

    let template = Child::new(&args.executable, args.args);
    let process = match template.install() {
        Ok(process) => process,
        Err(e) => {
            eprintln!("error: {e:#}");
            std::process::exit(1);
        }
    };

    let app = AppBuilder::new()
        .build(process)
        .expect("build application fail");
    app.run().expect("run application fail");
}
