//! frontkit - Command-line tool for building static front-end sites

use std::process::ExitCode;

use frontkit::cli;

fn main() -> ExitCode {
    cli::run()
}
