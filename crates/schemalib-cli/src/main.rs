use std::process::ExitCode;

fn main() -> ExitCode {
    schemalib_cli::run()
}
