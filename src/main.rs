use std::process::ExitCode;

fn main() -> ExitCode {
    j2me_rs::run_cli()
}
