use std::process::ExitCode;

fn main() -> ExitCode {
    match kas_alias::run_from_args(std::env::args().skip(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("kas_alias: {error:#}");
            ExitCode::FAILURE
        }
    }
}
