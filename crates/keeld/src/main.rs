use std::process::ExitCode;

fn main() -> ExitCode {
    match keeld::run_daemon() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("keeld: {error}");
            ExitCode::FAILURE
        }
    }
}
