use std::process::ExitCode;

fn main() -> ExitCode {
    match ink_planner::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}
