use std::{env, fs, process::ExitCode, time::Instant};

use ember::{Cell, EvalOutcome, Runner, RunProgress};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    let file_path = if args.len() > 1 { &args[1] } else { "example.reb" };
    let code = match read_file(file_path) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let cells = match demo_cells(&code) {
        Ok(cells) => cells,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut runner = Runner::new();
    let start = Instant::now();
    match runner.pump(cells) {
        RunProgress::Complete(EvalOutcome::Value(value)) => {
            let elapsed = start.elapsed();
            let interner = runner.interpreter_mut().interner();
            eprintln!("success after: {elapsed:?}\n{}", value.spell(interner));
            ExitCode::SUCCESS
        }
        RunProgress::Complete(EvalOutcome::Thrown { label, value }) => {
            let elapsed = start.elapsed();
            let interner = runner.interpreter_mut().interner();
            eprintln!(
                "uncaught throw after: {elapsed:?}\nlabel: {:?}\nvalue: {}",
                label.map(|l| l.spell(interner)),
                value.spell(interner)
            );
            ExitCode::FAILURE
        }
        RunProgress::Complete(EvalOutcome::Error(err)) => {
            let elapsed = start.elapsed();
            eprintln!("error after: {elapsed:?}\n{err}");
            ExitCode::FAILURE
        }
    }
}

/// Parses the CLI's tiny integer-literal demo format: the source file holds
/// one decimal integer, evaluated as a single self-evaluating `Cell`.
///
/// Source-text parsing (`LOAD`) is an out-of-scope collaborator; this stand-in
/// keeps the binary runnable end to end without pulling in a full reader.
fn demo_cells(code: &str) -> Result<Vec<Cell>, String> {
    let trimmed = code.trim();
    let value: i64 = trimmed
        .parse()
        .map_err(|_| format!("expected a single integer literal, got {trimmed:?}"))?;
    Ok(vec![Cell::integer(value)])
}

fn read_file(file_path: &str) -> Result<String, String> {
    eprintln!("Reading file: {file_path}");
    match fs::metadata(file_path) {
        Ok(metadata) => {
            if !metadata.is_file() {
                return Err(format!("Error: {file_path} is not a file"));
            }
        }
        Err(err) => {
            return Err(format!("Error reading {file_path}: {err}"));
        }
    }
    match fs::read_to_string(file_path) {
        Ok(contents) => Ok(contents),
        Err(err) => Err(format!("Error reading file: {err}")),
    }
}
