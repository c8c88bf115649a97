use fghc::api::{Interpreter, Mode};
use fghc::program::format_process;
use std::process::ExitCode;

fn usage() -> ExitCode {
    eprintln!("usage: fghc <program-file> <query> [--workers N]");
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    fghc::trace::init_subscriber();

    let mut program_path: Option<String> = None;
    let mut query_src: Option<String> = None;
    let mut workers: Option<usize> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--workers" => {
                let Some(n) = args.next().and_then(|n| n.parse().ok()) else {
                    return usage();
                };
                workers = Some(n);
            }
            _ if program_path.is_none() => program_path = Some(arg),
            _ if query_src.is_none() => query_src = Some(arg),
            _ => return usage(),
        }
    }
    let (Some(program_path), Some(query_src)) = (program_path, query_src) else {
        return usage();
    };

    let source = match std::fs::read_to_string(&program_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("fghc: cannot read {program_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let interp = match Interpreter::from_source(&source) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("fghc: {program_path}: {e}");
            return ExitCode::FAILURE;
        }
    };
    let query = match interp.parse_query(&query_src) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("fghc: query: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mode = match workers {
        Some(n) => Mode::Parallel { workers: n },
        None => Mode::SingleThreaded,
    };
    let outcome = match interp.run(query.processes.clone(), mode) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("fghc: {e}");
            return ExitCode::FAILURE;
        }
    };

    for (name, var) in query.vars() {
        println!("{name} = {}", interp.display(&outcome, *var));
    }
    if outcome.deadlocked {
        eprintln!("deadlock: {} process(es) suspended", outcome.suspended.len());
        for p in &outcome.suspended {
            eprintln!("  {}", format_process(p, interp.terms(), interp.symbols()));
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
