//! Reference benchmark: sums `1..=n` with one thread per worker.
//!
//! Usage: `summation <n>`, worker count from `SWEEP_WORKERS` (default 1).

use std::process::ExitCode;
use std::time::Instant;

use amdahl_sweep::workload::{local_sum, validate_input, WorkerContext, WORKERS_ENV};

fn parse_args() -> Result<(u64, u32), String> {
    let mut args = std::env::args().skip(1);
    let (Some(n), None) = (args.next(), args.next()) else {
        return Err("expected exactly one argument".to_string());
    };
    let n: u64 = n.parse().map_err(|_| format!("not a number: {n}"))?;
    let n = validate_input(n).map_err(|e| e.to_string())?;

    let workers = match std::env::var(WORKERS_ENV) {
        Ok(v) => v
            .parse::<u32>()
            .map_err(|_| format!("{WORKERS_ENV} is not a number: {v}"))?,
        Err(_) => 1,
    };
    if workers == 0 {
        return Err(format!("{WORKERS_ENV} must be positive"));
    }
    Ok((n, workers))
}

fn run(n: u64, workers: u32) -> Result<(), String> {
    let start = Instant::now();

    if workers == 1 {
        let ctx = WorkerContext::new(0, 1).map_err(|e| e.to_string())?;
        let sum = local_sum(ctx, n);
        println!("Total Sum from 1 to {n}: {sum}");
        println!("Serial Run Time (seconds): {:.9}", start.elapsed().as_secs_f64());
        return Ok(());
    }

    let contexts = (0..workers)
        .map(|rank| WorkerContext::new(rank, workers))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    let total = std::thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .iter()
            .map(|&ctx| {
                scope.spawn(move || {
                    let sum = local_sum(ctx, n);
                    println!(
                        "MPI run time for rank {}: {:.9} seconds",
                        ctx.rank(),
                        start.elapsed().as_secs_f64()
                    );
                    sum
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<Result<Vec<i64>, _>>()
            .map(|sums| sums.iter().sum::<i64>())
            .map_err(|_| "worker thread panicked".to_string())
    })?;

    println!("Summation from 1 to {n} is: {total}");
    Ok(())
}

fn main() -> ExitCode {
    let result = parse_args().and_then(|(n, workers)| run(n, workers));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("Usage: summation <number>\n{msg}");
            ExitCode::FAILURE
        }
    }
}
