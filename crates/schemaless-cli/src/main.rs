use std::env;
use std::process::ExitCode;

use schemaless_engine::{sweep, Engine, EngineOptions};
use schemaless_store::SqliteConnection;

struct Args {
    db_path: String,
    /// Which `added_id` to start at, inclusive (matches `batch.py`'s
    /// `--start-added-id`). `sweep()` itself takes an exclusive lower bound,
    /// so this gets converted at the call site.
    start_added_id: i64,
    batch_size: usize,
}

fn parse_args() -> Result<Args, String> {
    let mut db_path = None;
    let mut start_added_id = 0i64;
    let mut batch_size = 100usize;

    let mut argv = env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--db" => {
                db_path = Some(argv.next().ok_or("--db requires a path")?);
            }
            "--start-added-id" => {
                let v = argv.next().ok_or("--start-added-id requires a value")?;
                start_added_id = v.parse().map_err(|_| "--start-added-id must be an integer".to_string())?;
            }
            "--batch-size" => {
                let v = argv.next().ok_or("--batch-size requires a value")?;
                batch_size = v.parse().map_err(|_| "--batch-size must be a positive integer".to_string())?;
            }
            other => return Err(format!("unrecognized argument: {other}")),
        }
    }

    Ok(Args {
        db_path: db_path.ok_or("--db <path> is required")?,
        start_added_id,
        batch_size,
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let args = match parse_args() {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("schemaless-sweep: {msg}");
            eprintln!(
                "usage: schemaless-sweep --db <path> [--start-added-id N] [--batch-size N]"
            );
            return ExitCode::FAILURE;
        }
    };

    let conn = match SqliteConnection::open(&args.db_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("schemaless-sweep: failed to open {}: {e}", args.db_path);
            return ExitCode::FAILURE;
        }
    };
    let engine = match Engine::new(conn, EngineOptions::default()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("schemaless-sweep: failed to start engine: {e}");
            return ExitCode::FAILURE;
        }
    };

    // --start-added-id is an inclusive lower bound; sweep()'s start_after is exclusive.
    let start_after = args.start_added_id.saturating_sub(1);
    let (summary, result) = sweep(&engine, start_after, Some(args.batch_size), |_added_id, _entity| Ok(()));

    tracing::info!(
        rows_processed = summary.rows_processed,
        last_added_id = summary.last_added_id,
        "sweep finished"
    );

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("schemaless-sweep: {e}");
            ExitCode::FAILURE
        }
    }
}
