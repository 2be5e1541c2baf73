// Batch evaluation over stdin/stdout.
// Reads a JSON batch request, writes the JSON response. Per-item errors are
// reported in place; only a malformed envelope produces an error response.

use std::io::Read;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use arb_signal_engine::eval::{EvalOptions, EvaluationService};
use arb_signal_engine::{load_config, BatchRequest};

#[derive(Debug, Parser)]
#[command(name = "batch-eval")]
#[command(about = "Evaluate a batch of arbitrage inputs from stdin")]
struct Args {
    /// TOML config profile for evaluation defaults.
    #[arg(long, env = "ENGINE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Pretty-print the response.
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cfg = load_config(args.config.as_deref())?;
    let service = EvaluationService::new(EvalOptions {
        var_cvar: cfg.eval.var_cvar,
        mc_samples: cfg.eval.mc_samples,
        seed: None,
    });

    let mut raw = String::new();
    std::io::stdin().read_to_string(&mut raw)?;

    let request: BatchRequest = match serde_json::from_str(&raw) {
        Ok(r) => r,
        Err(e) => {
            // Malformed envelope: a single error object, non-zero exit.
            println!("{}", serde_json::json!({ "error": e.to_string() }));
            std::process::exit(1);
        }
    };

    let response = service.evaluate_batch(&request);
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{rendered}");
    Ok(())
}
