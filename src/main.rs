use std::fs;
use clap::Parser;
use colored::*;
use dotenv::dotenv;
use tokio::sync::oneshot;

mod macros;
mod tools;
mod config;
mod cloudwatch;
mod series;
mod charts;
mod report;
mod analysis;
mod artifact;

use crate::analysis::{poll, prompt_for, submit, AnalysisPayload, HttpAnalysisApi};
use crate::artifact::{extract_code_block, SandboxRunner};
use crate::cloudwatch::{CloudWatchSource, Window};
use crate::config::Config;
use crate::report::ReportAssembler;
use crate::tools::{spinning_gears, ReportError};

///Builds a comprehensive CloudWatch metrics report (RDS + MSK Kafka) as HTML charts
///plus a structured JSON dataset, submits the dataset to an AI analysis endpoint,
///and compiles & runs the Java visualization program the analysis returns.
///AWS and endpoint credentials are loaded from the environment / .env file.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
struct Args {
    ///Kafka cluster name to report on
    #[clap(short, long, default_value = "NO")]
    cluster: String,

    ///RDS DB instance identifier to report on
    #[clap(short, long, default_value = "NO")]
    db_instance: String,

    ///Start of the report window, RFC 3339 (for example 2025-01-01T00:00:00Z)
    #[clap(short, long)]
    start: String,

    ///End of the report window, RFC 3339
    #[clap(short, long)]
    end: String,

    ///Analysis to request: performance, stability, anomalies, capacity or custom
    #[clap(short, long, default_value = "stability")]
    analysis_type: String,

    ///Your own analysis instruction; required when --analysis-type=custom
    #[clap(long, default_value = "")]
    custom_prompt: String,

    ///Only build the report, skip the AI analysis and sandbox run
    #[clap(long)]
    no_analyze: bool,

    ///Suppress terminal output but still write the summary file
    #[clap(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    println!(
        "{}{}",
        "CLOUDLENS v".bright_yellow(),
        env!("CARGO_PKG_VERSION").bright_yellow()
    );
    dotenv().ok();
    if let Err(e) = run(args).await {
        eprintln!("{} {}", "Error:".bright_red(), e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), ReportError> {
    let config = Config::load()?;
    let window = Window::parse(&args.start, &args.end)?;
    let cluster = (args.cluster != "NO").then(|| args.cluster.clone());
    let db_instance = (args.db_instance != "NO").then(|| args.db_instance.clone());

    let source = CloudWatchSource::new(&config.aws);
    let assembler = ReportAssembler::new(&source, &config.roles, &config.chart_timezone, args.quiet);
    let outcome = assembler
        .assemble(cluster.as_deref(), db_instance.as_deref(), window, ".")
        .await?;
    if !args.quiet {
        println!("\n📁 Report directory: {}", outcome.report_dir.bright_cyan());
    }

    if args.no_analyze {
        return Ok(());
    }

    let prompt = prompt_for(&args.analysis_type, &args.custom_prompt)?;
    let payload = AnalysisPayload::vector_data(&config.ai, &outcome.dataset_json, &prompt);
    let api = HttpAnalysisApi::new(&config.ai);

    if !args.quiet {
        println!("🧠 Submitting {} analysis...", args.analysis_type);
    }
    let task_id = submit(&api, &payload).await?;

    let (spinner_tx, spinner_rx) = oneshot::channel();
    let spinner = if args.quiet {
        None
    } else {
        Some(tokio::spawn(spinning_gears(spinner_rx)))
    };

    //ctrl-c abandons the wait, not the whole process state
    let (cancel_tx, cancel_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(());
        }
    });

    let polled = poll(&api, &task_id, &config.ai.poll, cancel_rx).await;
    let _ = spinner_tx.send(());
    if let Some(handle) = spinner {
        let _ = handle.await;
    }
    let analysis_text = polled?;

    let response_path = format!("{}/analysis_response.md", outcome.report_dir);
    fs::write(&response_path, &analysis_text)?;
    if !args.quiet {
        println!("📝 Analysis saved to {}", response_path.bright_cyan());
    }

    match extract_code_block(&analysis_text) {
        Some(code) => {
            let runner = SandboxRunner::new(config.sandbox.clone());
            let sandbox = runner
                .run(&code, &outcome.dataset_json, &outcome.report_dir)
                .await?;
            if !args.quiet {
                println!("{}", sandbox.describe());
            }
        }
        None => {
            if !args.quiet {
                println!("No ```java code block found in the analysis response, skipping the sandbox run");
            }
        }
    }
    Ok(())
}
