use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use port_scan_rs::config::{self, Cli};
use port_scan_rs::probe::TcpProber;
use port_scan_rs::progress::ProgressReporter;
use port_scan_rs::resolve;
use port_scan_rs::scanner::{self, ScanContext};
use port_scan_rs::types::{PortResult, ScanSummary, ScanTarget};

use ::time::{format_description::well_known, OffsetDateTime};
use anyhow::{Context, Result};
use clap::Parser;
use log::info;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(config::exit_code(&e));
        }
    };

    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let addr = resolve::resolve_target(&cli.target).await?;
    let target = cli.scan_target(addr)?;
    let prober = TcpProber::new(cli.probe_options(&target)).context("building TCP prober")?;

    if !cli.json {
        print_header(&target);
    }
    info!(
        "scanning {} ({}) ports {}-{}",
        target.host, target.addr, target.start_port, target.end_port
    );

    let ctx = ScanContext::new();
    scanner::cancel_on_ctrl_c(ctx.clone());

    let reporter = if cli.json || cli.no_progress {
        ProgressReporter::hidden(ctx.clone(), target.port_count())
    } else {
        ProgressReporter::start(ctx.clone(), target.port_count())
    };

    let started = Instant::now();
    let mut stream = scanner::run_scan(&target, Arc::new(prober), ctx.clone());
    while let Some(result) = stream.next().await {
        if result.is_open() || cli.closed {
            reporter.println(render_result(&result, cli.json)?);
        }
    }
    reporter.finish().await;

    let summary = scanner::summarize(&target, &ctx, started);
    if cli.json {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({ "summary": summary }))?
        );
    } else {
        print_footer(&summary);
    }
    Ok(())
}

fn render_result(result: &PortResult, json: bool) -> Result<String> {
    if json {
        Ok(serde_json::to_string(result)?)
    } else {
        Ok(result.to_string())
    }
}

fn print_header(target: &ScanTarget) {
    if target.host == target.addr.to_string() {
        println!("Scanning target: {}", target.host);
    } else {
        println!("Scanning target: {} ({})", target.host, target.addr);
    }
    println!("Time started: {}", now_rfc3339());
    println!("Port range: {} - {}", target.start_port, target.end_port);
    println!("TLS enabled: {}", target.tls);
    println!("Concurrency: {}", target.concurrency);
    println!("Scanning {} ports...", target.port_count());
}

fn print_footer(summary: &ScanSummary) {
    println!("Time finished: {}", now_rfc3339());
    println!("{summary}");
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
