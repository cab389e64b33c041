//! HTTP-Ping - Main CLI Application
//!
//! Repeatedly measures an HTTP/S target and prints per-request latency, an
//! optional phase breakdown and a final summary.

use clap::Parser;
use http_pinger::{
    cli::Cli,
    config::{display_config_summary, load_config, load_env_file},
    error::Result,
    output::{OutputFormatter, Verbosity},
    Measurer, PingStatistics, Pinger, RuntimeConfig, PKG_NAME, VERSION,
};
use std::io::Write;
use std::process;

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        process::exit(99);
    }));

    if let Err(e) = load_env_file() {
        eprintln!("{}", e.format_for_console(false));
        process::exit(e.exit_code());
    }

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    match run_application(cli).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}", e.format_for_console(use_color));
            process::exit(e.exit_code());
        }
    }
}

/// Run the pings and return the process exit code
async fn run_application(cli: Cli) -> Result<i32> {
    if !cli.use_colors() {
        colored::control::set_override(false);
    }

    let config = load_config(&cli)?;
    if cli.debug {
        println!("{} v{}", PKG_NAME, VERSION);
        println!("{}", display_config_summary(&config));
        println!();
    }

    let formatter = OutputFormatter::new(cli.use_colors(), cli.verbosity()).with_audible_bell(cli.audible_bell);

    let redirect_formatter = formatter.clone();
    let runtime = RuntimeConfig::new().on_redirect(move |url| {
        print!("{}", redirect_formatter.redirect(url));
    });

    let pinger = Pinger::new(config.clone(), runtime).await?;
    print!("{}", formatter.banner(&pinger.url(), &config.method));

    let mut run = pinger.ping();
    let token = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });

    let mut stats = PingStatistics::new();
    let mut stdout = std::io::stdout();
    while let Some(measure) = run.next().await {
        let _ = write!(stdout, "{}", formatter.measure(stats.attempts(), &measure));
        let _ = stdout.flush();
        stats.record(&measure);
    }

    let client = run.finish().await?;
    if formatter.verbosity() != Verbosity::Verbose {
        println!();
    }
    print!("{}", formatter.summary(&client.url(), &stats));

    Ok(if stats.answers() > 0 { 0 } else { 1 })
}
