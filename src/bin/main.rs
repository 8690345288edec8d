//! KaspaTip CLI - fee math, address checks, and a full simulated tip
//!
//!   kaspatip fee <amount>            → {"amount": "10", "fee": "0.01000000", ...}
//!   kaspatip validate <address>      → {"valid": true}
//!   kaspatip format <address>        → {"display": "kaspa:qzqp7l...tf6m"}
//!   kaspatip simulate --to <addr> --amount <kas> [--note <text>]
//!
//! `simulate` drives the real session adapter and send flow against an
//! in-memory wallet, with scripted provider behavior:
//!   --truncated        primary sendKaspa fails with a truncated JSON reply
//!   --reject <msg>     primary sendKaspa rejects with <msg>
//!   --fee-fail         fee sendKaspa rejects
//!   --inject-after <n> wallet appears after <n> detection ticks
//!   --tick-ms <ms>     detection tick and reset delay base (env: KASPATIP_TICK_MS)
//!
//! Output format:
//!   --json     Output raw JSON (default for non-tty)
//!   --pretty   Pretty-print JSON (default for tty)

use anyhow::{anyhow, bail, Context};
use kaspatip::address::check_address;
use kaspatip::logging::{init_logging, LogFormat};
use kaspatip::provider::Method;
use kaspatip::runtime::{reset_after, watch_for_provider};
use kaspatip::{
    fee_preview, install_signal_handlers, short_address, Amount, MemoryHost, MemoryProvider, ProviderError,
    TipApp, TipConfig, TransferRequest,
};
use serde_json::{json, Value};
use std::env;
use std::io::IsTerminal;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

/// Account held by the simulated wallet.
const SIM_ACCOUNT: &str = "kaspa:qypr7ayn2hvzr2d9ny0gd5qjy7ufkqpe4z5ddrvvqv3nq8h0xkw9sckkx7rm4";

fn main() {
    init_logging(LogFormat::from_env());

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.help {
        print_usage();
        return;
    }

    if opts.version {
        println!("kaspatip {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = match opts.command.as_deref() {
        Some("fee") => cmd_fee(&opts),
        Some("validate") => cmd_validate(&opts),
        Some("format") => cmd_format(&opts),
        Some("simulate") | Some("sim") => cmd_simulate(&opts),
        Some(cmd) => Err(anyhow!("Unknown command: {}", cmd)),
        None => {
            print_usage();
            return;
        }
    };

    let pretty = !opts.json && (opts.pretty || std::io::stdout().is_terminal());
    match result {
        Ok(output) => println!("{}", render(&output, pretty)),
        Err(e) => {
            eprintln!("{}", render(&json!({"error": format!("{:#}", e)}), pretty));
            std::process::exit(1);
        }
    }
}

fn render(value: &Value, pretty: bool) -> String {
    let rendered = if pretty { serde_json::to_string_pretty(value) } else { serde_json::to_string(value) };
    rendered.unwrap_or_else(|_| value.to_string())
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    target: Option<String>,
    // Simulation options
    to: Option<String>,
    amount: Option<String>,
    note: Option<String>,
    truncated: bool,
    reject: Option<String>,
    fee_fail: bool,
    inject_after: Option<u32>,
    tick_ms: Option<u64>,
    // Output options
    json: bool,
    pretty: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        // Load .env file if present
        if let Ok(contents) = std::fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let value = value.trim().trim_matches('"');
                    if !value.is_empty() && env::var(key.trim()).is_err() {
                        env::set_var(key.trim(), value);
                    }
                }
            }
        }

        let mut opts = ParsedArgs::default();
        let mut positional = Vec::new();
        let mut i = 0;

        while i < args.len() {
            let arg = &args[i];
            let value = args.get(i + 1).cloned();
            match arg.as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--json" => opts.json = true,
                "--pretty" => opts.pretty = true,
                "--truncated" => opts.truncated = true,
                "--fee-fail" => opts.fee_fail = true,
                "--to" | "-t" if value.is_some() => {
                    opts.to = value;
                    i += 1;
                }
                "--amount" | "-a" if value.is_some() => {
                    opts.amount = value;
                    i += 1;
                }
                "--note" | "-n" if value.is_some() => {
                    opts.note = value;
                    i += 1;
                }
                "--reject" if value.is_some() => {
                    opts.reject = value;
                    i += 1;
                }
                "--inject-after" if value.is_some() => {
                    opts.inject_after = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                "--tick-ms" if value.is_some() => {
                    opts.tick_ms = value.and_then(|v| v.parse().ok());
                    i += 1;
                }
                _ if !arg.starts_with('-') => positional.push(arg.clone()),
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        // First positional is command, second its target
        if !positional.is_empty() {
            opts.command = Some(positional.remove(0));
        }
        if !positional.is_empty() {
            opts.target = Some(positional.remove(0));
        }

        // Environment (lower priority than CLI args)
        if opts.tick_ms.is_none() {
            opts.tick_ms = env::var("KASPATIP_TICK_MS").ok().and_then(|s| s.parse().ok());
        }
        if opts.to.is_none() {
            opts.to = env::var("KASPATIP_RECIPIENT").ok().filter(|s| !s.is_empty());
        }

        opts
    }
}

fn print_usage() {
    println!(
        r#"kaspatip - tip Kaspa through the Kasware wallet (0.1% developer fee)

USAGE:
    kaspatip <command> [target] [options]

COMMANDS:
    fee <amount>            Fee and preview for an amount in KAS
    validate <address>      Syntax-check a recipient address
    format <address>        Shortened display form of an address
    simulate                Run a full tip against an in-memory wallet

SIMULATE OPTIONS:
    --to, -t <address>      Recipient (env: KASPATIP_RECIPIENT)
    --amount, -a <kas>      Amount in KAS
    --note, -n <text>       Optional note
    --truncated             Wallet reply to the transfer is truncated JSON
    --reject <message>      Wallet rejects the transfer
    --fee-fail              Wallet rejects the fee transfer
    --inject-after <n>      Wallet appears after n detection ticks
    --tick-ms <ms>          Detection tick in ms (default: 1000, env: KASPATIP_TICK_MS)

OUTPUT OPTIONS:
    --json                  Raw JSON output
    --pretty                Pretty-print JSON

LOGGING:
    RUST_LOG=debug          Verbose logs on stderr
    KASPATIP_LOG_JSON=1     JSON log lines

EXAMPLES:
    kaspatip fee 10
    kaspatip simulate --to kaspa:qz... --amount 10 --note thanks
    kaspatip simulate --to kaspa:qz... --amount 1 --truncated --json | jq .outcome"#
    );
}

fn cmd_fee(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let input = opts.target.as_deref().context("Usage: kaspatip fee <amount>")?;
    let config = TipConfig::default();
    let amount = Amount::parse(input).context("Invalid amount")?;
    let fee = config.fee.fee_for(amount);

    Ok(json!({
        "amount": amount.to_string(),
        "fee": fee.to_fixed(),
        "fee_sompi": fee.sompi(),
        "rate": config.fee.rate_display(),
        "fee_address": config.fee.address,
        "preview": fee_preview(&config.fee, input),
    }))
}

fn cmd_validate(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let address = opts.target.as_deref().context("Usage: kaspatip validate <address>")?.trim();
    let rules = TipConfig::default().address;
    Ok(match check_address(&rules, address) {
        Ok(()) => json!({"address": address, "valid": true}),
        Err(issue) => json!({"address": address, "valid": false, "issue": format!("{:?}", issue)}),
    })
}

fn cmd_format(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let address = opts.target.as_deref().context("Usage: kaspatip format <address>")?;
    Ok(json!({"address": address, "display": short_address(address)}))
}

fn cmd_simulate(opts: &ParsedArgs) -> anyhow::Result<Value> {
    let to = opts.to.clone().context("simulate requires --to <address>")?;
    let amount = opts.amount.clone().context("simulate requires --amount <kas>")?;
    let tick = Duration::from_millis(opts.tick_ms.unwrap_or(1000));
    let config = TipConfig::default().with_poll_interval(tick).with_reset_delay(tick * 5);

    let provider = Rc::new(MemoryProvider::new().with_accounts(&[SIM_ACCOUNT]));
    if opts.truncated {
        provider.fail_next(Method::SendKaspa, ProviderError::new("Unexpected end of JSON input"));
    } else if let Some(message) = opts.reject.as_deref() {
        provider.fail_next(Method::SendKaspa, ProviderError::new(message).with_stack("at sendKaspa (simulated)"));
    } else if opts.fee_fail {
        provider.respond_next(Method::SendKaspa, json!({"txid": "simulated-primary"}));
    }
    if opts.fee_fail {
        provider.fail_next(Method::SendKaspa, ProviderError::new("Fee transfer declined"));
    }

    let host = Rc::new(match opts.inject_after {
        Some(_) => MemoryHost::new(),
        None => MemoryHost::with_provider(Rc::clone(&provider)),
    });
    let app = TipApp::new(host.clone(), config);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create runtime")?;

    rt.block_on(async {
        let shutdown = install_signal_handlers();

        if !app.start().await {
            let ticks = opts.inject_after.unwrap_or(0);
            let inject = async {
                tokio::time::sleep(tick * ticks).await;
                info!(ticks, "wallet injected");
                host.inject(Rc::clone(&provider));
            };
            let (_, found) = tokio::join!(inject, watch_for_provider(&app, &shutdown));
            if !found {
                bail!("Wallet never appeared");
            }
        }

        let address = app.connect().await.context("Connecting the simulated wallet failed")?;
        info!(address = %short_address(&address), "wallet connected");

        let mut request = TransferRequest::new(to, amount);
        if let Some(note) = opts.note.clone() {
            request = request.with_note(note);
        }
        let submitted = app.submit(request).await;
        let state = app.state();
        debug!(status = state.status.as_str(), "submission settled");

        let reset = tokio::select! {
            reset = reset_after(&app, &submitted) => reset,
            _ = async { let _ = shutdown.subscribe().recv().await; } => false,
        };

        let calls: Vec<Value> = provider
            .calls()
            .into_iter()
            .map(|(method, args)| json!({"method": method.as_str(), "args": args}))
            .collect();

        let error = state.error_message();
        Ok::<Value, anyhow::Error>(json!({
            "connected": address,
            "outcome": submitted.outcome,
            "state": state,
            "error": error,
            "reset_to_idle": reset,
            "lookups": host.lookups(),
            "calls": calls,
        }))
    })
}
