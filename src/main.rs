use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use meetcall::token::{PrivilegeExpiry, unix_now};
use meetcall::{AccessToken, PrivilegeGrant, PrivilegeKind};

// Mint and check room access tokens from the command line.
//
// Usage:
//   meetcall token issue --app-id APP --app-key KEY --room call_1_alice --user alice
//   meetcall token issue ... --ttl 600 --subscribe-only
//   meetcall token verify --app-key KEY <TOKEN>
//   meetcall token inspect <TOKEN>

#[derive(Parser, Debug)]
#[command(name = "meetcall", version, about = "Room access token tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Access token operations
    #[command(subcommand)]
    Token(TokenCommand),
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    /// Issue a signed token
    Issue(IssueArgs),
    /// Check a token's expiry and signature
    Verify {
        #[arg(long, env = "MEETCALL_APP_KEY")]
        app_key: String,
        token: String,
    },
    /// Decode a token without checking it
    Inspect { token: String },
}

#[derive(Args, Debug)]
struct IssueArgs {
    #[arg(long, env = "MEETCALL_APP_ID")]
    app_id: String,
    #[arg(long, env = "MEETCALL_APP_KEY")]
    app_key: String,
    #[arg(long)]
    room: String,
    #[arg(long)]
    user: String,
    /// Token lifetime in seconds
    #[arg(long, default_value_t = 3600)]
    ttl: u64,
    /// Grant only SubscribeStream
    #[arg(long)]
    subscribe_only: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{:<5}] [{}] - {}",
                Local::now().format("%H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Token(TokenCommand::Issue(args)) => issue(args),
        Command::Token(TokenCommand::Verify { app_key, token }) => verify(&app_key, &token),
        Command::Token(TokenCommand::Inspect { token }) => {
            let token = AccessToken::parse(&token).context("failed to parse token")?;
            print_token(&token);
            Ok(())
        }
    }
}

fn issue(args: IssueArgs) -> anyhow::Result<()> {
    let ttl = Duration::from_secs(args.ttl);
    let grants = if args.subscribe_only {
        vec![PrivilegeGrant::unbounded(PrivilegeKind::SubscribeStream)]
    } else {
        PrivilegeGrant::call_participant(ttl)
    };
    let token = AccessToken::issue(
        &args.app_id,
        args.app_key.as_bytes(),
        &args.room,
        &args.user,
        ttl,
        &grants,
    )
    .context("failed to issue token")?;

    info!(
        "Issued token for {} in {} (expires {})",
        token.user_id(),
        token.room_id(),
        fmt_unix(token.expires_at())
    );
    println!("{}", token.serialize());
    Ok(())
}

fn verify(app_key: &str, raw: &str) -> anyhow::Result<()> {
    let token = AccessToken::parse(raw).context("failed to parse token")?;
    match token.verify(app_key.as_bytes(), unix_now()) {
        Ok(()) => {
            println!("valid");
            print_token(&token);
            Ok(())
        }
        Err(e) => {
            warn!("Token for {} rejected: {e}", token.user_id());
            bail!("token rejected: {e}")
        }
    }
}

fn print_token(token: &AccessToken) {
    println!("app:       {}", token.app_id());
    println!("room:      {}", token.room_id());
    println!("user:      {}", token.user_id());
    println!("issued:    {}", fmt_unix(token.issued_at()));
    println!("expires:   {}", fmt_unix(token.expires_at()));
    println!("signature: {}", token.signature_hex());
    for (kind, expiry) in token.privileges() {
        match expiry {
            PrivilegeExpiry::Unbounded => println!("  {kind}: token lifetime"),
            PrivilegeExpiry::At(at) => println!("  {kind}: until {}", fmt_unix(*at)),
        }
    }
}

fn fmt_unix(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::<Utc>::from_timestamp(s, 0))
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}
