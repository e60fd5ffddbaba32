//! Crash Sync CLI
//!
//! `crash-sync` follows a live game stream and logs what a client would
//! show; `crash-sync verify <seed>` recomputes a round offline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crash_sync::{
    audit_round,
    game::{RoundPhase, Tier},
    ClientConfig, SessionHandle, VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "crash-sync", version, about = "Crash game stream follower and fairness verifier")]
struct Cli {
    /// Override the stream URL (otherwise CRASH_WS_URL or the default).
    #[arg(long)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompute hash and crash point for a revealed seed.
    Verify {
        /// Revealed server seed.
        seed: String,
        /// Commitment hash published before the round.
        hash: Option<String>,
        /// Crash multiplier broadcast for the round.
        multiplier: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Verify {
            seed,
            hash,
            multiplier,
        }) => run_verify(&seed, hash.as_deref(), multiplier),
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();
            run_follow(cli.url).await
        }
    }
}

fn run_verify(seed: &str, hash: Option<&str>, multiplier: Option<f64>) -> Result<()> {
    let report = audit_round(seed, hash, multiplier);
    let v = &report.verification;

    println!("seed         {}", seed);
    println!("sha256       {}", v.hash);
    println!("hex prefix   {}", v.hex_prefix);
    println!("decimal      {}", v.decimal);
    println!("crash point  {:.2}x", v.crash_point);
    if let Some(ok) = report.hash_matches {
        println!("hash         {}", if ok { "MATCH" } else { "MISMATCH" });
    }
    if let Some(ok) = report.crash_point_matches {
        println!("multiplier   {}", if ok { "MATCH" } else { "MISMATCH" });
    }

    if !report.is_consistent() {
        anyhow::bail!("round does not verify");
    }
    Ok(())
}

async fn run_follow(url: Option<String>) -> Result<()> {
    let mut config = ClientConfig::from_env().context("reading configuration")?;
    if let Some(url) = url {
        config.url = url;
    }

    info!("Crash Sync v{}", VERSION);
    info!("Stream: {}", config.url);
    info!(
        "Growth model v{} (rate {}/ms)",
        config.growth.version, config.growth.rate_per_ms
    );

    let session = SessionHandle::start(config);
    let mut updates = session.subscribe();
    let (frame_loop, _frames) = session.spawn_frame_loop();

    let mut last_phase = RoundPhase::Waiting;
    let mut last_connected = false;
    let mut last_verified: Option<String> = None;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let snapshot = match update {
                    Ok(s) => s,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Skipped {} snapshots", n);
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };

                if snapshot.connection.connected != last_connected {
                    last_connected = snapshot.connection.connected;
                    if last_connected {
                        info!("Connected");
                    } else {
                        warn!("Disconnected (attempt {})", snapshot.connection.attempt);
                    }
                }

                if snapshot.phase != last_phase {
                    last_phase = snapshot.phase;
                    match snapshot.phase {
                        RoundPhase::Waiting => info!(
                            "Waiting, next round in {}s, commitment {}",
                            snapshot.time_left,
                            snapshot.current_hash.as_deref().unwrap_or("-")
                        ),
                        RoundPhase::Flying => info!("Flying, {} bets", snapshot.bets.len()),
                        RoundPhase::Crashed => {
                            let tier = Tier::of(snapshot.multiplier);
                            info!("Crashed at {:.2}x ({:?})", snapshot.multiplier, tier);
                        }
                    }
                }

                // Check each revealed round once
                let latest = snapshot.history.first();
                if let Some(seed) = latest.and_then(|e| e.seed.clone()) {
                    if last_verified.as_deref() != Some(seed.as_str()) {
                        let commitment = latest.and_then(|e| e.commitment.as_deref());
                        let report = audit_round(&seed, commitment, latest.map(|e| e.multiplier));
                        if report.is_consistent() {
                            info!(
                                "Round verified: {:.2}x (commitment {})",
                                report.verification.crash_point,
                                if report.hash_matches.is_some() { "checked" } else { "not seen" }
                            );
                        } else {
                            warn!(
                                "Round does NOT verify: hash match {:?}, broadcast {:?}, recomputed {:.2}",
                                report.hash_matches,
                                latest.map(|e| e.multiplier),
                                report.verification.crash_point
                            );
                        }
                        last_verified = Some(seed);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session.shutdown().await;
    let _ = frame_loop.await;
    Ok(())
}
