//! Client for the Re:source campaign runtime.

mod apply;
mod query;
mod reset;

use std::net::SocketAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use esg_resource_runtime::interface::message::{Request, Response};
use esg_resource_runtime::interface::tcp::Client;
use tracing::{info, trace};

use self::apply::Apply;
use self::query::{Get, Rank, Summary};
use self::reset::{Regenerate, Reset};

/// Re:source client
#[derive(Parser, Debug)]
#[command(name = "esg-resource", version, about, long_about = None)]
struct Cli {
    /// Address of the runtime
    #[clap(short, long, env = "RESOURCE_RUNTIME", default_value = "127.0.0.1:4680")]
    addr: SocketAddr,
    /// Print replies as JSON
    #[clap(long)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
enum Commands {
    Apply(Apply),
    Reset(Reset),
    Regenerate(Regenerate),
    Summary(Summary),
    Get(Get),
    Rank(Rank),
    /// List the campaigns of the runtime
    Campaigns,
}

pub async fn start() -> Result<()> {
    let cli = Cli::try_parse()?;

    trace!("connecting to {}", cli.addr);
    let mut client = Client::connect(cli.addr).await?;
    info!("connected");

    let request = match cli.command {
        Commands::Apply(apply) => apply.request()?,
        Commands::Reset(reset) => reset.request()?,
        Commands::Regenerate(regenerate) => regenerate.request(),
        Commands::Summary(summary) => summary.request(),
        Commands::Get(get) => get.request(),
        Commands::Rank(rank) => rank.request(),
        Commands::Campaigns => Request::Campaigns,
    };

    let response = client.request(&request).await??;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_response(&response);
    }

    Ok(())
}

/// Parses a `name=value` argument.
fn parse_key_value(s: &str) -> Result<(String, f64), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, found `{s}`"))?;
    let value = value
        .parse()
        .map_err(|err| format!("invalid value for `{name}`: {err}"))?;
    Ok((name.to_string(), value))
}

fn print_response(response: &Response) {
    match response {
        Response::Snapshot(snapshot) => {
            for campaign in &snapshot.campaigns {
                println!("{} ({})", campaign.name, campaign.campaign);
                for entry in &campaign.entries {
                    if let Some(sub_key) = &entry.sub_key {
                        println!("  {} ({sub_key})", entry.name);
                    }
                    for (counter, value) in &entry.counters {
                        println!("    {counter:<24} {value}");
                    }
                }
                for metric in &campaign.metrics {
                    println!(
                        "  {:<26} {:.3} {}",
                        metric.name,
                        metric.value,
                        metric.unit.as_deref().unwrap_or_default()
                    );
                }
                for entry in &campaign.ranking {
                    println!("  #{} {} {:.2}", entry.position, entry.name, entry.score);
                }
            }
        }
        Response::Reset => println!("reset"),
        Response::Counters(counters) => {
            for (counter, value) in counters {
                println!("{counter:<24} {value}");
            }
        }
        Response::Ranking(ranking) => {
            for entry in ranking {
                println!(
                    "#{:<3} {:<24} {:<16} {:.2}",
                    entry.position, entry.name, entry.campaign, entry.score
                );
            }
        }
        Response::Campaigns(campaigns) => {
            for campaign in campaigns {
                println!("{:<20} {}", campaign.key, campaign.name);
                if !campaign.sub_keys.is_empty() {
                    println!("    sub-keys: {}", campaign.sub_keys.join(", "));
                }
                println!("    events:   {}", campaign.events.join(", "));
            }
        }
    }
}
