use anyhow::{anyhow, Result};
use tracing::info;

use feed_scout::core::config::{load_scout_config, ScoutConfig};
use feed_scout::harvest::{harvest_feed, harvest_search, SearchTarget};
use feed_scout::features::session_store;

const USAGE: &str = "\
feed-scout — authenticated feed harvester

USAGE:
  feed-scout login  --account <id>
  feed-scout search --account <id> --keywords <a,b,…> [--target marketplace|group|general]
  feed-scout feed   --account <id> --url <feed-url> [--scrolls N] [--keywords <a,b,…>]

Harvest results are printed to stdout as JSON. Logging goes to stderr;
set RUST_LOG to tune it.";

/// `--name value` or `--name=value`, first occurrence wins.
fn flag_value(args: &[String], name: &str) -> Option<String> {
    let eq_prefix = format!("{}=", name);
    let mut iter = args.iter().peekable();
    while let Some(a) = iter.next() {
        if a == name {
            if let Some(v) = iter.peek() {
                return Some(v.to_string());
            }
        } else if let Some(rest) = a.strip_prefix(&eq_prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

fn parse_keywords(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_target(raw: Option<String>) -> Result<SearchTarget> {
    match raw.as_deref().unwrap_or("marketplace") {
        "marketplace" => Ok(SearchTarget::Marketplace),
        "group" | "groups" => Ok(SearchTarget::Group),
        "general" | "posts" => Ok(SearchTarget::General),
        other => Err(anyhow!(
            "unknown --target {:?} (expected marketplace, group, or general)",
            other
        )),
    }
}

fn require_account(args: &[String]) -> Result<String> {
    flag_value(args, "--account").ok_or_else(|| anyhow!("--account <id> is required"))
}

async fn run(command: &str, args: &[String], cfg: &ScoutConfig) -> Result<()> {
    match command {
        "login" => {
            let account = require_account(args)?;
            let count = session_store::interactive_login(&account, cfg).await?;
            info!("login complete — {} cookies captured", count);
            Ok(())
        }
        "search" => {
            let account = require_account(args)?;
            let keywords = parse_keywords(flag_value(args, "--keywords"));
            if keywords.is_empty() {
                return Err(anyhow!("--keywords <a,b,…> is required for search"));
            }
            let target = parse_target(flag_value(args, "--target"))?;
            let outcome = harvest_search(&account, &keywords, target, cfg).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        "feed" => {
            let account = require_account(args)?;
            let url = flag_value(args, "--url")
                .ok_or_else(|| anyhow!("--url <feed-url> is required for feed"))?;
            let scrolls = flag_value(args, "--scrolls")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10usize);
            let keywords = parse_keywords(flag_value(args, "--keywords"));
            let outcome = harvest_feed(&account, &url, scrolls, &keywords, cfg).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        other => Err(anyhow!("unknown command {:?}\n\n{}", other, USAGE)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let cfg = load_scout_config();
    info!("🚀 feed-scout starting: {}", command);
    run(&command, &args[1..], &cfg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_flag_value_both_forms() {
        let a = args(&["--account", "buyer01", "--scrolls=12"]);
        assert_eq!(flag_value(&a, "--account").as_deref(), Some("buyer01"));
        assert_eq!(flag_value(&a, "--scrolls").as_deref(), Some("12"));
        assert_eq!(flag_value(&a, "--url"), None);
    }

    #[test]
    fn test_parse_keywords_splits_and_trims() {
        let kws = parse_keywords(Some(" laptop dell , xe máy ,, ".to_string()));
        assert_eq!(kws, vec!["laptop dell".to_string(), "xe máy".to_string()]);
        assert!(parse_keywords(None).is_empty());
    }

    #[test]
    fn test_parse_target_defaults_to_marketplace() {
        assert_eq!(parse_target(None).unwrap(), SearchTarget::Marketplace);
        assert_eq!(
            parse_target(Some("group".into())).unwrap(),
            SearchTarget::Group
        );
        assert!(parse_target(Some("bogus".into())).is_err());
    }
}
