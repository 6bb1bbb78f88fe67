//! Command-line record search.
//!
//! Usage: `isearch [FLAGS] key=value ...`
//!
//! With `--batch`, each stdin line holds further whitespace-separated
//! `key=value` criteria merged over the ones given as arguments, and one
//! result is printed per line.

#![allow(clippy::print_stdout)]

use anyhow::{anyhow, bail, Context};
use clap::Parser;
use infogroup_search::cache::ResultCache;
use infogroup_search::config::{ClientConfig, Environment, Format, Scheme};
use infogroup_search::search::{
    Criteria, Database, ResultShape, SearchClient, SearchOptions, SearchResult,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(name = "isearch", version)]
#[command(about = "Query the Infogroup consumer and business search API")]
struct Args {
    /// Search criteria as key=value pairs
    criteria: Vec<String>,

    /// Configuration file
    #[arg(long, default_value = "infogroup.yaml")]
    config: String,

    /// Service environment (dev, test, prod)
    #[arg(long)]
    env: Option<Environment>,

    /// Use the business database instead of the consumer database
    #[arg(long)]
    business: bool,

    /// Return the number of matches
    #[arg(long)]
    counts: bool,

    /// Results page size
    #[arg(long)]
    pagesize: Option<u32>,

    /// Response format (json, xml)
    #[arg(long)]
    format: Option<Format>,

    /// Retrieve every individual's record (no householding)
    #[arg(long)]
    individuals: bool,

    /// Verbose logging, including elapsed time
    #[arg(long)]
    debug: bool,

    /// Print response bodies as received instead of pretty-printed JSON
    #[arg(long)]
    raw: bool,

    /// Bypass the ESB
    #[arg(long)]
    noesb: bool,

    /// Fetch metadata for this field
    #[arg(long)]
    metadata: Option<String>,

    /// Fetch the record with this id
    #[arg(long)]
    id: Option<String>,

    /// Tally results by this field (homevalue, homeincome, age, gender,
    /// employeesize, salesvolume)
    #[arg(long)]
    tally: Option<String>,

    /// Only fetch a list of ids
    #[arg(long)]
    ids: bool,

    /// Do not cache results
    #[arg(long)]
    nocache: bool,

    /// Only answer from the cache; never call the API
    #[arg(long)]
    onlycache: bool,

    /// Connect with HTTP instead of HTTPS
    #[arg(long)]
    nossl: bool,

    /// API key; skips key management entirely
    #[arg(long)]
    apikey: Option<String>,

    /// Account username for API authentication
    #[arg(long)]
    username: Option<String>,

    /// Account password for API authentication
    #[arg(long)]
    password: Option<String>,

    /// Redis server for the result cache
    #[arg(long, default_value = "redis://127.0.0.1/")]
    redis_url: String,

    /// Cache expiration in seconds
    #[arg(long, default_value_t = 7 * 24 * 60 * 60)]
    expiration: u64,

    /// Read one set of criteria per stdin line
    #[arg(long)]
    batch: bool,
}

impl Args {
    /// Layer command-line flags over loaded configuration.
    fn apply(&self, mut config: ClientConfig) -> ClientConfig {
        if let Some(env) = self.env {
            config.env = env;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.nossl {
            config.scheme = Scheme::Http;
        }
        config.noesb |= self.noesb;
        config.debug |= self.debug;
        config.raw |= self.raw;
        config.onlycache |= self.onlycache;
        if self.apikey.is_some() {
            config.apikey.clone_from(&self.apikey);
        }
        if self.username.is_some() {
            config.username.clone_from(&self.username);
        }
        if self.password.is_some() {
            config.password.clone_from(&self.password);
        }
        config
    }

    fn options(&self) -> anyhow::Result<SearchOptions> {
        let shape = ResultShape::from_flags(
            self.counts,
            self.metadata.clone(),
            self.id.clone(),
            self.tally.clone(),
            self.ids,
        )?;
        let db = if self.business {
            Database::UsBusiness
        } else {
            Database::UsConsumer
        };
        Ok(SearchOptions {
            db,
            shape,
            individuals: self.individuals,
            pagesize: self.pagesize,
            onlycache: self.onlycache,
        })
    }
}

/// Parse `key=value` arguments. The value may itself contain `=`.
fn parse_criteria<'a>(pairs: impl IntoIterator<Item = &'a str>) -> anyhow::Result<Criteria> {
    pairs
        .into_iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .filter(|(key, _)| !key.is_empty())
                .ok_or_else(|| anyhow!("criteria must look like key=value, got '{pair}'"))?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn render(result: Option<&SearchResult>, compact: bool) -> anyhow::Result<String> {
    let value = match result {
        None => Value::Null,
        Some(SearchResult::Raw(text)) => return Ok(text.clone()),
        Some(SearchResult::Count(n)) => json!(n),
        Some(SearchResult::Tally(tally)) => json!(tally),
        Some(SearchResult::Document(document)) => document.clone(),
    };
    let rendered = if compact {
        serde_json::to_string(&value)?
    } else {
        serde_json::to_string_pretty(&value)?
    };
    Ok(rendered)
}

#[cfg(feature = "redis")]
async fn open_cache(args: &Args) -> Option<Arc<dyn ResultCache>> {
    use infogroup_search::cache::RedisCache;

    if args.nocache {
        return None;
    }
    match RedisCache::connect(&args.redis_url, Duration::from_secs(args.expiration)).await {
        Ok(cache) => Some(Arc::new(cache)),
        Err(err) => {
            tracing::warn!(error = %err, "Redis is not available; continuing without a cache (use --nocache to silence)");
            None
        }
    }
}

#[cfg(not(feature = "redis"))]
#[allow(clippy::unused_async)]
async fn open_cache(args: &Args) -> Option<Arc<dyn ResultCache>> {
    use infogroup_search::cache::MemoryCache;

    if args.nocache {
        return None;
    }
    tracing::debug!(redis_url = %args.redis_url, "Built without redis support; caching in memory");
    Some(Arc::new(MemoryCache::with_ttl(Duration::from_secs(args.expiration))))
}

async fn run_one(
    client: &SearchClient,
    criteria: &Criteria,
    options: &SearchOptions,
    compact: bool,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let result = client.execute(criteria, options).await?;
    tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "Search finished");
    println!("{}", render(result.as_ref(), compact)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = ClientConfig::load_unvalidated(&args.config)
        .with_context(|| format!("loading {}", args.config))?;
    let config = args.apply(config);
    infogroup_search::logging::init(&config.logging, config.debug)
        .map_err(|e| anyhow!("{e}"))?;

    let options = args.options()?;
    let criteria = parse_criteria(args.criteria.iter().map(String::as_str))?;

    let mut builder = SearchClient::builder(config);
    if let Some(cache) = open_cache(&args).await {
        builder = builder.cache(cache);
    }
    let client = builder.build()?;

    if !args.batch {
        return run_one(&client, &criteria, &options, args.raw).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut failures = 0_usize;
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!(line = %line, "Batch criteria");
        let merged = parse_criteria(line.split_whitespace()).map(|extra| {
            let mut merged = criteria.clone();
            merged.extend(extra);
            merged
        });
        let outcome = match merged {
            Ok(merged) => run_one(&client, &merged, &options, args.raw).await,
            Err(err) => Err(err),
        };
        if let Err(err) = outcome {
            tracing::error!(line = %line, error = %err, "Batch line failed");
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{failures} batch line(s) failed");
    }
    Ok(())
}
