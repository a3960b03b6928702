use std::{env, collections::HashMap, fmt, fs, path::Path, time::Duration};

use chrono::NaiveDate;

use reqwest::{Client, Url};

use serde_json::Value;

use colored::Colorize;

use log::{info, warn};

const DEFAULT_BASE_URL: &str = "https://api.football-data.org/v4";
const API_KEY_VAR: &str = "FOOTBALL_DATA_API_KEY";
const BASE_URL_VAR: &str = "FOOTBALL_DATA_BASE_URL";
const AUTH_HEADER: &str = "X-Auth-Token";

const MATCH_STATUSES: [&str; 9] = [
    "SCHEDULED", "TIMED", "IN_PLAY", "PAUSED", "FINISHED",
    "SUSPENDED", "POSTPONED", "CANCELLED", "AWARDED",
];

// Error type
#[derive(Debug)]
pub enum ApiError {
    Config(String),
    Usage(String),
    Transport(reqwest::Error),
    Http { status: u16, body: String },
    RetriesExhausted,
    Json(serde_json::Error),
    Io(std::io::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(msg) => write!(f, "configuration: {msg}"),
            ApiError::Usage(msg) => write!(f, "usage: {msg}"),
            ApiError::Transport(err) => write!(f, "request failed: {err}"),
            ApiError::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            ApiError::RetriesExhausted => write!(f, "rate limit exceeded, try again later"),
            ApiError::Json(err) => write!(f, "bad JSON in response: {err}"),
            ApiError::Io(err) => write!(f, "could not write output: {err}"),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ApiError::Transport(err) => Some(err),
            ApiError::Json(err) => Some(err),
            ApiError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> ApiError {
        ApiError::Transport(err)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> ApiError {
        ApiError::Json(err)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> ApiError {
        ApiError::Io(err)
    }
}

// Configuration
pub struct Config {
    pub api_key: String,
    pub base_url: String,
}

impl Config {
    pub fn build() -> Result<Config, ApiError> {
        dotenv::dotenv().ok();

        let api_key = env::var(API_KEY_VAR).map_err(|_| {
            ApiError::Config(format!("set {API_KEY_VAR} to your football-data.org token"))
        })?;
        // "PASTE_..." is the placeholder people leave in .env templates
        if api_key.trim().is_empty() || api_key.contains("PASTE_") {
            return Err(ApiError::Config(format!(
                "{API_KEY_VAR} is empty or still the placeholder"
            )));
        }

        let base_url = env::var(BASE_URL_VAR)
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Config { api_key, base_url })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    Competitions,
    Matches,
    Standings,
    Scorers,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    Switch,
    Text(String),
}

impl FlagValue {
    fn as_text(&self) -> Option<&str> {
        match self {
            FlagValue::Text(value) => Some(value.as_str()),
            FlagValue::Switch => None,
        }
    }
}

#[derive(Debug)]
pub struct CliArgs {
    pub subcommand: Subcommand,
    pub flags: HashMap<String, FlagValue>,
    pub positionals: Vec<String>,
}

impl CliArgs {
    pub fn build(mut args: impl Iterator<Item = String>) -> CliArgs {
        args.next();

        let mut flags = HashMap::new();
        let mut positionals = Vec::new();
        let mut pending: Option<String> = None;

        for token in args {
            if let Some(name) = token.strip_prefix("--") {
                // a flag with no value stays a bare switch
                if let Some(open) = pending.take() {
                    flags.insert(open, FlagValue::Switch);
                }
                pending = Some(name.to_string());
            } else if let Some(name) = pending.take() {
                flags.insert(name, FlagValue::Text(token));
            } else {
                positionals.push(token);
            }
        }
        if let Some(open) = pending {
            flags.insert(open, FlagValue::Switch);
        }

        // matching input to a command type; anything else falls back to help
        let subcommand = match positionals.first().map(String::as_str) {
            Some("competitions") => Subcommand::Competitions,
            Some("matches") => Subcommand::Matches,
            Some("standings") => Subcommand::Standings,
            Some("scorers") => Subcommand::Scorers,
            _ => Subcommand::Help,
        };

        CliArgs {
            subcommand,
            flags,
            positionals,
        }
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).and_then(FlagValue::as_text)
    }
}

// Flag validation
fn validated_date(args: &CliArgs, name: &str) -> Result<Option<String>, ApiError> {
    match args.flag(name) {
        Some(raw) => {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                ApiError::Usage(format!("--{name} wants YYYY-MM-DD, got {raw:?}"))
            })?;
            Ok(Some(raw.to_string()))
        }
        None => Ok(None),
    }
}

fn validated_status(args: &CliArgs) -> Result<Option<String>, ApiError> {
    match args.flag("status") {
        Some(raw) => {
            let status = raw.to_uppercase();
            if !MATCH_STATUSES.contains(&status.as_str()) {
                return Err(ApiError::Usage(format!("unknown match status {raw:?}")));
            }
            Ok(Some(status))
        }
        None => Ok(None),
    }
}

fn validated_number(args: &CliArgs, name: &str) -> Result<Option<String>, ApiError> {
    match args.flag(name) {
        Some(raw) => {
            raw.parse::<u32>().map_err(|_| {
                ApiError::Usage(format!("--{name} wants a number, got {raw:?}"))
            })?;
            Ok(Some(raw.to_string()))
        }
        None => Ok(None),
    }
}

// Query builder
pub fn with_query(mut url: Url, params: &[(&str, Option<String>)]) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            match value.as_deref() {
                Some(v) if !v.is_empty() => {
                    pairs.append_pair(name, v);
                }
                _ => {}
            }
        }
    }
    // query_pairs_mut leaves a bare `?` behind when nothing was appended
    if url.query() == Some("") {
        url.set_query(None);
    }
    url
}

// Request executor
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &Url) -> Result<RawResponse, ApiError>;
}

pub struct HttpTransport {
    client: Client,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_key: String) -> HttpTransport {
        HttpTransport {
            client: Client::new(),
            api_key,
        }
    }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<RawResponse, ApiError> {
        let response = self
            .client
            .get(url.clone())
            .header(AUTH_HEADER, &self.api_key)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(RawResponse { status, body })
    }
}

pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_unit: Duration::from_millis(1500),
        }
    }
}

impl RetryPolicy {
    // linear backoff: unit, 2 * unit, 3 * unit, ...
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * (attempt + 1)
    }
}

pub struct Fetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Fetcher<T> {
        Fetcher { transport, policy }
    }

    // Only 429 is retried; transport failures and other HTTP errors are final
    pub async fn get_json(&self, url: &Url) -> Result<Value, ApiError> {
        for attempt in 0..self.policy.max_attempts {
            let response = self.transport.get(url).await?;

            if response.status == 429 {
                let wait = self.policy.backoff(attempt);
                warn!("429 rate-limit, backing off {}ms", wait.as_millis());
                tokio::time::sleep(wait).await;
                continue;
            }
            if !(200..300).contains(&response.status) {
                return Err(ApiError::Http {
                    status: response.status,
                    body: response.body,
                });
            }
            return Ok(serde_json::from_str(&response.body)?);
        }

        Err(ApiError::RetriesExhausted)
    }
}

// URL configuration per subcommand
fn endpoint(config: &Config, path: &str) -> Result<Url, ApiError> {
    Url::parse(&format!("{}/{}", config.base_url, path))
        .map_err(|err| ApiError::Config(format!("bad endpoint URL: {err}")))
}

fn competitions_url(config: &Config) -> Result<Url, ApiError> {
    endpoint(config, "competitions")
}

fn matches_url(args: &CliArgs, config: &Config) -> Result<Url, ApiError> {
    let params = [
        ("dateFrom", validated_date(args, "dateFrom")?),
        ("dateTo", validated_date(args, "dateTo")?),
        ("status", validated_status(args)?),
        // comma-separated codes go through as one value
        ("competitions", args.flag("competition").map(str::to_string)),
    ];
    Ok(with_query(endpoint(config, "matches")?, &params))
}

fn standings_url(args: &CliArgs, config: &Config) -> Result<Url, ApiError> {
    let code = args.flag("competition").unwrap_or("PL");
    let params = [("season", validated_number(args, "season")?)];
    Ok(with_query(
        endpoint(config, &format!("competitions/{code}/standings"))?,
        &params,
    ))
}

fn scorers_url(args: &CliArgs, config: &Config) -> Result<Url, ApiError> {
    let code = args.flag("competition").unwrap_or("PL");
    let limit = validated_number(args, "limit")?.unwrap_or_else(|| "10".to_string());
    let params = [
        ("limit", Some(limit)),
        ("season", validated_number(args, "season")?),
    ];
    Ok(with_query(
        endpoint(config, &format!("competitions/{code}/scorers"))?,
        &params,
    ))
}

// Top-level command dispatch
pub async fn run(args: CliArgs, config: Config) -> Result<(), ApiError> {
    let url = match args.subcommand {
        Subcommand::Help => {
            print_help();
            return Ok(());
        }
        Subcommand::Competitions => competitions_url(&config)?,
        Subcommand::Matches => matches_url(&args, &config)?,
        Subcommand::Standings => standings_url(&args, &config)?,
        Subcommand::Scorers => scorers_url(&args, &config)?,
    };

    let fetcher = Fetcher::new(HttpTransport::new(config.api_key), RetryPolicy::default());
    let data = fetcher.get_json(&url).await?;

    let pretty = serde_json::to_string_pretty(&data)?;
    println!("{pretty}");

    if let Some(out) = args.flag("out") {
        save_json(&pretty, Path::new(out))?;
    }

    Ok(())
}

// Output
fn save_json(pretty: &str, path: &Path) -> Result<(), ApiError> {
    let full = env::current_dir()?.join(path);
    fs::write(&full, pretty)?;
    info!("saved -> {}", full.display());
    Ok(())
}

pub fn print_help() {
    println!("{}", "Football-Data.org CLI".bold());
    println!();
    println!("{}", "Usage:".bold());
    println!("  footdata competitions [--out data/competitions.json]");
    println!("  footdata matches [--dateFrom YYYY-MM-DD] [--dateTo YYYY-MM-DD] [--status FINISHED] [--competition PL] [--out today.json]");
    println!("  footdata standings [--competition PL] [--season 2024] [--out pl_standings.json]");
    println!("  footdata scorers [--competition PL] [--limit 10] [--season 2024] [--out pl_scorers.json]");
    println!();
    println!("The free plan allows about 10 requests a minute; on a 429 the");
    println!("client backs off and retries up to 3 times.");
}
