use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use serde::Deserialize;

pub const DEFAULT_TRACE_URL: &str = "https://cloudflare.com/cdn-cgi/trace";
pub const DEFAULT_API_URL: &str = "https://api.cloudflare.com/client/v4";

/// One year; longer periods overflow timer deadlines.
const MAX_INTERVAL_MINUTES: u64 = 366 * 24 * 60;

#[derive(Parser, Debug, Default)]
#[command(name = "cfddns")]
#[command(about = "Keep a Cloudflare A record in sync with this host's public IPv4 address")]
pub struct Cli {
    /// Optional TOML configuration file; flags and environment win over it
    #[arg(short, long, env = "CFDDNS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Cloudflare API token
    #[arg(long, env = "CFDDNS_KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Domain name used to find the zone id
    #[arg(long, env = "CFDDNS_TARGET")]
    pub target: Option<String>,

    /// DNS record comment used for targeting
    #[arg(long, env = "CFDDNS_COMMENT")]
    pub comment: Option<String>,

    /// Minutes between updates; below 1 starts the HTTP server when --mode is not set
    #[arg(long, env = "CFDDNS_TIMER", allow_negative_numbers = true)]
    pub timer: Option<i64>,

    /// Trigger mechanism, overrides the --timer threshold rule
    #[arg(long, env = "CFDDNS_MODE", value_enum)]
    pub mode: Option<Mode>,

    /// HTTP server listen address
    #[arg(long, env = "CFDDNS_ADDR")]
    pub addr: Option<String>,

    /// HTTP server listen port
    #[arg(long, env = "CFDDNS_PORT")]
    pub port: Option<u16>,

    /// HTTP server path that triggers an update
    #[arg(long, env = "CFDDNS_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Public address trace endpoint
    #[arg(long, env = "CFDDNS_TRACE_URL")]
    pub trace_url: Option<String>,

    /// Cloudflare API base URL
    #[arg(long, env = "CFDDNS_API_URL")]
    pub api_url: Option<String>,

    /// Upper bound in seconds for one update run
    #[arg(long, env = "CFDDNS_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, env = "CFDDNS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Timer,
    Server,
}

/// On-disk layout. Every field is optional so the file can carry any subset.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub cloudflare: CloudflareSection,
    #[serde(default)]
    pub trigger: TriggerSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudflareSection {
    pub api_token: Option<String>,
    pub zone_name: Option<String>,
    pub record_comment: Option<String>,
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerSection {
    pub mode: Option<Mode>,
    pub interval_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverySection {
    pub trace_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: FileConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Trigger {
    Timer { interval: Duration },
    Server { bind: String, endpoint: String },
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Timer { interval } => write!(f, "timer every {}m", interval.as_secs() / 60),
            Trigger::Server { bind, endpoint } => write!(f, "server on {}{}", bind, endpoint),
        }
    }
}

/// Fully resolved startup parameters, immutable for the process lifetime.
#[derive(Clone)]
pub struct Settings {
    pub api_token: String,
    pub zone_name: String,
    pub record_comment: String,
    pub api_url: String,
    pub trace_url: String,
    pub timeout: Duration,
    pub trigger: Trigger,
    pub log_level: String,
}

// The token must never reach the logs.
impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_token", &"<REDACTED>")
            .field("zone_name", &self.zone_name)
            .field("record_comment", &self.record_comment)
            .field("api_url", &self.api_url)
            .field("trace_url", &self.trace_url)
            .field("timeout", &self.timeout)
            .field("trigger", &self.trigger)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn default_interval() -> i64 {
    1440
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_endpoint() -> String {
    "/cfddns/update".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn required(value: Option<String>, what: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => bail!("{} not provided", what),
    }
}

/// Rejects paths the router cannot register as a plain static route.
fn check_endpoint(endpoint: &str) -> Result<()> {
    if !endpoint.starts_with('/') {
        bail!("http server endpoint must start with '/', got {:?}", endpoint);
    }
    if endpoint.contains(['{', '}', '*']) || endpoint.split('/').any(|segment| segment.starts_with(':')) {
        bail!(
            "http server endpoint must be a static path without '{{', '}}', '*' or ':' segments, got {:?}",
            endpoint
        );
    }
    Ok(())
}

impl Settings {
    /// Resolves the command line, loading the TOML file when one was named.
    pub fn load(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: FileConfig) -> Result<Self> {
        let api_token = required(cli.key.or(file.cloudflare.api_token), "api key")?;
        let zone_name = required(cli.target.or(file.cloudflare.zone_name), "target domain")?;
        let record_comment = required(
            cli.comment.or(file.cloudflare.record_comment),
            "dns record comment",
        )?;

        let interval = cli
            .timer
            .or(file.trigger.interval_minutes)
            .unwrap_or_else(default_interval);
        let mode = match cli.mode.or(file.trigger.mode) {
            Some(mode) => mode,
            None if interval < 1 => Mode::Server,
            None => Mode::Timer,
        };

        let trigger = match mode {
            Mode::Timer => {
                if interval < 1 {
                    bail!("timer mode needs an interval of at least 1 minute, got {}", interval);
                }
                let secs = u64::try_from(interval)
                    .ok()
                    .filter(|minutes| *minutes <= MAX_INTERVAL_MINUTES)
                    .and_then(|minutes| minutes.checked_mul(60));
                match secs {
                    Some(secs) => Trigger::Timer {
                        interval: Duration::from_secs(secs),
                    },
                    None => bail!("timer interval of {} minutes is too large", interval),
                }
            }
            Mode::Server => {
                let host = cli.addr.or(file.server.host).unwrap_or_else(default_host);
                let port = cli.port.or(file.server.port).unwrap_or_else(default_port);
                let endpoint = cli
                    .endpoint
                    .or(file.server.endpoint)
                    .unwrap_or_else(default_endpoint);
                check_endpoint(&endpoint)?;
                // IPv6 literals need brackets before the port is appended.
                let bind = if host.contains(':') && !host.starts_with('[') {
                    format!("[{}]:{}", host, port)
                } else {
                    format!("{}:{}", host, port)
                };
                Trigger::Server {
                    bind,
                    endpoint,
                }
            }
        };

        let timeout_secs = cli
            .timeout
            .or(file.discovery.timeout_secs)
            .unwrap_or_else(default_timeout_secs);
        if timeout_secs == 0 {
            bail!("timeout must be greater than 0 seconds");
        }

        Ok(Settings {
            api_token,
            zone_name,
            record_comment,
            api_url: cli
                .api_url
                .or(file.cloudflare.api_url)
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            trace_url: cli
                .trace_url
                .or(file.discovery.trace_url)
                .unwrap_or_else(|| DEFAULT_TRACE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            trigger,
            log_level: cli
                .log_level
                .or(file.log_level)
                .unwrap_or_else(default_log_level),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["cfddns"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn base() -> Vec<&'static str> {
        vec!["--key", "token", "--target", "example.com", "--comment", "home"]
    }

    #[test]
    fn defaults_to_daily_timer() {
        let settings = Settings::merge(cli(&base()), FileConfig::default()).unwrap();
        assert_eq!(
            settings.trigger,
            Trigger::Timer {
                interval: Duration::from_secs(1440 * 60)
            }
        );
        assert_eq!(settings.trace_url, DEFAULT_TRACE_URL);
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert_eq!(settings.timeout, Duration::from_secs(30));
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn interval_below_one_selects_server() {
        let mut args = base();
        args.extend_from_slice(&["--timer", "0"]);
        let settings = Settings::merge(cli(&args), FileConfig::default()).unwrap();
        assert_eq!(
            settings.trigger,
            Trigger::Server {
                bind: "0.0.0.0:3000".to_string(),
                endpoint: "/cfddns/update".to_string(),
            }
        );
    }

    #[test]
    fn explicit_mode_wins_over_interval() {
        let mut args = base();
        args.extend_from_slice(&["--mode", "server", "--timer", "60", "--port", "8080"]);
        let settings = Settings::merge(cli(&args), FileConfig::default()).unwrap();
        assert!(matches!(settings.trigger, Trigger::Server { ref bind, .. } if bind == "0.0.0.0:8080"));
    }

    #[test]
    fn timer_mode_rejects_sub_minute_interval() {
        let mut args = base();
        args.extend_from_slice(&["--mode", "timer", "--timer", "0"]);
        let err = Settings::merge(cli(&args), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("at least 1 minute"));
    }

    #[test]
    fn missing_required_parameters_are_reported() {
        let err = Settings::merge(cli(&["--target", "example.com", "--comment", "home"]), FileConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "api key not provided");

        let err = Settings::merge(cli(&["--key", "token", "--comment", "home"]), FileConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "target domain not provided");

        let err = Settings::merge(cli(&["--key", "token", "--target", "example.com", "--comment", " "]), FileConfig::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "dns record comment not provided");
    }

    #[test]
    fn rejects_relative_endpoint_and_zero_timeout() {
        let mut args = base();
        args.extend_from_slice(&["--mode", "server", "--endpoint", "update"]);
        assert!(Settings::merge(cli(&args), FileConfig::default()).is_err());

        let mut args = base();
        args.extend_from_slice(&["--timeout", "0"]);
        assert!(Settings::merge(cli(&args), FileConfig::default()).is_err());
    }

    #[test]
    fn huge_interval_is_a_config_error() {
        let mut args = base();
        args.extend_from_slice(&["--timer", "9223372036854775807"]);
        let err = Settings::merge(cli(&args), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("too large"));

        let mut args = base();
        args.extend_from_slice(&["--timer", "1000000"]);
        assert!(Settings::merge(cli(&args), FileConfig::default()).is_err());
    }

    #[test]
    fn rejects_endpoints_the_router_cannot_register() {
        for endpoint in ["/cfddns/{update", "/cfddns/update}", "/cfddns/*rest", "/cfddns/:id"] {
            let mut args = base();
            args.extend_from_slice(&["--mode", "server", "--endpoint", endpoint]);
            let err = Settings::merge(cli(&args), FileConfig::default()).unwrap_err();
            assert!(err.to_string().contains("static path"), "{:?} should be rejected", endpoint);
        }

        let mut args = base();
        args.extend_from_slice(&["--mode", "server", "--endpoint", "/hooks/cfddns-update.v1"]);
        assert!(Settings::merge(cli(&args), FileConfig::default()).is_ok());
    }

    #[test]
    fn brackets_ipv6_bind_hosts() {
        let mut args = base();
        args.extend_from_slice(&["--mode", "server", "--addr", "::"]);
        let settings = Settings::merge(cli(&args), FileConfig::default()).unwrap();
        match settings.trigger {
            Trigger::Server { bind, .. } => {
                assert_eq!(bind, "[::]:3000");
                assert!(bind.parse::<std::net::SocketAddr>().is_ok());
            }
            other => panic!("expected server trigger, got {:?}", other),
        }

        let mut args = base();
        args.extend_from_slice(&["--mode", "server", "--addr", "[::1]", "--port", "8080"]);
        let settings = Settings::merge(cli(&args), FileConfig::default()).unwrap();
        assert!(matches!(settings.trigger, Trigger::Server { ref bind, .. } if bind == "[::1]:8080"));
    }

    #[test]
    fn file_fills_gaps_and_flags_override() {
        let file: FileConfig = toml::from_str(
            r#"
            log_level = "debug"

            [cloudflare]
            api_token = "file-token"
            zone_name = "example.org"
            record_comment = "office"

            [trigger]
            mode = "server"

            [server]
            host = "127.0.0.1"
            port = 9000
            endpoint = "/hook"

            [discovery]
            trace_url = "http://127.0.0.1:1/trace"
            timeout_secs = 5
            "#,
        )
        .unwrap();

        let settings = Settings::merge(cli(&["--target", "example.net"]), file).unwrap();
        assert_eq!(settings.api_token, "file-token");
        assert_eq!(settings.zone_name, "example.net");
        assert_eq!(settings.record_comment, "office");
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.trace_url, "http://127.0.0.1:1/trace");
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(
            settings.trigger,
            Trigger::Server {
                bind: "127.0.0.1:9000".to_string(),
                endpoint: "/hook".to_string(),
            }
        );
    }

    #[test]
    fn loads_file_from_disk() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(
            file.path(),
            "[cloudflare]\napi_token = \"t\"\nzone_name = \"example.com\"\nrecord_comment = \"c\"\n",
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Cli::default()
        };
        let settings = Settings::load(cli).unwrap();
        assert_eq!(settings.zone_name, "example.com");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("[cloudflare]\nzone = \"x\"\n").is_err());
    }

    #[test]
    fn debug_output_redacts_token() {
        let settings = Settings::merge(cli(&base()), FileConfig::default()).unwrap();
        let rendered = format!("{:?}", settings);
        assert!(rendered.contains("<REDACTED>"));
        assert!(!rendered.contains("\"token\""));
    }
}
