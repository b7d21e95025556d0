use std::env;
use std::time::Duration;

/// Default embed host the identifiers are appended to.
pub const DEFAULT_EMBED_DOMAIN: &str = "short.icu";

/// Desktop Chrome identity presented to the embed site.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/116.0.0.0 Safari/537.36";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Host serving the embed pages (`https://{embed_domain}/{id}`)
    pub embed_domain: String,
    /// How long a resolved manifest URL stays servable from cache
    pub cache_ttl_secs: u64,
    /// Deadline for observing a manifest request after navigation
    pub resolve_timeout_secs: u64,
    /// Upper bound on a single page navigation (Chromium driver only)
    pub navigation_timeout_secs: u64,
    /// User agent set on every browser session
    pub user_agent: String,
    /// Optional Chromium executable; auto-detected when unset
    pub chrome_path: Option<String>,
    /// Run the browser without a window
    pub headless: bool,
    /// Share one in-flight resolution between concurrent callers of the same id
    pub single_flight: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            embed_domain: DEFAULT_EMBED_DOMAIN.to_string(),
            cache_ttl_secs: 2 * 60 * 60,
            resolve_timeout_secs: 20,
            navigation_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_path: None,
            headless: true,
            single_flight: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    /// Every variable is optional; malformed numbers are rejected.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = Config::default();

        let port = env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse()?;

        let embed_domain = env::var("EMBED_DOMAIN")
            .map(|d| d.trim().trim_end_matches('/').to_string())
            .unwrap_or(defaults.embed_domain);
        if embed_domain.is_empty() {
            return Err("EMBED_DOMAIN must not be empty".into());
        }
        // Reject anything that would not form a valid https URL
        url::Url::parse(&format!("https://{}/", embed_domain))
            .map_err(|e| format!("EMBED_DOMAIN {:?} is not a valid host: {}", embed_domain, e))?;

        let cache_ttl_secs = parse_secs("CACHE_TTL_SECS", defaults.cache_ttl_secs)?;
        let resolve_timeout_secs =
            parse_secs("RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout_secs)?;
        let navigation_timeout_secs =
            parse_secs("NAVIGATION_TIMEOUT_SECS", defaults.navigation_timeout_secs)?;

        let user_agent = env::var("USER_AGENT")
            .ok()
            .filter(|ua| !ua.trim().is_empty())
            .unwrap_or(defaults.user_agent);

        let chrome_path = env::var("CHROME_PATH").ok().filter(|p| !p.is_empty());

        let headless = parse_bool("BROWSER_HEADLESS", defaults.headless);
        let single_flight = parse_bool("SINGLE_FLIGHT", defaults.single_flight);

        Ok(Config {
            port,
            embed_domain,
            cache_ttl_secs,
            resolve_timeout_secs,
            navigation_timeout_secs,
            user_agent,
            chrome_path,
            headless,
            single_flight,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

fn parse_secs(key: &str, default: u64) -> Result<u64, Box<dyn std::error::Error>> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: std::num::ParseIntError| {
                format!("{} must be a whole number of seconds: {}", key, e).into()
            }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}
