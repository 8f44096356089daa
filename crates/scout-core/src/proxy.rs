use std::{fmt, fs, path::Path, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::{errors::Error, Result};

const DEFAULT_PROXY_PORT: u16 = 1080;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    Socks5,
    Socks4,
    Http,
}

/// A parsed proxy line: `[scheme://][user[:pass]@]host[:port]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProxyDescriptor {
    pub scheme: ProxyScheme,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn proxy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:(?P<scheme>[A-Za-z0-9]+)://)?(?:(?P<user>[^:@/]*)(?::(?P<pass>[^@/]*))?@)?(?P<host>[^:@/\s]+)(?::(?P<port>\d+))?/?$",
        )
        .expect("valid regex")
    })
}

impl FromStr for ProxyDescriptor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim();
        let caps = proxy_re()
            .captures(line)
            .ok_or_else(|| Error::Config(format!("unparsable proxy: {line:?}")))?;

        let scheme = match caps.name("scheme").map(|m| m.as_str().to_lowercase()) {
            None => ProxyScheme::Socks5,
            Some(s) if s.starts_with("socks5") => ProxyScheme::Socks5,
            Some(s) if s.starts_with("socks4") => ProxyScheme::Socks4,
            Some(s) if s.starts_with("http") => ProxyScheme::Http,
            Some(_) => ProxyScheme::Socks5,
        };

        let port = match caps.name("port") {
            Some(p) => p
                .as_str()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("proxy port out of range: {line:?}")))?,
            None => DEFAULT_PROXY_PORT,
        };

        let non_empty = |name: &str| {
            caps.name(name)
                .map(|m| m.as_str().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            scheme,
            host: caps["host"].to_string(),
            port,
            username: non_empty("user"),
            password: non_empty("pass"),
        })
    }
}

impl fmt::Display for ProxyDescriptor {
    /// Credentials are never printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            ProxyScheme::Socks5 => "socks5",
            ProxyScheme::Socks4 => "socks4",
            ProxyScheme::Http => "http",
        };
        write!(f, "{scheme}://{}:{}", self.host, self.port)
    }
}

/// Read the proxy list. Blank lines and `#` comments are ignored; a missing
/// file means "no proxies"; unparsable lines are logged and dropped.
pub fn load_proxies(path: &Path) -> Result<Vec<ProxyDescriptor>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.parse::<ProxyDescriptor>() {
            Ok(p) => out.push(p),
            Err(e) => tracing::warn!("skipping proxy line: {e}"),
        }
    }
    tracing::info!(count = out.len(), path = %path.display(), "loaded proxies");
    Ok(out)
}

/// Maps the run's account ordinal onto the proxy list, round-robin.
///
/// The ordinal counts accounts attempted so far, not account identity, so a
/// skipped or dead-lettered account still advances the mapping.
#[derive(Clone, Debug, Default)]
pub struct ProxyAssigner {
    proxies: Vec<ProxyDescriptor>,
}

impl ProxyAssigner {
    pub fn new(proxies: Vec<ProxyDescriptor>) -> Self {
        Self { proxies }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn pick(&self, ordinal: usize) -> Option<&ProxyDescriptor> {
        if self.proxies.is_empty() {
            return None;
        }
        self.proxies.get(ordinal % self.proxies.len())
    }
}
