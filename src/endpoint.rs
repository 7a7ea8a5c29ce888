use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::frame::Protocol;
use crate::Error;

pub const DEFAULT_PORT: u16 = 6379;

/// How the server certificate is checked when TLS is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsVerification {
    /// Verify against the bundled Mozilla root store.
    #[default]
    WebPki,
    /// Verify against the bundled roots plus the PEM certificates in this file.
    CaFile(PathBuf),
    /// Accept any certificate. Only meant for local development servers.
    Insecure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TlsMode {
    #[default]
    Disabled,
    Enabled(TlsVerification),
}

impl TlsMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, TlsMode::Enabled(_))
    }
}

/// Network address plus credentials identifying one Redis-compatible server.
///
/// Connections keep the endpoint they were opened against behind an `Arc`, so it cannot
/// change under an open connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Display name of the connection profile.
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsMode,
    #[serde(default)]
    pub database: u32,
    /// Protocol version requested during the handshake.
    #[serde(default)]
    pub protocol: Protocol,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Endpoint {
        Endpoint {
            name: None,
            host: host.into(),
            port,
            username: None,
            password: None,
            tls: TlsMode::Disabled,
            database: 0,
            protocol: Protocol::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Endpoint {
        self.name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Endpoint {
        self.username = Some(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Endpoint {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Endpoint {
        self.database = database;
        self
    }

    pub fn with_tls(mut self, verification: TlsVerification) -> Endpoint {
        self.tls = TlsMode::Enabled(verification);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Endpoint {
        self.protocol = protocol;
        self
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The profile name, or the address when the profile is unnamed.
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.address())
    }

    pub fn has_credentials(&self) -> bool {
        self.password.is_some()
    }

    /// Parses `redis://[user[:password]@]host[:port][/db]` or `rediss://…`.
    ///
    /// Query parameters: `protocol=resp2|resp3`, `insecure=true` (rediss only).
    pub fn parse(input: &str) -> Result<Endpoint, Error> {
        let url = url::Url::parse(input)
            .map_err(|e| Error::Config(format!("invalid Redis URL '{}': {}", input, e)))?;

        let tls = match url.scheme() {
            "redis" => TlsMode::Disabled,
            "rediss" => TlsMode::Enabled(TlsVerification::WebPki),
            other => {
                return Err(Error::Config(format!(
                    "unsupported URL scheme '{}', expected redis or rediss",
                    other
                )))
            }
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.trim_matches(&['[', ']'][..]).to_string(),
            _ => "127.0.0.1".to_string(),
        };
        let mut endpoint = Endpoint::new(host, url.port().unwrap_or(DEFAULT_PORT));
        endpoint.tls = tls;

        if !url.username().is_empty() {
            endpoint.username = Some(decode_component(url.username())?);
        }
        if let Some(password) = url.password() {
            endpoint.password = Some(decode_component(password)?);
        }

        let db = url.path().trim_start_matches('/');
        if !db.is_empty() {
            endpoint.database = db
                .parse()
                .map_err(|_| Error::Config(format!("invalid database index '{}'", db)))?;
        }

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "protocol" => {
                    endpoint.protocol = match value.as_ref() {
                        "resp2" | "2" => Protocol::Resp2,
                        "resp3" | "3" => Protocol::Resp3,
                        other => {
                            return Err(Error::Config(format!("invalid protocol '{}'", other)))
                        }
                    }
                }
                "insecure" if value == "true" && endpoint.tls.is_enabled() => {
                    endpoint.tls = TlsMode::Enabled(TlsVerification::Insecure);
                }
                "db" => {
                    endpoint.database = value
                        .parse()
                        .map_err(|_| Error::Config(format!("invalid database index '{}'", value)))?;
                }
                _ => {}
            }
        }

        Ok(endpoint)
    }
}

fn decode_component(raw: &str) -> Result<String, Error> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|_| Error::Config("URL credentials are not valid UTF-8".to_string()))
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new("127.0.0.1", DEFAULT_PORT)
    }
}

/// URL form of the endpoint with the password redacted.
impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = if self.tls.is_enabled() { "rediss" } else { "redis" };
        write!(f, "{}://", scheme)?;
        match (&self.username, &self.password) {
            (Some(user), Some(_)) => write!(f, "{}:***@", user)?,
            (None, Some(_)) => write!(f, ":***@")?,
            (Some(user), None) => write!(f, "{}@", user)?,
            (None, None) => {}
        }
        write!(f, "{}:{}/{}", self.host, self.port, self.database)
    }
}
