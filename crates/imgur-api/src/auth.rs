use crate::callback::{CallbackServer, TokenGrant};
use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;
use reqwest::Url;
use reqwest::blocking::{Client, multipart};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

pub use reqwest::Method;

pub const USER_AGENT: &str = concat!("backdrop-sync/", env!("CARGO_PKG_VERSION"));
pub const AUTHORIZE_URL: &str = "https://api.imgur.com/oauth2/authorize";
pub const TOKEN_URL: &str = "https://api.imgur.com/oauth2/token";

/// Body of an outgoing request, independent of the HTTP stack.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        file_field: String,
        file_name: String,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Capability to issue requests on behalf of an authorised account.
pub trait Authorizer {
    fn authorized_request(&self, method: Method, url: &str, body: RequestBody)
    -> Result<RawResponse>;

    /// Account name the credentials belong to.
    fn username(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub account_username: Option<String>,
}

impl Token {
    fn from_grant(grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            expires_at: expiry_from(now, grant.expires_in),
            account_username: grant.account_username,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// A token is only usable once we also know whose it is.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.is_expired(now) || self.account_username.as_deref().is_none_or(str::is_empty)
    }
}

#[derive(Debug, Deserialize)]
struct RefreshReply {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    account_username: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
    pub token_file: PathBuf,
    pub callback_addr: SocketAddr,
    pub callback_path: String,
    pub callback_timeout: Duration,
}

impl OAuthConfig {
    pub fn imgur(client_id: impl Into<String>, token_file: impl Into<PathBuf>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            token_file: token_file.into(),
            callback_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8099)),
            callback_path: "/oauthcallback".to_string(),
            callback_timeout: Duration::from_secs(300),
        }
    }
}

/// OAuth-backed [`Authorizer`] with a persisted, self-refreshing token.
pub struct OAuthSession {
    config: OAuthConfig,
    http: Client,
    token: Mutex<Token>,
    username: String,
}

impl OAuthSession {
    /// Loads the stored token, falling back to the browser flow when there
    /// is none, then refreshes it if needed and persists the result.
    pub fn authorize(config: OAuthConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;

        let stored = match load_token(&config.token_file) {
            Ok(token) => token.filter(|t| !t.access_token.is_empty()),
            Err(err) => {
                warn!(error = %err, path = %config.token_file.display(), "ignoring unreadable token file");
                None
            }
        };
        let mut token = match stored {
            Some(token) => token,
            None => authorize_in_browser(&config)?,
        };

        if token.needs_refresh(Utc::now()) {
            token = refresh_token(&http, &config, &token)?;
        }
        save_token(&config.token_file, &token)?;

        let username = token
            .account_username
            .clone()
            .context("authorisation did not reveal the account name")?;
        info!(user = %username, "authorised");
        Ok(Self {
            config,
            http,
            token: Mutex::new(token),
            username,
        })
    }

    fn access_token(&self) -> Result<String> {
        let mut token = self
            .token
            .lock()
            .map_err(|_| anyhow!("token lock poisoned"))?;
        if token.is_expired(Utc::now()) {
            debug!("access token expired; refreshing");
            let refreshed = refresh_token(&self.http, &self.config, &token)?;
            save_token(&self.config.token_file, &refreshed)?;
            *token = refreshed;
        }
        Ok(token.access_token.clone())
    }
}

impl Authorizer for OAuthSession {
    fn authorized_request(
        &self,
        method: Method,
        url: &str,
        body: RequestBody,
    ) -> Result<RawResponse> {
        let access = self.access_token()?;
        let request = self.http.request(method.clone(), url).bearer_auth(access);
        let request = match body {
            RequestBody::Empty => request,
            RequestBody::Form(pairs) => request.form(&pairs),
            RequestBody::Multipart {
                fields,
                file_field,
                file_name,
                bytes,
            } => {
                let mut form = multipart::Form::new();
                for (key, value) in fields {
                    form = form.text(key, value);
                }
                let part = multipart::Part::bytes(bytes).file_name(file_name);
                request.multipart(form.part(file_field, part))
            }
        };
        let response = request
            .send()
            .with_context(|| format!("failed to {method} {url}"))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .with_context(|| format!("failed to read response of {method} {url}"))?
            .to_vec();
        Ok(RawResponse { status, body })
    }

    fn username(&self) -> &str {
        &self.username
    }
}

fn authorize_in_browser(config: &OAuthConfig) -> Result<Token> {
    let state = random_state();
    let url = Url::parse_with_params(
        &config.authorize_url,
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "token"),
            ("state", state.as_str()),
        ],
    )
    .context("invalid authorize url")?;

    let server = CallbackServer::bind(config.callback_addr, config.callback_path.clone())?;
    info!("open this URL to authorise backdrop-sync: {url}");
    let grant = server
        .wait(&state, config.callback_timeout)
        .context("failed to receive authorisation token")?;
    info!("token received");
    Ok(Token::from_grant(grant, Utc::now()))
}

fn refresh_token(http: &Client, config: &OAuthConfig, token: &Token) -> Result<Token> {
    if token.refresh_token.is_empty() {
        bail!("stored token cannot be refreshed; delete it to authorise again");
    }
    let mut form = vec![
        ("refresh_token", token.refresh_token.as_str()),
        ("client_id", config.client_id.as_str()),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = config.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }
    let response = http
        .post(&config.token_url)
        .form(&form)
        .send()
        .context("token refresh request failed")?;
    let status = response.status();
    let body = response.bytes().context("failed to read token refresh reply")?;
    if !status.is_success() {
        bail!(
            "token refresh failed with status {status}: {}",
            String::from_utf8_lossy(&body)
        );
    }
    let reply: RefreshReply =
        serde_json::from_slice(&body).context("failed to parse token refresh reply")?;
    Ok(apply_refresh(token, reply, Utc::now()))
}

fn apply_refresh(previous: &Token, reply: RefreshReply, now: DateTime<Utc>) -> Token {
    Token {
        access_token: reply.access_token,
        refresh_token: reply
            .refresh_token
            .unwrap_or_else(|| previous.refresh_token.clone()),
        token_type: reply
            .token_type
            .unwrap_or_else(|| previous.token_type.clone()),
        expires_at: expiry_from(now, reply.expires_in),
        account_username: reply
            .account_username
            .or_else(|| previous.account_username.clone()),
    }
}

fn expiry_from(now: DateTime<Utc>, expires_in: u64) -> DateTime<Utc> {
    let seconds = i64::try_from(expires_in).unwrap_or(i64::MAX);
    TimeDelta::try_seconds(seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn random_state() -> String {
    let mut bytes = [0u8; 24];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn load_token(path: &Path) -> Result<Option<Token>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };
    let token = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(token))
}

pub fn save_token(path: &Path, token: &Token) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent dir at {}", parent.display()))?;
    }
    let json = serde_json::to_vec_pretty(token)?;
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(&json)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
