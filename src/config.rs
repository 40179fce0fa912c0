use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use imgur_api::{ImgurClient, OAuthConfig, OAuthSession};
use serde::Deserialize;

use crate::picker::PickOptions;
use crate::rotation::{Locations, RunOptions};

const APP_DIR: &str = "backdrop-sync";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Favourites folder to rotate through, matched case-insensitively.
    pub folder_name: String,
    /// Account owning the folder; the authorised account when unset.
    pub folder_owner: Option<String>,
    /// How long each background stays before the next one.
    #[serde(with = "humantime_serde")]
    pub change_interval: Duration,
    /// Age after which the folder listing is fetched again.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Minimum width/height ratio in percent; 0 disables.
    pub min_ratio: u32,
    /// Maximum width/height ratio in percent; 0 disables.
    pub max_ratio: u32,
    /// Shuffle seed. Positive values are shared across machines; 0 keeps the
    /// folder order.
    pub seed: Option<u64>,
    /// Mirror rotation state through the photo host.
    pub sync: bool,
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub auth: AuthOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct AuthOptions {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Port registered as the redirect target of the API application.
    pub callback_port: u16,
    pub callback_path: String,
    #[serde(with = "humantime_serde")]
    pub callback_timeout: Duration,
}

impl Configuration {
    const fn default_change_interval() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    const fn default_cache_ttl() -> Duration {
        Duration::from_secs(24 * 60 * 60)
    }

    /// `<config dir>/backdrop-sync/config.yaml`.
    pub fn default_path() -> PathBuf {
        default_dir(dirs::config_dir()).join("config.yaml")
    }

    /// Reads a YAML file; a missing file yields the defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
        };
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&s).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(!self.folder_name.trim().is_empty(), "folder-name must not be empty");
        ensure!(
            self.change_interval > Duration::ZERO,
            "change-interval must be positive"
        );
        ensure!(self.cache_ttl > Duration::ZERO, "cache-ttl must be positive");
        self.auth.validate()?;
        Ok(self)
    }

    pub fn pick_options(&self, force: bool) -> PickOptions {
        PickOptions {
            expiry: self.change_interval,
            min_ratio: self.min_ratio,
            max_ratio: self.max_ratio,
            force,
        }
    }

    pub fn run_options(&self, force: bool, refresh_cache: bool) -> RunOptions {
        RunOptions {
            pick: self.pick_options(force),
            cache_ttl: self.cache_ttl,
            refresh_cache,
            seed: self.seed,
            sync: self.sync,
        }
    }

    pub fn locations(&self) -> Locations {
        Locations {
            config_dir: self.config_dir.clone(),
            cache_dir: self.cache_dir.clone(),
        }
    }

    pub fn token_file(&self) -> PathBuf {
        self.config_dir.join("token.json")
    }

    pub fn oauth(&self) -> OAuthConfig {
        let mut oauth = OAuthConfig::imgur(self.auth.client_id.clone(), self.token_file());
        oauth.client_secret = self.auth.client_secret.clone();
        oauth.callback_addr =
            SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, self.auth.callback_port));
        oauth.callback_path = self.auth.callback_path.clone();
        oauth.callback_timeout = self.auth.callback_timeout;
        oauth
    }

    /// Authorises against the photo host, reusing a saved token when one is
    /// still valid, and returns a client for the authorised account.
    pub fn connect(&self) -> Result<ImgurClient<OAuthSession>> {
        ensure!(!self.auth.client_id.is_empty(), "auth.client-id must be set");
        let session = OAuthSession::authorize(self.oauth()).context("failed to authorise")?;
        ImgurClient::new(session)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            folder_name: "desktop backgrounds".to_string(),
            folder_owner: None,
            change_interval: Self::default_change_interval(),
            cache_ttl: Self::default_cache_ttl(),
            min_ratio: 0,
            max_ratio: 0,
            seed: None,
            sync: false,
            config_dir: default_dir(dirs::config_dir()),
            cache_dir: default_dir(dirs::cache_dir()),
            auth: AuthOptions::default(),
        }
    }
}

impl AuthOptions {
    const fn default_callback_port() -> u16 {
        8099
    }

    const fn default_callback_timeout() -> Duration {
        Duration::from_secs(5 * 60)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.callback_path.starts_with('/'),
            "auth.callback-path must start with '/'"
        );
        ensure!(
            self.callback_timeout > Duration::ZERO,
            "auth.callback-timeout must be positive"
        );
        Ok(())
    }
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            callback_port: Self::default_callback_port(),
            callback_path: "/oauthcallback".to_string(),
            callback_timeout: Self::default_callback_timeout(),
        }
    }
}

fn default_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR)
}
