use crate::auth::{Authorizer, Method, RawResponse, RequestBody, USER_AGENT};
use crate::types::{Album, Envelope, Folder, FolderItem, Image, Privacy};
use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub const API_BASE: &str = "https://api.imgur.com/3";

/// Upper bound on paginated listings so a misbehaving server cannot spin us forever.
const MAX_PAGES: usize = 500;

/// A new image to upload.
#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub file_name: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub album_id: Option<&'a str>,
    pub bytes: Vec<u8>,
}

pub struct ImgurClient<A> {
    auth: A,
    http: Client,
    base_url: String,
}

impl<A: Authorizer> ImgurClient<A> {
    pub fn new(auth: A) -> Result<Self> {
        Self::with_base_url(auth, API_BASE)
    }

    pub fn with_base_url(auth: A, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            auth,
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn username(&self) -> &str {
        self.auth.username()
    }

    fn call<T: DeserializeOwned>(&self, method: Method, path: &str, body: RequestBody) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.auth.authorized_request(method.clone(), &url, body)?;
        ensure_success(&method, &url, &response)?;
        let envelope: Envelope<T> = serde_json::from_slice(&response.body)
            .with_context(|| format!("failed to parse response of {method} {url}"))?;
        Ok(envelope.data)
    }

    pub fn folders(&self, owner: &str) -> Result<Vec<Folder>> {
        self.call(
            Method::GET,
            &format!("/account/{owner}/folders"),
            RequestBody::Empty,
        )
    }

    /// Lists every image in a favourites folder. Albums are flattened into
    /// their images and ads are dropped.
    pub fn folder_images(&self, owner: &str, folder_id: u64) -> Result<Vec<Image>> {
        let items: Vec<FolderItem> = self.call(
            Method::GET,
            &format!("/account/{owner}/folders/{folder_id}/favorites"),
            RequestBody::Empty,
        )?;
        let mut images = Vec::with_capacity(items.len());
        for item in items {
            match item {
                FolderItem::Ad => continue,
                FolderItem::Image(image) => images.push(image),
                FolderItem::Album(album) if album.is_fully_loaded() => {
                    images.extend(album.images.unwrap_or_default());
                }
                FolderItem::Album(album) => {
                    debug!(album = %album.id, count = album.images_count, "loading album contents");
                    images.extend(self.album_images(&album.id)?);
                }
            }
        }
        Ok(images)
    }

    /// All albums of the authorised account, following pagination until an
    /// empty page comes back.
    pub fn albums(&self) -> Result<Vec<Album>> {
        let username = self.username().to_string();
        let mut albums = Vec::new();
        for page in 0..MAX_PAGES {
            let batch: Vec<Album> = self.call(
                Method::GET,
                &format!("/account/{username}/albums/{page}"),
                RequestBody::Empty,
            )?;
            if batch.is_empty() {
                return Ok(albums);
            }
            albums.extend(batch);
        }
        warn!(pages = MAX_PAGES, "album listing truncated");
        Ok(albums)
    }

    pub fn album_images(&self, album_id: &str) -> Result<Vec<Image>> {
        self.call(
            Method::GET,
            &format!("/album/{album_id}/images"),
            RequestBody::Empty,
        )
    }

    pub fn create_album(&self, title: &str, description: &str, privacy: Privacy) -> Result<Album> {
        let form = vec![
            ("title".to_string(), title.to_string()),
            ("description".to_string(), description.to_string()),
            ("privacy".to_string(), privacy.as_str().to_string()),
        ];
        self.call(Method::POST, "/album", RequestBody::Form(form))
    }

    /// Favourites an album into one of the authorised account's folders.
    pub fn add_album_to_folder(&self, folder_id: u64, album_id: &str) -> Result<()> {
        let _: serde_json::Value = self.call(
            Method::PUT,
            &format!("/folders/{folder_id}/favorites/album/{album_id}"),
            RequestBody::Empty,
        )?;
        Ok(())
    }

    pub fn upload_image(&self, upload: Upload<'_>) -> Result<Image> {
        let mut fields = vec![
            ("name".to_string(), upload.file_name.to_string()),
            ("title".to_string(), upload.title.to_string()),
            ("description".to_string(), upload.description.to_string()),
            ("type".to_string(), "file".to_string()),
        ];
        if let Some(album) = upload.album_id {
            fields.push(("album".to_string(), album.to_string()));
        }
        self.call(
            Method::POST,
            "/image",
            RequestBody::Multipart {
                fields,
                file_field: "image".to_string(),
                file_name: upload.file_name.to_string(),
                bytes: upload.bytes,
            },
        )
    }

    pub fn delete_image(&self, image_id: &str) -> Result<()> {
        let url = format!("{}/image/{image_id}", self.base_url);
        let response = self
            .auth
            .authorized_request(Method::DELETE, &url, RequestBody::Empty)?;
        ensure_success(&Method::DELETE, &url, &response)?;
        let envelope: Envelope<serde_json::Value> = serde_json::from_slice(&response.body)
            .with_context(|| format!("failed to parse response of DELETE {url}"))?;
        if !envelope.success {
            bail!("failed to delete image {image_id}: {}", envelope.data);
        }
        Ok(())
    }

    /// Fetches raw image bytes. The CDN sometimes rejects bearer auth, so an
    /// anonymous request is tried first.
    pub fn download(&self, link: &str) -> Result<Vec<u8>> {
        match self.download_anonymous(link) {
            Ok(bytes) => return Ok(bytes),
            Err(err) => debug!(error = %err, link, "anonymous download failed; retrying with auth"),
        }
        let response = self
            .auth
            .authorized_request(Method::GET, link, RequestBody::Empty)?;
        ensure_success(&Method::GET, link, &response)?;
        Ok(response.body)
    }

    fn download_anonymous(&self, link: &str) -> Result<Vec<u8>> {
        let response = self.http.get(link).send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();
        if !status.is_success() {
            bail!("GET {link} returned {status}");
        }
        Ok(body)
    }
}

fn ensure_success(method: &Method, url: &str, response: &RawResponse) -> Result<()> {
    if !response.is_success() {
        bail!(
            "failed to {method} {url}. Status code {}. Response: {}",
            response.status,
            response.body_text()
        );
    }
    Ok(())
}
