use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Album visibility accepted by `POST /album`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    Hidden,
    Secret,
}

impl Privacy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Hidden => "hidden",
            Self::Secret => "secret",
        }
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every API reply is wrapped as `{ "data": ..., "success": ..., "status": ... }`.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub status: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Image {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub animated: bool,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub link: String,
    pub datetime: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Album {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub privacy: Option<String>,
    pub link: String,
    pub images: Option<Vec<Image>>,
    pub images_count: usize,
}

impl Album {
    /// Images embedded in a listing response. Gallery posts arrive fully
    /// populated; real albums usually carry only a cover.
    pub fn embedded_images(&self) -> &[Image] {
        self.images.as_deref().unwrap_or_default()
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.embedded_images().len() == self.images_count
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Folder {
    pub id: u64,
    pub name: String,
    pub link: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// One entry of a favourites folder listing.
#[derive(Debug, Clone, PartialEq)]
pub enum FolderItem {
    Image(Image),
    Album(Album),
    Ad,
}

impl<'de> Deserialize<'de> for FolderItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let flag = |key: &str| {
            value
                .get(key)
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false)
        };
        let (is_ad, is_album) = (flag("is_ad"), flag("is_album"));
        if is_ad {
            Ok(Self::Ad)
        } else if is_album {
            Album::deserialize(value)
                .map(Self::Album)
                .map_err(de::Error::custom)
        } else {
            Image::deserialize(value)
                .map(Self::Image)
                .map_err(de::Error::custom)
        }
    }
}
