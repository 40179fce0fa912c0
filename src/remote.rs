//! Boundary between the rotation engine and the photo host.

use anyhow::{Context, Result};
use imgur_api::{Album, Authorizer, Folder, Image, ImgurClient, Privacy, Upload};

use crate::catalog::CatalogEntry;

pub use imgur_api::Privacy as Visibility;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAlbum {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteImage {
    pub id: String,
    pub title: String,
    pub link: String,
}

/// Everything the engine needs from the photo host. All calls block.
pub trait RemoteStore {
    fn list_folders(&self, owner: &str) -> Result<Vec<RemoteFolder>>;

    fn list_folder_images(&self, owner: &str, folder_id: &str) -> Result<Vec<CatalogEntry>>;

    fn upload_image(
        &self,
        bytes: Vec<u8>,
        label: &str,
        caption: &str,
        album_id: &str,
    ) -> Result<RemoteImage>;

    fn delete_image(&self, id: &str) -> Result<()>;

    /// Albums of the authorised account.
    fn list_albums(&self) -> Result<Vec<RemoteAlbum>>;

    fn create_album(&self, title: &str, description: &str, visibility: Visibility)
    -> Result<RemoteAlbum>;

    fn list_album_images(&self, album_id: &str) -> Result<Vec<RemoteImage>>;

    /// Favourites an album into a folder of the authorised account.
    fn add_album_to_folder(&self, folder_id: &str, album_id: &str) -> Result<()>;

    fn download_image_bytes(&self, link: &str) -> Result<Vec<u8>>;
}

impl From<&Image> for CatalogEntry {
    fn from(image: &Image) -> Self {
        Self {
            id: image.id.clone(),
            link: image.link.clone(),
            media_type: image.mime_type.clone(),
            animated: image.animated,
            width: image.width,
            height: image.height,
        }
    }
}

impl From<Image> for RemoteImage {
    fn from(image: Image) -> Self {
        Self {
            id: image.id,
            title: image.title.unwrap_or_default(),
            link: image.link,
        }
    }
}

impl From<Album> for RemoteAlbum {
    fn from(album: Album) -> Self {
        Self {
            id: album.id,
            title: album.title.unwrap_or_default(),
        }
    }
}

impl From<Folder> for RemoteFolder {
    fn from(folder: Folder) -> Self {
        Self {
            id: folder.id.to_string(),
            name: folder.name,
        }
    }
}

fn parse_folder_id(folder_id: &str) -> Result<u64> {
    folder_id
        .parse()
        .with_context(|| format!("folder id {folder_id:?} is not numeric"))
}

impl<A: Authorizer> RemoteStore for ImgurClient<A> {
    fn list_folders(&self, owner: &str) -> Result<Vec<RemoteFolder>> {
        Ok(self.folders(owner)?.into_iter().map(Into::into).collect())
    }

    fn list_folder_images(&self, owner: &str, folder_id: &str) -> Result<Vec<CatalogEntry>> {
        let images = self.folder_images(owner, parse_folder_id(folder_id)?)?;
        Ok(images.iter().map(CatalogEntry::from).collect())
    }

    fn upload_image(
        &self,
        bytes: Vec<u8>,
        label: &str,
        caption: &str,
        album_id: &str,
    ) -> Result<RemoteImage> {
        let image = ImgurClient::upload_image(
            self,
            Upload {
                file_name: label,
                title: label,
                description: caption,
                album_id: Some(album_id),
                bytes,
            },
        )?;
        Ok(image.into())
    }

    fn delete_image(&self, id: &str) -> Result<()> {
        ImgurClient::delete_image(self, id)
    }

    fn list_albums(&self) -> Result<Vec<RemoteAlbum>> {
        Ok(self.albums()?.into_iter().map(Into::into).collect())
    }

    fn create_album(&self, title: &str, description: &str, visibility: Privacy) -> Result<RemoteAlbum> {
        let mut album: RemoteAlbum = ImgurClient::create_album(self, title, description, visibility)?.into();
        // The create reply carries only the id.
        if album.title.is_empty() {
            album.title = title.to_string();
        }
        Ok(album)
    }

    fn list_album_images(&self, album_id: &str) -> Result<Vec<RemoteImage>> {
        Ok(self.album_images(album_id)?.into_iter().map(Into::into).collect())
    }

    fn add_album_to_folder(&self, folder_id: &str, album_id: &str) -> Result<()> {
        ImgurClient::add_album_to_folder(self, parse_folder_id(folder_id)?, album_id)
    }

    fn download_image_bytes(&self, link: &str) -> Result<Vec<u8>> {
        self.download(link)
    }
}
