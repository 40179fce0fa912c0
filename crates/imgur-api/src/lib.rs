//! Blocking client for the parts of the Imgur API used by backdrop-sync.
//!
//! [`ImgurClient`] is generic over an [`Authorizer`], which issues the
//! authenticated requests; [`OAuthSession`] is the real one.

pub mod auth;
pub mod callback;
pub mod client;
pub mod types;

pub use auth::{Authorizer, Method, OAuthConfig, OAuthSession, RawResponse, RequestBody, Token};
pub use callback::{CallbackError, CallbackServer, TokenGrant};
pub use client::{ImgurClient, Upload};
pub use types::{Album, Envelope, Folder, FolderItem, Image, Privacy};
