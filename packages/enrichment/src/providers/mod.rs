//! Bundled stage and storage implementations.
//!
//! - [`HttpAttributeWriter`] - document-management API write-back
//! - [`WebhookNotifier`] - chat webhook with a signed link to the thumbnail
//! - [`ImageThumbnailGenerator`] - bounded PNG thumbnails over an [`ObjectStore`]
//! - [`FsObjectStore`] / [`MemoryObjectStore`] - object storage
//! - [`HmacLinkSigner`] - expiring links
//! - [`Disabled`] - stand-in for a capability with no provider configured
//!
//! [`ObjectStore`]: crate::traits::storage::ObjectStore

mod disabled;
mod document_store;
mod object_store;
mod signing;
mod thumbnail;
mod webhook;

pub use disabled::Disabled;
pub use document_store::{Attribute, AttributeList, HttpAttributeWriter, OcrContent};
pub use object_store::{FsObjectStore, MemoryObjectStore};
pub use signing::HmacLinkSigner;
pub use thumbnail::{thumbnail_key, ImageThumbnailGenerator, MAX_THUMBNAIL_DIMENSION};
pub use webhook::{format_notification, WebhookNotifier, LINK_TTL_DAYS};
