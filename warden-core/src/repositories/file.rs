use async_trait::async_trait;

use crate::{Error, account::Avatar};

/// An uploaded file waiting to be stored.
#[derive(Clone)]
pub struct Upload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl Upload {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// File extension derived from the MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }
}

impl std::fmt::Debug for Upload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upload")
            .field("len", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// A file held by a [`FileStorage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub url: String,
}

impl From<StoredFile> for Avatar {
    fn from(file: StoredFile) -> Self {
        Avatar {
            id: file.id,
            url: file.url,
        }
    }
}

/// Blob storage for avatar images
#[async_trait]
pub trait FileStorage: Send + Sync + 'static {
    /// Store `upload` under `folder`, returning its identifier and public URL
    async fn store(&self, upload: Upload, folder: &str) -> Result<StoredFile, Error>;

    /// Remove a previously stored file. Removing an absent file is not an error.
    async fn remove(&self, id: &str) -> Result<(), Error>;
}
