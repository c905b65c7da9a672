use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::time::sortable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadType {
    Pdf,
    Image,
    Video,
}

/// File attached to a post. Uploads are written by the storage provider;
/// this service only lists them with the post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: String,
    pub post_id: String,
    pub nom_fichier: String,
    pub type_fichier: UploadType,
    /// Bytes
    pub taille_fichier: u64,
    pub url_fichier: String,
    #[serde(with = "sortable")]
    pub date_upload: DateTime<Utc>,
}
