//! Media library: folders holding images, videos and documents

use super::{EntityKind, EntityTree};
use serde::{Deserialize, Serialize};

pub struct MediaLibrary;

impl EntityKind for MediaLibrary {
    const TABLE: &'static str = "media";
    const NOUN: &'static str = "media item";
    const PLURAL: &'static str = "media items";
    const CHILD_NOUN: &'static str = "subfolder";
    type Payload = MediaItem;
}

pub type MediaTree = EntityTree<MediaLibrary>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Folder,
    Image,
    Video,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub title: String,
    pub media_type: MediaType,
    /// Storage location; folders have none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl MediaItem {
    pub fn folder(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            media_type: MediaType::Folder,
            location: None,
            mime_type: None,
        }
    }

    pub fn file(
        title: impl Into<String>,
        media_type: MediaType,
        location: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            media_type,
            location: Some(location.into()),
            mime_type: Some(mime_type.into()),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.media_type == MediaType::Folder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::db::{MemoryStore, NodeStore};
    use crate::models::DeleteMode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_deleting_a_folder_keeps_its_files() {
        let store: Arc<dyn NodeStore> = Arc::new(MemoryStore::new());
        let media = MediaTree::open(store, TreeConfig::default()).await.unwrap();

        let uploads = media.create(None, None, &MediaItem::folder("Uploads")).await.unwrap();
        let holiday = media
            .create(Some(&uploads), None, &MediaItem::folder("Holiday"))
            .await
            .unwrap();
        media
            .create(
                Some(&holiday),
                None,
                &MediaItem::file("Beach", MediaType::Image, "s3://bucket/beach.jpg", "image/jpeg"),
            )
            .await
            .unwrap();

        let removed = media
            .remove(&holiday, DeleteMode::ReparentChildren)
            .await
            .unwrap();
        assert_eq!(removed, vec![holiday]);

        let contents = media.children(&uploads).await.unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].data.title, "Beach");
        assert!(!contents[0].data.is_folder());
    }

    #[test]
    fn test_media_type_wire_names() {
        let item = MediaItem::folder("Root");
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["mediaType"], "folder");
        assert!(value.get("location").is_none());
    }
}
