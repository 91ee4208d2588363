//! Threaded comments: replies nest under the comment they answer

use super::{Entity, EntityKind, EntityTree};
use crate::models::DeleteMode;
use crate::operations::TreeResult;
use serde::{Deserialize, Serialize};

pub struct Comments;

impl EntityKind for Comments {
    const TABLE: &'static str = "comments";
    const NOUN: &'static str = "comment";
    const PLURAL: &'static str = "comments";
    const CHILD_NOUN: &'static str = "reply";
    type Payload = Comment;
}

pub type CommentTree = EntityTree<Comments>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author: String,
    pub body: String,
    #[serde(default)]
    pub approved: bool,
}

impl Comment {
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            body: body.into(),
            approved: false,
        }
    }
}

impl CommentTree {
    /// Append a reply after the existing replies to `parent_id`
    pub async fn reply(&self, parent_id: &str, comment: &Comment) -> TreeResult<String> {
        self.create(Some(parent_id), None, comment).await
    }

    /// The comment and every reply below it, in reading order
    pub async fn thread(&self, id: &str) -> TreeResult<Vec<Entity<Comment>>> {
        let mut thread = vec![self.get(id).await?];
        thread.extend(self.descendants(id).await?);
        Ok(thread)
    }

    /// Remove a comment together with all replies to it
    pub async fn remove_thread(&self, id: &str) -> TreeResult<Vec<String>> {
        self.remove(id, DeleteMode::Cascade).await
    }
}
