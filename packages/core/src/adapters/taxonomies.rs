//! Taxonomy terms: broader terms contain narrower ones

use super::organizations::slugify;
use super::{EntityKind, EntityTree};
use serde::{Deserialize, Serialize};

pub struct Taxonomies;

impl EntityKind for Taxonomies {
    const TABLE: &'static str = "taxonomies";
    const NOUN: &'static str = "term";
    const PLURAL: &'static str = "terms";
    const CHILD_NOUN: &'static str = "narrower term";
    type Payload = Term;
}

pub type TaxonomyTree = EntityTree<Taxonomies>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub name: String,
    pub slug: String,
    /// Vocabulary the term belongs to ("tags", "categories", ...)
    pub vocabulary: String,
}

impl Term {
    pub fn new(vocabulary: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            vocabulary: vocabulary.into(),
        }
    }
}

impl TaxonomyTree {
    /// Slash-joined slugs from the root term down to `id`
    pub async fn slug_path(&self, id: &str) -> crate::operations::TreeResult<String> {
        let path = self.path(id).await?;
        Ok(path
            .iter()
            .map(|term| term.data.slug.as_str())
            .collect::<Vec<_>>()
            .join("/"))
    }
}
