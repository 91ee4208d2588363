//! Organizations: companies and their subsidiaries

use super::{EntityKind, EntityTree};
use serde::{Deserialize, Serialize};

pub struct Organizations;

impl EntityKind for Organizations {
    const TABLE: &'static str = "organizations";
    const NOUN: &'static str = "organization";
    const PLURAL: &'static str = "organizations";
    const CHILD_NOUN: &'static str = "subsidiary";
    type Payload = Organization;
}

pub type OrganizationTree = EntityTree<Organizations>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub name: String,
    /// URL-safe identifier derived from the name unless set explicitly
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Organization {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slug: slugify(&name),
            name,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Lowercase ASCII alphanumerics joined by single hyphens
pub(crate) fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}
