//! Navigation menus: items with nested submenus

use super::{EntityKind, EntityTree};
use crate::operations::TreeResult;
use serde::{Deserialize, Serialize};

pub struct Menus;

impl EntityKind for Menus {
    const TABLE: &'static str = "menus";
    const NOUN: &'static str = "menu item";
    const PLURAL: &'static str = "menu items";
    const CHILD_NOUN: &'static str = "submenu";
    type Payload = MenuItem;
}

pub type MenuTree = EntityTree<Menus>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub label: String,
    /// `None` for a heading that only groups a submenu
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub new_window: bool,
}

impl MenuItem {
    pub fn heading(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: None,
            new_window: false,
        }
    }

    pub fn link(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: Some(url.into()),
            new_window: false,
        }
    }
}

impl MenuTree {
    /// Swap two items that share a submenu
    pub async fn swap(&self, first_id: &str, second_id: &str) -> TreeResult<()> {
        self.forest()
            .mutator()
            .swap_sibling_positions(first_id, second_id)
            .await
    }
}
