//! Read-only quest catalog contract plus an in-memory implementation that
//! supports being swapped out wholesale during a reload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use log::{debug, info};

use super::{Category, Quest};

/// Lookup contract the progress engine relies on.
pub trait QuestCatalog: Send + Sync {
    fn quest_by_id(&self, id: &str) -> Option<Arc<Quest>>;
    fn category_by_id(&self, id: &str) -> Option<Arc<Category>>;
    /// True while definitions are being replaced; cleanup must not run then.
    fn is_reloading(&self) -> bool;
    fn quests(&self) -> Vec<Arc<Quest>>;
}

#[derive(Default)]
struct CatalogContents {
    quests: HashMap<String, Arc<Quest>>,
    categories: HashMap<String, Arc<Category>>,
}

/// Catalog held in memory, replaced atomically by [`StaticCatalog::replace`].
#[derive(Default)]
pub struct StaticCatalog {
    contents: RwLock<CatalogContents>,
    reloading: AtomicBool,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quests(quests: Vec<Quest>, categories: Vec<Category>) -> Self {
        let catalog = Self::new();
        catalog.replace(quests, categories);
        catalog
    }

    pub fn begin_reload(&self) {
        info!("quest catalog reload started");
        self.reloading.store(true, Ordering::SeqCst);
    }

    pub fn finish_reload(&self) {
        self.reloading.store(false, Ordering::SeqCst);
        info!("quest catalog reload finished");
    }

    /// Swap in a new set of definitions.
    pub fn replace(&self, quests: Vec<Quest>, categories: Vec<Category>) {
        let next = CatalogContents {
            quests: quests
                .into_iter()
                .map(|q| (q.id.clone(), Arc::new(q)))
                .collect(),
            categories: categories
                .into_iter()
                .map(|c| (c.id.clone(), Arc::new(c)))
                .collect(),
        };
        debug!(
            "catalog now holds {} quests, {} categories",
            next.quests.len(),
            next.categories.len()
        );
        let mut guard = self.contents.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
    }

    pub fn len(&self) -> usize {
        self.contents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .quests
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QuestCatalog for StaticCatalog {
    fn quest_by_id(&self, id: &str) -> Option<Arc<Quest>> {
        self.contents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .quests
            .get(id)
            .cloned()
    }

    fn category_by_id(&self, id: &str) -> Option<Arc<Category>> {
        self.contents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .categories
            .get(id)
            .cloned()
    }

    fn is_reloading(&self) -> bool {
        self.reloading.load(Ordering::SeqCst)
    }

    fn quests(&self) -> Vec<Arc<Quest>> {
        let guard = self.contents.read().unwrap_or_else(|e| e.into_inner());
        let mut quests: Vec<_> = guard.quests.values().cloned().collect();
        quests.sort_by(|a, b| a.id.cmp(&b.id));
        quests
    }
}
