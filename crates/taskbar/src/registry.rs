//! Registered applications and the main-menu rows derived from them.

use crate::app::{AppFactory, SubMenu};
use crate::events::EventCode;
use crate::icons::Bitmap;
use collections::IndexMap;
use tracing::{debug, warn};

/// One main-menu row, captured from a registered factory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub name: String,
    pub icon: Option<Bitmap>,
    pub sub_menu: Option<SubMenu>,
    pub event: EventCode,
}

/// Applications available from the main menu, in registration order.
#[derive(Default)]
pub struct ApplicationRegistry {
    factories: IndexMap<String, Box<dyn AppFactory>>,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize and register a factory.
    ///
    /// Refuses duplicates without reinitializing the existing entry, and
    /// refuses factories whose initialization fails.
    pub fn register(&mut self, mut factory: Box<dyn AppFactory>) -> bool {
        let name = factory.name().to_string();
        if self.factories.contains_key(&name) {
            warn!("application '{}' is already registered", name);
            return false;
        }
        if !factory.initialize() {
            warn!("application '{}' failed to initialize", name);
            return false;
        }
        debug!("application '{}' registered", name);
        self.factories.insert(name, factory);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn factory_mut(&mut self, name: &str) -> Option<&mut (dyn AppFactory + 'static)> {
        self.factories.get_mut(name).map(|f| f.as_mut())
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Menu rows in registration order. Icons are fresh copies owned by
    /// the caller.
    pub fn menu_items(&self) -> Vec<MenuItem> {
        self.factories
            .values()
            .map(|factory| MenuItem {
                name: factory.name().to_string(),
                icon: factory.icon(),
                sub_menu: factory.sub_menu(),
                event: factory.menu_event(),
            })
            .collect()
    }
}
