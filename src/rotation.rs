//! Wallpaper selection policy.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::data_loaders::config::Config;

/// Owns the rotation cursor. Nothing else writes `last_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationEngine {
    randomize: bool,
    last_index: usize,
}

impl RotationEngine {
    pub fn new(randomize: bool, last_index: usize) -> Self {
        Self {
            randomize,
            last_index,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.randomize, config.last_index)
    }

    pub fn set_randomize(&mut self, randomize: bool) {
        self.randomize = randomize;
    }

    pub fn last_index(&self) -> usize {
        self.last_index
    }

    /// Picks the next image and moves the cursor onto it.
    ///
    /// An empty catalog leaves the cursor untouched and returns `None`.
    pub fn select_next<'a>(&mut self, catalog: &'a [PathBuf]) -> Option<&'a Path> {
        self.select_next_with(catalog, &mut rand::rng())
    }

    pub fn select_next_with<'a, R: Rng + ?Sized>(
        &mut self,
        catalog: &'a [PathBuf],
        rng: &mut R,
    ) -> Option<&'a Path> {
        if catalog.is_empty() {
            return None;
        }

        let len = catalog.len();
        let next = if self.randomize {
            // Repeats are allowed; every pick is independent.
            rng.random_range(0..len)
        } else {
            // The stored cursor may predate a shrink of the folder.
            (self.last_index % len + 1) % len
        };

        self.last_index = next;
        Some(catalog[next].as_path())
    }
}
