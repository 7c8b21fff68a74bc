use std::{
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
};

use crate::{
    catalog,
    data_loaders::config::{Config, ConfigStore, SettingsPatch},
    desktop::WallpaperSetter,
    info,
    ipc_connector::Command,
    paths::expand_tilde,
    rotation::RotationEngine,
    scheduler::{Event, Scheduler},
    utility::absolute_path,
    warn, DEBUG_NAME,
};

/// The owner's rotation state plus the collaborators it drives.
///
/// Only the owner loop touches this, one event at a time.
pub struct WallpaperRuntime {
    store: ConfigStore,
    config: Config,
    engine: RotationEngine,
    setter: Box<dyn WallpaperSetter>,
}

impl WallpaperRuntime {
    /// Loads the persisted record. Out-of-range cursors are left as they
    /// are and wrapped at the next rotation.
    pub fn new(store: ConfigStore, setter: Box<dyn WallpaperSetter>) -> Self {
        let config = store.load();
        let engine = RotationEngine::from_config(&config);
        Self {
            store,
            config,
            engine,
            setter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn folder(&self) -> Option<PathBuf> {
        self.config
            .wallpaper_folder
            .as_ref()
            .map(|folder| absolute_path(&expand_tilde(&folder.to_string_lossy())))
    }

    /// Scans the folder, picks the next image and applies it.
    ///
    /// Returns the selected image. An unset, missing or empty folder is a
    /// no-op. A failed OS call is logged and the cursor still advances, so a
    /// broken file cannot pin the rotation.
    pub fn rotate(&mut self) -> Option<PathBuf> {
        let Some(folder) = self.folder() else {
            info!("[{}] No wallpaper folder configured; skipping rotation", DEBUG_NAME);
            return None;
        };

        let images = catalog::scan(&folder);
        let Some(image) = self.engine.select_next(&images).map(Path::to_path_buf) else {
            info!("[{}] No supported images under {}", DEBUG_NAME, folder.display());
            return None;
        };

        self.config.last_index = self.engine.last_index();
        match self.setter.set_wallpaper(&image) {
            Ok(()) => info!(
                "[{}] Wallpaper {}/{} -> {}",
                DEBUG_NAME,
                self.config.last_index + 1,
                images.len(),
                image.display()
            ),
            Err(e) => warn!("[{}] Failed to apply {}: {}", DEBUG_NAME, image.display(), e),
        }

        self.store.save(&self.config);
        Some(image)
    }

    /// The settings-save action: merge, clamp and persist.
    pub fn configure(&mut self, patch: &SettingsPatch) {
        self.config.apply(patch);
        self.config.last_index = self.engine.last_index();
        self.engine.set_randomize(self.config.randomize);
        self.store.save(&self.config);
        info!("[{}] Settings saved to {}", DEBUG_NAME, self.store.path().display());
    }

    /// Re-applies the login registration from the loaded record.
    pub fn reconcile_startup(&self) {
        self.store.reconcile_startup(self.config.run_at_startup);
    }

    /// Handles one queued event. Returns `false` when the owner should exit.
    pub fn handle(&mut self, event: Event, scheduler: &Scheduler) -> bool {
        match event {
            Event::Tick | Event::Command(Command::Advance) => {
                self.rotate();
            }
            Event::Command(Command::Configure { patch }) => {
                self.configure(&patch);
                scheduler.rearm(self.config.interval());
                self.rotate();
            }
            Event::Command(Command::Quit) => {
                warn!("[{}] Quit requested", DEBUG_NAME);
                return false;
            }
        }
        true
    }

    /// Drains the owner's event queue until a quit or until every sender is gone.
    pub fn run(&mut self, events: &Receiver<Event>, scheduler: &Scheduler) {
        while let Ok(event) = events.recv() {
            if !self.handle(event, scheduler) {
                break;
            }
        }
    }
}
