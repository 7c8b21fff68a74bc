use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize, Serializer};
use serde_yaml::{Mapping, Value};

use super::yaml::{load_yaml, write_yaml_atomic};
use crate::{desktop::StartupRegistry, info, warn, DEBUG_NAME};

pub const DEFAULT_INTERVAL_MINUTES: u32 = 10;
pub const MIN_INTERVAL_MINUTES: u32 = 1;

/// The persisted settings record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Config {
    /// Root of the picture tree. `None` disables rotation.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_folder")]
    pub wallpaper_folder: Option<PathBuf>,
    pub interval_minutes: u32,
    pub randomize: bool,
    pub run_at_startup: bool,
    /// Index into the catalog as it was ordered at the last rotation. May be
    /// out of range for the current folder contents.
    pub last_index: usize,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallpaper_folder: None,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            randomize: false,
            run_at_startup: false,
            last_index: 0,
            debug: false,
        }
    }
}

/// Writes the folder as text. A path that is not valid Unicode is stored
/// lossily rather than failing the whole document.
fn serialize_folder<S: Serializer>(
    folder: &Option<PathBuf>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match folder {
        Some(path) => serializer.serialize_some(path.to_string_lossy().as_ref()),
        None => serializer.serialize_none(),
    }
}

/// A settings-save request. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallpaper_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub randomize: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at_startup: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.wallpaper_folder.is_none()
            && self.interval_minutes.is_none()
            && self.randomize.is_none()
            && self.run_at_startup.is_none()
    }
}

/// Clamps a user supplied interval into the accepted range.
pub fn clamp_interval(minutes: i64) -> u32 {
    minutes.clamp(MIN_INTERVAL_MINUTES as i64, u32::MAX as i64) as u32
}

impl Config {
    /// Builds a record from a parsed document. Keys that are missing or of
    /// the wrong type fall back to their defaults one by one.
    pub fn from_yaml(root: &Value) -> Self {
        let mut config = Self::default();
        let Some(map) = root.as_mapping() else {
            return config;
        };

        // Surrounding whitespace is part of the path; only a blank value means unset.
        config.wallpaper_folder = str_any(map, &["wallpaper_folder", "folder"])
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        config.interval_minutes = i64_any(map, &["interval_minutes", "change_interval"])
            .map(clamp_interval)
            .unwrap_or(config.interval_minutes);
        config.randomize =
            bool_any(map, &["randomize", "randomize_wallpapers"]).unwrap_or(config.randomize);
        config.run_at_startup = bool_at(map, "run_at_startup").unwrap_or(config.run_at_startup);
        config.last_index = u64_at(map, "last_index")
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(config.last_index);
        config.debug = bool_at(map, "debug").unwrap_or(config.debug);

        config
    }

    /// Returns the record with every invariant re-established.
    pub fn normalized(mut self) -> Self {
        self.interval_minutes = self.interval_minutes.max(MIN_INTERVAL_MINUTES);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes.max(MIN_INTERVAL_MINUTES)) * 60)
    }

    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(folder) = &patch.wallpaper_folder {
            if folder.to_str().is_none() {
                warn!(
                    "[{}][CONFIG] Folder {} is not valid Unicode; it will be saved as shown",
                    DEBUG_NAME,
                    folder.display()
                );
            }
            self.wallpaper_folder = if folder.as_os_str().is_empty() {
                None
            } else {
                Some(folder.clone())
            };
        }
        if let Some(minutes) = patch.interval_minutes {
            self.interval_minutes = clamp_interval(minutes);
        }
        if let Some(randomize) = patch.randomize {
            self.randomize = randomize;
        }
        if let Some(run_at_startup) = patch.run_at_startup {
            self.run_at_startup = run_at_startup;
        }
    }
}

/// Loads and saves the settings record at a fixed path.
///
/// Saving also reconciles the OS startup registration with
/// `run_at_startup`; the record is the source of truth.
pub struct ConfigStore {
    path: PathBuf,
    startup: Box<dyn StartupRegistry>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, startup: Box<dyn StartupRegistry>) -> Self {
        Self { path, startup }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Never fails: a missing or corrupt file yields the defaults.
    pub fn load(&self) -> Config {
        match load_yaml(&self.path) {
            Some(value) => Config::from_yaml(&value),
            None => {
                if self.path.exists() {
                    warn!(
                        "[{}][CONFIG] {} is unreadable or corrupt; using defaults",
                        DEBUG_NAME,
                        self.path.display()
                    );
                } else {
                    info!("[{}][CONFIG] No config at {}; using defaults", DEBUG_NAME, self.path.display());
                }
                Config::default()
            }
        }
    }

    /// Persists `config` and re-applies the startup registration.
    ///
    /// Returns whether the file was written. A failed write is logged and
    /// dropped; the caller's in-memory record stays authoritative.
    pub fn save(&self, config: &Config) -> bool {
        let config = config.clone().normalized();

        let written = match write_yaml_atomic(&self.path, &config) {
            Ok(()) => true,
            Err(e) => {
                warn!("[{}][CONFIG] Failed to save {}: {}", DEBUG_NAME, self.path.display(), e);
                false
            }
        };

        self.reconcile_startup(config.run_at_startup);
        written
    }

    /// Brings the OS login registration in line with `enabled`, logging failures.
    pub fn reconcile_startup(&self, enabled: bool) {
        if let Err(e) = self.startup.reconcile(enabled) {
            warn!("[{}][STARTUP] Failed to apply run_at_startup={}: {}", DEBUG_NAME, enabled, e);
        }
    }
}

fn bool_at(map: &Mapping, key: &str) -> Option<bool> {
    map.get(Value::String(key.to_string()))?.as_bool()
}

fn bool_any(map: &Mapping, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| bool_at(map, k))
}

fn str_at<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(Value::String(key.to_string()))?.as_str()
}

fn str_any<'a>(map: &'a Mapping, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| str_at(map, k))
}

fn i64_at(map: &Mapping, key: &str) -> Option<i64> {
    map.get(Value::String(key.to_string()))?.as_i64()
}

fn i64_any(map: &Mapping, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| i64_at(map, k))
}

fn u64_at(map: &Mapping, key: &str) -> Option<u64> {
    map.get(Value::String(key.to_string()))?.as_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{desktop::StartupRegistry, error::Error};
    use std::{cell::RefCell, fs, rc::Rc};

    #[derive(Clone, Default)]
    struct RecordingStartup {
        calls: Rc<RefCell<Vec<bool>>>,
        fail: bool,
    }

    impl StartupRegistry for RecordingStartup {
        fn reconcile(&self, enabled: bool) -> crate::error::Result<()> {
            self.calls.borrow_mut().push(enabled);
            if self.fail {
                return Err(Error::Platform("registry locked".to_string()));
            }
            Ok(())
        }
    }

    fn store_in(dir: &Path) -> (ConfigStore, RecordingStartup) {
        let startup = RecordingStartup::default();
        let store = ConfigStore::new(dir.join("config.yaml"), Box::new(startup.clone()));
        (store, startup)
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn corrupt_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        fs::write(store.path(), "{ wallpaper_folder: [").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn non_mapping_document_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        fs::write(store.path(), "- just\n- a\n- list\n").unwrap();
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        let config = Config {
            wallpaper_folder: Some(PathBuf::from("/home/me/Pictures/walls")),
            interval_minutes: 25,
            randomize: true,
            run_at_startup: true,
            last_index: 7,
            debug: true,
        };

        assert!(store.save(&config));
        assert_eq!(store.load(), config);
    }

    #[test]
    fn default_record_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        assert!(store.save(&Config::default()));
        assert_eq!(store.load(), Config::default());
    }

    #[test]
    fn zero_interval_is_clamped_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        let config = Config {
            interval_minutes: 0,
            ..Config::default()
        };

        store.save(&config);
        assert_eq!(store.load().interval_minutes, MIN_INTERVAL_MINUTES);
    }

    #[test]
    fn negative_interval_in_file_is_clamped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        fs::write(store.path(), "interval_minutes: -5\n").unwrap();
        assert_eq!(store.load().interval_minutes, MIN_INTERVAL_MINUTES);
    }

    #[test]
    fn legacy_json_keys_are_understood() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        fs::write(
            store.path(),
            r#"{"wallpaper_folder": "C:/Walls", "change_interval": 3, "run_at_startup": true, "randomize_wallpapers": true}"#,
        )
        .unwrap();

        let config = store.load();
        assert_eq!(config.wallpaper_folder, Some(PathBuf::from("C:/Walls")));
        assert_eq!(config.interval_minutes, 3);
        assert!(config.randomize);
        assert!(config.run_at_startup);
    }

    #[test]
    fn unknown_and_mistyped_keys_fall_back_individually() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        fs::write(
            store.path(),
            "theme: dark\nrandomize: maybe\ninterval_minutes: 15\nlast_index: -2\nwallpaper_folder: '  '\n",
        )
        .unwrap();

        let config = store.load();
        assert_eq!(config.interval_minutes, 15);
        assert!(!config.randomize);
        assert_eq!(config.last_index, 0);
        assert_eq!(config.wallpaper_folder, None);
    }

    #[test]
    fn save_reconciles_startup_registration_every_time() {
        let dir = tempfile::tempdir().unwrap();
        let (store, startup) = store_in(dir.path());

        store.save(&Config {
            run_at_startup: true,
            ..Config::default()
        });
        store.save(&Config::default());

        assert_eq!(*startup.calls.borrow(), vec![true, false]);
    }

    #[test]
    fn startup_failure_does_not_prevent_the_write() {
        let dir = tempfile::tempdir().unwrap();
        let startup = RecordingStartup {
            fail: true,
            ..RecordingStartup::default()
        };
        let store = ConfigStore::new(dir.path().join("config.yaml"), Box::new(startup));

        assert!(store.save(&Config::default()));
        assert!(store.path().exists());
    }

    #[test]
    fn unwritable_location_is_dropped_silently() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not dir").unwrap();
        let startup = RecordingStartup::default();
        let store = ConfigStore::new(blocker.join("config.yaml"), Box::new(startup.clone()));

        assert!(!store.save(&Config::default()));
        assert_eq!(*startup.calls.borrow(), vec![false]);
    }

    #[test]
    fn patch_applies_only_set_fields_and_clamps_interval() {
        let mut config = Config {
            wallpaper_folder: Some(PathBuf::from("/old")),
            ..Config::default()
        };

        config.apply(&SettingsPatch {
            interval_minutes: Some(-3),
            randomize: Some(true),
            ..SettingsPatch::default()
        });

        assert_eq!(config.wallpaper_folder, Some(PathBuf::from("/old")));
        assert_eq!(config.interval_minutes, MIN_INTERVAL_MINUTES);
        assert!(config.randomize);
        assert!(!config.run_at_startup);
    }

    #[test]
    fn empty_folder_in_patch_disables_rotation() {
        let mut config = Config {
            wallpaper_folder: Some(PathBuf::from("/old")),
            ..Config::default()
        };
        config.apply(&SettingsPatch {
            wallpaper_folder: Some(PathBuf::new()),
            ..SettingsPatch::default()
        });
        assert_eq!(config.wallpaper_folder, None);
    }

    #[test]
    fn interval_is_expressed_in_minutes() {
        let config = Config {
            interval_minutes: 2,
            ..Config::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(120));
    }

    #[test]
    fn patch_emptiness() {
        assert!(SettingsPatch::default().is_empty());
        assert!(!SettingsPatch {
            run_at_startup: Some(false),
            ..SettingsPatch::default()
        }
        .is_empty());
    }

    #[test]
    fn folder_with_surrounding_whitespace_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        let config = Config {
            wallpaper_folder: Some(PathBuf::from(" /srv/walls ")),
            ..Config::default()
        };

        assert!(store.save(&config));
        assert_eq!(store.load(), config);
    }

    #[cfg(unix)]
    #[test]
    fn non_unicode_folder_does_not_block_saving() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_in(dir.path());
        let folder = PathBuf::from(OsStr::from_bytes(b"/srv/w\xffalls"));
        let config = Config {
            wallpaper_folder: Some(folder.clone()),
            last_index: 3,
            ..Config::default()
        };

        assert!(store.save(&config));
        let loaded = store.load();
        assert_eq!(loaded.last_index, 3);
        assert_eq!(
            loaded.wallpaper_folder,
            Some(PathBuf::from(folder.to_string_lossy().into_owned()))
        );
    }
}
