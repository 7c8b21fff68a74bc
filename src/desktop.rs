//! OS side effects: applying a wallpaper and the run-at-login registration.
//!
//! Both are fire-and-forget from the rotation's point of view; callers log
//! the returned error and carry on.

use std::path::Path;

use crate::error::Result;

pub trait WallpaperSetter {
    /// Applies `image` (an absolute path) as the desktop background.
    fn set_wallpaper(&self, image: &Path) -> Result<()>;
}

pub trait StartupRegistry {
    /// Makes the OS login registration match `enabled`. Idempotent.
    fn reconcile(&self, enabled: bool) -> Result<()>;
}

pub struct SystemWallpaper;

impl WallpaperSetter for SystemWallpaper {
    fn set_wallpaper(&self, image: &Path) -> Result<()> {
        platform::set_wallpaper(image)
    }
}

pub struct SystemStartup {
    launch_command: Option<String>,
    #[cfg(unix)]
    autostart_entry: Option<std::path::PathBuf>,
}

impl SystemStartup {
    pub fn new() -> Self {
        Self {
            launch_command: crate::utility::background_launch_command(),
            #[cfg(unix)]
            autostart_entry: dirs::config_dir()
                .map(|d| d.join("autostart").join(format!("{}.desktop", crate::APP_NAME))),
        }
    }
}

impl StartupRegistry for SystemStartup {
    fn reconcile(&self, enabled: bool) -> Result<()> {
        #[cfg(windows)]
        {
            platform::reconcile_run_key(enabled, self.launch_command.as_deref())
        }
        #[cfg(unix)]
        {
            platform::reconcile_autostart(
                enabled,
                self.autostart_entry.as_deref(),
                self.launch_command.as_deref(),
            )
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::{ffi::c_void, path::Path};

    use windows::{
        core::{w, PCWSTR},
        Win32::{
            Foundation::ERROR_FILE_NOT_FOUND,
            System::Registry::{RegDeleteKeyValueW, RegSetKeyValueW, HKEY_CURRENT_USER, REG_SZ},
            UI::WindowsAndMessaging::{
                SystemParametersInfoW, SPIF_SENDCHANGE, SPIF_UPDATEINIFILE, SPI_SETDESKWALLPAPER,
            },
        },
    };

    use crate::{
        error::{Error, Result},
        utility::{path_to_wstring, to_wstring},
    };

    const RUN_KEY: PCWSTR = w!("Software\\Microsoft\\Windows\\CurrentVersion\\Run");
    const RUN_VALUE: PCWSTR = w!("wallchanger");

    pub fn set_wallpaper(image: &Path) -> Result<()> {
        let wide = path_to_wstring(image);
        unsafe {
            SystemParametersInfoW(
                SPI_SETDESKWALLPAPER,
                0,
                Some(wide.as_ptr() as *mut c_void),
                SPIF_UPDATEINIFILE | SPIF_SENDCHANGE,
            )
        }
        .map_err(|e| Error::Platform(format!("SystemParametersInfoW: {e}")))
    }

    pub fn reconcile_run_key(enabled: bool, launch_command: Option<&str>) -> Result<()> {
        if !enabled {
            let status = unsafe { RegDeleteKeyValueW(HKEY_CURRENT_USER, RUN_KEY, RUN_VALUE) };
            if status == ERROR_FILE_NOT_FOUND {
                return Ok(());
            }
            return status
                .ok()
                .map_err(|e| Error::Platform(format!("RegDeleteKeyValueW: {e}")));
        }

        let command = launch_command
            .ok_or_else(|| Error::Platform("cannot resolve current executable".to_string()))?;
        let wide = to_wstring(command);
        let status = unsafe {
            RegSetKeyValueW(
                HKEY_CURRENT_USER,
                RUN_KEY,
                RUN_VALUE,
                REG_SZ.0,
                Some(wide.as_ptr() as *const c_void),
                (wide.len() * std::mem::size_of::<u16>()) as u32,
            )
        };
        status
            .ok()
            .map_err(|e| Error::Platform(format!("RegSetKeyValueW: {e}")))
    }
}

#[cfg(unix)]
mod platform {
    use std::{fs, io, path::Path, process::Command};

    use crate::error::{Error, Result};

    /// GNOME reads the background from dconf; `gsettings` is its stable CLI.
    pub fn set_wallpaper(image: &Path) -> Result<()> {
        let uri = format!("file://{}", image.display());

        let status = Command::new("gsettings")
            .args(["set", "org.gnome.desktop.background", "picture-uri", &uri])
            .status()?;
        if !status.success() {
            return Err(Error::Platform(format!("gsettings exited with {status}")));
        }

        // GNOME 42+ keeps a separate value for the dark style.
        let _ = Command::new("gsettings")
            .args(["set", "org.gnome.desktop.background", "picture-uri-dark", &uri])
            .status();

        Ok(())
    }

    pub fn reconcile_autostart(
        enabled: bool,
        entry: Option<&Path>,
        launch_command: Option<&str>,
    ) -> Result<()> {
        let entry = entry
            .ok_or_else(|| Error::Platform("cannot resolve autostart directory".to_string()))?;

        if !enabled {
            return match fs::remove_file(entry) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        let command = launch_command
            .ok_or_else(|| Error::Platform("cannot resolve current executable".to_string()))?;
        let contents = desktop_entry(command);
        if fs::read_to_string(entry).is_ok_and(|current| current == contents) {
            return Ok(());
        }

        if let Some(parent) = entry.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(entry, contents)?;
        Ok(())
    }

    pub fn desktop_entry(command: &str) -> String {
        format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name=Wallchanger\n\
             Comment=Rotates the desktop wallpaper\n\
             Exec={command}\n\
             X-GNOME-Autostart-enabled=true\n"
        )
    }
}
