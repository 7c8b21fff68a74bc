//! CLI argument definitions.

use std::path::PathBuf;

use clap::{builder::BoolishValueParser, ArgAction, Parser};

use crate::{data_loaders::config::SettingsPatch, ipc_connector::Command, utility::absolute_path};

#[derive(Debug, Parser)]
#[command(name = "wallchanger", version)]
#[command(about = "Rotates the desktop wallpaper through a folder of images", long_about = None)]
pub struct Args {
    /// Run in the background without printing the current settings.
    #[arg(long, alias = "minimized")]
    pub hidden: bool,

    /// Ask the running instance to change the wallpaper now.
    #[arg(long)]
    pub next: bool,

    /// Ask the running instance to exit.
    #[arg(long, conflicts_with = "next")]
    pub quit: bool,

    /// Folder to pick wallpapers from. An empty value disables rotation.
    #[arg(long, value_name = "PATH")]
    pub folder: Option<PathBuf>,

    /// Minutes between changes; values below 1 are raised to 1.
    #[arg(long, value_name = "MINUTES", allow_negative_numbers = true)]
    pub interval: Option<i64>,

    /// Pick images at random instead of in order.
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub randomize: Option<bool>,

    /// Register or unregister launching at login.
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, value_parser = BoolishValueParser::new())]
    pub run_at_startup: Option<bool>,

    /// Use a different config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// The owner should stay quiet: no settings summary, no console controls.
    pub fn background(&self) -> bool {
        self.hidden || self.next
    }

    /// Settings flags as a patch. Relative folders are resolved against the
    /// caller's working directory, since the owner may run elsewhere.
    pub fn settings_patch(&self) -> Option<SettingsPatch> {
        let patch = SettingsPatch {
            wallpaper_folder: self.folder.as_deref().map(absolute_path),
            interval_minutes: self.interval,
            randomize: self.randomize,
            run_at_startup: self.run_at_startup,
        };
        (!patch.is_empty()).then_some(patch)
    }

    /// What a relay forwards to the owner, if anything.
    pub fn relay_command(&self) -> Option<Command> {
        if self.quit {
            return Some(Command::Quit);
        }
        if let Some(patch) = self.settings_patch() {
            return Some(Command::Configure { patch });
        }
        self.next.then_some(Command::Advance)
    }
}
