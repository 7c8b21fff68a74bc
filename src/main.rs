#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

#[cfg(not(any(unix, windows)))]
compile_error!("wallchanger supports Windows and Unix desktops only");

mod args;
mod bootstrap;
mod catalog;
mod data_loaders;
mod desktop;
mod error;
mod instance;
mod ipc_connector;
mod ipc_server;
mod logging;
mod paths;
mod rotation;
mod scheduler;
mod utility;
mod wallpaper_engine;

use std::{
    io::{self, BufRead},
    process::ExitCode,
    thread,
};

use clap::Parser;

use crate::{
    args::Args,
    data_loaders::config::{Config, ConfigStore},
    desktop::{SystemStartup, SystemWallpaper},
    instance::Role,
    ipc_connector::{Command, Endpoint},
    scheduler::{Scheduler, Trigger},
    wallpaper_engine::WallpaperRuntime,
};

pub const APP_NAME: &str = "wallchanger";
pub const DEBUG_NAME: &str = "WALLCHANGER";

fn main() -> ExitCode {
    let args = Args::parse();

    logging::init(false);
    std::panic::set_hook(Box::new(|panic_info| {
        error!("[{}] Panic: {}", DEBUG_NAME, panic_info);
    }));

    let endpoint = Endpoint::for_current_user();
    let ownership = match instance::acquire(&endpoint) {
        Ok(Role::Owner(ownership)) => ownership,
        Ok(Role::Relay) => {
            if let Some(command) = args.relay_command() {
                ipc_connector::relay(&endpoint, &command);
            }
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!("[{}] Cannot take the instance lock: {}", DEBUG_NAME, e);
            eprintln!("{APP_NAME}: cannot take the instance lock: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.quit {
        info!("[{}] --quit with no running instance; nothing to do", DEBUG_NAME);
        return ExitCode::SUCCESS;
    }

    run_owner(&args, ownership);
    ExitCode::SUCCESS
}

fn run_owner(args: &Args, mut ownership: instance::Ownership) {
    let config_path = args.config.clone().unwrap_or_else(paths::default_config_path);
    bootstrap::prepare(&config_path);

    let store = ConfigStore::new(config_path.clone(), Box::new(SystemStartup::new()));
    let mut runtime = WallpaperRuntime::new(store, Box::new(SystemWallpaper));
    logging::set_debug(runtime.config().debug);

    info!("!---------- [{}] Starting wallpaper rotator ----------!", DEBUG_NAME);
    info!("[{}] Config loaded from {}", DEBUG_NAME, config_path.display());

    match args.settings_patch() {
        Some(patch) => runtime.configure(&patch),
        None => runtime.reconcile_startup(),
    }

    if !args.background() {
        print_summary(runtime.config(), &config_path);
    }

    runtime.rotate();

    let (scheduler, events) = Scheduler::start(runtime.config().interval());
    info!("[{}] Rotating every {}s", DEBUG_NAME, scheduler.period().as_secs());
    if !ownership.listen(scheduler.trigger()) {
        warn!("[{}] Running without the command endpoint; relays will be ignored", DEBUG_NAME);
    }
    if !args.background() {
        spawn_console_controls(scheduler.trigger());
    }

    runtime.run(&events, &scheduler);
    info!("[{}] Shutting down", DEBUG_NAME);
}

fn print_summary(config: &Config, config_path: &std::path::Path) {
    let folder = config
        .wallpaper_folder
        .as_ref()
        .map(|f| f.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string());

    println!("{APP_NAME} is running");
    println!("  folder:          {folder}");
    println!("  interval:        {} min", config.interval_minutes);
    println!("  randomize:       {}", config.randomize);
    println!("  run at startup:  {}", config.run_at_startup);
    println!("  config:          {}", config_path.display());
    println!("Type `n` for the next wallpaper, `q` to quit.");
}

/// Reads `n`/`next` and `q`/`quit` lines from stdin. Stops at end of input.
fn spawn_console_controls(trigger: Trigger) {
    let spawned = thread::Builder::new()
        .name("console-controls".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let queued = match line.trim().to_ascii_lowercase().as_str() {
                    "n" | "next" => trigger.advance_now(),
                    "q" | "quit" | "exit" => {
                        trigger.send(Command::Quit);
                        break;
                    }
                    "" => true,
                    other => {
                        println!("unknown command `{other}` (n = next, q = quit)");
                        true
                    }
                };
                if !queued {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!("[{}] Failed to start console controls: {}", DEBUG_NAME, e);
    }
}
