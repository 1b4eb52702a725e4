mod cli;
mod error;
mod host;
mod install_lock;
mod logging;
mod settings;

use std::process::ExitCode;

use clap::Parser;
use hoist_core::archive::InstallProgress;
use hoist_core::{Caller, Capability, UpdateError};
use hoist_platform::AppPaths;
use log::error;
use tokio::sync::mpsc;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::host::Host;
use crate::settings::Settings;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let paths = AppPaths::new()?;
    let settings_path = cli.config.clone().unwrap_or_else(|| paths.settings_file());
    let settings = Settings::load_from(&settings_path)?;

    logging::init_logging(
        &paths,
        cli.debug || settings.debug_logging,
        settings.max_log_size_bytes,
    );

    let caller = if cli.viewer {
        Caller::viewer()
    } else {
        Caller::operator()
    };
    let host = Host::new(paths, &settings)?;
    let updater = host.updater();

    match cli.command {
        Commands::Status => println!("{}", host.status()),
        Commands::Check { force } => {
            let update = if force {
                updater.force_check(&caller).await?
            } else {
                updater.check_for_update().await
            };
            host.record_availability(update.as_ref());
            match update {
                Some(update) => println!(
                    "Update available: {} -> {} ({})",
                    updater.current_version(),
                    update.version,
                    update.display_url
                ),
                None => println!("{} is up to date", updater.current_version()),
            }
        }
        Commands::Notice => {
            if let Some(notice) = updater.update_notice(&caller).await {
                println!("{notice}");
            }
        }
        Commands::Info => match updater.package_information().await {
            Some(info) => {
                let json = serde_json::to_string_pretty(&info).map_err(|error| {
                    CliError::io("failed to encode package information", error.into())
                })?;
                println!("{json}");
            }
            None => println!("Package information is unavailable right now"),
        },
        Commands::Install => {
            if !caller.can(Capability::UpdatePackages) {
                return Err(UpdateError::PermissionDenied {
                    action: "install updates",
                }
                .into());
            }
            let Some(update) = updater.check_for_update().await else {
                println!("{} is up to date", updater.current_version());
                return Ok(());
            };

            let (tx, rx) = mpsc::channel(32);
            let reporter = tokio::spawn(report_progress(rx));
            let result = host.install(&update, Some(&tx)).await;
            drop(tx);
            let _ = reporter.await;

            let result = result?;
            println!(
                "Installed {} {} at {}",
                update.slug,
                updater.current_version(),
                result.destination.display()
            );
        }
        Commands::ClearCache => {
            updater.clear_caches(&caller)?;
            println!("Update caches cleared");
        }
    }

    Ok(())
}

async fn report_progress(mut rx: mpsc::Receiver<InstallProgress>) {
    let mut last_percent = None;
    while let Some(event) = rx.recv().await {
        match event {
            InstallProgress::Downloading { downloaded, total } if total > 0 => {
                let percent = downloaded.saturating_mul(100) / total;
                if last_percent != Some(percent) && percent % 10 == 0 {
                    eprintln!("Downloading... {percent}%");
                    last_percent = Some(percent);
                }
            }
            InstallProgress::Downloading { .. } => {}
            InstallProgress::Extracting => eprintln!("Extracting package"),
            InstallProgress::Installing => eprintln!("Installing package"),
            InstallProgress::Complete(_) | InstallProgress::Failed(_) => {}
        }
    }
}
