use clap::{Parser, error::ErrorKind};
use log::*;

use mainline::{Args, Result, Workspace, release};

fn initialize_logger(debug: bool) -> Result<()> {
    let filter = if debug {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };

    let config = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("mainline")
        .build();

    simplelog::TermLogger::init(
        filter,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    Ok(())
}

/// Parse arguments, exiting 0 for help/version and 1 for usage errors.
fn parse_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = parse_args();
    initialize_logger(args.debug)?;

    let cfg = args.into_config()?;
    let workspace = Workspace::create()?;

    // The procedure itself is strictly sequential and blocking; the only
    // concurrency is the signal listener that turns an operator interrupt
    // into orderly workspace cleanup.
    let task_cfg = cfg.clone();
    let task_root = workspace.path().to_path_buf();
    let procedure =
        tokio::task::spawn_blocking(move || release::run(&task_cfg, &task_root));

    tokio::select! {
        joined = procedure => {
            let report = joined??;
            if cfg.dry_run {
                info!("dry-run complete: no mutating operations were performed");
            } else {
                info!(
                    "release complete: pushed {} on develop and {} on main",
                    report.dev_tag, report.release_tag
                );
                if report.resolved_conflict {
                    info!("manifest merge conflict was resolved from develop");
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted: cleaning up workspace");
            drop(workspace);
            std::process::exit(1);
        }
    }

    Ok(())
}
