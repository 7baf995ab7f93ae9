mod cli;

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use mediacast::common::{Config, DeviceIdentity};
use mediacast::devices::ProfileInstance;
use mediacast::MediaCast;

const LAYER_NAMES: [&str; 3] = ["device", "renderer", "global"];

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "mediacast=trace,mediacast_devices=trace,mediacast_settings=debug,mediacast_webfilters=debug".to_string()
        } else {
            "mediacast=info,mediacast_devices=info,mediacast_settings=warn,mediacast_webfilters=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(cli.config.as_deref()))
        }
        Commands::Resolve { id, key, model } => resolve(cli.config.as_deref(), &id, &key, model.as_deref()),
        Commands::Filter { url } => filter(cli.config.as_deref(), &url),
        Commands::Validate { config: config_path } => {
            let path = config_path.or(cli.config);
            validate(path.as_deref())
        }
        Commands::NewDevice { id, name } => new_device(cli.config.as_deref(), &id, &name),
        Commands::Version => {
            println!("mediacast {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(config_path: Option<&Path>) -> Result<()> {
    let app = MediaCast::from_config(Config::load_or_default(config_path));
    let report = app.startup_report();
    tracing::info!(
        devices = report.devices.as_ref().map(|d| d.ids).unwrap_or(0),
        models = report.models,
        rules = report.filters.as_ref().map(|f| f.accepted()).unwrap_or(0),
        "Starting mediacast"
    );
    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }

    let _watcher = app.start_watcher().context("Failed to start device watcher")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutting down...");
    Ok(())
}

fn identity_for(id: &str) -> DeviceIdentity {
    if id.parse::<IpAddr>().is_ok() {
        DeviceIdentity::from_address(id)
    } else {
        DeviceIdentity::from_stable_id(id)
    }
}

fn resolve(config_path: Option<&Path>, id: &str, key: &str, model: Option<&str>) -> Result<()> {
    let app = MediaCast::from_config(Config::load_or_default(config_path));

    let reference = match model {
        Some(name) => Some(
            app.models()
                .get(name)
                .with_context(|| format!("Unknown renderer model: {name}"))?,
        ),
        None => None,
    };

    let profile = ProfileInstance::new(identity_for(id), app.profiles().context().clone());
    profile.bind(reference);
    let snapshot = profile.snapshot();

    match snapshot.cascade().defining_layer(key) {
        Some(layer) => {
            let value = snapshot.cascade().raw(key).unwrap_or_default();
            println!("{key} = {value}");
            let source = match (layer, snapshot.device_file()) {
                (0, Some(path)) => format!("device file {}", path.display()),
                (1, _) => format!("renderer {}", snapshot.reference_name().unwrap_or("-")),
                _ => LAYER_NAMES.get(layer).copied().unwrap_or("unknown").to_string(),
            };
            println!("  from: {source}");
        }
        None => println!("{key} is not set for {id}"),
    }
    Ok(())
}

fn filter(config_path: Option<&Path>, url: &str) -> Result<()> {
    let app = MediaCast::from_config(Config::load_or_default(config_path));
    let filters = app.filters();

    println!("URL: {url}");
    match filters.excludes().matching_pattern(url) {
        Some(pattern) => println!("  Excluded: yes ({pattern})"),
        None => println!("  Excluded: no"),
    }
    match filters.auto_options_for(url) {
        Some(opts) => println!("  Options: {}", opts.join(" ")),
        None => println!("  Options: none"),
    }
    let rewritten = filters.rewrite(url);
    if rewritten != url {
        println!("  Rewritten: {rewritten}");
    } else {
        println!("  Rewritten: unchanged");
    }
    Ok(())
}

fn validate(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let text = std::fs::read_to_string(p).with_context(|| format!("Failed to read {}", p.display()))?;
            Config::from_toml(&text).with_context(|| format!("Invalid config {}", p.display()))?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let mut warnings = config.validate();
    let app = MediaCast::from_config(config);
    let report = app.startup_report();
    warnings.extend(report.warnings.iter().cloned());

    println!("  Device dir: {}", app.config().profiles.device_dir.display());
    if let Some(ref devices) = report.devices {
        println!("  Device files: {} ({} ids)", devices.files, devices.ids);
    }
    println!("  Renderer models: {}", report.models);
    println!("  Global settings: {} keys", report.global_keys);
    if let Some(ref filters) = report.filters {
        println!(
            "  Web filters: {} exclude, {} options, {} replace",
            filters.excludes.accepted, filters.options.accepted, filters.replacements.accepted
        );
    }
    println!("  Watch enabled: {}", app.config().watch.enabled);

    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Warnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    Ok(())
}

fn new_device(config_path: Option<&Path>, id: &str, name: &str) -> Result<()> {
    let app = MediaCast::from_config(Config::load_or_default(config_path));
    let path = app
        .create_device(id, name)
        .with_context(|| format!("Failed to create device file for {id}"))?;
    println!("{}", path.display());
    Ok(())
}
