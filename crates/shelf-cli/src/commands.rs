use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{json, Value};
use shelf_store::{NamespacedStore, QuotaTracker, StoreConfig};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = StoreConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(namespace) = cli.namespace {
        config.namespace = namespace;
    }
    let output = execute(cli.command, &config, cli.format)?;
    println!("{output}");
    Ok(())
}

/// Run one command against the configured store and render its output.
pub fn execute(command: Command, config: &StoreConfig, format: OutputFormat) -> anyhow::Result<String> {
    let open = || -> anyhow::Result<NamespacedStore> {
        let backend = config.open_backend().context("opening backend")?;
        Ok(NamespacedStore::new(backend, config.namespace.clone()))
    };
    match command {
        Command::Set(args) => cmd_set(&open()?, args, format),
        Command::Get(args) => cmd_get(&open()?, args, format),
        Command::Remove(args) => cmd_remove(&open()?, args, format),
        Command::Clear => cmd_clear(&open()?, format),
        Command::Keys => cmd_keys(&open()?, format),
        Command::Size => cmd_size(&open()?, format),
        Command::Put(args) => cmd_put(open()?, config.max_size, args, format),
        Command::Usage => cmd_usage(open()?, config.max_size, format),
        Command::Cleanup => cmd_cleanup(open()?, config.max_size, format),
        Command::ShowConfig => cmd_show_config(config, format),
    }
}

fn parse_value(text: &str) -> anyhow::Result<Value> {
    serde_json::from_str(text).with_context(|| format!("value is not valid JSON: {text}"))
}

fn cmd_set(store: &NamespacedStore, args: SetArgs, format: OutputFormat) -> anyhow::Result<String> {
    let value = parse_value(&args.value)?;
    store.set_item(&args.key, &value)?;
    Ok(match format {
        OutputFormat::Json => json!({"stored": args.key}).to_string(),
        OutputFormat::Text => format!("{} Stored {}", "✓".green().bold(), args.key.yellow()),
    })
}

fn cmd_get(store: &NamespacedStore, args: GetArgs, format: OutputFormat) -> anyhow::Result<String> {
    let value = match args.default {
        Some(default) => store.get_item_or(&args.key, parse_value(&default)?),
        None => match store.get_item::<Value>(&args.key)? {
            Some(value) => value,
            None => bail!("nothing stored under {}", args.key),
        },
    };
    Ok(match format {
        OutputFormat::Json => value.to_string(),
        OutputFormat::Text => serde_json::to_string_pretty(&value)?,
    })
}

fn cmd_remove(store: &NamespacedStore, args: KeyArgs, format: OutputFormat) -> anyhow::Result<String> {
    let removed = store.remove_item(&args.key)?;
    Ok(match format {
        OutputFormat::Json => json!({"key": args.key, "removed": removed}).to_string(),
        OutputFormat::Text if removed => format!("{} Removed {}", "✓".green().bold(), args.key.yellow()),
        OutputFormat::Text => format!("Nothing stored under {}", args.key.yellow()),
    })
}

fn cmd_clear(store: &NamespacedStore, format: OutputFormat) -> anyhow::Result<String> {
    let removed = store.clear()?;
    Ok(match format {
        OutputFormat::Json => json!({"namespace": store.prefix(), "removed": removed}).to_string(),
        OutputFormat::Text => format!(
            "{} Cleared {} ({} keys)",
            "✓".green().bold(),
            store.prefix().cyan(),
            removed
        ),
    })
}

fn cmd_keys(store: &NamespacedStore, format: OutputFormat) -> anyhow::Result<String> {
    let keys = store.get_all_keys()?;
    Ok(match format {
        OutputFormat::Json => json!(keys).to_string(),
        OutputFormat::Text if keys.is_empty() => format!("No keys in {}", store.prefix().cyan()),
        OutputFormat::Text => keys.join("\n"),
    })
}

fn cmd_size(store: &NamespacedStore, format: OutputFormat) -> anyhow::Result<String> {
    let total = store.get_storage_size()?;
    let scoped = store.namespace_size()?;
    Ok(match format {
        OutputFormat::Json => json!({"total_bytes": total, "namespace_bytes": scoped}).to_string(),
        OutputFormat::Text => format!(
            "Backend: {} bytes\nNamespace {}: {} bytes",
            total.to_string().bold(),
            store.prefix().cyan(),
            scoped.to_string().bold()
        ),
    })
}

fn cmd_put(store: NamespacedStore, max_size: u64, args: SetArgs, format: OutputFormat) -> anyhow::Result<String> {
    let value = parse_value(&args.value)?;
    let mut tracker = QuotaTracker::new(store, max_size)?;
    tracker.store_data(&args.key, &value)?;
    Ok(match format {
        OutputFormat::Json => json!({
            "stored": args.key,
            "current_size": tracker.current_size(),
            "max_size": tracker.max_size(),
        })
        .to_string(),
        OutputFormat::Text => format!(
            "{} Stored {} ({}/{} bytes used)",
            "✓".green().bold(),
            args.key.yellow(),
            tracker.current_size(),
            tracker.max_size()
        ),
    })
}

fn cmd_usage(store: NamespacedStore, max_size: u64, format: OutputFormat) -> anyhow::Result<String> {
    let tracker = QuotaTracker::new(store, max_size)?;
    let over = tracker.current_size() > tracker.max_size();
    Ok(match format {
        OutputFormat::Json => json!({
            "current_size": tracker.current_size(),
            "max_size": tracker.max_size(),
            "remaining": tracker.remaining(),
        })
        .to_string(),
        OutputFormat::Text => {
            let used = format!("{}/{} bytes", tracker.current_size(), tracker.max_size());
            let used = if over { used.red().bold() } else { used.green() };
            format!("Quota: {used} ({} remaining)", tracker.remaining())
        }
    })
}

fn cmd_cleanup(store: NamespacedStore, max_size: u64, format: OutputFormat) -> anyhow::Result<String> {
    let mut tracker = QuotaTracker::new(store, max_size)?;
    let report = tracker.cleanup()?;
    Ok(match format {
        OutputFormat::Json => json!({
            "evicted": report.evicted,
            "freed_bytes": report.freed_bytes,
            "current_size": report.current_size,
        })
        .to_string(),
        OutputFormat::Text => {
            let mut out = format!(
                "{} Cleanup: {} evicted, {} bytes freed",
                "✓".green().bold(),
                report.evicted.len(),
                report.freed_bytes
            );
            for key in &report.evicted {
                out.push_str(&format!("\n  {} {}", "evicted:".red(), key));
            }
            out
        }
    })
}

fn cmd_show_config(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(config)?,
        OutputFormat::Text => config.to_toml_string()?,
    })
}
