//! Modules command implementation.

use super::{open_dir, print_json, CliResult, OutputFormat};
use edgesync_engine::{Features, ModuleInfo, SyncConfig};
use edgesync_store::DataDir;
use std::path::Path;
use std::sync::Arc;

fn features(dir: &DataDir, config: &SyncConfig, writable: bool) -> CliResult<Features> {
    let state = if writable {
        dir.open_state()?
    } else {
        dir.open_state_read_only()?
    };
    Ok(Features::new(Arc::new(state), config.modules.clone()))
}

/// Lists modules and their state.
pub fn list(path: &Path, config: &SyncConfig, format: OutputFormat) -> CliResult<()> {
    let modules = list_modules(&open_dir(path)?, config)?;
    match format {
        OutputFormat::Json => print_json(&modules)?,
        OutputFormat::Text => {
            for module in &modules {
                let marker = if module.active { "on " } else { "off" };
                println!(
                    "  [{marker}] {:<12} {}",
                    module.descriptor.name, module.descriptor.description
                );
            }
        }
    }
    Ok(())
}

/// Modules known to the configuration with their activation state.
pub fn list_modules(dir: &DataDir, config: &SyncConfig) -> CliResult<Vec<ModuleInfo>> {
    Ok(features(dir, config, false)?.list_modules()?)
}

/// Activates or deactivates a module.
pub fn set_active(path: &Path, config: &SyncConfig, name: &str, active: bool) -> CliResult<()> {
    let features = features(&open_dir(path)?, config, true)?;
    if active {
        features.activate_module(name)?;
    } else {
        features.deactivate_module(name)?;
    }
    println!("{name}: {}", if active { "activated" } else { "deactivated" });
    Ok(())
}
