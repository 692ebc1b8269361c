use anyhow::Result;
use immuno_runtime::{PluginManager, RuntimeConfig, init_tracing};

fn main() -> Result<()> {
    init_tracing();
    let config = match std::env::args().nth(1) {
        Some(dir) => RuntimeConfig::new(dir),
        None => RuntimeConfig::from_env(),
    };

    let mut manager = PluginManager::new(config);
    let report = manager.start()?;
    for path in &report.skipped {
        eprintln!("skipped {}", path.display());
    }

    println!("Loaded plugins:");
    for plugin in &report.loaded {
        println!("  - {} {}", plugin.name, plugin.version);
        for (_, setting) in manager.registry().settings(plugin.module) {
            let values: Vec<_> = (0..setting.count())
                .filter_map(|i| setting.render(i).ok())
                .collect();
            println!(
                "      {} [{}] = {}",
                setting.name(),
                setting.descriptor().name,
                values.join(", ")
            );
        }
    }

    if std::env::var_os("IMMUNO_DESCRIBE_JSON").is_some() {
        println!("{}", manager.describe_json()?);
    }
    manager.shutdown();
    Ok(())
}
