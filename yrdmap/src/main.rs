use anyhow::Result;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use yrdmap::config::CONFIG_FILE;
use yrdmap::{MapConfig, YrdAccuracyMap};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "yrdmap=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MapConfig::load_or_default(Path::new(CONFIG_FILE))?;
    tracing::info!("Rendering {}", config.title);

    let map = YrdAccuracyMap::new(config)?.run()?;
    let image = map.to_png()?;

    #[cfg(feature = "polars")]
    if map.config().write_summary {
        map.to_summary_csv()?;
    }

    let report = map.report();
    tracing::info!(
        "Done: {:?} ({} of {} cities filled)",
        image,
        report.matched,
        report.cities
    );
    Ok(())
}
