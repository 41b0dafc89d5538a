//! Demo that pushes a few synthetic alerts through the configured channels.
//! With no channels enabled it only exercises the dispatcher and logs.

use chrono::Utc;
use market_trend_monitor::{build_channels, Alert, AlertDispatcher, MonitorConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = MonitorConfig::load_default()?;
    let channels = build_channels(&cfg)?;
    tracing::info!(channels = channels.len(), "alert demo starting");
    let dispatcher = AlertDispatcher::new(channels, cfg.dispatch);

    let now = Utc::now();
    let samples = [
        Alert::sentiment_spike("Electronics", 0.50, 0.68, now),
        Alert::trend_shift("Appliances", 200, 150, -0.25, now),
        Alert::ingestion_success(1_240, now),
    ];

    for alert in samples {
        let record = dispatcher.dispatch(alert).await;
        println!(
            "{}: delivered={} ({} channel results)",
            record.alert.kind.as_str(),
            record.delivered(),
            record.results.len()
        );
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    }

    println!("alert-demo done");
    Ok(())
}
