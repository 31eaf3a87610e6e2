//! Drain command - one delivery cycle over every queue

use clap::Args;
use tracing::info;

use crate::infrastructure::services::DrainReport;

#[derive(Args, Debug)]
pub struct DrainArgs {
    /// Maximum rows per queue; defaults to `queue.drain_limit`
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Drains every sink once and prints the per-sink reports as JSON
pub async fn run(args: DrainArgs) -> anyhow::Result<()> {
    let config = super::load_config();
    super::init_command_logging(&config);

    let services = crate::create_services(&config).await?;
    let reports = services.dispatcher.drain_all(args.limit).await?;

    info!(
        processed = total(&reports, |r| r.processed),
        failed = total(&reports, |r| r.failed),
        "Queue drain finished"
    );

    println!("{}", serde_json::to_string_pretty(&reports)?);

    Ok(())
}

fn total(reports: &[DrainReport], field: impl Fn(&DrainReport) -> u64) -> u64 {
    reports.iter().map(field).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::queue::SinkType;

    #[test]
    fn test_total_sums_across_sinks() {
        let reports = vec![
            DrainReport {
                sink: SinkType::Notification,
                processed: 3,
                failed: 1,
                retried: 1,
                released: 0,
            },
            DrainReport {
                sink: SinkType::Webhook,
                processed: 2,
                failed: 0,
                retried: 0,
                released: 1,
            },
        ];

        assert_eq!(total(&reports, |r| r.processed), 5);
        assert_eq!(total(&reports, |r| r.failed), 1);
    }
}
