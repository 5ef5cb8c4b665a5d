//! Operator commands.
//!
//! Each subcommand maps onto one runtime operation: reconciliation, log
//! inspection, redispatch, or a single workflow command. Envelopes are printed
//! as JSON lines so output can be piped into `jq`.

use crate::bootstrap::Resources;
use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::process::ExitCode;
use std::time::Duration;
use ticketflow_core::envelope::DomainEventEnvelope;
use ticketflow_core::event::DomainEventKind;
use ticketflow_core::stream::{AggregateId, AggregateRef, AggregateType, Version};
use ticketflow_runtime::{Reconciliation, ReconciliationReport, WorkflowCommand};

/// Ticketflow operator tooling.
#[derive(Parser, Debug)]
#[command(name = "ticketflow-ops", version, about)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Rebuild one aggregate's status from its stream and repair drift.
    Reconcile(Target),

    /// Reconcile every aggregate of a type that has events.
    ReconcileAll {
        /// Aggregate type (`event` or `ticket`).
        aggregate_type: AggregateType,
        /// Visit at most this many aggregates (default: `RECOVERY_BATCH_SIZE`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Reconcile events and tickets on an interval until interrupted.
    Watch {
        /// Seconds between sweeps (default: `RECOVERY_INTERVAL_SECS`).
        #[arg(long)]
        interval: Option<u64>,
        /// Aggregates visited per sweep and type.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print an aggregate's stream.
    Stream {
        #[command(flatten)]
        target: Target,
        /// Only envelopes after this version.
        #[arg(long, default_value_t = 0)]
        after: u64,
    },

    /// Print every envelope of one correlation.
    Trace {
        /// Correlation id.
        correlation_id: String,
    },

    /// Print the newest envelopes across all aggregates.
    Recent {
        /// Number of envelopes.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Restrict to an event type (repeatable), e.g. `TICKET_STAKED`.
        #[arg(long = "kind")]
        kinds: Vec<DomainEventKind>,
    },

    /// Dispatch already-appended envelopes again.
    Replay {
        /// Aggregate type, with `id`.
        #[arg(requires = "id", conflicts_with = "correlation")]
        aggregate_type: Option<AggregateType>,
        /// Aggregate id.
        id: Option<String>,
        /// Replay a whole correlation instead of one stream.
        #[arg(long)]
        correlation: Option<String>,
    },

    /// List the actions currently allowed for an aggregate.
    Actions(Target),

    /// Execute one workflow command given as JSON (`{"name": ..., "payload": ...}`).
    Exec {
        /// The command object.
        command: String,
        /// Retry concurrency conflicts with the configured policy.
        #[arg(long)]
        retry: bool,
    },
}

/// One aggregate.
#[derive(Args, Debug, PartialEq, Eq)]
pub struct Target {
    /// Aggregate type (`event`, `ticket`, ...).
    pub aggregate_type: AggregateType,
    /// Aggregate id.
    pub id: String,
}

impl Target {
    fn aggregate(&self) -> anyhow::Result<AggregateRef> {
        let id: AggregateId = self.id.parse()?;
        Ok(AggregateRef::new(self.aggregate_type, id))
    }
}

/// Run `command` against `resources`.
///
/// # Errors
///
/// Returns an error when the underlying operation fails outright. Partial
/// failures (a sweep with failed aggregates, undelivered dispatches) are
/// reported through the exit code instead.
pub async fn run(command: Commands, resources: &Resources) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Reconcile(target) => {
            let aggregate = target.aggregate()?;
            let outcome = resources.recovery.reconcile_entity(aggregate.clone()).await?;
            println!("{}", describe(&aggregate, outcome));
            Ok(ExitCode::SUCCESS)
        }
        Commands::ReconcileAll {
            aggregate_type,
            limit,
        } => {
            let limit = limit.or(resources.config.recovery.batch_size);
            let report = resources.recovery.reconcile_all(aggregate_type, limit).await?;
            println!("{aggregate_type}: {}", summarize(report));
            Ok(exit_for(report.failed))
        }
        Commands::Watch { interval, limit } => {
            let interval =
                interval.map_or_else(|| resources.config.recovery_interval(), Duration::from_secs);
            if interval.is_zero() {
                bail!("watch interval must be positive");
            }
            let limit = limit.or(resources.config.recovery.batch_size);
            tracing::info!(interval = ?interval, "Watching for read model drift (Ctrl-C to stop)");

            let totals = resources
                .recovery
                .watch(
                    &[AggregateType::Event, AggregateType::Ticket],
                    limit,
                    interval,
                    shutdown_signal(),
                )
                .await;
            println!("total: {}", summarize(totals));
            Ok(exit_for(totals.failed))
        }
        Commands::Stream { target, after } => {
            let stream = resources
                .events
                .get_stream(target.aggregate()?, Version::new(after))
                .await?;
            print_envelopes(&stream)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Trace { correlation_id } => {
            let envelopes = resources.events.get_by_correlation(&correlation_id).await?;
            print_envelopes(&envelopes)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Recent { limit, kinds } => {
            let envelopes = resources.events.get_recent(limit, &kinds).await?;
            print_envelopes(&envelopes)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Replay {
            aggregate_type,
            id,
            correlation,
        } => {
            let envelopes = match (aggregate_type, id, correlation) {
                (_, _, Some(correlation_id)) => {
                    resources.events.get_by_correlation(&correlation_id).await?
                }
                (Some(aggregate_type), Some(id), None) => {
                    let target = Target { aggregate_type, id };
                    resources
                        .events
                        .get_stream(target.aggregate()?, Version::INITIAL)
                        .await?
                }
                _ => bail!("replay needs either <TYPE> <ID> or --correlation"),
            };
            let summary = resources.events.redispatch(&envelopes).await;
            println!(
                "replayed {} envelope(s): {} published, {} failed",
                envelopes.len(),
                summary.published,
                summary.failed
            );
            Ok(exit_for(summary.failed))
        }
        Commands::Actions(target) => {
            let actions = resources
                .orchestrator
                .available_actions(target.aggregate()?)
                .await?;
            for action in actions {
                println!("{action}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Exec { command, retry } => {
            let value: serde_json::Value =
                serde_json::from_str(&command).context("command is not valid JSON")?;
            let command = WorkflowCommand::from_json(value)?;
            let result = if retry {
                resources
                    .orchestrator
                    .execute_with_retry(command, resources.config.retry_policy())
                    .await
            } else {
                resources.orchestrator.execute(command).await
            };

            match result {
                Ok(receipt) => {
                    println!(
                        "{} {} -> {} at version {} (correlation {}){}",
                        receipt.aggregate,
                        receipt.from,
                        receipt.to,
                        receipt.version,
                        receipt.correlation_id,
                        if receipt.projected { "" } else { "; read model not updated" }
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(error) => {
                    eprintln!("{} error: {error}", error.class());
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn describe(aggregate: &AggregateRef, outcome: Reconciliation) -> String {
    match outcome {
        Reconciliation::NoEvents => format!("{aggregate}: no events"),
        Reconciliation::InSync { status } => format!("{aggregate}: in sync ({status})"),
        Reconciliation::Repaired { old, new } => format!("{aggregate}: repaired {old} -> {new}"),
    }
}

fn summarize(report: ReconciliationReport) -> String {
    format!(
        "{} checked, {} repaired, {} failed",
        report.checked, report.repaired, report.failed
    )
}

fn exit_for(failures: usize) -> ExitCode {
    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_envelopes(envelopes: &[DomainEventEnvelope]) -> anyhow::Result<()> {
    for envelope in envelopes {
        println!("{}", serde_json::to_string(envelope)?);
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %error, "Failed to listen for Ctrl-C; stopping watch");
    }
}
