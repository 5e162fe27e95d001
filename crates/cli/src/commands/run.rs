//! `run` command implementation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::{CheckpointStore, PipelineBlueprint};
use dispatcher::{create_sink, DispatcherBuilder, DispatcherConfig, RunReport};
use framing::Framer;
use observability::MetricsRegistry;
use tap::{FileCheckpoint, JsonLinesSource, Producer, Tap};
use tracing::{debug, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(&args.config).into());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);
    config_loader::ConfigLoader::validate(&blueprint).context("Invalid configuration after overrides")?;

    info!(
        producer = %config_loader::producer_name(&blueprint),
        sinks = blueprint.sinks.len(),
        mode = ?blueprint.dispatch.mode,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let registry = MetricsRegistry::from_config(&blueprint.metrics)
        .context("Failed to initialise metrics")?;
    let producer = build_producer(&blueprint).await?;

    let mut sinks = Vec::with_capacity(blueprint.sinks.len());
    for sink in &blueprint.sinks {
        sinks.push(create_sink(sink).await?);
    }

    let dispatcher = DispatcherBuilder::new(producer)
        .config(DispatcherConfig::from(&blueprint.dispatch))
        .registry(registry)
        .sinks(sinks)
        .build()
        .await
        .context("Failed to start pipeline")?;

    info!("Starting pipeline...");

    tokio::select! {
        result = dispatcher.run() => {
            let report = result.context("Pipeline execution failed")?;
            info!(units = report.units, "Pipeline completed successfully");
            print_report(&report);
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping pipeline...");
        }
    }

    info!("Tapline finished");
    Ok(())
}

fn apply_overrides(blueprint: &mut PipelineBlueprint, args: &RunArgs) {
    if let Some(mode) = args.mode {
        info!(mode = ?mode, "Overriding delivery mode from CLI");
        blueprint.dispatch.mode = mode.into();
    }
    if args.debug {
        blueprint.dispatch.debug = true;
    }
    if let Some(port) = args.metrics_port {
        info!(port, "Overriding metrics port from CLI");
        blueprint.metrics.port = (port != 0).then_some(port);
    }
}

/// External command, or a tap over the configured JSON-lines file
async fn build_producer(blueprint: &PipelineBlueprint) -> Result<Producer> {
    let config = &blueprint.tap;
    if let Some(command) = &config.command {
        return Ok(Producer::Command(command.clone()));
    }
    let path = config.file.as_ref().ok_or(CliError::NoProducer)?;

    let mut source = JsonLinesSource::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let checkpoint = config
        .checkpoint
        .as_ref()
        .map(|path| Arc::new(FileCheckpoint::new(path)));
    if let (Some(store), Some(key)) = (&checkpoint, config.key.primary()) {
        match store.pull().await {
            Ok(position) => {
                let position = position.trim().to_string();
                info!(key, position = %position, "Resuming after checkpoint");
                source = source.resume_after(key, position);
            }
            Err(e) => debug!(error = %e, "No checkpoint to resume from"),
        }
    }

    let framer = Framer::new(blueprint.dispatch.schema_emission)
        .with_time_extracted(blueprint.dispatch.stamp_time_extracted);
    let mut tap = Tap::new(
        config_loader::producer_name(blueprint),
        config.key.clone(),
        Box::new(source),
    )?
    .with_framer(framer);

    if let Some(schema) = &config.schema {
        tap = tap.with_schema(read_schema(schema)?);
    }
    if let Some(store) = checkpoint {
        tap = tap.with_checkpoint(store as Arc<dyn CheckpointStore>, blueprint.dispatch.checkpoint_mode);
    }
    Ok(tap.into())
}

fn read_schema(path: &Path) -> Result<serde_json::Value, CliError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CliError::schema(path, e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| CliError::schema(path, e.to_string()))
}

/// Wait for Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &PipelineBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Producer: {}", config_loader::producer_name(blueprint));
    println!("  Key: {:?}", blueprint.tap.key);
    if let Some(ref checkpoint) = blueprint.tap.checkpoint {
        println!("  Checkpoint: {}", checkpoint.display());
    }
    println!("\nDispatch:");
    println!("  Mode: {:?}", blueprint.dispatch.mode);
    println!("  Reject null schema: {}", blueprint.dispatch.reject_null_schema);
    println!("  Graceful shutdown: {}s", blueprint.dispatch.graceful_shutdown_secs);
    match blueprint.metrics.port {
        Some(port) => println!("\nMetrics: port {port}"),
        None => println!("\nMetrics: disabled"),
    }

    println!("\nSinks ({}):", blueprint.sinks.len());
    for sink in &blueprint.sinks {
        println!("  - {} ({:?})", sink.name, sink.sink_type);
    }
    println!();
}

fn print_report(report: &RunReport) {
    println!("\n=== Run Summary ===\n");
    println!("Units: {}", report.units);
    println!(
        "Producer: {} records, size KB: {}",
        report.producer.total, report.producer.data_size_kb
    );
    for (name, snapshot) in &report.sinks {
        println!("  - {}: {} units, size KB: {}", name, snapshot.total, snapshot.data_size_kb);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ModeArg;
    use contracts::DeliveryMode;
    use std::io::Write;

    const CONFIG: &str = r#"
[tap]
file = "rows.jsonl"
key = "id"

[[sinks]]
name = "log"
sink_type = "log"
"#;

    fn args(config: &Path) -> RunArgs {
        RunArgs {
            config: config.to_path_buf(),
            mode: None,
            debug: false,
            metrics_port: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_overrides() {
        let mut blueprint =
            config_loader::ConfigLoader::load_from_str(CONFIG, config_loader::ConfigFormat::Toml)
                .unwrap();
        let mut args = args(Path::new("unused.toml"));
        args.mode = Some(ModeArg::Concurrent);
        args.debug = true;
        args.metrics_port = Some(0);

        apply_overrides(&mut blueprint, &args);
        assert_eq!(blueprint.dispatch.mode, DeliveryMode::Concurrent);
        assert!(blueprint.dispatch.debug);
        assert_eq!(blueprint.metrics.port, None);
    }

    #[tokio::test]
    async fn test_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_pipeline(&args(&dir.path().join("absent.toml")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");
    }

    #[tokio::test]
    async fn test_runs_file_tap_and_stores_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let rows = dir.path().join("rows.jsonl");
        let out = dir.path().join("out.jsonl");
        let checkpoint = dir.path().join("state/rows");
        std::fs::write(&rows, "{\"id\": 1, \"v\": \"a\"}\n{\"id\": 2, \"v\": \"b\"}\n").unwrap();

        let config = dir.path().join("tapline.toml");
        let mut file = std::fs::File::create(&config).unwrap();
        write!(
            file,
            r#"
[tap]
name = "rows"
file = "{}"
key = "id"
checkpoint = "{}"

[metrics]
port = 0

[[sinks]]
name = "dump"
sink_type = "file"
[sinks.params]
path = "{}"
"#,
            rows.display(),
            checkpoint.display(),
            out.display()
        )
        .unwrap();

        run_pipeline(&args(&config)).await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.lines().count(), 4);
        assert!(written.lines().nth(1).unwrap().contains("\"stream\":\"rows\""));
        assert_eq!(std::fs::read_to_string(&checkpoint).unwrap(), "2");
    }

    #[test]
    fn test_read_schema_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(read_schema(&path), Err(CliError::Schema { .. })));
    }
}
