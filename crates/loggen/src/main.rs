use anyhow::Context;
use clap::Parser;
use loggen::{
    config::{CliArgs, Command, ConfigCommand, RunConfig},
    senders::api_headers,
    settings::SettingsStore,
    telemetry::{TelemetryOptions, init_telemetry},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

// mimalloc holds up better than the system allocator under the per-send task
// churn, notably on musl builds.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let store = args.settings_store()?;

    match args.command {
        Command::Config(command) => config_command(&store, command),
        Command::Run(run_args) => {
            let created = !store.path().exists();
            let settings = store.load()?;
            let config = RunConfig::resolve(settings, run_args)?;

            // The OTLP exporters own blocking HTTP clients, so the providers
            // are built and shut down outside the async runtime.
            let providers = init_telemetry(&TelemetryOptions {
                otlp_url: Some(config.url.clone()),
                headers: api_headers(&config.api_key, &config.api_secret),
                timeout: config.timeout,
                labels: config.labels.clone(),
            })?;

            if created {
                tracing::info!("Created default config at {}", store.path().display());
            }
            log_startup_info(&config);

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to build the Tokio runtime")?;

            let result = runtime.block_on(async {
                let shutdown = CancellationToken::new();
                tokio::spawn(shutdown_signal(shutdown.clone()));
                loggen::run(config, shutdown).await
            });
            drop(runtime);

            if result.is_ok() {
                tracing::info!("loggen shut down successfully");
            }
            providers.shutdown();
            result.map(|_| ())
        }
    }
}

fn config_command(store: &SettingsStore, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Path => println!("{}", store.path().display()),
        ConfigCommand::Show => {
            let settings = store.load()?.masked();
            print!("{}", serde_yaml::to_string(&settings)?);
        }
        ConfigCommand::Init { force } => {
            if store.init(force)? {
                println!("Wrote default config to {}", store.path().display());
            } else {
                println!(
                    "Config already exists at {} (use --force to overwrite)",
                    store.path().display()
                );
            }
        }
    }
    Ok(())
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Running with full config: {:#?}", RedactedConfig(config));
    } else {
        tracing::info!(
            "Sending {} every {:?} to {}",
            config.kind,
            config.pipeline.send_interval,
            config.endpoint()
        );
    }
}

/// Debug view of a [`RunConfig`] without credentials.
struct RedactedConfig<'a>(&'a RunConfig);

impl core::fmt::Debug for RedactedConfig<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let config = self.0;
        f.debug_struct("RunConfig")
            .field("kind", &config.kind)
            .field("url", &config.url)
            .field("api_key_set", &!config.api_key.is_empty())
            .field("api_secret_set", &!config.api_secret.is_empty())
            .field("labels", &config.labels)
            .field("rate", &config.rate)
            .field("timeout", &config.timeout)
            .field("pipeline", &config.pipeline)
            .field("duration", &config.duration)
            .field("report_interval", &config.report_interval)
            .finish()
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
        () = shutdown.cancelled() => return,
    }

    tracing::info!("Shutdown signal received, draining in-flight sends...");
    shutdown.cancel();
}
