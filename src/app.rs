//! Application struct that encapsulates relay assembly and serving logic.

use crate::cli::RunArgs;
use arc_swap::ArcSwap;
use relay_core::config::{ConfigWatcher, RelayConfig};
use relay_core::lifecycle::signal::SignalHandler;
use relay_core::lifecycle::{self, Lifecycle};
use relay_core::model::{EnvironmentIdentifiers, EnvironmentParams};
use relay_engine::Relay;
use relay_upstream::{AutoConfigHandler, EnvironmentSink, SseAutoConfigClient, UpstreamClient, UpstreamClientError};
use std::sync::Arc;
use std::time::Duration;

/// Whichever environment source is active, kept alive for the process
/// lifetime — dropping it would tear down its background task/watcher.
enum Ingestion {
    Static,
    AutoConfig(tokio::task::JoinHandle<()>),
    Archive(relay_filedata::ArchiveWatcher),
}

pub struct Application {
    config: Arc<ArcSwap<RelayConfig>>,
    app_router: axum::Router,
    config_path: String,
    relay: Arc<Relay>,
    ingestion: Ingestion,
    lifecycle: Box<dyn Lifecycle>,
    shutdown_timeout: u64,
    #[cfg(unix)]
    _pid_file: Option<relay_core::lifecycle::pid_file::PidFile>,
}

impl Application {
    /// Build the relay from CLI args: load config, construct the relay
    /// core, wire its environment source, and assemble the HTTP router.
    pub async fn build(args: &RunArgs) -> anyhow::Result<Self> {
        let mut config = RelayConfig::load(&args.config).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from '{}': {e}, using defaults", args.config);
            RelayConfig::default()
        });

        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(ref pid_file) = args.pid_file {
            config.daemon.pid_file = pid_file.clone();
        }
        if let Some(timeout) = args.shutdown_timeout {
            config.daemon.shutdown_timeout = timeout;
        }

        let shutdown_timeout = config.daemon.shutdown_timeout;

        #[cfg(unix)]
        let _pid_file = if args.daemon {
            Some(relay_core::lifecycle::pid_file::PidFile::acquire(&config.daemon.pid_file)?)
        } else {
            None
        };

        let relay = Arc::new(Relay::new(relay_engine::RelayConfig {
            disconnected_status_time: Duration::from_secs(config.disconnected_status_time_secs),
            max_client_connection_time: Duration::from_secs(config.max_client_connection_time_secs),
            exit_on_error: config.exit_on_error,
        }));

        let ingestion = start_ingestion(&config, &relay).await?;

        let config = Arc::new(ArcSwap::from_pointee(config));
        let state = relay_server::AppState::new(relay.clone(), config.clone());
        let app_router = relay_server::build_router(state);

        let lc = lifecycle::detect_lifecycle();

        Ok(Self {
            config,
            app_router,
            config_path: args.config.clone(),
            relay,
            ingestion,
            lifecycle: lc,
            shutdown_timeout,
            #[cfg(unix)]
            _pid_file,
        })
    }

    /// Start serving HTTP, handle signals, and drain gracefully.
    pub async fn serve(self) -> anyhow::Result<()> {
        let Self {
            config,
            app_router,
            config_path,
            relay,
            ingestion,
            lifecycle,
            shutdown_timeout,
            #[cfg(unix)]
            _pid_file,
        } = self;

        let watcher_relay = relay.clone();
        let _config_watcher = ConfigWatcher::start(config_path.clone(), config.clone(), move |new_cfg| {
            tracing::info!(
                disconnected_status_time_secs = new_cfg.disconnected_status_time_secs,
                "config reloaded"
            );
            let _ = &watcher_relay;
        })?;

        let sweep_relay = relay.clone();
        let sweep_interval = config.load().expired_credential_cleanup_interval_secs.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval));
            loop {
                ticker.tick().await;
                sweep_relay.sweep_expired_credentials();
            }
        });

        let (signal_handler, shutdown_rx) = SignalHandler::new();

        let reload_config = config.clone();
        let reload_path = config_path.clone();
        let reload_lifecycle: Arc<dyn Lifecycle> = Arc::from(lifecycle::detect_lifecycle());
        let reload_fn = move || {
            reload_lifecycle.on_reloading();
            match RelayConfig::load(&reload_path) {
                Ok(new_cfg) => {
                    tracing::info!("SIGHUP reload succeeded");
                    reload_config.store(Arc::new(new_cfg));
                    reload_lifecycle.on_reloaded();
                }
                Err(e) => tracing::error!("SIGHUP config reload failed: {e}"),
            }
        };

        tokio::spawn(signal_handler.run(reload_fn));

        let cfg = config.load();
        let addr = format!("{}:{}", cfg.host, cfg.port);
        drop(cfg);

        tracing::info!("Starting HTTP server on {addr}");
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        lifecycle.on_ready();

        let mut shutdown_rx = shutdown_rx;
        let shutdown = async move {
            let _ = shutdown_rx.wait_for(|v| *v).await;
        };

        axum::serve(listener, app_router).with_graceful_shutdown(shutdown).await?;

        lifecycle.on_stopping();
        relay.close();
        if let Ingestion::AutoConfig(handle) = ingestion {
            handle.abort();
        }
        tokio::time::sleep(Duration::from_secs(shutdown_timeout.min(5))).await;

        tracing::info!("Relay shut down.");
        Ok(())
    }
}

/// Chooses the environment source per spec.md §4.6/§4.7: auto-config stream,
/// watched archive file, or a static list — in that priority order, matching
/// `RelayConfig::validate`'s "at least one of these" requirement.
async fn start_ingestion(config: &RelayConfig, relay: &Arc<Relay>) -> anyhow::Result<Ingestion> {
    if let (Some(key), Some(url)) = (&config.auto_config_key, &config.auto_config_stream_url) {
        let sink: Arc<dyn EnvironmentSink> = relay.clone();
        let handler = Arc::new(AutoConfigHandler::new(sink));
        let client: Arc<dyn UpstreamClient> = Arc::new(SseAutoConfigClient::new(url.clone(), key.clone()));
        let relay_for_task = relay.clone();
        let join = tokio::spawn(async move {
            let err = relay_upstream::run_with_reconnect(client, handler, Duration::from_secs(60)).await;
            tracing::error!(error = %err, "auto-config stream failed fatally");
            relay_for_task.close();
            if matches!(err, UpstreamClientError::Unauthorized) {
                std::process::exit(1);
            }
        });
        return Ok(Ingestion::AutoConfig(join));
    }

    if let Some(path) = &config.archive_file {
        let sink: Arc<dyn EnvironmentSink> = relay.clone();
        let handler = Arc::new(relay_filedata::FileDataHandler::new(sink));
        let watcher = relay_filedata::ArchiveWatcher::start(path.clone(), handler)?;
        return Ok(Ingestion::Archive(watcher));
    }

    for env in &config.environment {
        let params = EnvironmentParams {
            identifiers: EnvironmentIdentifiers {
                project_key: env.project_key.clone(),
                project_name: env.project_name.clone(),
                environment_key: env.environment_key.clone(),
                environment_name: env.environment_name.clone(),
                filter_key: String::new(),
            },
            env_id: env.env_id.clone(),
            server_sdk_key: env.sdk_key.clone(),
            mobile_key: env.mobile_key.clone(),
            expiring_sdk_key: None,
            ttl_secs: env.ttl_secs,
            secure_mode: env.secure_mode,
        };
        match relay.add_environment(params) {
            Ok(_) => relay.mark_initialized(&env.env_id, true),
            Err(e) => {
                tracing::error!(env_id = %env.env_id, error = %e, "failed to add static environment");
                relay.mark_initialized(&env.env_id, false);
            }
        }
    }
    relay.set_fully_configured(true);

    if config.exit_on_error
        && relay
            .wait_for_all_clients(Duration::from_secs(5))
            .await
            .is_err()
    {
        anyhow::bail!("one or more configured environments failed to initialize");
    }

    Ok(Ingestion::Static)
}
