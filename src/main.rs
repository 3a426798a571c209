// SPDX-License-Identifier: MIT
//!
//! Binary entry point: CLI, configuration load, startup, and graceful
//! shutdown (§10.4, §11).
//!
//! # Startup sequence
//!
//! `serve` performs these steps in order, then blocks until shutdown:
//!
//! 1. Load configuration (layered search path + optional `--config`).
//! 2. Build the credential validator, allow-list, and trusted-proxy
//!    evaluator; install the trusted-proxy evaluator as the process-wide
//!    singleton (§4.3).
//! 3. Build the auth-failure limiter, session store, and rate limiter, and
//!    spawn their background sweepers.
//! 4. Assemble the router (§2); the protected-route graph is a stand-in
//!    until the out-of-scope agent-session runtime (§1, `collaborators.rs`)
//!    is wired in.
//! 5. Start the loopback listener (always) and, if an external bind port is
//!    configured, the external listener (§4.1, §4.2) via the controller.
//! 6. Wait for SIGINT or SIGTERM, then run the shutdown sequence (§6): stop
//!    the external listener (5 s grace), close every background worker,
//!    close the loopback listener.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rand::RngCore;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use session_fabric::auth::{
    CredentialValidator, Credentials, FailureLimiter, FailureLimiterConfig, SessionStore,
};
use session_fabric::config::{self, Config, CredentialsConfig};
use session_fabric::controller::{AuthChangeConfig, ListenerController};
use session_fabric::http::security::SecurityConfig;
use session_fabric::ipset::IpSet;
use session_fabric::proxy::{self, TrustedProxyEvaluator};
use session_fabric::ratelimit::RateLimiter;
use session_fabric::router::{self, AppState};

#[derive(Parser)]
#[command(
    name = "session-fabric",
    version,
    about = "Authentication, session-routing, and abuse-resistance fabric"
)]
struct Cli {
    /// Explicit config file; applied on top of the layered search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway: loopback listener always, external listener if configured.
    Serve {
        /// Override the configured external bind address (host:port).
        #[arg(long)]
        bind_external: Option<SocketAddr>,
    },
    /// Generate a fresh random password for the configured (or given) username.
    RegenerateCredentials {
        #[arg(long)]
        username: Option<String>,
    },
    /// Print the fully-resolved configuration (merged layers + defaults) as YAML.
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::ShowConfig => show_config(cli.config.as_deref()),
        Commands::RegenerateCredentials { username } => {
            regenerate_credentials(cli.config.as_deref(), username)
        }
        Commands::Serve { bind_external } => serve(cli.config.as_deref(), bind_external).await,
    }
}

fn show_config(explicit: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = config::load(explicit)?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn regenerate_credentials(
    explicit: Option<&std::path::Path>,
    username: Option<String>,
) -> anyhow::Result<()> {
    let mut current = config::load(explicit)?;
    let username = username
        .or_else(|| current.credentials.as_ref().map(|c| c.username.clone()))
        .unwrap_or_else(|| "admin".to_string());
    let password = random_hex(24);

    current.credentials = Some(CredentialsConfig { username: username.clone(), password: password.clone() });

    let target = PathBuf::from(".session-fabric.yaml");
    std::fs::write(&target, serde_yaml::to_string(&current)?)?;

    println!("New credentials written to {}", target.display());
    println!("  username: {username}");
    println!("  password: {password}");
    println!("(shown once — it is not stored anywhere in plaintext by this crate beyond the config file above)");
    Ok(())
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

async fn serve(explicit: Option<&std::path::Path>, bind_external: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = config::load(explicit)?;

    let credentials = config
        .credentials
        .as_ref()
        .map(|c| Credentials { username: c.username.clone(), password: c.password.clone() });
    let allow_list: IpSet = config.allow_list()?;
    let trusted_proxies = config.trusted_proxies()?;

    proxy::install(TrustedProxyEvaluator::new(trusted_proxies));

    let credential_validator = Arc::new(CredentialValidator::new(credentials, allow_list));
    let failure_limiter = FailureLimiter::new(FailureLimiterConfig::from(&config.auth_failure));
    let failure_limiter_worker = failure_limiter.spawn_sweeper();
    let sessions = SessionStore::new((&config.session).into());
    let sessions_worker = sessions.spawn_sweeper();
    let rate_limiter = RateLimiter::new((&config.token_bucket).into());
    let rate_limiter_worker = rate_limiter.spawn_sweeper();

    let controller = ListenerController::new(credential_validator.clone());

    let state = AppState {
        credentials: credential_validator,
        failure_limiter,
        sessions,
        rate_limiter,
        api_prefix: config.api_prefix.clone(),
        login_page_path: config.login_page_path.clone(),
        controller: controller.clone(),
    };

    let security_config = Arc::new(SecurityConfig {
        enable_hsts: config.security.enable_hsts,
        hsts_max_age: config.security.hsts_max_age_secs,
        api_prefix: config.api_prefix.clone(),
    });
    let request_timeout = Duration::from_secs(config.security.request_timeout_secs);
    let body_limit_bytes = config.security.request_body_limit_bytes;

    // The real agent-session runtime is out of scope (§1); an empty router
    // leaves every non-public path 404ing behind the auth gate until a
    // `ProtectedHandlerGraph` implementor is merged in by the caller of
    // this crate.
    let protected = axum::Router::new();

    let app =
        router::build(state, security_config, request_timeout, body_limit_bytes, protected);

    let loopback = session_fabric::net::loopback::LoopbackListener::bind("127.0.0.1:0".parse().unwrap()).await?;
    info!(addr = %loopback.local_addr()?, "loopback listener bound");

    let external_addr = bind_external.or_else(|| {
        config.external_bind_port.map(|port| SocketAddr::new("0.0.0.0".parse().unwrap(), port))
    });
    if let Some(addr) = external_addr {
        let port = controller.start_external(addr, app.clone()).await?;
        info!(port, "external listener started");
    }

    let loopback_app = app.clone().into_make_service_with_connect_info::<SocketAddr>();
    let loopback_serve = tokio::spawn(async move {
        if let Err(e) = axum::serve(loopback, loopback_app).await {
            warn!(error = %e, "loopback listener serve error");
        }
    });

    let reload_handle = {
        let controller = controller.clone();
        let explicit = explicit.map(|p| p.to_path_buf());
        let mut old = config::Config::default();
        old.credentials = config.credentials.clone();
        old.allow_list = config.allow_list.clone();
        tokio::spawn(async move { watch_reload_signal(controller, explicit, old).await })
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received");

    controller.stop_external().await;
    failure_limiter_worker.close().await;
    sessions_worker.close().await;
    rate_limiter_worker.close().await;
    loopback_serve.abort();
    reload_handle.abort();

    Ok(())
}

/// Re-read configuration on `SIGHUP` and apply the auth-relevant slice
/// through the controller (§4.13's `enabled->enabled` / `disabled->enabled`
/// transitions) without restarting the process. No-op on non-Unix targets —
/// there is no equivalent "reconfigure in place" signal to wire there.
async fn watch_reload_signal(
    controller: ListenerController,
    explicit: Option<PathBuf>,
    mut previous: Config,
) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sighup) = signal(SignalKind::hangup()) else {
            warn!("could not install SIGHUP handler; config reload on signal disabled");
            return;
        };
        loop {
            sighup.recv().await;
            info!("SIGHUP received, reloading configuration");
            match config::load(explicit.as_deref()) {
                Ok(new) => {
                    let old_change = AuthChangeConfig {
                        credentials: previous.credentials.as_ref().map(|c| Credentials {
                            username: c.username.clone(),
                            password: c.password.clone(),
                        }),
                        allow_list: previous.allow_list().unwrap_or_default(),
                    };
                    let new_credentials = new
                        .credentials
                        .as_ref()
                        .map(|c| Credentials { username: c.username.clone(), password: c.password.clone() });
                    let new_allow_list: IpSet = match new.allow_list() {
                        Ok(list) => list,
                        Err(e) => {
                            warn!(error = %e, "reload aborted: invalid allow_list");
                            continue;
                        }
                    };
                    controller.apply_auth_changes(
                        Some(&old_change),
                        AuthChangeConfig { credentials: new_credentials, allow_list: new_allow_list },
                    );
                    if let Ok(trusted_proxies) = new.trusted_proxies() {
                        proxy::install(TrustedProxyEvaluator::new(trusted_proxies));
                    }
                    previous = new;
                }
                Err(e) => warn!(error = %e, "config reload failed; keeping previous configuration"),
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (controller, explicit, &mut previous);
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => return,
        };
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
