use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber;
use tracing_subscriber::{fmt, EnvFilter};
use tracing_subscriber::prelude::*;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing::subscriber as tracing_subscriber_global;
use anyhow::{anyhow, Context, Result};
use playlist_insights as lib;
use lib::api::auth::AuthManager;
use lib::api::catalog::Catalog;
use lib::api::client::ApiClient;
use lib::api::TokenSource;
use lib::config::Config;
use lib::pipeline;
use lib::store::SqliteStore;
use lib::util::{format_duration_ms, CancelToken, TokioDelay};
use url::Url;

#[derive(Parser)]
#[command(name = "playlist-insights", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Auth helpers
    Auth {
        #[command(subcommand)]
        sub: AuthCommands,
    },
    /// List the signed-in user's playlists
    Playlists,
    /// Analyze one playlist (id, share link, or spotify: URI)
    Analyze {
        /// Playlist reference to analyze
        reference: String,

        /// Also print the full track list
        #[arg(long)]
        show_tracks: bool,
    },
    /// Validate config file and exit
    ConfigValidate,
}

#[derive(Subcommand)]
enum AuthCommands {
    /// Authorize with the streaming service and store tokens (interactive)
    Login,
    /// Show whether stored credentials exist and when they expire
    Status,
    /// Forget stored credentials
    Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // Resolve config path: explicit --config overrides; otherwise prefer
    // system-wide /etc/playlist-insights/config.toml and fall back to the
    // repository example config for local/dev usage.
    let resolved_config_path: PathBuf = match &cli.config {
        Some(p) => p.clone(),
        None => {
            let etc_path = Path::new("/etc/playlist-insights/config.toml");
            if etc_path.exists() {
                etc_path.to_path_buf()
            } else {
                PathBuf::from("config/example-config.toml")
            }
        }
    };

    // config-validate reports broken configs itself, so it runs before the
    // normal startup path loads one.
    if let Commands::ConfigValidate = cli.command {
        match Config::from_path(resolved_config_path.as_path()) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = Config::from_path(&resolved_config_path)
        .with_context(|| format!("loading config from {}", resolved_config_path.display()))?;

    // Initialize log->tracing bridge and structured logging.
    // Logs go to both stdout and a daily-rotated file in cfg.log_dir.
    let _ = LogTracer::init();
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "playlist-insights.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    // Install as global default tracing subscriber without triggering
    // tracing-subscriber's internal log bridge (we already call LogTracer).
    tracing_subscriber_global::set_global_default(subscriber)
        .expect("failed to set global tracing subscriber");

    let store = Arc::new(SqliteStore::open(&cfg.db_path)?);
    let auth = Arc::new(AuthManager::new(&cfg, store)?);
    let client = ApiClient::new(&cfg, auth.clone() as Arc<dyn TokenSource>, Arc::new(TokioDelay))?;
    let catalog = Catalog::new(client, &cfg);

    // Ctrl-C flips the shared cancellation flag; in-flight pipelines notice
    // it at their next stage boundary.
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    match cli.command {
        Commands::Auth { sub } => match sub {
            AuthCommands::Login => run_login(&cfg, &auth).await?,
            AuthCommands::Status => {
                match auth.credential().await? {
                    Some(cred) => {
                        let now_ms = chrono::Utc::now().timestamp_millis();
                        if cred.is_expired(now_ms) {
                            println!("Signed in; access token expired, will refresh on next use.");
                        } else {
                            println!(
                                "Signed in; access token valid for about {} more minute(s).",
                                (cred.expires_at_ms - now_ms) / 60_000
                            );
                        }
                        println!(
                            "Refresh token on file: {}",
                            if cred.refresh_token.is_some() { "yes" } else { "no" }
                        );
                    }
                    None => println!("Not signed in. Run `playlist-insights auth login` first."),
                }
            }
            AuthCommands::Logout => {
                auth.logout().await?;
                println!("Signed out; stored credentials removed.");
            }
        },
        Commands::Playlists => match pipeline::fetch_overview(&catalog, &cancel).await {
            Ok((profile, playlists)) => {
                let who = profile.display_name.unwrap_or_else(|| profile.id.clone());
                println!("Playlists for {}:", who);
                for p in &playlists {
                    println!("- {} | {} track(s) | {}", p.name, p.total_tracks, p.id);
                }
                println!("{} playlist(s) total.", playlists.len());
            }
            Err(e) => fail_command(e, &auth).await,
        },
        Commands::Analyze { reference, show_tracks } => {
            match pipeline::analyze_playlist(&catalog, &reference, &cancel).await {
                Ok(report) => {
                    let a = &report.analysis;
                    println!("Playlist {}", report.playlist_id);
                    println!("  tracks:       {}", a.total_tracks);
                    println!("  duration:     {} min", a.total_duration_minutes);
                    println!("  mood:         {}", a.mood);
                    println!("  energy:       {}%", a.avg_energy_pct);
                    println!("  valence:      {}%", a.avg_valence_pct);
                    println!("  danceability: {}%", a.avg_danceability_pct);
                    println!("  tempo:        {} bpm", a.avg_tempo_bpm);
                    if !a.top_artists.is_empty() {
                        println!("  top artists:");
                        for artist in &a.top_artists {
                            println!("    - {} ({} track(s))", artist.artist, artist.count);
                        }
                    }
                    if show_tracks {
                        println!("  track list:");
                        for t in &report.tracks {
                            println!(
                                "    {} [{}] - {}",
                                t.name,
                                format_duration_ms(t.duration_ms),
                                t.artist_names.join(", ")
                            );
                        }
                    }
                }
                Err(lib::Error::InsufficientData) => {
                    eprintln!("Not enough data: the playlist is empty or has no audio features.");
                    std::process::exit(1);
                }
                Err(e) => fail_command(e, &auth).await,
            }
        }
        // Handled before the config is loaded for the normal path.
        Commands::ConfigValidate => {}
    }

    Ok(())
}

/// Interactive login: print the authorization URL, then exchange the pasted
/// redirect URL. No embedded HTTP server; the user copies the redirect URL
/// out of the browser by hand.
async fn run_login(cfg: &Config, auth: &AuthManager) -> Result<()> {
    let url = auth.begin_authorization().await?;
    println!(
        "Open this URL in your browser and authorize the application:\n\n{}\n",
        url
    );
    println!(
        "After authorizing, the browser lands on {} (the page may not load; that is fine).",
        cfg.redirect_uri
    );
    println!("Copy the full redirect URL from the address bar and paste it here:");
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let parsed = Url::parse(input.trim()).map_err(|e| anyhow!("invalid url pasted: {}", e))?;

    if let Some((_, reason)) = parsed.query_pairs().find(|(k, _)| k == "error") {
        return Err(anyhow!("authorization was declined: {}", reason));
    }
    let code = parsed
        .query_pairs()
        .find(|(k, _)| k == "code")
        .ok_or_else(|| anyhow!("no code in redirect URL"))?
        .1
        .into_owned();
    let state = parsed
        .query_pairs()
        .find(|(k, _)| k == "state")
        .ok_or_else(|| anyhow!("no state in redirect URL"))?
        .1
        .into_owned();

    let cred = auth.complete_authorization(&code, &state).await?;
    let minutes = (cred.expires_at_ms - chrono::Utc::now().timestamp_millis()) / 60_000;
    println!("Signed in. Access token valid for about {} minute(s).", minutes);
    Ok(())
}

/// Shared failure exit for the network commands. Expired auth also clears
/// whatever is stored so the next login starts clean.
async fn fail_command(err: lib::Error, auth: &AuthManager) {
    match err {
        lib::Error::AuthExpired => {
            if let Err(e) = auth.logout().await {
                log::warn!("failed to clear stored credentials: {}", e);
            }
            eprintln!("Authentication expired. Run `playlist-insights auth login` again.");
            std::process::exit(1);
        }
        lib::Error::Cancelled => {
            eprintln!("Cancelled.");
            std::process::exit(130);
        }
        other => {
            eprintln!("{}", other);
            std::process::exit(1);
        }
    }
}
