mod auth_rs;
mod config;
mod database;
mod entities;
mod error;
mod groq_rs;
mod http_server;
mod logging;
mod ports;
mod services;
#[cfg(test)]
mod test_utils;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context};
use url::Url;

use crate::{
    config::Config,
    database::Database,
    logging::init_tracing,
    services::{
        generator::{GenerateRequest, GeneratorSettings, PlaylistGenerator, client::GroqHttpAdapter},
        playlist::{PlaylistService, PlaylistWithSongs},
        session::{
            ProviderCallback, ProviderCallbackOutcome, ProviderSignIn, SessionManager,
            SessionSettings, client::AuthHttpAdapter, local_store::LocalStore,
        },
        user::{ProfileRetry, UserService},
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "SMART_PLAYLIST_CONFIG")]
    config: Option<PathBuf>,

    /// Tracing filter, e.g. `info` or `smart_playlist=debug,sea_orm=warn`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Multi-line human readable log output
    #[arg(long, global = true)]
    pretty_logs: bool,

    /// Export spans to this OTLP collector
    #[arg(long, global = true, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP server
    Serve {
        /// The port to run the server on
        #[arg(short, long, default_value = "3000", env = "SMART_PLAYLIST_HTTP_PORT")]
        port: u16,
    },
    /// Create an account
    SignUp {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "SMART_PLAYLIST_PASSWORD")]
        password: String,
        /// Name shown on the profile
        #[arg(short = 'n', long)]
        display_name: String,
    },
    /// Sign in with email and password
    SignIn {
        #[arg(short, long)]
        email: String,
        #[arg(short, long, env = "SMART_PLAYLIST_PASSWORD")]
        password: String,
    },
    /// Start signing in with an OAuth provider and print the URL to open
    SignInWithProvider {
        /// e.g. spotify or google
        provider: String,
        /// Where to return after signing in
        #[arg(long, default_value = "/")]
        current_path: String,
    },
    /// Finish a provider sign-in with the URL the provider redirected to
    AuthCallback { url: Url },
    /// Sign out and clear the saved session
    SignOut,
    /// Show the signed in user
    Whoami {
        /// Re-read the user from the auth service
        #[arg(long)]
        refresh: bool,
    },
    /// Generate a playlist from a prompt
    Generate {
        prompt: String,
        #[arg(short, long)]
        mood: Option<String>,
        #[arg(short = 'n', long, default_value = "10")]
        song_count: usize,
    },
    /// List your playlists
    Playlists {
        #[arg(long)]
        page: Option<i32>,
        #[arg(long)]
        page_size: Option<i32>,
    },
    /// Show one playlist with its songs
    Playlist { id: i64 },
    /// Remove a song from one of your playlists
    RemoveSong { playlist_id: i64, song_id: i64 },
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

fn format_duration(seconds: i64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn print_playlist(pws: &PlaylistWithSongs) {
    let playlist = &pws.playlist;
    println!(
        "#{} {} ({} songs, {})",
        playlist.id,
        playlist.name,
        playlist.song_count,
        format_duration(playlist.total_duration)
    );
    if let Some(description) = &playlist.description {
        println!("  {description}");
    }
    for (index, song) in pws.songs.iter().enumerate() {
        println!(
            "  {:>2}. [{}] {} - {} ({})",
            index + 1,
            song.id,
            song.artist,
            song.title,
            format_duration(i64::from(song.duration))
        );
    }
}

struct App {
    config: Config,
    playlists: Arc<PlaylistService>,
    users: Arc<UserService>,
    session: SessionManager<AuthHttpAdapter>,
}

impl App {
    async fn new(config: Config) -> Result<Self> {
        log::debug!("Opening database at: {}", config.database_path().display());
        let database = Arc::new(Database::open(&config.database_path()).await?);

        let playlists = Arc::new(PlaylistService::new(database.clone()));
        let users = Arc::new(UserService::with_retry(
            database,
            ProfileRetry::from(&config.profile_sync),
        ));

        let store_path = config.data_directory_path().join("local_store.json");
        let store = LocalStore::open(&store_path)
            .wrap_err_with(|| format!("Failed to open local records: {}", store_path.display()))?;

        let session = SessionManager::new(
            AuthHttpAdapter::new(config.auth_endpoint()?),
            users.clone(),
            store,
            SessionSettings {
                redirect_url: config.auth.redirect_url.clone(),
                origin: config.redirect_origin(),
                home_url: config.home_url.clone(),
            },
        );
        session
            .init()
            .await
            .wrap_err("Failed to restore saved session")?;

        Ok(Self {
            config,
            playlists,
            users,
            session,
        })
    }

    async fn require_user(&self) -> Result<crate::auth_rs::AuthUser> {
        self.session
            .current_user()
            .await
            .ok_or_else(|| crate::error::PlaylistError::AuthenticationRequired.into())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let _tracing_guard = init_tracing(
        args.otlp_endpoint.as_deref(),
        &args.log_level,
        args.pretty_logs,
    )?;

    log::debug!("Loading configuration");
    let config = {
        if let Some(config) = args.config {
            Config::from_file(&config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load smart-playlist config")?;

    match args.command {
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                let path = Config::create_default()?;
                log::info!("Default config available at {}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
        Commands::Serve { port } => {
            log::debug!("Opening database at: {}", config.database_path().display());
            let database = Arc::new(Database::open(&config.database_path()).await?);
            log::info!("Starting HTTP server on port: {}", port);
            http_server::app::start(port, database, config).await?;
        }
        command => run_client_command(command, App::new(config).await?).await?,
    }

    Ok(())
}

async fn run_client_command(command: Commands, app: App) -> Result<()> {
    match command {
        Commands::SignUp {
            email,
            password,
            display_name,
        } => {
            let user = app.session.register(&email, &password, &display_name).await?;
            if app.session.current_user().await.is_some() {
                println!("Signed up and signed in as {}", user.email.unwrap_or(user.id));
            } else {
                println!("Account created. Check {email} to confirm it, then sign in.");
            }
        }
        Commands::SignIn { email, password } => {
            let user = app.session.authenticate(&email, &password).await?;
            println!("Signed in as {}", user.email.unwrap_or(user.id));
        }
        Commands::SignInWithProvider {
            provider,
            current_path,
        } => match app
            .session
            .authenticate_with_provider(&provider, &current_path)
            .await?
        {
            ProviderSignIn::Redirect(url) => {
                println!("Open this URL to continue signing in with {provider}:");
                println!("{url}");
                println!("Then run `auth-callback <redirected url>`.");
            }
            ProviderSignIn::Cancelled => println!("Sign-in cancelled"),
        },
        Commands::AuthCallback { url } => {
            match app
                .session
                .complete_provider_sign_in(ProviderCallback::from_url(&url))
                .await?
            {
                ProviderCallbackOutcome::SignedIn {
                    user,
                    redirect_path,
                } => {
                    println!("Signed in as {}", user.email.unwrap_or(user.id));
                    log::debug!("Return path: {redirect_path}");
                }
                ProviderCallbackOutcome::Cancelled { .. } => println!("Sign-in cancelled"),
            }
        }
        Commands::SignOut => {
            let outcome = app.session.deauthenticate().await;
            if !outcome.signed_out_remotely {
                log::warn!("Signed out locally only");
            }
            println!("Signed out. Continue at {}", outcome.home_url);
        }
        Commands::Whoami { refresh } => {
            let user = if refresh {
                app.session.refresh_user().await?
            } else {
                app.session.current_user().await
            };
            match user {
                Some(user) => {
                    let profile = app.users.get_user_profile(&user.id).await?;
                    let stats = app.users.get_user_stats(&user.id).await?;
                    println!(
                        "{} <{}>",
                        profile.user.full_name.as_deref().unwrap_or("(no name)"),
                        user.email.as_deref().unwrap_or("no email")
                    );
                    println!("id: {}", user.id);
                    println!(
                        "{} playlists, {} songs, {} total",
                        stats.playlists_created,
                        stats.songs_added,
                        format_duration(stats.total_duration)
                    );
                }
                None => println!("Not signed in"),
            }
        }
        Commands::Generate {
            prompt,
            mood,
            song_count,
        } => {
            let user = app.session.current_user().await;
            let generator = PlaylistGenerator::new(
                GroqHttpAdapter::new(
                    &app.config.completion.base_url,
                    app.config.completion_api_key()?,
                )?,
                app.playlists.clone(),
                app.users.clone(),
                GeneratorSettings::from(&app.config.completion),
            );
            let generated = generator
                .generate(
                    user.as_ref(),
                    GenerateRequest {
                        prompt,
                        mood,
                        song_count: Some(song_count),
                    },
                )
                .await?;
            print_playlist(&generated.playlist);
            if generated.songs_persisted < generated.songs_attempted {
                println!(
                    "{} of {} songs could not be saved",
                    generated.songs_attempted - generated.songs_persisted,
                    generated.songs_attempted
                );
            }
        }
        Commands::Playlists { page, page_size } => {
            let user = app.require_user().await?;
            let result = app
                .playlists
                .list_user_playlists(&user.id, page, page_size)
                .await?;
            for pws in &result.items {
                print_playlist(pws);
            }
            println!(
                "Page {} ({} playlists total)",
                result.page, result.total_count
            );
        }
        Commands::Playlist { id } => {
            let user = app.session.current_user().await;
            let pws = app
                .playlists
                .get_playlist(user.as_ref().map(|u| u.id.as_str()), id)
                .await?;
            print_playlist(&pws);
        }
        Commands::RemoveSong {
            playlist_id,
            song_id,
        } => {
            let user = app.require_user().await?;
            app.playlists.require_owner(&user.id, playlist_id).await?;
            app.playlists.remove_song(playlist_id, song_id).await?;
            println!("Removed song {song_id} from playlist {playlist_id}");
        }
        Commands::Serve { .. } | Commands::Config(_) => {}
    }

    Ok(())
}
