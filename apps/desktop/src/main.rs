use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    load_settings, post_auth_destination, prepare_database_url, GateDecision, ProfileGateway,
    Route, RouteGate, SessionController, SessionPhase, SessionSnapshot, Transport,
};
use shared::domain::UserSummary;
use storage::SqliteTokenStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Sign in to the cycle tracking service and inspect the session")]
struct Args {
    /// Overrides `api_base_url` from settings.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the restored session.
    Status,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: String,
    },
    Logout,
    /// Print the onboarding profile of the signed-in user.
    Profile,
    /// Show what the navigation guard does for a screen path, e.g. `/home`.
    Open { path: String },
}

fn describe_user(user: &UserSummary) -> String {
    match &user.email {
        Some(email) => format!("{} <{email}>", user.name),
        None => user.name.clone(),
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    match snapshot.phase {
        SessionPhase::Authenticated => {
            let who = snapshot
                .user
                .as_ref()
                .map(describe_user)
                .unwrap_or_else(|| "unknown user".into());
            let profile = match snapshot.has_profile() {
                Some(true) => "complete",
                Some(false) => "not completed",
                None => "unknown",
            };
            println!("Signed in as {who}; profile {profile}");
        }
        SessionPhase::Unauthenticated => println!("Not signed in"),
        SessionPhase::Initializing => println!("Session still resolving"),
    }
    if let Some(error) = &snapshot.last_error {
        println!("Last error: {}", error.message);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(url) = args.server_url {
        settings.api_base_url = url;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    let database_url = prepare_database_url(&settings.database_url);
    let store = SqliteTokenStore::open(&database_url)
        .await
        .with_context(|| format!("failed to open session store '{database_url}'"))?;
    store.health_check().await?;
    let transport = Transport::with_timeout(
        &settings.api_base_url,
        Arc::new(store),
        settings.request_timeout(),
    )?;
    info!(api = %transport.base_url(), "session client ready");

    let controller = SessionController::new(Arc::clone(&transport));
    let gate = RouteGate::new(settings.profile_policy);
    let snapshot = controller.initialize().await;

    match args.command {
        Command::Status => print_status(&snapshot),
        Command::Login { email, password } => {
            let outcome = controller.login(&email, &password).await?;
            println!(
                "Signed in as {}; continue at {}",
                describe_user(&outcome.user),
                post_auth_destination(outcome.has_profile)
            );
        }
        Command::Register {
            email,
            password,
            name,
        } => {
            let outcome = controller.register(&email, &password, &name).await?;
            println!(
                "Registered {}; continue at {}",
                describe_user(&outcome.user),
                post_auth_destination(outcome.has_profile)
            );
        }
        Command::Logout => {
            controller.logout().await;
            println!("Signed out");
        }
        Command::Profile => {
            if !snapshot.is_authenticated() {
                bail!("not signed in");
            }
            match ProfileGateway::new(transport).get_profile().await? {
                Some(profile) => println!("{}", serde_json::to_string_pretty(&profile)?),
                None => println!(
                    "No profile yet; onboarding starts at {}",
                    post_auth_destination(false)
                ),
            }
        }
        Command::Open { path } => {
            let route =
                Route::from_path(&path).with_context(|| format!("unknown screen '{path}'"))?;
            match gate.decide(&controller.snapshot(), route) {
                GateDecision::Render(route) => println!("render {route}"),
                GateDecision::Redirect(target) => println!("redirect {route} -> {target}"),
                GateDecision::Loading => println!("loading {route}"),
            }
        }
    }

    Ok(())
}
