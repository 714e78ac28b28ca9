mod config;
mod database;
mod error;
mod filters;
mod handlers;
mod identity;
mod middleware;
mod models;
mod scheduling;
mod seed;
mod state;
mod store;
mod utils;
mod validation;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::routing::{get, patch, post};
use axum::Router;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::{Config, IdentityConfig};
use database::{create_database_pool, run_migrations};
use identity::{FirebaseIdentityProvider, IdentityProvider, LocalIdentityProvider};
use middleware::{throttle_anonymous, throttle_callers, Throttle};
use state::AppState;
use store::accounts::NewSuperuser;

#[derive(Debug, Parser)]
#[command(name = "repairdesk")]
#[command(about = "Repair shop backend: REST API and staff console")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (the default)
    Serve,

    /// Create a superuser together with its identity-provider account
    CreateAdmin {
        #[arg(long)]
        email: String,

        /// Falls back to the ADMIN_PASSWORD env var
        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        first_name: String,

        #[arg(long)]
        last_name: String,
    },

    /// Load the starter service catalog and shop stock
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();
    let cli = Cli::parse();

    let config = Config::from_env()?;

    let db = create_database_pool(&config.database_url, config.database_max_connections).await?;
    run_migrations(&db).await?;

    let identity = identity_provider(&config)?;
    log::info!("identity provider: {}", identity.name());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(db, identity, config).await,
        Command::CreateAdmin {
            email,
            password,
            first_name,
            last_name,
        } => {
            let password = password
                .or_else(|| std::env::var("ADMIN_PASSWORD").ok())
                .ok_or("--password or ADMIN_PASSWORD is required")?;
            let new = NewSuperuser {
                email: &email,
                password: &password,
                first_name: &first_name,
                last_name: &last_name,
            };
            let hash = utils::hash_password(&password)?;
            let account =
                store::accounts::create_superuser(&db, identity.as_ref(), &new, &hash).await?;
            println!("superuser {} created", account.email);
            Ok(())
        }
        Command::Seed => {
            let report = seed::run(&db).await?;
            println!(
                "seeded {} categories, {} services, {} detailed services, {} parts",
                report.categories, report.services, report.detailed_services, report.parts
            );
            Ok(())
        }
    }
}

fn identity_provider(
    config: &Config,
) -> Result<Arc<dyn IdentityProvider>, Box<dyn std::error::Error>> {
    let identity: Arc<dyn IdentityProvider> = match &config.identity {
        IdentityConfig::Local {
            jwt_secret,
            token_ttl_hours,
        } => Arc::new(LocalIdentityProvider::new(jwt_secret, *token_ttl_hours)),
        IdentityConfig::Firebase {
            project_id,
            credentials_path,
            check_revoked,
        } => Arc::new(FirebaseIdentityProvider::from_credentials_file(
            project_id.clone(),
            credentials_path,
            *check_revoked,
        )?),
    };
    Ok(identity)
}

async fn serve(
    db: database::Database,
    identity: Arc<dyn IdentityProvider>,
    config: Config,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(email) = &config.bootstrap_admin_email {
        store::accounts::bootstrap_admin(&db, identity.as_ref(), email).await?;
    }

    let addr = config.addr;
    let app = create_router(AppState::new(db, identity, config));

    log::info!("repairdesk listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

fn api_routes() -> Router<AppState> {
    use handlers::{auth, bookings, catalog, finances, inventory, users};

    Router::new()
        .route("/health", get(handlers::health))
        // Accounts
        .route("/logout", post(auth::logout))
        .route("/user/me", get(auth::me))
        .route("/user/:id/change-password", post(auth::change_password))
        .route("/profiles/login-token", post(auth::regenerate_login_token))
        .route("/users", get(users::list_users))
        .route("/users/:id", get(users::get_user).patch(users::update_user))
        .route("/users/:id/toggle-active", post(users::toggle_active))
        // Inventory
        .route("/devices", get(inventory::list_devices).post(inventory::create_device))
        .route("/devices/:id", get(inventory::get_device))
        .route("/devices/:id/status", patch(inventory::update_device_status))
        .route("/devices/:id/history", get(inventory::device_history))
        .route("/parts", get(inventory::list_parts).post(inventory::create_part))
        .route("/parts/low-stock", get(inventory::low_stock))
        .route("/parts/:id", get(inventory::get_part))
        .route(
            "/parts/:id/movements",
            get(inventory::list_movements).post(inventory::record_movement),
        )
        // Catalog
        .route("/categories", get(catalog::list_categories).post(catalog::create_category))
        .route("/categories/:id", get(catalog::get_category))
        .route("/services", get(catalog::list_services).post(catalog::create_service))
        .route("/services/:id", get(catalog::get_service))
        .route(
            "/detailed-services",
            get(catalog::list_detailed_services).post(catalog::create_detailed_service),
        )
        .route("/detailed-services/:id", get(catalog::get_detailed_service))
        .route("/detailed-services/:id/parts", post(catalog::add_part_required))
        // Bookings
        .route("/bookings", get(bookings::list_bookings).post(bookings::create_booking))
        .route("/bookings/:id", get(bookings::get_booking).patch(bookings::update_booking))
        // Finances
        .route(
            "/transactions",
            get(finances::list_transactions).post(finances::create_transaction),
        )
        .route("/transactions/:id", get(finances::get_transaction))
        .route("/transactions/:id/payments", post(finances::record_payment))
        .route("/transactions/:id/deactivate", post(finances::deactivate_transaction))
        .route("/finances/summaries", get(finances::list_summaries))
        .route("/finances/summaries/:date", get(finances::get_summary))
        .route(
            "/finances/summaries/:date/recompute",
            post(finances::recompute_summary),
        )
}

/// Credential-issuing endpoints, throttled per client address.
fn auth_routes() -> Router<AppState> {
    use handlers::auth;

    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
}

fn admin_routes(auth_throttle: Arc<Throttle>) -> Router<AppState> {
    use handlers::admin;

    let login = get(admin::login_page).merge(
        post(admin::login).route_layer(from_fn_with_state(auth_throttle, throttle_anonymous)),
    );

    Router::new()
        .route("/", get(admin::dashboard))
        .route("/login", login)
        .route("/logout", post(admin::logout))
        .route("/bookings", get(admin::bookings))
        .route("/transactions", get(admin::transactions))
        .route("/transactions/:id/deactivate", post(admin::deactivate_transaction))
        .route("/inventory", get(admin::inventory))
        .route("/summaries", get(admin::summaries))
        .route("/summaries/recompute", post(admin::recompute_summary))
}

fn create_router(state: AppState) -> Router {
    let auth_throttle = Arc::new(Throttle::per_minute(
        "auth",
        state.config.auth_throttle_per_minute,
    ));
    let caller_throttle = Arc::new(Throttle::per_minute(
        "api",
        state.config.user_throttle_per_minute,
    ));

    Router::new()
        .route("/", get(|| async { Redirect::permanent("/admin") }))
        .merge(
            auth_routes()
                .route_layer(from_fn_with_state(auth_throttle.clone(), throttle_anonymous)),
        )
        .merge(api_routes().route_layer(from_fn_with_state(caller_throttle, throttle_callers)))
        .nest("/admin", admin_routes(auth_throttle))
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CookieManagerLayer::new())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(2 * 1024 * 1024)),
        )
        .with_state(state)
}
