use actix_cors::Cors;
use actix_web::http::header;
use actix_web::{middleware::{DefaultHeaders, Logger}, web, App, HttpResponse, HttpServer, Responder};
use clap::Parser;
use portal_backend::{build_pool, config::Config, helper::asset_store::AssetKind, routes, AppState};
use std::fs;
use std::path::PathBuf;

/// Liveness check for load balancers.
async fn root_handler() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("OK")
}

#[derive(Parser, Debug)]
#[command(name = "portal_server", author, version, about = "Starts the internal portal API server.")]
struct Cli {
    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

fn build_cors(allowed_origins: &str) -> Cors {
    let cors = if allowed_origins.trim() == "*" {
        Cors::default().allow_any_origin()
    } else {
        allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };
    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .expose_headers(vec![header::CONTENT_DISPOSITION])
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    fs::create_dir_all(&config.database_path)?;
    let pool = build_pool(&config.portal_db_path())
        .expect("FATAL: Failed to create the SQLite connection pool.");

    let state = AppState::from_config(&config)
        .expect("FATAL: JWT_SECRET could not be decoded.");
    state.assets.ensure_layout()?;
    let avatars_dir = state.assets.kind_dir(AssetKind::Avatar);
    let thumbnails_dir = state.assets.kind_dir(AssetKind::Thumbnail);

    let pool_data = web::Data::new(pool);
    let state_data = web::Data::new(state);

    let server_address = format!("{}:{}", config.web.host, config.web.port);
    log::info!("Portal server starting at http://{}", server_address);

    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&config.allowed_origins))
            .wrap(Logger::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY")),
            )
            .app_data(pool_data.clone())
            .app_data(state_data.clone())
            .configure(routes::config_api)
            // Documents are not mounted; only the download and preview routes serve them.
            .service(actix_files::Files::new("/uploads/avatars", &avatars_dir))
            .service(actix_files::Files::new("/uploads/thumbnails", &thumbnails_dir))
            .route("/", web::get().to(root_handler))
    })
    .bind(server_address)?
    .run()
    .await
}
