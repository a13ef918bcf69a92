use clap::{Parser, Subcommand};
use portal_backend::config::Config;
use portal_backend::helper::asset_store::AssetStore;
use portal_backend::helper::auth_helpers::hash_password;
use portal_backend::helper::user_helpers::{self, RegisterRequest};
use portal_backend::models::db_operations::users_db_operations;
use portal_backend::models::Role;
use portal_backend::setup::db_setup::{self, SetupError};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial portal setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the schema and the upload directories. Safe to re-run.
    Setup,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = Config::from_env(&cli.env_file)
        .expect("FATAL: Failed to load or parse configuration.");

    match &cli.command {
        Commands::Db { action } => match action {
            DbAction::Setup => match setup_portal(&config) {
                Ok(()) => println!("✅ Portal database setup completed successfully."),
                Err(e) => eprintln!("❌ Error setting up the portal database: {}", e),
            },
        },
        Commands::Admin { action } => {
            let conn = match open_existing(&config) {
                Some(conn) => conn,
                None => return,
            };
            match action {
                AdminAction::Create { username, password, full_name, email } => {
                    create_admin_user(&conn, &config, username, password, full_name, email)
                }
                AdminAction::List => list_admin_users(&conn),
                AdminAction::ChangePassword { username, new_password } => {
                    change_admin_password(&conn, &config, username, new_password)
                }
            }
        }
    }
}

fn setup_portal(config: &Config) -> Result<(), SetupError> {
    let db_path = config.portal_db_path();
    println!("\nSetting up portal database at '{}'...", db_path.display());
    fs::create_dir_all(&config.database_path)?;

    let mut conn = Connection::open(&db_path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    db_setup::setup_portal_db(&mut conn)?;

    println!("- Creating upload directories under '{}'...", config.uploads_path);
    AssetStore::new(config.uploads_root()).ensure_layout()?;
    Ok(())
}

fn open_existing(config: &Config) -> Option<Connection> {
    let db_path = config.portal_db_path();
    if !db_path.exists() {
        eprintln!(
            "❌ Error: Portal database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        );
        return None;
    }
    match Connection::open(&db_path) {
        Ok(conn) => Some(conn),
        Err(e) => {
            eprintln!("❌ Error opening portal database: {}", e);
            None
        }
    }
}

fn create_admin_user(conn: &Connection, config: &Config, username: &str, password: &str, full_name: &str, email: &str) {
    let request = RegisterRequest {
        username: Some(username.to_string()),
        password: Some(password.to_string()),
        full_name: Some(full_name.to_string()),
        email: Some(email.to_string()),
        role: Some(Role::Admin),
        ..Default::default()
    };
    match user_helpers::register(conn, config.bcrypt_cost, request) {
        Ok(user) => println!("✅ Admin user '{}' created with id {}.", user.username, user.id),
        Err(e) => eprintln!("❌ Error creating admin user: {}", e),
    }
}

fn list_admin_users(conn: &Connection) {
    println!("Listing Admin Users:");
    match users_db_operations::read_users_by_role(conn, Role::Admin) {
        Ok(admins) => {
            for admin in admins {
                let status = if admin.is_active { "active" } else { "inactive" };
                println!("- {} <{}> ({})", admin.username, admin.email, status);
            }
        }
        Err(e) => eprintln!("❌ Error fetching admins: {}", e),
    }
}

fn change_admin_password(conn: &Connection, config: &Config, username: &str, new_password: &str) {
    let admin = match users_db_operations::read_user_by_username(conn, username) {
        Ok(Some(user)) if user.role == Role::Admin => user,
        Ok(_) => {
            eprintln!("❌ Error: No admin user named '{}' found.", username);
            return;
        }
        Err(e) => {
            eprintln!("❌ Error looking up '{}': {}", username, e);
            return;
        }
    };
    let result = hash_password(new_password, config.bcrypt_cost)
        .and_then(|hash| Ok(users_db_operations::update_password_hash(conn, admin.id, &hash)?));
    match result {
        Ok(_) => println!("✅ Password for admin user '{}' changed successfully.", username),
        Err(e) => eprintln!("❌ Error updating password: {}", e),
    }
}
