use std::io::{self, Write};

use chrono::Utc;
use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;

use svego_api::auth::{PasswordService, UserStore};
use svego_api::db::run_migrations;

#[derive(Parser, Debug)]
#[command(name = "create_user", about = "Create a local svego user account")]
struct Args {
    /// Login name, 4 to 16 characters.
    #[arg(long)]
    username: String,

    /// Email address for the account.
    #[arg(long)]
    email: String,

    /// Plaintext password to hash and store for this user.
    #[arg(long)]
    password: String,

    /// Create the account disabled.
    #[arg(long)]
    inactive: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args = Args::parse();
    let username = args.username.trim().to_string();

    if !(4..=16).contains(&username.chars().count()) {
        writeln!(io::stderr(), "error: username must be 4 to 16 characters")?;
        std::process::exit(1);
    }

    if !(5..=128).contains(&args.password.chars().count()) {
        writeln!(io::stderr(), "error: password must be 5 to 128 characters")?;
        std::process::exit(1);
    }

    if !args.email.contains('@') {
        writeln!(io::stderr(), "error: email must contain '@'")?;
        std::process::exit(1);
    }

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://svego.sqlite?mode=rwc".into());
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await?;
    run_migrations(&pool).await?;

    let users = UserStore::new(pool.clone());
    if users.find_by_username(&username).await?.is_some() {
        writeln!(
            io::stderr(),
            "error: a user named '{username}' already exists."
        )?;
        std::process::exit(1);
    }

    let password_hash = PasswordService::new()?.hash_password(&args.password)?;
    let user_id = users
        .create(&username, &args.email, &password_hash, !args.inactive, Utc::now())
        .await?;

    let state = if args.inactive { "inactive" } else { "active" };
    println!("Created {state} user '{username}' with id {user_id}");
    Ok(())
}
