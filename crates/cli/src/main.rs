//! Stockroom CLI - migrations and tenant administration.
//!
//! # Usage
//!
//! ```bash
//! # Apply schema migrations and create the session table
//! stockroom migrate
//!
//! # Manage stores
//! stockroom store create --name "Corner Shop" --slug corner-shop
//! stockroom store list
//! stockroom store delete corner-shop
//!
//! # Create a user with an explicit role
//! stockroom user create --store corner-shop -e owner@shop.com -p '...' -r admin
//! ```
//!
//! Self-service sign-up always creates `employee` users; `user create` is the
//! only way to grant `admin`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use secrecy::SecretString;

mod commands;

#[derive(Parser)]
#[command(name = "stockroom")]
#[command(author, version, about = "Stockroom operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage stores
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },
}

#[derive(Subcommand)]
enum StoreAction {
    /// Create a store
    Create {
        #[arg(short, long)]
        name: String,

        /// URL-safe identifier (`[a-z0-9-]+`)
        #[arg(short, long)]
        slug: String,
    },
    /// List stores
    List,
    /// Delete a store and everything in it
    Delete {
        slug: String,
    },
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user in a store
    Create {
        /// Slug of the store the user belongs to
        #[arg(long)]
        store: String,

        #[arg(short, long)]
        email: String,

        /// At least 10 characters
        #[arg(short, long)]
        password: String,

        /// `admin` or `employee`
        #[arg(short, long, default_value = "employee")]
        role: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Store { action } => match action {
            StoreAction::Create { name, slug } => {
                commands::store::create(&name, &slug).await?;
            }
            StoreAction::List => {
                let stores = commands::store::list().await?;
                #[allow(clippy::print_stdout)]
                for store in stores {
                    println!("{}\t{}\t{}", store.id, store.slug, store.name);
                }
            }
            StoreAction::Delete { slug } => commands::store::delete(&slug).await?,
        },
        Commands::User { action } => match action {
            UserAction::Create {
                store,
                email,
                password,
                role,
                name,
            } => {
                let password = SecretString::from(password);
                commands::user::create(&store, &email, &password, &role, name).await?;
            }
        },
    }
    Ok(())
}
