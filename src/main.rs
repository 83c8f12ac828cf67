mod api;
mod app;
mod catalog;
mod chat;
mod error;
mod storage;
mod ui;
mod utils;

use clap::{Args, Parser, Subcommand};
use dotenvy::dotenv;

use crate::api::client::ApiClient;
use crate::api::models::UserId;
use crate::app::AppConfig;
use crate::catalog::filter::{sort_listings, ListingFilter, SortKey};
use crate::catalog::models::ListingKind;
use crate::catalog::profile::ProfileUpdate;
use crate::error::CliError;
use crate::storage::Session;

#[derive(Debug, Parser)]
#[command(name = "evmarket", version, about = "Browse the EV Market storefront and chat with sellers")]
struct Cli {
    /// Backend URL, overrides the config file and EVMARKET_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Remember who you are for the other commands.
    Login {
        #[arg(long)]
        user_id: UserId,
        #[arg(long)]
        name: String,
        #[arg(long)]
        token: Option<String>,
    },
    Logout,
    Whoami,
    /// Show the client configuration; with flags, change and save it.
    Config {
        #[arg(long)]
        ws_url: Option<String>,
        #[arg(long)]
        reconnect_delay_ms: Option<u64>,
    },
    /// List vehicles and batteries for sale.
    Listings(ListingArgs),
    /// Show one listing in full.
    Show { id: String },
    /// Side-by-side comparison of up to four listings.
    Compare {
        #[arg(required = true, num_args = 1..)]
        ids: Vec<String>,
    },
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
    /// Real-time chat with buyers and sellers.
    Chat {
        /// Open the conversation with this user right away.
        #[arg(long)]
        with: Option<UserId>,
    },
}

#[derive(Debug, Args)]
struct ListingArgs {
    /// vehicle or battery
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    min_price: Option<u64>,
    #[arg(long)]
    max_price: Option<u64>,
    #[arg(long)]
    min_year: Option<u16>,
    #[arg(long)]
    max_year: Option<u16>,
    /// Minimum battery health in percent.
    #[arg(long)]
    min_health: Option<f64>,
    /// Free text matched against title, brand and model.
    #[arg(long, short)]
    query: Option<String>,
    /// newest, price-asc, price-desc, year-desc, mileage-asc, health-desc
    #[arg(long, default_value = "newest")]
    sort: String,
}

impl ListingArgs {
    fn into_parts(self) -> Result<(ListingFilter, SortKey), CliError> {
        let kind = self
            .kind
            .as_deref()
            .map(str::parse::<ListingKind>)
            .transpose()
            .map_err(CliError::Usage)?;
        let sort = self.sort.parse::<SortKey>().map_err(CliError::Usage)?;
        let filter = ListingFilter {
            kind,
            brand: self.brand,
            min_price: self.min_price,
            max_price: self.max_price,
            min_year: self.min_year,
            max_year: self.max_year,
            min_health: self.min_health,
            query: self.query,
        };
        Ok((filter, sort))
    }
}

#[derive(Debug, Subcommand)]
enum ProfileAction {
    Show,
    Update {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
}

fn require_session() -> Result<Session, CliError> {
    Session::load()?.ok_or(CliError::NotLoggedIn)
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::load()?;
    let base_override = cli.base_url.clone();
    if let Some(url) = &base_override {
        config.apply_overrides(|key| (key == "EVMARKET_BASE_URL").then(|| url.clone()));
    }
    log::debug!("using backend {} and push channel {}", config.base_url, config.ws_url);
    let mut stdout = std::io::stdout();

    match cli.command {
        Commands::Login { user_id, name, token } => {
            ui::login::login(&config, user_id, &name, token).await?;
        }
        Commands::Logout => ui::login::logout()?,
        Commands::Whoami => match Session::load()? {
            Some(s) => println!("{} (#{})", s.display_name, s.user_id),
            None => println!("Not signed in."),
        },
        Commands::Config { ws_url, reconnect_delay_ms } => {
            let changed = base_override.is_some() || ws_url.is_some() || reconnect_delay_ms.is_some();
            if let Some(url) = ws_url {
                config.apply_overrides(|key| (key == "EVMARKET_WS_URL").then(|| url.clone()));
            }
            if let Some(ms) = reconnect_delay_ms {
                config.reconnect_delay_ms = ms;
            }
            if changed {
                config.save()?;
                println!("Saved.");
            }
            println!("base_url           = {}", config.base_url);
            println!("ws_url             = {}", config.ws_url);
            println!("reconnect_delay_ms = {}", config.reconnect_delay_ms);
        }
        Commands::Listings(args) => {
            let (filter, sort) = args.into_parts()?;
            let client = ApiClient::new(&config, None)?;
            // the backend may ignore some filters, so they are applied here as well
            let mut listings = filter.apply(client.listings(&filter).await?);
            sort_listings(&mut listings, sort);
            ui::listings::print_listings(&mut stdout, &listings)?;
        }
        Commands::Show { id } => {
            let client = ApiClient::new(&config, None)?;
            let listing = client.listing(&id).await?;
            ui::listings::print_listing(&mut stdout, &listing)?;
        }
        Commands::Compare { ids } => {
            if ids.len() > catalog::compare::MAX_COMPARED {
                return Err(catalog::compare::CompareError::TooMany(ids.len()).into());
            }
            let client = ApiClient::new(&config, None)?;
            let mut listings = Vec::with_capacity(ids.len());
            for id in &ids {
                listings.push(client.listing(id).await?);
            }
            let table = catalog::compare::compare(&listings)?;
            ui::listings::print_comparison(&mut stdout, &table)?;
        }
        Commands::Profile { action } => {
            let session = require_session()?;
            let client = ApiClient::new(&config, session.token.clone())?;
            let profile = match action {
                ProfileAction::Show => client.profile(session.user_id).await?,
                ProfileAction::Update {
                    name,
                    email,
                    phone,
                    address,
                } => {
                    let update = ProfileUpdate {
                        full_name: name,
                        email,
                        phone,
                        address,
                    }
                    .validate()?;
                    client.update_profile(session.user_id, &update).await?
                }
            };
            ui::listings::print_profile(&mut stdout, &profile)?;
        }
        Commands::Chat { with } => {
            let session = require_session()?;
            ui::main_window::run_chat(&config, &session, with).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        log::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn listing_flags_become_a_filter() {
        let cli = Cli::parse_from([
            "evmarket", "listings", "--type", "battery", "--min-health", "85", "--sort", "price-asc",
        ]);
        let Commands::Listings(args) = cli.command else {
            panic!("expected listings");
        };
        let (filter, sort) = args.into_parts().unwrap();
        assert_eq!(filter.kind, Some(ListingKind::Battery));
        assert_eq!(filter.min_health, Some(85.0));
        assert_eq!(sort, SortKey::PriceAsc);
    }

    #[test]
    fn bad_sort_is_a_usage_error() {
        let cli = Cli::parse_from(["evmarket", "listings", "--sort", "cheapest"]);
        let Commands::Listings(args) = cli.command else {
            panic!("expected listings");
        };
        assert!(matches!(args.into_parts(), Err(CliError::Usage(_))));
    }
}
