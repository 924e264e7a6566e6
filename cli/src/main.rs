mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    MealArgs, cmd_calendar_add, cmd_calendar_remove, cmd_calendar_show, cmd_ingredient_add,
    cmd_ingredient_list, cmd_ingredient_search, cmd_ingredient_update, cmd_meal_add,
    cmd_meal_delete, cmd_meal_import, cmd_meal_list, cmd_meal_rate, cmd_meal_show,
    cmd_sheet_export, cmd_sheet_import, cmd_shop_check, cmd_shop_delete, cmd_shop_generate,
    cmd_shop_list, cmd_shop_purge, cmd_shop_show,
};
use crate::config::Config;
use mealbook_core::search::DEFAULT_LIMIT;
use mealbook_core::service::MealbookService;

#[derive(Parser)]
#[command(
    name = "mealbook",
    version,
    about = "A household meal log with calendar planning and shopping lists"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
    /// Log and browse meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Manage the ingredient catalog
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Plan meals on the calendar
    Calendar {
        #[command(subcommand)]
        command: CalendarCommands,
    },
    /// Generate and work through shopping lists
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Export or import raw sheets as CSV
    Sheet {
        #[command(subcommand)]
        command: SheetCommands,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Log a meal
    Add {
        /// Meal name
        name: String,
        /// Kind: homemade, restaurant, friends
        #[arg(short, long, default_value = "homemade")]
        kind: String,
        /// Restaurant or host
        #[arg(long)]
        location: Option<String>,
        /// Rating from 1 to 5
        #[arg(short, long)]
        rating: Option<u8>,
        /// Effort: easy, medium, hard
        #[arg(long)]
        effort: Option<String>,
        /// Free-form notes
        #[arg(long)]
        notes: Option<String>,
        /// What happened to the leftovers
        #[arg(long)]
        leftovers: Option<String>,
        /// Tag (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Ingredient as "name:quantity unit (note)" (repeatable), e.g. "flour:2 cup"
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a meal from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Meal name override (defaults to metadata title or filename)
        #[arg(long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals, newest first
    List {
        /// Only meals of this kind
        #[arg(short, long)]
        kind: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a meal with its ingredients
    Show {
        /// Meal ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rate a meal from 1 to 5
    Rate {
        /// Meal ID
        id: String,
        /// Rating from 1 to 5
        rating: u8,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal with its ingredient lines and calendar entries
    Delete {
        /// Meal ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient to the catalog
    Add {
        /// Display name
        name: String,
        /// Store section: produce, meat, dairy, bakery, frozen, pantry, beverages, other
        #[arg(short, long)]
        section: Option<String>,
        /// Default unit
        #[arg(short, long)]
        unit: Option<String>,
        /// Mark as a common item usually already at home
        #[arg(long)]
        common: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all ingredients
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Fuzzy search ingredients by name
    Search {
        /// Search query (empty lists the most used)
        #[arg(default_value = "")]
        query: String,
        /// Maximum number of results
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an ingredient (affects future shopping lists only)
    Update {
        /// Ingredient ID
        id: String,
        /// New display name
        #[arg(long)]
        name: Option<String>,
        /// New store section
        #[arg(short, long)]
        section: Option<String>,
        /// New default unit
        #[arg(short, long)]
        unit: Option<String>,
        /// Common item flag (true/false)
        #[arg(long)]
        common: Option<bool>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CalendarCommands {
    /// Plan a meal on a date
    Add {
        /// Meal ID
        meal_id: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Slot: breakfast, lunch, dinner, snack
        #[arg(short, long, default_value = "dinner")]
        slot: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show planned meals
    Show {
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        start: Option<String>,
        /// Number of days to show
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a calendar entry
    Remove {
        /// Calendar entry ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Build a consolidated shopping list from up to four meals
    Generate {
        /// Meal IDs (1 to 4)
        #[arg(required = true, num_args = 1..)]
        meal_ids: Vec<String>,
        /// Leave out common items such as salt and oil
        #[arg(short = 'x', long)]
        exclude_common: bool,
        /// List name
        #[arg(short, long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List active shopping lists
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a shopping list
    Show {
        /// Shopping list ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check off an item (or uncheck it with --uncheck)
    Check {
        /// Shopping list ID
        list_id: String,
        /// Item ID
        item_id: String,
        /// Mark the item as not yet bought
        #[arg(long)]
        uncheck: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a shopping list
    Delete {
        /// Shopping list ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Permanently remove expired shopping lists
    Purge {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SheetCommands {
    /// Write a sheet as CSV
    Export {
        /// Sheet name, e.g. Meals or ShoppingListItems
        sheet: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Append CSV rows to a sheet
    Import {
        /// Sheet name, e.g. Meals or ShoppingListItems
        sheet: String,
        /// CSV file with the sheet's header row
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_directive = if matches!(cli.command, Commands::Serve { .. }) {
        "info"
    } else {
        "warn"
    };
    init_tracing(default_directive);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = MealbookService::open(&config.db_path)?;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let (api_key, new_api_key) = if no_auth {
                (None, false)
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                (Some(key), new)
            };
            let allowed_users = config.allowed_users()?;
            server::start_server(svc, port, &bind, api_key, allowed_users, new_api_key).await
        }
        Commands::Meal { command } => match command {
            MealCommands::Add {
                name,
                kind,
                location,
                rating,
                effort,
                notes,
                leftovers,
                tags,
                ingredients,
                json,
            } => cmd_meal_add(
                &svc,
                MealArgs {
                    name,
                    kind,
                    location,
                    rating,
                    effort,
                    notes,
                    leftovers,
                    tags,
                    ingredients,
                },
                json,
            ),
            MealCommands::Import { file, name, json } => cmd_meal_import(&svc, &file, name, json),
            MealCommands::List { kind, json } => cmd_meal_list(&svc, kind.as_deref(), json),
            MealCommands::Show { id, json } => cmd_meal_show(&svc, &id, json),
            MealCommands::Rate { id, rating, json } => cmd_meal_rate(&svc, &id, rating, json),
            MealCommands::Delete { id, json } => cmd_meal_delete(&svc, &id, json),
        },
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                name,
                section,
                unit,
                common,
                json,
            } => cmd_ingredient_add(&svc, &name, section.as_deref(), unit, common, json),
            IngredientCommands::List { json } => cmd_ingredient_list(&svc, json),
            IngredientCommands::Search { query, limit, json } => {
                cmd_ingredient_search(&svc, &query, limit, json)
            }
            IngredientCommands::Update {
                id,
                name,
                section,
                unit,
                common,
                json,
            } => cmd_ingredient_update(&svc, &id, name, section.as_deref(), unit, common, json),
        },
        Commands::Calendar { command } => match command {
            CalendarCommands::Add {
                meal_id,
                date,
                slot,
                json,
            } => cmd_calendar_add(&svc, &meal_id, date, &slot, json),
            CalendarCommands::Show { start, days, json } => {
                cmd_calendar_show(&svc, start, days, json)
            }
            CalendarCommands::Remove { id, json } => cmd_calendar_remove(&svc, &id, json),
        },
        Commands::Shop { command } => match command {
            ShopCommands::Generate {
                meal_ids,
                exclude_common,
                name,
                json,
            } => cmd_shop_generate(&svc, meal_ids, exclude_common, name, json),
            ShopCommands::List { json } => cmd_shop_list(&svc, json),
            ShopCommands::Show { id, json } => cmd_shop_show(&svc, &id, json),
            ShopCommands::Check {
                list_id,
                item_id,
                uncheck,
                json,
            } => cmd_shop_check(&svc, &list_id, &item_id, !uncheck, json),
            ShopCommands::Delete { id, json } => cmd_shop_delete(&svc, &id, json),
            ShopCommands::Purge { json } => cmd_shop_purge(&svc, json),
        },
        Commands::Sheet { command } => match command {
            SheetCommands::Export { sheet, output } => {
                cmd_sheet_export(&svc, &sheet, output.as_deref())
            }
            SheetCommands::Import { sheet, file, json } => {
                cmd_sheet_import(&svc, &sheet, &file, json)
            }
        },
    }
}
