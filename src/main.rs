use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use serde::Serialize;

use plateprefs::config;
use plateprefs::{App, AppError, MealSuggestions};

/// On-chain food preferences and AI dish suggestions
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Store food preferences on-chain and get AI dish suggestions"
)]
struct Args {
    /// Config file (defaults to ~/.config/plateprefs/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read, write or watch on-chain preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),

    /// Suggest three traditional dishes per meal type
    Suggest {
        /// Country, e.g. "Italy"
        country: String,
        /// One or more meal types, e.g. "Breakfast" "Dinner"
        #[arg(required = true)]
        meal_types: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Print the preferences stored for a fid (null if none)
    Get { fid: u64 },

    /// Store preferences for a fid
    Set {
        fid: u64,
        #[arg(long, default_value = "")]
        country: String,
        /// Dietary restrictions, free text
        #[arg(long = "diet", default_value = "")]
        dietary_restrictions: String,
    },

    /// Print preference updates as they happen until Ctrl-C
    Watch,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionOutput<'a> {
    meal_type: &'a str,
    suggestions: Option<&'a [plateprefs::DishSuggestion]>,
}

fn main() -> Result<()> {
    init_logging();
    color_eyre::install()?;

    let args = Args::parse();

    let config_result = config::load_config(args.config.as_deref());
    if let Some(warning) = &config_result.warning {
        log::warn!("{}", warning);
    }
    let mut config = config_result.config;
    config.apply_env(|name| std::env::var(name).ok());
    let settings = config.validate().map_err(AppError::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let app = App::new(settings);
        run(&app, args.command).await
    })?;

    Ok(())
}

/// Logs go to stderr at `info` unless RUST_LOG says otherwise
fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let datetime = chrono::Local::now();
            writeln!(
                buf,
                "[{}] [{}] {}",
                datetime.format("%Y-%m-%dT%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .init();
}

async fn run(app: &App, command: Command) -> Result<(), AppError> {
    match command {
        Command::Prefs(PrefsCommand::Get { fid }) => {
            let record = app.preferences().get_preferences(fid).await?;
            print_json(&record)
        }
        Command::Prefs(PrefsCommand::Set {
            fid,
            country,
            dietary_restrictions,
        }) => {
            let hash = app
                .preferences()
                .set_preferences(fid, &country, &dietary_restrictions)
                .await?;
            print_json(&hash)
        }
        Command::Prefs(PrefsCommand::Watch) => watch(app).await,
        Command::Suggest {
            country,
            meal_types,
        } => {
            let results = app.suggest_meals(&country, &meal_types).await;
            print_suggestions(&results)?;

            if results.iter().all(|r| r.suggestions.is_none()) {
                return Err(AppError::NoSuggestions {
                    country,
                    meal_type: meal_types.join(", "),
                });
            }
            Ok(())
        }
    }
}

async fn watch(app: &App) -> Result<(), AppError> {
    let handle = app.preferences().on_preferences_updated(
        |updates| {
            for update in updates {
                if let Err(e) = print_json(&update) {
                    log::error!("Failed to print update: {}", e);
                }
            }
        },
        |_| {},
    )?;

    tokio::signal::ctrl_c().await?;
    log::info!("Stopping preference watch");
    handle.stop().await;
    Ok(())
}

fn print_suggestions(results: &[MealSuggestions]) -> Result<(), AppError> {
    let output: Vec<SuggestionOutput> = results
        .iter()
        .map(|r| SuggestionOutput {
            meal_type: &r.meal_type,
            suggestions: r.suggestions.as_deref().map(|set| set.suggestions()),
        })
        .collect();
    print_json(&output)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(io::Error::from)?;
    writeln!(stdout)?;
    Ok(())
}
