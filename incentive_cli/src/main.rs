use clap::Parser;
use incentive_cli::commands;
use incentive_cli::config::{BasketArgs, CliCommand, Config, GlobalOptions};
use incentive_cli::formatting::{evaluation_table, promotions_table, report_summary, tokens_table};
use libincentive::ids::PromotionId;
use log::*;

#[tokio::main]
async fn main() {
    env_logger::init();
    let config: Config = Config::parse();
    let (global_options, command) = config.to_parts();

    let result = match command {
        CliCommand::Init { force } => exec_init(&global_options, force),
        CliCommand::Promotions => exec_promotions(&global_options),
        CliCommand::Join { promotion_id } => exec_join(&global_options, promotion_id).await,
        CliCommand::Tokens => exec_tokens(&global_options),
        CliCommand::Evaluate(args) => exec_evaluate(&global_options, args).await,
        CliCommand::Checkout(args) => exec_checkout(&global_options, args).await,
    };

    if let Err(err) = result {
        eprintln!("** Error ** \n {err}");
        std::process::exit(1);
    }
}

fn exec_init(options: &GlobalOptions, force: bool) -> Result<(), anyhow::Error> {
    let path = commands::init(options, force)?;
    println!("Configuration written to {}", path.to_str().unwrap_or("[invalid utf-8 path]"));
    Ok(())
}

fn exec_promotions(options: &GlobalOptions) -> Result<(), anyhow::Error> {
    let config = commands::load_config(options)?;
    println!("{} active promotions.", config.promotions.len());
    println!("{}", promotions_table(&config.promotions));
    Ok(())
}

async fn exec_join(options: &GlobalOptions, promotion_id: PromotionId) -> Result<(), anyhow::Error> {
    let token = commands::join(options, &promotion_id).await?;
    println!("Joined {promotion_id}. New token: {token}");
    Ok(())
}

fn exec_tokens(options: &GlobalOptions) -> Result<(), anyhow::Error> {
    let tokens = commands::tokens(options)?;
    if tokens.is_empty() {
        println!("No tokens found. Use `incentive-cli join <promotion-id>` to join a promotion.");
        return Ok(());
    }
    println!("{}", tokens_table(&tokens));
    Ok(())
}

async fn exec_evaluate(options: &GlobalOptions, args: BasketArgs) -> Result<(), anyhow::Error> {
    let evaluation = commands::evaluate(options, &args).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&commands::evaluation_entries(&evaluation))?);
    } else {
        println!("{}", evaluation_table(&evaluation));
    }
    Ok(())
}

async fn exec_checkout(options: &GlobalOptions, args: BasketArgs) -> Result<(), anyhow::Error> {
    info!("Checking out {}", args.basket.display());
    let report = commands::checkout(options, &args).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report_summary(&report));
    }
    if !report.outcome.is_success() {
        return Err(anyhow::anyhow!("Checkout did not succeed: {}", report.outcome));
    }
    Ok(())
}
