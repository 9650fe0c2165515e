use clap::{Args, Parser, Subcommand};
use libincentive::choice::UpdateChoice;
use libincentive::ids::PromotionId;
use std::path::PathBuf;

/// Privacy-preserving loyalty tokens at the till.
///
/// Evaluate and check out baskets against a promotion catalog, using in-process store and provider services.
#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// Path to the configuration file. The default is `$HOME/.incentive/config.yml`.
    #[arg(long = "config-file", short = 'c', env = "INCENTIVE_CONFIG")]
    pub config_file: Option<PathBuf>,
    /// Directory holding the token files. The default is `tokens/` next to the configuration file.
    #[arg(long = "tokens-dir", env = "INCENTIVE_TOKENS")]
    pub tokens_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Write a starter configuration with fresh keys and a sample catalog.
    #[command(name = "init")]
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long = "force", short = 'f', default_value_t = false)]
        force: bool,
    },
    /// List the active promotions and their update rules.
    #[command(name = "promotions", alias = "ls")]
    Promotions,
    /// Join a promotion, storing a fresh token with zero points.
    #[command(name = "join")]
    Join {
        /// The id of the promotion to join.
        promotion_id: PromotionId,
    },
    /// List the stored tokens.
    #[command(name = "tokens")]
    Tokens,
    /// Show the updates that are feasible for a basket.
    #[command(name = "evaluate", alias = "eval")]
    Evaluate(BasketArgs),
    /// Check out a basket, applying the chosen updates.
    #[command(name = "checkout", alias = "pay")]
    Checkout(BasketArgs),
}

#[derive(Debug, Args)]
pub struct BasketArgs {
    /// A YAML file describing the basket.
    pub basket: PathBuf,
    /// The update to apply for a promotion, as `PROMO=CHOICE`. CHOICE is `none`, `earn` or `zkp:<update-id>`.
    #[arg(long = "choose", value_parser = parse_choice)]
    pub choose: Vec<(PromotionId, UpdateChoice)>,
    /// Print JSON instead of tables.
    #[arg(long = "json", default_value_t = false)]
    pub json: bool,
}

fn parse_choice(arg: &str) -> Result<(PromotionId, UpdateChoice), String> {
    let (promotion, choice) = arg.split_once('=').ok_or_else(|| format!("expected PROMO=CHOICE, got '{arg}'"))?;
    if promotion.trim().is_empty() {
        return Err(format!("missing promotion id in '{arg}'"));
    }
    let choice = choice.parse::<UpdateChoice>().map_err(|e| e.to_string())?;
    Ok((PromotionId::new(promotion.trim()), choice))
}

pub struct GlobalOptions {
    pub config_file: Option<PathBuf>,
    pub tokens_dir: Option<PathBuf>,
}

impl GlobalOptions {
    pub fn config_path(&self) -> PathBuf {
        self.config_file.clone().unwrap_or_else(default_config_path)
    }

    pub fn tokens_path(&self) -> PathBuf {
        match &self.tokens_dir {
            Some(dir) => dir.clone(),
            None => {
                let config = self.config_path();
                config.parent().map(|p| p.join("tokens")).unwrap_or_else(|| PathBuf::from("tokens"))
            }
        }
    }
}

impl Config {
    pub fn to_parts(self) -> (GlobalOptions, CliCommand) {
        let global = GlobalOptions { config_file: self.config_file, tokens_dir: self.tokens_dir };
        (global, self.command)
    }
}

pub fn default_config_path() -> PathBuf {
    let mut home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    home.push(".incentive");
    home.push("config.yml");
    home
}
