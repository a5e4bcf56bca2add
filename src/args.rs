use clap::Parser;

/// Watch a Dota 2 account and fetch the details of every match it finishes.
#[derive(Parser, Debug)]
pub struct Args {
    /// JSON config file
    #[arg(long, default_value = "config.json")]
    pub config: String,
    /// overrides `state_file` from the config
    #[arg(long)]
    pub state_file: Option<String>,
    /// overrides `proxy` from the config
    #[arg(long)]
    pub proxy: Option<String>,
}
