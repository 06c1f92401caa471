//! Config command - Print the effective configuration.

use anyhow::Result;
use clap::Args;

use aide_chat::AideConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Only validate, print nothing
    #[arg(long)]
    check: bool,
}

pub async fn execute(args: ConfigArgs, config: AideConfig) -> Result<()> {
    config.validate()?;
    if !args.check {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}
