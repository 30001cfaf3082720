//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let config = vegebridge_config::load_config(global.config.as_deref())?;
            print!("{}", config.to_redacted_toml()?);
            Ok(())
        }

        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(vegebridge_config::config_path);
            println!("{}", path.display());
            Ok(())
        }
    }
}
