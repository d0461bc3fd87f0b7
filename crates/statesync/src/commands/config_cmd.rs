use std::path::PathBuf;

use statesync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

fn target(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(statesync_config::config_path)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts, config: &Config) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            let path = target(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            statesync_config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "wrote default config");
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let rendered = toml::to_string_pretty(config)?;
            let out = output::render_single(
                &global.output,
                config,
                |_| rendered.clone(),
                |_| rendered.clone(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&target(global).display().to_string(), global.quiet);
            Ok(())
        }
    }
}
