//! Config subcommand handlers. Read-only: the CLI never writes its config.

use serde::Serialize;
use tabled::Tabled;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

#[derive(Serialize, Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Default")]
    default: bool,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Capture")]
    capture: String,
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let rendered = config::render_config(&cfg)?;
            let out = output::render_single(&global.output, &cfg, |_| rendered.clone(), |_| {
                config::effective_path(global).display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            let path = config::effective_path(global);
            let note = if path.exists() { "" } else { " (not created)" };
            output::print_output(&format!("{}{note}", path.display()), global.quiet);
            Ok(())
        }

        ConfigCommand::Profiles => {
            let cfg = config::load(global)?;
            if cfg.profiles.is_empty() {
                eprintln!("No profiles configured in {}", config::effective_path(global).display());
                return Ok(());
            }
            let active = config::active_profile_name(global, &cfg);
            let rows: Vec<ProfileRow> = cfg
                .profile_names()
                .into_iter()
                .map(|name| {
                    let p = &cfg.profiles[&name];
                    ProfileRow {
                        default: name == active,
                        address: p.address.clone(),
                        capture: p.capture.as_ref().map(|c| c.display().to_string()).unwrap_or_default(),
                        name,
                    }
                })
                .collect();
            let out = output::render_list(&global.output, &rows, |r| r.name.clone())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
