//! Config validation CLI tool
//!
//! Validates a shared enrolment configuration file and reports any errors.

use shared_enrol_util::{default_config_path, format_duration};
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a shared enrolment configuration file.");
            eprintln!();
            eprintln!("Default location: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match shared_enrol_config::load_config(&config_path) {
        Ok(settings) => {
            let plugin = &settings.plugin;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", shared_enrol_config::CURRENT_CONFIG_VERSION);
            println!("  Method enabled: {}", plugin.enabled);
            println!("  New instance status: {:?}", plugin.status);
            match plugin.role_id {
                Some(role) => println!("  Default role: {}", role),
                None => println!("  Default role: none"),
            }
            match plugin.enrol_period {
                Some(period) => println!("  Enrolment period: {}", format_duration(period)),
                None => println!("  Enrolment period: unlimited"),
            }
            println!("  Enrolment start: {:?}", plugin.enrol_start);
            println!("  Add to new courses: {}", plugin.default_enrol);
            println!(
                "  Sync task: {} [{}]{}",
                settings.task.name,
                settings.task.schedule,
                if settings.task.disabled { " (disabled)" } else { "" }
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                shared_enrol_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                shared_enrol_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                shared_enrol_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                shared_enrol_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        shared_enrol_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
