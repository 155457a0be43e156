use std::env;

use medicenso_core::util::normalize_text_option;
use medicenso_core::UserId;

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            supabase_url,
            supabase_anon_key,
            user_id,
            no_activate,
        } => run_config_init(
            global_profile,
            ProfileInput {
                supabase_url,
                supabase_anon_key,
                user_id,
            },
            no_activate,
        ),
        ConfigCommands::Show => run_config_show(global_profile),
    }
}

/// Values supplied on the command line for `config init`.
#[derive(Debug, Default)]
pub struct ProfileInput {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub user_id: Option<String>,
}

fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(
        input,
        &existing,
        env::var("SUPABASE_URL").ok(),
        env::var("SUPABASE_ANON_KEY").ok(),
    )?;
    *config.profile_mut_or_default(&profile_name) = merged;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    Ok(())
}

/// Explicit values win, then the environment, then what the profile held.
pub fn merge_profile(
    input: ProfileInput,
    existing: &CliProfile,
    env_supabase_url: Option<String>,
    env_supabase_anon_key: Option<String>,
) -> Result<CliProfile, CliError> {
    let merged = CliProfile {
        supabase_url: normalize_text_option(input.supabase_url)
            .or_else(|| normalize_text_option(env_supabase_url))
            .or_else(|| existing.supabase_url()),
        supabase_anon_key: normalize_text_option(input.supabase_anon_key)
            .or_else(|| normalize_text_option(env_supabase_anon_key))
            .or_else(|| existing.supabase_anon_key()),
        user_id: normalize_text_option(input.user_id).or_else(|| existing.user_id()),
    };

    merged.remote_config().map_err(CliError::Config)?;
    if let Some(user_id) = merged.user_id.as_deref() {
        user_id.parse::<UserId>()?;
    }
    Ok(merged)
}

fn run_config_show(global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let Some(profile) = config.profile(&profile_name) else {
        println!("Profile '{profile_name}' is not configured.");
        return Ok(());
    };

    println!("Profile:      {profile_name}");
    println!(
        "Supabase URL: {}",
        profile.supabase_url().as_deref().unwrap_or("(unset)")
    );
    println!(
        "Anon key:     {}",
        if profile.supabase_anon_key().is_some() {
            "(set)"
        } else {
            "(unset)"
        }
    );
    println!(
        "User:         {}",
        profile.user_id().as_deref().unwrap_or("(unset)")
    );
    Ok(())
}
