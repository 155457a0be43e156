use medicenso_core::ids;
use medicenso_core::{FieldDefinition, FieldType};

use crate::cli::FieldsCommands;
use crate::commands::common::{format_field_lines, settle, Session};
use crate::error::CliError;

pub async fn run_fields(session: &Session, command: FieldsCommands) -> Result<(), CliError> {
    match command {
        FieldsCommands::List { json } => run_fields_list(session, json).await,
        FieldsCommands::Add { label, value_type } => {
            run_fields_add(session, &label.join(" "), value_type).await
        }
        FieldsCommands::Toggle { id } => run_fields_toggle(session, &id).await,
        FieldsCommands::Remove { id, force } => run_fields_remove(session, &id, force).await,
    }
}

async fn run_fields_list(session: &Session, as_json: bool) -> Result<(), CliError> {
    let user = session.require_user()?;
    let fields = session.repository.get_fields(user).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
    } else {
        for line in format_field_lines(&fields) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn run_fields_add(
    session: &Session,
    label: &str,
    value_type: FieldType,
) -> Result<(), CliError> {
    let user = session.require_user()?;
    let mut fields = session.repository.get_fields(user).await?;
    let order = fields.iter().map(|field| field.order).max().unwrap_or(0) + 1;
    let field = FieldDefinition::custom(label, value_type, order);
    let id = field.id.clone();
    fields.push(field);

    session.repository.save_fields(fields, user).await?;
    settle(session).await?;
    println!("{id}");
    Ok(())
}

async fn run_fields_toggle(session: &Session, id: &str) -> Result<(), CliError> {
    let user = session.require_user()?;
    let mut fields = session.repository.get_fields(user).await?;
    let field_id = ids::canonicalize(id.trim());
    let field = fields
        .iter_mut()
        .find(|field| field.id == field_id)
        .ok_or_else(|| CliError::FieldNotFound(id.trim().to_string()))?;
    field.is_active = !field.is_active;
    let state = if field.is_active { "active" } else { "inactive" };

    session.repository.save_fields(fields, user).await?;
    settle(session).await?;
    println!("{field_id} {state}");
    Ok(())
}

/// Values already recorded under a removed field stay on their reports.
async fn run_fields_remove(session: &Session, id: &str, force: bool) -> Result<(), CliError> {
    let user = session.require_user()?;
    let mut fields = session.repository.get_fields(user).await?;
    let field_id = ids::canonicalize(id.trim());
    if !fields.iter().any(|field| field.id == field_id) {
        return Err(CliError::FieldNotFound(id.trim().to_string()));
    }
    if !force && session.repository.is_field_in_use(&field_id).await {
        return Err(CliError::FieldInUse(field_id));
    }

    fields.retain(|field| field.id != field_id);
    session.repository.save_fields(fields, user).await?;
    settle(session).await?;
    println!("{field_id}");
    Ok(())
}
