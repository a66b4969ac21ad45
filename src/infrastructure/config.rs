use crate::domain::models::Template;
use crate::domain::progress::DEFAULT_WARNING_MINUTES;
use crate::domain::schedule::ScheduleZone;
use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const TEMPLATES_JSON: &str = "templates.json";
const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub templates: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Routine Runner",
                "timezone": "local",
                "historyLimit": DEFAULT_HISTORY_LIMIT,
                "countdownWarningMinutes": DEFAULT_WARNING_MINUTES
            }),
        ),
        (
            TEMPLATES_JSON,
            serde_json::json!({
                "schema": 1,
                "templates": [
                    {
                        "id": "evening-routine",
                        "name": "Evening Routine",
                        "defaultEndTime": "20:30",
                        "tasks": [
                            { "id": "play-game", "title": "Play Game", "targetOffsetMinutes": 10 },
                            { "id": "brush-teeth", "title": "Brush Teeth", "targetOffsetMinutes": 15 },
                            { "id": "dessert", "title": "Dessert", "targetOffsetMinutes": 30 },
                            { "id": "dry-fruits", "title": "Dry Fruits", "targetOffsetMinutes": null }
                        ]
                    }
                ]
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        templates: read_config(&config_dir.join(TEMPLATES_JSON))?,
    })
}

fn read_app_u64(config_dir: &Path, key: &str) -> Result<Option<u64>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    match app.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            InfraError::InvalidConfig(format!("{key} must be a non-negative integer in {APP_JSON}"))
        }),
    }
}

/// Missing or `"local"` means the system zone.
pub fn read_timezone(config_dir: &Path) -> Result<ScheduleZone, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let raw = app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("local");
    ScheduleZone::parse(raw)
        .ok_or_else(|| InfraError::InvalidConfig(format!("unknown timezone '{}'", raw.trim())))
}

pub fn read_history_limit(config_dir: &Path) -> Result<usize, InfraError> {
    Ok(read_app_u64(config_dir, "historyLimit")?
        .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
        .unwrap_or(DEFAULT_HISTORY_LIMIT))
}

pub fn read_countdown_warning_minutes(config_dir: &Path) -> Result<i64, InfraError> {
    Ok(read_app_u64(config_dir, "countdownWarningMinutes")?
        .map(|minutes| i64::try_from(minutes).unwrap_or(i64::MAX))
        .unwrap_or(DEFAULT_WARNING_MINUTES))
}

pub fn read_templates(config_dir: &Path) -> Result<Vec<Template>, InfraError> {
    let path = config_dir.join(TEMPLATES_JSON);
    let config = read_config(&path)?;
    let raw = config
        .get("templates")
        .cloned()
        .unwrap_or_else(|| serde_json::json!([]));
    let templates: Vec<Template> = serde_json::from_value(raw)?;
    for template in &templates {
        template.validate().map_err(|message| {
            InfraError::InvalidConfig(format!("{message} in {}", path.display()))
        })?;
    }
    Ok(templates)
}
