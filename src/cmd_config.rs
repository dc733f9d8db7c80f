use std::path::Path;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::ConfigAction;
use crate::config::AppConfig;

pub fn run(action: &ConfigAction, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Init => cmd_init(config_path),
        ConfigAction::Show => cmd_show(config_path),
        ConfigAction::Set { key, value } => cmd_set(config_path, key, value),
        ConfigAction::Path => {
            println!("{}", config_path.display());
            Ok(())
        }
    }
}

fn cmd_init(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!(
            "Config already exists at {}\nUse 'insightvault config set' to modify",
            config_path.display()
        );
    }
    let default = serde_json::to_value(AppConfig::default())?;
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, serde_json::to_string_pretty(&default)?)?;
    println!("Created {}", config_path.display());
    println!("Edit the file or use 'insightvault config set vault.url <url>' to add keys.");
    Ok(())
}

fn cmd_show(config_path: &Path) -> Result<()> {
    let json = if config_path.exists() {
        let content = std::fs::read_to_string(config_path)?;
        serde_json::from_str::<Value>(&content)?
    } else {
        eprintln!("No config at {}, showing defaults", config_path.display());
        serde_json::to_value(AppConfig::default())?
    };
    println!("{}", serde_json::to_string_pretty(&mask_secrets(&json))?);
    Ok(())
}

fn cmd_set(config_path: &Path, key: &str, value: &str) -> Result<()> {
    let mut json: Value = if config_path.exists() {
        serde_json::from_str(&std::fs::read_to_string(config_path)?)?
    } else {
        if let Some(p) = config_path.parent() {
            std::fs::create_dir_all(p)?;
        }
        serde_json::json!({ "version": 1 })
    };
    set_nested(&mut json, key, value)?;
    // Refuse to write something the session could not load.
    serde_json::from_value::<AppConfig>(json.clone())
        .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}"))?;
    std::fs::write(config_path, serde_json::to_string_pretty(&json)?)?;
    println!("Set {} = {}", key, mask_value(key, value));
    Ok(())
}

fn set_nested(json: &mut Value, key: &str, val: &str) -> Result<()> {
    let parts: Vec<&str> = key.split('.').filter(|p| !p.is_empty()).collect();
    let Some((last, parents)) = parts.split_last() else {
        bail!("Empty key");
    };
    let mut cur = json;
    for p in parents {
        cur = ensure_object(cur)
            .entry(p.to_string())
            .or_insert_with(|| serde_json::json!({}));
    }
    ensure_object(cur).insert(last.to_string(), typed_value(val));
    Ok(())
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn typed_value(val: &str) -> Value {
    if val == "true" {
        Value::Bool(true)
    } else if val == "false" {
        Value::Bool(false)
    } else if let Ok(n) = val.parse::<u64>() {
        Value::Number(n.into())
    } else if val.starts_with('[') {
        serde_json::from_str(val).unwrap_or_else(|_| Value::String(val.to_string()))
    } else {
        Value::String(val.to_string())
    }
}

fn mask_secrets(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut m = serde_json::Map::new();
            for (k, v) in map {
                match v {
                    Value::String(s) if is_secret_key(k) => {
                        m.insert(k.clone(), Value::String(mask_str(s)));
                    }
                    _ => {
                        m.insert(k.clone(), mask_secrets(v));
                    }
                }
            }
            Value::Object(m)
        }
        Value::Array(a) => Value::Array(a.iter().map(mask_secrets).collect()),
        other => other.clone(),
    }
}

fn is_secret_key(key: &str) -> bool {
    let u = key.to_uppercase();
    u.contains("KEY") || u.contains("SECRET") || u.contains("TOKEN")
}

fn mask_str(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= 8 {
        "***".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

fn mask_value(key: &str, value: &str) -> String {
    if is_secret_key(key) {
        mask_str(value)
    } else {
        value.to_string()
    }
}
