//! Configuration loading and client initialization.

use std::{fs, path::Path, sync::Arc};

use bitcoind_async_client::{Auth, Client};
use tipwatch_config::{BitcoindConfig, Config};
use toml::value::{Table, Value};

use crate::{args::Args, errors::*};

/// Loads the config file, applies overrides and validates the result.
pub(crate) fn load_config(args: &Args) -> Result<Config, InitError> {
    let mut config_toml = load_config_from_path(&args.config)?;

    let overrides = args
        .get_all_overrides()
        .iter()
        .map(|o| parse_override(o))
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let table = config_toml
        .as_table_mut()
        .ok_or(ConfigError::TraverseNonTableAt {
            key: "<root>".to_string(),
            path: "".to_string(),
        })?;

    for (path, val) in overrides {
        apply_override(&path, val, table)?;
    }

    let config = config_toml.try_into::<Config>()?;
    validate_config(config)
}

fn load_config_from_path(path: &Path) -> Result<Value, InitError> {
    let config_str = fs::read_to_string(path)?;
    Ok(toml::from_str(&config_str)?)
}

fn validate_config(config: Config) -> Result<Config, InitError> {
    let reader = &config.btcio.reader;
    if reader.client_poll_dur_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "btcio.reader.client_poll_dur_ms",
            reason: "must be positive",
        }
        .into());
    }
    if reader.max_reorg_depth == 0 {
        return Err(ConfigError::InvalidValue {
            key: "btcio.reader.max_reorg_depth",
            reason: "must be positive",
        }
        .into());
    }
    Ok(config)
}

/// Splits a `key.path=value` override.
pub(crate) fn parse_override(override_str: &str) -> Result<(String, Value), ConfigError> {
    let (key, value) = override_str
        .split_once('=')
        .ok_or_else(|| ConfigError::InvalidOverride(override_str.to_string()))?;
    let key = key.trim();
    if key.is_empty() || key.split('.').any(str::is_empty) {
        return Err(ConfigError::InvalidOverride(override_str.to_string()));
    }
    Ok((key.to_string(), parse_value(value.trim())))
}

/// Parses an override value, falling back to a plain string.
///
/// Wrap a value in double quotes to force it to stay a string.
fn parse_value(raw: &str) -> Value {
    if let Some(quoted) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Value::String(quoted.to_string());
    }
    if let Ok(v) = raw.parse::<i64>() {
        Value::Integer(v)
    } else if let Ok(v) = raw.parse::<bool>() {
        Value::Boolean(v)
    } else if let Ok(v) = raw.parse::<f64>() {
        Value::Float(v)
    } else {
        Value::String(raw.to_string())
    }
}

/// Sets `path` in `table`, creating intermediate tables as needed.
pub(crate) fn apply_override(path: &str, val: Value, table: &mut Table) -> Result<(), ConfigError> {
    match path.split_once('.') {
        None => {
            table.insert(path.to_string(), val);
            Ok(())
        }
        Some((key, rest)) => {
            let entry = table
                .entry(key.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            let subtable = entry
                .as_table_mut()
                .ok_or_else(|| ConfigError::TraverseNonTableAt {
                    key: key.to_string(),
                    path: path.to_string(),
                })?;
            apply_override(rest, val, subtable)
        }
    }
}

/// Bitcoin client initialization
pub(crate) fn create_bitcoin_rpc_client(
    config: &BitcoindConfig,
) -> Result<Arc<Client>, InitError> {
    let auth = Auth::UserPass(config.rpc_user.clone(), config.rpc_password.clone());
    let btc_rpc = Client::new(
        config.rpc_url.clone(),
        auth,
        config.retry_count,
        config.retry_interval,
        None,
    )
    .map_err(|e| InitError::BitcoinClientCreation(e.to_string()))?;

    Ok(btc_rpc.into())
}
