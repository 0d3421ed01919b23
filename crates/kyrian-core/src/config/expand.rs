use std::path::Path;

use crate::error::{KyrianError, Result};

/// Expand `${VAR}` and `${VAR:-default}` placeholders in raw config text.
pub(super) fn expand_env_placeholders(input: &str, path: &Path) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(expand_error(path, input, rest, start, "unterminated placeholder"));
        };
        let token = &after[..end];
        match lookup(token) {
            Ok(value) => out.push_str(&value),
            Err(message) => return Err(expand_error(path, input, rest, start, &message)),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

fn lookup(token: &str) -> std::result::Result<String, String> {
    let (name, default) = match token.split_once(":-") {
        Some((name, default)) => (name, Some(default)),
        None => (token, None),
    };
    if !is_valid_env_var_name(name) {
        return Err(format!("invalid environment variable name '{name}'"));
    }

    match (std::env::var(name), default) {
        (Ok(value), Some(default)) if value.is_empty() => Ok(default.to_string()),
        (Ok(value), _) => Ok(value),
        (Err(std::env::VarError::NotPresent), Some(default)) => Ok(default.to_string()),
        (Err(std::env::VarError::NotPresent), None) => {
            Err(format!("environment variable '{name}' is not set"))
        }
        (Err(std::env::VarError::NotUnicode(_)), _) => {
            Err(format!("environment variable '{name}' is not valid UTF-8"))
        }
    }
}

fn is_valid_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first == '_' || first.is_ascii_alphabetic()) && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn expand_error(path: &Path, input: &str, rest: &str, start: usize, message: &str) -> KyrianError {
    let offset = input.len() - rest.len() + start;
    let line = input[..offset].matches('\n').count() + 1;
    KyrianError::Config(format!(
        "invalid config '{}': {message} at line {line}",
        path.display()
    ))
}
