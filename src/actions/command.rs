//! Encoding of GitHub Actions workflow commands and file commands.

const DELIMITER_PREFIX: &str = "ghadelimiter_";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected input: name should not contain the delimiter {0}")]
    DelimiterInName(String),
    #[error("Unexpected input: value should not contain the delimiter {0}")]
    DelimiterInValue(String),
}

/// Escapes the message part of a workflow command.
pub fn escape_data(data: &str) -> String {
    data.replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escapes a property value of a workflow command.
pub fn escape_property(property: &str) -> String {
    escape_data(property)
        .replace(':', "%3A")
        .replace(',', "%2C")
}

/// Renders `::name key=value,...::message`.
pub fn issue_command(name: &str, properties: &[(&str, &str)], message: &str) -> String {
    let properties = properties
        .iter()
        .map(|(key, value)| format!("{key}={}", escape_property(value)))
        .collect::<Vec<_>>()
        .join(",");
    if properties.is_empty() {
        format!("::{name}::{}", escape_data(message))
    } else {
        format!("::{name} {properties}::{}", escape_data(message))
    }
}

/// Renders a `key<<delimiter` block for the `$GITHUB_ENV` and `$GITHUB_OUTPUT` files.
pub fn file_command_message(key: &str, value: &str) -> Result<String, Error> {
    let delimiter = format!("{DELIMITER_PREFIX}{:032x}", rand::random::<u128>());
    file_command_message_with_delimiter(key, value, &delimiter)
}

fn file_command_message_with_delimiter(
    key: &str,
    value: &str,
    delimiter: &str,
) -> Result<String, Error> {
    if key.contains(delimiter) {
        return Err(Error::DelimiterInName(delimiter.to_string()));
    }
    if value.contains(delimiter) {
        return Err(Error::DelimiterInValue(delimiter.to_string()));
    }
    Ok(format!("{key}<<{delimiter}\n{value}\n{delimiter}\n"))
}
