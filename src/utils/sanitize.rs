use aws_sdk_sts::config::Credentials;
use regex::Regex;
use std::sync::LazyLock;

/// Maximum length STS accepts for a session tag value.
pub const MAX_TAG_VALUE_LENGTH: usize = 256;
const SANITIZATION_CHARACTER: &str = "_";

static TAG_VALUE_DISALLOWED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^\p{L}\p{M}\p{Z}\p{N}_.:/=+\-@]").expect("Const regex should be valid")
});

// Characters some shell consumers choke on when they appear in a key pair.
const SPECIAL_CHARACTERS: &[char] = &[
    '!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+', '-', '=', '[', ']', '{', '}', ';',
    '\'', '"', '\\', '|', ',', '.', '<', '>', '/', '?',
];

/// Turns a freeform CI string into a value STS accepts as a session tag.
///
/// Every character outside the letter, mark, separator and number classes
/// (plus `_ . : / = + - @`) is replaced by `_`, and the result is cut to
/// [`MAX_TAG_VALUE_LENGTH`] characters.
pub fn sanitize_tag_value(raw: &str) -> String {
    TAG_VALUE_DISALLOWED
        .replace_all(raw, SANITIZATION_CHARACTER)
        .chars()
        .take(MAX_TAG_VALUE_LENGTH)
        .collect()
}

/// Whether the access key id or secret access key contains a shell special character.
///
/// A pair missing either half is never flagged.
pub fn has_disallowed_characters(credentials: &Credentials) -> bool {
    let access_key_id = credentials.access_key_id();
    let secret_access_key = credentials.secret_access_key();
    if access_key_id.is_empty() || secret_access_key.is_empty() {
        return false;
    }
    access_key_id.contains(SPECIAL_CHARACTERS) || secret_access_key.contains(SPECIAL_CHARACTERS)
}
