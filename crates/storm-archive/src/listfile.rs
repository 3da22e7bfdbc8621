//! Internal file names and `(listfile)` parsing

use storm_crypto::normalize_char;

/// Name listing stored inside most archives
pub const LISTFILE_NAME: &str = "(listfile)";

/// Per-file attributes (CRC32, timestamps, MD5)
pub const ATTRIBUTES_NAME: &str = "(attributes)";

/// Weak digital signature
pub const SIGNATURE_NAME: &str = "(signature)";

/// Internal files reported by listings when present
pub const INTERNAL_FILES: [&str; 3] = [LISTFILE_NAME, ATTRIBUTES_NAME, SIGNATURE_NAME];

/// Split a `(listfile)` body into names
///
/// Entries are separated by `;`, CR or LF. Surrounding whitespace is trimmed
/// and empty entries are dropped. Invalid UTF-8 is replaced.
pub fn parse_listfile(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .split([';', '\r', '\n'])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Last path component, splitting on either separator
pub fn basename(name: &str) -> &str {
    name.rsplit(['\\', '/']).next().unwrap_or(name)
}

/// Key under which the archive considers two names equal
pub fn normalized_key(name: &str) -> Vec<u8> {
    name.bytes().map(normalize_char).collect()
}

/// Name reported for a stored file that no listfile entry names
pub fn pseudo_name(block_index: u32) -> String {
    format!("File{block_index:08}.xxx")
}

/// Block index encoded in a name produced by [`pseudo_name`]
pub fn parse_pseudo_name(name: &str) -> Option<u32> {
    let bytes = name.as_bytes();
    if bytes.len() < 16
        || !bytes[..4].eq_ignore_ascii_case(b"File")
        || !bytes[bytes.len() - 4..].eq_ignore_ascii_case(b".xxx")
    {
        return None;
    }
    let digits = &name[4..name.len() - 4];
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
