// AeroBridge Config Store
// Encrypted INI document holding per-remote connection settings
//
// The document lives in memory only. It is opened once per connection from an
// encrypted blob and rendered back to text on demand; nothing here touches disk.

use std::sync::{Mutex, MutexGuard};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use secrecy::zeroize::Zeroizing;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::crypto::{self, KdfParams, NONCE_SIZE, SALT_SIZE};

/// First meaningful line of an encrypted blob
pub const ENCRYPTION_MARKER: &str = "AEROBRIDGE_ENCRYPT_V1:";
const BLOB_BANNER: &str = "# Encrypted aerobridge configuration file";

/// Section receiving keys that appear before any `[section]` header
pub const DEFAULT_SECTION: &str = "DEFAULT";

const EPHEMERAL_PREFIX: char = ':';

// kdf params (3 x u32) + salt + nonce
const CONTAINER_HEADER_LEN: usize = 12 + SALT_SIZE + NONCE_SIZE;
const GCM_TAG_LEN: usize = 16;
// Ceilings for Argon2 costs read from a blob header; mem_cost is in KiB (256 MiB)
const MAX_KDF_MEM_COST: u32 = 256 * 1024;
const MAX_KDF_TIME_COST: u32 = 16;
const MAX_KDF_PARALLELISM: u32 = 16;

// ============ Error Types ============

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config password")]
    InvalidPassword,
    #[error("Config is encrypted - password required")]
    PasswordRequired,
    #[error("Malformed encrypted config: {0}")]
    Format(String),
    #[error("Config parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Encryption error: {0}")]
    Encryption(String),
}

/// Sections whose name starts with `:` describe on-the-fly remotes built from a
/// connection string. They are never written to the serialized document.
pub fn is_ephemeral_section(name: &str) -> bool {
    name.starts_with(EPHEMERAL_PREFIX)
}

// ============ Document Model ============

#[derive(Debug, Clone, Default, PartialEq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Section {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn set(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Document {
    sections: Vec<Section>,
}

impl Document {
    fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn section_or_insert(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }

    fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut doc = Document::default();
        let mut current: Option<String> = None;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .ok_or_else(|| ConfigError::Parse {
                        line: idx + 1,
                        message: "unterminated section header".to_string(),
                    })?;
                if name.is_empty() {
                    return Err(ConfigError::Parse {
                        line: idx + 1,
                        message: "empty section name".to_string(),
                    });
                }
                doc.section_or_insert(name);
                current = Some(name.to_string());
                continue;
            }

            let Some(pos) = line.find(['=', ':']) else {
                return Err(ConfigError::Parse {
                    line: idx + 1,
                    message: format!("expected `key = value`, got {:?}", line),
                });
            };
            let key = line[..pos].trim();
            if key.is_empty() {
                return Err(ConfigError::Parse {
                    line: idx + 1,
                    message: "empty key".to_string(),
                });
            }
            let value = unquote(line[pos + 1..].trim());
            let section = current.as_deref().unwrap_or(DEFAULT_SECTION);
            doc.section_or_insert(section).set(key, &value);
        }

        Ok(doc)
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for section in self.sections.iter().filter(|s| !is_ephemeral_section(&s.name)) {
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in &section.entries {
                out.push_str(key);
                out.push_str(" = ");
                if needs_quotes(value) {
                    out.push_str(&quote(value));
                } else {
                    out.push_str(value);
                }
                out.push('\n');
            }
            out.push('\n');
        }
        out
    }
}

fn valid_section_name(name: &str) -> bool {
    !name.is_empty() && name == name.trim() && !name.contains([']', '\n', '\r'])
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key == key.trim()
        && !key.contains(['=', ':', '\n', '\r'])
        && !key.starts_with(['[', '#', ';'])
}

/// Values that would not survive a plain `key = value` line unchanged
fn needs_quotes(value: &str) -> bool {
    value != value.trim()
        || value.contains(['\n', '\r'])
        || value.starts_with(['"', '\''])
        || value.ends_with(['"', '\''])
}

fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Strip surrounding quotes. Double-quoted values understand `\\`, `\"`,
/// `\n` and `\r`; any other backslash is kept as written.
fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(c @ ('\\' | '"')) => out.push(c),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Reject header costs above the local ceilings before running Argon2
fn check_kdf_limits(kdf: &KdfParams) -> Result<(), ConfigError> {
    if kdf.mem_cost > MAX_KDF_MEM_COST {
        return Err(ConfigError::Format(format!(
            "key derivation memory cost {} KiB exceeds {} KiB",
            kdf.mem_cost, MAX_KDF_MEM_COST
        )));
    }
    if kdf.time_cost > MAX_KDF_TIME_COST {
        return Err(ConfigError::Format(format!(
            "key derivation time cost {} exceeds {}",
            kdf.time_cost, MAX_KDF_TIME_COST
        )));
    }
    if kdf.parallelism > MAX_KDF_PARALLELISM {
        return Err(ConfigError::Format(format!(
            "key derivation parallelism {} exceeds {}",
            kdf.parallelism, MAX_KDF_PARALLELISM
        )));
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

// ============ Blob Container ============

/// Open a config blob. Blobs without the encryption marker are plain INI text.
fn open_blob(blob: &str, password: &SecretString) -> Result<Zeroizing<String>, ConfigError> {
    let mut lines = blob
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    if lines.next() != Some(ENCRYPTION_MARKER) {
        return Ok(Zeroizing::new(blob.to_string()));
    }

    let password = password.expose_secret();
    if password.is_empty() {
        return Err(ConfigError::PasswordRequired);
    }

    let body: String = lines.collect();
    let raw = BASE64
        .decode(body.as_bytes())
        .map_err(|e| ConfigError::Format(format!("base64: {}", e)))?;
    if raw.len() < CONTAINER_HEADER_LEN + GCM_TAG_LEN {
        return Err(ConfigError::Format("truncated container".to_string()));
    }

    let kdf = KdfParams {
        mem_cost: read_u32(&raw, 0),
        time_cost: read_u32(&raw, 4),
        parallelism: read_u32(&raw, 8),
    };
    check_kdf_limits(&kdf)?;

    let salt = &raw[12..12 + SALT_SIZE];
    let nonce = &raw[12 + SALT_SIZE..CONTAINER_HEADER_LEN];
    let ciphertext = &raw[CONTAINER_HEADER_LEN..];

    let key = crypto::derive_key(password, salt, &kdf).map_err(ConfigError::Encryption)?;
    let plaintext = Zeroizing::new(
        crypto::decrypt_aes_gcm(&key, nonce, ciphertext).map_err(|_| ConfigError::InvalidPassword)?,
    );

    let text = std::str::from_utf8(&plaintext)
        .map_err(|_| ConfigError::Format("config is not valid UTF-8".to_string()))?;
    Ok(Zeroizing::new(text.to_string()))
}

fn seal_blob(plaintext: &str, password: &SecretString, kdf: &KdfParams) -> Result<String, ConfigError> {
    let password = password.expose_secret();
    if password.is_empty() {
        return Err(ConfigError::PasswordRequired);
    }

    check_kdf_limits(kdf)?;

    let salt = crypto::random_bytes(SALT_SIZE);
    let nonce = crypto::random_bytes(NONCE_SIZE);
    let key = crypto::derive_key(password, &salt, kdf).map_err(ConfigError::Encryption)?;
    let ciphertext =
        crypto::encrypt_aes_gcm(&key, &nonce, plaintext.as_bytes()).map_err(ConfigError::Encryption)?;

    let mut raw = Vec::with_capacity(CONTAINER_HEADER_LEN + ciphertext.len());
    raw.extend_from_slice(&kdf.mem_cost.to_le_bytes());
    raw.extend_from_slice(&kdf.time_cost.to_le_bytes());
    raw.extend_from_slice(&kdf.parallelism.to_le_bytes());
    raw.extend_from_slice(&salt);
    raw.extend_from_slice(&nonce);
    raw.extend_from_slice(&ciphertext);

    Ok(format!(
        "{}\n\n{}\n{}\n",
        BLOB_BANNER,
        ENCRYPTION_MARKER,
        BASE64.encode(&raw)
    ))
}

// ============ Config Store ============

/// In-memory configuration document guarded by a single lock.
///
/// Every accessor takes the same exclusive lock; the store is read at
/// connection setup and rarely afterwards, so there is no reader/writer split.
#[derive(Debug, Default)]
pub struct ConfigStore {
    doc: Mutex<Document>,
}

impl ConfigStore {
    /// Open `blob` with `password`.
    ///
    /// Always returns a usable store: on failure it is the empty default
    /// document and the second element carries the reason. The password is
    /// only borrowed for the duration of the call and every derived key is
    /// wiped before returning.
    pub fn load(blob: &str, password: &SecretString) -> (Self, Result<(), ConfigError>) {
        match open_blob(blob, password).and_then(|plain| Document::parse(&plain)) {
            Ok(doc) => {
                debug!("Config loaded: {} section(s)", doc.sections.len());
                (Self { doc: Mutex::new(doc) }, Ok(()))
            }
            Err(e) => {
                warn!("Config load failed, continuing with an empty config: {}", e);
                (Self::default(), Err(e))
            }
        }
    }

    fn doc(&self) -> MutexGuard<'_, Document> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Render the persistent sections as plain INI text
    pub fn serialize(&self) -> String {
        self.doc().render()
    }

    /// Render the persistent sections sealed with `password`
    pub fn serialize_encrypted(&self, password: &SecretString) -> Result<String, ConfigError> {
        self.serialize_encrypted_with(password, &KdfParams::default())
    }

    /// Like [`serialize_encrypted`](Self::serialize_encrypted) with explicit Argon2 costs
    pub fn serialize_encrypted_with(
        &self,
        password: &SecretString,
        kdf: &KdfParams,
    ) -> Result<String, ConfigError> {
        let plain = Zeroizing::new(self.serialize());
        seal_blob(&plain, password, kdf)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.doc().section(section).is_some()
    }

    pub fn section_list(&self) -> Vec<String> {
        self.doc().sections.iter().map(|s| s.name.clone()).collect()
    }

    /// Keys of `section` in document order; empty if the section is absent
    pub fn key_list(&self, section: &str) -> Vec<String> {
        self.doc()
            .section(section)
            .map(|s| s.entries.iter().map(|(k, _)| k.clone()).collect())
            .unwrap_or_default()
    }

    /// All key/value pairs of `section`, read under one lock
    pub fn section_entries(&self, section: &str) -> Option<Vec<(String, String)>> {
        self.doc().section(section).map(|s| s.entries.clone())
    }

    pub fn get_value(&self, section: &str, key: &str) -> Option<String> {
        self.doc()
            .section(section)
            .and_then(|s| s.get(key))
            .map(str::to_string)
    }

    /// Set `key` in `section`, creating the section if needed.
    ///
    /// Writes to on-the-fly sections are dropped with a warning; they are not
    /// an error for the caller. So are section names and keys that cannot be
    /// written back as a single INI line.
    pub fn set_value(&self, section: &str, key: &str, value: &str) {
        if is_ephemeral_section(section) {
            warn!("Can't save config {:?} for on the fly backend {:?}", key, section);
            return;
        }
        if !valid_section_name(section) {
            warn!("Ignoring config write to invalid section name {:?}", section);
            return;
        }
        if !valid_key(key) {
            warn!("Ignoring config write with invalid key {:?} in section {:?}", key, section);
            return;
        }
        self.doc().section_or_insert(section).set(key, value);
    }

    pub fn delete_section(&self, section: &str) {
        self.doc().sections.retain(|s| s.name != section);
    }

    /// Remove `key` from `section`; true if it was present
    pub fn delete_key(&self, section: &str, key: &str) -> bool {
        let mut doc = self.doc();
        let Some(section) = doc.sections.iter_mut().find(|s| s.name == section) else {
            return false;
        };
        let before = section.entries.len();
        section.entries.retain(|(k, _)| k != key);
        section.entries.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const SAMPLE: &str = "\
# remotes
[work]
type = local
root = /srv/data

[archive]
type: memory
label = \"cold storage\"
";

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn plain_store(text: &str) -> ConfigStore {
        let (store, result) = ConfigStore::load(text, &secret(""));
        result.unwrap();
        store
    }

    #[test]
    fn test_plain_config_parses() {
        let store = plain_store(SAMPLE);
        assert_eq!(store.section_list(), vec!["work", "archive"]);
        assert_eq!(store.key_list("work"), vec!["type", "root"]);
        assert_eq!(store.get_value("archive", "type").as_deref(), Some("memory"));
        assert_eq!(store.get_value("archive", "label").as_deref(), Some("cold storage"));
        assert_eq!(store.get_value("archive", "missing"), None);
        assert!(store.has_section("work"));
        assert!(!store.has_section("nope"));
        assert!(store.key_list("nope").is_empty());
    }

    #[test]
    fn test_keys_before_header_go_to_default() {
        let store = plain_store("verbose = 1\n[a]\nx = y\n");
        assert_eq!(store.get_value(DEFAULT_SECTION, "verbose").as_deref(), Some("1"));
    }

    #[test]
    fn test_duplicate_sections_merge() {
        let store = plain_store("[a]\nx = 1\n[b]\n[a]\ny = 2\nx = 3\n");
        assert_eq!(store.section_list(), vec!["a", "b"]);
        assert_eq!(store.key_list("a"), vec!["x", "y"]);
        assert_eq!(store.get_value("a", "x").as_deref(), Some("3"));
    }

    #[test]
    fn test_parse_error_reports_line() {
        let (store, result) = ConfigStore::load("[a]\nx = 1\nbogus line\n", &secret(""));
        match result {
            Err(ConfigError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }
        assert!(store.section_list().is_empty());
    }

    #[test]
    fn test_serialize_reflects_mutations() {
        let store = plain_store(SAMPLE);
        store.set_value("work", "root", "/mnt/other");
        store.set_value("fresh", "type", "memory");
        assert!(store.delete_key("archive", "label"));
        assert!(!store.delete_key("archive", "label"));
        assert!(!store.delete_key("ghost", "label"));

        let text = store.serialize();
        assert_eq!(
            text,
            "[work]\ntype = local\nroot = /mnt/other\n\n[archive]\ntype = memory\n\n[fresh]\ntype = memory\n\n"
        );

        let reloaded = plain_store(&text);
        assert_eq!(reloaded.section_list(), store.section_list());

        store.delete_section("work");
        assert!(!store.serialize().contains("[work]"));
    }

    #[test]
    fn test_ephemeral_sections_never_serialized() {
        let store = plain_store(SAMPLE);
        for i in 0..5 {
            store.set_value(":s3", "token", &format!("t{}", i));
            assert!(!store.serialize().contains(":s3"));
            assert!(!store.serialize().contains("token"));
        }
        assert!(!store.has_section(":s3"));

        // a blob that already carries one is still not written back
        let loaded = plain_store("[:local]\nroot = /tmp\n[keep]\ntype = local\n");
        assert!(loaded.has_section(":local"));
        assert_eq!(loaded.serialize(), "[keep]\ntype = local\n\n");
    }

    #[test]
    fn test_is_ephemeral_section() {
        assert!(is_ephemeral_section(":memory"));
        assert!(!is_ephemeral_section("memory"));
        assert!(!is_ephemeral_section("my:remote"));
    }

    #[test]
    fn test_encrypted_round_trip() {
        let store = plain_store(SAMPLE);
        let blob = store
            .serialize_encrypted_with(&secret("correct horse"), &KdfParams::interactive_min())
            .unwrap();
        assert!(blob.contains(ENCRYPTION_MARKER));
        assert!(!blob.contains("/srv/data"));

        let (reopened, result) = ConfigStore::load(&blob, &secret("correct horse"));
        result.unwrap();
        assert_eq!(reopened.serialize(), store.serialize());
    }

    #[test]
    fn test_wrong_password_yields_empty_store() {
        let store = plain_store(SAMPLE);
        let blob = store
            .serialize_encrypted_with(&secret("right"), &KdfParams::interactive_min())
            .unwrap();

        let (reopened, result) = ConfigStore::load(&blob, &secret("wrong"));
        assert!(matches!(result, Err(ConfigError::InvalidPassword)));
        assert!(reopened.section_list().is_empty());
        assert_eq!(reopened.serialize(), "");

        // still a working store
        reopened.set_value("after", "k", "v");
        assert_eq!(reopened.get_value("after", "k").as_deref(), Some("v"));
    }

    #[test]
    fn test_encrypted_blob_requires_password() {
        let blob = plain_store(SAMPLE)
            .serialize_encrypted_with(&secret("pw"), &KdfParams::interactive_min())
            .unwrap();
        let (_, result) = ConfigStore::load(&blob, &secret(""));
        assert!(matches!(result, Err(ConfigError::PasswordRequired)));
    }

    #[test]
    fn test_truncated_blob_is_format_error() {
        let blob = format!("{}\nAAAA\n", ENCRYPTION_MARKER);
        let (store, result) = ConfigStore::load(&blob, &secret("pw"));
        assert!(matches!(result, Err(ConfigError::Format(_))));
        assert!(store.section_list().is_empty());
    }

    #[test]
    fn test_values_round_trip_through_serialize() {
        let store = plain_store("[work]\ntype = local\n");
        let values = [
            "line1\n[evil]\ntype = local",
            "  padded  ",
            "\"quoted\"",
            "'single'",
            "ends with quote\"",
            "C:\\Users\\me",
            "back\\slash \"and\" quote\r\n",
            "a = b : c",
            "",
        ];
        for (i, value) in values.iter().enumerate() {
            store.set_value("work", &format!("v{}", i), value);
        }

        let reloaded = plain_store(&store.serialize());
        assert_eq!(reloaded.section_list(), vec!["work"]);
        for (i, value) in values.iter().enumerate() {
            assert_eq!(reloaded.get_value("work", &format!("v{}", i)).as_deref(), Some(*value));
        }
        assert_eq!(reloaded.serialize(), store.serialize());
    }

    #[test]
    fn test_value_cannot_inject_sections() {
        let store = plain_store("[work]\ntype = local\n");
        store.set_value("work", "token", "x\n[:memory]\ntype = memory\n[other]\nroot = /");

        let text = store.serialize();
        assert_eq!(text.lines().filter(|l| l.starts_with('[')).count(), 1);

        let reloaded = plain_store(&text);
        assert_eq!(reloaded.section_list(), vec!["work"]);
        assert_eq!(reloaded.key_list("work"), vec!["type", "token"]);
    }

    #[test]
    fn test_unwritable_keys_and_sections_are_dropped() {
        let store = plain_store("[work]\ntype = local\n");
        for key in ["a=b", "a:b", "two\nlines", "[x]", "#note", ";note", " padded", ""] {
            store.set_value("work", key, "v");
        }
        for section in ["a]b", "multi\nline", " padded", ""] {
            store.set_value(section, "k", "v");
        }

        assert_eq!(store.key_list("work"), vec!["type"]);
        assert_eq!(store.section_list(), vec!["work"]);
        assert_eq!(store.serialize(), "[work]\ntype = local\n\n");
    }

    #[test]
    fn test_hand_written_quotes_still_read() {
        let store = plain_store("[a]\npath = \"C:\\temp\\data\"\nname = 'x y'\n");
        assert_eq!(store.get_value("a", "path").as_deref(), Some("C:\\temp\\data"));
        assert_eq!(store.get_value("a", "name").as_deref(), Some("x y"));
    }

    fn crafted_blob(mem_cost: u32, time_cost: u32, parallelism: u32) -> String {
        let mut raw = Vec::new();
        raw.extend_from_slice(&mem_cost.to_le_bytes());
        raw.extend_from_slice(&time_cost.to_le_bytes());
        raw.extend_from_slice(&parallelism.to_le_bytes());
        raw.extend_from_slice(&[0u8; SALT_SIZE + NONCE_SIZE + GCM_TAG_LEN]);
        format!("{}\n{}\n", ENCRYPTION_MARKER, BASE64.encode(&raw))
    }

    #[test]
    fn test_excessive_kdf_costs_rejected() {
        for blob in [
            crafted_blob(8, u32::MAX, 1),
            crafted_blob(MAX_KDF_MEM_COST + 1, 1, 1),
            crafted_blob(4 * 1024 * 1024, 1, 1),
            crafted_blob(64, 1, MAX_KDF_PARALLELISM + 1),
        ] {
            let started = std::time::Instant::now();
            let (store, result) = ConfigStore::load(&blob, &secret("pw"));
            assert!(matches!(result, Err(ConfigError::Format(_))), "{:?}", result);
            assert!(store.section_list().is_empty());
            assert!(started.elapsed() < std::time::Duration::from_secs(1));
        }

        // within limits it gets as far as the authentication check
        let (_, result) = ConfigStore::load(&crafted_blob(8, 1, 1), &secret("pw"));
        assert!(matches!(result, Err(ConfigError::InvalidPassword)));
    }

    #[test]
    fn test_seal_refuses_costs_it_could_not_reopen() {
        let store = plain_store(SAMPLE);
        let kdf = KdfParams {
            mem_cost: 64,
            time_cost: MAX_KDF_TIME_COST + 1,
            parallelism: 1,
        };
        assert!(matches!(
            store.serialize_encrypted_with(&secret("pw"), &kdf),
            Err(ConfigError::Format(_))
        ));
    }

    #[test]
    fn test_concurrent_writers() {
        let store = Arc::new(ConfigStore::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        store.set_value(&format!("s{}", i), &format!("k{}", j), "v");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.section_list().len(), 8);
        assert!(store.section_list().iter().all(|s| store.key_list(s).len() == 50));
    }
}
