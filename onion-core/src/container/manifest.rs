//! Text form of the per-layer password record.
//!
//! ```text
//! --- layer password manifest ---
//! Layer 1 (3f2a_layer_1.zip): Ab3dEf9hIj2K
//! Layer 2 (3f2a_layer_2.7z): (master password layer)
//! Layer 3 (3f2a_layer_3.tar.zst): (no password)
//! ```
//!
//! End users paste this back in for decompression, often with extra text
//! around it, so parsing is line-oriented and skips any line that does not
//! match the entry grammar:
//!
//! ```text
//! line     := <any> "Layer" SP+ DIGIT+ SP+ "(" filename "):" WS* password
//! filename := shortest text before the first "):"
//! ```
//!
//! The layer number is syntax only; entries are numbered by position.

use crate::domain::{ManifestEntry, PasswordToken};

pub const HEADER: &str = "--- layer password manifest ---";
pub const NO_PASSWORD: &str = "(no password)";
pub const MASTER_PASSWORD: &str = "(master password layer)";

const KEYWORD: &str = "Layer";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Creation order: outermost layer last.
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(HEADER.len() + 1 + self.entries.len() * 48);
        out.push_str(HEADER);
        out.push('\n');
        for e in &self.entries {
            let pw = match &e.password {
                PasswordToken::None => NO_PASSWORD,
                PasswordToken::Master => MASTER_PASSWORD,
                PasswordToken::Explicit(p) => p.as_str(),
            };
            out.push_str(&format!("{KEYWORD} {} ({}): {pw}\n", e.index, e.archive_filename));
        }
        out
    }

    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter_map(parse_line)
            .enumerate()
            .map(|(i, (archive_filename, password))| ManifestEntry {
                index: i as u32 + 1,
                archive_filename,
                password,
            })
            .collect();
        Self { entries }
    }
}

fn parse_line(line: &str) -> Option<(String, PasswordToken)> {
    let mut from = 0;
    while let Some(pos) = line[from..].find(KEYWORD) {
        let after = from + pos + KEYWORD.len();
        if let Some(hit) = parse_entry(&line[after..]) {
            return Some(hit);
        }
        from = after;
    }
    None
}

fn parse_entry(rest: &str) -> Option<(String, PasswordToken)> {
    let rest = skip_spaces(rest)?;
    let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits == 0 {
        return None;
    }
    let rest = skip_spaces(&rest[digits..])?;
    let rest = rest.strip_prefix('(')?;
    let close = rest.find("):")?;
    let filename = rest[..close].trim().to_string();
    let password = match rest[close + 2..].trim() {
        "" | NO_PASSWORD => PasswordToken::None,
        MASTER_PASSWORD => PasswordToken::Master,
        other => PasswordToken::Explicit(other.to_string()),
    };
    Some((filename, password))
}

/// At least one space is required.
fn skip_spaces(s: &str) -> Option<&str> {
    let trimmed = s.trim_start_matches(' ');
    (trimmed.len() < s.len()).then_some(trimmed)
}
