//! 8.3 short name synthesis.
//!
//! A long name is used verbatim (upper-cased) when it already is a valid,
//! unoccupied 8.3 name. Otherwise a `BASE~N.EXT` form is synthesized, with
//! `N` chosen so no two synthesized siblings collide.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{DosError, DosResult};

/// Longest short name, `NNNNNNNN.EEE`.
pub const MAX_SHORT_NAME_LEN: usize = 12;

/// Largest `~N` suffix handed out.
pub const MAX_SUFFIX: u32 = 9999;

const SPECIAL_CHARS: &str = "$#@!%'`(){}~^-_&";

const HASH_CHARS: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ012345";

/// Valid character in an (upper-cased) 8.3 name component.
pub fn is_short_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || SPECIAL_CHARS.contains(c)
}

/// An entry of a directory's synthesis-order view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticName {
    pub short_name: String,
    pub suffix: u32,
}

/// Outcome of [`synthesize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortName {
    pub name: String,
    /// `~N` number, 0 when the long name was used as is.
    pub suffix: u32,
}

impl ShortName {
    fn literal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suffix: 0,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        self.suffix > 0
    }
}

/// Compare a candidate name against an existing short name.
///
/// When `short` carries a `~N` tail only the characters in front of it take
/// part, widened to the candidate's base length (max 8) minus the width of
/// the tail. `MYFILE~3.TXT` therefore compares equal to `MYFILENAME.DOC`.
pub fn compare_short_name(candidate: &str, short: &str) -> Ordering {
    let Some(tilde) = short.find('~') else {
        return candidate.cmp(short);
    };
    let number_size = short[tilde..].find('.').unwrap_or(short.len() - tilde);
    let candidate_base = candidate.find('.').unwrap_or(candidate.len()).min(8);

    let mut count = tilde;
    if candidate_base > tilde + number_size {
        count = candidate_base - number_size;
    }
    let a = &candidate.as_bytes()[..count.min(candidate.len())];
    let b = &short.as_bytes()[..count.min(short.len())];
    a.cmp(b)
}

/// Drop a trailing `.` from a name without extension. `.` and `..` stay.
pub fn remove_trailing_dot(name: &str) -> &str {
    match name.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() && stripped != "." => stripped,
        _ => name,
    }
}

/// Upper-case, strip spaces and replace invalid characters.
/// Returns the cleaned name and whether anything forced synthesis.
fn normalize(long_name: &str) -> (String, bool) {
    let mut force = false;
    let mut name = String::with_capacity(long_name.len());
    for c in long_name.chars() {
        match c {
            ' ' => force = true,
            '.' => name.push('.'),
            c => {
                let upper = c.to_ascii_uppercase();
                if is_short_name_char(upper) {
                    name.push(upper);
                } else {
                    name.push('_');
                    force = true;
                }
            }
        }
    }

    // A leading run of dots only counts as an extension separator when
    // what follows could be an extension.
    if let Some(pos) = name.find('.') {
        if name.len() - pos > 4 {
            name = name.trim_start_matches('.').to_string();
            force = true;
        }
    }
    if name.matches('.').count() > 1 {
        force = true;
    }
    (name, force)
}

/// Pick a short name for `long_name`.
///
/// `synthesized` is the directory's synthesis-order view (sorted by short
/// name). `occupied` reports whether a short name is already taken by a
/// sibling.
pub fn synthesize<F>(long_name: &str, synthesized: &[SyntheticName], occupied: F) -> DosResult<ShortName>
where
    F: Fn(&str) -> bool,
{
    if long_name == "." || long_name == ".." {
        return Ok(ShortName::literal(long_name));
    }

    let (name, mut force) = normalize(long_name);
    let first_dot = name.find('.');
    let base_len = first_dot.unwrap_or(name.len());
    force |= base_len > 8;

    if !force {
        let literal = remove_trailing_dot(&name);
        if !occupied(literal) {
            return Ok(ShortName::literal(literal));
        }
    }

    let mut suffix = next_suffix(&name, synthesized);
    loop {
        if suffix > MAX_SUFFIX {
            return Err(DosError::Exhausted(format!(
                "no free short name suffix for {}",
                long_name
            )));
        }
        let candidate = with_suffix(&name, base_len, first_dot.is_some(), suffix);
        if !occupied(&candidate) {
            return Ok(ShortName {
                name: candidate,
                suffix,
            });
        }
        suffix += 1;
    }
}

/// 1 + the largest suffix among synthesized names matching `name`.
fn next_suffix(name: &str, synthesized: &[SyntheticName]) -> u32 {
    let found = synthesized.binary_search_by(|e| compare_short_name(name, &e.short_name).reverse());
    let Ok(hit) = found else {
        return 1;
    };
    let same = |e: &SyntheticName| compare_short_name(name, &e.short_name) == Ordering::Equal;

    let mut first = hit;
    while first > 0 && same(&synthesized[first - 1]) {
        first -= 1;
    }
    synthesized[first..]
        .iter()
        .take_while(|e| same(e))
        .map(|e| e.suffix)
        .max()
        .unwrap_or(0)
        + 1
}

fn with_suffix(name: &str, base_len: usize, has_ext: bool, suffix: u32) -> String {
    let digits = suffix.to_string();
    let copy = if base_len + digits.len() + 1 > 8 {
        8 - digits.len() - 1
    } else {
        base_len
    };

    let mut short = String::with_capacity(MAX_SHORT_NAME_LEN);
    short.push_str(&name[..copy.min(name.len())]);
    short.push('~');
    short.push_str(&digits);
    if has_ext {
        if let Some(last_dot) = name.rfind('.') {
            let ext = &name[last_dot..];
            short.push_str(&ext[..ext.len().min(4)]);
        }
    }
    short.truncate(MAX_SHORT_NAME_LEN);
    remove_trailing_dot(&short).to_string()
}

/// Hashed 8.3 form other software derives independently: up to four base
/// characters, `~`, a three character hash and up to three extension
/// characters.
pub fn hashed_short_name(long_name: &str) -> String {
    let chars: Vec<char> = long_name.chars().collect();
    let lower = |c: char| c.to_lowercase().next().unwrap_or(c) as u32 as u16;

    let mut hash: u16 = 0xBEEF;
    if let Some((&last, rest)) = chars.split_last() {
        for (i, &c) in rest.iter().enumerate() {
            hash = (hash << 3) ^ (hash >> 5) ^ lower(c) ^ (lower(chars[i + 1]) << 8);
        }
        hash = (hash << 3) ^ (hash >> 5) ^ lower(last);
    }

    // Last dot, ignoring a leading one and one in final position.
    let ext = (1..chars.len().saturating_sub(1))
        .rev()
        .find(|&i| chars[i] == '.');

    let dos_char = |c: char| {
        let upper = c.to_ascii_uppercase();
        if is_short_name_char(upper) && upper != '~' {
            upper
        } else {
            '_'
        }
    };

    let mut short = String::with_capacity(MAX_SHORT_NAME_LEN);
    let base_end = ext.unwrap_or(chars.len()).min(4);
    short.extend(chars[..base_end].iter().map(|&c| dos_char(c)));
    while short.len() < 5 {
        short.push('~');
    }
    for shift in [10, 5, 0] {
        short.push(HASH_CHARS[usize::from((hash >> shift) & 0x1f)] as char);
    }
    if let Some(dot) = ext {
        short.push('.');
        short.extend(chars[dot + 1..].iter().take(3).map(|&c| dos_char(c)));
    }
    short
}

/// True if `name` is a well-formed 8.3 name.
pub fn is_valid_short_name(name: &str) -> bool {
    if name == "." || name == ".." {
        return true;
    }
    let (base, ext) = match name.split_once('.') {
        Some((base, ext)) => (base, Some(ext)),
        None => (name, None),
    };
    let valid = |part: &str, max: usize| part.len() <= max && part.chars().all(is_short_name_char);
    !base.is_empty()
        && valid(base, 8)
        && ext.map_or(true, |ext| !ext.is_empty() && valid(ext, 3))
}
