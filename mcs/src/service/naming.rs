//! Codespace name resolution
//!
//! Turns a repository identity into a name that is safe to use both as a
//! directory name and as a container name, and unique among existing
//! codespaces.

use std::path::{Component, Path};

use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::debug;

/// Name used when sanitizing leaves nothing behind
const FALLBACK_NAME: &str = "codespace";

/// Random suffixes tried before falling back to a timestamp
const MAX_SUFFIX_ATTEMPTS: usize = 50;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brave", "bright", "calm", "clever", "cosmic", "crisp", "daring", "eager",
    "fancy", "fierce", "gentle", "golden", "happy", "jolly", "keen", "lively", "lucky", "mellow",
    "misty", "nimble", "noble", "quiet", "rapid", "rustic", "shiny", "silent", "silver", "smooth",
    "snowy", "solar", "steady", "sunny", "swift", "tidy", "vivid", "witty", "young", "zesty",
];

const NOUNS: &[&str] = &[
    "badger", "beacon", "breeze", "canyon", "cedar", "comet", "coral", "falcon", "fern", "forest",
    "galaxy", "glacier", "harbor", "heron", "island", "lagoon", "lantern", "maple", "meadow",
    "meteor", "nebula", "orbit", "otter", "panda", "pebble", "phoenix", "pine", "prairie", "quartz",
    "raven", "river", "robin", "saturn", "spark", "summit", "thunder", "tiger", "tundra", "willow",
    "zephyr",
];

/// Lowercase, collapse runs outside `[a-z0-9-]` into one hyphen, trim hyphens
///
/// Existing hyphens join the surrounding run, so the result never holds `--`.
pub fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_run = false;

    for c in s.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }

    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `sanitize(owner)-sanitize(repo)`
pub fn base_name(owner: &str, repo: &str) -> String {
    format!("{}-{}", sanitize(owner), sanitize(repo))
}

/// Pick a name for `owner/repo` that `exists` reports as free
///
/// Tries the base name, then random `-<adjective>-<noun>` suffixes, then a
/// Unix-timestamp suffix. Never fails.
pub fn unique_name<F>(owner: &str, repo: &str, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let base = base_name(owner, repo);
    if !exists(&base) {
        return base;
    }

    let mut rng = rand::thread_rng();
    for _ in 0..MAX_SUFFIX_ATTEMPTS {
        let (Some(adjective), Some(noun)) = (ADJECTIVES.choose(&mut rng), NOUNS.choose(&mut rng))
        else {
            break;
        };
        let candidate = format!("{}-{}-{}", base, adjective, noun);
        if !exists(&candidate) {
            return candidate;
        }
        debug!("Name candidate {} already taken", candidate);
    }

    // Assumes two exhausting calls for the same base never land in the same second
    format!("{}-{}", base, Utc::now().timestamp())
}

/// Whether `name` names exactly one entry directly inside a directory
///
/// Rejects empty names, `.`, `..`, absolute paths and anything with a separator.
pub fn is_single_segment(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(segment)), None) if segment == name
    )
}
