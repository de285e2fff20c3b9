//! DNS-label name generation
//!
//! Namespaces and jobs are named `<prefix>-<timestamp>-<uuid>`, which is
//! always longer than a DNS label allows, so every generated name goes
//! through [`shorten_dns_label`].

use chrono::Utc;
use uuid::Uuid;

/// Maximum length of a Kubernetes DNS label
pub const MAX_DNS_LABEL_LEN: usize = 63;

/// Trim a name to at most 63 characters without leaving a trailing hyphen
pub fn shorten_dns_label(value: &str) -> String {
    let mut value = value.to_string();
    while value.len() > MAX_DNS_LABEL_LEN {
        value.pop();
        while value.ends_with('-') {
            value.pop();
        }
    }
    value
}

/// Map an arbitrary string onto DNS-label rules, then shorten it
///
/// Lowercases, replaces anything outside `[a-z0-9-]` with a hyphen and strips
/// leading and trailing hyphens.
pub fn sanitize_dns_label(value: &str) -> String {
    let lowered: String = value
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    let trimmed = lowered.trim_matches('-');
    shorten_dns_label(trimmed)
}

/// Whether `value` is a valid RFC 1123 label: lowercase alphanumerics and
/// hyphens, starting and ending with an alphanumeric, at most 63 characters
pub fn is_valid_dns_label(value: &str) -> bool {
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    !value.is_empty()
        && value.len() <= MAX_DNS_LABEL_LEN
        && value.chars().all(|c| alnum(c) || c == '-')
        && value.starts_with(alnum)
        && value.ends_with(alnum)
}

fn timestamp_token() -> String {
    let now = Utc::now();
    format!("{}{:06}", now.timestamp(), now.timestamp_subsec_micros())
}

fn unique_name(prefix: &str) -> String {
    sanitize_dns_label(&format!("{}-{}-{}", prefix, timestamp_token(), Uuid::new_v4()))
}

/// Generate a fresh namespace name (`calrissian-<timestamp>-<uuid>`)
pub fn generate_namespace_name() -> String {
    unique_name("calrissian")
}

/// Generate a fresh job name (`job-<timestamp>-<uuid>`)
pub fn generate_job_name() -> String {
    unique_name("job")
}
