use once_cell::sync::Lazy;
use regex::Regex;

/// `label.tld`: a 3 to 63 character label and an alphabetic TLD. Subdomains
/// are not accepted.
static DOMAIN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9-]{1,61}[a-zA-Z0-9]\.[a-zA-Z]{2,}$")
        .expect("domain regex is hardcoded and valid")
});

pub fn is_valid_domain(domain: &str) -> bool {
    DOMAIN_PATTERN.is_match(domain.trim())
}
