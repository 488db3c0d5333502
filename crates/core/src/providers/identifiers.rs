//! DOI extraction from free text.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static DOI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"10\.\d{4,9}/[^\s"<>?#&]+"#).expect("DOI pattern is valid")
});

const TRAILING_PUNCTUATION: &[char] = &['.', ',', ';', ':', ')', ']', '}', '\'', '"'];

/// Extract the first DOI embedded in `text`.
pub fn extract_doi(text: &str) -> Option<String> {
    let found = DOI_PATTERN.find(text)?;
    let doi = found.as_str().trim_end_matches(TRAILING_PUNCTUATION);
    if doi.contains('/') && !doi.ends_with('/') {
        Some(doi.to_string())
    } else {
        None
    }
}

/// Strip resolver prefixes (`https://doi.org/`, `doi:`) and whitespace.
pub fn normalize_doi(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"] {
        if lower.starts_with(prefix) {
            return trimmed[prefix.len()..].trim().to_string();
        }
    }
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_disclaimer() {
        let text = "Notice: Paper or abstract available at https://api.unpaywall.org/v2/10.1038/s41586-020-2649-2?email=<INSERT_YOUR_EMAIL>, which is subject to the license.";
        assert_eq!(
            extract_doi(text).as_deref(),
            Some("10.1038/s41586-020-2649-2")
        );
    }

    #[test]
    fn test_extract_trims_trailing_punctuation() {
        assert_eq!(
            extract_doi("see (doi 10.1145/3292500.3330701).").as_deref(),
            Some("10.1145/3292500.3330701")
        );
        assert_eq!(
            extract_doi("https://doi.org/10.5555/abc.1, licence").as_deref(),
            Some("10.5555/abc.1")
        );
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_doi("no identifier here"), None);
        assert_eq!(extract_doi("10.12/short"), None);
    }

    #[test]
    fn test_normalize_doi() {
        assert_eq!(normalize_doi(" https://doi.org/10.1/x "), "10.1/x");
        assert_eq!(normalize_doi("doi:10.1/y"), "10.1/y");
        assert_eq!(normalize_doi("10.1/z"), "10.1/z");
    }
}
