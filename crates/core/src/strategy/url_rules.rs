//! Deterministic URL rewrites for hosts with predictable PDF paths.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use reqwest::Url;

static PMC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(PMC\d+)").expect("PMC pattern is valid"));

static IEEE_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/document/(\d+)").expect("IEEE pattern is valid"));

/// One host family and how to rewrite its landing pages.
struct TransformRule {
    name: &'static str,
    applies: fn(&str) -> bool,
    rewrite: fn(&Url, &str) -> Vec<String>,
}

static RULES: &[TransformRule] = &[
    TransformRule {
        name: "pmc",
        applies: is_pmc_host,
        rewrite: pmc_candidates,
    },
    TransformRule {
        name: "preprint",
        applies: is_preprint_host,
        rewrite: preprint_candidates,
    },
    TransformRule {
        name: "mdpi",
        applies: is_mdpi_host,
        rewrite: mdpi_candidates,
    },
    TransformRule {
        name: "springer",
        applies: is_springer_host,
        rewrite: springer_candidates,
    },
    TransformRule {
        name: "ieee",
        applies: is_ieee_host,
        rewrite: ieee_candidates,
    },
    TransformRule {
        name: "acm",
        applies: is_acm_host,
        rewrite: acm_candidates,
    },
    TransformRule {
        name: "oup",
        applies: is_oup_host,
        rewrite: oup_candidates,
    },
];

fn is_pmc_host(host: &str) -> bool {
    host.contains("ncbi.nlm.nih.gov") || host.contains("pmc")
}

fn pmc_candidates(url: &Url, _host: &str) -> Vec<String> {
    let Some(caps) = PMC_ID.captures(url.path()) else {
        return Vec::new();
    };
    let id = caps[1].to_ascii_uppercase();
    vec![
        format!("https://europepmc.org/articles/{}?format=pdf", id),
        format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/main.pdf", id),
        format!("https://www.ncbi.nlm.nih.gov/pmc/articles/{}/pdf/", id),
        format!(
            "https://europepmc.org/backend/ptpmcrender.fcgi?accid={}&blobtype=pdf",
            id
        ),
    ]
}

fn is_preprint_host(host: &str) -> bool {
    host.contains("biorxiv.org") || host.contains("medrxiv.org")
}

fn preprint_candidates(url: &Url, host: &str) -> Vec<String> {
    let path = url.path();
    if path.ends_with(".pdf") {
        return Vec::new();
    }
    vec![format!("https://{}{}.full.pdf", host, path.trim_end_matches('/'))]
}

fn is_mdpi_host(host: &str) -> bool {
    host.contains("mdpi.com")
}

fn mdpi_candidates(url: &Url, host: &str) -> Vec<String> {
    let path = url.path();
    if path.contains("/pdf") {
        return Vec::new();
    }
    vec![format!("https://{}{}/pdf", host, path.trim_end_matches('/'))]
}

fn is_springer_host(host: &str) -> bool {
    host.contains("link.springer.com")
}

fn springer_candidates(url: &Url, host: &str) -> Vec<String> {
    let path = url.path();
    if !path.contains("/article/") {
        return Vec::new();
    }
    vec![format!(
        "https://{}{}.pdf",
        host,
        path.replace("/article/", "/content/pdf/")
    )]
}

fn is_ieee_host(host: &str) -> bool {
    host.contains("ieeexplore.ieee.org")
}

fn ieee_candidates(url: &Url, _host: &str) -> Vec<String> {
    match IEEE_DOCUMENT.captures(url.path()) {
        Some(caps) => vec![format!(
            "https://ieeexplore.ieee.org/stampPDF/getPDF.jsp?arnumber={}",
            &caps[1]
        )],
        None => Vec::new(),
    }
}

fn is_acm_host(host: &str) -> bool {
    host.contains("dl.acm.org")
}

fn acm_candidates(url: &Url, host: &str) -> Vec<String> {
    let path = url.path();
    if !path.contains("/doi/") || path.contains("/doi/pdf/") {
        return Vec::new();
    }
    vec![format!("https://{}{}", host, path.replacen("/doi/", "/doi/pdf/", 1))]
}

fn is_oup_host(host: &str) -> bool {
    host.contains("academic.oup.com")
}

fn oup_candidates(url: &Url, _host: &str) -> Vec<String> {
    let already = url.path().contains("pdfformat")
        || url.query().is_some_and(|q| q.contains("pdfformat"));
    if already {
        return Vec::new();
    }
    vec![format!("{}?pdfformat=full", url.as_str())]
}

/// Alternative PDF URLs for `url`, in the order they should be tried.
/// Empty when no rule applies.
pub fn transform_candidates(url: &str) -> Vec<String> {
    let Ok(parsed) = Url::parse(url.trim()) else {
        return Vec::new();
    };
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return Vec::new();
    };

    let mut candidates: Vec<String> = Vec::new();
    for rule in RULES.iter().filter(|r| (r.applies)(&host)) {
        for candidate in (rule.rewrite)(&parsed, &host) {
            if candidate != url && !candidates.contains(&candidate) {
                candidates.push(candidate);
            }
        }
    }
    candidates
}

/// Names of the rules that match `url`, for logging.
pub fn matching_rules(url: &str) -> Vec<&'static str> {
    let host = Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase));
    match host {
        Some(host) => RULES
            .iter()
            .filter(|r| (r.applies)(&host))
            .map(|r| r.name)
            .collect(),
        None => Vec::new(),
    }
}
