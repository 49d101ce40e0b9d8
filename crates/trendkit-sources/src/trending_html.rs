//! Regex extraction for the github.com/trending HTML page.

use chrono::{DateTime, Utc};
use regex::Regex;
use trendkit_core::{Collected, TrendingRepo};

/// Parse `<article class="Box-row">` entries from a trending page.
///
/// Articles without an `owner/name` link are counted as skipped.
pub(crate) fn parse_trending_html(
    html: &str,
    source: &str,
    collected_at: DateTime<Utc>,
) -> Collected<TrendingRepo> {
    let article_re =
        Regex::new(r#"(?is)<article[^>]*class="[^"]*Box-row[^"]*"[^>]*>(.*?)</article>"#)
            .expect("valid article regex");
    let repo_re = Regex::new(r#"(?is)<h[12][^>]*>\s*<a[^>]*href="/([^"/\s]+/[^"/\s]+)""#)
        .expect("valid repo link regex");
    let desc_re = Regex::new(r#"(?is)<p[^>]*class="[^"]*col-9[^"]*"[^>]*>(.*?)</p>"#)
        .expect("valid description regex");
    let lang_re = Regex::new(r#"(?is)itemprop="programmingLanguage"[^>]*>\s*([^<]+?)\s*<"#)
        .expect("valid language regex");
    let stars_re = Regex::new(r#"(?is)href="/[^"]+/stargazers"[^>]*>(.*?)</a>"#)
        .expect("valid stars regex");
    let forks_re =
        Regex::new(r#"(?is)href="/[^"]+/forks"[^>]*>(.*?)</a>"#).expect("valid forks regex");
    let gained_re = Regex::new(r"(?i)([\d,]+)\s+stars?\s+(?:this|today)")
        .expect("valid stars gained regex");
    let tags_re = Regex::new(r"(?is)<[^>]+>").expect("valid tags regex");

    let strip = |fragment: &str| -> String {
        tags_re
            .replace_all(fragment, " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let count = |fragment: &str| -> u64 {
        let digits: String = strip(fragment)
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        digits.parse().unwrap_or(0)
    };

    let mut repos = Vec::new();
    let mut skipped = 0usize;
    for article in article_re.captures_iter(html) {
        let body = &article[1];
        let Some((owner, name)) = repo_re
            .captures(body)
            .and_then(|c| TrendingRepo::split_full_name(&c[1]))
        else {
            skipped += 1;
            continue;
        };
        let description = desc_re
            .captures(body)
            .map(|c| decode_entities(&strip(&c[1])))
            .filter(|d| !d.is_empty());
        repos.push(TrendingRepo {
            full_name: format!("{owner}/{name}"),
            url: format!("https://github.com/{owner}/{name}"),
            owner,
            name,
            description,
            language: lang_re.captures(body).map(|c| c[1].trim().to_string()),
            stars: stars_re.captures(body).map_or(0, |c| count(&c[1])),
            stars_gained: gained_re
                .captures(&strip(body))
                .map_or(0, |c| c[1].replace(',', "").parse().unwrap_or(0)),
            forks: forks_re.captures(body).map_or(0, |c| count(&c[1])),
            topics: Vec::new(),
            collected_at,
            source: source.to_string(),
        });
    }
    Collected::new(repos, skipped)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
