//! Field extractors for listing pages.
//!
//! Every function works on the raw markup string with regular expressions and
//! returns `None` when nothing usable is found; callers pick the fallback.

use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;

pub const VENUE_MAX_CHARS: usize = 100;
const CATEGORY_SCAN_CHARS: usize = 5000;

pub const KNOWN_CITIES: &[&str] = &[
    "Karachi",
    "Lahore",
    "Islamabad",
    "Rawalpindi",
    "Faisalabad",
    "Multan",
    "Peshawar",
    "Quetta",
    "Hyderabad",
    "Sialkot",
    "Gujranwala",
];

/// Category name to trigger words, checked in order.
pub const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("comedy", &["comedy", "stand-up", "standup", "comedian", "laugh"]),
    (
        "music",
        &["concert", "music", "band", "dj", "festival", "gig", "qawwali", "live"],
    ),
    (
        "sports",
        &["cricket", "football", "marathon", "sports", "tournament", "match", "futsal"],
    ),
    ("theatre", &["theatre", "theater", "drama", "musical", "play"]),
    (
        "workshop",
        &["workshop", "seminar", "conference", "masterclass", "bootcamp", "summit"],
    ),
    ("food", &["food", "culinary", "dining", "brunch", "dinner"]),
    ("family", &["kids", "family", "carnival", "circus"]),
];

pub const DEFAULT_CATEGORY: &str = "other";

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec";

macro_rules! regex {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(&$pattern).expect("static pattern compiles"))
    }};
}

fn tag_re() -> &'static Regex {
    regex!(r"<[^>]*>")
}

fn whitespace_re() -> &'static Regex {
    regex!(r"\s+")
}

/// Drops tags, decodes the common entities and collapses whitespace.
pub fn clean_text(markup: &str) -> String {
    let without_tags = tag_re().replace_all(markup, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");
    whitespace_re().replace_all(&decoded, " ").trim().to_string()
}

fn host_of(url: &str) -> &str {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let host = without_scheme.split('/').next().unwrap_or_default();
    host.trim_start_matches("www.")
}

/// Makes `href` absolute relative to the site root `base_url`.
pub fn absolutize(base_url: &str, href: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("{base}{href}")
    } else {
        format!("{base}/{href}")
    }
}

/// Collects distinct event-detail links (`/event/<slug>` or `/events/<slug>`)
/// on the source's own host, in the order they first appear.
pub fn discover_event_links(html: &str, base_url: &str) -> Vec<String> {
    let re = regex!(r#"(?i)href\s*=\s*["']([^"'#?\s]*/events?/[a-z0-9][a-z0-9_\-]*/?)["']"#);
    let site_host = host_of(base_url);

    let mut links: Vec<String> = Vec::new();
    for caps in re.captures_iter(html) {
        let url = absolutize(base_url, &caps[1]);
        if !host_of(&url).eq_ignore_ascii_case(site_host) {
            continue;
        }
        if !links.contains(&url) {
            links.push(url);
        }
    }
    links
}

/// Stable identifier for a listing: the last path segment of its URL.
pub fn external_id(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
        .map(str::to_string)
}

/// Level-1 heading, else the page title without the site suffix.
pub fn extract_name(html: &str, site_name: &str) -> Option<String> {
    let h1 = regex!(r"(?is)<h1[^>]*>(.*?)</h1>");
    if let Some(caps) = h1.captures(html) {
        let text = clean_text(&caps[1]);
        if !text.is_empty() {
            return Some(text);
        }
    }

    let title = regex!(r"(?is)<title[^>]*>(.*?)</title>");
    let raw = clean_text(&title.captures(html)?[1]);
    let stripped = strip_site_suffix(&raw, site_name);
    (!stripped.is_empty()).then_some(stripped)
}

fn strip_site_suffix(title: &str, site_name: &str) -> String {
    let lower_title = title.to_ascii_lowercase();
    let lower_site = site_name.to_ascii_lowercase();
    for separator in [" | ", " - ", " – ", " :: "] {
        let suffix = format!("{separator}{lower_site}");
        if let Some(pos) = lower_title.rfind(&suffix) {
            return title[..pos].trim().to_string();
        }
    }
    title.trim().to_string()
}

/// Open Graph image, else the first `<img>` whose source looks like a banner.
pub fn extract_image(html: &str, base_url: &str) -> Option<String> {
    let og_property_first =
        regex!(r#"(?is)<meta[^>]+property\s*=\s*["']og:image["'][^>]*content\s*=\s*["']([^"']+)["']"#);
    let og_content_first =
        regex!(r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*property\s*=\s*["']og:image["']"#);
    let banner_img = regex!(r#"(?is)<img[^>]+src\s*=\s*["']([^"']*(?:banner|event|poster)[^"']*)["']"#);

    og_property_first
        .captures(html)
        .or_else(|| og_content_first.captures(html))
        .or_else(|| banner_img.captures(html))
        .map(|caps| absolutize(base_url, caps[1].trim()))
}

/// Open Graph or meta description.
pub fn extract_description(html: &str) -> Option<String> {
    let og = regex!(
        r#"(?is)<meta[^>]+(?:property|name)\s*=\s*["'](?:og:description|description)["'][^>]*content\s*=\s*["']([^"']*)["']"#
    );
    let text = clean_text(&og.captures(html)?[1]);
    (!text.is_empty()).then_some(text)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Finds the event date. Patterns are tried in order ("D Month YYYY", ISO
/// `YYYY-MM-DD`, "Month D, YYYY"); the first match that is a real calendar
/// date strictly after `today` wins.
pub fn extract_start_date(html: &str, today: NaiveDate) -> Option<NaiveDate> {
    let day_month_year = regex!(format!(
        r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTHS})\.?,?\s+(\d{{4}})\b"
    ));
    let iso = regex!(r"\b(\d{4})-(\d{2})-(\d{2})\b");
    let month_day_year = regex!(format!(
        r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b"
    ));

    let future = |date: Option<NaiveDate>| date.filter(|d| *d > today);

    for caps in day_month_year.captures_iter(html) {
        let date = match (caps[1].parse(), month_number(&caps[2]), caps[3].parse()) {
            (Ok(day), Some(month), Ok(year)) => NaiveDate::from_ymd_opt(year, month, day),
            _ => None,
        };
        if let Some(date) = future(date) {
            return Some(date);
        }
    }

    for caps in iso.captures_iter(html) {
        let date = match (caps[1].parse(), caps[2].parse(), caps[3].parse()) {
            (Ok(year), Ok(month), Ok(day)) => NaiveDate::from_ymd_opt(year, month, day),
            _ => None,
        };
        if let Some(date) = future(date) {
            return Some(date);
        }
    }

    for caps in month_day_year.captures_iter(html) {
        let date = match (month_number(&caps[1]), caps[2].parse(), caps[3].parse()) {
            (Some(month), Ok(day), Ok(year)) => NaiveDate::from_ymd_opt(year, month, day),
            _ => None,
        };
        if let Some(date) = future(date) {
            return Some(date);
        }
    }

    None
}

fn word_pattern(word: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(word))).expect("escaped word compiles")
}

/// First city of [`KNOWN_CITIES`] mentioned anywhere on the page.
pub fn extract_city(html: &str) -> Option<&'static str> {
    static CITY_PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let patterns = CITY_PATTERNS.get_or_init(|| {
        KNOWN_CITIES
            .iter()
            .map(|city| (*city, word_pattern(city)))
            .collect()
    });

    patterns
        .iter()
        .find(|(_, re)| re.is_match(html))
        .map(|(city, _)| *city)
}

/// Text after a `Venue:`, `Location:` or `Place:` label, cut to 100 characters.
pub fn extract_venue(html: &str) -> Option<String> {
    let label = regex!(r"(?i)\b(?:venue|location|place)\s*:\s*(?:<[^>]+>\s*)*([^<\n]+)");
    label
        .captures_iter(html)
        .map(|caps| clean_text(&caps[1]))
        .find(|text| !text.is_empty())
        .map(|text| text.chars().take(VENUE_MAX_CHARS).collect::<String>().trim().to_string())
}

/// First rupee-prefixed amount (`Rs 1,500`, `Rs.2000`, `PKR 750`).
pub fn extract_price(html: &str) -> Option<Decimal> {
    let price = regex!(r"(?i)\b(?:rs\.?|pkr)\s*([0-9][0-9,]*(?:\.[0-9]+)?)");
    price
        .captures_iter(html)
        .find_map(|caps| Decimal::from_str(&caps[1].replace(',', "")).ok())
}

/// Keyword lookup over the name and the start of the page.
pub fn classify_category(name: &str, html: &str) -> &'static str {
    static CATEGORY_PATTERNS: OnceLock<Vec<(&'static str, Vec<Regex>)>> = OnceLock::new();
    let patterns = CATEGORY_PATTERNS.get_or_init(|| {
        CATEGORY_KEYWORDS
            .iter()
            .map(|(category, words)| (*category, words.iter().map(|w| word_pattern(w)).collect()))
            .collect()
    });

    let head: String = html.chars().take(CATEGORY_SCAN_CHARS).collect();
    let haystack = format!("{name} {head}");

    patterns
        .iter()
        .find(|(_, words)| words.iter().any(|re| re.is_match(&haystack)))
        .map(|(category, _)| *category)
        .unwrap_or(DEFAULT_CATEGORY)
}
