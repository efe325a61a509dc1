//! Plain-text rendering of article rows

use serde_json::{Map, Value};

use fluxion_core::truncate_chars;

const ARTICLE_MARKER: &str = "headlineForPdfReport";
const MAX_TEXT_CHARS: usize = 200;
pub const DEFAULT_MAX_DISPLAY: usize = 5;

/// Whether `value` looks like a row from `ArticleApproveds`
pub fn is_article(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key(ARTICLE_MARKER))
}

fn field(article: &Map<String, Value>, key: &str, fallback: &str) -> String {
    match article.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => fallback.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn format_article_for_display(article: &Map<String, Value>) -> String {
    let headline = field(article, "headlineForPdfReport", "No headline");
    let publication = field(article, "publicationNameForPdfReport", "Unknown");
    let date = field(article, "publicationDateForPdfReport", "Unknown date");
    let url = field(article, "urlForPdfReport", "No URL");
    let text = field(article, "textForPdfReport", "");

    let mut out = format!(
        "**{}**\nPublication: {}\nDate: {}\nURL: {}",
        headline, publication, date, url
    );
    if !text.is_empty() {
        out.push_str("\nText: ");
        out.push_str(&truncate_chars(&text, MAX_TEXT_CHARS));
    }
    out
}

/// Summary line plus detail blocks for the first `max_display` articles.
pub fn format_articles_list(articles: &[Value], max_display: usize) -> String {
    if articles.is_empty() {
        return "No articles found.".to_string();
    }

    let mut out = format!("Found {} article(s).\n\n", articles.len());
    for (i, article) in articles.iter().take(max_display).enumerate() {
        out.push_str(&format!("--- Article {} ---\n", i + 1));
        if let Some(obj) = article.as_object() {
            out.push_str(&format_article_for_display(obj));
        }
        out.push_str("\n\n");
    }

    if articles.len() > max_display {
        out.push_str(&format!(
            "... and {} more article(s).",
            articles.len() - max_display
        ));
    }

    out.trim_end().to_string()
}
