//! Built-in Operations
//!
//! - **Article operations**: read-only queries over `ArticleApproveds`
//! - **Article formatting**: text rendering of article rows for the model

mod article_format;
mod articles;

pub use article_format::{
    format_article_for_display, format_articles_list, is_article, DEFAULT_MAX_DISPLAY,
};
pub use articles::{register_article_tools, ArticleQueries, CATEGORY as ARTICLE_CATEGORY, DATE_FIELDS};
