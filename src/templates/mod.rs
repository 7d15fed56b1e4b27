//! Template cache and page rendering.
//!
//! Pages are parsed once at startup from a directory laid out as:
//!
//! ```text
//! ui/html/
//! ├── base.html          shared layout
//! ├── partials/*.html    fragments included by the layout
//! └── pages/*.html       one file per page, keyed by file name
//! ```
//!
//! Rendering executes into a buffer first. A response is only produced if the
//! whole page rendered, so a template error never leaves a half-written body.

mod cache;

use std::sync::Arc;

use axum::response::{Html, IntoResponse, Response};
use http::StatusCode;
use minijinja::Value;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::TemplateError;
use crate::models::Snippet;

pub use cache::{TemplateCache, BASE_LAYOUT, PAGES_DIR, PARTIALS_DIR};

/// Values every page can rely on.
///
/// Fields a page does not use are left at their defaults. `form` is the
/// submitted form echoed back along with its validation errors.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemplateData {
    pub current_year: i32,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: Option<Value>,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
}

impl TemplateData {
    /// Data stamped with the current year and nothing else.
    pub fn new() -> Self {
        Self {
            current_year: OffsetDateTime::now_utc().year(),
            ..Self::default()
        }
    }

    pub fn with_snippet(mut self, snippet: Snippet) -> Self {
        self.snippet = Some(snippet);
        self
    }

    pub fn with_snippets(mut self, snippets: Vec<Snippet>) -> Self {
        self.snippets = snippets;
        self
    }

    pub fn with_form<T: Serialize>(mut self, form: &T) -> Self {
        self.form = Some(Value::from_serialize(form));
        self
    }
}

/// Executes cached pages into HTML responses.
#[derive(Clone)]
pub struct Renderer {
    cache: Arc<TemplateCache>,
}

impl Renderer {
    pub fn new(cache: TemplateCache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Render `page` with `data` and wrap it in a response with `status`.
    pub fn render(
        &self,
        status: StatusCode,
        page: &str,
        data: &TemplateData,
    ) -> Result<Response, TemplateError> {
        let body = self.cache.render(page, data)?;
        Ok((status, Html(body)).into_response())
    }
}
