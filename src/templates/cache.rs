use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use minijinja::{Environment, ErrorKind};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};
use tracing::debug;

use crate::error::TemplateError;

/// Name of the shared base layout every page extends.
pub const BASE_LAYOUT: &str = "base.html";

/// Subdirectory holding shared partials.
pub const PARTIALS_DIR: &str = "partials";

/// Subdirectory holding page templates.
pub const PAGES_DIR: &str = "pages";

/// Parsed templates, built once at startup and read-only afterwards.
///
/// Each page is registered alongside the base layout and the partials so a
/// page key resolves to the fully composed document. Any parse failure aborts
/// construction.
pub struct TemplateCache {
    env: Environment<'static>,
    pages: BTreeSet<String>,
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("pages", &self.pages)
            .finish()
    }
}

impl TemplateCache {
    /// Load `base.html`, `partials/*.html` and `pages/*.html` under `root`.
    pub fn from_dir(root: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let root = root.as_ref();

        let base_path = root.join(BASE_LAYOUT);
        if !base_path.is_file() {
            return Err(TemplateError::MissingLayout(base_path.display().to_string()));
        }
        let base = read_file(&base_path)?;

        let partials_dir = root.join(PARTIALS_DIR);
        let partials = if partials_dir.is_dir() {
            read_html_files(&partials_dir)?
                .into_iter()
                .map(|(name, source)| (format!("{PARTIALS_DIR}/{name}"), source))
                .collect()
        } else {
            Vec::new()
        };

        let pages = read_html_files(&root.join(PAGES_DIR))?;

        Self::from_sources(base, partials, pages)
    }

    /// Build the cache from in-memory sources.
    pub fn from_sources<P, Q>(base: String, partials: P, pages: Q) -> Result<Self, TemplateError>
    where
        P: IntoIterator<Item = (String, String)>,
        Q: IntoIterator<Item = (String, String)>,
    {
        let mut env = Environment::new();
        env.add_filter("human_date", human_date);

        add(&mut env, BASE_LAYOUT.to_string(), base)?;
        for (name, source) in partials {
            add(&mut env, name, source)?;
        }

        let mut names = BTreeSet::new();
        for (name, source) in pages {
            add(&mut env, name.clone(), source)?;
            debug!(page = %name, "Cached template");
            names.insert(name);
        }

        Ok(Self { env, pages: names })
    }

    pub fn contains(&self, page: &str) -> bool {
        self.pages.contains(page)
    }

    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.pages.iter().map(String::as_str)
    }

    /// Execute `page` into a string. Nothing is written anywhere on failure.
    pub fn render<T: Serialize>(&self, page: &str, data: &T) -> Result<String, TemplateError> {
        if !self.contains(page) {
            return Err(TemplateError::NotFound(page.to_string()));
        }
        let template = self
            .env
            .get_template(page)
            .map_err(|_| TemplateError::NotFound(page.to_string()))?;
        template.render(data).map_err(|source| TemplateError::Render {
            name: page.to_string(),
            source,
        })
    }
}

fn add(env: &mut Environment<'static>, name: String, source: String) -> Result<(), TemplateError> {
    env.add_template_owned(name.clone(), source)
        .map_err(|source| TemplateError::Parse { name, source })
}

fn read_file(path: &Path) -> Result<String, TemplateError> {
    fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// `(file name, contents)` for every `*.html` file directly in `dir`, sorted by name.
fn read_html_files(dir: &Path) -> Result<Vec<(String, String)>, TemplateError> {
    let io_err = |source| TemplateError::Io {
        path: dir.display().to_string(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        files.push((name.to_string(), read_file(&path)?));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// `human_date` filter: RFC 3339 timestamp to `02 Jan 2006 at 15:04` in UTC.
fn human_date(value: String) -> Result<String, minijinja::Error> {
    let parsed = OffsetDateTime::parse(&value, &Rfc3339).map_err(|e| {
        minijinja::Error::new(ErrorKind::InvalidOperation, format!("not a timestamp: {e}"))
    })?;
    parsed
        .to_offset(UtcOffset::UTC)
        .format(format_description!(
            "[day] [month repr:short] [year] at [hour]:[minute]"
        ))
        .map_err(|e| minijinja::Error::new(ErrorKind::InvalidOperation, e.to_string()))
}
