use futures_util::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use trawler_core::{CatalogItem, CatalogTag};
use trawler_logging::trawl_debug;
use url::Url;

use crate::pool::{FetchReply, PoolError, PoolHandle};
use crate::{CrawlError, FailureKind};

/// Where and how to page through one catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSource {
    pub tag: CatalogTag,
    pub base_url: Url,
    pub page_size: u32,
}

impl CatalogSource {
    pub fn new(tag: CatalogTag, base_url: &str, page_size: u32) -> Result<Self, CrawlError> {
        let base_url = Url::parse(base_url).map_err(|err| CrawlError::InvalidUrl {
            catalog: tag,
            url: base_url.to_string(),
            message: err.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(CrawlError::InvalidUrl {
                catalog: tag,
                url: base_url.to_string(),
                message: "url cannot carry a path".to_string(),
            });
        }
        Ok(Self {
            tag,
            base_url,
            page_size,
        })
    }

    /// `<base>/<catalog>?page_size=N`
    pub fn first_page_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(self.tag.as_str());
        }
        url.query_pairs_mut()
            .append_pair("page_size", &self.page_size.to_string());
        url
    }

    /// Resolves a `next_href` cursor.
    ///
    /// Absolute links are used as given. Relative links are appended to the
    /// base path, never to the previous page's URL, so the cursor cannot drift.
    pub fn resolve_next(&self, next_href: &str) -> Url {
        if let Ok(absolute) = Url::parse(next_href) {
            return absolute;
        }

        let (path, query) = match next_href.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (next_href, None),
        };
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(query);
        url.set_fragment(None);
        url
    }
}

/// One decoded catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub items: Vec<CatalogItem>,
    pub next: Option<Url>,
}

/// Decodes `{<catalog>: [...], meta: {<catalog>: {next_href}}}`.
///
/// A missing or null `next_href` (or a missing metadata block) marks the last
/// page. Every item must carry an `id`.
pub fn parse_page(source: &CatalogSource, url: &str, body: Value) -> Result<Page, CrawlError> {
    let catalog = source.tag;
    let decode_error = |message: String| CrawlError::Decode {
        catalog,
        url: url.to_string(),
        message,
    };

    let Value::Object(mut body) = body else {
        return Err(decode_error("page is not a JSON object".to_string()));
    };

    let next = match body
        .get("meta")
        .and_then(|meta| meta.get(catalog.as_str()))
        .and_then(|meta| meta.get("next_href"))
    {
        None | Some(Value::Null) => None,
        Some(Value::String(href)) if href.is_empty() => None,
        Some(Value::String(href)) => Some(source.resolve_next(href)),
        Some(other) => return Err(decode_error(format!("next_href is not a string: {other}"))),
    };

    let records = match body.remove(catalog.as_str()) {
        Some(Value::Array(records)) => records,
        Some(_) => return Err(decode_error(format!("`{catalog}` is not an array"))),
        None => return Err(decode_error(format!("missing `{catalog}` array"))),
    };

    let items = records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            CatalogItem::from_json(record)
                .map_err(|err| decode_error(format!("item {index}: {err}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Page {
        url: url.to_string(),
        items,
        next,
    })
}

async fn fetch_page(
    source: &CatalogSource,
    pool: &PoolHandle,
    url: Url,
) -> Result<Page, CrawlError> {
    let catalog = source.tag;
    let queue_closed = |_: PoolError| CrawlError::QueueClosed { catalog };

    trawl_debug!("fetching {} page {}", catalog, url);
    let FetchReply { url, payload } = pool.fetch(url.as_str()).await.map_err(queue_closed)?;
    match payload {
        Ok(body) => parse_page(source, &url, body),
        Err(err) if err.kind == FailureKind::Decode => Err(CrawlError::Decode {
            catalog,
            url,
            message: err.message,
        }),
        Err(err) => Err(CrawlError::Fetch {
            catalog,
            url,
            source: err,
        }),
    }
}

/// Lazily pages through the catalog starting at page one.
///
/// Each page is requested only once the previous one has been consumed. The
/// stream ends after the page without a next link, or right after the first
/// error.
pub fn catalog_pages(
    source: CatalogSource,
    pool: PoolHandle,
) -> impl Stream<Item = Result<Page, CrawlError>> {
    let first = Some(source.first_page_url());
    stream::try_unfold(first, move |next| {
        let source = source.clone();
        let pool = pool.clone();
        async move { advance(&source, &pool, next).await }
    })
}

async fn advance(
    source: &CatalogSource,
    pool: &PoolHandle,
    next: Option<Url>,
) -> Result<Option<(Page, Option<Url>)>, CrawlError> {
    let Some(url) = next else {
        return Ok(None);
    };
    let page = fetch_page(source, pool, url).await?;
    let next = page.next.clone();
    Ok(Some((page, next)))
}

/// Item-level view of [`catalog_pages`].
pub fn catalog_items(
    source: CatalogSource,
    pool: PoolHandle,
) -> impl Stream<Item = Result<CatalogItem, CrawlError>> {
    catalog_pages(source, pool)
        .map_ok(|page| stream::iter(page.items.into_iter().map(Ok::<_, CrawlError>)))
        .try_flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(base: &str) -> CatalogSource {
        CatalogSource::new(CatalogTag::Projects, base, 200).unwrap()
    }

    #[test]
    fn first_page_appends_catalog_to_base_path() {
        let url = source("https://www.zooniverse.org/api").first_page_url();
        assert_eq!(
            url.as_str(),
            "https://www.zooniverse.org/api/projects?page_size=200"
        );
        let url = source("https://www.zooniverse.org/api/").first_page_url();
        assert_eq!(
            url.as_str(),
            "https://www.zooniverse.org/api/projects?page_size=200"
        );
    }

    #[test]
    fn relative_next_is_resolved_against_base() {
        let src = source("https://www.zooniverse.org/api");
        let next = src.resolve_next("/projects?page=2&page_size=200");
        assert_eq!(
            next.as_str(),
            "https://www.zooniverse.org/api/projects?page=2&page_size=200"
        );
        let next = src.resolve_next("projects?page=3");
        assert_eq!(next.as_str(), "https://www.zooniverse.org/api/projects?page=3");
    }

    #[test]
    fn absolute_next_is_used_verbatim() {
        let src = source("https://www.zooniverse.org/api");
        let next = src.resolve_next("https://mirror.example.com/v2/projects?page=9");
        assert_eq!(next.as_str(), "https://mirror.example.com/v2/projects?page=9");
    }

    #[test]
    fn invalid_base_url_names_the_catalog() {
        let err = CatalogSource::new(CatalogTag::Users, "not a url", 10).unwrap_err();
        assert_eq!(err.catalog(), CatalogTag::Users);
        assert!(matches!(err, CrawlError::InvalidUrl { .. }));
    }

    #[test]
    fn parse_page_reads_items_and_cursor() {
        let src = source("https://host/api");
        let body = serde_json::json!({
            "projects": [{ "id": "1", "display_name": "Galaxy Zoo" }, { "id": 2 }],
            "meta": { "projects": { "next_href": "/projects?page=2" } }
        });
        let page = parse_page(&src, "https://host/api/projects", body).unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].id.as_str(), "1");
        assert_eq!(page.items[1].id.as_str(), "2");
        assert_eq!(
            page.next.map(String::from),
            Some("https://host/api/projects?page=2".to_string())
        );
    }

    #[test]
    fn parse_page_without_cursor_is_last() {
        let src = source("https://host/api");
        for meta in [
            serde_json::json!({ "projects": { "next_href": null } }),
            serde_json::json!({ "projects": {} }),
            serde_json::json!({}),
        ] {
            let body = serde_json::json!({ "projects": [], "meta": meta });
            let page = parse_page(&src, "u", body).unwrap();
            assert!(page.next.is_none());
        }
    }

    #[test]
    fn parse_page_rejects_wrong_shapes() {
        let src = source("https://host/api");
        let cases = [
            serde_json::json!({ "users": [] }),
            serde_json::json!({ "projects": {} }),
            serde_json::json!({ "projects": [{ "name": "no id" }] }),
            serde_json::json!(["projects"]),
        ];
        for body in cases {
            let err = parse_page(&src, "https://host/api/projects", body).unwrap_err();
            assert!(matches!(err, CrawlError::Decode { catalog: CatalogTag::Projects, .. }));
        }
    }
}
