//! RSS 2.0 feed of every published post
//!
//! The document is rebuilt on demand and cached until a post changes.

use anyhow::Context;
use chrono::{DateTime, TimeZone, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::{keys, CacheLayer, MemoryCache};
use crate::config::CmsSettings;
use crate::db::repositories::{AuthorRepository, CategoryRepository, CommentRepository, PostRepository};

const GENERATOR: &str = concat!("pagewright ", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("To generate an RSS feed a view_post_url must be configured")]
    NoPostUrl,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedFeed {
    self_url: String,
    title: String,
    description: String,
    xml: String,
}

pub struct FeedService {
    posts: Arc<dyn PostRepository>,
    categories: Arc<dyn CategoryRepository>,
    authors: Arc<dyn AuthorRepository>,
    comments: Arc<dyn CommentRepository>,
    cache: Arc<MemoryCache>,
    settings: Arc<CmsSettings>,
}

/// RFC 822 date as feeds expect it, always in UTC
pub fn format_rss_date(dt: DateTime<Utc>) -> String {
    dt.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        categories: Arc<dyn CategoryRepository>,
        authors: Arc<dyn AuthorRepository>,
        comments: Arc<dyn CommentRepository>,
        cache: Arc<MemoryCache>,
        settings: Arc<CmsSettings>,
    ) -> Self {
        Self {
            posts,
            categories,
            authors,
            comments,
            cache,
            settings,
        }
    }

    /// The feed served at `self_url`. The channel title defaults to the
    /// website name, the description to one made from it.
    pub async fn generate_rss_xml(
        &self,
        self_url: &str,
        website_name: Option<&str>,
        description: Option<&str>,
    ) -> Result<String, FeedError> {
        if !self.settings.front_end_post_urls_enabled() {
            return Err(FeedError::NoPostUrl);
        }
        let title = website_name.unwrap_or(&self.settings.website_name).to_string();
        let description = description
            .map(str::to_string)
            .unwrap_or_else(|| format!("RSS feed of all posts for {}", title));

        if let Ok(Some(cached)) = self.cache.get::<CachedFeed>(keys::FEED).await {
            if cached.self_url == self_url && cached.title == title && cached.description == description {
                tracing::debug!("Feed served from cache");
                return Ok(cached.xml);
            }
        }

        let xml = self.build(self_url, &title, &description).await?;
        let entry = CachedFeed {
            self_url: self_url.to_string(),
            title,
            description,
            xml: xml.clone(),
        };
        if let Err(e) = self.cache.set(keys::FEED, &entry, self.cache.default_ttl()).await {
            tracing::warn!("Failed to cache feed: {}", e);
        }
        Ok(xml)
    }

    async fn build(&self, self_url: &str, title: &str, description: &str) -> Result<String, FeedError> {
        let now = Utc::now();
        let posts = self.posts.list_published(now).await?;
        let last_build = match self.posts.latest_revision_timestamp(now).await? {
            Some(ts) => ts,
            None => Utc
                .with_ymd_and_hms(1900, 1, 1, 0, 0, 0)
                .single()
                .ok_or_else(|| anyhow::anyhow!("invalid epoch"))?,
        };

        let mut category_names: HashMap<i64, String> = HashMap::new();
        let mut author_names: HashMap<i64, String> = HashMap::new();
        let mut items = Vec::with_capacity(posts.len());

        for post in &posts {
            let url = self
                .settings
                .post_url(&post.post_type, &post.code, post.id)
                .ok_or(FeedError::NoPostUrl)?;

            if !category_names.contains_key(&post.category_id) {
                let name = self
                    .categories
                    .get_by_id(post.category_id)
                    .await?
                    .map(|c| c.name)
                    .unwrap_or_default();
                category_names.insert(post.category_id, name);
            }
            if !author_names.contains_key(&post.author_id) {
                let name = self
                    .authors
                    .get_by_id(post.author_id)
                    .await?
                    .map(|a| a.name)
                    .unwrap_or_default();
                author_names.insert(post.author_id, name);
            }

            items.push(FeedItem {
                title: post.title.clone(),
                description: format!("{}&hellip; <a href=\"{}\">Read More</a>", post.description(), url),
                content: match post.main_image_url.as_deref().filter(|u| !u.is_empty()) {
                    Some(image) => format!("<img src=\"{}\"><br><br>{}", image, post.content),
                    None => post.content.clone(),
                },
                url,
                published: post.published.unwrap_or(post.created),
                creator: author_names.get(&post.author_id).cloned().unwrap_or_default(),
                category: category_names.get(&post.category_id).cloned().unwrap_or_default(),
                comments: self.comments.count_approved_for_post(post.id).await?,
            });
        }

        let channel = Channel {
            title,
            self_url,
            description,
            last_build,
            language: &self.settings.feed_language,
        };
        let xml = render(&channel, &items)?;
        tracing::debug!("Built RSS feed with {} items", items.len());
        Ok(xml)
    }
}

struct Channel<'a> {
    title: &'a str,
    self_url: &'a str,
    description: &'a str,
    last_build: DateTime<Utc>,
    language: &'a str,
}

struct FeedItem {
    title: String,
    url: String,
    published: DateTime<Utc>,
    creator: String,
    category: String,
    description: String,
    content: String,
    comments: i64,
}

type XmlWriter = Writer<Vec<u8>>;

fn start(w: &mut XmlWriter, name: &str) -> anyhow::Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> anyhow::Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> anyhow::Result<()> {
    start(w, name)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, name)
}

/// CDATA sections; a `]]>` in `text` is split across two sections
fn write_cdata(w: &mut XmlWriter, text: &str) -> anyhow::Result<()> {
    let parts: Vec<&str> = text.split("]]>").collect();
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        let chunk = format!(
            "{}{}{}",
            if i > 0 { ">" } else { "" },
            part,
            if i < last { "]]" } else { "" }
        );
        w.write_event(Event::CData(BytesCData::new(chunk.as_str())))?;
    }
    Ok(())
}

fn cdata_element(w: &mut XmlWriter, name: &str, text: &str) -> anyhow::Result<()> {
    start(w, name)?;
    write_cdata(w, text)?;
    end(w, name)
}

fn render(channel: &Channel<'_>, items: &[FeedItem]) -> anyhow::Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.write_event(Event::Start(BytesStart::new("rss").with_attributes([
        ("xmlns:content", "http://purl.org/rss/1.0/modules/content/"),
        ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
        ("xmlns:atom", "http://www.w3.org/2005/Atom"),
        ("xmlns:sy", "http://purl.org/rss/1.0/modules/syndication/"),
        ("xmlns:slash", "http://purl.org/rss/1.0/modules/slash/"),
        ("version", "2.0"),
    ])))?;
    start(&mut w, "channel")?;

    text_element(&mut w, "title", channel.title)?;
    w.write_event(Event::Empty(BytesStart::new("atom:link").with_attributes([
        ("href", channel.self_url),
        ("rel", "self"),
        ("type", "application/rss+xml"),
    ])))?;
    text_element(&mut w, "link", channel.self_url)?;
    text_element(&mut w, "description", channel.description)?;
    text_element(&mut w, "lastBuildDate", &format_rss_date(channel.last_build))?;
    text_element(&mut w, "language", channel.language)?;
    text_element(&mut w, "sy:updatePeriod", "hourly")?;
    text_element(&mut w, "sy:updateFrequency", "1")?;
    text_element(&mut w, "generator", GENERATOR)?;

    for item in items {
        start(&mut w, "item")?;
        text_element(&mut w, "title", &item.title)?;
        text_element(&mut w, "link", &item.url)?;
        text_element(&mut w, "pubDate", &format_rss_date(item.published))?;
        cdata_element(&mut w, "dc:creator", &item.creator)?;
        cdata_element(&mut w, "category", &item.category)?;
        w.write_event(Event::Start(BytesStart::new("guid").with_attributes([("isPermaLink", "false")])))?;
        w.write_event(Event::Text(BytesText::new(&item.url)))?;
        end(&mut w, "guid")?;
        cdata_element(&mut w, "description", &item.description)?;
        cdata_element(&mut w, "content:encoded", &item.content)?;
        text_element(&mut w, "slash:comments", &item.comments.to_string())?;
        end(&mut w, "item")?;
    }

    end(&mut w, "channel")?;
    end(&mut w, "rss")?;
    let mut xml = String::from_utf8(w.into_inner()).context("Feed is not valid UTF-8")?;
    xml.push('\n');
    Ok(xml)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAuthorRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxPostRepository,
    };
    use crate::db::test_database;

    async fn service(view_post_url: Option<&str>) -> (FeedService, crate::db::DynDatabasePool, Arc<MemoryCache>) {
        let (pool, tables) = test_database().await;
        for sql in [
            "INSERT INTO cms_author (id, name, code) VALUES (1, 'Ann Writer', 'ann-writer')",
            "INSERT INTO cms_user (id, name, author_id) VALUES (1, 'ann', 1)",
            "INSERT INTO cms_category (id, post_type, name, code) VALUES (1, 'news', 'Village News', 'village-news')",
            "INSERT INTO cms_post (id, post_type, created, published, category_id, title, code, tagline, content, author_id, main_image_url) \
             VALUES (1, 'news', '2024-03-01T09:00:00+00:00', '2024-03-02T10:30:00+00:00', 1, 'Fete Day', 'fete-day', 'Fun', \
             '<p>Bring &amp; buy stall.</p><p>More</p>', 1, '/img/fete.jpg')",
            "INSERT INTO cms_post (id, post_type, created, category_id, title, code, tagline, content, author_id) \
             VALUES (2, 'news', '2024-03-03T09:00:00+00:00', 1, 'Draft', 'draft', 'x', '<p>secret</p>', 1)",
            "INSERT INTO cms_post (id, post_type, created, published, category_id, title, code, tagline, content, author_id) \
             VALUES (3, 'news', '2024-03-03T09:00:00+00:00', '2999-01-01T00:00:00+00:00', 1, 'Scheduled', 'scheduled', 'x', '<p>later</p>', 1)",
            "INSERT INTO cms_post_revision (post_id, timestamp, user_id, title, content) \
             VALUES (1, '2024-03-05T08:00:00+00:00', 1, 'Fete Day', '')",
            "INSERT INTO cms_comment (post_id, author_name, author_email, timestamp, approved, content, deleted) \
             VALUES (1, 'Bob', 'bob@example.com', '2024-03-06T08:00:00+00:00', 1, '<p>yay</p>', 0)",
            "INSERT INTO cms_comment (post_id, author_name, author_email, timestamp, approved, content, deleted) \
             VALUES (1, 'Eve', 'eve@example.com', '2024-03-06T09:00:00+00:00', 0, '<p>spam</p>', 0)",
        ] {
            pool.execute(sql).await.unwrap();
        }
        let settings = CmsSettings {
            website_name: "Little Village".into(),
            site_url: "https://village.example".into(),
            view_post_url: view_post_url.map(str::to_string),
            ..CmsSettings::default()
        };
        let cache = Arc::new(MemoryCache::new());
        let service = FeedService::new(
            SqlxPostRepository::boxed(pool.clone(), tables.clone()),
            SqlxCategoryRepository::boxed(pool.clone(), tables.clone()),
            SqlxAuthorRepository::boxed(pool.clone(), tables.clone()),
            SqlxCommentRepository::boxed(pool.clone(), tables),
            cache.clone(),
            Arc::new(settings),
        );
        (service, pool, cache)
    }

    #[test]
    fn test_format_rss_date() {
        let dt = Utc.with_ymd_and_hms(2015, 1, 28, 19, 51, 49).unwrap();
        assert_eq!(format_rss_date(dt), "Wed, 28 Jan 2015 19:51:49 +0000");
    }

    #[test]
    fn test_cdata_splits_terminator() {
        let mut w = Writer::new(Vec::new());
        write_cdata(&mut w, "a]]>b").unwrap();
        assert_eq!(String::from_utf8(w.into_inner()).unwrap(), "<![CDATA[a]]]]><![CDATA[>b]]>");
    }

    #[test]
    fn test_text_is_escaped() {
        let channel = Channel {
            title: "Fish & <Chips>",
            self_url: "https://x/feed.xml?a=1&b=2",
            description: "d",
            last_build: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            language: "en-GB",
        };
        let xml = render(&channel, &[]).unwrap();
        assert!(xml.contains("<title>Fish &amp; &lt;Chips&gt;</title>"));
        assert!(xml.contains("<atom:link href=\"https://x/feed.xml?a=1&amp;b=2\" rel=\"self\""));
        assert!(xml.contains("<generator>pagewright "));
    }

    #[tokio::test]
    async fn test_needs_post_url() {
        let (service, _, _) = service(None).await;
        assert!(matches!(
            service.generate_rss_xml("https://village.example/feed.xml", None, None).await,
            Err(FeedError::NoPostUrl)
        ));
    }

    #[tokio::test]
    async fn test_feed_document() {
        let (service, _, _) = service(Some("/{post_type}/{code}")).await;
        let xml = service
            .generate_rss_xml("https://village.example/feed.xml", None, None)
            .await
            .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<title>Little Village</title>"));
        assert!(xml.contains("<description>RSS feed of all posts for Little Village</description>"));
        assert!(xml.contains("<lastBuildDate>Tue, 05 Mar 2024 08:00:00 +0000</lastBuildDate>"));
        assert!(xml.contains("<language>en-GB</language>"));
        assert!(xml.contains("<pubDate>Sat, 02 Mar 2024 10:30:00 +0000</pubDate>"));
        assert!(xml.contains("<dc:creator><![CDATA[Ann Writer]]></dc:creator>"));
        assert!(xml.contains("<category><![CDATA[Village News]]></category>"));
        assert!(xml.contains("<guid isPermaLink=\"false\">https://village.example/news/fete-day</guid>"));
        assert!(xml.contains(
            "<description><![CDATA[Bring & buy stall.&hellip; <a href=\"https://village.example/news/fete-day\">Read More</a>]]></description>"
        ));
        assert!(xml.contains("<content:encoded><![CDATA[<img src=\"/img/fete.jpg\"><br><br><p>Bring"));
        assert!(xml.contains("<slash:comments>1</slash:comments>"));
        assert!(!xml.contains("secret"));
        assert!(!xml.contains("Scheduled"));
    }

    #[tokio::test]
    async fn test_empty_feed_build_date() {
        let (service, pool, _) = service(Some("/{code}")).await;
        pool.execute("UPDATE cms_post SET published = NULL").await.unwrap();
        let xml = service
            .generate_rss_xml("https://village.example/feed.xml", Some("Other"), Some("Custom"))
            .await
            .unwrap();
        assert!(xml.contains("<lastBuildDate>Mon, 01 Jan 1900 00:00:00 +0000</lastBuildDate>"));
        assert!(xml.contains("<description>Custom</description>"));
        assert!(!xml.contains("<item>"));
    }

    #[tokio::test]
    async fn test_feed_is_cached_until_invalidated() {
        let (service, pool, cache) = service(Some("/{code}")).await;
        let first = service.generate_rss_xml("https://x/feed.xml", None, None).await.unwrap();
        pool.execute("UPDATE cms_post SET title = 'Renamed' WHERE id = 1").await.unwrap();
        let cached = service.generate_rss_xml("https://x/feed.xml", None, None).await.unwrap();
        assert_eq!(first, cached);

        cache.delete(keys::FEED).await.unwrap();
        let rebuilt = service.generate_rss_xml("https://x/feed.xml", None, None).await.unwrap();
        assert!(rebuilt.contains("<title>Renamed</title>"));
    }
}
