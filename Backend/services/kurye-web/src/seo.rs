use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

use crate::types::BlogPost;

/// Marketing pages that always exist, with their sitemap priority.
const STATIC_PAGES: &[(&str, &str, &str)] = &[
    ("", "daily", "1.0"),
    ("/siparis", "monthly", "0.9"),
    ("/hizmetler", "monthly", "0.8"),
    ("/bolgeler", "weekly", "0.8"),
    ("/blog", "daily", "0.7"),
    ("/hakkimizda", "yearly", "0.5"),
    ("/iletisim", "yearly", "0.5"),
];

pub const SEARCH_ENGINE_PINGS: &[&str] = &[
    "https://www.google.com/ping?sitemap=",
    "https://www.bing.com/ping?sitemap=",
];

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn push_url(
    xml: &mut String,
    loc: &str,
    lastmod: Option<DateTime<Utc>>,
    changefreq: &str,
    priority: &str,
) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(loc)));
    if let Some(at) = lastmod {
        xml.push_str(&format!("    <lastmod>{}</lastmod>\n", at.format("%Y-%m-%d")));
    }
    xml.push_str(&format!("    <changefreq>{changefreq}</changefreq>\n"));
    xml.push_str(&format!("    <priority>{priority}</priority>\n"));
    xml.push_str("  </url>\n");
}

/// Build `sitemap.xml` from location slugs and published posts.
///
/// `locations` is (district slug, neighborhood slugs) as produced by
/// [`crate::directory::LocationDirectory::all_paths`].
pub fn sitemap_xml(site_url: &str, locations: &[(String, Vec<String>)], posts: &[BlogPost]) -> String {
    let base = site_url.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    for (path, freq, prio) in STATIC_PAGES {
        push_url(&mut xml, &format!("{base}{path}"), None, freq, prio);
    }
    for (district, hoods) in locations {
        push_url(&mut xml, &format!("{base}/{district}-moto-kurye"), None, "weekly", "0.8");
        for hood in hoods {
            push_url(
                &mut xml,
                &format!("{base}/{district}-moto-kurye/{hood}"),
                None,
                "monthly",
                "0.6",
            );
        }
    }
    for post in posts {
        push_url(
            &mut xml,
            &format!("{base}/blog/{}", post.slug),
            Some(post.published_at.unwrap_or(post.updated_at)),
            "monthly",
            "0.6",
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

pub fn robots_txt(site_url: &str) -> String {
    let base = site_url.trim_end_matches('/');
    format!(
        "User-agent: *\n\
         Allow: /\n\
         Disallow: /admin\n\
         Disallow: /api/\n\
         \n\
         Sitemap: {base}/sitemap.xml\n"
    )
}

pub fn sitemap_url(site_url: &str) -> String {
    format!("{}/sitemap.xml", site_url.trim_end_matches('/'))
}

#[derive(Debug, Clone, Serialize)]
pub struct PingResult {
    pub endpoint: String,
    pub status: Option<u16>,
    pub error: Option<String>,
}

/// Tell search engines the sitemap changed. Failures are reported, not retried.
pub async fn ping_search_engines(http: &Client, site_url: &str) -> Vec<PingResult> {
    let encoded: String = url::form_urlencoded::byte_serialize(sitemap_url(site_url).as_bytes()).collect();
    let mut out = Vec::with_capacity(SEARCH_ENGINE_PINGS.len());
    for base in SEARCH_ENGINE_PINGS {
        let endpoint = format!("{base}{encoded}");
        let result = match http.get(&endpoint).send().await {
            Ok(res) => {
                info!(endpoint=%endpoint, status = res.status().as_u16(), "sitemap ping sent");
                PingResult {
                    endpoint,
                    status: Some(res.status().as_u16()),
                    error: None,
                }
            }
            Err(e) => {
                warn!(error=?e, endpoint=%endpoint, "sitemap ping failed");
                PingResult {
                    endpoint,
                    status: None,
                    error: Some(e.to_string()),
                }
            }
        };
        out.push(result);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostStatus;

    fn post(slug: &str) -> BlogPost {
        let now = Utc::now();
        BlogPost {
            id: 1,
            title: "T".into(),
            slug: slug.into(),
            excerpt: None,
            content: String::new(),
            meta_title: None,
            meta_description: None,
            meta_keywords: None,
            status: PostStatus::Published,
            published_at: Some(now),
            view_count: 0,
            featured: false,
            author_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn sitemap_lists_locations_and_posts() {
        let locations = vec![("kadikoy".to_string(), vec!["moda".to_string()])];
        let xml = sitemap_xml("https://example.com/", &locations, &[post("kurye-rehberi")]);
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<loc>https://example.com</loc>"));
        assert!(xml.contains("<loc>https://example.com/kadikoy-moto-kurye</loc>"));
        assert!(xml.contains("<loc>https://example.com/kadikoy-moto-kurye/moda</loc>"));
        assert!(xml.contains("<loc>https://example.com/blog/kurye-rehberi</loc>"));
        assert!(xml.contains("<lastmod>"));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn escapes_locations() {
        assert_eq!(escape_xml("a&b<c>"), "a&amp;b&lt;c&gt;");
    }

    #[test]
    fn robots_hides_admin_and_points_at_sitemap() {
        let txt = robots_txt("https://example.com");
        assert!(txt.contains("Disallow: /admin"));
        assert!(txt.contains("Sitemap: https://example.com/sitemap.xml"));
    }
}
