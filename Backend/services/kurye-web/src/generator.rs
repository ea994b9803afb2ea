//! AI-assisted blog drafts: one prompt out to a Gemini-style endpoint, one JSON
//! document back. No retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::slug::slugify;
use crate::types::{NewBlogPost, PostStatus};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,
    #[error("at least one keyword is required")]
    NoKeywords,
    #[error("provider returned http {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed provider response: {reason}")]
    MalformedProviderResponse { reason: String, raw: String },
    #[error("generated text is not valid JSON: {reason}")]
    InvalidJson { reason: String, raw: String },
}

impl GenerateError {
    /// Raw provider text worth showing to the editor, if any.
    pub fn raw(&self) -> Option<&str> {
        match self {
            GenerateError::Upstream { body, .. } => Some(body),
            GenerateError::MalformedProviderResponse { raw, .. } => Some(raw),
            GenerateError::InvalidJson { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    /// When set, the draft is saved with this status instead of only returned.
    #[serde(default)]
    pub status: Option<PostStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlogDraft {
    pub title: String,
    pub slug: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub meta_keywords: Option<String>,
}

impl BlogDraft {
    pub fn into_post(self, status: PostStatus, author_name: Option<String>) -> NewBlogPost {
        NewBlogPost {
            title: self.title,
            slug: Some(self.slug),
            excerpt: self.excerpt,
            content: self.content,
            meta_title: self.meta_title,
            meta_description: self.meta_description,
            meta_keywords: self.meta_keywords,
            status,
            published_at: None,
            featured: false,
            author_name,
        }
    }
}

/// Sends a finished prompt somewhere and returns the model's text.
#[async_trait]
pub trait DraftProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError>;
}

const PROMPT_TEMPLATE: &str = r#"Sen İstanbul'da hizmet veren bir moto kurye firması için SEO uzmanı bir içerik yazarısın.
Aşağıdaki anahtar kelimeleri doğal biçimde kullanarak Türkçe, özgün ve bilgilendirici bir blog yazısı hazırla.

Kurallar:
- En az 800 kelime, HTML formatında (<h2>, <h3>, <p>, <ul>, <li>, <strong> etiketleri).
- <h1> kullanma, başlık ayrı alanda verilecek.
- İstanbul ilçelerine ve moto kurye hizmetinin avantajlarına (hız, güvenlik, 7/24) değin.
- Son paragrafta okuyucuyu WhatsApp üzerinden sipariş vermeye davet et.

YALNIZCA aşağıdaki alanlara sahip geçerli bir JSON nesnesi döndür, başka hiçbir metin ekleme:
{
  "title": "60 karakteri geçmeyen başlık",
  "slug": "url-dostu-slug",
  "excerpt": "160 karakterlik özet",
  "content": "<h2>...</h2><p>...</p>",
  "meta_title": "SEO başlığı",
  "meta_description": "155 karakterlik meta açıklama",
  "meta_keywords": "virgülle, ayrılmış, anahtar, kelimeler"
}
"#;

pub fn build_prompt(keywords: &[String], context: Option<&str>) -> String {
    let mut prompt = String::from(PROMPT_TEMPLATE);
    prompt.push_str("\nAnahtar kelimeler: ");
    prompt.push_str(&keywords.join(", "));
    if let Some(ctx) = context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\nEk bağlam: ");
        prompt.push_str(ctx);
    }
    prompt.push('\n');
    prompt
}

/// Drop a surrounding ```json ... ``` fence if the model added one.
pub fn strip_code_fences(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let body = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    }
    .trim_start();
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    title: Option<String>,
    slug: Option<String>,
    excerpt: Option<String>,
    content: Option<String>,
    meta_title: Option<String>,
    meta_description: Option<String>,
    // models return either "a, b" or ["a", "b"]
    meta_keywords: Option<Value>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse the model's text into a draft, treating every field as untrusted.
pub fn parse_draft(text: &str) -> Result<BlogDraft, GenerateError> {
    let cleaned = strip_code_fences(text);
    let value: Value = serde_json::from_str(cleaned).map_err(|e| GenerateError::InvalidJson {
        reason: e.to_string(),
        raw: text.to_string(),
    })?;
    let raw: RawDraft =
        serde_json::from_value(value).map_err(|e| GenerateError::MalformedProviderResponse {
            reason: e.to_string(),
            raw: text.to_string(),
        })?;

    let title = non_blank(raw.title).ok_or_else(|| GenerateError::MalformedProviderResponse {
        reason: "draft has no title".into(),
        raw: text.to_string(),
    })?;
    let slug = non_blank(raw.slug)
        .map(|s| slugify(&s))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&title));
    let meta_keywords = match raw.meta_keywords {
        Some(Value::String(s)) => non_blank(Some(s)),
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            non_blank(Some(joined))
        }
        _ => None,
    };

    Ok(BlogDraft {
        title,
        slug,
        excerpt: non_blank(raw.excerpt),
        content: raw.content.unwrap_or_default(),
        meta_title: non_blank(raw.meta_title),
        meta_description: non_blank(raw.meta_description),
        meta_keywords,
    })
}

/* ------------------------ provider wire shapes ------------------------ */

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: String,
}

/// Pull `candidates[0].content.parts[0].text` out of a provider body.
pub fn extract_text(body: &str) -> Result<String, GenerateError> {
    let malformed = |reason: String| GenerateError::MalformedProviderResponse {
        reason,
        raw: body.to_string(),
    };
    let parsed: ProviderResponse =
        serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .ok_or_else(|| malformed("no candidate text".into()))
}

pub fn request_body(prompt: &str) -> Value {
    let safety: Vec<Value> = [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .iter()
    .map(|c| json!({ "category": c, "threshold": "BLOCK_MEDIUM_AND_ABOVE" }))
    .collect();

    json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": {
            "temperature": 0.7,
            "topK": 40,
            "topP": 0.95,
            "maxOutputTokens": 8192,
        },
        "safetySettings": safety,
    })
}

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(
        api_key: Option<String>,
        model: &str,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, GenerateError> {
        let http = Client::builder()
            .user_agent(concat!("kurye-web/", env!("CARGO_PKG_VERSION")))
            .gzip(true)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DraftProvider for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String, GenerateError> {
        let key = self.api_key.as_deref().ok_or(GenerateError::MissingApiKey)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let res = self
            .http
            .post(&url)
            .query(&[("key", key)])
            .json(&request_body(prompt))
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "provider rejected draft request");
            return Err(GenerateError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        extract_text(&body)
    }
}

#[derive(Clone)]
pub struct BlogDraftGenerator {
    provider: Arc<dyn DraftProvider>,
}

impl BlogDraftGenerator {
    pub fn new(provider: Arc<dyn DraftProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(
        &self,
        keywords: &[String],
        context: Option<&str>,
    ) -> Result<BlogDraft, GenerateError> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Err(GenerateError::NoKeywords);
        }
        let prompt = build_prompt(&keywords, context);
        let text = self.provider.complete(&prompt).await?;
        let draft = parse_draft(&text)?;
        info!(slug=%draft.slug, keywords = keywords.len(), "generated blog draft");
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```JSON {\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn parses_single_line_fence() {
        let draft = parse_draft("```json{\"title\":\"Kadıköy\"}```").unwrap();
        assert_eq!(draft.title, "Kadıköy");
        assert_eq!(draft.slug, "kadikoy");
    }

    #[test]
    fn parses_fenced_draft() {
        let text = "```json\n{\"title\":\"Kadıköy Moto Kurye\",\"excerpt\":\"Hızlı\",\
                    \"content\":\"<p>x</p>\",\"meta_keywords\":[\"kurye\",\"kadıköy\"]}\n```";
        let draft = parse_draft(text).unwrap();
        assert_eq!(draft.title, "Kadıköy Moto Kurye");
        assert_eq!(draft.slug, "kadikoy-moto-kurye");
        assert_eq!(draft.meta_keywords.as_deref(), Some("kurye, kadıköy"));
        assert_eq!(draft.meta_title, None);
    }

    #[test]
    fn provided_slug_is_normalized() {
        let draft = parse_draft(r#"{"title":"T","slug":"Beşiktaş Kurye!"}"#).unwrap();
        assert_eq!(draft.slug, "besiktas-kurye");
    }

    #[test]
    fn non_json_text_keeps_raw() {
        let err = parse_draft("Üzgünüm, bunu yapamam.").unwrap_err();
        match err {
            GenerateError::InvalidJson { raw, .. } => assert_eq!(raw, "Üzgünüm, bunu yapamam."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_title_is_malformed() {
        let err = parse_draft(r#"{"content":"<p>x</p>"}"#).unwrap_err();
        assert!(matches!(err, GenerateError::MalformedProviderResponse { .. }));
        let err = parse_draft(r#"[1, 2]"#).unwrap_err();
        assert!(matches!(err, GenerateError::MalformedProviderResponse { .. }));
    }

    #[test]
    fn extracts_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"hello"}],"role":"model"}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "hello");

        let err = extract_text(r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, GenerateError::MalformedProviderResponse { .. }));
        let err = extract_text(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#).unwrap_err();
        assert_eq!(err.raw(), Some(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#));
    }

    #[test]
    fn prompt_carries_keywords_and_context() {
        let p = build_prompt(&["moto kurye".into(), "şişli".into()], Some(" acil teslimat "));
        assert!(p.contains("Anahtar kelimeler: moto kurye, şişli"));
        assert!(p.contains("Ek bağlam: acil teslimat"));
        assert!(!build_prompt(&["a".into()], Some("  ")).contains("Ek bağlam"));
    }

    #[test]
    fn request_body_shape() {
        let body = request_body("hi");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let client = GeminiClient::new(None, DEFAULT_MODEL, DEFAULT_BASE_URL, Duration::from_secs(1))
            .unwrap();
        let err = client.complete("x").await.unwrap_err();
        assert!(matches!(err, GenerateError::MissingApiKey));
    }

    struct Canned(&'static str);

    #[async_trait]
    impl DraftProvider for Canned {
        async fn complete(&self, _prompt: &str) -> Result<String, GenerateError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn blank_keywords_are_rejected() {
        let generator = BlogDraftGenerator::new(Arc::new(Canned("{}")));
        let err = generator.generate(&["  ".into()], None).await.unwrap_err();
        assert!(matches!(err, GenerateError::NoKeywords));
    }
}
