//! Web-backed entity lookup with a preset-fact fallback

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::config::LookupConfig;
use crate::error::{Error, Result};

use super::lookup::LookupProvider;

/// Curated facts for entities that rarely change; serves as a fallback when
/// the encyclopedia is unreachable
const PRESET_FACTS: &[(&str, &str)] = &[
    (
        "星展银行",
        "星展银行（DBS Bank）是新加坡最大的商业银行，总部位于新加坡，在中国多个城市设有分行，提供企业贷款、贸易融资和个人银行业务。",
    ),
    (
        "渣打银行",
        "渣打银行（Standard Chartered）是一家总部位于伦敦的跨国银行，在中国提供个人信贷、企业融资和跨境金融服务。",
    ),
    (
        "花旗银行",
        "花旗银行（Citibank）是美国花旗集团旗下的商业银行，在中国主要城市开展个人贷款、信用卡和企业金融业务。",
    ),
    (
        "汇丰银行",
        "汇丰银行（HSBC）是一家总部位于伦敦的国际性银行，在中国提供住房贷款、财富管理和企业银行服务。",
    ),
];

/// Fetches encyclopedia text about an entity
pub struct WebLookup {
    client: Client,
    config: LookupConfig,
}

impl WebLookup {
    pub fn new(config: &LookupConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config: config.clone(),
        }
    }

    fn preset_fact(entity: &str) -> Option<&'static str> {
        PRESET_FACTS
            .iter()
            .find(|(name, _)| *name == entity)
            .map(|(_, fact)| *fact)
    }

    /// Pull paragraph text out of an encyclopedia article page
    fn extract_paragraphs(html: &str, max_chars: usize) -> String {
        let document = scraper::Html::parse_document(html);
        let selector = scraper::Selector::parse("p").unwrap();

        let mut content = String::new();
        for paragraph in document.select(&selector) {
            let text: String = paragraph.text().collect::<Vec<_>>().join("");
            let trimmed = text.trim();
            if trimmed.chars().count() < 20 {
                continue;
            }
            content.push_str(trimmed);
            content.push('\n');
            if content.chars().count() >= max_chars {
                break;
            }
        }
        content.chars().take(max_chars).collect()
    }

    async fn fetch_article(&self, entity: &str) -> Result<String> {
        let url = format!(
            "https://zh.wikipedia.org/wiki/{}",
            urlencode(entity)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::lookup(format!("request for '{}' failed: {}", entity, e)))?;

        if !response.status().is_success() {
            return Err(Error::lookup(format!(
                "article for '{}' returned HTTP {}",
                entity,
                response.status()
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|e| Error::lookup(e.to_string()))?;

        let content = Self::extract_paragraphs(&html, self.config.max_snippet_chars);
        if content.trim().is_empty() {
            return Err(Error::lookup(format!(
                "article for '{}' had no usable text",
                entity
            )));
        }
        Ok(content)
    }
}

#[async_trait]
impl LookupProvider for WebLookup {
    async fn lookup(&self, entity: &str) -> Result<String> {
        match self.fetch_article(entity).await {
            Ok(text) => Ok(text),
            Err(e) => {
                if let Some(fact) = Self::preset_fact(entity) {
                    tracing::info!("web lookup for '{}' failed ({}), using preset fact", entity, e);
                    Ok(fact.to_string())
                } else {
                    Err(e)
                }
            }
        }
    }

    fn name(&self) -> &str {
        "web-lookup"
    }
}

/// Percent-encode a path segment
fn urlencode(s: &str) -> String {
    let mut out = String::new();
    for byte in s.as_bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(*byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encodes_chinese() {
        assert_eq!(urlencode("DBS"), "DBS");
        assert_eq!(urlencode("星"), "%E6%98%9F");
    }

    #[test]
    fn extracts_long_paragraphs_only() {
        let html = "<html><body><p>短</p><p>星展银行是新加坡最大的商业银行，总部位于新加坡市中心。</p></body></html>";
        let text = WebLookup::extract_paragraphs(html, 1000);
        assert!(text.contains("星展银行"));
        assert!(!text.contains("短"));
    }

    #[test]
    fn preset_fact_available_for_seeded_banks() {
        assert!(WebLookup::preset_fact("花旗银行").is_some());
        assert!(WebLookup::preset_fact("不存在银行").is_none());
    }
}
