//! 网页能力：fetch_and_search（抓取并按关键词筛选行）、fetch_webpage（返回原始响应体）
//!
//! fetch_and_search 吞掉所有请求错误并返回空串；fetch_webpage 将传输错误原样抛给调用方。
//! 对 HTML 响应使用 html2text 提取可读文本。

use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde_json::{Map, Value};

use crate::abilities::registry::str_arg;
use crate::abilities::{Ability, AbilityContext, AbilityOutput, AbilityParameter, ParameterType};
use crate::core::AgentError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
/// html2text 排版宽度；取大值避免长行被折断导致关键词跨行
const TEXT_WIDTH: usize = 10_000;

/// 带超时、浏览器 UA 与常用请求头的 HTTP 客户端
pub fn build_client(timeout_secs: u64) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    match Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "HTTP client build failed, falling back to default client without timeout");
            Client::new()
        }
    }
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.starts_with("<html")
        || s.starts_with("<HTML")
        || (s.len() > 20
            && s.contains('<')
            && (s.contains("</") || s.contains("<meta") || s.contains("<head") || s.contains("<title")))
}

/// 将响应体转为纯文本：去 BOM，HTML 交给 html2text
pub fn body_to_text(body: &str) -> String {
    let body = body.strip_prefix('\u{FEFF}').unwrap_or(body);
    if !looks_like_html(body) {
        return body.to_string();
    }
    match from_read(body.as_bytes(), TEXT_WIDTH) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "html2text failed, using raw body");
            body.to_string()
        }
    }
}

/// 保留包含 term 的行（忽略大小写），每行去首尾空白后以换行拼接
pub fn filter_lines(text: &str, term: &str) -> String {
    let term = term.to_lowercase();
    text.lines()
        .filter(|line| line.to_lowercase().contains(&term))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

fn url_param() -> AbilityParameter {
    AbilityParameter::required("url", ParameterType::String, "Webpage URL")
}

/// 抓取网页并返回与关键词相关的行
pub struct FetchAndSearchAbility {
    client: Client,
}

impl FetchAndSearchAbility {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: build_client(timeout_secs),
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, reqwest::Error> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = resp.text().await?;
        Ok(body_to_text(&body))
    }
}

#[async_trait]
impl Ability for FetchAndSearchAbility {
    fn name(&self) -> &str {
        "fetch_and_search"
    }

    fn description(&self) -> &str {
        "Fetch a webpage and return content relevant to a specified search term as a single string"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![
            url_param(),
            AbilityParameter::required(
                "search_term",
                ParameterType::String,
                "Term to search for within the fetched webpage",
            ),
        ]
    }

    async fn execute(
        &self,
        _ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let url = str_arg(&args, "url").trim();
        let term = str_arg(&args, "search_term");
        tracing::info!(url = %url, term = %term, "fetch_and_search");
        match self.fetch_text(url).await {
            Ok(text) => Ok(AbilityOutput::Text(filter_lines(&text, term))),
            Err(e) => {
                tracing::error!(url = %url, error = %e, "Failed to fetch or parse page");
                Ok(AbilityOutput::Text(String::new()))
            }
        }
    }
}

/// 抓取网页并原样返回响应体
pub struct FetchWebpageAbility {
    client: Client,
}

impl FetchWebpageAbility {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: build_client(timeout_secs),
        }
    }
}

#[async_trait]
impl Ability for FetchWebpageAbility {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Retrieve the content of a webpage"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![url_param()]
    }

    async fn execute(
        &self,
        _ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let url = str_arg(&args, "url").trim();
        tracing::info!(url = %url, "fetch_webpage");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AgentError::ability_failed(self.name(), format!("Request failed: {e}")))?;
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::ability_failed(self.name(), format!("Read body: {e}")))?;
        Ok(AbilityOutput::Text(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::LocalWorkspace;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = "<html><head><title>Report</title></head><body>\
        <p>Total Revenue grew 10%</p><p>Headcount was flat</p><p>revenue guidance raised</p>\
        </body></html>";

    fn ctx(dir: &tempfile::TempDir) -> AbilityContext {
        AbilityContext {
            task_id: "t".into(),
            workspace: Arc::new(LocalWorkspace::new(dir.path()).unwrap()),
        }
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    async fn html_server(route: &str, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html"))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_filter_lines_case_insensitive() {
        let text = "Alpha\n  beta REVENUE line  \ngamma\nrevenue";
        assert_eq!(filter_lines(text, "Revenue"), "beta REVENUE line\nrevenue");
        assert_eq!(filter_lines(text, "delta"), "");
    }

    #[test]
    fn test_body_to_text_passes_plain_text() {
        assert_eq!(body_to_text("\u{FEFF}plain body"), "plain body");
        let text = body_to_text(PAGE);
        assert!(text.contains("Total Revenue grew 10%"));
        assert!(!text.contains("<p>"));
    }

    #[tokio::test]
    async fn test_fetch_and_search_filters_page() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = html_server("/report", PAGE).await;
        let ability = FetchAndSearchAbility::new(5);
        let out = ability
            .execute(
                &ctx(&dir),
                args(json!({"url": format!("{}/report", server.uri()), "search_term": "revenue"})),
            )
            .await
            .unwrap();
        let AbilityOutput::Text(text) = out else { panic!("expected text") };
        assert!(text.contains("Total Revenue grew 10%"));
        assert!(text.contains("revenue guidance raised"));
        assert!(!text.contains("Headcount"));
    }

    #[tokio::test]
    async fn test_fetch_and_search_no_match_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = html_server("/", "<html><body><p>nothing here</p></body></html>").await;
        let ability = FetchAndSearchAbility::new(5);
        let out = ability
            .execute(
                &ctx(&dir),
                args(json!({"url": format!("{}/", server.uri()), "search_term": "revenue"})),
            )
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text(String::new()));
    }

    #[tokio::test]
    async fn test_fetch_and_search_swallows_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500).set_body_string("found revenue in error page"))
            .mount(&server)
            .await;
        let ability = FetchAndSearchAbility::new(5);

        // 未挂载路径返回 404
        let out = ability
            .execute(
                &ctx(&dir),
                args(json!({"url": format!("{}/missing", server.uri()), "search_term": "found"})),
            )
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text(String::new()));

        let out = ability
            .execute(
                &ctx(&dir),
                args(json!({"url": format!("{}/broken", server.uri()), "search_term": "revenue"})),
            )
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text(String::new()));

        let out = ability
            .execute(&ctx(&dir), args(json!({"url": "not a url", "search_term": "x"})))
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text(String::new()));
    }

    #[tokio::test]
    async fn test_fetch_webpage_returns_raw_body() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = html_server("/raw", PAGE).await;
        let ability = FetchWebpageAbility::new(5);
        let out = ability
            .execute(&ctx(&dir), args(json!({"url": format!("{}/raw", server.uri())})))
            .await
            .unwrap();
        assert_eq!(out, AbilityOutput::Text(PAGE.to_string()));
    }

    #[tokio::test]
    async fn test_fetch_webpage_propagates_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let ability = FetchWebpageAbility::new(5);
        let err = ability
            .execute(&ctx(&dir), args(json!({"url": "not a url"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::AbilityFailed { .. }));
    }
}
