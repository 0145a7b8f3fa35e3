//! fetch_financial_data：按股票代码获取财务指标
//!
//! 两个数据源合并为「期末日期 -> 数值」映射：
//! 1. Nasdaq Data Link `SHARADAR/SF1`（dimension=MRY 年度汇总），仅在 metric=revenue 且 yearly 时查询
//! 2. Alpha Vantage `INCOME_STATEMENT`（annualReports），只补充 1 中没有的日期
//!
//! 缺数据、格式不符、提供方报错均以 `{"error": "..."}` 结构返回，不抛错。

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::abilities::registry::str_arg;
use crate::abilities::web::build_client;
use crate::abilities::{Ability, AbilityContext, AbilityOutput, AbilityParameter, ParameterType};
use crate::config::FinanceSection;
use crate::core::AgentError;

/// 游标分页最多跟随的页数
const MAX_PAGES: usize = 20;

type Series = BTreeMap<String, Value>;

fn error_value(msg: impl Into<String>) -> Value {
    let msg = msg.into();
    tracing::error!(error = %msg, "fetch_financial_data");
    json!({ "error": msg })
}

/// 解析一页 SHARADAR 数据表，返回 (期末日期, revenue) 行与下一页游标
///
/// 缺少 `calendardate` 或 `revenue` 列视为格式错误。
pub fn parse_sharadar_page(page: &Value) -> Result<(Vec<(String, Value)>, Option<String>), String> {
    if let Some(err) = page.get("quandl_error") {
        let msg = err
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown provider error");
        return Err(msg.to_string());
    }
    let table = page
        .get("datatable")
        .ok_or_else(|| "missing 'datatable' in response".to_string())?;
    let columns: Vec<&str> = table
        .get("columns")
        .and_then(|c| c.as_array())
        .map(|cols| {
            cols.iter()
                .map(|c| c.get("name").and_then(|n| n.as_str()).unwrap_or(""))
                .collect()
        })
        .unwrap_or_default();
    let rows = table
        .get("data")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();
    let next_cursor = page
        .get("meta")
        .and_then(|m| m.get("next_cursor_id"))
        .and_then(|c| c.as_str())
        .map(String::from);

    if rows.is_empty() {
        return Ok((Vec::new(), next_cursor));
    }
    let date_idx = columns
        .iter()
        .position(|c| *c == "calendardate")
        .ok_or_else(|| "'calendardate' field not found".to_string())?;
    let revenue_idx = columns
        .iter()
        .position(|c| *c == "revenue")
        .ok_or_else(|| "'revenue' field not found".to_string())?;

    let parsed = rows
        .iter()
        .filter_map(|row| {
            let date = row.get(date_idx)?.as_str()?;
            let date = date.split(' ').next().unwrap_or(date).to_string();
            Some((date, row.get(revenue_idx).cloned().unwrap_or(Value::Null)))
        })
        .collect();
    Ok((parsed, next_cursor))
}

/// 将 Alpha Vantage INCOME_STATEMENT 响应并入 combined；已有日期不覆盖
///
/// metric 不是 revenue 时不合并任何数据。
pub fn merge_alpha_vantage(combined: &mut Series, data: &Value, metric: &str) -> Result<(), String> {
    if let Some(msg) = data.get("Error Message").and_then(|m| m.as_str()) {
        return Err(msg.to_string());
    }
    if metric != "revenue" {
        return Ok(());
    }
    let reports = data
        .get("annualReports")
        .and_then(|r| r.as_array())
        .ok_or_else(|| "Unexpected data format from Alpha Vantage.".to_string())?;
    for report in reports {
        let Some(date) = report.get("fiscalDateEnding").and_then(|d| d.as_str()) else {
            continue;
        };
        let Some(revenue) = report
            .get("totalRevenue")
            .and_then(|r| r.as_str())
            .and_then(|r| r.parse::<f64>().ok())
        else {
            continue;
        };
        combined
            .entry(date.to_string())
            .or_insert_with(|| json!(revenue));
    }
    Ok(())
}

pub struct FetchFinancialDataAbility {
    client: Client,
    cfg: FinanceSection,
}

impl FetchFinancialDataAbility {
    pub fn new(cfg: FinanceSection, timeout_secs: u64) -> Self {
        Self {
            client: build_client(timeout_secs),
            cfg,
        }
    }

    async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, String> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        resp.json::<Value>().await.map_err(|e| e.to_string())
    }

    /// 拉取 SHARADAR 全部分页
    async fn fetch_sharadar(&self, symbol: &str) -> Result<Vec<(String, Value)>, String> {
        let mut rows = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let mut query = vec![
                ("ticker", symbol.to_string()),
                ("dimension", "MRY".to_string()),
            ];
            if let Some(key) = self.cfg.nasdaq_key() {
                query.push(("api_key", key));
            }
            if let Some(c) = &cursor {
                query.push(("qopts.cursor_id", c.clone()));
            }
            let page = self.get_json(&self.cfg.nasdaq_url, &query).await?;
            let (page_rows, next) = parse_sharadar_page(&page)?;
            rows.extend(page_rows);
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }
        Ok(rows)
    }

    async fn fetch(&self, symbol: &str, metric: &str, yearly: bool) -> Value {
        let mut combined = Series::new();

        if metric == "revenue" && yearly {
            match self.fetch_sharadar(symbol).await {
                Ok(rows) if rows.is_empty() => {
                    return error_value(format!(
                        "No data found for the given symbol {symbol} on Nasdaq Data Link."
                    ));
                }
                Ok(rows) => combined.extend(rows),
                Err(e) => {
                    return error_value(format!(
                        "Error fetching financial data from Nasdaq Data Link: {e}"
                    ));
                }
            }
        }

        let mut query = vec![
            ("function", "INCOME_STATEMENT".to_string()),
            ("symbol", symbol.to_string()),
        ];
        if let Some(key) = self.cfg.alpha_vantage_key() {
            query.push(("apikey", key));
        }
        let data = match self.get_json(&self.cfg.alpha_vantage_url, &query).await {
            Ok(d) => d,
            Err(e) => return error_value(format!("Error fetching financial data: {e}")),
        };
        if let Err(e) = merge_alpha_vantage(&mut combined, &data, metric) {
            return error_value(e);
        }

        Value::Object(combined.into_iter().collect())
    }
}

#[async_trait]
impl Ability for FetchFinancialDataAbility {
    fn name(&self) -> &str {
        "fetch_financial_data"
    }

    fn description(&self) -> &str {
        "Fetch all available financial data for a given company"
    }

    fn parameters(&self) -> Vec<AbilityParameter> {
        vec![
            AbilityParameter::required("symbol", ParameterType::String, "Stock ticker symbol"),
            AbilityParameter::required(
                "metric",
                ParameterType::String,
                "Financial metric to retrieve (e.g., revenue)",
            ),
            AbilityParameter::optional(
                "yearly",
                ParameterType::Boolean,
                "If true, retrieve aggregated yearly data. If false, retrieve monthly data.",
                json!(true),
            ),
        ]
    }

    fn output_type(&self) -> &str {
        "json"
    }

    async fn execute(
        &self,
        ctx: &AbilityContext,
        args: Map<String, Value>,
    ) -> Result<AbilityOutput, AgentError> {
        let symbol = str_arg(&args, "symbol");
        let metric = str_arg(&args, "metric");
        let yearly = args.get("yearly").and_then(|v| v.as_bool()).unwrap_or(true);
        tracing::info!(task_id = %ctx.task_id, symbol = %symbol, metric = %metric, yearly, "fetch_financial_data");
        Ok(AbilityOutput::Json(self.fetch(symbol, metric, yearly).await))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::LocalWorkspace;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sharadar_page(rows: Value, cursor: Value) -> Value {
        json!({
            "datatable": {
                "data": rows,
                "columns": [
                    {"name": "ticker", "type": "String"},
                    {"name": "calendardate", "type": "Date"},
                    {"name": "revenue", "type": "double"}
                ]
            },
            "meta": {"next_cursor_id": cursor}
        })
    }

    fn income_statement() -> Value {
        json!({
            "symbol": "ACME",
            "annualReports": [
                {"fiscalDateEnding": "2022-12-31", "totalRevenue": "999"},
                {"fiscalDateEnding": "2021-12-31", "totalRevenue": "500"},
                {"fiscalDateEnding": "2020-12-31", "totalRevenue": "None"}
            ]
        })
    }

    #[test]
    fn test_parse_sharadar_page() {
        let page = sharadar_page(
            json!([["ACME", "2022-12-31", 1000.0], ["ACME", "2021-12-31 00:00:00", 800.0]]),
            json!("abc"),
        );
        let (rows, next) = parse_sharadar_page(&page).unwrap();
        assert_eq!(
            rows,
            vec![
                ("2022-12-31".to_string(), json!(1000.0)),
                ("2021-12-31".to_string(), json!(800.0))
            ]
        );
        assert_eq!(next.as_deref(), Some("abc"));
    }

    #[test]
    fn test_parse_sharadar_missing_date_column() {
        let page = json!({
            "datatable": {"data": [["ACME", 1.0]], "columns": [{"name": "ticker"}, {"name": "revenue"}]},
            "meta": {"next_cursor_id": null}
        });
        let err = parse_sharadar_page(&page).unwrap_err();
        assert!(err.contains("calendardate"));
    }

    #[test]
    fn test_parse_sharadar_provider_error() {
        let page = json!({"quandl_error": {"code": "QEPx02", "message": "You do not have permission"}});
        assert_eq!(parse_sharadar_page(&page).unwrap_err(), "You do not have permission");
    }

    #[test]
    fn test_merge_alpha_vantage_prefers_existing() {
        let mut combined = Series::new();
        combined.insert("2022-12-31".into(), json!(1000.0));
        merge_alpha_vantage(&mut combined, &income_statement(), "revenue").unwrap();
        assert_eq!(combined["2022-12-31"], json!(1000.0));
        assert_eq!(combined["2021-12-31"], json!(500.0));
        assert!(!combined.contains_key("2020-12-31"));
    }

    #[test]
    fn test_merge_alpha_vantage_errors() {
        let mut combined = Series::new();
        let err = merge_alpha_vantage(&mut combined, &json!({"Error Message": "Invalid API call"}), "revenue")
            .unwrap_err();
        assert_eq!(err, "Invalid API call");
        let err = merge_alpha_vantage(&mut combined, &json!({"Note": "rate limited"}), "revenue").unwrap_err();
        assert!(err.contains("Unexpected data format"));
        // 非 revenue 指标不合并
        merge_alpha_vantage(&mut combined, &income_statement(), "ebitda").unwrap();
        assert!(combined.is_empty());
    }

    fn ability_for(base: &str) -> FetchFinancialDataAbility {
        let cfg = FinanceSection {
            alpha_vantage_url: format!("{base}/query"),
            alpha_vantage_api_key: Some("av-key".into()),
            nasdaq_url: format!("{base}/sf1.json"),
            nasdaq_api_key: Some("ndl-key".into()),
        };
        FetchFinancialDataAbility::new(cfg, 5)
    }

    fn ctx(dir: &tempfile::TempDir) -> AbilityContext {
        AbilityContext {
            task_id: "t".into(),
            workspace: Arc::new(LocalWorkspace::new(dir.path()).unwrap()),
        }
    }

    fn revenue_args(symbol: &str, yearly: bool) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("symbol".into(), json!(symbol));
        args.insert("metric".into(), json!("revenue"));
        args.insert("yearly".into(), json!(yearly));
        args
    }

    #[tokio::test]
    async fn test_fetch_merges_both_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sf1.json"))
            .and(query_param("ticker", "ACME"))
            .and(query_param("dimension", "MRY"))
            .and(query_param("api_key", "ndl-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sharadar_page(
                json!([["ACME", "2022-12-31", 1000.0]]),
                Value::Null,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("function", "INCOME_STATEMENT"))
            .and(query_param("symbol", "ACME"))
            .and(query_param("apikey", "av-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(income_statement()))
            .expect(1)
            .mount(&server)
            .await;

        let ability = ability_for(&server.uri());
        let out = ability
            .execute(&ctx(&dir), revenue_args("ACME", true))
            .await
            .unwrap();
        assert_eq!(
            out,
            AbilityOutput::Json(json!({"2021-12-31": 500.0, "2022-12-31": 1000.0}))
        );
    }

    #[tokio::test]
    async fn test_fetch_follows_cursor_pages() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sf1.json"))
            .and(query_param_is_missing("qopts.cursor_id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sharadar_page(
                json!([["ACME", "2022-12-31", 1000.0]]),
                json!("page2"),
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sf1.json"))
            .and(query_param("qopts.cursor_id", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sharadar_page(
                json!([["ACME", "2019-12-31", 300.0]]),
                Value::Null,
            )))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"annualReports": []})))
            .mount(&server)
            .await;

        let ability = ability_for(&server.uri());
        let out = ability
            .execute(&ctx(&dir), revenue_args("ACME", true))
            .await
            .unwrap();
        assert_eq!(
            out,
            AbilityOutput::Json(json!({"2019-12-31": 300.0, "2022-12-31": 1000.0}))
        );
    }

    #[tokio::test]
    async fn test_fetch_reports_missing_data_as_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sf1.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(sharadar_page(json!([]), Value::Null)),
            )
            .mount(&server)
            .await;
        let ability = ability_for(&server.uri());

        let AbilityOutput::Json(v) = ability
            .execute(&ctx(&dir), revenue_args("ZZZZ", true))
            .await
            .unwrap()
        else {
            panic!("expected json");
        };
        assert!(v["error"].as_str().unwrap().contains("No data found"));
    }

    #[tokio::test]
    async fn test_fetch_reports_malformed_response_as_value() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;
        let ability = ability_for(&server.uri());

        let AbilityOutput::Json(v) = ability
            .execute(&ctx(&dir), revenue_args("ACME", false))
            .await
            .unwrap()
        else {
            panic!("expected json");
        };
        assert!(v["error"].as_str().unwrap().starts_with("Error fetching financial data"));
    }

    #[tokio::test]
    async fn test_fetch_skips_first_source_when_not_yearly() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sf1.json"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(income_statement()))
            .expect(1)
            .mount(&server)
            .await;
        let ability = ability_for(&server.uri());

        let out = ability
            .execute(&ctx(&dir), revenue_args("ACME", false))
            .await
            .unwrap();
        assert_eq!(
            out,
            AbilityOutput::Json(json!({"2021-12-31": 500.0, "2022-12-31": 999.0}))
        );
    }
}
