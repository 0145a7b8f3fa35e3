//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORGE__*` 覆盖（双下划线表示嵌套，如 `FORGE__LLM__MODEL=gpt-4o`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::AgentError;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub abilities: AbilitiesSection,
    pub store: StoreSection,
}

/// [app] 段：应用名、工作区根目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工作区根目录，每个任务在其下有独立子目录
    pub workspace_root: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: PathBuf::from("workspace"),
        }
    }
}

/// [llm] 段：后端与模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai（任意 OpenAI 兼容端点）/ mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    pub api_key: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            base_url: None,
            api_key: None,
        }
    }
}

/// [agent] 段：控制循环参数与 prompt 模板名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 对话少于该条数时重新播种 system + task prompt
    pub seed_threshold: usize,
    /// 对话达到该条数时强制结束任务
    pub max_messages: usize,
    pub system_template: String,
    pub task_template: String,
    /// 覆盖内置模板的目录（<dir>/<model>/<name>.txt）
    pub prompts_dir: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            seed_threshold: 2,
            max_messages: 5,
            system_template: "system-format".to_string(),
            task_template: "task-step".to_string(),
            prompts_dir: None,
        }
    }
}

/// [abilities] 段：网页抓取超时与金融数据源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AbilitiesSection {
    pub fetch_timeout_secs: u64,
    pub finance: FinanceSection,
}

impl Default for AbilitiesSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            finance: FinanceSection::default(),
        }
    }
}

/// [abilities.finance] 段：Alpha Vantage 与 Nasdaq Data Link 端点及密钥
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FinanceSection {
    pub alpha_vantage_url: String,
    /// 未设置时读取 ALPHA_VANTAGE_API_KEY
    pub alpha_vantage_api_key: Option<String>,
    pub nasdaq_url: String,
    /// 未设置时读取 NASDAQ_DATA_LINK_API_KEY
    pub nasdaq_api_key: Option<String>,
}

impl Default for FinanceSection {
    fn default() -> Self {
        Self {
            alpha_vantage_url: "https://www.alphavantage.co/query".to_string(),
            alpha_vantage_api_key: None,
            nasdaq_url: "https://data.nasdaq.com/api/v3/datatables/SHARADAR/SF1.json".to_string(),
            nasdaq_api_key: None,
        }
    }
}

impl FinanceSection {
    pub fn alpha_vantage_key(&self) -> Option<String> {
        self.alpha_vantage_api_key
            .clone()
            .or_else(|| std::env::var("ALPHA_VANTAGE_API_KEY").ok())
    }

    pub fn nasdaq_key(&self) -> Option<String> {
        self.nasdaq_api_key
            .clone()
            .or_else(|| std::env::var("NASDAQ_DATA_LINK_API_KEY").ok())
    }
}

/// [store] 段：SQLite 文件路径（仅 async-sqlite feature 下生效）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StoreSection {
    pub sqlite_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 FORGE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORGE__*（双下划线表示嵌套键）
///
/// 解析失败或取值不合法时返回 `AgentError::Config`。
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, AgentError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORGE")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| AgentError::Config(e.to_string()))?;
    cfg.validate()?;
    Ok(cfg)
}

impl AppConfig {
    /// 校验循环参数：达到 max_messages 之前必须能完成播种，抓取超时不能为 0
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.max_messages <= self.agent.seed_threshold {
            return Err(AgentError::Config(format!(
                "agent.max_messages ({}) must be greater than agent.seed_threshold ({})",
                self.agent.max_messages, self.agent.seed_threshold
            )));
        }
        if self.abilities.fetch_timeout_secs == 0 {
            return Err(AgentError::Config(
                "abilities.fetch_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_loop_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.seed_threshold, 2);
        assert_eq!(cfg.agent.max_messages, 5);
        assert_eq!(cfg.llm.model, "gpt-3.5-turbo");
        assert_eq!(cfg.agent.system_template, "system-format");
        assert_eq!(cfg.agent.task_template, "task-step");
        assert_eq!(cfg.abilities.fetch_timeout_secs, 10);
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[agent]\nmax_messages = 9\n\n[llm]\nprovider = \"mock\"").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_messages, 9);
        assert_eq!(cfg.agent.seed_threshold, 2);
        assert_eq!(cfg.llm.provider, "mock");
    }

    #[test]
    fn test_invalid_loop_limits_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[agent]\nseed_threshold = 4\nmax_messages = 4\n").unwrap();
        assert!(matches!(load_config(Some(path)), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_malformed_value_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[agent]\nmax_messages = \"many\"\n").unwrap();
        assert!(matches!(load_config(Some(path)), Err(AgentError::Config(_))));
    }
}
