//! 沙箱工作区
//!
//! LocalWorkspace 绑定 base 目录，每个任务使用 `base/<task_id>/` 子树；所有路径经 resolve 校验，
//! 解析结果必须严格位于 base 之下（禁止 ../ 逃逸），绝对路径视为相对任务根目录。

use std::path::{Component, Path, PathBuf};

use crate::core::AgentError;

/// 视为文本的扩展名（read_text 对其做规范化）
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "csv", "json", "toml", "yaml", "yml", "xml", "html", "htm", "rs", "py", "js",
    "ts", "log",
];
/// 内容嗅探读取的前缀字节数
const SNIFF_BYTES: usize = 8192;
/// 单次解析最多跟随的符号链接数
const MAX_SYMLINK_HOPS: usize = 40;

/// 工作区接口：按任务隔离的文件读写
pub trait Workspace: Send + Sync {
    /// 读取原始字节
    fn read(&self, task_id: &str, path: &str) -> Result<Vec<u8>, AgentError>;

    /// 读取并规范化文本：文本类文件返回 UTF-8 文本字节（HTML 提取为纯文本），二进制原样返回
    fn read_text(&self, task_id: &str, path: &str) -> Result<Vec<u8>, AgentError>;

    /// 写入（覆盖），父目录不存在时自动创建
    fn write(&self, task_id: &str, path: &str, data: &[u8]) -> Result<(), AgentError>;

    /// 删除文件；directory 为 true 时删除目录，recursive 为 true 时连同内容删除
    fn delete(
        &self,
        task_id: &str,
        path: &str,
        directory: bool,
        recursive: bool,
    ) -> Result<(), AgentError>;

    fn exists(&self, task_id: &str, path: &str) -> Result<bool, AgentError>;

    /// 列出目录项（相对任务根目录，已排序）；目录不存在时返回 NotFound 错误
    fn list(&self, task_id: &str, path: &str) -> Result<Vec<String>, AgentError>;
}

/// 本地磁盘工作区
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    base_path: PathBuf,
}

impl LocalWorkspace {
    /// 创建工作区；base 不存在时创建并取规范路径
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let base = base_path.as_ref();
        std::fs::create_dir_all(base)?;
        Ok(Self {
            base_path: base.canonicalize()?,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn task_root(&self, task_id: &str) -> Result<PathBuf, AgentError> {
        normalize(&self.base_path.join(task_id))
    }

    /// 解析任务内路径并校验不逃逸出 base
    pub fn resolve(&self, task_id: &str, path: &str) -> Result<PathBuf, AgentError> {
        let relative = path.trim_start_matches('/');
        let resolved = normalize(&self.base_path.join(task_id).join(relative))?;
        if resolved.starts_with(&self.base_path) && resolved != self.base_path {
            Ok(resolved)
        } else {
            Err(AgentError::PathTraversal(resolved.display().to_string()))
        }
    }
}

/// 逐段解析路径：`.` 跳过，`..` 回退，符号链接（包括悬空链接）替换为其目标后继续解析
///
/// 结果不含任何符号链接，目标不存在的部分按字面拼接。
fn normalize(path: &Path) -> Result<PathBuf, AgentError> {
    let mut pending: Vec<PathBuf> = path
        .components()
        .rev()
        .map(|c| PathBuf::from(c.as_os_str()))
        .collect();
    let mut resolved = PathBuf::new();
    let mut hops = 0;

    while let Some(piece) = pending.pop() {
        let Some(comp) = piece.components().next() else {
            continue;
        };
        match comp {
            Component::Prefix(_) | Component::RootDir => resolved.push(comp.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
            }
            Component::Normal(name) => {
                let candidate = resolved.join(name);
                match std::fs::symlink_metadata(&candidate) {
                    Ok(meta) if meta.file_type().is_symlink() => {
                        hops += 1;
                        if hops > MAX_SYMLINK_HOPS {
                            return Err(AgentError::PathTraversal(format!(
                                "too many levels of symbolic links: {}",
                                candidate.display()
                            )));
                        }
                        // 相对目标以链接所在目录为起点，绝对目标由 RootDir 重置
                        let target = std::fs::read_link(&candidate)?;
                        pending.extend(
                            target
                                .components()
                                .rev()
                                .map(|c| PathBuf::from(c.as_os_str())),
                        );
                    }
                    _ => resolved = candidate,
                }
            }
        }
    }
    Ok(resolved)
}

fn has_text_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_html(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()),
        Some(ref e) if e == "html" || e == "htm"
    )
}

/// 嗅探：前 SNIFF_BYTES 字节无 NUL 且整体为合法 UTF-8
fn looks_like_text(data: &[u8]) -> bool {
    let head = &data[..data.len().min(SNIFF_BYTES)];
    !head.contains(&0) && std::str::from_utf8(data).is_ok()
}

fn normalize_text(text: &str) -> String {
    text.strip_prefix('\u{FEFF}')
        .unwrap_or(text)
        .replace("\r\n", "\n")
}

impl Workspace for LocalWorkspace {
    fn read(&self, task_id: &str, path: &str) -> Result<Vec<u8>, AgentError> {
        let resolved = self.resolve(task_id, path)?;
        Ok(std::fs::read(&resolved)?)
    }

    fn read_text(&self, task_id: &str, path: &str) -> Result<Vec<u8>, AgentError> {
        let resolved = self.resolve(task_id, path)?;
        let data = std::fs::read(&resolved)?;
        if !has_text_extension(&resolved) && !looks_like_text(&data) {
            return Ok(data);
        }
        let text = String::from_utf8_lossy(&data);
        let text = normalize_text(&text);
        if is_html(&resolved) {
            if let Ok(plain) = html2text::from_read(text.as_bytes(), 120) {
                return Ok(plain.into_bytes());
            }
        }
        Ok(text.into_bytes())
    }

    fn write(&self, task_id: &str, path: &str, data: &[u8]) -> Result<(), AgentError> {
        let resolved = self.resolve(task_id, path)?;
        if let Some(parent) = resolved.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&resolved, data)?;
        Ok(())
    }

    fn delete(
        &self,
        task_id: &str,
        path: &str,
        directory: bool,
        recursive: bool,
    ) -> Result<(), AgentError> {
        let resolved = self.resolve(task_id, path)?;
        match (directory, recursive) {
            (true, true) => std::fs::remove_dir_all(&resolved)?,
            (true, false) => std::fs::remove_dir(&resolved)?,
            (false, _) => std::fs::remove_file(&resolved)?,
        }
        Ok(())
    }

    fn exists(&self, task_id: &str, path: &str) -> Result<bool, AgentError> {
        Ok(self.resolve(task_id, path)?.exists())
    }

    fn list(&self, task_id: &str, path: &str) -> Result<Vec<String>, AgentError> {
        let dir = self.resolve(task_id, path)?;
        if !dir.exists() {
            return Err(AgentError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Directory or file not found: {}", dir.display()),
            )));
        }
        let root = self.task_root(task_id)?;
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let p = entry?.path();
            let rel = p.strip_prefix(&root).unwrap_or(&p);
            entries.push(rel.to_string_lossy().to_string());
        }
        entries.sort();
        Ok(entries)
    }
}
