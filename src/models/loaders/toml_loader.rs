use crate::models::ui_map::UiMap;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载界面定位表
pub async fn load_ui_map(toml_file_path: &Path) -> Result<UiMap> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取界面定位文件: {}", toml_file_path.display()))?;

    let ui_map: UiMap = toml::from_str(&content)
        .with_context(|| format!("无法解析界面定位文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "已加载界面定位: {}",
        toml_file_path.file_name().unwrap_or_default().to_string_lossy()
    );

    Ok(ui_map)
}
