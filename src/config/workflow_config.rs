// ==========================================
// 首饰工厂订单流转系统 - 流转配置
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 工序流水线与派工策略
// 说明: 部门目录与跨部门派工策略在进程启动时加载,运行期只读
// ==========================================

use crate::domain::department::{Department, DepartmentCatalog};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 配置层错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置解析失败: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("配置校验失败: {0}")]
    ValidationError(String),
}

// ==========================================
// 跨部门派工策略 (Cross Department Policy)
// ==========================================
// 工人归属部门与流转记录部门不一致时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossDepartmentPolicy {
    /// 严格模式: 部门必须一致,任何不一致直接拒绝
    Strict,
    /// 管理员突破模式: 带授权人的突破派工放行,落审计并 warn 日志
    AdministrativeOverride,
}

impl Default for CrossDepartmentPolicy {
    fn default() -> Self {
        CrossDepartmentPolicy::AdministrativeOverride
    }
}

// ==========================================
// DepartmentSpec - 部门配置项
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentSpec {
    /// 部门标识
    pub id: String,

    /// 显示名称（中文）
    pub name: String,
}

// ==========================================
// WorkflowConfig - 流转引擎配置
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// 有序部门流水线（顺序即 sequence_index）
    pub departments: Vec<DepartmentSpec>,

    /// 跨部门派工策略
    #[serde(default)]
    pub cross_department_policy: CrossDepartmentPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        // 默认首饰加工流水线
        let departments = [
            ("CAD", "设计"),
            ("PRINT", "喷蜡"),
            ("CASTING", "倒模"),
            ("FILING", "执模"),
            ("SETTING", "镶石"),
            ("POLISHING", "抛光"),
            ("QC", "质检"),
        ]
        .iter()
        .map(|(id, name)| DepartmentSpec {
            id: (*id).to_string(),
            name: (*name).to_string(),
        })
        .collect();

        Self {
            departments,
            cross_department_policy: CrossDepartmentPolicy::default(),
        }
    }
}

impl WorkflowConfig {
    /// 从 JSON 字符串加载配置
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: WorkflowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.departments.is_empty() {
            return Err(ConfigError::ValidationError(
                "部门流水线不能为空".to_string(),
            ));
        }
        let mut ids: Vec<&str> = self.departments.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != self.departments.len() {
            return Err(ConfigError::ValidationError("部门 id 重复".to_string()));
        }
        Ok(())
    }

    /// 构建部门目录（sequence_index 按配置顺序 1 起分配）
    pub fn build_catalog(&self) -> DepartmentCatalog {
        let departments = self
            .departments
            .iter()
            .enumerate()
            .map(|(i, spec)| Department {
                id: spec.id.clone(),
                sequence_index: (i + 1) as u32,
                name: spec.name.clone(),
            })
            .collect();
        DepartmentCatalog::new(departments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline() {
        let config = WorkflowConfig::default();
        let catalog = config.build_catalog();
        assert_eq!(catalog.len(), 7);
        assert_eq!(catalog.first().id, "CAD");
        assert!(catalog.is_last("QC"));
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "departments": [
                {"id": "CAD", "name": "设计"},
                {"id": "PRINT", "name": "喷蜡"}
            ],
            "cross_department_policy": "STRICT"
        }"#;
        let config = WorkflowConfig::from_json_str(json).unwrap();
        assert_eq!(config.departments.len(), 2);
        assert_eq!(config.cross_department_policy, CrossDepartmentPolicy::Strict);
    }

    #[test]
    fn test_duplicate_department_rejected() {
        let json = r#"{
            "departments": [
                {"id": "CAD", "name": "设计"},
                {"id": "CAD", "name": "设计2"}
            ]
        }"#;
        assert!(WorkflowConfig::from_json_str(json).is_err());
    }
}
