// ==========================================
// 首饰工厂订单流转系统 - 部门目录
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 工序流水线定义
// 红线: 部门顺序进程启动时定死,运行期不可变
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// Department - 工序部门
// ==========================================
// sequence_index 从 1 起严格递增且连续
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: String,          // 部门标识（如 CAD / CASTING）
    pub sequence_index: u32, // 流水线序号（1 起连续）
    pub name: String,        // 部门显示名
}

// ==========================================
// DepartmentCatalog - 部门目录
// ==========================================
// 用途: 纯查询,无副作用;由 WorkflowConfig 启动时构建
#[derive(Debug, Clone)]
pub struct DepartmentCatalog {
    departments: Vec<Department>,
}

impl DepartmentCatalog {
    /// 从有序部门列表构建目录
    ///
    /// # Panics
    /// 序号不连续、不从 1 起或 id 重复属于配置错误，直接 panic
    /// （目录在进程启动时构建，失败应当使进程无法启动）
    pub fn new(departments: Vec<Department>) -> Self {
        assert!(!departments.is_empty(), "部门目录不能为空");
        for (i, dept) in departments.iter().enumerate() {
            assert_eq!(
                dept.sequence_index,
                (i + 1) as u32,
                "部门序号必须从 1 起连续: {} 的序号为 {}",
                dept.id,
                dept.sequence_index
            );
        }
        let mut ids: Vec<&str> = departments.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), departments.len(), "部门 id 不可重复");

        Self { departments }
    }

    /// 有序部门列表
    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    /// 流水线第一个部门
    pub fn first(&self) -> &Department {
        &self.departments[0]
    }

    /// 按 id 查询部门
    pub fn get(&self, department_id: &str) -> Option<&Department> {
        self.departments.iter().find(|d| d.id == department_id)
    }

    /// 下一个部门（最后一个部门返回 None）
    pub fn next(&self, department_id: &str) -> Option<&Department> {
        let current = self.get(department_id)?;
        self.departments
            .iter()
            .find(|d| d.sequence_index == current.sequence_index + 1)
    }

    /// 是否为流水线最后一个部门
    pub fn is_last(&self, department_id: &str) -> bool {
        match self.get(department_id) {
            Some(d) => d.sequence_index == self.departments.len() as u32,
            None => false,
        }
    }

    /// 部门数量
    pub fn len(&self) -> usize {
        self.departments.len()
    }

    /// 目录是否为空（构造已保证非空，保留以满足 clippy len 约定）
    pub fn is_empty(&self) -> bool {
        self.departments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> DepartmentCatalog {
        DepartmentCatalog::new(vec![
            Department {
                id: "CAD".to_string(),
                sequence_index: 1,
                name: "设计".to_string(),
            },
            Department {
                id: "CASTING".to_string(),
                sequence_index: 2,
                name: "倒模".to_string(),
            },
            Department {
                id: "POLISHING".to_string(),
                sequence_index: 3,
                name: "抛光".to_string(),
            },
        ])
    }

    #[test]
    fn test_next_follows_sequence() {
        let catalog = catalog();
        assert_eq!(catalog.next("CAD").unwrap().id, "CASTING");
        assert_eq!(catalog.next("CASTING").unwrap().id, "POLISHING");
        assert!(catalog.next("POLISHING").is_none());
    }

    #[test]
    fn test_is_last() {
        let catalog = catalog();
        assert!(!catalog.is_last("CAD"));
        assert!(catalog.is_last("POLISHING"));
        assert!(!catalog.is_last("UNKNOWN"));
    }

    #[test]
    fn test_unknown_department_is_none() {
        assert!(catalog().get("ENGRAVING").is_none());
    }

    #[test]
    #[should_panic]
    fn test_non_contiguous_sequence_panics() {
        DepartmentCatalog::new(vec![
            Department {
                id: "CAD".to_string(),
                sequence_index: 1,
                name: "设计".to_string(),
            },
            Department {
                id: "QC".to_string(),
                sequence_index: 3,
                name: "质检".to_string(),
            },
        ]);
    }
}
