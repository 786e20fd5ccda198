// ==========================================
// 首饰工厂订单流转系统 - 键控咨询锁
// ==========================================
// 依据: Workflow_Engine_Spec_v0.2.md - 并发纪律
// 用途: 同一流转记录/同一部门队列的迁移操作串行化,
//       不同键的操作完全并行
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

// ==========================================
// KeyedLockRegistry - 键控锁注册表
// ==========================================
// 锁顺序约定（防死锁）: record 锁 → order 锁 → dept 锁 → 数据库连接锁
#[derive(Default)]
pub struct KeyedLockRegistry {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLockRegistry {
    /// 创建空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 取键对应的锁句柄（不存在则创建）
    ///
    /// 返回 Arc 句柄,由调用方自行 lock;注册表内部锁只在查表瞬间持有
    pub fn handle(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// 锁定键控锁（咨询锁不携带数据,poison 直接恢复）
pub fn lock_keyed(handle: &Arc<Mutex<()>>) -> MutexGuard<'_, ()> {
    handle
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
