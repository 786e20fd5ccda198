// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证乐观锁、键锁串行化与派工竞争只有一个赢家
// ==========================================


#[cfg(test)]
mod concurrent_control_test {
    use jewelry_workflow::domain::{OrderStatus, TrackingStatus, WorkerAvailability};
    use jewelry_workflow::repository::RepositoryError;
    use jewelry_workflow::{retry_once_on_conflict, Priority, WorkflowError};
    use std::thread;

    use crate::test_helpers::{seed_draft_order, seed_worker, setup_env, two_dept_config};

    // ==========================================
    // 测试1: 乐观锁 - 过期 revision 拒绝写入
    // ==========================================

    #[test]
    fn test_order_stale_revision_rejected() {
        let env = setup_env(two_dept_config());
        let order = seed_draft_order(&env, "JW-C-0001", Priority::Normal, 10.0);

        let mut stale = env.order_repo.find_by_id(&order.order_id).unwrap().unwrap();
        stale.status = OrderStatus::InFactory;
        stale.current_department = Some("CAD".to_string());

        // 第一次写入成功并抬升 revision
        env.order_repo.update_progress(&stale).unwrap();

        // 携带过期 revision 的第二次写入必须被拒
        let err = env.order_repo.update_progress(&stale).unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));
    }

    #[test]
    fn test_tracking_cas_requires_expected_status() {
        let env = setup_env(two_dept_config());
        let order = seed_draft_order(&env, "JW-C-0002", Priority::Normal, 10.0);
        env.engine.activate_order(&order.order_id).unwrap();

        let record = env
            .tracking_repo
            .find_by_order_and_department(&order.order_id, "CAD")
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TrackingStatus::PendingAssignment);

        // 期望状态与库中不符: 状态 CAS 不命中
        let mut updated = record.clone();
        updated.status = TrackingStatus::Completed;
        let err = env
            .tracking_repo
            .update_with_cas(&updated, TrackingStatus::InProgress)
            .unwrap_err();
        assert!(matches!(err, RepositoryError::OptimisticLockFailure { .. }));

        // 记录原样保留
        let record = env
            .tracking_repo
            .find_by_id(&record.tracking_id)
            .unwrap()
            .unwrap();
        assert_eq!(record.status, TrackingStatus::PendingAssignment);
    }

    // ==========================================
    // 测试2: 派工竞争 - 只有一个赢家
    // ==========================================

    #[test]
    fn test_racing_assignment_single_winner() {
        let env = setup_env(two_dept_config());
        let w1 = seed_worker(&env, "师傅甲", "CAD");
        let w2 = seed_worker(&env, "师傅乙", "CAD");
        let order = seed_draft_order(&env, "JW-C-0003", Priority::Normal, 10.0);
        env.engine.activate_order(&order.order_id).unwrap();

        let record = env.engine.queue().next_for_worker("CAD").unwrap().unwrap();

        let handles: Vec<_> = [w1.worker_id.clone(), w2.worker_id.clone()]
            .into_iter()
            .map(|worker_id| {
                let engine = env.engine.clone();
                let tracking_id = record.tracking_id.clone();
                thread::spawn(move || engine.assign_worker(&tracking_id, &worker_id, None))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1, "同一记录只能派给一个工人");

        for result in &results {
            if let Err(err) = result {
                assert!(
                    matches!(
                        err,
                        WorkflowError::AlreadyAssigned { .. }
                            | WorkflowError::ConcurrentModification { .. }
                    ),
                    "败者应拿到冲突类错误, 实际 {err:?}"
                );
            }
        }

        // 赢家持有记录,败者工人仍空闲
        let record = env
            .tracking_repo
            .find_by_id(&record.tracking_id)
            .unwrap()
            .unwrap();
        let winner_id = record.assigned_worker_id.unwrap();
        let loser_id = if winner_id == w1.worker_id {
            &w2.worker_id
        } else {
            &w1.worker_id
        };
        let winner = env.worker_repo.find_by_id(&winner_id).unwrap().unwrap();
        assert_eq!(winner.availability, WorkerAvailability::Busy);
        let loser = env.worker_repo.find_by_id(loser_id).unwrap().unwrap();
        assert_eq!(loser.availability, WorkerAvailability::Available);
    }

    // ==========================================
    // 测试3: 开工重试风暴 - 幂等吸收
    // ==========================================

    #[test]
    fn test_racing_start_work_all_absorbed() {
        let env = setup_env(two_dept_config());
        let worker = seed_worker(&env, "师傅", "CAD");
        let order = seed_draft_order(&env, "JW-C-0004", Priority::Normal, 10.0);
        env.engine.activate_order(&order.order_id).unwrap();

        let record = env.engine.queue().next_for_worker("CAD").unwrap().unwrap();
        env.engine
            .assign_worker(&record.tracking_id, &worker.worker_id, None)
            .unwrap();

        // 客户端超时重试场景: 多个并发开工请求全部成功
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = env.engine.clone();
                let tracking_id = record.tracking_id.clone();
                thread::spawn(move || engine.start_work(&tracking_id))
            })
            .collect();

        for handle in handles {
            let result = handle.join().unwrap().unwrap();
            assert_eq!(result.status, TrackingStatus::InProgress);
        }

        let record = env
            .tracking_repo
            .find_by_id(&record.tracking_id)
            .unwrap()
            .unwrap();
        assert!(record.started_at.is_some());
    }

    // ==========================================
    // 测试4: 不同订单并发推进互不干扰
    // ==========================================

    #[test]
    fn test_parallel_orders_complete_independently() {
        let env = setup_env(two_dept_config());
        let w1 = seed_worker(&env, "师傅甲", "CAD");
        let w2 = seed_worker(&env, "师傅乙", "CAD");
        let o1 = seed_draft_order(&env, "JW-C-0005", Priority::Normal, 10.0);
        let o2 = seed_draft_order(&env, "JW-C-0006", Priority::Normal, 20.0);
        env.engine.activate_order(&o1.order_id).unwrap();
        env.engine.activate_order(&o2.order_id).unwrap();

        let r1 = env
            .tracking_repo
            .find_by_order_and_department(&o1.order_id, "CAD")
            .unwrap()
            .unwrap();
        let r2 = env
            .tracking_repo
            .find_by_order_and_department(&o2.order_id, "CAD")
            .unwrap()
            .unwrap();

        let pairs = [
            (r1.tracking_id.clone(), w1.worker_id.clone(), 9.8),
            (r2.tracking_id.clone(), w2.worker_id.clone(), 19.7),
        ];
        let handles: Vec<_> = pairs
            .into_iter()
            .map(|(tracking_id, worker_id, weight_out)| {
                let engine = env.engine.clone();
                thread::spawn(move || -> Result<(), WorkflowError> {
                    // 对侧线程的重排可能抬升本记录 revision: 瞬态冲突按纪律重试一次
                    retry_once_on_conflict(|| {
                        engine.assign_worker(&tracking_id, &worker_id, None).map(|_| ())
                    })?;
                    engine.start_work(&tracking_id)?;
                    engine.complete_work(&tracking_id, weight_out, None, vec![])?;
                    Ok(())
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        // 两张订单都推进到了 PRINT,队列保持连续
        for order_id in [&o1.order_id, &o2.order_id] {
            let order = env.order_repo.find_by_id(order_id).unwrap().unwrap();
            assert_eq!(order.status, OrderStatus::InFactory);
            assert_eq!(order.current_department.as_deref(), Some("PRINT"));
        }
        let pending = env.engine.queue().snapshot("PRINT").unwrap();
        assert_eq!(pending.len(), 2);
        for (i, record) in pending.iter().enumerate() {
            assert_eq!(record.queue_position, Some((i + 1) as u32));
        }
        assert!(env.engine.queue().snapshot("CAD").unwrap().is_empty());
    }
}
