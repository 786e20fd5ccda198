// ==========================================
// 派工队列测试
// ==========================================
// 职责: 验证队列位置连续性、优先级插队与重排行为
// ==========================================


#[cfg(test)]
mod queue_test {
    use jewelry_workflow::domain::TrackingRecord;
    use jewelry_workflow::Priority;

    use crate::test_helpers::{seed_draft_order, seed_worker, setup_env, two_dept_config, TestEnv};

    /// 进厂一张订单并返回其首部门流转记录
    fn activate(env: &TestEnv, order_number: &str, priority: Priority) -> TrackingRecord {
        let order = seed_draft_order(env, order_number, priority, 10.0);
        env.engine.activate_order(&order.order_id).unwrap();
        env.tracking_repo
            .find_by_order_and_department(&order.order_id, "CAD")
            .unwrap()
            .unwrap()
    }

    /// 断言部门队列位置恰为连续 1..N
    fn assert_contiguous(env: &TestEnv, department_id: &str, expected_len: usize) {
        let pending = env.engine.queue().snapshot(department_id).unwrap();
        assert_eq!(pending.len(), expected_len);
        for (i, record) in pending.iter().enumerate() {
            assert_eq!(
                record.queue_position,
                Some((i + 1) as u32),
                "位置不连续: {:?}",
                pending
                    .iter()
                    .map(|r| r.queue_position)
                    .collect::<Vec<_>>()
            );
        }
    }

    #[test]
    fn test_positions_contiguous_after_enqueues() {
        let env = setup_env(two_dept_config());
        let a = activate(&env, "JW-Q-0001", Priority::Normal);
        let b = activate(&env, "JW-Q-0002", Priority::Normal);
        let c = activate(&env, "JW-Q-0003", Priority::Normal);

        assert_contiguous(&env, "CAD", 3);

        // 同优先级按入队先后
        let pending = env.engine.queue().snapshot("CAD").unwrap();
        assert_eq!(pending[0].tracking_id, a.tracking_id);
        assert_eq!(pending[1].tracking_id, b.tracking_id);
        assert_eq!(pending[2].tracking_id, c.tracking_id);
    }

    #[test]
    fn test_urgent_order_jumps_queue() {
        let env = setup_env(two_dept_config());
        let normal1 = activate(&env, "JW-Q-0004", Priority::Normal);
        let normal2 = activate(&env, "JW-Q-0005", Priority::Normal);
        let urgent = activate(&env, "JW-Q-0006", Priority::Urgent);

        let pending = env.engine.queue().snapshot("CAD").unwrap();
        assert_eq!(pending[0].tracking_id, urgent.tracking_id);
        assert_eq!(pending[0].queue_position, Some(1));
        assert_eq!(pending[1].tracking_id, normal1.tracking_id);
        assert_eq!(pending[2].tracking_id, normal2.tracking_id);
        assert_contiguous(&env, "CAD", 3);
    }

    #[test]
    fn test_priority_levels_ordering() {
        let env = setup_env(two_dept_config());
        // 故意按低到高入队,重排后应完全倒序
        let low = activate(&env, "JW-Q-0007", Priority::Low);
        let normal = activate(&env, "JW-Q-0008", Priority::Normal);
        let high = activate(&env, "JW-Q-0009", Priority::High);
        let urgent = activate(&env, "JW-Q-0010", Priority::Urgent);

        let pending = env.engine.queue().snapshot("CAD").unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.tracking_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                urgent.tracking_id.as_str(),
                high.tracking_id.as_str(),
                normal.tracking_id.as_str(),
                low.tracking_id.as_str(),
            ]
        );
        assert_contiguous(&env, "CAD", 4);
    }

    #[test]
    fn test_next_for_worker_is_read_only_head() {
        let env = setup_env(two_dept_config());
        let head = activate(&env, "JW-Q-0011", Priority::High);
        activate(&env, "JW-Q-0012", Priority::Normal);

        let first = env.engine.queue().next_for_worker("CAD").unwrap().unwrap();
        assert_eq!(first.tracking_id, head.tracking_id);

        // 查看不等于派工: 重复查看返回同一队首,队列不变
        let again = env.engine.queue().next_for_worker("CAD").unwrap().unwrap();
        assert_eq!(again.tracking_id, head.tracking_id);
        assert_contiguous(&env, "CAD", 2);
    }

    #[test]
    fn test_next_for_worker_empty_queue() {
        let env = setup_env(two_dept_config());
        assert!(env.engine.queue().next_for_worker("CAD").unwrap().is_none());
    }

    #[test]
    fn test_assignment_reindexes_remaining() {
        let env = setup_env(two_dept_config());
        let worker = seed_worker(&env, "师傅", "CAD");
        let head = activate(&env, "JW-Q-0013", Priority::Normal);
        let second = activate(&env, "JW-Q-0014", Priority::Normal);
        let third = activate(&env, "JW-Q-0015", Priority::Normal);

        env.engine
            .assign_worker(&head.tracking_id, &worker.worker_id, None)
            .unwrap();

        // 队首移出后剩余记录顶上,位置回到 1..N
        assert_contiguous(&env, "CAD", 2);
        let pending = env.engine.queue().snapshot("CAD").unwrap();
        assert_eq!(pending[0].tracking_id, second.tracking_id);
        assert_eq!(pending[1].tracking_id, third.tracking_id);

        // 已派工记录不再占用队列位置
        let assigned = env.tracking_repo.find_by_id(&head.tracking_id).unwrap().unwrap();
        assert_eq!(assigned.queue_position, None);
    }

    #[test]
    fn test_unassign_rejoins_by_priority() {
        let env = setup_env(two_dept_config());
        let worker = seed_worker(&env, "师傅", "CAD");
        let urgent = activate(&env, "JW-Q-0016", Priority::Urgent);
        let normal = activate(&env, "JW-Q-0017", Priority::Normal);

        env.engine
            .assign_worker(&urgent.tracking_id, &worker.worker_id, None)
            .unwrap();
        assert_contiguous(&env, "CAD", 1);

        // 撤销后重新入队,加急单仍排在普通单之前
        env.engine.unassign(&urgent.tracking_id).unwrap();
        let pending = env.engine.queue().snapshot("CAD").unwrap();
        assert_eq!(pending[0].tracking_id, urgent.tracking_id);
        assert_eq!(pending[1].tracking_id, normal.tracking_id);
        assert_contiguous(&env, "CAD", 2);
    }

    #[test]
    fn test_queues_are_per_department() {
        let env = setup_env(two_dept_config());
        let worker = seed_worker(&env, "师傅", "CAD");
        let record = activate(&env, "JW-Q-0018", Priority::Normal);
        activate(&env, "JW-Q-0019", Priority::Normal);

        // 第一张订单推进到 PRINT,两个部门各有独立队列
        env.engine
            .assign_worker(&record.tracking_id, &worker.worker_id, None)
            .unwrap();
        env.engine.start_work(&record.tracking_id).unwrap();
        env.engine
            .complete_work(&record.tracking_id, 9.9, None, vec![])
            .unwrap();

        assert_contiguous(&env, "CAD", 1);
        assert_contiguous(&env, "PRINT", 1);
    }
}
