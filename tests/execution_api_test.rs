// ==========================================
// 执行 API 集成测试
// ==========================================
// 目标: 计时 → 报工 → 重排 → 看板 → 质检 的完整链路
// ==========================================


#[cfg(test)]
mod execution_api_test {
    use crate::test_helpers::{
        create_test_env, create_test_env_with, move_to_quality_control, new_order, start_on_line,
        INPUT_ID,
    };
    use mes_execution_core::api::{ApiError, PauseOutcome};
    use mes_execution_core::config::config_keys;
    use mes_execution_core::domain::{ActionType, QualityDecision};
    use mes_execution_core::{
        ActorRole, ExecutionError, OrderState, ProductionLine, QualityDecisionKind, ReplanAction,
    };
    use std::time::Duration;

    const EPS: f64 = 1e-6;

    fn decision(
        kind: QualityDecisionKind,
        reject: Option<f64>,
        quarantine: Option<f64>,
        reason: Option<&str>,
    ) -> QualityDecision {
        QualityDecision {
            decision: kind,
            reject_qty: reject,
            quarantine_qty: quarantine,
            reason: reason.map(str::to_string),
        }
    }

    // ==========================================
    // OEE
    // ==========================================

    #[tokio::test]
    async fn test_oee_perfect_hour() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1001", 100.0)).await;

        env.clock.advance_seconds(3600);
        let response = api
            .report_progress(&order_id, 60.0, 0.0, None)
            .await
            .unwrap();

        assert_eq!(response.order_state, OrderState::Line1);
        assert_eq!(response.replan_action, ReplanAction::Continue);
        let oee = response.oee_snapshot;
        assert!((oee.availability - 1.0).abs() < EPS);
        assert!((oee.performance - 1.0).abs() < EPS);
        assert!((oee.quality - 1.0).abs() < EPS);
        assert!((oee.oee - 1.0).abs() < EPS);

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.elapsed_seconds, 3600);
        assert_eq!(status.good, 60.0);
        assert!(!status.from_cache);
    }

    #[tokio::test]
    async fn test_oee_with_waste() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1002", 100.0)).await;

        env.clock.advance_seconds(3600);
        let response = api
            .report_progress(&order_id, 50.0, 10.0, Some("BURR"))
            .await
            .unwrap();

        // 未触及上限，不触发重排
        assert_eq!(response.replan_action, ReplanAction::Continue);
        let oee = response.oee_snapshot;
        assert!((oee.availability - 1.0).abs() < EPS);
        assert!((oee.performance - 50.0 / 60.0).abs() < EPS);
        assert!((oee.quality - 50.0 / 60.0).abs() < EPS);
        assert!((oee.oee - 0.694).abs() < 1e-3);
        assert!((oee.oee - oee.availability * oee.performance * oee.quality).abs() < EPS);
    }

    // ==========================================
    // 计时
    // ==========================================

    #[tokio::test]
    async fn test_pause_resume_accumulates_interval_sum() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1101", 100.0)).await;

        env.clock.advance_seconds(100);
        let outcome = api.pause(&order_id, "MAINTENANCE").await.unwrap();
        assert!(matches!(outcome, PauseOutcome::Paused { seq: 1, .. }));

        env.clock.advance_seconds(30);
        let closed = api.resume(&order_id).await.unwrap();
        assert_eq!(closed.duration_seconds(), Some(30));

        env.clock.advance_seconds(50);
        api.pause(&order_id, "NO_MATERIAL").await.unwrap();
        env.clock.advance_seconds(20);

        // 暂停中: 运行时间冻结，暂停时间继续增长
        let paused = api.get_status(&order_id).await.unwrap();
        assert!(paused.paused);
        assert_eq!(paused.current_pause_reason.as_deref(), Some("NO_MATERIAL"));
        assert_eq!(paused.elapsed_seconds, 150);
        assert_eq!(paused.pause_seconds, 50);

        api.resume(&order_id).await.unwrap();
        let status = api.get_status(&order_id).await.unwrap();
        assert!(!status.paused);
        assert_eq!(status.pause_seconds, 50);
        assert_eq!(status.elapsed_seconds, 200 - 50);
    }

    #[tokio::test]
    async fn test_start_timer_is_idempotent() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1102", 100.0)).await;

        env.clock.advance_seconds(60);
        assert!(!api.start_timer(&order_id).await.unwrap());

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.elapsed_seconds, 60);
    }

    #[tokio::test]
    async fn test_pause_rejections() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1103", 100.0)).await;

        let err = api.pause(&order_id, "   ").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = api.resume(&order_id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        api.pause(&order_id, "MAINTENANCE").await.unwrap();
        let err = api.pause(&order_id, "MAINTENANCE").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(err.context().unwrap().paused);
    }

    #[tokio::test]
    async fn test_shift_change_routes_to_handoff() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1104", 100.0)).await;

        let outcome = api.pause(&order_id, "cambio_turno").await.unwrap();
        assert_eq!(
            outcome,
            PauseOutcome::ShiftHandoff {
                reason_code: "cambio_turno".to_string()
            }
        );
        assert_eq!(env.shift_transfer.handoff_count(), 1);

        // 计时器未暂停
        env.clock.advance_seconds(120);
        let status = api.get_status(&order_id).await.unwrap();
        assert!(!status.paused);
        assert_eq!(status.elapsed_seconds, 120);

        let types: Vec<ActionType> = env
            .sink
            .events_for(&order_id)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert!(types.contains(&ActionType::ShiftHandoff));
        assert!(!types.contains(&ActionType::Pause));
    }

    #[tokio::test]
    async fn test_shift_handoff_failure_is_invalid_state() {
        let env = create_test_env_with(
            &[(config_keys::SHIFT_CHANGE_REASON_CODES, "CAMBIO_TURNO, RELEVO")],
            &[(INPUT_ID, 100.0)],
        );
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1105", 100.0)).await;

        env.shift_transfer.set_failing(true);
        let err = api.pause(&order_id, "RELEVO").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        let status = api.get_status(&order_id).await.unwrap();
        assert!(!status.paused);
    }

    // ==========================================
    // 报工
    // ==========================================

    #[tokio::test]
    async fn test_waste_without_reason_produces_no_event() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1201", 100.0)).await;

        for reason in [None, Some(""), Some("  ")] {
            let err = api
                .report_progress(&order_id, 5.0, 2.0, reason)
                .await
                .unwrap_err();
            assert!(matches!(
                err.execution_error(),
                Some(ExecutionError::Validation(_))
            ));
        }

        assert!(api.list_report_events(&order_id).unwrap().is_empty());
        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.good, 0.0);
        assert_eq!(status.waste, 0.0);

        let logged_reports = api
            .list_audit_log(&order_id)
            .unwrap()
            .into_iter()
            .filter(|log| log.action_type == ActionType::Report.as_str())
            .count();
        assert_eq!(logged_reports, 0);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_leaves_state_unchanged() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1202", 100.0)).await;

        api.report_progress(&order_id, 90.0, 0.0, None).await.unwrap();
        let before = api.get_status(&order_id).await.unwrap();

        let err = api
            .report_progress(&order_id, 11.0, 0.0, None)
            .await
            .unwrap_err();
        match err.execution_error() {
            Some(ExecutionError::CapacityExceeded { attempted, ceiling }) => {
                assert_eq!(*attempted, 101.0);
                assert_eq!(*ceiling, 100.0);
            }
            other => panic!("Expected CapacityExceeded, got {:?}", other),
        }
        let ctx = err.context().unwrap();
        assert_eq!(ctx.produced_good_quantity, 90.0);
        assert_eq!(ctx.state, OrderState::Line1);

        let after = api.get_status(&order_id).await.unwrap();
        assert_eq!(after.good, before.good);
        assert_eq!(after.waste, before.waste);
        assert_eq!(api.list_report_events(&order_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_report_requires_started_line_order() {
        let env = create_test_env();
        let api = env.api();
        api.register_order(new_order("OP-1203", 100.0)).unwrap();

        let err = api
            .report_progress("OP-1203", 1.0, 0.0, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        let err = api
            .report_progress("OP-404", 1.0, 0.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // ==========================================
    // 重排
    // ==========================================

    #[tokio::test]
    async fn test_insufficient_stock_halts_and_closes_order() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 3.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1301", 100.0)).await;

        let response = api
            .report_progress(&order_id, 90.0, 10.0, Some("CRACK"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::HaltAndFinish {
                reason: "INSUFFICIENT_STOCK".to_string()
            }
        );
        assert_eq!(response.order_state, OrderState::QualityControl);

        let err = api
            .report_progress(&order_id, 1.0, 0.0, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.execution_error(),
            Some(ExecutionError::OrderClosed { .. })
        ));

        let status = api.get_status(&order_id).await.unwrap();
        assert!(status.halted);
        assert_eq!(status.good, 90.0);
        assert_eq!(status.waste, 10.0);

        let types: Vec<ActionType> = env
            .sink
            .events_for(&order_id)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert!(types.contains(&ActionType::Replan));
        assert!(types.contains(&ActionType::Halt));
    }

    #[tokio::test]
    async fn test_small_shortfall_replenishes_automatically() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 50.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1302", 100.0)).await;

        let response = api
            .report_progress(&order_id, 95.0, 5.0, Some("SCRATCH"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::Replenish { quantity: 5.0 }
        );
        assert_eq!(response.order_state, OrderState::Line1);
        assert_eq!(env.inventory.stock_of(INPUT_ID), 45.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.effective_ceiling, 105.0);
        assert_eq!(status.planned_quantity, 100.0);

        api.report_progress(&order_id, 5.0, 0.0, None).await.unwrap();
        let err = api
            .report_progress(&order_id, 1.0, 0.0, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
    }

    #[tokio::test]
    async fn test_large_shortfall_requires_confirmation() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 100.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1303", 100.0)).await;

        let response = api
            .report_progress(&order_id, 80.0, 20.0, Some("MISALIGNED"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::ExpandPendingConfirmation { quantity: 20.0 }
        );

        let status = api.get_status(&order_id).await.unwrap();
        let pending = status.pending_expansion.expect("应有待确认扩产");
        assert_eq!(pending.quantity, 20.0);
        assert_eq!(pending.trigger_waste_quantity, 20.0);
        // 未确认前上限不变，库存未扣减
        assert_eq!(status.effective_ceiling, 100.0);
        assert_eq!(env.inventory.stock_of(INPUT_ID), 100.0);

        // 确认时库存已被其他订单消耗
        env.inventory.set_stock(INPUT_ID, 5.0);
        let err = api.confirm_expansion(&order_id, 20.0).await.unwrap_err();
        match err.execution_error() {
            Some(ExecutionError::StaleStock {
                required,
                available,
            }) => {
                assert_eq!(*required, 20.0);
                assert_eq!(*available, 5.0);
            }
            other => panic!("Expected StaleStock, got {:?}", other),
        }
        assert!(api
            .get_status(&order_id)
            .await
            .unwrap()
            .pending_expansion
            .is_some());

        env.inventory.set_stock(INPUT_ID, 100.0);
        let expansion = api.confirm_expansion(&order_id, 20.0).await.unwrap();
        assert_eq!(expansion.new_planned_quantity, 120.0);
        assert_eq!(expansion.effective_ceiling, 120.0);
        assert_eq!(env.inventory.stock_of(INPUT_ID), 80.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert!(status.pending_expansion.is_none());
        api.report_progress(&order_id, 20.0, 0.0, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_confirm_without_pending_expansion_is_rejected() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1304", 100.0)).await;

        let err = api.confirm_expansion(&order_id, 10.0).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");

        let err = api.confirm_expansion(&order_id, 0.0).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_inventory_timeout_halts_conservatively() {
        let env = create_test_env_with(
            &[(config_keys::INVENTORY_TIMEOUT_MS, "50")],
            &[(INPUT_ID, 1000.0)],
        );
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1305", 100.0)).await;

        env.inventory.set_latency(Some(Duration::from_millis(500)));
        let response = api
            .report_progress(&order_id, 95.0, 5.0, Some("SCRATCH"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::HaltAndFinish {
                reason: "INVENTORY_UNAVAILABLE".to_string()
            }
        );
        assert_eq!(response.order_state, OrderState::QualityControl);
    }

    #[tokio::test]
    async fn test_inventory_failure_halts_conservatively() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1306", 100.0)).await;

        env.inventory.set_failing(true);
        let response = api
            .report_progress(&order_id, 95.0, 5.0, Some("SCRATCH"))
            .await
            .unwrap();
        assert!(matches!(
            response.replan_action,
            ReplanAction::HaltAndFinish { .. }
        ));
    }

    #[tokio::test]
    async fn test_waste_past_ceiling_without_stock_halts() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 0.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1307", 100.0)).await;
        api.report_progress(&order_id, 95.0, 0.0, None).await.unwrap();

        let response = api
            .report_progress(&order_id, 0.0, 10.0, Some("CRACK"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::HaltAndFinish {
                reason: "INSUFFICIENT_STOCK".to_string()
            }
        );
        assert_eq!(response.order_state, OrderState::QualityControl);
        // 废品封顶计入到上限
        assert_eq!(response.event.waste_delta, 5.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert!(status.halted);
        assert_eq!(status.good, 95.0);
        assert_eq!(status.waste, 5.0);
        assert!(status.good + status.waste <= status.effective_ceiling + EPS);

        let replan = env
            .sink
            .events_for(&order_id)
            .into_iter()
            .find(|e| e.event_type == ActionType::Replan)
            .expect("应有重排事件");
        assert_eq!(replan.payload["unrecorded_waste_quantity"], 5.0);

        let err = api
            .report_progress(&order_id, 0.0, 1.0, Some("CRACK"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.execution_error(),
            Some(ExecutionError::OrderClosed { .. })
        ));
    }

    #[tokio::test]
    async fn test_waste_past_ceiling_replenishes_and_records_in_full() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 50.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1308", 100.0)).await;
        api.report_progress(&order_id, 95.0, 0.0, None).await.unwrap();

        let response = api
            .report_progress(&order_id, 0.0, 8.0, Some("CRACK"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::Replenish { quantity: 8.0 }
        );
        assert_eq!(response.order_state, OrderState::Line1);
        assert_eq!(response.event.waste_delta, 8.0);
        assert_eq!(env.inventory.stock_of(INPUT_ID), 42.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.waste, 8.0);
        assert_eq!(status.effective_ceiling, 108.0);

        // 补料后仍可把良品做满计划
        api.report_progress(&order_id, 5.0, 0.0, None).await.unwrap();
        assert_eq!(api.get_status(&order_id).await.unwrap().good, 100.0);
    }

    #[tokio::test]
    async fn test_waste_past_ceiling_proposes_expansion() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 500.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1309", 100.0)).await;
        api.report_progress(&order_id, 60.0, 0.0, None).await.unwrap();

        let response = api
            .report_progress(&order_id, 0.0, 50.0, Some("MISALIGNED"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::ExpandPendingConfirmation { quantity: 50.0 }
        );
        assert_eq!(response.event.waste_delta, 40.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.good + status.waste, 100.0);
        assert_eq!(status.pending_expansion.unwrap().quantity, 50.0);

        let expansion = api.confirm_expansion(&order_id, 50.0).await.unwrap();
        assert_eq!(expansion.new_planned_quantity, 150.0);
        assert_eq!(
            expansion.replan_action,
            ReplanAction::ExpandConfirmed { quantity: 50.0 }
        );
    }

    #[tokio::test]
    async fn test_good_overshoot_with_waste_is_still_rejected() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1310", 100.0)).await;
        api.report_progress(&order_id, 95.0, 0.0, None).await.unwrap();

        let err = api
            .report_progress(&order_id, 6.0, 1.0, Some("CRACK"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!((status.good, status.waste), (95.0, 0.0));
    }

    #[tokio::test]
    async fn test_confirm_expansion_inventory_timeout_halts() {
        let env = create_test_env_with(
            &[(config_keys::INVENTORY_TIMEOUT_MS, "50")],
            &[(INPUT_ID, 100.0)],
        );
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1311", 100.0)).await;

        let response = api
            .report_progress(&order_id, 80.0, 20.0, Some("MISALIGNED"))
            .await
            .unwrap();
        assert_eq!(
            response.replan_action,
            ReplanAction::ExpandPendingConfirmation { quantity: 20.0 }
        );

        env.inventory.set_latency(Some(Duration::from_millis(500)));
        let expansion = api.confirm_expansion(&order_id, 20.0).await.unwrap();
        assert_eq!(
            expansion.replan_action,
            ReplanAction::HaltAndFinish {
                reason: "INVENTORY_UNAVAILABLE".to_string()
            }
        );
        assert_eq!(expansion.order_state, OrderState::QualityControl);
        assert_eq!(expansion.new_planned_quantity, 100.0);
        assert_eq!(env.inventory.stock_of(INPUT_ID), 100.0);

        let status = api.get_status(&order_id).await.unwrap();
        assert!(status.halted);
        assert!(status.pending_expansion.is_none());

        let types: Vec<ActionType> = env
            .sink
            .events_for(&order_id)
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert!(types.contains(&ActionType::Halt));
        assert!(!types.contains(&ActionType::ConfirmExpansion));
    }

    #[tokio::test]
    async fn test_confirm_expansion_inventory_failure_halts() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 100.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1312", 100.0)).await;
        api.report_progress(&order_id, 80.0, 20.0, Some("MISALIGNED"))
            .await
            .unwrap();

        env.inventory.set_failing(true);
        let expansion = api.confirm_expansion(&order_id, 20.0).await.unwrap();
        assert!(matches!(
            expansion.replan_action,
            ReplanAction::HaltAndFinish { .. }
        ));

        env.inventory.set_failing(false);
        let err = api.confirm_expansion(&order_id, 20.0).await.unwrap_err();
        assert!(matches!(
            err.execution_error(),
            Some(ExecutionError::OrderClosed { .. })
        ));
    }

    // ==========================================
    // 看板
    // ==========================================

    #[tokio::test]
    async fn test_no_role_moves_backward() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1401", 100.0)).await;
        api.move_order(&order_id, OrderState::Packaging, ActorRole::Operator)
            .await
            .unwrap();

        for role in [
            ActorRole::Operator,
            ActorRole::QualitySupervisor,
            ActorRole::GeneralSupervisor,
        ] {
            let err = api
                .move_order(&order_id, OrderState::Line1, role)
                .await
                .unwrap_err();
            assert_eq!(err.code(), "FORBIDDEN_TRANSITION");
        }

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.state, OrderState::Packaging);
    }

    #[tokio::test]
    async fn test_line_mismatch() {
        let env = create_test_env();
        let api = env.api();
        api.register_order(new_order("OP-1402", 100.0)).unwrap();
        api.move_order("OP-1402", OrderState::Planned, ActorRole::GeneralSupervisor)
            .await
            .unwrap();

        let err = api
            .move_order("OP-1402", OrderState::Line2, ActorRole::Operator)
            .await
            .unwrap_err();
        match err.execution_error() {
            Some(ExecutionError::LineMismatch { assigned, target }) => {
                assert_eq!(*assigned, ProductionLine::Line1);
                assert_eq!(*target, OrderState::Line2);
            }
            other => panic!("Expected LineMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_operator_cannot_plan() {
        let env = create_test_env();
        let api = env.api();
        api.register_order(new_order("OP-1403", 100.0)).unwrap();

        let err = api
            .move_order("OP-1403", OrderState::Planned, ActorRole::Operator)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN_TRANSITION");
    }

    #[tokio::test]
    async fn test_leaving_line_finishes_timer() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1404", 100.0)).await;

        env.clock.advance_seconds(600);
        api.pause(&order_id, "MAINTENANCE").await.unwrap();
        env.clock.advance_seconds(60);
        api.move_order(&order_id, OrderState::Packaging, ActorRole::Operator)
            .await
            .unwrap();

        env.clock.advance_seconds(3600);
        let status = api.get_status(&order_id).await.unwrap();
        assert!(!status.paused);
        assert_eq!(status.elapsed_seconds, 600);
        assert_eq!(status.pause_seconds, 60);
    }

    #[tokio::test]
    async fn test_completion_requires_quality_decision() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1405", 100.0)).await;
        move_to_quality_control(api, &order_id).await;

        let err = api
            .move_order(&order_id, OrderState::Completed, ActorRole::QualitySupervisor)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_DECISION");
    }

    // ==========================================
    // 质检
    // ==========================================

    #[tokio::test]
    async fn test_partial_reject_completes_order() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1501", 100.0)).await;
        api.report_progress(&order_id, 100.0, 0.0, None).await.unwrap();
        move_to_quality_control(api, &order_id).await;

        let disposition = api
            .submit_quality_decision(
                &order_id,
                decision(
                    QualityDecisionKind::PartialReject,
                    Some(10.0),
                    None,
                    Some("DIMENSION"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(disposition.released_quantity, 90.0);
        assert_eq!(disposition.rejected_quantity, 10.0);
        assert_eq!(disposition.next_state, OrderState::Completed);

        let status = api.get_status(&order_id).await.unwrap();
        assert_eq!(status.state, OrderState::Completed);
        assert_eq!(env.inventory.applied_dispositions().len(), 1);

        // 终态订单不再接受任何判定
        let err = api
            .submit_quality_decision(
                &order_id,
                decision(QualityDecisionKind::Approved, None, None, None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
    }

    #[tokio::test]
    async fn test_full_reject_discards_order_without_inventory_write() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1502", 100.0)).await;
        api.report_progress(&order_id, 40.0, 0.0, None).await.unwrap();
        move_to_quality_control(api, &order_id).await;

        let disposition = api
            .submit_quality_decision(
                &order_id,
                decision(
                    QualityDecisionKind::PartialReject,
                    Some(40.0),
                    None,
                    Some("CONTAMINATED"),
                ),
            )
            .await
            .unwrap();
        assert!(disposition.fully_discarded);
        assert_eq!(disposition.next_state, OrderState::Discarded);
        assert!(env.inventory.applied_dispositions().is_empty());
        assert!(api
            .list_orders(Some(OrderState::Discarded))
            .unwrap()
            .iter()
            .any(|o| o.order_id == order_id));
    }

    #[tokio::test]
    async fn test_mixed_decision_requires_both_quantities() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1503", 100.0)).await;
        api.report_progress(&order_id, 50.0, 0.0, None).await.unwrap();
        move_to_quality_control(api, &order_id).await;

        for (reject, quarantine) in [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0)] {
            let err = api
                .submit_quality_decision(
                    &order_id,
                    decision(
                        QualityDecisionKind::Mixed,
                        Some(reject),
                        Some(quarantine),
                        Some("MIXED_DEFECTS"),
                    ),
                )
                .await
                .unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }

        let disposition = api
            .submit_quality_decision(
                &order_id,
                decision(
                    QualityDecisionKind::Mixed,
                    Some(5.0),
                    Some(10.0),
                    Some("MIXED_DEFECTS"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(disposition.released_quantity, 35.0);
        assert_eq!(disposition.quarantined_quantity, 10.0);
    }

    #[tokio::test]
    async fn test_inventory_failure_keeps_order_in_quality_control() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1504", 100.0)).await;
        api.report_progress(&order_id, 30.0, 0.0, None).await.unwrap();
        move_to_quality_control(api, &order_id).await;

        env.inventory.set_failing(true);
        let err = api
            .submit_quality_decision(
                &order_id,
                decision(QualityDecisionKind::Approved, None, None, None),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_STATE");
        assert_eq!(
            api.get_status(&order_id).await.unwrap().state,
            OrderState::QualityControl
        );

        env.inventory.set_failing(false);
        let disposition = api
            .submit_quality_decision(
                &order_id,
                decision(QualityDecisionKind::Approved, None, None, None),
            )
            .await
            .unwrap();
        assert_eq!(disposition.released_quantity, 30.0);
    }

    #[tokio::test]
    async fn test_halted_order_goes_through_quality_decision() {
        let env = create_test_env_with(&[], &[(INPUT_ID, 0.0)]);
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1505", 100.0)).await;

        api.report_progress(&order_id, 90.0, 10.0, Some("CRACK"))
            .await
            .unwrap();
        let disposition = api
            .submit_quality_decision(
                &order_id,
                decision(
                    QualityDecisionKind::PartialQuarantine,
                    None,
                    Some(15.0),
                    Some("PENDING_LAB"),
                ),
            )
            .await
            .unwrap();
        assert_eq!(disposition.released_quantity, 75.0);
        assert_eq!(disposition.next_state, OrderState::Completed);
    }

    // ==========================================
    // 接入与审计
    // ==========================================

    #[tokio::test]
    async fn test_register_order_validation() {
        let env = create_test_env();
        let api = env.api();

        let mut bad = new_order("OP-1601", 0.0);
        assert!(matches!(
            api.register_order(bad.clone()).unwrap_err(),
            ApiError::InvalidInput(_)
        ));
        bad.planned_quantity = 10.0;
        bad.order_id = " ".to_string();
        assert!(matches!(
            api.register_order(bad).unwrap_err(),
            ApiError::InvalidInput(_)
        ));

        api.register_order(new_order("OP-1602", 10.0)).unwrap();
        let err = api.register_order(new_order("OP-1602", 10.0)).unwrap_err();
        assert_eq!(err.code(), "BUSINESS_RULE_VIOLATION");
    }

    #[tokio::test]
    async fn test_audit_trail_records_every_mutation() {
        let env = create_test_env();
        let api = env.api();
        let order_id = start_on_line(api, new_order("OP-1603", 100.0)).await;

        api.pause(&order_id, "MAINTENANCE").await.unwrap();
        api.resume(&order_id).await.unwrap();
        api.report_progress(&order_id, 10.0, 1.0, Some("BURR"))
            .await
            .unwrap();

        let actions: Vec<String> = api
            .list_audit_log(&order_id)
            .unwrap()
            .into_iter()
            .map(|log| log.action_type)
            .collect();
        assert_eq!(
            actions,
            vec![
                "RegisterOrder",
                "MoveOrder",
                "MoveOrder",
                "StartTimer",
                "Pause",
                "Resume",
                "Report",
                "Replan",
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_running_snapshots_skips_idle_orders() {
        let env = create_test_env();
        let api = env.api();
        start_on_line(api, new_order("OP-1701", 100.0)).await;
        api.register_order(new_order("OP-1702", 100.0)).unwrap();

        assert_eq!(api.refresh_running_snapshots(), 1);
    }
}
