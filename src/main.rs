// ==========================================
// 生产执行引擎 - 主入口
// ==========================================
// 职责: 初始化日志与 AppState，恢复未结束订单并启动 OEE 刷新
// 说明: 单机运行使用内存库存，生产环境由集成方注入真实库存服务
// ==========================================

use std::sync::Arc;

use mes_execution_core::app::{get_default_db_path, AppState};
use mes_execution_core::{logging, ExecutionCollaborators, InMemoryInventory, OrderState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", mes_execution_core::APP_NAME);
    tracing::info!("系统版本: {}", mes_execution_core::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let collaborators = ExecutionCollaborators::new(Arc::new(InMemoryInventory::new()));
    let app_state = AppState::new(db_path, collaborators).map_err(anyhow::Error::msg)?;

    let api = app_state.execution_api.clone();
    for order in api.list_orders(None)? {
        if order.state.is_terminal() || order.state == OrderState::Pending {
            continue;
        }
        match api.get_status(&order.order_id).await {
            Ok(status) => tracing::info!(
                order_id = %status.order_id,
                state = %status.state,
                good = status.good,
                waste = status.waste,
                oee = status.oee_snapshot.oee,
                "订单状态"
            ),
            Err(e) => tracing::warn!(order_id = %order.order_id, error = %e, "订单状态读取失败"),
        }
    }

    let refresher = api.spawn_oee_refresher();
    tracing::info!("执行引擎已启动，Ctrl+C 退出");

    tokio::signal::ctrl_c().await?;
    refresher.abort();
    tracing::info!("执行引擎已退出");
    Ok(())
}
