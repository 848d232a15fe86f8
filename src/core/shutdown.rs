//! 急停处理
//!
//! 自动化原语一旦开始操作鼠标键盘，唯一的中断方式是带外急停信号（Ctrl+C / SIGTERM / 调用方触发）。
//! 急停会取消 CancellationToken：控制循环在每次外部调用前后以及停顿/冷却期间检查它，当前轮被放弃，任务以 Aborted 结束。

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// 急停原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM 信号
    Signal,
    /// 调用方主动触发（如上层监控）
    External(String),
}

/// 急停信号管理器
#[derive(Clone)]
pub struct EmergencyStop {
    token: CancellationToken,
    reason_tx: broadcast::Sender<StopReason>,
}

impl EmergencyStop {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    /// 获取取消 token（交给控制循环）
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 触发急停
    pub fn trigger(&self, reason: StopReason) {
        tracing::warn!(?reason, "Emergency stop triggered");
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 订阅急停原因
    pub fn subscribe(&self) -> broadcast::Receiver<StopReason> {
        self.reason_tx.subscribe()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let stop = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, stopping mission...");
                stop.trigger(StopReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let stop = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping mission...");
                    stop.trigger(StopReason::Signal);
                }
            });
        }
    }
}

impl Default for EmergencyStop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emergency_stop_new() {
        let stop = EmergencyStop::new();
        assert!(!stop.is_triggered());
    }

    #[test]
    fn test_emergency_stop_cancels_token() {
        let stop = EmergencyStop::new();
        let token = stop.token();
        assert!(!token.is_cancelled());
        stop.trigger(StopReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(stop.is_triggered());
    }

    #[tokio::test]
    async fn test_emergency_stop_broadcasts_reason() {
        let stop = EmergencyStop::new();
        let mut rx = stop.subscribe();
        stop.trigger(StopReason::External("watchdog".to_string()));
        let reason = rx.recv().await.unwrap();
        assert_eq!(reason, StopReason::External("watchdog".to_string()));
    }
}
