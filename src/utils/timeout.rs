//! 软/硬两级截止时间
//!
//! - 软截止：到期后取消传给被调方的 `CancellationToken`，由被调方自行收尾；
//! - 硬截止：到期后调用方立即返回错误，被调方在后台继续运行直至结束。

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::errors::{AutograderError, Result};

pub async fn with_deadlines<F, Fut, T>(
    soft: Duration,
    hard: Duration,
    label: &str,
    f: F,
) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let token = CancellationToken::new();
    let handle = tokio::spawn(f(token.clone()));

    let soft_token = token.clone();
    let soft_timer = tokio::spawn(async move {
        tokio::time::sleep(soft).await;
        soft_token.cancel();
    });

    let outcome = tokio::time::timeout(hard, handle).await;
    soft_timer.abort();

    match outcome {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(AutograderError::collaborator(format!(
            "{label} 异常终止: {join_err}"
        ))),
        Err(_) => {
            warn!("{} exceeded hard deadline of {:?}, leaving it running", label, hard);
            token.cancel();
            Err(AutograderError::collaborator(format!(
                "{label} 超过硬截止时间 ({} ms)",
                hard.as_millis()
            )))
        }
    }
}
