//! 结果汇总任务
//!
//! 结果通道的唯一消费者，也是仪表状态的唯一写入者。

use crate::exposition::GaugeWriter;
use crate::probe::ProbeResult;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// 结果汇总任务
pub struct ResultSink {
    results: mpsc::Receiver<ProbeResult>,
    writer: GaugeWriter,
}

impl ResultSink {
    /// 创建汇总任务
    pub fn new(results: mpsc::Receiver<ProbeResult>, writer: GaugeWriter) -> Self {
        Self { results, writer }
    }

    /// 逐条应用结果，直到所有发送端关闭并且缓冲区已清空
    ///
    /// # 返回
    /// * `u64` - 应用的结果条数
    pub async fn run(mut self) -> u64 {
        let mut applied: u64 = 0;

        while let Some(result) = self.results.recv().await {
            debug!(
                "更新指标: {} up={} response_ms={}",
                result.url,
                result.is_up(),
                result.duration_ms()
            );
            self.writer.record(&result);
            applied += 1;
        }

        info!("结果通道已关闭，共处理 {} 条结果", applied);
        applied
    }
}
