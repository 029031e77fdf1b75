//! Delivery task for ordered publishing on one channel incarnation.
//!
//! 在单个通道化身上进行有序发布的投递任务。

use super::replay::Delivery;
use crate::broker::Channel;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{trace, warn};

/// The dedicated task publishing deliveries on a channel.
///
/// Direct sends and replay flushes of one incarnation share this queue, so
/// messages reach the channel in the order the actor accepted them. Each
/// publish is awaited before the next one starts. The task ends once the
/// actor drops the sending side and the queue is drained.
///
/// 在通道上发布投递的专用任务。
///
/// 同一化身的直接发送和重放刷新共享此队列，因此消息按actor接收的顺序到达通道。
/// 每次发布都会等待完成后再开始下一次。actor丢弃发送端且队列排空后任务结束。
pub(crate) async fn delivery_task<C: Channel>(
    channel: Arc<C>,
    mut rx: mpsc::UnboundedReceiver<Delivery>,
    exchange: Arc<str>,
    incarnation: u64,
) {
    const MAX_BATCH_SIZE: usize = 64;
    let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);

    loop {
        // Wait for the first delivery to arrive
        match rx.recv().await {
            Some(delivery) => batch.push(delivery),
            None => break,
        }

        // Drain whatever else is already queued
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(delivery) => batch.push(delivery),
                Err(_) => break,
            }
        }

        for delivery in batch.drain(..) {
            trace!(
                exchange = %exchange,
                incarnation,
                entry = ?delivery.entry,
                "Publishing message on channel"
            );
            let result = channel.publish(delivery.message.clone()).await;
            if let Err(error) = &result {
                warn!(
                    exchange = %exchange,
                    incarnation,
                    entry = ?delivery.entry,
                    %error,
                    "Publish failed"
                );
            }
            delivery.settle(result);
        }
    }

    trace!(exchange = %exchange, incarnation, "Delivery task finished");
}
