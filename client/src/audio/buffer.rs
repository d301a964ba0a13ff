//! 播放缓冲区队列模块
//!
//! 在异步任务与音频输出回调之间传递整段 PCM 缓冲区
//!
//! # 特性
//!
//! - 无锁的单生产者-单消费者模式
//! - 队列容量固定，满时丢弃新缓冲区而不阻塞
//! - 输出回调线程中出队后交给调度器，调度器会在回调中追加和回收缓冲区
//!
//! # 使用示例
//!
//! ```
//! use wybe_lib::audio::buffer::PlaybackQueue;
//!
//! let (mut producer, mut consumer) = PlaybackQueue::new(8);
//!
//! assert!(producer.push(vec![0.5f32; 480]));
//!
//! let buffer = consumer.pop().unwrap();
//! assert_eq!(buffer.len(), 480);
//! ```

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use crate::audio::scheduler::PlaybackScheduler;

/// 播放缓冲区队列
///
/// 封装 ringbuf 的无锁环形缓冲区，元素为完整的单声道缓冲区
pub struct PlaybackQueue;

/// 队列生产者（异步侧）
pub struct BufferProducer {
    producer: ringbuf::HeapProd<Vec<f32>>,
}

/// 队列消费者（输出回调侧）
pub struct BufferConsumer {
    consumer: ringbuf::HeapCons<Vec<f32>>,
}

impl PlaybackQueue {
    /// 创建新的缓冲区队列
    ///
    /// # Arguments
    ///
    /// * `capacity` - 最多容纳的缓冲区个数
    ///
    /// # Returns
    ///
    /// 返回 (生产者, 消费者) 元组
    pub fn new(capacity: usize) -> (BufferProducer, BufferConsumer) {
        let rb = HeapRb::<Vec<f32>>::new(capacity.max(1));
        let (producer, consumer) = rb.split();

        (BufferProducer { producer }, BufferConsumer { consumer })
    }
}

impl BufferProducer {
    /// 放入一个缓冲区
    ///
    /// # Returns
    ///
    /// 成功返回 `true`，队列已满返回 `false`（缓冲区被丢弃）
    pub fn push(&mut self, buffer: Vec<f32>) -> bool {
        self.producer.try_push(buffer).is_ok()
    }

    /// 获取剩余空位
    pub fn available_space(&self) -> usize {
        self.producer.vacant_len()
    }

    /// 检查队列是否已满
    pub fn is_full(&self) -> bool {
        self.producer.is_full()
    }
}

impl BufferConsumer {
    /// 取出一个缓冲区
    pub fn pop(&mut self) -> Option<Vec<f32>> {
        self.consumer.try_pop()
    }

    /// 将所有已到达的缓冲区交给调度器
    ///
    /// # Returns
    ///
    /// 返回本次调度的缓冲区个数
    pub fn drain_into(&mut self, scheduler: &mut PlaybackScheduler) -> usize {
        let mut count = 0;
        while let Some(buffer) = self.consumer.try_pop() {
            scheduler.schedule(buffer);
            count += 1;
        }
        count
    }

    /// 获取队列中的缓冲区个数
    pub fn len(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// 检查队列是否为空
    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::scheduler::PlaybackMode;

    #[test]
    fn test_queue_preserves_order() {
        let (mut producer, mut consumer) = PlaybackQueue::new(4);

        assert!(producer.push(vec![1.0]));
        assert!(producer.push(vec![2.0]));
        assert_eq!(consumer.len(), 2);

        assert_eq!(consumer.pop(), Some(vec![1.0]));
        assert_eq!(consumer.pop(), Some(vec![2.0]));
        assert_eq!(consumer.pop(), None);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_full_queue_rejects() {
        let (mut producer, _consumer) = PlaybackQueue::new(2);

        assert!(producer.push(vec![0.1]));
        assert!(producer.push(vec![0.2]));
        assert!(producer.is_full());
        assert!(!producer.push(vec![0.3]));
        assert_eq!(producer.available_space(), 0);
    }

    #[test]
    fn test_drain_into_scheduler() {
        let (mut producer, mut consumer) = PlaybackQueue::new(4);
        let mut scheduler = PlaybackScheduler::new(PlaybackMode::Fifo);

        producer.push(vec![0.1; 3]);
        producer.push(vec![0.2; 3]);

        assert_eq!(consumer.drain_into(&mut scheduler), 2);
        assert_eq!(scheduler.active_buffers(), 2);
        assert_eq!(scheduler.pending_samples(), 6);
    }

    #[test]
    fn test_cross_thread_handoff() {
        let (mut producer, mut consumer) = PlaybackQueue::new(16);

        let handle = std::thread::spawn(move || {
            for i in 0..10 {
                while !producer.push(vec![i as f32]) {
                    std::thread::yield_now();
                }
            }
        });
        handle.join().unwrap();

        let received: Vec<f32> = std::iter::from_fn(|| consumer.pop()).map(|b| b[0]).collect();
        assert_eq!(received, (0..10).map(|i| i as f32).collect::<Vec<_>>());
    }
}
