//! Turns a callback-driven producer into a pull-based stream of values.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Payload of the handoff channel.
///
/// `End` is the end-of-stream marker: a control variant the consumer can
/// never confuse with a produced item.
enum Relayed<T> {
    Item(T),
    End,
}

type CompletionHook<R> = Box<dyn FnOnce(&R) + Send>;

/// Callback handed to the producer function.
///
/// Only meant to be used from a blocking context; the worker spawned by
/// [`StreamBridge::new`] parks inside [`Emitter::emit`] until the consumer
/// has taken the previous item.
pub struct Emitter<T> {
    tx: mpsc::Sender<Relayed<T>>,
    cancel: CancellationToken,
}

impl<T> Emitter<T> {
    /// Deposit `value` for the consumer, blocking while the single channel
    /// slot is occupied.
    ///
    /// Errors once the bridge has been cancelled or dropped; a producer loop
    /// should treat that as its signal to return early.
    pub fn emit(&self, value: T) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::ChannelClosed);
        }
        self.tx
            .blocking_send(Relayed::Item(value))
            .map_err(|_| Error::ChannelClosed)
    }

    /// True once [`StreamBridge::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Runs a producer function on a dedicated blocking worker and exposes the
/// values it emits as a sequence pulled with [`StreamBridge::next`].
///
/// The channel between the two holds a single item, so the producer can
/// never run more than one emit ahead of the consumer. Items arrive in
/// exact emit order, and exhaustion is always reached, even when the
/// producer panics: the end-of-stream marker is enqueued unconditionally,
/// and the panic resurfaces on [`StreamBridge::join`] rather than through
/// `next`.
pub struct StreamBridge<T, R> {
    rx: mpsc::Receiver<Relayed<T>>,
    worker: JoinHandle<R>,
    cancel: CancellationToken,
    exhausted: bool,
}

impl<T, R> StreamBridge<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    /// Start `producer` on the blocking pool immediately and return the
    /// consumer-side handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(producer: F) -> Self
    where
        F: FnOnce(Emitter<T>) -> R + Send + 'static,
    {
        Self::spawn(producer, None)
    }

    /// Like [`StreamBridge::new`], with a hook that observes the producer's
    /// return value.
    ///
    /// The hook runs at most once, on the worker, and only after the
    /// end-of-stream marker is already observable by the consumer. It is
    /// skipped when the producer panics; use [`StreamBridge::join`] to
    /// surface that case.
    pub fn with_completion_hook<F, H>(producer: F, hook: H) -> Self
    where
        F: FnOnce(Emitter<T>) -> R + Send + 'static,
        H: FnOnce(&R) + Send + 'static,
    {
        Self::spawn(producer, Some(Box::new(hook)))
    }

    fn spawn<F>(producer: F, hook: Option<CompletionHook<R>>) -> Self
    where
        F: FnOnce(Emitter<T>) -> R + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let emitter = Emitter {
            tx: tx.clone(),
            cancel: cancel.clone(),
        };

        let worker = tokio::task::spawn_blocking(move || {
            tracing::debug!("bridge worker started");
            let outcome = catch_unwind(AssertUnwindSafe(move || producer(emitter)));
            // The marker goes out exactly once, finished or failed, so a
            // consumer blocked in `next` is always released.
            let _ = tx.blocking_send(Relayed::End);
            match outcome {
                Ok(value) => {
                    if let Some(hook) = hook {
                        hook(&value);
                    }
                    value
                }
                Err(panic) => {
                    tracing::error!("producer panicked mid-generation");
                    resume_unwind(panic)
                }
            }
        });

        Self {
            rx,
            worker,
            cancel,
            exhausted: false,
        }
    }

    /// Pull the next produced value; `None` once the producer has finished.
    ///
    /// Exhaustion is sticky: subsequent calls return `None` immediately
    /// without touching the channel.
    pub async fn next(&mut self) -> Option<T> {
        if self.exhausted {
            return None;
        }
        match self.rx.recv().await {
            Some(Relayed::Item(value)) => Some(value),
            // A closed channel without the marker means the worker died
            // mid-send; either way the stream is over.
            Some(Relayed::End) | None => {
                self.exhausted = true;
                None
            }
        }
    }

    /// [`StreamBridge::next`] with an upper bound on the wait.
    ///
    /// A timeout is reported as [`Error::Timeout`], never as exhaustion.
    pub async fn next_timeout(&mut self, timeout: Duration) -> Result<Option<T>> {
        Ok(tokio::time::timeout(timeout, self.next()).await?)
    }

    /// Stop accepting items and release a producer blocked in
    /// [`Emitter::emit`].
    ///
    /// Items already sitting in the channel are still delivered. Without
    /// this call the producer always runs to completion while the bridge
    /// is alive.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        self.rx.close();
    }

    /// Wait for the worker and take the producer's return value.
    ///
    /// A producer panic resurfaces here as [`Error::Join`].
    pub async fn join(self) -> Result<R> {
        Ok(self.worker.await?)
    }
}

impl<T, R> Stream for StreamBridge<T, R> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exhausted {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Relayed::Item(value))) => Poll::Ready(Some(value)),
            Poll::Ready(Some(Relayed::End)) | Poll::Ready(None) => {
                this.exhausted = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;
    use tokio_stream::StreamExt;

    use super::*;
    use crate::stop::{SentinelMatcher, StoppingCriteria, TokenRelay};

    #[tokio::test]
    async fn drains_items_in_emit_order() {
        let mut bridge = StreamBridge::new(|emitter: Emitter<u32>| {
            for token in [3u32, 1, 4, 1, 5] {
                emitter.emit(token).unwrap();
            }
            5usize
        });

        let mut drained = Vec::new();
        while let Some(token) = bridge.next().await {
            drained.push(token);
        }

        assert_eq!(drained, vec![3, 1, 4, 1, 5]);
        assert_eq!(bridge.join().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn exhaustion_is_sticky() {
        let mut bridge = StreamBridge::new(|emitter: Emitter<u32>| {
            emitter.emit(7).unwrap();
        });

        assert_eq!(bridge.next().await, Some(7));
        assert_eq!(bridge.next().await, None);
        assert_eq!(bridge.next().await, None);
        assert_eq!(bridge.next().await, None);
    }

    #[tokio::test]
    async fn panic_surfaces_on_join_not_next() {
        let mut bridge = StreamBridge::new(|emitter: Emitter<u32>| -> () {
            emitter.emit(1).unwrap();
            emitter.emit(2).unwrap();
            panic!("weights corrupted");
        });

        assert_eq!(bridge.next().await, Some(1));
        assert_eq!(bridge.next().await, Some(2));
        assert_eq!(bridge.next().await, None);

        match bridge.join().await {
            Err(Error::Join(error)) => assert!(error.is_panic()),
            other => panic!("expected a join error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn producer_blocks_on_a_full_channel() {
        let emitted = Arc::new(AtomicUsize::new(0));
        let progress = emitted.clone();
        let mut bridge = StreamBridge::new(move |emitter: Emitter<u32>| {
            for token in 0..4 {
                emitter.emit(token).unwrap();
                progress.fetch_add(1, Ordering::SeqCst);
            }
        });

        // The slot holds token 0 and the worker is parked inside its
        // second emit.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(emitted.load(Ordering::SeqCst), 1);

        let mut drained = Vec::new();
        while let Some(token) = bridge.next().await {
            drained.push(token);
        }
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn timeout_is_not_exhaustion() {
        let (release, gate) = std::sync::mpsc::channel::<()>();
        let mut bridge = StreamBridge::new(move |emitter: Emitter<u32>| {
            gate.recv().unwrap();
            emitter.emit(42).unwrap();
        });

        let timed_out = bridge.next_timeout(Duration::from_millis(50)).await;
        assert!(matches!(timed_out, Err(Error::Timeout(_))));

        release.send(()).unwrap();
        let item = bridge.next_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(item, Some(42));
        assert_eq!(bridge.next().await, None);
    }

    #[tokio::test]
    async fn completion_hook_sees_the_result() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut bridge = StreamBridge::with_completion_hook(
            |emitter: Emitter<u32>| {
                emitter.emit(9).unwrap();
                "finished".to_string()
            },
            move |result: &String| {
                tx.send(result.clone()).unwrap();
            },
        );

        while bridge.next().await.is_some() {}

        // The hook runs on the worker; joining synchronizes with it.
        assert_eq!(bridge.join().await.unwrap(), "finished");
        assert_eq!(rx.recv().unwrap(), "finished");
    }

    #[tokio::test]
    async fn cancel_releases_a_blocked_producer() {
        let mut bridge = StreamBridge::new(|emitter: Emitter<u32>| {
            let mut sent = 0usize;
            while emitter.emit(0).is_ok() {
                sent += 1;
            }
            sent
        });

        assert_eq!(bridge.next().await, Some(0));
        bridge.cancel();

        let sent = bridge.join().await.unwrap();
        assert!(sent >= 1);
    }

    #[tokio::test]
    async fn stream_adapter_terminates() {
        let bridge = StreamBridge::new(|emitter: Emitter<u32>| {
            for token in [1u32, 2, 3] {
                emitter.emit(token).unwrap();
            }
        });

        let collected: Vec<u32> = bridge.collect().await;
        assert_eq!(collected, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn sentinel_halts_a_generation_loop() {
        let script = vec![5u32, 6, 7, 8, 9, 10];
        let mut matcher = SentinelMatcher::new(vec![7, 8], 0);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let seen = observed.clone();
        let mut relay = TokenRelay::new(move |token| seen.lock().unwrap().push(token));

        let mut bridge = StreamBridge::new(move |emitter: Emitter<u32>| {
            let mut sequence: Vec<u32> = Vec::new();
            for token in script {
                sequence.push(token);
                emitter.emit(token).unwrap();
                let batch = std::slice::from_ref(&sequence);
                relay.should_stop(batch);
                if matcher.should_stop(batch) {
                    break;
                }
            }
            sequence
        });

        let mut drained = Vec::new();
        while let Some(token) = bridge.next().await {
            drained.push(token);
        }

        assert_eq!(drained, vec![5, 6, 7, 8]);
        assert_eq!(bridge.join().await.unwrap(), vec![5, 6, 7, 8]);
        assert_eq!(*observed.lock().unwrap(), vec![5, 6, 7, 8]);
    }
}
