// Integration tests for the device handle: half-duplex exchange, timeouts, close and resync
use async_trait::async_trait;
use nexstar_rs::communication::{DeviceHandle, Transport};
use nexstar_rs::{MountError, MountResult, SimulatedMount};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TIMEOUT: Duration = Duration::from_secs(2);

fn handle(sim: &SimulatedMount) -> Arc<DeviceHandle> {
    Arc::new(DeviceHandle::with_transport(Box::new(sim.clone()), TIMEOUT))
}

#[tokio::test(start_paused = true)]
async fn test_silent_transport_times_out_after_window() {
    let sim = SimulatedMount::new();
    sim.set_silent(true);
    let device = handle(&sim);

    let started = Instant::now();
    let err = device.exchange(b"V", 3).await.unwrap_err();
    assert!(matches!(err, MountError::Timeout(d) if d == TIMEOUT));
    let elapsed = started.elapsed();
    assert!(elapsed >= TIMEOUT && elapsed < TIMEOUT + Duration::from_millis(50), "{:?}", elapsed);
    // Timeouts are not retried.
    assert_eq!(sim.frames().len(), 1);
}

#[tokio::test]
async fn test_unterminated_reply_is_malformed_and_link_recovers() {
    let sim = SimulatedMount::new();
    let device = handle(&sim);

    sim.corrupt_next_reply();
    let err = device.exchange(b"V", 3).await.unwrap_err();
    assert!(matches!(err, MountError::MalformedResponse(_)));

    assert_eq!(device.exchange(b"V", 3).await.unwrap(), vec![4, 21]);
}

#[tokio::test(start_paused = true)]
async fn test_stale_reply_after_timeout_is_discarded() {
    let sim = SimulatedMount::new();
    let device = handle(&sim);

    // Ask for more bytes than the controller sends; the short reply stays buffered.
    let err = device.exchange(b"V", 4).await.unwrap_err();
    assert!(matches!(err, MountError::Timeout(_)));

    assert_eq!(device.exchange(b"m", 2).await.unwrap(), vec![12]);
}

#[tokio::test(start_paused = true)]
async fn test_close_aborts_outstanding_wait() {
    let sim = SimulatedMount::new();
    sim.set_silent(true);
    let device = handle(&sim);

    let waiting = {
        let device = device.clone();
        tokio::spawn(async move { device.exchange(b"V", 3).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    device.close().await;

    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, MountError::NotConnected));
    assert!(started.elapsed() < TIMEOUT);
    assert!(!device.is_connected());
}

#[tokio::test]
async fn test_exchange_after_close_sends_nothing() {
    let sim = SimulatedMount::new();
    let device = handle(&sim);
    device.close().await;
    device.close().await;

    let err = device.exchange(b"V", 3).await.unwrap_err();
    assert!(matches!(err, MountError::NotConnected));
    assert!(sim.frames().is_empty());
}

/// Answers every frame with `#`, and records whether a frame ever arrived
/// while a previous reply was still owed.
#[derive(Clone, Default)]
struct OverlapDetector {
    in_flight: Arc<AtomicBool>,
    overlapped: Arc<AtomicBool>,
    exchanges: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for OverlapDetector {
    async fn send(&mut self, _frame: &[u8]) -> MountResult<()> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn receive(&mut self, len: usize) -> MountResult<Vec<u8>> {
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.in_flight.store(false, Ordering::SeqCst);
        Ok(vec![b'#'; len])
    }

    fn describe(&self) -> String {
        "overlap detector".to_string()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_never_interleave() {
    let detector = OverlapDetector::default();
    let device = Arc::new(DeviceHandle::with_transport(Box::new(detector.clone()), TIMEOUT));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let device = device.clone();
            tokio::spawn(async move { device.exchange(b"M", 1).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), Vec::<u8>::new());
    }

    assert_eq!(detector.exchanges.load(Ordering::SeqCst), 16);
    assert!(!detector.overlapped.load(Ordering::SeqCst));
}
