//! Scan session lifecycle against a channel camera

use guardpost::{CaptureDevice, ChannelDevice, Frame, ScanError, ScanSessionManager, ScanTarget};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<ChannelDevice>, ScanSessionManager) {
    let camera = Arc::new(ChannelDevice::new(4));
    let manager = ScanSessionManager::new(camera.clone());
    (camera, manager)
}

#[tokio::test]
async fn dropped_subscription_releases_camera() {
    let (camera, manager) = setup();
    let sub = manager.start(ScanTarget::Worker).unwrap();
    assert!(camera.is_acquired());
    assert_eq!(manager.active_target(), Some(ScanTarget::Worker));

    drop(sub);
    assert!(!manager.is_active());
    assert!(!camera.is_acquired());
    assert!(!camera.push_decoded("12345678-9"));
}

#[tokio::test]
async fn frames_from_a_finished_session_never_reach_the_next() {
    let (camera, manager) = setup();
    let first = manager.start(ScanTarget::Worker).unwrap();
    camera.push_decoded("12345678-9");
    camera.push_decoded("11111111-1");
    let event = first.next_decode().await.unwrap();
    assert_eq!(event.text, "12345678-9");

    let second = manager.start(ScanTarget::Box).unwrap();
    camera.push_decoded("CAJA-IND-001");
    let event = second.next_decode().await.unwrap();
    assert_eq!(event.target, ScanTarget::Box);
    assert_eq!(event.text, "CAJA-IND-001");
}

#[tokio::test]
async fn blank_and_unreadable_frames_are_skipped() {
    let (camera, manager) = setup();
    let sub = manager.start(ScanTarget::Box).unwrap();
    camera.push(Frame::Unreadable);
    camera.push_decoded("   ");
    camera.push_decoded(" CAJA-PF-001\n");

    let event = sub.next_decode().await.unwrap();
    assert_eq!(event.text, "CAJA-PF-001");
}

#[tokio::test]
async fn released_device_ends_the_wait() {
    let (camera, manager) = setup();
    let sub = manager.start(ScanTarget::Worker).unwrap();
    let waiter = tokio::spawn(sub.next_decode());
    tokio::task::yield_now().await;

    // Device gone underneath the session: the feed closes.
    camera.release();
    let result = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result, None);
    assert!(!manager.is_active());
}

#[tokio::test]
async fn exclusive_until_stopped() {
    let (_camera, manager) = setup();
    let sub = manager.start(ScanTarget::Box).unwrap();
    for target in [ScanTarget::Worker, ScanTarget::Box] {
        assert_eq!(
            manager.start(target).err(),
            Some(ScanError::AlreadyActive {
                target: ScanTarget::Box
            })
        );
    }
    manager.stop_session(sub.id());
    assert!(manager.start(ScanTarget::Worker).is_ok());
}

struct BrokenCamera;

impl CaptureDevice for BrokenCamera {
    fn acquire(&self) -> Result<guardpost::FrameFeed, ScanError> {
        Err(ScanError::DeviceUnavailable {
            message: "no /dev/video0".into(),
        })
    }

    fn release(&self) {}

    fn name(&self) -> &str {
        "broken"
    }
}

#[tokio::test]
async fn acquisition_failure_leaves_no_session() {
    let manager = ScanSessionManager::new(Arc::new(BrokenCamera));
    assert!(matches!(
        manager.start(ScanTarget::Worker),
        Err(ScanError::DeviceUnavailable { .. })
    ));
    assert!(!manager.is_active());
}

/// Channel camera whose release takes a while, like a decoder process
/// being killed.
#[derive(Default)]
struct SlowReleaseCamera {
    inner: ChannelDevice,
}

impl CaptureDevice for SlowReleaseCamera {
    fn acquire(&self) -> Result<guardpost::FrameFeed, ScanError> {
        self.inner.acquire()
    }

    fn release(&self) {
        std::thread::sleep(Duration::from_millis(100));
        self.inner.release();
    }

    fn name(&self) -> &str {
        "slow-release"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_release_never_tears_down_a_newer_session() {
    let camera = Arc::new(SlowReleaseCamera::default());
    let manager = ScanSessionManager::new(camera.clone());

    let first = manager.start(ScanTarget::Worker).unwrap();
    let dropper = std::thread::spawn(move || drop(first));
    std::thread::sleep(Duration::from_millis(20));

    // Waits for the first session's release to finish before acquiring.
    let second = manager.start(ScanTarget::Box).unwrap();
    dropper.join().unwrap();

    assert!(manager.is_active());
    assert!(camera.inner.is_acquired());
    assert!(camera.inner.push_decoded("CAJA-IND-001"));
    let event = tokio::time::timeout(Duration::from_secs(1), second.next_decode())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.target, ScanTarget::Box);
    assert_eq!(event.text, "CAJA-IND-001");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_stop_session_leaves_newer_session_running() {
    let camera = Arc::new(SlowReleaseCamera::default());
    let manager = Arc::new(ScanSessionManager::new(camera.clone()));

    let first = manager.start(ScanTarget::Worker).unwrap();
    let first_id = first.id();
    let stopper = {
        let manager = Arc::clone(&manager);
        std::thread::spawn(move || manager.stop_session(first_id))
    };
    std::thread::sleep(Duration::from_millis(20));
    drop(first);

    let second = manager.start(ScanTarget::Box).unwrap();
    stopper.join().unwrap();
    assert!(camera.inner.is_acquired());
    assert!(camera.inner.push_decoded("CAJA-PF-001"));
    assert_eq!(second.next_decode().await.unwrap().text, "CAJA-PF-001");
}
