use connector_mime::completion::{CompletionGuard, Resolution, WriteResult};
use std::io;
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Report {
    Success,
    Timeout,
    Error,
}

fn classify(result: &WriteResult) -> Report {
    match result {
        Ok(()) => Report::Success,
        Err(err) if err.is_timeout() => Report::Timeout,
        Err(_) => Report::Error,
    }
}

#[test]
fn concurrent_reports_deliver_exactly_once() {
    const THREADS: usize = 8;

    for _ in 0..200 {
        let (tx, rx) = mpsc::channel::<WriteResult>();
        let guard = CompletionGuard::arm(tx);
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|idx| {
                let guard = guard.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let report = match idx % 3 {
                        0 => Report::Success,
                        1 => Report::Timeout,
                        _ => Report::Error,
                    };
                    let resolution = match report {
                        Report::Success => guard.report_success(),
                        Report::Timeout => guard.report_timeout("timer fired"),
                        Report::Error => guard.report_error(io::Error::new(io::ErrorKind::BrokenPipe, "closed")),
                    };
                    (report, resolution)
                })
            })
            .collect();

        let outcomes: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("reporting thread panicked"))
            .collect();
        drop(guard);

        let winners: Vec<_> = outcomes
            .iter()
            .filter(|(_, resolution)| *resolution == Resolution::Delivered)
            .collect();
        assert_eq!(winners.len(), 1, "exactly one report must win: {:?}", outcomes);
        assert!(outcomes
            .iter()
            .all(|(_, resolution)| *resolution != Resolution::SinkClosed));

        let delivered: Vec<WriteResult> = rx.iter().collect();
        assert_eq!(delivered.len(), 1);
        assert_eq!(classify(&delivered[0]), winners[0].0);
    }
}

#[test]
fn reports_after_resolution_are_silent() {
    let (tx, rx) = mpsc::channel::<WriteResult>();
    let guard = CompletionGuard::arm(tx);

    assert_eq!(guard.report_timeout("deadline"), Resolution::Delivered);
    for _ in 0..3 {
        assert_eq!(guard.report_success(), Resolution::AlreadyResolved);
        assert_eq!(guard.report_error("late failure"), Resolution::AlreadyResolved);
    }

    drop(guard);
    let delivered: Vec<WriteResult> = rx.iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(classify(&delivered[0]), Report::Timeout);
}

#[tokio::test]
async fn timer_and_transport_race() {
    let (tx, rx) = tokio::sync::oneshot::channel::<WriteResult>();
    let guard = CompletionGuard::arm(tx);

    let timer = guard.spawn_timeout(Duration::from_millis(5));
    let writer = {
        let guard = guard.clone();
        tokio::task::spawn_blocking(move || guard.report_success())
    };

    let timer = timer.await.unwrap();
    let writer = writer.await.unwrap();

    let delivered = [timer, writer]
        .iter()
        .filter(|resolution| **resolution == Resolution::Delivered)
        .count();
    assert_eq!(delivered, 1);

    let result = rx.await.unwrap();
    if writer == Resolution::Delivered {
        assert!(result.is_ok());
    } else {
        assert!(result.unwrap_err().is_timeout());
    }
}
