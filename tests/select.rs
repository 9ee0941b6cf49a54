use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use ignore_result::Ignore;
use more_asserts::assert_ge;
use pretty_assertions::assert_eq;
use sluice::select::{recv, select, select_or, select_stop, send};
use sluice::{rendezvous, unbounded, StopSource};

const WAIT: Duration = Duration::from_millis(50);

// Records which send op won and asserts it is the only one.
fn record(winner: &Arc<Mutex<String>>, name: &str) -> impl FnOnce(bool) + Send + 'static {
    let winner = winner.clone();
    let name = name.to_string();
    move |ok| {
        assert!(ok);
        let mut winner = winner.lock().unwrap();
        assert_eq!(*winner, "");
        *winner = name;
    }
}

#[test]
fn select_commits_exactly_one_eager_operation() {
    let numbers = unbounded::<i32>();
    let words = unbounded::<String>();

    let winner = Arc::new(Mutex::new(String::new()));
    select(&mut [
        &mut recv(&numbers),
        &mut send(&words, "foo").on_settled(record(&winner, "foo")),
        &mut send(&words, "bar").on_settled(record(&winner, "bar")),
    ]);

    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 1);
    assert_eq!(*winner.lock().unwrap(), "foo");

    words.send("baz".to_string()).unwrap();
    assert_eq!(words.recv().as_deref(), Ok("foo"));
    assert_eq!(words.recv().as_deref(), Ok("baz"));
}

#[test]
fn select_commits_when_another_thread_sends() {
    let numbers = unbounded::<i32>();
    let words = unbounded::<String>();

    let start = Instant::now();
    let sender = thread::spawn({
        let words = words.clone();
        move || {
            thread::sleep(WAIT);
            words.send("foo".to_string()).ignore();
        }
    });

    let committed = Arc::new(AtomicUsize::new(0));
    let arm = |index: usize| {
        let committed = committed.clone();
        move |value: Option<String>| {
            assert_eq!(value.as_deref(), Some("foo"));
            assert_eq!(committed.swap(index, Ordering::Relaxed), 0);
        }
    };

    select(&mut [&mut recv(&numbers), &mut recv(&words).on_settled(arm(1)), &mut recv(&words).on_settled(arm(2))]);
    assert_ge!(start.elapsed(), WAIT);
    sender.join().unwrap();

    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 0);
    assert!(committed.load(Ordering::Relaxed) != 0);

    words.send("bar".to_string()).unwrap();
    assert_eq!(words.recv().as_deref(), Ok("bar"));
}

#[test]
fn select_commits_when_another_thread_receives() {
    let numbers = rendezvous::<i32>();
    let words = rendezvous::<String>();

    let start = Instant::now();
    let receiver = thread::spawn({
        let words = words.clone();
        move || {
            thread::sleep(WAIT);
            words.recv()
        }
    });

    let winner = Arc::new(Mutex::new(String::new()));
    select(&mut [
        &mut send(&numbers, 42),
        &mut send(&words, "foo").on_settled(record(&winner, "foo")),
        &mut send(&words, "bar").on_settled(record(&winner, "bar")),
    ]);
    assert_ge!(start.elapsed(), WAIT);

    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 0);

    let received = receiver.join().unwrap().unwrap();
    let winner = winner.lock().unwrap();
    assert!(!winner.is_empty());
    assert_eq!(*winner, received);
}

#[test]
fn select_canceled_by_closure() {
    let numbers = rendezvous::<i32>();
    let words = rendezvous::<String>();

    let start = Instant::now();
    let closer = thread::spawn({
        let words = words.clone();
        move || {
            thread::sleep(WAIT);
            words.close();
        }
    });

    let settled = Arc::new(AtomicUsize::new(0));
    let count = || {
        let settled = settled.clone();
        move |ok: bool| {
            assert!(!ok);
            settled.fetch_add(1, Ordering::Relaxed);
        }
    };

    select(&mut [
        &mut recv(&numbers),
        &mut send(&words, "foo").on_settled(count()),
        &mut send(&words, "bar").on_settled(count()),
    ]);
    assert_ge!(start.elapsed(), WAIT);
    closer.join().unwrap();

    assert_eq!(settled.load(Ordering::Relaxed), 1);
    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 0);
}

#[test]
fn select_canceled_by_stop() {
    let numbers = rendezvous::<i32>();
    let words = rendezvous::<String>();
    let source = StopSource::new();

    let start = Instant::now();
    let stopper = thread::spawn({
        let source = source.clone();
        move || {
            thread::sleep(WAIT);
            source.request_stop();
        }
    });

    select_stop(&source.token(), &mut [
        &mut recv(&numbers).on_settled(|_| panic!("select was canceled")),
        &mut send(&words, "foo").on_settled(|_| panic!("select was canceled")),
    ]);
    assert_ge!(start.elapsed(), WAIT);
    stopper.join().unwrap();

    assert_eq!(numbers.size(), 0);
    assert_eq!(words.size(), 0);
}

#[test]
fn select_does_not_rendezvous_with_itself() {
    let chan = rendezvous::<i32>();
    let receiver = thread::spawn({
        let chan = chan.clone();
        move || {
            thread::sleep(WAIT);
            chan.recv()
        }
    });

    let sent = Arc::new(AtomicUsize::new(0));
    let received = Arc::new(AtomicUsize::new(0));
    select(&mut [
        &mut recv(&chan).on_settled({
            let received = received.clone();
            move |_| {
                received.fetch_add(1, Ordering::Relaxed);
            }
        }),
        &mut send(&chan, 7).on_settled({
            let sent = sent.clone();
            move |ok| {
                assert!(ok);
                sent.fetch_add(1, Ordering::Relaxed);
            }
        }),
    ]);

    // The armed send may only pair with the external receiver, never with the
    // armed receive of its own select.
    assert_eq!(receiver.join().unwrap(), Ok(7));
    assert_eq!(sent.load(Ordering::Relaxed), 1);
    assert_eq!(received.load(Ordering::Relaxed), 0);
    assert_eq!(chan.size(), 0);
}

#[test]
fn select_fallback_when_nothing_ready() {
    let numbers = rendezvous::<i32>();
    let mut fell_back = false;
    select_or(&mut [&mut recv(&numbers)], || fell_back = true);
    assert!(fell_back);
    assert_eq!(numbers.size(), 0);
}

#[test]
fn contended_selects_receive_every_value_once() {
    let chan = rendezvous::<i32>();
    let feeder = thread::spawn({
        let chan = chan.clone();
        move || {
            for value in 0..100 {
                chan.send(value).ignore();
            }
            chan.close();
        }
    });

    let seen = Arc::new(AtomicUsize::new(0));
    let pickers: Vec<_> = (0..2)
        .map(|_| {
            thread::spawn({
                let chan = chan.clone();
                let seen = seen.clone();
                move || loop {
                    let done = Arc::new(AtomicUsize::new(0));
                    select(&mut [&mut recv(&chan).on_settled({
                        let seen = seen.clone();
                        let done = done.clone();
                        move |value| {
                            if value.is_some() {
                                seen.fetch_add(1, Ordering::Relaxed);
                            } else {
                                done.store(1, Ordering::Relaxed);
                            }
                        }
                    })]);
                    if done.load(Ordering::Relaxed) == 1 {
                        return;
                    }
                }
            })
        })
        .collect();

    feeder.join().unwrap();
    for picker in pickers {
        picker.join().unwrap();
    }
    assert_eq!(seen.load(Ordering::Relaxed), 100);
}
