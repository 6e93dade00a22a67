//! Cycle-phase synchronization integration coverage for the direct space.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot as _;
use proptest::prelude::*;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use simregs_core::{
    AddressSpace, CancelToken, CyclePhase, DirectAddressSpace, RegisterError, Sdk, SpaceConfig,
    WaitCondition, WaitOutcome, GPIO_BASE, GPIO_IN_OFFSET, GPIO_OUT_OFFSET, PHASE_ADDR,
    SETTLED_SENTINEL_ADDR, SETTLING_SENTINEL_ADDR,
};
use thiserror as _;
use tracing as _;

const GPIO_IN: u32 = GPIO_BASE + GPIO_IN_OFFSET;
const GPIO_OUT: u32 = GPIO_BASE + GPIO_OUT_OFFSET;

#[test]
fn sentinels_increase_by_one_per_trigger() {
    let space = DirectAddressSpace::default();
    for n in 1..=5u32 {
        space.trigger(CyclePhase::Settling, false).expect("settling");
        assert_eq!(space.read(SETTLING_SENTINEL_ADDR), Ok(n));
        assert_eq!(space.read(PHASE_ADDR), Ok(0));
        space.trigger(CyclePhase::Settled, false).expect("settled");
        assert_eq!(space.read(SETTLED_SENTINEL_ADDR), Ok(n));
        assert_eq!(space.read(PHASE_ADDR), Ok(1));
    }
}

#[test]
fn back_to_back_triggers_never_strand_a_waiter() {
    let space = Arc::new(DirectAddressSpace::default());
    let start = space.read(SETTLED_SENTINEL_ADDR).expect("sentinel");

    let observer = {
        let space = Arc::clone(&space);
        thread::spawn(move || {
            space.wait(
                &WaitCondition::new(SETTLED_SENTINEL_ADDR, start + 1).with_millis_timeout(5_000),
                None,
            )
        })
    };
    for _ in 0..3 {
        space.step(false).expect("step");
    }

    let outcome = observer.join().expect("observer thread").expect("wait");
    assert!(outcome.is_satisfied());
}

#[test]
fn observers_of_one_commit_see_the_same_snapshot() {
    let space = Arc::new(DirectAddressSpace::default());
    let start = space.read(SETTLED_SENTINEL_ADDR).expect("sentinel");
    let ready = Arc::new(Barrier::new(3));

    let observers: Vec<_> = (0..2)
        .map(|_| {
            let space = Arc::clone(&space);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                ready.wait();
                let outcome = space
                    .wait(&WaitCondition::new(SETTLED_SENTINEL_ADDR, start + 1), None)
                    .expect("wait");
                assert!(outcome.is_satisfied());
                space.read(GPIO_IN).expect("read")
            })
        })
        .collect();

    ready.wait();
    thread::sleep(Duration::from_millis(20));
    space.trigger(CyclePhase::Settling, false).expect("settling");
    space.store(GPIO_IN, 0x00C0_FFEE).expect("engine store");
    let outcome = space.trigger(CyclePhase::Settled, true).expect("settled");
    assert!(outcome.acknowledged);

    for observer in observers {
        assert_eq!(observer.join().expect("observer thread"), 0x00C0_FFEE);
    }
}

#[test]
fn acknowledgment_is_bounded_when_nobody_observes() {
    let space = DirectAddressSpace::new(SpaceConfig {
        ack_timeout: Duration::from_millis(10),
    });
    let started = Instant::now();
    let outcome = space.trigger(CyclePhase::Settled, true).expect("settled");
    assert_eq!(outcome.watchers, 0);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[rstest]
#[case(20)]
#[case(60)]
fn millis_timeout_bounds_wall_clock(#[case] millis: u64) {
    let space = DirectAddressSpace::default();
    let started = Instant::now();
    let outcome = space
        .wait(&WaitCondition::new(GPIO_OUT, 1).with_millis_timeout(millis), None)
        .expect("wait");
    let elapsed = started.elapsed();
    assert_eq!(outcome, WaitOutcome::TimedOut { cycles: 0 });
    assert!(elapsed >= Duration::from_millis(millis));
    assert!(elapsed < Duration::from_millis(millis + 1_000));
}

#[test]
fn either_bound_ends_the_wait() {
    let space = Arc::new(DirectAddressSpace::default());
    let cancel = CancelToken::new();
    let engine = {
        let space = Arc::clone(&space);
        let cancel = cancel.clone();
        thread::spawn(move || {
            while !cancel.is_cancelled() {
                space.step(false).expect("step");
                thread::sleep(Duration::from_millis(1));
            }
        })
    };
    let outcome = space
        .wait(
            &WaitCondition::new(GPIO_OUT, 1)
                .with_cycles_timeout(5)
                .with_millis_timeout(10_000),
            None,
        )
        .expect("wait");
    cancel.cancel();
    engine.join().expect("engine thread");
    assert!(matches!(outcome, WaitOutcome::TimedOut { cycles } if cycles >= 5));
}

#[test]
fn cancelled_unbounded_wait_is_interrupted() {
    let space = Arc::new(DirectAddressSpace::default());
    let cancel = CancelToken::new();
    let waiter = {
        let space = Arc::clone(&space);
        let cancel = cancel.clone();
        thread::spawn(move || {
            space.wait(
                &WaitCondition::new(SETTLED_SENTINEL_ADDR, 100),
                Some(&cancel),
            )
        })
    };
    thread::sleep(Duration::from_millis(20));
    cancel.cancel();
    assert_eq!(
        waiter.join().expect("waiter thread"),
        Err(RegisterError::Interrupted)
    );
}

#[test]
fn await_next_cycle_spans_a_full_cycle() {
    let space = Arc::new(DirectAddressSpace::default());
    let sdk = Sdk::new(space.clone());
    let waiter = thread::spawn(move || sdk.await_next_cycle(None));

    thread::sleep(Duration::from_millis(20));
    space.step(true).expect("first step");
    while !waiter.is_finished() {
        space.trigger(CyclePhase::Settling, false).expect("settling");
        thread::sleep(Duration::from_millis(1));
    }

    assert_eq!(waiter.join().expect("waiter thread"), Ok(1));
}

proptest! {
    #[test]
    fn wait_matches_masked_equality(
        value in any::<u32>(),
        expected in any::<u32>(),
        mask in any::<u32>(),
    ) {
        let space = DirectAddressSpace::default();
        space.write(GPIO_OUT, value).expect("write");
        let condition = WaitCondition::new(GPIO_OUT, expected)
            .with_mask(mask)
            .with_millis_timeout(1);
        let outcome = space.wait(&condition, None).expect("wait");
        prop_assert_eq!(outcome.is_satisfied(), value & mask == expected & mask);
    }
}
