//! Pool behavior against the controllable stub driver: caps, reuse,
//! overdue reclaim, ping validation and bad-connection tolerance.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sql_mapper::datasource::{DataSource, PooledDataSource};
use sql_mapper::driver::stub::{StubDriver, StubState};
use sql_mapper::driver::{ConnectionSpec, Driver, StatementSpec};
use sql_mapper::types::DbValue;

fn stub_pool(state: Arc<StubState>) -> PooledDataSource {
    let driver: Arc<dyn Driver> = Arc::new(StubDriver::with_state(state));
    PooledDataSource::new(
        driver,
        ConnectionSpec {
            url: "stub://db".into(),
            username: "u".into(),
            password: "p".into(),
            ..ConnectionSpec::default()
        },
    )
}

#[test]
fn idle_connections_are_reused() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone());

    for _ in 0..5 {
        let mut conn = pool.get_connection().unwrap();
        conn.execute(&StatementSpec::prepared("UPDATE t SET x = 1"), &[])
            .unwrap();
        conn.close().unwrap();
    }

    // One real connection serviced all five checkouts.
    assert_eq!(state.opened.load(Ordering::SeqCst), 1);
    let status = pool.status();
    assert_eq!(status.request_count, 5);
    assert_eq!(status.idle_connections, 1);
    assert_eq!(status.active_connections, 0);
}

#[test]
fn active_count_respects_the_cap() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone()).with_max_active(3).with_max_idle(3);

    let conns: Vec<_> = (0..3).map(|_| pool.get_connection().unwrap()).collect();
    let status = pool.status();
    assert_eq!(status.active_connections, 3);
    assert!(status.active_connections <= 3);

    for mut conn in conns {
        conn.close().unwrap();
    }
    let status = pool.status();
    assert!(status.idle_connections + status.active_connections <= 6);
    assert_eq!(status.active_connections, 0);
}

#[test]
fn surplus_idle_connections_are_closed() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone()).with_max_active(4).with_max_idle(1);

    let conns: Vec<_> = (0..4).map(|_| pool.get_connection().unwrap()).collect();
    for mut conn in conns {
        conn.close().unwrap();
    }

    assert_eq!(pool.status().idle_connections, 1);
    assert_eq!(state.closed.load(Ordering::SeqCst), 3);
}

#[test]
fn waiter_wakes_when_connection_returns() {
    let state = Arc::new(StubState::default());
    let pool = Arc::new(
        stub_pool(state)
            .with_max_active(1)
            .with_max_checkout_time(Duration::from_secs(60))
            .with_wait_time(Duration::from_secs(5)),
    );

    let mut held = pool.get_connection().unwrap();
    let waiter = {
        let pool = pool.clone();
        thread::spawn(move || {
            let mut conn = pool.get_connection().unwrap();
            conn.close().unwrap();
        })
    };

    thread::sleep(Duration::from_millis(50));
    held.close().unwrap();
    waiter.join().unwrap();

    let status = pool.status();
    assert_eq!(status.had_to_wait_count, 1);
    assert_eq!(status.active_connections, 0);
}

#[test]
fn overdue_connection_is_reclaimed() {
    let state = Arc::new(StubState::default());
    let pool = Arc::new(
        stub_pool(state)
            .with_max_active(1)
            .with_max_checkout_time(Duration::from_millis(10))
            .with_wait_time(Duration::from_secs(5)),
    );

    let mut first = pool.get_connection().unwrap();
    thread::sleep(Duration::from_millis(50));

    // The second request reclaims the overdue holder's connection.
    let mut second = pool.get_connection().unwrap();
    assert_eq!(pool.status().claimed_overdue_connection_count, 1);

    // The overdue holder's wrapper is dead, and its close is harmless.
    let err = first
        .execute(&StatementSpec::prepared("UPDATE t SET x = 1"), &[])
        .unwrap_err();
    assert!(err.to_string().contains("Pool error"));
    first.close().unwrap();

    second
        .execute(&StatementSpec::prepared("UPDATE t SET x = 1"), &[])
        .unwrap();
    second.close().unwrap();

    let status = pool.status();
    assert_eq!(status.active_connections, 0);
    assert_eq!(status.idle_connections, 1);
}

#[test]
fn ping_failure_discards_idle_connection() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone()).with_ping("SELECT 1", Duration::ZERO);

    let mut conn = pool.get_connection().unwrap();
    conn.close().unwrap();
    assert_eq!(pool.status().idle_connections, 1);
    let opened_before = state.opened.load(Ordering::SeqCst);

    // While pings fail, nothing valid can be produced at all.
    state.fail_pings.store(true, Ordering::SeqCst);
    assert!(pool.get_connection().is_err());
    assert!(state.closed.load(Ordering::SeqCst) >= 1);

    // Once the engine recovers, a fresh real connection replaces the
    // discarded idle one.
    state.fail_pings.store(false, Ordering::SeqCst);
    let mut conn = pool.get_connection().unwrap();
    conn.query(&StatementSpec::prepared("SELECT 1"), &[DbValue::Int(1)])
        .unwrap();
    conn.close().unwrap();
    assert!(state.opened.load(Ordering::SeqCst) > opened_before);
}

#[test]
fn bad_connections_exhaust_tolerance() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone())
        .with_max_active(2)
        .with_max_idle(0)
        .with_ping("SELECT 1", Duration::ZERO);

    state.fail_pings.store(true, Ordering::SeqCst);
    let err = pool.get_connection().unwrap_err();
    assert!(err.to_string().contains("Pool error"));
    assert!(pool.status().bad_connection_count > 0);
}

#[test]
fn force_close_all_drains_both_lists() {
    let state = Arc::new(StubState::default());
    let pool = stub_pool(state.clone()).with_max_active(2).with_max_idle(2);

    let mut active = pool.get_connection().unwrap();
    let mut idle = pool.get_connection().unwrap();
    idle.close().unwrap();

    pool.force_close_all();
    let status = pool.status();
    assert_eq!(status.active_connections, 0);
    assert_eq!(status.idle_connections, 0);
    assert_eq!(state.closed.load(Ordering::SeqCst), 2);

    // The invalidated holder cannot use its wrapper any more.
    assert!(active
        .execute(&StatementSpec::prepared("UPDATE t"), &[])
        .is_err());
    active.close().unwrap();
}
