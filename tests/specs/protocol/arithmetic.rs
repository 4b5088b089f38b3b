// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Demo arithmetic over a real socket.

use crate::prelude::*;

#[tokio::test]
async fn sum_of_13_and_81_is_94() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let result = client.call_remote(&responders::sum(), &sum_args(13, 81)).await.unwrap();
    assert_eq!(result.i64("total"), Some(94));

    daemon.stop().await;
}

#[tokio::test]
async fn sum_on_the_wire() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("_command", "Sum"), ("_ask", "1"), ("a", "13"), ("b", "81")]).await;
    let answer = raw.recv().await.unwrap();
    assert_eq!(answer.get(b"_answer"), Some(&b"1"[..]));
    assert_eq!(answer.get(b"total"), Some(&b"94"[..]));

    daemon.stop().await;
}

#[tokio::test]
async fn many_calls_share_one_connection() {
    let daemon = TestDaemon::start().await;
    let client = daemon.client().await;

    let calls: Vec<_> =
        (0..64).map(|i| client.call_remote(&responders::sum(), &sum_args(i, i))).collect();
    for (i, call) in calls.into_iter().enumerate() {
        let result = call.await.unwrap();
        assert_eq!(result.i64("total"), Some(2 * i as i64));
    }

    daemon.stop().await;
}

#[tokio::test]
async fn commands_without_ask_get_no_answer() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    raw.send([("_command", "Sum"), ("a", "1"), ("b", "2")]).await;
    raw.send([("_command", "Echo"), ("_ask", "7"), ("text", "after")]).await;
    let answer = raw.recv().await.unwrap();
    assert_eq!(answer.get(b"_answer"), Some(&b"7"[..]));
    assert_eq!(answer.get(b"text"), Some(&b"after"[..]));

    daemon.stop().await;
}
