// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ask tags: unique per connection, echoed back by answers.

use std::collections::HashSet;

use tokio::net::TcpListener;

use crate::prelude::*;

#[tokio::test]
async fn outgoing_tags_are_unique() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let peer = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut raw = RawClient::from_stream(stream);
        let mut tags = Vec::new();
        for _ in 0..100 {
            let ampbox = raw.recv().await.unwrap();
            tags.push(ampbox.get(b"_ask").unwrap().to_vec());
        }
        tags
    });

    let client = Amp::client().spawn(TcpStream::connect(addr).await.unwrap());
    for i in 0..100 {
        // Never answered; only the tags matter.
        drop(client.call_remote(&responders::sum(), &sum_args(i, 1)));
    }

    let tags = peer.await.unwrap();
    let unique: HashSet<_> = tags.iter().collect();
    assert_eq!(unique.len(), tags.len());
}

#[tokio::test]
async fn answers_echo_the_ask_tag() {
    let daemon = TestDaemon::start().await;
    let mut raw = daemon.raw().await;

    for tag in ["1", "ff", "abc"] {
        raw.send([("_command", "Echo"), ("_ask", tag), ("text", tag)]).await;
    }
    for tag in ["1", "ff", "abc"] {
        let answer = raw.recv().await.unwrap();
        assert_eq!(answer.get(b"_answer"), Some(tag.as_bytes()));
    }

    daemon.stop().await;
}
