// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: length-prefix framing and JSON encoding.

use super::*;

#[test]
fn encode_emits_bare_json_with_a_type_tag() {
    let encoded = encode(&Response::Error {
        kind: "not_found".into(),
        message: "task-1".into(),
    })
    .expect("encode");

    // Framing is the transport's job; encode() stays prefix-free JSON.
    let json: serde_json::Value = serde_json::from_slice(&encoded).expect("valid JSON");
    assert_eq!(json["type"], "Error");
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn framed_payload_carries_its_own_length() {
    let payload = b"submit task";

    let mut frame = Vec::new();
    write_message(&mut frame, payload).await.expect("write");

    // 4-byte big-endian length, then the payload verbatim.
    let declared = u32::from_be_bytes(frame[..4].try_into().expect("prefix")) as usize;
    assert_eq!(declared, payload.len());
    assert_eq!(&frame[4..], payload);

    let mut cursor = std::io::Cursor::new(frame);
    assert_eq!(read_message(&mut cursor).await.expect("read"), payload);
}

#[tokio::test]
async fn empty_payload_frames_cleanly() {
    let mut frame = Vec::new();
    write_message(&mut frame, b"").await.expect("write");
    assert_eq!(frame, 0u32.to_be_bytes());

    let mut cursor = std::io::Cursor::new(frame);
    assert_eq!(read_message(&mut cursor).await.expect("read"), Vec::<u8>::new());
}

#[tokio::test]
async fn request_roundtrips_through_framed_stream() {
    let request = Request::SubmitTask {
        description: "Fix the login bug".into(),
        scope_paths: vec!["/src/auth".into()],
        github_owner: Some("acme".into()),
        github_repo: Some("api".into()),
        github_issue_number: Some(42),
        source_working_dir: None,
    };

    let mut buffer = Vec::new();
    write_request(&mut buffer, &request).await.expect("write failed");

    let mut cursor = std::io::Cursor::new(buffer);
    let read_back = read_request(&mut cursor).await.expect("read failed");
    assert_eq!(read_back, request);
}

#[tokio::test]
async fn oversized_declared_frame_is_rejected() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&(u32::MAX).to_be_bytes());
    buffer.extend_from_slice(b"junk");

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.expect_err("expected failure");
    assert!(matches!(err, ProtocolError::FrameTooLarge { .. }));
}

#[tokio::test]
async fn truncated_frame_reports_io_error() {
    let mut buffer = Vec::new();
    buffer.extend_from_slice(&10u32.to_be_bytes());
    buffer.extend_from_slice(b"abc"); // 3 of 10 promised bytes

    let mut cursor = std::io::Cursor::new(buffer);
    let err = read_message(&mut cursor).await.expect_err("expected failure");
    assert!(matches!(err, ProtocolError::Io(_)));
}

#[tokio::test]
async fn multiple_frames_stream_in_order() {
    let responses = [
        Response::ack("first"),
        Response::ack("second"),
        Response::ack("third"),
    ];

    let mut buffer = Vec::new();
    for response in &responses {
        write_response(&mut buffer, response).await.expect("write failed");
    }

    let mut cursor = std::io::Cursor::new(buffer);
    for expected in &responses {
        let got = read_response(&mut cursor).await.expect("read failed");
        assert_eq!(&got, expected);
    }
}
