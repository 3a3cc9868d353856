use super::*;
use crate::models::{ChunkInfo, UserMessage, parse_timestamp};
use crate::pager::Affordance;

const PER_CHUNK: usize = 3;

fn manifest(chunks: usize) -> ChatManifest {
    ChatManifest {
        chat_id: Some("chat_001".to_string()),
        title: "Team".to_string(),
        message_count: (chunks * PER_CHUNK) as u64,
        chunk_count: chunks,
        chunks: (1..=chunks)
            .map(|i| ChunkInfo {
                filename: format!("chunk_{i:04}.json"),
                start_id: Some(format!("m{}", (i - 1) * PER_CHUNK + 1)),
                end_id: Some(format!("m{}", i * PER_CHUNK)),
                message_count: Some(PER_CHUNK as u64),
                start_date: Some(format!("2021-03-{i:02}T09:00:00")),
                end_date: Some(format!("2021-03-{i:02}T09:02:00")),
            })
            .collect(),
        start_date: None,
        end_date: None,
        search_file: None,
    }
}

fn chunk(index: usize) -> Vec<Message> {
    let first = (index - 1) * PER_CHUNK + 1;
    (0..PER_CHUNK)
        .map(|k| {
            Message::User(UserMessage {
                id: Some(format!("m{}", first + k)),
                timestamp: parse_timestamp(&format!("2021-03-{index:02}T09:0{k}:00")),
                from_name: Some(if k % 2 == 0 { "Ann" } else { "Bob" }.to_string()),
                plain_text: Some(format!("message number {}", first + k)),
                ..UserMessage::default()
            })
        })
        .collect()
}

/// Select `chat_001` with three chunks and complete the initial load.
fn opened(chunks: usize) -> Session {
    let mut session = Session::new(&Config::default());
    let ticket = session.select_chat("chat_001", None);
    let request = session
        .manifest_loaded(&ticket, Ok(manifest(chunks)))
        .expect("initial request");
    let applied = session
        .complete(&request, Ok(chunk(request.index)))
        .expect("initial load");
    assert!(applied);
    session
}

fn window(session: &Session) -> Option<(usize, usize)> {
    session.store().window()
}

#[test]
fn opens_on_last_chunk() {
    let session = opened(3);
    assert_eq!(window(&session), Some((3, 3)));
    assert_eq!(session.state(), &PagerState::Ready);
    assert_eq!(session.title(), Some("Team"));
    assert!(session.feed().contains("m9"));
}

#[test]
fn opens_on_first_chunk_when_configured() {
    let mut config = Config::default();
    config.pager.initial_chunk = InitialChunk::First;
    let mut session = Session::new(&config);
    let ticket = session.select_chat("chat_001", None);
    let request = session
        .manifest_loaded(&ticket, Ok(manifest(3)))
        .expect("initial request");
    assert_eq!(request.index, 1);
}

#[test]
fn older_loads_walk_back_to_the_first_chunk() {
    let mut session = opened(3);

    let second = session.plan_older().expect("chunk 2");
    assert_eq!(second.index, 2);
    // a second trigger while loading is ignored
    assert!(session.plan_older().is_none());
    session.complete(&second, Ok(chunk(2))).expect("chunk 2");
    assert_eq!(window(&session), Some((2, 3)));

    let first = session.plan_older().expect("chunk 1");
    session.complete(&first, Ok(chunk(1))).expect("chunk 1");
    assert_eq!(window(&session), Some((1, 3)));

    assert!(session.plan_older().is_none());
    assert_eq!(session.affordances().older, Affordance::Hidden);
}

#[test]
fn older_load_preserves_scroll_position() {
    let mut session = opened(3);
    session.viewport_mut().scroll_top = 25.0;
    let before = *session.viewport();

    let request = session.plan_older().expect("older");
    session.complete(&request, Ok(chunk(2))).expect("older");

    let after = session.viewport();
    let expected = after.scroll_height - before.scroll_height + before.scroll_top;
    assert!(after.scroll_height > before.scroll_height);
    assert!((after.scroll_top - expected).abs() < f64::EPSILON);
}

#[test]
fn stale_chunk_is_discarded_after_chat_switch() {
    let mut session = Session::new(&Config::default());
    let first = session.select_chat("chat_001", None);
    let request = session
        .manifest_loaded(&first, Ok(manifest(2)))
        .expect("request");

    let second = session.select_chat("chat_002", None);
    assert!(session.store().is_empty());

    let applied = session.complete(&request, Ok(chunk(2))).expect("stale");
    assert!(!applied);
    assert!(session.store().is_empty());
    assert!(session.feed().is_empty());
    assert_eq!(session.chat_id(), Some("chat_002"));

    // the late manifest of the first selection is ignored too
    assert!(session.manifest_loaded(&first, Ok(manifest(2))).is_none());
    assert!(session.manifest_loaded(&second, Ok(manifest(2))).is_some());
}

#[test]
fn reselecting_the_same_chat_invalidates_old_requests() {
    let mut session = Session::new(&Config::default());
    let first = session.select_chat("chat_001", None);
    let request = session
        .manifest_loaded(&first, Ok(manifest(2)))
        .expect("request");
    session.select_chat("chat_001", None);
    assert!(!session.complete(&request, Ok(chunk(2))).expect("stale"));
}

#[test]
fn manifest_failure_is_terminal_for_the_chat() {
    let mut session = Session::new(&Config::default());
    let ticket = session.select_chat("chat_404", None);
    let planned = session.manifest_loaded(
        &ticket,
        Err(Error::ManifestUnavailable("chat_404".to_string())),
    );
    assert!(planned.is_none());
    assert!(matches!(session.state(), PagerState::Error(_)));
    assert!(session.plan_older().is_none());
}

#[test]
fn failed_older_load_can_be_retried() {
    let mut session = opened(3);
    let request = session.plan_older().expect("older");
    let err = session
        .complete(&request, Err(Error::Network("reset".to_string())))
        .expect_err("failure surfaces");
    assert!(err.is_retryable());
    assert_eq!(session.state(), &PagerState::Ready);
    assert!(matches!(session.affordances().older, Affordance::Failed(_)));

    let retry = session.plan_older().expect("retry");
    assert_eq!(retry.index, 2);
    session.complete(&retry, Ok(chunk(2))).expect("retry");
    assert_eq!(session.affordances().older, Affordance::Available);
}

#[test]
fn empty_chat_is_ready_without_a_request() {
    let mut session = Session::new(&Config::default());
    let ticket = session.select_chat("chat_001", None);
    assert!(session.manifest_loaded(&ticket, Ok(manifest(0))).is_none());
    assert_eq!(session.state(), &PagerState::Ready);
    assert!(session.plan_newer().is_none());
}

#[tokio::test]
async fn navigate_loads_owning_chunk_then_reveals() {
    let mut session = opened(3);

    let request = match session.navigate(NavTarget::new("m2")) {
        Navigation::Load(request) => Some(request),
        _ => None,
    }
    .expect("owning chunk load");
    assert_eq!(request.index, 1);
    assert_eq!(request.kind, LoadKind::Jump);

    session.complete(&request, Ok(chunk(1))).expect("jump");

    assert_eq!(window(&session), Some((1, 3)));
    assert!(!session.store().contains_chunk(2));
    assert!(session.pending().is_none());
    assert_eq!(session.highlighted(), Some("m2"));
    assert!(session.render_html().contains("message incoming highlight"));
}

#[tokio::test]
async fn jump_below_window_keeps_view_when_target_is_missing() {
    let mut session = opened(3);
    session.viewport_mut().scroll_top = 25.0;
    let before = *session.viewport();

    let request = match session.navigate(NavTarget::new("m3")) {
        Navigation::Load(request) => Some(request),
        _ => None,
    }
    .expect("owning chunk load");
    let mut messages = chunk(1);
    messages.pop();
    session.complete(&request, Ok(messages)).expect("jump");

    assert_eq!(window(&session), Some((1, 3)));
    assert!(session.highlighted().is_none());
    let after = session.viewport();
    let expected = after.scroll_height - before.scroll_height + before.scroll_top;
    assert!(after.scroll_height > before.scroll_height);
    assert!((after.scroll_top - expected).abs() < f64::EPSILON);
}

#[tokio::test]
async fn navigate_to_loaded_message_only_scrolls() {
    let mut session = opened(3);
    assert_eq!(session.navigate(NavTarget::new("m8")), Navigation::Shown);
    assert_eq!(session.highlighted(), Some("m8"));
}

#[test]
fn navigate_to_unknown_message_is_unresolvable() {
    let mut session = opened(3);
    let before = *session.viewport();
    assert!(matches!(
        session.navigate(NavTarget::new("m500")),
        Navigation::Unresolvable(_)
    ));
    assert!(matches!(
        session.navigate(NavTarget::new("m9x")),
        Navigation::Unresolvable(_)
    ));
    assert_eq!(*session.viewport(), before);
}

#[tokio::test]
async fn pending_target_picks_initial_chunk() {
    let mut session = Session::new(&Config::default());
    let ticket = session.select_chat("chat_001", Some(NavTarget::new("m5")));
    let request = session
        .manifest_loaded(&ticket, Ok(manifest(3)))
        .expect("request");
    assert_eq!(request.index, 2);
    session.complete(&request, Ok(chunk(2))).expect("load");
    assert_eq!(session.highlighted(), Some("m5"));
}

#[test]
fn search_falls_back_to_loaded_messages() {
    let mut session = opened(3);
    let hits = session.search("NUMBER");
    let ids: Vec<_> = hits.iter().map(|h| h.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m7", "m8", "m9"]);
    assert_eq!(session.cursor().position(), "1/3");
    assert_eq!(session.next_match().as_deref(), Some("m8"));
    assert_eq!(session.prev_match().as_deref(), Some("m7"));
    assert_eq!(session.prev_match().as_deref(), Some("m9"));

    session.clear_search();
    assert_eq!(session.cursor().position(), "0/0");
    assert!(session.next_match().is_none());
}

#[test]
fn search_prefers_index() {
    let mut session = Session::new(&Config::default());
    let ticket = session.select_chat("chat_001", None);
    session.set_search_index(
        &ticket,
        Some(vec![SearchEntry {
            id: "m1".to_string(),
            text: "only in the index".to_string(),
            from: None,
            dt: Some("2021-03-01T09:00:00".to_string()),
        }]),
    );
    assert!(session.has_search_index());
    assert_eq!(session.search("index").len(), 1);
}

#[test]
fn locate_date_uses_manifest_ranges() {
    let session = opened(3);
    let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date");
    assert_eq!(session.locate_date(date("2021-03-02")), Some(DateTarget::Chunk(2)));
    assert_eq!(
        session.locate_date(date("2021-03-03")),
        Some(DateTarget::Message(NavTarget::new("m7")))
    );
    assert_eq!(session.locate_date(date("2021-04-01")), None);
}

#[test]
fn dispose_returns_to_idle() {
    let mut session = opened(2);
    session.dispose();
    assert_eq!(session.state(), &PagerState::Idle);
    assert!(session.chat_id().is_none());
    assert!(session.store().is_empty());
}
