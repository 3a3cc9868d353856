//! Unit tests for domain models.

use super::*;

#[cfg(test)]
mod message_ingestion_tests {
    use super::*;

    #[test]
    fn service_flag_selects_service_variant() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": "message10",
            "dt_iso": "2021-08-07T12:00:00",
            "is_service": true,
            "plain_text": "Alice joined the group"
        }))
        .expect("deserialize");

        assert!(msg.is_service());
        assert_eq!(msg.id(), Some("message10"));
        assert_eq!(msg.sender(), None);
        assert_eq!(msg.text(), Some("Alice joined the group"));
    }

    #[test]
    fn user_message_keeps_all_fields() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": "message11",
            "dt_iso": "2021-08-07T12:30:15",
            "from_name": "Bob",
            "is_service": false,
            "plain_text": "see attached",
            "html_text": "see <b>attached</b>",
            "reply_to": "message10",
            "forwarded_from": "Carol",
            "forwarded_date": "01.01.2020 10:00:00",
            "call_type": "outgoing",
            "call_duration": 42,
            "attachments": [{"kind": "photo", "href": "media/chat_001/photos/p.jpg"}]
        }))
        .expect("deserialize");

        let Message::User(user) = &msg else {
            panic!("expected user message");
        };
        assert_eq!(user.from_name.as_deref(), Some("Bob"));
        assert_eq!(user.reply_to.as_deref(), Some("message10"));
        assert_eq!(
            user.forwarded,
            Some(Forwarded {
                from: "Carol".to_string(),
                date: Some("01.01.2020 10:00:00".to_string()),
            })
        );
        assert_eq!(
            user.call,
            Some(Call {
                kind: CallKind::Outgoing,
                duration_secs: Some(42),
            })
        );
        assert_eq!(user.attachments.len(), 1);
        assert_eq!(
            msg.date(),
            NaiveDate::from_ymd_opt(2021, 8, 7)
        );
    }

    #[test]
    fn empty_strings_become_absent() {
        let msg: Message = serde_json::from_value(serde_json::json!({
            "message_id": "",
            "from_name": "  ",
            "plain_text": ""
        }))
        .expect("deserialize");

        assert_eq!(msg.id(), None);
        assert_eq!(msg.sender(), None);
        assert_eq!(msg.text(), None);
        assert_eq!(msg.timestamp(), None);
    }

    #[test]
    fn unknown_attachment_kind_is_file() {
        let att: Attachment = serde_json::from_value(serde_json::json!({
            "kind": "gif_animation",
            "href": "files/a.gif"
        }))
        .expect("deserialize");
        assert_eq!(att.kind, AttachmentKind::File);

        let round: Attachment = serde_json::from_value(serde_json::json!({
            "kind": "round_video",
            "href": "round_video_messages/r.mp4"
        }))
        .expect("deserialize");
        assert_eq!(round.kind, AttachmentKind::RoundVideo);
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let msg = Message::User(UserMessage {
            id: Some("message1".to_string()),
            timestamp: parse_timestamp("2022-03-01T08:05:00"),
            from_name: Some("Ann".to_string()),
            plain_text: Some("hi".to_string()),
            ..UserMessage::default()
        });
        let json = serde_json::to_value(&msg).expect("serialize");
        assert_eq!(json["message_id"], "message1");
        assert_eq!(json["dt_iso"], "2022-03-01T08:05:00");
        assert_eq!(json["is_service"], false);
    }
}

#[cfg(test)]
mod timestamp_tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn parses_naive_iso() {
        let ts = parse_timestamp("2021-08-07T23:59:01").expect("parse");
        assert_eq!(ts.hour(), 23);
        assert_eq!(ts.second(), 1);
    }

    #[test]
    fn converts_offsets_to_utc() {
        let ts = parse_timestamp("2021-08-08T01:30:00+03:00").expect("parse");
        assert_eq!(ts.date_naive(), NaiveDate::from_ymd_opt(2021, 8, 7).expect("date"));
        assert_eq!(ts.hour(), 22);
    }

    #[test]
    fn bare_date_is_midnight() {
        let ts = parse_timestamp("2021-08-07").expect("parse");
        assert_eq!(ts.hour(), 0);
    }

    #[test]
    fn garbage_is_none() {
        assert_eq!(parse_timestamp("07.08.2021"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}

#[cfg(test)]
mod snippet_tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate("привіт світ", 6), "привіт…");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn media_only_message_uses_kind_label() {
        let msg = Message::User(UserMessage {
            attachments: vec![Attachment {
                kind: AttachmentKind::Voice,
                href: "voice_messages/a.ogg".to_string(),
                title: None,
                duration: Some("0:05".to_string()),
            }],
            ..UserMessage::default()
        });
        assert_eq!(msg.snippet(80), "🎤 Voice message");
    }

    #[test]
    fn matches_is_case_insensitive_over_text() {
        let msg = Message::User(UserMessage {
            plain_text: Some("Hello World".to_string()),
            ..UserMessage::default()
        });
        assert!(msg.matches("world"));
        assert!(!msg.matches("planet"));
    }
}

#[cfg(test)]
mod attachment_tests {
    use super::*;

    fn photo(href: &str) -> Attachment {
        Attachment {
            kind: AttachmentKind::Photo,
            href: href.to_string(),
            title: None,
            duration: None,
        }
    }

    #[test]
    fn jpg_photo_has_thumbnail() {
        assert_eq!(
            photo("media/c/photos/photo_1.JPG").thumbnail_href().as_deref(),
            Some("media/c/photos/photo_1_thumb.JPG")
        );
        assert_eq!(
            photo("media/c/photos/photo_1.jpg").thumbnail_href().as_deref(),
            Some("media/c/photos/photo_1_thumb.jpg")
        );
    }

    #[test]
    fn png_photo_has_no_thumbnail() {
        assert_eq!(photo("media/c/photos/photo_1.png").thumbnail_href(), None);
    }

    #[test]
    fn tgs_sticker_is_animated() {
        let sticker = Attachment {
            kind: AttachmentKind::Sticker,
            href: "stickers/s.tgs".to_string(),
            title: None,
            duration: None,
        };
        assert!(sticker.is_animated_sticker());
    }
}

#[cfg(test)]
mod manifest_tests {
    use super::*;

    fn manifest() -> ChatManifest {
        serde_json::from_value(serde_json::json!({
            "title": "Team",
            "message_count": 30,
            "chunk_count": 3,
            "chunks": [
                {"filename": "chunk_0001.json", "start_id": "message1", "end_id": "message10"},
                {"filename": "chunk_0002.json", "start_id": "message11", "end_id": "message20"},
                {"filename": "chunk_0003.json", "start_id": "message21", "end_id": "message30"}
            ]
        }))
        .expect("deserialize")
    }

    #[test]
    fn chunks_are_one_based() {
        let m = manifest();
        assert_eq!(m.chunk(0), None);
        assert_eq!(m.chunk(1).map(|c| c.filename.as_str()), Some("chunk_0001.json"));
        assert_eq!(m.chunk(3).map(|c| c.filename.as_str()), Some("chunk_0003.json"));
        assert_eq!(m.chunk(4), None);
        assert_eq!(m.index_of("chunk_0002.json"), Some(2));
    }

    #[test]
    fn chunk_total_never_exceeds_list() {
        let mut m = manifest();
        m.chunk_count = 9;
        assert_eq!(m.chunk_total(), 3);
        m.chunk_count = 0;
        assert_eq!(m.chunk_total(), 3);
    }

    #[test]
    fn filter_chats_by_title() {
        let global: GlobalManifest = serde_json::from_value(serde_json::json!({
            "chats": [
                {"chat_id": "chat_001", "title": "Family", "message_count": 5},
                {"chat_id": "chat_002", "title": "Work chat", "message_count": 7}
            ]
        }))
        .expect("deserialize");

        let hits: Vec<_> = global.filter_chats("WORK").iter().map(|c| c.chat_id.clone()).collect();
        assert_eq!(hits, vec!["chat_002".to_string()]);
        assert_eq!(global.filter_chats("").len(), 2);
        assert_eq!(global.total_messages(), 12);
    }

    #[test]
    fn search_entry_accepts_long_names() {
        let entry: SearchEntry = serde_json::from_value(serde_json::json!({
            "message_id": "message5",
            "plain_text": "hello",
            "from_name": "Ann",
            "dt_iso": "2021-08-07T10:00:00"
        }))
        .expect("deserialize");
        assert_eq!(entry.id, "message5");
        assert_eq!(entry.date(), NaiveDate::from_ymd_opt(2021, 8, 7));
    }
}
