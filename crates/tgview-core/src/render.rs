//! Feed rendering.
//!
//! The feed is rebuilt from the whole ordered log every time. A prepend
//! changes the "previous message" context of everything after it, so date
//! separators and sender grouping cannot be computed incrementally once
//! backward loading exists.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::models::{Attachment, AttachmentKind, Call, Forwarded, Message, UserMessage};
use crate::sanitize::{escape_html, sanitize_html, strip_tags};
use crate::store::MessageStore;

/// Title shown for a reply whose target is not loaded.
pub const REPLY_PLACEHOLDER: &str = "Message";

// Estimated layout heights, in pixels.
const DATE_SEPARATOR_HEIGHT: f64 = 36.0;
const SERVICE_HEIGHT: f64 = 32.0;
const BUBBLE_PADDING: f64 = 16.0;
const GROUP_GAP: f64 = 2.0;
const BLOCK_GAP: f64 = 8.0;
const SENDER_HEIGHT: f64 = 20.0;
const REPLY_HEIGHT: f64 = 44.0;
const FORWARD_HEIGHT: f64 = 20.0;
const CALL_HEIGHT: f64 = 24.0;
const META_HEIGHT: f64 = 16.0;
const TEXT_LINE_HEIGHT: f64 = 20.0;
const CHARS_PER_LINE: usize = 48;

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub self_names: Vec<String>,
    pub grouping_gap: Option<chrono::Duration>,
    pub date_format: String,
    pub time_format: String,
    pub reply_snippet_chars: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RenderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            self_names: config.self_names.clone(),
            grouping_gap: config.render.grouping_gap(),
            date_format: config.render.date_format.clone(),
            time_format: config.render.time_format.clone(),
            reply_snippet_chars: config.render.reply_snippet_chars,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyPreview {
    pub target_id: String,
    pub title: String,
    pub snippet: String,
    /// `false` while the replied-to message is not loaded.
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: Option<String>,
    pub sender: Option<String>,
    pub show_sender: bool,
    pub grouped: bool,
    pub side: Side,
    /// Stable colour slot 1..=8 derived from the sender name.
    pub color: u8,
    pub reply: Option<ReplyPreview>,
    pub forwarded_from: Option<String>,
    pub forwarded_date: Option<String>,
    pub call: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Sanitized HTML body.
    pub text_html: Option<String>,
    /// Plain rendition of the body for text surfaces.
    pub text_plain: Option<String>,
    /// Text shown under media rather than as the message body.
    pub caption: bool,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    DateSeparator {
        date: NaiveDate,
        label: String,
    },
    Service {
        id: Option<String>,
        text: String,
        time: Option<String>,
    },
    Message(Box<MessageRow>),
}

impl FeedItem {
    pub fn message_id(&self) -> Option<&str> {
        match self {
            FeedItem::DateSeparator { .. } => None,
            FeedItem::Service { id, .. } => id.as_deref(),
            FeedItem::Message(row) => row.id.as_deref(),
        }
    }

    /// Estimated rendered height.
    pub fn height(&self) -> f64 {
        match self {
            FeedItem::DateSeparator { .. } => DATE_SEPARATOR_HEIGHT,
            FeedItem::Service { text, .. } => {
                SERVICE_HEIGHT + TEXT_LINE_HEIGHT * (text_lines(text) as f64 - 1.0).max(0.0)
            }
            FeedItem::Message(row) => row.height(),
        }
    }
}

impl MessageRow {
    fn height(&self) -> f64 {
        let mut h = BUBBLE_PADDING + META_HEIGHT;
        h += if self.grouped { GROUP_GAP } else { BLOCK_GAP };
        if self.show_sender {
            h += SENDER_HEIGHT;
        }
        if self.reply.is_some() {
            h += REPLY_HEIGHT;
        }
        if self.forwarded_from.is_some() {
            h += FORWARD_HEIGHT;
        }
        if self.call.is_some() {
            h += CALL_HEIGHT;
        }
        h += self.attachments.iter().map(attachment_height).sum::<f64>();
        if let Some(text) = &self.text_plain {
            h += TEXT_LINE_HEIGHT * text_lines(text) as f64;
        }
        h
    }
}

fn attachment_height(att: &Attachment) -> f64 {
    if att.is_animated_sticker() {
        return 54.0;
    }
    match att.kind {
        AttachmentKind::Photo => 260.0,
        AttachmentKind::Sticker => 160.0,
        AttachmentKind::Video => 280.0,
        AttachmentKind::RoundVideo => 220.0,
        AttachmentKind::Voice | AttachmentKind::File => 54.0,
    }
}

fn text_lines(text: &str) -> usize {
    text.lines()
        .map(|line| line.chars().count().div_ceil(CHARS_PER_LINE).max(1))
        .sum::<usize>()
        .max(1)
}

/// Rendered feed plus its estimated layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Feed {
    items: Vec<FeedItem>,
    #[serde(skip)]
    offsets: Vec<f64>,
    height: f64,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl Feed {
    fn from_items(items: Vec<FeedItem>) -> Self {
        let mut offsets = Vec::with_capacity(items.len());
        let mut positions = HashMap::new();
        let mut y = 0.0;
        for (pos, item) in items.iter().enumerate() {
            offsets.push(y);
            y += item.height();
            if let Some(id) = item.message_id() {
                positions.insert(id.to_string(), pos);
            }
        }
        Self {
            items,
            offsets,
            height: y,
            positions,
        }
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total estimated height (the feed's `scrollHeight`).
    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.positions.contains_key(message_id)
    }

    /// `(top, height)` of the row holding `message_id`.
    pub fn bounds_of(&self, message_id: &str) -> Option<(f64, f64)> {
        let pos = *self.positions.get(message_id)?;
        Some((self.offsets[pos], self.items[pos].height()))
    }

    pub fn message_rows(&self) -> impl Iterator<Item = &MessageRow> {
        self.items.iter().filter_map(|item| match item {
            FeedItem::Message(row) => Some(row.as_ref()),
            _ => None,
        })
    }

    /// HTML projection of the feed. `highlight` marks one row.
    pub fn to_html(&self, highlight: Option<&str>) -> String {
        let mut html = String::new();
        for item in &self.items {
            match item {
                FeedItem::DateSeparator { date, label } => {
                    let _ = write!(
                        html,
                        r#"<div class="date-separator" data-date="{date}"><span>{}</span></div>"#,
                        escape_html(label)
                    );
                }
                FeedItem::Service { id, text, .. } => {
                    let _ = write!(
                        html,
                        r#"<div class="message service"{}><div class="message-bubble">{}</div></div>"#,
                        id_attr(id.as_deref()),
                        escape_html(text)
                    );
                }
                FeedItem::Message(row) => {
                    let highlighted = highlight.is_some() && row.id.as_deref() == highlight;
                    write_row(&mut html, row, highlighted);
                }
            }
        }
        html
    }
}

fn id_attr(id: Option<&str>) -> String {
    id.map(|id| format!(r#" id="{}""#, escape_html(id)))
        .unwrap_or_default()
}

fn write_row(html: &mut String, row: &MessageRow, highlighted: bool) {
    let side = match row.side {
        Side::Incoming => "incoming",
        Side::Outgoing => "outgoing",
    };
    let mut classes = format!("message {side}");
    if row.grouped {
        classes.push_str(" grouped");
    }
    if highlighted {
        classes.push_str(" highlight");
    }
    let _ = write!(
        html,
        r#"<div class="{classes}"{}><div class="message-bubble">"#,
        id_attr(row.id.as_deref())
    );

    if let (true, Some(sender)) = (row.show_sender, &row.sender) {
        let _ = write!(
            html,
            r#"<span class="message-sender color{}">{}</span>"#,
            row.color,
            escape_html(sender)
        );
    }
    if let Some(reply) = &row.reply {
        let _ = write!(
            html,
            r#"<div class="reply-preview{}" data-reply-to="{}"><div class="reply-name">{}</div><div class="reply-text">{}</div></div>"#,
            if reply.resolved { "" } else { " unresolved" },
            escape_html(&reply.target_id),
            escape_html(&reply.title),
            escape_html(&reply.snippet)
        );
    }
    if let Some(from) = &row.forwarded_from {
        let date = row
            .forwarded_date
            .as_deref()
            .map(|d| format!(r#" <span class="details">{}</span>"#, escape_html(d)))
            .unwrap_or_default();
        let _ = write!(
            html,
            r#"<div class="message-forward">Forwarded from {}{date}</div>"#,
            escape_html(from)
        );
    }
    if let Some(call) = &row.call {
        let _ = write!(html, r#"<div class="message-call">📞 {}</div>"#, escape_html(call));
    }
    for att in &row.attachments {
        html.push_str(&attachment_html(att));
    }
    if let Some(text) = &row.text_html {
        let class = if row.caption { "message-caption" } else { "message-content" };
        let _ = write!(html, r#"<div class="{class}">{text}</div>"#);
    }
    if let Some(time) = &row.time {
        let _ = write!(html, r#"<div class="message-meta">{}</div>"#, escape_html(time));
    }
    html.push_str("</div></div>");
}

/// Media element for one attachment. Photos with a thumbnail candidate load
/// the thumbnail and swap to the full image if it fails.
pub fn attachment_html(att: &Attachment) -> String {
    let href = escape_html(&att.href);
    let inner = match att.kind {
        AttachmentKind::Photo => match att.thumbnail_href() {
            Some(thumb) => format!(
                r#"<img src="{}" data-full="{href}" onerror="this.onerror=null;this.src=this.dataset.full" class="media-photo" loading="lazy" alt="Photo">"#,
                escape_html(&thumb)
            ),
            None => format!(r#"<img src="{href}" class="media-photo" loading="lazy" alt="Photo">"#),
        },
        AttachmentKind::Sticker if att.is_animated_sticker() => format!(
            r#"<a href="{href}" class="attachment-file" download>🎭 Animated sticker</a>"#
        ),
        AttachmentKind::Sticker => {
            format!(r#"<img src="{href}" class="media-sticker" loading="lazy" alt="Sticker">"#)
        }
        AttachmentKind::Video => {
            format!(r#"<video src="{href}" controls preload="metadata" class="media-video"></video>"#)
        }
        AttachmentKind::RoundVideo => {
            return format!(
                r#"<div class="media-container round-container"><video src="{href}" autoplay loop muted playsinline class="media-round-video"></video></div>"#
            );
        }
        AttachmentKind::Voice => {
            let duration = att
                .duration
                .as_deref()
                .map(|d| format!(r#"<span class="media-duration">{}</span>"#, escape_html(d)))
                .unwrap_or_default();
            format!(r#"<audio src="{href}" controls preload="metadata"></audio>{duration}"#)
        }
        AttachmentKind::File => format!(
            r#"<a href="{href}" class="attachment-file" download>📎 {}</a>"#,
            escape_html(att.title.as_deref().unwrap_or("File"))
        ),
    };
    format!(r#"<div class="media-container">{inner}</div>"#)
}

/// Standalone HTML document around a rendered feed.
pub fn html_document(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
body {{ font-family: system-ui, sans-serif; background: #e6ebee; margin: 0; }}
#messages {{ max-width: 720px; margin: 0 auto; padding: 12px; }}
.date-separator {{ text-align: center; margin: 12px 0; color: #fff; }}
.date-separator span {{ background: rgba(0,0,0,.25); border-radius: 12px; padding: 2px 10px; }}
.message {{ display: flex; margin-top: 8px; }}
.message.grouped {{ margin-top: 2px; }}
.message.outgoing {{ justify-content: flex-end; }}
.message.service {{ justify-content: center; color: #555; }}
.message-bubble {{ background: #fff; border-radius: 10px; padding: 6px 10px; max-width: 80%; }}
.message.outgoing .message-bubble {{ background: #effdde; }}
.message.highlight .message-bubble {{ outline: 2px solid #4ea4f6; }}
.message-sender {{ font-weight: 600; display: block; }}
.reply-preview {{ border-left: 2px solid #4ea4f6; padding-left: 6px; margin: 4px 0; font-size: 13px; }}
.message-forward, .message-meta {{ font-size: 12px; color: #888; }}
.media-container img, .media-container video {{ max-width: 100%; border-radius: 6px; }}
.round-container video {{ width: 200px; height: 200px; border-radius: 50%; object-fit: cover; }}
</style>
</head>
<body>
<div id="messages">
{body}
</div>
</body>
</html>
"#,
        title = escape_html(title),
    )
}

/// Builds feeds from ordered message logs.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    opts: RenderOptions,
}

struct GroupContext<'a> {
    sender: &'a str,
    timestamp: Option<DateTime<Utc>>,
    date: Option<NaiveDate>,
}

impl Renderer {
    pub fn new(opts: RenderOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.opts
    }

    /// Render the full ordered log. Reply previews are resolved through
    /// `store`; the function never fails on dangling references.
    pub fn render(&self, messages: &[Arc<Message>], store: &MessageStore) -> Feed {
        let mut items = Vec::with_capacity(messages.len() + messages.len() / 8);
        let mut last_date: Option<NaiveDate> = None;
        let mut prev: Option<GroupContext<'_>> = None;

        for message in messages {
            if let Some(date) = message.date() {
                if last_date != Some(date) {
                    items.push(FeedItem::DateSeparator {
                        date,
                        label: self.date_label(date),
                    });
                    last_date = Some(date);
                    prev = None;
                }
            }

            match message.as_ref() {
                Message::Service(service) => {
                    items.push(FeedItem::Service {
                        id: service.id.clone(),
                        text: service.text.clone(),
                        time: self.time_label(service.timestamp),
                    });
                    prev = None;
                }
                Message::User(user) => {
                    let grouped = self.continues_group(prev.as_ref(), user);
                    items.push(FeedItem::Message(Box::new(self.row(user, grouped, store))));
                    prev = user.from_name.as_deref().map(|sender| GroupContext {
                        sender,
                        timestamp: user.timestamp,
                        date: user.timestamp.map(|ts| ts.date_naive()),
                    });
                }
            }
        }

        Feed::from_items(items)
    }

    fn continues_group(&self, prev: Option<&GroupContext<'_>>, user: &UserMessage) -> bool {
        let (Some(prev), Some(sender)) = (prev, user.from_name.as_deref()) else {
            return false;
        };
        if prev.sender != sender {
            return false;
        }
        if prev.date != user.timestamp.map(|ts| ts.date_naive()) {
            return false;
        }
        match (self.opts.grouping_gap, prev.timestamp, user.timestamp) {
            (None, _, _) => true,
            (Some(gap), Some(before), Some(now)) => {
                let delta = now.signed_duration_since(before);
                delta >= chrono::Duration::zero() && delta < gap
            }
            // without timestamps the gap cannot be measured; sender and day decide
            (Some(_), _, _) => true,
        }
    }

    fn row(&self, user: &UserMessage, grouped: bool, store: &MessageStore) -> MessageRow {
        let side = match user.from_name.as_deref() {
            Some(name) if self.opts.self_names.iter().any(|n| n == name) => Side::Outgoing,
            _ => Side::Incoming,
        };

        let text_html = user
            .html_text
            .as_deref()
            .map(sanitize_html)
            .filter(|html| !html.trim().is_empty())
            .or_else(|| user.plain_text.as_deref().map(escape_html));
        let text_plain = user
            .plain_text
            .clone()
            .or_else(|| user.html_text.as_deref().map(strip_tags))
            .filter(|t| !t.trim().is_empty());

        let (forwarded_from, forwarded_date) = match &user.forwarded {
            Some(Forwarded { from, date }) => (Some(from.clone()), date.clone()),
            None => (None, None),
        };

        MessageRow {
            id: user.id.clone(),
            sender: user.from_name.clone(),
            show_sender: !grouped && user.from_name.is_some(),
            grouped,
            side,
            color: user.from_name.as_deref().map_or(1, sender_color),
            reply: user
                .reply_to
                .as_deref()
                .map(|target| self.reply_preview(target, store)),
            forwarded_from,
            forwarded_date,
            call: user.call.as_ref().map(call_label),
            attachments: user.attachments.clone(),
            caption: !user.attachments.is_empty() && text_html.is_some(),
            text_html,
            text_plain,
            time: self.time_label(user.timestamp),
        }
    }

    /// Preview of a replied-to message, or the placeholder when it is not
    /// loaded yet.
    pub fn reply_preview(&self, target: &str, store: &MessageStore) -> ReplyPreview {
        match store.lookup(target) {
            Some(message) => ReplyPreview {
                target_id: target.to_string(),
                title: message.sender().unwrap_or(REPLY_PLACEHOLDER).to_string(),
                snippet: message.snippet(self.opts.reply_snippet_chars),
                resolved: true,
            },
            None => ReplyPreview {
                target_id: target.to_string(),
                title: REPLY_PLACEHOLDER.to_string(),
                snippet: String::new(),
                resolved: false,
            },
        }
    }

    pub fn date_label(&self, date: NaiveDate) -> String {
        date.format(&self.opts.date_format).to_string()
    }

    fn time_label(&self, ts: Option<DateTime<Utc>>) -> Option<String> {
        ts.map(|ts| ts.format(&self.opts.time_format).to_string())
    }
}

fn call_label(call: &Call) -> String {
    match call.duration_secs {
        Some(secs) if secs > 0 => format!("{} ({})", call.kind, format_duration(secs)),
        _ => call.kind.to_string(),
    }
}

fn format_duration(secs: u64) -> String {
    if secs < 60 {
        format!("{secs} s")
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Colour slot 1..=8 for a sender name.
pub fn sender_color(name: &str) -> u8 {
    let hash = name
        .chars()
        .fold(0i32, |h, c| (c as i32).wrapping_add(h.wrapping_shl(5).wrapping_sub(h)));
    (hash.unsigned_abs() % 8) as u8 + 1
}

/// Scroll geometry of the feed container.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Viewport {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub client_height: f64,
}

/// Scroll state captured before a prepend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    pub height: f64,
    pub top: f64,
}

impl Viewport {
    pub fn new(client_height: f64) -> Self {
        Self {
            scroll_top: 0.0,
            scroll_height: 0.0,
            client_height,
        }
    }

    pub fn max_scroll(&self) -> f64 {
        (self.scroll_height - self.client_height).max(0.0)
    }

    pub fn anchor(&self) -> ScrollAnchor {
        ScrollAnchor {
            height: self.scroll_height,
            top: self.scroll_top,
        }
    }

    /// After a prepend: keep already-seen content where it was.
    pub fn restore(&mut self, anchor: ScrollAnchor, new_height: f64) {
        self.scroll_height = new_height;
        self.scroll_top = new_height - anchor.height + anchor.top;
    }

    /// New layout without a position change (append, re-render).
    pub fn relayout(&mut self, new_height: f64) {
        self.scroll_height = new_height;
        self.scroll_top = self.scroll_top.clamp(0.0, self.max_scroll());
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.max_scroll();
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_top = 0.0;
    }

    /// Centre a row of the given bounds in the viewport.
    pub fn center_on(&mut self, top: f64, height: f64) {
        let target = top + height / 2.0 - self.client_height / 2.0;
        self.scroll_top = target.clamp(0.0, self.max_scroll());
    }
}
