//! Pretty terminal output formatting for tgview CLI.

use console::{Style, Term, style};
use tgview_core::Session;
use tgview_core::models::ChatSummary;
use tgview_core::pager::{Affordance, PagerState};
use tgview_core::render::{FeedItem, MessageRow, Side};
use tgview_core::search::{ChatResults, MediaItem, SearchHit};

/// Icons for terminal output - uses Nerd Font icons if available, ASCII fallbacks otherwise.
struct Icons {
    chat: &'static str,
    calendar: &'static str,
    reply: &'static str,
    forward: &'static str,
    search: &'static str,
    bullet: &'static str,
}

impl Icons {
    fn detect() -> Self {
        if Self::has_nerd_font() {
            Self {
                chat: "\u{f086} ",     // nf-fa-comments
                calendar: "\u{f073} ", // nf-fa-calendar
                reply: "\u{f112} ",    // nf-fa-reply
                forward: "\u{f064} ",  // nf-fa-share
                search: "\u{f002} ",   // nf-fa-search
                bullet: "\u{f054}",    // nf-fa-chevron_right
            }
        } else {
            Self {
                chat: "",
                calendar: "",
                reply: "> ",
                forward: ">> ",
                search: "",
                bullet: ">",
            }
        }
    }

    /// Detect if a Nerd Font is likely available.
    fn has_nerd_font() -> bool {
        // NERD_FONT=1 forces icons, NERD_FONT=0 disables them
        if let Ok(val) = std::env::var("NERD_FONT") {
            return val != "0" && !val.is_empty();
        }

        if let Ok(term_prog) = std::env::var("TERM_PROGRAM") {
            let modern_terminals = ["WezTerm", "Alacritty", "kitty", "iTerm.app", "ghostty"];
            if modern_terminals.iter().any(|t| term_prog.contains(t)) {
                return true;
            }
        }

        std::env::var("STARSHIP_SESSION_KEY").is_ok()
    }
}

/// Terminal width for formatting, with fallback.
fn term_width() -> usize {
    Term::stdout().size().1 as usize
}

/// Style for a sender name by colour slot.
fn sender_style(color: u8) -> Style {
    match color {
        1 => Style::new().red().bold(),
        2 => Style::new().green().bold(),
        3 => Style::new().yellow().bold(),
        4 => Style::new().blue().bold(),
        5 => Style::new().magenta().bold(),
        6 => Style::new().cyan().bold(),
        7 => Style::new().white().bold(),
        _ => Style::new().bold(),
    }
}

/// Colorize `<mark>` highlights from search snippets.
fn colorize_snippet(s: &str) -> String {
    let decoded = decode_html_entities(s);
    if !console::colors_enabled() {
        return decoded.replace("<mark>", "").replace("</mark>", "");
    }
    decoded
        .replace("<mark>", "\x1b[1;33m")
        .replace("</mark>", "\x1b[0m")
}

/// Undo the escaping applied to search snippets.
fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#039;", "'")
        .replace("&amp;", "&")
}

/// Wrap text to fit terminal width, indenting continuation lines.
fn wrap_text(s: &str, prefix_width: usize, max_lines: usize) -> String {
    let width = term_width().saturating_sub(prefix_width + 2);
    let width = width.max(40); // minimum readable width

    let wrapped: Vec<String> = s
        .lines()
        .flat_map(|line| textwrap::wrap(line, width))
        .take(max_lines)
        .map(|cow| cow.to_string())
        .collect();
    wrapped.join(&format!("\n{:prefix_width$}", ""))
}

/// Print the chat list.
pub fn print_chats(chats: &[&ChatSummary], total_messages: u64) {
    if chats.is_empty() {
        println!("{}", style("No chats found.").dim());
        return;
    }

    let icons = Icons::detect();
    for chat in chats {
        let range = match (&chat.start_date, &chat.end_date) {
            (Some(start), Some(end)) => format!("  {}{} - {}", icons.calendar, day(start), day(end)),
            _ => String::new(),
        };
        println!(
            "{}{}  {}  {}{}",
            icons.chat,
            style(&chat.title).bold(),
            style(&chat.chat_id).dim(),
            style(format!("{} messages", chat.message_count)).cyan(),
            style(range).dim()
        );
    }
    println!(
        "{}",
        style(format!("{} chat(s), {total_messages} messages", chats.len())).dim()
    );
}

fn day(timestamp: &str) -> &str {
    timestamp.get(..10).unwrap_or(timestamp)
}

/// Print the rendered feed of the session.
pub fn print_feed(session: &Session) {
    let width = term_width().min(100);
    let title = session.title().or(session.chat_id()).unwrap_or("-");
    println!("{}", style("═".repeat(width)).dim());
    println!(" {}", style(title).bold().white());
    println!("{}", style("═".repeat(width)).dim());

    if let PagerState::Error(reason) = session.state() {
        println!("{}", style(format!("Could not load this chat: {reason}")).red());
        return;
    }

    let affordances = session.affordances();
    print_affordance("older", &affordances.older);

    let highlighted = session.highlighted();
    let icons = Icons::detect();
    for item in session.feed().items() {
        match item {
            FeedItem::DateSeparator { label, .. } => {
                println!();
                println!("{:^width$}", style(format!(" {label} ")).dim().reverse());
            }
            FeedItem::Service { text, .. } => {
                println!("{:^width$}", style(text).italic().dim());
            }
            FeedItem::Message(row) => {
                let marked = highlighted.is_some() && row.id.as_deref() == highlighted;
                print_row(row, marked, &icons);
            }
        }
    }

    print_affordance("newer", &affordances.newer);
}

fn print_affordance(direction: &str, affordance: &Affordance) {
    match affordance {
        Affordance::Hidden => {}
        Affordance::Available => {
            println!("{}", style(format!("  … {direction} messages available")).dim());
        }
        Affordance::Loading => {
            println!("{}", style(format!("  … loading {direction} messages")).dim());
        }
        Affordance::Failed(reason) => {
            println!(
                "{}",
                style(format!("  ! loading {direction} messages failed: {reason}")).red()
            );
        }
    }
}

fn print_row(row: &MessageRow, marked: bool, icons: &Icons) {
    let indent = match row.side {
        Side::Incoming => "  ",
        Side::Outgoing => "        ",
    };
    if !row.grouped {
        println!();
    }
    if let (true, Some(sender)) = (row.show_sender, &row.sender) {
        println!("{indent}{}", sender_style(row.color).apply_to(sender));
    }
    if let Some(reply) = &row.reply {
        let text = if reply.snippet.is_empty() {
            reply.title.clone()
        } else {
            format!("{}: {}", reply.title, reply.snippet)
        };
        println!("{indent}{}", style(format!("{}{text}", icons.reply)).dim());
    }
    if let Some(from) = &row.forwarded_from {
        let date = row
            .forwarded_date
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "{indent}{}",
            style(format!("{}Forwarded from {from}{date}", icons.forward)).italic()
        );
    }
    if let Some(call) = &row.call {
        println!("{indent}📞 {call}");
    }
    for att in &row.attachments {
        println!("{indent}{} {}", att.kind.label(), style(&att.href).dim().underlined());
    }
    if let Some(text) = &row.text_plain {
        let body = wrap_text(text, indent.len(), usize::MAX);
        let body = if marked {
            style(body).black().on_yellow().to_string()
        } else {
            body
        };
        println!("{indent}{body}");
    }
    let meta = [row.time.as_deref(), row.id.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" · ");
    if !meta.is_empty() {
        println!("{indent}{}", style(meta).dim());
    }
}

/// Print in-chat search hits.
pub fn print_chat_hits(chat: &str, hits: &[SearchHit], position: &str) {
    if hits.is_empty() {
        println!("{}", style("No results found.").dim());
        return;
    }

    let icons = Icons::detect();
    println!(
        "{}",
        style(format!(" {}{} result(s) in {chat} ({position})", icons.search, hits.len()))
            .bold()
            .white()
    );
    for hit in hits {
        let from = hit.from.as_deref().unwrap_or("-");
        let date = hit.date.as_deref().map(day).unwrap_or_default();
        println!(
            " {} {} {} {}",
            style(icons.bullet).dim(),
            style(&hit.message_id).cyan(),
            style(from).bold(),
            style(date).dim()
        );
        println!("   {}", wrap_text(&colorize_snippet(&hit.snippet_html), 3, 3));
    }
}

/// Print cross-chat results grouped by chat.
pub fn print_global_results(results: &[ChatResults]) {
    if results.is_empty() {
        println!("{}", style("No results found.").dim());
        return;
    }

    let icons = Icons::detect();
    let width = term_width().min(100);
    let total: usize = results.iter().map(|r| r.hits.len()).sum();
    println!("{}", style("═".repeat(width)).dim());
    println!(
        "{}",
        style(format!(" {}Found {total} result(s) in {} chat(s)", icons.search, results.len()))
            .bold()
            .white()
    );
    println!("{}", style("═".repeat(width)).dim());

    for (i, chat) in results.iter().enumerate() {
        if i > 0 {
            println!("{}", style("─".repeat(width)).dim());
        }
        println!(
            "{}{}  {}",
            icons.chat,
            style(&chat.title).bold(),
            style(&chat.chat_id).dim()
        );
        for hit in &chat.hits {
            println!(
                " {} {} {} {}",
                style(icons.bullet).dim(),
                style(&hit.message_id).cyan(),
                style(hit.from.as_deref().unwrap_or("-")).bold(),
                style(format!("[{} #{}]", hit.chunk_file, hit.chunk_index)).dim()
            );
            println!("   {}", wrap_text(&hit.snippet, 3, 2));
        }
    }
}

/// Print gallery items.
pub fn print_media(items: &[MediaItem]) {
    if items.is_empty() {
        println!("{}", style("No media found.").dim());
        return;
    }
    for item in items {
        let date = item.date.as_deref().map(day).unwrap_or_default();
        println!(
            "{:<18} {:<10} {:<16} {}",
            item.attachment.kind.label(),
            style(date).dim(),
            style(item.from.as_deref().unwrap_or("-")).bold(),
            item.attachment.href
        );
    }
}
