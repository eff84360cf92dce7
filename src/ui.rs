//! HTML pages and HTMX fragments.
//!
//! Pages are rendered as plain strings. Every value that came from a user,
//! a document, or the model goes through [`escape_html`].

use std::fmt::Write as _;

use chrono::{DateTime, Local};

use crate::tasks::TaskKind;

const APP_NAME: &str = "Private Doc Analyzer";

/// Escape text for use in HTML element content and quoted attributes.
#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Generate the HTML shell for the application.
#[must_use]
pub fn html_shell(title: &str, content: &str) -> String {
    let title = escape_html(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - {APP_NAME}</title>
    <script src="https://unpkg.com/htmx.org@2.0.4/dist/htmx.min.js"></script>
    <style>
        body {{ font-family: system-ui, sans-serif; max-width: 48rem; margin: 0 auto; padding: 1rem; }}
        .message {{ border-radius: .5rem; padding: .75rem; margin: .5rem 0; }}
        .user-message {{ background: #eef; }}
        .ai-message {{ background: #f4f4f4; }}
        .error-message {{ background: #fee; }}
        .message-content {{ white-space: pre-wrap; }}
        .task-buttons button {{ margin-right: .5rem; }}
    </style>
</head>
<body>
    <header><a href="/">{APP_NAME}</a></header>
    <main id="app">
        {content}
    </main>
</body>
</html>"#
    )
}

/// Upload page.
#[must_use]
pub fn home_page(supported_types: &[&str], max_upload_mb: usize, ttl_minutes: u64) -> String {
    let accept = supported_types.join(",");
    let content = format!(
        r#"
        <h1>Analyze a document privately</h1>
        <p>Upload a {types} file (max {max_upload_mb}MB). Its text is kept in memory for {ttl_minutes} minutes and never written to disk.</p>
        <form action="/upload" method="post" enctype="multipart/form-data">
            <input type="file" name="document" accept="{accept}" required>
            <button type="submit">Upload</button>
        </form>
        "#,
        types = escape_html(&supported_types.join(", ")),
        accept = escape_html(&accept),
    );
    html_shell("Upload", &content)
}

/// Analysis page for one session.
#[must_use]
pub fn analyze_page(session_id: &str, filename: &str, expires_in_minutes: u64) -> String {
    let id = escape_html(session_id);
    let title = format!("Analyze Document: {filename}");
    let filename = escape_html(filename);

    let mut buttons = String::new();
    for task in TaskKind::ALL {
        let _ = write!(
            buttons,
            r##"<button hx-post="/task/{id}" hx-vals='{{"task": "{value}"}}' hx-target="#messages" hx-swap="beforeend">{label}</button>"##,
            value = task.as_str(),
            label = escape_html(task.label()),
        );
    }

    let content = format!(
        r##"
        <h1>Analyze Document: {filename}</h1>
        <p>This session expires in {expires_in_minutes} minutes.</p>
        <div class="task-buttons">{buttons}</div>
        <div id="messages"></div>
        <form hx-post="/chat/{id}" hx-target="#messages" hx-swap="beforeend">
            <input type="text" name="message" maxlength="1000" placeholder="Ask a question about the document" required>
            <button type="submit">Ask</button>
        </form>
        <button hx-delete="/session/{id}" hx-confirm="Delete this document from memory?">Delete session</button>
        "##
    );
    html_shell(&title, &content)
}

/// User question followed by the model's answer.
#[must_use]
pub fn chat_fragment(question: &str, answer: &str, at: DateTime<Local>) -> String {
    let time = timestamp(at);
    format!(
        r#"
        <div class="message user-message">
            <div class="message-header"><span class="user-badge">You</span> <span class="timestamp">{time}</span></div>
            <div class="message-content">{question}</div>
        </div>
        <div class="message ai-message">
            <div class="message-header"><span class="ai-badge">AI Assistant</span> <span class="timestamp">{time}</span></div>
            <div class="message-content">{answer}</div>
        </div>
        "#,
        question = escape_html(question),
        answer = escape_html(answer),
    )
}

/// Result of a canned analysis task.
#[must_use]
pub fn task_fragment(task: TaskKind, answer: &str, at: DateTime<Local>) -> String {
    format!(
        r#"
        <div class="message ai-message">
            <div class="message-header"><span class="task-badge">{label}</span> <span class="timestamp">{time}</span></div>
            <div class="message-content">{answer}</div>
        </div>
        "#,
        label = escape_html(task.label()),
        time = timestamp(at),
        answer = escape_html(answer),
    )
}

#[must_use]
pub fn error_fragment(message: &str) -> String {
    format!(
        r#"
        <div class="message error-message">
            <div class="message-header"><span class="error-badge">Error</span></div>
            <div class="message-content">{}</div>
        </div>
        "#,
        escape_html(message)
    )
}

fn timestamp(at: DateTime<Local>) -> String {
    at.format("%-I:%M %p").to_string()
}
