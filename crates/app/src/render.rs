use pdf_chat_core::{ConversationTurn, IngestionReport, Role};
use uuid::Uuid;

const CSS: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0; display: flex; min-height: 100vh; }
aside { width: 20rem; padding: 1.5rem; background: #f0f2f6; }
main { flex: 1; padding: 1.5rem 3rem; }
.chat-message { padding: 1.2rem; border-radius: 0.5rem; margin-bottom: 1rem; display: flex; }
.chat-message.user { background-color: #2b313e; color: #fff; }
.chat-message.bot { background-color: #475063; color: #fff; }
.chat-message .speaker { width: 6rem; font-weight: 600; }
.chat-message .message { flex: 1; white-space: pre-wrap; }
.error { padding: 1rem; border-radius: 0.5rem; background: #fdecea; color: #611a15; margin-bottom: 1rem; }
.status { font-size: 0.85rem; color: #444; }
"#;

pub struct PageView<'a> {
    pub title: &'a str,
    pub session_id: Uuid,
    pub turns: &'a [ConversationTurn],
    pub last_ingestion: Option<&'a IngestionReport>,
    pub error: Option<&'a str>,
}

fn escape(text: &str) -> String {
    ammonia::clean_text(text)
}

/// Style comes from the turn's role, never from where it sits in the list.
pub fn message(turn: &ConversationTurn) -> String {
    let (class, speaker) = match turn.role {
        Role::User => ("user", "You"),
        Role::Assistant => ("bot", "Assistant"),
    };
    format!(
        r#"<div class="chat-message {class}"><div class="speaker">{speaker}</div><div class="message">{}</div></div>"#,
        escape(&turn.content)
    )
}

pub fn transcript(turns: &[ConversationTurn]) -> String {
    turns.iter().map(message).collect::<Vec<_>>().join("\n")
}

fn ingestion_status(report: Option<&IngestionReport>) -> String {
    match report {
        Some(report) => format!(
            r#"<p class="status">{} document(s), {} page(s), {} chunk(s) indexed at {}</p>"#,
            report.document_count,
            report.page_count,
            report.chunk_count,
            report.processed_at.format("%H:%M:%S UTC")
        ),
        None => r#"<p class="status">No documents processed yet.</p>"#.to_string(),
    }
}

pub fn page(view: &PageView<'_>) -> String {
    let title = escape(view.title);
    let id = view.session_id;
    let error = view
        .error
        .map(|error| format!(r#"<div class="error">{}</div>"#, escape(error)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>{CSS}</style>
</head>
<body>
<aside>
<h3>Your documents</h3>
<form method="post" action="/sessions/{id}/process" enctype="multipart/form-data">
<label for="pdfs">Upload your PDFs and click 'Process'</label>
<input id="pdfs" type="file" name="pdfs" accept="application/pdf,.pdf" multiple>
<button type="submit">Process</button>
</form>
{status}
</aside>
<main>
<h1>{title}</h1>
{error}
<form method="post" action="/sessions/{id}/ask">
<label for="question">Ask a question:</label>
<input id="question" type="text" name="question" autocomplete="off" autofocus>
</form>
{transcript}
</main>
</body>
</html>
"#,
        status = ingestion_status(view.last_ingestion),
        transcript = transcript(view.turns),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_pick_styles_regardless_of_position() {
        let turns = vec![
            ConversationTurn::assistant("first"),
            ConversationTurn::assistant("second"),
            ConversationTurn::user("third"),
        ];

        let html = transcript(&turns);
        assert_eq!(html.matches(r#"class="chat-message bot""#).count(), 2);
        assert_eq!(html.matches(r#"class="chat-message user""#).count(), 1);
    }

    #[test]
    fn message_text_is_escaped() {
        let html = message(&ConversationTurn::user("<script>alert(1)</script>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn page_shows_error_and_forms() {
        let id = Uuid::new_v4();
        let html = page(&PageView {
            title: "HR Onboarding And Automation",
            session_id: id,
            turns: &[],
            last_ingestion: None,
            error: Some("could not read pdf 'x.pdf'"),
        });

        assert!(html.contains(&format!("/sessions/{id}/process")));
        assert!(html.contains(&format!("/sessions/{id}/ask")));
        assert!(html.contains(r#"<div class="error">"#));
        assert!(html.contains("No documents processed yet."));
    }
}
