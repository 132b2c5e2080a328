use std::fmt::Write;

use crate::{
    message::{Message, MessageContent, Role},
    report::StructuredReport,
};

/// Plain-text rendering of a structured report for terminals and logs
pub fn render_report(report: &StructuredReport) -> String {
    let mut out = String::new();

    if let Some(summary) = report.summary.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(out, "Summary:\n  {}", summary.trim());
    }

    for (title, items) in [
        ("Abnormal findings", report.abnormal_findings()),
        ("Recommended tests", report.recommended_tests()),
        ("Lifestyle suggestions", report.lifestyle_suggestions()),
    ] {
        if items.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{}:", title);
        for item in items {
            let _ = writeln!(out, "  • {}", item);
        }
    }

    if let Some(urgency) = report.urgency.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = writeln!(
            out,
            "Urgency: {} [{}]",
            urgency.trim(),
            report.urgency_level()
        );
    }

    out.trim_end().to_string()
}

pub fn render_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Report(report) => render_report(report),
    }
}

/// Render a transcript entry with its author and attachment
pub fn render_message(message: &Message) -> String {
    let author = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
    };

    let mut out = format!("{}:", author);
    if let Some(file_name) = &message.attached_file_name {
        let _ = write!(out, " [attached: {}]", file_name);
    }
    out.push('\n');
    out.push_str(&render_content(&message.content));
    out
}
