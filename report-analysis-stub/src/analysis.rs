//! Canned analysis content.
//!
//! The stub does not read images. Replies are built from the prompt and the
//! upload metadata so that clients see both response shapes the real service
//! produces: plain `response` text for chat and a nested `analysis` object for
//! report uploads. `recommendedTests` is sent as a delimited string on purpose.

use crate::models::ReportAnalysis;

pub fn chat_reply(message: &str, exchanges: u32) -> String {
    let message = message.trim();
    let lowered = message.to_lowercase();

    if exchanges == 0 && is_greeting(&lowered) {
        return "Hello! Upload a lab report image (PNG, JPEG or WebP) and I will walk you \
                through the results."
            .to_string();
    }

    if lowered.contains("urgent") || lowered.contains("emergency") {
        return "If you have severe symptoms such as chest pain or difficulty breathing, \
                contact emergency services right away. Otherwise, share your report and I \
                will point out anything that needs prompt attention."
            .to_string();
    }

    format!(
        "You asked: \"{}\". I can explain values from an uploaded report; for a diagnosis \
         please consult your physician.",
        message
    )
}

fn is_greeting(lowered: &str) -> bool {
    ["hello", "hi", "hey", "good morning", "good evening"]
        .iter()
        .any(|g| lowered == *g || lowered.starts_with(&format!("{} ", g)))
}

pub fn analyze(file_name: &str, prompt: &str) -> ReportAnalysis {
    let focus = if prompt.trim().is_empty() {
        "the uploaded report".to_string()
    } else {
        format!("your question \"{}\"", prompt.trim())
    };

    ReportAnalysis {
        summary: format!(
            "Reviewed {} with respect to {}. Most values are within reference ranges; two \
             markers are slightly outside them.",
            file_name, focus
        ),
        abnormal_findings: vec![
            "Hemoglobin 11.2 g/dL (reference 12.0-15.5)".to_string(),
            "LDL cholesterol 162 mg/dL (reference < 130)".to_string(),
        ],
        recommended_tests: "- Serum ferritin\n- Repeat lipid panel in 3 months".to_string(),
        lifestyle_suggestions: vec![
            "Increase iron-rich foods such as legumes and leafy greens".to_string(),
            "Aim for 150 minutes of moderate exercise per week".to_string(),
        ],
        urgency: "Moderate - schedule a follow-up with your physician".to_string(),
    }
}
