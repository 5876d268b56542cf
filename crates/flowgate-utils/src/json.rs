//! Locating the JSON payload inside free-form model text.
//!
//! Providers with native structured output return bare JSON, but prompt-only
//! models tend to wrap it in markdown fences or a sentence of preamble.

/// Extract the JSON portion of `text`.
///
/// Order of attempts: a ```` ```json ```` fence, any other fence (language tag
/// skipped), the span from the first `{` to the last `}`, and finally the
/// trimmed input unchanged.
#[must_use]
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + "```json".len();
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if !text.starts_with('{')
        && !text.starts_with('[')
        && let (Some(open), Some(close)) = (text.find('{'), text.rfind('}'))
        && open < close
    {
        return &text[open..=close];
    }

    text
}

/// Parse the JSON payload of model text into a value.
///
/// # Errors
///
/// Returns the `serde_json` error when the extracted text is not valid JSON.
pub fn parse_json_payload(text: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(extract_json(text))
}
