use base64::{Engine as _, engine::general_purpose::STANDARD};

/// Encode a body for the wire. Empty bodies are omitted from frames entirely,
/// so this returns None for empty input.
pub fn encode_body(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        None
    } else {
        Some(STANDARD.encode(body))
    }
}

/// Decode an optional wire body. An absent body decodes to empty bytes.
pub fn decode_body(encoded: Option<&str>) -> Result<Vec<u8>, base64::DecodeError> {
    match encoded {
        Some(b64) => STANDARD.decode(b64),
        None => Ok(Vec::new()),
    }
}
