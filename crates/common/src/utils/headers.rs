use http::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;

/// Flatten HTTP headers into the single-valued wire format.
/// Repeated values for the same header name are joined with ", ".
pub fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    let mut map: HashMap<String, String> = HashMap::new();

    for (name, value) in headers.iter() {
        let val = value.to_str().unwrap_or("").to_string();

        map.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&val);
            })
            .or_insert(val);
    }

    map
}

/// Convert a wire header map back into an HTTP HeaderMap.
/// Entries with invalid names or values are skipped.
pub fn map_to_headers(map: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in map.iter() {
        if let (Ok(header_name), Ok(header_value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(header_name, header_value);
        }
    }

    headers
}
