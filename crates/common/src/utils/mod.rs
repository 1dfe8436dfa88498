mod encoding;
mod headers;
mod time;

pub use encoding::{decode_body, encode_body};
pub use headers::{headers_to_map, map_to_headers};
pub use time::current_timestamp_secs;
