use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, header::HeaderMap};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Charset {
    Utf8,
    Latin1,
    Windows1252,
    Iso88591,
    ShiftJis,
    Gb2312,
    Big5,
    Other(String),
}

impl Charset {
    // encoding_rs hands out &'static references; taking them at that lifetime
    // lets the fallback arm keep the encoding's name.
    pub fn from_encoding(encoding: &'static encoding_rs::Encoding) -> Self {
        use std::ptr;

        if ptr::eq(encoding, encoding_rs::UTF_8) {
            Self::Utf8
        } else if ptr::eq(encoding, encoding_rs::WINDOWS_1252) {
            Self::Windows1252
        } else if ptr::eq(encoding, encoding_rs::SHIFT_JIS) {
            Self::ShiftJis
        } else if ptr::eq(encoding, encoding_rs::GBK) || ptr::eq(encoding, encoding_rs::GB18030) {
            Self::Gb2312
        } else if ptr::eq(encoding, encoding_rs::BIG5) {
            Self::Big5
        } else {
            Self::Other(encoding.name().to_lowercase())
        }
    }
}

/// Raw response for one fetched page, decoded to UTF-8.
#[derive(Debug)]
pub struct PageResponse {
    pub url_final: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body_raw: Bytes,
    pub body_utf8: String,
    pub charset: Charset,
    pub fetched_at: DateTime<Utc>,
}

/// Extracted content of one page: the durable artifact of the fetch stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchedFragment {
    pub source_url: Url,
    pub raw_html: String,
    pub content_html: String,
    pub fetched_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_encodings_map_to_variants() {
        assert_eq!(Charset::from_encoding(encoding_rs::UTF_8), Charset::Utf8);
        assert_eq!(
            Charset::from_encoding(encoding_rs::WINDOWS_1252),
            Charset::Windows1252
        );
        assert_eq!(
            Charset::from_encoding(encoding_rs::SHIFT_JIS),
            Charset::ShiftJis
        );
    }

    #[test]
    fn unmapped_encoding_keeps_its_name() {
        assert_eq!(
            Charset::from_encoding(encoding_rs::EUC_KR),
            Charset::Other("euc-kr".to_string())
        );
    }
}
