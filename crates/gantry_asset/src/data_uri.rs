use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataUriError {
    #[error("not a data URI")]
    NotDataUri,
    #[error("data URI is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// A parsed `data:` URI, borrowing from the original string.
pub struct DataUri<'a> {
    pub mime_type: &'a str,
    pub base64: bool,
    pub data: &'a str,
}

fn split_once(input: &str, delimiter: char) -> Option<(&str, &str)> {
    let mut iter = input.splitn(2, delimiter);
    Some((iter.next()?, iter.next()?))
}

impl<'a> DataUri<'a> {
    pub fn parse(uri: &'a str) -> Result<DataUri<'a>, DataUriError> {
        let uri = uri.strip_prefix("data:").ok_or(DataUriError::NotDataUri)?;
        let (mime_type, data) = split_once(uri, ',').ok_or(DataUriError::NotDataUri)?;
        let (mime_type, base64) = match mime_type.strip_suffix(";base64") {
            Some(mime_type) => (mime_type, true),
            None => (mime_type, false),
        };
        Ok(DataUri {
            mime_type,
            base64,
            data,
        })
    }

    /// Decodes the payload. Plain-text (non-base64) payloads are not a
    /// thing binary glTF resources use, so they are rejected.
    pub fn decode(&self) -> Result<Vec<u8>, DataUriError> {
        if !self.base64 {
            return Err(DataUriError::NotBase64);
        }
        Ok(STANDARD.decode(self.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mime_and_payload() {
        let uri = DataUri::parse("data:application/octet-stream;base64,AAECAw==").unwrap();
        assert_eq!(uri.mime_type, "application/octet-stream");
        assert!(uri.base64);
        assert_eq!(uri.decode().unwrap(), [0, 1, 2, 3]);
    }

    #[test]
    fn rejects_non_data_uris() {
        assert!(DataUri::parse("tex.png").is_err());
        assert!(DataUri::parse("http://x/y.png").is_err());
    }

    #[test]
    fn rejects_plain_text_payloads() {
        let uri = DataUri::parse("data:text/plain,hello").unwrap();
        assert!(!uri.base64);
        assert!(matches!(uri.decode(), Err(DataUriError::NotBase64)));
    }
}
