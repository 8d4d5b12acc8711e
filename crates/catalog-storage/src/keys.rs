//! Shared key generation for stored uploads.

/// Directory all uploaded files are stored under.
pub const UPLOAD_PREFIX: &str = "uploads";

/// Storage key for an uploaded file: `uploads/{filename}`.
pub fn upload_key(filename: &str) -> String {
    format!("{}/{}", UPLOAD_PREFIX, filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_key_is_prefixed() {
        assert_eq!(upload_key("1700000000_prices.csv"), "uploads/1700000000_prices.csv");
    }
}
