/// Report numbers look like `RPT-2026-0007`
pub const REPORT_NUMBER_PREFIX: &str = "RPT";

/// Photo MIME types accepted from browsers and the mobile app
pub const ACCEPTED_PHOTO_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/heic"];

pub const DEFAULT_MAX_PHOTO_BYTES: usize = 20 * 1024 * 1024;

/// Signatures are small PNGs drawn on a canvas
pub const MAX_SIGNATURE_BYTES: usize = 512 * 1024;

/// Minimum length of the conduct narrative on an LBP complaint
pub const MIN_CONDUCT_DESCRIPTION_CHARS: usize = 50;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ID_COOKIE: &str = "inspector_id";

pub const DASHBOARD_RECENT_REPORTS: usize = 5;

pub const DEFAULT_CONFIG_FILE: &str = "roof_inspect.toml";

/// Build a report number from its year and sequence.
pub fn report_number(year: i32, sequence: u32) -> String {
    format!("{}-{}-{:04}", REPORT_NUMBER_PREFIX, year, sequence)
}

pub fn file_extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "bin",
    }
}
