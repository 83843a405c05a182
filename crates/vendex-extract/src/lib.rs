pub mod handshake;
pub mod listing;
pub mod profile;
pub mod redirect;

mod html;

pub use handshake::{
    Handshake, detect_challenge, extract_sid, extract_token_and_creation_time, negotiate_session,
    resolve_captcha, resolve_challenge, resolve_qa_challenge,
};
pub use listing::{ListingExtractor, TypeRow, TypeRows, extract_type_categories, max_page_count};
pub use profile::ProfileExtractor;
pub use redirect::{is_bounce_page, resolve_meta_refresh};
