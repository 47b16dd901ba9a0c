use md5::{Digest, Md5};

/// Gravatar avatar URL for an email address.
pub fn gravatar_url(email: &str, size: u32, secure: bool) -> String {
    let base = if secure {
        "https://secure.gravatar.com/avatar"
    } else {
        "https://www.gravatar.com/avatar"
    };
    let hash = hex::encode(Md5::digest(email.trim().to_lowercase().as_bytes()));
    format!("{base}/{hash}?s={size}&d=identicon&r=g")
}
