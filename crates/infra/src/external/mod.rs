//! Adapters over the external systems publish handlers depend on.

pub mod crypto;
pub mod publishing;
pub mod wordpress;

pub use crypto::{CredentialDecryptor, DecryptError, EncryptedSecret, FunctionDecryptor, SecretString};
pub use publishing::{MediaId, PostPayload, PublishError, PublishingClient, RemotePost, TargetCredentials};
pub use wordpress::WordPressClient;

/// Longest remote error body kept in an error value.
pub const MAX_ERROR_BODY_CHARS: usize = 512;

/// Read a failed response's body, cut to [`MAX_ERROR_BODY_CHARS`].
pub(crate) async fn error_body(resp: reqwest::Response) -> String {
    truncate_error_body(resp.text().await.unwrap_or_default())
}

fn truncate_error_body(mut body: String) -> String {
    if let Some((cut, _)) = body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

#[cfg(test)]
pub(crate) mod fakes;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_error_bodies_are_kept_whole() {
        assert_eq!(truncate_error_body("rest_forbidden".into()), "rest_forbidden");
        let exact = "x".repeat(MAX_ERROR_BODY_CHARS);
        assert_eq!(truncate_error_body(exact.clone()), exact);
    }

    #[test]
    fn long_error_bodies_are_cut_on_a_char_boundary() {
        let body = "é".repeat(MAX_ERROR_BODY_CHARS * 4);
        let cut = truncate_error_body(body);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.trim_end_matches("...").chars().count(), MAX_ERROR_BODY_CHARS);
    }
}
